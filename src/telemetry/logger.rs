//! # Telemetry Logger
//!
//! Writes one JSON object per refresh:
//!
//! ```text
//! {"timestamp":"2024-05-01T12:00:00.000Z","connected":true,"error":null,"values":{"temp_fet":31.2,...}}
//! ```

use std::io::Write;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::communicator::RefreshError;
use crate::config::TelemetryConfig;
use crate::error::{Result, VescError};
use crate::vesc::protocol::{MotorValues, TelemetryRecord};

#[derive(Serialize)]
struct LogEntry<'a> {
    timestamp: String,
    connected: bool,
    error: Option<String>,
    values: &'a MotorValues,
}

/// JSON Lines telemetry sink
pub struct TelemetryLogger<W: Write> {
    writer: W,
    records_written: u64,
}

impl TelemetryLogger<RollingFileAppender> {
    /// Log to hourly rotated `telemetry.<date-hour>.jsonl` files under `log_dir`
    ///
    /// # Errors
    ///
    /// Returns error if the log directory cannot be created
    pub fn rolling(config: &TelemetryConfig) -> Result<Self> {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::HOURLY)
            .filename_prefix("telemetry")
            .filename_suffix("jsonl")
            .max_log_files(config.max_files_to_keep)
            .build(&config.log_dir)
            .map_err(|e| VescError::Telemetry(format!("Failed to open {}: {}", config.log_dir, e)))?;

        Ok(Self::new(appender))
    }
}

impl<W: Write> TelemetryLogger<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records_written: 0,
        }
    }

    /// Append one record
    pub fn log(&mut self, record: &TelemetryRecord, error: Option<&RefreshError>) -> Result<()> {
        let entry = LogEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            connected: record.connected,
            error: error.map(|e| e.to_string()),
            values: &record.values,
        };

        let mut line = serde_json::to_vec(&entry)
            .map_err(|e| VescError::Telemetry(format!("Failed to serialize record: {}", e)))?;
        line.push(b'\n');

        self.writer.write_all(&line)?;
        self.records_written += 1;
        Ok(())
    }

    /// Push buffered lines to the underlying writer
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Lines appended since the logger was created
    pub fn records_written(&self) -> u64 {
        self.records_written
    }
}
