//! # VESC Telemetry
//!
//! Polls a VESC motor controller for realtime values over UART and logs
//! the decoded telemetry.

use anyhow::{Context, Result};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use vesc_telemetry::communicator::Communicator;
use vesc_telemetry::config::Config;
use vesc_telemetry::serial::SerialTransport;
use vesc_telemetry::telemetry::logger::TelemetryLogger;

/// Number of polls between status log messages
const LOG_INTERVAL_POLLS: u64 = 100;

/// Main entry point for VESC Telemetry
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Set up logging with tracing subscriber
///    - Load configuration (first CLI argument, defaults otherwise)
///    - Open the serial connection to the VESC
///
/// 2. **Main Loop**
///    - Issue a GET_VALUES request every `poll.interval_ms`
///    - Append each result to the JSONL telemetry log when enabled
///    - Log a status line every 100 polls
///
/// 3. **Graceful Shutdown**
///    - Ctrl+C stops polling and flushes the telemetry log
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("VESC Telemetry v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("loading {}", path))?,
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    let serial = SerialTransport::open_with_paths(&[config.serial.port.as_str()], config.serial.baud_rate)?;
    info!("VESC serial port opened at: {}", serial.device_path());

    let mut vesc = Communicator::with_config(config.protocol);
    vesc.bind(serial);

    let mut telemetry_log = if config.telemetry.enabled {
        info!("Writing telemetry to {}", config.telemetry.log_dir);
        Some(TelemetryLogger::rolling(&config.telemetry)?)
    } else {
        None
    };

    let mut poll_interval = interval(Duration::from_millis(config.poll.interval_ms));
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Polling VESC every {} ms", config.poll.interval_ms);
    info!("Press Ctrl+C to exit");

    let mut poll_count: u64 = 0;
    let mut failures: u64 = 0;

    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                // refresh() busy-polls the port for up to timeout_ms
                let record = tokio::task::block_in_place(|| vesc.refresh());

                poll_count += 1;
                if !record.connected {
                    failures += 1;
                }

                if let Some(log) = telemetry_log.as_mut() {
                    if let Err(e) = log.log(&record, vesc.last_error()) {
                        warn!("Failed to write telemetry record: {}", e);
                    }
                }

                if poll_count % LOG_INTERVAL_POLLS == 0 {
                    info!(
                        "Polls: {} (failed: {}), {:.1} V, {:.0} ERPM, FET {:.1} °C, connected: {}",
                        poll_count,
                        failures,
                        record.values.battery_voltage,
                        record.values.erpm,
                        record.values.temp_fet,
                        record.connected
                    );
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Total polls: {} (failed: {})", poll_count, failures);
                break;
            }
        }
    }

    if let Some(mut log) = telemetry_log {
        log.flush()?;
        info!("Telemetry records written: {}", log.records_written());
    }

    Ok(())
}
