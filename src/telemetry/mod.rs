//! # Telemetry Module
//!
//! Handles telemetry logging to JSONL files with rotation.
//!
//! This module handles:
//! - Formatting each refresh result as JSONL (JSON Lines)
//! - Writing to hourly rotating log files
//! - Retaining only the last N files

pub mod logger;
