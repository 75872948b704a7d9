//! Structured logging module for the reflection backend
//!
//! Writes dated log files with categories:
//! - EXTRACT: Emotion/topic extraction stage
//! - REFLECT: Reflection and deeper-meaning generation
//! - PIPELINE: Orchestration runs and stage transitions
//! - STORE: Persistence events
//! - ERROR: Absorbed stage failures and crashes

use chrono::{Local, Utc};
use once_cell::sync::Lazy;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Log categories for structured logging
#[derive(Debug, Clone, Copy)]
pub enum LogCategory {
    Extract,  // First generation stage
    Reflect,  // Second and third generation stages
    Pipeline, // Orchestration lifecycle
    Store,    // Persistence reads and writes
    Error,    // Absorbed failures
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Extract => "EXTRACT",
            LogCategory::Reflect => "REFLECT",
            LogCategory::Pipeline => "PIPELINE",
            LogCategory::Store => "STORE",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Global log file handle
static LOG_FILE: Lazy<Mutex<Option<PathBuf>>> = Lazy::new(|| Mutex::new(None));

/// Get the log directory path
fn get_log_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REFLECTION_LOG_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".reflection-backend/logs")
}

/// Get today's log file path
fn get_log_file_path() -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    get_log_dir().join(format!("reflection-{}.log", today))
}

/// Initialize the logging system - creates log directory if needed
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = get_log_dir();

    if !log_dir.exists() {
        fs::create_dir_all(&log_dir)?;
    }

    let log_path = get_log_file_path();
    *LOG_FILE.lock().unwrap() = Some(log_path.clone());

    log(LogCategory::Pipeline, None, "Reflection backend logging initialized");

    Ok(())
}

/// Log a message with category and optional record context
pub fn log(category: LogCategory, record_id: Option<&str>, message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let record_context = record_id
        .map(|id| format!("record={} | ", &id[..8.min(id.len())]))
        .unwrap_or_default();

    let log_line = format!(
        "[{}] [{}] {}{}\n",
        timestamp,
        category.as_str(),
        record_context,
        message
    );

    // Always print to console (for dev)
    print!("{}", log_line);

    // Write to file
    let log_path = get_log_file_path();
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
        let _ = file.write_all(log_line.as_bytes());
    }
}

/// Log an extraction stage event
pub fn log_extract(record_id: Option<&str>, message: &str) {
    log(LogCategory::Extract, record_id, message);
}

/// Log a reflection or deeper-meaning stage event
pub fn log_reflect(record_id: Option<&str>, message: &str) {
    log(LogCategory::Reflect, record_id, message);
}

/// Log an orchestration lifecycle event
pub fn log_pipeline(record_id: Option<&str>, message: &str) {
    log(LogCategory::Pipeline, record_id, message);
}

/// Log a persistence event
pub fn log_store(record_id: Option<&str>, message: &str) {
    log(LogCategory::Store, record_id, message);
}

/// Log an absorbed error
pub fn log_error(record_id: Option<&str>, message: &str) {
    log(LogCategory::Error, record_id, message);
}

/// Clean up old log files (keep last 7 days)
pub fn cleanup_old_logs() -> Result<usize, Box<dyn std::error::Error>> {
    let log_dir = get_log_dir();
    let mut deleted = 0;

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(7);

    for entry in fs::read_dir(&log_dir)? {
        let entry = entry?;
        let path = entry.path();

        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                let modified_time: chrono::DateTime<Utc> = modified.into();
                if modified_time < cutoff {
                    if fs::remove_file(&path).is_ok() {
                        deleted += 1;
                    }
                }
            }
        }
    }

    Ok(deleted)
}
