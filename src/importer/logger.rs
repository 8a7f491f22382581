//! Importer-facing logger.
//!
//! Every line goes to the `log` facade under the `importer` target. When the
//! buffer is active the most recent lines are also kept in memory so the
//! admin API can show the progress of a running import.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// Maximum number of lines kept by [`BufferedLogger`].
pub const BUFFER_SIZE: usize = 500;

const LOG_TARGET: &str = "importer";

pub trait ImporterLogger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
    fn debug(&self, message: &str);

    fn is_buffer_active(&self) -> bool;
    fn set_buffer_active(&self, active: bool);

    /// Buffered lines joined with `separator`, oldest first.
    fn logger_buffer(&self, separator: &str) -> String;
}

pub struct BufferedLogger {
    buffer: Mutex<VecDeque<String>>,
    active: AtomicBool,
}

impl BufferedLogger {
    pub fn new(active: bool) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(BUFFER_SIZE)),
            active: AtomicBool::new(active),
        }
    }

    fn record(&self, level: &str, message: &str) {
        if !self.is_buffer_active() {
            return;
        }

        let mut buffer = self.buffer.lock();
        if buffer.len() == BUFFER_SIZE {
            buffer.pop_front();
        }
        buffer.push_back(format!(
            "{} {} {}",
            chrono::Utc::now().format("%H:%M:%S%.3f"),
            level,
            message
        ));
    }
}

impl Default for BufferedLogger {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ImporterLogger for BufferedLogger {
    fn info(&self, message: &str) {
        log::info!(target: LOG_TARGET, "{}", message);
        self.record("INFO", message);
    }

    fn warn(&self, message: &str) {
        log::warn!(target: LOG_TARGET, "{}", message);
        self.record("WARN", message);
    }

    fn error(&self, message: &str) {
        log::error!(target: LOG_TARGET, "{}", message);
        self.record("ERROR", message);
    }

    fn debug(&self, message: &str) {
        log::debug!(target: LOG_TARGET, "{}", message);
        self.record("DEBUG", message);
    }

    fn is_buffer_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    fn set_buffer_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
        if !active {
            self.buffer.lock().clear();
        }
    }

    fn logger_buffer(&self, separator: &str) -> String {
        let buffer = self.buffer.lock();
        buffer.iter().map(String::as_str).collect::<Vec<_>>().join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_buffer_keeps_nothing() {
        let logger = BufferedLogger::new(false);
        logger.info("ignored");
        assert_eq!(logger.logger_buffer("\n"), "");
    }

    #[test]
    fn buffer_drops_oldest_lines() {
        let logger = BufferedLogger::new(true);
        for i in 0..(BUFFER_SIZE + 10) {
            logger.info(&format!("line {}", i));
        }

        let buffer = logger.logger_buffer("\n");
        let lines: Vec<&str> = buffer.lines().collect();
        assert_eq!(lines.len(), BUFFER_SIZE);
        assert!(lines[0].ends_with("INFO line 10"));
        assert!(lines[BUFFER_SIZE - 1].ends_with(&format!("line {}", BUFFER_SIZE + 9)));
    }

    #[test]
    fn deactivating_clears_the_buffer() {
        let logger = BufferedLogger::new(true);
        logger.error("boom");
        assert!(logger.logger_buffer(" | ").contains("ERROR boom"));

        logger.set_buffer_active(false);
        assert_eq!(logger.logger_buffer(" | "), "");
    }
}
