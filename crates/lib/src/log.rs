//! Logger collaborator passed explicitly through the detect engine.
//!
//! Detection output is a line-oriented transcript other tools parse, so the
//! engine writes whole lines through [`Logger`] instead of calling the
//! `tracing` macros directly.

use std::sync::{Mutex, PoisonError};

use tracing::Level;

pub trait Logger: Send + Sync {
  fn log(&self, level: Level, message: &str);

  fn debug(&self, message: &str) {
    self.log(Level::DEBUG, message);
  }

  fn info(&self, message: &str) {
    self.log(Level::INFO, message);
  }

  fn warn(&self, message: &str) {
    self.log(Level::WARN, message);
  }

  fn error(&self, message: &str) {
    self.log(Level::ERROR, message);
  }
}

/// Forwards each line to `tracing` under the `cairn::detect` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
  fn log(&self, level: Level, message: &str) {
    match level {
      Level::ERROR => tracing::error!(target: "cairn::detect", "{message}"),
      Level::WARN => tracing::warn!(target: "cairn::detect", "{message}"),
      Level::INFO => tracing::info!(target: "cairn::detect", "{message}"),
      Level::DEBUG => tracing::debug!(target: "cairn::detect", "{message}"),
      Level::TRACE => tracing::trace!(target: "cairn::detect", "{message}"),
    }
  }
}

/// Keeps lines in memory. Lines more verbose than `max_level` are dropped.
#[derive(Debug)]
pub struct RecordingLogger {
  max_level: Level,
  lines: Mutex<Vec<(Level, String)>>,
}

impl Default for RecordingLogger {
  fn default() -> Self {
    Self::new(Level::DEBUG)
  }
}

impl RecordingLogger {
  pub fn new(max_level: Level) -> Self {
    Self {
      max_level,
      lines: Mutex::new(Vec::new()),
    }
  }

  pub fn entries(&self) -> Vec<(Level, String)> {
    self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Every recorded line, each terminated by a newline.
  pub fn all_logs(&self) -> String {
    self
      .lines
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .map(|(_, line)| format!("{line}\n"))
      .collect()
  }

  pub fn clear(&self) {
    self.lines.lock().unwrap_or_else(PoisonError::into_inner).clear();
  }
}

impl Logger for RecordingLogger {
  fn log(&self, level: Level, message: &str) {
    // tracing orders levels by verbosity: TRACE is the greatest.
    if level > self.max_level {
      return;
    }
    self
      .lines
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push((level, message.to_string()));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tracing_test::traced_test;

  #[test]
  fn recording_logger_filters_by_level() {
    let logger = RecordingLogger::new(Level::INFO);
    logger.debug("hidden");
    logger.info("shown");
    logger.warn("also shown");
    assert_eq!(logger.all_logs(), "shown\nalso shown\n");
  }

  #[test]
  fn recording_logger_keeps_levels() {
    let logger = RecordingLogger::default();
    logger.debug("a");
    logger.error("b");
    assert_eq!(
      logger.entries(),
      vec![(Level::DEBUG, "a".to_string()), (Level::ERROR, "b".to_string())]
    );
  }

  #[traced_test]
  #[test]
  fn tracing_logger_emits_events() {
    TracingLogger.info("pass: A@v1");
    assert!(logs_contain("pass: A@v1"));
  }
}
