//! Logging that reaches both tracing output and the connected MCP client.
//!
//! Levels use MCP's `LoggingLevel`. The client may raise or lower the
//! threshold at runtime through `logging/setLevel`.

use crate::build::{BuildLogRecord, LogLevel};
use rmcp::{
    RoleServer,
    model::{LoggingLevel, LoggingMessageNotificationParam},
    service::Peer,
};
use serde_json::{Value, json};
use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};
use tracing::Level;

/// Severity order, lowest first.
const LEVELS: [LoggingLevel; 8] = [
    LoggingLevel::Debug,
    LoggingLevel::Info,
    LoggingLevel::Notice,
    LoggingLevel::Warning,
    LoggingLevel::Error,
    LoggingLevel::Critical,
    LoggingLevel::Alert,
    LoggingLevel::Emergency,
];

fn rank(level: LoggingLevel) -> u8 {
    LEVELS.iter().position(|l| *l == level).unwrap_or(0) as u8
}

/// Minimum level, shared between the server handler and every logger clone.
pub struct LogLevelFilter(AtomicU8);

impl LogLevelFilter {
    pub fn new(level: LoggingLevel) -> Self {
        Self(AtomicU8::new(rank(level)))
    }

    pub fn get(&self) -> LoggingLevel {
        LEVELS
            .get(self.0.load(Ordering::Relaxed) as usize)
            .copied()
            .unwrap_or(LoggingLevel::Debug)
    }

    pub fn set(&self, level: LoggingLevel) {
        self.0.store(rank(level), Ordering::Relaxed);
    }

    pub fn should_log(&self, level: LoggingLevel) -> bool {
        rank(level) >= self.0.load(Ordering::Relaxed)
    }
}

impl Default for LogLevelFilter {
    fn default() -> Self {
        Self::new(LoggingLevel::Info)
    }
}

pub fn logging_level_to_tracing(level: LoggingLevel) -> Level {
    match level {
        LoggingLevel::Debug => Level::DEBUG,
        LoggingLevel::Info | LoggingLevel::Notice => Level::INFO,
        LoggingLevel::Warning => Level::WARN,
        _ => Level::ERROR,
    }
}

/// MCP level for a build log record.
pub fn build_level(level: LogLevel) -> LoggingLevel {
    match level {
        LogLevel::Info => LoggingLevel::Info,
        LogLevel::Warn => LoggingLevel::Warning,
        LogLevel::Error => LoggingLevel::Error,
    }
}

/// Logger fanning out to tracing and, when connected, the MCP client.
#[derive(Clone)]
pub struct Logger {
    peer: Option<Peer<RoleServer>>,
    level_filter: Arc<LogLevelFilter>,
    name: String,
}

impl Logger {
    pub fn new() -> Self {
        Self {
            peer: None,
            level_filter: Arc::new(LogLevelFilter::default()),
            name: "deploy-config".to_string(),
        }
    }

    pub fn with_peer(mut self, peer: Peer<RoleServer>) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_level_filter(mut self, filter: Arc<LogLevelFilter>) -> Self {
        self.level_filter = filter;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn log(&self, level: LoggingLevel, message: &str, data: Option<Value>) {
        if !self.level_filter.should_log(level) {
            return;
        }

        let logger = self.name.as_str();
        match logging_level_to_tracing(level) {
            Level::ERROR => tracing::error!(logger, "{}", message),
            Level::WARN => tracing::warn!(logger, "{}", message),
            Level::INFO => tracing::info!(logger, "{}", message),
            _ => tracing::debug!(logger, "{}", message),
        }

        if let Some(peer) = self.peer.clone() {
            let param = LoggingMessageNotificationParam {
                level,
                logger: Some(self.name.clone()),
                data: data.unwrap_or_else(|| json!({ "message": message })),
            };
            tokio::spawn(async move {
                let _ = peer.notify_logging_message(param).await;
            });
        }
    }

    pub fn debug(&self, msg: &str) {
        self.log(LoggingLevel::Debug, msg, None);
    }

    pub fn info(&self, msg: &str) {
        self.log(LoggingLevel::Info, msg, None);
    }

    pub fn warning(&self, msg: &str) {
        self.log(LoggingLevel::Warning, msg, None);
    }

    pub fn error(&self, msg: &str) {
        self.log(LoggingLevel::Error, msg, None);
    }

    /// Forward one build log record, keeping its id and context as data.
    pub fn build_record(&self, compilation_id: &str, record: &BuildLogRecord) {
        let message = match &record.context {
            Some(context) => format!("[{}] {}", context, record.message),
            None => record.message.clone(),
        };
        self.log(
            build_level(record.level),
            &message,
            Some(json!({
                "compilationId": compilation_id,
                "record": record,
            })),
        );
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_passes_threshold_and_above() {
        let filter = LogLevelFilter::new(LoggingLevel::Warning);

        assert!(!filter.should_log(LoggingLevel::Info));
        assert!(filter.should_log(LoggingLevel::Warning));
        assert!(filter.should_log(LoggingLevel::Emergency));

        filter.set(LoggingLevel::Debug);
        assert!(filter.should_log(LoggingLevel::Debug));
        assert_eq!(filter.get(), LoggingLevel::Debug);
    }

    #[test]
    fn every_level_survives_the_atomic() {
        for level in LEVELS {
            assert_eq!(LogLevelFilter::new(level).get(), level);
        }
    }

    #[test]
    fn build_levels_map_onto_mcp_levels() {
        assert_eq!(build_level(LogLevel::Warn), LoggingLevel::Warning);
        assert_eq!(
            logging_level_to_tracing(build_level(LogLevel::Error)),
            Level::ERROR
        );
    }
}
