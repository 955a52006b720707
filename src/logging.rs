//! Structured logging and tracing for the AC system supervisor
//!
//! This module provides a single stdout tracing subscriber plus a small
//! structured-logging helper layered on top of it.

use crate::error::{AcSystemError, Result};
use std::sync::Once;
use tracing::{Level, debug, error, info, trace, warn};
use tracing_subscriber::EnvFilter;

static INIT_ONCE: Once = Once::new();

/// Initialise the global tracing subscriber. `debug` raises the default
/// level to `DEBUG`, matching `original_source/acsystem.py::main`'s
/// `--debug` flag raising `logging.DEBUG`.
pub fn init_logging(debug: bool) -> Result<()> {
    let mut init_result = Ok(());
    INIT_ONCE.call_once(|| {
        let level = if debug { Level::DEBUG } else { Level::INFO };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| format!("acsystem={level}").into());

        init_result = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .try_init()
            .map_err(|e| AcSystemError::config(e.to_string()));

        if init_result.is_ok() {
            info!(%level, "logging initialized");
        }
    });
    init_result
}

/// Context information for log messages
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "monitor", "leader", "member")
    pub component: String,

    /// NMEA-2000 system instance this message pertains to, if any
    pub system_instance: Option<u8>,

    /// Additional context fields
    pub extra_fields: std::collections::HashMap<String, String>,
}

impl LogContext {
    /// Create a new log context
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            system_instance: None,
            extra_fields: std::collections::HashMap::new(),
        }
    }

    /// Set the system instance
    pub fn with_system_instance(mut self, system_instance: u8) -> Self {
        self.system_instance = Some(system_instance);
        self
    }

    /// Add extra field
    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }
}

/// Structured logger with context
#[derive(Clone)]
pub struct StructuredLogger {
    context: LogContext,
}

impl StructuredLogger {
    /// Create a new structured logger with context
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    /// Log an info message with context
    pub fn info(&self, message: &str) {
        let fields = self.format_fields();
        info!(%fields, "{}", message);
    }

    /// Log a warning message with context
    pub fn warn(&self, message: &str) {
        let fields = self.format_fields();
        warn!(%fields, "{}", message);
    }

    /// Log an error message with context
    pub fn error(&self, message: &str) {
        let fields = self.format_fields();
        error!(%fields, "{}", message);
    }

    /// Log a debug message with context
    pub fn debug(&self, message: &str) {
        let fields = self.format_fields();
        debug!(%fields, "{}", message);
    }

    /// Log a trace message with context
    pub fn trace(&self, message: &str) {
        let fields = self.format_fields();
        trace!(%fields, "{}", message);
    }

    fn format_fields(&self) -> String {
        let mut fields = vec![format!("component={}", self.context.component)];

        if let Some(system_instance) = self.context.system_instance {
            fields.push(format!("system_instance={system_instance}"));
        }

        for (key, value) in &self.context.extra_fields {
            fields.push(format!("{key}={value}"));
        }

        fields.join(",")
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Create a logger with full context
pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}
