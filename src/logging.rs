//! Logging infrastructure - structured tracing for the marshalling layer
//!
//! Uses `tracing` for structured events. Nothing is printed unless the host
//! installs a subscriber, either its own or the one built by [`init`].

use once_cell::sync::OnceCell;
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

/// Global logging state; holds the file writer guard when file output is on
static LOGGER: OnceCell<Option<WorkerGuard>> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Log file path; stdout when unset
    pub log_path: Option<String>,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
    /// Show span events (enter/exit)
    pub show_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            log_path: None,
            json_format: false,
            show_spans: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // LUA_MARSHAL_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("LUA_MARSHAL_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        if let Ok(path) = std::env::var("LUA_MARSHAL_LOG_FILE") {
            config.log_path = Some(path);
        }

        config.json_format = std::env::var("LUA_MARSHAL_LOG_JSON").is_ok();
        config.show_spans = std::env::var("LUA_MARSHAL_LOG_SPANS").is_ok();

        config
    }

    /// Verbose config for debugging bindings
    pub fn debug() -> Self {
        Self {
            level: Level::TRACE,
            log_path: None,
            json_format: false,
            show_spans: true,
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with configuration from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration
///
/// Only the first call installs a subscriber. If the host already installed
/// one, the call is a no-op.
pub fn init_with_config(config: LogConfig) {
    LOGGER.get_or_init(|| match try_install(&config) {
        Ok(guard) => guard,
        Err(err) => {
            tracing::debug!(
                event = "log_init_skipped",
                error = %err,
                "a global subscriber is already installed"
            );
            None
        }
    });
}

/// Build the subscriber for `config` and install it as the global default
fn try_install(config: &LogConfig) -> Result<Option<WorkerGuard>, TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "lua_marshal={}",
            config.level.as_str().to_lowercase()
        ))
    });

    let span_events = if config.show_spans {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let (writer, guard) = match config.log_path.as_deref().map(Path::new) {
        Some(path) => {
            let directory = path.parent().unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|name| name.to_os_string())
                .unwrap_or_else(|| "lua_marshal.log".into());
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (writer, Some(guard))
        }
        None => {
            let (writer, guard) = tracing_appender::non_blocking(io::stdout());
            (writer, Some(guard))
        }
    };

    let layer = if config.json_format {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_span_events(span_events)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(true)
            .with_line_number(cfg!(debug_assertions))
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()?;

    Ok(guard)
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

// ============================================================================
// Marshalling events
// ============================================================================

/// A native function was turned into a VM closure
#[inline]
pub fn log_bind(function: &str, arity: usize) {
    tracing::debug!(
        event = "bind",
        function = function,
        arity = arity,
        "native function bound"
    );
}

/// The VM called a bound native function
#[inline]
pub fn log_native_call(function: &str, args: i32) {
    tracing::trace!(
        event = "native_call",
        function = function,
        args = args,
        "bound function called"
    );
}

/// A bound function failed and the failure is raised inside the VM
pub fn log_raise(function: &str, message: &str) {
    tracing::debug!(
        event = "raise",
        function = function,
        message = message,
        "raising VM error"
    );
}

/// A bound function panicked
pub fn log_panic(function: &str, message: &str) {
    tracing::error!(
        event = "panic",
        function = function,
        message = message,
        "panic caught at VM boundary"
    );
}

/// A decode failed
#[inline]
pub fn log_decode_error(target: &str, index: i32, error: &str) {
    tracing::trace!(
        event = "decode_error",
        target_type = target,
        index = index,
        error = error,
        "decode failed"
    );
}

/// A parsed capsule was released
#[inline]
pub fn log_release(target: &str, bytes: usize) {
    tracing::trace!(
        event = "release",
        target_type = target,
        bytes = bytes,
        "parsed value released"
    );
}

/// A VM state was created
pub fn log_vm_open(flavor: &str) {
    tracing::info!(event = "vm_open", flavor = flavor, "VM state created");
}

/// A VM state was closed
pub fn log_vm_close() {
    tracing::debug!(event = "vm_close", "VM state closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(config.log_path.is_none());

        let debug_config = LogConfig::debug();
        assert_eq!(debug_config.level, Level::TRACE);
        assert!(debug_config.show_spans);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn test_init_idempotent() {
        init_with_config(LogConfig::default());
        init(); // Should not panic
        assert!(is_initialized());
    }

    #[test]
    fn test_install_reports_existing_subscriber() {
        // Either this or an earlier install wins; the next one must fail
        let _ = tracing::subscriber::set_global_default(tracing::subscriber::NoSubscriber::default());
        assert!(try_install(&LogConfig::default()).is_err());
    }
}
