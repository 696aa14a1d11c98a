//! Structured logging utilities for slotmount components.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use slot_config::{log_manager_info, log_reset_info};
//!
//! log_manager_info!("Mount request accepted", owner = "MountDemo");
//! log_reset_info!("Deleting entry", entry = tracing::field::display(path.display()));
//! ```

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const MANAGER: &'static str = "MANAGER";
    pub const SLOT: &'static str = "SLOT";
    pub const RESET: &'static str = "RESET";
    pub const HOST: &'static str = "HOST";
    pub const CONSOLE: &'static str = "CONSOLE";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// === MANAGER logging macros ===

#[macro_export]
macro_rules! log_manager_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = $crate::logging::Component::MANAGER, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_manager_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::MANAGER, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_manager_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::MANAGER, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_manager_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::MANAGER, $($key = $value,)* $msg)
    };
}

// === SLOT logging macros ===

#[macro_export]
macro_rules! log_slot_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::SLOT, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_slot_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::SLOT, $($key = $value,)* $msg)
    };
}

// === RESET logging macros ===

#[macro_export]
macro_rules! log_reset_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::RESET, $($key = $value,)* $msg)
    };
}

// === HOST logging macros ===

#[macro_export]
macro_rules! log_host_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = $crate::logging::Component::HOST, $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_host_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = $crate::logging::Component::HOST, $($key = $value,)* $msg)
    };
}

// === CONSOLE logging macros ===

#[macro_export]
macro_rules! log_console_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = $crate::logging::Component::CONSOLE, $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// `SLOTMOUNT_LOG` takes precedence, then `RUST_LOG`.
/// Call this once at application startup.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_env("SLOTMOUNT_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
