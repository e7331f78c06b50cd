//! Layered error definitions
//!
//! Categorized by source: config / device / sync / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Device Errors =====
    /// A device capability call failed
    #[error("device '{device}' {op} failed: {message}")]
    DeviceIo {
        device: String,
        op: String,
        message: String,
    },

    /// Device not present on the bus
    #[error("device not found: {serial}")]
    DeviceNotFound { serial: String },

    /// Device does not expose a required capability under any known name
    #[error("device '{device}' is missing capability '{capability}'")]
    CapabilityMissing { device: String, capability: String },

    // ===== Sync Errors =====
    /// Schedule target is not in the device's future
    #[error("schedule target {target_ns} for device '{device}' is not after device clock {device_now_ns}")]
    ScheduleInPast {
        device: String,
        target_ns: i64,
        device_now_ns: i64,
    },

    /// Devices did not reach the expected clock-sync role in time
    #[error(
        "sync role timeout after {waited_ms}ms: followers={followers}, leaders={leaders}, unknown={unknown}"
    )]
    SyncRoleTimeout {
        waited_ms: u64,
        followers: usize,
        leaders: usize,
        unknown: usize,
    },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink input was closed by the consumer
    #[error("sink '{sink_name}' closed")]
    SinkClosed { sink_name: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create device capability error
    pub fn device_io(
        device: impl Into<String>,
        op: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DeviceIo {
            device: device.into(),
            op: op.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}
