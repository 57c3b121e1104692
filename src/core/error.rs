//! Error taxonomy and exit-code mapping.
//!
//! Startup-fatal errors terminate the daemon with a code that distinguishes
//! configuration, hardware/capability, and control-surface failures for
//! operability. Validation errors are normal results for their callers and
//! never escalate to process faults.

use thiserror::Error;

/// Common cacheqos error conditions.
#[derive(Debug, Error)]
pub enum QosError {
    /// Configuration could not be read, parsed, or validated.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Hardware allocator initialization failed.
    #[error("hardware initialization failed: {message}")]
    HardwareInit { message: String },

    /// A required cache-partitioning capability is absent on this host.
    #[error("required capability missing: {capability}")]
    CapabilityMissing { capability: String },

    /// The control-surface server could not be started or failed fatally.
    #[error("control surface error: {message}")]
    ControlSurface { message: String },

    /// Applying a derived hardware configuration failed.
    #[error("failed to apply hardware configuration: {message}")]
    Apply { message: String },

    /// A core identifier is out of range for this host.
    #[error("core {core} is out of range for this host ({core_count} logical cores)")]
    InvalidCore { core: u32, core_count: usize },

    /// A pool definition violates a membership invariant.
    #[error("invalid pool definition: {message}")]
    InvalidPool { message: String },
}

impl QosError {
    /// Create an apply error from any underlying cause.
    pub fn apply(message: impl Into<String>) -> Self {
        Self::Apply {
            message: message.into(),
        }
    }

    /// Create a capability-missing error.
    pub fn capability(capability: impl Into<String>) -> Self {
        Self::CapabilityMissing {
            capability: capability.into(),
        }
    }

    /// Process exit code for this error when it is startup-fatal.
    ///
    /// 2 = configuration, 3 = hardware/capability, 4 = control surface.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::InvalidCore { .. } | Self::InvalidPool { .. } => 2,
            Self::HardwareInit { .. } | Self::CapabilityMissing { .. } | Self::Apply { .. } => 3,
            Self::ControlSurface { .. } => 4,
        }
    }

    /// Check if this error is an input-validation result rather than a
    /// subsystem failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidCore { .. } | Self::InvalidPool { .. })
    }
}

/// Result type using QosError.
pub type QosResult<T> = Result<T, QosError>;
