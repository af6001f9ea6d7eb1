//! Custom error types for the application.
//!
//! This module defines the primary error type, `LedError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different kinds of failures that can occur,
//! from port discovery and configuration problems to serial I/O faults and
//! pattern-loop ownership conflicts.
//!
//! Every variant maps to a stable process exit code (see
//! [`LedError::exit_code`]) so that calling scripts can branch on outcome.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type LedResult<T> = std::result::Result<T, LedError>;

/// Unified error type for port discovery, configuration, serial I/O and
/// pattern-loop supervision.
#[derive(Error, Debug)]
pub enum LedError {
    /// No candidate serial device at any discovery stage.
    #[error("no serial port found (is the CH340 bridge plugged in?)")]
    PortNotFound,

    /// More than one known bridge device and no explicit `--port`.
    #[error("multiple candidate ports found, pass --port to choose one: {}", .0.join(", "))]
    AmbiguousPort(Vec<String>),

    /// Opening the device failed with EACCES.
    #[error("permission denied opening {port} (is your user in the dialout/uucp group?)")]
    PermissionDenied {
        /// Device path that was being opened.
        port: String,
    },

    /// A frame write failed mid-loop; fatal for the owning pattern loop.
    #[error("serial write failed on {port}: {source}")]
    ProtocolWrite {
        /// Device path the write targeted.
        port: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The port already has a live registered owner and the caller asked not
    /// to replace it. A normal outcome under `--no-kill-existing`.
    #[error("a pattern loop (pid {pid}) already owns {port}; stop it or drop --no-kill-existing")]
    ExistingProcessConflict {
        /// Contested device path.
        port: String,
        /// Pid of the current owner, left untouched.
        pid: u32,
    },

    /// `stop` was asked for a port with no live registration.
    #[error("no running pattern registered for {port}")]
    NoSuchRunning {
        /// Device path that had no owner.
        port: String,
    },

    /// Out-of-range brightness/speed/delay/hz, caught before any serial I/O.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Wrapped `serialport` crate error (enumeration, open).
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Wrapped standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The on-disk registration record could not be read or written.
    #[error("registration record error: {0}")]
    Registry(String),
}

impl LedError {
    /// Stable exit code for CLI consumers. `0` is success and never appears
    /// here; `1` is the catch-all for wrapped I/O and serial faults.
    pub fn exit_code(&self) -> i32 {
        match self {
            LedError::PortNotFound => 2,
            LedError::AmbiguousPort(_) => 3,
            LedError::PermissionDenied { .. } => 4,
            LedError::ExistingProcessConflict { .. } => 5,
            LedError::NoSuchRunning { .. } => 6,
            LedError::InvalidConfig(_) => 7,
            LedError::ProtocolWrite { .. }
            | LedError::Serial(_)
            | LedError::Io(_)
            | LedError::Registry(_) => 1,
        }
    }
}
