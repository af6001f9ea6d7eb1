//! # ledctl Core Library
//!
//! This crate drives a CH340-bridged RGB/status LED module over USB-serial.
//! It encapsulates the vendor wire protocol, port discovery, the timed
//! pattern execution engine and the process-lifecycle supervision that keeps
//! at most one pattern loop per port. The thin CLI in `main.rs` and any
//! interactive front-end are callers of the same library operations.
//!
//! ## Crate Structure
//!
//! - **`config`**: `SerialConfig` and `PatternConfig` with up-front
//!   validation; out-of-range values never reach the wire.
//! - **`error`**: the `LedError` enum and its stable exit-code mapping.
//! - **`locate`**: serial port discovery, matching known bridge VID/PID
//!   pairs with a device-name fallback scan.
//! - **`protocol`**: the reverse-engineered 5-byte command frames and the
//!   mode dispatch table, pure in `(mode, config, tick)`.
//! - **`engine`**: the cancellable timed loop that turns a mode's frame
//!   rule into paced serial writes.
//! - **`transport`**: the open port handle, line control and inter-byte
//!   pacing.
//! - **`supervisor`**: per-port ownership records, start/stop,
//!   background/foreground and kill-existing policy.

pub mod config;
pub mod engine;
pub mod error;
pub mod locate;
pub mod protocol;
pub mod supervisor;
pub mod transport;

pub use config::{PatternConfig, SerialConfig, BAUD_DEFAULT, IB_DELAY_DEFAULT};
pub use error::{LedError, LedResult};
pub use protocol::{Frame, Mode};
pub use supervisor::{ProcessSupervisor, Registry, RunningPattern, StartPolicy};
pub use transport::{FrameSink, SerialTransport};
