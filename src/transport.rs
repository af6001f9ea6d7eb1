//! Serial transport: owns the open port handle for the lifetime of one
//! pattern loop.
//!
//! The link runs 8N1 at an unusual 10000 baud. DTR/RTS are applied right
//! after open (the CH340 needs DTR asserted for the controller to listen),
//! and every frame byte is followed by a flush and the configured pacing
//! delay; the microcontroller samples its UART slowly and drops bytes that
//! arrive back-to-back. The handle closes on drop, on every exit path.

use crate::config::SerialConfig;
use crate::error::{LedError, LedResult};
use crate::protocol::Frame;
use log::{debug, trace};
use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::Write;
use std::time::Duration;

/// Anything that can accept complete protocol frames. The engine drives a
/// `FrameSink` so tests can record frames without hardware attached.
pub trait FrameSink: Send {
    /// Write one complete frame. Implementations must never split a frame.
    fn write_frame(&mut self, frame: &Frame) -> LedResult<()>;
}

/// An open, configured serial port plus the pacing interval for writes.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    port_name: String,
    delay: Duration,
}

impl SerialTransport {
    /// Open and configure the port described by `config`. EACCES surfaces
    /// as [`LedError::PermissionDenied`]; the config is validated first so
    /// a zero delay never reaches the wire.
    pub fn open(config: &SerialConfig) -> LedResult<Self> {
        config.validate()?;
        let port_name = config.port.to_string_lossy().into_owned();
        let mut port = serialport::new(port_name.as_str(), config.baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(Duration::from_secs(1))
            .open()
            .map_err(|e| map_open_error(e, &port_name))?;
        port.write_data_terminal_ready(config.dtr)?;
        port.write_request_to_send(config.rts)?;
        debug!(
            "opened {} at {} baud (dtr={}, rts={}, delay={:?})",
            port_name, config.baud, config.dtr, config.rts, config.delay
        );
        Ok(Self {
            port,
            port_name,
            delay: config.delay,
        })
    }

    /// Write one complete frame, pacing each byte with the configured
    /// delay. A frame is always written whole; a failure mid-frame is fatal
    /// for the owning loop and is never retried here.
    pub fn write_frame(&mut self, frame: &Frame) -> LedResult<()> {
        trace!("{} <- {}", self.port_name, frame);
        for &byte in frame.as_bytes() {
            self.port
                .write_all(&[byte])
                .and_then(|()| self.port.flush())
                .map_err(|source| LedError::ProtocolWrite {
                    port: self.port_name.clone(),
                    source,
                })?;
            std::thread::sleep(self.delay);
        }
        Ok(())
    }

    /// The device path this transport owns.
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl FrameSink for SerialTransport {
    fn write_frame(&mut self, frame: &Frame) -> LedResult<()> {
        SerialTransport::write_frame(self, frame)
    }
}

fn map_open_error(err: serialport::Error, port: &str) -> LedError {
    match err.kind() {
        serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            LedError::PermissionDenied { port: port.into() }
        }
        serialport::ErrorKind::NoDevice => LedError::PortNotFound,
        _ => LedError::Serial(err),
    }
}
