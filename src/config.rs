//! Configuration types for the serial link and for pattern parameters.
//!
//! Both structs are validated up front, before any serial I/O is attempted:
//! out-of-range values are an [`LedError::InvalidConfig`], never silently
//! clamped or coerced. Once a pattern loop has started its configuration is
//! immutable; changing parameters means stopping and starting a new loop.

use crate::error::{LedError, LedResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default baud rate for the CH340-bridged LED controller.
pub const BAUD_DEFAULT: u32 = 10_000;

/// Default inter-byte pacing delay. The microcontroller samples its UART at
/// a fixed rate; shorter delays drop bytes, longer ones add visible lag.
pub const IB_DELAY_DEFAULT: Duration = Duration::from_millis(5);

/// Serial link configuration: which device, at what rate, with which line
/// control state, and how hard to pace individual bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Resolved device path, e.g. `/dev/ttyUSB0`.
    pub port: PathBuf,
    /// Baud rate (default 10000).
    pub baud: u32,
    /// Assert DTR after open (default true).
    pub dtr: bool,
    /// Assert RTS after open (default false).
    pub rts: bool,
    /// Inter-byte pacing interval, strictly positive (default 5 ms).
    pub delay: Duration,
}

impl SerialConfig {
    /// Build a config for `port` with the documented defaults.
    pub fn new(port: impl Into<PathBuf>) -> Self {
        Self {
            port: port.into(),
            baud: BAUD_DEFAULT,
            dtr: true,
            rts: false,
            delay: IB_DELAY_DEFAULT,
        }
    }

    /// Reject a non-positive pacing delay or a zero baud rate.
    pub fn validate(&self) -> LedResult<()> {
        if self.delay.is_zero() {
            return Err(LedError::InvalidConfig(
                "inter-byte delay must be > 0".into(),
            ));
        }
        if self.baud == 0 {
            return Err(LedError::InvalidConfig("baud rate must be > 0".into()));
        }
        Ok(())
    }
}

/// Parameters shared by all lighting modes. Not every field applies to every
/// mode; a mode's frame rule ignores the fields it does not use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Human brightness level, 1 (dim) to 5 (bright).
    pub brightness: u8,
    /// Human speed level, 1 (slow) to 5 (fast).
    pub speed: u8,
    /// Seconds per envelope cycle, overrides the per-speed preset
    /// (`breathered` only).
    pub period: Option<f64>,
    /// Raw firmware mode byte override for protocol experimentation.
    pub mode_num: Option<u8>,
    /// Toggle frequency in Hz (`alarm` only).
    pub hz: Option<f64>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            brightness: 3,
            speed: 3,
            period: None,
            mode_num: None,
            hz: None,
        }
    }
}

impl PatternConfig {
    /// Validate every populated field. Runs before the encoder ever sees the
    /// config, so frame rules can assume in-range values.
    pub fn validate(&self) -> LedResult<()> {
        if !(1..=5).contains(&self.brightness) {
            return Err(LedError::InvalidConfig(format!(
                "brightness must be in 1..5, got {}",
                self.brightness
            )));
        }
        if !(1..=5).contains(&self.speed) {
            return Err(LedError::InvalidConfig(format!(
                "speed must be in 1..5, got {}",
                self.speed
            )));
        }
        if let Some(period) = self.period {
            if !period.is_finite() || period <= 0.0 {
                return Err(LedError::InvalidConfig(format!(
                    "period must be positive and finite, got {period}"
                )));
            }
        }
        if let Some(hz) = self.hz {
            if !hz.is_finite() || hz <= 0.0 {
                return Err(LedError::InvalidConfig(format!(
                    "hz must be positive and finite, got {hz}"
                )));
            }
        }
        Ok(())
    }
}
