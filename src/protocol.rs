//! Wire protocol for the vendor LED controller.
//!
//! The controller speaks a fixed 5-byte command frame over the UART bridge:
//!
//! ```text
//! [0xFA] [mode] [brightness] [speed] [checksum]
//! ```
//!
//! where `checksum = (0xFA + mode + brightness + speed) & 0xFF` and the
//! human-facing 1..5 levels are inverted on the wire (`1 -> 0x05`,
//! `5 -> 0x01`). The byte layout is an opaque constant table recovered from
//! bus captures of the vendor firmware, not derivable from first principles.
//!
//! Built-in modes are firmware-native: a single frame selects them and the
//! firmware free-runs the animation. The hack modes (`stillred`,
//! `stillblue`, `breathered`, `alarm`) are synthesized here from built-in
//! primitives by re-issuing or ramping frames on a cadence; the
//! [`PatternEngine`](crate::engine::PatternEngine) supplies the repetition.
//!
//! Every mode owns one entry in [`MODE_RULES`], pairing a frame rule with a
//! cadence rule. Adding a mode means adding one table entry.

use crate::config::PatternConfig;
use crate::error::{LedError, LedResult};
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Frame preamble byte.
pub const PREAMBLE: u8 = 0xFA;

/// Firmware-native mode bytes, confirmed against capture data.
pub mod mode_byte {
    /// Color rainbow sweep.
    pub const RAINBOW: u8 = 0x01;
    /// Whole-spectrum breathing.
    pub const BREATH: u8 = 0x02;
    /// Color cycle (restarts on red).
    pub const CYCLE: u8 = 0x03;
    /// All LEDs off.
    pub const OFF: u8 = 0x04;
    /// Firmware auto-demo.
    pub const AUTO: u8 = 0x05;
}

/// Number of envelope steps per `breathered` cycle.
const BREATHE_STEPS: u64 = 20;

/// Measured `breathered` period presets in seconds, indexed by speed 1..5.
const BREATHE_PERIODS: [f64; 5] = [5.0, 4.0, 3.0, 1.8, 1.35];

/// Default `alarm` toggle frequency when `--hz` is not given.
const ALARM_HZ_DEFAULT: f64 = 1.0;

/// Map a human 1..5 level to its inverted wire byte (`1 -> 0x05`).
///
/// Callers must validate range first; this is checked again in debug builds.
fn level_to_wire(level: u8) -> u8 {
    debug_assert!((1..=5).contains(&level));
    0x06 - level
}

/// One complete, self-contained 5-byte command. Frames are only ever written
/// whole; two logical frames are never interleaved on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame([u8; 5]);

impl Frame {
    /// Build a frame from a raw mode byte and human 1..5 levels.
    pub fn build(mode: u8, brightness: u8, speed: u8) -> Self {
        let bw = level_to_wire(brightness);
        let sw = level_to_wire(speed);
        Self([PREAMBLE, mode, bw, sw, checksum(mode, bw, sw)])
    }

    /// The raw bytes, in wire order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Mode byte field.
    pub fn mode(&self) -> u8 {
        self.0[1]
    }

    /// Brightness field as the wire byte (inverted).
    pub fn brightness_wire(&self) -> u8 {
        self.0[2]
    }

    /// Speed field as the wire byte (inverted).
    pub fn speed_wire(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X} {:02X} {:02X} {:02X} {:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4]
        )
    }
}

/// Additive checksum over preamble and payload fields.
pub fn checksum(mode: u8, brightness_wire: u8, speed_wire: u8) -> u8 {
    PREAMBLE
        .wrapping_add(mode)
        .wrapping_add(brightness_wire)
        .wrapping_add(speed_wire)
}

/// Every lighting mode this tool can drive, firmware-native and synthesized
/// alike. A closed set: dispatch goes through [`MODE_RULES`], not a trait
/// hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// One-shot: all LEDs off.
    Off,
    /// Firmware color cycle.
    Cycle,
    /// Firmware rainbow sweep.
    Rainbow,
    /// Firmware breathing.
    Breathing,
    /// Emulated: red pinned by strobing the cycle command.
    StillRed,
    /// Emulated: blue pinned by strobing the rainbow command.
    StillBlue,
    /// Emulated: single-color breathing via a sinusoidal brightness ramp.
    BreatheRed,
    /// Emulated: on/off blink at a configurable rate.
    Alarm,
}

impl Mode {
    /// The firmware mode byte this rule is built on, before any `--mode-num`
    /// override.
    pub fn base_mode_byte(self) -> u8 {
        match self {
            Mode::Off => mode_byte::OFF,
            Mode::Cycle | Mode::StillRed | Mode::BreatheRed => mode_byte::CYCLE,
            Mode::Rainbow | Mode::StillBlue => mode_byte::RAINBOW,
            Mode::Breathing => mode_byte::BREATH,
            // Alarm alternates cycle and off frames; cycle is its base.
            Mode::Alarm => mode_byte::CYCLE,
        }
    }

    /// True for firmware-native selections that free-run after one frame.
    pub fn is_one_shot(self) -> bool {
        matches!(self, Mode::Off | Mode::Cycle | Mode::Rainbow | Mode::Breathing)
    }

    /// The mode's entry in the rule table.
    pub fn rule(self) -> &'static ModeRule {
        match MODE_RULES.iter().find(|r| r.mode == self) {
            Some(rule) => rule,
            // The table is total over the enum; see the coverage test.
            None => unreachable!("no rule for mode {self}"),
        }
    }

    /// Stable lowercase name, matching the CLI spelling.
    pub fn name(self) -> &'static str {
        match self {
            Mode::Off => "off",
            Mode::Cycle => "cycle",
            Mode::Rainbow => "rainbow",
            Mode::Breathing => "breathing",
            Mode::StillRed => "stillred",
            Mode::StillBlue => "stillblue",
            Mode::BreatheRed => "breathered",
            Mode::Alarm => "alarm",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mode {
    type Err = LedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Mode::Off),
            "cycle" => Ok(Mode::Cycle),
            "rainbow" => Ok(Mode::Rainbow),
            "breathing" => Ok(Mode::Breathing),
            "stillred" => Ok(Mode::StillRed),
            "stillblue" => Ok(Mode::StillBlue),
            "breathered" => Ok(Mode::BreatheRed),
            "alarm" => Ok(Mode::Alarm),
            other => Err(LedError::InvalidConfig(format!("unknown mode '{other}'"))),
        }
    }
}

/// How often the engine should re-invoke a mode's frame rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Send the tick-0 frames once and terminate; the firmware free-runs.
    OneShot,
    /// Re-invoke the frame rule every interval until cancelled.
    Periodic(Duration),
}

/// One row of the mode dispatch table: how to build frames for a tick and on
/// what cadence to repeat them.
pub struct ModeRule {
    /// The mode this row serves.
    pub mode: Mode,
    /// Frame rule: pure in `(config, tick)`.
    pub frames: fn(&PatternConfig, u64) -> Vec<Frame>,
    /// Cadence rule: may depend on the link's inter-byte delay (still modes
    /// strobe relative to it).
    pub cadence: fn(&PatternConfig, Duration) -> Cadence,
}

/// Strobe interval for the still-color modes: one toggle per `2 * delay`,
/// i.e. an implied frequency of `1 / (2 * delay)`.
pub fn still_strobe_interval(delay: Duration) -> Duration {
    delay * 2
}

fn native_frame(config: &PatternConfig, base: u8) -> Vec<Frame> {
    let mode = config.mode_num.unwrap_or(base);
    vec![Frame::build(mode, config.brightness, config.speed)]
}

fn frames_off(_config: &PatternConfig, _tick: u64) -> Vec<Frame> {
    // Brightness/speed are irrelevant for OFF; send a fixed safe frame so
    // repeated invocations are byte-identical.
    vec![Frame::build(mode_byte::OFF, 1, 1)]
}

fn frames_native_cycle(config: &PatternConfig, _tick: u64) -> Vec<Frame> {
    native_frame(config, mode_byte::CYCLE)
}

fn frames_native_rainbow(config: &PatternConfig, _tick: u64) -> Vec<Frame> {
    native_frame(config, mode_byte::RAINBOW)
}

fn frames_native_breath(config: &PatternConfig, _tick: u64) -> Vec<Frame> {
    native_frame(config, mode_byte::BREATH)
}

fn frames_still(config: &PatternConfig, base: u8) -> Vec<Frame> {
    // Restarting the animation faster than the eye can follow pins the
    // first hue; speed is forced slow so each restart lands on that hue.
    let mode = config.mode_num.unwrap_or(base);
    vec![Frame::build(mode, config.brightness, 1)]
}

fn frames_still_red(config: &PatternConfig, _tick: u64) -> Vec<Frame> {
    frames_still(config, mode_byte::CYCLE)
}

fn frames_still_blue(config: &PatternConfig, _tick: u64) -> Vec<Frame> {
    frames_still(config, mode_byte::RAINBOW)
}

/// Sinusoidal brightness level for `breathered` at a given tick: ramps
/// between 1 and the configured brightness over [`BREATHE_STEPS`] ticks.
fn breathe_level(brightness: u8, tick: u64) -> u8 {
    let phase = TAU * (tick % BREATHE_STEPS) as f64 / BREATHE_STEPS as f64;
    let span = f64::from(brightness - 1);
    let level = 1.0 + span * 0.5 * (1.0 - phase.cos());
    // Rounding stays within 1..=brightness by construction.
    level.round() as u8
}

fn frames_breathe_red(config: &PatternConfig, tick: u64) -> Vec<Frame> {
    let mode = config.mode_num.unwrap_or(mode_byte::CYCLE);
    vec![Frame::build(
        mode,
        breathe_level(config.brightness, tick),
        1,
    )]
}

fn frames_alarm(config: &PatternConfig, tick: u64) -> Vec<Frame> {
    if tick % 2 == 0 {
        let mode = config.mode_num.unwrap_or(mode_byte::CYCLE);
        vec![Frame::build(mode, config.brightness, config.speed)]
    } else {
        vec![Frame::build(mode_byte::OFF, 1, 1)]
    }
}

fn cadence_one_shot(_config: &PatternConfig, _delay: Duration) -> Cadence {
    Cadence::OneShot
}

fn cadence_still(_config: &PatternConfig, delay: Duration) -> Cadence {
    Cadence::Periodic(still_strobe_interval(delay))
}

fn cadence_breathe(config: &PatternConfig, _delay: Duration) -> Cadence {
    let period = config
        .period
        .unwrap_or_else(|| BREATHE_PERIODS[usize::from(config.speed - 1)]);
    Cadence::Periodic(Duration::from_secs_f64(period / BREATHE_STEPS as f64))
}

fn cadence_alarm(config: &PatternConfig, _delay: Duration) -> Cadence {
    let hz = config.hz.unwrap_or(ALARM_HZ_DEFAULT);
    // Two ticks (on + off) per blink cycle.
    Cadence::Periodic(Duration::from_secs_f64(1.0 / (2.0 * hz)))
}

/// The mode dispatch table. One row per [`Mode`] variant.
pub static MODE_RULES: &[ModeRule] = &[
    ModeRule {
        mode: Mode::Off,
        frames: frames_off,
        cadence: cadence_one_shot,
    },
    ModeRule {
        mode: Mode::Cycle,
        frames: frames_native_cycle,
        cadence: cadence_one_shot,
    },
    ModeRule {
        mode: Mode::Rainbow,
        frames: frames_native_rainbow,
        cadence: cadence_one_shot,
    },
    ModeRule {
        mode: Mode::Breathing,
        frames: frames_native_breath,
        cadence: cadence_one_shot,
    },
    ModeRule {
        mode: Mode::StillRed,
        frames: frames_still_red,
        cadence: cadence_still,
    },
    ModeRule {
        mode: Mode::StillBlue,
        frames: frames_still_blue,
        cadence: cadence_still,
    },
    ModeRule {
        mode: Mode::BreatheRed,
        frames: frames_breathe_red,
        cadence: cadence_breathe,
    },
    ModeRule {
        mode: Mode::Alarm,
        frames: frames_alarm,
        cadence: cadence_alarm,
    },
];

/// Encode the frames for `mode` at `tick`. Validates the config first so
/// out-of-range levels never reach a frame rule.
pub fn encode(mode: Mode, config: &PatternConfig, tick: u64) -> LedResult<Vec<Frame>> {
    config.validate()?;
    Ok((mode.rule().frames)(config, tick))
}
