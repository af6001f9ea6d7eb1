//! Wire-level properties of the protocol encoder.

use ledctl::protocol::{self, mode_byte, still_strobe_interval, Cadence, Mode};
use ledctl::PatternConfig;
use std::time::Duration;

#[test]
fn every_builtin_level_combination_produces_a_valid_frame() {
    for brightness in 1..=5u8 {
        for speed in 1..=5u8 {
            let config = PatternConfig {
                brightness,
                speed,
                ..Default::default()
            };
            for mode in [Mode::Cycle, Mode::Rainbow, Mode::Breathing] {
                let frames = protocol::encode(mode, &config, 0).unwrap();
                assert_eq!(frames.len(), 1, "{mode} must emit exactly one frame");
                let bytes = frames[0].as_bytes();
                assert_eq!(bytes.len(), 5);
                assert_eq!(bytes[0], 0xFA);
                // Human 1..5 maps to inverted wire bytes 0x05..0x01.
                assert_eq!(bytes[2], 0x06 - brightness);
                assert_eq!(bytes[3], 0x06 - speed);
                let sum = bytes[0]
                    .wrapping_add(bytes[1])
                    .wrapping_add(bytes[2])
                    .wrapping_add(bytes[3]);
                assert_eq!(bytes[4], sum, "checksum mismatch for {mode}");
            }
        }
    }
}

#[test]
fn levels_outside_the_range_are_rejected_for_every_mode() {
    for mode in [
        Mode::Off,
        Mode::Cycle,
        Mode::Rainbow,
        Mode::Breathing,
        Mode::StillRed,
        Mode::StillBlue,
        Mode::BreatheRed,
        Mode::Alarm,
    ] {
        let config = PatternConfig {
            brightness: 0,
            ..Default::default()
        };
        assert!(protocol::encode(mode, &config, 0).is_err());
        let config = PatternConfig {
            speed: 6,
            ..Default::default()
        };
        assert!(protocol::encode(mode, &config, 0).is_err());
    }
}

#[test]
fn off_is_idempotent_at_the_frame_level() {
    let config = PatternConfig::default();
    let first = protocol::encode(Mode::Off, &config, 0).unwrap();
    let second = protocol::encode(Mode::Off, &config, 0).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].mode(), mode_byte::OFF);
}

#[test]
fn still_strobe_interval_is_twice_the_interbyte_delay() {
    // Implied toggle frequency 1/(2*delay): 5 ms pacing -> 10 ms interval.
    assert_eq!(
        still_strobe_interval(Duration::from_millis(5)),
        Duration::from_millis(10)
    );
    let config = PatternConfig::default();
    for mode in [Mode::StillRed, Mode::StillBlue] {
        match (mode.rule().cadence)(&config, Duration::from_millis(5)) {
            Cadence::Periodic(d) => assert_eq!(d, Duration::from_millis(10)),
            Cadence::OneShot => panic!("{mode} must strobe"),
        }
    }
}

#[test]
fn one_shot_and_long_running_modes_split_as_documented() {
    for mode in [Mode::Off, Mode::Cycle, Mode::Rainbow, Mode::Breathing] {
        assert!(mode.is_one_shot());
        assert_eq!(
            (mode.rule().cadence)(&PatternConfig::default(), Duration::from_millis(5)),
            Cadence::OneShot
        );
    }
    for mode in [Mode::StillRed, Mode::StillBlue, Mode::BreatheRed, Mode::Alarm] {
        assert!(!mode.is_one_shot());
        assert!(matches!(
            (mode.rule().cadence)(&PatternConfig::default(), Duration::from_millis(5)),
            Cadence::Periodic(_)
        ));
    }
}

#[test]
fn alarm_hz_sets_the_half_cycle_interval() {
    let config = PatternConfig {
        hz: Some(2.0),
        ..Default::default()
    };
    match (Mode::Alarm.rule().cadence)(&config, Duration::from_millis(5)) {
        Cadence::Periodic(d) => assert_eq!(d, Duration::from_millis(250)),
        Cadence::OneShot => panic!("alarm must toggle"),
    }
}
