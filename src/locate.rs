//! Serial port discovery.
//!
//! Resolution order:
//!
//! 1. An explicit `--port` hint is validated (exists, is a character device
//!    on Unix) and used unconditionally.
//! 2. Enumerated USB serial devices are filtered against the known bridge
//!    chip table ([`KNOWN_BRIDGES`]). A unique match wins; several matches
//!    are an [`LedError::AmbiguousPort`] so the caller can pick explicitly
//!    rather than us guessing.
//! 3. With no bridge match, fall back to conventional device-name scans:
//!    stable `by-path` aliases first, then `ttyUSB*`, then `ttyACM*`,
//!    taking the lexicographically first entry of the first non-empty
//!    group.
//! 4. No candidate at any stage is [`LedError::PortNotFound`].

use crate::error::{LedError, LedResult};
use log::{debug, info};
use serialport::{SerialPortInfo, SerialPortType};
use std::path::{Path, PathBuf};

/// USB (vid, pid) pairs for the bridge chips the LED module ships with.
/// Both entries are the WCH CH34x family behind different product IDs.
pub const KNOWN_BRIDGES: &[(u16, u16)] = &[
    (0x1A86, 0x7523), // CH340
    (0x1A86, 0x5523), // CH341
];

/// Resolve a concrete device path from an optional explicit hint.
pub fn locate(hint: Option<&Path>) -> LedResult<PathBuf> {
    if let Some(path) = hint {
        return validate_explicit(path);
    }

    let matches = filter_bridges(serialport::available_ports()?);
    match pick_bridge(matches)? {
        Some(port) => {
            info!("matched bridge device {}", port.display());
            return Ok(port);
        }
        None => debug!("no known bridge chip enumerated, falling back to name scan"),
    }

    if let Some(port) = scan_conventional_names("/dev") {
        info!("falling back to {}", port.display());
        return Ok(port);
    }
    Err(LedError::PortNotFound)
}

/// An explicit hint is used unconditionally, but must at least exist and
/// look like a serial device.
fn validate_explicit(path: &Path) -> LedResult<PathBuf> {
    let metadata = std::fs::metadata(path).map_err(|_| LedError::PortNotFound)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if !metadata.file_type().is_char_device() {
            return Err(LedError::PortNotFound);
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;
    Ok(path.to_path_buf())
}

/// Keep the names of enumerated devices whose USB (vid, pid) is in the
/// bridge table. Sorted for deterministic ambiguity reports.
fn filter_bridges(ports: Vec<SerialPortInfo>) -> Vec<String> {
    let mut matches: Vec<String> = ports
        .into_iter()
        .filter(|p| match &p.port_type {
            SerialPortType::UsbPort(info) => KNOWN_BRIDGES.contains(&(info.vid, info.pid)),
            _ => false,
        })
        .map(|p| p.port_name)
        .collect();
    matches.sort();
    matches.dedup();
    matches
}

/// Decide on the filtered matches: a unique match wins, none defers to the
/// name scan, several are ambiguous and the caller must pick explicitly.
fn pick_bridge(matches: Vec<String>) -> LedResult<Option<PathBuf>> {
    match matches.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(PathBuf::from(only.as_str()))),
        _ => Err(LedError::AmbiguousPort(matches)),
    }
}

/// Scan `dev_root` for conventional USB serial names. Returns the first
/// entry of the first non-empty group: by-path aliases, then `ttyUSB*`,
/// then `ttyACM*`.
fn scan_conventional_names(dev_root: &str) -> Option<PathBuf> {
    let by_path = list_sorted(&format!("{dev_root}/serial/by-path"), |name| {
        name.ends_with("-if00-port0")
    });
    if let Some(first) = by_path.into_iter().next() {
        return Some(first);
    }
    for prefix in ["ttyUSB", "ttyACM"] {
        let group = list_sorted(dev_root, |name| name.starts_with(prefix));
        if let Some(first) = group.into_iter().next() {
            return Some(first);
        }
    }
    None
}

fn list_sorted(dir: &str, keep: impl Fn(&str) -> bool) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_str().is_some_and(&keep))
        .map(|e| e.path())
        .collect();
    paths.sort();
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    fn usb(name: &str, vid: u16, pid: u16) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid,
                pid,
                serial_number: None,
                manufacturer: None,
                product: None,
            }),
        }
    }

    #[test]
    fn filter_keeps_only_known_bridge_chips() {
        let matches = filter_bridges(vec![
            usb("/dev/ttyUSB0", 0x1A86, 0x7523),
            usb("/dev/ttyACM0", 0x2341, 0x0043), // Arduino Uno, not a bridge.
            SerialPortInfo {
                port_name: "/dev/ttyS0".to_string(),
                port_type: SerialPortType::Unknown,
            },
        ]);
        assert_eq!(matches, ["/dev/ttyUSB0"]);
    }

    #[test]
    fn unique_bridge_match_is_picked() {
        let matches = filter_bridges(vec![usb("/dev/ttyUSB0", 0x1A86, 0x7523)]);
        assert_eq!(
            pick_bridge(matches).unwrap(),
            Some(PathBuf::from("/dev/ttyUSB0"))
        );
    }

    #[test]
    fn no_bridge_match_defers_to_the_name_scan() {
        let matches = filter_bridges(vec![usb("/dev/ttyACM0", 0x2341, 0x0043)]);
        assert!(matches.is_empty());
        assert_eq!(pick_bridge(matches).unwrap(), None);
    }

    #[test]
    fn two_bridge_devices_without_a_hint_are_ambiguous() {
        let matches = filter_bridges(vec![
            usb("/dev/ttyUSB1", 0x1A86, 0x7523),
            usb("/dev/ttyUSB0", 0x1A86, 0x5523),
        ]);
        match pick_bridge(matches).unwrap_err() {
            LedError::AmbiguousPort(ports) => {
                // Every candidate is reported, sorted, so the caller can
                // pick one with --port.
                assert_eq!(ports, ["/dev/ttyUSB0", "/dev/ttyUSB1"]);
            }
            other => panic!("expected AmbiguousPort, got {other}"),
        }
    }

    #[test]
    fn duplicate_enumerations_of_one_device_are_not_ambiguous() {
        let matches = filter_bridges(vec![
            usb("/dev/ttyUSB0", 0x1A86, 0x7523),
            usb("/dev/ttyUSB0", 0x1A86, 0x7523),
        ]);
        assert_eq!(
            pick_bridge(matches).unwrap(),
            Some(PathBuf::from("/dev/ttyUSB0"))
        );
    }

    #[test]
    fn explicit_hint_must_exist() {
        let err = locate(Some(Path::new("/dev/does-not-exist-ledctl"))).unwrap_err();
        assert!(matches!(err, LedError::PortNotFound));
    }

    #[cfg(unix)]
    #[test]
    fn explicit_hint_must_be_a_character_device() {
        // A regular file is not a serial device even though it exists.
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = locate(Some(file.path())).unwrap_err();
        assert!(matches!(err, LedError::PortNotFound));
    }

    #[test]
    fn name_scan_prefers_usb_over_acm_and_sorts_within_a_group() {
        let dev = tempfile::tempdir().unwrap();
        let root = dev.path().to_str().unwrap();
        for name in ["ttyACM0", "ttyUSB1", "ttyUSB0", "ttyS0"] {
            std::fs::write(dev.path().join(name), b"").unwrap();
        }
        let found = scan_conventional_names(root).unwrap();
        assert_eq!(found, dev.path().join("ttyUSB0"));
    }

    #[test]
    fn name_scan_falls_back_to_acm_when_no_usb() {
        let dev = tempfile::tempdir().unwrap();
        std::fs::write(dev.path().join("ttyACM3"), b"").unwrap();
        let found = scan_conventional_names(dev.path().to_str().unwrap()).unwrap();
        assert_eq!(found, dev.path().join("ttyACM3"));
    }

    #[test]
    fn name_scan_prefers_stable_by_path_aliases() {
        let dev = tempfile::tempdir().unwrap();
        let by_path = dev.path().join("serial/by-path");
        std::fs::create_dir_all(&by_path).unwrap();
        std::fs::write(by_path.join("pci-0000:00:14.0-usb-0:2:1.0-if00-port0"), b"").unwrap();
        std::fs::write(dev.path().join("ttyUSB0"), b"").unwrap();
        let found = scan_conventional_names(dev.path().to_str().unwrap()).unwrap();
        assert!(found.starts_with(&by_path));
    }

    #[test]
    fn name_scan_handles_empty_dev_tree() {
        let dev = tempfile::tempdir().unwrap();
        assert!(scan_conventional_names(dev.path().to_str().unwrap()).is_none());
    }

    #[test]
    fn bridge_table_has_two_distinct_identifier_pairs() {
        assert_eq!(KNOWN_BRIDGES.len(), 2);
        assert_ne!(KNOWN_BRIDGES[0], KNOWN_BRIDGES[1]);
    }
}
