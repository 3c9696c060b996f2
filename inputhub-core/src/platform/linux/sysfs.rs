// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Device metadata and battery state from `/sys/class/input`.

use super::ioctl::input_id;
use crate::state::{BatteryData, PowerStatus};

use std::fs;
use std::path::{Path, PathBuf};

/// Battery of a device, located under `power_supply` of its parent.
#[derive(Debug, Clone)]
pub struct Battery {
    capacity: PathBuf,
    status: PathBuf,
}

impl Battery {
    /// `syspath` points to `/sys/class/input/eventXX`. First "device" is symlink to inputXX,
    /// second to the actual device root.
    pub fn find(syspath: &Path) -> Option<Self> {
        let supplies = syspath.join("device/device/power_supply");
        let entry = fs::read_dir(supplies).ok()?.flatten().next()?;

        let battery = Battery {
            capacity: entry.path().join("capacity"),
            status: entry.path().join("status"),
        };
        if battery.capacity.exists() {
            Some(battery)
        } else {
            None
        }
    }

    pub fn read(&self) -> Option<BatteryData> {
        let capacity = fs::read_to_string(&self.capacity).ok()?;
        let level = match capacity.trim().parse::<u8>() {
            Ok(level) => level.min(100),
            Err(_) => {
                error!("Failed to parse battery capacity: {}", capacity.trim());
                return None;
            }
        };

        let status = fs::read_to_string(&self.status)
            .map(|s| parse_status(s.trim()))
            .unwrap_or_default();

        Some(BatteryData {
            level,
            max_level: 100,
            status,
        })
    }
}

pub fn parse_status(status: &str) -> PowerStatus {
    match status {
        "Charging" => PowerStatus::Charging,
        "Discharging" => PowerStatus::Discharging,
        "Full" | "Not charging" => PowerStatus::Charged,
        "Unknown" | "" => PowerStatus::Unknown,
        s => {
            warn!("Unknown battery status value: {}", s);
            PowerStatus::Unknown
        }
    }
}

/// USB manufacturer string of the device owning input node `syspath`.
pub fn manufacturer(syspath: &Path) -> Option<String> {
    read_attr(&syspath.join("device/device/../manufacturer"))
}

/// Serial number reported by the USB device.
pub fn serial(syspath: &Path) -> Option<String> {
    read_attr(&syspath.join("device/device/../serial"))
}

/// Bus, vendor, product and version of input node `syspath`.
pub fn input_id(syspath: &Path) -> Option<input_id> {
    let id = syspath.join("device/id");
    let read = |name: &str| parse_hex(&fs::read_to_string(id.join(name)).ok()?);

    Some(input_id {
        bustype: read("bustype")?,
        vendor: read("vendor")?,
        product: read("product")?,
        version: read("version")?,
    })
}

/// Name of a node that belongs to the same input device as `syspath`, for example `js0` for
/// `event5`.
pub fn sibling(syspath: &Path, prefix: &str) -> Option<String> {
    fs::read_dir(syspath.join("device"))
        .ok()?
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .find(|name| is_node_name(name, prefix))
}

/// `name` is `prefix` followed by a number.
pub fn is_node_name(name: &str, prefix: &str) -> bool {
    match name.strip_prefix(prefix) {
        Some(num) => !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

fn parse_hex(value: &str) -> Option<u16> {
    u16::from_str_radix(value.trim(), 16).ok()
}

fn read_attr(path: &Path) -> Option<String> {
    let value = fs::read_to_string(path).ok()?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings() {
        assert_eq!(parse_status("Charging"), PowerStatus::Charging);
        assert_eq!(parse_status("Discharging"), PowerStatus::Discharging);
        assert_eq!(parse_status("Not charging"), PowerStatus::Charged);
        assert_eq!(parse_status("Full"), PowerStatus::Charged);
        assert_eq!(parse_status("Exploding"), PowerStatus::Unknown);
    }

    #[test]
    fn node_names() {
        assert!(is_node_name("event12", "event"));
        assert!(is_node_name("js0", "js"));
        assert!(!is_node_name("event", "event"));
        assert!(!is_node_name("mouse0", "event"));
        assert!(!is_node_name("event1a", "event"));
    }

    #[test]
    fn hex_attributes() {
        assert_eq!(parse_hex("045e\n"), Some(0x045e));
        assert_eq!(parse_hex("zz"), None);
    }

    #[test]
    fn missing_battery() {
        assert!(Battery::find(Path::new("/nonexistent/input/event99")).is_none());
        assert!(manufacturer(Path::new("/nonexistent/input/event99")).is_none());
    }
}
