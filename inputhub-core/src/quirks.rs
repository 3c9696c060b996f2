// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Vendor/product keyed corrections for devices that do not report what they are.
//!
//! Entries can be added from text, one per line or separated by commas:
//!
//! ```text
//! 045e:0719=gamepad:connect_if_nonzero
//! 044f:b108=flight_stick:centered_throttle|reversed_throttle
//! ```
//!
//! Ids are hexadecimal. The class may be `unknown` to keep the detected class.

use bitflags::bitflags;

use crate::device::DeviceClass;

use std::error::Error;
use std::fmt::{self, Display, Formatter};

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Quirks: u16 {
        /// Right stick is reported on Z/RZ instead of RX/RY.
        const RSTICK_FROM_Z = 1 << 0;
        /// Throttle rests in the middle of its range.
        const CENTERED_THROTTLE = 1 << 1;
        const REVERSED_THROTTLE = 1 << 2;
        /// Device may be a phantom slot; it stays inactive until it reports input.
        const CONNECT_IF_NONZERO = 1 << 3;
        /// Twist axis is reported as throttle and throttle as slider.
        const RUDDER_FROM_THROTTLE = 1 << 4;
        const STEAM_CONTROLLER = 1 << 5;
        /// Right stick X and Y are exchanged.
        const RIGHT_AXES_SWAPPED = 1 << 6;
        /// Triggers are digital only.
        const NO_ANALOG_TRIGGERS = 1 << 7;
        /// Face buttons are numbered in a different order.
        const ALT_BUTTON_MAPPING = 1 << 8;
    }
}

const FLAG_NAMES: &[(&str, Quirks)] = &[
    ("rstick_from_z", Quirks::RSTICK_FROM_Z),
    ("centered_throttle", Quirks::CENTERED_THROTTLE),
    ("reversed_throttle", Quirks::REVERSED_THROTTLE),
    ("connect_if_nonzero", Quirks::CONNECT_IF_NONZERO),
    ("rudder_from_throttle", Quirks::RUDDER_FROM_THROTTLE),
    ("steam_controller", Quirks::STEAM_CONTROLLER),
    ("right_axes_swapped", Quirks::RIGHT_AXES_SWAPPED),
    ("no_analog_triggers", Quirks::NO_ANALOG_TRIGGERS),
    ("alt_button_mapping", Quirks::ALT_BUTTON_MAPPING),
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QuirkEntry {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Class override. `Unknown` keeps the detected class.
    pub class: DeviceClass,
    pub quirks: Quirks,
}

impl QuirkEntry {
    pub const fn new(vendor_id: u16, product_id: u16, class: DeviceClass, quirks: Quirks) -> Self {
        QuirkEntry {
            vendor_id,
            product_id,
            class,
            quirks,
        }
    }
}

const BUILTIN: &[QuirkEntry] = &[
    // Nvidia Shield controller
    QuirkEntry::new(0x0955, 0x7214, DeviceClass::Gamepad, Quirks::RSTICK_FROM_Z),
    // Thrustmaster T.Flight Hotas X
    QuirkEntry::new(
        0x044f,
        0xb108,
        DeviceClass::FlightStick,
        Quirks::CENTERED_THROTTLE
            .union(Quirks::REVERSED_THROTTLE)
            .union(Quirks::RUDDER_FROM_THROTTLE),
    ),
    // Xbox 360 wireless receiver, reports four slots all the time
    QuirkEntry::new(
        0x045e,
        0x0719,
        DeviceClass::Gamepad,
        Quirks::CONNECT_IF_NONZERO,
    ),
    QuirkEntry::new(0x28de, 0x1102, DeviceClass::Unknown, Quirks::STEAM_CONTROLLER),
    QuirkEntry::new(0x28de, 0x1142, DeviceClass::Unknown, Quirks::STEAM_CONTROLLER),
    // Logitech Chillstream
    QuirkEntry::new(
        0x0f30,
        0x0111,
        DeviceClass::Gamepad,
        Quirks::RSTICK_FROM_Z.union(Quirks::RIGHT_AXES_SWAPPED),
    ),
    // DragonRise based pads
    QuirkEntry::new(
        0x0079,
        0x0006,
        DeviceClass::Gamepad,
        Quirks::NO_ANALOG_TRIGGERS.union(Quirks::ALT_BUTTON_MAPPING),
    ),
    // 8BitDo
    QuirkEntry::new(0x2dc8, 0x9001, DeviceClass::Gamepad, Quirks::RSTICK_FROM_Z),
    // PS2 to USB adapter
    QuirkEntry::new(
        0x0810,
        0x0001,
        DeviceClass::Gamepad,
        Quirks::NO_ANALOG_TRIGGERS
            .union(Quirks::ALT_BUTTON_MAPPING)
            .union(Quirks::RSTICK_FROM_Z)
            .union(Quirks::RIGHT_AXES_SWAPPED),
    ),
    // SNES style USB pad
    QuirkEntry::new(
        0x0810,
        0xe501,
        DeviceClass::Gamepad,
        Quirks::NO_ANALOG_TRIGGERS.union(Quirks::ALT_BUTTON_MAPPING),
    ),
    // 3Dconnexion devices sold under the Logitech id
    QuirkEntry::new(0x046d, 0xc623, DeviceClass::SpatialMouse, Quirks::empty()),
    QuirkEntry::new(0x046d, 0xc625, DeviceClass::SpatialMouse, Quirks::empty()),
    QuirkEntry::new(0x046d, 0xc626, DeviceClass::SpatialMouse, Quirks::empty()),
    QuirkEntry::new(0x046d, 0xc627, DeviceClass::SpatialMouse, Quirks::empty()),
    QuirkEntry::new(0x046d, 0xc628, DeviceClass::SpatialMouse, Quirks::empty()),
    QuirkEntry::new(0x046d, 0xc629, DeviceClass::SpatialMouse, Quirks::empty()),
    QuirkEntry::new(0x046d, 0xc62b, DeviceClass::SpatialMouse, Quirks::empty()),
];

/// Ordered collection of quirk entries. Later entries take precedence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuirkTable {
    entries: Vec<QuirkEntry>,
}

impl QuirkTable {
    /// Table with entries for known nonstandard hardware.
    pub fn builtin() -> Self {
        QuirkTable {
            entries: BUILTIN.to_vec(),
        }
    }

    pub fn empty() -> Self {
        QuirkTable {
            entries: Vec::new(),
        }
    }

    pub fn insert(&mut self, entry: QuirkEntry) {
        self.entries.push(entry);
    }

    /// Parses `text` and appends its entries. Nothing is added if any entry is invalid.
    pub fn extend_from_str(&mut self, text: &str) -> Result<(), ParseQuirkError> {
        let parsed = parse_entries(text)?;
        self.entries.extend(parsed);
        Ok(())
    }

    pub fn lookup(&self, vendor_id: u16, product_id: u16) -> Option<&QuirkEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.vendor_id == vendor_id && e.product_id == product_id)
    }

    /// Flags for the device, empty if it has no entry.
    pub fn quirks(&self, vendor_id: u16, product_id: u16) -> Quirks {
        self.lookup(vendor_id, product_id)
            .map_or(Quirks::empty(), |e| e.quirks)
    }

    /// Class override for the device, if any.
    pub fn class(&self, vendor_id: u16, product_id: u16) -> Option<DeviceClass> {
        self.lookup(vendor_id, product_id)
            .map(|e| e.class)
            .filter(|c| *c != DeviceClass::Unknown)
    }

    pub fn entries(&self) -> &[QuirkEntry] {
        &self.entries
    }
}

impl Default for QuirkTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Parses quirk entries from text.
pub fn parse_entries(text: &str) -> Result<Vec<QuirkEntry>, ParseQuirkError> {
    text.split(|c: char| c == ',' || c == '\n')
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.starts_with('#'))
        .map(parse_entry)
        .collect()
}

fn parse_entry(entry: &str) -> Result<QuirkEntry, ParseQuirkError> {
    let (ids, rest) = entry
        .split_once('=')
        .ok_or_else(|| ParseQuirkError::new(entry, ParseQuirkErrorKind::MissingIds))?;
    let (vendor, product) = ids
        .trim()
        .split_once(':')
        .ok_or_else(|| ParseQuirkError::new(entry, ParseQuirkErrorKind::MissingIds))?;

    let parse_id = |s: &str| {
        u16::from_str_radix(s.trim(), 16)
            .map_err(|_| ParseQuirkError::new(entry, ParseQuirkErrorKind::InvalidId(s.to_owned())))
    };
    let vendor_id = parse_id(vendor)?;
    let product_id = parse_id(product)?;

    let (class, flags) = match rest.split_once(':') {
        Some((class, flags)) => (class, Some(flags)),
        None => (rest, None),
    };
    let class = class.trim().parse::<DeviceClass>().map_err(|_| {
        ParseQuirkError::new(entry, ParseQuirkErrorKind::UnknownClass(class.to_owned()))
    })?;

    let mut quirks = Quirks::empty();
    for flag in flags.into_iter().flat_map(|f| f.split('|')).map(str::trim) {
        if flag.is_empty() {
            continue;
        }

        let (_, value) = FLAG_NAMES
            .iter()
            .find(|(name, _)| *name == flag)
            .ok_or_else(|| {
                ParseQuirkError::new(entry, ParseQuirkErrorKind::UnknownFlag(flag.to_owned()))
            })?;
        quirks |= *value;
    }

    Ok(QuirkEntry {
        vendor_id,
        product_id,
        class,
        quirks,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseQuirkError {
    entry: String,
    kind: ParseQuirkErrorKind,
}

impl ParseQuirkError {
    fn new(entry: &str, kind: ParseQuirkErrorKind) -> Self {
        ParseQuirkError {
            entry: entry.to_owned(),
            kind,
        }
    }

    pub fn kind(&self) -> &ParseQuirkErrorKind {
        &self.kind
    }

    /// Entry that could not be parsed.
    pub fn entry(&self) -> &str {
        &self.entry
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseQuirkErrorKind {
    MissingIds,
    InvalidId(String),
    UnknownClass(String),
    UnknownFlag(String),
}

impl Display for ParseQuirkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParseQuirkErrorKind::MissingIds => {
                write!(f, "expected \"vendor:product=class\" in {:?}", self.entry)
            }
            ParseQuirkErrorKind::InvalidId(id) => {
                write!(f, "invalid hexadecimal id {:?} in {:?}", id, self.entry)
            }
            ParseQuirkErrorKind::UnknownClass(class) => {
                write!(f, "unknown device class {:?} in {:?}", class, self.entry)
            }
            ParseQuirkErrorKind::UnknownFlag(flag) => {
                write!(f, "unknown quirk {:?} in {:?}", flag, self.entry)
            }
        }
    }
}

impl Error for ParseQuirkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        let table = QuirkTable::builtin();
        assert_eq!(table.quirks(0x045e, 0x0719), Quirks::CONNECT_IF_NONZERO);
        assert!(table
            .quirks(0x044f, 0xb108)
            .contains(Quirks::CENTERED_THROTTLE | Quirks::REVERSED_THROTTLE));
        assert_eq!(table.class(0x046d, 0xc626), Some(DeviceClass::SpatialMouse));
        assert_eq!(table.class(0x28de, 0x1142), None);
        assert_eq!(table.quirks(0x1234, 0x5678), Quirks::empty());
        assert!(QuirkTable::empty().lookup(0x045e, 0x0719).is_none());
    }

    #[test]
    fn later_entries_win() {
        let mut table = QuirkTable::builtin();
        table.insert(QuirkEntry::new(
            0x045e,
            0x0719,
            DeviceClass::Unknown,
            Quirks::empty(),
        ));
        assert_eq!(table.quirks(0x045e, 0x0719), Quirks::empty());
    }

    #[test]
    fn parse_text() {
        let entries = parse_entries(
            "045e:0719=gamepad:connect_if_nonzero,
             044F:B108=flight_stick:centered_throttle|reversed_throttle
             # comment
             1234:abcd=unknown",
        )
        .unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].quirks, Quirks::CONNECT_IF_NONZERO);
        assert_eq!(entries[1].vendor_id, 0x044f);
        assert_eq!(entries[1].product_id, 0xb108);
        assert_eq!(entries[1].class, DeviceClass::FlightStick);
        assert_eq!(
            entries[1].quirks,
            Quirks::CENTERED_THROTTLE | Quirks::REVERSED_THROTTLE
        );
        assert_eq!(entries[2].quirks, Quirks::empty());
    }

    #[test]
    fn parse_errors() {
        let kind = |s: &str| parse_entries(s).unwrap_err().kind().clone();

        assert_eq!(kind("gamepad"), ParseQuirkErrorKind::MissingIds);
        assert_eq!(kind("045e=gamepad"), ParseQuirkErrorKind::MissingIds);
        assert_eq!(
            kind("045g:0719=gamepad"),
            ParseQuirkErrorKind::InvalidId("045g".to_owned())
        );
        assert_eq!(
            kind("045e:0719=pad"),
            ParseQuirkErrorKind::UnknownClass("pad".to_owned())
        );
        assert_eq!(
            kind("045e:0719=gamepad:fast"),
            ParseQuirkErrorKind::UnknownFlag("fast".to_owned())
        );

        let mut table = QuirkTable::empty();
        assert!(table.extend_from_str("1:2=gamepad, bad").is_err());
        assert!(table.entries().is_empty());
    }
}
