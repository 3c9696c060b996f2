// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Platform independent part of HID report handling.
//!
//! Usage tables, button layouts of known gamepads, hat switch decoding, axis assignment and the
//! report layout used by the Windows raw input backend. Everything here is pure and works on
//! plain numbers, so it is shared by the macOS and Windows backends and tested on every target.

use fnv::{FnvHashMap, FnvHashSet};

use crate::axis::Axis;
use crate::button::ButtonId;
use crate::device::DeviceClass;
use crate::quirks::Quirks;
use crate::state::{Calibration, DeviceState};

pub const PAGE_GENERIC_DESKTOP: u16 = 0x01;
pub const PAGE_SIMULATION: u16 = 0x02;
pub const PAGE_KEYBOARD: u16 = 0x07;
pub const PAGE_BUTTON: u16 = 0x09;
pub const PAGE_DIGITIZER: u16 = 0x0d;

pub const USAGE_POINTER: u16 = 0x01;
pub const USAGE_MOUSE: u16 = 0x02;
pub const USAGE_JOYSTICK: u16 = 0x04;
pub const USAGE_GAMEPAD: u16 = 0x05;
pub const USAGE_KEYBOARD: u16 = 0x06;
pub const USAGE_KEYPAD: u16 = 0x07;
pub const USAGE_MULTI_AXIS_CONTROLLER: u16 = 0x08;
pub const USAGE_X: u16 = 0x30;
pub const USAGE_Y: u16 = 0x31;
pub const USAGE_Z: u16 = 0x32;
pub const USAGE_RX: u16 = 0x33;
pub const USAGE_RY: u16 = 0x34;
pub const USAGE_RZ: u16 = 0x35;
pub const USAGE_SLIDER: u16 = 0x36;
pub const USAGE_DIAL: u16 = 0x37;
pub const USAGE_WHEEL: u16 = 0x38;
pub const USAGE_HAT_SWITCH: u16 = 0x39;
pub const USAGE_DPAD_UP: u16 = 0x90;
pub const USAGE_DPAD_DOWN: u16 = 0x91;
pub const USAGE_DPAD_RIGHT: u16 = 0x92;
pub const USAGE_DPAD_LEFT: u16 = 0x93;

pub const USAGE_SIM_FLIGHT_STICK: u16 = 0x20;
pub const USAGE_SIM_RUDDER: u16 = 0xba;
pub const USAGE_SIM_THROTTLE: u16 = 0xbb;
pub const USAGE_SIM_ACCELERATOR: u16 = 0xc4;
pub const USAGE_SIM_BRAKE: u16 = 0xc5;
pub const USAGE_SIM_STEERING: u16 = 0xc8;

pub const USAGE_DIGITIZER_TIP_PRESSURE: u16 = 0x30;

/// Device class from the usage of its top level collection.
pub fn class_for_usage(page: u16, usage: u16) -> DeviceClass {
    match (page, usage) {
        (PAGE_GENERIC_DESKTOP, USAGE_POINTER) | (PAGE_GENERIC_DESKTOP, USAGE_MOUSE) => {
            DeviceClass::Mouse
        }
        (PAGE_GENERIC_DESKTOP, USAGE_JOYSTICK) => DeviceClass::FlightStick,
        (PAGE_GENERIC_DESKTOP, USAGE_GAMEPAD) => DeviceClass::Gamepad,
        (PAGE_GENERIC_DESKTOP, USAGE_KEYBOARD) | (PAGE_GENERIC_DESKTOP, USAGE_KEYPAD) => {
            DeviceClass::Keyboard
        }
        (PAGE_GENERIC_DESKTOP, USAGE_MULTI_AXIS_CONTROLLER) => DeviceClass::SpatialMouse,
        (PAGE_SIMULATION, USAGE_SIM_FLIGHT_STICK) => DeviceClass::FlightStick,
        (PAGE_DIGITIZER, _) => DeviceClass::Touch,
        _ => DeviceClass::Unknown,
    }
}

/// Decodes hat switch value, already relative to its logical minimum, into
/// `[up, down, left, right]`. Values outside `0..=7` mean the hat is centered.
pub fn decode_hat(value: i32) -> [bool; 4] {
    if !(0..=7).contains(&value) {
        return [false; 4];
    }

    [
        matches!(value, 7 | 0 | 1),
        (3..=5).contains(&value),
        (5..=7).contains(&value),
        (1..=3).contains(&value),
    ]
}

/// Buttons created for a hat switch, in the order returned by [`decode_hat`].
pub fn hat_buttons(class: DeviceClass) -> [ButtonId; 4] {
    if class == DeviceClass::Gamepad {
        [
            ButtonId::DPAD_UP,
            ButtonId::DPAD_DOWN,
            ButtonId::DPAD_LEFT,
            ButtonId::DPAD_RIGHT,
        ]
    } else {
        [
            ButtonId::HAT_UP,
            ButtonId::HAT_DOWN,
            ButtonId::HAT_LEFT,
            ButtonId::HAT_RIGHT,
        ]
    }
}

/// Which generic gamepad layout a backend falls back to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ButtonLayout {
    RawInput,
    IoKit,
}

type ButtonTable = &'static [Option<ButtonId>];

const SNES_BUTTONS: ButtonTable = &[
    None,
    Some(ButtonId::FACE_X),
    Some(ButtonId::FACE_A),
    Some(ButtonId::FACE_B),
    Some(ButtonId::FACE_Y),
    Some(ButtonId::LSHOULDER),
    Some(ButtonId::RSHOULDER),
    None,
    None,
    Some(ButtonId::BACK),
    Some(ButtonId::START),
];

const DUALSHOCK4_BUTTONS: ButtonTable = &[
    None,
    Some(ButtonId::FACE_X),
    Some(ButtonId::FACE_A),
    Some(ButtonId::FACE_B),
    Some(ButtonId::FACE_Y),
    Some(ButtonId::LSHOULDER),
    Some(ButtonId::RSHOULDER),
    Some(ButtonId::LTRIGGER),
    Some(ButtonId::RTRIGGER),
    Some(ButtonId::BACK),
    Some(ButtonId::START),
    Some(ButtonId::LSTICK),
    Some(ButtonId::RSTICK),
    Some(ButtonId::GUIDE),
];

const RAW_INPUT_BUTTONS: ButtonTable = &[
    None,
    Some(ButtonId::FACE_A),
    Some(ButtonId::FACE_B),
    Some(ButtonId::FACE_X),
    Some(ButtonId::FACE_Y),
    Some(ButtonId::LSHOULDER),
    Some(ButtonId::RSHOULDER),
    Some(ButtonId::BACK),
    Some(ButtonId::START),
    Some(ButtonId::LSTICK),
    Some(ButtonId::RSTICK),
];

const IOKIT_BUTTONS: ButtonTable = &[
    None,
    Some(ButtonId::FACE_A),
    Some(ButtonId::FACE_B),
    Some(ButtonId::FACE_X),
    Some(ButtonId::FACE_Y),
    Some(ButtonId::LSHOULDER),
    Some(ButtonId::RSHOULDER),
    Some(ButtonId::LSTICK),
    Some(ButtonId::RSTICK),
    Some(ButtonId::START),
    Some(ButtonId::BACK),
    Some(ButtonId::GUIDE),
    Some(ButtonId::DPAD_UP),
    Some(ButtonId::DPAD_DOWN),
    Some(ButtonId::DPAD_LEFT),
    Some(ButtonId::DPAD_RIGHT),
];

/// Gamepad button for usage `usage` of the button page.
pub fn gamepad_button(
    vendor_id: u16,
    product_id: u16,
    usage: u16,
    layout: ButtonLayout,
) -> Option<ButtonId> {
    let table = match (vendor_id, product_id) {
        (0x0810, 0xe501) => SNES_BUTTONS,
        (0x054c, 0x05c4) | (0x054c, 0x09cc) => DUALSHOCK4_BUTTONS,
        _ => match layout {
            ButtonLayout::RawInput => RAW_INPUT_BUTTONS,
            ButtonLayout::IoKit => IOKIT_BUTTONS,
        },
    };

    table.get(usize::from(usage)).copied().flatten()
}

/// Canonical button for a button-like usage.
pub fn button_for_usage(
    class: DeviceClass,
    vendor_id: u16,
    product_id: u16,
    page: u16,
    usage: u16,
    layout: ButtonLayout,
) -> Option<ButtonId> {
    match page {
        PAGE_BUTTON if usage == 0 => None,
        PAGE_BUTTON => match class {
            DeviceClass::Gamepad => gamepad_button(vendor_id, product_id, usage, layout),
            DeviceClass::Mouse => match usage {
                2 | 3 => ButtonId::mouse((4 - usage) as u8),
                _ => ButtonId::mouse(u8::try_from(usage - 1).ok()?),
            },
            _ => ButtonId::joystick(u8::try_from(usage - 1).ok()?),
        },
        PAGE_GENERIC_DESKTOP => match usage {
            USAGE_DPAD_UP => Some(ButtonId::DPAD_UP),
            USAGE_DPAD_DOWN => Some(ButtonId::DPAD_DOWN),
            USAGE_DPAD_RIGHT => Some(ButtonId::DPAD_RIGHT),
            USAGE_DPAD_LEFT => Some(ButtonId::DPAD_LEFT),
            _ => None,
        },
        PAGE_KEYBOARD => keyboard_button(usage),
        _ => None,
    }
}

/// Canonical key for usage of the keyboard page.
pub fn keyboard_button(usage: u16) -> Option<ButtonId> {
    const PUNCTUATION: &[(u16, char)] = &[
        (0x2c, ' '),
        (0x2d, '-'),
        (0x2e, '='),
        (0x2f, '['),
        (0x30, ']'),
        (0x31, '\\'),
        (0x33, ';'),
        (0x34, '\''),
        (0x35, '`'),
        (0x36, ','),
        (0x37, '.'),
        (0x38, '/'),
    ];

    let id = match usage {
        0x04..=0x1d => ButtonId::ascii_key((b'a' + (usage - 0x04) as u8) as char)?,
        0x1e..=0x26 => ButtonId::ascii_key((b'1' + (usage - 0x1e) as u8) as char)?,
        0x27 => ButtonId::ascii_key('0')?,
        0x28 => ButtonId::ENTER,
        0x29 => ButtonId::ESCAPE,
        0x2a => ButtonId::BACKSPACE,
        0x2b => ButtonId::TAB,
        0x39 => ButtonId::CAPS_LOCK,
        0x3a..=0x45 => ButtonId::function_key((usage - 0x3a + 1) as u8)?,
        0x46 => ButtonId::PRINT_SCREEN,
        0x47 => ButtonId::SCROLL_LOCK,
        0x48 => ButtonId::PAUSE,
        0x49 => ButtonId::INSERT,
        0x4a => ButtonId::HOME,
        0x4b => ButtonId::PAGE_UP,
        0x4c => ButtonId::DEL,
        0x4d => ButtonId::END,
        0x4e => ButtonId::PAGE_DOWN,
        0x4f => ButtonId::RIGHT,
        0x50 => ButtonId::LEFT,
        0x51 => ButtonId::DOWN,
        0x52 => ButtonId::UP,
        0x53 => ButtonId::NUM_LOCK,
        0x65 => ButtonId::MENU,
        0x68..=0x6b => ButtonId::function_key((usage - 0x68 + 13) as u8)?,
        0x75 => ButtonId::HELP,
        0xe0 => ButtonId::LCONTROL,
        0xe1 => ButtonId::LSHIFT,
        0xe2 => ButtonId::LALT,
        0xe3 => ButtonId::LMETA,
        0xe4 => ButtonId::RCONTROL,
        0xe5 => ButtonId::RSHIFT,
        0xe6 => ButtonId::RALT,
        0xe7 => ButtonId::RMETA,
        _ => {
            let (_, c) = PUNCTUATION.iter().find(|(u, _)| *u == usage)?;
            ButtonId::ascii_key(*c)?
        }
    };

    Some(id)
}

/// Canonical identity of an analog control together with how its native range is mapped.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AxisMapping {
    pub axis: Axis,
    /// Native direction is opposite to the canonical one.
    pub flip: bool,
    /// Overrides whether the axis is centered.
    pub centered: Option<bool>,
}

impl AxisMapping {
    /// Mapping with the uniform sign convention: up, forward and clockwise twist are positive.
    pub fn new(class: DeviceClass, quirks: Quirks, axis: Axis) -> Self {
        let mut flip = matches!(
            axis,
            Axis::Y | Axis::LeftY | Axis::RightY | Axis::Yaw | Axis::Rudder
        ) || (class == DeviceClass::SpatialMouse && matches!(axis, Axis::Z | Axis::Roll));
        let mut centered = None;

        if axis == Axis::Throttle {
            flip = quirks.contains(Quirks::REVERSED_THROTTLE);
            if quirks.contains(Quirks::CENTERED_THROTTLE) {
                centered = Some(true);
            }
        }

        AxisMapping {
            axis,
            flip,
            centered,
        }
    }

    fn flipped(mut self) -> Self {
        self.flip = !self.flip;
        self
    }

    /// Calibration for native range `min..=max`.
    pub fn calibration(&self, min: f64, max: f64) -> Calibration {
        let centered = self
            .centered
            .unwrap_or_else(|| min < 0.0 || self.axis.is_centered());
        let (min, max) = if self.flip { (max, min) } else { (min, max) };

        if centered {
            Calibration::centered(min, max)
        } else {
            Calibration::zero_based(min, max)
        }
    }
}

/// Axis assignment of the Windows raw input backend.
pub fn raw_input_axis(
    class: DeviceClass,
    quirks: Quirks,
    page: u16,
    usage: u16,
) -> Option<AxisMapping> {
    use crate::device::DeviceClass::*;

    let gamepad = class == Gamepad;
    let rstick_from_z = quirks.contains(Quirks::RSTICK_FROM_Z);
    let swapped = quirks.contains(Quirks::RIGHT_AXES_SWAPPED);
    let analog_triggers = !quirks.contains(Quirks::NO_ANALOG_TRIGGERS);
    let map = |axis| Some(AxisMapping::new(class, quirks, axis));

    match (page, usage) {
        (PAGE_GENERIC_DESKTOP, USAGE_X) => match class {
            Gamepad => map(Axis::LeftX),
            FlightStick => map(Axis::Roll),
            _ => map(Axis::X),
        },
        (PAGE_GENERIC_DESKTOP, USAGE_Y) => match class {
            Gamepad => map(Axis::LeftY),
            FlightStick => map(Axis::Pitch),
            _ => map(Axis::Y),
        },
        (PAGE_GENERIC_DESKTOP, USAGE_Z) => match class {
            Gamepad if rstick_from_z && swapped => map(Axis::RightY),
            Gamepad if rstick_from_z => map(Axis::RightX),
            Gamepad if analog_triggers => map(Axis::LeftTrigger),
            Gamepad => None,
            FlightStick => map(Axis::Throttle),
            _ => map(Axis::Z),
        },
        (PAGE_GENERIC_DESKTOP, USAGE_RX) => match class {
            Gamepad if rstick_from_z => None,
            Gamepad => map(Axis::RightX),
            _ => map(Axis::Pitch),
        },
        (PAGE_GENERIC_DESKTOP, USAGE_RY) if gamepad => map(Axis::RightY),
        (PAGE_GENERIC_DESKTOP, USAGE_RY) => map(Axis::Roll),
        (PAGE_GENERIC_DESKTOP, USAGE_RZ) => match class {
            Gamepad if rstick_from_z && swapped => map(Axis::RightX),
            Gamepad if rstick_from_z => map(Axis::RightY),
            Gamepad if analog_triggers => map(Axis::RightTrigger),
            Gamepad => None,
            _ => map(Axis::Yaw),
        },
        (PAGE_GENERIC_DESKTOP, USAGE_SLIDER) => map(Axis::Rudder),
        (PAGE_GENERIC_DESKTOP, USAGE_WHEEL) => map(Axis::Wheel),
        (PAGE_SIMULATION, USAGE_SIM_RUDDER) => map(Axis::Rudder),
        (PAGE_SIMULATION, USAGE_SIM_THROTTLE) => map(Axis::Throttle),
        (PAGE_SIMULATION, USAGE_SIM_ACCELERATOR) => map(Axis::Accelerator),
        (PAGE_SIMULATION, USAGE_SIM_BRAKE) => map(Axis::Brake),
        (PAGE_SIMULATION, USAGE_SIM_STEERING) => map(Axis::Wheel),
        (PAGE_DIGITIZER, USAGE_DIGITIZER_TIP_PRESSURE) => map(Axis::Pressure),
        _ => None,
    }
}

/// Kind of an IOKit HID element (`IOHIDElementType`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Misc,
    Button,
    Axis,
    ScanCodes,
    Output,
    Feature,
    Collection,
    Unknown,
}

impl ElementKind {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => ElementKind::Misc,
            2 => ElementKind::Button,
            3 => ElementKind::Axis,
            4 => ElementKind::ScanCodes,
            129 => ElementKind::Output,
            257 => ElementKind::Feature,
            513 => ElementKind::Collection,
            _ => ElementKind::Unknown,
        }
    }
}

/// What an IOKit element is used for.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ElementRole {
    Axis(AxisMapping),
    Button(Option<ButtonId>),
    Hat,
    PointerX,
    PointerY,
    ScrollWheel,
    Ignore,
}

/// Classifies IOKit element of a device.
pub fn iokit_element_role(
    class: DeviceClass,
    quirks: Quirks,
    vendor_id: u16,
    product_id: u16,
    kind: ElementKind,
    page: u16,
    usage: u16,
) -> ElementRole {
    use crate::device::DeviceClass::*;

    let axis = |axis| ElementRole::Axis(AxisMapping::new(class, quirks, axis));

    match kind {
        ElementKind::Button => {
            return ElementRole::Button(button_for_usage(
                class,
                vendor_id,
                product_id,
                page,
                usage,
                ButtonLayout::IoKit,
            ))
        }
        ElementKind::Misc | ElementKind::Axis => (),
        _ => return ElementRole::Ignore,
    }

    match (page, usage) {
        (PAGE_GENERIC_DESKTOP, USAGE_X) => match class {
            Gamepad => axis(Axis::LeftX),
            FlightStick => axis(Axis::Roll),
            Mouse => ElementRole::PointerX,
            _ => axis(Axis::X),
        },
        (PAGE_GENERIC_DESKTOP, USAGE_Y) => match class {
            Gamepad => axis(Axis::LeftY),
            FlightStick => axis(Axis::Pitch),
            Mouse => ElementRole::PointerY,
            _ => axis(Axis::Y),
        },
        (PAGE_GENERIC_DESKTOP, USAGE_Z) => match class {
            Gamepad => axis(Axis::LeftTrigger),
            FlightStick => axis(Axis::Throttle),
            _ => axis(Axis::Z),
        },
        (PAGE_GENERIC_DESKTOP, USAGE_RX) if class == Gamepad => axis(Axis::RightX),
        (PAGE_GENERIC_DESKTOP, USAGE_RX) => axis(Axis::Pitch),
        (PAGE_GENERIC_DESKTOP, USAGE_RY) if class == Gamepad => axis(Axis::RightY),
        (PAGE_GENERIC_DESKTOP, USAGE_RY) => axis(Axis::Roll),
        (PAGE_GENERIC_DESKTOP, USAGE_RZ) if class == Gamepad => axis(Axis::RightTrigger),
        (PAGE_GENERIC_DESKTOP, USAGE_RZ) => axis(Axis::Yaw),
        (PAGE_GENERIC_DESKTOP, USAGE_SLIDER) => axis(Axis::Rudder),
        (PAGE_GENERIC_DESKTOP, USAGE_WHEEL) => ElementRole::ScrollWheel,
        (PAGE_GENERIC_DESKTOP, USAGE_HAT_SWITCH) => ElementRole::Hat,
        (PAGE_GENERIC_DESKTOP, USAGE_DPAD_UP..=USAGE_DPAD_LEFT) => ElementRole::Button(
            button_for_usage(class, vendor_id, product_id, page, usage, ButtonLayout::IoKit),
        ),
        (PAGE_SIMULATION, USAGE_SIM_RUDDER) => axis(Axis::Rudder),
        (PAGE_SIMULATION, USAGE_SIM_THROTTLE) => axis(Axis::Throttle),
        (PAGE_SIMULATION, USAGE_SIM_ACCELERATOR) => axis(Axis::Accelerator),
        (PAGE_SIMULATION, USAGE_SIM_BRAKE) => axis(Axis::Brake),
        (PAGE_SIMULATION, USAGE_SIM_STEERING) => axis(Axis::Wheel),
        (PAGE_DIGITIZER, USAGE_DIGITIZER_TIP_PRESSURE) => axis(Axis::Pressure),
        _ => ElementRole::Ignore,
    }
}

/// Button capability range of a preparsed HID descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ButtonCaps {
    pub report_id: u8,
    pub usage_page: u16,
    pub usage_min: u16,
    pub usage_max: u16,
    pub data_index_min: u16,
}

/// Value capability range of a preparsed HID descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ValueCaps {
    pub report_id: u8,
    pub usage_page: u16,
    pub usage_min: u16,
    pub usage_max: u16,
    pub data_index_min: u16,
    pub logical_min: i32,
    pub logical_max: i32,
    pub bit_size: u16,
}

/// Everything needed to lay out a raw input device.
#[derive(Clone, Debug)]
pub struct HidDescription {
    pub class: DeviceClass,
    pub vendor_id: u16,
    pub product_id: u16,
    pub quirks: Quirks,
    pub button_caps: Vec<ButtonCaps>,
    pub value_caps: Vec<ValueCaps>,
}

/// One active control of a report.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HidData {
    pub data_index: u16,
    pub raw_value: u32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Slot {
    Button(usize),
    Axis {
        index: usize,
        signed_bits: Option<u16>,
    },
    Hat {
        logical_min: i32,
    },
}

/// Maps data indices of HID reports onto device state.
#[derive(Clone, Debug, Default)]
pub struct ReportLayout {
    slots: FnvHashMap<u16, Slot>,
    /// Buttons described by each report, as `(data index, button index)`.
    report_buttons: FnvHashMap<u8, Vec<(u16, usize)>>,
    hat: Option<[usize; 4]>,
}

impl ReportLayout {
    /// Adds buttons and axes of `desc` to `state` and remembers where they are.
    pub fn build(desc: &HidDescription, state: &mut DeviceState) -> Self {
        let mut layout = ReportLayout::default();

        for caps in &desc.button_caps {
            for usage in caps.usage_min..=caps.usage_max.max(caps.usage_min) {
                let data_index = caps.data_index_min.wrapping_add(usage - caps.usage_min);
                let id = button_for_usage(
                    desc.class,
                    desc.vendor_id,
                    desc.product_id,
                    caps.usage_page,
                    usage,
                    ButtonLayout::RawInput,
                );
                let index = state.add_button(id);
                layout.slots.insert(data_index, Slot::Button(index));
                layout
                    .report_buttons
                    .entry(caps.report_id)
                    .or_default()
                    .push((data_index, index));
            }
        }

        for caps in &desc.value_caps {
            for usage in caps.usage_min..=caps.usage_max.max(caps.usage_min) {
                let data_index = caps.data_index_min.wrapping_add(usage - caps.usage_min);

                if caps.usage_page == PAGE_GENERIC_DESKTOP && usage == USAGE_HAT_SWITCH {
                    if layout.hat.is_none() {
                        let ids = hat_buttons(desc.class);
                        layout.hat = Some(ids.map(|id| state.add_button(Some(id))));
                    }
                    layout.slots.insert(
                        data_index,
                        Slot::Hat {
                            logical_min: caps.logical_min,
                        },
                    );
                    continue;
                }

                let (min, max) = logical_range(caps);
                let mapping = raw_input_axis(desc.class, desc.quirks, caps.usage_page, usage)
                    .filter(|m| state.find_axis(m.axis).is_none());
                let index = match mapping {
                    Some(mapping) => {
                        state.add_calibrated_axis(Some(mapping.axis), mapping.calibration(min, max))
                    }
                    None => state.add_axis(None, min, max),
                };

                let signed_bits = if caps.logical_min < 0 {
                    Some(caps.bit_size)
                } else {
                    None
                };
                layout.slots.insert(data_index, Slot::Axis { index, signed_bits });
            }
        }

        layout
    }

    /// Applies one report. Returns true if anything changed.
    ///
    /// Reports only list active buttons, so every button of `report_id` missing from `data` is
    /// released first.
    pub fn process(&self, state: &mut DeviceState, report_id: u8, data: &[HidData]) -> bool {
        let mut changed = false;

        if let Some(buttons) = self.report_buttons.get(&report_id) {
            let present: FnvHashSet<u16> = data.iter().map(|d| d.data_index).collect();
            for &(data_index, index) in buttons {
                if !present.contains(&data_index) {
                    changed |= state.set_button(index, false);
                }
            }
        }

        for item in data {
            let slot = match self.slots.get(&item.data_index) {
                Some(slot) => *slot,
                None => {
                    trace!("Unknown data index {} in report {}", item.data_index, report_id);
                    continue;
                }
            };

            match slot {
                Slot::Button(index) => {
                    changed |= state.set_button(index, item.raw_value & 0xff != 0);
                }
                Slot::Axis { index, signed_bits } => {
                    let raw = match signed_bits {
                        Some(bits) => f64::from(sign_extend(item.raw_value, bits)),
                        None => f64::from(item.raw_value),
                    };
                    changed |= state.set_axis_raw(index, raw);
                }
                Slot::Hat { logical_min } => {
                    if let Some(buttons) = self.hat {
                        let value = (item.raw_value as i64 - i64::from(logical_min)) as i32;
                        for (index, pressed) in buttons.iter().zip(decode_hat(value)) {
                            changed |= state.set_button(*index, pressed);
                        }
                    }
                }
            }
        }

        changed
    }
}

fn logical_range(caps: &ValueCaps) -> (f64, f64) {
    if caps.logical_max < caps.logical_min {
        // Unsigned range that does not fit in the signed fields.
        let bits = u32::from(caps.bit_size.clamp(1, 32));
        let max = (1u64 << bits) - 1;
        (f64::from(caps.logical_min.max(0)), max as f64)
    } else {
        (f64::from(caps.logical_min), f64::from(caps.logical_max))
    }
}

fn sign_extend(value: u32, bits: u16) -> i32 {
    match bits {
        1..=31 => {
            let shift = 32 - u32::from(bits);
            ((value << shift) as i32) >> shift
        }
        _ => value as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ButtonStatus;

    fn gamepad(quirks: Quirks) -> HidDescription {
        HidDescription {
            class: DeviceClass::Gamepad,
            vendor_id: 0x1234,
            product_id: 0x5678,
            quirks,
            button_caps: vec![ButtonCaps {
                report_id: 1,
                usage_page: PAGE_BUTTON,
                usage_min: 1,
                usage_max: 5,
                data_index_min: 0,
            }],
            value_caps: vec![
                ValueCaps {
                    report_id: 1,
                    usage_page: PAGE_GENERIC_DESKTOP,
                    usage_min: USAGE_X,
                    usage_max: USAGE_X,
                    data_index_min: 5,
                    logical_min: 0,
                    logical_max: -1,
                    bit_size: 16,
                },
                ValueCaps {
                    report_id: 1,
                    usage_page: PAGE_GENERIC_DESKTOP,
                    usage_min: USAGE_Y,
                    usage_max: USAGE_Y,
                    data_index_min: 6,
                    logical_min: -128,
                    logical_max: 127,
                    bit_size: 8,
                },
                ValueCaps {
                    report_id: 1,
                    usage_page: PAGE_GENERIC_DESKTOP,
                    usage_min: USAGE_HAT_SWITCH,
                    usage_max: USAGE_HAT_SWITCH,
                    data_index_min: 7,
                    logical_min: 1,
                    logical_max: 8,
                    bit_size: 4,
                },
                ValueCaps {
                    report_id: 1,
                    usage_page: PAGE_GENERIC_DESKTOP,
                    usage_min: USAGE_Z,
                    usage_max: USAGE_Z,
                    data_index_min: 8,
                    logical_min: 0,
                    logical_max: 255,
                    bit_size: 8,
                },
            ],
        }
    }

    fn on(data_index: u16) -> HidData {
        HidData {
            data_index,
            raw_value: 1,
        }
    }

    #[test]
    fn hat_decoding() {
        assert_eq!(decode_hat(0), [true, false, false, false]);
        assert_eq!(decode_hat(1), [true, false, false, true]);
        assert_eq!(decode_hat(4), [false, true, false, false]);
        assert_eq!(decode_hat(6), [false, false, true, false]);
        assert_eq!(decode_hat(7), [true, false, true, false]);
        assert_eq!(decode_hat(8), [false; 4]);
        assert_eq!(decode_hat(-1), [false; 4]);
    }

    #[test]
    fn button_tables() {
        let snes = |u| gamepad_button(0x0810, 0xe501, u, ButtonLayout::RawInput);
        assert_eq!(snes(1), Some(ButtonId::FACE_X));
        assert_eq!(snes(7), None);
        assert_eq!(snes(10), Some(ButtonId::START));
        assert_eq!(snes(11), None);

        let ds4 = |u| gamepad_button(0x054c, 0x09cc, u, ButtonLayout::IoKit);
        assert_eq!(ds4(13), Some(ButtonId::GUIDE));

        assert_eq!(
            gamepad_button(1, 1, 7, ButtonLayout::RawInput),
            Some(ButtonId::BACK)
        );
        assert_eq!(
            gamepad_button(1, 1, 7, ButtonLayout::IoKit),
            Some(ButtonId::LSTICK)
        );
        assert_eq!(gamepad_button(1, 1, 0, ButtonLayout::IoKit), None);
    }

    #[test]
    fn mouse_and_joystick_buttons() {
        let button =
            |class, u| button_for_usage(class, 0, 0, PAGE_BUTTON, u, ButtonLayout::RawInput);
        assert_eq!(button(DeviceClass::Mouse, 1), Some(ButtonId::MOUSE1));
        assert_eq!(button(DeviceClass::Mouse, 2), Some(ButtonId::MOUSE3));
        assert_eq!(button(DeviceClass::Mouse, 3), Some(ButtonId::MOUSE2));
        assert_eq!(button(DeviceClass::Mouse, 5), Some(ButtonId::MOUSE5));
        assert_eq!(button(DeviceClass::FlightStick, 1), Some(ButtonId::TRIGGER));
        assert_eq!(button(DeviceClass::FlightStick, 40), None);
        assert_eq!(button(DeviceClass::FlightStick, 0), None);
    }

    #[test]
    fn keyboard_usages() {
        assert_eq!(keyboard_button(0x04), ButtonId::ascii_key('a'));
        assert_eq!(keyboard_button(0x1d), ButtonId::ascii_key('z'));
        assert_eq!(keyboard_button(0x27), ButtonId::ascii_key('0'));
        assert_eq!(keyboard_button(0x2c), ButtonId::ascii_key(' '));
        assert_eq!(keyboard_button(0x45), Some(ButtonId::F12));
        assert_eq!(keyboard_button(0x6b), Some(ButtonId::F16));
        assert_eq!(keyboard_button(0xe7), Some(ButtonId::RMETA));
        assert_eq!(keyboard_button(0x01), None);
    }

    #[test]
    fn classes() {
        assert_eq!(
            class_for_usage(PAGE_GENERIC_DESKTOP, USAGE_GAMEPAD),
            DeviceClass::Gamepad
        );
        assert_eq!(
            class_for_usage(PAGE_GENERIC_DESKTOP, USAGE_MULTI_AXIS_CONTROLLER),
            DeviceClass::SpatialMouse
        );
        assert_eq!(class_for_usage(0xff00, 1), DeviceClass::Unknown);
    }

    #[test]
    fn raw_input_axes_follow_quirks() {
        let axis = |class, quirks, usage| {
            raw_input_axis(class, quirks, PAGE_GENERIC_DESKTOP, usage).map(|m| m.axis)
        };
        let gp = DeviceClass::Gamepad;

        assert_eq!(axis(gp, Quirks::empty(), USAGE_Z), Some(Axis::LeftTrigger));
        assert_eq!(axis(gp, Quirks::NO_ANALOG_TRIGGERS, USAGE_Z), None);
        assert_eq!(axis(gp, Quirks::RSTICK_FROM_Z, USAGE_Z), Some(Axis::RightX));
        assert_eq!(axis(gp, Quirks::RSTICK_FROM_Z, USAGE_RZ), Some(Axis::RightY));
        assert_eq!(axis(gp, Quirks::RSTICK_FROM_Z, USAGE_RX), None);
        let swapped = Quirks::RSTICK_FROM_Z | Quirks::RIGHT_AXES_SWAPPED;
        assert_eq!(axis(gp, swapped, USAGE_Z), Some(Axis::RightY));
        assert_eq!(axis(gp, swapped, USAGE_RZ), Some(Axis::RightX));
        assert_eq!(
            axis(DeviceClass::FlightStick, Quirks::empty(), USAGE_X),
            Some(Axis::Roll)
        );
        assert_eq!(
            axis(DeviceClass::Unknown, Quirks::empty(), USAGE_RZ),
            Some(Axis::Yaw)
        );

        let tflight = Quirks::CENTERED_THROTTLE | Quirks::REVERSED_THROTTLE;
        let throttle =
            raw_input_axis(DeviceClass::FlightStick, tflight, PAGE_GENERIC_DESKTOP, USAGE_Z)
                .unwrap();
        assert_eq!(throttle.axis, Axis::Throttle);
        assert!(throttle.flip);
        assert_eq!(throttle.centered, Some(true));
        let cal = throttle.calibration(0.0, 255.0);
        assert!(cal.is_centered());
        assert!((cal.apply(0.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn vertical_axes_are_flipped() {
        for class in [DeviceClass::Gamepad, DeviceClass::Unknown] {
            let mapping =
                raw_input_axis(class, Quirks::empty(), PAGE_GENERIC_DESKTOP, USAGE_Y).unwrap();
            let cal = mapping.calibration(0.0, 65535.0);
            assert!(cal.apply(0.0) > cal.apply(65535.0));
        }
    }

    #[test]
    fn report_clears_missing_buttons() {
        let mut state = DeviceState::new();
        let layout = ReportLayout::build(&gamepad(Quirks::empty()), &mut state);

        for i in 0..5 {
            state.set_button(i, true);
        }
        state.take_button_events();

        assert!(layout.process(&mut state, 1, &[on(3)]));
        let statuses: Vec<_> = state.buttons()[..5].iter().map(|b| b.status).collect();
        assert_eq!(
            statuses,
            vec![
                ButtonStatus::Up,
                ButtonStatus::Up,
                ButtonStatus::Up,
                ButtonStatus::Down,
                ButtonStatus::Up,
            ]
        );

        assert!(!layout.process(&mut state, 2, &[]));
        assert!(state.buttons()[3].is_pressed());
    }

    #[test]
    fn report_values() {
        let mut state = DeviceState::new();
        let layout = ReportLayout::build(&gamepad(Quirks::empty()), &mut state);

        assert_eq!(state.buttons().len(), 9);
        assert_eq!(state.button(5).unwrap().id, Some(ButtonId::DPAD_UP));
        assert_eq!(state.axis(0).unwrap().id, Some(Axis::LeftX));
        assert_eq!(state.axis(2).unwrap().id, Some(Axis::LeftTrigger));

        layout.process(
            &mut state,
            1,
            &[
                HidData {
                    data_index: 5,
                    raw_value: 65535,
                },
                HidData {
                    data_index: 6,
                    raw_value: 0x80,
                },
                HidData {
                    data_index: 7,
                    raw_value: 2,
                },
                HidData {
                    data_index: 8,
                    raw_value: 255,
                },
            ],
        );

        assert!((state.axis_value(Axis::LeftX) - 1.0).abs() < 1e-9);
        // -128 is the bottom of the range and "down" is negative
        assert!((state.axis_value(Axis::LeftY) - 1.0).abs() < 1e-9);
        assert!((state.axis_value(Axis::LeftTrigger) - 1.0).abs() < 1e-9);
        assert!(state.is_pressed(ButtonId::DPAD_UP));
        assert!(state.is_pressed(ButtonId::DPAD_RIGHT));
        assert!(!state.is_pressed(ButtonId::DPAD_DOWN));

        layout.process(
            &mut state,
            1,
            &[HidData {
                data_index: 7,
                raw_value: 0,
            }],
        );
        assert!(!state.is_pressed(ButtonId::DPAD_UP));
    }

    #[test]
    fn duplicate_axes_are_unmapped() {
        let mut desc = gamepad(Quirks::empty());
        let mut dup = desc.value_caps[0];
        dup.data_index_min = 9;
        desc.value_caps.push(dup);

        let mut state = DeviceState::new();
        ReportLayout::build(&desc, &mut state);
        assert_eq!(state.axis(3).unwrap().id, None);
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0x80, 8), -128);
        assert_eq!(sign_extend(0x7f, 8), 127);
        assert_eq!(sign_extend(0xffff_ffff, 32), -1);
    }
}
