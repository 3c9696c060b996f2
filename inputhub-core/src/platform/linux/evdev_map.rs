// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Translation of evdev capabilities and events into canonical device state.

use vec_map::VecMap;

use super::ioctl::*;
use crate::axis::Axis;
use crate::button::ButtonId;
use crate::device::DeviceClass;
use crate::events::ButtonEventKind;
use crate::hid::{self, AxisMapping};
use crate::quirks::Quirks;
use crate::state::{ButtonStatus, Calibration, DeviceState};
use crate::utils;

pub const KEY_BYTES: usize = KEY_MAX as usize / 8 + 1;
pub const ABS_BYTES: usize = ABS_MAX as usize / 8 + 1;
pub const REL_BYTES: usize = REL_MAX as usize / 8 + 1;
pub const FF_BYTES: usize = FF_MAX as usize / 8 + 1;

/// Capability bitmaps of an evdev device, read once when it is opened.
#[derive(Clone, Debug)]
pub struct Capabilities {
    pub ev_bits: [u8; EV_MAX as usize / 8 + 1],
    pub key_bits: [u8; KEY_BYTES],
    pub abs_bits: [u8; ABS_BYTES],
    pub rel_bits: [u8; REL_BYTES],
    pub ff_bits: [u8; FF_BYTES],
    pub abs_info: VecMap<input_absinfo>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities {
            ev_bits: Default::default(),
            key_bits: [0; KEY_BYTES],
            abs_bits: Default::default(),
            rel_bits: Default::default(),
            ff_bits: Default::default(),
            abs_info: VecMap::new(),
        }
    }
}

impl Capabilities {
    pub fn has_ev(&self, ev: u16) -> bool {
        utils::test_bit(ev, &self.ev_bits)
    }

    pub fn has_key(&self, code: u16) -> bool {
        utils::test_bit(code, &self.key_bits)
    }

    pub fn has_abs(&self, code: u16) -> bool {
        utils::test_bit(code, &self.abs_bits)
    }

    pub fn has_rel(&self, code: u16) -> bool {
        utils::test_bit(code, &self.rel_bits)
    }

    pub fn has_ff(&self, code: u16) -> bool {
        utils::test_bit(code, &self.ff_bits)
    }

    pub fn keys(&self) -> impl Iterator<Item = u16> + '_ {
        (0..=KEY_MAX).filter(move |code| self.has_key(*code))
    }

    pub fn abs_codes(&self) -> impl Iterator<Item = u16> + '_ {
        (0..=ABS_MAX).filter(move |code| self.has_abs(*code))
    }

    fn has_key_in(&self, range: std::ops::Range<u16>) -> bool {
        range.into_iter().any(|code| self.has_key(code))
    }
}

/// Guesses device class from its capabilities and name.
///
/// Each class collects points for typical capabilities. The highest score wins, ties go to the
/// class listed first in [`DeviceClass`].
pub fn detect_class(caps: &Capabilities, name: &str) -> DeviceClass {
    let mut gamepad = 0;
    let mut flight_stick = 0;
    let mut steering_wheel = 0;
    let mut mouse = 0;
    let mut keyboard = 0;
    let mut unknown = 0;

    if caps.has_key_in(BTN_GAMEPAD..BTN_DIGI) && caps.has_abs(ABS_X) && caps.has_abs(ABS_RX) {
        gamepad += 5;
        steering_wheel += 5;
        flight_stick += 5;
    }
    if caps.has_abs(ABS_WHEEL) || caps.has_abs(ABS_GAS) || caps.has_abs(ABS_BRAKE) {
        steering_wheel += 10;
    }
    if caps.has_key(BTN_GEAR_DOWN) || caps.has_key(BTN_GEAR_UP) {
        steering_wheel += 10;
    }
    if caps.has_key_in(BTN_JOYSTICK..BTN_GAMEPAD) && caps.has_abs(ABS_X) {
        flight_stick += 10;
    }
    if caps.has_key_in(BTN_MOUSE..BTN_JOYSTICK) && caps.has_ev(EV_REL) {
        mouse += 20;
    }
    if caps.has_key(KEY_POWER) {
        unknown += 20;
    }
    if caps.has_key(KEY_A) && caps.has_key(KEY_Z) {
        keyboard += 20;
    }

    let name = name.to_lowercase();
    if name.contains("gamepad") || name.contains("controller") {
        gamepad += 10;
    }
    if name.contains("wheel") {
        steering_wheel += 10;
    }
    if name.contains("mouse") || name.contains("touchpad") {
        mouse += 10;
    }
    if name.contains("keyboard") {
        keyboard += 10;
    }
    if name.starts_with("video bus")
        || name.starts_with("power button")
        || name.starts_with("sleep button")
    {
        unknown += 20;
    }

    let scores = [
        (DeviceClass::Unknown, unknown),
        (DeviceClass::Keyboard, keyboard),
        (DeviceClass::Mouse, mouse),
        (DeviceClass::Gamepad, gamepad),
        (DeviceClass::FlightStick, flight_stick),
        (DeviceClass::SteeringWheel, steering_wheel),
    ];

    let mut best = (DeviceClass::Unknown, 0);
    for (class, score) in scores {
        if score > best.1 {
            best = (class, score);
        }
    }

    best.0
}

/// Canonical key for Linux keyboard code.
pub fn keyboard_button(code: u16) -> Option<ButtonId> {
    const LETTERS: &[u8] = b"qwertyuiop";
    const HOME_ROW: &[u8] = b"asdfghjkl";
    const BOTTOM_ROW: &[u8] = b"zxcvbnm";

    let ascii = |c: u8| ButtonId::ascii_key(c as char);

    match code {
        KEY_ESC => Some(ButtonId::ESCAPE),
        2..=10 => ascii(b'1' + (code - 2) as u8),
        11 => ascii(b'0'),
        12 => ascii(b'-'),
        13 => ascii(b'='),
        14 => Some(ButtonId::BACKSPACE),
        15 => Some(ButtonId::TAB),
        16..=25 => ascii(LETTERS[usize::from(code - 16)]),
        26 => ascii(b'['),
        27 => ascii(b']'),
        28 => Some(ButtonId::ENTER),
        29 => Some(ButtonId::LCONTROL),
        30..=38 => ascii(HOME_ROW[usize::from(code - 30)]),
        39 => ascii(b';'),
        40 => ascii(b'\''),
        41 => ascii(b'`'),
        42 => Some(ButtonId::LSHIFT),
        43 => ascii(b'\\'),
        44..=50 => ascii(BOTTOM_ROW[usize::from(code - 44)]),
        51 => ascii(b','),
        52 => ascii(b'.'),
        53 => ascii(b'/'),
        54 => Some(ButtonId::RSHIFT),
        56 => Some(ButtonId::LALT),
        57 => ascii(b' '),
        58 => Some(ButtonId::CAPS_LOCK),
        59..=68 => ButtonId::function_key((code - 58) as u8),
        69 => Some(ButtonId::NUM_LOCK),
        70 => Some(ButtonId::SCROLL_LOCK),
        87 => Some(ButtonId::F11),
        88 => Some(ButtonId::F12),
        97 => Some(ButtonId::RCONTROL),
        99 => Some(ButtonId::PRINT_SCREEN),
        100 => Some(ButtonId::RALT),
        102 => Some(ButtonId::HOME),
        103 => Some(ButtonId::UP),
        104 => Some(ButtonId::PAGE_UP),
        105 => Some(ButtonId::LEFT),
        106 => Some(ButtonId::RIGHT),
        107 => Some(ButtonId::END),
        108 => Some(ButtonId::DOWN),
        109 => Some(ButtonId::PAGE_DOWN),
        110 => Some(ButtonId::INSERT),
        111 => Some(ButtonId::DEL),
        119 => Some(ButtonId::PAUSE),
        125 => Some(ButtonId::LMETA),
        126 => Some(ButtonId::RMETA),
        127 => Some(ButtonId::MENU),
        138 => Some(ButtonId::HELP),
        183..=186 => ButtonId::function_key((code - 170) as u8),
        _ => None,
    }
}

const JOYSTICK_AS_GAMEPAD: [ButtonId; 12] = [
    ButtonId::FACE_X,
    ButtonId::FACE_Y,
    ButtonId::FACE_A,
    ButtonId::FACE_B,
    ButtonId::LSHOULDER,
    ButtonId::LTRIGGER,
    ButtonId::RSHOULDER,
    ButtonId::RTRIGGER,
    ButtonId::BACK,
    ButtonId::START,
    ButtonId::LSTICK,
    ButtonId::RSTICK,
];

const JOYSTICK_AS_GAMEPAD_ALT: [ButtonId; 12] = [
    ButtonId::FACE_Y,
    ButtonId::FACE_B,
    ButtonId::FACE_A,
    ButtonId::FACE_X,
    ButtonId::LSHOULDER,
    ButtonId::RSHOULDER,
    ButtonId::LTRIGGER,
    ButtonId::RTRIGGER,
    ButtonId::BACK,
    ButtonId::START,
    ButtonId::LSTICK,
    ButtonId::RSTICK,
];

/// Canonical button for key code `code` of a device of class `class`.
pub fn map_button(code: u16, class: DeviceClass, quirks: Quirks) -> Option<ButtonId> {
    match code {
        KEY_BACK if class == DeviceClass::Gamepad => Some(ButtonId::BACK),
        KEY_HOMEPAGE if class == DeviceClass::Gamepad => Some(ButtonId::GUIDE),
        KEY_NEXT => Some(ButtonId::NEXT),
        KEY_PREVIOUS => Some(ButtonId::PREVIOUS),
        0..=0xff => keyboard_button(code),
        BTN_MISC..=0x10f => ButtonId::joystick((code - BTN_MISC) as u8),
        BTN_LEFT => ButtonId::mouse(0),
        BTN_MIDDLE => ButtonId::mouse(1),
        BTN_RIGHT => ButtonId::mouse(2),
        BTN_SIDE => ButtonId::mouse(3),
        BTN_EXTRA => ButtonId::mouse(4),
        BTN_JOYSTICK..=0x12f if class == DeviceClass::Gamepad => {
            let table = if quirks.contains(Quirks::ALT_BUTTON_MAPPING) {
                &JOYSTICK_AS_GAMEPAD_ALT
            } else {
                &JOYSTICK_AS_GAMEPAD
            };
            table.get(usize::from(code - BTN_JOYSTICK)).copied()
        }
        BTN_JOYSTICK..=0x12f => ButtonId::joystick((code & 0xf) as u8),
        BTN_SOUTH => Some(ButtonId::FACE_A),
        BTN_EAST => Some(ButtonId::FACE_B),
        BTN_C => Some(ButtonId::FACE_C),
        BTN_NORTH => Some(ButtonId::FACE_Y),
        BTN_WEST => Some(ButtonId::FACE_X),
        BTN_Z => Some(ButtonId::FACE_Z),
        BTN_TL => Some(ButtonId::LSHOULDER),
        BTN_TR => Some(ButtonId::RSHOULDER),
        BTN_TL2 => Some(ButtonId::LTRIGGER),
        BTN_TR2 => Some(ButtonId::RTRIGGER),
        BTN_SELECT => Some(ButtonId::BACK),
        BTN_START => Some(ButtonId::START),
        BTN_MODE => Some(ButtonId::GUIDE),
        BTN_THUMBL => Some(ButtonId::LSTICK),
        BTN_THUMBR => Some(ButtonId::RSTICK),
        BTN_GEAR_DOWN => Some(ButtonId::PREVIOUS),
        BTN_GEAR_UP => Some(ButtonId::NEXT),
        BTN_DPAD_UP => Some(ButtonId::DPAD_UP),
        BTN_DPAD_DOWN => Some(ButtonId::DPAD_DOWN),
        BTN_DPAD_LEFT => Some(ButtonId::DPAD_LEFT),
        BTN_DPAD_RIGHT => Some(ButtonId::DPAD_RIGHT),
        BTN_TRIGGER_HAPPY1 if class == DeviceClass::Gamepad => Some(ButtonId::DPAD_LEFT),
        BTN_TRIGGER_HAPPY2 if class == DeviceClass::Gamepad => Some(ButtonId::DPAD_RIGHT),
        BTN_TRIGGER_HAPPY3 if class == DeviceClass::Gamepad => Some(ButtonId::DPAD_UP),
        BTN_TRIGGER_HAPPY4 if class == DeviceClass::Gamepad => Some(ButtonId::DPAD_DOWN),
        _ => None,
    }
}

/// Canonical axis for absolute axis `code`.
pub fn map_axis(code: u16, class: DeviceClass, quirks: Quirks) -> Option<AxisMapping> {
    use crate::device::DeviceClass::*;

    let rstick_from_z = quirks.contains(Quirks::RSTICK_FROM_Z);
    let swapped = quirks.contains(Quirks::RIGHT_AXES_SWAPPED);
    let analog_triggers = !quirks.contains(Quirks::NO_ANALOG_TRIGGERS);

    let axis = match (code, class) {
        (ABS_X, Gamepad) => Axis::LeftX,
        (ABS_X, FlightStick) => Axis::Roll,
        (ABS_X, SteeringWheel) => Axis::Wheel,
        (ABS_X, _) => Axis::X,
        (ABS_Y, Gamepad) => Axis::LeftY,
        (ABS_Y, FlightStick) => Axis::Pitch,
        (ABS_Y, _) => Axis::Y,
        (ABS_Z, Gamepad) if rstick_from_z && swapped => Axis::RightY,
        (ABS_Z, Gamepad) if rstick_from_z => Axis::RightX,
        (ABS_Z, Gamepad) if analog_triggers => Axis::LeftTrigger,
        (ABS_Z, Gamepad) => return None,
        (ABS_Z, FlightStick) => Axis::Throttle,
        (ABS_Z, SteeringWheel) => Axis::Accelerator,
        (ABS_Z, _) => Axis::Z,
        (ABS_RX, Gamepad) if rstick_from_z => return None,
        (ABS_RX, Gamepad) => Axis::RightX,
        (ABS_RX, _) => Axis::Pitch,
        (ABS_RY, Gamepad) if rstick_from_z => return None,
        (ABS_RY, Gamepad) => Axis::RightY,
        (ABS_RY, _) => Axis::Roll,
        (ABS_RZ, Gamepad) if rstick_from_z && swapped => Axis::RightX,
        (ABS_RZ, Gamepad) if rstick_from_z => Axis::RightY,
        (ABS_RZ, Gamepad) if analog_triggers => Axis::RightTrigger,
        (ABS_RZ, Gamepad) => return None,
        (ABS_RZ, SteeringWheel) => Axis::Brake,
        (ABS_RZ, _) => Axis::Yaw,
        (ABS_THROTTLE, _) if quirks.contains(Quirks::RUDDER_FROM_THROTTLE) => Axis::Rudder,
        (ABS_THROTTLE, _) => Axis::Throttle,
        (ABS_RUDDER, _) => Axis::Rudder,
        (ABS_WHEEL, _) => Axis::Wheel,
        (ABS_GAS, _) => Axis::Accelerator,
        (ABS_BRAKE, _) => Axis::Brake,
        (ABS_HAT2X, Gamepad) => Axis::RightTrigger,
        (ABS_HAT2Y, Gamepad) => Axis::LeftTrigger,
        (ABS_PRESSURE, _) => Axis::Pressure,
        _ => return None,
    };

    Some(AxisMapping::new(class, quirks, axis))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum AbsSlot {
    Axis(usize),
    /// Hat axis driving two buttons, `(negative, positive)`.
    Hat(usize, usize),
}

/// Result of applying a batch of events.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Applied {
    /// Some state changed.
    pub activity: bool,
    /// Events were dropped by the kernel; state must be read again.
    pub resync: bool,
}

/// Where evdev codes of one device go in its [`DeviceState`].
#[derive(Debug, Clone)]
pub struct EvdevLayout {
    class: DeviceClass,
    keys: VecMap<usize>,
    abs: VecMap<AbsSlot>,
    /// Emulated analog triggers, `(left, right)` axis indices.
    emulated_triggers: Option<(usize, usize)>,
    /// Wheel pulse buttons, `[up, down, left, right]`.
    wheel: Option<[usize; 4]>,
    pointer: bool,
    dropping: bool,
    pointer_delta: (f64, f64),
}

impl EvdevLayout {
    /// Adds buttons and axes of a device with `caps` to `state`.
    pub fn build(
        caps: &Capabilities,
        class: DeviceClass,
        quirks: Quirks,
        state: &mut DeviceState,
    ) -> Self {
        let mut layout = EvdevLayout {
            class,
            keys: VecMap::new(),
            abs: VecMap::new(),
            emulated_triggers: None,
            wheel: None,
            pointer: caps.has_rel(REL_X) && caps.has_rel(REL_Y),
            dropping: false,
            pointer_delta: (0.0, 0.0),
        };

        for code in caps.keys() {
            let mut id = map_button(code, class, quirks);
            if code < BTN_MISC && class != DeviceClass::Keyboard && id.is_none() {
                continue;
            }
            if id.map_or(false, |id| state.find_button(id).is_some()) {
                id = None;
            }
            layout.keys.insert(usize::from(code), state.add_button(id));
        }

        let dpad_from_hat = !caps.has_key(BTN_DPAD_UP)
            && !caps.has_key(BTN_TRIGGER_HAPPY3)
            && caps.has_abs(ABS_HAT0X)
            && caps.has_abs(ABS_HAT0Y);
        if dpad_from_hat {
            let [up, down, left, right] =
                hid::hat_buttons(class).map(|id| state.add_button(Some(id)));
            layout.abs.insert(usize::from(ABS_HAT0X), AbsSlot::Hat(left, right));
            layout.abs.insert(usize::from(ABS_HAT0Y), AbsSlot::Hat(up, down));
        }

        for code in caps.abs_codes() {
            if layout.abs.contains_key(usize::from(code)) {
                continue;
            }

            let info = caps.abs_info.get(usize::from(code)).copied().unwrap_or_default();
            let (min, max) = (f64::from(info.minimum), f64::from(info.maximum));
            let mapping =
                map_axis(code, class, quirks).filter(|m| state.find_axis(m.axis).is_none());
            let index = match mapping {
                Some(mapping) => {
                    state.add_calibrated_axis(Some(mapping.axis), mapping.calibration(min, max))
                }
                None => state.add_axis(None, min, max),
            };
            layout.abs.insert(usize::from(code), AbsSlot::Axis(index));
        }

        if class == DeviceClass::Gamepad
            && caps.has_key(BTN_TL2)
            && caps.has_key(BTN_TR2)
            && state.find_axis(Axis::LeftTrigger).is_none()
            && state.find_axis(Axis::RightTrigger).is_none()
        {
            let calibration = Calibration::zero_based(0.0, 1.0);
            let left = state.add_calibrated_axis(Some(Axis::LeftTrigger), calibration);
            let right = state.add_calibrated_axis(Some(Axis::RightTrigger), calibration);
            layout.emulated_triggers = Some((left, right));
        }

        if caps.has_rel(REL_WHEEL) || caps.has_rel(REL_HWHEEL) {
            let ids = [
                ButtonId::WHEEL_UP,
                ButtonId::WHEEL_DOWN,
                ButtonId::WHEEL_LEFT,
                ButtonId::WHEEL_RIGHT,
            ];
            layout.wheel = Some(ids.map(|id| state.add_button(Some(id))));
        }

        layout
    }

    pub fn has_pointer(&self) -> bool {
        self.pointer
    }

    /// Absolute axis codes known to the layout.
    pub fn abs_codes(&self) -> impl Iterator<Item = u16> + '_ {
        self.abs.keys().map(|code| code as u16)
    }

    /// Brings `state` in line with a snapshot of key bits and absolute values. Only keys whose
    /// state differs are applied, so no duplicate events are queued.
    pub fn sync(&mut self, state: &mut DeviceState, key_bits: &[u8], abs: &VecMap<i32>) -> bool {
        let mut changed = false;

        let keys: Vec<(u16, usize)> =
            self.keys.iter().map(|(code, &index)| (code as u16, index)).collect();
        for (code, index) in keys {
            let pressed = utils::test_bit(code, key_bits);
            let status = if pressed {
                ButtonStatus::Down
            } else {
                ButtonStatus::Up
            };
            if state.button(index).map(|b| b.status) != Some(status) {
                changed |= self.apply_key(state, code, i32::from(pressed));
            }
        }

        for (code, &value) in abs.iter() {
            changed |= self.apply_abs(state, code as u16, value);
        }

        changed
    }

    /// Applies events read from the device.
    pub fn apply(&mut self, state: &mut DeviceState, events: &[input_event]) -> Applied {
        let mut applied = Applied::default();

        for event in events {
            if self.dropping {
                if event.type_ == EV_SYN && event.code == SYN_REPORT {
                    self.dropping = false;
                    applied.resync = true;
                }
                continue;
            }

            let changed = match event.type_ {
                EV_SYN => {
                    if event.code == SYN_DROPPED {
                        trace!("Kernel dropped events, waiting for next report");
                        self.dropping = true;
                        self.pointer_delta = (0.0, 0.0);
                        false
                    } else {
                        self.flush_pointer(state)
                    }
                }
                EV_REL => self.apply_rel(state, event.code, event.value),
                EV_KEY => self.apply_key(state, event.code, event.value),
                EV_ABS => self.apply_abs(state, event.code, event.value),
                _ => {
                    trace!("Skipping event {:?}", event);
                    false
                }
            };
            applied.activity |= changed;
        }

        applied.activity |= self.flush_pointer(state);
        applied
    }

    fn flush_pointer(&mut self, state: &mut DeviceState) -> bool {
        let (dx, dy) = std::mem::take(&mut self.pointer_delta);
        if dx == 0.0 && dy == 0.0 {
            return false;
        }

        state.pointer_moved(dx, dy);
        true
    }

    fn apply_rel(&mut self, state: &mut DeviceState, code: u16, value: i32) -> bool {
        match code {
            REL_X => self.pointer_delta.0 += f64::from(value),
            REL_Y => self.pointer_delta.1 += f64::from(value),
            REL_WHEEL | REL_HWHEEL if value != 0 => {
                let Some([up, down, left, right]) = self.wheel else {
                    return false;
                };
                let index = match (code, value > 0) {
                    (REL_WHEEL, true) => up,
                    (REL_WHEEL, false) => down,
                    (_, true) => right,
                    (_, false) => left,
                };
                state.set_button(index, true);
                state.set_button(index, false);
            }
            _ => return false,
        }

        true
    }

    fn apply_key(&mut self, state: &mut DeviceState, code: u16, value: i32) -> bool {
        let Some(&index) = self.keys.get(usize::from(code)) else {
            return false;
        };

        let mut changed = state.set_button(index, value != 0);

        if let Some((left, right)) = self.emulated_triggers {
            let pressed = if value != 0 { 1.0 } else { 0.0 };
            match code {
                BTN_TL2 => changed |= state.set_axis_value(left, pressed),
                BTN_TR2 => changed |= state.set_axis_value(right, pressed),
                _ => (),
            }
        }

        if self.class == DeviceClass::Keyboard && (value == 1 || value == 2) {
            let id = state.button(index).and_then(|b| b.id);
            if let Some((id, ch)) = id.and_then(|id| Some((id, id.as_ascii()?))) {
                let shifted =
                    state.is_pressed(ButtonId::LSHIFT) || state.is_pressed(ButtonId::RSHIFT);
                let ch = if shifted { ch.to_ascii_uppercase() } else { ch };
                state.push_button_event(id, ButtonEventKind::Keystroke(ch));
                changed = true;
            }
        }

        changed
    }

    fn apply_abs(&mut self, state: &mut DeviceState, code: u16, value: i32) -> bool {
        match self.abs.get(usize::from(code)) {
            Some(&AbsSlot::Axis(index)) => state.set_axis_raw(index, f64::from(value)),
            Some(&AbsSlot::Hat(negative, positive)) => {
                let a = state.set_button(negative, value < 0);
                let b = state.set_button(positive, value > 0);
                a || b
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_bit(bits: &mut [u8], n: u16) {
        bits[usize::from(n / 8)] |= 1 << (n % 8);
    }

    fn ev(type_: u16, code: u16, value: i32) -> input_event {
        input_event {
            type_,
            code,
            value,
            ..Default::default()
        }
    }

    fn syn() -> input_event {
        ev(EV_SYN, SYN_REPORT, 0)
    }

    fn xbox_pad() -> Capabilities {
        let mut caps = Capabilities::default();
        for kind in [EV_SYN, EV_KEY, EV_ABS, EV_FF] {
            set_bit(&mut caps.ev_bits, kind);
        }
        for key in [
            BTN_SOUTH, BTN_EAST, BTN_NORTH, BTN_WEST, BTN_TL, BTN_TR, BTN_SELECT, BTN_START,
            BTN_MODE, BTN_THUMBL, BTN_THUMBR,
        ] {
            set_bit(&mut caps.key_bits, key);
        }

        let stick = input_absinfo {
            minimum: -32768,
            maximum: 32767,
            ..Default::default()
        };
        let trigger = input_absinfo {
            minimum: 0,
            maximum: 255,
            ..Default::default()
        };
        let hat = input_absinfo {
            minimum: -1,
            maximum: 1,
            ..Default::default()
        };
        for (code, info) in [
            (ABS_X, stick),
            (ABS_Y, stick),
            (ABS_Z, trigger),
            (ABS_RX, stick),
            (ABS_RY, stick),
            (ABS_RZ, trigger),
            (ABS_HAT0X, hat),
            (ABS_HAT0Y, hat),
        ] {
            set_bit(&mut caps.abs_bits, code);
            caps.abs_info.insert(usize::from(code), info);
        }

        caps
    }

    fn mouse() -> Capabilities {
        let mut caps = Capabilities::default();
        for kind in [EV_SYN, EV_KEY, EV_REL] {
            set_bit(&mut caps.ev_bits, kind);
        }
        for key in [BTN_LEFT, BTN_RIGHT, BTN_MIDDLE] {
            set_bit(&mut caps.key_bits, key);
        }
        for rel in [REL_X, REL_Y, REL_WHEEL] {
            set_bit(&mut caps.rel_bits, rel);
        }
        caps
    }

    fn keyboard() -> Capabilities {
        let mut caps = Capabilities::default();
        for kind in [EV_SYN, EV_KEY] {
            set_bit(&mut caps.ev_bits, kind);
        }
        for key in 1..=88 {
            set_bit(&mut caps.key_bits, key);
        }
        caps
    }

    #[test]
    fn class_detection() {
        assert_eq!(
            detect_class(&xbox_pad(), "Microsoft X-Box 360 pad"),
            DeviceClass::Gamepad
        );
        assert_eq!(detect_class(&mouse(), "Logitech USB Optical Mouse"), DeviceClass::Mouse);
        assert_eq!(
            detect_class(&keyboard(), "AT Translated Set 2 keyboard"),
            DeviceClass::Keyboard
        );

        let mut power = Capabilities::default();
        set_bit(&mut power.key_bits, KEY_POWER);
        assert_eq!(detect_class(&power, "Power Button"), DeviceClass::Unknown);

        let mut stick = Capabilities::default();
        set_bit(&mut stick.key_bits, BTN_TRIGGER);
        set_bit(&mut stick.abs_bits, ABS_X);
        assert_eq!(detect_class(&stick, "Saitek Cyborg"), DeviceClass::FlightStick);

        let mut wheel = xbox_pad();
        set_bit(&mut wheel.abs_bits, ABS_WHEEL);
        set_bit(&mut wheel.key_bits, BTN_GEAR_UP);
        assert_eq!(detect_class(&wheel, "Racing Wheel"), DeviceClass::SteeringWheel);

        assert_eq!(detect_class(&Capabilities::default(), ""), DeviceClass::Unknown);
    }

    #[test]
    fn button_mapping() {
        let gp = DeviceClass::Gamepad;
        assert_eq!(map_button(BTN_SOUTH, gp, Quirks::empty()), Some(ButtonId::FACE_A));
        assert_eq!(map_button(BTN_NORTH, gp, Quirks::empty()), Some(ButtonId::FACE_Y));
        assert_eq!(map_button(BTN_MODE, gp, Quirks::empty()), Some(ButtonId::GUIDE));
        assert_eq!(map_button(BTN_TRIGGER, gp, Quirks::empty()), Some(ButtonId::FACE_X));
        assert_eq!(
            map_button(BTN_TRIGGER, gp, Quirks::ALT_BUTTON_MAPPING),
            Some(ButtonId::FACE_Y)
        );
        assert_eq!(map_button(0x12f, gp, Quirks::empty()), None);
        assert_eq!(
            map_button(BTN_TRIGGER, DeviceClass::FlightStick, Quirks::empty()),
            Some(ButtonId::TRIGGER)
        );
        assert_eq!(
            map_button(0x125, DeviceClass::FlightStick, Quirks::empty()),
            Some(ButtonId::JOYSTICK5)
        );
        let mouse = |code| map_button(code, DeviceClass::Mouse, Quirks::empty());
        assert_eq!(mouse(BTN_RIGHT), Some(ButtonId::MOUSE3));
        assert_eq!(mouse(BTN_MIDDLE), Some(ButtonId::MOUSE2));
        assert_eq!(map_button(KEY_BACK, gp, Quirks::empty()), Some(ButtonId::BACK));
        assert_eq!(map_button(BTN_TOUCH, gp, Quirks::empty()), None);
    }

    #[test]
    fn keyboard_codes() {
        assert_eq!(keyboard_button(KEY_A), ButtonId::ascii_key('a'));
        assert_eq!(keyboard_button(KEY_Z), ButtonId::ascii_key('z'));
        assert_eq!(keyboard_button(16), ButtonId::ascii_key('q'));
        assert_eq!(keyboard_button(11), ButtonId::ascii_key('0'));
        assert_eq!(keyboard_button(57), ButtonId::ascii_key(' '));
        assert_eq!(keyboard_button(68), Some(ButtonId::F10));
        assert_eq!(keyboard_button(186), Some(ButtonId::F16));
        assert_eq!(keyboard_button(KEY_POWER), None);
    }

    #[test]
    fn gamepad_layout() {
        let mut state = DeviceState::new();
        let layout =
            EvdevLayout::build(&xbox_pad(), DeviceClass::Gamepad, Quirks::empty(), &mut state);

        assert_eq!(state.buttons().len(), 11 + 4);
        let ids: Vec<_> = state.axes().iter().map(|a| a.id).collect();
        assert_eq!(
            ids,
            vec![
                Some(Axis::LeftX),
                Some(Axis::LeftY),
                Some(Axis::LeftTrigger),
                Some(Axis::RightX),
                Some(Axis::RightY),
                Some(Axis::RightTrigger),
            ]
        );
        assert!(layout.emulated_triggers.is_none());
        assert!(!layout.has_pointer());
        assert_eq!(layout.abs_codes().count(), 8);
    }

    #[test]
    fn left_stick_vertical_is_flipped() {
        let mut state = DeviceState::new();
        let mut layout =
            EvdevLayout::build(&xbox_pad(), DeviceClass::Gamepad, Quirks::empty(), &mut state);

        let applied = layout.apply(&mut state, &[ev(EV_ABS, ABS_Y, -16384), syn()]);
        assert!(applied.activity);
        assert!((state.axis_value(Axis::LeftY) - 0.5).abs() < 1e-3);

        layout.apply(&mut state, &[ev(EV_ABS, ABS_Z, 255), syn()]);
        assert!((state.axis_value(Axis::LeftTrigger) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hat_drives_dpad() {
        let mut state = DeviceState::new();
        let mut layout =
            EvdevLayout::build(&xbox_pad(), DeviceClass::Gamepad, Quirks::empty(), &mut state);

        layout.apply(&mut state, &[ev(EV_ABS, ABS_HAT0X, -1), ev(EV_ABS, ABS_HAT0Y, 1), syn()]);
        assert!(state.is_pressed(ButtonId::DPAD_LEFT));
        assert!(state.is_pressed(ButtonId::DPAD_DOWN));
        assert!(!state.is_pressed(ButtonId::DPAD_UP));

        layout.apply(&mut state, &[ev(EV_ABS, ABS_HAT0X, 0), syn()]);
        assert!(!state.is_pressed(ButtonId::DPAD_LEFT));
        assert!(state.is_pressed(ButtonId::DPAD_DOWN));
    }

    #[test]
    fn syn_only_batch_is_idle() {
        let mut state = DeviceState::new();
        let mut layout =
            EvdevLayout::build(&xbox_pad(), DeviceClass::Gamepad, Quirks::empty(), &mut state);
        assert_eq!(layout.apply(&mut state, &[syn()]), Applied::default());
    }

    #[test]
    fn dropped_events_are_skipped() {
        let mut state = DeviceState::new();
        let mut layout =
            EvdevLayout::build(&xbox_pad(), DeviceClass::Gamepad, Quirks::empty(), &mut state);

        let applied = layout.apply(
            &mut state,
            &[ev(EV_SYN, SYN_DROPPED, 0), ev(EV_KEY, BTN_SOUTH, 1)],
        );
        assert!(!applied.activity);
        assert!(!applied.resync);
        assert!(!state.is_pressed(ButtonId::FACE_A));

        let events = [ev(EV_KEY, BTN_EAST, 1), syn(), ev(EV_KEY, BTN_SOUTH, 1)];
        let applied = layout.apply(&mut state, &events);
        assert!(applied.resync);
        assert!(applied.activity);
        assert!(!state.is_pressed(ButtonId::FACE_B));
        assert!(state.is_pressed(ButtonId::FACE_A));
    }

    #[test]
    fn emulated_triggers() {
        let mut caps = xbox_pad();
        caps.abs_bits[0] &= !(1u8 << ABS_Z) & !(1u8 << ABS_RZ);
        set_bit(&mut caps.key_bits, BTN_TL2);
        set_bit(&mut caps.key_bits, BTN_TR2);

        let mut state = DeviceState::new();
        let mut layout =
            EvdevLayout::build(&caps, DeviceClass::Gamepad, Quirks::empty(), &mut state);
        assert!(layout.emulated_triggers.is_some());

        layout.apply(&mut state, &[ev(EV_KEY, BTN_TR2, 1), syn()]);
        assert_eq!(state.axis_value(Axis::RightTrigger), 1.0);
        assert_eq!(state.axis_value(Axis::LeftTrigger), 0.0);
        assert!(state.is_pressed(ButtonId::RTRIGGER));
    }

    #[test]
    fn quirky_right_stick() {
        let quirks = Quirks::RSTICK_FROM_Z;
        let mut state = DeviceState::new();
        EvdevLayout::build(&xbox_pad(), DeviceClass::Gamepad, quirks, &mut state);

        assert_eq!(state.axis(2).unwrap().id, Some(Axis::RightX));
        assert_eq!(state.axis(3).unwrap().id, None);
        assert_eq!(state.axis(4).unwrap().id, None);
        assert_eq!(state.axis(5).unwrap().id, Some(Axis::RightY));
    }

    #[test]
    fn mouse_motion_and_wheel() {
        let mut state = DeviceState::new();
        state.enable_pointer_events();
        let mut layout =
            EvdevLayout::build(&mouse(), DeviceClass::Mouse, Quirks::empty(), &mut state);
        assert!(layout.has_pointer());

        layout.apply(
            &mut state,
            &[ev(EV_REL, REL_X, 3), ev(EV_REL, REL_Y, -4), syn(), ev(EV_REL, REL_WHEEL, -1), syn()],
        );

        assert_eq!((state.pointer().x, state.pointer().y), (3.0, -4.0));
        assert_eq!(state.take_pointer_events().len(), 1);

        let events = state.take_button_events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.button == ButtonId::WHEEL_DOWN));
        assert_eq!(events[0].kind, ButtonEventKind::Down);
        assert_eq!(events[1].kind, ButtonEventKind::Up);
        assert_eq!(
            state.button(state.find_button(ButtonId::WHEEL_DOWN).unwrap()).unwrap().status,
            ButtonStatus::Up
        );
    }

    #[test]
    fn keystrokes() {
        let mut state = DeviceState::new();
        let mut layout =
            EvdevLayout::build(&keyboard(), DeviceClass::Keyboard, Quirks::empty(), &mut state);

        layout.apply(
            &mut state,
            &[
                ev(EV_KEY, KEY_A, 1),
                ev(EV_KEY, KEY_A, 2),
                ev(EV_KEY, KEY_A, 0),
                ev(EV_KEY, 42, 1),
                ev(EV_KEY, KEY_Z, 1),
                syn(),
            ],
        );

        let kinds: Vec<_> = state.take_button_events().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ButtonEventKind::Down,
                ButtonEventKind::Keystroke('a'),
                ButtonEventKind::Keystroke('a'),
                ButtonEventKind::Up,
                ButtonEventKind::Down,
                ButtonEventKind::Down,
                ButtonEventKind::Keystroke('Z'),
            ]
        );
    }

    #[test]
    fn sync_with_snapshot() {
        let mut state = DeviceState::new();
        let mut layout =
            EvdevLayout::build(&xbox_pad(), DeviceClass::Gamepad, Quirks::empty(), &mut state);

        let mut key_bits = [0u8; KEY_BYTES];
        set_bit(&mut key_bits, BTN_SOUTH);
        let mut abs = VecMap::new();
        abs.insert(usize::from(ABS_X), 32767);
        abs.insert(usize::from(ABS_HAT0Y), -1);

        assert!(layout.sync(&mut state, &key_bits, &abs));
        assert!(state.is_pressed(ButtonId::FACE_A));
        assert!(state.is_pressed(ButtonId::DPAD_UP));
        let east = state.find_button(ButtonId::FACE_B).unwrap();
        assert_eq!(state.button(east).unwrap().status, ButtonStatus::Up);
        assert!((state.axis_value(Axis::LeftX) - 1.0).abs() < 1e-9);

        state.take_button_events();
        assert!(!layout.sync(&mut state, &key_bits, &abs));
        assert!(!state.has_button_event());
    }
}
