// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Canonical per-device state and event queues.

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

use crate::axis::Axis;
use crate::button::ButtonId;
use crate::events::{ButtonEvent, ButtonEventKind, PointerEvent};
use crate::utils;

use std::mem;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum ButtonStatus {
    #[default]
    Unknown,
    Up,
    Down,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ButtonState {
    /// `None` for native buttons without canonical meaning.
    pub id: Option<ButtonId>,
    pub status: ButtonStatus,
}

impl ButtonState {
    pub fn is_pressed(&self) -> bool {
        self.status == ButtonStatus::Down
    }
}

/// Linear mapping from native samples to canonical values.
///
/// Centered calibrations map the native range onto `[-1, 1]`, zero-based ones onto `[0, 1]`.
/// Passing `min` and `max` swapped flips the direction of the axis.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Calibration {
    scale: f64,
    bias: f64,
    centered: bool,
}

impl Calibration {
    pub fn centered(min: f64, max: f64) -> Self {
        if min == max {
            return Calibration::from_scale_bias(0.0, 0.0, true);
        }

        Calibration {
            scale: 2.0 / (max - min),
            bias: (max + min) / (min - max),
            centered: true,
        }
    }

    pub fn zero_based(min: f64, max: f64) -> Self {
        if min == max {
            return Calibration::from_scale_bias(0.0, 0.0, false);
        }

        Calibration {
            scale: 1.0 / (max - min),
            bias: -min / (max - min),
            centered: false,
        }
    }

    pub fn from_scale_bias(scale: f64, bias: f64, centered: bool) -> Self {
        Calibration {
            scale,
            bias,
            centered,
        }
    }

    pub fn is_centered(&self) -> bool {
        self.centered
    }

    pub fn apply(&self, raw: f64) -> f64 {
        let value = raw * self.scale + self.bias;
        if self.centered {
            value.clamp(-1.0, 1.0)
        } else {
            value.clamp(0.0, 1.0)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct AxisState {
    /// `None` for native axes without canonical meaning.
    pub id: Option<Axis>,
    pub value: f64,
    /// Becomes true with the first observed sample.
    pub known: bool,
    pub calibration: Calibration,
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct PointerData {
    pub in_window: bool,
    pub x: f64,
    pub y: f64,
    pub pressure: f64,
}

/// Position and orientation (quaternion `x, y, z, w`) of a tracked device.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct TrackerData {
    pub position: [f64; 3],
    pub orientation: [f64; 4],
    pub time: f64,
}

impl Default for TrackerData {
    fn default() -> Self {
        TrackerData {
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
            time: 0.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum PowerStatus {
    #[default]
    Unknown,
    Wired,
    Discharging,
    Charging,
    Charged,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct BatteryData {
    pub level: u8,
    pub max_level: u8,
    pub status: PowerStatus,
}

/// Buttons, axes, pointer, tracker and battery of one device, plus its pending events.
///
/// Backends mutate it while holding the device lock (see [`Device::lock`]). Indices of buttons
/// and axes are assigned at construction and keep their identity.
///
/// [`Device::lock`]: crate::Device::lock
#[derive(Debug, Default)]
pub struct DeviceState {
    buttons: Vec<ButtonState>,
    axes: Vec<AxisState>,
    pointer: PointerData,
    tracker: TrackerData,
    battery: BatteryData,
    button_events: Vec<ButtonEvent>,
    pointer_events: Vec<PointerEvent>,
    pointer_events_enabled: bool,
    pointer_sequence: u64,
    pointer_direction: f64,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends button and returns its index.
    pub fn add_button(&mut self, id: Option<ButtonId>) -> usize {
        self.buttons.push(ButtonState {
            id,
            status: ButtonStatus::Unknown,
        });
        self.buttons.len() - 1
    }

    /// Appends axis reporting native values in `min..=max` and returns its index.
    ///
    /// The axis is centered if its identity is a centered one or the range contains negative
    /// values. Pass `min > max` to flip it.
    pub fn add_axis(&mut self, id: Option<Axis>, min: f64, max: f64) -> usize {
        let centered = min.min(max) < 0.0 || id.map_or(false, Axis::is_centered);
        let calibration = if centered {
            Calibration::centered(min, max)
        } else {
            Calibration::zero_based(min, max)
        };

        self.add_calibrated_axis(id, calibration)
    }

    pub fn add_calibrated_axis(&mut self, id: Option<Axis>, calibration: Calibration) -> usize {
        self.axes.push(AxisState {
            id,
            value: 0.0,
            known: false,
            calibration,
        });
        self.axes.len() - 1
    }

    pub fn buttons(&self) -> &[ButtonState] {
        &self.buttons
    }

    pub fn axes(&self) -> &[AxisState] {
        &self.axes
    }

    pub fn button(&self, index: usize) -> Option<&ButtonState> {
        self.buttons.get(index)
    }

    pub fn axis(&self, index: usize) -> Option<&AxisState> {
        self.axes.get(index)
    }

    pub fn find_button(&self, id: ButtonId) -> Option<usize> {
        self.buttons.iter().position(|b| b.id == Some(id))
    }

    pub fn find_axis(&self, id: Axis) -> Option<usize> {
        self.axes.iter().position(|a| a.id == Some(id))
    }

    /// Value of axis `id`, or 0 if the device has no such axis.
    pub fn axis_value(&self, id: Axis) -> f64 {
        self.find_axis(id).map_or(0.0, |i| self.axes[i].value)
    }

    pub fn is_pressed(&self, id: ButtonId) -> bool {
        self.find_button(id)
            .map_or(false, |i| self.buttons[i].is_pressed())
    }

    /// Updates button at `index`. Returns true if the state changed.
    ///
    /// A change of a button with canonical identity also enqueues a button event. An index past
    /// the end grows the list with buttons that have no identity.
    pub fn set_button(&mut self, index: usize, pressed: bool) -> bool {
        if index >= self.buttons.len() {
            self.buttons.resize(
                index + 1,
                ButtonState {
                    id: None,
                    status: ButtonStatus::Unknown,
                },
            );
        }

        let status = if pressed {
            ButtonStatus::Down
        } else {
            ButtonStatus::Up
        };

        let button = &mut self.buttons[index];
        if button.status == status {
            return false;
        }
        button.status = status;

        if let Some(id) = button.id {
            let kind = if pressed {
                ButtonEventKind::Down
            } else {
                ButtonEventKind::Up
            };
            self.push_button_event(id, kind);
        }

        true
    }

    /// Sets button with identity `id` if the device has it.
    pub fn set_button_by_id(&mut self, id: ButtonId, pressed: bool) -> bool {
        match self.find_button(id) {
            Some(index) => self.set_button(index, pressed),
            None => false,
        }
    }

    /// Applies the axis calibration to native sample `raw`. Returns true if the value changed.
    pub fn set_axis_raw(&mut self, index: usize, raw: f64) -> bool {
        match self.axes.get(index) {
            Some(axis) => {
                let value = axis.calibration.apply(raw);
                self.set_axis_value(index, value)
            }
            None => false,
        }
    }

    /// Stores already calibrated `value`. Returns true if the value changed.
    pub fn set_axis_value(&mut self, index: usize, value: f64) -> bool {
        let axis = match self.axes.get_mut(index) {
            Some(axis) => axis,
            None => return false,
        };

        let changed = !axis.known || axis.value != value;
        axis.value = value;
        axis.known = true;

        changed
    }

    pub fn pointer(&self) -> &PointerData {
        &self.pointer
    }

    /// Relative pointer motion.
    pub fn pointer_moved(&mut self, dx: f64, dy: f64) {
        if dx == 0.0 && dy == 0.0 {
            return;
        }

        self.pointer.x += dx;
        self.pointer.y += dy;
        self.emit_pointer_event(dx, dy);
    }

    /// Absolute pointer position.
    pub fn set_pointer_position(&mut self, x: f64, y: f64) {
        let dx = x - self.pointer.x;
        let dy = y - self.pointer.y;
        if dx == 0.0 && dy == 0.0 {
            return;
        }

        self.pointer.x = x;
        self.pointer.y = y;
        self.emit_pointer_event(dx, dy);
    }

    pub fn set_pointer_in_window(&mut self, in_window: bool) {
        self.pointer.in_window = in_window;
    }

    pub fn set_pointer_pressure(&mut self, pressure: f64) {
        self.pointer.pressure = pressure;
    }

    fn emit_pointer_event(&mut self, dx: f64, dy: f64) {
        if !self.pointer_events_enabled {
            return;
        }

        self.pointer_sequence += 1;
        let event = PointerEvent::derive(
            self.pointer.in_window,
            (self.pointer.x, self.pointer.y),
            (dx, dy),
            self.pointer_direction,
            self.pointer_sequence,
            utils::time_now(),
        );
        self.pointer_direction = event.direction;
        self.pointer_events.push(event);
    }

    pub fn tracker(&self) -> &TrackerData {
        &self.tracker
    }

    pub fn set_tracker(&mut self, tracker: TrackerData) {
        self.tracker = tracker;
    }

    pub fn battery(&self) -> &BatteryData {
        &self.battery
    }

    pub fn set_battery(&mut self, battery: BatteryData) {
        self.battery = battery;
    }

    pub fn push_button_event(&mut self, button: ButtonId, kind: ButtonEventKind) {
        self.button_events.push(ButtonEvent {
            button,
            kind,
            time: utils::time_now(),
        });
    }

    /// Enqueues `ResumeDown` for every identified button that is currently held.
    pub fn resume_held_buttons(&mut self) {
        let held: Vec<ButtonId> = self
            .buttons
            .iter()
            .filter(|b| b.is_pressed())
            .filter_map(|b| b.id)
            .collect();

        for id in held {
            self.push_button_event(id, ButtonEventKind::ResumeDown);
        }
    }

    pub fn has_button_event(&self) -> bool {
        !self.button_events.is_empty()
    }

    /// Returns all pending button events, leaving the queue empty.
    pub fn take_button_events(&mut self) -> Vec<ButtonEvent> {
        mem::take(&mut self.button_events)
    }

    pub fn has_pointer_event(&self) -> bool {
        !self.pointer_events.is_empty()
    }

    /// Returns all pending pointer events, leaving the queue empty.
    pub fn take_pointer_events(&mut self) -> Vec<PointerEvent> {
        mem::take(&mut self.pointer_events)
    }

    pub fn pointer_events_enabled(&self) -> bool {
        self.pointer_events_enabled
    }

    pub fn enable_pointer_events(&mut self) {
        self.pointer_events_enabled = true;
    }

    /// Stops recording pointer events and discards the pending ones.
    pub fn disable_pointer_events(&mut self) {
        self.pointer_events_enabled = false;
        self.pointer_events = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_calibration() {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-9;
        let cal = Calibration::centered(-32768.0, 32767.0);
        assert!(close(cal.apply(-32768.0), -1.0));
        assert!(close(cal.apply(32767.0), 1.0));
        assert!(cal.apply(-0.5).abs() < 1e-9);
        assert_eq!(cal.apply(100_000.0), 1.0);

        let mut last = -1.0;
        for raw in (-32768..=32767).step_by(97) {
            let value = cal.apply(f64::from(raw));
            assert!((-1.0..=1.0).contains(&value));
            assert!(value >= last);
            last = value;
        }
    }

    #[test]
    fn flipped_left_stick_vertical() {
        let mut state = DeviceState::new();
        let idx = state.add_axis(Some(Axis::LeftY), 32767.0, -32768.0);
        assert!(state.set_axis_raw(idx, -16384.0));
        let value = state.axis(idx).unwrap().value;
        assert!((value - 0.5).abs() < 1e-3, "{}", value);

        state.set_axis_raw(idx, 32767.0);
        assert!((state.axis(idx).unwrap().value + 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_based_calibration() {
        let mut state = DeviceState::new();
        let idx = state.add_axis(Some(Axis::RightTrigger), 0.0, 255.0);
        assert!(!state.axis(idx).unwrap().calibration.is_centered());
        assert!(!state.axis(idx).unwrap().known);

        state.set_axis_raw(idx, 0.0);
        assert!(state.axis(idx).unwrap().known);
        assert_eq!(state.axis(idx).unwrap().value, 0.0);
        state.set_axis_raw(idx, 255.0);
        assert!((state.axis(idx).unwrap().value - 1.0).abs() < 1e-9);
        state.set_axis_raw(idx, -20.0);
        assert_eq!(state.axis(idx).unwrap().value, 0.0);

        let unknown = state.add_axis(None, -10.0, 10.0);
        assert!(state.axis(unknown).unwrap().calibration.is_centered());
        let degenerate = state.add_axis(Some(Axis::Brake), 5.0, 5.0);
        state.set_axis_raw(degenerate, 5.0);
        assert_eq!(state.axis(degenerate).unwrap().value, 0.0);
    }

    #[test]
    fn button_events_only_for_mapped_buttons() {
        let mut state = DeviceState::new();
        let a = state.add_button(Some(ButtonId::FACE_A));
        let raw = state.add_button(None);

        assert!(state.set_button(a, true));
        assert!(!state.set_button(a, true));
        assert!(state.set_button(raw, true));
        assert!(state.set_button(a, false));

        let events = state.take_button_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ButtonEventKind::Down);
        assert_eq!(events[1].kind, ButtonEventKind::Up);
        assert!(events.iter().all(|e| e.button == ButtonId::FACE_A));
        assert!(state.button(raw).unwrap().is_pressed());
    }

    #[test]
    fn set_button_grows_list() {
        let mut state = DeviceState::new();
        state.add_button(Some(ButtonId::START));
        assert!(state.set_button(4, true));
        assert_eq!(state.buttons().len(), 5);
        assert_eq!(state.button(4).unwrap().id, None);
        assert_eq!(state.button(2).unwrap().status, ButtonStatus::Unknown);
        assert!(!state.has_button_event());
    }

    #[test]
    fn drain_is_exactly_once() {
        let mut state = DeviceState::new();
        let idx = state.add_button(Some(ButtonId::MOUSE1));
        state.set_button(idx, true);

        assert!(state.has_button_event());
        assert_eq!(state.take_button_events().len(), 1);
        assert!(!state.has_button_event());
        assert!(state.take_button_events().is_empty());
    }

    #[test]
    fn pointer_events_require_opt_in() {
        let mut state = DeviceState::new();
        state.pointer_moved(3.0, 4.0);
        assert!(!state.has_pointer_event());
        assert_eq!(state.pointer().x, 3.0);

        state.enable_pointer_events();
        state.pointer_moved(3.0, 4.0);
        state.pointer_moved(0.0, 0.0);
        state.set_pointer_position(6.0, 2.0);

        let events = state.take_pointer_events();
        assert_eq!(events.len(), 2);
        assert!((events[0].length - 5.0).abs() < 1e-9);
        assert_eq!((events[0].x, events[0].y), (6.0, 8.0));
        assert_eq!((events[1].dx, events[1].dy), (0.0, -6.0));
        assert!(events[1].sequence > events[0].sequence);
        assert!(state.take_pointer_events().is_empty());

        state.pointer_moved(1.0, 0.0);
        state.disable_pointer_events();
        assert!(!state.has_pointer_event());
    }

    #[test]
    fn resume_down() {
        let mut state = DeviceState::new();
        let a = state.add_button(Some(ButtonId::FACE_A));
        let b = state.add_button(Some(ButtonId::FACE_B));
        state.add_button(None);
        state.set_button(a, true);
        state.set_button(b, false);
        state.set_button(2, true);
        state.take_button_events();

        state.resume_held_buttons();
        let events = state.take_button_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].button, ButtonId::FACE_A);
        assert_eq!(events[0].kind, ButtonEventKind::ResumeDown);
    }
}
