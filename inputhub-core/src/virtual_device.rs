// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Devices driven by software instead of hardware.

use crate::axis::Axis;
use crate::button::ButtonId;
use crate::device::{
    Device, DeviceBackend, DeviceClass, DeviceInfo, DeviceStatus, Features, PollStatus,
};
use crate::state::{BatteryData, DeviceState};

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq)]
enum VirtualInput {
    Button(ButtonId, bool),
    Axis(Axis, f64),
    Pointer(f64, f64),
    Battery(BatteryData),
    Unplug,
}

/// Builds a virtual device together with the handle that feeds it.
#[derive(Debug, Clone)]
pub struct VirtualDeviceBuilder {
    info: DeviceInfo,
    buttons: Vec<ButtonId>,
    axes: Vec<Axis>,
    status: DeviceStatus,
}

impl VirtualDeviceBuilder {
    pub fn new(name: &str) -> Self {
        VirtualDeviceBuilder {
            info: DeviceInfo {
                name: name.to_owned(),
                class: DeviceClass::Virtual,
                ..Default::default()
            },
            buttons: Vec::new(),
            axes: Vec::new(),
            status: DeviceStatus::Connected,
        }
    }

    pub fn class(mut self, class: DeviceClass) -> Self {
        self.info.class = class;
        self
    }

    pub fn features(mut self, features: Features) -> Self {
        self.info.features = features;
        self
    }

    pub fn button(mut self, id: ButtonId) -> Self {
        self.buttons.push(id);
        self
    }

    /// Adds axis taking already calibrated values.
    pub fn axis(mut self, axis: Axis) -> Self {
        self.axes.push(axis);
        self
    }

    /// Device starts inactive and becomes connected with its first input.
    pub fn start_inactive(mut self) -> Self {
        self.status = DeviceStatus::Inactive;
        self
    }

    pub fn build(self) -> (Arc<Device>, VirtualController) {
        let mut state = DeviceState::new();
        for id in self.buttons {
            state.add_button(Some(id));
        }
        for axis in self.axes {
            let (min, max) = if axis.is_centered() {
                (-1.0, 1.0)
            } else {
                (0.0, 1.0)
            };
            state.add_axis(Some(axis), min, max);
        }

        let (tx, rx) = mpsc::channel();
        let device = Device::new(self.info, state, Box::new(VirtualBackend { rx }), self.status);

        (Arc::new(device), VirtualController { tx })
    }
}

/// Injects input into a virtual device. Input is applied when the device is polled.
#[derive(Debug, Clone)]
pub struct VirtualController {
    tx: Sender<VirtualInput>,
}

impl VirtualController {
    pub fn set_button(&self, id: ButtonId, pressed: bool) {
        self.send(VirtualInput::Button(id, pressed));
    }

    pub fn set_axis(&self, axis: Axis, value: f64) {
        self.send(VirtualInput::Axis(axis, value));
    }

    pub fn move_pointer(&self, dx: f64, dy: f64) {
        self.send(VirtualInput::Pointer(dx, dy));
    }

    pub fn set_battery(&self, battery: BatteryData) {
        self.send(VirtualInput::Battery(battery));
    }

    /// Device will be lost on its next poll.
    pub fn unplug(&self) {
        self.send(VirtualInput::Unplug);
    }

    fn send(&self, input: VirtualInput) {
        if self.tx.send(input).is_err() {
            trace!("Input {:?} sent to a released virtual device", input);
        }
    }
}

struct VirtualBackend {
    rx: Receiver<VirtualInput>,
}

impl DeviceBackend for VirtualBackend {
    fn poll(&mut self, state: &mut DeviceState) -> PollStatus {
        let mut status = PollStatus::Idle;

        loop {
            let input = match self.rx.try_recv() {
                Ok(input) => input,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };

            match input {
                VirtualInput::Button(id, pressed) => {
                    state.set_button_by_id(id, pressed);
                }
                VirtualInput::Axis(axis, value) => {
                    if let Some(idx) = state.find_axis(axis) {
                        state.set_axis_raw(idx, value);
                    }
                }
                VirtualInput::Pointer(dx, dy) => state.pointer_moved(dx, dy),
                VirtualInput::Battery(battery) => state.set_battery(battery),
                VirtualInput::Unplug => return PollStatus::Lost,
            }
            status = PollStatus::Activity;
        }

        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ButtonEventKind;

    #[test]
    fn input_applied_on_poll() {
        let (dev, ctl) = VirtualDeviceBuilder::new("Test pad")
            .class(DeviceClass::Gamepad)
            .button(ButtonId::FACE_A)
            .axis(Axis::LeftX)
            .axis(Axis::LeftTrigger)
            .build();

        ctl.set_button(ButtonId::FACE_A, true);
        ctl.set_axis(Axis::LeftX, -0.25);
        ctl.set_axis(Axis::LeftTrigger, 2.0);
        assert!(!dev.is_pressed(ButtonId::FACE_A));

        assert_eq!(dev.poll(), DeviceStatus::Connected);
        assert!(dev.is_pressed(ButtonId::FACE_A));
        assert_eq!(dev.axis_value(Axis::LeftX), -0.25);
        assert_eq!(dev.axis_value(Axis::LeftTrigger), 1.0);

        let events = dev.drain_button_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ButtonEventKind::Down);
    }

    #[test]
    fn inactive_until_input() {
        let (dev, ctl) = VirtualDeviceBuilder::new("Slot")
            .button(ButtonId::START)
            .start_inactive()
            .build();

        assert_eq!(dev.poll(), DeviceStatus::Inactive);
        ctl.set_button(ButtonId::START, true);
        assert_eq!(dev.poll(), DeviceStatus::Connected);
        assert_eq!(
            dev.drain_button_events()
                .iter()
                .map(|e| e.kind)
                .collect::<Vec<_>>(),
            vec![ButtonEventKind::Down, ButtonEventKind::ResumeDown]
        );
    }

    #[test]
    fn unplug() {
        let (dev, ctl) = VirtualDeviceBuilder::new("Gone").build();
        ctl.unplug();
        ctl.move_pointer(1.0, 1.0);
        assert_eq!(dev.poll(), DeviceStatus::Disconnected);
        assert_eq!(dev.poll(), DeviceStatus::Disconnected);
        assert_eq!(dev.pointer().x, 0.0);
    }

    #[test]
    fn dropped_controller_is_idle() {
        let (dev, ctl) = VirtualDeviceBuilder::new("Orphan").build();
        drop(ctl);
        assert_eq!(dev.poll(), DeviceStatus::Connected);
    }
}
