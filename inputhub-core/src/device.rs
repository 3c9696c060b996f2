// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use bitflags::bitflags;
use uuid::Uuid;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

use crate::axis::Axis;
use crate::button::ButtonId;
use crate::error::DeviceError;
use crate::events::{ButtonEvent, PointerEvent};
use crate::state::{AxisState, BatteryData, ButtonState, DeviceState, PointerData, TrackerData};

use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum DeviceClass {
    #[default]
    Unknown,
    Virtual,
    Keyboard,
    Mouse,
    Touch,
    Gamepad,
    FlightStick,
    SteeringWheel,
    DancePad,
    SpatialMouse,
}

impl DeviceClass {
    pub fn name(self) -> &'static str {
        match self {
            DeviceClass::Unknown => "unknown",
            DeviceClass::Virtual => "virtual",
            DeviceClass::Keyboard => "keyboard",
            DeviceClass::Mouse => "mouse",
            DeviceClass::Touch => "touch",
            DeviceClass::Gamepad => "gamepad",
            DeviceClass::FlightStick => "flight_stick",
            DeviceClass::SteeringWheel => "steering_wheel",
            DeviceClass::DancePad => "dance_pad",
            DeviceClass::SpatialMouse => "spatial_mouse",
        }
    }

    /// Gamepads, flight sticks, wheels and dance pads.
    pub fn is_game_controller(self) -> bool {
        matches!(
            self,
            DeviceClass::Gamepad
                | DeviceClass::FlightStick
                | DeviceClass::SteeringWheel
                | DeviceClass::DancePad
        )
    }
}

impl Display for DeviceClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceClass {
    type Err = ParseDeviceClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "unknown" => DeviceClass::Unknown,
            "virtual" => DeviceClass::Virtual,
            "keyboard" => DeviceClass::Keyboard,
            "mouse" => DeviceClass::Mouse,
            "touch" => DeviceClass::Touch,
            "gamepad" => DeviceClass::Gamepad,
            "flight_stick" => DeviceClass::FlightStick,
            "steering_wheel" => DeviceClass::SteeringWheel,
            "dance_pad" => DeviceClass::DancePad,
            "spatial_mouse" => DeviceClass::SpatialMouse,
            _ => return Err(ParseDeviceClassError(s.to_owned())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDeviceClassError(String);

impl Display for ParseDeviceClassError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown device class {:?}", self.0)
    }
}

impl Error for ParseDeviceClassError {}

bitflags! {
    /// Capabilities of a device beyond buttons and axes.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Features: u8 {
        const POINTER = 1 << 0;
        const KEYBOARD = 1 << 1;
        const TRACKER = 1 << 2;
        const VIBRATION = 1 << 3;
        const BATTERY = 1 << 4;
    }
}

/// Static description of a device, fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub manufacturer: String,
    pub serial_number: String,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    /// SDL compatible UUID or nil if it can not be determined.
    pub uuid: Uuid,
    pub class: DeviceClass,
    pub features: Features,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        DeviceInfo {
            name: String::new(),
            manufacturer: String::new(),
            serial_number: String::new(),
            vendor_id: None,
            product_id: None,
            uuid: Uuid::nil(),
            class: DeviceClass::Unknown,
            features: Features::empty(),
        }
    }
}

/// Process unique device identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct DeviceId(usize);

impl DeviceId {
    fn next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        DeviceId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn into_raw(self) -> usize {
        self.0
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Opened, but not yet confirmed to be a real device.
    Inactive,
    Connected,
    /// Terminal state. Native resources are released.
    Disconnected,
}

/// Result of reading native reports.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PollStatus {
    /// Nothing new.
    Idle,
    /// At least one report changed the state.
    Activity,
    /// Device is gone.
    Lost,
}

/// Platform part of a device: owns native handles and translates native reports into
/// [`DeviceState`].
pub trait DeviceBackend: Send {
    /// Reads all available native reports without blocking.
    fn poll(&mut self, state: &mut DeviceState) -> PollStatus;

    /// Sets rumble magnitudes, both in `[0, 1]`.
    fn set_vibration(&mut self, strong: f64, weak: f64) -> Result<(), DeviceError> {
        let _ = (strong, weak);
        Err(DeviceError::NotSupported)
    }
}

struct Inner {
    status: DeviceStatus,
    state: DeviceState,
    backend: Option<Box<dyn DeviceBackend>>,
}

/// Input device shared between the registry and its users.
///
/// All mutable data lives behind a per-device lock. Accessors lock it for the duration of the
/// call, [`lock`](Device::lock) returns a guard for several operations in a row.
pub struct Device {
    id: DeviceId,
    info: DeviceInfo,
    inner: Mutex<Inner>,
}

impl Device {
    pub fn new(
        info: DeviceInfo,
        state: DeviceState,
        backend: Box<dyn DeviceBackend>,
        status: DeviceStatus,
    ) -> Self {
        let backend = match status {
            DeviceStatus::Disconnected => None,
            _ => Some(backend),
        };

        Device {
            id: DeviceId::next(),
            info,
            inner: Mutex::new(Inner {
                status,
                state,
                backend,
            }),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn class(&self) -> DeviceClass {
        self.info.class
    }

    pub fn status(&self) -> DeviceStatus {
        self.inner().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == DeviceStatus::Connected
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the device. The guard gives access to the whole [`DeviceState`].
    pub fn lock(&self) -> DeviceGuard<'_> {
        DeviceGuard {
            inner: self.inner(),
        }
    }

    /// Reads fresh native reports.
    ///
    /// An inactive device that reports activity becomes connected; buttons that are already
    /// held are reported as `ResumeDown`. A device whose backend reports loss becomes
    /// disconnected and releases its native resources. Polling a disconnected device does
    /// nothing.
    pub fn poll(&self) -> DeviceStatus {
        let mut inner = self.inner();
        let Inner {
            status,
            state,
            backend,
        } = &mut *inner;

        let result = match backend.as_mut() {
            Some(backend) => backend.poll(state),
            None => return *status,
        };

        match result {
            PollStatus::Idle => (),
            PollStatus::Activity => {
                if *status == DeviceStatus::Inactive {
                    *status = DeviceStatus::Connected;
                    state.take_button_events();
                    state.resume_held_buttons();
                }
            }
            PollStatus::Lost => {
                info!("Device {} ({}) lost", self.id, self.info.name);
                *status = DeviceStatus::Disconnected;
                *backend = None;
            }
        }

        *status
    }

    /// Marks device as disconnected and releases its native resources. Returns false if it
    /// already was disconnected.
    pub fn disconnect(&self) -> bool {
        let mut inner = self.inner();
        if inner.status == DeviceStatus::Disconnected {
            return false;
        }

        inner.status = DeviceStatus::Disconnected;
        inner.backend = None;
        true
    }

    /// Confirms inactive device without waiting for its first activity. Returns false if the
    /// device was not inactive.
    pub fn activate(&self) -> bool {
        let mut inner = self.inner();
        if inner.status != DeviceStatus::Inactive {
            return false;
        }

        inner.status = DeviceStatus::Connected;
        inner.state.take_button_events();
        inner.state.resume_held_buttons();
        true
    }

    /// Brings suppressed device back with a fresh backend and state. Events that were not
    /// drained before are dropped.
    pub fn reactivate(
        &self,
        mut state: DeviceState,
        backend: Box<dyn DeviceBackend>,
        status: DeviceStatus,
    ) {
        let mut inner = self.inner();
        if inner.state.pointer_events_enabled() {
            state.enable_pointer_events();
        }
        inner.state = state;
        inner.backend = match status {
            DeviceStatus::Disconnected => None,
            _ => Some(backend),
        };
        inner.status = status;
    }

    pub fn button(&self, index: usize) -> Option<ButtonState> {
        self.inner().state.button(index).copied()
    }

    pub fn num_buttons(&self) -> usize {
        self.inner().state.buttons().len()
    }

    pub fn axis(&self, index: usize) -> Option<AxisState> {
        self.inner().state.axis(index).copied()
    }

    pub fn num_axes(&self) -> usize {
        self.inner().state.axes().len()
    }

    pub fn find_button(&self, id: ButtonId) -> Option<usize> {
        self.inner().state.find_button(id)
    }

    pub fn find_axis(&self, id: Axis) -> Option<usize> {
        self.inner().state.find_axis(id)
    }

    pub fn is_pressed(&self, id: ButtonId) -> bool {
        self.inner().state.is_pressed(id)
    }

    pub fn axis_value(&self, id: Axis) -> f64 {
        self.inner().state.axis_value(id)
    }

    pub fn pointer(&self) -> PointerData {
        *self.inner().state.pointer()
    }

    pub fn tracker(&self) -> TrackerData {
        *self.inner().state.tracker()
    }

    pub fn battery(&self) -> BatteryData {
        *self.inner().state.battery()
    }

    pub fn has_button_event(&self) -> bool {
        self.inner().state.has_button_event()
    }

    pub fn drain_button_events(&self) -> Vec<ButtonEvent> {
        self.inner().state.take_button_events()
    }

    pub fn has_pointer_event(&self) -> bool {
        self.inner().state.has_pointer_event()
    }

    pub fn drain_pointer_events(&self) -> Vec<PointerEvent> {
        self.inner().state.take_pointer_events()
    }

    pub fn enable_pointer_events(&self) {
        self.inner().state.enable_pointer_events()
    }

    pub fn disable_pointer_events(&self) {
        self.inner().state.disable_pointer_events()
    }

    /// Sets rumble magnitudes, both clamped to `[0, 1]`.
    pub fn set_vibration(&self, strong: f64, weak: f64) -> Result<(), DeviceError> {
        let mut inner = self.inner();
        match inner.backend.as_mut() {
            Some(backend) => backend.set_vibration(strong.clamp(0.0, 1.0), weak.clamp(0.0, 1.0)),
            None => Err(DeviceError::Disconnected),
        }
    }
}

impl Debug for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.id)
            .field("info", &self.info)
            .field("status", &self.status())
            .finish()
    }
}

/// Locked device state.
pub struct DeviceGuard<'a> {
    inner: MutexGuard<'a, Inner>,
}

impl DeviceGuard<'_> {
    pub fn status(&self) -> DeviceStatus {
        self.inner.status
    }
}

impl Deref for DeviceGuard<'_> {
    type Target = DeviceState;

    fn deref(&self) -> &DeviceState {
        &self.inner.state
    }
}

impl DerefMut for DeviceGuard<'_> {
    fn deref_mut(&mut self) -> &mut DeviceState {
        &mut self.inner.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<(usize, bool, PollStatus)>);

    impl DeviceBackend for Scripted {
        fn poll(&mut self, state: &mut DeviceState) -> PollStatus {
            match self.0.pop_front() {
                Some((idx, pressed, status)) => {
                    state.set_button(idx, pressed);
                    status
                }
                None => PollStatus::Idle,
            }
        }
    }

    fn device(script: Vec<(usize, bool, PollStatus)>, status: DeviceStatus) -> Device {
        let mut state = DeviceState::new();
        state.add_button(Some(ButtonId::FACE_A));
        state.add_button(Some(ButtonId::FACE_B));
        Device::new(
            DeviceInfo {
                name: "Scripted".to_owned(),
                class: DeviceClass::Gamepad,
                ..Default::default()
            },
            state,
            Box::new(Scripted(script.into())),
            status,
        )
    }

    #[test]
    fn class_names() {
        assert_eq!("flight_stick".parse(), Ok(DeviceClass::FlightStick));
        assert_eq!(DeviceClass::SpatialMouse.to_string(), "spatial_mouse");
        assert!("joystick".parse::<DeviceClass>().is_err());
    }

    #[test]
    fn unique_ids() {
        let a = device(vec![], DeviceStatus::Connected);
        let b = device(vec![], DeviceStatus::Connected);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn inactive_becomes_connected_on_activity() {
        let dev = device(
            vec![
                (0, true, PollStatus::Idle),
                (1, false, PollStatus::Activity),
            ],
            DeviceStatus::Inactive,
        );

        assert_eq!(dev.poll(), DeviceStatus::Inactive);
        dev.drain_button_events();
        assert_eq!(dev.poll(), DeviceStatus::Connected);

        let events = dev.drain_button_events();
        let resumed: Vec<_> = events
            .iter()
            .filter(|e| e.kind == crate::ButtonEventKind::ResumeDown)
            .collect();
        assert_eq!(resumed.len(), 1);
        assert_eq!(resumed[0].button, ButtonId::FACE_A);
    }

    #[test]
    fn lost_device_is_frozen() {
        let dev = device(
            vec![
                (0, true, PollStatus::Activity),
                (1, true, PollStatus::Lost),
                (0, false, PollStatus::Activity),
            ],
            DeviceStatus::Connected,
        );

        assert_eq!(dev.poll(), DeviceStatus::Connected);
        assert_eq!(dev.poll(), DeviceStatus::Disconnected);
        let before = dev.lock().buttons().to_vec();

        assert_eq!(dev.poll(), DeviceStatus::Disconnected);
        assert_eq!(dev.lock().buttons(), &before[..]);
        assert!(matches!(
            dev.set_vibration(1.0, 1.0),
            Err(DeviceError::Disconnected)
        ));
        assert!(!dev.disconnect());
    }

    #[test]
    fn guard_gives_state_access() {
        let dev = device(vec![], DeviceStatus::Connected);
        {
            let mut guard = dev.lock();
            assert_eq!(guard.status(), DeviceStatus::Connected);
            guard.set_button(1, true);
        }
        assert!(dev.is_pressed(ButtonId::FACE_B));
        assert!(dev.has_button_event());
        assert_eq!(dev.drain_button_events().len(), 1);
        assert!(!dev.has_button_event());
        assert!(matches!(
            dev.set_vibration(0.5, 0.5),
            Err(DeviceError::NotSupported)
        ));
    }

    #[test]
    fn disconnect_and_reactivate() {
        let dev = device(vec![], DeviceStatus::Connected);
        assert!(dev.disconnect());
        assert_eq!(dev.status(), DeviceStatus::Disconnected);

        dev.reactivate(
            fresh_state(),
            Box::new(Scripted(vec![(0, true, PollStatus::Activity)].into())),
            DeviceStatus::Inactive,
        );
        assert_eq!(dev.poll(), DeviceStatus::Connected);
    }

    fn fresh_state() -> DeviceState {
        let mut state = DeviceState::new();
        state.add_button(Some(ButtonId::FACE_A));
        state.add_button(Some(ButtonId::FACE_B));
        state
    }

    #[test]
    fn reactivation_forgets_held_buttons() {
        let dev = device(vec![(1, true, PollStatus::Activity)], DeviceStatus::Connected);
        dev.enable_pointer_events();
        dev.poll();
        assert!(dev.is_pressed(ButtonId::FACE_B));
        assert!(dev.disconnect());

        dev.reactivate(
            fresh_state(),
            Box::new(Scripted(vec![(0, true, PollStatus::Activity)].into())),
            DeviceStatus::Inactive,
        );
        assert!(!dev.is_pressed(ButtonId::FACE_B));
        assert!(!dev.has_button_event());
        assert!(dev.lock().pointer_events_enabled());

        assert_eq!(dev.poll(), DeviceStatus::Connected);
        let events = dev.drain_button_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].button, ButtonId::FACE_A);
        assert_eq!(events[0].kind, crate::ButtonEventKind::ResumeDown);
    }

    #[test]
    fn promotion_reports_held_button_once() {
        let dev = device(
            vec![
                (0, true, PollStatus::Idle),
                (1, true, PollStatus::Activity),
            ],
            DeviceStatus::Inactive,
        );

        dev.poll();
        assert_eq!(dev.poll(), DeviceStatus::Connected);

        let events = dev.drain_button_events();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| e.kind == crate::ButtonEventKind::ResumeDown));

        let dev = device(vec![(0, true, PollStatus::Idle)], DeviceStatus::Inactive);
        dev.poll();
        assert!(dev.activate());
        let events = dev.drain_button_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, crate::ButtonEventKind::ResumeDown);
    }
}
