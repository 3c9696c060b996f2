// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Controllers in the four fixed XInput slots.

use crate::axis::Axis;
use crate::backend::HotplugSink;
use crate::button::ButtonId;
use crate::device::{
    Device, DeviceBackend, DeviceClass, DeviceInfo, DeviceStatus, Features, PollStatus,
};
use crate::error::DeviceError;
use crate::state::{BatteryData, Calibration, DeviceState, PowerStatus};

use winapi::shared::minwindef::DWORD;
use winapi::shared::winerror::{ERROR_DEVICE_NOT_CONNECTED, ERROR_SUCCESS};
use winapi::um::xinput::{
    self, XINPUT_BATTERY_INFORMATION, XINPUT_CAPABILITIES, XINPUT_GAMEPAD, XINPUT_STATE,
    XINPUT_VIBRATION,
};
use winapi::um::xinput::{
    XINPUT_GAMEPAD_A, XINPUT_GAMEPAD_B, XINPUT_GAMEPAD_BACK, XINPUT_GAMEPAD_DPAD_DOWN,
    XINPUT_GAMEPAD_DPAD_LEFT, XINPUT_GAMEPAD_DPAD_RIGHT, XINPUT_GAMEPAD_DPAD_UP,
    XINPUT_GAMEPAD_LEFT_SHOULDER, XINPUT_GAMEPAD_LEFT_THUMB, XINPUT_GAMEPAD_RIGHT_SHOULDER,
    XINPUT_GAMEPAD_RIGHT_THUMB, XINPUT_GAMEPAD_START, XINPUT_GAMEPAD_X, XINPUT_GAMEPAD_Y,
};
use uuid::Uuid;

use std::io;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const SLOTS: usize = 4;

const BATTERY_INTERVAL: Duration = Duration::from_secs(10);

const BATTERY_DEVTYPE_GAMEPAD: u8 = 0x00;
const BATTERY_TYPE_DISCONNECTED: u8 = 0x00;
const BATTERY_TYPE_WIRED: u8 = 0x01;
const BATTERY_TYPE_ALKALINE: u8 = 0x02;
const BATTERY_TYPE_NIMH: u8 = 0x03;
const BATTERY_LEVEL_FULL: u8 = 0x03;

const DEVSUBTYPE_WHEEL: u8 = 0x02;
const DEVSUBTYPE_FLIGHT_STICK: u8 = 0x04;
const DEVSUBTYPE_DANCE_PAD: u8 = 0x05;

const BUTTONS: [(u16, ButtonId); 14] = [
    (XINPUT_GAMEPAD_DPAD_UP, ButtonId::DPAD_UP),
    (XINPUT_GAMEPAD_DPAD_DOWN, ButtonId::DPAD_DOWN),
    (XINPUT_GAMEPAD_DPAD_LEFT, ButtonId::DPAD_LEFT),
    (XINPUT_GAMEPAD_DPAD_RIGHT, ButtonId::DPAD_RIGHT),
    (XINPUT_GAMEPAD_START, ButtonId::START),
    (XINPUT_GAMEPAD_BACK, ButtonId::BACK),
    (XINPUT_GAMEPAD_LEFT_THUMB, ButtonId::LSTICK),
    (XINPUT_GAMEPAD_RIGHT_THUMB, ButtonId::RSTICK),
    (XINPUT_GAMEPAD_LEFT_SHOULDER, ButtonId::LSHOULDER),
    (XINPUT_GAMEPAD_RIGHT_SHOULDER, ButtonId::RSHOULDER),
    (XINPUT_GAMEPAD_A, ButtonId::FACE_A),
    (XINPUT_GAMEPAD_B, ButtonId::FACE_B),
    (XINPUT_GAMEPAD_X, ButtonId::FACE_X),
    (XINPUT_GAMEPAD_Y, ButtonId::FACE_Y),
];

pub fn class_for_subtype(subtype: u8) -> DeviceClass {
    match subtype {
        DEVSUBTYPE_WHEEL => DeviceClass::SteeringWheel,
        DEVSUBTYPE_FLIGHT_STICK => DeviceClass::FlightStick,
        DEVSUBTYPE_DANCE_PAD => DeviceClass::DancePad,
        _ => DeviceClass::Gamepad,
    }
}

pub fn battery_data(battery_type: u8, level: u8) -> BatteryData {
    let status = match battery_type {
        BATTERY_TYPE_WIRED => PowerStatus::Wired,
        BATTERY_TYPE_ALKALINE | BATTERY_TYPE_NIMH if level >= BATTERY_LEVEL_FULL => {
            PowerStatus::Charged
        }
        BATTERY_TYPE_ALKALINE | BATTERY_TYPE_NIMH => PowerStatus::Discharging,
        _ => PowerStatus::Unknown,
    };

    match status {
        PowerStatus::Discharging | PowerStatus::Charged => BatteryData {
            level: level.min(BATTERY_LEVEL_FULL),
            max_level: BATTERY_LEVEL_FULL,
            status,
        },
        _ => BatteryData {
            status,
            ..Default::default()
        },
    }
}

/// Button and axis indices of an XInput controller.
#[derive(Copy, Clone, Debug)]
pub struct PadLayout {
    buttons: [usize; 14],
    axes: [usize; 6],
}

impl PadLayout {
    pub fn build(state: &mut DeviceState) -> Self {
        let buttons = BUTTONS.map(|(_, id)| state.add_button(Some(id)));

        let stick = Calibration::centered(f64::from(i16::MIN), f64::from(i16::MAX));
        let trigger = Calibration::zero_based(0.0, f64::from(u8::MAX));
        let axes = [
            (Axis::LeftX, stick),
            (Axis::LeftY, stick),
            (Axis::RightX, stick),
            (Axis::RightY, stick),
            (Axis::LeftTrigger, trigger),
            (Axis::RightTrigger, trigger),
        ]
        .map(|(axis, calibration)| state.add_calibrated_axis(Some(axis), calibration));

        PadLayout { buttons, axes }
    }

    /// Applies gamepad report. Returns true if anything changed.
    pub fn apply(&self, state: &mut DeviceState, pad: &XINPUT_GAMEPAD) -> bool {
        let mut changed = false;

        for (&index, &(mask, _)) in self.buttons.iter().zip(BUTTONS.iter()) {
            changed |= state.set_button(index, pad.wButtons & mask != 0);
        }

        let values = [
            f64::from(pad.sThumbLX),
            f64::from(pad.sThumbLY),
            f64::from(pad.sThumbRX),
            f64::from(pad.sThumbRY),
            f64::from(pad.bLeftTrigger),
            f64::from(pad.bRightTrigger),
        ];
        for (&index, value) in self.axes.iter().zip(values) {
            changed |= state.set_axis_raw(index, value);
        }

        changed
    }
}

fn get_state(slot: u32) -> Result<XINPUT_STATE, DWORD> {
    let mut state: XINPUT_STATE = unsafe { mem::zeroed() };
    match unsafe { xinput::XInputGetState(slot, &mut state) } {
        ERROR_SUCCESS => Ok(state),
        err => Err(err),
    }
}

fn get_battery(slot: u32) -> Option<BatteryData> {
    let mut info: XINPUT_BATTERY_INFORMATION = unsafe { mem::zeroed() };
    let err =
        unsafe { xinput::XInputGetBatteryInformation(slot, BATTERY_DEVTYPE_GAMEPAD, &mut info) };

    if err != ERROR_SUCCESS || info.BatteryType == BATTERY_TYPE_DISCONNECTED {
        None
    } else {
        Some(battery_data(info.BatteryType, info.BatteryLevel))
    }
}

pub struct XInputBackend {
    slot: u32,
    layout: PadLayout,
    packet: Option<DWORD>,
    battery_read: Instant,
}

impl DeviceBackend for XInputBackend {
    fn poll(&mut self, state: &mut DeviceState) -> PollStatus {
        let report = match get_state(self.slot) {
            Ok(report) => report,
            Err(ERROR_DEVICE_NOT_CONNECTED) => return PollStatus::Lost,
            Err(err) => {
                error!("XInputGetState({}) failed with error {}", self.slot, err);
                return PollStatus::Idle;
            }
        };

        if self.battery_read.elapsed() >= BATTERY_INTERVAL {
            self.battery_read = Instant::now();
            if let Some(battery) = get_battery(self.slot) {
                state.set_battery(battery);
            }
        }

        if self.packet == Some(report.dwPacketNumber) {
            return PollStatus::Idle;
        }
        self.packet = Some(report.dwPacketNumber);

        if self.layout.apply(state, &report.Gamepad) {
            PollStatus::Activity
        } else {
            PollStatus::Idle
        }
    }

    fn set_vibration(&mut self, strong: f64, weak: f64) -> Result<(), DeviceError> {
        let mut vibration = XINPUT_VIBRATION {
            wLeftMotorSpeed: (strong * f64::from(u16::MAX)) as u16,
            wRightMotorSpeed: (weak * f64::from(u16::MAX)) as u16,
        };

        match unsafe { xinput::XInputSetState(self.slot, &mut vibration) } {
            ERROR_SUCCESS => Ok(()),
            ERROR_DEVICE_NOT_CONNECTED => Err(DeviceError::Disconnected),
            err => Err(DeviceError::Io(io::Error::from_raw_os_error(err as i32))),
        }
    }
}

fn open(slot: u32) -> Option<Arc<Device>> {
    let mut caps: XINPUT_CAPABILITIES = unsafe { mem::zeroed() };
    if unsafe { xinput::XInputGetCapabilities(slot, 0, &mut caps) } != ERROR_SUCCESS {
        return None;
    }
    let report = get_state(slot).ok()?;

    let class = class_for_subtype(caps.SubType);
    let mut state = DeviceState::new();
    let layout = PadLayout::build(&mut state);
    layout.apply(&mut state, &report.Gamepad);
    state.take_button_events();

    let battery = get_battery(slot);
    state.set_battery(battery.unwrap_or_default());

    let mut features = Features::VIBRATION;
    features.set(Features::BATTERY, battery.is_some());

    let info = DeviceInfo {
        name: format!("XInput Controller {}", slot + 1),
        uuid: Uuid::nil(),
        class,
        features,
        ..Default::default()
    };

    debug!("XInput slot {}: class: {}, subtype: {}", slot, class, caps.SubType);

    let backend = XInputBackend {
        slot,
        layout,
        packet: Some(report.dwPacketNumber),
        battery_read: Instant::now(),
    };

    Some(Arc::new(Device::new(
        info,
        state,
        Box::new(backend),
        DeviceStatus::Connected,
    )))
}

/// Probes the XInput slots on a fixed interval.
pub struct XInputSlots {
    devices: [Option<Arc<Device>>; SLOTS],
    interval: Duration,
    last_probe: Option<Instant>,
}

impl XInputSlots {
    pub fn new(interval: Duration) -> Self {
        XInputSlots {
            devices: Default::default(),
            interval,
            last_probe: None,
        }
    }

    /// Reports controllers that appeared or went away since the last probe. Does nothing until
    /// the probe interval elapses.
    pub fn update(&mut self, sink: &dyn HotplugSink) {
        if self
            .last_probe
            .is_some_and(|last| last.elapsed() < self.interval)
        {
            return;
        }
        self.last_probe = Some(Instant::now());

        for (slot, entry) in self.devices.iter_mut().enumerate() {
            let slot = slot as u32;

            if let Some(device) = entry {
                let gone = device.status() == DeviceStatus::Disconnected
                    || matches!(get_state(slot), Err(ERROR_DEVICE_NOT_CONNECTED));
                if gone {
                    if device.disconnect() {
                        sink.device_removed(device);
                    }
                    *entry = None;
                }
                continue;
            }

            if let Some(device) = open(slot) {
                info!("XInput controller connected to slot {}", slot);
                *entry = Some(device.clone());
                sink.device_arrived(device);
            }
        }
    }
}
