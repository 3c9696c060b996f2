// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! inputhub-core
//! =============
//!
//! Low level half of inputhub. This crate turns the native input APIs of each platform into one
//! canonical device model:
//!
//! - every device is an [`Device`] with an ordered list of buttons ([`ButtonState`]) and axes
//!   ([`AxisState`]), a pointer snapshot, a tracker pose and battery information,
//! - button transitions and pointer motion are queued as [`ButtonEvent`]s and [`PointerEvent`]s
//!   which the owner drains once per poll,
//! - each platform provides an [`InputBackend`] which discovers devices and reports hot-plug
//!   transitions to a [`HotplugSink`].
//!
//! | Platform | Interfaces                    | Hot-plug                  | Vibration |
//! |----------|-------------------------------|---------------------------|:---------:|
//! | Linux    | evdev, joydev fallback        | inotify on `/dev/input`   |     ✓     |
//! | macOS    | IOKit HID manager             | HID manager callbacks     |     ✕     |
//! | Windows  | Raw Input + HID parser, XInput| message-only window, timer|  XInput   |
//!
//! Most users want the `inputhub` crate, which owns the backend and keeps the registry of
//! connected devices.

#![allow(clippy::new_without_default)]

#[macro_use]
extern crate log;

mod axis;
mod backend;
mod button;
mod device;
mod error;
mod events;
pub mod hid;
mod platform;
pub mod quirks;
mod state;
mod utils;
mod virtual_device;

pub use crate::axis::{Axis, ParseAxisError};
pub use crate::backend::{BackendConfig, HotplugSink, InputBackend, NullBackend, RunLoopMode};
pub use crate::button::{ButtonId, ButtonRegistry};
pub use crate::device::{
    Device, DeviceBackend, DeviceClass, DeviceGuard, DeviceId, DeviceInfo, DeviceStatus, Features,
    ParseDeviceClassError, PollStatus,
};
pub use crate::error::{DeviceError, PlatformError};
pub use crate::events::{ButtonEvent, ButtonEventKind, PointerEvent};
pub use crate::platform::new_backend;
pub use crate::quirks::{ParseQuirkError, QuirkEntry, QuirkTable, Quirks};
pub use crate::state::{
    AxisState, BatteryData, ButtonState, ButtonStatus, Calibration, DeviceState, PointerData,
    PowerStatus, TrackerData,
};
pub use crate::virtual_device::{VirtualController, VirtualDeviceBuilder};
