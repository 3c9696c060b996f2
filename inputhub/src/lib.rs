// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! inputhub - hot-plug aware registry of input devices
//! ===================================================
//!
//! inputhub discovers gamepads, joysticks, flight sticks and (optionally) mice and keyboards,
//! translates their native reports into one canonical device model and keeps track of devices
//! being plugged and unplugged.
//!
//! Example
//! -------
//!
//! ```no_run
//! use inputhub::{ButtonId, Notification, Registry};
//!
//! let registry = Registry::get_global_ptr();
//! registry.subscribe(|n: &Notification| println!("{}", n));
//!
//! loop {
//!     // Process hot-plug signals.
//!     registry.update();
//!
//!     for pad in registry.get_gamepads() {
//!         pad.poll();
//!         if pad.is_pressed(ButtonId::FACE_A) {
//!             println!("{} pressed A", pad.name());
//!         }
//!     }
//! #   break;
//! }
//! ```
//!
//! Supported features
//! ------------------
//!
//! |                  | Hot-plug | Buttons & axes | Pointer | Battery | Vibration |
//! |------------------|:--------:|:--------------:|:-------:|:-------:|:---------:|
//! | Linux            |    ✓     |       ✓        |    ✓    |    ✓    |     ✓     |
//! | Windows (HID)    |    ✓     |       ✓        |    ✕    |    ✕    |     ✕     |
//! | Windows (XInput) |    ✓     |       ✓        |   n/a   |    ✓    |     ✓     |
//! | macOS            |    ✓     |       ✓        |    ✓    |    ✕    |     ✕     |
//!
//! Devices
//! -------
//!
//! Every device is shared as `Arc<Device>`. Polling a device reads all pending native reports
//! and updates its buttons and axes; button transitions and pointer motion are queued and can be
//! drained with [`Device::drain_button_events`] and [`Device::drain_pointer_events`]. Pointer
//! events are only queued after [`Device::enable_pointer_events`].
//!
//! Some hardware reports slots that are not backed by a real device (e.g. wireless receivers).
//! Such devices start *inactive*: the registry polls them on every [`Registry::update`] and
//! announces them only after they report activity.
//!
//! Quirks
//! ------
//!
//! Devices with nonstandard reports are fixed with a vendor/product keyed [`QuirkTable`]. Extra
//! entries can be added through the `INPUTHUB_QUIRKS` environment variable, for example
//! `INPUTHUB_QUIRKS=045e:0719=gamepad:connect_if_nonzero`.
//!
//! Platform specific notes
//! ======================
//!
//! Linux
//! -----
//!
//! Devices are read from `/dev/input/event*`, falling back to `/dev/input/js*` when the event
//! device is not readable yet. The user needs read access (and write access for vibration) to
//! these files. Hot-plug is detected with inotify and metadata is read through udev, which can
//! be disabled with `INPUTHUB_DISABLE_UDEV`.
//!
//! macOS
//! -----
//!
//! IOKit callbacks are delivered on the run loop selected by [`RegistryBuilder::run_loop`]. With
//! the default [`RunLoopMode::Main`] the host application has to run the main run loop.
//!
//! Windows
//! -------
//!
//! HID devices are read with Raw Input on a backend owned thread. XInput controllers are polled
//! in four fixed slots.

#[macro_use]
extern crate log;

mod error;
mod notify;
mod registry;

pub use crate::error::Error;
pub use crate::notify::{Notification, SubscriptionId};
pub use crate::registry::{Registry, RegistryBuilder};

pub use inputhub_core::{
    Axis, AxisState, BatteryData, ButtonEvent, ButtonEventKind, ButtonId, ButtonRegistry,
    ButtonState, ButtonStatus, Device, DeviceClass, DeviceError, DeviceId, DeviceInfo,
    DeviceStatus, Features, PointerData, PointerEvent, PowerStatus, QuirkTable, Quirks,
    RunLoopMode, TrackerData, VirtualController, VirtualDeviceBuilder,
};
