// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::device::Device;
use crate::error::PlatformError;
use crate::quirks::QuirkTable;

use std::sync::Arc;
use std::time::Duration;

/// Receives devices discovered by a backend.
///
/// Calls may come from OS managed threads.
pub trait HotplugSink: Send + Sync {
    /// New device was opened. It may still be [`Inactive`](crate::DeviceStatus::Inactive).
    fn device_arrived(&self, device: Arc<Device>);
    /// Device was unplugged. The backend already marked it as disconnected.
    fn device_removed(&self, device: &Arc<Device>);
}

/// Discovers devices of one platform and watches for hot-plug.
pub trait InputBackend: Send {
    fn name(&self) -> &'static str;

    /// Enumerates devices that are already present and starts listening for hot-plug. Devices
    /// are reported to `sink`.
    fn start(&mut self, sink: Arc<dyn HotplugSink>) -> Result<(), PlatformError>;

    /// Processes pending hot-plug signals. Called once per host tick and never blocks.
    fn update(&mut self);
}

/// Backend for platforms without input support. It never reports any device.
#[derive(Debug, Default)]
pub struct NullBackend;

impl InputBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn start(&mut self, _: Arc<dyn HotplugSink>) -> Result<(), PlatformError> {
        Ok(())
    }

    fn update(&mut self) {}
}

/// Run loop that receives IOKit callbacks on macOS.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum RunLoopMode {
    /// Main thread run loop of the host application.
    #[default]
    Main,
    /// Run loop of a thread owned by the backend.
    Dedicated,
}

/// Options passed to platform backends.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// Also report mice and keyboards.
    pub enable_mouse_keyboard: bool,
    pub quirks: QuirkTable,
    /// How often empty XInput slots are probed on Windows.
    pub xinput_poll_interval: Duration,
    /// Use udev for device metadata on Linux.
    pub use_udev: bool,
    pub run_loop: RunLoopMode,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            enable_mouse_keyboard: false,
            quirks: QuirkTable::builtin(),
            xinput_poll_interval: Duration::from_secs(1),
            use_udev: true,
            run_loop: RunLoopMode::default(),
        }
    }
}
