// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! IOKit HID manager backend.
//!
//! Devices are discovered and removed by HID manager callbacks which run on the selected run
//! loop. Values are read when the registry polls each device.

mod device;
mod io_kit;

use self::io_kit::{IOHIDDevice, IOHIDManager};
use crate::backend::{BackendConfig, HotplugSink, InputBackend, RunLoopMode};
use crate::device::Device;
use crate::error::PlatformError;
use crate::hid::{
    PAGE_GENERIC_DESKTOP, USAGE_GAMEPAD, USAGE_JOYSTICK, USAGE_KEYBOARD, USAGE_MOUSE,
    USAGE_MULTI_AXIS_CONTROLLER,
};
use crate::quirks::QuirkTable;

use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop};
use io_kit_sys::hid::base::IOHIDDeviceRef;
use io_kit_sys::ret::IOReturn;

use std::io;
use std::os::raw::c_void;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

/// State reachable from HID manager callbacks.
struct Shared {
    sink: Arc<dyn HotplugSink>,
    quirks: QuirkTable,
    enable_mouse_keyboard: bool,
    /// Open devices keyed by address of their IOKit object.
    devices: Mutex<Vec<(usize, Arc<Device>)>>,
}

impl Shared {
    fn devices(&self) -> MutexGuard<'_, Vec<(usize, Arc<Device>)>> {
        self.devices.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// HID manager with callbacks bound to `Shared`. Unregisters everything on drop.
struct Manager {
    manager: IOHIDManager,
    context: *const Shared,
    run_loop: CFRunLoop,
}

unsafe impl Send for Manager {}

impl Manager {
    fn new(usages: &[(u16, u16)], shared: Arc<Shared>, run_loop: CFRunLoop) -> Option<Self> {
        let mut manager = IOHIDManager::new(usages)?;
        let context = Arc::into_raw(shared);

        manager.register_device_matching_callback(device_matching_cb, context as *mut c_void);
        manager.register_device_removal_callback(device_removal_cb, context as *mut c_void);
        manager.schedule_with_run_loop(&run_loop, unsafe { kCFRunLoopDefaultMode });

        Some(Manager {
            manager,
            context,
            run_loop,
        })
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.manager
            .unschedule_from_run_loop(&self.run_loop, unsafe { kCFRunLoopDefaultMode });
        unsafe { drop(Arc::from_raw(self.context)) };
    }
}

pub struct MacBackend {
    quirks: QuirkTable,
    enable_mouse_keyboard: bool,
    run_loop: RunLoopMode,
    manager: Option<Manager>,
}

impl MacBackend {
    pub fn new(config: &BackendConfig) -> Self {
        MacBackend {
            quirks: config.quirks.clone(),
            enable_mouse_keyboard: config.enable_mouse_keyboard,
            run_loop: config.run_loop,
            manager: None,
        }
    }

    fn usages(&self) -> Vec<(u16, u16)> {
        let mut usages = vec![
            (PAGE_GENERIC_DESKTOP, USAGE_JOYSTICK),
            (PAGE_GENERIC_DESKTOP, USAGE_GAMEPAD),
            (PAGE_GENERIC_DESKTOP, USAGE_MULTI_AXIS_CONTROLLER),
        ];

        if self.enable_mouse_keyboard {
            usages.push((PAGE_GENERIC_DESKTOP, USAGE_MOUSE));
            usages.push((PAGE_GENERIC_DESKTOP, USAGE_KEYBOARD));
        }

        usages
    }
}

impl InputBackend for MacBackend {
    fn name(&self) -> &'static str {
        "iokit"
    }

    fn start(&mut self, sink: Arc<dyn HotplugSink>) -> Result<(), PlatformError> {
        let shared = Arc::new(Shared {
            sink,
            quirks: self.quirks.clone(),
            enable_mouse_keyboard: self.enable_mouse_keyboard,
            devices: Mutex::new(Vec::new()),
        });
        let usages = self.usages();

        match self.run_loop {
            RunLoopMode::Main => {
                let manager = Manager::new(&usages, shared, CFRunLoop::get_main())
                    .ok_or_else(|| io::Error::other("failed to open IOHIDManager"))?;
                self.manager = Some(manager);
            }
            RunLoopMode::Dedicated => {
                let (tx, rx) = mpsc::sync_channel(1);

                thread::Builder::new()
                    .name("inputhub-iokit".into())
                    .spawn(move || {
                        let manager = Manager::new(&usages, shared, CFRunLoop::get_current());
                        let opened = manager.is_some();
                        let _ = tx.send(opened);

                        if opened {
                            CFRunLoop::run_current();
                        }
                        drop(manager);
                    })?;

                match rx.recv() {
                    Ok(true) => (),
                    _ => return Err(io::Error::other("failed to open IOHIDManager").into()),
                }
            }
        }

        Ok(())
    }

    fn update(&mut self) {}
}

extern "C" fn device_matching_cb(
    context: *mut c_void,
    _result: IOReturn,
    _sender: *mut c_void,
    device: IOHIDDeviceRef,
) {
    let shared = unsafe { &*(context as *const Shared) };
    let key = device as usize;

    if shared.devices().iter().any(|(k, _)| *k == key) {
        return;
    }

    let Some(hid_device) = IOHIDDevice::retain(device) else {
        return;
    };

    if let Some(device) = device::open(hid_device, &shared.quirks, shared.enable_mouse_keyboard) {
        debug!("Device {} ({}) matched", device.id(), device.name());
        shared.devices().push((key, device.clone()));
        shared.sink.device_arrived(device);
    }
}

extern "C" fn device_removal_cb(
    context: *mut c_void,
    _result: IOReturn,
    _sender: *mut c_void,
    device: IOHIDDeviceRef,
) {
    let shared = unsafe { &*(context as *const Shared) };
    let key = device as usize;

    let removed = {
        let mut devices = shared.devices();
        devices
            .iter()
            .position(|(k, _)| *k == key)
            .map(|i| devices.swap_remove(i).1)
    };

    if let Some(device) = removed {
        device.disconnect();
        shared.sink.device_removed(&device);
    }
}

pub fn new_backend(config: &BackendConfig) -> Box<dyn InputBackend> {
    Box::new(MacBackend::new(config))
}
