// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Minimal libudev wrapper used to look up device metadata.

use libudev_sys as ud;
use std::ffi::{CStr, CString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

#[derive(Debug)]
pub struct Udev(*mut ud::udev);

// libudev contexts may be moved between threads as long as they are not used concurrently.
unsafe impl Send for Udev {}

impl Udev {
    pub fn new() -> Option<Self> {
        let u = unsafe { ud::udev_new() };
        if u.is_null() {
            None
        } else {
            Some(Udev(u))
        }
    }
}

impl Drop for Udev {
    fn drop(&mut self) {
        unsafe {
            ud::udev_unref(self.0);
        }
    }
}

pub struct Device(*mut ud::udev_device);

impl Device {
    pub fn from_syspath(udev: &Udev, path: &Path) -> Option<Self> {
        let path = CString::new(path.as_os_str().as_bytes()).ok()?;
        let dev = unsafe { ud::udev_device_new_from_syspath(udev.0, path.as_ptr()) };
        if dev.is_null() {
            None
        } else {
            Some(Device(dev))
        }
    }

    /// Value of udev property `key`, if set and not empty.
    pub fn property_value(&self, key: &CStr) -> Option<String> {
        unsafe {
            let s = ud::udev_device_get_property_value(self.0, key.as_ptr());
            if s.is_null() {
                None
            } else {
                Some(CStr::from_ptr(s).to_string_lossy().into_owned()).filter(|s| !s.is_empty())
            }
        }
    }

    pub fn properties(&self) -> PropertyIterator {
        let prop = unsafe { ud::udev_device_get_properties_list_entry(self.0) };
        PropertyIterator(prop)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            ud::udev_device_unref(self.0);
        }
    }
}

pub struct PropertyIterator(*mut ud::udev_list_entry);

impl Iterator for PropertyIterator {
    type Item = (String, String);

    fn next(&mut self) -> Option<(String, String)> {
        if self.0.is_null() {
            return None;
        }

        let p_name = unsafe { ud::udev_list_entry_get_name(self.0) };
        let p_val = unsafe { ud::udev_list_entry_get_value(self.0) };
        if p_name.is_null() || p_val.is_null() {
            return None;
        }

        let name = unsafe { CStr::from_ptr(p_name).to_string_lossy().into_owned() };
        let value = unsafe { CStr::from_ptr(p_val).to_string_lossy().into_owned() };

        self.0 = unsafe { ud::udev_list_entry_get_next(self.0) };
        Some((name, value))
    }
}
