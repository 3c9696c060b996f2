// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
#![allow(non_upper_case_globals)]

//! Thin safe layer over the IOKit HID manager, device, element and value APIs.

use core_foundation::array::{CFArray, CFArrayGetCount, CFArrayGetValueAtIndex};
use core_foundation::base::{kCFAllocatorDefault, CFRelease, CFType, TCFType};
use core_foundation::dictionary::CFDictionary;
use core_foundation::impl_TCFType;
use core_foundation::number::CFNumber;
use core_foundation::runloop::{CFRunLoop, CFRunLoopMode};
use core_foundation::string::CFString;

use io_kit_sys::hid::base::{IOHIDDeviceCallback, IOHIDDeviceRef, IOHIDElementRef, IOHIDValueRef};
use io_kit_sys::hid::device::*;
use io_kit_sys::hid::element::*;
use io_kit_sys::hid::keys::*;
use io_kit_sys::hid::manager::*;
use io_kit_sys::hid::value::{IOHIDValueGetIntegerValue, IOHIDValueGetTimeStamp};
use io_kit_sys::ret::kIOReturnSuccess;

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;

#[repr(C)]
#[derive(Debug)]
pub struct IOHIDManager(IOHIDManagerRef);

impl_TCFType!(IOHIDManager, IOHIDManagerRef, IOHIDManagerGetTypeID);

impl IOHIDManager {
    /// Creates and opens manager matching devices with given primary `(page, usage)` pairs.
    pub fn new(usages: &[(u16, u16)]) -> Option<Self> {
        let manager = unsafe { IOHIDManagerCreate(kCFAllocatorDefault, kIOHIDOptionsTypeNone) };

        if manager.is_null() {
            return None;
        }

        let matchers: Vec<_> = usages
            .iter()
            .filter_map(|&(page, usage)| create_hid_device_matcher(page, usage))
            .collect();
        let matchers = CFArray::from_CFTypes(&matchers);
        unsafe {
            IOHIDManagerSetDeviceMatchingMultiple(manager, matchers.as_concrete_TypeRef());
        };

        let ret = unsafe { IOHIDManagerOpen(manager, kIOHIDOptionsTypeNone) };

        if ret == kIOReturnSuccess {
            Some(IOHIDManager(manager))
        } else {
            unsafe { CFRelease(manager as _) };
            None
        }
    }

    pub fn schedule_with_run_loop(&mut self, run_loop: &CFRunLoop, run_loop_mode: CFRunLoopMode) {
        unsafe {
            IOHIDManagerScheduleWithRunLoop(self.0, run_loop.as_concrete_TypeRef(), run_loop_mode)
        }
    }

    pub fn unschedule_from_run_loop(&mut self, run_loop: &CFRunLoop, run_loop_mode: CFRunLoopMode) {
        unsafe {
            IOHIDManagerUnscheduleFromRunLoop(self.0, run_loop.as_concrete_TypeRef(), run_loop_mode)
        }
    }

    pub fn register_device_matching_callback(
        &mut self,
        callback: IOHIDDeviceCallback,
        context: *mut c_void,
    ) {
        unsafe { IOHIDManagerRegisterDeviceMatchingCallback(self.0, callback, context) }
    }

    pub fn register_device_removal_callback(
        &mut self,
        callback: IOHIDDeviceCallback,
        context: *mut c_void,
    ) {
        unsafe { IOHIDManagerRegisterDeviceRemovalCallback(self.0, callback, context) }
    }
}

impl Drop for IOHIDManager {
    fn drop(&mut self) {
        unsafe {
            IOHIDManagerClose(self.0, kIOHIDOptionsTypeNone);
            CFRelease(self.as_CFTypeRef())
        }
    }
}

unsafe impl Send for IOHIDManager {}

/// Owned reference to a HID device. Keeps the device object alive even after it was
/// unplugged.
#[repr(C)]
#[derive(Debug)]
pub struct IOHIDDevice(IOHIDDeviceRef);

impl_TCFType!(IOHIDDevice, IOHIDDeviceRef, IOHIDDeviceGetTypeID);

impl IOHIDDevice {
    /// Retains `device`, which the caller doesn't own.
    pub fn retain(device: IOHIDDeviceRef) -> Option<IOHIDDevice> {
        if device.is_null() {
            None
        } else {
            Some(unsafe { IOHIDDevice::wrap_under_get_rule(device) })
        }
    }

    pub fn raw(&self) -> IOHIDDeviceRef {
        self.0
    }

    pub fn name(&self) -> Option<String> {
        self.get_string_property(kIOHIDProductKey)
    }

    pub fn manufacturer(&self) -> Option<String> {
        self.get_string_property(kIOHIDManufacturerKey)
    }

    pub fn serial_number(&self) -> Option<String> {
        self.get_string_property(kIOHIDSerialNumberKey)
    }

    /// Bus type in Linux numbering, used for the device uuid.
    pub fn bustype(&self) -> Option<u16> {
        match self.get_string_property(kIOHIDTransportKey)?.as_str() {
            "USB" => Some(0x03),
            "Bluetooth" | "Bluetooth Low Energy" => Some(0x05),
            _ => None,
        }
    }

    pub fn vendor_id(&self) -> Option<u16> {
        self.get_number_property(kIOHIDVendorIDKey).map(|v| v as u16)
    }

    pub fn product_id(&self) -> Option<u16> {
        self.get_number_property(kIOHIDProductIDKey).map(|v| v as u16)
    }

    pub fn version(&self) -> Option<u16> {
        self.get_number_property(kIOHIDVersionNumberKey).map(|v| v as u16)
    }

    pub fn primary_page(&self) -> Option<u16> {
        self.get_number_property(kIOHIDPrimaryUsagePageKey).map(|v| v as u16)
    }

    pub fn primary_usage(&self) -> Option<u16> {
        self.get_number_property(kIOHIDPrimaryUsageKey).map(|v| v as u16)
    }

    /// All elements of the device, including the nested ones.
    pub fn elements(&self) -> Vec<IOHIDElement> {
        let elements = unsafe {
            IOHIDDeviceCopyMatchingElements(self.0, ptr::null(), kIOHIDOptionsTypeNone)
        };

        if elements.is_null() {
            return vec![];
        }

        let element_count = unsafe { CFArrayGetCount(elements) };
        let mut vec = Vec::with_capacity(element_count as _);

        for i in 0..element_count {
            let element = unsafe { CFArrayGetValueAtIndex(elements, i) };

            if element.is_null() {
                continue;
            }

            vec.push(unsafe { IOHIDElement::wrap_under_get_rule(element as _) });
        }

        unsafe { CFRelease(elements as _) };
        vec
    }

    /// Current value of `element` and the time it was reported, in host time units.
    pub fn value(&self, element: &IOHIDElement) -> Option<(isize, u64)> {
        let mut value: IOHIDValueRef = ptr::null_mut();
        let ret = unsafe { IOHIDDeviceGetValue(self.0, element.0, &mut value) };

        if ret != kIOReturnSuccess || value.is_null() {
            return None;
        }

        unsafe { Some((IOHIDValueGetIntegerValue(value), IOHIDValueGetTimeStamp(value))) }
    }

    fn get_property(&self, key: *const c_char) -> Option<CFType> {
        let key = unsafe { CStr::from_ptr(key) }.to_str().ok()?;
        let key = CFString::new(key);
        let value = unsafe { IOHIDDeviceGetProperty(self.0, key.as_concrete_TypeRef()) };

        if value.is_null() {
            None
        } else {
            Some(unsafe { TCFType::wrap_under_get_rule(value) })
        }
    }

    fn get_string_property(&self, key: *const c_char) -> Option<String> {
        self.get_property(key)?
            .downcast::<CFString>()
            .map(|s| s.to_string())
    }

    fn get_number_property(&self, key: *const c_char) -> Option<i32> {
        self.get_property(key)?.downcast::<CFNumber>()?.to_i32()
    }
}

impl Drop for IOHIDDevice {
    fn drop(&mut self) {
        unsafe { CFRelease(self.as_CFTypeRef()) }
    }
}

unsafe impl Send for IOHIDDevice {}
unsafe impl Sync for IOHIDDevice {}

#[repr(C)]
#[derive(Debug)]
pub struct IOHIDElement(IOHIDElementRef);

impl_TCFType!(IOHIDElement, IOHIDElementRef, IOHIDElementGetTypeID);

impl IOHIDElement {
    pub fn cookie(&self) -> u32 {
        unsafe { IOHIDElementGetCookie(self.0) }
    }

    pub fn kind(&self) -> u32 {
        unsafe { IOHIDElementGetType(self.0) }
    }

    pub fn usage_page(&self) -> u16 {
        unsafe { IOHIDElementGetUsagePage(self.0) as u16 }
    }

    pub fn usage(&self) -> u16 {
        unsafe { IOHIDElementGetUsage(self.0) as u16 }
    }

    pub fn logical_min(&self) -> isize {
        unsafe { IOHIDElementGetLogicalMin(self.0) }
    }

    pub fn logical_max(&self) -> isize {
        unsafe { IOHIDElementGetLogicalMax(self.0) }
    }
}

impl Drop for IOHIDElement {
    fn drop(&mut self) {
        unsafe { CFRelease(self.as_CFTypeRef()) }
    }
}

unsafe impl Send for IOHIDElement {}
unsafe impl Sync for IOHIDElement {}

fn create_hid_device_matcher(page: u16, usage: u16) -> Option<CFDictionary<CFString, CFNumber>> {
    let page_key = unsafe { CStr::from_ptr(kIOHIDDeviceUsagePageKey as _) };
    let page_key = CFString::new(page_key.to_str().ok()?);
    let page_value = CFNumber::from(i32::from(page));

    let usage_key = unsafe { CStr::from_ptr(kIOHIDDeviceUsageKey as _) };
    let usage_key = CFString::new(usage_key.to_str().ok()?);
    let usage_value = CFNumber::from(i32::from(usage));

    Some(CFDictionary::from_CFType_pairs(&[
        (page_key, page_value),
        (usage_key, usage_value),
    ]))
}
