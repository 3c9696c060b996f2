// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Human readable names of raw input devices.
//!
//! HID nodes usually carry generic descriptions, so the device tree is walked upward to the
//! nearest USB node with a usable name. The joystick OEM registry key and the HID node itself
//! are used as fallbacks.

use winapi::shared::minwindef::{DWORD, ULONG};
use winapi::shared::winerror::ERROR_SUCCESS;
use winapi::um::cfgmgr32::{
    CM_Get_DevNode_Registry_PropertyW, CM_Get_Device_IDW, CM_Get_Parent, CM_Locate_DevNodeW,
    CM_DRP_DEVICEDESC, CM_DRP_FRIENDLYNAME, CM_DRP_MFG, CM_LOCATE_DEVNODE_NORMAL, CR_SUCCESS,
    DEVINST,
};
use winapi::um::winreg::{RegGetValueW, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, RRF_RT_REG_SZ};

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::ptr;

const MAX_DEPTH: usize = 8;
const DEVICE_ID_LEN: usize = 200;
const OEM_KEY: &str =
    r"System\CurrentControlSet\Control\MediaProperties\PrivateProperties\Joystick\OEM";
const BUS_USB: u16 = 0x03;
const BUS_BLUETOOTH: u16 = 0x05;

const GENERIC_NAMES: &[&str] = &[
    "USB Input Device",
    "USB Composite Device",
    "HID-compliant device",
    "HID-compliant game controller",
    "HID-compliant vendor-defined device",
    "Bluetooth HID Device",
    "Bluetooth Low Energy GATT compliant HID device",
];

/// What the device tree says about a device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    /// Bus type in Linux numbering.
    pub bus: Option<u16>,
}

/// Devices handled by XInput carry `IG_` in their raw input path.
pub fn is_xinput_path(path: &str) -> bool {
    path.to_ascii_uppercase().contains("IG_")
}

/// Device instance id of a device interface path, e.g.
/// `\\?\HID#VID_045E&PID_0719#7&1a2b&0&0000#{4d1e55b2-...}` becomes
/// `HID\VID_045E&PID_0719\7&1a2b&0&0000`.
pub fn instance_id(path: &str) -> Option<String> {
    let path = path
        .strip_prefix(r"\\?\")
        .or_else(|| path.strip_prefix(r"\??\"))?;
    let path = match path.rfind('#') {
        Some(pos) if path[pos + 1..].starts_with('{') => &path[..pos],
        _ => path,
    };

    if path.is_empty() {
        None
    } else {
        Some(path.replace('#', "\\"))
    }
}

pub fn is_generic_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || GENERIC_NAMES.iter().any(|g| g.eq_ignore_ascii_case(name))
}

fn bus_of(id: &str) -> Option<u16> {
    let id = id.to_ascii_uppercase();
    if id.starts_with(r"USB\") {
        Some(BUS_USB)
    } else if id.starts_with("BTH") || id.contains("{00001124-") {
        Some(BUS_BLUETOOTH)
    } else {
        None
    }
}

pub fn describe(path: &str, vendor_id: u16, product_id: u16) -> NodeInfo {
    let mut info = NodeInfo::default();
    let Some(id) = instance_id(path) else {
        return info;
    };
    info.bus = bus_of(&id);

    let Some(mut node) = locate(&id) else {
        debug!("No device node for {}", id);
        info.name = oem_name(vendor_id, product_id);
        return info;
    };
    let hid_name = node_name(node);

    for _ in 0..MAX_DEPTH {
        let Some(parent) = parent(node) else {
            break;
        };
        node = parent;

        let Some(parent_id) = device_id(node) else {
            break;
        };
        if let Some(bus) = bus_of(&parent_id) {
            info.bus.get_or_insert(bus);
        }

        if bus_of(&parent_id) == Some(BUS_USB) {
            if let Some(name) = node_name(node).filter(|n| !is_generic_name(n)) {
                info.name = Some(name);
                info.manufacturer = property(node, CM_DRP_MFG);
                break;
            }
        }
    }

    if info.name.is_none() {
        info.name = oem_name(vendor_id, product_id).or(hid_name);
    }

    info
}

fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(Some(0)).collect()
}

fn from_wide(buf: &[u16]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..len])
}

fn locate(id: &str) -> Option<DEVINST> {
    let mut wide = to_wide(id);
    let mut node = 0;
    let ret = unsafe { CM_Locate_DevNodeW(&mut node, wide.as_mut_ptr(), CM_LOCATE_DEVNODE_NORMAL) };
    (ret == CR_SUCCESS).then_some(node)
}

fn parent(node: DEVINST) -> Option<DEVINST> {
    let mut parent = 0;
    let ret = unsafe { CM_Get_Parent(&mut parent, node, 0) };
    (ret == CR_SUCCESS).then_some(parent)
}

fn device_id(node: DEVINST) -> Option<String> {
    let mut buf = [0u16; DEVICE_ID_LEN + 1];
    let ret = unsafe { CM_Get_Device_IDW(node, buf.as_mut_ptr(), buf.len() as ULONG, 0) };
    (ret == CR_SUCCESS).then(|| from_wide(&buf))
}

fn node_name(node: DEVINST) -> Option<String> {
    property(node, CM_DRP_FRIENDLYNAME).or_else(|| property(node, CM_DRP_DEVICEDESC))
}

fn property(node: DEVINST, property: ULONG) -> Option<String> {
    let mut buf = [0u16; 256];
    let mut len = (buf.len() * 2) as ULONG;
    let ret = unsafe {
        CM_Get_DevNode_Registry_PropertyW(
            node,
            property,
            ptr::null_mut(),
            buf.as_mut_ptr().cast(),
            &mut len,
            0,
        )
    };

    if ret != CR_SUCCESS {
        return None;
    }

    let name = from_wide(&buf[..(len as usize / 2).min(buf.len())]);
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_owned())
}

/// Name stored by the game controller control panel.
fn oem_name(vendor_id: u16, product_id: u16) -> Option<String> {
    let key = format!(r"{}\VID_{:04X}&PID_{:04X}", OEM_KEY, vendor_id, product_id);
    let key = to_wide(&key);
    let value = to_wide("OEMName");

    [HKEY_LOCAL_MACHINE, HKEY_CURRENT_USER]
        .into_iter()
        .find_map(|root| {
            let mut buf = [0u16; 256];
            let mut len = (buf.len() * 2) as DWORD;
            let ret = unsafe {
                RegGetValueW(
                    root,
                    key.as_ptr(),
                    value.as_ptr(),
                    RRF_RT_REG_SZ,
                    ptr::null_mut(),
                    buf.as_mut_ptr().cast(),
                    &mut len,
                )
            };
            (ret == ERROR_SUCCESS as i32).then(|| from_wide(&buf))
        })
        .filter(|name| !is_generic_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids() {
        assert_eq!(
            instance_id(r"\\?\HID#VID_045E&PID_0719#7&1a2b&0&0000#{4d1e55b2-f16f}").as_deref(),
            Some(r"HID\VID_045E&PID_0719\7&1a2b&0&0000")
        );
        assert_eq!(
            instance_id(r"\??\HID#VID_046D&PID_C215#6&2b3c&0&0000").as_deref(),
            Some(r"HID\VID_046D&PID_C215\6&2b3c&0&0000")
        );
        assert_eq!(instance_id("HID#VID_046D"), None);
    }

    #[test]
    fn xinput_marker() {
        assert!(is_xinput_path(r"\\?\HID#VID_045E&PID_028E&IG_00#7&1a2b&0&0000#{4d1e}"));
        assert!(!is_xinput_path(r"\\?\HID#VID_046D&PID_C215#6&2b3c&0&0000#{4d1e}"));
    }

    #[test]
    fn generic_names() {
        assert!(is_generic_name("HID-compliant game controller"));
        assert!(is_generic_name("  "));
        assert!(!is_generic_name("Logitech Extreme 3D"));
        assert_eq!(bus_of(r"USB\VID_046D&PID_C215\5&1"), Some(BUS_USB));
        assert_eq!(bus_of(r"BTHENUM\{00001124-0000}"), Some(BUS_BLUETOOTH));
        assert_eq!(bus_of(r"HID\VID_046D"), None);
    }
}
