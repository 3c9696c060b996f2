// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! HID devices read through raw input.
//!
//! A message-only window on a dedicated thread receives `WM_INPUT` reports and
//! `WM_INPUT_DEVICE_CHANGE` notifications. Reports are parsed on that thread and queued per
//! device until the device is polled.

use super::devnode;
use super::hidp::{HidParser, PreparsedData};
use crate::backend::HotplugSink;
use crate::device::{
    Device, DeviceBackend, DeviceClass, DeviceInfo, DeviceStatus, Features, PollStatus,
};
use crate::hid::{self, HidData, HidDescription, ReportLayout};
use crate::quirks::{QuirkTable, Quirks};
use crate::state::DeviceState;
use crate::utils;

use uuid::Uuid;
use winapi::shared::minwindef::{UINT, WPARAM};
use winapi::shared::windef::HWND;
use winapi::um::libloaderapi::GetModuleHandleW;
use winapi::um::processthreadsapi::GetCurrentThreadId;
use winapi::um::winnt::HANDLE;
use winapi::um::winuser::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW,
    GetRawInputData, GetRawInputDeviceInfoW, GetRawInputDeviceList, PostThreadMessageW,
    RegisterClassExW, RegisterRawInputDevices, HRAWINPUT, HWND_MESSAGE, MSG, RAWINPUTDEVICE,
    RAWINPUTDEVICELIST, RAWINPUTHEADER, RIDEV_DEVNOTIFY, RIDEV_INPUTSINK, RIDI_DEVICEINFO,
    RIDI_DEVICENAME, RIDI_PREPARSEDDATA, RID_DEVICE_INFO, RID_INPUT, RIM_TYPEHID, WM_INPUT,
    WM_INPUT_DEVICE_CHANGE, WM_QUIT, WNDCLASSEXW,
};

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::io;
use std::mem;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

const QUEUE_LIMIT: usize = 256;
const GIDC_ARRIVAL: WPARAM = 1;
const GIDC_REMOVAL: WPARAM = 2;
const CLASS_NAME: &str = "inputhub-raw-input";

const PAGE_GENERIC_DESKTOP: u16 = hid::PAGE_GENERIC_DESKTOP;
const USAGES: [u16; 3] = [
    hid::USAGE_JOYSTICK,
    hid::USAGE_GAMEPAD,
    hid::USAGE_MULTI_AXIS_CONTROLLER,
];

#[derive(Clone, Debug, PartialEq, Eq)]
struct Report {
    id: u8,
    data: Vec<HidData>,
}

type ReportQueue = Arc<Mutex<VecDeque<Report>>>;

fn lock(queue: &ReportQueue) -> MutexGuard<'_, VecDeque<Report>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Applies reports queued by the message thread.
pub struct RawInputBackend {
    queue: ReportQueue,
    layout: ReportLayout,
}

impl DeviceBackend for RawInputBackend {
    fn poll(&mut self, state: &mut DeviceState) -> PollStatus {
        let reports = mem::take(&mut *lock(&self.queue));
        let mut changed = false;

        for report in reports {
            changed |= self.layout.process(state, report.id, &report.data);
        }

        if changed {
            PollStatus::Activity
        } else {
            PollStatus::Idle
        }
    }
}

struct RawDevice {
    /// Raw input handle, `None` once the device was removed.
    handle: Option<usize>,
    path: String,
    device: Arc<Device>,
    queue: ReportQueue,
    preparsed: PreparsedData,
}

/// State owned by the message thread.
struct RawInput {
    sink: Arc<dyn HotplugSink>,
    quirks: QuirkTable,
    parser: &'static HidParser,
    devices: Vec<RawDevice>,
    scratch: Vec<HidData>,
}

impl RawInput {
    fn enumerate(&mut self) {
        let mut count: UINT = 0;
        let size = mem::size_of::<RAWINPUTDEVICELIST>() as UINT;

        if unsafe { GetRawInputDeviceList(ptr::null_mut(), &mut count, size) } == UINT::MAX {
            error!("GetRawInputDeviceList failed: {}", io::Error::last_os_error());
            return;
        }

        let mut list: Vec<RAWINPUTDEVICELIST> = vec![unsafe { mem::zeroed() }; count as usize];
        let ret = unsafe { GetRawInputDeviceList(list.as_mut_ptr(), &mut count, size) };
        if ret == UINT::MAX {
            error!("GetRawInputDeviceList failed: {}", io::Error::last_os_error());
            return;
        }
        list.truncate(ret as usize);

        for entry in list.iter().filter(|e| e.dwType == RIM_TYPEHID) {
            self.arrived(entry.hDevice);
        }
    }

    fn arrived(&mut self, handle: HANDLE) {
        let key = handle as usize;
        if self.devices.iter().any(|d| d.handle == Some(key)) {
            return;
        }

        let Some(info) = device_info(handle) else {
            return;
        };
        if info.dwType != RIM_TYPEHID {
            return;
        }
        let hid_info = unsafe { *info.u.hid() };

        let Some(path) = device_path(handle) else {
            return;
        };
        if devnode::is_xinput_path(&path) {
            debug!("Leaving {} to XInput", path);
            return;
        }

        let vendor_id = hid_info.dwVendorId as u16;
        let product_id = hid_info.dwProductId as u16;
        let quirks = self.quirks.quirks(vendor_id, product_id);
        let class = self
            .quirks
            .class(vendor_id, product_id)
            .unwrap_or_else(|| hid::class_for_usage(hid_info.usUsagePage, hid_info.usUsage));

        match class {
            DeviceClass::Unknown | DeviceClass::Keyboard | DeviceClass::Mouse => {
                debug!("Ignoring {}: class {}", path, class);
                return;
            }
            _ => (),
        }

        let Some(preparsed) = preparsed_data(handle) else {
            debug!("No preparsed data for {}", path);
            return;
        };
        let Some(caps) = self.parser.describe(&preparsed) else {
            debug!("Failed to read HID capabilities of {}", path);
            return;
        };

        let description = HidDescription {
            class,
            vendor_id,
            product_id,
            quirks,
            button_caps: caps.buttons,
            value_caps: caps.values,
        };
        let mut state = DeviceState::new();
        let layout = ReportLayout::build(&description, &mut state);
        let queue = ReportQueue::default();
        let backend = Box::new(RawInputBackend {
            queue: queue.clone(),
            layout,
        });

        let status = if quirks.intersects(Quirks::CONNECT_IF_NONZERO | Quirks::STEAM_CONTROLLER) {
            DeviceStatus::Inactive
        } else {
            DeviceStatus::Connected
        };

        let previous = self
            .devices
            .iter_mut()
            .find(|d| d.handle.is_none() && d.path == path);
        if let Some(entry) = previous {
            info!("Device {} ({}) is back", entry.device.id(), entry.device.name());
            entry.device.reactivate(state, backend, status);
            entry.handle = Some(key);
            entry.queue = queue;
            entry.preparsed = preparsed;
            self.sink.device_arrived(entry.device.clone());
            return;
        }

        let node = devnode::describe(&path, vendor_id, product_id);
        let version = hid_info.dwVersionNumber as u16;
        let uuid = node.bus.map_or_else(Uuid::nil, |bus| {
            utils::sdl_uuid(bus, vendor_id, product_id, version)
        });

        let info = DeviceInfo {
            name: node.name.unwrap_or_else(|| "Unknown HID device".into()),
            manufacturer: node.manufacturer.unwrap_or_default(),
            serial_number: String::new(),
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
            uuid,
            class,
            features: Features::empty(),
        };

        debug!(
            "Raw input {}: uuid: {}, class: {}, quirks: {:?}, status: {:?}, buttons: {}, axes: {}",
            path,
            info.uuid,
            class,
            quirks,
            status,
            state.buttons().len(),
            state.axes().len()
        );

        let device = Arc::new(Device::new(info, state, backend, status));
        self.devices.push(RawDevice {
            handle: Some(key),
            path,
            device: device.clone(),
            queue,
            preparsed,
        });
        self.sink.device_arrived(device);
    }

    fn removed(&mut self, handle: HANDLE) {
        let key = handle as usize;
        let Some(entry) = self.devices.iter_mut().find(|d| d.handle == Some(key)) else {
            return;
        };

        entry.handle = None;
        lock(&entry.queue).clear();
        if entry.device.disconnect() {
            self.sink.device_removed(&entry.device);
        }
    }

    fn input(&mut self, raw: HRAWINPUT) {
        let Some(buf) = read_input(raw) else {
            return;
        };

        let header_size = mem::size_of::<RAWINPUTHEADER>();
        if buf.len() < header_size {
            error!("Unexpected raw input of size {}", buf.len());
            return;
        }
        let header: RAWINPUTHEADER = unsafe { ptr::read_unaligned(buf.as_ptr().cast()) };
        if header.dwType != RIM_TYPEHID {
            return;
        }

        let key = header.hDevice as usize;
        let Some(entry) = self.devices.iter().find(|d| d.handle == Some(key)) else {
            return;
        };
        let Some((size, reports)) = hid_reports(&buf[header_size..]) else {
            error!("Unexpected raw input of size {}", buf.len());
            return;
        };

        for report in reports.chunks_exact(size) {
            self.scratch.clear();
            if !self.parser.report_data(&entry.preparsed, report, &mut self.scratch) {
                trace!("Failed to parse report of device {}", entry.device.id());
                continue;
            }

            let mut queue = lock(&entry.queue);
            if queue.len() >= QUEUE_LIMIT {
                queue.pop_front();
            }
            queue.push_back(Report {
                id: report[0],
                data: self.scratch.clone(),
            });
        }
    }
}

/// Splits `RAWHID` payload into the size of one report and the packed reports.
fn hid_reports(payload: &[u8]) -> Option<(usize, &[u8])> {
    let size = u32::from_ne_bytes(payload.get(0..4)?.try_into().ok()?) as usize;
    let count = u32::from_ne_bytes(payload.get(4..8)?.try_into().ok()?) as usize;

    if size == 0 {
        return None;
    }

    let data = payload.get(8..8 + size.checked_mul(count)?)?;
    Some((size, data))
}

fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(Some(0)).collect()
}

fn read_input(raw: HRAWINPUT) -> Option<Vec<u8>> {
    let header_size = mem::size_of::<RAWINPUTHEADER>() as UINT;
    let mut size: UINT = 0;

    let ret = unsafe { GetRawInputData(raw, RID_INPUT, ptr::null_mut(), &mut size, header_size) };
    if ret == UINT::MAX || size == 0 {
        return None;
    }

    let mut buf = vec![0u8; size as usize];
    let ret = unsafe {
        GetRawInputData(raw, RID_INPUT, buf.as_mut_ptr().cast(), &mut size, header_size)
    };
    if ret == UINT::MAX {
        return None;
    }

    buf.truncate(ret as usize);
    Some(buf)
}

fn device_info(handle: HANDLE) -> Option<RID_DEVICE_INFO> {
    let mut info: RID_DEVICE_INFO = unsafe { mem::zeroed() };
    let mut size = mem::size_of::<RID_DEVICE_INFO>() as UINT;
    info.cbSize = size;

    let ptr: *mut RID_DEVICE_INFO = &mut info;
    let ret = unsafe { GetRawInputDeviceInfoW(handle, RIDI_DEVICEINFO, ptr.cast(), &mut size) };
    (ret != UINT::MAX).then_some(info)
}

fn device_path(handle: HANDLE) -> Option<String> {
    let mut len: UINT = 0;
    unsafe { GetRawInputDeviceInfoW(handle, RIDI_DEVICENAME, ptr::null_mut(), &mut len) };
    if len == 0 {
        return None;
    }

    let mut buf = vec![0u16; len as usize];
    let ret = unsafe {
        GetRawInputDeviceInfoW(handle, RIDI_DEVICENAME, buf.as_mut_ptr().cast(), &mut len)
    };
    if ret == UINT::MAX {
        return None;
    }

    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    Some(String::from_utf16_lossy(&buf[..end]))
}

fn preparsed_data(handle: HANDLE) -> Option<PreparsedData> {
    let mut size: UINT = 0;
    unsafe { GetRawInputDeviceInfoW(handle, RIDI_PREPARSEDDATA, ptr::null_mut(), &mut size) };
    if size == 0 {
        return None;
    }

    let mut data = PreparsedData::with_size(size as usize);
    let ret = unsafe {
        GetRawInputDeviceInfoW(handle, RIDI_PREPARSEDDATA, data.as_mut_ptr().cast(), &mut size)
    };
    (ret != UINT::MAX).then_some(data)
}

fn create_window() -> io::Result<HWND> {
    let class_name = to_wide(CLASS_NAME);

    unsafe {
        let instance = GetModuleHandleW(ptr::null());
        let mut class: WNDCLASSEXW = mem::zeroed();
        class.cbSize = mem::size_of::<WNDCLASSEXW>() as UINT;
        class.lpfnWndProc = Some(DefWindowProcW);
        class.hInstance = instance;
        class.lpszClassName = class_name.as_ptr();

        // Already registered if the backend was started before.
        RegisterClassExW(&class);

        let hwnd = CreateWindowExW(
            0,
            class_name.as_ptr(),
            class_name.as_ptr(),
            0,
            0,
            0,
            0,
            0,
            HWND_MESSAGE,
            ptr::null_mut(),
            instance,
            ptr::null_mut(),
        );

        if hwnd.is_null() {
            Err(io::Error::last_os_error())
        } else {
            Ok(hwnd)
        }
    }
}

fn register_devices(hwnd: HWND) {
    let devices = USAGES.map(|usage| RAWINPUTDEVICE {
        usUsagePage: PAGE_GENERIC_DESKTOP,
        usUsage: usage,
        dwFlags: RIDEV_INPUTSINK | RIDEV_DEVNOTIFY,
        hwndTarget: hwnd,
    });

    let ok = unsafe {
        RegisterRawInputDevices(
            devices.as_ptr(),
            devices.len() as UINT,
            mem::size_of::<RAWINPUTDEVICE>() as UINT,
        )
    };
    if ok == 0 {
        warn!("Failed to register raw input devices: {}", io::Error::last_os_error());
    }
}

fn run(
    sink: Arc<dyn HotplugSink>,
    quirks: QuirkTable,
    parser: &'static HidParser,
    started: SyncSender<io::Result<u32>>,
) {
    let hwnd = match create_window() {
        Ok(hwnd) => hwnd,
        Err(e) => {
            error!("Failed to create raw input window: {}", e);
            let _ = started.send(Err(e));
            return;
        }
    };
    register_devices(hwnd);

    let mut raw_input = RawInput {
        sink,
        quirks,
        parser,
        devices: Vec::new(),
        scratch: Vec::new(),
    };
    raw_input.enumerate();
    let _ = started.send(Ok(unsafe { GetCurrentThreadId() }));

    let mut msg: MSG = unsafe { mem::zeroed() };
    while unsafe { GetMessageW(&mut msg, ptr::null_mut(), 0, 0) } > 0 {
        match msg.message {
            WM_INPUT => raw_input.input(msg.lParam as HRAWINPUT),
            WM_INPUT_DEVICE_CHANGE => match msg.wParam {
                GIDC_ARRIVAL => raw_input.arrived(msg.lParam as HANDLE),
                GIDC_REMOVAL => raw_input.removed(msg.lParam as HANDLE),
                _ => (),
            },
            _ => (),
        }
        unsafe { DispatchMessageW(&msg) };
    }

    unsafe { DestroyWindow(hwnd) };
    debug!("Raw input thread finished");
}

/// Thread that owns the raw input window. Stops the thread on drop.
pub struct MessageThread {
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl MessageThread {
    pub fn spawn(sink: Arc<dyn HotplugSink>, quirks: QuirkTable) -> io::Result<Self> {
        let parser =
            HidParser::get().ok_or_else(|| io::Error::other("HID parser is not available"))?;
        let (tx, rx) = mpsc::sync_channel(1);

        let thread = thread::Builder::new()
            .name("inputhub-raw-input".into())
            .spawn(move || run(sink, quirks, parser, tx))?;

        match rx.recv() {
            Ok(Ok(thread_id)) => Ok(MessageThread {
                thread_id,
                thread: Some(thread),
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(io::Error::other("raw input thread exited")),
        }
    }
}

impl Drop for MessageThread {
    fn drop(&mut self) {
        unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0) };
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::button::ButtonId;
    use crate::hid::{ButtonCaps, PAGE_BUTTON};

    #[test]
    fn split_reports() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&3u32.to_ne_bytes());
        payload.extend_from_slice(&2u32.to_ne_bytes());
        payload.extend_from_slice(&[1, 2, 3, 1, 5, 6]);

        let (size, data) = hid_reports(&payload).unwrap();
        assert_eq!(size, 3);
        assert_eq!(data.chunks_exact(size).count(), 2);

        payload.truncate(10);
        assert_eq!(hid_reports(&payload), None);
    }

    #[test]
    fn queued_reports() {
        let desc = HidDescription {
            class: DeviceClass::Gamepad,
            vendor_id: 0x1234,
            product_id: 0x5678,
            quirks: Quirks::empty(),
            button_caps: vec![ButtonCaps {
                report_id: 1,
                usage_page: PAGE_BUTTON,
                usage_min: 1,
                usage_max: 4,
                data_index_min: 0,
            }],
            value_caps: vec![],
        };
        let mut state = DeviceState::new();
        let layout = ReportLayout::build(&desc, &mut state);
        let queue = ReportQueue::default();
        let mut backend = RawInputBackend {
            queue: queue.clone(),
            layout,
        };

        assert_eq!(backend.poll(&mut state), PollStatus::Idle);

        lock(&queue).push_back(Report {
            id: 1,
            data: vec![HidData {
                data_index: 0,
                raw_value: 1,
            }],
        });
        assert_eq!(backend.poll(&mut state), PollStatus::Activity);
        assert!(state.is_pressed(ButtonId::FACE_A));
        assert!(lock(&queue).is_empty());

        lock(&queue).push_back(Report {
            id: 1,
            data: vec![],
        });
        assert_eq!(backend.poll(&mut state), PollStatus::Activity);
        assert!(!state.is_pressed(ButtonId::FACE_A));
    }
}
