// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Devices read through the evdev interface (`/dev/input/eventN`).

use super::evdev_map::{self, Capabilities, EvdevLayout, KEY_BYTES};
use super::ioctl::{self, ff_effect, input_absinfo, input_event, input_id};
use super::ioctl::{EV_ABS, EV_FF, EV_KEY, EV_REL, FF_RUMBLE};
use super::sysfs::{self, Battery};
use super::Context;
use crate::device::{
    Device, DeviceBackend, DeviceClass, DeviceInfo, DeviceStatus, Features, PollStatus,
};
use crate::error::DeviceError;
use crate::quirks::Quirks;
use crate::state::{BatteryData, DeviceState, PowerStatus};
use crate::utils;

use libc as c;
use uuid::Uuid;
use vec_map::VecMap;

use std::error;
use std::ffi::{CStr, CString};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io;
use std::mem::{self, MaybeUninit};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::raw::c_char;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BATCH: usize = 8;
const BATTERY_INTERVAL: Duration = Duration::from_secs(10);
const REST_EPSILON: f64 = 0.01;

/// Why a device node was not opened.
#[derive(Debug)]
pub enum OpenError {
    /// The node exists but can't be opened, usually because permissions are not set up yet.
    Unreadable(io::Error),
    /// Opened, but not a device that is reported.
    Ignored(&'static str),
    Io(io::Error),
}

impl OpenError {
    fn from_errno(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(c::EACCES) | Some(c::EPERM) => OpenError::Unreadable(err),
            _ => OpenError::Io(err),
        }
    }
}

impl Display for OpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OpenError::Unreadable(e) => write!(f, "device is not readable: {}", e),
            OpenError::Ignored(reason) => write!(f, "ignored: {}", reason),
            OpenError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl error::Error for OpenError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            OpenError::Unreadable(e) | OpenError::Io(e) => Some(e),
            OpenError::Ignored(_) => None,
        }
    }
}

/// Opens `path` in non-blocking mode, read-write if possible.
pub(super) fn open_node(path: &Path) -> Result<(OwnedFd, bool), OpenError> {
    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| OpenError::Ignored("path contains nul byte"))?;

    let flags = c::O_NONBLOCK | c::O_CLOEXEC;
    let mut writable = true;
    let mut fd = unsafe { c::open(cpath.as_ptr(), c::O_RDWR | flags) };
    if fd < 0 {
        writable = false;
        fd = unsafe { c::open(cpath.as_ptr(), c::O_RDONLY | flags) };
    }

    if fd < 0 {
        Err(OpenError::from_errno(io::Error::last_os_error()))
    } else {
        Ok((unsafe { OwnedFd::from_raw_fd(fd) }, writable))
    }
}

/// Opens evdev node `path`. `syspath` is its directory in `/sys/class/input`.
pub fn open(path: &Path, syspath: &Path, ctx: &Context) -> Result<Arc<Device>, OpenError> {
    let (fd, writable) = open_node(path)?;
    let raw = fd.as_raw_fd();

    let input_id = get_input_id(raw).ok_or(OpenError::Ignored("EVIOCGID failed"))?;
    let name = get_string(raw, ioctl::eviocgname).unwrap_or_else(|| {
        error!("Failed to get name of device {:?}", path);
        "Unknown".into()
    });

    let caps = read_capabilities(raw);
    let quirks = ctx.quirks.quirks(input_id.vendor, input_id.product);
    let class = ctx
        .quirks
        .class(input_id.vendor, input_id.product)
        .unwrap_or_else(|| evdev_map::detect_class(&caps, &name));

    match class {
        DeviceClass::Unknown => return Err(OpenError::Ignored("not an input device")),
        DeviceClass::Keyboard | DeviceClass::Mouse if !ctx.enable_mouse_keyboard => {
            return Err(OpenError::Ignored("mouse and keyboard support is disabled"))
        }
        _ => (),
    }

    let mut state = DeviceState::new();
    let layout = EvdevLayout::build(&caps, class, quirks, &mut state);

    let battery = Battery::find(syspath);
    state.set_battery(match battery.as_ref().and_then(Battery::read) {
        Some(data) => data,
        None => BatteryData {
            status: PowerStatus::Wired,
            ..Default::default()
        },
    });

    let mut backend = EvdevBackend {
        fd,
        layout,
        battery,
        battery_read: Instant::now(),
        rumble: Rumble::default(),
        can_rumble: writable && caps.has_ff(FF_RUMBLE),
    };
    let (key_bits, abs) = backend.snapshot();
    backend.layout.sync(&mut state, &key_bits, &abs);
    state.take_button_events();

    let at_rest = state
        .axes()
        .iter()
        .all(|axis| !axis.known || axis.value.abs() < REST_EPSILON);
    let status = if quirks.contains(Quirks::STEAM_CONTROLLER)
        || (quirks.contains(Quirks::CONNECT_IF_NONZERO) && at_rest)
    {
        DeviceStatus::Inactive
    } else {
        DeviceStatus::Connected
    };

    let mut features = Features::empty();
    features.set(Features::POINTER, backend.layout.has_pointer());
    features.set(Features::KEYBOARD, class == DeviceClass::Keyboard);
    features.set(Features::VIBRATION, backend.can_rumble);
    features.set(Features::BATTERY, backend.battery.is_some());

    let (manufacturer, serial) = metadata(syspath, raw, ctx);
    let info = DeviceInfo {
        name,
        manufacturer,
        serial_number: serial,
        vendor_id: Some(input_id.vendor),
        product_id: Some(input_id.product),
        uuid: create_uuid(input_id),
        class,
        features,
    };

    debug!(
        "Evdev {:?}: uuid: {}, class: {}, quirks: {:?}, status: {:?}, buttons: {}, axes: {}",
        path,
        info.uuid,
        class,
        quirks,
        status,
        state.buttons().len(),
        state.axes().len()
    );

    Ok(Arc::new(Device::new(info, state, Box::new(backend), status)))
}

fn metadata(syspath: &Path, fd: RawFd, ctx: &Context) -> (String, String) {
    let udev = ctx
        .udev
        .as_ref()
        .and_then(|udev| super::udev::Device::from_syspath(udev, syspath));

    let manufacturer = udev
        .as_ref()
        .and_then(|dev| {
            dev.property_value(c"ID_VENDOR_FROM_DATABASE")
                .or_else(|| dev.property_value(c"ID_VENDOR").map(|v| v.replace('_', " ")))
        })
        .or_else(|| sysfs::manufacturer(syspath));

    let serial = udev
        .as_ref()
        .and_then(|dev| dev.property_value(c"ID_SERIAL_SHORT"))
        .or_else(|| get_string(fd, ioctl::eviocguniq).filter(|s| !s.is_empty()))
        .or_else(|| sysfs::serial(syspath));

    (manufacturer.unwrap_or_default(), serial.unwrap_or_default())
}

fn get_input_id(fd: RawFd) -> Option<input_id> {
    unsafe {
        let mut iid = MaybeUninit::<input_id>::uninit();
        if ioctl::eviocgid(fd, iid.as_mut_ptr()).is_err() {
            return None;
        }

        Some(iid.assume_init())
    }
}

type StringIoctl = unsafe fn(c::c_int, &mut [u8]) -> nix::Result<c::c_int>;

fn get_string(fd: RawFd, request: StringIoctl) -> Option<String> {
    let mut buf = [0u8; 128];
    unsafe {
        if request(fd, &mut buf).is_err() {
            return None;
        }
        buf[buf.len() - 1] = 0;
        Some(
            CStr::from_ptr(buf.as_ptr() as *const c_char)
                .to_string_lossy()
                .into_owned(),
        )
    }
}

fn read_capabilities(fd: RawFd) -> Capabilities {
    let mut caps = Capabilities::default();

    unsafe {
        ioctl::eviocgbit(fd, 0, &mut caps.ev_bits);
        ioctl::eviocgbit(fd, u32::from(EV_KEY), &mut caps.key_bits);
        ioctl::eviocgbit(fd, u32::from(EV_ABS), &mut caps.abs_bits);
        ioctl::eviocgbit(fd, u32::from(EV_REL), &mut caps.rel_bits);
        ioctl::eviocgbit(fd, u32::from(EV_FF), &mut caps.ff_bits);
    }

    let codes: Vec<u16> = caps.abs_codes().collect();
    for code in codes {
        let mut info = input_absinfo::default();
        if unsafe { ioctl::eviocgabs(fd, u32::from(code), &mut info) } >= 0 {
            caps.abs_info.insert(usize::from(code), info);
        }
    }

    caps
}

#[derive(Debug, Default)]
struct Rumble {
    /// Effect id assigned by the kernel on first upload.
    id: Option<i16>,
    uploaded: Option<(u16, u16)>,
    /// Play was sent for the uploaded effect. Effects are uploaded with infinite length.
    playing: bool,
}

impl Rumble {
    fn needs_upload(&self, magnitudes: (u16, u16)) -> bool {
        self.uploaded != Some(magnitudes)
    }

    fn needs_play(&self) -> bool {
        self.id.is_some() && !self.playing
    }

    fn uploaded(&mut self, id: i16, magnitudes: (u16, u16)) {
        if self.id != Some(id) {
            self.playing = false;
        }
        self.id = Some(id);
        self.uploaded = Some(magnitudes);
    }
}

#[derive(Debug)]
struct EvdevBackend {
    fd: OwnedFd,
    layout: EvdevLayout,
    battery: Option<Battery>,
    battery_read: Instant,
    rumble: Rumble,
    can_rumble: bool,
}

impl EvdevBackend {
    /// Current key bits and absolute axis values as seen by the kernel.
    fn snapshot(&self) -> ([u8; KEY_BYTES], VecMap<i32>) {
        let fd = self.fd.as_raw_fd();

        let mut key_bits = [0u8; KEY_BYTES];
        unsafe {
            let _ = ioctl::eviocgkey(fd, &mut key_bits);
        }

        let mut abs = VecMap::new();
        for code in self.layout.abs_codes() {
            let mut info = input_absinfo::default();
            if unsafe { ioctl::eviocgabs(fd, u32::from(code), &mut info) } >= 0 {
                abs.insert(usize::from(code), info.value);
            }
        }

        (key_bits, abs)
    }

    fn read_batch(&self, buf: &mut [MaybeUninit<input_event>; BATCH]) -> io::Result<usize> {
        let size = mem::size_of::<input_event>();
        let n = unsafe {
            c::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut c::c_void,
                size * buf.len(),
            )
        };

        if n < 0 {
            Err(io::Error::last_os_error())
        } else if n as usize % size != 0 {
            error!("Unexpected read of size {}", n);
            Ok(0)
        } else {
            Ok(n as usize / size)
        }
    }

    fn refresh_battery(&mut self, state: &mut DeviceState) {
        let Some(battery) = &self.battery else {
            return;
        };
        if self.battery_read.elapsed() < BATTERY_INTERVAL {
            return;
        }

        self.battery_read = Instant::now();
        if let Some(data) = battery.read() {
            state.set_battery(data);
        }
    }

    fn play(&self, id: i16) -> io::Result<()> {
        let event = input_event {
            type_: EV_FF,
            code: id as u16,
            value: 1,
            ..Default::default()
        };
        let size = mem::size_of::<input_event>();
        let n = unsafe {
            c::write(
                self.fd.as_raw_fd(),
                &event as *const input_event as *const c::c_void,
                size,
            )
        };

        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl DeviceBackend for EvdevBackend {
    fn poll(&mut self, state: &mut DeviceState) -> PollStatus {
        let mut activity = false;

        loop {
            let mut buf = [MaybeUninit::<input_event>::uninit(); BATCH];
            let n = match self.read_batch(&mut buf) {
                Ok(n) => n,
                Err(e) => match e.raw_os_error() {
                    Some(c::EAGAIN) | Some(c::EINTR) => break,
                    Some(c::ENODEV) | Some(c::EIO) | Some(c::EBADF) => return PollStatus::Lost,
                    _ => {
                        error!("Failed to read from evdev device: {}", e);
                        break;
                    }
                },
            };

            let events: Vec<input_event> =
                buf[..n].iter().map(|ev| unsafe { ev.assume_init() }).collect();
            trace!("Got {} new events", n);

            let applied = self.layout.apply(state, &events);
            activity |= applied.activity;
            if applied.resync {
                let (key_bits, abs) = self.snapshot();
                activity |= self.layout.sync(state, &key_bits, &abs);
            }

            if n < BATCH {
                break;
            }
        }

        self.refresh_battery(state);

        if activity {
            PollStatus::Activity
        } else {
            PollStatus::Idle
        }
    }

    fn set_vibration(&mut self, strong: f64, weak: f64) -> Result<(), DeviceError> {
        if !self.can_rumble {
            return Err(DeviceError::NotSupported);
        }

        let magnitudes = (
            (strong * f64::from(u16::MAX)) as u16,
            (weak * f64::from(u16::MAX)) as u16,
        );

        if self.rumble.needs_upload(magnitudes) {
            let mut effect =
                ff_effect::rumble(self.rumble.id.unwrap_or(-1), magnitudes.0, magnitudes.1);
            if unsafe { ioctl::eviocsff(self.fd.as_raw_fd(), &mut effect) } < 0 {
                return Err(DeviceError::Io(io::Error::last_os_error()));
            }
            self.rumble.uploaded(effect.id, magnitudes);
        }

        match self.rumble.id {
            Some(id) if self.rumble.needs_play() => {
                self.play(id).map_err(DeviceError::Io)?;
                self.rumble.playing = true;
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Drop for EvdevBackend {
    fn drop(&mut self) {
        if let Some(id) = self.rumble.id {
            unsafe {
                let _ = ioctl::eviocrmff(self.fd.as_raw_fd(), id as _);
            }
        }
    }
}

/// SDL compatible uuid of evdev device.
pub fn create_uuid(iid: input_id) -> Uuid {
    utils::sdl_uuid(iid.bustype, iid.vendor, iid.product, iid.version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdl_uuid() {
        let x = Uuid::parse_str("030000005e0400008e02000020200000").unwrap();
        let y = create_uuid(input_id {
            bustype: 0x3,
            vendor: 0x045e,
            product: 0x028e,
            version: 0x2020,
        });
        assert_eq!(x, y);
    }

    #[test]
    fn rumble_plays_once() {
        let mut rumble = Rumble::default();
        assert!(rumble.needs_upload((100, 50)));
        assert!(!rumble.needs_play());

        rumble.uploaded(3, (100, 50));
        assert!(rumble.needs_play());
        rumble.playing = true;

        assert!(!rumble.needs_upload((100, 50)));
        assert!(!rumble.needs_play());

        assert!(rumble.needs_upload((0, 0)));
        rumble.uploaded(3, (0, 0));
        assert!(!rumble.needs_play());
    }

    #[test]
    fn missing_node() {
        match open_node(Path::new("/dev/input/event-does-not-exist")) {
            Err(OpenError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected result: {:?}", other.map(|(_, w)| w)),
        }
    }
}
