// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Legacy joystick interface (`/dev/input/jsN`).
//!
//! Used only while the evdev node of the same device can't be opened. Joydev reports axis and
//! button indices; the kernel supplies the evdev codes behind them, so events are translated
//! and fed through the same [`EvdevLayout`] as evdev devices.

use super::evdev::{self, OpenError};
use super::evdev_map::{self, Capabilities, EvdevLayout};
use super::ioctl::{self, input_absinfo, input_event, js_event};
use super::ioctl::{ABS_CNT, ABS_HAT0X, ABS_HAT0Y, ABS_MAX, ABS_RX, ABS_RY, ABS_RZ, ABS_X};
use super::ioctl::{ABS_Y, ABS_Z, BTN_EAST, BTN_MISC, BTN_MODE, BTN_NORTH, BTN_SELECT};
use super::ioctl::{BTN_SOUTH, BTN_START, BTN_THUMBL, BTN_THUMBR, BTN_TL, BTN_TR, BTN_WEST};
use super::ioctl::{EV_ABS, EV_KEY, JS_BTNMAP_LEN, JS_EVENT_AXIS, JS_EVENT_BUTTON};
use super::ioctl::{JS_EVENT_INIT, KEY_MAX};
use super::sysfs;
use super::Context;
use crate::device::{
    Device, DeviceBackend, DeviceClass, DeviceInfo, DeviceStatus, Features, PollStatus,
};
use crate::quirks::Quirks;
use crate::state::{BatteryData, DeviceState, PowerStatus};

use libc as c;

use std::ffi::CStr;
use std::io;
use std::mem::{self, MaybeUninit};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const AXIS_MAX: i32 = 32767;
const BATCH: usize = 16;

/// Native codes of joydev indices when the driver doesn't report a mapping.
const DEFAULT_AXES: [u16; 8] = [
    ABS_X, ABS_Y, ABS_Z, ABS_RX, ABS_RY, ABS_RZ, ABS_HAT0X, ABS_HAT0Y,
];
const DEFAULT_BUTTONS: [u16; 11] = [
    BTN_SOUTH, BTN_EAST, BTN_WEST, BTN_NORTH, BTN_TL, BTN_TR, BTN_SELECT, BTN_START, BTN_MODE,
    BTN_THUMBL, BTN_THUMBR,
];

/// Where joydev indices point to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoydevMap {
    /// Evdev code of every axis and whether its value must be shifted to `0..=32767`.
    pub axes: Vec<(u16, bool)>,
    /// Evdev code of every button.
    pub buttons: Vec<u16>,
}

impl JoydevMap {
    /// Codes of `naxes` axes and `nbuttons` buttons, taken from the driver maps if present.
    pub fn new(
        axmap: Option<&[u8]>,
        btnmap: Option<&[u16]>,
        naxes: usize,
        nbuttons: usize,
    ) -> Self {
        let axes = (0..naxes)
            .map(|i| match axmap {
                Some(map) => map.get(i).map(|&code| u16::from(code)),
                None => DEFAULT_AXES.get(i).copied(),
            })
            .map(|code| (code.unwrap_or(ABS_MAX + 1), false))
            .collect();

        let buttons = (0..nbuttons)
            .map(|i| match btnmap {
                Some(map) => map.get(i).copied().unwrap_or(KEY_MAX + 1),
                None => DEFAULT_BUTTONS
                    .get(i)
                    .copied()
                    .unwrap_or_else(|| BTN_MISC + (i - DEFAULT_BUTTONS.len()) as u16),
            })
            .collect();

        JoydevMap { axes, buttons }
    }

    /// Capability bitmaps equivalent to this map and the device class. Zero based axes get
    /// range `0..=32767` and are marked for shifting, the rest keeps the joydev range.
    pub fn capabilities(
        &mut self,
        name: &str,
        class: Option<DeviceClass>,
        quirks: Quirks,
    ) -> (Capabilities, DeviceClass) {
        let mut caps = Capabilities::default();
        set_bit(&mut caps.ev_bits, EV_KEY);
        set_bit(&mut caps.ev_bits, EV_ABS);
        for &code in &self.buttons {
            if code <= KEY_MAX {
                set_bit(&mut caps.key_bits, code);
            }
        }
        for &(code, _) in &self.axes {
            if code <= ABS_MAX {
                set_bit(&mut caps.abs_bits, code);
            }
        }

        let class = class.unwrap_or_else(|| evdev_map::detect_class(&caps, name));

        for (code, shift) in self.axes.iter_mut().filter(|(code, _)| *code <= ABS_MAX) {
            *shift = evdev_map::map_axis(*code, class, quirks)
                .map_or(false, |m| !m.centered.unwrap_or_else(|| m.axis.is_centered()));
            caps.abs_info.insert(
                usize::from(*code),
                input_absinfo {
                    minimum: if *shift { 0 } else { -AXIS_MAX },
                    maximum: AXIS_MAX,
                    ..Default::default()
                },
            );
        }

        (caps, class)
    }

    /// Translates joydev event. Events of unknown indices give `None`.
    pub fn translate(&self, event: &js_event) -> Option<input_event> {
        let kind = event.type_ & !JS_EVENT_INIT;
        let number = usize::from(event.number);
        let (type_, code, value) = match kind {
            JS_EVENT_BUTTON => (EV_KEY, *self.buttons.get(number)?, i32::from(event.value)),
            JS_EVENT_AXIS => {
                let &(code, shift) = self.axes.get(number)?;
                let value = i32::from(event.value);
                let value = if shift { (value + AXIS_MAX) / 2 } else { value };
                (EV_ABS, code, value)
            }
            _ => return None,
        };

        Some(input_event {
            type_,
            code,
            value,
            ..Default::default()
        })
    }
}

fn set_bit(bits: &mut [u8], n: u16) {
    if let Some(byte) = bits.get_mut(usize::from(n / 8)) {
        *byte |= 1 << (n % 8);
    }
}

/// Opens joydev node `path`. `syspath` is its directory in `/sys/class/input`.
pub fn open(path: &Path, syspath: &Path, ctx: &Context) -> Result<Arc<Device>, OpenError> {
    let (fd, _) = evdev::open_node(path)?;
    let raw = fd.as_raw_fd();

    let name = get_name(raw).unwrap_or_else(|| "Unknown".into());
    let id = sysfs::input_id(syspath).unwrap_or_default();
    let quirks = ctx.quirks.quirks(id.vendor, id.product);

    let mut map = read_map(raw);
    let (caps, class) = map.capabilities(&name, ctx.quirks.class(id.vendor, id.product), quirks);

    match class {
        DeviceClass::Unknown | DeviceClass::Keyboard | DeviceClass::Mouse => {
            return Err(OpenError::Ignored("joydev node of non-joystick device"))
        }
        _ => (),
    }

    let mut state = DeviceState::new();
    let layout = EvdevLayout::build(&caps, class, quirks, &mut state);
    state.set_battery(BatteryData {
        status: PowerStatus::Wired,
        ..Default::default()
    });

    let mut backend = JoydevBackend { fd, layout, map };
    // Initial state arrives as a burst of JS_EVENT_INIT events.
    backend.poll(&mut state);
    state.take_button_events();

    let info = DeviceInfo {
        name,
        manufacturer: sysfs::manufacturer(syspath).unwrap_or_default(),
        serial_number: sysfs::serial(syspath).unwrap_or_default(),
        vendor_id: Some(id.vendor).filter(|&v| v != 0),
        product_id: Some(id.product).filter(|&p| p != 0),
        uuid: evdev::create_uuid(id),
        class,
        features: Features::empty(),
    };

    debug!(
        "Joydev {:?}: uuid: {}, class: {}, axes: {:?}, buttons: {:?}",
        path, info.uuid, class, backend.map.axes, backend.map.buttons
    );

    Ok(Arc::new(Device::new(
        info,
        state,
        Box::new(backend),
        DeviceStatus::Connected,
    )))
}

fn get_name(fd: RawFd) -> Option<String> {
    let mut buf = [0u8; 128];
    unsafe {
        if ioctl::jsiocgname(fd, &mut buf).is_err() {
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

fn read_map(fd: RawFd) -> JoydevMap {
    let mut naxes = 0u8;
    let mut nbuttons = 0u8;
    let mut axmap = [0u8; ABS_CNT];
    let mut btnmap = [0u16; JS_BTNMAP_LEN];

    unsafe {
        let _ = ioctl::jsiocgaxes(fd, &mut naxes);
        let _ = ioctl::jsiocgbuttons(fd, &mut nbuttons);
        let has_axmap = ioctl::jsiocgaxmap(fd, &mut axmap).is_ok();
        let has_btnmap = ioctl::jsiocgbtnmap(fd, &mut btnmap).is_ok();

        JoydevMap::new(
            Some(&axmap[..]).filter(|_| has_axmap),
            Some(&btnmap[..]).filter(|_| has_btnmap),
            usize::from(naxes),
            usize::from(nbuttons),
        )
    }
}

/// Device and sysfs path of the joydev node belonging to the same device as evdev node
/// `event_syspath`.
pub fn sibling(event_syspath: &Path) -> Option<(PathBuf, PathBuf)> {
    let name = sysfs::sibling(event_syspath, "js")?;
    Some((
        Path::new(super::INPUT_DIR_PATH).join(&name),
        Path::new(super::SYSFS_INPUT_PATH).join(&name),
    ))
}

#[derive(Debug)]
struct JoydevBackend {
    fd: OwnedFd,
    layout: EvdevLayout,
    map: JoydevMap,
}

impl DeviceBackend for JoydevBackend {
    fn poll(&mut self, state: &mut DeviceState) -> PollStatus {
        let size = mem::size_of::<js_event>();
        let mut activity = false;

        loop {
            let mut buf = [MaybeUninit::<js_event>::uninit(); BATCH];
            let n = unsafe {
                c::read(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr() as *mut c::c_void,
                    size * buf.len(),
                )
            };

            if n < 0 {
                let err = io::Error::last_os_error();
                match err.raw_os_error() {
                    Some(c::EAGAIN) | Some(c::EINTR) => break,
                    Some(c::ENODEV) | Some(c::EIO) | Some(c::EBADF) => return PollStatus::Lost,
                    _ => {
                        error!("Failed to read from joydev device: {}", err);
                        break;
                    }
                }
            }
            if n as usize % size != 0 {
                error!("Unexpected read of size {}", n);
                break;
            }

            let n = n as usize / size;
            let events: Vec<input_event> = buf[..n]
                .iter()
                .filter_map(|ev| self.map.translate(unsafe { ev.assume_init_ref() }))
                .collect();
            activity |= self.layout.apply(state, &events).activity;

            if n < BATCH {
                break;
            }
        }

        if activity {
            PollStatus::Activity
        } else {
            PollStatus::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::button::ButtonId;

    fn js(type_: u8, number: u8, value: i16) -> js_event {
        js_event {
            time: 0,
            value,
            type_,
            number,
        }
    }

    fn xpad_map() -> JoydevMap {
        let axmap = [ABS_X, ABS_Y, ABS_Z, ABS_RX, ABS_RY, ABS_RZ, ABS_HAT0X, ABS_HAT0Y]
            .map(|code| code as u8);
        JoydevMap::new(Some(&axmap[..]), None, 8, 11)
    }

    #[test]
    fn default_tables() {
        let map = JoydevMap::new(None, None, 2, 13);
        assert_eq!(map.axes, vec![(ABS_X, false), (ABS_Y, false)]);
        assert_eq!(map.buttons[0], BTN_SOUTH);
        assert_eq!(map.buttons[3], BTN_NORTH);
        assert_eq!(map.buttons[11], BTN_MISC);
        assert_eq!(map.buttons[12], BTN_MISC + 1);
    }

    #[test]
    fn gamepad_through_joydev() {
        let mut map = xpad_map();
        let (caps, class) = map.capabilities("Microsoft X-Box 360 pad", None, Quirks::empty());
        assert_eq!(class, DeviceClass::Gamepad);
        assert_eq!(map.axes[2], (ABS_Z, true));
        assert_eq!(map.axes[0], (ABS_X, false));

        let mut state = DeviceState::new();
        let mut layout = EvdevLayout::build(&caps, class, Quirks::empty(), &mut state);

        let events: Vec<_> = [
            js(JS_EVENT_AXIS | JS_EVENT_INIT, 2, -32767),
            js(JS_EVENT_AXIS, 1, -16384),
            js(JS_EVENT_BUTTON, 0, 1),
            js(JS_EVENT_AXIS, 7, -32767),
        ]
        .iter()
        .filter_map(|ev| map.translate(ev))
        .collect();
        assert!(layout.apply(&mut state, &events).activity);

        assert!(state.is_pressed(ButtonId::FACE_A));
        assert!(state.is_pressed(ButtonId::DPAD_UP));
        assert!((state.axis_value(Axis::LeftY) - 0.5).abs() < 0.01);
        assert!(state.axis_value(Axis::LeftTrigger).abs() < 1e-9);

        let full = map.translate(&js(JS_EVENT_AXIS, 2, 32767)).unwrap();
        layout.apply(&mut state, &[full]);
        assert!((state.axis_value(Axis::LeftTrigger) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_index() {
        let map = xpad_map();
        assert!(map.translate(&js(JS_EVENT_BUTTON, 40, 1)).is_none());
        assert!(map.translate(&js(0x10, 0, 1)).is_none());
    }
}
