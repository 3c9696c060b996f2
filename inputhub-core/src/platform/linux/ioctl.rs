// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Bindings to the parts of `linux/input.h` and `linux/joystick.h` used by the backend.

#![allow(non_camel_case_types, dead_code)]

use libc as c;
use nix::{ioctl_read, ioctl_read_buf, ioctl_write_int, request_code_read, request_code_write};

use std::mem;

#[repr(C)]
#[derive(Copy, Clone)]
pub struct input_event {
    pub time: c::timeval,
    pub type_: u16,
    pub code: u16,
    pub value: i32,
}

impl Default for input_event {
    fn default() -> Self {
        input_event {
            time: c::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            type_: 0,
            code: 0,
            value: 0,
        }
    }
}

impl std::fmt::Debug for input_event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "input_event {{ type: {:#x}, code: {:#x}, value: {} }}",
            self.type_, self.code, self.value
        )
    }
}

#[repr(C)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct input_id {
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

#[repr(C)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct input_absinfo {
    pub value: i32,
    pub minimum: i32,
    pub maximum: i32,
    pub fuzz: i32,
    pub flat: i32,
    pub resolution: i32,
}

#[repr(C)]
#[derive(Copy, Clone, Default, Debug)]
pub struct ff_trigger {
    pub button: u16,
    pub interval: u16,
}

#[repr(C)]
#[derive(Copy, Clone, Default, Debug)]
pub struct ff_replay {
    pub length: u16,
    pub delay: u16,
}

#[repr(C)]
#[derive(Copy, Clone, Default, Debug)]
pub struct ff_rumble_effect {
    pub strong_magnitude: u16,
    pub weak_magnitude: u16,
}

/// Union of effect parameters. Only rumble is used; `pad` gives it the size and alignment of
/// the largest kernel variant, which holds a pointer.
#[repr(C)]
#[derive(Copy, Clone)]
pub union ff_effect_data {
    pub rumble: ff_rumble_effect,
    #[cfg(target_pointer_width = "64")]
    pub pad: [u64; 4],
    #[cfg(not(target_pointer_width = "64"))]
    pub pad: [u32; 7],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct ff_effect {
    pub type_: u16,
    pub id: i16,
    pub direction: u16,
    pub trigger: ff_trigger,
    pub replay: ff_replay,
    pub u: ff_effect_data,
}

impl ff_effect {
    pub fn rumble(id: i16, strong: u16, weak: u16) -> Self {
        let mut u = ff_effect_data {
            pad: Default::default(),
        };
        u.rumble = ff_rumble_effect {
            strong_magnitude: strong,
            weak_magnitude: weak,
        };

        ff_effect {
            type_: FF_RUMBLE,
            id,
            direction: 0,
            trigger: ff_trigger::default(),
            replay: ff_replay::default(),
            u,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Default, Debug)]
pub struct js_event {
    pub time: u32,
    pub value: i16,
    pub type_: u8,
    pub number: u8,
}

ioctl_read!(eviocgid, b'E', 0x02, input_id);
ioctl_read_buf!(eviocgname, b'E', 0x06, u8);
ioctl_read_buf!(eviocguniq, b'E', 0x08, u8);
ioctl_read_buf!(eviocgkey, b'E', 0x18, u8);
ioctl_write_int!(eviocrmff, b'E', 0x81);

ioctl_read!(jsiocgaxes, b'j', 0x11, u8);
ioctl_read!(jsiocgbuttons, b'j', 0x12, u8);
ioctl_read_buf!(jsiocgname, b'j', 0x13, u8);
ioctl_read!(jsiocgaxmap, b'j', 0x32, [u8; ABS_CNT]);
ioctl_read!(jsiocgbtnmap, b'j', 0x34, [u16; JS_BTNMAP_LEN]);

/// `EVIOCGBIT(ev, len)`
pub unsafe fn eviocgbit(fd: c::c_int, ev: u32, buf: &mut [u8]) -> c::c_int {
    c::ioctl(
        fd,
        request_code_read!(b'E', 0x20 + ev, buf.len()) as _,
        buf.as_mut_ptr(),
    )
}

/// `EVIOCGABS(abs)`
pub unsafe fn eviocgabs(fd: c::c_int, abs: u32, buf: *mut input_absinfo) -> c::c_int {
    c::ioctl(
        fd,
        request_code_read!(b'E', 0x40 + abs, mem::size_of::<input_absinfo>()) as _,
        buf,
    )
}

/// `EVIOCSFF`. The kernel writes the assigned id back into `effect`.
pub unsafe fn eviocsff(fd: c::c_int, effect: *mut ff_effect) -> c::c_int {
    c::ioctl(
        fd,
        request_code_write!(b'E', 0x80, mem::size_of::<ff_effect>()) as _,
        effect,
    )
}

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;
pub const EV_FF: u16 = 0x15;
pub const EV_MAX: u16 = 0x1f;

pub const SYN_REPORT: u16 = 0x00;
pub const SYN_DROPPED: u16 = 0x03;

pub const REL_X: u16 = 0x00;
pub const REL_Y: u16 = 0x01;
pub const REL_HWHEEL: u16 = 0x06;
pub const REL_WHEEL: u16 = 0x08;
pub const REL_MAX: u16 = 0x0f;

pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;
pub const ABS_Z: u16 = 0x02;
pub const ABS_RX: u16 = 0x03;
pub const ABS_RY: u16 = 0x04;
pub const ABS_RZ: u16 = 0x05;
pub const ABS_THROTTLE: u16 = 0x06;
pub const ABS_RUDDER: u16 = 0x07;
pub const ABS_WHEEL: u16 = 0x08;
pub const ABS_GAS: u16 = 0x09;
pub const ABS_BRAKE: u16 = 0x0a;
pub const ABS_HAT0X: u16 = 0x10;
pub const ABS_HAT0Y: u16 = 0x11;
pub const ABS_HAT2X: u16 = 0x14;
pub const ABS_HAT2Y: u16 = 0x15;
pub const ABS_PRESSURE: u16 = 0x18;
pub const ABS_MAX: u16 = 0x3f;
pub const ABS_CNT: usize = ABS_MAX as usize + 1;

pub const KEY_MAX: u16 = 0x2ff;
pub const KEY_ESC: u16 = 1;
pub const KEY_A: u16 = 30;
pub const KEY_Z: u16 = 44;
pub const KEY_POWER: u16 = 116;
pub const KEY_BACK: u16 = 158;
pub const KEY_HOMEPAGE: u16 = 172;
pub const KEY_NEXT: u16 = 0x197;
pub const KEY_PREVIOUS: u16 = 0x19c;

pub const BTN_MISC: u16 = 0x100;
pub const BTN_MOUSE: u16 = 0x110;
pub const BTN_LEFT: u16 = 0x110;
pub const BTN_RIGHT: u16 = 0x111;
pub const BTN_MIDDLE: u16 = 0x112;
pub const BTN_SIDE: u16 = 0x113;
pub const BTN_EXTRA: u16 = 0x114;
pub const BTN_TASK: u16 = 0x117;
pub const BTN_JOYSTICK: u16 = 0x120;
pub const BTN_TRIGGER: u16 = 0x120;
pub const BTN_GAMEPAD: u16 = 0x130;
pub const BTN_SOUTH: u16 = 0x130;
pub const BTN_EAST: u16 = 0x131;
pub const BTN_C: u16 = 0x132;
pub const BTN_NORTH: u16 = 0x133;
pub const BTN_WEST: u16 = 0x134;
pub const BTN_Z: u16 = 0x135;
pub const BTN_TL: u16 = 0x136;
pub const BTN_TR: u16 = 0x137;
pub const BTN_TL2: u16 = 0x138;
pub const BTN_TR2: u16 = 0x139;
pub const BTN_SELECT: u16 = 0x13a;
pub const BTN_START: u16 = 0x13b;
pub const BTN_MODE: u16 = 0x13c;
pub const BTN_THUMBL: u16 = 0x13d;
pub const BTN_THUMBR: u16 = 0x13e;
pub const BTN_DIGI: u16 = 0x140;
pub const BTN_TOUCH: u16 = 0x14a;
pub const BTN_GEAR_DOWN: u16 = 0x150;
pub const BTN_GEAR_UP: u16 = 0x151;
pub const BTN_DPAD_UP: u16 = 0x220;
pub const BTN_DPAD_DOWN: u16 = 0x221;
pub const BTN_DPAD_LEFT: u16 = 0x222;
pub const BTN_DPAD_RIGHT: u16 = 0x223;
pub const BTN_TRIGGER_HAPPY1: u16 = 0x2c0;
pub const BTN_TRIGGER_HAPPY2: u16 = 0x2c1;
pub const BTN_TRIGGER_HAPPY3: u16 = 0x2c2;
pub const BTN_TRIGGER_HAPPY4: u16 = 0x2c3;

pub const FF_RUMBLE: u16 = 0x50;
pub const FF_MAX: u16 = 0x7f;

pub const JS_EVENT_BUTTON: u8 = 0x01;
pub const JS_EVENT_AXIS: u8 = 0x02;
pub const JS_EVENT_INIT: u8 = 0x80;
pub const JS_BTNMAP_LEN: usize = (KEY_MAX - BTN_MISC + 1) as usize;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_sizes() {
        assert_eq!(mem::size_of::<input_absinfo>(), 24);
        assert_eq!(mem::size_of::<input_id>(), 8);
        assert_eq!(mem::size_of::<js_event>(), 8);
        #[cfg(target_pointer_width = "64")]
        assert_eq!(mem::size_of::<ff_effect>(), 48);
    }
}
