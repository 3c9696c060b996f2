// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Canonical button identities.
//!
//! A [`ButtonId`] is a small integer. The first ids are reserved for printable ASCII keys, the
//! rest of the standard set follows. A [`ButtonRegistry`] maps ids to stable string names and can
//! be extended at runtime with custom names.

use fnv::FnvHashMap;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

use std::fmt::{self, Display, Formatter};
use std::sync::{PoisonError, RwLock};

/// Canonical identity of a button, independent of the device and the platform.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ButtonId(u16);

const ASCII_FIRST: u8 = b' ';
const ASCII_LAST: u8 = b'~';
const ASCII_COUNT: u16 = (ASCII_LAST - ASCII_FIRST + 1) as u16;

macro_rules! standard_buttons {
    ($($konst:ident => $name:literal,)*) => {
        #[allow(non_camel_case_types, clippy::upper_case_acronyms, dead_code)]
        #[repr(u16)]
        enum Slot {
            _LastAscii = ASCII_COUNT - 1,
            $($konst,)*
            _End,
        }

        impl ButtonId {
            $(pub const $konst: ButtonId = ButtonId(Slot::$konst as u16);)*
        }

        const NAMED: &[&str] = &[$($name,)*];
        const STANDARD_COUNT: u16 = Slot::_End as u16;
    };
}

standard_buttons! {
    BACKSPACE => "backspace",
    TAB => "tab",
    ENTER => "enter",
    ESCAPE => "escape",
    DEL => "del",
    F1 => "f1",
    F2 => "f2",
    F3 => "f3",
    F4 => "f4",
    F5 => "f5",
    F6 => "f6",
    F7 => "f7",
    F8 => "f8",
    F9 => "f9",
    F10 => "f10",
    F11 => "f11",
    F12 => "f12",
    F13 => "f13",
    F14 => "f14",
    F15 => "f15",
    F16 => "f16",
    LEFT => "arrow_left",
    RIGHT => "arrow_right",
    UP => "arrow_up",
    DOWN => "arrow_down",
    PAGE_UP => "page_up",
    PAGE_DOWN => "page_down",
    HOME => "home",
    END => "end",
    INSERT => "insert",
    HELP => "help",
    MENU => "menu",
    CAPS_LOCK => "caps_lock",
    NUM_LOCK => "num_lock",
    SCROLL_LOCK => "scroll_lock",
    PRINT_SCREEN => "print_screen",
    PAUSE => "pause",
    LSHIFT => "lshift",
    RSHIFT => "rshift",
    LCONTROL => "lcontrol",
    RCONTROL => "rcontrol",
    LALT => "lalt",
    RALT => "ralt",
    LMETA => "lmeta",
    RMETA => "rmeta",
    MOUSE1 => "mouse1",
    MOUSE2 => "mouse2",
    MOUSE3 => "mouse3",
    MOUSE4 => "mouse4",
    MOUSE5 => "mouse5",
    WHEEL_UP => "wheel_up",
    WHEEL_DOWN => "wheel_down",
    WHEEL_LEFT => "wheel_left",
    WHEEL_RIGHT => "wheel_right",
    LSTICK => "lstick",
    RSTICK => "rstick",
    LSHOULDER => "lshoulder",
    RSHOULDER => "rshoulder",
    LTRIGGER => "ltrigger",
    RTRIGGER => "rtrigger",
    LGRIP => "lgrip",
    RGRIP => "rgrip",
    DPAD_LEFT => "dpad_left",
    DPAD_RIGHT => "dpad_right",
    DPAD_UP => "dpad_up",
    DPAD_DOWN => "dpad_down",
    BACK => "back",
    GUIDE => "guide",
    START => "start",
    NEXT => "next",
    PREVIOUS => "previous",
    FACE_A => "face_a",
    FACE_B => "face_b",
    FACE_C => "face_c",
    FACE_X => "face_x",
    FACE_Y => "face_y",
    FACE_Z => "face_z",
    FACE_1 => "face_1",
    FACE_2 => "face_2",
    TRIGGER => "trigger",
    JOYSTICK1 => "joystick1",
    JOYSTICK2 => "joystick2",
    JOYSTICK3 => "joystick3",
    JOYSTICK4 => "joystick4",
    JOYSTICK5 => "joystick5",
    JOYSTICK6 => "joystick6",
    JOYSTICK7 => "joystick7",
    JOYSTICK8 => "joystick8",
    JOYSTICK9 => "joystick9",
    JOYSTICK10 => "joystick10",
    JOYSTICK11 => "joystick11",
    JOYSTICK12 => "joystick12",
    JOYSTICK13 => "joystick13",
    JOYSTICK14 => "joystick14",
    JOYSTICK15 => "joystick15",
    HAT_UP => "hat_up",
    HAT_DOWN => "hat_down",
    HAT_LEFT => "hat_left",
    HAT_RIGHT => "hat_right",
}

impl ButtonId {
    /// Creates id from its raw value. Ids that were never registered have no name.
    pub const fn from_raw(raw: u16) -> Self {
        ButtonId(raw)
    }

    pub const fn into_raw(self) -> u16 {
        self.0
    }

    /// Key producing printable ASCII character `c`. Letters are identified by their lowercase
    /// form, the space bar is `' '`.
    pub fn ascii_key(c: char) -> Option<Self> {
        let c = c.to_ascii_lowercase();
        if (ASCII_FIRST as char..=ASCII_LAST as char).contains(&c) {
            Some(ButtonId(u16::from(c as u8 - ASCII_FIRST)))
        } else {
            None
        }
    }

    /// Returns the character of a printable ASCII key.
    pub fn as_ascii(self) -> Option<char> {
        if self.0 < ASCII_COUNT {
            Some((self.0 as u8 + ASCII_FIRST) as char)
        } else {
            None
        }
    }

    /// Function key `F<n>`, `n` in `1..=16`.
    pub fn function_key(n: u8) -> Option<Self> {
        match n {
            1..=16 => Some(ButtonId(ButtonId::F1.0 + u16::from(n) - 1)),
            _ => None,
        }
    }

    /// Mouse button `n`, counting from zero. Button 0 is the primary button, 1 the middle one and
    /// 2 the secondary one.
    pub fn mouse(n: u8) -> Option<Self> {
        match n {
            0..=4 => Some(ButtonId(ButtonId::MOUSE1.0 + u16::from(n))),
            _ => None,
        }
    }

    /// Joystick button `n`. Button 0 is the trigger.
    pub fn joystick(n: u8) -> Option<Self> {
        match n {
            0..=15 => Some(ButtonId(ButtonId::TRIGGER.0 + u16::from(n))),
            _ => None,
        }
    }

    /// Name of the id in the standard set.
    pub fn standard_name(self) -> Option<String> {
        if let Some(c) = self.as_ascii() {
            return Some(if c == ' ' {
                "space".to_owned()
            } else {
                c.to_string()
            });
        }

        NAMED
            .get(usize::from(self.0 - ASCII_COUNT))
            .map(|name| (*name).to_owned())
            .filter(|_| self.0 < STANDARD_COUNT)
    }
}

impl Display for ButtonId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.standard_name() {
            Some(name) => f.write_str(&name),
            None => write!(f, "button#{}", self.0),
        }
    }
}

/// Maps button ids to names and back.
///
/// A fresh registry knows every standard button. Custom buttons can be registered at any time;
/// registering a known name returns the existing id.
#[derive(Debug)]
pub struct ButtonRegistry {
    inner: RwLock<Names>,
}

#[derive(Debug, Clone)]
struct Names {
    names: Vec<String>,
    by_name: FnvHashMap<String, ButtonId>,
}

impl ButtonRegistry {
    pub fn new() -> Self {
        let mut names = Names {
            names: Vec::with_capacity(usize::from(STANDARD_COUNT)),
            by_name: FnvHashMap::default(),
        };

        for raw in 0..STANDARD_COUNT {
            let id = ButtonId(raw);
            let name = id.to_string();
            names.by_name.insert(name.clone(), id);
            names.names.push(name);
        }

        ButtonRegistry {
            inner: RwLock::new(names),
        }
    }

    /// Returns id of `name`, registering it if it is not known yet.
    pub fn register(&self, name: &str) -> ButtonId {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = inner.by_name.get(name) {
            return *id;
        }

        let id = ButtonId(inner.names.len() as u16);
        inner.names.push(name.to_owned());
        inner.by_name.insert(name.to_owned(), id);
        debug!("Registered button {:?} as {}", name, id.0);

        id
    }

    pub fn find(&self, name: &str) -> Option<ButtonId> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_name.get(name).copied()
    }

    pub fn name(&self, id: ButtonId) -> Option<String> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.names.get(usize::from(id.0)).cloned()
    }

    /// Number of known names, standard ones included.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ButtonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ButtonRegistry {
    fn clone(&self) -> Self {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        ButtonRegistry {
            inner: RwLock::new(inner.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_keys() {
        assert_eq!(ButtonId::ascii_key('a'), ButtonId::ascii_key('A'));
        assert_eq!(ButtonId::ascii_key('q').unwrap().as_ascii(), Some('q'));
        assert_eq!(ButtonId::ascii_key(' ').unwrap().to_string(), "space");
        assert_eq!(ButtonId::ascii_key('\n'), None);
        assert_eq!(ButtonId::ascii_key('é'), None);
        assert_eq!(ButtonId::BACKSPACE.as_ascii(), None);
    }

    #[test]
    fn contiguous_ranges() {
        assert_eq!(ButtonId::function_key(1), Some(ButtonId::F1));
        assert_eq!(ButtonId::function_key(16), Some(ButtonId::F16));
        assert_eq!(ButtonId::function_key(17), None);
        assert_eq!(ButtonId::mouse(2), Some(ButtonId::MOUSE3));
        assert_eq!(ButtonId::joystick(0), Some(ButtonId::TRIGGER));
        assert_eq!(ButtonId::joystick(15), Some(ButtonId::JOYSTICK15));
        assert_eq!(ButtonId::joystick(16), None);
    }

    #[test]
    fn standard_names() {
        assert_eq!(ButtonId::FACE_A.to_string(), "face_a");
        assert_eq!(ButtonId::HAT_RIGHT.to_string(), "hat_right");
        assert_eq!(ButtonId::LEFT.to_string(), "arrow_left");
        assert_eq!(ButtonId::from_raw(u16::MAX).standard_name(), None);
        assert_eq!(ButtonId::from_raw(u16::MAX).to_string(), "button#65535");
    }

    #[test]
    fn registry_lookup() {
        let registry = ButtonRegistry::new();
        assert_eq!(registry.find("dpad_up"), Some(ButtonId::DPAD_UP));
        assert_eq!(registry.find("x"), ButtonId::ascii_key('x'));
        assert_eq!(registry.name(ButtonId::GUIDE).as_deref(), Some("guide"));
        assert_eq!(registry.find("paddle1"), None);
    }

    #[test]
    fn registry_custom_names() {
        let registry = ButtonRegistry::new();
        let before = registry.len();

        let paddle = registry.register("paddle1");
        assert_eq!(registry.register("paddle1"), paddle);
        assert_eq!(registry.register("start"), ButtonId::START);
        assert_eq!(registry.len(), before + 1);
        assert_eq!(registry.name(paddle).as_deref(), Some("paddle1"));

        let copy = registry.clone();
        let other = registry.register("paddle2");
        assert_eq!(copy.find("paddle2"), None);
        assert_eq!(registry.find("paddle2"), Some(other));
    }
}
