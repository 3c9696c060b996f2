// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use super::io_kit::{IOHIDDevice, IOHIDElement};
use crate::button::ButtonId;
use crate::device::{
    Device, DeviceBackend, DeviceClass, DeviceInfo, DeviceStatus, Features, PollStatus,
};
use crate::hid::{self, ElementKind, ElementRole};
use crate::quirks::{QuirkTable, Quirks};
use crate::state::DeviceState;
use crate::utils;

use fnv::FnvHashSet;
use uuid::Uuid;

use std::sync::Arc;

const REST_EPSILON: f64 = 0.01;

/// Plain description of an IOKit element.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ElementDesc {
    pub cookie: u32,
    pub kind: ElementKind,
    pub page: u16,
    pub usage: u16,
    pub min: isize,
    pub max: isize,
}

impl ElementDesc {
    fn from_element(element: &IOHIDElement) -> Self {
        ElementDesc {
            cookie: element.cookie(),
            kind: ElementKind::from_raw(element.kind()),
            page: element.usage_page(),
            usage: element.usage(),
            min: element.logical_min(),
            max: element.logical_max(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Slot {
    Axis(usize),
    Button(usize),
    Hat { min: isize, buttons: [usize; 4] },
    PointerX,
    PointerY,
    Wheel { up: usize, down: usize },
}

impl Slot {
    fn is_relative(self) -> bool {
        matches!(self, Slot::PointerX | Slot::PointerY | Slot::Wheel { .. })
    }
}

/// Where the value of each element goes. Indices match the element list the layout was built
/// from.
#[derive(Clone, Debug, Default)]
pub struct ElementLayout {
    slots: Vec<Option<Slot>>,
}

impl ElementLayout {
    pub fn build(
        class: DeviceClass,
        quirks: Quirks,
        vendor_id: u16,
        product_id: u16,
        elements: &[ElementDesc],
        state: &mut DeviceState,
    ) -> Self {
        let mut cookies = FnvHashSet::default();
        let mut has_hat = false;
        let mut wheel = None;
        let mut slots = Vec::with_capacity(elements.len());

        for desc in elements {
            if !cookies.insert(desc.cookie) {
                slots.push(None);
                continue;
            }

            let role = hid::iokit_element_role(
                class, quirks, vendor_id, product_id, desc.kind, desc.page, desc.usage,
            );

            let slot = match role {
                ElementRole::Axis(mapping) if state.find_axis(mapping.axis).is_none() => {
                    let calibration = mapping.calibration(desc.min as f64, desc.max as f64);
                    let index = state.add_calibrated_axis(Some(mapping.axis), calibration);
                    Some(Slot::Axis(index))
                }
                ElementRole::Axis(_) => None,
                ElementRole::Button(Some(id)) if state.find_button(id).is_some() => None,
                ElementRole::Button(id) => Some(Slot::Button(state.add_button(id))),
                ElementRole::Hat if !has_hat => {
                    has_hat = true;
                    let buttons = hid::hat_buttons(class).map(|id| state.add_button(Some(id)));
                    Some(Slot::Hat {
                        min: desc.min,
                        buttons,
                    })
                }
                ElementRole::Hat => None,
                ElementRole::PointerX => Some(Slot::PointerX),
                ElementRole::PointerY => Some(Slot::PointerY),
                ElementRole::ScrollWheel => {
                    let [up, down] = *wheel.get_or_insert_with(|| {
                        [ButtonId::WHEEL_UP, ButtonId::WHEEL_DOWN]
                            .map(|id| state.add_button(Some(id)))
                    });
                    Some(Slot::Wheel { up, down })
                }
                ElementRole::Ignore => None,
            };

            slots.push(slot);
        }

        ElementLayout { slots }
    }

    pub fn has_pointer(&self) -> bool {
        self.slots
            .iter()
            .any(|s| matches!(s, Some(Slot::PointerX) | Some(Slot::PointerY)))
    }

    fn slot(&self, index: usize) -> Option<Slot> {
        self.slots.get(index).copied().flatten()
    }

    /// Applies `value` of element `index`. Pointer motion is added to `motion`. Returns true if
    /// anything changed.
    pub fn apply(
        &self,
        state: &mut DeviceState,
        index: usize,
        value: isize,
        motion: &mut (f64, f64),
    ) -> bool {
        let Some(slot) = self.slot(index) else {
            return false;
        };

        match slot {
            Slot::Axis(axis) => state.set_axis_raw(axis, value as f64),
            Slot::Button(button) => state.set_button(button, value != 0),
            Slot::Hat { min, buttons } => {
                let directions = hid::decode_hat((value - min) as i32);
                let mut changed = false;
                for (button, pressed) in buttons.into_iter().zip(directions) {
                    changed |= state.set_button(button, pressed);
                }
                changed
            }
            Slot::PointerX => {
                motion.0 += value as f64;
                value != 0
            }
            Slot::PointerY => {
                motion.1 += value as f64;
                value != 0
            }
            Slot::Wheel { up, down } => {
                let button = match value {
                    0 => return false,
                    v if v > 0 => up,
                    _ => down,
                };
                state.set_button(button, true);
                state.set_button(button, false);
                true
            }
        }
    }
}

/// Reads element values of one IOKit device.
pub struct IoKitBackend {
    device: IOHIDDevice,
    elements: Vec<IOHIDElement>,
    layout: ElementLayout,
    /// Timestamp of the last value seen for each element.
    stamps: Vec<u64>,
}

impl IoKitBackend {
    /// Reads all elements. Relative elements are skipped unless their value is newer than the
    /// last one seen.
    fn read(&mut self, state: &mut DeviceState) -> bool {
        let mut motion = (0.0, 0.0);
        let mut changed = false;

        for (index, element) in self.elements.iter().enumerate() {
            let Some(slot) = self.layout.slot(index) else {
                continue;
            };
            let Some((value, stamp)) = self.device.value(element) else {
                continue;
            };

            if slot.is_relative() {
                if self.stamps[index] == stamp {
                    continue;
                }
                self.stamps[index] = stamp;
            }

            changed |= self.layout.apply(state, index, value, &mut motion);
        }

        if motion != (0.0, 0.0) {
            trace!("Pointer motion {:?}", motion);
            state.pointer_moved(motion.0, motion.1);
        }

        changed
    }

    /// Records timestamps of relative elements without applying their values.
    fn mark_relative_seen(&mut self) {
        for (index, element) in self.elements.iter().enumerate() {
            if self.layout.slot(index).is_some_and(Slot::is_relative) {
                if let Some((_, stamp)) = self.device.value(element) {
                    self.stamps[index] = stamp;
                }
            }
        }
    }
}

impl DeviceBackend for IoKitBackend {
    fn poll(&mut self, state: &mut DeviceState) -> PollStatus {
        if self.read(state) {
            PollStatus::Activity
        } else {
            PollStatus::Idle
        }
    }
}

/// Creates device for IOKit device matched by the HID manager. Returns `None` for devices that
/// are not supported.
pub fn open(
    device: IOHIDDevice,
    quirk_table: &QuirkTable,
    enable_mouse_keyboard: bool,
) -> Option<Arc<Device>> {
    let name = device.name().unwrap_or_else(|| {
        warn!("Failed to get name of IOKit device");
        "Unknown".into()
    });
    let vendor_id = device.vendor_id();
    let product_id = device.product_id();
    let (vendor, product) = (vendor_id.unwrap_or(0), product_id.unwrap_or(0));

    let quirks = quirk_table.quirks(vendor, product);
    let class = quirk_table.class(vendor, product).unwrap_or_else(|| {
        hid::class_for_usage(
            device.primary_page().unwrap_or(0),
            device.primary_usage().unwrap_or(0),
        )
    });

    match class {
        DeviceClass::Unknown => {
            debug!("Ignoring {}: unknown device class", name);
            return None;
        }
        DeviceClass::Keyboard | DeviceClass::Mouse if !enable_mouse_keyboard => {
            debug!("Ignoring {}: mouse and keyboard support is disabled", name);
            return None;
        }
        _ => (),
    }

    let elements = device.elements();
    let descs: Vec<_> = elements.iter().map(ElementDesc::from_element).collect();

    let mut state = DeviceState::new();
    let layout = ElementLayout::build(class, quirks, vendor, product, &descs, &mut state);

    let mut features = Features::empty();
    features.set(Features::POINTER, layout.has_pointer());
    features.set(Features::KEYBOARD, class == DeviceClass::Keyboard);

    let uuid = match device.bustype() {
        Some(bus) => utils::sdl_uuid(bus, vendor, product, device.version().unwrap_or(0)),
        None => Uuid::nil(),
    };
    let info = DeviceInfo {
        name,
        manufacturer: device.manufacturer().unwrap_or_default(),
        serial_number: device.serial_number().unwrap_or_default(),
        vendor_id,
        product_id,
        uuid,
        class,
        features,
    };

    let mut backend = IoKitBackend {
        device,
        stamps: vec![0; elements.len()],
        elements,
        layout,
    };
    backend.mark_relative_seen();
    backend.read(&mut state);
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

    debug!(
        "IOKit {}: uuid: {}, class: {}, quirks: {:?}, status: {:?}, buttons: {}, axes: {}",
        info.name,
        info.uuid,
        class,
        quirks,
        status,
        state.buttons().len(),
        state.axes().len()
    );

    Some(Arc::new(Device::new(info, state, Box::new(backend), status)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::hid::{PAGE_BUTTON, PAGE_GENERIC_DESKTOP, USAGE_HAT_SWITCH, USAGE_WHEEL};
    use crate::hid::{USAGE_X, USAGE_Y, USAGE_Z};

    fn desc(
        cookie: u32,
        kind: ElementKind,
        page: u16,
        usage: u16,
        min: isize,
        max: isize,
    ) -> ElementDesc {
        ElementDesc {
            cookie,
            kind,
            page,
            usage,
            min,
            max,
        }
    }

    fn gamepad_elements() -> Vec<ElementDesc> {
        vec![
            desc(1, ElementKind::Collection, PAGE_GENERIC_DESKTOP, 5, 0, 0),
            desc(2, ElementKind::Misc, PAGE_GENERIC_DESKTOP, USAGE_X, 0, 255),
            desc(3, ElementKind::Misc, PAGE_GENERIC_DESKTOP, USAGE_Y, 0, 255),
            desc(4, ElementKind::Misc, PAGE_GENERIC_DESKTOP, USAGE_Z, 0, 255),
            desc(5, ElementKind::Misc, PAGE_GENERIC_DESKTOP, USAGE_HAT_SWITCH, 0, 7),
            desc(6, ElementKind::Button, PAGE_BUTTON, 2, 0, 1),
            desc(6, ElementKind::Button, PAGE_BUTTON, 2, 0, 1),
            desc(7, ElementKind::Button, PAGE_BUTTON, 3, 0, 1),
        ]
    }

    #[test]
    fn gamepad_layout() {
        let mut state = DeviceState::new();
        let layout = ElementLayout::build(
            DeviceClass::Gamepad,
            Quirks::empty(),
            0x1234,
            0x5678,
            &gamepad_elements(),
            &mut state,
        );

        assert_eq!(layout.slot(0), None);
        assert_eq!(layout.slot(6), None);
        assert!(state.find_axis(Axis::LeftX).is_some());
        assert!(state.find_axis(Axis::LeftY).is_some());
        assert!(state.find_axis(Axis::LeftTrigger).is_some());
        assert!(state.find_button(ButtonId::DPAD_UP).is_some());
        assert!(state.find_button(ButtonId::FACE_B).is_some());
        assert!(state.find_button(ButtonId::FACE_X).is_some());
        assert!(!layout.has_pointer());

        let mut motion = (0.0, 0.0);
        assert!(layout.apply(&mut state, 2, 0, &mut motion));
        assert!((state.axis_value(Axis::LeftY) - 1.0).abs() < 1e-9);
        assert!(layout.apply(&mut state, 3, 255, &mut motion));
        assert!((state.axis_value(Axis::LeftTrigger) - 1.0).abs() < 1e-9);

        assert!(layout.apply(&mut state, 4, 1, &mut motion));
        assert!(state.is_pressed(ButtonId::DPAD_UP));
        assert!(state.is_pressed(ButtonId::DPAD_RIGHT));
        assert!(layout.apply(&mut state, 4, 8, &mut motion));
        assert!(!state.is_pressed(ButtonId::DPAD_UP));

        assert!(layout.apply(&mut state, 5, 1, &mut motion));
        assert!(!layout.apply(&mut state, 5, 1, &mut motion));
        assert!(state.is_pressed(ButtonId::FACE_B));
        assert_eq!(motion, (0.0, 0.0));
    }

    #[test]
    fn mouse_layout() {
        let elements = [
            desc(1, ElementKind::Misc, PAGE_GENERIC_DESKTOP, USAGE_X, -127, 127),
            desc(2, ElementKind::Misc, PAGE_GENERIC_DESKTOP, USAGE_Y, -127, 127),
            desc(3, ElementKind::Misc, PAGE_GENERIC_DESKTOP, USAGE_WHEEL, -127, 127),
            desc(4, ElementKind::Button, PAGE_BUTTON, 1, 0, 1),
        ];
        let mut state = DeviceState::new();
        let layout = ElementLayout::build(
            DeviceClass::Mouse,
            Quirks::empty(),
            0,
            0,
            &elements,
            &mut state,
        );

        assert!(layout.has_pointer());
        assert!(state.find_button(ButtonId::MOUSE1).is_some());

        let mut motion = (0.0, 0.0);
        layout.apply(&mut state, 0, 5, &mut motion);
        layout.apply(&mut state, 1, -2, &mut motion);
        assert_eq!(motion, (5.0, -2.0));

        assert!(layout.apply(&mut state, 2, -1, &mut motion));
        assert!(!state.is_pressed(ButtonId::WHEEL_DOWN));
        let events = state.take_button_events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.button == ButtonId::WHEEL_DOWN));
    }
}
