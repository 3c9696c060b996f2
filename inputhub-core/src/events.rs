// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

use crate::button::ButtonId;

use std::time::SystemTime;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum ButtonEventKind {
    Down,
    Up,
    /// Button was already held when the device became connected.
    ResumeDown,
    /// Key press or auto-repeat that produced a printable character.
    Keystroke(char),
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct ButtonEvent {
    pub button: ButtonId,
    pub kind: ButtonEventKind,
    pub time: SystemTime,
}

/// Single pointer motion.
///
/// `length`, `direction` and `rotation` describe the motion relative to the previous pointer
/// event of the same device. `direction` is in degrees, counter-clockwise from the positive x
/// axis with y growing downwards like screen coordinates, in `[0, 360)`. `rotation` is the change
/// of direction in `(-180, 180]`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct PointerEvent {
    pub in_window: bool,
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
    pub length: f64,
    pub direction: f64,
    pub rotation: f64,
    pub sequence: u64,
    pub time: SystemTime,
}

impl PointerEvent {
    /// Builds event for motion `(dx, dy)` ending at `(x, y)`. `previous_direction` is the
    /// direction of the last event from this device.
    pub(crate) fn derive(
        in_window: bool,
        (x, y): (f64, f64),
        (dx, dy): (f64, f64),
        previous_direction: f64,
        sequence: u64,
        time: SystemTime,
    ) -> Self {
        let length = dx.hypot(dy);
        let direction = if length > 0.0 {
            normalize_degrees((-dy).atan2(dx).to_degrees())
        } else {
            previous_direction
        };

        PointerEvent {
            in_window,
            x,
            y,
            dx,
            dy,
            length,
            direction,
            rotation: delta_angle(previous_direction, direction),
            sequence,
            time,
        }
    }
}

fn normalize_degrees(angle: f64) -> f64 {
    let angle = angle.rem_euclid(360.0);
    if angle >= 360.0 {
        0.0
    } else {
        angle
    }
}

/// Signed difference `to - from` in `(-180, 180]`.
fn delta_angle(from: f64, to: f64) -> f64 {
    let delta = normalize_degrees(to - from);
    if delta > 180.0 {
        delta - 360.0
    } else {
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn angles() {
        assert!(close(normalize_degrees(-90.0), 270.0));
        assert!(close(normalize_degrees(720.0), 0.0));
        assert!(close(delta_angle(350.0, 10.0), 20.0));
        assert!(close(delta_angle(10.0, 350.0), -20.0));
        assert!(close(delta_angle(0.0, 180.0), 180.0));
    }

    #[test]
    fn derived_motion() {
        let now = SystemTime::now();

        let up = PointerEvent::derive(false, (0.0, -5.0), (0.0, -5.0), 0.0, 1, now);
        assert!(close(up.length, 5.0));
        assert!(close(up.direction, 90.0));
        assert!(close(up.rotation, 90.0));

        let left = PointerEvent::derive(false, (-3.0, -5.0), (-3.0, 0.0), up.direction, 2, now);
        assert!(close(left.direction, 180.0));
        assert!(close(left.rotation, 90.0));

        let still = PointerEvent::derive(true, (-3.0, -5.0), (0.0, 0.0), left.direction, 3, now);
        assert!(close(still.length, 0.0));
        assert!(close(still.direction, 180.0));
        assert!(close(still.rotation, 0.0));
    }
}
