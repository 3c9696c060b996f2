// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Canonical identity of an analog axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum Axis {
    X,
    Y,
    Z,
    Yaw,
    Pitch,
    Roll,
    LeftX,
    LeftY,
    LeftTrigger,
    RightX,
    RightY,
    RightTrigger,
    Throttle,
    Rudder,
    Wheel,
    Accelerator,
    Brake,
    Pressure,
}

impl Axis {
    const ALL: [Axis; 18] = [
        Axis::X,
        Axis::Y,
        Axis::Z,
        Axis::Yaw,
        Axis::Pitch,
        Axis::Roll,
        Axis::LeftX,
        Axis::LeftY,
        Axis::LeftTrigger,
        Axis::RightX,
        Axis::RightY,
        Axis::RightTrigger,
        Axis::Throttle,
        Axis::Rudder,
        Axis::Wheel,
        Axis::Accelerator,
        Axis::Brake,
        Axis::Pressure,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
            Axis::Yaw => "yaw",
            Axis::Pitch => "pitch",
            Axis::Roll => "roll",
            Axis::LeftX => "left_x",
            Axis::LeftY => "left_y",
            Axis::LeftTrigger => "left_trigger",
            Axis::RightX => "right_x",
            Axis::RightY => "right_y",
            Axis::RightTrigger => "right_trigger",
            Axis::Throttle => "throttle",
            Axis::Rudder => "rudder",
            Axis::Wheel => "wheel",
            Axis::Accelerator => "accelerator",
            Axis::Brake => "brake",
            Axis::Pressure => "pressure",
        }
    }

    /// Returns true if the axis rests in the middle of its range and reports values in `[-1, 1]`.
    /// Other axes rest at one end and report values in `[0, 1]`.
    pub fn is_centered(self) -> bool {
        matches!(
            self,
            Axis::X
                | Axis::Y
                | Axis::Z
                | Axis::Yaw
                | Axis::Pitch
                | Axis::Roll
                | Axis::LeftX
                | Axis::LeftY
                | Axis::RightX
                | Axis::RightY
                | Axis::Wheel
                | Axis::Rudder
        )
    }
}

impl Display for Axis {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Axis {
    type Err = ParseAxisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Axis::ALL
            .iter()
            .copied()
            .find(|axis| axis.name() == s)
            .ok_or_else(|| ParseAxisError(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAxisError(String);

impl Display for ParseAxisError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown axis name {:?}", self.0)
    }
}

impl Error for ParseAxisError {}
