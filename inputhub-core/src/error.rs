// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::io;

/// Error returned when a platform backend can not be started.
#[derive(Debug)]
#[non_exhaustive]
pub enum PlatformError {
    /// The current platform has no backend.
    NotImplemented,
    /// Platform specific error.
    Other(Box<dyn StdError + Send + Sync>),
}

impl Display for PlatformError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::NotImplemented => {
                f.write_str("input devices are not supported on this platform")
            }
            PlatformError::Other(e) => write!(f, "platform error: {}", e),
        }
    }
}

impl StdError for PlatformError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            PlatformError::Other(e) => Some(&**e),
            PlatformError::NotImplemented => None,
        }
    }
}

impl From<io::Error> for PlatformError {
    fn from(e: io::Error) -> Self {
        PlatformError::Other(Box::new(e))
    }
}

/// Error returned by operations on a single device.
#[derive(Debug)]
#[non_exhaustive]
pub enum DeviceError {
    /// Device does not support requested operation.
    NotSupported,
    /// Device is no longer connected.
    Disconnected,
    Io(io::Error),
}

impl Display for DeviceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotSupported => f.write_str("operation is not supported by the device"),
            DeviceError::Disconnected => f.write_str("device is disconnected"),
            DeviceError::Io(e) => write!(f, "device I/O error: {}", e),
        }
    }
}

impl StdError for DeviceError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DeviceError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DeviceError {
    fn from(e: io::Error) -> Self {
        DeviceError::Io(e)
    }
}
