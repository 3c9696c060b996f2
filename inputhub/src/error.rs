// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use inputhub_core::{ParseQuirkError, PlatformError};

use crate::registry::Registry;

use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};

/// Error type returned by [`RegistryBuilder::build`](crate::RegistryBuilder::build).
#[non_exhaustive]
pub enum Error {
    /// Input devices are not supported on the current platform. Returned registry is usable,
    /// but it will never report any device.
    NotImplemented(Registry),
    /// Quirk entries from `INPUTHUB_QUIRKS` could not be parsed.
    InvalidQuirks(ParseQuirkError),
    /// Platform backend failed to start.
    Other(Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn from_platform(err: PlatformError, registry: Registry) -> Self {
        match err {
            PlatformError::NotImplemented => Error::NotImplemented(registry),
            PlatformError::Other(e) => Error::Other(e),
            _ => Error::Other(Box::new(err)),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotImplemented(_) => f.write_str("NotImplemented(..)"),
            Error::InvalidQuirks(e) => f.debug_tuple("InvalidQuirks").field(e).finish(),
            Error::Other(e) => f.debug_tuple("Other").field(e).finish(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotImplemented(_) => {
                f.write_str("input devices are not supported on this platform")
            }
            Error::InvalidQuirks(e) => write!(f, "invalid quirk table: {}", e),
            Error::Other(e) => write!(f, "failed to start input backend: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::InvalidQuirks(e) => Some(e),
            Error::Other(e) => Some(&**e),
            Error::NotImplemented(_) => None,
        }
    }
}

impl From<ParseQuirkError> for Error {
    fn from(e: ParseQuirkError) -> Self {
        Error::InvalidQuirks(e)
    }
}
