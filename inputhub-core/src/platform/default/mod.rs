// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::backend::{BackendConfig, HotplugSink, InputBackend};
use crate::error::PlatformError;

use std::sync::Arc;

#[derive(Debug)]
struct Unsupported;

impl InputBackend for Unsupported {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn start(&mut self, _: Arc<dyn HotplugSink>) -> Result<(), PlatformError> {
        warn!("Current platform is not supported, no input devices will be reported");
        Err(PlatformError::NotImplemented)
    }

    fn update(&mut self) {}
}

pub fn new_backend(_: &BackendConfig) -> Box<dyn InputBackend> {
    Box::new(Unsupported)
}
