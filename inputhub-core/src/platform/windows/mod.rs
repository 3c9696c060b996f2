// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Windows backend: HID devices through raw input, Xbox controllers through XInput.

mod devnode;
mod hidp;
mod raw_input;
mod xinput;

use self::raw_input::MessageThread;
use self::xinput::XInputSlots;
use crate::backend::{BackendConfig, HotplugSink, InputBackend};
use crate::error::PlatformError;
use crate::quirks::QuirkTable;

use std::sync::Arc;

pub struct WindowsBackend {
    quirks: QuirkTable,
    xinput: XInputSlots,
    raw_input: Option<MessageThread>,
    sink: Option<Arc<dyn HotplugSink>>,
}

impl WindowsBackend {
    pub fn new(config: &BackendConfig) -> Self {
        if config.enable_mouse_keyboard {
            debug!("Mice and keyboards are not reported on Windows");
        }

        WindowsBackend {
            quirks: config.quirks.clone(),
            xinput: XInputSlots::new(config.xinput_poll_interval),
            raw_input: None,
            sink: None,
        }
    }
}

impl InputBackend for WindowsBackend {
    fn name(&self) -> &'static str {
        "rawinput"
    }

    fn start(&mut self, sink: Arc<dyn HotplugSink>) -> Result<(), PlatformError> {
        match MessageThread::spawn(sink.clone(), self.quirks.clone()) {
            Ok(thread) => self.raw_input = Some(thread),
            Err(e) => warn!("Raw input is unavailable: {}", e),
        }

        self.xinput.update(&*sink);
        self.sink = Some(sink);

        Ok(())
    }

    fn update(&mut self) {
        if let Some(sink) = &self.sink {
            self.xinput.update(&**sink);
        }
    }
}

pub fn new_backend(config: &BackendConfig) -> Box<dyn InputBackend> {
    Box::new(WindowsBackend::new(config))
}
