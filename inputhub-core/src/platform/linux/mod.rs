// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Linux backend: evdev devices with joydev fallback, hot-plug through inotify on
//! `/dev/input`.

mod evdev;
mod evdev_map;
mod ioctl;
mod joydev;
mod sysfs;
mod udev;

use self::evdev::OpenError;
use self::udev::Udev;
use crate::backend::{BackendConfig, HotplugSink, InputBackend};
use crate::device::{Device, DeviceStatus};
use crate::error::PlatformError;
use crate::quirks::QuirkTable;

use inotify::{EventMask, Inotify, WatchMask};

use std::io;
use std::path::Path;
use std::sync::Arc;

const INPUT_DIR_PATH: &str = "/dev/input";
const SYSFS_INPUT_PATH: &str = "/sys/class/input";

pub fn new_backend(config: &BackendConfig) -> Box<dyn InputBackend> {
    Box::new(LinuxBackend::new(config))
}

/// What device opening needs to know.
pub struct Context {
    quirks: QuirkTable,
    enable_mouse_keyboard: bool,
    udev: Option<Udev>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum NodeKind {
    Evdev,
    /// Joydev node standing in for an unreadable evdev node.
    Joydev,
}

struct Node {
    /// Name of the evdev node, `eventN`.
    event: String,
    kind: NodeKind,
    device: Arc<Device>,
}

pub struct LinuxBackend {
    ctx: Context,
    inotify: Option<Inotify>,
    sink: Option<Arc<dyn HotplugSink>>,
    nodes: Vec<Node>,
}

impl LinuxBackend {
    pub fn new(config: &BackendConfig) -> Self {
        let udev = if !config.use_udev {
            None
        } else if Path::new("/.flatpak-info").exists() {
            debug!("Looks like we're in an environment without udev. Falling back to sysfs");
            None
        } else {
            Udev::new().or_else(|| {
                warn!("Failed to create udev context, device metadata will come from sysfs");
                None
            })
        };

        LinuxBackend {
            ctx: Context {
                quirks: config.quirks.clone(),
                enable_mouse_keyboard: config.enable_mouse_keyboard,
                udev,
            },
            inotify: None,
            sink: None,
            nodes: Vec::new(),
        }
    }

    fn notify_arrived(&self, device: &Arc<Device>) {
        if let Some(sink) = &self.sink {
            sink.device_arrived(device.clone());
        }
    }

    fn notify_removed(&self, device: &Arc<Device>) {
        if let Some(sink) = &self.sink {
            sink.device_removed(device);
        }
    }

    fn find(&self, event: &str, kind: NodeKind) -> Option<usize> {
        self.nodes
            .iter()
            .position(|node| node.event == event && node.kind == kind)
    }

    /// Tries to open evdev node `event`, falling back to its joydev sibling.
    fn open(&mut self, event: &str) {
        if let Some(idx) = self.find(event, NodeKind::Evdev) {
            if self.nodes[idx].device.status() != DeviceStatus::Disconnected {
                return;
            }
            self.nodes.swap_remove(idx);
        }

        let devpath = Path::new(INPUT_DIR_PATH).join(event);
        let syspath = Path::new(SYSFS_INPUT_PATH).join(event);

        match evdev::open(&devpath, &syspath, &self.ctx) {
            Ok(device) => {
                if let Some(idx) = self.find(event, NodeKind::Joydev) {
                    let standin = self.nodes.swap_remove(idx);
                    debug!("{:?} is readable now, dropping joydev stand-in", devpath);
                    standin.device.disconnect();
                    self.notify_removed(&standin.device);
                }

                self.add(event, NodeKind::Evdev, device);
            }
            Err(OpenError::Unreadable(err)) => {
                debug!("Failed to open {:?}: {}", devpath, err);
                if self.find(event, NodeKind::Joydev).is_none() {
                    self.open_joydev(event, &syspath);
                }
            }
            Err(err) => debug!("Not using {:?}: {}", devpath, err),
        }
    }

    fn open_joydev(&mut self, event: &str, event_syspath: &Path) {
        let Some((devpath, syspath)) = joydev::sibling(event_syspath) else {
            return;
        };

        match joydev::open(&devpath, &syspath, &self.ctx) {
            Ok(device) => {
                debug!("Using {:?} until {} becomes readable", devpath, event);
                self.add(event, NodeKind::Joydev, device);
            }
            Err(err) => debug!("Not using {:?}: {}", devpath, err),
        }
    }

    fn add(&mut self, event: &str, kind: NodeKind, device: Arc<Device>) {
        self.notify_arrived(&device);
        self.nodes.push(Node {
            event: event.to_owned(),
            kind,
            device,
        });
    }

    /// Node `event` was removed from `/dev/input`.
    fn remove(&mut self, event: &str) {
        let (removed, kept): (Vec<Node>, Vec<Node>) = std::mem::take(&mut self.nodes)
            .into_iter()
            .partition(|node| node.event == event);
        self.nodes = kept;

        for node in removed {
            node.device.disconnect();
            self.notify_removed(&node.device);
        }
    }

    /// Forgets devices that noticed on their own that they are gone.
    fn prune(&mut self) {
        let (lost, kept): (Vec<Node>, Vec<Node>) = std::mem::take(&mut self.nodes)
            .into_iter()
            .partition(|node| node.device.status() == DeviceStatus::Disconnected);
        self.nodes = kept;

        for node in lost {
            self.notify_removed(&node.device);
        }
    }

    fn read_hotplug(&mut self) -> Vec<(String, EventMask)> {
        let Some(inotify) = self.inotify.as_mut() else {
            return Vec::new();
        };

        let mut changes = Vec::new();
        let mut buffer = [0u8; 1024];
        let mut failed = false;
        loop {
            match inotify.read_events(&mut buffer) {
                Ok(events) => {
                    for event in events {
                        let Some(name) = event.name.and_then(|name| name.to_str()) else {
                            continue;
                        };
                        if sysfs::is_node_name(name, "event") {
                            changes.push((name.to_owned(), event.mask));
                        }
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("Failed to check for changes to input devices: {}", e);
                    failed = true;
                    break;
                }
            }
        }

        if failed {
            self.inotify = None;
        }
        changes
    }
}

impl InputBackend for LinuxBackend {
    fn name(&self) -> &'static str {
        "evdev"
    }

    fn start(&mut self, sink: Arc<dyn HotplugSink>) -> Result<(), PlatformError> {
        self.sink = Some(sink);

        match watch_input_dir() {
            Ok(inotify) => self.inotify = Some(inotify),
            Err(e) => error!("Failed to watch {}, hot-plug is disabled: {}", INPUT_DIR_PATH, e),
        }

        let mut events: Vec<(u32, String)> = Path::new(INPUT_DIR_PATH)
            .read_dir()
            .map_err(|err| PlatformError::Other(Box::new(err)))?
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| Some((name.strip_prefix("event")?.parse().ok()?, name)))
            .collect();
        events.sort();

        for (_, event) in events {
            self.open(&event);
        }

        Ok(())
    }

    fn update(&mut self) {
        for (name, mask) in self.read_hotplug() {
            if mask.intersects(EventMask::CREATE | EventMask::MOVED_TO | EventMask::ATTRIB) {
                self.open(&name);
            } else if mask.intersects(EventMask::DELETE | EventMask::MOVED_FROM) {
                self.remove(&name);
            }
        }

        self.prune();
    }
}

fn watch_input_dir() -> io::Result<Inotify> {
    let inotify = Inotify::init()?;
    inotify.watches().add(
        INPUT_DIR_PATH,
        WatchMask::CREATE | WatchMask::DELETE | WatchMask::MOVE | WatchMask::ATTRIB,
    )?;
    Ok(inotify)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_without_udev() {
        let config = BackendConfig {
            use_udev: false,
            ..Default::default()
        };
        let backend = LinuxBackend::new(&config);
        assert!(backend.ctx.udev.is_none());
        assert_eq!(backend.name(), "evdev");
        assert!(backend.nodes.is_empty());
    }
}
