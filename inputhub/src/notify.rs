// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use inputhub_core::Device;

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Hot-plug notification emitted by the [`Registry`](crate::Registry).
#[derive(Debug, Clone)]
pub enum Notification {
    /// Device was added to the set of connected devices.
    ConnectDevice(Arc<Device>),
    /// Device was removed from the set of connected devices.
    DisconnectDevice(Arc<Device>),
}

impl Notification {
    /// Channel name, `"connect-device"` or `"disconnect-device"`.
    pub fn name(&self) -> &'static str {
        match self {
            Notification::ConnectDevice(_) => "connect-device",
            Notification::DisconnectDevice(_) => "disconnect-device",
        }
    }

    pub fn device(&self) -> &Arc<Device> {
        match self {
            Notification::ConnectDevice(dev) | Notification::DisconnectDevice(dev) => dev,
        }
    }
}

impl Display for Notification {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let dev = self.device();
        write!(f, "{} {} ({})", self.name(), dev.id(), dev.name())
    }
}

/// Handle returned by [`Registry::subscribe`](crate::Registry::subscribe).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub(crate) type Listener = Arc<dyn Fn(&Notification) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners {
    next: u64,
    entries: Vec<(SubscriptionId, Listener)>,
}

impl Listeners {
    pub fn add(&mut self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next);
        self.next += 1;
        self.entries.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let len = self.entries.len();
        self.entries.retain(|(i, _)| *i != id);
        self.entries.len() != len
    }

    pub fn snapshot(&self) -> Vec<Listener> {
        self.entries.iter().map(|(_, l)| l.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inputhub_core::VirtualDeviceBuilder;

    #[test]
    fn names() {
        let (dev, _) = VirtualDeviceBuilder::new("Pad").build();
        let connect = Notification::ConnectDevice(dev.clone());
        let disconnect = Notification::DisconnectDevice(dev.clone());

        assert_eq!(connect.name(), "connect-device");
        assert_eq!(disconnect.name(), "disconnect-device");
        assert!(Arc::ptr_eq(disconnect.device(), &dev));
        assert_eq!(
            connect.to_string(),
            format!("connect-device {} (Pad)", dev.id())
        );
    }

    #[test]
    fn add_and_remove_listeners() {
        let mut listeners = Listeners::default();
        let a = listeners.add(Arc::new(|_| ()));
        let b = listeners.add(Arc::new(|_| ()));
        assert_ne!(a, b);
        assert_eq!(listeners.snapshot().len(), 2);

        assert!(listeners.remove(a));
        assert!(!listeners.remove(a));
        assert_eq!(listeners.len(), 1);
    }
}
