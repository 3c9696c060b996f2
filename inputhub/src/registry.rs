// Copyright 2016-2018 Mateusz Sieczko and other GilRs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use inputhub_core::{
    BackendConfig, ButtonRegistry, Device, DeviceClass, DeviceId, DeviceStatus, HotplugSink,
    InputBackend, NullBackend, QuirkTable, RunLoopMode,
};

use crate::error::Error;
use crate::notify::{Listener, Listeners, Notification, SubscriptionId};

use std::env;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, TryLockError};
use std::time::Duration;

const QUIRKS_ENV: &str = "INPUTHUB_QUIRKS";
const MOUSE_KEYBOARD_ENV: &str = "INPUTHUB_ENABLE_MOUSE_KEYBOARD";
const DISABLE_UDEV_ENV: &str = "INPUTHUB_DISABLE_UDEV";

#[derive(Default)]
struct Devices {
    connected: Vec<Arc<Device>>,
    inactive: Vec<Arc<Device>>,
}

impl Devices {
    fn is_connected(&self, id: DeviceId) -> bool {
        self.connected.iter().any(|d| d.id() == id)
    }
}

/// State shared between the registry and the backend's hot-plug callbacks.
#[derive(Default)]
struct Shared {
    devices: Mutex<Devices>,
    listeners: Mutex<Listeners>,
}

impl Shared {
    fn devices(&self) -> MutexGuard<'_, Devices> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn add_device(&self, device: Arc<Device>) -> bool {
        if device.status() == DeviceStatus::Disconnected {
            debug!("Ignoring disconnected device {} ({})", device.id(), device.name());
            return false;
        }

        {
            let mut devices = self.devices();
            if devices.is_connected(device.id()) {
                return false;
            }
            devices.inactive.retain(|d| d.id() != device.id());
            devices.connected.push(device.clone());
        }

        device.activate();
        info!(
            "Device {} ({}, {}) connected",
            device.id(),
            device.name(),
            device.class()
        );
        self.notify(&Notification::ConnectDevice(device));

        true
    }

    fn remove_device(&self, device: &Arc<Device>) -> bool {
        let removed = {
            let mut devices = self.devices();
            devices.inactive.retain(|d| d.id() != device.id());
            match devices.connected.iter().position(|d| d.id() == device.id()) {
                Some(idx) => {
                    devices.connected.remove(idx);
                    true
                }
                None => false,
            }
        };

        if removed {
            info!("Device {} ({}) disconnected", device.id(), device.name());
            self.notify(&Notification::DisconnectDevice(device.clone()));
        }

        removed
    }

    fn notify(&self, notification: &Notification) {
        let listeners = self.listeners().snapshot();
        trace!("{} to {} listeners", notification, listeners.len());
        for listener in listeners {
            listener(notification);
        }
    }
}

impl HotplugSink for Shared {
    fn device_arrived(&self, device: Arc<Device>) {
        match device.status() {
            DeviceStatus::Connected => {
                self.add_device(device);
            }
            DeviceStatus::Inactive => {
                let mut devices = self.devices();
                let id = device.id();
                if !devices.is_connected(id) && !devices.inactive.iter().any(|d| d.id() == id) {
                    debug!("Device {} ({}) waits for activity", id, device.name());
                    devices.inactive.push(device);
                }
            }
            DeviceStatus::Disconnected => {
                debug!("Device {} ({}) arrived already lost", device.id(), device.name())
            }
        }
    }

    fn device_removed(&self, device: &Arc<Device>) {
        self.remove_device(device);
    }
}

/// Process wide list of input devices.
///
/// The registry owns the platform backend. It keeps two sets of devices: connected ones, which
/// are visible through [`get_devices`](Registry::get_devices) and friends, and inactive ones,
/// which were opened but not confirmed yet. Inactive devices are polled on every
/// [`update`](Registry::update) and move to the connected set once they report activity.
///
/// ```no_run
/// use inputhub::{Notification, Registry};
///
/// let registry = Registry::get_global_ptr();
/// registry.subscribe(|n: &Notification| println!("{}", n));
///
/// loop {
///     registry.update();
///     for pad in registry.get_gamepads() {
///         pad.poll();
///         for event in pad.drain_button_events() {
///             println!("{}: {:?}", pad.name(), event);
///         }
///     }
///     # break;
/// }
/// ```
pub struct Registry {
    backend: Mutex<Box<dyn InputBackend>>,
    shared: Arc<Shared>,
    buttons: ButtonRegistry,
}

impl Registry {
    /// Creates registry with default configuration. See [`RegistryBuilder`].
    pub fn new() -> Result<Self, Error> {
        RegistryBuilder::new().build()
    }

    /// Returns the process wide registry, creating it on first call.
    ///
    /// Configuration is read from environment: `INPUTHUB_QUIRKS` adds quirk entries,
    /// `INPUTHUB_ENABLE_MOUSE_KEYBOARD` also reports mice and keyboards and
    /// `INPUTHUB_DISABLE_UDEV` stops using udev on Linux. Failures are logged and the registry
    /// falls back to one without devices.
    pub fn get_global_ptr() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();

        GLOBAL.get_or_init(|| match RegistryBuilder::from_env().build() {
            Ok(registry) => registry,
            Err(Error::NotImplemented(registry)) => registry,
            Err(Error::InvalidQuirks(e)) => {
                error!("{}, ignoring {}", e, QUIRKS_ENV);
                RegistryBuilder::from_env()
                    .add_quirks_from_env(false)
                    .build()
                    .unwrap_or_else(|e| Registry::fallback(&e))
            }
            Err(e) => Registry::fallback(&e),
        })
    }

    fn fallback(err: &Error) -> Self {
        error!("{}", err);
        Registry::with_backend(Box::new(NullBackend), ButtonRegistry::new())
    }

    fn with_backend(backend: Box<dyn InputBackend>, buttons: ButtonRegistry) -> Self {
        Registry {
            backend: Mutex::new(backend),
            shared: Arc::new(Shared::default()),
            buttons,
        }
    }

    /// Name of the platform backend, for example `"evdev"`.
    pub fn backend_name(&self) -> &'static str {
        self.backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .name()
    }

    /// Processes pending hot-plug signals, polls inactive devices and drops connected devices
    /// that were lost. Call it once per tick.
    pub fn update(&self) {
        match self.backend.try_lock() {
            Ok(mut backend) => backend.update(),
            Err(TryLockError::Poisoned(e)) => e.into_inner().update(),
            Err(TryLockError::WouldBlock) => {
                trace!("Registry update already in progress");
                return;
            }
        }

        let inactive = self.shared.devices().inactive.clone();
        for device in inactive {
            match device.poll() {
                DeviceStatus::Inactive => (),
                DeviceStatus::Connected => {
                    self.shared.add_device(device);
                }
                DeviceStatus::Disconnected => {
                    debug!("Inactive device {} ({}) lost", device.id(), device.name());
                    self.shared.devices().inactive.retain(|d| d.id() != device.id());
                }
            }
        }

        let connected = self.shared.devices().connected.clone();
        for device in connected {
            if device.status() == DeviceStatus::Disconnected {
                self.shared.remove_device(&device);
            }
        }
    }

    /// Adds device to the connected set and emits `connect-device`. An inactive device is
    /// confirmed. Returns false if the device was already connected or is disconnected.
    pub fn add_device(&self, device: Arc<Device>) -> bool {
        self.shared.add_device(device)
    }

    /// Removes device from the registry. Returns true, and emits `disconnect-device`, only if
    /// the device was connected.
    pub fn remove_device(&self, device: &Arc<Device>) -> bool {
        self.shared.remove_device(device)
    }

    /// Connected gamepads, flight sticks, wheels and dance pads.
    pub fn get_gamepads(&self) -> Vec<Arc<Device>> {
        self.filter(|d| d.class().is_game_controller())
    }

    /// All connected devices.
    pub fn get_devices(&self) -> Vec<Arc<Device>> {
        self.shared.devices().connected.clone()
    }

    pub fn get_devices_of_class(&self, class: DeviceClass) -> Vec<Arc<Device>> {
        self.filter(|d| d.class() == class)
    }

    pub fn find_device(&self, id: DeviceId) -> Option<Arc<Device>> {
        self.shared
            .devices()
            .connected
            .iter()
            .find(|d| d.id() == id)
            .cloned()
    }

    fn filter<F: Fn(&Arc<Device>) -> bool>(&self, f: F) -> Vec<Arc<Device>> {
        self.shared
            .devices()
            .connected
            .iter()
            .filter(|&d| f(d))
            .cloned()
            .collect()
    }

    /// Number of devices that were opened but have not reported any activity yet.
    pub fn num_inactive(&self) -> usize {
        self.shared.devices().inactive.len()
    }

    /// Registers hot-plug listener.
    ///
    /// Listeners are called from whichever thread detected the transition, after the registry
    /// lock was released, so they may call back into the registry.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.shared.listeners().add(listener)
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.listeners().remove(id)
    }

    /// Button names known to this registry.
    pub fn buttons(&self) -> &ButtonRegistry {
        &self.buttons
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let devices = self.shared.devices();
        f.debug_struct("Registry")
            .field("backend", &self.backend_name())
            .field("connected", &devices.connected)
            .field("inactive", &devices.inactive.len())
            .finish()
    }
}

/// Builder for [`Registry`].
///
/// ```
/// use inputhub::RegistryBuilder;
/// use std::time::Duration;
///
/// let builder = RegistryBuilder::new()
///     .enable_mouse_keyboard(true)
///     .add_quirks_from_env(false)
///     .xinput_poll_interval(Duration::from_millis(500));
/// ```
pub struct RegistryBuilder {
    config: BackendConfig,
    env_quirks: bool,
    buttons: Option<ButtonRegistry>,
    backend: Option<Box<dyn InputBackend>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        RegistryBuilder {
            config: BackendConfig::default(),
            env_quirks: true,
            buttons: None,
            backend: None,
        }
    }

    /// Builder configured from `INPUTHUB_ENABLE_MOUSE_KEYBOARD` and `INPUTHUB_DISABLE_UDEV`.
    pub fn from_env() -> Self {
        RegistryBuilder::new()
            .enable_mouse_keyboard(env::var_os(MOUSE_KEYBOARD_ENV).is_some())
            .use_udev(env::var_os(DISABLE_UDEV_ENV).is_none())
    }

    /// Also report mice and keyboards. Default: false.
    pub fn enable_mouse_keyboard(mut self, enable: bool) -> Self {
        self.config.enable_mouse_keyboard = enable;
        self
    }

    /// Replaces the built-in quirk table.
    pub fn quirks(mut self, quirks: QuirkTable) -> Self {
        self.config.quirks = quirks;
        self
    }

    /// Adds quirk entries from `INPUTHUB_QUIRKS`. Default: true.
    pub fn add_quirks_from_env(mut self, add: bool) -> Self {
        self.env_quirks = add;
        self
    }

    /// How often empty XInput slots are probed on Windows. Default: 1 s.
    pub fn xinput_poll_interval(mut self, interval: Duration) -> Self {
        self.config.xinput_poll_interval = interval;
        self
    }

    /// Use udev for device metadata on Linux. Default: true.
    pub fn use_udev(mut self, use_udev: bool) -> Self {
        self.config.use_udev = use_udev;
        self
    }

    /// Run loop receiving IOKit callbacks on macOS. Default: [`RunLoopMode::Main`].
    pub fn run_loop(mut self, mode: RunLoopMode) -> Self {
        self.config.run_loop = mode;
        self
    }

    pub fn button_registry(mut self, buttons: ButtonRegistry) -> Self {
        self.buttons = Some(buttons);
        self
    }

    /// Uses `backend` instead of the one for current platform.
    pub fn backend(mut self, backend: Box<dyn InputBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Creates the registry and starts its backend.
    ///
    /// On Linux and Windows devices that are already present are reported before this function
    /// returns. On macOS they arrive through IOKit callbacks, which with
    /// [`RunLoopMode::Main`] run only once the host turns its main run loop.
    pub fn build(mut self) -> Result<Registry, Error> {
        if self.env_quirks {
            if let Ok(text) = env::var(QUIRKS_ENV) {
                self.config.quirks.extend_from_str(&text)?;
                debug!("Added quirks from {}", QUIRKS_ENV);
            }
        }

        let backend = match self.backend {
            Some(backend) => backend,
            None => inputhub_core::new_backend(&self.config),
        };
        let registry = Registry::with_backend(backend, self.buttons.unwrap_or_default());

        let sink: Arc<dyn HotplugSink> = registry.shared.clone();
        let started = registry
            .backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .start(sink);

        match started {
            Ok(()) => {
                debug!("Started {} backend", registry.backend_name());
                Ok(registry)
            }
            Err(e) => Err(Error::from_platform(e, registry)),
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inputhub_core::{
        ButtonEventKind, ButtonId, PlatformError, VirtualController, VirtualDeviceBuilder,
    };
    use std::sync::Weak;

    enum Hotplug {
        Arrive(Arc<Device>),
        Remove(Arc<Device>),
    }

    #[derive(Clone, Default)]
    struct Script(Arc<Mutex<Vec<Hotplug>>>);

    impl Script {
        fn push(&self, hotplug: Hotplug) {
            self.0.lock().unwrap().push(hotplug);
        }
    }

    struct MockBackend {
        script: Script,
        sink: Option<Arc<dyn HotplugSink>>,
    }

    impl InputBackend for MockBackend {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn start(&mut self, sink: Arc<dyn HotplugSink>) -> Result<(), PlatformError> {
            self.sink = Some(sink);
            self.update();
            Ok(())
        }

        fn update(&mut self) {
            let sink = match self.sink {
                Some(ref sink) => sink,
                None => return,
            };
            let pending: Vec<_> = self.script.0.lock().unwrap().drain(..).collect();
            for hotplug in pending {
                match hotplug {
                    Hotplug::Arrive(dev) => sink.device_arrived(dev),
                    Hotplug::Remove(dev) => {
                        dev.disconnect();
                        sink.device_removed(&dev);
                    }
                }
            }
        }
    }

    struct Unsupported;

    impl InputBackend for Unsupported {
        fn name(&self) -> &'static str {
            "unsupported"
        }

        fn start(&mut self, _: Arc<dyn HotplugSink>) -> Result<(), PlatformError> {
            Err(PlatformError::NotImplemented)
        }

        fn update(&mut self) {}
    }

    fn registry(script: &Script) -> Registry {
        let _ = env_logger::builder().is_test(true).try_init();
        RegistryBuilder::new()
            .add_quirks_from_env(false)
            .backend(Box::new(MockBackend {
                script: script.clone(),
                sink: None,
            }))
            .build()
            .unwrap()
    }

    fn pad(name: &str) -> (Arc<Device>, VirtualController) {
        VirtualDeviceBuilder::new(name)
            .class(DeviceClass::Gamepad)
            .button(ButtonId::FACE_A)
            .build()
    }

    fn record(registry: &Registry) -> Arc<Mutex<Vec<&'static str>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        registry.subscribe(move |n: &Notification| log.lock().unwrap().push(n.name()));
        seen
    }

    #[test]
    fn startup_devices() {
        let script = Script::default();
        let (dev, _) = pad("Pad");
        script.push(Hotplug::Arrive(dev.clone()));

        let registry = registry(&script);
        assert_eq!(registry.backend_name(), "mock");
        assert_eq!(registry.get_devices().len(), 1);
        assert!(registry.find_device(dev.id()).is_some());
    }

    #[test]
    fn connect_then_disconnect() {
        let script = Script::default();
        let registry = registry(&script);
        let seen = record(&registry);
        let (dev, _) = pad("Pad");

        script.push(Hotplug::Arrive(dev.clone()));
        registry.update();
        assert_eq!(registry.get_gamepads().len(), 1);

        script.push(Hotplug::Remove(dev.clone()));
        registry.update();
        assert!(registry.get_gamepads().is_empty());

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["connect-device", "disconnect-device"]
        );
    }

    #[test]
    fn add_twice() {
        let script = Script::default();
        let registry = registry(&script);
        let seen = record(&registry);
        let (dev, _) = pad("Pad");

        assert!(registry.add_device(dev.clone()));
        assert!(!registry.add_device(dev.clone()));
        assert_eq!(registry.get_devices().len(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn remove_absent() {
        let script = Script::default();
        let registry = registry(&script);
        let seen = record(&registry);
        let (dev, _) = pad("Pad");

        assert!(!registry.remove_device(&dev));
        assert!(seen.lock().unwrap().is_empty());
        assert!(dev.is_connected());
    }

    #[test]
    fn inactive_device_connects_on_activity() {
        let script = Script::default();
        let registry = registry(&script);
        let seen = record(&registry);
        let (dev, ctl) = VirtualDeviceBuilder::new("Receiver")
            .class(DeviceClass::Gamepad)
            .button(ButtonId::FACE_A)
            .start_inactive()
            .build();

        script.push(Hotplug::Arrive(dev.clone()));
        registry.update();
        assert!(registry.get_devices().is_empty());
        assert_eq!(registry.num_inactive(), 1);

        registry.update();
        assert!(registry.get_devices().is_empty());

        ctl.set_button(ButtonId::FACE_A, true);
        registry.update();
        assert_eq!(registry.num_inactive(), 0);
        assert_eq!(registry.get_devices().len(), 1);
        assert!(dev.is_pressed(ButtonId::FACE_A));
        assert_eq!(*seen.lock().unwrap(), vec!["connect-device"]);

        let events = dev.drain_button_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].button, ButtonId::FACE_A);
        assert_eq!(events[0].kind, ButtonEventKind::ResumeDown);
    }

    #[test]
    fn add_promotes_inactive() {
        let script = Script::default();
        let registry = registry(&script);
        let (dev, _) = VirtualDeviceBuilder::new("Receiver")
            .start_inactive()
            .build();

        script.push(Hotplug::Arrive(dev.clone()));
        registry.update();
        assert!(registry.add_device(dev.clone()));
        assert_eq!(registry.num_inactive(), 0);
        assert_eq!(dev.status(), DeviceStatus::Connected);
    }

    #[test]
    fn lost_device_is_pruned_once() {
        let script = Script::default();
        let registry = registry(&script);
        let seen = record(&registry);
        let (dev, ctl) = pad("Pad");
        registry.add_device(dev.clone());

        ctl.unplug();
        assert_eq!(dev.poll(), DeviceStatus::Disconnected);
        registry.update();
        registry.update();
        assert!(!registry.remove_device(&dev));
        assert!(!registry.add_device(dev.clone()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["connect-device", "disconnect-device"]
        );
    }

    #[test]
    fn filters() {
        let script = Script::default();
        let registry = registry(&script);
        let (gamepad, _) = pad("Pad");
        let (mouse, _) = VirtualDeviceBuilder::new("Mouse")
            .class(DeviceClass::Mouse)
            .build();
        registry.add_device(gamepad.clone());
        registry.add_device(mouse.clone());

        let pads = registry.get_gamepads();
        assert_eq!(pads.len(), 1);
        assert!(Arc::ptr_eq(&pads[0], &gamepad));
        assert_eq!(registry.get_devices_of_class(DeviceClass::Mouse).len(), 1);
        assert!(registry.get_devices_of_class(DeviceClass::Touch).is_empty());
        assert!(registry.find_device(mouse.id()).is_some());

        registry.remove_device(&mouse);
        assert!(registry.find_device(mouse.id()).is_none());
    }

    #[test]
    fn unsubscribe() {
        let script = Script::default();
        let registry = registry(&script);
        let seen = Arc::new(Mutex::new(0));
        let count = seen.clone();
        let id = registry.subscribe(move |_: &Notification| *count.lock().unwrap() += 1);

        let (a, _) = pad("A");
        registry.add_device(a);
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        let (b, _) = pad("B");
        registry.add_device(b);

        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn listener_calls_back_into_registry() {
        let script = Script::default();
        let registry = Arc::new(registry(&script));
        let weak: Weak<Registry> = Arc::downgrade(&registry);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        registry.subscribe(move |_: &Notification| {
            if let Some(registry) = weak.upgrade() {
                registry.update();
                log.lock().unwrap().push(registry.get_devices().len());
            }
        });

        let (dev, _) = pad("Pad");
        script.push(Hotplug::Arrive(dev.clone()));
        registry.update();
        script.push(Hotplug::Remove(dev));
        registry.update();

        assert_eq!(*seen.lock().unwrap(), vec![1, 0]);
    }

    #[test]
    fn custom_buttons() {
        let buttons = ButtonRegistry::new();
        let id = buttons.register("pedal");
        let registry = RegistryBuilder::new()
            .add_quirks_from_env(false)
            .button_registry(buttons)
            .backend(Box::new(NullBackend))
            .build()
            .unwrap();

        assert_eq!(registry.buttons().find("pedal"), Some(id));
        assert_eq!(registry.buttons().name(id).as_deref(), Some("pedal"));
    }

    #[test]
    fn unsupported_platform() {
        let result = RegistryBuilder::new()
            .add_quirks_from_env(false)
            .backend(Box::new(Unsupported))
            .build();

        match result {
            Err(Error::NotImplemented(registry)) => {
                registry.update();
                assert!(registry.get_devices().is_empty());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
