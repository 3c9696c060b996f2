use inputhub_core::{BackendConfig, Device, HotplugSink};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Print;

impl HotplugSink for Print {
    fn device_arrived(&self, device: Arc<Device>) {
        println!("arrived: {:?}", device);
    }

    fn device_removed(&self, device: &Arc<Device>) {
        println!("removed: {} ({})", device.id(), device.name());
    }
}

fn main() {
    env_logger::init();

    let mut backend = inputhub_core::new_backend(&BackendConfig::default());
    backend.start(Arc::new(Print)).unwrap();
    println!("Listening with {} backend", backend.name());

    loop {
        backend.update();
        thread::sleep(Duration::from_millis(100));
    }
}
