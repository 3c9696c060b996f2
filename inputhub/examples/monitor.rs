use inputhub::{Notification, Registry, RegistryBuilder};

use std::thread;
use std::time::Duration;

fn main() {
    env_logger::init();

    let registry = match RegistryBuilder::from_env().build() {
        Ok(registry) => registry,
        Err(inputhub::Error::NotImplemented(registry)) => {
            eprintln!("Current platform is not supported");
            registry
        }
        Err(e) => panic!("Failed to create registry: {}", e),
    };
    registry.subscribe(|n: &Notification| println!("{}", n));

    for dev in registry.get_devices() {
        println!("{} ({}) is already connected", dev.name(), dev.class());
    }

    loop {
        registry.update();
        print_state(&registry);
        thread::sleep(Duration::from_millis(16));
    }
}

fn print_state(registry: &Registry) {
    for dev in registry.get_devices() {
        dev.poll();

        let events = dev.drain_button_events();
        for event in &events {
            let name = registry
                .buttons()
                .name(event.button)
                .unwrap_or_else(|| event.button.to_string());
            println!("{}: {} {:?}", dev.name(), name, event.kind);
        }

        let guard = dev.lock();
        let axes: Vec<String> = guard
            .axes()
            .iter()
            .filter(|a| a.known)
            .filter_map(|a| a.id.map(|id| format!("{}={:.2}", id, a.value)))
            .collect();
        if !axes.is_empty() && !events.is_empty() {
            println!("{}: {}", dev.name(), axes.join(" "));
        }
    }
}
