//! `rumble` subcommand — pulse the rumble motor on one port.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use gcadapter_lib::protocol::ControllerType;

use super::{
    open_all_ports, settle_ports, wait_for_detection, AdapterStatus, Result, RUNNING,
};

pub(super) fn cmd_rumble(port: usize, duration: Duration) -> Result<()> {
    let adapter = open_all_ports()?;
    wait_for_detection(&adapter, Duration::from_secs(2));

    match adapter.status() {
        AdapterStatus::Detected => {}
        AdapterStatus::NotDetected => {
            println!("No GC adapter found.");
            return Ok(());
        }
        AdapterStatus::Error(e) => return Err(e.into()),
    }

    settle_ports(&adapter, Duration::from_millis(200));
    match adapter.controller_type(port) {
        ControllerType::None => {
            println!("No controller on port {}.", port + 1);
            return Ok(());
        }
        ControllerType::Wireless => {
            println!(
                "Port {} has a wireless controller — no rumble support.",
                port + 1
            );
            return Ok(());
        }
        ControllerType::Wired => {}
    }

    println!("Rumbling port {} for {}ms...", port + 1, duration.as_millis());
    adapter.output(port, 1);

    let deadline = Instant::now() + duration;
    while Instant::now() < deadline && RUNNING.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(10));
    }

    adapter.output(port, 0);
    // Stop payload even if the write thread coalesced the commands.
    adapter.reset_rumble();
    adapter.shutdown();
    println!("Done.");
    Ok(())
}
