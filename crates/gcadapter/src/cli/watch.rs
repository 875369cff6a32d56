//! `watch` subcommand — stream adapter and controller events until Ctrl+C.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use super::{kind_name, open_all_ports, Result, PORT_COUNT, RUNNING};

pub(super) fn cmd_watch() -> Result<()> {
    let adapter = open_all_ports()?;
    println!("Watching for GC adapter events... (Ctrl+C to stop)");

    let mut last_detected = false;
    let mut last_error: Option<String> = None;
    let mut last_connected = [false; PORT_COUNT];

    while RUNNING.load(Ordering::SeqCst) {
        let (detected, error) = adapter.is_detected();
        if detected != last_detected || error != last_error {
            match (detected, &error) {
                (true, _) => println!("[adapter] detected"),
                (false, Some(e)) => println!("[adapter] unavailable: {e}"),
                (false, None) => {
                    if last_detected {
                        println!("[adapter] detached");
                    }
                }
            }
            last_detected = detected;
            last_error = error;
        }

        for port in 0..PORT_COUNT {
            // Drive the decode so type tracking stays live.
            adapter.input(port);
            let connected = adapter.device_connected(port);
            if connected != last_connected[port] {
                if connected {
                    println!(
                        "[port {}] {} connected",
                        port + 1,
                        kind_name(adapter.controller_type(port))
                    );
                } else {
                    println!("[port {}] disconnected", port + 1);
                }
                last_connected[port] = connected;
            }
        }

        thread::sleep(Duration::from_millis(50));
    }

    adapter.shutdown();
    Ok(())
}
