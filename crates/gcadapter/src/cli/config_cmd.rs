//! `config` subcommand — show the saved per-port configuration.

use gcadapter_lib::config;

use super::{kv, kv_indent, kv_width, ConfigOutput, Result, SiDeviceKind, PORT_COUNT};

fn si_name(kind: SiDeviceKind) -> &'static str {
    match kind {
        SiDeviceKind::None => "none",
        SiDeviceKind::GcController => "emulated controller",
        SiDeviceKind::WiiUAdapter => "adapter",
    }
}

pub(super) fn cmd_config(json: bool) -> Result<()> {
    let path = config::config_path();
    let exists = path.exists();
    let settings = config::load_or_default(&path)?;

    if json {
        let output = ConfigOutput {
            config_file: path.display().to_string(),
            config_file_exists: exists,
            settings,
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap());
        return Ok(());
    }

    let w = kv_width(
        &["Config file:", "Exists:"],
        &["Port 1:", "Port 2:", "Port 3:", "Port 4:"],
    );
    kv("Config file:", path.display(), w);
    kv("Exists:", exists, w);
    println!();
    println!("Ports:");
    for port in 0..PORT_COUNT {
        let rumble = if settings.rumble_enabled[port] {
            "rumble on"
        } else {
            "rumble off"
        };
        kv_indent(
            &format!("Port {}:", port + 1),
            format!("{}, {}", si_name(settings.si_devices[port]), rumble),
            w,
        );
    }

    Ok(())
}
