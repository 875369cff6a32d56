//! `probe` subcommand — check whether a GC adapter is present and claimable.

use gcadapter_lib::error::ClaimError;

use super::{ProbeOutput, Result, UsbTransport};
use gcadapter_lib::transport::Transport;

pub(super) fn cmd_probe(json: bool) -> Result<()> {
    let transport = UsbTransport::new()?;
    let result = transport.open_adapter();

    if json {
        let output = match &result {
            Ok(io) => {
                let id = io.id();
                ProbeOutput {
                    found: true,
                    bus: Some(id.bus),
                    address: Some(id.address),
                    error: None,
                }
            }
            Err(ClaimError::NotFound) => ProbeOutput {
                found: false,
                bus: None,
                address: None,
                error: None,
            },
            Err(e) => ProbeOutput {
                found: false,
                bus: None,
                address: None,
                error: Some(e.to_string()),
            },
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap());
        return Ok(());
    }

    match result {
        Ok(io) => {
            let id = io.id();
            println!(
                "GC adapter found (bus {:03} device {:03})",
                id.bus, id.address
            );
            Ok(())
        }
        Err(ClaimError::NotFound) => {
            println!("No GC adapter found.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
