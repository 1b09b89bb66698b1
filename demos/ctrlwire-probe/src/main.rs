//! Connects to a device and prints what it reports.
//!
//! ```text
//! ctrlwire-probe <ws-url> <directory.json> [layout.json] [config.json]
//! ```
//!
//! Without a layout file the config blob is parsed with one field per
//! value property, in directory order. Logging follows `RUST_LOG`.

use ctrlwire::logging::init_tracing;
use ctrlwire::prelude::*;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

const USAGE: &str = "usage: ctrlwire-probe <ws-url> <directory.json> [layout.json] [config.json]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("ctrlwire=info,ctrlwire_probe=info");

    let mut args = std::env::args().skip(1);
    let (Some(url), Some(directory_path)) = (args.next(), args.next()) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    let layout_path = args.next();
    let config_path = args.next();

    let directory = PropertyDirectory::from_json_str(&std::fs::read_to_string(&directory_path)?)?;
    let config = match config_path {
        Some(path) => ClientConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => ClientConfig::default(),
    };

    let mut builder = ControlClient::builder().config(config).directory(directory);
    if let Some(path) = layout_path {
        builder = builder.schema(FieldLayout::from_json_str(&std::fs::read_to_string(path)?)?);
    }
    let client = builder.connect_websocket(&url)?;
    let mut events = client.subscribe();

    info!(%url, properties = client.directory().len(), "probing device");
    client.begin().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => report(&client, event)?,
                Err(RecvError::Lagged(missed)) => warn!(missed, "events dropped"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing");
                client.close().await?;
                break;
            }
        }
    }
    Ok(())
}

fn report(client: &ControlClient, event: ClientEvent) -> Result<(), serde_json::Error> {
    match event {
        ClientEvent::ConfigLoaded => {
            println!("{}", serde_json::to_string_pretty(&client.snapshot())?);
        }
        ClientEvent::PropertyChanged { key, value, origin } => {
            println!("{key} = {value} ({origin:?})");
        }
        ClientEvent::Connected => info!("connected"),
        ClientEvent::Disconnected => info!("disconnected"),
        ClientEvent::CommitStarted { .. } | ClientEvent::CommitFinished { .. } => {}
    }
    Ok(())
}
