use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lockstream_client::device::{Connectivity, DeviceClient, DeviceCommand, DeviceConfig};
use lockstream_client::transport::TransportKind;

/// Smart-lock device client
#[derive(Parser, Debug)]
#[command(name = "lockstream", version, long_about = None)]
struct Args {
    /// JSON config file (fields not given use defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend host[:port], overrides the config file
    #[arg(long)]
    host: Option<String>,

    /// Transport: websocket or tcp
    #[arg(long)]
    transport: Option<String>,

    /// Device id
    #[arg(short, long)]
    device_id: String,

    /// Subscription token
    #[arg(short, long)]
    token: String,

    /// Seconds to wait for each command confirmation
    #[arg(long, default_value_t = 30)]
    confirm_timeout: u64,

    #[command(subcommand)]
    command: Option<Action>,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Print device state changes until interrupted (default)
    Watch,
    /// Unlock the door
    Unlock {
        /// User the unlock is recorded for
        #[arg(long, default_value = "lockstream")]
        user_id: String,
    },
    /// Ask the device for its lock status
    Query,
    /// Reprogram a keypad PIN
    Pin {
        /// PIN slot command code
        kind: i64,
        pin: String,
    },
}

fn load_config(args: &Args) -> lockstream_client::Result<DeviceConfig> {
    let mut config = match &args.config {
        Some(path) => DeviceConfig::from_file(path)?,
        None => DeviceConfig::default(),
    };
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(transport) = &args.transport {
        config.transport = match transport.as_str() {
            "websocket" | "ws" => TransportKind::WebSocket,
            "tcp" => TransportKind::Tcp,
            other => {
                return Err(lockstream_client::LockstreamError::Config(format!(
                    "unknown transport {:?}",
                    other
                )))
            }
        };
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    info!("Connecting to {} ({:?})", config.host, config.transport);

    let client = DeviceClient::new(config)?;
    client.on_state_change(|status| info!("Device is {}", status));
    client.on_sensor_data(|sensors| {
        for (name, value) in sensors {
            info!("  {} = {}", name, value);
        }
    });
    client.on_connectivity(|notice| match notice {
        Connectivity::Lost(reason) => warn!("Link lost: {}", reason),
        other => info!("Link: {:?}", other),
    });

    client.set_device_id(args.device_id.clone())?;
    client.set_token(args.token.clone())?;
    client.start()?;

    let command = match args.command.unwrap_or(Action::Watch) {
        Action::Watch => None,
        Action::Unlock { user_id } => Some(DeviceCommand::unlock(user_id)),
        Action::Query => Some(DeviceCommand::query_lock_status()),
        Action::Pin { kind, pin } => Some(DeviceCommand::reprogram_keypad(kind, pin)),
    };

    match command {
        None => {
            tokio::signal::ctrl_c().await?;
        }
        Some(command) => {
            client.wait_ready().await?;
            run_command(&client, &command, Duration::from_secs(args.confirm_timeout)).await;
        }
    }

    client.shutdown();
    Ok(())
}

async fn run_command(client: &DeviceClient, command: &DeviceCommand, timeout: Duration) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sent = tx.clone();
    let issued = client.issue_command(
        command,
        move || {
            let _ = sent.send("accepted by server");
        },
        move || {
            let _ = tx.send("received by device");
        },
    );
    if !issued {
        error!("Command not sent (client {}, device {})", client.state(), client.online_status());
        return;
    }
    info!("Command {} sent", command.cmd);

    for _ in 0..2 {
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(stage)) => info!("Command {}", stage),
            Ok(None) => break,
            Err(_) => {
                warn!("No confirmation within {:?}", timeout);
                break;
            }
        }
    }
}
