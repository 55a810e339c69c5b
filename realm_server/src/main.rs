//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p realm_server -- [--root .] [--port 19132]
//!
//! Reads `properties.json` from the root directory (creating it on first
//! run), loads the default world and ticks at 20 TPS until `stop` is typed
//! or Ctrl-C is pressed.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use realm_server::{console::ConsoleInput, install_signal_handler, Launcher};
use realm_shared::config::{ServerConfig, CONFIG_FILE};
use tracing::info;

struct Args {
    root: PathBuf,
    port: Option<u16>,
}

fn parse_args() -> Args {
    let mut parsed = Args {
        root: PathBuf::from("."),
        port: None,
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--root" if i + 1 < args.len() => {
                parsed.root = PathBuf::from(&args[i + 1]);
                i += 2;
            }
            "--port" if i + 1 < args.len() => {
                parsed.port = args[i + 1].parse().ok();
                i += 2;
            }
            _ => i += 1,
        }
    }
    parsed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    info!(root = %args.root.display(), "Starting server");

    let mut launcher = Launcher::new(&args.root);
    if let Some(port) = args.port {
        let mut config = ServerConfig::load_or_create(&args.root.join(CONFIG_FILE))
            .context("load server configuration")?;
        config.port = port;
        launcher = launcher.config(config);
    }

    let mut scheduler = launcher.start().await.context("start server")?;
    if let Some(local) = scheduler.server().local_addr() {
        info!(%local, "Server listening");
    }

    let tasks = scheduler.sender();
    install_signal_handler(tasks.clone(), scheduler.server().running_flag());
    let console = ConsoleInput::spawn(tasks);
    scheduler.server_mut().attach_console(console);

    println!("Server ready. Type 'help' for commands, 'stop' to exit.");
    scheduler.run().await;
    Ok(())
}
