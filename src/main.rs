//! slircb - Straylight IRC Bot
//!
//! Connects, joins the configured channel, and hands every inbound message
//! to the dispatch loop. The terminal stays interactive: `exit`/`quit`
//! shuts the bot down, `debug` toggles raw protocol logging.

use slircb::config::Config;
use slircb::dispatch;
use slircb::network::{Connection, Outbound, OutboundSender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "failed to load config");
        e
    })?;

    info!(
        network = %config.network,
        nick = %config.nick,
        channel = %config.channel,
        "starting slircb"
    );

    let config = Arc::new(config);
    let (outbound_tx, outbound_rx) = tokio::sync::mpsc::unbounded_channel();
    let (event_tx, event_rx) = std::sync::mpsc::channel();

    let _dispatch = dispatch::spawn(Arc::clone(&config), event_rx, outbound_tx.clone())?;
    let connection = Connection::connect(&config, event_tx, outbound_tx.clone(), outbound_rx).await?;

    control_loop(connection, outbound_tx).await
}

/// Interactive stdin control surface.
async fn control_loop(connection: Connection, outbound: OutboundSender) -> anyhow::Result<()> {
    let (line_tx, mut line_rx) = tokio::sync::mpsc::channel::<String>(4);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        loop {
            let mut line = String::new();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if line_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(line) = line_rx.recv().await {
        match line.trim() {
            "exit" | "quit" => {
                let _ = outbound.send(Outbound::Quit);
                // give the writer a moment to flush the QUIT
                tokio::time::sleep(Duration::from_secs(2)).await;
                println!("Exiting");
                return Ok(());
            }
            "debug" => {
                let was = connection.debug_enabled();
                connection.set_debug(!was);
                println!("Debug {}", if was { "DISABLED" } else { "ENABLED" });
            }
            "" => {}
            _ => {
                println!(
                    "Unknown input. Commands:\n\n\
                     exit\tQuits IRC and exits the program\n\
                     debug\tToggles raw protocol logging\n"
                );
            }
        }
    }

    // stdin closed (e.g. running detached): keep serving the connection
    std::future::pending::<()>().await;
    Ok(())
}
