//! Serialized handler dispatch.
//!
//! All inbound events funnel through one dedicated OS thread that owns the
//! registry and the interpreter instances. That thread is the bot's
//! serialization point: handler bodies never overlap, registry mutations
//! made while handling one event are visible to the next, and the
//! non-thread-safe script engines are only ever touched from here.
//!
//! A handler may keep the thread busy for as long as a script budget allows
//! (a couple of seconds at most); during that window further events simply
//! queue up in arrival order.

use crate::config::Config;
use crate::event::Event;
use crate::handlers::{AliasHandler, Context, NickservHandler, Registry, ScriptController};
use crate::network::OutboundSender;
use anyhow::Context as _;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info};

/// Spawn the dispatch thread with the built-in handlers installed.
///
/// Returns once the thread has finished constructing its registry, so
/// engine construction failures surface here rather than as a dead thread.
pub fn spawn(
    config: Arc<Config>,
    events: Receiver<Event>,
    outbound: OutboundSender,
) -> anyhow::Result<JoinHandle<()>> {
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();

    let handle = std::thread::Builder::new()
        .name("dispatch".to_string())
        .spawn(move || {
            let ctx = Context::new(Arc::clone(&config), outbound);
            let mut registry = Registry::new();
            registry.add(Box::new(NickservHandler::new()));
            registry.add(Box::new(AliasHandler::new()));
            match ScriptController::new(&config.owner_nick, &config.owner_host) {
                Ok(controller) => registry.add(Box::new(controller)),
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            }
            let _ = ready_tx.send(Ok(()));
            info!(handlers = registry.len(), "dispatch loop running");

            while let Ok(event) = events.recv() {
                registry.dispatch(&ctx, &event);
            }
            debug!("event channel closed; dispatch thread exiting");
        })
        .context("failed to spawn dispatch thread")?;

    ready_rx
        .recv()
        .context("dispatch thread died during startup")?
        .context("failed to construct script engines")?;

    Ok(handle)
}
