//! Chat event handlers.
//!
//! A [`Handler`] is a matcher+action pair keyed by a stable id. The
//! [`Registry`] holds every live handler and dispatches each inbound event
//! to all of them in turn; adding a handler under an existing id replaces
//! it, and removal is idempotent.
//!
//! Handlers express registry mutations as returned [`Effect`]s, which the
//! dispatch loop applies after the handler returns. Since dispatch is
//! serialized, every mutation is visible by the time the next event is
//! processed. Outbound sends go through [`Context`] and are a non-blocking
//! enqueue, so a handler may send while dispatch is in progress.

mod alias;
mod nickserv;
mod scripting;

pub use alias::AliasHandler;
pub use nickserv::NickservHandler;
pub use scripting::{Engines, ScriptController, ScriptedHandler};

use crate::config::Config;
use crate::event::Event;
use crate::network::{Outbound, OutboundSender};
use slirc_script::OutputFn;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Shared state passed to each handler invocation.
pub struct Context {
    pub config: Arc<Config>,
    outbound: OutboundSender,
}

impl Context {
    pub fn new(config: Arc<Config>, outbound: OutboundSender) -> Context {
        Context { config, outbound }
    }

    /// Send a chat message. Never blocks; the transport's writer task
    /// drains the queue.
    pub fn privmsg(&self, target: &str, text: &str) {
        let _ = self.outbound.send(Outbound::Privmsg {
            target: target.to_string(),
            text: text.to_string(),
        });
    }

    /// Output sink for script `print` bindings, fixed to `target`.
    pub fn output_fn(&self, target: &str) -> OutputFn {
        let outbound = self.outbound.clone();
        let target = target.to_string();
        Arc::new(move |text: &str| {
            let _ = outbound.send(Outbound::Privmsg {
                target: target.clone(),
                text: text.to_string(),
            });
        })
    }
}

/// Registry mutation produced by a handler.
pub enum Effect {
    Add(Box<dyn Handler>),
    Remove(String),
}

/// A named matcher+action pair.
pub trait Handler {
    /// Stable key, unique within the registry.
    fn id(&self) -> String;

    /// Pure predicate deciding whether `handle` runs for this event.
    fn matches(&self, event: &Event) -> bool;

    /// Act on the event. May send outbound messages and request registry
    /// mutations through the returned effects.
    fn handle(&mut self, ctx: &Context, event: &Event) -> Vec<Effect>;
}

/// Id-keyed collection of live handlers.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Insert a handler, replacing any existing handler with the same id.
    pub fn add(&mut self, handler: Box<dyn Handler>) {
        info!(id = %handler.id(), "adding handler");
        self.handlers.insert(handler.id(), handler);
    }

    /// Remove the handler with this id, if present.
    pub fn remove_id(&mut self, id: &str) {
        if self.handlers.remove(id).is_some() {
            info!(id = %id, "removing handler");
        }
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run one inbound event through every matching handler.
    ///
    /// Iterates a snapshot of the current ids: handlers added while the
    /// event is being dispatched are first visited on the next event, and
    /// handlers removed mid-dispatch are skipped. Each handler's effects are
    /// applied before the next handler runs.
    pub fn dispatch(&mut self, ctx: &Context, event: &Event) {
        debug!(kind = ?event.kind, nick = %event.nick, target = %event.target, "dispatching event");
        let ids: Vec<String> = self.handlers.keys().cloned().collect();
        for id in ids {
            let Some(handler) = self.handlers.get_mut(&id) else {
                continue;
            };
            if !handler.matches(event) {
                continue;
            }
            let effects = handler.handle(ctx, event);
            for effect in effects {
                match effect {
                    Effect::Add(handler) => self.add(handler),
                    Effect::Remove(id) => self.remove_id(&id),
                }
            }
        }
    }
}

/// Split a leading-bang command into its name and arguments.
///
/// Returns `None` when the message is not a bang command.
pub fn parse_command(message: &str) -> Option<(String, Vec<String>)> {
    let mut fields = message.split_whitespace();
    let command = fields.next()?.strip_prefix('!')?;
    if command.is_empty() {
        return None;
    }
    Some((
        command.to_string(),
        fields.map(str::to_string).collect(),
    ))
}
