//! slircb - Straylight IRC Bot
//!
//! A scriptable IRC bot. Inbound messages flow from the transport into a
//! serialized dispatch loop that visits a registry of handlers; the built-in
//! handlers cover NickServ identification, chat aliases, and an owner-gated
//! scripting controller that can install script-defined handlers backed by
//! the embedded interpreters in `slirc-script`.

pub mod config;
pub mod dispatch;
pub mod event;
pub mod handlers;
pub mod network;
pub mod proto;
