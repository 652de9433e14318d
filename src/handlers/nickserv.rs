//! Exact-once NickServ identification.

use super::{Context, Effect, Handler};
use crate::event::Event;
use tracing::info;

/// Waits for NickServ to ask for identification, answers once with the
/// configured password, and retires itself from the registry.
pub struct NickservHandler;

impl NickservHandler {
    pub fn new() -> NickservHandler {
        NickservHandler
    }
}

impl Default for NickservHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for NickservHandler {
    fn id(&self) -> String {
        "nickserv".to_string()
    }

    fn matches(&self, event: &Event) -> bool {
        event.message.to_lowercase().contains("identify") && event.user == "NickServ"
    }

    fn handle(&mut self, ctx: &Context, _event: &Event) -> Vec<Effect> {
        info!("identifying with NickServ");
        ctx.privmsg("NickServ", &format!("IDENTIFY {}", ctx.config.password));
        vec![Effect::Remove(self.id())]
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{event, test_context};
    use super::super::Registry;
    use super::*;
    use crate::event::EventKind;
    use crate::network::Outbound;

    fn identify_request() -> Event {
        let mut event = event("slircb", "NickServ", "This nickname is registered, please identify");
        event.user = "NickServ".to_string();
        event.kind = EventKind::Notice;
        event
    }

    #[test]
    fn identifies_once_and_retires() {
        let (ctx, mut rx) = test_context();
        let mut registry = Registry::new();
        registry.add(Box::new(NickservHandler::new()));

        registry.dispatch(&ctx, &identify_request());
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Privmsg {
                target: "NickServ".to_string(),
                text: "IDENTIFY hunter2".to_string(),
            }
        );
        assert!(!registry.contains_id("nickserv"));

        // a second request goes unanswered
        registry.dispatch(&ctx, &identify_request());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn ignores_identify_from_impostors() {
        let mut event = identify_request();
        event.user = "NickSerf".to_string();
        assert!(!NickservHandler::new().matches(&event));
    }

    #[test]
    fn ignores_unrelated_notices() {
        let mut event = identify_request();
        event.message = "welcome back".to_string();
        assert!(!NickservHandler::new().matches(&event));
    }
}
