//! Chat aliases: `!alias add/remove` plus expansion of `!<name>`.

use super::{parse_command, Context, Effect, Handler};
use crate::event::Event;
use std::collections::HashMap;

const USAGE: &str = "Usage: !alias <add/remove> name [message]";

/// Keeps a table of alias name to expansion text. The table lives and dies
/// with the handler; nothing is persisted.
pub struct AliasHandler {
    aliases: HashMap<String, String>,
}

impl AliasHandler {
    pub fn new() -> AliasHandler {
        AliasHandler {
            aliases: HashMap::new(),
        }
    }
}

impl Default for AliasHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for AliasHandler {
    fn id(&self) -> String {
        "alias".to_string()
    }

    fn matches(&self, event: &Event) -> bool {
        event.message.starts_with('!')
    }

    fn handle(&mut self, ctx: &Context, event: &Event) -> Vec<Effect> {
        let Some((command, args)) = parse_command(&event.message) else {
            return Vec::new();
        };
        let reply = event.reply_target();

        if command == "alias" {
            if args.len() < 2 {
                ctx.privmsg(reply, USAGE);
            } else if args[0] == "add" {
                self.aliases.insert(args[1].clone(), args[2..].join(" "));
                ctx.privmsg(reply, &format!("Added '{}'", args[1]));
            } else if args[0] == "remove" {
                if self.aliases.remove(&args[1]).is_some() {
                    ctx.privmsg(reply, &format!("Removed '{}'", args[1]));
                }
            }
        } else if let Some(text) = self.aliases.get(&command) {
            ctx.privmsg(reply, text);
        }

        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{event, test_context};
    use super::*;
    use crate::network::Outbound;

    fn privmsg(target: &str, text: &str) -> Outbound {
        Outbound::Privmsg {
            target: target.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn add_then_expand_then_remove() {
        let (ctx, mut rx) = test_context();
        let mut handler = AliasHandler::new();

        handler.handle(&ctx, &event("#room", "case", "!alias add hi hello world"));
        assert_eq!(rx.try_recv().unwrap(), privmsg("#room", "Added 'hi'"));

        handler.handle(&ctx, &event("#room", "alice", "!hi"));
        assert_eq!(rx.try_recv().unwrap(), privmsg("#room", "hello world"));

        handler.handle(&ctx, &event("#room", "case", "!alias remove hi"));
        assert_eq!(rx.try_recv().unwrap(), privmsg("#room", "Removed 'hi'"));

        handler.handle(&ctx, &event("#room", "alice", "!hi"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn usage_reply_on_short_commands() {
        let (ctx, mut rx) = test_context();
        let mut handler = AliasHandler::new();
        handler.handle(&ctx, &event("#room", "case", "!alias"));
        assert_eq!(rx.try_recv().unwrap(), privmsg("#room", USAGE));
        handler.handle(&ctx, &event("#room", "case", "!alias add"));
        assert_eq!(rx.try_recv().unwrap(), privmsg("#room", USAGE));
    }

    #[test]
    fn removing_an_unknown_alias_is_silent() {
        let (ctx, mut rx) = test_context();
        let mut handler = AliasHandler::new();
        handler.handle(&ctx, &event("#room", "case", "!alias remove nope"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unknown_bang_commands_are_ignored() {
        let (ctx, mut rx) = test_context();
        let mut handler = AliasHandler::new();
        handler.handle(&ctx, &event("#room", "alice", "!nope"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn replies_go_to_the_sender_outside_channels() {
        let (ctx, mut rx) = test_context();
        let mut handler = AliasHandler::new();
        handler.handle(&ctx, &event("slircb", "case", "!alias add hi hey"));
        assert_eq!(rx.try_recv().unwrap(), privmsg("case", "Added 'hi'"));
    }

    #[test]
    fn overwriting_an_alias_keeps_the_latest_text() {
        let (ctx, mut rx) = test_context();
        let mut handler = AliasHandler::new();
        handler.handle(&ctx, &event("#room", "case", "!alias add hi one"));
        handler.handle(&ctx, &event("#room", "case", "!alias add hi two"));
        let _ = rx.try_recv();
        let _ = rx.try_recv();
        handler.handle(&ctx, &event("#room", "alice", "!hi"));
        assert_eq!(rx.try_recv().unwrap(), privmsg("#room", "two"));
    }
}
