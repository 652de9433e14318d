//! Owner-gated scripting controller and script-defined handlers.
//!
//! The controller matches every message from the configured operator. In
//! REPL mode the whole message body is evaluated in the active interpreter;
//! otherwise it understands three bang commands:
//!
//! - `!register <js|lua|lisp> <fn>` installs a [`ScriptedHandler`] that
//!   forwards every subsequent event to the named script function,
//! - `!unregister <js|lua|lisp> <fn>` removes it again,
//! - `!repl <js|lua|lisp>` / `!repl end` toggles REPL mode.
//!
//! All evaluation goes through the budget-bounded engine wrappers; their
//! outcomes funnel into one recovery point so a runaway script produces a
//! single `Script halted` reply and any other interpreter fault becomes a
//! one-line error reply or a log entry, never a crash.

use super::{parse_command, Context, Effect, Handler};
use crate::event::Event;
use slirc_script::{JsEngine, Lang, LispEngine, LuaEngine, ScriptError, ScriptStore};
use tracing::{error, info};

/// The three long-lived interpreter instances and their shared datastore.
///
/// One instance of each engine exists for the bot's lifetime, so
/// definitions made through the REPL stay callable from registered
/// handlers.
#[derive(Clone)]
pub struct Engines {
    js: JsEngine,
    lua: LuaEngine,
    lisp: LispEngine,
}

impl Engines {
    pub fn new() -> Result<Engines, ScriptError> {
        let store = ScriptStore::new();
        Ok(Engines {
            js: JsEngine::new(store.clone())?,
            lua: LuaEngine::new(store.clone()),
            lisp: LispEngine::new(store),
        })
    }

    /// Build engines with explicit budgets, for callers that need tight
    /// bounds.
    pub fn with_budgets(js: u64, lua: u32, lisp: u64) -> Result<Engines, ScriptError> {
        let store = ScriptStore::new();
        Ok(Engines {
            js: JsEngine::with_budget(store.clone(), js)?,
            lua: LuaEngine::with_budget(store.clone(), lua),
            lisp: LispEngine::with_budget(store, lisp),
        })
    }

    fn eval(&self, lang: Lang, source: &str, ctx: &Context, reply: &str) -> Result<(), ScriptError> {
        let output = ctx.output_fn(reply);
        match lang {
            Lang::Js => self.js.eval(source, output),
            Lang::Lua => self.lua.eval(source, output),
            Lang::Lisp => self.lisp.eval(source, output),
        }
    }
}

/// Deliver a script outcome to the reply target.
///
/// Halt gets the fixed `Script halted` notice, evaluation errors are echoed
/// verbatim, and interpreter panics are logged without a chat reply.
fn report_script_result(ctx: &Context, reply: &str, result: Result<(), ScriptError>) {
    match result {
        Ok(()) => {}
        Err(ScriptError::Halt) => ctx.privmsg(reply, "Script halted"),
        Err(ScriptError::Eval(message)) => ctx.privmsg(reply, &message),
        Err(err @ ScriptError::Panic(_)) => {
            error!(error = %err, "script evaluation panicked");
        }
    }
}

/// The `"scripting"` handler: REPL mode plus register/unregister.
pub struct ScriptController {
    owner_nick: String,
    owner_host: String,
    engines: Engines,
    repl: Option<Lang>,
}

impl ScriptController {
    pub fn new(owner_nick: &str, owner_host: &str) -> Result<ScriptController, ScriptError> {
        Ok(Self::with_engines(Engines::new()?, owner_nick, owner_host))
    }

    pub fn with_engines(engines: Engines, owner_nick: &str, owner_host: &str) -> ScriptController {
        ScriptController {
            owner_nick: owner_nick.to_string(),
            owner_host: owner_host.to_string(),
            engines,
            repl: None,
        }
    }

    fn register(&self, ctx: &Context, reply: &str, args: &[String]) -> Vec<Effect> {
        let Some((lang, name)) = lang_and_name(args) else {
            ctx.privmsg(reply, "Invalid syntax. Usage: !register <js|lua|lisp> <fn name>");
            return Vec::new();
        };
        let handler = ScriptedHandler::new(lang, name, self.engines.clone());
        let id = handler.id();
        info!(id = %id, "registering script handler");
        vec![Effect::Remove(id), Effect::Add(Box::new(handler))]
    }

    fn unregister(&self, ctx: &Context, reply: &str, args: &[String]) -> Vec<Effect> {
        let Some((lang, name)) = lang_and_name(args) else {
            ctx.privmsg(reply, "Invalid syntax. Usage: !unregister <js|lua|lisp> <fn name>");
            return Vec::new();
        };
        let label = match lang {
            Lang::Js => "Javsacript",
            Lang::Lua => "Lua",
            Lang::Lisp => "Lisp",
        };
        ctx.privmsg(reply, &format!("Unregistered {label} handler {name}"));
        vec![Effect::Remove(format!("{}-{}", lang.prefix(), name))]
    }

    fn start_repl(&mut self, ctx: &Context, reply: &str, args: &[String]) {
        let lang = match args {
            [tag] => Lang::parse(tag),
            _ => None,
        };
        let Some(lang) = lang else {
            ctx.privmsg(reply, "Invalid syntax. Usage: !repl <js|lua|lisp>");
            return;
        };
        self.repl = Some(lang);
        ctx.privmsg(reply, &format!("{} REPL session started.", lang.pretty()));
    }
}

impl Handler for ScriptController {
    fn id(&self) -> String {
        "scripting".to_string()
    }

    fn matches(&self, event: &Event) -> bool {
        event.nick == self.owner_nick && event.host == self.owner_host
    }

    fn handle(&mut self, ctx: &Context, event: &Event) -> Vec<Effect> {
        let reply = event.reply_target().to_string();

        if let Some(lang) = self.repl {
            if event.message.starts_with("!repl end") {
                ctx.privmsg(&reply, &format!("{} REPL session ended.", lang.pretty()));
                self.repl = None;
                return Vec::new();
            }
            let result = self.engines.eval(lang, &event.message, ctx, &reply);
            report_script_result(ctx, &reply, result);
            return Vec::new();
        }

        let Some((command, args)) = parse_command(&event.message) else {
            return Vec::new();
        };
        match command.as_str() {
            "register" => self.register(ctx, &reply, &args),
            "unregister" => self.unregister(ctx, &reply, &args),
            "repl" => {
                self.start_repl(ctx, &reply, &args);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

fn lang_and_name(args: &[String]) -> Option<(Lang, String)> {
    match args {
        [tag, name] => Lang::parse(tag).map(|lang| (lang, name.clone())),
        _ => None,
    }
}

/// Handler installed by `!register`: forwards every inbound event to a
/// script-defined function.
pub struct ScriptedHandler {
    lang: Lang,
    fn_name: String,
    engines: Engines,
}

impl ScriptedHandler {
    pub fn new(lang: Lang, fn_name: String, engines: Engines) -> ScriptedHandler {
        ScriptedHandler {
            lang,
            fn_name,
            engines,
        }
    }

    /// Call expression invoking the bound function with the event's target,
    /// sender nick, and message text. Interior quotes and backslashes are
    /// escaped so message text cannot terminate the string literals.
    fn call_expression(&self, event: &Event) -> String {
        let target = quote(&event.target);
        let nick = quote(&event.nick);
        let message = quote(&event.message);
        match self.lang {
            Lang::Js | Lang::Lua => {
                format!("{}({target}, {nick}, {message})", self.fn_name)
            }
            Lang::Lisp => format!("({} {target} {nick} {message})", self.fn_name),
        }
    }
}

fn quote(text: &str) -> String {
    format!(
        "\"{}\"",
        text.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

impl Handler for ScriptedHandler {
    fn id(&self) -> String {
        format!("{}-{}", self.lang.prefix(), self.fn_name)
    }

    fn matches(&self, _event: &Event) -> bool {
        true
    }

    fn handle(&mut self, ctx: &Context, event: &Event) -> Vec<Effect> {
        let reply = event.reply_target();
        let result = self
            .engines
            .eval(self.lang, &self.call_expression(event), ctx, reply);
        report_script_result(ctx, reply, result);
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{event, test_context};
    use super::*;
    use crate::network::Outbound;

    fn owner(message: &str) -> Event {
        let mut event = event("#room", "case", message);
        event.host = "sprawl.example.net".to_string();
        event
    }

    fn controller() -> ScriptController {
        ScriptController::with_engines(
            Engines::with_budgets(256, 2_000, 200).unwrap(),
            "case",
            "sprawl.example.net",
        )
    }

    fn text_of(out: Outbound) -> String {
        match out {
            Outbound::Privmsg { text, .. } => text,
            other => panic!("expected a privmsg, got {other:?}"),
        }
    }

    #[test]
    fn only_the_owner_matches() {
        let controller = controller();
        assert!(controller.matches(&owner("!repl js")));

        let mut wrong_host = owner("!repl js");
        wrong_host.host = "elsewhere.example.net".to_string();
        assert!(!controller.matches(&wrong_host));

        let mut wrong_nick = owner("!repl js");
        wrong_nick.nick = "molly".to_string();
        assert!(!controller.matches(&wrong_nick));
    }

    #[test]
    fn repl_session_starts_evaluates_and_ends() {
        let (ctx, mut rx) = test_context();
        let mut controller = controller();

        controller.handle(&ctx, &owner("!repl js"));
        assert_eq!(text_of(rx.try_recv().unwrap()), "Javascript REPL session started.");

        controller.handle(&ctx, &owner("print(\"from repl\")"));
        assert_eq!(text_of(rx.try_recv().unwrap()), "from repl");

        controller.handle(&ctx, &owner("!repl end"));
        assert_eq!(text_of(rx.try_recv().unwrap()), "Javascript REPL session ended.");

        // out of REPL mode, plain text is ignored again
        controller.handle(&ctx, &owner("print(\"ignored\")"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn repl_reports_evaluation_errors_inline() {
        let (ctx, mut rx) = test_context();
        let mut controller = controller();
        controller.handle(&ctx, &owner("!repl lua"));
        let _ = rx.try_recv();
        controller.handle(&ctx, &owner("if then end"));
        assert!(text_of(rx.try_recv().unwrap()).contains("compile error"));
    }

    #[test]
    fn runaway_repl_script_is_halted() {
        let (ctx, mut rx) = test_context();
        let mut controller = controller();
        controller.handle(&ctx, &owner("!repl lua"));
        let _ = rx.try_recv();
        controller.handle(&ctx, &owner("while true do end"));
        assert_eq!(text_of(rx.try_recv().unwrap()), "Script halted");
    }

    #[test]
    fn bad_register_syntax_gets_usage() {
        let (ctx, mut rx) = test_context();
        let mut controller = controller();

        let effects = controller.handle(&ctx, &owner("!register js"));
        assert!(effects.is_empty());
        assert!(text_of(rx.try_recv().unwrap()).contains("Usage: !register"));

        let effects = controller.handle(&ctx, &owner("!register perl greet"));
        assert!(effects.is_empty());
        assert!(text_of(rx.try_recv().unwrap()).contains("Usage: !register"));
    }

    #[test]
    fn bad_repl_syntax_gets_usage() {
        let (ctx, mut rx) = test_context();
        let mut controller = controller();
        controller.handle(&ctx, &owner("!repl perl"));
        assert!(text_of(rx.try_recv().unwrap()).contains("Usage: !repl"));
        controller.handle(&ctx, &owner("!repl"));
        assert!(text_of(rx.try_recv().unwrap()).contains("Usage: !repl"));
    }

    #[test]
    fn register_produces_remove_then_add_effects() {
        let (ctx, _rx) = test_context();
        let mut controller = controller();
        let effects = controller.handle(&ctx, &owner("!register lua greet"));
        assert_eq!(effects.len(), 2);
        assert!(matches!(&effects[0], Effect::Remove(id) if id == "lua-greet"));
        assert!(matches!(&effects[1], Effect::Add(h) if h.id() == "lua-greet"));
    }

    #[test]
    fn unregister_acknowledges_with_the_historical_spelling() {
        let (ctx, mut rx) = test_context();
        let mut controller = controller();
        let effects = controller.handle(&ctx, &owner("!unregister js greet"));
        assert!(matches!(&effects[0], Effect::Remove(id) if id == "js-greet"));
        assert_eq!(
            text_of(rx.try_recv().unwrap()),
            "Unregistered Javsacript handler greet"
        );
    }

    #[test]
    fn call_expression_escapes_interior_quotes() {
        let engines = Engines::with_budgets(256, 2_000, 200).unwrap();
        let handler = ScriptedHandler::new(Lang::Js, "f".to_string(), engines.clone());
        let event = event("#room", "alice", r#"say "hi" \now"#);
        assert_eq!(
            handler.call_expression(&event),
            r##"f("#room", "alice", "say \"hi\" \\now")"##
        );

        let lisp = ScriptedHandler::new(Lang::Lisp, "f".to_string(), engines);
        assert!(lisp.call_expression(&event).starts_with("(f \"#room\""));
    }
}
