//! # slirc-script
//!
//! Time-bounded embedded scripting for slircb.
//!
//! Three interpreters (JavaScript via `boa_engine`, Lua via `mlua`, and a
//! small in-crate Lisp) share one contract: [`JsEngine::eval`],
//! [`LuaEngine::eval`] and [`LispEngine::eval`] each run a single source
//! string with `print` and the external-property accessors bound to the
//! caller's output sink and datastore, under an execution budget. Budget
//! exhaustion is normalized into [`ScriptError::Halt`] regardless of the
//! engine's native cancellation mechanism, so one recovery path upstream can
//! turn every runaway script into the same user-visible outcome.
//!
//! Engine instances are long-lived: definitions made in one `eval` call are
//! visible to later calls on the same instance. None of the engines are
//! thread-safe; callers are expected to evaluate from a single thread.

mod js;
mod lisp;
mod lua;

pub use js::JsEngine;
pub use lisp::LispEngine;
pub use lua::LuaEngine;

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Callback invoked with each line of script output (the `print` binding).
pub type OutputFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Outcome classes of a script evaluation, beyond plain success.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script exceeded its execution budget and was stopped.
    #[error("script halted")]
    Halt,
    /// The engine reported a syntax or runtime error.
    #[error("{0}")]
    Eval(String),
    /// The engine itself panicked while evaluating.
    #[error("interpreter panic: {0}")]
    Panic(String),
}

/// Shared string-to-string datastore exposed to all interpreters through the
/// `setExternalProperty`/`getExternalProperty` (JS, Lua) and `setex`/`getex`
/// (Lisp) bindings.
#[derive(Clone, Default)]
pub struct ScriptStore {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl ScriptStore {
    /// Create an empty datastore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    /// Fetch the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Language tag identifying one of the embedded interpreters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Js,
    Lua,
    Lisp,
}

impl Lang {
    /// Parse an operator-supplied tag (`js`, `lua` or `lisp`).
    pub fn parse(tag: &str) -> Option<Lang> {
        match tag {
            "js" => Some(Lang::Js),
            "lua" => Some(Lang::Lua),
            "lisp" => Some(Lang::Lisp),
            _ => None,
        }
    }

    /// Short tag used in handler ids (`js-<fn>`, `lua-<fn>`, `lisp-<fn>`).
    pub fn prefix(self) -> &'static str {
        match self {
            Lang::Js => "js",
            Lang::Lua => "lua",
            Lang::Lisp => "lisp",
        }
    }

    /// Human-readable language name for chat replies.
    pub fn pretty(self) -> &'static str {
        match self {
            Lang::Js => "Javascript",
            Lang::Lua => "Lua",
            Lang::Lisp => "Lisp",
        }
    }
}

/// Render a caught panic payload for logging.
pub(crate) fn describe_panic(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
