//! Lua evaluation on `mlua`.
//!
//! The execution bound is an instruction-count hook armed before each
//! evaluation and removed afterwards. When the hook fires past the budget it
//! raises a runtime error with a fixed quantum message, which the wrapper
//! translates into [`ScriptError::Halt`].

use crate::{describe_panic, OutputFn, ScriptError, ScriptStore};
use mlua::{HookTriggers, Lua, Value};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::warn;

/// VM instructions allowed per evaluation.
const INSTRUCTION_BUDGET: u32 = 2 * (1 << 26);

const QUANTUM_MSG: &str = "Lua execution quantum exceeded";

/// A long-lived Lua interpreter with a budget-bounded `eval`.
#[derive(Clone)]
pub struct LuaEngine {
    lua: Lua,
    store: ScriptStore,
    budget: u32,
}

impl LuaEngine {
    /// Create an engine with the default execution budget.
    pub fn new(store: ScriptStore) -> Self {
        Self::with_budget(store, INSTRUCTION_BUDGET)
    }

    /// Create an engine with an explicit instruction budget.
    pub fn with_budget(store: ScriptStore, budget: u32) -> Self {
        Self {
            lua: Lua::new(),
            store,
            budget,
        }
    }

    /// Evaluate one source string with `print` routed to `output`.
    pub fn eval(&self, source: &str, output: OutputFn) -> Result<(), ScriptError> {
        self.bind(output)?;

        self.lua.set_hook(
            HookTriggers::new().every_nth_instruction(self.budget),
            |_lua, _debug| Err(mlua::Error::RuntimeError(QUANTUM_MSG.to_string())),
        );

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.lua.load(source).set_name("=script").exec()
        }));

        self.lua.remove_hook();

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                let message = flatten_error(&err);
                if message.contains(QUANTUM_MSG) {
                    warn!(elapsed = ?started.elapsed(), "lua exceeded its execution budget");
                    Err(ScriptError::Halt)
                } else {
                    Err(ScriptError::Eval(message))
                }
            }
            Err(payload) => Err(ScriptError::Panic(describe_panic(payload))),
        }
    }

    /// Rebind the output and datastore globals. Called before every
    /// evaluation so `print` always closes over the current reply sink.
    fn bind(&self, output: OutputFn) -> Result<(), ScriptError> {
        let globals = self.lua.globals();

        let print = self
            .lua
            .create_function(move |_, value: Value| {
                output(&display(&value));
                Ok(())
            })
            .map_err(bind_error)?;
        globals.set("print", print).map_err(bind_error)?;

        let store = self.store.clone();
        let set_external = self
            .lua
            .create_function(move |_, (key, value): (String, String)| {
                store.set(&key, &value);
                Ok(())
            })
            .map_err(bind_error)?;
        globals
            .set("setExternalProperty", set_external)
            .map_err(bind_error)?;

        let store = self.store.clone();
        let get_external = self
            .lua
            .create_function(move |_, key: String| Ok(store.get(&key)))
            .map_err(bind_error)?;
        globals
            .set("getExternalProperty", get_external)
            .map_err(bind_error)?;

        Ok(())
    }
}

fn bind_error(err: mlua::Error) -> ScriptError {
    ScriptError::Eval(err.to_string())
}

/// Unwrap callback nesting so the user sees the underlying message.
fn flatten_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(message) => message.clone(),
        mlua::Error::CallbackError { cause, .. } => flatten_error(cause),
        mlua::Error::SyntaxError { message, .. } => format!("compile error: {message}"),
        other => other.to_string(),
    }
}

/// Render a Lua value the way the default `print` would.
fn display(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => format!("{n}"),
        Value::String(s) => s
            .to_str()
            .map_or_else(|_| "<invalid utf8>".into(), |s| s.to_string()),
        Value::Table(_) => format!("table: {value:p}"),
        Value::Function(_) => format!("function: {value:p}"),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn capture() -> (OutputFn, Arc<Mutex<Vec<String>>>) {
        let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let output: OutputFn = Arc::new(move |text: &str| {
            sink.lock().unwrap().push(text.to_string());
        });
        (output, lines)
    }

    #[test]
    fn print_reaches_the_sink() {
        let engine = LuaEngine::new(ScriptStore::new());
        let (output, lines) = capture();
        engine.eval(r#"print("hello " .. 1 + 1)"#, output).unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["hello 2".to_string()]);
    }

    #[test]
    fn definitions_persist_across_calls() {
        let engine = LuaEngine::new(ScriptStore::new());
        let (output, lines) = capture();
        engine
            .eval("function greet(n) print(\"hi \" .. n) end", output.clone())
            .unwrap();
        engine.eval("greet(\"ada\")", output).unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["hi ada".to_string()]);
    }

    #[test]
    fn syntax_error_is_reported_as_eval() {
        let engine = LuaEngine::new(ScriptStore::new());
        let (output, _) = capture();
        let err = engine.eval("if then end", output).unwrap_err();
        match err {
            ScriptError::Eval(message) => assert!(message.contains("compile error")),
            other => panic!("expected Eval, got {other:?}"),
        }
    }

    #[test]
    fn runaway_loop_halts() {
        let engine = LuaEngine::with_budget(ScriptStore::new(), 1_000);
        let (output, _) = capture();
        let err = engine.eval("while true do end", output).unwrap_err();
        assert!(matches!(err, ScriptError::Halt));
    }

    #[test]
    fn engine_survives_a_halt() {
        let engine = LuaEngine::with_budget(ScriptStore::new(), 1_000);
        let (output, lines) = capture();
        let _ = engine.eval("while true do end", output.clone());
        engine.eval(r#"print("still here")"#, output).unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["still here".to_string()]);
    }

    #[test]
    fn external_properties_round_trip() {
        let store = ScriptStore::new();
        let engine = LuaEngine::new(store.clone());
        let (output, lines) = capture();
        engine
            .eval(r#"setExternalProperty("greeting", "salve")"#, output.clone())
            .unwrap();
        assert_eq!(store.get("greeting"), Some("salve".to_string()));
        engine
            .eval(r#"print(getExternalProperty("greeting"))"#, output)
            .unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["salve".to_string()]);
    }
}
