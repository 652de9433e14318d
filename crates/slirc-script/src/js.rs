//! JavaScript evaluation on `boa_engine`.
//!
//! boa offers no cross-thread interrupt, so the execution bound is its
//! native `RuntimeLimits` mechanism: a loop-iteration budget plus a
//! recursion limit, armed once at construction. A runtime-limit error from
//! `eval` is reported as [`ScriptError::Halt`].
//!
//! The `print`/`setExternalProperty`/`getExternalProperty` globals are plain
//! function pointers that read the current output sink and datastore from a
//! thread-local bridge slot, installed for the duration of each `eval` call.
//! The engine only ever runs on one thread, so the slot holds exactly the
//! binding of the evaluation in progress.

use crate::{describe_panic, OutputFn, ScriptError, ScriptStore};
use boa_engine::{js_string, Context, JsArgs, JsResult, JsString, JsValue, NativeFunction, Source};
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Instant;
use tracing::warn;

/// Loop iterations allowed per evaluation.
const LOOP_BUDGET: u64 = 1 << 22;

/// Nesting depth allowed before evaluation is aborted.
const RECURSION_LIMIT: usize = 1 << 10;

thread_local! {
    static BRIDGE: RefCell<Option<Bridge>> = const { RefCell::new(None) };
}

struct Bridge {
    output: OutputFn,
    store: ScriptStore,
}

fn with_bridge<R>(f: impl FnOnce(&Bridge) -> R) -> Option<R> {
    BRIDGE.with(|slot| slot.borrow().as_ref().map(f))
}

/// A long-lived JavaScript interpreter with a budget-bounded `eval`.
#[derive(Clone)]
pub struct JsEngine {
    context: Rc<RefCell<Context>>,
    store: ScriptStore,
}

impl JsEngine {
    /// Create an engine with the default execution budget.
    pub fn new(store: ScriptStore) -> Result<Self, ScriptError> {
        Self::with_budget(store, LOOP_BUDGET)
    }

    /// Create an engine with an explicit loop-iteration budget. Useful for
    /// callers that need a much tighter bound than the default.
    pub fn with_budget(store: ScriptStore, loop_budget: u64) -> Result<Self, ScriptError> {
        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(loop_budget);
        context.runtime_limits_mut().set_recursion_limit(RECURSION_LIMIT);

        context
            .register_global_callable(js_string!("print"), 1, NativeFunction::from_fn_ptr(js_print))
            .map_err(|e| ScriptError::Eval(e.to_string()))?;
        context
            .register_global_callable(
                js_string!("setExternalProperty"),
                2,
                NativeFunction::from_fn_ptr(js_set_external),
            )
            .map_err(|e| ScriptError::Eval(e.to_string()))?;
        context
            .register_global_callable(
                js_string!("getExternalProperty"),
                1,
                NativeFunction::from_fn_ptr(js_get_external),
            )
            .map_err(|e| ScriptError::Eval(e.to_string()))?;

        Ok(Self {
            context: Rc::new(RefCell::new(context)),
            store,
        })
    }

    /// Evaluate one source string with `print` routed to `output`.
    pub fn eval(&self, source: &str, output: OutputFn) -> Result<(), ScriptError> {
        BRIDGE.with(|slot| {
            *slot.borrow_mut() = Some(Bridge {
                output,
                store: self.store.clone(),
            });
        });

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.context.borrow_mut().eval(Source::from_bytes(source))
        }));

        BRIDGE.with(|slot| *slot.borrow_mut() = None);

        match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(err)) => {
                let message = err.to_string();
                if is_runtime_limit(&message) {
                    warn!(elapsed = ?started.elapsed(), "javascript exceeded its execution budget");
                    Err(ScriptError::Halt)
                } else {
                    Err(ScriptError::Eval(message))
                }
            }
            Err(payload) => Err(ScriptError::Panic(describe_panic(payload))),
        }
    }
}

/// boa reports budget exhaustion as a runtime-limit error; match on the
/// message text since the error kind is not otherwise exposed through `eval`.
fn is_runtime_limit(message: &str) -> bool {
    message.contains("iteration limit")
        || message.contains("recursion limit")
        || message.contains("RuntimeLimit")
}

fn js_print(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let text = args
        .get_or_undefined(0)
        .to_string(context)?
        .to_std_string_escaped();
    with_bridge(|bridge| (bridge.output)(&text));
    Ok(JsValue::undefined())
}

fn js_set_external(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let key = args
        .get_or_undefined(0)
        .to_string(context)?
        .to_std_string_escaped();
    let value = args
        .get_or_undefined(1)
        .to_string(context)?
        .to_std_string_escaped();
    with_bridge(|bridge| bridge.store.set(&key, &value));
    Ok(JsValue::undefined())
}

fn js_get_external(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let key = args
        .get_or_undefined(0)
        .to_string(context)?
        .to_std_string_escaped();
    match with_bridge(|bridge| bridge.store.get(&key)).flatten() {
        Some(value) => Ok(JsString::from(value.as_str()).into()),
        None => Ok(JsValue::undefined()),
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
        let engine = JsEngine::new(ScriptStore::new()).unwrap();
        let (output, lines) = capture();
        engine.eval(r#"print("hello " + (1 + 1))"#, output).unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["hello 2".to_string()]);
    }

    #[test]
    fn definitions_persist_across_calls() {
        let engine = JsEngine::new(ScriptStore::new()).unwrap();
        let (output, lines) = capture();
        engine
            .eval("function greet(n) { print(\"hi \" + n); }", output.clone())
            .unwrap();
        engine.eval("greet(\"ada\")", output).unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["hi ada".to_string()]);
    }

    #[test]
    fn runtime_error_is_reported_as_eval() {
        let engine = JsEngine::new(ScriptStore::new()).unwrap();
        let (output, _) = capture();
        let err = engine.eval("noSuchFunction()", output).unwrap_err();
        match err {
            ScriptError::Eval(message) => assert!(message.contains("noSuchFunction")),
            other => panic!("expected Eval, got {other:?}"),
        }
    }

    #[test]
    fn runaway_loop_halts() {
        let engine = JsEngine::with_budget(ScriptStore::new(), 64).unwrap();
        let (output, _) = capture();
        let err = engine.eval("while (true) {}", output).unwrap_err();
        assert!(matches!(err, ScriptError::Halt));
    }

    #[test]
    fn engine_survives_a_halt() {
        let engine = JsEngine::with_budget(ScriptStore::new(), 64).unwrap();
        let (output, lines) = capture();
        let _ = engine.eval("while (true) {}", output.clone());
        engine.eval(r#"print("still here")"#, output).unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["still here".to_string()]);
    }

    #[test]
    fn external_properties_round_trip() {
        let store = ScriptStore::new();
        let engine = JsEngine::new(store.clone()).unwrap();
        let (output, lines) = capture();
        engine
            .eval(r#"setExternalProperty("greeting", "salve")"#, output.clone())
            .unwrap();
        assert_eq!(store.get("greeting"), Some("salve".to_string()));
        engine
            .eval(r#"print(getExternalProperty("greeting"))"#, output.clone())
            .unwrap();
        engine
            .eval(r#"print(getExternalProperty("missing"))"#, output)
            .unwrap();
        assert_eq!(
            *lines.lock().unwrap(),
            vec!["salve".to_string(), "undefined".to_string()]
        );
    }
}
