//! A small Lisp interpreter with a fuel-bounded evaluator.
//!
//! The dialect covers what chat scripts need: `define`/`defun`/`lambda`,
//! `if`, `quote`, `begin`, numbers, strings, lists, and the rebindable
//! `print`/`setex`/`getex` natives. Fuel exhaustion surfaces as
//! [`ScriptError::Halt`], matching the other engines' budget discipline.

mod eval;
mod reader;

use crate::{describe_panic, OutputFn, ScriptError, ScriptStore};
use eval::{default_env, EnvRef, Fuel, LispError, Value};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Instant;
use tracing::warn;

/// Evaluation steps allowed per run.
const STEP_BUDGET: u64 = 2 * (1 << 15);

/// A long-lived Lisp interpreter with a budget-bounded `eval`.
#[derive(Clone)]
pub struct LispEngine {
    globals: EnvRef,
    store: ScriptStore,
    budget: u64,
}

impl LispEngine {
    /// Create an engine with the default execution budget.
    pub fn new(store: ScriptStore) -> Self {
        Self::with_budget(store, STEP_BUDGET)
    }

    /// Create an engine with an explicit step budget.
    pub fn with_budget(store: ScriptStore, budget: u64) -> Self {
        Self {
            globals: default_env(),
            store,
            budget,
        }
    }

    /// Evaluate one source string with `print` routed to `output`.
    pub fn eval(&self, source: &str, output: OutputFn) -> Result<(), ScriptError> {
        self.bind(output);

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run(source)));

        match result {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(LispError::ExecutionLimit)) => {
                warn!(elapsed = ?started.elapsed(), "lisp exceeded its execution budget");
                Err(ScriptError::Halt)
            }
            Ok(Err(err)) => Err(ScriptError::Eval(err.to_string())),
            Err(payload) => Err(ScriptError::Panic(describe_panic(payload))),
        }
    }

    fn run(&self, source: &str) -> Result<Value, LispError> {
        let forms = reader::read(source)?;
        let mut fuel = Fuel::new(self.budget);
        let mut last = Value::Nil;
        for form in &forms {
            last = eval::eval(form, &self.globals, &mut fuel)?;
        }
        Ok(last)
    }

    /// Rebind the output and datastore natives. Called before every
    /// evaluation so `print` always closes over the current reply sink.
    fn bind(&self, output: OutputFn) {
        let mut globals = self.globals.borrow_mut();

        globals.define(
            "print",
            Value::Native(
                "print",
                Rc::new(move |args: &[Value]| {
                    if let [value] = args {
                        output(&value.display());
                    }
                    Ok(Value::Nil)
                }),
            ),
        );

        let store = self.store.clone();
        globals.define(
            "setex",
            Value::Native(
                "setex",
                Rc::new(move |args: &[Value]| {
                    if let [key, value] = args {
                        store.set(&key.display(), &value.display());
                    }
                    Ok(Value::Nil)
                }),
            ),
        );

        let store = self.store.clone();
        globals.define(
            "getex",
            Value::Native(
                "getex",
                Rc::new(move |args: &[Value]| {
                    if let [key] = args {
                        if let Some(value) = store.get(&key.display()) {
                            return Ok(Value::Str(value));
                        }
                    }
                    Ok(Value::Nil)
                }),
            ),
        );
    }
}
