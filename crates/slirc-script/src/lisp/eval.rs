//! Evaluator with a fuel-bounded step budget.
//!
//! Every recursive `eval` entry consumes one unit of fuel; running dry raises
//! [`LispError::ExecutionLimit`], which the engine wrapper reports as a halt.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Nesting depth allowed while evaluating.
const MAX_EVAL_DEPTH: u32 = 200;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LispError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("{0}")]
    Runtime(String),
    #[error("Execution limit exceeded")]
    ExecutionLimit,
}

fn runtime(message: impl Into<String>) -> LispError {
    LispError::Runtime(message.into())
}

pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value, LispError>>;
pub type EnvRef = Rc<RefCell<Env>>;

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Num(f64),
    Str(String),
    Sym(String),
    List(Vec<Value>),
    Lambda(Rc<Lambda>),
    Native(&'static str, NativeFn),
}

pub struct Lambda {
    pub params: Vec<String>,
    pub body: Vec<Value>,
    pub env: EnvRef,
}

impl Value {
    /// Everything except `nil` and `false` is truthy.
    fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Render for `print` and string concatenation: strings appear without
    /// their quotes.
    pub fn display(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn as_num(&self) -> Result<f64, LispError> {
        match self {
            Value::Num(n) => Ok(*n),
            other => Err(runtime(format!("expected a number, got {other}"))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Num(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => write!(f, "\"{s}\""),
            Value::Sym(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Lambda(_) => write!(f, "#<lambda>"),
            Value::Native(name, _) => write!(f, "#<native {name}>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

pub struct Env {
    vars: HashMap<String, Value>,
    parent: Option<EnvRef>,
}

impl Env {
    fn root() -> Env {
        Env {
            vars: HashMap::new(),
            parent: None,
        }
    }

    fn child(parent: EnvRef) -> Env {
        Env {
            vars: HashMap::new(),
            parent: Some(parent),
        }
    }

    fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.vars.get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|p| p.borrow().get(name))
    }

    pub fn define(&mut self, name: &str, value: Value) {
        self.vars.insert(name.to_string(), value);
    }
}

/// Per-run execution budget.
pub struct Fuel {
    remaining: u64,
    depth: u32,
}

impl Fuel {
    pub fn new(budget: u64) -> Fuel {
        Fuel {
            remaining: budget,
            depth: 0,
        }
    }

    fn tick(&mut self) -> Result<(), LispError> {
        if self.remaining == 0 {
            return Err(LispError::ExecutionLimit);
        }
        self.remaining -= 1;
        Ok(())
    }
}

/// Global environment preloaded with the builtins.
pub fn default_env() -> EnvRef {
    let env = Rc::new(RefCell::new(Env::root()));
    {
        let mut e = env.borrow_mut();
        define_native(&mut e, "+", |args| fold_nums(args, 0.0, |a, b| a + b));
        define_native(&mut e, "*", |args| fold_nums(args, 1.0, |a, b| a * b));
        define_native(&mut e, "-", |args| match args {
            [] => Err(runtime("'-' needs at least one argument")),
            [only] => Ok(Value::Num(-only.as_num()?)),
            [first, rest @ ..] => {
                let mut acc = first.as_num()?;
                for v in rest {
                    acc -= v.as_num()?;
                }
                Ok(Value::Num(acc))
            }
        });
        define_native(&mut e, "/", |args| match args {
            [a, b] => {
                let d = b.as_num()?;
                if d == 0.0 {
                    return Err(runtime("division by zero"));
                }
                Ok(Value::Num(a.as_num()? / d))
            }
            _ => Err(runtime("'/' takes exactly two arguments")),
        });
        define_native(&mut e, "=", |args| compare(args, |a, b| a == b));
        define_native(&mut e, "<", |args| compare(args, |a, b| a < b));
        define_native(&mut e, ">", |args| compare(args, |a, b| a > b));
        define_native(&mut e, "<=", |args| compare(args, |a, b| a <= b));
        define_native(&mut e, ">=", |args| compare(args, |a, b| a >= b));
        define_native(&mut e, "not", |args| match args {
            [v] => Ok(Value::Bool(!v.truthy())),
            _ => Err(runtime("'not' takes exactly one argument")),
        });
        define_native(&mut e, "concat", |args| {
            Ok(Value::Str(args.iter().map(Value::display).collect()))
        });
        define_native(&mut e, "list", |args| Ok(Value::List(args.to_vec())));
        define_native(&mut e, "car", |args| match args {
            [Value::List(items)] => Ok(items.first().cloned().unwrap_or(Value::Nil)),
            _ => Err(runtime("'car' takes a single list")),
        });
        define_native(&mut e, "cdr", |args| match args {
            [Value::List(items)] if items.is_empty() => Ok(Value::List(Vec::new())),
            [Value::List(items)] => Ok(Value::List(items[1..].to_vec())),
            _ => Err(runtime("'cdr' takes a single list")),
        });
        define_native(&mut e, "cons", |args| match args {
            [head, Value::List(items)] => {
                let mut out = Vec::with_capacity(items.len() + 1);
                out.push(head.clone());
                out.extend(items.iter().cloned());
                Ok(Value::List(out))
            }
            _ => Err(runtime("'cons' takes a value and a list")),
        });
        define_native(&mut e, "length", |args| match args {
            [Value::List(items)] => Ok(Value::Num(items.len() as f64)),
            [Value::Str(s)] => Ok(Value::Num(s.chars().count() as f64)),
            _ => Err(runtime("'length' takes a list or a string")),
        });
    }
    env
}

fn define_native(
    env: &mut Env,
    name: &'static str,
    f: impl Fn(&[Value]) -> Result<Value, LispError> + 'static,
) {
    env.define(name, Value::Native(name, Rc::new(f)));
}

fn fold_nums(args: &[Value], init: f64, op: impl Fn(f64, f64) -> f64) -> Result<Value, LispError> {
    let mut acc = init;
    for v in args {
        acc = op(acc, v.as_num()?);
    }
    Ok(Value::Num(acc))
}

fn compare(args: &[Value], op: impl Fn(f64, f64) -> bool) -> Result<Value, LispError> {
    match args {
        // strings compare lexicographically, mapped onto the numeric operator
        [Value::Str(x), Value::Str(y)] => {
            let ordering = match x.cmp(y) {
                std::cmp::Ordering::Less => -1.0,
                std::cmp::Ordering::Equal => 0.0,
                std::cmp::Ordering::Greater => 1.0,
            };
            Ok(Value::Bool(op(ordering, 0.0)))
        }
        [a, b] => Ok(Value::Bool(op(a.as_num()?, b.as_num()?))),
        _ => Err(runtime("comparison takes exactly two arguments")),
    }
}

pub fn eval(expr: &Value, env: &EnvRef, fuel: &mut Fuel) -> Result<Value, LispError> {
    fuel.tick()?;
    if fuel.depth >= MAX_EVAL_DEPTH {
        return Err(runtime("recursion too deep"));
    }
    fuel.depth += 1;
    let result = eval_inner(expr, env, fuel);
    fuel.depth -= 1;
    result
}

fn eval_inner(expr: &Value, env: &EnvRef, fuel: &mut Fuel) -> Result<Value, LispError> {
    match expr {
        Value::Sym(name) => env
            .borrow()
            .get(name)
            .ok_or_else(|| runtime(format!("unbound symbol '{name}'"))),
        Value::List(items) => {
            let Some(head) = items.first() else {
                return Ok(Value::Nil);
            };
            if let Value::Sym(name) = head {
                match name.as_str() {
                    "quote" => return special_quote(&items[1..]),
                    "if" => return special_if(&items[1..], env, fuel),
                    "define" => return special_define(&items[1..], env, fuel),
                    "defun" => return special_defun(&items[1..], env),
                    "lambda" => return special_lambda(&items[1..], env),
                    "begin" => return eval_sequence(&items[1..], env, fuel),
                    _ => {}
                }
            }
            let callee = eval(head, env, fuel)?;
            let mut args = Vec::with_capacity(items.len() - 1);
            for item in &items[1..] {
                args.push(eval(item, env, fuel)?);
            }
            apply(&callee, &args, fuel)
        }
        atom => Ok(atom.clone()),
    }
}

pub fn apply(callee: &Value, args: &[Value], fuel: &mut Fuel) -> Result<Value, LispError> {
    match callee {
        Value::Native(_, f) => f(args),
        Value::Lambda(lambda) => {
            if args.len() != lambda.params.len() {
                return Err(runtime(format!(
                    "expected {} arguments, got {}",
                    lambda.params.len(),
                    args.len()
                )));
            }
            let frame = Rc::new(RefCell::new(Env::child(Rc::clone(&lambda.env))));
            for (param, arg) in lambda.params.iter().zip(args) {
                frame.borrow_mut().define(param, arg.clone());
            }
            eval_sequence(&lambda.body, &frame, fuel)
        }
        other => Err(runtime(format!("'{other}' is not callable"))),
    }
}

fn eval_sequence(forms: &[Value], env: &EnvRef, fuel: &mut Fuel) -> Result<Value, LispError> {
    let mut last = Value::Nil;
    for form in forms {
        last = eval(form, env, fuel)?;
    }
    Ok(last)
}

fn special_quote(rest: &[Value]) -> Result<Value, LispError> {
    match rest {
        [form] => Ok(form.clone()),
        _ => Err(runtime("'quote' takes exactly one form")),
    }
}

fn special_if(rest: &[Value], env: &EnvRef, fuel: &mut Fuel) -> Result<Value, LispError> {
    match rest {
        [cond, then_form] => {
            if eval(cond, env, fuel)?.truthy() {
                eval(then_form, env, fuel)
            } else {
                Ok(Value::Nil)
            }
        }
        [cond, then_form, else_form] => {
            if eval(cond, env, fuel)?.truthy() {
                eval(then_form, env, fuel)
            } else {
                eval(else_form, env, fuel)
            }
        }
        _ => Err(runtime("'if' takes two or three forms")),
    }
}

fn special_define(rest: &[Value], env: &EnvRef, fuel: &mut Fuel) -> Result<Value, LispError> {
    match rest {
        [Value::Sym(name), form] => {
            let value = eval(form, env, fuel)?;
            env.borrow_mut().define(name, value);
            Ok(Value::Sym(name.clone()))
        }
        _ => Err(runtime("'define' takes a symbol and a form")),
    }
}

/// `(defun name (params...) body...)`, sugar for define + lambda.
fn special_defun(rest: &[Value], env: &EnvRef) -> Result<Value, LispError> {
    match rest {
        [Value::Sym(name), Value::List(params), body @ ..] if !body.is_empty() => {
            let lambda = make_lambda(params, body, env)?;
            env.borrow_mut().define(name, lambda);
            Ok(Value::Sym(name.clone()))
        }
        _ => Err(runtime("'defun' takes a name, a parameter list and a body")),
    }
}

fn special_lambda(rest: &[Value], env: &EnvRef) -> Result<Value, LispError> {
    match rest {
        [Value::List(params), body @ ..] if !body.is_empty() => make_lambda(params, body, env),
        _ => Err(runtime("'lambda' takes a parameter list and a body")),
    }
}

fn make_lambda(params: &[Value], body: &[Value], env: &EnvRef) -> Result<Value, LispError> {
    let mut names = Vec::with_capacity(params.len());
    for param in params {
        match param {
            Value::Sym(name) => names.push(name.clone()),
            other => return Err(runtime(format!("parameter '{other}' is not a symbol"))),
        }
    }
    Ok(Value::Lambda(Rc::new(Lambda {
        params: names,
        body: body.to_vec(),
        env: Rc::clone(env),
    })))
}
