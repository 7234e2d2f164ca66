//! Calc executor
//!
//! A small line-oriented expression language whose whole execution context is
//! an explicit map of bindings. Snapshots are the JSON encoding of that map,
//! so a context can be captured exactly unless it holds a `handle`.

pub mod parser;

use std::collections::BTreeMap;
use std::time::Duration;

use self::parser::{parse_statement, tokenize, BinOp, Expr, Statement, UnaryOp};
use super::{Executor, ExecutorError, Value};
use crate::step::{Step, StepValue};

/// Upper bound for `range(n)` so a typo cannot exhaust memory
const MAX_RANGE: i64 = 1_000_000;

type EvalResult = std::result::Result<Value, String>;

#[derive(Debug, Default)]
pub struct CalcExecutor {
    bindings: BTreeMap<String, Value>,
    output: Vec<String>,
}

impl CalcExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a binding in the live context
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn bindings(&self) -> &BTreeMap<String, Value> {
        &self.bindings
    }

    fn exec(&mut self, statement: &Statement) -> EvalResult {
        match statement {
            Statement::Expr(expr) => self.eval(expr),
            Statement::Assign { targets, value } => {
                let value = self.eval(value)?;
                if let [name] = targets.as_slice() {
                    self.bindings.insert(name.clone(), value.clone());
                    return Ok(value);
                }
                let Value::List(items) = &value else {
                    return Err(format!(
                        "cannot unpack {} into {} names",
                        value.type_name(),
                        targets.len()
                    ));
                };
                if items.len() != targets.len() {
                    return Err(format!(
                        "cannot unpack {} values into {} names",
                        items.len(),
                        targets.len()
                    ));
                }
                for (name, item) in targets.iter().zip(items) {
                    self.bindings.insert(name.clone(), item.clone());
                }
                Ok(value)
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> EvalResult {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self
                .bindings
                .get(name)
                .cloned()
                .ok_or_else(|| format!("name '{}' is not defined", name)),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Neg, Value::Int(i)) => i
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| "integer overflow".to_string()),
                    (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Neg, other) => {
                        Err(format!("bad operand type for unary -: {}", other.type_name()))
                    }
                }
            }
            Expr::Binary(BinOp::And, left, right) => {
                let left = self.eval(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Binary(BinOp::Or, left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, left, right)
            }
            Expr::Index(target, index) => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                subscript(target, index)
            }
            Expr::Call(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(name, args)
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>) -> EvalResult {
        match (name, args.as_slice()) {
            ("print", args) => {
                let line = args
                    .iter()
                    .map(Value::to_plain_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                self.output.push(line);
                Ok(Value::None)
            }
            ("len", [Value::Str(s)]) => Ok(Value::Int(s.chars().count() as i64)),
            ("len", [Value::List(items)]) => Ok(Value::Int(items.len() as i64)),
            ("int", [Value::Int(i)]) => Ok(Value::Int(*i)),
            ("int", [Value::Float(f)]) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
            ("int", [Value::Bool(b)]) => Ok(Value::Int(*b as i64)),
            ("int", [Value::Str(s)]) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("invalid literal for int(): {:?}", s)),
            ("float", [Value::Int(i)]) => Ok(Value::Float(*i as f64)),
            ("float", [Value::Float(f)]) => Ok(Value::Float(*f)),
            ("float", [Value::Str(s)]) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float)
                .ok_or_else(|| format!("invalid literal for float(): {:?}", s)),
            ("str", [value]) => Ok(Value::Str(value.to_plain_string())),
            ("abs", [Value::Int(i)]) => i
                .checked_abs()
                .map(Value::Int)
                .ok_or_else(|| "integer overflow".to_string()),
            ("abs", [Value::Float(f)]) => Ok(Value::Float(f.abs())),
            ("sum", [Value::List(items)]) => items
                .iter()
                .cloned()
                .try_fold(Value::Int(0), |acc, item| binary(BinOp::Add, acc, item)),
            ("min" | "max", [Value::List(items)]) => {
                let mut iter = items.iter().cloned();
                let first = iter
                    .next()
                    .ok_or_else(|| format!("{}() arg is an empty list", name))?;
                let wanted = if name == "min" { BinOp::Lt } else { BinOp::Gt };
                iter.try_fold(first, |best, item| {
                    let better = binary(wanted, item.clone(), best.clone())?;
                    Ok(if better.is_truthy() { item } else { best })
                })
            }
            ("range", [Value::Int(n)]) => {
                if *n > MAX_RANGE {
                    return Err(format!("range({}) exceeds limit of {}", n, MAX_RANGE));
                }
                Ok(Value::List((0..(*n).max(0)).map(Value::Int).collect()))
            }
            ("sleep", [Value::Int(ms)]) if *ms >= 0 => {
                std::thread::sleep(Duration::from_millis(*ms as u64));
                Ok(Value::None)
            }
            ("handle", [Value::Str(resource)]) => Ok(Value::Handle(resource.clone())),
            (
                "len" | "int" | "float" | "str" | "abs" | "sum" | "min" | "max" | "range"
                | "sleep" | "handle",
                args,
            ) => Err(format!(
                "invalid arguments to {}(): {}",
                name,
                args.iter()
                    .map(Value::type_name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            _ => Err(format!("unknown function '{}'", name)),
        }
    }
}

/// Evaluate a constant expression, such as a parameter default, in an empty context
pub fn eval_literal(text: &str) -> EvalResult {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err("expected a value".to_string());
    }
    match parse_statement(&tokens)? {
        Statement::Expr(expr) => CalcExecutor::new().eval(&expr),
        Statement::Assign { .. } => Err("expected a value, found an assignment".to_string()),
    }
}

fn numeric_pair(left: &Value, right: &Value) -> Option<(f64, f64)> {
    let as_f64 = |v: &Value| match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    };
    Some((as_f64(left)?, as_f64(right)?))
}

/// Float results must stay finite so every context remains serializable
fn finite(x: f64) -> EvalResult {
    if x.is_finite() {
        Ok(Value::Float(x))
    } else {
        Err("float overflow".to_string())
    }
}

/// Integer division rounding toward negative infinity, like the float path
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && (a < 0) != (b < 0) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

/// Remainder taking the sign of the divisor, consistent with `floor_div`
fn floor_mod(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    if r != 0 && (r < 0) != (b < 0) {
        Some(r + b)
    } else {
        Some(r)
    }
}

fn binary(op: BinOp, left: Value, right: Value) -> EvalResult {
    use std::cmp::Ordering;

    let type_error = |left: &Value, right: &Value| {
        format!(
            "unsupported operand types for {:?}: {} and {}",
            op,
            left.type_name(),
            right.type_name()
        )
    };
    let overflow = || "integer overflow".to_string();

    match op {
        BinOp::Eq | BinOp::Ne => {
            let equal = match numeric_pair(&left, &right) {
                Some((a, b)) => a == b,
                None => left == right,
            };
            Ok(Value::Bool(equal == (op == BinOp::Eq)))
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (&left, &right) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => numeric_pair(&left, &right).and_then(|(a, b)| a.partial_cmp(&b)),
            };
            let ordering = ordering.ok_or_else(|| type_error(&left, &right))?;
            Ok(Value::Bool(match op {
                BinOp::Lt => ordering == Ordering::Less,
                BinOp::Le => ordering != Ordering::Greater,
                BinOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        BinOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (left, right) => numeric_pair(&left, &right)
                .ok_or_else(|| type_error(&left, &right))
                .and_then(|(a, b)| finite(a + b)),
        },
        BinOp::Sub => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
            (left, right) => numeric_pair(&left, &right)
                .ok_or_else(|| type_error(&left, &right))
                .and_then(|(a, b)| finite(a - b)),
        },
        BinOp::Mul => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
            (left, right) => numeric_pair(&left, &right)
                .ok_or_else(|| type_error(&left, &right))
                .and_then(|(a, b)| finite(a * b)),
        },
        BinOp::Div => {
            let (a, b) = numeric_pair(&left, &right).ok_or_else(|| type_error(&left, &right))?;
            if b == 0.0 {
                return Err("division by zero".to_string());
            }
            finite(a / b)
        }
        BinOp::FloorDiv | BinOp::Mod => match (left, right) {
            (Value::Int(_), Value::Int(0)) => Err("division by zero".to_string()),
            (Value::Int(a), Value::Int(b)) => {
                let result = if op == BinOp::FloorDiv {
                    floor_div(a, b)
                } else {
                    floor_mod(a, b)
                };
                result.map(Value::Int).ok_or_else(overflow)
            }
            (left, right) => {
                let (a, b) =
                    numeric_pair(&left, &right).ok_or_else(|| type_error(&left, &right))?;
                if b == 0.0 {
                    return Err("division by zero".to_string());
                }
                finite(if op == BinOp::FloorDiv {
                    (a / b).floor()
                } else {
                    a - b * (a / b).floor()
                })
            }
        },
        // Short-circuit operators never reach here
        BinOp::And | BinOp::Or => Err(type_error(&left, &right)),
    }
}

fn subscript(target: Value, index: Value) -> EvalResult {
    let Value::Int(i) = index else {
        return Err(format!("indices must be integers, not {}", index.type_name()));
    };
    let resolve = |len: usize| {
        let idx = if i < 0 { i + len as i64 } else { i };
        if idx < 0 || idx >= len as i64 {
            Err("index out of range".to_string())
        } else {
            Ok(idx as usize)
        }
    };
    match target {
        Value::List(items) => Ok(items[resolve(items.len())?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(chars[resolve(chars.len())?].to_string()))
        }
        other => Err(format!("{} is not subscriptable", other.type_name())),
    }
}

impl Executor for CalcExecutor {
    fn run(&mut self, step: &Step) -> Result<StepValue, ExecutorError> {
        self.output.clear();
        let mut result = None;

        for (lineno, line) in step.content.lines().enumerate() {
            let tokens =
                tokenize(line).map_err(|e| ExecutorError::Runtime(format!("line {}: {}", lineno + 1, e)))?;
            if tokens.is_empty() {
                continue;
            }
            let statement = parse_statement(&tokens)
                .map_err(|e| ExecutorError::Runtime(format!("line {}: {}", lineno + 1, e)))?;
            let value = self
                .exec(&statement)
                .map_err(|e| ExecutorError::Runtime(format!("line {}: {}", lineno + 1, e)))?;
            result = Some(value);
        }

        Ok(StepValue {
            result,
            output: std::mem::take(&mut self.output),
        })
    }

    fn snapshot(&self) -> Result<Vec<u8>, ExecutorError> {
        serde_json::to_vec(&self.bindings).map_err(|e| ExecutorError::Serialize(e.to_string()))
    }

    fn restore(&mut self, bytes: &[u8]) -> Result<(), ExecutorError> {
        let bindings: BTreeMap<String, Value> =
            serde_json::from_slice(bytes).map_err(|e| ExecutorError::Restore(e.to_string()))?;
        self.bindings = bindings;
        Ok(())
    }
}
