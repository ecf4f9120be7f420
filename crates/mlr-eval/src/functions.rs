//! Built-in DSL function registry, dispatched from [`crate::eval`] function
//! callsites. Covers a representative subset of string, math, and
//! type-introspection functions — the ones exercised by the rest of this
//! workspace's tests — rather than an exhaustive standard library.

use mlr_core::Value;

use crate::error::RuntimeError;

pub fn call(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    if args.iter().any(Value::is_absent) && !matches!(name, "is_absent" | "is_present") {
        return Ok(Value::Absent);
    }
    match name {
        "strlen" => arity(name, &args, 1, |a| Ok(Value::Int(a[0].format_value(None).chars().count() as i64))),
        "toupper" => arity(name, &args, 1, |a| Ok(Value::String(a[0].format_value(None).to_uppercase()))),
        "tolower" => arity(name, &args, 1, |a| Ok(Value::String(a[0].format_value(None).to_lowercase()))),
        "length" => arity(name, &args, 1, |a| Ok(Value::Int(a[0].format_value(None).chars().count() as i64))),
        "typeof" => arity(name, &args, 1, |a| Ok(Value::String(a[0].type_name().to_string()))),
        "int" => arity(name, &args, 1, |a| Ok(to_int(&a[0]))),
        "float" => arity(name, &args, 1, |a| Ok(to_float(&a[0]))),
        "string" => arity(name, &args, 1, |a| Ok(Value::String(a[0].format_value(None)))),
        "boolean" => arity(name, &args, 1, |a| Ok(to_bool(&a[0]))),
        "abs" => arity(name, &args, 1, |a| Ok(abs(&a[0]))),
        "sgn" => arity(name, &args, 1, |a| Ok(sgn(&a[0]))),
        "min" => reduce(&args, |a, b| if a.compare(b) == Some(std::cmp::Ordering::Less) { a.clone() } else { b.clone() }),
        "max" => reduce(&args, |a, b| if a.compare(b) == Some(std::cmp::Ordering::Greater) { a.clone() } else { b.clone() }),
        "is_absent" => arity(name, &args, 1, |a| Ok(Value::Bool(a[0].is_absent()))),
        "is_present" => arity(name, &args, 1, |a| Ok(Value::Bool(a[0].is_present()))),
        "is_error" => arity(name, &args, 1, |a| Ok(Value::Bool(a[0].is_error()))),
        "sub" => arity(name, &args, 3, |a| {
            let hay = a[0].format_value(None);
            let from = a[1].format_value(None);
            let to = a[2].format_value(None);
            Ok(Value::String(hay.replacen(&from, &to, 1)))
        }),
        "gsub" => arity(name, &args, 3, |a| {
            let hay = a[0].format_value(None);
            let from = a[1].format_value(None);
            let to = a[2].format_value(None);
            Ok(Value::String(hay.replace(&from, &to)))
        }),
        _ => Err(RuntimeError::UndefinedFunction(name.to_string())),
    }
}

fn arity(
    name: &str,
    args: &[Value],
    n: usize,
    f: impl FnOnce(&[Value]) -> Result<Value, RuntimeError>,
) -> Result<Value, RuntimeError> {
    if args.len() != n {
        return Err(RuntimeError::WrongArity(name.to_string(), args.len(), n));
    }
    f(args)
}

fn reduce(args: &[Value], f: impl Fn(&Value, &Value) -> Value) -> Result<Value, RuntimeError> {
    let mut it = args.iter();
    let Some(first) = it.next() else {
        return Ok(Value::Absent);
    };
    Ok(it.fold(first.clone(), |acc, v| f(&acc, v)))
}

fn to_int(v: &Value) -> Value {
    match v {
        Value::Int(i) => Value::Int(*i),
        Value::Float(f) => Value::Int(*f as i64),
        Value::String(s) => s.parse::<i64>().map(Value::Int).unwrap_or(Value::Error),
        Value::Bool(b) => Value::Int(*b as i64),
        _ => Value::Error,
    }
}

fn to_float(v: &Value) -> Value {
    match v {
        Value::Int(i) => Value::Float(*i as f64),
        Value::Float(f) => Value::Float(*f),
        Value::String(s) => s.parse::<f64>().map(Value::Float).unwrap_or(Value::Error),
        Value::Bool(b) => Value::Float(if *b { 1.0 } else { 0.0 }),
        _ => Value::Error,
    }
}

fn to_bool(v: &Value) -> Value {
    match v {
        Value::Bool(b) => Value::Bool(*b),
        Value::String(s) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::Error,
        },
        _ => Value::Error,
    }
}

fn abs(v: &Value) -> Value {
    match v {
        Value::Int(i) => Value::Int(i.abs()),
        Value::Float(f) => Value::Float(f.abs()),
        _ => Value::Error,
    }
}

fn sgn(v: &Value) -> Value {
    match v {
        Value::Int(i) => Value::Int(i.signum()),
        Value::Float(f) => Value::Float(f.signum()),
        _ => Value::Error,
    }
}
