//! Tree-walking expression evaluator.

use std::cmp::Ordering;

use mlr_core::{FieldRead, MultiLevelMap, Value};
use mlr_cst::cst::{BinaryOp, ContextVar, Expr, UnaryOp};

use crate::error::RuntimeError;
use crate::functions;
use crate::state::ExecState;

/// An expression's evaluated result: either a scalar [`Value`] or a
/// [`MultiLevelMap`] — maps never live inside `Value` itself.
#[derive(Debug, Clone)]
pub enum EvalValue {
    Scalar(Value),
    Map(MultiLevelMap),
}

impl EvalValue {
    /// Collapse to a scalar; a map used where a scalar is required is an
    /// error, not absence (distinguishing "wrong shape" from "missing").
    pub fn into_scalar(self) -> Value {
        match self {
            EvalValue::Scalar(v) => v,
            EvalValue::Map(_) => Value::Error,
        }
    }
}

/// Build a one-level [`MultiLevelMap`] snapshot of a record's fields, each
/// value promoted under the active inference policy (used for `$*`).
pub fn record_to_map(st: &ExecState) -> MultiLevelMap {
    let mut m = MultiLevelMap::new();
    for name in st.record.field_names().map(str::to_string).collect::<Vec<_>>() {
        let value = match st.record.read(&name) {
            FieldRead::Typed(v) => v.clone(),
            FieldRead::Raw(s) => Value::parse_inferred(s, st.policy),
            FieldRead::Absent => Value::Absent,
        };
        m.put_terminal(&[Value::String(name)], value);
    }
    m
}

pub fn eval_expr(expr: &Expr, st: &mut ExecState) -> Result<EvalValue, RuntimeError> {
    Ok(match expr {
        Expr::IntLit(i) => EvalValue::Scalar(Value::Int(*i)),
        Expr::FloatLit(f) => EvalValue::Scalar(Value::Float(*f)),
        Expr::StringLit(s) => EvalValue::Scalar(Value::String(s.clone())),
        Expr::BoolLit(b) => EvalValue::Scalar(Value::Bool(*b)),
        Expr::Context(cv) => EvalValue::Scalar(eval_context_var(*cv, st)),
        Expr::Field(name) => EvalValue::Scalar(read_field(st, name)),
        Expr::IndirectField(inner) => {
            let name = eval_scalar(inner, st)?.format_value(None);
            EvalValue::Scalar(read_field(st, &name))
        }
        Expr::FullSrec => EvalValue::Map(record_to_map(st)),
        Expr::Oosvar { name, keys } => {
            let keys = eval_keys(keys, st)?;
            let mut path = Vec::with_capacity(keys.len() + 1);
            path.push(Value::String(name.clone()));
            path.extend(keys);
            if let Some(v) = st.oosvars.get_terminal(&path) {
                EvalValue::Scalar(v.clone())
            } else if let Some(level) = st.oosvars.get_level(&path) {
                EvalValue::Map(level.clone())
            } else {
                EvalValue::Scalar(Value::Absent)
            }
        }
        Expr::FullOosvar => EvalValue::Map(st.oosvars.clone()),
        Expr::Local { slot, keys } => {
            let keys = eval_keys(keys, st)?;
            st.locals.get_map_value(*slot, &keys)
        }
        Expr::Env(inner) => {
            let name = eval_scalar(inner, st)?.format_value(None);
            match std::env::var(&name) {
                Ok(v) => EvalValue::Scalar(Value::String(v)),
                Err(_) => EvalValue::Scalar(Value::Absent),
            }
        }
        Expr::Unary(op, inner) => EvalValue::Scalar(eval_unary(*op, eval_scalar(inner, st)?)?),
        Expr::Binary(op, lhs, rhs) => {
            let a = eval_scalar(lhs, st)?;
            let b = eval_scalar(rhs, st)?;
            EvalValue::Scalar(eval_binary(*op, a, b)?)
        }
        Expr::Ternary(cond, then_e, else_e) => {
            let c = eval_scalar(cond, st)?;
            if strict_bool(&c) {
                eval_expr(then_e, st)?
            } else {
                eval_expr(else_e, st)?
            }
        }
        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push(eval_scalar(a, st)?);
            }
            if let Some(func) = st.functions.get(name) {
                EvalValue::Scalar(crate::exec::call_function(func, values, st)?)
            } else {
                EvalValue::Scalar(functions::call(name, values)?)
            }
        }
    })
}

/// Evaluate an expression and collapse it to a scalar, for contexts that can
/// never hold a map (operands of arithmetic, comparisons, keypath indices).
pub fn eval_scalar(expr: &Expr, st: &mut ExecState) -> Result<Value, RuntimeError> {
    Ok(eval_expr(expr, st)?.into_scalar())
}

pub(crate) fn eval_keys(keys: &[Expr], st: &mut ExecState) -> Result<Vec<Value>, RuntimeError> {
    let mut out = Vec::with_capacity(keys.len());
    for k in keys {
        out.push(eval_scalar(k, st)?);
    }
    Ok(out)
}

pub(crate) fn read_field(st: &ExecState, name: &str) -> Value {
    match st.record.read(name) {
        FieldRead::Typed(v) => v.clone(),
        FieldRead::Raw(s) => Value::parse_inferred(s, st.policy),
        FieldRead::Absent => Value::Absent,
    }
}

/// Coerce to boolean for a strict-bool context (if/while/ternary/filter
/// guards); a non-bool value is a non-fatal type error there — the guard
/// is simply treated as false.
pub(crate) fn strict_bool(v: &Value) -> bool {
    v.coerce_to_bool().unwrap_or(false)
}

fn eval_context_var(cv: ContextVar, st: &ExecState) -> Value {
    match cv {
        ContextVar::Nr => Value::Int(st.rctx.nr),
        ContextVar::Nf => Value::Int(st.rctx.nf),
        ContextVar::Fnr => Value::Int(st.rctx.fnr),
        ContextVar::Filename => Value::String(st.rctx.filename.clone()),
        ContextVar::Filenum => Value::Int(st.rctx.filenum),
    }
}

fn eval_unary(op: UnaryOp, v: Value) -> Result<Value, RuntimeError> {
    Ok(match op {
        UnaryOp::Not => v.logical_not()?,
        UnaryOp::Neg => match v {
            Value::Int(i) => Value::Int(-i),
            Value::Float(f) => Value::Float(-f),
            Value::Absent => Value::Absent,
            _ => Value::Error,
        },
        UnaryOp::BitNot => match v {
            Value::Int(i) => Value::Int(!i),
            Value::Absent => Value::Absent,
            _ => Value::Error,
        },
    })
}

fn eval_binary(op: BinaryOp, a: Value, b: Value) -> Result<Value, RuntimeError> {
    Ok(match op {
        BinaryOp::Add => a.add(&b),
        BinaryOp::Sub => a.sub(&b),
        BinaryOp::Mul => a.mul(&b),
        BinaryOp::Div => a.div(&b),
        BinaryOp::IntDiv => a.int_div(&b),
        BinaryOp::Mod => a.modulo(&b),
        BinaryOp::Concat => concat(&a, &b),
        BinaryOp::Lt => compare_bool(&a, &b, |o| o == Ordering::Less),
        BinaryOp::Le => compare_bool(&a, &b, |o| o != Ordering::Greater),
        BinaryOp::Gt => compare_bool(&a, &b, |o| o == Ordering::Greater),
        BinaryOp::Ge => compare_bool(&a, &b, |o| o != Ordering::Less),
        BinaryOp::Eq => eq_bool(&a, &b, true),
        BinaryOp::Ne => eq_bool(&a, &b, false),
        BinaryOp::And => match propagate(&a, &b) {
            Some(v) => v,
            None => a.logical_and(&b)?,
        },
        BinaryOp::Or => match propagate(&a, &b) {
            Some(v) => v,
            None => a.logical_or(&b)?,
        },
        BinaryOp::BitAnd => a.bitand(&b),
        BinaryOp::BitOr => a.bitor(&b),
        BinaryOp::BitXor => a.bitxor(&b),
        BinaryOp::Shl => a.shl(&b),
        BinaryOp::Shr => a.shr(&b),
    })
}

fn propagate(a: &Value, b: &Value) -> Option<Value> {
    if a.is_error() || b.is_error() {
        Some(Value::Error)
    } else if a.is_absent() || b.is_absent() {
        Some(Value::Absent)
    } else {
        None
    }
}

fn concat(a: &Value, b: &Value) -> Value {
    propagate(a, b).unwrap_or_else(|| Value::String(format!("{}{}", a.format_value(None), b.format_value(None))))
}

fn compare_bool(a: &Value, b: &Value, f: impl Fn(Ordering) -> bool) -> Value {
    if let Some(v) = propagate(a, b) {
        return v;
    }
    match a.compare(b) {
        Some(o) => Value::Bool(f(o)),
        None => Value::Error,
    }
}

fn eq_bool(a: &Value, b: &Value, want_eq: bool) -> Value {
    if let Some(v) = propagate(a, b) {
        return v;
    }
    Value::Bool(a.eq_value(b) == want_eq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use mlr_core::{Colors, InferencePolicy, Record, RecordFields};

    use crate::context::RecordContext;
    use crate::output::OutputRouter;

    fn state<'a>(
        record: Record,
        funcs: &'a IndexMap<String, mlr_cst::cst::Function>,
        subrs: &'a IndexMap<String, mlr_cst::cst::Function>,
        output: &'a mut OutputRouter,
    ) -> ExecState<'a> {
        ExecState::new(
            RecordFields::from_record(record),
            MultiLevelMap::new(),
            RecordContext::default(),
            InferencePolicy::default(),
            None,
            Colors::OFF,
            funcs,
            subrs,
            output,
        )
    }

    #[test]
    fn field_read_infers_int() {
        let mut rec = Record::new();
        rec.put("x", "3");
        let funcs = IndexMap::new();
        let subrs = IndexMap::new();
        let mut output = OutputRouter::new(false);
        let mut st = state(rec, &funcs, &subrs, &mut output);
        let v = eval_scalar(&Expr::Field("x".to_string()), &mut st).unwrap();
        assert!(matches!(v, Value::Int(3)));
    }

    #[test]
    fn absent_field_propagates_through_add() {
        let funcs = IndexMap::new();
        let subrs = IndexMap::new();
        let mut output = OutputRouter::new(false);
        let mut st = state(Record::new(), &funcs, &subrs, &mut output);
        let expr = Expr::Binary(
            BinaryOp::Add,
            Box::new(Expr::Field("missing".to_string())),
            Box::new(Expr::IntLit(1)),
        );
        assert!(eval_scalar(&expr, &mut st).unwrap().is_absent());
    }

    #[test]
    fn ternary_picks_branch() {
        let funcs = IndexMap::new();
        let subrs = IndexMap::new();
        let mut output = OutputRouter::new(false);
        let mut st = state(Record::new(), &funcs, &subrs, &mut output);
        let expr = Expr::Ternary(
            Box::new(Expr::BoolLit(true)),
            Box::new(Expr::IntLit(1)),
            Box::new(Expr::IntLit(2)),
        );
        assert!(matches!(eval_scalar(&expr, &mut st).unwrap(), Value::Int(1)));
    }

    #[test]
    fn oosvar_keypath_reads_terminal() {
        let funcs = IndexMap::new();
        let subrs = IndexMap::new();
        let mut output = OutputRouter::new(false);
        let mut st = state(Record::new(), &funcs, &subrs, &mut output);
        st.oosvars.put_terminal(&[Value::String("sum".into()), Value::String("a".into())], Value::Int(4));
        let expr = Expr::Oosvar { name: "sum".to_string(), keys: vec![Expr::StringLit("a".to_string())] };
        assert!(matches!(eval_scalar(&expr, &mut st).unwrap(), Value::Int(4)));
    }
}
