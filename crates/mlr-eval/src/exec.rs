//! Statement execution: the `Flow` control-transfer enum and the handlers
//! for every CST [`Stmt`] variant. Mutually recursive with [`crate::eval`]
//! — a function call evaluates arguments via `eval_expr`, pushes a frame,
//! and runs its body back through [`exec_block`].

use mlr_core::{Colors, LevelEntry, MultiLevelMap, Record, Value};
use mlr_cst::cst::{Block, EmitTarget, Expr, FrameLayout, Function, Redirect, Stmt, UnsetTarget};

use crate::error::RuntimeError;
use crate::eval::{eval_expr, eval_keys, eval_scalar, read_field, strict_bool, EvalValue};
use crate::output::format_record_dkvp;
use crate::state::ExecState;

/// How a block finished: fell off the end, or transferred control to an
/// enclosing loop/function. Modeled as an explicit return code rather
/// than native control flow, since a statement executor has to thread
/// break/continue/return up through ordinary function returns.
#[derive(Debug)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    /// `Some` is `return expr;`, `None` is a bare `return;` (void).
    Return(Option<Value>),
}

/// Snapshot of one [`MultiLevelMap`] entry, decoupled from the map's
/// lifetime so it can be iterated while `st` is mutated.
#[derive(Clone)]
enum Owned {
    Terminal(Value),
    Level(MultiLevelMap),
}

fn snapshot_level(level: &MultiLevelMap) -> Vec<(Value, Owned)> {
    level
        .iter()
        .map(|(k, e)| {
            let owned = match e {
                LevelEntry::Terminal(v) => Owned::Terminal(v.clone()),
                LevelEntry::Level(m) => Owned::Level(m.clone()),
            };
            (k.clone(), owned)
        })
        .collect()
}

fn bind_val(val_slot: u32, owned: Owned, st: &mut ExecState) -> Result<(), RuntimeError> {
    let ev = match owned {
        Owned::Terminal(v) => EvalValue::Scalar(v),
        Owned::Level(m) => EvalValue::Map(m),
    };
    st.locals.assign_map(val_slot, &[], ev)
}

/// Run a function or `begin`/`end` block's own frame, discarding it on
/// exit — frames are pushed/popped around the whole body.
pub fn run_frame_block(frame: &FrameLayout, block: &Block, st: &mut ExecState) -> Result<Flow, RuntimeError> {
    st.locals.enter_frame(frame);
    let flow = exec_block(block, st);
    st.locals.exit_frame();
    flow
}

pub fn call_function(func: &Function, args: Vec<Value>, st: &mut ExecState) -> Result<Value, RuntimeError> {
    if func.param_slots.len() != args.len() {
        return Err(RuntimeError::WrongArity(func.name.clone(), args.len(), func.param_slots.len()));
    }
    st.locals.enter_frame(&func.frame);
    let result = (|| -> Result<Value, RuntimeError> {
        for (&slot, arg) in func.param_slots.iter().zip(args) {
            st.locals.assign_scalar(slot, arg)?;
        }
        match exec_block(&func.body, st)? {
            Flow::Return(Some(v)) => Ok(v),
            _ => Ok(Value::Absent),
        }
    })();
    st.locals.exit_frame();
    result
}

pub fn call_subroutine(subr: &Function, args: Vec<Value>, st: &mut ExecState) -> Result<(), RuntimeError> {
    if subr.param_slots.len() != args.len() {
        return Err(RuntimeError::WrongArity(subr.name.clone(), args.len(), subr.param_slots.len()));
    }
    st.locals.enter_frame(&subr.frame);
    let result = (|| -> Result<(), RuntimeError> {
        for (&slot, arg) in subr.param_slots.iter().zip(args) {
            st.locals.assign_scalar(slot, arg)?;
        }
        exec_block(&subr.body, st)?;
        Ok(())
    })();
    st.locals.exit_frame();
    result
}

pub fn exec_block(block: &Block, st: &mut ExecState) -> Result<Flow, RuntimeError> {
    st.locals.enter_subframe(block.subframe_start, block.subframe_len);
    let flow = exec_stmts(&block.stmts, st);
    st.locals.exit_subframe(block.subframe_start, block.subframe_len);
    flow
}

fn exec_stmts(stmts: &[Stmt], st: &mut ExecState) -> Result<Flow, RuntimeError> {
    for s in stmts {
        match exec_stmt(s, st)? {
            Flow::Normal => {}
            other => return Ok(other),
        }
    }
    Ok(Flow::Normal)
}

/// Walk `key_slots` levels deep under `level`, binding one key slot per
/// level and `val_slot` at the leaf, for `for ((k1,...,kn), v in ...)`.
/// A branch shallower than `key_slots` (a terminal reached before all
/// keys are consumed) is skipped, not an error.
fn for_map_recurse(
    level: &MultiLevelMap,
    key_slots: &[u32],
    val_slot: u32,
    body: &Block,
    st: &mut ExecState,
) -> Result<Option<Flow>, RuntimeError> {
    let entries = snapshot_level(level);
    if key_slots.is_empty() {
        for (_k, e) in entries {
            bind_val(val_slot, e, st)?;
            match exec_block(body, st)? {
                Flow::Break => return Ok(Some(Flow::Normal)),
                Flow::Continue | Flow::Normal => {}
                Flow::Return(r) => return Ok(Some(Flow::Return(r))),
            }
        }
        return Ok(None);
    }
    let (&slot, rest) = key_slots.split_first().expect("checked non-empty above");
    for (k, e) in entries {
        match e {
            Owned::Terminal(v) => {
                if rest.is_empty() {
                    st.locals.assign_scalar(slot, k)?;
                    bind_val(val_slot, Owned::Terminal(v), st)?;
                    match exec_block(body, st)? {
                        Flow::Break => return Ok(Some(Flow::Normal)),
                        Flow::Continue | Flow::Normal => {}
                        Flow::Return(r) => return Ok(Some(Flow::Return(r))),
                    }
                }
            }
            Owned::Level(sub) => {
                st.locals.assign_scalar(slot, k)?;
                if let Some(stop) = for_map_recurse(&sub, rest, val_slot, body, st)? {
                    return Ok(Some(stop));
                }
            }
        }
    }
    Ok(None)
}

fn snapshot_record(st: &ExecState) -> Record {
    let mut rec = Record::new();
    for name in st.record.field_names().map(str::to_string).collect::<Vec<_>>() {
        let v = read_field(st, &name);
        rec.put(name, v.format_value(st.ofmt));
    }
    rec
}

fn dump_value(m: &MultiLevelMap, ofmt: Option<&str>, c: Colors) -> String {
    let mut s = String::from(c.dim);
    s.push('{');
    s.push_str(c.reset);
    let mut first = true;
    for (k, entry) in m.iter() {
        if !first {
            s.push_str(c.dim);
            s.push(',');
            s.push_str(c.reset);
        }
        first = false;
        s.push_str(c.blue);
        s.push('"');
        s.push_str(&k.format_value(None));
        s.push('"');
        s.push_str(c.reset);
        s.push_str(c.dim);
        s.push(':');
        s.push_str(c.reset);
        match entry {
            LevelEntry::Terminal(v) => match v {
                Value::String(_) | Value::Empty => {
                    s.push_str(c.green);
                    s.push('"');
                    s.push_str(&v.format_value(ofmt));
                    s.push('"');
                    s.push_str(c.reset);
                }
                other => s.push_str(&other.format_value(ofmt)),
            },
            LevelEntry::Level(sub) => s.push_str(&dump_value(sub, ofmt, c)),
        }
    }
    s.push_str(c.dim);
    s.push('}');
    s.push_str(c.reset);
    s
}

fn resolve_emit_target(target: &EmitTarget, st: &mut ExecState) -> Result<(String, Owned), RuntimeError> {
    match target {
        EmitTarget::Oosvar { name, keys } => {
            let keys_v = eval_keys(keys, st)?;
            let mut path = Vec::with_capacity(keys_v.len() + 1);
            path.push(Value::String(name.clone()));
            path.extend(keys_v);
            if let Some(v) = st.oosvars.get_terminal(&path) {
                Ok((name.clone(), Owned::Terminal(v.clone())))
            } else {
                let sub = st.oosvars.get_level(&path).cloned().unwrap_or_default();
                Ok((name.clone(), Owned::Level(sub)))
            }
        }
        EmitTarget::Local { slot, keys } => {
            let keys_v = eval_keys(keys, st)?;
            let name = st.locals.slot_name(*slot).to_string();
            Ok(match st.locals.get_map_value(*slot, &keys_v) {
                EvalValue::Scalar(v) => (name, Owned::Terminal(v)),
                EvalValue::Map(m) => (name, Owned::Level(m)),
            })
        }
    }
}

fn emit_one(
    target: &EmitTarget,
    st: &mut ExecState,
    top_names: &[String],
    with_prefix: bool,
) -> Result<Vec<Record>, RuntimeError> {
    let (leaf_name, node) = resolve_emit_target(target, st)?;
    Ok(match node {
        Owned::Terminal(v) => {
            let mut rec = Record::new();
            rec.put(leaf_name, v.format_value(st.ofmt));
            vec![rec]
        }
        Owned::Level(sub) => sub.flatten_to_records(&leaf_name, top_names, with_prefix, ":"),
    })
}

fn emit_all(st: &ExecState, top_names: &[String], with_prefix: bool) -> Vec<Record> {
    let mut out = Vec::new();
    for (name, entry) in st.oosvars.iter() {
        let name_s = name.format_value(None);
        match entry {
            LevelEntry::Terminal(v) => {
                let mut rec = Record::new();
                rec.put(name_s, v.format_value(st.ofmt));
                out.push(rec);
            }
            LevelEntry::Level(sub) => out.extend(sub.flatten_to_records(&name_s, top_names, with_prefix, ":")),
        }
    }
    out
}

/// Walk N lashed maps in lockstep through `top_names.len()` levels, then
/// join on keys common to every map at the leaf. A lashed emit with
/// mismatched keys across its submaps emits only the intersection.
fn lash_recurse(
    levels: &[&MultiLevelMap],
    names: &[String],
    top_names: &[String],
    depth: usize,
    path: &mut Vec<Value>,
    out: &mut Vec<Record>,
) {
    if levels.is_empty() {
        return;
    }
    if depth == top_names.len() {
        let candidate_keys: Vec<Value> = levels[0].keys().cloned().collect();
        for k in candidate_keys {
            let mut vals = Vec::with_capacity(levels.len());
            let mut ok = true;
            for lvl in levels {
                match lvl.get_terminal(std::slice::from_ref(&k)) {
                    Some(v) => vals.push(v.clone()),
                    None => {
                        ok = false;
                        break;
                    }
                }
            }
            if !ok {
                continue;
            }
            let mut rec = Record::new();
            for (name, pk) in top_names.iter().zip(path.iter()) {
                rec.put(name.clone(), pk.format_value(None));
            }
            for (name, v) in names.iter().zip(vals.iter()) {
                rec.put(name.clone(), v.format_value(None));
            }
            out.push(rec);
        }
        return;
    }
    let candidate_keys: Vec<Value> = levels[0].keys().cloned().collect();
    for k in candidate_keys {
        let mut subs = Vec::with_capacity(levels.len());
        let mut ok = true;
        for lvl in levels {
            match lvl.get_level(std::slice::from_ref(&k)) {
                Some(sub) => subs.push(sub),
                None => {
                    ok = false;
                    break;
                }
            }
        }
        if !ok {
            continue;
        }
        path.push(k);
        lash_recurse(&subs, names, top_names, depth + 1, path, out);
        path.pop();
    }
}

fn emit_lashed(targets: &[EmitTarget], st: &mut ExecState, top_names: &[String]) -> Result<Vec<Record>, RuntimeError> {
    let mut names = Vec::with_capacity(targets.len());
    let mut maps = Vec::with_capacity(targets.len());
    for t in targets {
        let (name, node) = resolve_emit_target(t, st)?;
        names.push(name);
        maps.push(match node {
            Owned::Level(m) => m,
            Owned::Terminal(_) => MultiLevelMap::new(),
        });
    }
    let refs: Vec<&MultiLevelMap> = maps.iter().collect();
    let mut out = Vec::new();
    let mut path = Vec::new();
    lash_recurse(&refs, &names, top_names, 0, &mut path, &mut out);
    Ok(out)
}

fn route_emitted(recs: Vec<Record>, redirect: Option<&Redirect>, st: &mut ExecState) -> Result<(), RuntimeError> {
    match redirect {
        None => {
            st.emitted.extend(recs);
            Ok(())
        }
        Some(r) => {
            let target = eval_scalar(&r.target, st)?.format_value(st.ofmt);
            for rec in recs {
                let line = format_record_dkvp(&rec);
                st.output.write_line(Some((r.mode, &target)), &line, true)?;
            }
            Ok(())
        }
    }
}

pub fn exec_stmt(stmt: &Stmt, st: &mut ExecState) -> Result<Flow, RuntimeError> {
    match stmt {
        Stmt::SrecAssign { name, value } => {
            let v = eval_scalar(value, st)?;
            st.record.write(name, v);
            Ok(Flow::Normal)
        }
        Stmt::IndirectSrecAssign { name_expr, value } => {
            let name = eval_scalar(name_expr, st)?.format_value(None);
            let v = eval_scalar(value, st)?;
            st.record.write(&name, v);
            Ok(Flow::Normal)
        }
        Stmt::OosvarAssign { name, keys, value } => {
            let keys_v = eval_keys(keys, st)?;
            let mut path = Vec::with_capacity(keys_v.len() + 1);
            path.push(Value::String(name.clone()));
            path.extend(keys_v);
            match eval_expr(value, st)? {
                EvalValue::Scalar(v) => {
                    if !v.is_absent() {
                        st.oosvars.put_terminal(&path, v);
                    }
                }
                EvalValue::Map(m) => st.oosvars.put_level(&path, m),
            }
            Ok(Flow::Normal)
        }
        Stmt::OosvarFromFullSrec { name, keys } => {
            let keys_v = eval_keys(keys, st)?;
            let mut path = Vec::with_capacity(keys_v.len() + 1);
            path.push(Value::String(name.clone()));
            path.extend(keys_v);
            let fields: Vec<(String, Value)> = st
                .record
                .field_names()
                .map(str::to_string)
                .collect::<Vec<_>>()
                .into_iter()
                .map(|n| {
                    let v = read_field(st, &n);
                    (n, v)
                })
                .collect();
            let level = st.oosvars.get_or_create_level(&path);
            level.clear();
            for (n, v) in fields {
                level.put_terminal(&[Value::String(n)], v);
            }
            Ok(Flow::Normal)
        }
        Stmt::FullSrecFromOosvar { name, keys } => {
            let keys_v = eval_keys(keys, st)?;
            let mut path = Vec::with_capacity(keys_v.len() + 1);
            path.push(Value::String(name.clone()));
            path.extend(keys_v);
            let level = st.oosvars.get_level(&path).cloned().unwrap_or_default();
            st.record.clear();
            for (k, entry) in level.iter() {
                if let LevelEntry::Terminal(v) = entry {
                    st.record.write(&k.format_value(None), v.clone());
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::LocalDecl { slot, value, .. } => {
            if let Some(e) = value {
                let v = eval_scalar(e, st)?;
                st.locals.assign_scalar(*slot, v)?;
            }
            Ok(Flow::Normal)
        }
        Stmt::MapDecl { .. } => Ok(Flow::Normal),
        Stmt::LocalAssign { slot, keys, value } => {
            let ev = eval_expr(value, st)?;
            let keys_v = eval_keys(keys, st)?;
            st.locals.assign_map(*slot, &keys_v, ev)?;
            Ok(Flow::Normal)
        }
        Stmt::EnvAssign { name_expr, value } => {
            let name = eval_scalar(name_expr, st)?.format_value(None);
            let v = eval_scalar(value, st)?;
            if !v.is_absent() {
                std::env::set_var(name, v.format_value(st.ofmt));
            }
            Ok(Flow::Normal)
        }
        Stmt::If { arms, else_body } => {
            for (cond, body) in arms {
                let c = eval_scalar(cond, st)?;
                if strict_bool(&c) {
                    return exec_block(body, st);
                }
            }
            match else_body {
                Some(b) => exec_block(b, st),
                None => Ok(Flow::Normal),
            }
        }
        Stmt::While { cond, body } => {
            loop {
                let c = eval_scalar(cond, st)?;
                if !strict_bool(&c) {
                    break;
                }
                match exec_block(body, st)? {
                    Flow::Break => break,
                    Flow::Continue | Flow::Normal => {}
                    Flow::Return(r) => return Ok(Flow::Return(r)),
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::DoWhile { body, cond } => {
            loop {
                match exec_block(body, st)? {
                    Flow::Break => break,
                    Flow::Continue | Flow::Normal => {}
                    Flow::Return(r) => return Ok(Flow::Return(r)),
                }
                let c = eval_scalar(cond, st)?;
                if !strict_bool(&c) {
                    break;
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::ForSrec { key_slot, val_slot, body } => {
            let snapshot: Vec<(String, Value)> = st
                .record
                .field_names()
                .map(str::to_string)
                .collect::<Vec<_>>()
                .into_iter()
                .map(|n| {
                    let v = read_field(st, &n);
                    (n, v)
                })
                .collect();
            for (name, value) in snapshot {
                if let Some(ks) = key_slot {
                    st.locals.assign_scalar(*ks, Value::String(name))?;
                }
                st.locals.assign_scalar(*val_slot, value)?;
                match exec_block(body, st)? {
                    Flow::Break => break,
                    Flow::Continue | Flow::Normal => {}
                    Flow::Return(r) => return Ok(Flow::Return(r)),
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::ForOosvar { key_slots, val_slot, name, keys, body } => {
            let keys_v = eval_keys(keys, st)?;
            let mut path = Vec::with_capacity(keys_v.len() + 1);
            path.push(Value::String(name.clone()));
            path.extend(keys_v);
            let base = st.oosvars.get_level(&path).cloned().unwrap_or_default();
            match for_map_recurse(&base, key_slots, *val_slot, body, st)? {
                Some(Flow::Return(r)) => Ok(Flow::Return(r)),
                _ => Ok(Flow::Normal),
            }
        }
        Stmt::ForLocalMap { key_slots, val_slot, local_slot, keys, body } => {
            let keys_v = eval_keys(keys, st)?;
            let base = match st.locals.get_map(*local_slot) {
                Some(m) if keys_v.is_empty() => m.clone(),
                Some(m) => m.get_level(&keys_v).cloned().unwrap_or_default(),
                None => MultiLevelMap::new(),
            };
            match for_map_recurse(&base, key_slots, *val_slot, body, st)? {
                Some(Flow::Return(r)) => Ok(Flow::Return(r)),
                _ => Ok(Flow::Normal),
            }
        }
        Stmt::TripleFor { init, cond, update, body } => {
            for s in init {
                match exec_stmt(s, st)? {
                    Flow::Normal => {}
                    other => return Ok(other),
                }
            }
            loop {
                let c = eval_scalar(cond, st)?;
                if !strict_bool(&c) {
                    break;
                }
                match exec_block(body, st)? {
                    Flow::Break => break,
                    Flow::Continue | Flow::Normal => {}
                    Flow::Return(r) => return Ok(Flow::Return(r)),
                }
                for s in update {
                    match exec_stmt(s, st)? {
                        Flow::Normal => {}
                        other => return Ok(other),
                    }
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::Break => Ok(Flow::Break),
        Stmt::Continue => Ok(Flow::Continue),
        Stmt::ReturnValue(e) => {
            let v = eval_scalar(e, st)?;
            Ok(Flow::Return(Some(v)))
        }
        Stmt::ReturnVoid => Ok(Flow::Return(None)),
        Stmt::CallSubr { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push(eval_scalar(a, st)?);
            }
            let subr = st.subroutines.get(name).ok_or_else(|| RuntimeError::UndefinedFunction(name.clone()))?;
            call_subroutine(subr, values, st)?;
            Ok(Flow::Normal)
        }
        Stmt::Emit { targets, with_prefix, all, top_names, redirect } => {
            let recs = if *all {
                emit_all(st, top_names, *with_prefix)
            } else if targets.len() <= 1 {
                match targets.first() {
                    Some(t) => emit_one(t, st, top_names, *with_prefix)?,
                    None => Vec::new(),
                }
            } else {
                emit_lashed(targets, st, top_names)?
            };
            route_emitted(recs, redirect.as_ref(), st)?;
            Ok(Flow::Normal)
        }
        Stmt::Emitf { names, redirect } => {
            let mut rec = Record::new();
            for name in names {
                if let Some(v) = st.oosvars.get_terminal(&[Value::String(name.clone())]) {
                    rec.put(name.clone(), v.format_value(st.ofmt));
                }
            }
            route_emitted(vec![rec], redirect.as_ref(), st)?;
            Ok(Flow::Normal)
        }
        Stmt::Tee { redirect } => {
            let target = eval_scalar(&redirect.target, st)?.format_value(st.ofmt);
            let rec = snapshot_record(st);
            let line = format_record_dkvp(&rec);
            st.output.write_line(Some((redirect.mode, &target)), &line, true)?;
            Ok(Flow::Normal)
        }
        Stmt::Print { value, trailing_newline, redirect } => {
            let text = match value {
                Some(e) => eval_scalar(e, st)?.format_value(st.ofmt),
                None => String::new(),
            };
            match redirect {
                None => st.output.write_line(None, &text, *trailing_newline)?,
                Some(r) => {
                    let target = eval_scalar(&r.target, st)?.format_value(st.ofmt);
                    st.output.write_line(Some((r.mode, &target)), &text, *trailing_newline)?;
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::Dump { redirect } => {
            let text = dump_value(&st.oosvars, st.ofmt, st.colors);
            match redirect {
                None => st.output.write_line(None, &text, true)?,
                Some(r) => {
                    let target = eval_scalar(&r.target, st)?.format_value(st.ofmt);
                    st.output.write_line(Some((r.mode, &target)), &text, true)?;
                }
            }
            Ok(Flow::Normal)
        }
        Stmt::Filter(e) => {
            let v = eval_scalar(e, st)?;
            st.filter_result = strict_bool(&v);
            Ok(Flow::Normal)
        }
        Stmt::BareBool(e) => {
            let v = eval_scalar(e, st)?;
            st.filter_result = strict_bool(&v);
            Ok(Flow::Normal)
        }
        Stmt::Unset(targets) => {
            for t in targets {
                match t {
                    UnsetTarget::Local(slot) => st.locals.unset(*slot),
                    UnsetTarget::Oosvar { name, keys } => {
                        let keys_v = eval_keys(keys, st)?;
                        let mut path = Vec::with_capacity(keys_v.len() + 1);
                        path.push(Value::String(name.clone()));
                        path.extend(keys_v);
                        st.oosvars.remove(&path);
                    }
                    UnsetTarget::AllOosvars => st.oosvars.clear(),
                    UnsetTarget::Field(name) => st.record.remove(name),
                    UnsetTarget::IndirectField(e) => {
                        let name = eval_scalar(e, st)?.format_value(None);
                        st.record.remove(&name);
                    }
                    UnsetTarget::FullSrec => st.record.clear(),
                }
            }
            Ok(Flow::Normal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use mlr_core::{Colors, InferencePolicy, RecordFields};
    use mlr_cst::cst::{BinaryOp, FrameLayout, SlotInfo};

    use crate::context::RecordContext;
    use crate::output::OutputRouter;

    fn state<'a>(
        funcs: &'a IndexMap<String, Function>,
        subrs: &'a IndexMap<String, Function>,
        output: &'a mut OutputRouter,
    ) -> ExecState<'a> {
        ExecState::new(
            RecordFields::from_record(Record::new()),
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
    fn if_else_picks_branch() {
        let funcs = IndexMap::new();
        let subrs = IndexMap::new();
        let mut output = OutputRouter::new(false);
        let mut st = state(&funcs, &subrs, &mut output);
        let stmt = Stmt::If {
            arms: vec![(Expr::BoolLit(false), Block::default())],
            else_body: Some(Block {
                stmts: vec![Stmt::SrecAssign { name: "x".into(), value: Expr::IntLit(9) }],
                subframe_start: 0,
                subframe_len: 0,
            }),
        };
        exec_stmt(&stmt, &mut st).unwrap();
        assert_eq!(st.record.record.get("x"), Some("9"));
    }

    #[test]
    fn while_loop_breaks() {
        let funcs = IndexMap::new();
        let subrs = IndexMap::new();
        let mut output = OutputRouter::new(false);
        let mut st = state(&funcs, &subrs, &mut output);
        st.locals.enter_frame(&FrameLayout { slots: vec![SlotInfo { name: "i".into(), type_mask: mlr_core::TypeMask::INT }] });
        st.locals.assign_scalar(0, Value::Int(0)).unwrap();
        let body = Block {
            stmts: vec![
                Stmt::LocalAssign { slot: 0, keys: vec![], value: Expr::Binary(BinaryOp::Add, Box::new(Expr::Local { slot: 0, keys: vec![] }), Box::new(Expr::IntLit(1))) },
                Stmt::If {
                    arms: vec![(
                        Expr::Binary(BinaryOp::Ge, Box::new(Expr::Local { slot: 0, keys: vec![] }), Box::new(Expr::IntLit(3))),
                        Block { stmts: vec![Stmt::Break], subframe_start: 0, subframe_len: 0 },
                    )],
                    else_body: None,
                },
            ],
            subframe_start: 0,
            subframe_len: 0,
        };
        let stmt = Stmt::While { cond: Expr::BoolLit(true), body };
        exec_stmt(&stmt, &mut st).unwrap();
        assert!(matches!(st.locals.get_scalar(0), Value::Int(3)));
    }

    #[test]
    fn oosvar_assign_accumulates() {
        let funcs = IndexMap::new();
        let subrs = IndexMap::new();
        let mut output = OutputRouter::new(false);
        let mut st = state(&funcs, &subrs, &mut output);
        let stmt = Stmt::OosvarAssign {
            name: "sum".into(),
            keys: vec![Expr::StringLit("a".into())],
            value: Expr::IntLit(4),
        };
        exec_stmt(&stmt, &mut st).unwrap();
        assert!(matches!(
            st.oosvars.get_terminal(&[Value::String("sum".into()), Value::String("a".into())]),
            Some(Value::Int(4))
        ));
    }

    #[test]
    fn emit_flattens_oosvar() {
        let funcs = IndexMap::new();
        let subrs = IndexMap::new();
        let mut output = OutputRouter::new(false);
        let mut st = state(&funcs, &subrs, &mut output);
        st.oosvars.put_terminal(&[Value::String("s".into()), Value::String("a".into())], Value::Int(4));
        st.oosvars.put_terminal(&[Value::String("s".into()), Value::String("b".into())], Value::Int(2));
        let stmt = Stmt::Emit {
            targets: vec![EmitTarget::Oosvar { name: "s".into(), keys: vec![] }],
            with_prefix: false,
            all: false,
            top_names: vec!["g".into()],
            redirect: None,
        };
        exec_stmt(&stmt, &mut st).unwrap();
        assert_eq!(st.emitted.len(), 2);
        assert_eq!(st.emitted[0].get("g"), Some("a"));
        assert_eq!(st.emitted[0].get("s"), Some("4"));
    }

    #[test]
    fn unset_clears_oosvar_without_pruning_ancestor() {
        let funcs = IndexMap::new();
        let subrs = IndexMap::new();
        let mut output = OutputRouter::new(false);
        let mut st = state(&funcs, &subrs, &mut output);
        st.oosvars.put_terminal(&[Value::String("s".into()), Value::String("a".into())], Value::Int(1));
        let stmt = Stmt::Unset(vec![UnsetTarget::Oosvar { name: "s".into(), keys: vec![Expr::StringLit("a".into())] }]);
        exec_stmt(&stmt, &mut st).unwrap();
        assert!(st.oosvars.get_terminal(&[Value::String("s".into()), Value::String("a".into())]).is_none());
    }

    #[test]
    fn dump_value_plain_has_no_escape_codes() {
        let mut m = MultiLevelMap::new();
        m.put_terminal(&[Value::String("a".into())], Value::Int(1));
        let text = dump_value(&m, None, Colors::OFF);
        assert_eq!(text, "{\"a\":1}");
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn dump_value_colored_wraps_keys_and_strings() {
        let mut m = MultiLevelMap::new();
        m.put_terminal(&[Value::String("a".into())], Value::String("x".into()));
        let text = dump_value(&m, None, Colors::ON);
        assert!(text.contains(Colors::ON.blue));
        assert!(text.contains(Colors::ON.green));
        assert!(text.contains(Colors::ON.reset));
    }
}
