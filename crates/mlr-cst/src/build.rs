//! Lowers an [`AstProgram`] into a validated [`Program`], running every
//! build-time check (scope rules, break/continue-in-loop, filter-must-
//! end-bare-bool, and the rest) while precomputing [`FrameLayout`]s for
//! the [`mlr_eval`]-side `LocalStack`. Function/subroutine callsites are
//! resolved in a second pass, after every definition in the program has
//! been collected, so call order in the source text doesn't matter.

use std::collections::HashMap;

use indexmap::IndexMap;
use mlr_core::{Diagnostic, Diagnostics, Span, TypeMask};

use crate::ast::*;
use crate::cst::*;
use crate::error::CstError;

struct FuncSig {
    param_masks: Vec<TypeMask>,
    return_mask: Option<TypeMask>,
    is_subroutine: bool,
}

/// Where we are while lowering, for the scope-sensitive validations below.
#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    TopLevel,
    Begin,
    End,
    Func,
    Subr,
}

struct FrameBuilder {
    slots: Vec<SlotInfo>,
    scopes: Vec<HashMap<String, u32>>,
}

impl FrameBuilder {
    fn new() -> Self {
        Self { slots: Vec::new(), scopes: vec![HashMap::new()] }
    }

    fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pops the innermost scope, returning (start, len) of the sub-frame it
    /// occupied.
    fn exit_scope(&mut self, start: u32) -> (u32, u32) {
        let scope = self.scopes.pop().expect("scope stack underflow");
        (start, scope.len() as u32)
    }

    fn declare(&mut self, name: &str, mask: TypeMask) -> u32 {
        let slot = self.slots.len() as u32;
        self.slots.push(SlotInfo { name: name.to_string(), type_mask: mask });
        self.scopes.last_mut().unwrap().insert(name.to_string(), slot);
        slot
    }

    fn lookup(&self, name: &str) -> Option<(u32, TypeMask)> {
        for scope in self.scopes.iter().rev() {
            if let Some(&slot) = scope.get(name) {
                return Some((slot, self.slots[slot as usize].type_mask));
            }
        }
        None
    }

    fn into_layout(self) -> FrameLayout {
        FrameLayout { slots: self.slots }
    }
}

struct Ctx<'a> {
    block_kind: BlockKind,
    loop_depth: u32,
    func_sigs: &'a IndexMap<String, FuncSig>,
    diags: &'a mut Diagnostics,
}

pub fn build_program(ast: AstProgram, is_filter: bool) -> Result<(Program, Diagnostics), CstError> {
    let mut diags = Diagnostics::new();
    let mut func_sigs: IndexMap<String, FuncSig> = IndexMap::new();

    // Pass 1: collect signatures so callsites resolve regardless of
    // definition order.
    for item in &ast.items {
        let (table_name, def, is_subr) = match item {
            AstTopLevel::Func(def) => ("function", def, false),
            AstTopLevel::Subr(def) => ("subroutine", def, true),
            _ => continue,
        };
        if func_sigs.contains_key(&def.name) {
            return Err(CstError::DuplicateDefinition(def.name.clone()));
        }
        let _ = table_name;
        func_sigs.insert(
            def.name.clone(),
            FuncSig {
                param_masks: def.params.iter().map(|p| mask_of(p.type_mask)).collect(),
                return_mask: def.return_mask.map(mask_of),
                is_subroutine: is_subr,
            },
        );
    }

    let mut begin_blocks = Vec::new();
    let mut end_blocks = Vec::new();
    let mut functions = IndexMap::new();
    let mut subroutines = IndexMap::new();
    let mut main_frame_builder = FrameBuilder::new();
    let mut main_stmts = Vec::new();

    for item in &ast.items {
        match item {
            AstTopLevel::Begin { body, .. } => {
                let mut fb = FrameBuilder::new();
                let mut ctx = Ctx { block_kind: BlockKind::Begin, loop_depth: 0, func_sigs: &func_sigs, diags: &mut diags };
                let block = lower_block(body, &mut fb, &mut ctx);
                begin_blocks.push(TopBlock { frame: fb.into_layout(), block });
            }
            AstTopLevel::End { body, .. } => {
                let mut fb = FrameBuilder::new();
                let mut ctx = Ctx { block_kind: BlockKind::End, loop_depth: 0, func_sigs: &func_sigs, diags: &mut diags };
                let block = lower_block(body, &mut fb, &mut ctx);
                end_blocks.push(TopBlock { frame: fb.into_layout(), block });
            }
            AstTopLevel::Func(def) => {
                let (name, f) = lower_funcdef(def, false, &func_sigs, &mut diags);
                functions.insert(name, f);
            }
            AstTopLevel::Subr(def) => {
                let (name, f) = lower_funcdef(def, true, &func_sigs, &mut diags);
                subroutines.insert(name, f);
            }
            AstTopLevel::Main(stmt) => {
                let mut ctx = Ctx { block_kind: BlockKind::TopLevel, loop_depth: 0, func_sigs: &func_sigs, diags: &mut diags };
                main_stmts.push(lower_stmt(stmt, &mut main_frame_builder, &mut ctx));
            }
        }
    }

    let main_len = main_frame_builder.slots.len() as u32;
    let main_frame = main_frame_builder.into_layout();
    let main_block = Block { stmts: main_stmts, subframe_start: 0, subframe_len: main_len };

    if is_filter {
        match main_block.stmts.last() {
            Some(Stmt::BareBool(_)) => {}
            _ => diags.push(Diagnostic::error(
                Span::default(),
                "the final statement of a filter program must be a bare boolean expression",
            )),
        }
    }

    let program = Program {
        begin_blocks,
        end_blocks,
        functions,
        subroutines,
        main_frame,
        main_block,
        is_filter,
    };

    if diags.has_errors() {
        return Err(CstError::Invalid(diags));
    }
    Ok((program, diags))
}

fn mask_of(spec: TypeMaskSpec) -> TypeMask {
    match spec {
        TypeMaskSpec::Any => TypeMask::ANY,
        TypeMaskSpec::Int => TypeMask::INT,
        TypeMaskSpec::Float => TypeMask::FLOAT,
        TypeMaskSpec::Num => TypeMask::NUM,
        TypeMaskSpec::Bool => TypeMask::BOOL,
        TypeMaskSpec::String => TypeMask::STRING,
        TypeMaskSpec::Map => TypeMask::MAP,
    }
}

fn lower_funcdef(
    def: &AstFuncDef,
    is_subr: bool,
    func_sigs: &IndexMap<String, FuncSig>,
    diags: &mut Diagnostics,
) -> (String, Function) {
    let mut fb = FrameBuilder::new();
    let param_slots = def
        .params
        .iter()
        .map(|p| fb.declare(&p.name, mask_of(p.type_mask)))
        .collect();
    let mut ctx = Ctx {
        block_kind: if is_subr { BlockKind::Subr } else { BlockKind::Func },
        loop_depth: 0,
        func_sigs,
        diags,
    };
    let body = lower_block(&def.body, &mut fb, &mut ctx);
    let frame = fb.into_layout();
    (
        def.name.clone(),
        Function {
            name: def.name.clone(),
            param_slots,
            frame,
            body,
            return_mask: def.return_mask.map(mask_of),
            is_subroutine: is_subr,
        },
    )
}

fn lower_block(stmts: &[AstStmt], fb: &mut FrameBuilder, ctx: &mut Ctx) -> Block {
    let start = fb.slots.len() as u32;
    fb.enter_scope();
    let lowered: Vec<Stmt> = stmts.iter().map(|s| lower_stmt(s, fb, ctx)).collect();
    let (start, len) = fb.exit_scope(start);
    Block { stmts: lowered, subframe_start: start, subframe_len: len }
}

fn deny(ctx: &mut Ctx, span: Span, msg: impl Into<String>) {
    ctx.diags.push(Diagnostic::error(span, msg));
}

fn lower_stmt(stmt: &AstStmt, fb: &mut FrameBuilder, ctx: &mut Ctx) -> Stmt {
    let forbid_srec = |ctx: &mut Ctx, span: Span| {
        if matches!(ctx.block_kind, BlockKind::Begin | BlockKind::End) {
            deny(ctx, span, "$field access is not allowed inside begin/end blocks");
        }
    };
    let forbid_in_func = |ctx: &mut Ctx, span: Span, what: &str| {
        if ctx.block_kind == BlockKind::Func {
            deny(ctx, span, format!("{what} is not allowed inside a func body"));
        }
    };

    match stmt {
        AstStmt::SrecAssign { name, value, span } => {
            forbid_srec(ctx, *span);
            Stmt::SrecAssign { name: name.clone(), value: lower_expr(value, fb, ctx) }
        }
        AstStmt::IndirectSrecAssign { name_expr, value, span } => {
            forbid_srec(ctx, *span);
            Stmt::IndirectSrecAssign {
                name_expr: lower_expr(name_expr, fb, ctx),
                value: lower_expr(value, fb, ctx),
            }
        }
        AstStmt::OosvarAssign { name, keys, value, .. } => Stmt::OosvarAssign {
            name: name.clone(),
            keys: lower_exprs(keys, fb, ctx),
            value: lower_expr(value, fb, ctx),
        },
        AstStmt::OosvarFromFullSrec { name, keys, span } => {
            forbid_srec(ctx, *span);
            Stmt::OosvarFromFullSrec { name: name.clone(), keys: lower_exprs(keys, fb, ctx) }
        }
        AstStmt::FullSrecFromOosvar { name, keys, span } => {
            forbid_srec(ctx, *span);
            Stmt::FullSrecFromOosvar { name: name.clone(), keys: lower_exprs(keys, fb, ctx) }
        }
        AstStmt::LocalDecl { name, type_mask, value, .. } => {
            let mask = mask_of(*type_mask);
            let value = value.as_ref().map(|v| lower_expr(v, fb, ctx));
            let slot = fb.declare(name, mask);
            Stmt::LocalDecl { slot, type_mask: mask, value }
        }
        AstStmt::MapDecl { name, .. } => {
            let slot = fb.declare(name, TypeMask::MAP);
            Stmt::MapDecl { slot }
        }
        AstStmt::LocalAssign { name, keys, value, span } => {
            let keys = lower_exprs(keys, fb, ctx);
            let value = lower_expr(value, fb, ctx);
            let slot = resolve_local(fb, ctx, name, *span);
            Stmt::LocalAssign { slot, keys, value }
        }
        AstStmt::EnvAssign { name_expr, value, .. } => Stmt::EnvAssign {
            name_expr: lower_expr(name_expr, fb, ctx),
            value: lower_expr(value, fb, ctx),
        },

        AstStmt::If { arms, else_body, .. } => {
            let arms = arms
                .iter()
                .map(|(cond, body)| (lower_expr(cond, fb, ctx), lower_block(body, fb, ctx)))
                .collect();
            let else_body = else_body.as_ref().map(|b| lower_block(b, fb, ctx));
            Stmt::If { arms, else_body }
        }
        AstStmt::While { cond, body, .. } => {
            let cond = lower_expr(cond, fb, ctx);
            ctx.loop_depth += 1;
            let body = lower_block(body, fb, ctx);
            ctx.loop_depth -= 1;
            Stmt::While { cond, body }
        }
        AstStmt::DoWhile { body, cond, .. } => {
            ctx.loop_depth += 1;
            let body = lower_block(body, fb, ctx);
            ctx.loop_depth -= 1;
            let cond = lower_expr(cond, fb, ctx);
            Stmt::DoWhile { body, cond }
        }
        AstStmt::ForSrec { key_name, val_name, body, span } => {
            forbid_srec(ctx, *span);
            if let Some(k) = key_name {
                if k == val_name {
                    deny(ctx, *span, "for (k, v in $*): k and v must have distinct names");
                }
            }
            let start = fb.slots.len() as u32;
            fb.enter_scope();
            let key_slot = key_name.as_ref().map(|k| fb.declare(k, TypeMask::STRING));
            let val_slot = fb.declare(val_name, TypeMask::ANY);
            ctx.loop_depth += 1;
            let inner_stmts: Vec<Stmt> = body.iter().map(|s| lower_stmt(s, fb, ctx)).collect();
            ctx.loop_depth -= 1;
            let (start, len) = fb.exit_scope(start);
            Stmt::ForSrec {
                key_slot,
                val_slot,
                body: Block { stmts: inner_stmts, subframe_start: start, subframe_len: len },
            }
        }
        AstStmt::ForOosvar { key_names, val_name, name, keys, body, span } => {
            check_distinct_binders(ctx, key_names, val_name, *span);
            let keys = lower_exprs(keys, fb, ctx);
            let start = fb.slots.len() as u32;
            fb.enter_scope();
            let key_slots = key_names.iter().map(|k| fb.declare(k, TypeMask::ANY)).collect();
            let val_slot = fb.declare(val_name, TypeMask::ANY);
            ctx.loop_depth += 1;
            let inner_stmts: Vec<Stmt> = body.iter().map(|s| lower_stmt(s, fb, ctx)).collect();
            ctx.loop_depth -= 1;
            let (start, len) = fb.exit_scope(start);
            Stmt::ForOosvar {
                key_slots,
                val_slot,
                name: name.clone(),
                keys,
                body: Block { stmts: inner_stmts, subframe_start: start, subframe_len: len },
            }
        }
        AstStmt::ForLocalMap { key_names, val_name, local_name, keys, body, span } => {
            check_distinct_binders(ctx, key_names, val_name, *span);
            let keys = lower_exprs(keys, fb, ctx);
            let local_slot = resolve_local(fb, ctx, local_name, *span);
            let start = fb.slots.len() as u32;
            fb.enter_scope();
            let key_slots = key_names.iter().map(|k| fb.declare(k, TypeMask::ANY)).collect();
            let val_slot = fb.declare(val_name, TypeMask::ANY);
            ctx.loop_depth += 1;
            let inner_stmts: Vec<Stmt> = body.iter().map(|s| lower_stmt(s, fb, ctx)).collect();
            ctx.loop_depth -= 1;
            let (start, len) = fb.exit_scope(start);
            Stmt::ForLocalMap {
                key_slots,
                val_slot,
                local_slot,
                keys,
                body: Block { stmts: inner_stmts, subframe_start: start, subframe_len: len },
            }
        }
        AstStmt::TripleFor { init, cond, update, body, .. } => {
            let start = fb.slots.len() as u32;
            fb.enter_scope();
            let init: Vec<Stmt> = init.iter().map(|s| lower_stmt(s, fb, ctx)).collect();
            let cond = lower_expr(cond, fb, ctx);
            let update: Vec<Stmt> = update.iter().map(|s| lower_stmt(s, fb, ctx)).collect();
            ctx.loop_depth += 1;
            // Triple-for has no block scope of its own beyond init/update;
            // the body still gets one so its locals don't leak.
            let body = lower_block(body, fb, ctx);
            ctx.loop_depth -= 1;
            let (_, _) = fb.exit_scope(start);
            Stmt::TripleFor { init, cond, update, body }
        }
        AstStmt::Break(span) => {
            if ctx.loop_depth == 0 {
                deny(ctx, *span, "break outside of a loop");
            }
            Stmt::Break
        }
        AstStmt::Continue(span) => {
            if ctx.loop_depth == 0 {
                deny(ctx, *span, "continue outside of a loop");
            }
            Stmt::Continue
        }
        AstStmt::ReturnValue(expr, span) => {
            if ctx.block_kind != BlockKind::Func {
                deny(ctx, *span, "return <value> is only allowed inside a func");
            }
            Stmt::ReturnValue(lower_expr(expr, fb, ctx))
        }
        AstStmt::ReturnVoid(span) => {
            if ctx.block_kind != BlockKind::Subr {
                deny(ctx, *span, "return (void) is only allowed inside a subr");
            }
            Stmt::ReturnVoid
        }

        AstStmt::CallSubr { name, args, span } => {
            match ctx.func_sigs.get(name) {
                Some(sig) if sig.is_subroutine => {
                    if sig.param_masks.len() != args.len() {
                        deny(ctx, *span, format!("subroutine `{name}` called with wrong arity"));
                    }
                }
                Some(_) => deny(ctx, *span, format!("`{name}` is a function, not a subroutine")),
                None => deny(ctx, *span, format!("call to undefined subroutine `{name}`")),
            }
            Stmt::CallSubr { name: name.clone(), args: lower_exprs(args, fb, ctx) }
        }

        AstStmt::Emit { targets, with_prefix, all, top_names, redirect, span } => {
            forbid_in_func(ctx, *span, "emit");
            let targets = targets
                .iter()
                .map(|t| match t {
                    AstEmitTarget::Oosvar { name, keys } => {
                        EmitTarget::Oosvar { name: name.clone(), keys: lower_exprs(keys, fb, ctx) }
                    }
                    AstEmitTarget::Local { name, keys } => EmitTarget::Local {
                        slot: resolve_local(fb, ctx, name, *span),
                        keys: lower_exprs(keys, fb, ctx),
                    },
                })
                .collect();
            let redirect = redirect.as_ref().map(|r| lower_redirect(r, fb, ctx));
            Stmt::Emit { targets, with_prefix: *with_prefix, all: *all, top_names: top_names.clone(), redirect }
        }
        AstStmt::Emitf { names, redirect, span } => {
            forbid_in_func(ctx, *span, "emitf");
            let redirect = redirect.as_ref().map(|r| lower_redirect(r, fb, ctx));
            Stmt::Emitf { names: names.clone(), redirect }
        }
        AstStmt::Tee { redirect, span } => {
            forbid_in_func(ctx, *span, "tee");
            Stmt::Tee { redirect: lower_redirect(redirect, fb, ctx) }
        }
        AstStmt::Print { value, trailing_newline, redirect, .. } => Stmt::Print {
            value: value.as_ref().map(|v| lower_expr(v, fb, ctx)),
            trailing_newline: *trailing_newline,
            redirect: redirect.as_ref().map(|r| lower_redirect(r, fb, ctx)),
        },
        AstStmt::Dump { redirect, .. } => {
            Stmt::Dump { redirect: redirect.as_ref().map(|r| lower_redirect(r, fb, ctx)) }
        }

        AstStmt::Filter(expr, span) => {
            forbid_in_func(ctx, *span, "filter");
            Stmt::Filter(lower_expr(expr, fb, ctx))
        }
        AstStmt::BareBool(expr, _) => Stmt::BareBool(lower_expr(expr, fb, ctx)),
        AstStmt::Unset(targets, span) => {
            let targets = targets
                .iter()
                .map(|t| lower_unset_target(t, fb, ctx, *span))
                .collect();
            Stmt::Unset(targets)
        }
    }
}

fn check_distinct_binders(ctx: &mut Ctx, key_names: &[String], val_name: &str, span: Span) {
    if key_names.iter().any(|k| k == val_name) {
        deny(ctx, span, "loop binder names must be distinct");
    }
    for i in 0..key_names.len() {
        for j in (i + 1)..key_names.len() {
            if key_names[i] == key_names[j] {
                deny(ctx, span, "loop binder names must be distinct");
            }
        }
    }
}

fn lower_unset_target(t: &AstUnsetTarget, fb: &mut FrameBuilder, ctx: &mut Ctx, span: Span) -> UnsetTarget {
    match t {
        AstUnsetTarget::Local(name) => UnsetTarget::Local(resolve_local(fb, ctx, name, span)),
        AstUnsetTarget::Oosvar { name, keys } => {
            UnsetTarget::Oosvar { name: name.clone(), keys: lower_exprs(keys, fb, ctx) }
        }
        AstUnsetTarget::AllOosvars => UnsetTarget::AllOosvars,
        AstUnsetTarget::Field(name) => {
            if ctx.block_kind == BlockKind::Func {
                deny(ctx, span, "unset $field is not allowed inside a func body");
            }
            UnsetTarget::Field(name.clone())
        }
        AstUnsetTarget::IndirectField(e) => {
            if ctx.block_kind == BlockKind::Func {
                deny(ctx, span, "unset $[...] is not allowed inside a func body");
            }
            UnsetTarget::IndirectField(lower_expr(e, fb, ctx))
        }
        AstUnsetTarget::FullSrec => {
            if ctx.block_kind == BlockKind::Func {
                deny(ctx, span, "unset $* is not allowed inside a func body");
            }
            UnsetTarget::FullSrec
        }
    }
}

fn lower_redirect(r: &AstRedirect, fb: &mut FrameBuilder, ctx: &mut Ctx) -> Redirect {
    let mode = match r.mode {
        AstRedirectMode::Write => RedirectMode::Write,
        AstRedirectMode::Append => RedirectMode::Append,
        AstRedirectMode::Pipe => RedirectMode::Pipe,
    };
    Redirect { mode, target: lower_expr(&r.target, fb, ctx) }
}

fn lower_exprs(exprs: &[AstExpr], fb: &mut FrameBuilder, ctx: &mut Ctx) -> Vec<Expr> {
    exprs.iter().map(|e| lower_expr(e, fb, ctx)).collect()
}

fn resolve_local(fb: &FrameBuilder, ctx: &mut Ctx, name: &str, span: Span) -> u32 {
    match fb.lookup(name) {
        Some((slot, _)) => slot,
        None => {
            deny(ctx, span, format!("undeclared local variable `{name}`"));
            u32::MAX
        }
    }
}

fn lower_expr(expr: &AstExpr, fb: &mut FrameBuilder, ctx: &mut Ctx) -> Expr {
    match expr {
        AstExpr::IntLit(i) => Expr::IntLit(*i),
        AstExpr::FloatLit(f) => Expr::FloatLit(*f),
        AstExpr::StringLit(s) => Expr::StringLit(s.clone()),
        AstExpr::BoolLit(b) => Expr::BoolLit(*b),
        AstExpr::Context(c) => Expr::Context(*c),
        AstExpr::Field(name) => {
            if matches!(ctx.block_kind, BlockKind::Begin | BlockKind::End) {
                deny(ctx, Span::default(), "$field access is not allowed inside begin/end blocks");
            }
            Expr::Field(name.clone())
        }
        AstExpr::IndirectField(e) => {
            if matches!(ctx.block_kind, BlockKind::Begin | BlockKind::End) {
                deny(ctx, Span::default(), "$field access is not allowed inside begin/end blocks");
            }
            Expr::IndirectField(Box::new(lower_expr(e, fb, ctx)))
        }
        AstExpr::FullSrec => {
            if matches!(ctx.block_kind, BlockKind::Begin | BlockKind::End) {
                deny(ctx, Span::default(), "$* is not allowed inside begin/end blocks");
            }
            if ctx.block_kind == BlockKind::Func {
                deny(ctx, Span::default(), "$* is not allowed inside a func body");
            }
            Expr::FullSrec
        }
        AstExpr::Oosvar { name, keys } => {
            Expr::Oosvar { name: name.clone(), keys: lower_exprs(keys, fb, ctx) }
        }
        AstExpr::FullOosvar => Expr::FullOosvar,
        AstExpr::Local { name, keys } => {
            let keys = lower_exprs(keys, fb, ctx);
            let slot = resolve_local(fb, ctx, name, Span::default());
            Expr::Local { slot, keys }
        }
        AstExpr::Env(e) => Expr::Env(Box::new(lower_expr(e, fb, ctx))),
        AstExpr::Unary(op, e) => Expr::Unary(*op, Box::new(lower_expr(e, fb, ctx))),
        AstExpr::Binary(op, a, b) => {
            Expr::Binary(*op, Box::new(lower_expr(a, fb, ctx)), Box::new(lower_expr(b, fb, ctx)))
        }
        AstExpr::Ternary(c, t, e) => Expr::Ternary(
            Box::new(lower_expr(c, fb, ctx)),
            Box::new(lower_expr(t, fb, ctx)),
            Box::new(lower_expr(e, fb, ctx)),
        ),
        AstExpr::Call { name, args } => {
            match ctx.func_sigs.get(name) {
                Some(sig) if !sig.is_subroutine => {
                    if sig.param_masks.len() != args.len() {
                        deny(ctx, Span::default(), format!("function `{name}` called with wrong arity"));
                    }
                }
                Some(_) => deny(ctx, Span::default(), format!("`{name}` is a subroutine, not a function")),
                None => {
                    // Built-in functions (string/math/etc.) are resolved at
                    // evaluation time by mlr-eval's function registry, not
                    // here; an unresolved name is only an error if it also
                    // fails that lookup at runtime.
                }
            }
            Expr::Call { name: name.clone(), args: lower_exprs(args, fb, ctx) }
        }
    }
}
