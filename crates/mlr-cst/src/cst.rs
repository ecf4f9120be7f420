//! The validated, executable concrete syntax tree. Built once from an
//! [`crate::ast::AstProgram`] by [`crate::build::build_program`]; immutable
//! thereafter — execution mutates only runtime state, never the tree.

use indexmap::IndexMap;
use mlr_core::TypeMask;

pub use crate::ast::{BinaryOp, ContextVar, UnaryOp};

/// A function or subroutine's fixed frame layout, precomputed at build
/// time — once fixed, slot indices never change for the life of the
/// program.
#[derive(Debug, Clone, Default)]
pub struct FrameLayout {
    pub slots: Vec<SlotInfo>,
}

impl FrameLayout {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SlotInfo {
    pub name: String,
    pub type_mask: TypeMask,
}

/// A compound statement's body, plus the number of frame-relative slots
/// (a "sub-frame") owned by this block scope.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub subframe_start: u32,
    pub subframe_len: u32,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub param_slots: Vec<u32>,
    pub frame: FrameLayout,
    pub body: Block,
    pub return_mask: Option<TypeMask>,
    pub is_subroutine: bool,
}

/// A top-level `begin`/`end` block paired with the frame layout its own
/// locals were declared against (each `begin`/`end` item gets an
/// independent implicit frame, separate from `main_frame`).
#[derive(Debug, Clone)]
pub struct TopBlock {
    pub frame: FrameLayout,
    pub block: Block,
}

#[derive(Debug, Clone)]
pub struct Program {
    pub begin_blocks: Vec<TopBlock>,
    pub end_blocks: Vec<TopBlock>,
    pub functions: IndexMap<String, Function>,
    pub subroutines: IndexMap<String, Function>,
    pub main_frame: FrameLayout,
    pub main_block: Block,
    /// Set when building a `filter` program: the CST builder has already
    /// checked the last main-block statement is a bare boolean expression.
    pub is_filter: bool,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    SrecAssign { name: String, value: Expr },
    IndirectSrecAssign { name_expr: Expr, value: Expr },
    OosvarAssign { name: String, keys: Vec<Expr>, value: Expr },
    OosvarFromFullSrec { name: String, keys: Vec<Expr> },
    FullSrecFromOosvar { name: String, keys: Vec<Expr> },
    LocalDecl { slot: u32, type_mask: TypeMask, value: Option<Expr> },
    MapDecl { slot: u32 },
    LocalAssign { slot: u32, keys: Vec<Expr>, value: Expr },
    EnvAssign { name_expr: Expr, value: Expr },

    If { arms: Vec<(Expr, Block)>, else_body: Option<Block> },
    While { cond: Expr, body: Block },
    DoWhile { body: Block, cond: Expr },
    ForSrec { key_slot: Option<u32>, val_slot: u32, body: Block },
    ForOosvar { key_slots: Vec<u32>, val_slot: u32, name: String, keys: Vec<Expr>, body: Block },
    ForLocalMap { key_slots: Vec<u32>, val_slot: u32, local_slot: u32, keys: Vec<Expr>, body: Block },
    TripleFor { init: Vec<Stmt>, cond: Expr, update: Vec<Stmt>, body: Block },
    Break,
    Continue,
    ReturnValue(Expr),
    ReturnVoid,

    CallSubr { name: String, args: Vec<Expr> },

    Emit {
        targets: Vec<EmitTarget>,
        with_prefix: bool,
        all: bool,
        top_names: Vec<String>,
        redirect: Option<Redirect>,
    },
    Emitf { names: Vec<String>, redirect: Option<Redirect> },
    Tee { redirect: Redirect },
    Print { value: Option<Expr>, trailing_newline: bool, redirect: Option<Redirect> },
    Dump { redirect: Option<Redirect> },

    Filter(Expr),
    BareBool(Expr),
    Unset(Vec<UnsetTarget>),
}

#[derive(Debug, Clone)]
pub enum EmitTarget {
    Oosvar { name: String, keys: Vec<Expr> },
    Local { slot: u32, keys: Vec<Expr> },
}

#[derive(Debug, Clone, Copy)]
pub enum RedirectMode {
    Write,
    Append,
    Pipe,
}

#[derive(Debug, Clone)]
pub struct Redirect {
    pub mode: RedirectMode,
    pub target: Expr,
}

#[derive(Debug, Clone)]
pub enum UnsetTarget {
    Local(u32),
    Oosvar { name: String, keys: Vec<Expr> },
    AllOosvars,
    Field(String),
    IndirectField(Expr),
    FullSrec,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    BoolLit(bool),
    Context(ContextVar),
    Field(String),
    IndirectField(Box<Expr>),
    FullSrec,
    Oosvar { name: String, keys: Vec<Expr> },
    FullOosvar,
    /// `keys` empty means a scalar local reference; non-empty addresses a
    /// keypath into a local map variable's `MultiLevelMap`.
    Local { slot: u32, keys: Vec<Expr> },
    Env(Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call { name: String, args: Vec<Expr> },
}
