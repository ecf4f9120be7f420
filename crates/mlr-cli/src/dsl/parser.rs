//! Recursive-descent parser: DSL program text -> [`mlr_cst::ast::AstProgram`].
//!
//! Covers every statement and expression form the DSL supports. Built
//! directly against the shape of `AstStmt`/`AstExpr` in `mlr_cst::ast` —
//! this parser exists only to feed that contract; it is CLI glue, not
//! core.

use mlr_core::Span;
use mlr_cst::ast::*;

use super::lexer::{LexError, Lexer, Sym, Tok, Token};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("parse error at byte {0}: {1}")]
    Syntax(u32, String),
}

pub fn parse_program(src: &str) -> Result<AstProgram, ParseError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut p = Parser { tokens, pos: 0 };
    p.parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek_at(&self, n: usize) -> Tok {
        self.tokens.get(self.pos + n).map(|t| t.tok.clone()).unwrap_or(Tok::Eof)
    }

    fn span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn bump(&mut self) -> Tok {
        let t = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError::Syntax(self.span().start, msg.into())
    }

    fn is_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Tok::Ident(s) if s == name)
    }

    fn is_sym(&self, sym: Sym) -> bool {
        matches!(self.peek(), Tok::Sym(s) if *s == sym)
    }

    fn eat_ident(&mut self, name: &str) -> PResult<()> {
        if self.is_ident(name) {
            self.bump();
            Ok(())
        } else {
            Err(self.err(format!("expected `{name}`")))
        }
    }

    fn eat_sym(&mut self, sym: Sym) -> PResult<()> {
        if self.is_sym(sym) {
            self.bump();
            Ok(())
        } else {
            Err(self.err(format!("expected {sym:?}")))
        }
    }

    fn take_ident_name(&mut self) -> PResult<String> {
        match self.bump() {
            Tok::Ident(s) => Ok(s),
            other => Err(ParseError::Syntax(self.span().start, format!("expected identifier, found {other:?}"))),
        }
    }

    // ---- top level ----

    fn parse_program(&mut self) -> PResult<AstProgram> {
        let mut items = Vec::new();
        while !matches!(self.peek(), Tok::Eof) {
            items.push(self.parse_item()?);
        }
        Ok(AstProgram { items })
    }

    fn parse_item(&mut self) -> PResult<AstTopLevel> {
        if self.is_ident("begin") {
            let span = self.span();
            self.bump();
            let body = self.parse_brace_block()?;
            return Ok(AstTopLevel::Begin { body, span });
        }
        if self.is_ident("end") {
            let span = self.span();
            self.bump();
            let body = self.parse_brace_block()?;
            return Ok(AstTopLevel::End { body, span });
        }
        if self.is_ident("func") {
            return Ok(AstTopLevel::Func(self.parse_funcdef()?));
        }
        if self.is_ident("subr") {
            return Ok(AstTopLevel::Subr(self.parse_funcdef()?));
        }
        let stmt = self.parse_stmt()?;
        Ok(AstTopLevel::Main(stmt))
    }

    fn parse_brace_block(&mut self) -> PResult<Vec<AstStmt>> {
        self.eat_sym(Sym::LBrace)?;
        let mut stmts = Vec::new();
        while !self.is_sym(Sym::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.eat_sym(Sym::RBrace)?;
        Ok(stmts)
    }

    fn parse_funcdef(&mut self) -> PResult<AstFuncDef> {
        let span = self.span();
        self.bump(); // func|subr
        let name = self.take_ident_name()?;
        self.eat_sym(Sym::LParen)?;
        let mut params = Vec::new();
        while !self.is_sym(Sym::RParen) {
            let type_mask = self.try_parse_type_keyword().unwrap_or(TypeMaskSpec::Any);
            let pname = self.take_ident_name()?;
            params.push(AstParam { name: pname, type_mask });
            if self.is_sym(Sym::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.eat_sym(Sym::RParen)?;
        let return_mask = if self.is_sym(Sym::Colon) {
            self.bump();
            Some(self.try_parse_type_keyword().ok_or_else(|| self.err("expected return type after `:`"))?)
        } else {
            None
        };
        let body = self.parse_brace_block()?;
        Ok(AstFuncDef { name, params, return_mask, body, span })
    }

    fn try_parse_type_keyword(&mut self) -> Option<TypeMaskSpec> {
        let name = match self.peek() {
            Tok::Ident(s) => s.clone(),
            _ => return None,
        };
        let mask = match name.as_str() {
            "var" => TypeMaskSpec::Any,
            "str" => TypeMaskSpec::String,
            "int" => TypeMaskSpec::Int,
            "float" => TypeMaskSpec::Float,
            "num" => TypeMaskSpec::Num,
            "bool" => TypeMaskSpec::Bool,
            "map" => TypeMaskSpec::Map,
            _ => return None,
        };
        // Only consume if followed by an identifier (a type keyword used
        // as a bare variable reference would otherwise be swallowed).
        if matches!(self.peek_at(1), Tok::Ident(_)) {
            self.bump();
            Some(mask)
        } else {
            None
        }
    }

    // ---- statements ----

    fn parse_stmt(&mut self) -> PResult<AstStmt> {
        if self.is_ident("if") {
            return self.parse_if();
        }
        if self.is_ident("while") {
            return self.parse_while();
        }
        if self.is_ident("do") {
            return self.parse_do_while();
        }
        if self.is_ident("for") {
            return self.parse_for();
        }
        if self.is_ident("break") {
            let span = self.span();
            self.bump();
            self.eat_sym(Sym::Semi)?;
            return Ok(AstStmt::Break(span));
        }
        if self.is_ident("continue") {
            let span = self.span();
            self.bump();
            self.eat_sym(Sym::Semi)?;
            return Ok(AstStmt::Continue(span));
        }
        if self.is_ident("return") {
            let span = self.span();
            self.bump();
            if self.is_sym(Sym::Semi) {
                self.bump();
                return Ok(AstStmt::ReturnVoid(span));
            }
            let e = self.parse_expr()?;
            self.eat_sym(Sym::Semi)?;
            return Ok(AstStmt::ReturnValue(e, span));
        }
        if self.is_ident("call") {
            let span = self.span();
            self.bump();
            let name = self.take_ident_name()?;
            self.eat_sym(Sym::LParen)?;
            let args = self.parse_expr_list(Sym::RParen)?;
            self.eat_sym(Sym::RParen)?;
            self.eat_sym(Sym::Semi)?;
            return Ok(AstStmt::CallSubr { name, args, span });
        }
        if self.is_ident("emit") || self.is_ident("emitp") {
            return self.parse_emit();
        }
        if self.is_ident("emitf") {
            return self.parse_emitf();
        }
        if self.is_ident("tee") {
            return self.parse_tee();
        }
        if self.is_ident("print") || self.is_ident("printn") {
            return self.parse_print();
        }
        if self.is_ident("dump") {
            return self.parse_dump();
        }
        if self.is_ident("filter") {
            let span = self.span();
            self.bump();
            let e = self.parse_expr()?;
            self.eat_sym(Sym::Semi)?;
            return Ok(AstStmt::Filter(e, span));
        }
        if self.is_ident("unset") {
            return self.parse_unset();
        }
        if self.is_ident("map") && matches!(self.peek_at(1), Tok::Ident(_)) {
            let span = self.span();
            self.bump();
            let name = self.take_ident_name()?;
            if self.is_sym(Sym::Assign) {
                self.bump();
                self.eat_sym(Sym::LBrace)?;
                self.eat_sym(Sym::RBrace)?;
            }
            self.eat_sym(Sym::Semi)?;
            return Ok(AstStmt::MapDecl { name, span });
        }
        if let Some(mask) = self.try_parse_type_keyword() {
            let span = self.span();
            let name = self.take_ident_name()?;
            let value = if self.is_sym(Sym::Assign) {
                self.bump();
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.eat_sym(Sym::Semi)?;
            return Ok(AstStmt::LocalDecl { name, type_mask: mask, value, span });
        }
        self.parse_assign_or_expr_stmt()
    }

    fn parse_if(&mut self) -> PResult<AstStmt> {
        let span = self.span();
        self.bump();
        let mut arms = Vec::new();
        self.eat_sym(Sym::LParen)?;
        let cond = self.parse_expr()?;
        self.eat_sym(Sym::RParen)?;
        let body = self.parse_brace_block()?;
        arms.push((cond, body));
        loop {
            if self.is_ident("elif") {
                self.bump();
                self.eat_sym(Sym::LParen)?;
                let cond = self.parse_expr()?;
                self.eat_sym(Sym::RParen)?;
                let body = self.parse_brace_block()?;
                arms.push((cond, body));
                continue;
            }
            break;
        }
        let else_body = if self.is_ident("else") {
            self.bump();
            Some(self.parse_brace_block()?)
        } else {
            None
        };
        Ok(AstStmt::If { arms, else_body, span })
    }

    fn parse_while(&mut self) -> PResult<AstStmt> {
        let span = self.span();
        self.bump();
        self.eat_sym(Sym::LParen)?;
        let cond = self.parse_expr()?;
        self.eat_sym(Sym::RParen)?;
        let body = self.parse_brace_block()?;
        Ok(AstStmt::While { cond, body, span })
    }

    fn parse_do_while(&mut self) -> PResult<AstStmt> {
        let span = self.span();
        self.bump();
        let body = self.parse_brace_block()?;
        self.eat_ident("while")?;
        self.eat_sym(Sym::LParen)?;
        let cond = self.parse_expr()?;
        self.eat_sym(Sym::RParen)?;
        self.eat_sym(Sym::Semi)?;
        Ok(AstStmt::DoWhile { body, cond, span })
    }

    /// Scans (without consuming) the token range of the parenthesized for()
    /// header to decide which of the for-loop forms follows; the only
    /// structural ambiguity is between init/cond/update (always
    /// `;`-separated at top level) and every `in`-based form (never
    /// `;`-separated).
    fn for_header_has_semi(&self) -> bool {
        let mut depth = 0i32;
        let mut i = self.pos;
        loop {
            match &self.tokens[i].tok {
                Tok::Sym(Sym::LParen) | Tok::Sym(Sym::LBracket) => depth += 1,
                Tok::Sym(Sym::RParen) if depth == 0 => return false,
                Tok::Sym(Sym::RParen) | Tok::Sym(Sym::RBracket) => depth -= 1,
                Tok::Sym(Sym::Semi) if depth == 0 => return true,
                Tok::Eof => return false,
                _ => {}
            }
            i += 1;
        }
    }

    fn parse_for(&mut self) -> PResult<AstStmt> {
        let span = self.span();
        self.bump();
        self.eat_sym(Sym::LParen)?;
        if self.for_header_has_semi() {
            let init = if self.is_sym(Sym::Semi) { Vec::new() } else { vec![self.parse_simple_stmt()?] };
            self.eat_sym(Sym::Semi)?;
            let cond = self.parse_expr()?;
            self.eat_sym(Sym::Semi)?;
            let update = if self.is_sym(Sym::RParen) { Vec::new() } else { vec![self.parse_simple_stmt()?] };
            self.eat_sym(Sym::RParen)?;
            let body = self.parse_brace_block()?;
            return Ok(AstStmt::TripleFor { init, cond, update, body, span });
        }

        if self.is_sym(Sym::LParen) {
            // Tuple-keyed form: for ((k1,...,kn), v in <target>)
            self.bump();
            let mut key_names = Vec::new();
            while !self.is_sym(Sym::RParen) {
                key_names.push(self.take_ident_name()?);
                if self.is_sym(Sym::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
            self.eat_sym(Sym::RParen)?;
            self.eat_sym(Sym::Comma)?;
            let val_name = self.take_ident_name()?;
            self.eat_ident("in")?;
            let stmt = self.parse_for_target(key_names, val_name, span)?;
            self.eat_sym(Sym::RParen)?;
            let body = self.parse_brace_block()?;
            return Ok(attach_for_body(stmt, body));
        }

        // Single-binder forms: `for (k in $*)`, `for (k, v in $*)`,
        // `for (k, v in @a[...])`, `for (k, v in localmap[...])`.
        let first = self.take_ident_name()?;
        if self.is_ident("in") {
            self.bump();
            if !self.is_sym(Sym::Dollar) {
                return Err(self.err("single-binder for requires `$*`"));
            }
            self.bump();
            self.eat_sym(Sym::Star)
                .map_err(|_| self.err("expected `*` after `$` in for-loop target"))?;
            self.eat_sym(Sym::RParen)?;
            let body = self.parse_brace_block()?;
            return Ok(AstStmt::ForSrec { key_name: None, val_name: first, body, span });
        }
        self.eat_sym(Sym::Comma)?;
        let val_name = self.take_ident_name()?;
        self.eat_ident("in")?;
        let stmt = self.parse_for_target(vec![first], val_name, span)?;
        self.eat_sym(Sym::RParen)?;
        let body = self.parse_brace_block()?;
        Ok(attach_for_body(stmt, body))
    }

    /// Parses the `in`-target of a for loop, returning a partially built
    /// statement (body filled in by the caller once the closing paren and
    /// braces are consumed, since the body itself needs the outer scope
    /// closed first in the single-key-name special case of `$*`).
    fn parse_for_target(&mut self, key_names: Vec<String>, val_name: String, span: Span) -> PResult<ForTargetStub> {
        if self.is_sym(Sym::Dollar) {
            self.bump();
            self.eat_sym(Sym::Star)?;
            if key_names.len() != 1 {
                return Err(self.err("for (k, v in $*) takes exactly one key binder"));
            }
            return Ok(ForTargetStub::Srec { key_name: key_names.into_iter().next(), val_name, span });
        }
        if self.is_sym(Sym::At) {
            self.bump();
            let name = self.take_ident_name()?;
            let keys = self.parse_bracket_keys()?;
            return Ok(ForTargetStub::Oosvar { key_names, val_name, name, keys, span });
        }
        let local_name = self.take_ident_name()?;
        let keys = self.parse_bracket_keys()?;
        Ok(ForTargetStub::Local { key_names, val_name, local_name, keys, span })
    }

    fn parse_bracket_keys(&mut self) -> PResult<Vec<AstExpr>> {
        let mut keys = Vec::new();
        while self.is_sym(Sym::LBracket) {
            self.bump();
            keys.push(self.parse_expr()?);
            self.eat_sym(Sym::RBracket)?;
        }
        Ok(keys)
    }

    /// A statement usable as a triple-for init/update clause: any
    /// assignment or declaration, without its own trailing `;` (the caller
    /// owns the separator).
    fn parse_simple_stmt(&mut self) -> PResult<AstStmt> {
        if let Some(mask) = self.try_parse_type_keyword() {
            let span = self.span();
            let name = self.take_ident_name()?;
            self.eat_sym(Sym::Assign)?;
            let value = self.parse_expr()?;
            return Ok(AstStmt::LocalDecl { name, type_mask: mask, value: Some(value), span });
        }
        self.parse_assign_stmt_no_semi()
    }

    fn parse_emit(&mut self) -> PResult<AstStmt> {
        let span = self.span();
        let with_prefix = self.is_ident("emitp");
        self.bump();
        let redirect = self.try_parse_redirect()?;
        if redirect.is_some() {
            self.eat_sym(Sym::Comma)?;
        }
        let (all, targets) = if self.is_ident("all") {
            self.bump();
            (true, Vec::new())
        } else if self.is_sym(Sym::At) && matches!(self.peek_at(1), Tok::Sym(Sym::Star)) {
            self.bump();
            self.bump();
            (true, Vec::new())
        } else if self.is_sym(Sym::LParen) {
            self.bump();
            let mut targets = Vec::new();
            while !self.is_sym(Sym::RParen) {
                targets.push(self.parse_emit_target()?);
                if self.is_sym(Sym::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
            self.eat_sym(Sym::RParen)?;
            (false, targets)
        } else {
            (false, vec![self.parse_emit_target()?])
        };
        let mut top_names = Vec::new();
        while self.is_sym(Sym::Comma) {
            self.bump();
            match self.bump() {
                Tok::Str(s) => top_names.push(s),
                other => return Err(ParseError::Syntax(self.span().start, format!("expected string in emit name list, found {other:?}"))),
            }
        }
        self.eat_sym(Sym::Semi)?;
        Ok(AstStmt::Emit { targets, with_prefix, all, top_names, redirect, span })
    }

    fn parse_emit_target(&mut self) -> PResult<AstEmitTarget> {
        if self.is_sym(Sym::At) {
            self.bump();
            let name = self.take_ident_name()?;
            let keys = self.parse_bracket_keys()?;
            return Ok(AstEmitTarget::Oosvar { name, keys });
        }
        let name = self.take_ident_name()?;
        let keys = self.parse_bracket_keys()?;
        Ok(AstEmitTarget::Local { name, keys })
    }

    fn parse_emitf(&mut self) -> PResult<AstStmt> {
        let span = self.span();
        self.bump();
        let redirect = self.try_parse_redirect()?;
        if redirect.is_some() {
            self.eat_sym(Sym::Comma)?;
        }
        let mut names = Vec::new();
        loop {
            self.eat_sym(Sym::At)?;
            names.push(self.take_ident_name()?);
            if self.is_sym(Sym::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.eat_sym(Sym::Semi)?;
        Ok(AstStmt::Emitf { names, redirect, span })
    }

    fn parse_tee(&mut self) -> PResult<AstStmt> {
        let span = self.span();
        self.bump();
        let redirect = self.try_parse_redirect()?.ok_or_else(|| self.err("`tee` requires a redirect target"))?;
        self.eat_sym(Sym::Comma)?;
        // `tee`'s payload is always `$*`; we parse and discard it since the
        // statement implicitly emits the whole current record (spec
        // §4.6.4 `tee > "file", $*`).
        self.eat_sym(Sym::Dollar)?;
        self.eat_sym(Sym::Star)?;
        self.eat_sym(Sym::Semi)?;
        Ok(AstStmt::Tee { redirect, span })
    }

    fn parse_print(&mut self) -> PResult<AstStmt> {
        let span = self.span();
        let trailing_newline = self.is_ident("print");
        self.bump();
        let redirect = self.try_parse_redirect()?;
        if redirect.is_some() && !self.is_sym(Sym::Semi) {
            self.eat_sym(Sym::Comma)?;
        }
        let value = if self.is_sym(Sym::Semi) { None } else { Some(self.parse_expr()?) };
        self.eat_sym(Sym::Semi)?;
        Ok(AstStmt::Print { value, trailing_newline, redirect, span })
    }

    fn parse_dump(&mut self) -> PResult<AstStmt> {
        let span = self.span();
        self.bump();
        let redirect = self.try_parse_redirect()?;
        self.eat_sym(Sym::Semi)?;
        Ok(AstStmt::Dump { redirect, span })
    }

    fn try_parse_redirect(&mut self) -> PResult<Option<AstRedirect>> {
        let mode = if self.is_sym(Sym::Append) {
            AstRedirectMode::Append
        } else if self.is_sym(Sym::Gt) {
            AstRedirectMode::Write
        } else if self.is_sym(Sym::Pipe) {
            AstRedirectMode::Pipe
        } else {
            return Ok(None);
        };
        self.bump();
        let target = self.parse_expr()?;
        Ok(Some(AstRedirect { mode, target }))
    }

    fn parse_unset(&mut self) -> PResult<AstStmt> {
        let span = self.span();
        self.bump();
        let mut targets = Vec::new();
        loop {
            targets.push(self.parse_unset_target()?);
            if self.is_sym(Sym::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.eat_sym(Sym::Semi)?;
        Ok(AstStmt::Unset(targets, span))
    }

    fn parse_unset_target(&mut self) -> PResult<AstUnsetTarget> {
        if self.is_sym(Sym::Dollar) {
            self.bump();
            if self.is_sym(Sym::Star) {
                self.bump();
                return Ok(AstUnsetTarget::FullSrec);
            }
            if self.is_sym(Sym::LBracket) {
                self.bump();
                let e = self.parse_expr()?;
                self.eat_sym(Sym::RBracket)?;
                return Ok(AstUnsetTarget::IndirectField(e));
            }
            let name = self.take_ident_name()?;
            return Ok(AstUnsetTarget::Field(name));
        }
        if self.is_sym(Sym::At) {
            self.bump();
            if self.is_sym(Sym::Star) {
                self.bump();
                return Ok(AstUnsetTarget::AllOosvars);
            }
            let name = self.take_ident_name()?;
            let keys = self.parse_bracket_keys()?;
            return Ok(AstUnsetTarget::Oosvar { name, keys });
        }
        if self.is_ident("all") {
            self.bump();
            return Ok(AstUnsetTarget::AllOosvars);
        }
        let name = self.take_ident_name()?;
        Ok(AstUnsetTarget::Local(name))
    }

    /// Anything starting with `$`, `@`, `ENV`, or a bare identifier that
    /// isn't one of the statement keywords above: an assignment (possibly
    /// compound), or — for a filter program's trailing statement — a bare
    /// boolean expression.
    fn parse_assign_or_expr_stmt(&mut self) -> PResult<AstStmt> {
        let stmt = self.parse_assign_stmt_no_semi()?;
        self.eat_sym(Sym::Semi)?;
        Ok(stmt)
    }

    fn parse_assign_stmt_no_semi(&mut self) -> PResult<AstStmt> {
        let span = self.span();
        if self.is_sym(Sym::Dollar) {
            self.bump();
            if self.is_sym(Sym::Star) {
                self.bump();
                self.eat_sym(Sym::Assign)?;
                // `$* = @a[...]`: the RHS must be a (possibly keyed) oosvar.
                self.eat_sym(Sym::At)?;
                let name = self.take_ident_name()?;
                let keys = self.parse_bracket_keys()?;
                return Ok(AstStmt::FullSrecFromOosvar { name, keys, span });
            }
            if self.is_sym(Sym::LBracket) {
                self.bump();
                let name_expr = self.parse_expr()?;
                self.eat_sym(Sym::RBracket)?;
                let value = self.parse_assign_rhs(AstExpr::IndirectField(Box::new(name_expr.clone())))?;
                return Ok(AstStmt::IndirectSrecAssign { name_expr, value, span });
            }
            let name = self.take_ident_name()?;
            let value = self.parse_assign_rhs(AstExpr::Field(name.clone()))?;
            return Ok(AstStmt::SrecAssign { name, value, span });
        }
        if self.is_sym(Sym::At) {
            self.bump();
            if self.is_sym(Sym::Star) {
                return Err(self.err("`@*` cannot appear as an assignment target"));
            }
            let name = self.take_ident_name()?;
            let keys = self.parse_bracket_keys()?;
            if keys.is_empty() && self.is_sym(Sym::Assign) && matches!(self.peek_at(1), Tok::Sym(Sym::Dollar)) && matches!(self.peek_at(2), Tok::Sym(Sym::Star)) {
                self.bump();
                self.bump();
                self.bump();
                return Ok(AstStmt::OosvarFromFullSrec { name, keys, span });
            }
            let target_expr = AstExpr::Oosvar { name: name.clone(), keys: keys.clone() };
            let value = self.parse_assign_rhs(target_expr)?;
            return Ok(AstStmt::OosvarAssign { name, keys, value, span });
        }
        if self.is_ident("ENV") && matches!(self.peek_at(1), Tok::Sym(Sym::LBracket)) {
            self.bump();
            self.bump();
            let name_expr = self.parse_expr()?;
            self.eat_sym(Sym::RBracket)?;
            let value = self.parse_assign_rhs(AstExpr::Env(Box::new(name_expr.clone())))?;
            return Ok(AstStmt::EnvAssign { name_expr, value, span });
        }
        // Plain identifier: a local-variable assignment, a bare call
        // expression statement, or (for the final statement of a filter
        // program) a bare boolean expression.
        if matches!(self.peek(), Tok::Ident(_)) {
            let save = self.pos;
            let name = self.take_ident_name()?;
            if !matches!(self.peek(), Tok::Sym(Sym::LParen)) {
                let keys = self.parse_bracket_keys()?;
                if self.is_assign_op() {
                    let target_expr = AstExpr::Local { name: name.clone(), keys: keys.clone() };
                    let value = self.parse_assign_rhs(target_expr)?;
                    return Ok(AstStmt::LocalAssign { name, keys, value, span });
                }
            }
            self.pos = save;
        }
        let e = self.parse_expr()?;
        Ok(AstStmt::BareBool(e, span))
    }

    fn is_assign_op(&self) -> bool {
        matches!(
            self.peek(),
            Tok::Sym(
                Sym::Assign
                    | Sym::PlusAssign
                    | Sym::MinusAssign
                    | Sym::StarAssign
                    | Sym::SlashAssign
                    | Sym::SlashSlashAssign
                    | Sym::PercentAssign
                    | Sym::DotAssign
                    | Sym::AmpAssign
                    | Sym::PipeAssign
                    | Sym::CaretAssign
            )
        )
    }

    /// Consumes the assignment operator and RHS expression, desugaring a
    /// compound assignment (`+=`, `.=`, ...) into `target OP rhs`.
    fn parse_assign_rhs(&mut self, target_expr: AstExpr) -> PResult<AstExpr> {
        let op = match self.bump() {
            Tok::Sym(Sym::Assign) => None,
            Tok::Sym(Sym::PlusAssign) => Some(BinaryOp::Add),
            Tok::Sym(Sym::MinusAssign) => Some(BinaryOp::Sub),
            Tok::Sym(Sym::StarAssign) => Some(BinaryOp::Mul),
            Tok::Sym(Sym::SlashAssign) => Some(BinaryOp::Div),
            Tok::Sym(Sym::SlashSlashAssign) => Some(BinaryOp::IntDiv),
            Tok::Sym(Sym::PercentAssign) => Some(BinaryOp::Mod),
            Tok::Sym(Sym::DotAssign) => Some(BinaryOp::Concat),
            Tok::Sym(Sym::AmpAssign) => Some(BinaryOp::BitAnd),
            Tok::Sym(Sym::PipeAssign) => Some(BinaryOp::BitOr),
            Tok::Sym(Sym::CaretAssign) => Some(BinaryOp::BitXor),
            other => return Err(ParseError::Syntax(self.span().start, format!("expected assignment operator, found {other:?}"))),
        };
        let rhs = self.parse_expr()?;
        Ok(match op {
            None => rhs,
            Some(op) => AstExpr::Binary(op, Box::new(target_expr), Box::new(rhs)),
        })
    }

    fn parse_expr_list(&mut self, close: Sym) -> PResult<Vec<AstExpr>> {
        let mut out = Vec::new();
        while !self.is_sym(close) {
            out.push(self.parse_expr()?);
            if self.is_sym(Sym::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        Ok(out)
    }

    // ---- expressions (precedence climbing) ----

    fn parse_expr(&mut self) -> PResult<AstExpr> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> PResult<AstExpr> {
        let cond = self.parse_logic_or()?;
        if self.is_sym(Sym::Question) {
            self.bump();
            let then_e = self.parse_expr()?;
            self.eat_sym(Sym::Colon)?;
            let else_e = self.parse_expr()?;
            return Ok(AstExpr::Ternary(Box::new(cond), Box::new(then_e), Box::new(else_e)));
        }
        Ok(cond)
    }

    fn parse_logic_or(&mut self) -> PResult<AstExpr> {
        let mut lhs = self.parse_logic_and()?;
        while self.is_sym(Sym::OrOr) {
            self.bump();
            let rhs = self.parse_logic_and()?;
            lhs = AstExpr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_logic_and(&mut self) -> PResult<AstExpr> {
        let mut lhs = self.parse_bit_or()?;
        while self.is_sym(Sym::AndAnd) {
            self.bump();
            let rhs = self.parse_bit_or()?;
            lhs = AstExpr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bit_or(&mut self) -> PResult<AstExpr> {
        let mut lhs = self.parse_bit_xor()?;
        while self.is_sym(Sym::Pipe) {
            self.bump();
            let rhs = self.parse_bit_xor()?;
            lhs = AstExpr::Binary(BinaryOp::BitOr, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bit_xor(&mut self) -> PResult<AstExpr> {
        let mut lhs = self.parse_bit_and()?;
        while self.is_sym(Sym::Caret) {
            self.bump();
            let rhs = self.parse_bit_and()?;
            lhs = AstExpr::Binary(BinaryOp::BitXor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_bit_and(&mut self) -> PResult<AstExpr> {
        let mut lhs = self.parse_equality()?;
        while self.is_sym(Sym::Amp) {
            self.bump();
            let rhs = self.parse_equality()?;
            lhs = AstExpr::Binary(BinaryOp::BitAnd, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> PResult<AstExpr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = if self.is_sym(Sym::EqEq) {
                BinaryOp::Eq
            } else if self.is_sym(Sym::Ne) {
                BinaryOp::Ne
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_relational()?;
            lhs = AstExpr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> PResult<AstExpr> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = if self.is_sym(Sym::Lt) {
                BinaryOp::Lt
            } else if self.is_sym(Sym::Le) {
                BinaryOp::Le
            } else if self.is_sym(Sym::Gt) {
                BinaryOp::Gt
            } else if self.is_sym(Sym::Ge) {
                BinaryOp::Ge
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_shift()?;
            lhs = AstExpr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> PResult<AstExpr> {
        let mut lhs = self.parse_concat()?;
        loop {
            let op = if self.is_sym(Sym::Shl) {
                BinaryOp::Shl
            } else if self.is_sym(Sym::Shr) {
                BinaryOp::Shr
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_concat()?;
            lhs = AstExpr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_concat(&mut self) -> PResult<AstExpr> {
        let mut lhs = self.parse_additive()?;
        while self.is_sym(Sym::Dot) {
            self.bump();
            let rhs = self.parse_additive()?;
            lhs = AstExpr::Binary(BinaryOp::Concat, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<AstExpr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.is_sym(Sym::Plus) {
                BinaryOp::Add
            } else if self.is_sym(Sym::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_multiplicative()?;
            lhs = AstExpr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<AstExpr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.is_sym(Sym::Star) {
                BinaryOp::Mul
            } else if self.is_sym(Sym::Slash) {
                BinaryOp::Div
            } else if self.is_sym(Sym::SlashSlash) {
                BinaryOp::IntDiv
            } else if self.is_sym(Sym::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            self.bump();
            let rhs = self.parse_unary()?;
            lhs = AstExpr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<AstExpr> {
        if self.is_sym(Sym::Bang) {
            self.bump();
            return Ok(AstExpr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)));
        }
        if self.is_sym(Sym::Minus) {
            self.bump();
            return Ok(AstExpr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)));
        }
        if self.is_sym(Sym::Tilde) {
            self.bump();
            return Ok(AstExpr::Unary(UnaryOp::BitNot, Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> PResult<AstExpr> {
        match self.peek().clone() {
            Tok::Int(i) => {
                self.bump();
                Ok(AstExpr::IntLit(i))
            }
            Tok::Float(f) => {
                self.bump();
                Ok(AstExpr::FloatLit(f))
            }
            Tok::Str(s) => {
                self.bump();
                Ok(AstExpr::StringLit(s))
            }
            Tok::Sym(Sym::LParen) => {
                self.bump();
                let e = self.parse_expr()?;
                self.eat_sym(Sym::RParen)?;
                Ok(e)
            }
            Tok::Sym(Sym::Dollar) => {
                self.bump();
                if self.is_sym(Sym::Star) {
                    self.bump();
                    return Ok(AstExpr::FullSrec);
                }
                if self.is_sym(Sym::LBracket) {
                    self.bump();
                    let e = self.parse_expr()?;
                    self.eat_sym(Sym::RBracket)?;
                    return Ok(AstExpr::IndirectField(Box::new(e)));
                }
                let name = self.take_ident_name()?;
                Ok(AstExpr::Field(name))
            }
            Tok::Sym(Sym::At) => {
                self.bump();
                if self.is_sym(Sym::Star) {
                    self.bump();
                    return Ok(AstExpr::FullOosvar);
                }
                let name = self.take_ident_name()?;
                let keys = self.parse_bracket_keys()?;
                Ok(AstExpr::Oosvar { name, keys })
            }
            Tok::Ident(name) => {
                match name.as_str() {
                    "true" => {
                        self.bump();
                        return Ok(AstExpr::BoolLit(true));
                    }
                    "false" => {
                        self.bump();
                        return Ok(AstExpr::BoolLit(false));
                    }
                    "NR" => {
                        self.bump();
                        return Ok(AstExpr::Context(ContextVar::Nr));
                    }
                    "NF" => {
                        self.bump();
                        return Ok(AstExpr::Context(ContextVar::Nf));
                    }
                    "FNR" => {
                        self.bump();
                        return Ok(AstExpr::Context(ContextVar::Fnr));
                    }
                    "FILENAME" => {
                        self.bump();
                        return Ok(AstExpr::Context(ContextVar::Filename));
                    }
                    "FILENUM" => {
                        self.bump();
                        return Ok(AstExpr::Context(ContextVar::Filenum));
                    }
                    "ENV" if matches!(self.peek_at(1), Tok::Sym(Sym::LBracket)) => {
                        self.bump();
                        self.bump();
                        let e = self.parse_expr()?;
                        self.eat_sym(Sym::RBracket)?;
                        return Ok(AstExpr::Env(Box::new(e)));
                    }
                    _ => {}
                }
                self.bump();
                if self.is_sym(Sym::LParen) {
                    self.bump();
                    let args = self.parse_expr_list(Sym::RParen)?;
                    self.eat_sym(Sym::RParen)?;
                    return Ok(AstExpr::Call { name, args });
                }
                let keys = self.parse_bracket_keys()?;
                Ok(AstExpr::Local { name, keys })
            }
            other => Err(ParseError::Syntax(self.span().start, format!("unexpected token {other:?} in expression"))),
        }
    }
}

enum ForTargetStub {
    Srec { key_name: Option<String>, val_name: String, span: Span },
    Oosvar { key_names: Vec<String>, val_name: String, name: String, keys: Vec<AstExpr>, span: Span },
    Local { key_names: Vec<String>, val_name: String, local_name: String, keys: Vec<AstExpr>, span: Span },
}

fn attach_for_body(stub: ForTargetStub, body: Vec<AstStmt>) -> AstStmt {
    match stub {
        ForTargetStub::Srec { key_name, val_name, span } => {
            AstStmt::ForSrec { key_name, val_name, body, span }
        }
        ForTargetStub::Oosvar { key_names, val_name, name, keys, span } => {
            AstStmt::ForOosvar { key_names, val_name, name, keys, body, span }
        }
        ForTargetStub::Local { key_names, val_name, local_name, keys, span } => {
            AstStmt::ForLocalMap { key_names, val_name, local_name, keys, body, span }
        }
    }
}
