//! Hand-rolled lexer for DSL program text.
//!
//! Spec §1/§2 scope the grammar/parser out of the core ("the parser is a
//! collaborator, not part of the core") — this lexer and [`super::parser`]
//! are that collaborator, living in `mlr-cli` rather than `mlr-cst`, whose
//! only contract with the rest of the workspace is the
//! [`mlr_cst::ast`] node shapes it must deliver.

use mlr_core::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Sym(Sym),
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sym {
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    Question,
    Dollar,
    At,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    SlashSlashAssign,
    PercentAssign,
    DotAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    Append, // >>
}

pub struct Token {
    pub tok: Tok,
    pub span: Span,
}

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("lex error at byte {0}: {1}")]
pub struct LexError(pub u32, pub String);

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, bytes: src.as_bytes(), pos: 0 }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.pos as u32;
            if self.pos >= self.bytes.len() {
                out.push(Token { tok: Tok::Eof, span: Span::new(start, start) });
                break;
            }
            let tok = self.next_token()?;
            let end = self.pos as u32;
            out.push(Token { tok, span: Span::new(start, end) });
        }
        Ok(out)
    }

    fn skip_trivia(&mut self) {
        loop {
            while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos < self.bytes.len() && self.bytes[self.pos] == b'#' {
                while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn peek(&self) -> u8 {
        *self.bytes.get(self.pos).unwrap_or(&0)
    }

    fn peek_at(&self, off: usize) -> u8 {
        *self.bytes.get(self.pos + off).unwrap_or(&0)
    }

    fn bump(&mut self) -> u8 {
        let b = self.peek();
        self.pos += 1;
        b
    }

    fn next_token(&mut self) -> Result<Tok, LexError> {
        let c = self.peek();
        if c.is_ascii_digit() || (c == b'.' && self.peek_at(1).is_ascii_digit()) {
            return self.lex_number();
        }
        if c == b'"' {
            return self.lex_string();
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            return Ok(self.lex_ident());
        }
        self.lex_symbol()
    }

    fn lex_ident(&mut self) -> Tok {
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        Tok::Ident(self.src[start..self.pos].to_string())
    }

    fn lex_number(&mut self) -> Result<Tok, LexError> {
        let start = self.pos;
        let mut is_float = false;
        while self.peek().is_ascii_digit() {
            self.pos += 1;
        }
        if self.peek() == b'.' && self.peek_at(1).is_ascii_digit() {
            is_float = true;
            self.pos += 1;
            while self.peek().is_ascii_digit() {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), b'e' | b'E') {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek(), b'+' | b'-') {
                self.pos += 1;
            }
            if self.peek().is_ascii_digit() {
                is_float = true;
                while self.peek().is_ascii_digit() {
                    self.pos += 1;
                }
            } else {
                self.pos = save;
            }
        }
        let text = &self.src[start..self.pos];
        if is_float {
            text.parse::<f64>()
                .map(Tok::Float)
                .map_err(|e| LexError(start as u32, e.to_string()))
        } else {
            text.parse::<i64>()
                .map(Tok::Int)
                .map_err(|e| LexError(start as u32, e.to_string()))
        }
    }

    fn lex_string(&mut self) -> Result<Tok, LexError> {
        let start = self.pos;
        self.bump(); // opening quote
        let mut s = String::new();
        loop {
            if self.pos >= self.bytes.len() {
                return Err(LexError(start as u32, "unterminated string literal".to_string()));
            }
            let c = self.bump();
            match c {
                b'"' => break,
                b'\\' => {
                    let esc = self.bump();
                    s.push(match esc {
                        b'n' => '\n',
                        b't' => '\t',
                        b'r' => '\r',
                        b'"' => '"',
                        b'\\' => '\\',
                        other => other as char,
                    });
                }
                other => s.push(other as char),
            }
        }
        Ok(Tok::Str(s))
    }

    fn lex_symbol(&mut self) -> Result<Tok, LexError> {
        let start = self.pos;
        let two = (self.peek(), self.peek_at(1));
        macro_rules! two_char {
            ($a:expr, $b:expr, $sym:expr) => {
                if two == ($a, $b) {
                    self.pos += 2;
                    return Ok(Tok::Sym($sym));
                }
            };
        }
        two_char!(b'=', b'=', Sym::EqEq);
        two_char!(b'!', b'=', Sym::Ne);
        two_char!(b'<', b'=', Sym::Le);
        two_char!(b'>', b'=', Sym::Ge);
        two_char!(b'<', b'<', Sym::Shl);
        two_char!(b'>', b'>', Sym::Append);
        two_char!(b'&', b'&', Sym::AndAnd);
        two_char!(b'|', b'|', Sym::OrOr);
        two_char!(b'/', b'/', Sym::SlashSlash);
        two_char!(b'+', b'=', Sym::PlusAssign);
        two_char!(b'-', b'=', Sym::MinusAssign);
        two_char!(b'*', b'=', Sym::StarAssign);
        two_char!(b'/', b'=', Sym::SlashAssign);
        two_char!(b'%', b'=', Sym::PercentAssign);
        two_char!(b'.', b'=', Sym::DotAssign);
        two_char!(b'&', b'=', Sym::AmpAssign);
        two_char!(b'|', b'=', Sym::PipeAssign);
        two_char!(b'^', b'=', Sym::CaretAssign);

        let c = self.bump();
        let sym = match c {
            b'{' => Sym::LBrace,
            b'}' => Sym::RBrace,
            b'(' => Sym::LParen,
            b')' => Sym::RParen,
            b'[' => Sym::LBracket,
            b']' => Sym::RBracket,
            b',' => Sym::Comma,
            b';' => Sym::Semi,
            b':' => Sym::Colon,
            b'?' => Sym::Question,
            b'$' => Sym::Dollar,
            b'@' => Sym::At,
            b'.' => Sym::Dot,
            b'+' => Sym::Plus,
            b'-' => Sym::Minus,
            b'*' => Sym::Star,
            b'/' => Sym::Slash,
            b'%' => Sym::Percent,
            b'&' => Sym::Amp,
            b'|' => Sym::Pipe,
            b'^' => Sym::Caret,
            b'~' => Sym::Tilde,
            b'!' => Sym::Bang,
            b'<' => Sym::Lt,
            b'>' => Sym::Gt,
            b'=' => Sym::Assign,
            other => {
                return Err(LexError(start as u32, format!("unexpected character '{}'", other as char)));
            }
        };
        // `//=` needs a third character beyond the two-char table above.
        if sym == Sym::Slash && self.peek() == b'/' && self.peek_at(1) == b'=' {
            self.pos += 2;
            return Ok(Tok::Sym(Sym::SlashSlashAssign));
        }
        Ok(Tok::Sym(sym))
    }
}
