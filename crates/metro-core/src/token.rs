//! Token representation produced by the lexer.

use serde::{Deserialize, Serialize};

use crate::source::SourceId;

/// The kind of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Int,
    USize,
    Float,
    Char,
    String,
    Identifier,
    Punctuator,
    End,
}

/// Bracket family, for punctuators that open/close a nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BracketFamily {
    Paren,
    Bracket,
    Brace,
}

/// Fixed punctuator vocabulary, longest-match first in the lexer's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PunctuatorKind {
    Arrow,
    AmpAmp,
    PipePipe,
    Shl,
    Shr,
    DotDot,
    EqEq,
    NotEq,
    Ge,
    Le,
    Gt,
    Lt,
    Bang,
    Question,
    Amp,
    Caret,
    Pipe,
    Tilde,
    Eq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Comma,
    Dot,
    Semi,
    Colon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
}

impl PunctuatorKind {
    /// Longest-match-first table used by the lexer.
    pub const TABLE: &'static [(&'static str, PunctuatorKind)] = &[
        ("->", PunctuatorKind::Arrow),
        ("&&", PunctuatorKind::AmpAmp),
        ("||", PunctuatorKind::PipePipe),
        ("<<", PunctuatorKind::Shl),
        (">>", PunctuatorKind::Shr),
        ("..", PunctuatorKind::DotDot),
        ("==", PunctuatorKind::EqEq),
        ("!=", PunctuatorKind::NotEq),
        (">=", PunctuatorKind::Ge),
        ("<=", PunctuatorKind::Le),
        (">", PunctuatorKind::Gt),
        ("<", PunctuatorKind::Lt),
        ("!", PunctuatorKind::Bang),
        ("?", PunctuatorKind::Question),
        ("&", PunctuatorKind::Amp),
        ("^", PunctuatorKind::Caret),
        ("|", PunctuatorKind::Pipe),
        ("~", PunctuatorKind::Tilde),
        ("=", PunctuatorKind::Eq),
        ("+", PunctuatorKind::Plus),
        ("-", PunctuatorKind::Minus),
        ("*", PunctuatorKind::Star),
        ("/", PunctuatorKind::Slash),
        ("%", PunctuatorKind::Percent),
        (",", PunctuatorKind::Comma),
        (".", PunctuatorKind::Dot),
        (";", PunctuatorKind::Semi),
        (":", PunctuatorKind::Colon),
        ("(", PunctuatorKind::LParen),
        (")", PunctuatorKind::RParen),
        ("[", PunctuatorKind::LBracket),
        ("]", PunctuatorKind::RBracket),
        ("{", PunctuatorKind::LBrace),
        ("}", PunctuatorKind::RBrace),
    ];

    /// `Some((family, is_open))` for bracket punctuators, `None` otherwise.
    pub fn bracket(self) -> Option<(BracketFamily, bool)> {
        use PunctuatorKind::*;
        match self {
            LParen => Some((BracketFamily::Paren, true)),
            RParen => Some((BracketFamily::Paren, false)),
            LBracket => Some((BracketFamily::Bracket, true)),
            RBracket => Some((BracketFamily::Bracket, false)),
            LBrace => Some((BracketFamily::Brace, true)),
            RBrace => Some((BracketFamily::Brace, false)),
            _ => None,
        }
    }
}

/// Byte-accurate source location of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: SourceId,
    pub offset: usize,
    pub length: usize,
    pub line: usize,
}

/// A single lexical token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text slice this token was lexed from. Non-empty for every
    /// non-`End` token (spec.md 3.1).
    pub text: String,
    pub loc: Location,
    /// Set only when `kind == Punctuator`.
    pub punct: Option<PunctuatorKind>,
}

impl Token {
    pub fn is_end(&self) -> bool {
        self.kind == TokenKind::End
    }

    pub fn is_punct(&self, kind: PunctuatorKind) -> bool {
        self.punct == Some(kind)
    }
}
