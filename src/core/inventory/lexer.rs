//! Tokens for the expression part of `{{ ... }}` and `{% ... %}` tags.

use logos::Logos;

pub type Span = std::ops::Range<usize>;

fn unquote(lex: &mut logos::Lexer<Tok>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_string()
}

/// Keywords (`if`, `in`, `not`, ...) lex as [`Tok::Name`]; the parser decides by position.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Tok {
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Name(String),

    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),

    #[regex(r#""([^"\\]|\\.)*""#, unquote)]
    #[regex(r#"'([^'\\]|\\.)*'"#, unquote)]
    Str(String),

    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("|")]
    Pipe,
    #[token("~")]
    Tilde,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    #[token("=")]
    Assign,
    #[token("==")]
    Eq,
    #[token("!=")]
    Ne,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    Pow,
    #[token("/")]
    Slash,
    #[token("//")]
    FloorDiv,
    #[token("%")]
    Percent,
}

impl Tok {
    pub fn is_name(&self, keyword: &str) -> bool {
        matches!(self, Tok::Name(n) if n == keyword)
    }

    pub fn describe(&self) -> String {
        match self {
            Tok::Name(n) => format!("name '{}'", n),
            Tok::Number(n) => format!("number {}", n),
            Tok::Str(s) => format!("string '{}'", s),
            other => format!("{:?}", other),
        }
    }
}

/// Lexes `input`; `Err` carries the span of the first character that is not a token.
pub fn lex(input: &str) -> Result<Vec<(Tok, Span)>, Span> {
    Tok::lexer(input)
        .spanned()
        .map(|(tok, span)| tok.map(|t| (t, span.clone())).map_err(|_| span))
        .collect()
}
