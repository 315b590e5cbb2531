//! Token definitions for the C lexer

use crate::common::Span;
use logos::Logos;

/// Token with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// All token kinds of the accepted C subset
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/")]
pub enum TokenKind {
    // === Keywords ===
    #[token("break")]
    Break,
    #[token("char")]
    Char,
    #[token("const")]
    Const,
    #[token("continue")]
    Continue,
    #[token("do")]
    Do,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("if")]
    If,
    #[token("int")]
    Int,
    #[token("long")]
    Long,
    #[token("return")]
    Return,
    #[token("short")]
    Short,
    #[token("signed")]
    Signed,
    #[token("sizeof")]
    Sizeof,
    #[token("struct")]
    Struct,
    #[token("unsigned")]
    Unsigned,
    #[token("void")]
    Void,
    #[token("volatile")]
    Volatile,
    #[token("while")]
    While,
    #[token("_Alignof")]
    Alignof,

    /// Keywords of C features this compiler does not accept
    #[token("auto", |lex| lex.slice().to_string())]
    #[token("case", |lex| lex.slice().to_string())]
    #[token("default", |lex| lex.slice().to_string())]
    #[token("double", |lex| lex.slice().to_string())]
    #[token("enum", |lex| lex.slice().to_string())]
    #[token("extern", |lex| lex.slice().to_string())]
    #[token("float", |lex| lex.slice().to_string())]
    #[token("goto", |lex| lex.slice().to_string())]
    #[token("register", |lex| lex.slice().to_string())]
    #[token("static", |lex| lex.slice().to_string())]
    #[token("switch", |lex| lex.slice().to_string())]
    #[token("typedef", |lex| lex.slice().to_string())]
    #[token("union", |lex| lex.slice().to_string())]
    #[token("_Bool", |lex| lex.slice().to_string())]
    Reserved(String),

    // === Identifiers ===
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    // === Literals ===
    #[regex(r"0[xX][0-9a-fA-F]+[uUlL]*", |lex| parse_integer(lex.slice(), 16))]
    #[regex(r"0[bB][01]+[uUlL]*", |lex| parse_integer(lex.slice(), 2))]
    #[regex(r"0[0-7]+[uUlL]*", |lex| parse_integer(lex.slice(), 8))]
    #[regex(r"[0-9]+[uUlL]*", |lex| parse_integer(lex.slice(), 10))]
    IntLiteral(i64),

    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?[fFlL]?", priority = 3, callback = |lex| lex.slice().to_string())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?[fFlL]?", priority = 2, callback = |lex| lex.slice().to_string())]
    FloatLiteral(String),

    #[regex(r"'([^'\\]|\\.)*'", |lex| char_value(lex.slice()))]
    CharLiteral(u8),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| string_value(lex.slice()))]
    StringLiteral(String),

    // === Operators ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("!")]
    Bang,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("<<")]
    LtLt,
    #[token(">>")]
    GtGt,
    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("&=")]
    AmpEq,
    #[token("|=")]
    PipeEq,
    #[token("^=")]
    CaretEq,
    #[token("<<=")]
    LtLtEq,
    #[token(">>=")]
    GtGtEq,

    // === Punctuation ===
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
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("->")]
    Arrow,
    #[token(":")]
    Colon,
    #[token("?")]
    Question,
    #[token("...")]
    Ellipsis,

    Eof,
}

/// Value of an integer literal; suffixes are accepted and ignored
fn parse_integer(text: &str, radix: u32) -> Option<i64> {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    let digits = match radix {
        16 | 2 => &digits[2..],
        8 => &digits[1..],
        _ => digits,
    };
    // Wrap literals above i64::MAX the way an unsigned 64-bit constant would
    u64::from_str_radix(digits, radix).ok().map(|v| v as i64)
}

fn char_value(text: &str) -> Option<u8> {
    let bytes = unescape(&text[1..text.len() - 1])?;
    match bytes.as_slice() {
        [byte] => Some(*byte),
        _ => None,
    }
}

fn string_value(text: &str) -> Option<String> {
    let bytes = unescape(&text[1..text.len() - 1])?;
    Some(bytes.into_iter().map(char::from).collect())
}

/// Decode C escape sequences into raw bytes
fn unescape(body: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len());
    let mut bytes = body.bytes().peekable();

    while let Some(b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let escaped = match bytes.next()? {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0C,
            b'v' => 0x0B,
            b'x' => {
                let mut value: u32 = 0;
                let mut seen = false;
                while let Some(digit) = bytes.peek().and_then(|&c| (c as char).to_digit(16)) {
                    bytes.next();
                    value = value.wrapping_mul(16).wrapping_add(digit);
                    seen = true;
                }
                if !seen {
                    return None;
                }
                value as u8
            }
            d @ b'0'..=b'7' => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    match bytes.peek() {
                        Some(&c @ b'0'..=b'7') => {
                            bytes.next();
                            value = value * 8 + u32::from(c - b'0');
                        }
                        _ => break,
                    }
                }
                value as u8
            }
            other => other,
        };
        out.push(escaped);
    }
    Some(out)
}

impl TokenKind {
    /// Check if this token is a type specifier keyword
    pub fn is_type_specifier(&self) -> bool {
        matches!(
            self,
            TokenKind::Void
                | TokenKind::Char
                | TokenKind::Short
                | TokenKind::Int
                | TokenKind::Long
                | TokenKind::Signed
                | TokenKind::Unsigned
                | TokenKind::Struct
        )
    }

    pub fn is_type_qualifier(&self) -> bool {
        matches!(self, TokenKind::Const | TokenKind::Volatile)
    }

    /// Check if this token can start a declaration
    pub fn can_start_declaration(&self) -> bool {
        self.is_type_specifier() || self.is_type_qualifier()
    }

    /// Precedence of binary operators (higher = tighter binding).
    /// Assignment, ternary and comma are parsed separately.
    pub fn binary_precedence(&self) -> Option<u8> {
        match self {
            TokenKind::PipePipe => Some(1),
            TokenKind::AmpAmp => Some(2),
            TokenKind::Pipe => Some(3),
            TokenKind::Caret => Some(4),
            TokenKind::Amp => Some(5),
            TokenKind::EqEq | TokenKind::NotEq => Some(6),
            TokenKind::Lt | TokenKind::Gt | TokenKind::LtEq | TokenKind::GtEq => Some(7),
            TokenKind::LtLt | TokenKind::GtGt => Some(8),
            TokenKind::Plus | TokenKind::Minus => Some(9),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(10),
            _ => None,
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            TokenKind::Identifier(s) => return write!(f, "identifier '{}'", s),
            TokenKind::Reserved(s) => return write!(f, "keyword '{}'", s),
            TokenKind::IntLiteral(v) => return write!(f, "integer '{}'", v),
            TokenKind::FloatLiteral(s) => return write!(f, "float '{}'", s),
            TokenKind::CharLiteral(c) => return write!(f, "char {:?}", char::from(*c)),
            TokenKind::StringLiteral(s) => return write!(f, "string {:?}", s),
            TokenKind::Eof => return write!(f, "end of file"),
            TokenKind::Break => "break",
            TokenKind::Char => "char",
            TokenKind::Const => "const",
            TokenKind::Continue => "continue",
            TokenKind::Do => "do",
            TokenKind::Else => "else",
            TokenKind::For => "for",
            TokenKind::If => "if",
            TokenKind::Int => "int",
            TokenKind::Long => "long",
            TokenKind::Return => "return",
            TokenKind::Short => "short",
            TokenKind::Signed => "signed",
            TokenKind::Sizeof => "sizeof",
            TokenKind::Struct => "struct",
            TokenKind::Unsigned => "unsigned",
            TokenKind::Void => "void",
            TokenKind::Volatile => "volatile",
            TokenKind::While => "while",
            TokenKind::Alignof => "_Alignof",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::AmpAmp => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::Bang => "!",
            TokenKind::Amp => "&",
            TokenKind::Pipe => "|",
            TokenKind::Caret => "^",
            TokenKind::Tilde => "~",
            TokenKind::LtLt => "<<",
            TokenKind::GtGt => ">>",
            TokenKind::Eq => "=",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::AmpEq => "&=",
            TokenKind::PipeEq => "|=",
            TokenKind::CaretEq => "^=",
            TokenKind::LtLtEq => "<<=",
            TokenKind::GtGtEq => ">>=",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Semi => ";",
            TokenKind::Comma => ",",
            TokenKind::Dot => ".",
            TokenKind::Arrow => "->",
            TokenKind::Colon => ":",
            TokenKind::Question => "?",
            TokenKind::Ellipsis => "...",
        };
        write!(f, "'{}'", symbol)
    }
}
