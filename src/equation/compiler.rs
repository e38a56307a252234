//! Infix equation compiler
//!
//! Accepts the expression syntax shown by the instrument's front panel:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := '-' unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := number | channel | function '(' expr ')' | '(' expr ')'
//! channel := 'C' digits
//! function:= exp | ln | log | abs | int | sqrt
//! ```
//!
//! `log` is base 2. Power is right-associative and binds tighter than
//! unary minus, so `-C1^2` is `-(C1^2)`.
//!
//! Nesting through parentheses, function calls, unary minus and power
//! exponents is limited to [`MAX_NESTING`] levels.

use thiserror::Error;
use tracing::debug;

use super::program::{EquationProgram, Instruction};

/// Deepest nesting the compiler accepts
pub const MAX_NESTING: usize = 256;

/// Compilation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Character that starts no token
    #[error("unexpected character {ch:?} at {position}")]
    UnexpectedChar {
        /// Byte offset in the source
        position: usize,
        /// Offending character
        ch: char,
    },

    /// Token that does not fit the grammar here
    #[error("unexpected {found} at {position}")]
    UnexpectedToken {
        /// Byte offset in the source
        position: usize,
        /// Description of the token
        found: String,
    },

    /// Input ended mid-expression
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// Identifier that is not a known function
    #[error("unknown function {name:?}")]
    UnknownFunction {
        /// Identifier as written
        name: String,
    },

    /// Numeric literal that does not parse
    #[error("invalid number {text:?}")]
    InvalidNumber {
        /// Literal as written
        text: String,
    },

    /// Channel reference out of range
    #[error("invalid channel reference {text:?}")]
    InvalidChannel {
        /// Reference as written
        text: String,
    },

    /// Expression nests deeper than [`MAX_NESTING`]
    #[error("expression nested too deeply at {position} (limit {MAX_NESTING})")]
    TooDeep {
        /// Byte offset where the limit was crossed
        position: usize,
    },
}

/// Compile infix text to an End-terminated program
///
/// # Errors
///
/// See [`CompileError`].
pub fn compile(source: &str) -> Result<EquationProgram, CompileError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        out: Vec::new(),
    };

    parser.expr()?;
    if let Some((position, token)) = parser.tokens.get(parser.pos) {
        return Err(CompileError::UnexpectedToken {
            position: *position,
            found: token.describe(),
        });
    }

    parser.out.push(Instruction::End);
    let program = EquationProgram::new(parser.out);
    debug!(source, %program, "compiled equation");
    Ok(program)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f32),
    Channel(u16),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number {n}"),
            Self::Channel(c) => format!("channel C{c}"),
            Self::Ident(name) => format!("identifier {name:?}"),
            Self::Plus => "'+'".into(),
            Self::Minus => "'-'".into(),
            Self::Star => "'*'".into(),
            Self::Slash => "'/'".into(),
            Self::Caret => "'^'".into(),
            Self::LParen => "'('".into(),
            Self::RParen => "')'".into(),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, CompileError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let start = i;
        let c = bytes[i];
        let token = match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                i += 1;
                continue;
            }
            b'+' => Token::Plus,
            b'-' => Token::Minus,
            b'*' if bytes.get(i + 1) == Some(&b'*') => {
                i += 1;
                Token::Caret
            }
            b'*' => Token::Star,
            b'/' => Token::Slash,
            b'^' => Token::Caret,
            b'(' => Token::LParen,
            b')' => Token::RParen,
            b'0'..=b'9' | b'.' => {
                i = scan_number(bytes, i);
                let text = &source[start..i];
                let value = text
                    .parse::<f32>()
                    .map_err(|_| CompileError::InvalidNumber { text: text.into() })?;
                tokens.push((start, Token::Number(value)));
                continue;
            }
            c if c.is_ascii_alphabetic() => {
                while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push((start, word_token(&source[start..i])?));
                continue;
            }
            _ => {
                let ch = source[start..].chars().next().unwrap_or('\u{FFFD}');
                return Err(CompileError::UnexpectedChar { position: start, ch });
            }
        };
        i += 1;
        tokens.push((start, token));
    }

    Ok(tokens)
}

fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }

    // Exponent only when digits follow, so `2e` stays a number and a word.
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < bytes.len() && matches!(bytes[j], b'+' | b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    i
}

fn word_token(word: &str) -> Result<Token, CompileError> {
    let lower = word.to_ascii_lowercase();
    if let Some(digits) = lower.strip_prefix('c') {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return match digits.parse::<u16>() {
                Ok(channel) if channel > 0 => Ok(Token::Channel(channel)),
                _ => Err(CompileError::InvalidChannel { text: word.into() }),
            };
        }
    }
    Ok(Token::Ident(lower))
}

fn function(name: &str) -> Option<Instruction> {
    Some(match name {
        "exp" => Instruction::Exp,
        "ln" => Instruction::Ln,
        "log" => Instruction::Log2,
        "abs" => Instruction::Abs,
        "int" => Instruction::TruncateToInt,
        "sqrt" => Instruction::Sqrt,
        _ => return None,
    })
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
    out: Vec<Instruction>,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Result<(usize, Token), CompileError> {
        let item = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(CompileError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(item)
    }

    fn expect(&mut self, expected: &Token) -> Result<(), CompileError> {
        let (position, token) = self.next()?;
        if &token == expected {
            Ok(())
        } else {
            Err(CompileError::UnexpectedToken {
                position,
                found: token.describe(),
            })
        }
    }

    fn expr(&mut self) -> Result<(), CompileError> {
        self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Instruction::Add,
                Some(Token::Minus) => Instruction::Sub,
                _ => return Ok(()),
            };
            self.pos += 1;
            self.term()?;
            self.out.push(op);
        }
    }

    fn term(&mut self) -> Result<(), CompileError> {
        self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Instruction::Mul,
                Some(Token::Slash) => Instruction::Div,
                _ => return Ok(()),
            };
            self.pos += 1;
            self.unary()?;
            self.out.push(op);
        }
    }

    // Every recursive path (parens, calls, minus, exponents) passes here.
    fn unary(&mut self) -> Result<(), CompileError> {
        if self.depth >= MAX_NESTING {
            let position = self
                .tokens
                .get(self.pos)
                .or_else(|| self.tokens.last())
                .map_or(0, |(position, _)| *position);
            return Err(CompileError::TooDeep { position });
        }

        self.depth += 1;
        let result = if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            self.unary().map(|()| self.out.push(Instruction::Negate))
        } else {
            self.power()
        };
        self.depth -= 1;
        result
    }

    fn power(&mut self) -> Result<(), CompileError> {
        self.primary()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            self.unary()?;
            self.out.push(Instruction::Pow);
        }
        Ok(())
    }

    fn primary(&mut self) -> Result<(), CompileError> {
        let (position, token) = self.next()?;
        match token {
            Token::Number(value) => self.out.push(Instruction::PushConst(value)),
            Token::Channel(channel) => self.out.push(Instruction::PushChannel(channel)),
            Token::LParen => {
                self.expr()?;
                self.expect(&Token::RParen)?;
            }
            Token::Ident(name) => {
                let instruction =
                    function(&name).ok_or(CompileError::UnknownFunction { name })?;
                self.expect(&Token::LParen)?;
                self.expr()?;
                self.expect(&Token::RParen)?;
                self.out.push(instruction);
            }
            other => {
                return Err(CompileError::UnexpectedToken {
                    position,
                    found: other.describe(),
                });
            }
        }
        Ok(())
    }
}
