//! Output size negotiation
//!
//! Width and height options are arithmetic expressions evaluated against
//! the input link geometry. `"iw"`/`"ih"` name the input dimensions, `"a"`
//! the input aspect ratio; `0` keeps the input dimension and `-1` derives
//! one dimension from the other while preserving aspect. Evaluation is
//! pure: no hardware is touched here.

use crate::error::{Error, Result};
use crate::types::{Resolution, SurfaceFormat};

/// Largest dimension a processor is asked to produce
const MAX_DIMENSION: i64 = 16_384;

/// Arithmetic operator inside a [`SizeExpr`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

/// A parsed size expression
#[derive(Debug, Clone, PartialEq)]
pub enum SizeExpr {
    Literal(f64),
    InputWidth,
    InputHeight,
    Aspect,
    Neg(Box<SizeExpr>),
    Binary {
        op: Op,
        lhs: Box<SizeExpr>,
        rhs: Box<SizeExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn parse_error(text: &str, reason: impl Into<String>) -> Error {
    Error::InvalidSizeExpression {
        expr: text.to_string(),
        reason: reason.into(),
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '0'..='9' | '.' => {
                let mut num = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        num.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = num
                    .parse::<f64>()
                    .map_err(|_| parse_error(text, format!("bad number '{}'", num)))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            c => return Err(parse_error(text, format!("unexpected character '{}'", c))),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<SizeExpr> {
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(Op::Add),
            Some(Token::Minus) => Some(Op::Sub),
            _ => None,
        } {
            self.next();
            let rhs = self.term()?;
            lhs = SizeExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<SizeExpr> {
        let mut lhs = self.factor()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(Op::Mul),
            Some(Token::Slash) => Some(Op::Div),
            _ => None,
        } {
            self.next();
            let rhs = self.factor()?;
            lhs = SizeExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<SizeExpr> {
        match self.next() {
            Some(Token::Num(value)) => Ok(SizeExpr::Literal(value)),
            Some(Token::Ident(name)) => match name.as_str() {
                "iw" | "in_w" => Ok(SizeExpr::InputWidth),
                "ih" | "in_h" => Ok(SizeExpr::InputHeight),
                "a" => Ok(SizeExpr::Aspect),
                other => Err(parse_error(self.text, format!("unknown variable '{}'", other))),
            },
            Some(Token::Minus) => Ok(SizeExpr::Neg(Box::new(self.factor()?))),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(parse_error(self.text, "missing closing parenthesis")),
                }
            }
            Some(token) => Err(parse_error(self.text, format!("unexpected token {:?}", token))),
            None => Err(parse_error(self.text, "unexpected end of expression")),
        }
    }
}

impl SizeExpr {
    /// Parse an expression. Errors here are configuration errors reported
    /// before any frame is accepted.
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(parse_error(text, "empty expression"));
        }
        let mut parser = Parser {
            text,
            tokens,
            pos: 0,
        };
        let expr = parser.expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parse_error(text, "trailing input after expression"));
        }
        Ok(expr)
    }

    fn eval(&self, input: Resolution) -> f64 {
        match self {
            SizeExpr::Literal(value) => *value,
            SizeExpr::InputWidth => input.width as f64,
            SizeExpr::InputHeight => input.height as f64,
            SizeExpr::Aspect => input.aspect_ratio(),
            SizeExpr::Neg(inner) => -inner.eval(input),
            SizeExpr::Binary { op, lhs, rhs } => {
                let l = lhs.eval(input);
                let r = rhs.eval(input);
                match op {
                    Op::Add => l + r,
                    Op::Sub => l - r,
                    Op::Mul => l * r,
                    Op::Div => l / r,
                }
            }
        }
    }
}

/// Even alignment with a floor of 2, for chroma-subsampled outputs
fn align_even(value: u32) -> u32 {
    (value & !1).max(2)
}

/// Compute the output geometry for an input geometry.
///
/// Deterministic and side-effect free: the same inputs always produce the
/// same result.
pub fn negotiate(
    input: Resolution,
    width: &SizeExpr,
    height: &SizeExpr,
    format: SurfaceFormat,
) -> Result<Resolution> {
    if input.width == 0 || input.height == 0 {
        return Err(Error::Config(format!("input geometry {} is empty", input)));
    }

    let w = width.eval(input);
    let h = height.eval(input);
    if !w.is_finite() || !h.is_finite() {
        return Err(Error::Config(
            "size expression evaluated to a non-finite value".to_string(),
        ));
    }

    let mut w = w.round() as i64;
    let mut h = h.round() as i64;

    if w == 0 {
        w = input.width as i64;
    }
    if h == 0 {
        h = input.height as i64;
    }

    if w == -1 && h == -1 {
        return Err(Error::Config(
            "width and height cannot both preserve aspect".to_string(),
        ));
    }
    if w == -1 {
        w = (h as f64 * input.aspect_ratio()).round() as i64;
    } else if h == -1 {
        h = (w as f64 / input.aspect_ratio()).round() as i64;
    }

    if w < 1 || w > MAX_DIMENSION {
        return Err(Error::Config(format!("negotiated width {} out of range", w)));
    }
    if h < 1 || h > MAX_DIMENSION {
        return Err(Error::Config(format!("negotiated height {} out of range", h)));
    }

    let (mut w, mut h) = (w as u32, h as u32);
    if format.is_chroma_subsampled() {
        w = align_even(w);
        h = align_even(h);
    }

    Ok(Resolution::new(w, h))
}
