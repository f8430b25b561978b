//! A small Smalltalk subset for `execute`.
//!
//! Supports statements separated by `.`, an optional `^` return, unary, binary and keyword
//! sends with the usual precedence, parentheses, and literals: `nil`, `true`, `false`,
//! `self`, integers of any size, floats, `'strings'`, `#symbols`, `#'quoted symbols'` and
//! `$c` characters. Other identifiers are looked up in UserGlobals and then the kernel
//! globals when the source is compiled; unknown names are compile errors.

use num_bigint::BigInt;

use super::heap::{Heap, SimResult, character_oop, errors};
use crate::gci::{GciErrSType, OOP_FALSE, OOP_ILLEGAL, OOP_NIL, OOP_TRUE, OopType};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Keyword(String),
    Binary(String),
    Int(BigInt),
    Float(f64),
    Str(String),
    Symbol(String),
    Char(char),
    LParen,
    RParen,
    Period,
    Caret,
}

#[derive(Debug)]
enum Expr {
    /// An object resolved at compile time: globals and constant oops.
    Value(OopType),
    SelfRef,
    Int(BigInt),
    Float(f64),
    Str(String),
    Symbol(String),
    Send {
        receiver: Box<Expr>,
        selector: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug)]
struct Statement {
    returns: bool,
    expr: Expr,
}

const BINARY_CHARS: &str = "+-*/\\<>=~@%|&?,";

fn compile_error(heap: &Heap, detail: &str) -> Box<GciErrSType> {
    heap.error(errors::COMPILE_ERROR, &format!("a CompileError occurred (error 1001), {detail}"))
}

fn is_operand(token: Option<&Token>) -> bool {
    matches!(
        token,
        Some(
            Token::Ident(_)
                | Token::Int(_)
                | Token::Float(_)
                | Token::Str(_)
                | Token::Symbol(_)
                | Token::Char(_)
                | Token::RParen
        )
    )
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '"' {
            // comment
            i += 1;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            if i == chars.len() {
                return Err("unterminated comment".to_owned());
            }
            i += 1;
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if i < chars.len() && chars[i] == ':' && chars.get(i + 1) != Some(&'=') {
                i += 1;
                tokens.push(Token::Keyword(word + ":"));
            } else {
                tokens.push(Token::Ident(word));
            }
        } else if c.is_ascii_digit()
            || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit) && !is_operand(tokens.last()))
        {
            let (token, next) = number(&chars, i)?;
            tokens.push(token);
            i = next;
        } else if c == '\'' {
            let (text, next) = quoted(&chars, i)?;
            tokens.push(Token::Str(text));
            i = next;
        } else if c == '#' {
            match chars.get(i + 1) {
                Some('\'') => {
                    let (text, next) = quoted(&chars, i + 1)?;
                    tokens.push(Token::Symbol(text));
                    i = next;
                }
                Some(&d) if d.is_alphabetic() || d == '_' => {
                    let start = i + 1;
                    i += 1;
                    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == ':') {
                        i += 1;
                    }
                    tokens.push(Token::Symbol(chars[start..i].iter().collect()));
                }
                Some(&d) if BINARY_CHARS.contains(d) => {
                    let start = i + 1;
                    i += 1;
                    while i < chars.len() && BINARY_CHARS.contains(chars[i]) {
                        i += 1;
                    }
                    tokens.push(Token::Symbol(chars[start..i].iter().collect()));
                }
                _ => return Err("expected a symbol after #".to_owned()),
            }
        } else if c == '$' {
            let Some(&value) = chars.get(i + 1) else {
                return Err("expected a character after $".to_owned());
            };
            tokens.push(Token::Char(value));
            i += 2;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == '.' {
            tokens.push(Token::Period);
            i += 1;
        } else if c == '^' {
            tokens.push(Token::Caret);
            i += 1;
        } else if BINARY_CHARS.contains(c) {
            let start = i;
            while i < chars.len() && BINARY_CHARS.contains(chars[i]) {
                i += 1;
            }
            tokens.push(Token::Binary(chars[start..i].iter().collect()));
        } else {
            return Err(format!("unexpected character {c:?}"));
        }
    }
    Ok(tokens)
}

fn number(chars: &[char], start: usize) -> Result<(Token, usize), String> {
    let mut i = start;
    if chars[i] == '-' {
        i += 1;
    }
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    let mut is_float = false;
    if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && chars[i] == 'e' {
        let mut j = i + 1;
        if j < chars.len() && chars[j] == '-' {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }
    let text: String = chars[start..i].iter().collect();
    let token = if is_float {
        Token::Float(text.parse().map_err(|_| format!("bad float literal {text}"))?)
    } else {
        Token::Int(text.parse().map_err(|_| format!("bad integer literal {text}"))?)
    };
    Ok((token, i))
}

/// Reads a `'...'` literal starting at the opening quote; `''` stands for one quote.
fn quoted(chars: &[char], start: usize) -> Result<(String, usize), String> {
    let mut text = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err("unterminated string literal".to_owned()),
            Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                text.push('\'');
                i += 2;
            }
            Some('\'') => return Ok((text, i + 1)),
            Some(&c) => {
                text.push(c);
                i += 1;
            }
        }
    }
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    heap: &'a Heap,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn statements(&mut self) -> Result<Vec<Statement>, String> {
        let mut statements = Vec::new();
        while self.peek().is_some() {
            let returns = if self.peek() == Some(&Token::Caret) {
                self.pos += 1;
                true
            } else {
                false
            };
            let expr = self.expression()?;
            statements.push(Statement { returns, expr });
            match self.next() {
                None | Some(Token::Period) => {}
                Some(other) => return Err(format!("unexpected {other:?}")),
            }
        }
        if statements.is_empty() {
            return Err("empty source".to_owned());
        }
        Ok(statements)
    }

    fn expression(&mut self) -> Result<Expr, String> {
        let receiver = self.binary()?;
        let mut selector = String::new();
        let mut args = Vec::new();
        while let Some(Token::Keyword(part)) = self.peek() {
            selector.push_str(part);
            self.pos += 1;
            args.push(self.binary()?);
        }
        if selector.is_empty() {
            Ok(receiver)
        } else {
            Ok(Expr::Send {
                receiver: Box::new(receiver),
                selector,
                args,
            })
        }
    }

    fn binary(&mut self) -> Result<Expr, String> {
        let mut receiver = self.unary()?;
        while let Some(Token::Binary(op)) = self.peek() {
            let selector = op.clone();
            self.pos += 1;
            let arg = self.unary()?;
            receiver = Expr::Send {
                receiver: Box::new(receiver),
                selector,
                args: vec![arg],
            };
        }
        Ok(receiver)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        let mut receiver = self.primary()?;
        while let Some(Token::Ident(name)) = self.peek() {
            let selector = name.clone();
            self.pos += 1;
            receiver = Expr::Send {
                receiver: Box::new(receiver),
                selector,
                args: Vec::new(),
            };
        }
        Ok(receiver)
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Ident(name)) => match name.as_str() {
                "nil" => Ok(Expr::Value(OOP_NIL)),
                "true" => Ok(Expr::Value(OOP_TRUE)),
                "false" => Ok(Expr::Value(OOP_FALSE)),
                "self" => Ok(Expr::SelfRef),
                _ => self
                    .heap
                    .resolve(&name)
                    .map(Expr::Value)
                    .ok_or_else(|| format!("undefined symbol {name}")),
            },
            Some(Token::Int(value)) => Ok(Expr::Int(value)),
            Some(Token::Float(value)) => Ok(Expr::Float(value)),
            Some(Token::Str(text)) => Ok(Expr::Str(text)),
            Some(Token::Symbol(text)) => Ok(Expr::Symbol(text)),
            Some(Token::Char(c)) => Ok(Expr::Value(character_oop(c))),
            Some(Token::LParen) => {
                let expr = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err("expected )".to_owned()),
                }
            }
            Some(other) => Err(format!("unexpected {other:?}")),
            None => Err("unexpected end of source".to_owned()),
        }
    }
}

/// Compiles and runs `source` with `receiver` as `self`.
pub(super) fn evaluate(heap: &mut Heap, source: &str, receiver: OopType) -> SimResult<OopType> {
    let parsed = tokenize(source).and_then(|tokens| {
        Parser {
            tokens,
            pos: 0,
            heap: &*heap,
        }
        .statements()
    });
    let statements = match parsed {
        Ok(statements) => statements,
        Err(detail) => return Err(compile_error(heap, &detail)),
    };
    let receiver = if receiver == OOP_ILLEGAL { OOP_NIL } else { receiver };
    let mut result = OOP_NIL;
    for statement in &statements {
        result = run(heap, &statement.expr, receiver)?;
        if statement.returns {
            break;
        }
    }
    Ok(result)
}

fn run(heap: &mut Heap, expr: &Expr, receiver: OopType) -> SimResult<OopType> {
    match expr {
        Expr::Value(oop) => Ok(*oop),
        Expr::SelfRef => Ok(receiver),
        Expr::Int(value) => Ok(heap.integer(value.clone())),
        Expr::Float(value) => Ok(heap.float(*value)),
        Expr::Str(text) => Ok(heap.string(text)),
        Expr::Symbol(text) => Ok(heap.symbol(text)),
        Expr::Send {
            receiver: target,
            selector,
            args,
        } => {
            let target = run(heap, target, receiver)?;
            let args = args
                .iter()
                .map(|arg| run(heap, arg, receiver))
                .collect::<SimResult<Vec<_>>>()?;
            heap.send(target, selector, &args)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oop::{Oop, decode_small_integer};

    fn int(heap: &mut Heap, source: &str) -> i64 {
        let oop = evaluate(heap, source, OOP_NIL).unwrap();
        decode_small_integer(Oop::new(oop)).unwrap()
    }

    #[test]
    fn precedence_is_unary_binary_keyword() {
        let mut heap = Heap::boot();
        assert_eq!(int(&mut heap, "^3 + 4 * 2"), 14);
        assert_eq!(int(&mut heap, "^3 + (4 * 2)"), 11);
        assert_eq!(int(&mut heap, "^'abc' size + 1"), 4);
        assert_eq!(int(&mut heap, "^-5 - -2"), -3);
    }

    #[test]
    fn statements_run_in_order() {
        let mut heap = Heap::boot();
        let source = "UserGlobals at: #Answer put: 42. ^(UserGlobals at: #Answer) + 0";
        assert_eq!(int(&mut heap, source), 42);
        assert_eq!(int(&mut heap, "^Answer"), 42);
    }

    #[test]
    fn literals_parse() {
        let tokens = tokenize("#at:put: #+ #'a b' $x 'it''s' 1.5e2 12345678901234567890").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Symbol("at:put:".to_owned()),
                Token::Symbol("+".to_owned()),
                Token::Symbol("a b".to_owned()),
                Token::Char('x'),
                Token::Str("it's".to_owned()),
                Token::Float(150.0),
                Token::Int("12345678901234567890".parse().unwrap()),
            ]
        );
    }

    #[test]
    fn undefined_names_are_compile_errors() {
        let mut heap = Heap::boot();
        let err = evaluate(&mut heap, "^NoSuchThing", OOP_NIL).unwrap_err();
        assert_eq!(err.number, errors::COMPILE_ERROR);
        assert!(err.message_text().contains("NoSuchThing"), "{}", err.message_text());
    }
}
