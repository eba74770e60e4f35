//! Text forms of value keys, expressions and state expressions.
//!
//! ```text
//! key     := "this." id | "model." id | "material." id
//!          | "::" id ("::" id)* ["." id] | id ("::" id)* "." id
//! sum     := product (("+" | "-") product)*
//! product := factor (("*" | "/") factor)*
//! factor  := number ["%" | "u"] | key | "[" key "]" | "(" sum ")" | "-" factor
//! state   := unary (("&" | "|" | "xor") unary)*
//! unary   := "!" unary | "(" state ")" | key
//! ```
//!
//! Identifiers may contain dashes when a letter follows, so `size-a` is one
//! key while `w-10` subtracts.

use crate::error::ParseError;
use crate::expression::{Expression, ExpressionNode, Operator, Unit};
use crate::state::{StateExpr, StateOp};
use crate::value_key::{Scope, ScopedValueKey};

struct Cursor<'t> {
    text: &'t str,
    pos: usize,
}

fn starts_ident(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn continues_ident(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl<'t> Cursor<'t> {
    fn new(text: &'t str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'t str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    /// Like `eat`, but only when the word is not the prefix of a longer
    /// identifier.
    fn eat_word(&mut self, word: &str) -> bool {
        let rest = self.rest();
        rest.starts_with(word) && rest[word.len()..].chars().next().is_none_or(|c| !continues_ident(c)) && self.eat(word)
    }

    fn expect(&mut self, token: &str) -> Result<(), ParseError> {
        self.skip_ws();
        if self.eat(token) { Ok(()) } else { Err(self.error(format!("expected '{token}'"))) }
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.pos == self.text.len()
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        if self.at_end() { Ok(()) } else { Err(self.error("unexpected trailing input")) }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.text[..self.pos].chars().count(), message)
    }

    fn ident(&mut self) -> Result<&'t str, ParseError> {
        let start = self.pos;
        if !self.peek().is_some_and(starts_ident) {
            return Err(self.error("expected an identifier"));
        }
        while let Some(c) = self.peek() {
            let dash = c == '-' && self.peek_second().is_some_and(starts_ident);
            if !(continues_ident(c) || dash) {
                break;
            }
            self.bump();
        }
        Ok(&self.text[start..self.pos])
    }

    /// `bare` accepts a lone identifier as a key on the item itself.
    fn value_key(&mut self, bare: bool) -> Result<ScopedValueKey, ParseError> {
        self.skip_ws();
        if self.eat("::") {
            let mut segments = vec![self.ident()?.to_string()];
            while self.eat("::") {
                segments.push(self.ident()?.to_string());
            }
            if self.eat(".") {
                return Ok(ScopedValueKey::global(self.ident()?).with_path(segments));
            }
            return match segments.pop() {
                Some(key) if segments.is_empty() => Ok(ScopedValueKey::global(key)),
                _ => Err(self.error("expected '.' and a key after a global path")),
            };
        }

        let start = self.pos;
        let first = self.ident()?;
        let scope = match first {
            "this" => Some(Scope::Element),
            "model" => Some(Scope::Model),
            "material" => Some(Scope::Material),
            _ => None,
        };
        if let Some(scope) = scope {
            if self.eat(".") {
                return Ok(ScopedValueKey::new(scope, self.ident()?));
            }
        }

        let mut segments = vec![first.to_string()];
        while self.eat("::") {
            segments.push(self.ident()?.to_string());
        }
        if self.eat(".") {
            return Ok(ScopedValueKey::element(self.ident()?).with_path(segments));
        }
        if bare && segments.len() == 1 {
            return Ok(ScopedValueKey::element(first));
        }
        self.pos = start;
        Err(self.error("expected 'this.', 'model.', '::' or an element path before the key"))
    }

    fn sum(&mut self) -> Result<ExpressionNode, ParseError> {
        let mut left = self.product()?;
        loop {
            self.skip_ws();
            let op = if self.eat("+") {
                Operator::Add
            } else if self.eat("-") {
                Operator::Subtract
            } else {
                return Ok(left);
            };
            left = ExpressionNode::binary(op, left, self.product()?);
        }
    }

    fn product(&mut self) -> Result<ExpressionNode, ParseError> {
        let mut left = self.factor()?;
        loop {
            self.skip_ws();
            let op = if self.eat("*") {
                Operator::Multiply
            } else if self.eat("/") {
                Operator::Divide
            } else {
                return Ok(left);
            };
            left = ExpressionNode::binary(op, left, self.factor()?);
        }
    }

    fn factor(&mut self) -> Result<ExpressionNode, ParseError> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.bump();
                let inner = self.sum()?;
                self.expect(")")?;
                Ok(inner)
            }
            Some('[') => {
                self.bump();
                let key = self.value_key(false)?;
                self.expect("]")?;
                Ok(ExpressionNode::weak_key(key))
            }
            Some('-') => {
                self.bump();
                Ok(match self.factor()? {
                    ExpressionNode::Constant { value, unit } => ExpressionNode::Constant { value: -value, unit },
                    other => ExpressionNode::binary(Operator::Subtract, ExpressionNode::constant(0.0), other),
                })
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(_) => Ok(ExpressionNode::key(self.value_key(false)?)),
            None => Err(self.error("expected a term")),
        }
    }

    fn number(&mut self) -> Result<ExpressionNode, ParseError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.bump();
        }
        let value: f64 = self.text[start..self.pos].parse().map_err(|_| {
            let column = self.text[..start].chars().count();
            ParseError::new(column, format!("malformed number '{}'", &self.text[start..self.pos]))
        })?;
        let unit = if self.eat("%") {
            Unit::Percent
        } else if self.eat_word("u") {
            Unit::Standard
        } else {
            Unit::Scalar
        };
        Ok(ExpressionNode::Constant { value, unit })
    }

    fn state_chain(&mut self) -> Result<StateExpr<ScopedValueKey>, ParseError> {
        let mut left = self.state_unary()?;
        loop {
            self.skip_ws();
            let op = if self.eat("&") {
                StateOp::And
            } else if self.eat("|") {
                StateOp::Or
            } else if self.eat_word("xor") {
                StateOp::Xor
            } else {
                return Ok(left);
            };
            left = StateExpr::branch(op, left, self.state_unary()?);
        }
    }

    fn state_unary(&mut self) -> Result<StateExpr<ScopedValueKey>, ParseError> {
        self.skip_ws();
        if self.eat("!") {
            return Ok(self.state_unary()?.negate());
        }
        if self.eat("(") {
            let inner = self.state_chain()?;
            self.expect(")")?;
            return Ok(inner);
        }
        Ok(StateExpr::leaf(self.value_key(true)?))
    }
}

pub fn parse_expression(text: &str) -> Result<Expression, ParseError> {
    let mut cursor = Cursor::new(text);
    let root = cursor.sum()?;
    cursor.finish()?;
    let expression = Expression::new(root);
    if expression.weak_count() > 1 {
        return Err(ParseError::new(0, "an expression may hold at most one weak term"));
    }
    Ok(expression)
}

pub fn parse_state_expression(text: &str) -> Result<StateExpr<ScopedValueKey>, ParseError> {
    let mut cursor = Cursor::new(text);
    let expr = cursor.state_chain()?;
    cursor.finish()?;
    Ok(expr)
}

pub fn parse_value_key(text: &str) -> Result<ScopedValueKey, ParseError> {
    let mut cursor = Cursor::new(text);
    let key = cursor.value_key(true)?;
    cursor.finish()?;
    Ok(key)
}

/// Keys separated by whitespace or commas.
pub fn parse_key_list(text: &str) -> Result<Vec<ScopedValueKey>, ParseError> {
    let mut cursor = Cursor::new(text);
    let mut keys = Vec::new();
    loop {
        while cursor.peek().is_some_and(|c| c.is_whitespace() || c == ',') {
            cursor.bump();
        }
        if cursor.at_end() {
            return Ok(keys);
        }
        keys.push(cursor.value_key(true)?);
    }
}

/// `Window::Body` names an item, `Window::Body.header` one of its cells.
pub fn parse_position(text: &str) -> Result<ScopedValueKey, ParseError> {
    let mut cursor = Cursor::new(text);
    cursor.skip_ws();
    let mut path = vec![cursor.ident()?.to_string()];
    while cursor.eat("::") {
        path.push(cursor.ident()?.to_string());
    }
    let cell = if cursor.eat(".") { Some(cursor.ident()?.to_string()) } else { None };
    cursor.finish()?;
    Ok(ScopedValueKey { scope: Scope::Element, path: Some(path), key: cell })
}
