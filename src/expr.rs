//! Restricted expression language for `{...}` interpolation spans
//!
//! The grammar is closed by construction: literals, property/index access,
//! comparison, boolean combinators, arithmetic and string concatenation.
//! There are no calls, no assignment and no host-object access. Expressions
//! are parsed once at compile time into `Expr` and interpreted by a small
//! tree walker against a `Scope`.
//!
//! Evaluation never fails: any missing path or type mismatch resolves to
//! `Value::Empty`, which renders as the empty string.

use crate::error::{Result, TemplateError};
use crate::types::Value;
use crate::vars::VariableStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    /// Bare identifier, resolved against loop locals then the DataContext.
    Ident(String),
    /// Page variable reference: `$vars.name` (or the `$name` shorthand).
    VarRef(String),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Collect every `$vars` name this expression reads. Used by the islands
    /// analyzer to wire store subscriptions.
    pub fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::VarRef(name) => {
                out.insert(name.clone());
            }
            Expr::Field(base, _) => base.collect_vars(out),
            Expr::Index(base, idx) => {
                base.collect_vars(out);
                idx.collect_vars(out);
            }
            Expr::Unary(_, inner) => inner.collect_vars(out),
            Expr::Binary(_, lhs, rhs) => {
                lhs.collect_vars(out);
                rhs.collect_vars(out);
            }
            _ => {}
        }
    }

    pub fn reads_vars(&self) -> bool {
        let mut names = BTreeSet::new();
        self.collect_vars(&mut names);
        !names.is_empty()
    }
}

/// Nested evaluation scope: loop-local bindings shadow the variable store,
/// which shadows the DataContext root.
pub struct Scope<'a> {
    locals: Vec<HashMap<String, Value>>,
    vars: Option<&'a VariableStore>,
    data: &'a Value,
}

impl<'a> Scope<'a> {
    pub fn new(data: &'a Value) -> Self {
        Self {
            locals: Vec::new(),
            vars: None,
            data,
        }
    }

    pub fn with_vars(data: &'a Value, vars: &'a VariableStore) -> Self {
        Self {
            locals: Vec::new(),
            vars: Some(vars),
            data,
        }
    }

    pub fn push_locals(&mut self, bindings: HashMap<String, Value>) {
        self.locals.push(bindings);
    }

    pub fn pop_locals(&mut self) {
        self.locals.pop();
    }

    fn lookup_ident(&self, name: &str) -> Value {
        for frame in self.locals.iter().rev() {
            if let Some(v) = frame.get(name) {
                return v.clone();
            }
        }
        let value = self.data.field(name);
        if value.is_empty() {
            return miss(format!("'{}' is not a context fact", name));
        }
        value
    }

    fn lookup_var(&self, name: &str) -> Value {
        match self.vars.and_then(|store| store.get(name)) {
            Some(v) => v.clone(),
            None => miss(format!("read of undeclared variable '{}'", name)),
        }
    }
}

/// Recovered miss: resolves to the sentinel and surfaces at debug level only.
fn miss(detail: String) -> Value {
    log::debug!("{}", TemplateError::evaluation(detail));
    Value::Empty
}

/// Evaluate an expression against a scope. Total: misses and type clashes
/// come back as `Value::Empty`, never as an error.
pub fn evaluate(expr: &Expr, scope: &Scope) -> Value {
    match expr {
        Expr::Number(n) => Value::Number(*n),
        Expr::Str(s) => Value::String(s.clone()),
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Ident(name) => scope.lookup_ident(name),
        Expr::VarRef(name) => scope.lookup_var(name),
        Expr::Field(base, name) => {
            let base = evaluate(base, scope);
            if base.is_empty() {
                // Already reported where the base went missing.
                return Value::Empty;
            }
            let value = base.field(name);
            if value.is_empty() {
                return miss(format!("path miss on field '{}'", name));
            }
            value
        }
        Expr::Index(base, idx) => {
            let base = evaluate(base, scope);
            if base.is_empty() {
                return Value::Empty;
            }
            let key = evaluate(idx, scope);
            let value = base.index(&key);
            if value.is_empty() {
                return miss(format!("path miss on index {}", key.render_string()));
            }
            value
        }
        Expr::Unary(op, inner) => {
            let v = evaluate(inner, scope);
            match op {
                UnaryOp::Not => Value::Bool(!v.is_truthy()),
                UnaryOp::Neg => match v.as_number() {
                    Some(n) => Value::Number(-n),
                    None => Value::Empty,
                },
            }
        }
        Expr::Binary(op, lhs, rhs) => match op {
            BinaryOp::And => {
                let l = evaluate(lhs, scope);
                if !l.is_truthy() {
                    return Value::Bool(false);
                }
                Value::Bool(evaluate(rhs, scope).is_truthy())
            }
            BinaryOp::Or => {
                let l = evaluate(lhs, scope);
                if l.is_truthy() {
                    return Value::Bool(true);
                }
                Value::Bool(evaluate(rhs, scope).is_truthy())
            }
            _ => {
                let l = evaluate(lhs, scope);
                let r = evaluate(rhs, scope);
                eval_binary(*op, &l, &r)
            }
        },
    }
}

fn eval_binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Eq => Value::Bool(l == r),
        BinaryOp::Ne => Value::Bool(l != r),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, l, r),
        BinaryOp::Add => match (l, r) {
            (Value::Number(a), Value::Number(b)) => Value::Number(a + b),
            (Value::String(_), _) | (_, Value::String(_)) => {
                Value::String(format!("{}{}", l.render_string(), r.render_string()))
            }
            _ => Value::Empty,
        },
        BinaryOp::Sub => arith(l, r, |a, b| a - b),
        BinaryOp::Mul => arith(l, r, |a, b| a * b),
        BinaryOp::Div => arith(l, r, |a, b| a / b),
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuited in evaluate"),
    }
}

fn arith(l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> Value {
    match (l.as_number(), r.as_number()) {
        (Some(a), Some(b)) => Value::Number(f(a, b)),
        _ => Value::Empty,
    }
}

fn compare(op: BinaryOp, l: &Value, r: &Value) -> Value {
    let ordering = match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let result = match ordering {
        Some(ord) => match op {
            BinaryOp::Lt => ord.is_lt(),
            BinaryOp::Le => ord.is_le(),
            BinaryOp::Gt => ord.is_gt(),
            BinaryOp::Ge => ord.is_ge(),
            _ => false,
        },
        None => false,
    };
    Value::Bool(result)
}

// --- expression parsing -----------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Number(f64),
    Str(String),
    Ident(String),
    Dollar,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Bang,
    Minus,
    Plus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

fn tokenize_expr(input: &str) -> Result<Vec<ExprToken>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let err = |msg: String| TemplateError::invalid_format(format!("in expression '{}': {}", input, msg));

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '$' => {
                tokens.push(ExprToken::Dollar);
                i += 1;
            }
            '.' => {
                tokens.push(ExprToken::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(ExprToken::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(ExprToken::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(ExprToken::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(ExprToken::RParen);
                i += 1;
            }
            '+' => {
                tokens.push(ExprToken::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(ExprToken::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(ExprToken::Star);
                i += 1;
            }
            '/' => {
                tokens.push(ExprToken::Slash);
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(ExprToken::NotEq);
                    i += 2;
                } else {
                    tokens.push(ExprToken::Bang);
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(ExprToken::EqEq);
                    i += 2;
                } else {
                    return Err(err("single '=' is not a valid operator".into()));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(ExprToken::Le);
                    i += 2;
                } else {
                    tokens.push(ExprToken::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(ExprToken::Ge);
                    i += 2;
                } else {
                    tokens.push(ExprToken::Gt);
                    i += 1;
                }
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(ExprToken::AndAnd);
                    i += 2;
                } else {
                    return Err(err("single '&' is not a valid operator".into()));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(ExprToken::OrOr);
                    i += 2;
                } else {
                    return Err(err("single '|' is not a valid operator".into()));
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&'\\') => {
                            match chars.get(i + 1) {
                                Some(&'n') => s.push('\n'),
                                Some(&'t') => s.push('\t'),
                                Some(&ch) => s.push(ch),
                                None => return Err(err("unterminated string literal".into())),
                            }
                            i += 2;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return Err(err("unterminated string literal".into())),
                    }
                }
                tokens.push(ExprToken::Str(s));
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    // A dot followed by a non-digit belongs to field access.
                    if chars[i] == '.'
                        && !chars.get(i + 1).map(|c| c.is_ascii_digit()).unwrap_or(false)
                    {
                        break;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| err(format!("invalid number '{}'", text)))?;
                tokens.push(ExprToken::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(ExprToken::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(err(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

struct ExprParser {
    tokens: Vec<ExprToken>,
    pos: usize,
    source: String,
}

impl ExprParser {
    fn peek(&self) -> Option<&ExprToken> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<ExprToken> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, expected: &ExprToken) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, msg: impl Into<String>) -> TemplateError {
        TemplateError::invalid_format(format!(
            "in expression '{}': {}",
            self.source,
            msg.into()
        ))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&ExprToken::OrOr) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.eat(&ExprToken::AndAnd) {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(ExprToken::EqEq) => BinaryOp::Eq,
                Some(ExprToken::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(ExprToken::Lt) => BinaryOp::Lt,
                Some(ExprToken::Le) => BinaryOp::Le,
                Some(ExprToken::Gt) => BinaryOp::Gt,
                Some(ExprToken::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(ExprToken::Plus) => BinaryOp::Add,
                Some(ExprToken::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(ExprToken::Star) => BinaryOp::Mul,
                Some(ExprToken::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&ExprToken::Bang) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        if self.eat(&ExprToken::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&ExprToken::Dot) {
                match self.advance() {
                    Some(ExprToken::Ident(name)) => {
                        expr = Expr::Field(Box::new(expr), name);
                    }
                    _ => return Err(self.error("expected property name after '.'")),
                }
            } else if self.eat(&ExprToken::LBracket) {
                let idx = self.parse_or()?;
                if !self.eat(&ExprToken::RBracket) {
                    return Err(self.error("expected ']' after index"));
                }
                expr = Expr::Index(Box::new(expr), Box::new(idx));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(ExprToken::Number(n)) => Ok(Expr::Number(n)),
            Some(ExprToken::Str(s)) => Ok(Expr::Str(s)),
            Some(ExprToken::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                _ => Ok(Expr::Ident(name)),
            },
            Some(ExprToken::Dollar) => {
                let first = match self.advance() {
                    Some(ExprToken::Ident(name)) => name,
                    _ => return Err(self.error("expected variable name after '$'")),
                };
                // `$vars.name` is the canonical form; `$name` is accepted as
                // shorthand.
                if first == "vars" {
                    if !self.eat(&ExprToken::Dot) {
                        return Err(self.error("expected '.' after '$vars'"));
                    }
                    match self.advance() {
                        Some(ExprToken::Ident(name)) => Ok(Expr::VarRef(name)),
                        _ => return Err(self.error("expected variable name after '$vars.'")),
                    }
                } else {
                    Ok(Expr::VarRef(first))
                }
            }
            Some(ExprToken::LParen) => {
                let inner = self.parse_or()?;
                if !self.eat(&ExprToken::RParen) {
                    return Err(self.error("expected ')'"));
                }
                Ok(inner)
            }
            Some(other) => Err(self.error(format!("unexpected token {:?}", other))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

/// Parse one expression string into its AST.
pub fn parse_expression(input: &str) -> Result<Expr> {
    let tokens = tokenize_expr(input)?;
    if tokens.is_empty() {
        return Err(TemplateError::invalid_format(format!(
            "in expression '{}': empty expression",
            input
        )));
    }
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        source: input.to_string(),
    };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error("trailing input after expression"));
    }
    Ok(expr)
}
