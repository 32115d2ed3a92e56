//! Row filter expressions
//!
//! The SEO path asks the model for a dataframe-style query string such as
//! `` `Status Code` == 404 and Indexability != 'Indexable' `` and evaluates it
//! locally against the fetched tab. Supported:
//!
//! - column references: bare identifiers or backticked names
//! - literals: numbers, 'single' / "double" quoted strings, True / False
//! - comparisons `== != < <= > >=`, membership `in [..]` / `not in [..]`
//! - `col.str.contains('x')`, `.str.startswith(..)`, `.str.endswith(..)`,
//!   optionally with `case=False`
//! - `col.isnull()`, `isna()`, `notnull()`, `notna()` (blank text is missing)
//! - `and` / `&`, `or` / `|`, `not` / `~`, parentheses
//!
//! `&` and `|` bind like `and` / `or`, looser than comparisons. Parentheses,
//! `not` and method calls may nest at most [`MAX_NESTING`] levels deep.

use crate::error::OrchestrationError;
use crate::table::{Cell, Row, Table};
use crate::Result;
use std::cmp::Ordering;

pub const MAX_NESTING: usize = 64;

const TOO_DEEP: &str = "Filter expression is nested too deeply";

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Column(String),
    Str(String),
    Number(f64),
    And,
    Or,
    Not,
    In,
    True,
    False,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Assign,
    Minus,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrMethod {
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Literal),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    In {
        operand: Box<Expr>,
        items: Vec<Literal>,
        negated: bool,
    },
    Str {
        operand: Box<Expr>,
        method: StrMethod,
        pattern: String,
        case_sensitive: bool,
    },
    Missing {
        operand: Box<Expr>,
        negated: bool,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

/// A parsed filter, ready to run against tables
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    source: String,
    expr: Expr,
}

impl FilterExpr {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source).map_err(OrchestrationError::FilterError)?;
        if tokens.is_empty() {
            return Err(OrchestrationError::FilterError("Empty filter expression".to_string()));
        }

        let (expr, pos) = parse_or(&tokens, 0, 0).map_err(OrchestrationError::FilterError)?;
        if pos != tokens.len() {
            return Err(OrchestrationError::FilterError(format!(
                "Unexpected token {:?} at position {}",
                tokens[pos], pos
            )));
        }

        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Column names referenced by the expression, in order of appearance
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_columns(&self.expr, &mut out);
        out
    }

    pub fn matches(&self, row: Row<'_>) -> Result<bool> {
        match eval(&self.expr, row)? {
            Scalar::Bool(b) => Ok(b),
            other => Err(OrchestrationError::FilterError(format!(
                "Filter must evaluate to True/False, got {}",
                other.kind()
            ))),
        }
    }

    /// Rows of `table` for which the expression holds
    pub fn apply(&self, table: &Table) -> Result<Table> {
        for column in self.columns() {
            if !table.has_column(column) {
                return Err(OrchestrationError::FilterError(format!(
                    "name '{}' is not defined",
                    column
                )));
            }
        }
        table.try_filter(|row| self.matches(row))
    }
}

/// Parse and apply in one step
pub fn apply_filter(table: &Table, source: &str) -> Result<Table> {
    FilterExpr::parse(source)?.apply(table)
}

fn collect_columns<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
    match expr {
        Expr::Column(name) => {
            if !out.contains(&name.as_str()) {
                out.push(name);
            }
        }
        Expr::Literal(_) => {}
        Expr::Compare { left, right, .. } => {
            collect_columns(left, out);
            collect_columns(right, out);
        }
        Expr::In { operand, .. } | Expr::Str { operand, .. } | Expr::Missing { operand, .. } => {
            collect_columns(operand, out)
        }
        Expr::And(operands) | Expr::Or(operands) => {
            for operand in operands {
                collect_columns(operand, out);
            }
        }
        Expr::Not(inner) => collect_columns(inner, out),
    }
}

// ── Tokenizer ───────────────────────────────────────────────────────

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => { chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            '[' => { tokens.push(Token::LBracket); chars.next(); }
            ']' => { tokens.push(Token::RBracket); chars.next(); }
            ',' => { tokens.push(Token::Comma); chars.next(); }
            '.' => { tokens.push(Token::Dot); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '&' => {
                chars.next();
                if chars.peek() == Some(&'&') {
                    chars.next();
                }
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                if chars.peek() == Some(&'|') {
                    chars.next();
                }
                tokens.push(Token::Or);
            }
            '~' => { tokens.push(Token::Not); chars.next(); }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Eq);
                } else {
                    tokens.push(Token::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err("Expected '=' after '!'".to_string());
                }
                tokens.push(Token::NotEq);
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::LtEq);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::GtEq);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '`' => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(ch) => name.push(ch),
                        None => return Err("Unterminated backtick column name".to_string()),
                    }
                }
                tokens.push(Token::Column(name));
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(ch) => s.push(ch),
                            None => return Err("Unterminated string literal".to_string()),
                        },
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => return Err("Unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '0'..='9' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || d == '_' {
                        if d != '_' {
                            num_str.push(d);
                        }
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| format!("Invalid number: {}", num_str))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match ident.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "True" | "true" => Token::True,
                    "False" | "false" => Token::False,
                    _ => Token::Ident(ident),
                });
            }
            _ => return Err(format!("Unexpected character: {}", c)),
        }
    }

    Ok(tokens)
}

// ── Parser ──────────────────────────────────────────────────────────

type Parsed = std::result::Result<(Expr, usize), String>;

fn parse_or(tokens: &[Token], pos: usize, depth: usize) -> Parsed {
    let (first, mut pos) = parse_and(tokens, pos, depth)?;
    if tokens.get(pos) != Some(&Token::Or) {
        return Ok((first, pos));
    }

    let mut operands = vec![first];
    while tokens.get(pos) == Some(&Token::Or) {
        let (next, new_pos) = parse_and(tokens, pos + 1, depth)?;
        operands.push(next);
        pos = new_pos;
    }

    Ok((Expr::Or(operands), pos))
}

fn parse_and(tokens: &[Token], pos: usize, depth: usize) -> Parsed {
    let (first, mut pos) = parse_not(tokens, pos, depth)?;
    if tokens.get(pos) != Some(&Token::And) {
        return Ok((first, pos));
    }

    let mut operands = vec![first];
    while tokens.get(pos) == Some(&Token::And) {
        let (next, new_pos) = parse_not(tokens, pos + 1, depth)?;
        operands.push(next);
        pos = new_pos;
    }

    Ok((Expr::And(operands), pos))
}

fn parse_not(tokens: &[Token], pos: usize, depth: usize) -> Parsed {
    if tokens.get(pos) == Some(&Token::Not) {
        if depth >= MAX_NESTING {
            return Err(TOO_DEEP.to_string());
        }
        let (inner, pos) = parse_not(tokens, pos + 1, depth + 1)?;
        return Ok((Expr::Not(Box::new(inner)), pos));
    }
    parse_comparison(tokens, pos, depth)
}

fn parse_comparison(tokens: &[Token], pos: usize, depth: usize) -> Parsed {
    let (left, pos) = parse_postfix(tokens, pos, depth)?;

    let op = match tokens.get(pos) {
        Some(Token::Eq) => CompareOp::Eq,
        Some(Token::NotEq) => CompareOp::NotEq,
        Some(Token::Lt) => CompareOp::Lt,
        Some(Token::LtEq) => CompareOp::LtEq,
        Some(Token::Gt) => CompareOp::Gt,
        Some(Token::GtEq) => CompareOp::GtEq,
        Some(Token::Assign) => return Err("Use '==' for comparison, not '='".to_string()),
        Some(Token::In) => {
            let (items, pos) = parse_list(tokens, pos + 1)?;
            return Ok((
                Expr::In {
                    operand: Box::new(left),
                    items,
                    negated: false,
                },
                pos,
            ));
        }
        Some(Token::Not) if tokens.get(pos + 1) == Some(&Token::In) => {
            let (items, pos) = parse_list(tokens, pos + 2)?;
            return Ok((
                Expr::In {
                    operand: Box::new(left),
                    items,
                    negated: true,
                },
                pos,
            ));
        }
        _ => return Ok((left, pos)),
    };

    let (right, pos) = parse_postfix(tokens, pos + 1, depth)?;
    Ok((
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        pos,
    ))
}

fn parse_postfix(tokens: &[Token], pos: usize, depth: usize) -> Parsed {
    let (mut expr, mut pos) = parse_primary(tokens, pos, depth)?;

    let mut depth = depth;
    while tokens.get(pos) == Some(&Token::Dot) {
        if depth >= MAX_NESTING {
            return Err(TOO_DEEP.to_string());
        }
        depth += 1;

        let method = match tokens.get(pos + 1) {
            Some(Token::Ident(name)) => name.as_str(),
            other => return Err(format!("Expected method name after '.', found {:?}", other)),
        };

        match method {
            "str" => {
                if tokens.get(pos + 2) != Some(&Token::Dot) {
                    return Err("Expected '.str.<method>(...)'".to_string());
                }
                let name = match tokens.get(pos + 3) {
                    Some(Token::Ident(name)) => name.as_str(),
                    other => return Err(format!("Expected string method, found {:?}", other)),
                };
                let method = match name {
                    "contains" => StrMethod::Contains,
                    "startswith" => StrMethod::StartsWith,
                    "endswith" => StrMethod::EndsWith,
                    other => return Err(format!("Unsupported string method: {}", other)),
                };
                let (pattern, case_sensitive, new_pos) = parse_str_args(tokens, pos + 4)?;
                expr = Expr::Str {
                    operand: Box::new(expr),
                    method,
                    pattern,
                    case_sensitive,
                };
                pos = new_pos;
            }
            "isnull" | "isna" | "notnull" | "notna" => {
                if tokens.get(pos + 2) != Some(&Token::LParen)
                    || tokens.get(pos + 3) != Some(&Token::RParen)
                {
                    return Err(format!("Expected '{}()'", method));
                }
                expr = Expr::Missing {
                    operand: Box::new(expr),
                    negated: method.starts_with("not"),
                };
                pos += 4;
            }
            other => return Err(format!("Unsupported method: {}", other)),
        }
    }

    Ok((expr, pos))
}

/// `( 'pattern' [, case=False] [, other=...]* )`
fn parse_str_args(
    tokens: &[Token],
    pos: usize,
) -> std::result::Result<(String, bool, usize), String> {
    if tokens.get(pos) != Some(&Token::LParen) {
        return Err("Expected '(' after string method".to_string());
    }
    let pattern = match tokens.get(pos + 1) {
        Some(Token::Str(s)) => s.clone(),
        other => return Err(format!("Expected a string pattern, found {:?}", other)),
    };

    let mut case_sensitive = true;
    let mut pos = pos + 2;
    while tokens.get(pos) == Some(&Token::Comma) {
        let name = match tokens.get(pos + 1) {
            Some(Token::Ident(name)) => name.clone(),
            other => return Err(format!("Expected keyword argument, found {:?}", other)),
        };
        if tokens.get(pos + 2) != Some(&Token::Assign) {
            return Err(format!("Expected '=' after '{}'", name));
        }
        let (value, new_pos) = parse_literal(tokens, pos + 3)?;
        if name == "case" {
            case_sensitive = value != Literal::Bool(false);
        }
        pos = new_pos;
    }

    if tokens.get(pos) != Some(&Token::RParen) {
        return Err("Expected ')' to close string method".to_string());
    }
    Ok((pattern, case_sensitive, pos + 1))
}

fn parse_list(tokens: &[Token], pos: usize) -> std::result::Result<(Vec<Literal>, usize), String> {
    let close = match tokens.get(pos) {
        Some(Token::LBracket) => Token::RBracket,
        Some(Token::LParen) => Token::RParen,
        other => return Err(format!("Expected a list after 'in', found {:?}", other)),
    };

    let mut items = Vec::new();
    let mut pos = pos + 1;
    if tokens.get(pos) == Some(&close) {
        return Ok((items, pos + 1));
    }

    loop {
        let (item, new_pos) = parse_literal(tokens, pos)?;
        items.push(item);
        pos = new_pos;
        match tokens.get(pos) {
            Some(Token::Comma) => {
                pos += 1;
                if tokens.get(pos) == Some(&close) {
                    return Ok((items, pos + 1));
                }
            }
            Some(t) if *t == close => return Ok((items, pos + 1)),
            other => return Err(format!("Expected ',' or end of list, found {:?}", other)),
        }
    }
}

fn parse_literal(tokens: &[Token], pos: usize) -> std::result::Result<(Literal, usize), String> {
    match tokens.get(pos) {
        Some(Token::Number(n)) => Ok((Literal::Number(*n), pos + 1)),
        Some(Token::Minus) => match tokens.get(pos + 1) {
            Some(Token::Number(n)) => Ok((Literal::Number(-*n), pos + 2)),
            other => Err(format!("Expected number after '-', found {:?}", other)),
        },
        Some(Token::Str(s)) => Ok((Literal::Text(s.clone()), pos + 1)),
        Some(Token::True) => Ok((Literal::Bool(true), pos + 1)),
        Some(Token::False) => Ok((Literal::Bool(false), pos + 1)),
        other => Err(format!("Expected a literal value, found {:?}", other)),
    }
}

fn parse_primary(tokens: &[Token], pos: usize, depth: usize) -> Parsed {
    match tokens.get(pos) {
        Some(Token::Column(name)) | Some(Token::Ident(name)) => {
            Ok((Expr::Column(name.clone()), pos + 1))
        }
        Some(Token::LParen) => {
            if depth >= MAX_NESTING {
                return Err(TOO_DEEP.to_string());
            }
            let (inner, pos) = parse_or(tokens, pos + 1, depth + 1)?;
            if tokens.get(pos) != Some(&Token::RParen) {
                return Err("Expected ')'".to_string());
            }
            Ok((inner, pos + 1))
        }
        Some(Token::Number(_))
        | Some(Token::Minus)
        | Some(Token::Str(_))
        | Some(Token::True)
        | Some(Token::False) => {
            let (literal, pos) = parse_literal(tokens, pos)?;
            Ok((Expr::Literal(literal), pos))
        }
        Some(other) => Err(format!("Unexpected token {:?}", other)),
        None => Err("Unexpected end of expression".to_string()),
    }
}

// ── Evaluation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    fn kind(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Bool(_) => "bool",
            Scalar::Number(_) => "number",
            Scalar::Text(_) => "text",
        }
    }

    fn from_cell(cell: &Cell) -> Scalar {
        match cell {
            Cell::Null => Scalar::Null,
            Cell::Number(n) => Scalar::Number(*n),
            Cell::Text(s) => Scalar::Text(s.clone()),
        }
    }

    fn from_literal(literal: &Literal) -> Scalar {
        match literal {
            Literal::Number(n) => Scalar::Number(*n),
            Literal::Text(s) => Scalar::Text(s.clone()),
            Literal::Bool(b) => Scalar::Bool(*b),
        }
    }
}

fn filter_err(msg: String) -> OrchestrationError {
    OrchestrationError::FilterError(msg)
}

fn eval(expr: &Expr, row: Row<'_>) -> Result<Scalar> {
    match expr {
        Expr::Column(name) => row
            .get(name)
            .map(Scalar::from_cell)
            .ok_or_else(|| filter_err(format!("name '{}' is not defined", name))),
        Expr::Literal(literal) => Ok(Scalar::from_literal(literal)),
        Expr::Compare { op, left, right } => {
            let left = eval(left, row)?;
            let right = eval(right, row)?;
            compare(*op, &left, &right).map(Scalar::Bool)
        }
        Expr::In {
            operand,
            items,
            negated,
        } => {
            let value = eval(operand, row)?;
            let mut found = false;
            for item in items {
                if compare(CompareOp::Eq, &value, &Scalar::from_literal(item))? {
                    found = true;
                    break;
                }
            }
            Ok(Scalar::Bool(found != *negated))
        }
        Expr::Str {
            operand,
            method,
            pattern,
            case_sensitive,
        } => match eval(operand, row)? {
            Scalar::Null => Ok(Scalar::Bool(false)),
            Scalar::Text(text) => {
                let (text, pattern) = if *case_sensitive {
                    (text, pattern.clone())
                } else {
                    (text.to_lowercase(), pattern.to_lowercase())
                };
                let hit = match method {
                    StrMethod::Contains => text.contains(&pattern),
                    StrMethod::StartsWith => text.starts_with(&pattern),
                    StrMethod::EndsWith => text.ends_with(&pattern),
                };
                Ok(Scalar::Bool(hit))
            }
            other => Err(filter_err(format!(
                "Can only use .str accessor with text values, got {}",
                other.kind()
            ))),
        },
        Expr::Missing { operand, negated } => {
            let missing = match eval(operand, row)? {
                Scalar::Null => true,
                Scalar::Text(s) => s.trim().is_empty(),
                _ => false,
            };
            Ok(Scalar::Bool(missing != *negated))
        }
        Expr::And(operands) => {
            for operand in operands {
                if !expect_bool(eval(operand, row)?)? {
                    return Ok(Scalar::Bool(false));
                }
            }
            Ok(Scalar::Bool(true))
        }
        Expr::Or(operands) => {
            for operand in operands {
                if expect_bool(eval(operand, row)?)? {
                    return Ok(Scalar::Bool(true));
                }
            }
            Ok(Scalar::Bool(false))
        }
        Expr::Not(inner) => Ok(Scalar::Bool(!expect_bool(eval(inner, row)?)?)),
    }
}

fn expect_bool(value: Scalar) -> Result<bool> {
    match value {
        Scalar::Bool(b) => Ok(b),
        other => Err(filter_err(format!(
            "Boolean operators need True/False operands, got {}",
            other.kind()
        ))),
    }
}

/// Null compares unequal to everything. Text that looks numeric is compared
/// numerically against numbers; other text/number mixes are only (un)equal.
fn compare(op: CompareOp, left: &Scalar, right: &Scalar) -> Result<bool> {
    let ordering = match (left, right) {
        (Scalar::Null, _) | (_, Scalar::Null) => return Ok(op == CompareOp::NotEq),
        (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
        (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Scalar::Text(t), Scalar::Number(n)) => match t.trim().parse::<f64>() {
            Ok(parsed) => parsed.partial_cmp(n),
            Err(_) => None,
        },
        (Scalar::Number(n), Scalar::Text(t)) => match t.trim().parse::<f64>() {
            Ok(parsed) => n.partial_cmp(&parsed),
            Err(_) => None,
        },
        _ => None,
    };

    match (op, ordering) {
        (CompareOp::Eq, ord) => Ok(ord == Some(Ordering::Equal)),
        (CompareOp::NotEq, ord) => Ok(ord != Some(Ordering::Equal)),
        (_, None) => Err(filter_err(format!(
            "'{}' not supported between {} and {}",
            op_symbol(op),
            left.kind(),
            right.kind()
        ))),
        (CompareOp::Lt, Some(ord)) => Ok(ord == Ordering::Less),
        (CompareOp::LtEq, Some(ord)) => Ok(ord != Ordering::Greater),
        (CompareOp::Gt, Some(ord)) => Ok(ord == Ordering::Greater),
        (CompareOp::GtEq, Some(ord)) => Ok(ord != Ordering::Less),
    }
}

fn op_symbol(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "==",
        CompareOp::NotEq => "!=",
        CompareOp::Lt => "<",
        CompareOp::LtEq => "<=",
        CompareOp::Gt => ">",
        CompareOp::GtEq => ">=",
    }
}
