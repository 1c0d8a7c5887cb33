//! Restricted condition expressions
//!
//! Conditions are parsed into a small AST and evaluated directly against an
//! [`ExecutionContext`]. The grammar only has literals, variable lookups,
//! comparisons, membership and boolean connectives:
//!
//! ```text
//! expr    := or
//! or      := and (("or" | "||") and)*
//! and     := not (("and" | "&&") not)*
//! not     := ("not" | "!") not | compare
//! compare := operand (("==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "contains") operand)?
//! operand := number | string | true | false | null | path | "${" path "}" | "(" expr ")"
//! ```
//!
//! Unknown variables evaluate to null. Ordering comparisons between values
//! of different kinds are evaluation errors.

use std::cmp::Ordering;

use serde_json::Value as JsonValue;

use crate::workflow::ExecutionContext;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Path(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Contains,
    LParen,
    RParen,
}

impl Token {
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::Number(_)
                | Token::Str(_)
                | Token::Path(_)
                | Token::True
                | Token::False
                | Token::Null
                | Token::RParen
        )
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let next_eq = chars.get(i + 1) == Some(&'=');
                let token = match (c, next_eq) {
                    ('=', true) => Token::Eq,
                    ('!', true) => Token::Ne,
                    ('<', true) => Token::Le,
                    ('>', true) => Token::Ge,
                    ('<', false) => Token::Lt,
                    ('>', false) => Token::Gt,
                    ('!', false) => Token::Not,
                    _ => {
                        return Err(Error::Condition(format!(
                            "unexpected '=' at offset {} in '{}'",
                            i, src
                        )));
                    }
                };
                tokens.push(token);
                i += if next_eq { 2 } else { 1 };
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(Error::Condition(format!(
                        "expected '{}{}' at offset {} in '{}'",
                        c, c, i, src
                    )));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(Error::Condition(format!(
                                "unterminated string in '{}'",
                                src
                            )));
                        }
                        Some('\\') => {
                            if let Some(escaped) = chars.get(i + 1) {
                                value.push(*escaped);
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            value.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
            }
            '$' if chars.get(i + 1) == Some(&'{') => {
                let start = i + 2;
                let end = chars[start..]
                    .iter()
                    .position(|ch| *ch == '}')
                    .map(|p| start + p)
                    .ok_or_else(|| {
                        Error::Condition(format!("unterminated '${{' in '{}'", src))
                    })?;
                let path: String = chars[start..end].iter().collect();
                let path = path.trim();
                if path.is_empty() {
                    return Err(Error::Condition(format!("empty variable in '{}'", src)));
                }
                tokens.push(Token::Path(path.to_string()));
                i = end + 1;
            }
            c if c.is_ascii_digit()
                || (c == '-'
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())
                    && !tokens.last().is_some_and(Token::ends_operand)) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse::<f64>().map_err(|_| {
                    Error::Condition(format!("invalid number '{}' in '{}'", text, src))
                })?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "contains" => Token::Contains,
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    "null" | "None" => Token::Null,
                    _ => Token::Path(word),
                };
                tokens.push(token);
            }
            other => {
                return Err(Error::Condition(format!(
                    "unexpected character '{}' at offset {} in '{}'",
                    other, i, src
                )));
            }
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Contains,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(JsonValue),
    Var(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    src: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, message: &str) -> Error {
        Error::Condition(format!("{} in '{}'", message, self.src))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Expr> {
        let left = self.parse_operand()?;
        let op = match self.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            Some(Token::Lt) => CompareOp::Lt,
            Some(Token::Le) => CompareOp::Le,
            Some(Token::Gt) => CompareOp::Gt,
            Some(Token::Ge) => CompareOp::Ge,
            Some(Token::In) => CompareOp::In,
            Some(Token::Contains) => CompareOp::Contains,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_operand()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_operand(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(JsonValue::String(s))),
            Some(Token::True) => Ok(Expr::Literal(JsonValue::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(JsonValue::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(JsonValue::Null)),
            Some(Token::Path(p)) => Ok(Expr::Var(p)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(self.error("expected ')'")),
                }
            }
            Some(other) => Err(self.error(&format!("unexpected token {:?}", other))),
            None => Err(self.error("unexpected end of expression")),
        }
    }
}

fn number_value(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

/// JSON truthiness: null, false, zero, empty strings and empty collections
/// are false
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_values(a: &JsonValue, b: &JsonValue) -> Result<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y)
                .ok_or_else(|| Error::Condition("cannot order NaN".to_string()))
        }
        (JsonValue::String(x), JsonValue::String(y)) => Ok(x.cmp(y)),
        _ => Err(Error::Condition(format!(
            "cannot order {} against {}",
            a, b
        ))),
    }
}

fn membership(needle: &JsonValue, haystack: &JsonValue) -> Result<bool> {
    match haystack {
        JsonValue::Array(items) => Ok(items.iter().any(|item| values_equal(item, needle))),
        JsonValue::String(s) => match needle {
            JsonValue::String(n) => Ok(s.contains(n.as_str())),
            other => Err(Error::Condition(format!(
                "cannot search a string for {}",
                other
            ))),
        },
        JsonValue::Object(map) => match needle {
            JsonValue::String(key) => Ok(map.contains_key(key)),
            other => Err(Error::Condition(format!("object keys are strings, got {}", other))),
        },
        JsonValue::Null => Ok(false),
        other => Err(Error::Condition(format!("{} is not a collection", other))),
    }
}

impl Expr {
    fn eval(&self, ctx: &ExecutionContext) -> Result<JsonValue> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Var(path) => Ok(ctx.lookup(path).cloned().unwrap_or(JsonValue::Null)),
            Expr::Not(inner) => Ok(JsonValue::Bool(!is_truthy(&inner.eval(ctx)?))),
            Expr::And(l, r) => {
                if !is_truthy(&l.eval(ctx)?) {
                    return Ok(JsonValue::Bool(false));
                }
                Ok(JsonValue::Bool(is_truthy(&r.eval(ctx)?)))
            }
            Expr::Or(l, r) => {
                if is_truthy(&l.eval(ctx)?) {
                    return Ok(JsonValue::Bool(true));
                }
                Ok(JsonValue::Bool(is_truthy(&r.eval(ctx)?)))
            }
            Expr::Compare(op, l, r) => {
                let (a, b) = (l.eval(ctx)?, r.eval(ctx)?);
                let result = match op {
                    CompareOp::Eq => values_equal(&a, &b),
                    CompareOp::Ne => !values_equal(&a, &b),
                    CompareOp::Lt => compare_values(&a, &b)? == Ordering::Less,
                    CompareOp::Le => compare_values(&a, &b)? != Ordering::Greater,
                    CompareOp::Gt => compare_values(&a, &b)? == Ordering::Greater,
                    CompareOp::Ge => compare_values(&a, &b)? != Ordering::Less,
                    CompareOp::In => membership(&a, &b)?,
                    CompareOp::Contains => membership(&b, &a)?,
                };
                Ok(JsonValue::Bool(result))
            }
        }
    }
}

/// A parsed condition, ready to evaluate
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(src: &str) -> Result<Self> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Err(Error::Condition("empty condition".to_string()));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            src,
        };
        let expr = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.error("trailing tokens"));
        }
        Ok(Self {
            source: src.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, ctx: &ExecutionContext) -> Result<bool> {
        Ok(is_truthy(&self.expr.eval(ctx)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::from_input(json!({
            "score": 0.8,
            "count": 3,
            "status": "ok",
            "tags": ["urgent", "billing"],
            "user": {"name": "ada", "admin": false},
            "blank": ""
        }))
    }

    fn eval(src: &str) -> bool {
        Condition::parse(src).unwrap().evaluate(&ctx()).unwrap()
    }

    #[test]
    fn test_comparisons() {
        assert!(eval("score > 0.5"));
        assert!(eval("count >= 3"));
        assert!(eval("count == 3.0"));
        assert!(!eval("count < 3"));
        assert!(eval("status == 'ok'"));
        assert!(eval("${user.name} != \"bob\""));
        assert!(eval("-1 < count"));
    }

    #[test]
    fn test_boolean_connectives() {
        assert!(eval("score > 0.5 and status == 'ok'"));
        assert!(eval("user.admin || count == 3"));
        assert!(eval("not user.admin"));
        assert!(eval("!(count > 10) && (status == 'ok' or false)"));
        assert!(!eval("user.admin and missing.value > 1"));
    }

    #[test]
    fn test_membership() {
        assert!(eval("'urgent' in tags"));
        assert!(eval("tags contains 'billing'"));
        assert!(eval("'ad' in user.name"));
        assert!(eval("'name' in user"));
        assert!(!eval("'x' in missing"));
    }

    #[test]
    fn test_truthiness() {
        assert!(eval("tags"));
        assert!(!eval("blank"));
        assert!(!eval("missing"));
        assert!(eval("missing == null"));
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "count ==", "count = 3", "(count > 1", "a & b", "'open", "count > 1 2"] {
            assert!(
                matches!(Condition::parse(bad), Err(Error::Condition(_))),
                "expected parse error for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_evaluation_error_on_mixed_ordering() {
        let cond = Condition::parse("status > 3").unwrap();
        assert!(matches!(cond.evaluate(&ctx()), Err(Error::Condition(_))));
    }

    #[test]
    fn test_no_code_execution() {
        assert!(Condition::parse("__import__('os')").is_err());
        assert!(Condition::parse("count; drop").is_err());
    }
}
