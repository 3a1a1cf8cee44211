//! Boolean filter expressions for the in-memory store.
//!
//! Supports the commonly used subset of the Milvus expression language:
//!
//! | Form | Example |
//! |------|---------|
//! | comparison | `age > 20`, `title == "intro"`, `score <= 0.5` |
//! | membership | `id in [1, 2, 3]`, `tag not in ["a", "b"]` |
//! | pattern | `title like "intro%"` |
//! | boolean | `a > 1 and (b == 2 or not c == 3)`, `&&`, `||`, `!` |
//!
//! A missing field compares as null: every comparison against it is false
//! (and `!=` / `not in` are true).

use anyhow::{bail, Result};
use serde_json::Value;

use crate::models::Row;

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every row (empty expression).
    All,
    Cmp {
        field: String,
        op: CmpOp,
        value: Literal,
    },
    In {
        field: String,
        values: Vec<Literal>,
        negated: bool,
    },
    Like {
        field: String,
        pattern: String,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Num(f64),
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Num(f64),
    Str(String),
    Op(CmpOp),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    And,
    Or,
    Not,
    In,
    Like,
    True,
    False,
}

/// Parse a filter expression. An empty or whitespace-only string yields
/// [`Filter::All`].
pub fn parse(expr: &str) -> Result<Filter> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Ok(Filter::All);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let filter = parser.or_expr()?;
    if parser.pos != parser.tokens.len() {
        bail!(
            "unexpected token {:?} in filter expression '{}'",
            parser.tokens[parser.pos],
            expr
        );
    }
    Ok(filter)
}

impl Filter {
    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Filter::All => true,
            Filter::Cmp { field, op, value } => compare(row.get(field), *op, value),
            Filter::In {
                field,
                values,
                negated,
            } => {
                let found = values
                    .iter()
                    .any(|v| compare(row.get(field), CmpOp::Eq, v));
                found != *negated
            }
            Filter::Like { field, pattern } => match row.get(field) {
                Some(Value::String(s)) => like(s, pattern),
                _ => false,
            },
            Filter::And(a, b) => a.matches(row) && b.matches(row),
            Filter::Or(a, b) => a.matches(row) || b.matches(row),
            Filter::Not(inner) => !inner.matches(row),
        }
    }
}

fn compare(actual: Option<&Value>, op: CmpOp, expected: &Literal) -> bool {
    let ordering = match (actual, expected) {
        (Some(Value::Number(n)), Literal::Num(e)) => {
            n.as_f64().and_then(|a| a.partial_cmp(e))
        }
        (Some(Value::String(s)), Literal::Str(e)) => Some(s.as_str().cmp(e.as_str())),
        (Some(Value::Bool(b)), Literal::Bool(e)) => {
            return match op {
                CmpOp::Eq => b == e,
                CmpOp::Ne => b != e,
                _ => false,
            }
        }
        _ => None,
    };
    match ordering {
        Some(o) => match op {
            CmpOp::Eq => o.is_eq(),
            CmpOp::Ne => o.is_ne(),
            CmpOp::Gt => o.is_gt(),
            CmpOp::Ge => o.is_ge(),
            CmpOp::Lt => o.is_lt(),
            CmpOp::Le => o.is_le(),
        },
        None => op == CmpOp::Ne,
    }
}

/// SQL-style `%` wildcard match.
fn like(s: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return s == pattern;
    }
    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !s.starts_with(first) || s.len() < first.len() + last.len() || !s.ends_with(last) {
        return false;
    }
    let mut rest = &s[first.len()..s.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(i) => rest = &rest[i + part.len()..],
            None => return false,
        }
    }
    true
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
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
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => bail!("unterminated string literal in filter expression"),
                        Some('\\') if chars.get(i + 1).is_some() => {
                            s.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            '=' | '!' | '<' | '>' => {
                let next = chars.get(i + 1).copied();
                let (tok, width) = match (c, next) {
                    ('=', Some('=')) => (Token::Op(CmpOp::Eq), 2),
                    ('!', Some('=')) => (Token::Op(CmpOp::Ne), 2),
                    ('>', Some('=')) => (Token::Op(CmpOp::Ge), 2),
                    ('<', Some('=')) => (Token::Op(CmpOp::Le), 2),
                    ('>', _) => (Token::Op(CmpOp::Gt), 1),
                    ('<', _) => (Token::Op(CmpOp::Lt), 1),
                    ('!', _) => (Token::Not, 1),
                    _ => bail!("unexpected '=' in filter expression (use '==')"),
                };
                tokens.push(tok);
                i += width;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    bail!("unexpected '{}' in filter expression", c);
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            c if c.is_ascii_digit() || c == '-' || c == '.' => {
                let start = i;
                i += 1;
                while i < chars.len() {
                    let exponent_sign =
                        matches!(chars[i], '+' | '-') && matches!(chars[i - 1], 'e' | 'E');
                    if !(chars[i].is_ascii_digit()
                        || matches!(chars[i], '.' | 'e' | 'E')
                        || exponent_sign)
                    {
                        break;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid number '{}' in filter expression", text))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_ascii_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "like" => Token::Like,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word),
                });
            }
            other => bail!("unexpected character '{}' in filter expression", other),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            other => bail!("expected {:?} in filter expression, found {:?}", expected, other),
        }
    }

    fn or_expr(&mut self) -> Result<Filter> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and_expr()?;
            left = Filter::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Filter> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.unary()?;
            left = Filter::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Filter> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Filter::Not(Box::new(self.unary()?)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.or_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            _ => self.predicate(),
        }
    }

    fn predicate(&mut self) -> Result<Filter> {
        let field = match self.next() {
            Some(Token::Ident(name)) => name,
            other => bail!("expected field name in filter expression, found {:?}", other),
        };

        match self.next() {
            Some(Token::Op(op)) => Ok(Filter::Cmp {
                field,
                op,
                value: self.literal()?,
            }),
            Some(Token::In) => Ok(Filter::In {
                field,
                values: self.list()?,
                negated: false,
            }),
            Some(Token::Not) => {
                self.expect(Token::In)?;
                Ok(Filter::In {
                    field,
                    values: self.list()?,
                    negated: true,
                })
            }
            Some(Token::Like) => match self.next() {
                Some(Token::Str(pattern)) => Ok(Filter::Like { field, pattern }),
                other => bail!("expected string pattern after 'like', found {:?}", other),
            },
            other => bail!(
                "expected operator after '{}' in filter expression, found {:?}",
                field,
                other
            ),
        }
    }

    fn literal(&mut self) -> Result<Literal> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Literal::Num(n)),
            Some(Token::Str(s)) => Ok(Literal::Str(s)),
            Some(Token::True) => Ok(Literal::Bool(true)),
            Some(Token::False) => Ok(Literal::Bool(false)),
            other => bail!("expected literal in filter expression, found {:?}", other),
        }
    }

    fn list(&mut self) -> Result<Vec<Literal>> {
        self.expect(Token::LBracket)?;
        let mut values = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.pos += 1;
            return Ok(values);
        }
        loop {
            values.push(self.literal()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => break,
                other => bail!("expected ',' or ']' in filter list, found {:?}", other),
            }
        }
        Ok(values)
    }
}
