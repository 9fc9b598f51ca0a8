//! Guard expression evaluation.
//!
//! Guards come from stored workflow definitions and must be treated as
//! untrusted data, so this is a closed grammar (comparisons, boolean
//! connectives, field-path lookup, and a containment test) interpreted
//! directly over the payload.  The evaluator has no access to anything
//! beyond the payload it is handed: no filesystem, no network, no
//! process state, and it never mutates its input.
//!
//! ```text
//! expr    := or
//! or      := and ( ("||" | "or") and )*
//! and     := unary ( ("&&" | "and") unary )*
//! unary   := ("!" | "not") unary | cmp
//! cmp     := operand ( ("=="|"!="|"<"|"<="|">"|">=") operand
//!                    | "in" operand )?
//! operand := literal | path | "(" expr ")"
//! path    := ident ("." ident)*
//! literal := 'str' | "str" | number | true | false | null
//! ```

use serde_json::Value;
use thiserror::Error;

use capabilities::transform::lookup_path;

// ---------------------------------------------------------------------------
// GuardError
// ---------------------------------------------------------------------------

/// Failure to evaluate a guard expression.
///
/// Never fatal to a run: the navigator treats a failed evaluation as
/// "guard did not match" and records the failure in the trace.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GuardError {
    #[error("syntax error at offset {offset}: {detail}")]
    Syntax { offset: usize, detail: String },

    #[error("payload has no field '{0}'")]
    UndefinedField(String),

    #[error("type mismatch: cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("guard expression did not evaluate to a boolean")]
    NotBoolean,
}

/// Evaluate a guard expression against a payload.
pub fn evaluate(expression: &str, payload: &Value) -> Result<bool, GuardError> {
    let tokens = lex(expression)?;
    let ast = Parser::new(tokens).parse()?;
    match eval(&ast, payload)? {
        Value::Bool(flag) => Ok(flag),
        _ => Err(GuardError::NotBoolean),
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    In,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
}

fn syntax(offset: usize, detail: impl Into<String>) -> GuardError {
    GuardError::Syntax {
        offset,
        detail: detail.into(),
    }
}

fn lex(input: &str) -> Result<Vec<(usize, Token)>, GuardError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push((offset, Token::LParen));
            }
            ')' => {
                chars.next();
                tokens.push((offset, Token::RParen));
            }
            '&' => {
                chars.next();
                match chars.next() {
                    Some((_, '&')) => tokens.push((offset, Token::And)),
                    _ => return Err(syntax(offset, "expected '&&'")),
                }
            }
            '|' => {
                chars.next();
                match chars.next() {
                    Some((_, '|')) => tokens.push((offset, Token::Or)),
                    _ => return Err(syntax(offset, "expected '||'")),
                }
            }
            '=' => {
                chars.next();
                match chars.next() {
                    Some((_, '=')) => tokens.push((offset, Token::Eq)),
                    _ => return Err(syntax(offset, "expected '=='")),
                }
            }
            '!' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                    tokens.push((offset, Token::Ne));
                } else {
                    tokens.push((offset, Token::Not));
                }
            }
            '<' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                    tokens.push((offset, Token::Le));
                } else {
                    tokens.push((offset, Token::Lt));
                }
            }
            '>' => {
                chars.next();
                if matches!(chars.peek(), Some((_, '='))) {
                    chars.next();
                    tokens.push((offset, Token::Ge));
                } else {
                    tokens.push((offset, Token::Gt));
                }
            }
            quote @ ('\'' | '"') => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some((_, escaped @ ('\\' | '\'' | '"'))) => text.push(escaped),
                            _ => return Err(syntax(offset, "invalid escape in string literal")),
                        },
                        c if c == quote => {
                            closed = true;
                            break;
                        }
                        c => text.push(c),
                    }
                }
                if !closed {
                    return Err(syntax(offset, "unterminated string literal"));
                }
                tokens.push((offset, Token::Str(text)));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                text.push(c);
                chars.next();
                while let Some(&(_, digit)) = chars.peek() {
                    if digit.is_ascii_digit() || digit == '.' {
                        text.push(digit);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number: f64 = text
                    .parse()
                    .map_err(|_| syntax(offset, format!("invalid number '{text}'")))?;
                tokens.push((offset, Token::Num(number)));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let token = match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                };
                tokens.push((offset, token));
            }
            other => return Err(syntax(offset, format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug)]
enum Expr {
    Literal(Value),
    Path(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    In(Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<(usize, Token)>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse(mut self) -> Result<Expr, GuardError> {
        let expr = self.or_expr()?;
        match self.tokens.get(self.pos) {
            None => Ok(expr),
            Some((offset, _)) => Err(syntax(*offset, "unexpected trailing input")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(offset, _)| *offset)
            .unwrap_or(0)
    }

    fn or_expr(&mut self) -> Result<Expr, GuardError> {
        let mut left = self.and_expr()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, GuardError> {
        let mut left = self.unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, GuardError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, GuardError> {
        let left = self.operand()?;

        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::In) => {
                self.advance();
                let right = self.operand()?;
                return Ok(Expr::In(Box::new(left), Box::new(right)));
            }
            _ => return Ok(left),
        };
        self.advance();
        let right = self.operand()?;
        Ok(Expr::Cmp(op, Box::new(left), Box::new(right)))
    }

    fn operand(&mut self) -> Result<Expr, GuardError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(syntax(self.offset(), "expected ')'")),
                }
            }
            Some(Token::Str(text)) => Ok(Expr::Literal(Value::String(text))),
            Some(Token::Num(number)) => Ok(Expr::Literal(json_number(number))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(path)) => Ok(Expr::Path(path)),
            Some(token) => Err(syntax(offset, format!("unexpected token {token:?}"))),
            None => Err(syntax(offset, "unexpected end of expression")),
        }
    }
}

fn json_number(number: f64) -> Value {
    // Keep integral literals as integers so strict equality behaves.
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        Value::from(number)
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, payload: &Value) -> Result<Value, GuardError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(path) => lookup_path(payload, path)
            .cloned()
            .ok_or_else(|| GuardError::UndefinedField(path.clone())),
        Expr::Not(inner) => Ok(Value::Bool(!as_bool(eval(inner, payload)?)?)),
        // Connectives short-circuit, so an undefined field on the right
        // never surfaces when the left side already decides.
        Expr::And(left, right) => {
            if !as_bool(eval(left, payload)?)? {
                Ok(Value::Bool(false))
            } else {
                Ok(Value::Bool(as_bool(eval(right, payload)?)?))
            }
        }
        Expr::Or(left, right) => {
            if as_bool(eval(left, payload)?)? {
                Ok(Value::Bool(true))
            } else {
                Ok(Value::Bool(as_bool(eval(right, payload)?)?))
            }
        }
        Expr::Cmp(op, left, right) => {
            let left = eval(left, payload)?;
            let right = eval(right, payload)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
        Expr::In(needle, haystack) => {
            let needle = eval(needle, payload)?;
            let haystack = eval(haystack, payload)?;
            contains(&needle, &haystack).map(Value::Bool)
        }
    }
}

fn as_bool(value: Value) -> Result<bool, GuardError> {
    match value {
        Value::Bool(flag) => Ok(flag),
        _ => Err(GuardError::NotBoolean),
    }
}

/// Strict JSON equality with numeric unification (`1 == 1.0`).
fn json_eq(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, GuardError> {
    match op {
        CmpOp::Eq => return Ok(json_eq(left, right)),
        CmpOp::Ne => return Ok(!json_eq(left, right)),
        _ => {}
    }

    let ordering = match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            // as_f64 is total for serde_json numbers
            left.as_f64().partial_cmp(&right.as_f64())
        }
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    };

    let ordering = ordering.ok_or_else(|| GuardError::TypeMismatch {
        op: op.symbol(),
        left: type_name(left),
        right: type_name(right),
    })?;

    Ok(match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
        CmpOp::Eq | CmpOp::Ne => unreachable!(),
    })
}

fn contains(needle: &Value, haystack: &Value) -> Result<bool, GuardError> {
    match (needle, haystack) {
        (_, Value::Array(items)) => Ok(items.iter().any(|item| json_eq(needle, item))),
        (Value::String(n), Value::String(h)) => Ok(h.contains(n.as_str())),
        _ => Err(GuardError::TypeMismatch {
            op: "in",
            left: type_name(needle),
            right: type_name(haystack),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
