//! Calculation formulas.
//!
//! A formula has the shape `target = expression`, where the expression is an
//! arithmetic expression over field ids and decimal literals using `+ - * /`
//! and parentheses. Formulas are parsed once when a hint document is loaded
//! and evaluated by walking the resulting tree against a field lookup.

use std::collections::BTreeSet;
use std::fmt;

/// Error produced while parsing a formula or checking it against its group.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    /// No `=` separating target and expression
    #[error("Formula has no assignment: {0}")]
    MissingAssignment(String),

    /// Left-hand side is not a single field id
    #[error("Invalid formula target: '{0}'")]
    InvalidTarget(String),

    /// Character outside the formula grammar
    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedCharacter { ch: char, offset: usize },

    /// Token in a position the grammar does not allow
    #[error("Unexpected token '{found}' at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    /// Expression ended while more input was expected
    #[error("Unexpected end of formula")]
    UnexpectedEnd,

    /// Numeric literal that does not parse
    #[error("Invalid number literal: '{0}'")]
    InvalidNumber(String),

    /// Formula assigns a field other than the one owning the group
    #[error("Formula targets '{found}' but belongs to field '{expected}'")]
    TargetMismatch { expected: String, found: String },

    /// Formula reads a field that is not listed as a dependency
    #[error("Formula reads '{0}' which is not a declared dependency")]
    UndeclaredDependency(String),

    /// Declared dependency that the formula never reads
    #[error("Declared dependency '{0}' does not appear in the formula")]
    UnusedDependency(String),
}

/// Error produced while evaluating a parsed formula.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// Right operand of `/` evaluated to zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Lookup had no numeric value for a referenced field
    #[error("No numeric value for field '{0}'")]
    UnknownField(String),

    /// Arithmetic overflowed to infinity or NaN
    #[error("Result is not a finite number")]
    NonFiniteResult,
}

/// Arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(&self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
        }
    }
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Decimal literal
    Literal(f64),
    /// Value of another field
    FieldRef(String),
    /// Unary minus
    Negate(Box<Expr>),
    /// Binary arithmetic
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn collect_refs(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Literal(_) => {}
            Expr::FieldRef(id) => {
                out.insert(id.clone());
            }
            Expr::Negate(inner) => inner.collect_refs(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_refs(out);
                rhs.collect_refs(out);
            }
        }
    }

    fn eval<F>(&self, lookup: &F) -> Result<f64, EvalError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        match self {
            Expr::Literal(value) => Ok(*value),
            Expr::FieldRef(id) => lookup(id).ok_or_else(|| EvalError::UnknownField(id.clone())),
            Expr::Negate(inner) => Ok(-inner.eval(lookup)?),
            Expr::Binary { op, lhs, rhs } => {
                let l = lhs.eval(lookup)?;
                let r = rhs.eval(lookup)?;
                match op {
                    BinaryOp::Add => Ok(l + r),
                    BinaryOp::Sub => Ok(l - r),
                    BinaryOp::Mul => Ok(l * r),
                    BinaryOp::Div => {
                        if r == 0.0 {
                            Err(EvalError::DivisionByZero)
                        } else {
                            Ok(l / r)
                        }
                    }
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::FieldRef(id) => write!(f, "{}", id),
            Expr::Negate(inner) => write!(f, "-({})", inner),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
        }
    }
}

/// A parsed `target = expression` formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    target: String,
    expr: Expr,
    references: BTreeSet<String>,
}

impl Formula {
    /// Parse formula source text.
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let (lhs, rhs) = source
            .split_once('=')
            .ok_or_else(|| FormulaError::MissingAssignment(source.to_string()))?;

        let target = lhs.trim();
        if !is_identifier(target) {
            return Err(FormulaError::InvalidTarget(target.to_string()));
        }

        // Offsets in errors are relative to the expression, not the whole line.
        let tokens = tokenize(rhs)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_expr()?;
        if let Some(token) = parser.peek() {
            return Err(FormulaError::UnexpectedToken {
                found: token.kind.to_string(),
                offset: token.offset,
            });
        }

        let mut references = BTreeSet::new();
        expr.collect_refs(&mut references);

        Ok(Self {
            target: target.to_string(),
            expr,
            references,
        })
    }

    /// Field this formula assigns.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Expression tree.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Field ids read by the expression.
    pub fn references(&self) -> &BTreeSet<String> {
        &self.references
    }

    /// Evaluate the expression with IEEE-754 double arithmetic.
    pub fn evaluate<F>(&self, lookup: F) -> Result<f64, EvalError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let value = self.expr.eval(&lookup)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EvalError::NonFiniteResult)
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.target, self.expr)
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::Ident(id) => write!(f, "{}", id),
            TokenKind::Op(op) => write!(f, "{}", op.symbol()),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        if ch.is_ascii_digit() || ch == '.' {
            let mut literal = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_digit() || c == '.' {
                    literal.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = literal
                .parse::<f64>()
                .map_err(|_| FormulaError::InvalidNumber(literal.clone()))?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                offset,
            });
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let mut ident = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token {
                kind: TokenKind::Ident(ident),
                offset,
            });
            continue;
        }

        let kind = match ch {
            '+' => TokenKind::Op(BinaryOp::Add),
            '-' => TokenKind::Op(BinaryOp::Sub),
            '*' => TokenKind::Op(BinaryOp::Mul),
            '/' => TokenKind::Op(BinaryOp::Div),
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            _ => return Err(FormulaError::UnexpectedCharacter { ch, offset }),
        };
        tokens.push(Token { kind, offset });
        chars.next();
    }

    Ok(tokens)
}

/// Recursive-descent parser; `*` and `/` bind tighter than `+` and `-`,
/// operators of equal precedence associate left.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
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

    fn peek_op(&self, ops: &[BinaryOp]) -> Option<BinaryOp> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Op(op),
                ..
            }) if ops.contains(op) => Some(*op),
            _ => None,
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.parse_term()?;
        while let Some(op) = self.peek_op(&[BinaryOp::Add, BinaryOp::Sub]) {
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.peek_op(&[BinaryOp::Mul, BinaryOp::Div]) {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek_op(&[BinaryOp::Add, BinaryOp::Sub]) {
            Some(BinaryOp::Sub) => {
                self.pos += 1;
                Ok(Expr::Negate(Box::new(self.parse_unary()?)))
            }
            Some(_) => {
                self.pos += 1;
                self.parse_unary()
            }
            None => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        let token = self.next().ok_or(FormulaError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Literal(value)),
            TokenKind::Ident(id) => Ok(Expr::FieldRef(id)),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(other) => Err(FormulaError::UnexpectedToken {
                        found: other.kind.to_string(),
                        offset: other.offset,
                    }),
                    None => Err(FormulaError::UnexpectedEnd),
                }
            }
            other => Err(FormulaError::UnexpectedToken {
                found: other.to_string(),
                offset: token.offset,
            }),
        }
    }
}
