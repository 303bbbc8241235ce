//! Constraint expression parsing.
//!
//! The upstream producer of the pipeline: turns textual constraint
//! expressions into the binary [`Constraint`] list and [`LoopDeclaration`]s
//! the [synthesizer](crate::synth::Synthesizer) consumes.
//!
//! # Grammar
//!
//! ```text
//! expr := expr OP expr | '(' expr ')' suffix? | taskName suffix?
//! OP   := '|' | '&' | '>' | ',' | '*'      (decreasing precedence)
//! suffix := '?' | '+'
//! ```
//!
//! All operators are right-associative. `|` is choice (mutual exclusion),
//! `&` and `,` are parallel composition, `>` is sequence, and `*` is loop
//! composition: its whole expression forms a repeatable body, ordered like a
//! sequence within one iteration. A `?` suffix marks the tasks of its
//! sub-expression as *optional* loop members (run between the exit and the
//! jump back); `+` marks them mandatory, which is also the default.
//!
//! # Decomposition
//!
//! Multi-way operators decompose into all pairwise binary constraints: every
//! task of the left operand against every task of the right one, for each
//! operator node. `A > B > C` therefore yields `A>B`, `A>C`, `B>C` — the
//! transitive pair included, which keeps each constraint independently
//! checkable.
//!
//! Input is line-oriented; empty lines are skipped and every error carries
//! the 1-based line and column of the offending token.

use std::collections::BTreeSet;

use crate::constraint::{Constraint, Relation};
use crate::loops::LoopDeclaration;
use crate::{Error, Result};

/// Everything one parse produced.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Pairwise constraints, in source order (duplicates included; the
    /// constraint set deduplicates on insertion).
    pub constraints: Vec<Constraint>,
    /// One declaration per `*` expression.
    pub loops: Vec<LoopDeclaration>,
}

/// Parses a whole multi-line input.
///
/// # Errors
///
/// Returns [`Error::Parse`] with line/column context for lexical errors,
/// unbalanced parentheses, missing operands, and suffixes outside a loop
/// expression.
///
/// # Examples
///
/// ```rust
/// use flowforge::parse::parse_lines;
///
/// let outcome = parse_lines("A > B > C\nD | E\n").unwrap();
/// assert_eq!(outcome.constraints.len(), 4);
/// assert!(outcome.loops.is_empty());
/// ```
pub fn parse_lines(input: &str) -> Result<ParseOutcome> {
    let mut outcome = ParseOutcome::default();
    for (index, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (constraints, loops) = parse_line(line, index + 1)?;
        outcome.constraints.extend(constraints);
        outcome.loops.extend(loops);
    }
    Ok(outcome)
}

/// Parses a single expression line.
fn parse_line(line: &str, line_no: usize) -> Result<(Vec<Constraint>, Vec<LoopDeclaration>)> {
    let tokens = lex(line, line_no)?;
    let mut parser = Parser {
        tokens,
        position: 0,
        line: line_no,
    };
    let expr = parser.parse_expr(0)?;
    if let Some(token) = parser.peek() {
        return Err(Error::Parse {
            message: format!("unexpected trailing {}", token.describe()),
            line: line_no,
            column: token.column,
        });
    }

    let mut constraints = Vec::new();
    let mut loops = Vec::new();
    collect(&expr, &mut constraints, &mut loops);

    if has_suffix(&expr) && !has_loop(&expr) {
        return Err(Error::Parse {
            message: "loop membership suffix outside a '*' expression".to_string(),
            line: line_no,
            column: 1,
        });
    }
    Ok((constraints, loops))
}

/// One lexical token with its source column.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    kind: TokenKind,
    column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Name(String),
    Operator(char),
    Suffix(char),
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Name(name) => format!("task name '{name}'"),
            TokenKind::Operator(op) => format!("operator '{op}'"),
            TokenKind::Suffix(suffix) => format!("suffix '{suffix}'"),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
        }
    }
}

/// Tokenizes one line.
fn lex(line: &str, line_no: usize) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = line.chars().collect();
    let mut position = 0;
    while position < chars.len() {
        let column = position + 1;
        let c = chars[position];
        match c {
            c if c.is_whitespace() => {
                position += 1;
            }
            '|' | '&' | '>' | ',' | '*' => {
                tokens.push(Token {
                    kind: TokenKind::Operator(c),
                    column,
                });
                position += 1;
            }
            '?' | '+' => {
                tokens.push(Token {
                    kind: TokenKind::Suffix(c),
                    column,
                });
                position += 1;
            }
            '(' => {
                tokens.push(Token {
                    kind: TokenKind::LParen,
                    column,
                });
                position += 1;
            }
            ')' => {
                tokens.push(Token {
                    kind: TokenKind::RParen,
                    column,
                });
                position += 1;
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = position;
                while position < chars.len()
                    && (chars[position].is_alphanumeric()
                        || chars[position] == '_'
                        || chars[position] == '-')
                {
                    position += 1;
                }
                let name: String = chars[start..position].iter().collect();
                tokens.push(Token {
                    kind: TokenKind::Name(name),
                    column,
                });
            }
            other => {
                return Err(Error::Parse {
                    message: format!("unexpected character '{other}'"),
                    line: line_no,
                    column,
                });
            }
        }
    }
    Ok(tokens)
}

/// An expression tree before decomposition.
#[derive(Debug, Clone)]
enum Expr {
    Task(String),
    Binary {
        op: char,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Suffixed {
        suffix: char,
        inner: Box<Expr>,
    },
}

/// Binding strength; `|` binds tightest.
fn precedence(op: char) -> u8 {
    match op {
        '|' => 5,
        '&' => 4,
        '>' => 3,
        ',' => 2,
        '*' => 1,
        _ => 0,
    }
}

/// Recursive-descent precedence climber over the token list.
struct Parser {
    tokens: Vec<Token>,
    position: usize,
    line: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn error_here(&self, message: String) -> Error {
        let column = self
            .peek()
            .map_or_else(|| self.tokens.last().map_or(1, |t| t.column + 1), |t| t.column);
        Error::Parse {
            message,
            line: self.line,
            column,
        }
    }

    /// Parses expressions with at least the given binding strength.
    /// Right-associative: the recursive call reuses the operator's own
    /// precedence.
    fn parse_expr(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.parse_primary()?;
        while let Some(token) = self.peek() {
            let TokenKind::Operator(op) = &token.kind else {
                break;
            };
            let op = *op;
            let prec = precedence(op);
            if prec < min_precedence {
                break;
            }
            self.advance();
            let right = self.parse_expr(prec)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// Parses a task name or a parenthesized expression, plus an optional
    /// membership suffix.
    fn parse_primary(&mut self) -> Result<Expr> {
        let Some(token) = self.advance() else {
            return Err(self.error_here("missing operand".to_string()));
        };
        let mut expr = match token.kind {
            TokenKind::Name(name) => Expr::Task(name),
            TokenKind::LParen => {
                let inner = self.parse_expr(0)?;
                match self.advance() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => inner,
                    Some(other) => {
                        return Err(Error::Parse {
                            message: format!("expected ')', found {}", other.describe()),
                            line: self.line,
                            column: other.column,
                        });
                    }
                    None => {
                        return Err(self.error_here("unclosed '('".to_string()));
                    }
                }
            }
            other_kind => {
                return Err(Error::Parse {
                    message: format!(
                        "expected a task name or '(', found {}",
                        Token {
                            kind: other_kind,
                            column: token.column
                        }
                        .describe()
                    ),
                    line: self.line,
                    column: token.column,
                });
            }
        };
        if let Some(Token {
            kind: TokenKind::Suffix(suffix),
            ..
        }) = self.peek()
        {
            let suffix = *suffix;
            self.advance();
            expr = Expr::Suffixed {
                suffix,
                inner: Box::new(expr),
            };
        }
        Ok(expr)
    }
}

/// All task names of an expression, in source order.
fn task_names(expr: &Expr) -> Vec<String> {
    match expr {
        Expr::Task(name) => vec![name.clone()],
        Expr::Binary { left, right, .. } => {
            let mut names = task_names(left);
            names.extend(task_names(right));
            names
        }
        Expr::Suffixed { inner, .. } => task_names(inner),
    }
}

/// Task names marked with the `?` suffix anywhere below `expr`.
fn optional_names(expr: &Expr) -> BTreeSet<String> {
    match expr {
        Expr::Task(_) => BTreeSet::new(),
        Expr::Binary { left, right, .. } => {
            let mut names = optional_names(left);
            names.extend(optional_names(right));
            names
        }
        Expr::Suffixed { suffix, inner } => {
            if *suffix == '?' {
                task_names(inner).into_iter().collect()
            } else {
                optional_names(inner)
            }
        }
    }
}

fn has_suffix(expr: &Expr) -> bool {
    match expr {
        Expr::Task(_) => false,
        Expr::Binary { left, right, .. } => has_suffix(left) || has_suffix(right),
        Expr::Suffixed { .. } => true,
    }
}

fn has_loop(expr: &Expr) -> bool {
    match expr {
        Expr::Task(_) => false,
        Expr::Binary { op, left, right } => *op == '*' || has_loop(left) || has_loop(right),
        Expr::Suffixed { inner, .. } => has_loop(inner),
    }
}

/// Decomposes an expression into pairwise constraints and loop declarations.
fn collect(expr: &Expr, constraints: &mut Vec<Constraint>, loops: &mut Vec<LoopDeclaration>) {
    match expr {
        Expr::Task(_) => {}
        Expr::Suffixed { inner, .. } => collect(inner, constraints, loops),
        Expr::Binary { op, left, right } => {
            collect(left, constraints, loops);
            collect(right, constraints, loops);

            let relation = match op {
                '|' => Relation::Exclusive,
                '&' | ',' => Relation::Parallel,
                // a loop body is ordered like a sequence within one iteration
                '>' | '*' => Relation::Before,
                _ => unreachable!("lexer only admits known operators"),
            };
            for left_name in task_names(left) {
                for right_name in task_names(right) {
                    if left_name != right_name {
                        constraints.push(Constraint::new(relation, &left_name, &right_name));
                    }
                }
            }

            if *op == '*' {
                let optional = {
                    let mut names = optional_names(left);
                    names.extend(optional_names(right));
                    names
                };
                let mandatory: BTreeSet<String> = task_names(expr)
                    .into_iter()
                    .filter(|name| !optional.contains(name))
                    .collect();
                loops.push(LoopDeclaration {
                    mandatory,
                    optional,
                });
            }
        }
    }
}
