// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! OpenSCAD parser using pest

use crate::ast::{
    Argument, BinaryOp, Binding, Expr, ExprKind, FunctionDef, FunctionLiteral, ListElement,
    Modifier, ModuleCall, ModuleDef, Parameter, Position, SourceFile, Statement, StatementKind,
    UnaryOp,
};
use crate::error::ParseError;
use pest::error::{ErrorVariant, InputLocation, LineColLocation};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use std::path::Path;
use std::sync::Arc;

#[derive(Parser)]
#[grammar = "io/scad.pest"]
struct ScadParser;

type Build<T> = Result<T, ParseError>;

/// Parse OpenSCAD source code into an AST
///
/// `origin` identifies the file for diagnostics and for resolving relative
/// `include`/`use` paths. Parsing stops at the first syntax error.
pub fn parse_scad(source: &str, origin: Option<&Path>) -> Result<SourceFile, ParseError> {
    let mut pairs = ScadParser::parse(Rule::program, source)
        .map_err(|err| convert_error(err, source, origin))?;

    let builder = AstBuilder { origin };
    let program = pairs
        .next()
        .ok_or_else(|| builder.malformed(Position::new(1, 1), "program"))?;

    let mut statements = Vec::new();
    for pair in program.into_inner() {
        if pair.as_rule() == Rule::statement {
            statements.push(builder.statement(pair)?);
        }
    }

    Ok(SourceFile {
        path: origin.map(Path::to_path_buf),
        statements: statements.into(),
    })
}

/// Parse a single expression, e.g. a `-D name=value` definition
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let wrapped = format!("__value = {};", source);
    let file = parse_scad(&wrapped, None)?;
    match file.statements.first().map(|s| &s.kind) {
        Some(StatementKind::Assignment { value, .. }) if file.statements.len() == 1 => {
            Ok(value.as_ref().clone())
        }
        _ => Err(ParseError {
            file: None,
            line: 1,
            column: 1,
            expected: vec!["a single expression".to_string()],
            found: source.to_string(),
        }),
    }
}

fn convert_error(err: pest::error::Error<Rule>, source: &str, origin: Option<&Path>) -> ParseError {
    let (line, column) = match err.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    let offset = match err.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };

    let mut expected: Vec<String> = match &err.variant {
        ErrorVariant::ParsingError { positives, .. } => {
            positives.iter().map(|rule| describe_rule(*rule)).collect()
        }
        ErrorVariant::CustomError { message } => vec![message.clone()],
    };
    expected.sort();
    expected.dedup();

    let found = match source.get(offset..).and_then(|rest| rest.chars().next()) {
        Some(c) => format!("'{}'", c),
        None => "end of input".to_string(),
    };

    ParseError {
        file: origin.map(Path::to_path_buf),
        line,
        column,
        expected,
        found,
    }
}

fn describe_rule(rule: Rule) -> String {
    let text = match rule {
        Rule::EOI => "end of input",
        Rule::statement | Rule::child_stmt => "statement",
        Rule::expr | Rule::ternary | Rule::primary | Rule::postfix | Rule::unary => "expression",
        Rule::ident => "identifier",
        Rule::number => "number",
        Rule::string => "string",
        Rule::file_path => "<file>",
        Rule::arguments | Rule::argument => "argument",
        Rule::parameters | Rule::parameter => "parameter",
        Rule::bindings | Rule::binding => "binding",
        Rule::list_element => "list element",
        Rule::op_or => "'||'",
        Rule::op_and => "'&&'",
        Rule::op_eq => "'=='",
        Rule::op_ne => "'!='",
        Rule::op_le => "'<='",
        Rule::op_ge => "'>='",
        Rule::op_lt => "'<'",
        Rule::op_gt => "'>'",
        Rule::op_add | Rule::op_plus => "'+'",
        Rule::op_sub | Rule::op_neg => "'-'",
        Rule::op_mul => "'*'",
        Rule::op_div => "'/'",
        Rule::op_mod => "'%'",
        Rule::op_pow => "'^'",
        Rule::op_not => "'!'",
        other => return format!("{:?}", other),
    };
    text.to_string()
}

fn position(pair: &Pair<Rule>) -> Position {
    let (line, column) = pair.as_span().start_pos().line_col();
    Position::new(line, column)
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_module
            | Rule::kw_function
            | Rule::kw_include
            | Rule::kw_use
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_for
            | Rule::kw_intersection_for
            | Rule::kw_let
            | Rule::kw_each
            | Rule::kw_echo
            | Rule::kw_assert
    )
}

/// Inner pairs with keyword tokens dropped
fn significant<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

struct AstBuilder<'a> {
    origin: Option<&'a Path>,
}

impl<'a> AstBuilder<'a> {
    fn malformed(&self, pos: Position, what: &str) -> ParseError {
        ParseError {
            file: self.origin.map(Path::to_path_buf),
            line: pos.line,
            column: pos.column,
            expected: vec![what.to_string()],
            found: "malformed input".to_string(),
        }
    }

    fn first<'i>(&self, pair: Pair<'i, Rule>, what: &str) -> Build<Pair<'i, Rule>> {
        let pos = position(&pair);
        significant(pair)
            .next()
            .ok_or_else(|| self.malformed(pos, what))
    }

    fn statement(&self, pair: Pair<Rule>) -> Build<Statement> {
        let pos = position(&pair);
        let inner = self.first(pair, "statement")?;

        let kind = match inner.as_rule() {
            Rule::empty_stmt => StatementKind::Empty,
            Rule::block => StatementKind::Block(self.block(inner)?),
            Rule::include_stmt => StatementKind::Include(self.file_path(inner)?),
            Rule::use_stmt => StatementKind::Use(self.file_path(inner)?),
            Rule::function_def => StatementKind::FunctionDef(Arc::new(self.function_def(inner)?)),
            Rule::module_def => StatementKind::ModuleDef(Arc::new(self.module_def(inner)?)),
            Rule::assignment => {
                let mut parts = significant(inner);
                let name = self.ident(parts.next(), pos)?;
                let value = self.expression_opt(parts.next(), pos)?;
                StatementKind::Assignment {
                    name,
                    value: Arc::new(value),
                }
            }
            Rule::module_inst => return self.module_inst(inner),
            _ => return Err(self.malformed(pos, "statement")),
        };

        Ok(Statement::new(kind, pos))
    }

    fn block(&self, pair: Pair<Rule>) -> Build<Arc<[Statement]>> {
        let statements = pair
            .into_inner()
            .filter(|p| p.as_rule() == Rule::statement)
            .map(|p| self.statement(p))
            .collect::<Build<Vec<_>>>()?;
        Ok(statements.into())
    }

    /// `;`, `{ ... }` or a single instantiation, always as a statement list
    fn child_stmt(&self, pair: Pair<Rule>) -> Build<Arc<[Statement]>> {
        let inner = self.first(pair, "statement")?;
        match inner.as_rule() {
            Rule::empty_stmt => Ok(Arc::from(Vec::new())),
            Rule::block => self.block(inner),
            Rule::module_inst => Ok(Arc::from(vec![self.module_inst(inner)?])),
            _ => Err(self.malformed(position(&inner), "statement")),
        }
    }

    fn file_path(&self, pair: Pair<Rule>) -> Build<String> {
        let pos = position(&pair);
        let path = self.first(pair, "<file>")?;
        let text = path.into_inner().next().map(|p| p.as_str()).unwrap_or("");
        if text.trim().is_empty() {
            return Err(self.malformed(pos, "<file>"));
        }
        Ok(text.trim().to_string())
    }

    fn function_def(&self, pair: Pair<Rule>) -> Build<FunctionDef> {
        let pos = position(&pair);
        let mut name = None;
        let mut params = Vec::new();
        let mut body = None;
        for part in significant(pair) {
            match part.as_rule() {
                Rule::ident => name = Some(part.as_str().to_string()),
                Rule::parameters => params = self.parameters(part)?,
                Rule::expr => body = Some(self.expression(part)?),
                _ => {}
            }
        }
        Ok(FunctionDef {
            name: name.ok_or_else(|| self.malformed(pos, "function name"))?,
            params,
            body: Arc::new(body.ok_or_else(|| self.malformed(pos, "function body"))?),
            pos,
        })
    }

    fn module_def(&self, pair: Pair<Rule>) -> Build<ModuleDef> {
        let pos = position(&pair);
        let mut name = None;
        let mut params = Vec::new();
        let mut body = None;
        for part in significant(pair) {
            match part.as_rule() {
                Rule::ident => name = Some(part.as_str().to_string()),
                Rule::parameters => params = self.parameters(part)?,
                Rule::child_stmt => body = Some(self.child_stmt(part)?),
                _ => {}
            }
        }
        Ok(ModuleDef {
            name: name.ok_or_else(|| self.malformed(pos, "module name"))?,
            params,
            body: body.ok_or_else(|| self.malformed(pos, "module body"))?,
            pos,
        })
    }

    fn module_inst(&self, pair: Pair<Rule>) -> Build<Statement> {
        let pos = position(&pair);
        let mut modifiers = Vec::new();
        let mut body = None;

        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::modifier => modifiers.push(match part.as_str() {
                    "!" => Modifier::Root,
                    "#" => Modifier::Highlight,
                    "%" => Modifier::Background,
                    _ => Modifier::Disable,
                }),
                _ => body = Some(self.instantiation(part)?),
            }
        }

        let mut stmt = body.ok_or_else(|| self.malformed(pos, "module instantiation"))?;
        for modifier in modifiers.into_iter().rev() {
            stmt = Statement::new(
                StatementKind::Modified {
                    modifier,
                    statement: Box::new(stmt),
                },
                pos,
            );
        }
        Ok(stmt)
    }

    fn instantiation(&self, pair: Pair<Rule>) -> Build<Statement> {
        let pos = position(&pair);
        let rule = pair.as_rule();
        let mut exprs = Vec::new();
        let mut children = Vec::new();
        let mut bindings = Vec::new();
        let mut args = Vec::new();
        let mut name = None;

        for part in significant(pair) {
            match part.as_rule() {
                Rule::expr => exprs.push(self.expression(part)?),
                Rule::child_stmt => children.push(self.child_stmt(part)?),
                Rule::bindings => bindings = self.bindings(part)?,
                Rule::arguments => args = self.arguments(part)?,
                Rule::ident => name = Some(part.as_str().to_string()),
                _ => {}
            }
        }

        let mut children = children.into_iter();
        let body = children
            .next()
            .ok_or_else(|| self.malformed(pos, "child statement"))?;

        let kind = match rule {
            Rule::if_stmt => StatementKind::If {
                condition: exprs
                    .pop()
                    .ok_or_else(|| self.malformed(pos, "condition"))?,
                then: body,
                otherwise: children.next(),
            },
            Rule::for_stmt | Rule::intersection_for_stmt => StatementKind::For {
                bindings,
                body,
                intersection: rule == Rule::intersection_for_stmt,
            },
            Rule::let_stmt => StatementKind::Let { bindings, body },
            Rule::echo_stmt => StatementKind::Echo { args, body },
            Rule::assert_stmt => StatementKind::Assert { args, body },
            Rule::module_call => StatementKind::Instantiate(ModuleCall {
                name: name.ok_or_else(|| self.malformed(pos, "module name"))?,
                args,
                children: body,
            }),
            _ => return Err(self.malformed(pos, "module instantiation")),
        };

        Ok(Statement::new(kind, pos))
    }

    fn parameters(&self, pair: Pair<Rule>) -> Build<Vec<Parameter>> {
        pair.into_inner()
            .map(|param| {
                let pos = position(&param);
                let mut parts = param.into_inner();
                let name = self.ident(parts.next(), pos)?;
                let default = match parts.next() {
                    Some(expr) => Some(Arc::new(self.expression(expr)?)),
                    None => None,
                };
                Ok(Parameter { name, default })
            })
            .collect()
    }

    fn arguments(&self, pair: Pair<Rule>) -> Build<Vec<Argument>> {
        pair.into_inner()
            .map(|arg| {
                let inner = self.first(arg, "argument")?;
                if inner.as_rule() == Rule::named_argument {
                    let pos = position(&inner);
                    let mut parts = inner.into_inner();
                    let name = self.ident(parts.next(), pos)?;
                    let value = self.expression_opt(parts.next(), pos)?;
                    Ok(Argument {
                        name: Some(name),
                        value: Arc::new(value),
                    })
                } else {
                    Ok(Argument {
                        name: None,
                        value: Arc::new(self.expression(inner)?),
                    })
                }
            })
            .collect()
    }

    fn bindings(&self, pair: Pair<Rule>) -> Build<Vec<Binding>> {
        pair.into_inner()
            .map(|binding| {
                let pos = position(&binding);
                let mut parts = binding.into_inner();
                let name = self.ident(parts.next(), pos)?;
                let value = self.expression_opt(parts.next(), pos)?;
                Ok(Binding {
                    name,
                    value: Arc::new(value),
                })
            })
            .collect()
    }

    fn ident(&self, pair: Option<Pair<Rule>>, pos: Position) -> Build<String> {
        match pair {
            Some(p) if p.as_rule() == Rule::ident => Ok(p.as_str().to_string()),
            _ => Err(self.malformed(pos, "identifier")),
        }
    }

    fn expression_opt(&self, pair: Option<Pair<Rule>>, pos: Position) -> Build<Expr> {
        match pair {
            Some(p) => self.expression(p),
            None => Err(self.malformed(pos, "expression")),
        }
    }

    fn expression(&self, pair: Pair<Rule>) -> Build<Expr> {
        let pos = position(&pair);
        match pair.as_rule() {
            Rule::expr | Rule::paren | Rule::primary => {
                let inner = self.first(pair, "expression")?;
                self.expression(inner)
            }
            Rule::function_literal => {
                let mut params = Vec::new();
                let mut body = None;
                for part in significant(pair) {
                    match part.as_rule() {
                        Rule::parameters => params = self.parameters(part)?,
                        _ => body = Some(self.expression(part)?),
                    }
                }
                let body = body.ok_or_else(|| self.malformed(pos, "function body"))?;
                Ok(Expr::new(
                    ExprKind::Function(Arc::new(FunctionLiteral {
                        params,
                        body: Arc::new(body),
                    })),
                    pos,
                ))
            }
            Rule::let_expr => {
                let mut parts = significant(pair);
                let bindings = match parts.next() {
                    Some(b) => self.bindings(b)?,
                    None => return Err(self.malformed(pos, "bindings")),
                };
                let body = self.expression_opt(parts.next(), pos)?;
                Ok(Expr::new(
                    ExprKind::Let {
                        bindings,
                        body: Box::new(body),
                    },
                    pos,
                ))
            }
            Rule::assert_expr | Rule::echo_expr => {
                let is_assert = pair.as_rule() == Rule::assert_expr;
                let mut args = Vec::new();
                let mut body = None;
                for part in significant(pair) {
                    match part.as_rule() {
                        Rule::arguments => args = self.arguments(part)?,
                        _ => body = Some(Box::new(self.expression(part)?)),
                    }
                }
                let kind = if is_assert {
                    ExprKind::Assert { args, body }
                } else {
                    ExprKind::Echo { args, body }
                };
                Ok(Expr::new(kind, pos))
            }
            Rule::ternary => {
                let mut parts = pair.into_inner();
                let condition = self.expression_opt(parts.next(), pos)?;
                match (parts.next(), parts.next()) {
                    (Some(then), Some(otherwise)) => Ok(Expr::new(
                        ExprKind::Ternary {
                            condition: Box::new(condition),
                            then: Box::new(self.expression(then)?),
                            otherwise: Box::new(self.expression(otherwise)?),
                        },
                        pos,
                    )),
                    _ => Ok(condition),
                }
            }
            Rule::logic_or
            | Rule::logic_and
            | Rule::equality
            | Rule::comparison
            | Rule::addition
            | Rule::multiplication => self.binary_chain(pair),
            Rule::unary => {
                let mut ops = Vec::new();
                let mut operand = None;
                for part in pair.into_inner() {
                    match part.as_rule() {
                        Rule::op_not => ops.push(UnaryOp::Not),
                        Rule::op_neg => ops.push(UnaryOp::Neg),
                        Rule::op_plus => ops.push(UnaryOp::Plus),
                        _ => operand = Some(self.expression(part)?),
                    }
                }
                let mut expr = operand.ok_or_else(|| self.malformed(pos, "expression"))?;
                for op in ops.into_iter().rev() {
                    expr = Expr::new(
                        ExprKind::Unary {
                            op,
                            operand: Box::new(expr),
                        },
                        pos,
                    );
                }
                Ok(expr)
            }
            Rule::exponent => {
                let mut parts = pair.into_inner().filter(|p| p.as_rule() != Rule::op_pow);
                let base = self.expression_opt(parts.next(), pos)?;
                match parts.next() {
                    Some(power) => Ok(Expr::new(
                        ExprKind::Binary {
                            op: BinaryOp::Pow,
                            lhs: Box::new(base),
                            rhs: Box::new(self.expression(power)?),
                        },
                        pos,
                    )),
                    None => Ok(base),
                }
            }
            Rule::postfix => {
                let mut parts = pair.into_inner();
                let mut expr = self.expression_opt(parts.next(), pos)?;
                for suffix in parts {
                    let at = position(&suffix);
                    let kind = match suffix.as_rule() {
                        Rule::call_suffix => {
                            let args = match suffix.into_inner().next() {
                                Some(args) => self.arguments(args)?,
                                None => Vec::new(),
                            };
                            ExprKind::Call {
                                callee: Box::new(expr),
                                args,
                            }
                        }
                        Rule::index_suffix => {
                            let index = self.expression_opt(suffix.into_inner().next(), at)?;
                            ExprKind::Index {
                                target: Box::new(expr),
                                index: Box::new(index),
                            }
                        }
                        _ => {
                            let name = self.ident(suffix.into_inner().next(), at)?;
                            ExprKind::Member {
                                target: Box::new(expr),
                                name,
                            }
                        }
                    };
                    expr = Expr::new(kind, at);
                }
                Ok(expr)
            }
            Rule::number => {
                let value: f64 = pair
                    .as_str()
                    .parse()
                    .map_err(|_| self.malformed(pos, "number"))?;
                Ok(Expr::new(ExprKind::Number(value), pos))
            }
            Rule::string => {
                let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
                Ok(Expr::new(ExprKind::Str(unescape(raw)), pos))
            }
            Rule::boolean => Ok(Expr::new(ExprKind::Bool(pair.as_str() == "true"), pos)),
            Rule::undef => Ok(Expr::new(ExprKind::Undef, pos)),
            Rule::ident => Ok(Expr::new(ExprKind::Ident(pair.as_str().to_string()), pos)),
            Rule::range => {
                let mut parts = pair
                    .into_inner()
                    .map(|p| self.expression(p))
                    .collect::<Build<Vec<_>>>()?;
                let (start, step, end) = match parts.len() {
                    2 => {
                        let end = parts.pop();
                        (parts.pop(), None, end)
                    }
                    3 => {
                        let end = parts.pop();
                        let step = parts.pop();
                        (parts.pop(), step, end)
                    }
                    _ => (None, None, None),
                };
                match (start, end) {
                    (Some(start), Some(end)) => Ok(Expr::new(
                        ExprKind::Range {
                            start: Box::new(start),
                            step: step.map(Box::new),
                            end: Box::new(end),
                        },
                        pos,
                    )),
                    _ => Err(self.malformed(pos, "range")),
                }
            }
            Rule::vector => {
                let elements = pair
                    .into_inner()
                    .map(|p| self.list_element(p))
                    .collect::<Build<Vec<_>>>()?;
                Ok(Expr::new(ExprKind::Vector(elements), pos))
            }
            _ => Err(self.malformed(pos, "expression")),
        }
    }

    fn binary_chain(&self, pair: Pair<Rule>) -> Build<Expr> {
        let pos = position(&pair);
        let mut parts = pair.into_inner();
        let mut lhs = self.expression_opt(parts.next(), pos)?;

        while let Some(op_pair) = parts.next() {
            let op = match op_pair.as_rule() {
                Rule::op_or => BinaryOp::Or,
                Rule::op_and => BinaryOp::And,
                Rule::op_eq => BinaryOp::Eq,
                Rule::op_ne => BinaryOp::Ne,
                Rule::op_lt => BinaryOp::Lt,
                Rule::op_le => BinaryOp::Le,
                Rule::op_gt => BinaryOp::Gt,
                Rule::op_ge => BinaryOp::Ge,
                Rule::op_add => BinaryOp::Add,
                Rule::op_sub => BinaryOp::Sub,
                Rule::op_mul => BinaryOp::Mul,
                Rule::op_div => BinaryOp::Div,
                Rule::op_mod => BinaryOp::Mod,
                _ => return Err(self.malformed(position(&op_pair), "operator")),
            };
            let rhs = self.expression_opt(parts.next(), pos)?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            );
        }

        Ok(lhs)
    }

    fn list_element(&self, pair: Pair<Rule>) -> Build<ListElement> {
        let pos = position(&pair);
        match pair.as_rule() {
            Rule::list_element | Rule::lc_paren | Rule::lc_generator => {
                let inner = self.first(pair, "list element")?;
                self.list_element(inner)
            }
            Rule::lc_for_c => {
                let mut parts = significant(pair);
                let (init, condition, update, body) =
                    match (parts.next(), parts.next(), parts.next(), parts.next()) {
                        (Some(init), Some(condition), Some(update), Some(body)) => (
                            self.bindings(init)?,
                            self.expression(condition)?,
                            self.bindings(update)?,
                            self.list_element(body)?,
                        ),
                        _ => return Err(self.malformed(pos, "for(init; condition; update)")),
                    };
                Ok(ListElement::ForC {
                    init,
                    condition: Box::new(condition),
                    update,
                    body: Box::new(body),
                })
            }
            Rule::lc_for | Rule::lc_let => {
                let is_for = pair.as_rule() == Rule::lc_for;
                let mut parts = significant(pair);
                let (bindings, body) = match (parts.next(), parts.next()) {
                    (Some(bindings), Some(body)) => {
                        (self.bindings(bindings)?, Box::new(self.list_element(body)?))
                    }
                    _ => return Err(self.malformed(pos, "list comprehension")),
                };
                Ok(if is_for {
                    ListElement::For { bindings, body }
                } else {
                    ListElement::Let { bindings, body }
                })
            }
            Rule::lc_each => {
                let inner = self.first(pair, "list element")?;
                Ok(ListElement::Each(Box::new(self.list_element(inner)?)))
            }
            Rule::lc_if => {
                let mut parts = significant(pair);
                let condition = self.expression_opt(parts.next(), pos)?;
                let then = match parts.next() {
                    Some(then) => self.list_element(then)?,
                    None => return Err(self.malformed(pos, "list element")),
                };
                let otherwise = match parts.next() {
                    Some(otherwise) => Some(Box::new(self.list_element(otherwise)?)),
                    None => None,
                };
                Ok(ListElement::If {
                    condition: Box::new(condition),
                    then: Box::new(then),
                    otherwise,
                })
            }
            _ => Ok(ListElement::Expr(self.expression(pair)?)),
        }
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some(kind @ ('x' | 'u' | 'U')) => {
                let digits = match kind {
                    'x' => 2,
                    'u' => 4,
                    _ => 6,
                };
                let mut hex = String::new();
                while hex.len() < digits {
                    match chars.peek() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            hex.push(*h);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if !hex.is_empty() => out.push(decoded),
                    _ => {
                        out.push('\\');
                        out.push(kind);
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}
