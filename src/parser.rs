//! Template parser and renderer.
//!
//! Consumes the flat token stream from [`crate::lexer`], nests it into a
//! tree of [`Node`]s (parsing each tag's expression text eagerly), and
//! renders that tree against a [`Context`]. The tree is immutable once
//! built; a [`Template`] can be rendered any number of times.

use std::collections::HashMap;

use crate::ast::{Expr, ForHeader};
use crate::context::Context;
use crate::error::{TemplateError, TemplateResult};
use crate::expr;
use crate::lexer::{self, Token};
use crate::value::Value;

/// A node in the parsed template tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// A literal text segment, emitted verbatim.
    Text(String),
    /// A `{% raw %}` section, emitted verbatim without expression parsing.
    Raw(String),
    /// A `{{ expression }}` substitution.
    Variable(Expr),
    /// An `{% if %}` conditional. The first branch is the `if` head, the
    /// rest are `elif` arms, tried in order.
    If {
        /// Condition/body pairs.
        branches: Vec<(Expr, Vec<Node>)>,
        /// Rendered when no branch matches.
        else_body: Vec<Node>,
    },
    /// A `{% for %}` loop.
    For {
        /// The parsed loop header.
        header: ForHeader,
        /// The loop body.
        body: Vec<Node>,
        /// Rendered when the loop body never ran.
        else_body: Vec<Node>,
    },
}

/// A parsed template, ready to render.
///
/// # Examples
///
/// ```
/// use jinja_rs::{Context, Template, Value};
///
/// let template = Template::parse("Hello {{ name }}!").unwrap();
/// let mut ctx = Context::new();
/// ctx.set("name", Value::from("world"));
/// assert_eq!(template.render(&mut ctx).unwrap(), "Hello world!");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// The top-level node list.
    pub nodes: Vec<Node>,
}

impl Template {
    /// Parses template source into a renderable tree.
    ///
    /// # Errors
    ///
    /// Returns any tokenizer error, a `Syntax` error for misplaced or
    /// unknown tags and for invalid tag expressions, and an
    /// `UnterminatedBlock` error when an `if`, `for`, or `raw` block is
    /// never closed.
    pub fn parse(source: &str) -> TemplateResult<Self> {
        let tokens = lexer::tokenize(source)?;
        let mut builder = TreeBuilder::new(&tokens);
        let nodes = builder.parse_nodes(Enclosing::TopLevel)?;
        tracing::debug!("parsed template with {} top-level nodes", nodes.len());
        Ok(Self { nodes })
    }

    /// Renders this template against a context.
    ///
    /// The context is borrowed mutably: the renderer binds loop targets and
    /// the synthetic `loop` variable while iterating.
    ///
    /// # Errors
    ///
    /// Returns the first evaluation or formatting error encountered.
    pub fn render(&self, ctx: &mut Context) -> TemplateResult<String> {
        render_nodes(&self.nodes, ctx)
    }
}

/// The construct the builder is currently nested inside. Decides which
/// terminal tokens end the current level and which are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Enclosing {
    TopLevel,
    If,
    For,
}

struct TreeBuilder<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TreeBuilder<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parses nodes until a terminal token for the enclosing construct or
    /// the end of input. The terminal token is left for the caller.
    fn parse_nodes(&mut self, enclosing: Enclosing) -> TemplateResult<Vec<Node>> {
        let mut nodes = Vec::new();

        while let Some(token) = self.tokens.get(self.pos) {
            match token {
                Token::Text(text) => {
                    nodes.push(Node::Text(text.clone()));
                    self.pos += 1;
                }
                Token::Raw(content) => {
                    nodes.push(Node::Raw(content.clone()));
                    self.pos += 1;
                }
                Token::Variable(text) => {
                    nodes.push(Node::Variable(expr::parse_expression(text)?));
                    self.pos += 1;
                }
                Token::If(_) => nodes.push(self.parse_if()?),
                Token::For(_) => nodes.push(self.parse_for()?),
                Token::Elif(_) => {
                    if enclosing == Enclosing::If {
                        break;
                    }
                    return Err(TemplateError::Syntax(
                        "'elif' found but not currently inside an 'if' block".to_string(),
                    ));
                }
                Token::EndIf => {
                    if enclosing == Enclosing::If {
                        break;
                    }
                    return Err(TemplateError::Syntax(
                        "'endif' found but not currently inside an 'if' block".to_string(),
                    ));
                }
                Token::Else => {
                    if enclosing != Enclosing::TopLevel {
                        break;
                    }
                    return Err(TemplateError::Syntax(
                        "'else' found but not currently inside an 'if' or 'for' block"
                            .to_string(),
                    ));
                }
                Token::EndFor => {
                    if enclosing == Enclosing::For {
                        break;
                    }
                    return Err(TemplateError::Syntax(
                        "'endfor' found but not currently inside a 'for' block".to_string(),
                    ));
                }
            }
        }

        Ok(nodes)
    }

    fn parse_if(&mut self) -> TemplateResult<Node> {
        let Some(Token::If(head_text)) = self.tokens.get(self.pos) else {
            return Err(TemplateError::Syntax("expected an 'if' tag".to_string()));
        };
        let head = expr::parse_expression(head_text)?;
        self.pos += 1;

        let body = self.parse_nodes(Enclosing::If)?;
        let mut branches = vec![(head, body)];
        let mut else_body = Vec::new();
        let mut seen_else = false;

        loop {
            match self.tokens.get(self.pos) {
                Some(Token::Elif(text)) if !seen_else => {
                    let condition = expr::parse_expression(text)?;
                    self.pos += 1;
                    let chunks = self.parse_nodes(Enclosing::If)?;
                    branches.push((condition, chunks));
                }
                Some(Token::Else) if !seen_else => {
                    seen_else = true;
                    self.pos += 1;
                    else_body = self.parse_nodes(Enclosing::If)?;
                }
                Some(Token::Elif(_) | Token::Else) => {
                    return Err(TemplateError::Syntax(
                        "unexpected tag after 'else' in an 'if' block".to_string(),
                    ));
                }
                Some(Token::EndIf) => {
                    self.pos += 1;
                    break;
                }
                Some(other) => {
                    return Err(TemplateError::Syntax(format!(
                        "unexpected token inside an 'if' block: {other:?}"
                    )));
                }
                None => {
                    return Err(TemplateError::UnterminatedBlock(
                        "missing 'endif' for an 'if' statement tag".to_string(),
                    ));
                }
            }
        }

        Ok(Node::If {
            branches,
            else_body,
        })
    }

    fn parse_for(&mut self) -> TemplateResult<Node> {
        let Some(Token::For(header_text)) = self.tokens.get(self.pos) else {
            return Err(TemplateError::Syntax("expected a 'for' tag".to_string()));
        };
        let header = expr::parse_for_header(header_text)?;
        self.pos += 1;

        let body = self.parse_nodes(Enclosing::For)?;
        let mut else_body = Vec::new();
        let mut seen_else = false;

        loop {
            match self.tokens.get(self.pos) {
                Some(Token::Else) if !seen_else => {
                    seen_else = true;
                    self.pos += 1;
                    else_body = self.parse_nodes(Enclosing::For)?;
                }
                Some(Token::Else) => {
                    return Err(TemplateError::Syntax(
                        "duplicate 'else' in a 'for' block".to_string(),
                    ));
                }
                Some(Token::EndFor) => {
                    self.pos += 1;
                    break;
                }
                Some(other) => {
                    return Err(TemplateError::Syntax(format!(
                        "unexpected token inside a 'for' block: {other:?}"
                    )));
                }
                None => {
                    return Err(TemplateError::UnterminatedBlock(
                        "missing 'endfor' for a 'for' loop tag".to_string(),
                    ));
                }
            }
        }

        Ok(Node::For {
            header,
            body,
            else_body,
        })
    }
}

/// Renders a node list by concatenation.
pub fn render_nodes(nodes: &[Node], ctx: &mut Context) -> TemplateResult<String> {
    let mut output = String::new();
    for node in nodes {
        output.push_str(&render_node(node, ctx)?);
    }
    Ok(output)
}

fn render_node(node: &Node, ctx: &mut Context) -> TemplateResult<String> {
    match node {
        Node::Text(text) | Node::Raw(text) => Ok(text.clone()),
        Node::Variable(expression) => expression.eval(ctx)?.to_display_string(),
        Node::If {
            branches,
            else_body,
        } => {
            for (condition, body) in branches {
                if condition.eval(ctx)?.is_truthy() {
                    return render_nodes(body, ctx);
                }
            }
            render_nodes(else_body, ctx)
        }
        Node::For {
            header,
            body,
            else_body,
        } => render_for_node(header, body, else_body, ctx),
    }
}

/// Renders a for-loop node: computes the iterable, binds targets and the
/// `loop` state per iteration, and falls back to the else branch when the
/// body never ran.
fn render_for_node(
    header: &ForHeader,
    body: &[Node],
    else_body: &[Node],
    ctx: &mut Context,
) -> TemplateResult<String> {
    let items = collect_loop_items(header, ctx)?;

    // The `loop` name is shadowed for the duration of the iteration; any
    // prior binding is restored afterwards.
    let saved_loop = ctx.remove("loop");
    let result = run_loop(header, body, &items, ctx);
    match saved_loop {
        Some(previous) => ctx.set("loop", previous),
        None => {
            ctx.remove("loop");
        }
    }

    let (output, rendered_any) = result?;
    if !rendered_any {
        return render_nodes(else_body, ctx);
    }
    Ok(output)
}

fn run_loop(
    header: &ForHeader,
    body: &[Node],
    items: &[Value],
    ctx: &mut Context,
) -> TemplateResult<(String, bool)> {
    let mut output = String::new();
    let mut rendered_any = false;

    for (idx, item) in items.iter().enumerate() {
        bind_targets(&header.targets, item, ctx)?;
        ctx.set("loop", loop_state(idx, items));

        // A false loop filter skips the body, but the iteration still
        // counts toward the loop.* state.
        let run_body = match &header.condition {
            Some(condition) => condition.eval(ctx)?.is_truthy(),
            None => true,
        };
        if run_body {
            output.push_str(&render_nodes(body, ctx)?);
            rendered_any = true;
        }
    }

    Ok((output, rendered_any))
}

/// Computes the sequence a for-loop iterates over.
///
/// A single expression dispatches on its kind: lists iterate elements,
/// dicts iterate `[key, value]` pairs, strings iterate characters, and any
/// other value iterates once over itself. Several expressions form the
/// sequence directly.
fn collect_loop_items(header: &ForHeader, ctx: &Context) -> TemplateResult<Vec<Value>> {
    if header.iterable.len() == 1 {
        let value = header.iterable[0].eval(ctx)?;
        Ok(match value {
            Value::List(items) => items,
            Value::Dict(map) => map
                .into_iter()
                .map(|(key, val)| Value::List(vec![key, val]))
                .collect(),
            Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
            other => vec![other],
        })
    } else {
        header.iterable.iter().map(|e| e.eval(ctx)).collect()
    }
}

/// Binds the loop item onto the target list.
fn bind_targets(targets: &[String], item: &Value, ctx: &mut Context) -> TemplateResult<()> {
    if targets.len() == 1 {
        ctx.set(targets[0].as_str(), item.clone());
        return Ok(());
    }
    let Value::List(values) = item else {
        return Err(TemplateError::AssignmentArity(
            "cannot assign a single value to multiple targets".to_string(),
        ));
    };
    if values.len() != targets.len() {
        return Err(TemplateError::AssignmentArity(format!(
            "cannot assign {} values to {} targets",
            values.len(),
            targets.len()
        )));
    }
    for (target, value) in targets.iter().zip(values) {
        ctx.set(target.as_str(), value.clone());
    }
    Ok(())
}

/// Builds the synthetic `loop` dict for one iteration.
fn loop_state(idx: usize, items: &[Value]) -> Value {
    let total = items.len();
    let mut state = HashMap::new();
    let mut insert = |key: &str, value: Value| {
        state.insert(Value::Str(key.to_string()), value);
    };

    insert("index", Value::Int((idx + 1) as i64));
    insert("index0", Value::Int(idx as i64));
    insert("revindex", Value::Int((total - idx) as i64));
    insert("revindex0", Value::Int((total - idx - 1) as i64));
    insert("first", Value::Bool(idx == 0));
    insert("last", Value::Bool(idx == total - 1));
    insert("length", Value::Int(total as i64));
    insert("depth", Value::Int(1));
    insert("depth0", Value::Int(0));
    insert(
        "previtem",
        if idx > 0 {
            items[idx - 1].clone()
        } else {
            Value::Undefined
        },
    );
    insert(
        "nextitem",
        if idx + 1 < total {
            items[idx + 1].clone()
        } else {
            Value::Undefined
        },
    );

    Value::Dict(state)
}
