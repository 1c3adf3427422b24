//! Expression AST node types.
//!
//! The parser in [`crate::expr`] builds these; the evaluator in
//! [`crate::eval`] interprets them. Bare names, calls, and attribute
//! accesses are distinct nodes, so name resolution happens at evaluation
//! time. ASTs are immutable after parse.

use crate::value::Value;

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `==`
    Eq,
    /// `!=` or `<>`
    Ne,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `in`
    In,
    /// `not in`
    NotIn,
}

/// A binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `//`
    FloorDiv,
    /// `**`
    Pow,
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `+` (identity on numbers)
    Plus,
    /// `-`
    Minus,
    /// `~` (computes `-(x + 1)` on integers)
    Invert,
}

/// An argument at a call site: `expr` or `name=expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    /// The parameter name for named arguments; `None` means positional.
    pub name: Option<String>,
    /// The argument expression.
    pub value: Expr,
}

/// A filter application in a pipe chain: `name` or `name(args)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    /// The filter name.
    pub name: String,
    /// Extra arguments; the chained value is always prepended at invocation.
    pub args: Vec<Arg>,
}

/// A test clause: `is name`, `is not name`, with optional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct TestClause {
    /// The test name.
    pub name: String,
    /// Whether the result is negated (`is not`).
    pub negated: bool,
    /// Extra arguments; the tested value is always prepended at invocation.
    pub args: Vec<Arg>,
}

/// An expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal value (string, int, float, bool, or `None`).
    Literal(Value),
    /// A bare name, resolved against the context at evaluation time.
    Name(String),
    /// A list display: `[a, b, c]`.
    List(Vec<Expr>),
    /// A dict display: `{k: v, ...}`.
    Dict(Vec<(Expr, Expr)>),
    /// An attribute access trailer: `base.name`.
    Attr {
        /// The expression the trailer applies to.
        base: Box<Expr>,
        /// The attribute name.
        name: String,
    },
    /// A call trailer: `base(args)`. Only a bare [`Expr::Name`] base is
    /// invokable; anything else fails at evaluation time.
    Call {
        /// The expression the trailer applies to.
        base: Box<Expr>,
        /// The call arguments, positional then named.
        args: Vec<Arg>,
    },
    /// A unary operation: `-x`, `+x`, `~x`.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// A binary arithmetic operation.
    Binary {
        /// The operator.
        op: BinOp,
        /// The left operand.
        lhs: Box<Expr>,
        /// The right operand.
        rhs: Box<Expr>,
    },
    /// A comparison chain: `a < b < c` evaluates pairwise and ANDs the
    /// results.
    Compare {
        /// The leftmost operand.
        first: Box<Expr>,
        /// The operator/operand pairs to its right.
        rest: Vec<(CmpOp, Expr)>,
    },
    /// `not x`.
    Not(Box<Expr>),
    /// Short-circuiting conjunction of two or more operands.
    And(Vec<Expr>),
    /// Short-circuiting disjunction of two or more operands.
    Or(Vec<Expr>),
    /// A power-level pipeline: an input expression threaded through a filter
    /// chain and an optional trailing test clause.
    Pipeline {
        /// The expression feeding the chain.
        input: Box<Expr>,
        /// Filters applied left to right.
        filters: Vec<FilterCall>,
        /// The optional `is [not] name` clause.
        test: Option<TestClause>,
    },
}

/// The parsed header of a `{% for %}` tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ForHeader {
    /// The assignment targets left of `in`.
    pub targets: Vec<String>,
    /// The expressions right of `in`. A single expression is iterated by
    /// kind; several expressions form the iterable themselves.
    pub iterable: Vec<Expr>,
    /// The optional `if` filter evaluated per candidate.
    pub condition: Option<Expr>,
    /// Whether the `recursive` modifier was present.
    pub recursive: bool,
}
