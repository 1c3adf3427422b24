//! # jinja-rs
//!
//! A Jinja2-compatible template engine: text interleaved with `{{ ... }}`
//! expression substitutions and `{% ... %}` control tags, rendered against a
//! dynamically typed variable context.
//!
//! ## Features
//!
//! - **Expression language**: Python-like operator precedence, literals
//!   (strings, ints, floats, booleans, `None`, lists, dicts), arithmetic
//!   with numeric promotion, comparisons, and short-circuiting `and`/`or`
//! - **Filters and tests**: `{{ value|filter }}` chains and
//!   `value is test` clauses, with `int`, `bool`, and `defined` built in
//! - **Callables**: user-registered functions invokable as `name(args)`
//!   with positional and named arguments and per-parameter defaults
//! - **Control flow**: `{% if %}`/`{% elif %}`/`{% else %}`/`{% endif %}`,
//!   `{% for %}`/`{% else %}`/`{% endfor %}` with the full `loop.*` state,
//!   and `{% raw %}`/`{% endraw %}` verbatim sections
//! - **Host binding**: context values convert from `serde_json` host data
//!
//! ## Quick Start
//!
//! ```
//! use jinja_rs::{Context, Template, Value};
//!
//! let template = Template::parse("Hello {{ name }}!").unwrap();
//!
//! let mut ctx = Context::new();
//! ctx.set("name", Value::from("world"));
//!
//! assert_eq!(template.render(&mut ctx).unwrap(), "Hello world!");
//! ```
//!
//! ## Loops
//!
//! ```
//! use jinja_rs::{Context, Template, Value};
//!
//! let template = Template::parse(
//!     "{% for item in seq %}{{ loop.index }}:{{ item }} {% endfor %}",
//! ).unwrap();
//!
//! let mut ctx = Context::new();
//! ctx.set("seq", Value::from(vec!["a", "b"]));
//!
//! assert_eq!(template.render(&mut ctx).unwrap(), "1:a 2:b ");
//! ```

// These clippy lints are intentionally suppressed for this crate:
// - cast_possible_truncation/wrap/sign_loss: loop counters bridge between
//   usize and the i64 value model
// - cast_precision_loss: i64 -> f64 is acceptable for template numerics
// - float_cmp: value equality is defined bitwise-adjacent on purpose
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::float_cmp,
    clippy::must_use_candidate,
    clippy::missing_errors_doc
)]

pub mod ast;
pub mod context;
pub mod error;
pub mod eval;
pub mod expr;
pub mod lexer;
pub mod parser;
pub mod value;

// Re-export the most commonly used types.
pub use context::{CallArg, Callable, Context, Param};
pub use error::{TemplateError, TemplateResult};
pub use parser::{Node, Template};
pub use value::Value;
