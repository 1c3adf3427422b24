//! The dynamic value model shared by the evaluator and the renderer.
//!
//! [`Value`] covers every runtime type an expression can produce: the
//! `Undefined` sentinel, `None`, booleans, 64-bit integers and floats,
//! strings, lists, and dictionaries. Coercions are explicit methods rather
//! than a single polymorphic conversion, so every call site dispatches
//! exhaustively on the value kind.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::error::{TemplateError, TemplateResult};

/// A dynamic template value.
#[derive(Debug, Clone)]
pub enum Value {
    /// The sentinel for missing bindings and unfilled required arguments.
    Undefined,
    /// The `None` literal.
    None,
    /// A boolean, from a `true`/`false` literal or a logical operator.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit IEEE-754 float.
    Float(f64),
    /// A string. Iterating one yields single-character strings.
    Str(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A mapping keyed by value equality. Iteration order is unspecified.
    Dict(HashMap<Value, Value>),
}

impl Value {
    /// Returns a short name for this value's kind, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
        }
    }

    /// Returns `true` if this value is the `Undefined` sentinel.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Returns `true` if this value is considered truthy.
    ///
    /// - `Undefined` and `None` are falsy
    /// - `Bool` is itself
    /// - Numbers are truthy when nonzero (NaN is falsy)
    /// - Strings, lists, and dicts are truthy when non-empty
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0 && !f.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Dict(d) => !d.is_empty(),
        }
    }

    /// Converts this value to an integer.
    ///
    /// Booleans become 0/1, floats truncate, strings parse as decimal.
    ///
    /// # Errors
    ///
    /// Returns a `Coercion` error for malformed strings and for kinds with
    /// no integer interpretation.
    pub fn as_int(&self) -> TemplateResult<i64> {
        match self {
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Int(i) => Ok(*i),
            Self::Float(f) => Ok(*f as i64),
            Self::Str(s) => s.parse::<i64>().map_err(|_| {
                TemplateError::Coercion(format!("cannot convert string '{s}' to an integer"))
            }),
            other => Err(TemplateError::Coercion(format!(
                "cannot convert a {} value to an integer",
                other.type_name()
            ))),
        }
    }

    /// Converts this value to a float.
    ///
    /// # Errors
    ///
    /// Returns a `Coercion` error for malformed strings and for kinds with
    /// no numeric interpretation.
    pub fn as_float(&self) -> TemplateResult<f64> {
        match self {
            Self::Bool(b) => Ok(f64::from(u8::from(*b))),
            Self::Int(i) => Ok(*i as f64),
            Self::Float(f) => Ok(*f),
            Self::Str(s) => s.parse::<f64>().map_err(|_| {
                TemplateError::Coercion(format!("cannot convert string '{s}' to a float"))
            }),
            other => Err(TemplateError::Coercion(format!(
                "cannot convert a {} value to a float",
                other.type_name()
            ))),
        }
    }

    /// Formats this value for substitution output.
    ///
    /// Numbers use their canonical decimal form, booleans are lowercase
    /// `true`/`false`, `None` prints as `None`, lists print as `[a, b, c]`
    /// with items formatted recursively, and dicts print as `{'k': v}` with
    /// string keys and string values quoted. Dict entry order is whatever the
    /// underlying map yields.
    ///
    /// # Errors
    ///
    /// Returns a `Coercion` error for `Undefined`, which has no printable
    /// form.
    pub fn to_display_string(&self) -> TemplateResult<String> {
        match self {
            Self::Undefined => Err(TemplateError::Coercion(
                "cannot format an undefined value".to_string(),
            )),
            Self::None => Ok("None".to_string()),
            Self::Bool(b) => Ok(b.to_string()),
            Self::Int(i) => Ok(i.to_string()),
            Self::Float(f) => Ok(f.to_string()),
            Self::Str(s) => Ok(s.clone()),
            Self::List(items) => {
                let mut inner = Vec::with_capacity(items.len());
                for item in items {
                    inner.push(item.to_display_string()?);
                }
                Ok(format!("[{}]", inner.join(", ")))
            }
            Self::Dict(map) => {
                let mut inner = Vec::with_capacity(map.len());
                for (key, val) in map {
                    inner.push(format!("{}: {}", quoted(key)?, quoted(val)?));
                }
                Ok(format!("{{{}}}", inner.join(", ")))
            }
        }
    }
}

/// Formats a dict key or value, quoting strings.
fn quoted(value: &Value) -> TemplateResult<String> {
    match value {
        Value::Str(s) => Ok(format!("'{s}'")),
        other => other.to_display_string(),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            // NaN equals NaN here so the Eq contract holds for dict keys.
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Undefined => state.write_u8(0),
            Self::None => state.write_u8(1),
            Self::Bool(b) => {
                state.write_u8(2);
                b.hash(state);
            }
            Self::Int(i) => {
                state.write_u8(3);
                i.hash(state);
            }
            Self::Float(f) => {
                state.write_u8(4);
                // Normalize so that hash agrees with equality: all NaNs
                // collapse to one bit pattern and -0.0 folds into 0.0.
                let bits = if f.is_nan() {
                    f64::NAN.to_bits()
                } else if *f == 0.0 {
                    0.0f64.to_bits()
                } else {
                    f.to_bits()
                };
                bits.hash(state);
            }
            Self::Str(s) => {
                state.write_u8(5);
                s.hash(state);
            }
            Self::List(items) => {
                state.write_u8(6);
                for item in items {
                    item.hash(state);
                }
            }
            Self::Dict(map) => {
                state.write_u8(7);
                // Entry order is unspecified, so combine entry hashes with
                // an order-independent XOR.
                let mut combined: u64 = 0;
                for entry in map {
                    let mut entry_hasher = std::collections::hash_map::DefaultHasher::new();
                    entry.hash(&mut entry_hasher);
                    combined ^= entry_hasher.finish();
                }
                state.write_u64(combined);
                state.write_usize(map.len());
            }
        }
    }
}

// ── From implementations ─────────────────────────────────────────────

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        match o {
            Some(v) => v.into(),
            None => Self::None,
        }
    }
}
