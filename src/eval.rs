//! Expression evaluation.
//!
//! Walks an [`Expr`] bottom-up against a [`Context`], producing a [`Value`]
//! or a kinded error. Arithmetic promotes Float over Int over String
//! concatenation; comparisons are defined for integers (plus `in`/`not in`
//! membership); `and`/`or` short-circuit through truthiness.

use std::collections::HashMap;

use crate::ast::{Arg, BinOp, CmpOp, Expr, UnaryOp};
use crate::context::{CallArg, Context};
use crate::error::{TemplateError, TemplateResult};
use crate::value::Value;

impl Expr {
    /// Evaluates this expression against a context.
    ///
    /// # Errors
    ///
    /// Returns `NameLookup` for unbound names and unknown filters, tests, or
    /// callables; `TypeMismatch` for undefined operator/operand
    /// combinations; `Coercion` when an operand cannot be converted; and
    /// `CallOnNonCallable` when a call trailer is applied to anything but a
    /// bare name.
    pub fn eval(&self, ctx: &Context) -> TemplateResult<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Name(name) => lookup_name(name, ctx),
            Self::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.eval(ctx)?);
                }
                Ok(Value::List(values))
            }
            Self::Dict(entries) => {
                let mut map = HashMap::new();
                for (key, value) in entries {
                    map.insert(key.eval(ctx)?, value.eval(ctx)?);
                }
                Ok(Value::Dict(map))
            }
            Self::Attr { base, name } => {
                let base_val = base.eval(ctx)?;
                match base_val {
                    Value::Dict(map) => map
                        .get(&Value::Str(name.clone()))
                        .cloned()
                        .ok_or_else(|| {
                            TemplateError::NameLookup(format!(
                                "key '{name}' was not found in the dictionary"
                            ))
                        }),
                    other => Err(TemplateError::TypeMismatch(format!(
                        "attribute access '.{name}' is not supported on a {} value",
                        other.type_name()
                    ))),
                }
            }
            Self::Call { base, args } => match base.as_ref() {
                Self::Name(name) => {
                    let callable = ctx.callable(name).ok_or_else(|| {
                        TemplateError::NameLookup(format!(
                            "the callable '{name}' was not found"
                        ))
                    })?;
                    let call_args = eval_args(args, ctx)?;
                    callable.invoke(call_args)
                }
                _ => Err(TemplateError::CallOnNonCallable(
                    "only a bare name can be called".to_string(),
                )),
            },
            Self::Unary { op, operand } => eval_unary(*op, &operand.eval(ctx)?),
            Self::Binary { op, lhs, rhs } => {
                let left = lhs.eval(ctx)?;
                let right = rhs.eval(ctx)?;
                eval_binary(*op, &left, &right)
            }
            Self::Compare { first, rest } => {
                let mut left = first.eval(ctx)?;
                let mut result = true;
                for (op, rhs_expr) in rest {
                    let right = rhs_expr.eval(ctx)?;
                    result = result && compare_pair(*op, &left, &right)?;
                    left = right;
                }
                Ok(Value::Bool(result))
            }
            Self::Not(inner) => Ok(Value::Bool(!inner.eval(ctx)?.is_truthy())),
            Self::And(operands) => {
                for operand in operands {
                    if !operand.eval(ctx)?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            Self::Or(operands) => {
                for operand in operands {
                    if operand.eval(ctx)?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Self::Pipeline {
                input,
                filters,
                test,
            } => {
                // With a trailing test clause, a bare unbound name resolves
                // to Undefined instead of failing, so `x is defined` works
                // when x has no binding.
                let mut current = if test.is_some() {
                    match input.as_ref() {
                        Self::Name(name) => {
                            ctx.get(name).cloned().unwrap_or(Value::Undefined)
                        }
                        other => other.eval(ctx)?,
                    }
                } else {
                    input.eval(ctx)?
                };

                for filter in filters {
                    let callable = ctx.filter(&filter.name).ok_or_else(|| {
                        TemplateError::NameLookup(format!(
                            "the filter '{}' was not found",
                            filter.name
                        ))
                    })?;
                    let mut call_args = vec![CallArg::positional(current)];
                    call_args.extend(eval_args(&filter.args, ctx)?);
                    current = callable.invoke(call_args)?;
                }

                if let Some(test) = test {
                    let callable = ctx.test(&test.name).ok_or_else(|| {
                        TemplateError::NameLookup(format!(
                            "the test '{}' was not found",
                            test.name
                        ))
                    })?;
                    let mut call_args = vec![CallArg::positional(current)];
                    call_args.extend(eval_args(&test.args, ctx)?);
                    let result = callable.invoke(call_args)?;
                    if test.negated {
                        current = Value::Bool(!result.is_truthy());
                    } else {
                        current = result;
                    }
                }

                Ok(current)
            }
        }
    }
}

fn lookup_name(name: &str, ctx: &Context) -> TemplateResult<Value> {
    ctx.get(name).cloned().ok_or_else(|| {
        TemplateError::NameLookup(format!(
            "variable name '{name}' was not found in the current context"
        ))
    })
}

fn eval_args(args: &[Arg], ctx: &Context) -> TemplateResult<Vec<CallArg>> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        out.push(CallArg {
            name: arg.name.clone(),
            value: arg.value.eval(ctx)?,
        });
    }
    Ok(out)
}

fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Plus => "+",
        UnaryOp::Minus => "-",
        UnaryOp::Invert => "~",
    }
}

fn binary_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::FloorDiv => "//",
        BinOp::Pow => "**",
    }
}

fn cmp_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "<",
        CmpOp::Gt => ">",
        CmpOp::Eq => "==",
        CmpOp::Ne => "!=",
        CmpOp::Le => "<=",
        CmpOp::Ge => ">=",
        CmpOp::In => "in",
        CmpOp::NotIn => "not in",
    }
}

fn eval_unary(op: UnaryOp, value: &Value) -> TemplateResult<Value> {
    match value {
        Value::Int(_) | Value::Bool(_) => {
            let i = value.as_int()?;
            let out = match op {
                // Unary plus does nothing, as in Python.
                UnaryOp::Plus => i,
                UnaryOp::Minus => -i,
                UnaryOp::Invert => -(i + 1),
            };
            Ok(Value::Int(out))
        }
        Value::Float(f) => match op {
            UnaryOp::Plus => Ok(Value::Float(*f)),
            UnaryOp::Minus => Ok(Value::Float(-f)),
            UnaryOp::Invert => Err(TemplateError::TypeMismatch(
                "unsupported unary operation '~' on a float".to_string(),
            )),
        },
        other => Err(TemplateError::TypeMismatch(format!(
            "unsupported unary operation '{}' on a {} value",
            unary_symbol(op),
            other.type_name()
        ))),
    }
}

fn eval_binary(op: BinOp, lhs: &Value, rhs: &Value) -> TemplateResult<Value> {
    let sym = binary_symbol(op);

    if matches!(lhs, Value::Float(_)) || matches!(rhs, Value::Float(_)) {
        let l = lhs.as_float()?;
        let r = rhs.as_float()?;
        let out = match op {
            BinOp::Add => l + r,
            BinOp::Sub => l - r,
            BinOp::Mul => l * r,
            BinOp::Div => l / r,
            BinOp::Mod => l % r,
            BinOp::FloorDiv => (l / r).floor(),
            BinOp::Pow => l.powf(r),
        };
        return Ok(Value::Float(out));
    }

    if matches!(lhs, Value::Int(_)) || matches!(rhs, Value::Int(_)) {
        let l = lhs.as_int()?;
        let r = rhs.as_int()?;
        if r == 0 && matches!(op, BinOp::Div | BinOp::Mod | BinOp::FloorDiv) {
            return Err(TemplateError::TypeMismatch(format!(
                "integer division or modulo by zero in '{sym}'"
            )));
        }
        let out = match op {
            BinOp::Add => l.checked_add(r),
            BinOp::Sub => l.checked_sub(r),
            BinOp::Mul => l.checked_mul(r),
            BinOp::Div => l.checked_div(r),
            BinOp::Mod => l.checked_rem(r),
            BinOp::FloorDiv => l.checked_div_euclid(r),
            BinOp::Pow => {
                if r < 0 {
                    return Err(TemplateError::TypeMismatch(
                        "negative exponent in integer '**'".to_string(),
                    ));
                }
                u32::try_from(r).ok().and_then(|exp| l.checked_pow(exp))
            }
        };
        return out.map(Value::Int).ok_or_else(|| {
            TemplateError::TypeMismatch(format!("integer overflow in '{sym}'"))
        });
    }

    if let (Value::Str(l), Value::Str(r)) = (lhs, rhs) {
        if op == BinOp::Add {
            return Ok(Value::Str(format!("{l}{r}")));
        }
        return Err(TemplateError::TypeMismatch(format!(
            "unsupported operator '{sym}' for a string and a string"
        )));
    }

    Err(TemplateError::TypeMismatch(format!(
        "unsupported operator '{sym}' for a {} and a {} value",
        lhs.type_name(),
        rhs.type_name()
    )))
}

fn compare_pair(op: CmpOp, lhs: &Value, rhs: &Value) -> TemplateResult<bool> {
    match op {
        CmpOp::In => Ok(value_in(lhs, rhs)),
        CmpOp::NotIn => Ok(!value_in(lhs, rhs)),
        _ => {
            if std::mem::discriminant(lhs) != std::mem::discriminant(rhs) {
                return Err(TemplateError::TypeMismatch(
                    "mismatched types for comparison".to_string(),
                ));
            }
            match (lhs, rhs) {
                (Value::Int(l), Value::Int(r)) => Ok(match op {
                    CmpOp::Lt => l < r,
                    CmpOp::Gt => l > r,
                    CmpOp::Eq => l == r,
                    CmpOp::Ne => l != r,
                    CmpOp::Le => l <= r,
                    CmpOp::Ge => l >= r,
                    CmpOp::In | CmpOp::NotIn => unreachable!("handled above"),
                }),
                _ => Err(TemplateError::TypeMismatch(format!(
                    "invalid comparison operator '{}' for a {} value",
                    cmp_symbol(op),
                    lhs.type_name()
                ))),
            }
        }
    }
}

/// Membership for `in`: list elements, substring for strings, keys for
/// dicts. Anything else contains nothing.
fn value_in(needle: &Value, haystack: &Value) -> bool {
    match haystack {
        Value::List(items) => items.iter().any(|item| item == needle),
        Value::Str(s) => match needle {
            Value::Str(n) => s.contains(n.as_str()),
            _ => false,
        },
        Value::Dict(map) => map.contains_key(needle),
        _ => false,
    }
}
