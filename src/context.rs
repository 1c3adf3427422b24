//! The render context: variable bindings and the filter, test, and callable
//! registries.
//!
//! A [`Context`] is the only mutable object during a render. The renderer
//! borrows it mutably to bind loop targets and the synthetic `loop` variable;
//! expression evaluation reads from it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{TemplateError, TemplateResult};
use crate::value::Value;

/// The body of a registered filter, test, or callable.
///
/// Receives the fully bound parameter values in declaration order.
pub type CallableFn = Arc<dyn Fn(&[Value]) -> TemplateResult<Value> + Send + Sync>;

/// A declared parameter: a name and a default value.
///
/// A default of [`Value::Undefined`] marks the parameter as required.
#[derive(Clone)]
pub struct Param {
    /// The parameter name, matchable by named arguments.
    pub name: String,
    /// The value used when no argument fills this slot.
    pub default: Value,
}

impl Param {
    /// A parameter with no default; binding fails if it is left unfilled.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: Value::Undefined,
        }
    }

    /// A parameter with a default value.
    pub fn with_default(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            default,
        }
    }
}

/// An argument passed at a call site. A missing name means positional.
#[derive(Debug, Clone)]
pub struct CallArg {
    /// The parameter name for named arguments.
    pub name: Option<String>,
    /// The already-evaluated argument value.
    pub value: Value,
}

impl CallArg {
    /// A positional argument.
    pub fn positional(value: Value) -> Self {
        Self { name: None, value }
    }

    /// A named argument.
    pub fn named(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }
}

/// A registered function with an ordered parameter signature.
///
/// Filters, tests, and callables all share this shape; filters and tests
/// receive the chained value prepended as their first positional argument.
#[derive(Clone)]
pub struct Callable {
    params: Vec<Param>,
    func: CallableFn,
}

impl Callable {
    /// Creates a callable from a parameter signature and a body.
    pub fn new<F>(params: Vec<Param>, func: F) -> Self
    where
        F: Fn(&[Value]) -> TemplateResult<Value> + Send + Sync + 'static,
    {
        Self {
            params,
            func: Arc::new(func),
        }
    }

    /// Binds the incoming arguments to the parameter slots and invokes the
    /// body.
    ///
    /// Positional arguments fill slots in order; once a named argument is
    /// seen, further positional arguments are an error. Unfilled slots fall
    /// back to their defaults; a required slot left unfilled is an error.
    ///
    /// # Errors
    ///
    /// `PositionalAfterNamed`, `UnknownArgName`, `MissingRequiredArg`, or a
    /// `Syntax` error when more positional arguments arrive than there are
    /// parameters. Errors from the body itself pass through.
    pub fn invoke(&self, args: Vec<CallArg>) -> TemplateResult<Value> {
        let mut slots: Vec<Option<Value>> = vec![None; self.params.len()];
        let mut next_positional = 0usize;
        let mut named_seen = false;

        for arg in args {
            match arg.name {
                None => {
                    if named_seen {
                        return Err(TemplateError::PositionalAfterNamed(
                            "positional arguments must precede named arguments".to_string(),
                        ));
                    }
                    if next_positional >= self.params.len() {
                        return Err(TemplateError::Syntax(format!(
                            "too many positional arguments: expected at most {}",
                            self.params.len()
                        )));
                    }
                    slots[next_positional] = Some(arg.value);
                    next_positional += 1;
                }
                Some(name) => {
                    named_seen = true;
                    let idx = self
                        .params
                        .iter()
                        .position(|p| p.name == name)
                        .ok_or_else(|| {
                            TemplateError::UnknownArgName(format!(
                                "no parameter named '{name}'"
                            ))
                        })?;
                    slots[idx] = Some(arg.value);
                }
            }
        }

        let mut bound = Vec::with_capacity(self.params.len());
        for (slot, param) in slots.into_iter().zip(&self.params) {
            match slot {
                Some(value) => bound.push(value),
                None => {
                    if param.default.is_undefined() {
                        return Err(TemplateError::MissingRequiredArg(format!(
                            "parameter '{}' has no default and was not supplied",
                            param.name
                        )));
                    }
                    bound.push(param.default.clone());
                }
            }
        }

        (self.func)(&bound)
    }
}

/// A mutable binding table plus the filter, test, and callable registries.
///
/// # Examples
///
/// ```
/// use jinja_rs::{Context, Value};
///
/// let mut ctx = Context::new();
/// ctx.set("name", Value::from("world"));
/// assert_eq!(ctx.get("name"), Some(&Value::from("world")));
/// assert_eq!(ctx.get("missing"), None);
/// ```
pub struct Context {
    vars: HashMap<String, Value>,
    filters: HashMap<String, Callable>,
    tests: HashMap<String, Callable>,
    callables: HashMap<String, Callable>,
}

impl Context {
    /// Creates an empty context with the default filters and tests installed.
    pub fn new() -> Self {
        let mut ctx = Self {
            vars: HashMap::new(),
            filters: HashMap::new(),
            tests: HashMap::new(),
            callables: HashMap::new(),
        };
        ctx.load_default_filters();
        ctx.load_default_tests();
        ctx
    }

    /// Creates a context pre-populated from a map of host values.
    ///
    /// # Errors
    ///
    /// Returns a `TypeMismatch` error for host values outside the supported
    /// kinds (see [`Context::add_host_values`]).
    pub fn with_values(vars: serde_json::Map<String, serde_json::Value>) -> TemplateResult<Self> {
        let mut ctx = Self::new();
        ctx.add_host_values(vars)?;
        Ok(ctx)
    }

    /// Binds a variable, replacing any previous binding of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Looks up a variable by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Removes a binding, returning the previous value if there was one.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.vars.remove(name)
    }

    /// Converts and binds a map of host values.
    ///
    /// Recognized kinds: strings, booleans, 64-bit integers, 64-bit floats,
    /// arrays, and string-keyed objects, converted recursively.
    ///
    /// # Errors
    ///
    /// Returns a `TypeMismatch` error for any other kind (JSON null, numbers
    /// that fit neither `i64` nor `f64`).
    pub fn add_host_values(
        &mut self,
        vars: serde_json::Map<String, serde_json::Value>,
    ) -> TemplateResult<()> {
        for (name, value) in vars {
            let converted = host_to_value(&value)?;
            self.vars.insert(name, converted);
        }
        Ok(())
    }

    /// Registers a filter. The last registration under a name wins.
    pub fn register_filter(&mut self, name: impl Into<String>, filter: Callable) {
        self.filters.insert(name.into(), filter);
    }

    /// Registers a test. The last registration under a name wins.
    pub fn register_test(&mut self, name: impl Into<String>, test: Callable) {
        self.tests.insert(name.into(), test);
    }

    /// Registers a callable invokable as `name(args)` in expressions.
    pub fn register_callable(&mut self, name: impl Into<String>, callable: Callable) {
        self.callables.insert(name.into(), callable);
    }

    /// Looks up a filter by name.
    pub fn filter(&self, name: &str) -> Option<&Callable> {
        self.filters.get(name)
    }

    /// Looks up a test by name.
    pub fn test(&self, name: &str) -> Option<&Callable> {
        self.tests.get(name)
    }

    /// Looks up a callable by name.
    pub fn callable(&self, name: &str) -> Option<&Callable> {
        self.callables.get(name)
    }

    fn load_default_filters(&mut self) {
        self.register_filter(
            "int",
            Callable::new(vec![Param::required("val")], |args| {
                let val = &args[0];
                match val {
                    Value::Int(_) => Ok(val.clone()),
                    other => Ok(Value::Int(other.as_int()?)),
                }
            }),
        );
        self.register_filter(
            "bool",
            Callable::new(vec![Param::required("val")], |args| {
                Ok(Value::Bool(args[0].is_truthy()))
            }),
        );
    }

    fn load_default_tests(&mut self) {
        self.register_test(
            "defined",
            Callable::new(vec![Param::required("val")], |args| {
                Ok(Value::Bool(!args[0].is_undefined()))
            }),
        );
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts a single host value to an internal [`Value`].
fn host_to_value(value: &serde_json::Value) -> TemplateResult<Value> {
    match value {
        serde_json::Value::String(s) => Ok(Value::Str(s.clone())),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Float(f))
            } else {
                Err(TemplateError::TypeMismatch(format!(
                    "unsupported host number '{n}' being added to the context"
                )))
            }
        }
        serde_json::Value::Array(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                list.push(host_to_value(item)?);
            }
            Ok(Value::List(list))
        }
        serde_json::Value::Object(map) => {
            let mut dict = HashMap::new();
            for (key, val) in map {
                dict.insert(Value::Str(key.clone()), host_to_value(val)?);
            }
            Ok(Value::Dict(dict))
        }
        serde_json::Value::Null => Err(TemplateError::TypeMismatch(
            "unsupported host value kind 'null' being added to the context".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let mut ctx = Context::new();
        ctx.set("x", Value::Int(1));
        assert_eq!(ctx.get("x"), Some(&Value::Int(1)));
        assert_eq!(ctx.get("y"), None);
    }

    #[test]
    fn test_set_overwrites() {
        let mut ctx = Context::new();
        ctx.set("x", Value::Int(1));
        ctx.set("x", Value::Int(2));
        assert_eq!(ctx.get("x"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_remove_returns_previous() {
        let mut ctx = Context::new();
        ctx.set("x", Value::Int(1));
        assert_eq!(ctx.remove("x"), Some(Value::Int(1)));
        assert_eq!(ctx.remove("x"), None);
    }

    #[test]
    fn test_default_filter_int() {
        let ctx = Context::new();
        let filter = ctx.filter("int").unwrap();
        let res = filter
            .invoke(vec![CallArg::positional(Value::Str("1".into()))])
            .unwrap();
        assert_eq!(res, Value::Int(1));

        let res = filter
            .invoke(vec![CallArg::positional(Value::Int(9))])
            .unwrap();
        assert_eq!(res, Value::Int(9));
    }

    #[test]
    fn test_default_filter_int_malformed() {
        let ctx = Context::new();
        let filter = ctx.filter("int").unwrap();
        let err = filter
            .invoke(vec![CallArg::positional(Value::Str("abc".into()))])
            .unwrap_err();
        assert!(matches!(err, TemplateError::Coercion(_)));
    }

    #[test]
    fn test_default_filter_bool() {
        let ctx = Context::new();
        let filter = ctx.filter("bool").unwrap();
        let res = filter
            .invoke(vec![CallArg::positional(Value::Str("x".into()))])
            .unwrap();
        assert_eq!(res, Value::Bool(true));
        let res = filter
            .invoke(vec![CallArg::positional(Value::Int(0))])
            .unwrap();
        assert_eq!(res, Value::Bool(false));
    }

    #[test]
    fn test_default_test_defined() {
        let ctx = Context::new();
        let test = ctx.test("defined").unwrap();
        let res = test
            .invoke(vec![CallArg::positional(Value::Undefined)])
            .unwrap();
        assert_eq!(res, Value::Bool(false));
        let res = test
            .invoke(vec![CallArg::positional(Value::Int(1))])
            .unwrap();
        assert_eq!(res, Value::Bool(true));
    }

    #[test]
    fn test_register_last_wins() {
        let mut ctx = Context::new();
        ctx.register_filter(
            "int",
            Callable::new(vec![Param::required("val")], |_| Ok(Value::Int(99))),
        );
        let res = ctx
            .filter("int")
            .unwrap()
            .invoke(vec![CallArg::positional(Value::Int(1))])
            .unwrap();
        assert_eq!(res, Value::Int(99));
    }

    #[test]
    fn test_invoke_positional_and_named() {
        let callable = Callable::new(
            vec![
                Param::required("a"),
                Param::required("b"),
                Param::with_default("c", Value::Bool(true)),
            ],
            |args| Ok(Value::List(args.to_vec())),
        );

        let res = callable
            .invoke(vec![
                CallArg::positional(Value::Int(1)),
                CallArg::named("b", Value::Str("2".into())),
            ])
            .unwrap();
        assert_eq!(
            res,
            Value::List(vec![
                Value::Int(1),
                Value::Str("2".into()),
                Value::Bool(true),
            ])
        );
    }

    #[test]
    fn test_invoke_named_overrides_default() {
        let callable = Callable::new(
            vec![
                Param::required("a"),
                Param::with_default("c", Value::Bool(true)),
            ],
            |args| Ok(Value::List(args.to_vec())),
        );
        let res = callable
            .invoke(vec![
                CallArg::positional(Value::Int(1)),
                CallArg::named("c", Value::Bool(false)),
            ])
            .unwrap();
        assert_eq!(res, Value::List(vec![Value::Int(1), Value::Bool(false)]));
    }

    #[test]
    fn test_invoke_missing_required() {
        let callable = Callable::new(
            vec![Param::required("a"), Param::required("b")],
            |args| Ok(Value::List(args.to_vec())),
        );
        let err = callable
            .invoke(vec![CallArg::positional(Value::Int(1))])
            .unwrap_err();
        assert!(matches!(err, TemplateError::MissingRequiredArg(_)));
    }

    #[test]
    fn test_invoke_unknown_name() {
        let callable = Callable::new(vec![Param::required("a")], |args| {
            Ok(args[0].clone())
        });
        let err = callable
            .invoke(vec![CallArg::named("bogus", Value::Int(1))])
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnknownArgName(_)));
    }

    #[test]
    fn test_invoke_positional_after_named() {
        let callable = Callable::new(
            vec![Param::required("a"), Param::required("b")],
            |args| Ok(Value::List(args.to_vec())),
        );
        let err = callable
            .invoke(vec![
                CallArg::named("a", Value::Int(1)),
                CallArg::positional(Value::Int(2)),
            ])
            .unwrap_err();
        assert!(matches!(err, TemplateError::PositionalAfterNamed(_)));
    }

    #[test]
    fn test_invoke_too_many_positional() {
        let callable = Callable::new(vec![Param::required("a")], |args| {
            Ok(args[0].clone())
        });
        let err = callable
            .invoke(vec![
                CallArg::positional(Value::Int(1)),
                CallArg::positional(Value::Int(2)),
            ])
            .unwrap_err();
        assert!(matches!(err, TemplateError::Syntax(_)));
    }

    #[test]
    fn test_add_host_values() {
        let mut ctx = Context::new();
        let json = json!({
            "name": "jinja",
            "version": 2,
            "ratio": 0.5,
            "active": true,
            "tags": ["a", "b"],
            "meta": {"nested": 1}
        });
        let serde_json::Value::Object(map) = json else {
            panic!("expected object");
        };
        ctx.add_host_values(map).unwrap();

        assert_eq!(ctx.get("name"), Some(&Value::Str("jinja".into())));
        assert_eq!(ctx.get("version"), Some(&Value::Int(2)));
        assert_eq!(ctx.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(ctx.get("active"), Some(&Value::Bool(true)));
        assert_eq!(
            ctx.get("tags"),
            Some(&Value::List(vec![
                Value::Str("a".into()),
                Value::Str("b".into()),
            ]))
        );
        match ctx.get("meta") {
            Some(Value::Dict(map)) => {
                assert_eq!(map.get(&Value::Str("nested".into())), Some(&Value::Int(1)));
            }
            other => panic!("expected dict, got {other:?}"),
        }
    }

    #[test]
    fn test_add_host_values_rejects_null() {
        let mut ctx = Context::new();
        let serde_json::Value::Object(map) = json!({"bad": null}) else {
            panic!("expected object");
        };
        let err = ctx.add_host_values(map).unwrap_err();
        assert!(matches!(err, TemplateError::TypeMismatch(_)));
    }

    #[test]
    fn test_with_values() {
        let serde_json::Value::Object(map) = json!({"x": 10}) else {
            panic!("expected object");
        };
        let ctx = Context::with_values(map).unwrap();
        assert_eq!(ctx.get("x"), Some(&Value::Int(10)));
        // Defaults are installed too.
        assert!(ctx.filter("int").is_some());
        assert!(ctx.filter("bool").is_some());
        assert!(ctx.test("defined").is_some());
    }
}
