use std::fmt;
use std::rc::Rc;

use super::scope::Scope;
use crate::error::EvalError;
use crate::reactive::Value;

type EvalFn = dyn Fn(&Scope) -> Result<Value, EvalError>;

/// A compiled expression.
///
/// Expressions are opaque closures produced by the template compiler. The
/// label is only used to identify the expression in diagnostics.
#[derive(Clone)]
pub struct Expr {
    label: Rc<str>,
    eval: Rc<EvalFn>,
}

impl Expr {
    pub fn new(
        label: impl Into<String>,
        eval: impl Fn(&Scope) -> Result<Value, EvalError> + 'static,
    ) -> Self {
        Self {
            label: Rc::from(label.into()),
            eval: Rc::new(eval),
        }
    }

    /// Read a dotted path from the scope, e.g. `user.name` or `$value`.
    pub fn path(path: impl Into<String>) -> Self {
        let path: Rc<str> = Rc::from(path.into());
        Self {
            label: Rc::clone(&path),
            eval: Rc::new(move |scope| Ok(scope.lookup(&path))),
        }
    }

    /// Negated truthiness of a path, e.g. `!done`.
    pub fn not(path: impl Into<String>) -> Self {
        let path: String = path.into();
        let label = format!("!{path}");
        Self::new(label, move |scope| {
            Ok(Value::Bool(!scope.lookup(&path).is_truthy()))
        })
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(value.to_string(), move |_| Ok(value.clone()))
    }

    pub fn evaluate(&self, scope: &Scope) -> Result<Value, EvalError> {
        (self.eval)(scope)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Expr").field(&self.label).finish()
    }
}
