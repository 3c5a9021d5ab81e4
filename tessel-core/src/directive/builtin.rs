//! Built-in directives the renderer emits for interpolations and attribute
//! bindings.

use super::{Directive, DirectiveContext};
use crate::reactive::Value;

/// Keeps a text node in sync with `{{ expr }}`.
pub(crate) struct TextDirective;

impl Directive for TextDirective {
    fn update(&mut self, cx: &DirectiveContext<'_>, value: &Value, _old: &Value) {
        cx.host().set_text(cx.node(), &value.to_string());
    }
}

/// Keeps one attribute in sync with an expression. `null` and `false`
/// remove the attribute, `true` sets it empty.
pub(crate) struct AttrDirective;

impl Directive for AttrDirective {
    fn update(&mut self, cx: &DirectiveContext<'_>, value: &Value, _old: &Value) {
        let Some(name) = cx.argument() else {
            return;
        };
        let host = cx.host();
        match value {
            Value::Null | Value::Bool(false) => host.remove_attribute(cx.node(), name),
            Value::Bool(true) => host.set_attribute(cx.node(), name, ""),
            other => host.set_attribute(cx.node(), name, &other.to_string()),
        }
    }
}
