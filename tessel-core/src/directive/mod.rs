//! Directive Binding Engine
//!
//! A directive is behaviour attached to a node: `bind` when it is linked,
//! `update` whenever its expression changes, `unbind` on teardown.
//!
//! The engine records the governed node before `bind` runs. A directive may
//! rewrite the structure around that node during `bind` (insert siblings,
//! wrap it in anchors), and everything rendered afterwards still targets the
//! recorded node.
//!
//! When the directive has an expression, the engine owns a watcher for it.
//! The first value is delivered right after `bind`; later values arrive
//! through the scheduler.

pub(crate) mod builtin;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::component::ComponentId;
use crate::dom::{Host, NodeId};
use crate::reactive::watcher::WatcherSpec;
use crate::reactive::{Value, WatcherId};
use crate::render::{Expr, RenderContext, Scope};
use crate::runtime::Runtime;

/// Identity of a bound directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectiveId(u64);

impl fmt::Display for DirectiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Directive hooks. All of them default to doing nothing.
pub trait Directive {
    fn bind(&mut self, cx: &DirectiveContext<'_>) {
        let _ = cx;
    }

    fn update(&mut self, cx: &DirectiveContext<'_>, value: &Value, old: &Value) {
        let _ = (cx, value, old);
    }

    fn unbind(&mut self, cx: &DirectiveContext<'_>) {
        let _ = cx;
    }
}

/// Creates a fresh directive for each bound node.
pub type DirectiveFactory = Rc<dyn Fn() -> Box<dyn Directive>>;

/// What a directive hook can see.
pub struct DirectiveContext<'a> {
    runtime: &'a Runtime,
    binding: &'a DirectiveBinding,
}

impl<'a> DirectiveContext<'a> {
    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }

    pub fn host(&self) -> Rc<dyn Host> {
        self.runtime.host()
    }

    /// The node this directive governs.
    pub fn node(&self) -> NodeId {
        self.binding.node
    }

    pub fn name(&self) -> &str {
        &self.binding.name
    }

    pub fn argument(&self) -> Option<&str> {
        self.binding.argument.as_deref()
    }

    /// The component whose scope the directive's expression reads.
    pub fn component(&self) -> ComponentId {
        self.binding.cx.owner
    }

    pub fn scope(&self) -> &Scope {
        &self.binding.cx.scope
    }

    pub(crate) fn render_context(&self) -> &RenderContext {
        &self.binding.cx
    }
}

pub(crate) struct DirectiveBinding {
    id: DirectiveId,
    name: String,
    node: NodeId,
    argument: Option<String>,
    directive: RefCell<Box<dyn Directive>>,
    cx: RenderContext,
    watcher: Cell<Option<WatcherId>>,
    bound: Cell<bool>,
}

impl Runtime {
    fn next_directive_id(&self) -> DirectiveId {
        let raw = self.inner.next_directive.get();
        self.inner.next_directive.set(raw + 1);
        DirectiveId(raw)
    }

    fn binding(&self, id: DirectiveId) -> Option<Rc<DirectiveBinding>> {
        self.inner.directives.borrow().get(&id).cloned()
    }

    /// Bind a directive to `node`: run its `bind` hook, then watch its
    /// expression and deliver the first value.
    pub(crate) fn bind_directive(
        &self,
        node: NodeId,
        name: String,
        argument: Option<String>,
        expr: Option<Expr>,
        directive: Box<dyn Directive>,
        cx: RenderContext,
    ) -> DirectiveId {
        let id = self.next_directive_id();
        let owner = cx.owner;
        let binding = Rc::new(DirectiveBinding {
            id,
            name,
            node,
            argument,
            directive: RefCell::new(directive),
            cx,
            watcher: Cell::new(None),
            bound: Cell::new(true),
        });
        self.inner
            .directives
            .borrow_mut()
            .insert(id, Rc::clone(&binding));
        trace!(directive = %id, name = %binding.name, %node, component = %owner, "bind");

        self.untracked(|| {
            let cx = DirectiveContext {
                runtime: self,
                binding: &binding,
            };
            binding.directive.borrow_mut().bind(&cx);
        });

        if let Some(expr) = expr {
            let scope = binding.cx.scope.clone();
            let label = format!("{}:{}", binding.name, expr.label());
            let spec = WatcherSpec::new(Some(owner), label, move |_| expr.evaluate(&scope))
                .callback(move |rt, new, old| rt.update_directive(id, new, old));
            let watcher = self.create_watcher(spec);
            binding.watcher.set(Some(watcher));

            let initial = self.watcher_value(watcher).unwrap_or_default();
            self.update_directive(id, &initial, &Value::Null);
        }
        id
    }

    /// Deliver a new value to a bound directive.
    pub(crate) fn update_directive(&self, id: DirectiveId, value: &Value, old: &Value) {
        let Some(binding) = self.binding(id) else {
            return;
        };
        if !binding.bound.get() {
            return;
        }
        let Ok(mut directive) = binding.directive.try_borrow_mut() else {
            debug!(directive = %id, name = %binding.name, "skipping re-entrant update");
            return;
        };
        let cx = DirectiveContext {
            runtime: self,
            binding: &binding,
        };
        self.untracked(|| directive.update(&cx, value, old));
    }

    /// Unbind a directive: tear down its watcher and run its `unbind` hook.
    /// Unbinding twice is a no-op.
    pub(crate) fn unbind_directive(&self, id: DirectiveId) {
        let Some(binding) = self.inner.directives.borrow_mut().remove(&id) else {
            trace!(directive = %id, "already unbound");
            return;
        };
        binding.bound.set(false);
        if let Some(watcher) = binding.watcher.take() {
            self.teardown_watcher(watcher);
        }
        trace!(directive = %binding.id, name = %binding.name, "unbind");

        let Ok(mut directive) = binding.directive.try_borrow_mut() else {
            debug!(directive = %id, name = %binding.name, "unbind while hook is running");
            return;
        };
        let cx = DirectiveContext {
            runtime: self,
            binding: &binding,
        };
        self.untracked(|| directive.unbind(&cx));
    }

    /// Number of bound directives.
    pub fn directive_count(&self) -> usize {
        self.inner.directives.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentOptions;
    use crate::dom::{MemoryHost, Namespace};
    use crate::reactive::Object;
    use crate::render::{DirectiveSpec, Template};

    #[derive(Default)]
    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Directive for Recorder {
        fn bind(&mut self, cx: &DirectiveContext<'_>) {
            self.log.borrow_mut().push(format!("bind:{}", cx.name()));
        }

        fn update(&mut self, _cx: &DirectiveContext<'_>, value: &Value, _old: &Value) {
            self.log.borrow_mut().push(format!("update:{value}"));
        }

        fn unbind(&mut self, _cx: &DirectiveContext<'_>) {
            self.log.borrow_mut().push("unbind".into());
        }
    }

    #[test]
    fn hooks_fire_bind_update_unbind() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let log = Rc::new(RefCell::new(Vec::new()));

        let shared = Rc::clone(&log);
        let options = ComponentOptions::new("app")
            .data(Object::new().with("n", 1))
            .directive("rec", move || Recorder {
                log: Rc::clone(&shared),
            })
            .template(vec![Template::element("p")
                .directive(DirectiveSpec::new("rec").expr(Expr::path("n")))
                .into()]);
        let el = host.attach_element("div");
        let app = rt.mount(options, el);

        rt.set(app, "n", 2).unwrap();
        rt.tick();
        rt.destroy(app, true);
        assert_eq!(*log.borrow(), vec!["bind:rec", "update:1", "update:2", "unbind"]);
        assert_eq!(rt.directive_count(), 0);
        assert_eq!(rt.watcher_count(), 0);
    }

    #[test]
    fn unbind_is_idempotent() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let options = ComponentOptions::new("app").template(vec![Template::element("p")
            .bind("title", Expr::constant("x"))
            .into()]);
        let el = host.create_element("div", Namespace::Html);
        let app = rt.mount(options, el);
        assert_eq!(rt.directive_count(), 1);

        let id = *rt.inner.directives.borrow().keys().next().unwrap();
        rt.unbind_directive(id);
        rt.unbind_directive(id);
        assert_eq!(rt.directive_count(), 0);
        rt.destroy(app, false);
    }

    #[test]
    fn unknown_directive_is_reported() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let options = ComponentOptions::new("app").template(vec![Template::element("p")
            .directive(DirectiveSpec::new("missing"))
            .into()]);
        let el = host.create_element("div", Namespace::Html);
        rt.mount(options, el);

        let diagnostics = rt.take_diagnostics();
        assert!(matches!(
            diagnostics.as_slice(),
            [crate::Error::UnknownDirective(name)] if name == "missing"
        ));
        assert_eq!(host.inner_html(el), "<p></p>");
    }
}
