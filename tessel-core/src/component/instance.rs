use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use super::{ComponentId, ComponentOptions, LifecycleHook, LifecycleState};
use crate::dom::{Namespace, NodeId};
use crate::error::{Error, Result};
use crate::reactive::watcher::WatcherSpec;
use crate::reactive::{Observable, Value, WatcherId};
use crate::render::{ComponentRef, Output, RenderContext, Scope, Transclusion};
use crate::runtime::Runtime;

/// A live component in the runtime's arena.
pub(crate) struct Instance {
    pub(crate) id: ComponentId,
    pub(crate) options: Rc<ComponentOptions>,
    pub(crate) data: Rc<Observable>,
    pub(crate) scope: Scope,
    /// Logical parent: the component whose template referenced this one.
    pub(crate) parent: Option<ComponentId>,
    /// For projected components, the component whose output holds them.
    pub(crate) physical_host: Option<ComponentId>,
    pub(crate) ref_name: Option<String>,
    /// Logical children in creation order, projected ones included.
    pub(crate) children: RefCell<Vec<ComponentId>>,
    /// Components projected into this one's slot by another component.
    pub(crate) transcluded: RefCell<Vec<ComponentId>>,
    pub(crate) refs: RefCell<IndexMap<String, ComponentId>>,
    pub(crate) output: RefCell<Output>,
    /// Anchors delimiting the instance's nodes.
    pub(crate) start: NodeId,
    pub(crate) end: NodeId,
    pub(crate) state: Cell<LifecycleState>,
    pub(crate) attached: Cell<bool>,
    pub(crate) ready: Cell<bool>,
    pub(crate) being_destroyed: Cell<bool>,
}

/// Where and how to create an instance.
struct Spawn {
    options: Rc<ComponentOptions>,
    parent: Option<ComponentId>,
    physical_host: Option<ComponentId>,
    ref_name: Option<String>,
    namespace: Namespace,
    content: Option<Rc<Transclusion>>,
    /// Parent node of the fragment.
    container: NodeId,
    /// End anchor, already in `container`. Everything renders before it.
    end: NodeId,
}

impl Runtime {
    fn next_component_id(&self) -> ComponentId {
        let raw = self.inner.next_component.get();
        self.inner.next_component.set(raw + 1);
        ComponentId(raw)
    }

    pub(crate) fn instance(&self, id: ComponentId) -> Option<Rc<Instance>> {
        self.inner.components.borrow().get(&id).cloned()
    }

    fn live_instance(&self, id: ComponentId) -> Result<Rc<Instance>> {
        self.instance(id)
            .filter(|i| !i.being_destroyed.get())
            .ok_or(Error::NoSuchInstance(id))
    }

    /// Human-readable name of a watcher's owner, for diagnostics.
    pub(crate) fn component_name(&self, owner: Option<ComponentId>) -> String {
        match owner {
            None => "<none>".to_owned(),
            Some(id) => self
                .instance(id)
                .map_or_else(|| id.to_string(), |i| format!("{}{}", i.options.name, id)),
        }
    }

    fn instantiate(&self, spawn: Spawn) -> ComponentId {
        let id = self.next_component_id();
        let options = spawn.options;
        let data = Observable::wrap(self, (options.data)());

        // Computed watchers get their IDs up front so the scope can name
        // them before they exist.
        let computed: IndexMap<String, WatcherId> = options
            .computed
            .keys()
            .map(|name| (name.clone(), self.next_watcher_id()))
            .collect();
        let computed = Rc::new(computed);
        let scope = Scope::new(self, Rc::clone(&data), Rc::clone(&computed));

        let mut output = Output::default();
        for (name, expr) in &options.computed {
            let watcher = computed[name];
            let expr = expr.clone();
            let scope = scope.clone();
            let spec = WatcherSpec::new(Some(id), format!("computed:{name}"), move |_| {
                expr.evaluate(&scope)
            })
            .lazy();
            self.create_watcher_with_id(watcher, spec);
            output.watchers.push(watcher);
        }

        let host = self.host();
        let start = host.create_anchor(&options.name);
        host.insert(spawn.container, start, Some(spawn.end));

        let instance = Rc::new(Instance {
            id,
            options: Rc::clone(&options),
            data,
            scope: scope.clone(),
            parent: spawn.parent,
            physical_host: spawn.physical_host,
            ref_name: spawn.ref_name.clone(),
            children: RefCell::new(Vec::new()),
            transcluded: RefCell::new(Vec::new()),
            refs: RefCell::new(IndexMap::new()),
            output: RefCell::new(output),
            start,
            end: spawn.end,
            state: Cell::new(LifecycleState::Created),
            attached: Cell::new(false),
            ready: Cell::new(false),
            being_destroyed: Cell::new(false),
        });
        self.inner.components.borrow_mut().insert(id, instance);

        if let Some(parent) = spawn.parent.and_then(|p| self.instance(p)) {
            parent.children.borrow_mut().push(id);
            if let Some(name) = spawn.ref_name {
                parent.refs.borrow_mut().insert(name, id);
            }
        }
        if let Some(physical) = spawn.physical_host.and_then(|p| self.instance(p)) {
            physical.transcluded.borrow_mut().push(id);
        }
        debug!(component = %id, name = %options.name, parent = ?spawn.parent, "instance created");

        self.call_hook(id, LifecycleHook::Created);

        let cx = RenderContext {
            owner: id,
            options: Rc::clone(&options),
            scope,
            namespace: spawn.namespace,
            content: spawn.content,
            physical_host: None,
        };
        let mut rendered = Output::default();
        self.render(&options.template, &cx, spawn.container, Some(spawn.end), &mut rendered);

        if let Some(instance) = self.instance(id) {
            let mut output = instance.output.borrow_mut();
            output.directives.extend(rendered.directives);
            output.components.extend(rendered.components);
            output.watchers.extend(rendered.watchers);
        }
        id
    }

    /// Instantiate a component referenced from a template, in place of its
    /// placeholder anchor.
    pub(crate) fn instantiate_child(
        &self,
        options: Rc<ComponentOptions>,
        reference: &ComponentRef,
        cx: &RenderContext,
        anchor: NodeId,
    ) -> Result<ComponentId> {
        let container = self.host().parent(anchor).ok_or(Error::Detached(anchor))?;
        let content = (!reference.content.is_empty()).then(|| {
            Rc::new(Transclusion {
                templates: reference.content.clone(),
                context: cx.clone(),
            })
        });
        Ok(self.instantiate(Spawn {
            options,
            parent: Some(cx.owner),
            physical_host: cx.physical_host,
            ref_name: reference.ref_name.clone(),
            namespace: cx.namespace,
            content,
            container,
            end: anchor,
        }))
    }

    /// Create a root instance rendered at the end of `el`. When `el` is in
    /// the document the instance is attached right away.
    pub fn mount(&self, options: ComponentOptions, el: NodeId) -> ComponentId {
        self.mount_shared(Rc::new(options), el)
    }

    /// Mount a globally registered component.
    pub fn mount_registered(&self, name: &str, el: NodeId) -> Result<ComponentId> {
        let options = self
            .inner
            .registry
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownComponent(name.to_owned()))?;
        Ok(self.mount_shared(options, el))
    }

    fn mount_shared(&self, options: Rc<ComponentOptions>, el: NodeId) -> ComponentId {
        let host = self.host();
        let end = host.create_anchor("end");
        host.insert(el, end, None);
        let id = self.instantiate(Spawn {
            options,
            parent: None,
            physical_host: None,
            ref_name: None,
            namespace: host.namespace(el).unwrap_or_default(),
            content: None,
            container: el,
            end,
        });
        if host.in_document(el) {
            self.call_attach(id);
        }
        id
    }

    /// Create a root instance rendered into a detached fragment. Use
    /// [`Runtime::append_to`] to put it in the tree.
    pub fn create(&self, options: ComponentOptions) -> ComponentId {
        let host = self.host();
        let container = host.create_fragment();
        let end = host.create_anchor("end");
        host.insert(container, end, None);
        self.instantiate(Spawn {
            options: Rc::new(options),
            parent: None,
            physical_host: None,
            ref_name: None,
            namespace: Namespace::Html,
            content: None,
            container,
            end,
        })
    }

    /// Read a path through the instance's scope.
    pub fn get(&self, id: ComponentId, path: &str) -> Result<Value> {
        Ok(self.live_instance(id)?.scope.lookup(path))
    }

    /// Write a path in the instance's data. Returns whether anything changed;
    /// writes into frozen data change nothing.
    pub fn set(&self, id: ComponentId, path: &str, value: impl Into<Value>) -> Result<bool> {
        Ok(self.live_instance(id)?.data.set_path(path, value))
    }

    /// The instance's observable data.
    pub fn store(&self, id: ComponentId) -> Result<Rc<Observable>> {
        Ok(Rc::clone(&self.live_instance(id)?.data))
    }

    /// A child registered under `name` with a `ref`.
    pub fn child_ref(&self, id: ComponentId, name: &str) -> Option<ComponentId> {
        self.instance(id)?.refs.borrow().get(name).copied()
    }

    pub fn state(&self, id: ComponentId) -> Option<LifecycleState> {
        self.instance(id).map(|i| i.state.get())
    }

    /// In the arena and not being destroyed.
    pub fn is_alive(&self, id: ComponentId) -> bool {
        self.instance(id).is_some_and(|i| !i.being_destroyed.get())
    }

    pub fn is_attached(&self, id: ComponentId) -> bool {
        self.instance(id).is_some_and(|i| i.attached.get())
    }

    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.instance(id)?.parent
    }

    /// Logical children, in creation order.
    pub fn children(&self, id: ComponentId) -> Vec<ComponentId> {
        self.instance(id)
            .map(|i| i.children.borrow().clone())
            .unwrap_or_default()
    }

    /// The anchors delimiting the instance's nodes.
    pub fn fragment(&self, id: ComponentId) -> Option<(NodeId, NodeId)> {
        self.instance(id).map(|i| (i.start, i.end))
    }

    pub fn component_count(&self) -> usize {
        self.inner.components.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Host, MemoryHost};
    use crate::reactive::Object;
    use crate::render::{Expr, Template};

    fn runtime() -> (Rc<MemoryHost>, Runtime) {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        (host, rt)
    }

    #[test]
    fn computed_properties_are_lazy_and_reactive() {
        let (host, rt) = runtime();
        let options = ComponentOptions::new("app")
            .data(Object::new().with("first", "Ada").with("last", "Lovelace"))
            .computed(
                "full",
                Expr::new("first + last", |scope| {
                    Ok(Value::from(format!("{} {}", scope.get("first"), scope.get("last"))))
                }),
            )
            .template(vec![Template::interpolate(Expr::path("full"))]);
        let el = host.attach_element("div");
        let app = rt.mount(options, el);
        assert_eq!(host.text_content(el), "Ada Lovelace");

        rt.set(app, "last", "Byron").unwrap();
        rt.tick();
        assert_eq!(host.text_content(el), "Ada Byron");
        assert_eq!(rt.get(app, "full").unwrap(), Value::from("Ada Byron"));
    }

    #[test]
    fn refs_and_children_are_recorded() {
        let (host, rt) = runtime();
        let options = ComponentOptions::new("app")
            .component(ComponentOptions::new("item"))
            .template(vec![
                Template::component("item").with_ref("first").into(),
                Template::component("item").into(),
            ]);
        let el = host.attach_element("div");
        let app = rt.mount(options, el);

        let children = rt.children(app);
        assert_eq!(children.len(), 2);
        assert_eq!(rt.child_ref(app, "first"), Some(children[0]));
        assert_eq!(rt.parent(children[1]), Some(app));
        assert_eq!(rt.component_count(), 3);
    }

    #[test]
    fn unknown_component_is_reported_and_skipped() {
        let (host, rt) = runtime();
        let options = ComponentOptions::new("app").template(vec![
            Template::component("ghost").into(),
            Template::text("after"),
        ]);
        let el = host.attach_element("div");
        rt.mount(options, el);

        assert!(matches!(
            rt.take_diagnostics().as_slice(),
            [Error::UnknownComponent(name)] if name == "ghost"
        ));
        assert_eq!(host.inner_html(el), "after");
    }

    #[test]
    fn registered_components_resolve_globally() {
        let (host, rt) = runtime();
        rt.register(ComponentOptions::new("hello").template(vec![Template::text("hello")]));
        rt.register(
            ComponentOptions::new("page").template(vec![Template::component("hello").into()]),
        );
        let el = host.attach_element("div");
        rt.mount_registered("page", el).unwrap();
        assert_eq!(host.inner_html(el), "hello");
        assert!(matches!(
            rt.mount_registered("nope", el),
            Err(Error::UnknownComponent(_))
        ));
    }

    #[test]
    fn namespace_follows_the_mount_point() {
        let (host, rt) = runtime();
        let svg = host.attach_element("svg");
        let options = ComponentOptions::new("shape")
            .template(vec![Template::element("circle").attr("r", "4").into()]);
        rt.mount(options, svg);
        let circle = host.elements(svg)[0];
        assert_eq!(host.namespace(circle), Some(Namespace::Svg));
    }

    #[test]
    fn operations_on_missing_instances_fail() {
        let (_host, rt) = runtime();
        let ghost = ComponentId(99);
        assert!(matches!(rt.get(ghost, "x"), Err(Error::NoSuchInstance(_))));
        assert!(matches!(rt.set(ghost, "x", 1), Err(Error::NoSuchInstance(_))));
        assert!(!rt.is_alive(ghost));
    }
}
