//! Components
//!
//! [`ComponentOptions`] describe a component: its template, its initial
//! data, computed properties, lifecycle hooks and locally registered
//! components and directives. Instantiating options yields an instance in
//! the runtime's arena, addressed by [`ComponentId`]. Parents and children
//! refer to each other by ID only.

mod instance;
mod lifecycle;

pub(crate) use instance::Instance;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::directive::{Directive, DirectiveFactory};
use crate::reactive::Object;
use crate::render::{Expr, Template};
use crate::runtime::Runtime;

/// Identity of a component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Points in an instance's life where hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleHook {
    /// Data and computed properties are set up; nothing is rendered yet.
    Created,
    /// The instance entered the document.
    Attached,
    /// The instance and its subtree finished their first attach.
    Ready,
    /// Watchers of the instance re-ran in a flush.
    Updated,
    BeforeDestroy,
    /// The instance left the document.
    Detached,
    Destroyed,
}

impl LifecycleHook {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleHook::Created => "created",
            LifecycleHook::Attached => "attached",
            LifecycleHook::Ready => "ready",
            LifecycleHook::Updated => "updated",
            LifecycleHook::BeforeDestroy => "beforeDestroy",
            LifecycleHook::Detached => "detached",
            LifecycleHook::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of an instance.
///
/// ```text
/// created -> mounted <-> updated -> unmounting -> destroyed
///    \____________________________/
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Created,
    Mounted,
    Updated,
    Unmounting,
    Destroyed,
}

impl LifecycleState {
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Created, Mounted)
                | (Created, Unmounting)
                | (Mounted, Updated)
                | (Mounted, Unmounting)
                | (Updated, Updated)
                | (Updated, Mounted)
                | (Updated, Unmounting)
                | (Unmounting, Destroyed)
        )
    }

    /// Whether the instance has been, and still is, mounted.
    pub fn is_mounted(&self) -> bool {
        matches!(self, LifecycleState::Mounted | LifecycleState::Updated)
    }
}

pub(crate) type Hook = Rc<dyn Fn(&Runtime, ComponentId)>;
type DataFn = Rc<dyn Fn() -> Object>;

/// Description of a component.
pub struct ComponentOptions {
    pub(crate) name: String,
    pub(crate) template: Vec<Template>,
    pub(crate) data: DataFn,
    pub(crate) computed: IndexMap<String, Expr>,
    pub(crate) hooks: HashMap<LifecycleHook, Vec<Hook>>,
    pub(crate) components: IndexMap<String, Rc<ComponentOptions>>,
    pub(crate) directives: IndexMap<String, DirectiveFactory>,
}

impl ComponentOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: Vec::new(),
            data: Rc::new(Object::new),
            computed: IndexMap::new(),
            hooks: HashMap::new(),
            components: IndexMap::new(),
            directives: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(mut self, template: Vec<Template>) -> Self {
        self.template = template;
        self
    }

    /// Initial data. Each instance gets its own copy; a frozen object stays
    /// frozen.
    pub fn data(mut self, data: Object) -> Self {
        self.data = Rc::new(move || data.clone());
        self
    }

    /// Initial data produced per instance.
    pub fn data_fn(mut self, data: impl Fn() -> Object + 'static) -> Self {
        self.data = Rc::new(data);
        self
    }

    /// A lazily evaluated property derived from the rest of the scope.
    pub fn computed(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.computed.insert(name.into(), expr);
        self
    }

    /// Register a lifecycle hook. Several hooks per point run in
    /// registration order.
    pub fn on(
        mut self,
        hook: LifecycleHook,
        f: impl Fn(&Runtime, ComponentId) + 'static,
    ) -> Self {
        self.hooks.entry(hook).or_default().push(Rc::new(f));
        self
    }

    /// Register a component usable from this component's template.
    pub fn component(mut self, options: ComponentOptions) -> Self {
        self.components
            .insert(options.name.clone(), Rc::new(options));
        self
    }

    /// Register a directive usable from this component's template.
    pub fn directive<D>(mut self, name: impl Into<String>, factory: impl Fn() -> D + 'static) -> Self
    where
        D: Directive + 'static,
    {
        let factory: DirectiveFactory = Rc::new(move || Box::new(factory()) as Box<dyn Directive>);
        self.directives.insert(name.into(), factory);
        self
    }
}

impl fmt::Debug for ComponentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentOptions")
            .field("name", &self.name)
            .field("template", &self.template.len())
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .field("components", &self.components.keys().collect::<Vec<_>>())
            .field("directives", &self.directives.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Runtime {
    /// Register a component globally, for every template in this runtime.
    pub fn register(&self, options: ComponentOptions) {
        self.inner
            .registry
            .borrow_mut()
            .insert(options.name.clone(), Rc::new(options));
    }

    /// Register a directive globally.
    pub fn register_directive<D>(&self, name: impl Into<String>, factory: impl Fn() -> D + 'static)
    where
        D: Directive + 'static,
    {
        let factory: DirectiveFactory = Rc::new(move || Box::new(factory()) as Box<dyn Directive>);
        self.inner
            .directive_registry
            .borrow_mut()
            .insert(name.into(), factory);
    }

    /// Local registrations shadow global ones.
    pub(crate) fn resolve_component(
        &self,
        options: &ComponentOptions,
        name: &str,
    ) -> Option<Rc<ComponentOptions>> {
        options
            .components
            .get(name)
            .cloned()
            .or_else(|| self.inner.registry.borrow().get(name).cloned())
    }

    pub(crate) fn resolve_directive(
        &self,
        options: &ComponentOptions,
        name: &str,
    ) -> Option<DirectiveFactory> {
        options
            .directives
            .get(name)
            .cloned()
            .or_else(|| self.inner.directive_registry.borrow().get(name).cloned())
    }
}
