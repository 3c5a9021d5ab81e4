//! Rendering
//!
//! Templates are rendered in two phases, the same way every time: whether
//! it is a component's initial render or a block created by a conditional.
//!
//! 1. **Build** walks the template and creates host nodes in place. Nodes
//!    that need behaviour (interpolations, bindings, directives, child
//!    components, control blocks) are recorded as pending work in document
//!    order; an element's own directives come before its children's.
//! 2. **Link** binds the pending directives and instantiates the pending
//!    components in that order.
//!
//! Linking after the whole structure exists means a directive sees its node
//! already in place when its `bind` hook runs, and may freely insert
//! siblings around it. It also means watchers are created in document
//! order, which is the order the scheduler flushes them in.

mod expr;
mod scope;
mod template;

pub use expr::Expr;
pub use scope::Scope;
pub use template::{ComponentRef, Conditional, DirectiveSpec, Element, Repeat, Template};

use std::rc::Rc;

use crate::component::{ComponentId, ComponentOptions};
use crate::directive::builtin::{AttrDirective, TextDirective};
use crate::directive::{Directive, DirectiveId};
use crate::dom::{Namespace, NodeId};
use crate::control::{IfDirective, RepeatDirective};
use crate::error::Error;
use crate::reactive::{Observable, WatcherId};
use crate::runtime::Runtime;

/// Everything the renderer needs to know about where it is rendering.
#[derive(Clone)]
pub(crate) struct RenderContext {
    /// The component whose scope the markup belongs to.
    pub(crate) owner: ComponentId,
    /// The owner's options, used to resolve components and directives.
    pub(crate) options: Rc<ComponentOptions>,
    pub(crate) scope: Scope,
    pub(crate) namespace: Namespace,
    /// Content the owner was given to project through its slot.
    pub(crate) content: Option<Rc<Transclusion>>,
    /// Set while rendering projected content: the component whose output
    /// physically holds it.
    pub(crate) physical_host: Option<ComponentId>,
}

impl RenderContext {
    pub(crate) fn with_locals(&self, locals: Rc<Observable>) -> Self {
        let mut cx = self.clone();
        cx.scope = cx.scope.with_locals(locals);
        cx
    }

    fn in_namespace(&self, namespace: Namespace) -> Self {
        let mut cx = self.clone();
        cx.namespace = namespace;
        cx
    }
}

/// Content projected into a child component, with the context of the
/// component that wrote it.
pub(crate) struct Transclusion {
    pub(crate) templates: Vec<Template>,
    pub(crate) context: RenderContext,
}

/// What a render pass created and must later tear down.
#[derive(Debug, Default)]
pub(crate) struct Output {
    pub(crate) directives: Vec<DirectiveId>,
    pub(crate) components: Vec<ComponentId>,
    pub(crate) watchers: Vec<WatcherId>,
}

enum Pending {
    Directive {
        node: NodeId,
        name: String,
        argument: Option<String>,
        expr: Option<Expr>,
        directive: Box<dyn Directive>,
        cx: RenderContext,
    },
    Component {
        anchor: NodeId,
        options: Rc<ComponentOptions>,
        reference: ComponentRef,
        cx: RenderContext,
    },
}

impl Runtime {
    /// Render `templates` under `parent`, before `before` (or appended).
    pub(crate) fn render(
        &self,
        templates: &[Template],
        cx: &RenderContext,
        parent: NodeId,
        before: Option<NodeId>,
        output: &mut Output,
    ) {
        let mut pending = Vec::new();
        self.build(templates, cx, parent, before, &mut pending);
        self.link(pending, output);
    }

    fn build(
        &self,
        templates: &[Template],
        cx: &RenderContext,
        parent: NodeId,
        before: Option<NodeId>,
        pending: &mut Vec<Pending>,
    ) {
        let host = self.host();
        for template in templates {
            match template {
                Template::Text(text) => {
                    let node = host.create_text(text);
                    host.insert(parent, node, before);
                }
                Template::Interpolation(expr) => {
                    let node = host.create_text("");
                    host.insert(parent, node, before);
                    pending.push(Pending::Directive {
                        node,
                        name: "text".into(),
                        argument: None,
                        expr: Some(expr.clone()),
                        directive: Box::new(TextDirective),
                        cx: cx.clone(),
                    });
                }
                Template::Element(element) => {
                    let namespace = element
                        .namespace
                        .unwrap_or_else(|| Namespace::for_tag(&element.tag, cx.namespace));
                    let node = host.create_element(&element.tag, namespace);
                    for (name, value) in &element.attributes {
                        host.set_attribute(node, name, value);
                    }
                    host.insert(parent, node, before);

                    for spec in &element.directives {
                        let Some(factory) = self.resolve_directive(&cx.options, &spec.name) else {
                            self.report(Error::UnknownDirective(spec.name.clone()));
                            continue;
                        };
                        pending.push(Pending::Directive {
                            node,
                            name: spec.name.clone(),
                            argument: spec.argument.clone(),
                            expr: spec.expr.clone(),
                            directive: factory(),
                            cx: cx.clone(),
                        });
                    }
                    for (name, expr) in &element.bindings {
                        pending.push(Pending::Directive {
                            node,
                            name: "attr".into(),
                            argument: Some(name.clone()),
                            expr: Some(expr.clone()),
                            directive: Box::new(AttrDirective),
                            cx: cx.clone(),
                        });
                    }

                    let inner = cx.in_namespace(namespace);
                    self.build(&element.children, &inner, node, None, pending);
                }
                Template::Component(reference) => {
                    let anchor = host.create_anchor(&reference.name);
                    host.insert(parent, anchor, before);
                    match self.resolve_component(&cx.options, &reference.name) {
                        Some(options) => pending.push(Pending::Component {
                            anchor,
                            options,
                            reference: reference.clone(),
                            cx: cx.clone(),
                        }),
                        None => self.report(Error::UnknownComponent(reference.name.clone())),
                    }
                }
                Template::Slot(fallback) => match &cx.content {
                    Some(content) => {
                        let mut projected = content.context.in_namespace(cx.namespace);
                        projected.physical_host = Some(cx.owner);
                        self.build(&content.templates, &projected, parent, before, pending);
                    }
                    None => self.build(fallback, cx, parent, before, pending),
                },
                Template::If(conditional) => {
                    let anchor = host.create_anchor("if");
                    host.insert(parent, anchor, before);
                    pending.push(Pending::Directive {
                        node: anchor,
                        name: "if".into(),
                        argument: None,
                        expr: Some(conditional.condition.clone()),
                        directive: Box::new(IfDirective::new(conditional.clone())),
                        cx: cx.clone(),
                    });
                }
                Template::Repeat(repeat) => {
                    let anchor = host.create_anchor("repeat");
                    host.insert(parent, anchor, before);
                    pending.push(Pending::Directive {
                        node: anchor,
                        name: "repeat".into(),
                        argument: None,
                        expr: Some(repeat.source.clone()),
                        directive: Box::new(RepeatDirective::new(repeat.clone())),
                        cx: cx.clone(),
                    });
                }
            }
        }
    }

    fn link(&self, pending: Vec<Pending>, output: &mut Output) {
        for item in pending {
            match item {
                Pending::Directive {
                    node,
                    name,
                    argument,
                    expr,
                    directive,
                    cx,
                } => {
                    let id = self.bind_directive(node, name, argument, expr, directive, cx);
                    output.directives.push(id);
                }
                Pending::Component {
                    anchor,
                    options,
                    reference,
                    cx,
                } => match self.instantiate_child(options, &reference, &cx, anchor) {
                    Ok(id) => output.components.push(id),
                    Err(err) => self.report(err),
                },
            }
        }
    }

    /// Tear down everything a render pass created, without touching nodes.
    pub(crate) fn teardown_output(&self, output: Output) {
        for component in output.components {
            self.destroy_instance(component, false);
        }
        for directive in output.directives {
            self.unbind_directive(directive);
        }
        for watcher in output.watchers {
            self.teardown_watcher(watcher);
        }
    }
}
