//! Render descriptors
//!
//! A [`Template`] is the compiled form of a component's markup. The core
//! does not parse anything: the template compiler hands it these trees with
//! every expression already turned into an [`Expr`].

use super::expr::Expr;
use crate::dom::Namespace;

/// One node of a compiled template.
#[derive(Debug, Clone)]
pub enum Template {
    Element(Element),
    /// Static text.
    Text(String),
    /// `{{ expr }}`
    Interpolation(Expr),
    Component(ComponentRef),
    /// Where a component projects the content it was given. The fallback is
    /// rendered when no content was given.
    Slot(Vec<Template>),
    If(Conditional),
    Repeat(Repeat),
}

impl Template {
    pub fn element(tag: impl Into<String>) -> Element {
        Element::new(tag)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn interpolate(expr: Expr) -> Self {
        Self::Interpolation(expr)
    }

    pub fn component(name: impl Into<String>) -> ComponentRef {
        ComponentRef::new(name)
    }

    pub fn slot() -> Self {
        Self::Slot(Vec::new())
    }

    pub fn when(condition: Expr, then: Vec<Template>) -> Conditional {
        Conditional {
            condition,
            then,
            otherwise: Vec::new(),
        }
    }

    pub fn repeat(source: Expr, body: Vec<Template>) -> Repeat {
        Repeat {
            source,
            alias: None,
            body,
        }
    }
}

/// A directive attached to an element.
#[derive(Debug, Clone)]
pub struct DirectiveSpec {
    pub name: String,
    pub argument: Option<String>,
    pub expr: Option<Expr>,
}

impl DirectiveSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argument: None,
            expr: None,
        }
    }

    pub fn argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = Some(argument.into());
        self
    }

    pub fn expr(mut self, expr: Expr) -> Self {
        self.expr = Some(expr);
        self
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    /// Explicit namespace. When absent it is derived from the tag and the
    /// surrounding namespace.
    pub namespace: Option<Namespace>,
    pub attributes: Vec<(String, String)>,
    pub bindings: Vec<(String, Expr)>,
    pub directives: Vec<DirectiveSpec>,
    pub children: Vec<Template>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            namespace: None,
            attributes: Vec::new(),
            bindings: Vec::new(),
            directives: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Bind an attribute to an expression.
    pub fn bind(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.bindings.push((name.into(), expr));
        self
    }

    pub fn directive(mut self, directive: DirectiveSpec) -> Self {
        self.directives.push(directive);
        self
    }

    pub fn child(mut self, child: impl Into<Template>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Template>) -> Self {
        self.children.extend(children);
        self
    }
}

/// A reference to a child component.
#[derive(Debug, Clone)]
pub struct ComponentRef {
    pub name: String,
    /// Markup the child projects through its slot. It is rendered with the
    /// referencing component's scope.
    pub content: Vec<Template>,
    /// Registers the child in the parent's refs.
    pub ref_name: Option<String>,
}

impl ComponentRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: Vec::new(),
            ref_name: None,
        }
    }

    pub fn content(mut self, content: Vec<Template>) -> Self {
        self.content = content;
        self
    }

    pub fn with_ref(mut self, name: impl Into<String>) -> Self {
        self.ref_name = Some(name.into());
        self
    }
}

/// A conditional block.
#[derive(Debug, Clone)]
pub struct Conditional {
    pub condition: Expr,
    pub then: Vec<Template>,
    pub otherwise: Vec<Template>,
}

impl Conditional {
    pub fn otherwise(mut self, otherwise: Vec<Template>) -> Self {
        self.otherwise = otherwise;
        self
    }
}

/// A repeated block. Each item sees `$value`, `$index`, `$key` for
/// objects, and the alias when one is set.
#[derive(Debug, Clone)]
pub struct Repeat {
    pub source: Expr,
    pub alias: Option<String>,
    pub body: Vec<Template>,
}

impl Repeat {
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl From<Element> for Template {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<ComponentRef> for Template {
    fn from(component: ComponentRef) -> Self {
        Self::Component(component)
    }
}

impl From<Conditional> for Template {
    fn from(conditional: Conditional) -> Self {
        Self::If(conditional)
    }
}

impl From<Repeat> for Template {
    fn from(repeat: Repeat) -> Self {
        Self::Repeat(repeat)
    }
}

impl From<&str> for Template {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}
