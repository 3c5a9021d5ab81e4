//! In-memory UI host.

use std::cell::RefCell;
use std::fmt::Write as _;

use indexmap::IndexMap;
use tracing::debug;

use super::{Host, Namespace, NodeId};

#[derive(Debug, Clone)]
enum Kind {
    Document,
    Fragment,
    Element {
        tag: String,
        namespace: Namespace,
        attributes: IndexMap<String, String>,
    },
    Text(String),
    Anchor(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: Kind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A headless [`Host`] that keeps the whole tree in memory.
///
/// Node `0` is the document. Anything reachable from it counts as attached.
/// Serialization skips anchors, so rendered output reads like plain markup.
///
/// Node IDs are indices into an append-only arena: removed nodes are never
/// freed or reused, so the arena grows with every node ever created. This
/// suits tests and short-lived headless renders, not long-running hosts.
#[derive(Debug)]
pub struct MemoryHost {
    nodes: RefCell<Vec<NodeData>>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self {
            nodes: RefCell::new(vec![NodeData {
                kind: Kind::Document,
                parent: None,
                children: Vec::new(),
            }]),
        }
    }

    /// The document root.
    pub fn document(&self) -> NodeId {
        NodeId(0)
    }

    /// Create an element and append it to the document.
    pub fn attach_element(&self, tag: &str) -> NodeId {
        let node = self.create_element(tag, Namespace::for_tag(tag, Namespace::Html));
        self.insert(self.document(), node, None);
        node
    }

    fn alloc(&self, kind: Kind) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len() as u64);
        nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn with_node<R>(&self, node: NodeId, f: impl FnOnce(&NodeData) -> R) -> Option<R> {
        self.nodes.borrow().get(node.0 as usize).map(f)
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    fn is_inclusive_ancestor(nodes: &[NodeData], ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = nodes.get(id.0 as usize).and_then(|n| n.parent);
        }
        false
    }

    fn detach(nodes: &mut [NodeData], node: NodeId) {
        let Some(parent) = nodes[node.0 as usize].parent.take() else {
            return;
        };
        nodes[parent.0 as usize].children.retain(|c| *c != node);
    }

    /// Child node IDs, including anchors.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.with_node(node, |n| n.children.clone()).unwrap_or_default()
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        self.with_node(node, |n| match &n.kind {
            Kind::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        })
        .flatten()
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.with_node(node, |n| match &n.kind {
            Kind::Element { attributes, .. } => attributes.get(name).cloned(),
            _ => None,
        })
        .flatten()
    }

    /// Visible element children, in order.
    pub fn elements(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .into_iter()
            .filter(|c| self.tag(*c).is_some())
            .collect()
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, node: NodeId) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        collect_text(&nodes, node, &mut out);
        out
    }

    /// Markup of the node's children. Anchors serialize to nothing.
    pub fn inner_html(&self, node: NodeId) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        if let Some(data) = nodes.get(node.0 as usize) {
            for child in &data.children {
                serialize(&nodes, *child, &mut out);
            }
        }
        out
    }

    /// Markup of the node itself.
    pub fn outer_html(&self, node: NodeId) -> String {
        let nodes = self.nodes.borrow();
        let mut out = String::new();
        serialize(&nodes, node, &mut out);
        out
    }
}

fn collect_text(nodes: &[NodeData], node: NodeId, out: &mut String) {
    let Some(data) = nodes.get(node.0 as usize) else {
        return;
    };
    if let Kind::Text(text) = &data.kind {
        out.push_str(text);
    }
    for child in &data.children {
        collect_text(nodes, *child, out);
    }
}

fn escape(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

fn serialize(nodes: &[NodeData], node: NodeId, out: &mut String) {
    let Some(data) = nodes.get(node.0 as usize) else {
        return;
    };
    match &data.kind {
        Kind::Text(text) => escape(text, out),
        Kind::Anchor(_) => {}
        Kind::Document | Kind::Fragment => {
            for child in &data.children {
                serialize(nodes, *child, out);
            }
        }
        Kind::Element {
            tag, attributes, ..
        } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attributes {
                let _ = write!(out, " {name}=\"");
                escape(value, out);
                out.push('"');
            }
            out.push('>');
            for child in &data.children {
                serialize(nodes, *child, out);
            }
            let _ = write!(out, "</{tag}>");
        }
    }
}

impl Host for MemoryHost {
    fn create_element(&self, tag: &str, namespace: Namespace) -> NodeId {
        self.alloc(Kind::Element {
            tag: tag.to_owned(),
            namespace,
            attributes: IndexMap::new(),
        })
    }

    fn create_text(&self, text: &str) -> NodeId {
        self.alloc(Kind::Text(text.to_owned()))
    }

    fn create_anchor(&self, label: &str) -> NodeId {
        self.alloc(Kind::Anchor(label.to_owned()))
    }

    fn create_fragment(&self) -> NodeId {
        self.alloc(Kind::Fragment)
    }

    fn insert(&self, parent: NodeId, node: NodeId, before: Option<NodeId>) {
        let mut nodes = self.nodes.borrow_mut();
        let len = nodes.len() as u64;
        if parent.0 >= len || node.0 >= len || node.0 == 0 {
            debug!(%parent, %node, "ignoring insert of unknown node");
            return;
        }
        if Self::is_inclusive_ancestor(&nodes, node, parent) {
            debug!(%parent, %node, "ignoring insert of a node into its own subtree");
            return;
        }
        Self::detach(&mut nodes, node);

        let children = &mut nodes[parent.0 as usize].children;
        let index = before
            .and_then(|b| children.iter().position(|c| *c == b))
            .unwrap_or(children.len());
        children.insert(index, node);
        nodes[node.0 as usize].parent = Some(parent);
    }

    fn remove(&self, node: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        if (node.0 as usize) < nodes.len() {
            Self::detach(&mut nodes, node);
        }
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(NodeData {
            kind: Kind::Element { attributes, .. },
            ..
        }) = self.nodes.borrow_mut().get_mut(node.0 as usize)
        {
            attributes.insert(name.to_owned(), value.to_owned());
        }
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(NodeData {
            kind: Kind::Element { attributes, .. },
            ..
        }) = self.nodes.borrow_mut().get_mut(node.0 as usize)
        {
            attributes.shift_remove(name);
        }
    }

    fn set_text(&self, node: NodeId, text: &str) {
        if let Some(NodeData {
            kind: Kind::Text(current),
            ..
        }) = self.nodes.borrow_mut().get_mut(node.0 as usize)
        {
            *current = text.to_owned();
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.with_node(node, |n| n.parent).flatten()
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.with_node(node, |n| n.children.first().copied()).flatten()
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let nodes = self.nodes.borrow();
        let parent = nodes.get(node.0 as usize)?.parent?;
        let siblings = &nodes[parent.0 as usize].children;
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }

    fn in_document(&self, node: NodeId) -> bool {
        let nodes = self.nodes.borrow();
        let mut current = Some(node);
        while let Some(id) = current {
            if id.0 == 0 {
                return true;
            }
            current = nodes.get(id.0 as usize).and_then(|n| n.parent);
        }
        false
    }

    fn namespace(&self, node: NodeId) -> Option<Namespace> {
        self.with_node(node, |n| match &n.kind {
            Kind::Element { namespace, .. } => Some(*namespace),
            _ => None,
        })
        .flatten()
    }
}
