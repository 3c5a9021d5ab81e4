//! UI Tree Capability
//!
//! The core never implements tree semantics itself. It sequences calls on a
//! [`Host`], which owns the actual nodes. [`MemoryHost`] is a headless host
//! used by tests and embedders without a real UI tree.

mod memory;

pub use memory::MemoryHost;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to a node owned by a [`Host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Element namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    #[default]
    Html,
    Svg,
    MathMl,
}

impl Namespace {
    /// Namespace of an element with `tag` whose parent is in `inherited`.
    ///
    /// `svg` and `math` open their namespace. Everything else stays in the
    /// parent's namespace, which is how `<text>` under `<svg>` ends up SVG.
    pub fn for_tag(tag: &str, inherited: Namespace) -> Namespace {
        match tag {
            "svg" => Namespace::Svg,
            "math" => Namespace::MathMl,
            _ => inherited,
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            Namespace::Html => "http://www.w3.org/1999/xhtml",
            Namespace::Svg => "http://www.w3.org/2000/svg",
            Namespace::MathMl => "http://www.w3.org/1998/Math/MathML",
        }
    }
}

/// The UI-tree primitives the core invokes.
///
/// Operations on unknown nodes are ignored by implementations rather than
/// reported: the core only hands out IDs it got from the host.
pub trait Host {
    fn create_element(&self, tag: &str, namespace: Namespace) -> NodeId;

    fn create_text(&self, text: &str) -> NodeId;

    /// An invisible marker node delimiting a fragment or a block.
    fn create_anchor(&self, label: &str) -> NodeId;

    /// A detached container, used to hold nodes that are not in the tree.
    fn create_fragment(&self) -> NodeId;

    /// Insert `node` under `parent` before `before`, or append when `before`
    /// is `None`. A node that already has a parent is moved.
    fn insert(&self, parent: NodeId, node: NodeId, before: Option<NodeId>);

    /// Detach `node` from its parent.
    fn remove(&self, node: NodeId);

    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    fn remove_attribute(&self, node: NodeId, name: &str);

    fn set_text(&self, node: NodeId, text: &str);

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn first_child(&self, node: NodeId) -> Option<NodeId>;

    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    /// Whether `node` is connected to the live document.
    fn in_document(&self, node: NodeId) -> bool;

    fn namespace(&self, node: NodeId) -> Option<Namespace>;
}

/// Siblings from `start` through `end`, inclusive.
///
/// Stops early if the chain breaks before reaching `end`.
pub(crate) fn sibling_range(host: &dyn Host, start: NodeId, end: NodeId) -> Vec<NodeId> {
    let mut nodes = vec![start];
    let mut current = start;
    while current != end {
        match host.next_sibling(current) {
            Some(next) => {
                nodes.push(next);
                current = next;
            }
            None => break,
        }
    }
    nodes
}

/// Move the nodes `start..=end` under `parent`, before `before`.
pub(crate) fn move_range(
    host: &dyn Host,
    start: NodeId,
    end: NodeId,
    parent: NodeId,
    before: Option<NodeId>,
) {
    for node in sibling_range(host, start, end) {
        host.insert(parent, node, before);
    }
}

/// Detach the nodes `start..=end` from the tree.
pub(crate) fn remove_range(host: &dyn Host, start: NodeId, end: NodeId) {
    if host.parent(start).is_none() {
        host.remove(end);
        return;
    }
    for node in sibling_range(host, start, end) {
        host.remove(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_is_inherited_below_svg() {
        assert_eq!(Namespace::for_tag("svg", Namespace::Html), Namespace::Svg);
        assert_eq!(Namespace::for_tag("text", Namespace::Svg), Namespace::Svg);
        assert_eq!(Namespace::for_tag("div", Namespace::Html), Namespace::Html);
        assert_eq!(Namespace::for_tag("math", Namespace::Html), Namespace::MathMl);
    }

    #[test]
    fn ranges_cover_start_through_end() {
        let host = MemoryHost::new();
        let parent = host.create_element("div", Namespace::Html);
        let nodes: Vec<_> = (0..4).map(|i| host.create_text(&i.to_string())).collect();
        for node in &nodes {
            host.insert(parent, *node, None);
        }

        assert_eq!(sibling_range(&host, nodes[1], nodes[2]), vec![nodes[1], nodes[2]]);

        let other = host.create_element("p", Namespace::Html);
        move_range(&host, nodes[1], nodes[2], other, None);
        assert_eq!(host.text_content(parent), "03");
        assert_eq!(host.text_content(other), "12");

        remove_range(&host, nodes[1], nodes[2]);
        assert_eq!(host.text_content(other), "");
    }
}
