//! Conditional and List Render Controllers
//!
//! Both controllers are directives on an anchor node. They render their
//! body as [`Block`]s: a run of sibling nodes between two anchors, placed
//! before the controller's anchor, together with everything the render
//! created.
//!
//! Removing a block runs the full destroy cascade of each component in it
//! before the block's nodes leave the tree. Blocks render with the context
//! of the place they were declared, so namespaces carry through exactly as
//! they would for static markup.

mod conditional;
mod repeat;

pub(crate) use conditional::IfDirective;
pub(crate) use repeat::RepeatDirective;

use std::rc::Rc;

use tracing::trace;

use crate::dom::{self, NodeId};
use crate::error::Error;
use crate::reactive::Observable;
use crate::render::{Output, RenderContext, Template};
use crate::runtime::Runtime;

/// A rendered run of nodes owned by a controller.
pub(crate) struct Block {
    pub(crate) start: NodeId,
    pub(crate) end: NodeId,
    output: Output,
    /// Per-block locals, for repeated blocks.
    pub(crate) locals: Option<Rc<Observable>>,
}

impl Runtime {
    /// Render `templates` as a block just before `anchor`.
    pub(crate) fn render_block(
        &self,
        templates: &[Template],
        cx: &RenderContext,
        anchor: NodeId,
        locals: Option<Rc<Observable>>,
    ) -> Option<Block> {
        let host = self.host();
        let Some(parent) = host.parent(anchor) else {
            self.report(Error::Detached(anchor));
            return None;
        };

        let start = host.create_anchor("block-start");
        let end = host.create_anchor("block-end");
        host.insert(parent, start, Some(anchor));
        host.insert(parent, end, Some(anchor));

        let cx = match &locals {
            Some(locals) => cx.with_locals(Rc::clone(locals)),
            None => cx.clone(),
        };
        let mut output = Output::default();
        self.render(templates, &cx, parent, Some(end), &mut output);
        trace!(component = %cx.owner, components = output.components.len(), "block rendered");

        // Initial renders attach with their owner; later ones attach here.
        if self.is_attached(cx.owner) {
            for component in &output.components {
                self.call_attach(*component);
            }
        }

        Some(Block {
            start,
            end,
            output,
            locals,
        })
    }

    /// Destroy a block's components, tear down its bindings, then take its
    /// nodes out of the tree.
    pub(crate) fn remove_block(&self, block: Block) {
        let Block {
            start, end, output, ..
        } = block;
        let Output {
            directives,
            components,
            watchers,
        } = output;

        for component in components {
            self.destroy(component, true);
        }
        self.teardown_output(Output {
            directives,
            components: Vec::new(),
            watchers,
        });
        dom::remove_range(self.host().as_ref(), start, end);
    }

    /// Tear down a block's bindings and components, leaving its nodes for
    /// whoever removes the enclosing fragment.
    pub(crate) fn teardown_block(&self, block: Block) {
        self.teardown_output(block.output);
    }
}
