use super::Block;
use crate::directive::{Directive, DirectiveContext};
use crate::reactive::Value;
use crate::render::Conditional;

/// Renders one of two branches depending on the truthiness of its
/// condition. Switching branches removes the old block before rendering the
/// new one.
pub(crate) struct IfDirective {
    conditional: Conditional,
    branch: Option<bool>,
    block: Option<Block>,
}

impl IfDirective {
    pub(crate) fn new(conditional: Conditional) -> Self {
        Self {
            conditional,
            branch: None,
            block: None,
        }
    }
}

impl Directive for IfDirective {
    fn update(&mut self, cx: &DirectiveContext<'_>, value: &Value, _old: &Value) {
        let truthy = value.is_truthy();
        if self.branch == Some(truthy) {
            return;
        }
        self.branch = Some(truthy);

        let runtime = cx.runtime();
        if let Some(block) = self.block.take() {
            runtime.remove_block(block);
        }
        let body = if truthy {
            &self.conditional.then
        } else {
            &self.conditional.otherwise
        };
        if !body.is_empty() {
            self.block = runtime.render_block(body, cx.render_context(), cx.node(), None);
        }
    }

    fn unbind(&mut self, cx: &DirectiveContext<'_>) {
        if let Some(block) = self.block.take() {
            cx.runtime().teardown_block(block);
        }
    }
}
