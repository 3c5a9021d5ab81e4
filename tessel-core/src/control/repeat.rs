use tracing::debug;

use super::Block;
use crate::directive::{Directive, DirectiveContext};
use crate::dom::{self, NodeId};
use crate::reactive::{Object, Observable, Value};
use crate::render::Repeat;

struct Item {
    key: Option<String>,
    value: Value,
}

struct Entry {
    key: Option<String>,
    value: Value,
    block: Block,
}

/// Renders its body once per item of an array, object, or number range.
///
/// Blocks are reused across updates when an item with an equal value and key
/// is still present; their `$index` is refreshed and their nodes moved into
/// the new order. Blocks whose item disappeared are removed.
pub(crate) struct RepeatDirective {
    repeat: Repeat,
    start: Option<NodeId>,
    entries: Vec<Entry>,
}

impl RepeatDirective {
    pub(crate) fn new(repeat: Repeat) -> Self {
        Self {
            repeat,
            start: None,
            entries: Vec::new(),
        }
    }

    fn locals(&self, item: &Item, index: usize) -> Object {
        let mut locals = Object::new()
            .with("$index", index)
            .with("$value", item.value.clone());
        if let Some(key) = &item.key {
            locals.insert("$key", key.as_str());
        }
        if let Some(alias) = &self.repeat.alias {
            locals.insert(alias.as_str(), item.value.clone());
        }
        locals
    }
}

fn items(source: &Value) -> Vec<Item> {
    match source {
        Value::Array(values) => values
            .iter()
            .map(|value| Item {
                key: None,
                value: value.clone(),
            })
            .collect(),
        Value::Object(object) => object
            .iter()
            .map(|(key, value)| Item {
                key: Some(key.clone()),
                value: value.clone(),
            })
            .collect(),
        Value::Number(_) => {
            let count = source.as_i64().unwrap_or(0).max(0);
            (0..count)
                .map(|i| Item {
                    key: None,
                    value: Value::from(i),
                })
                .collect()
        }
        Value::Null => Vec::new(),
        other => {
            debug!(source = %other, "cannot repeat over value");
            Vec::new()
        }
    }
}

impl Directive for RepeatDirective {
    fn bind(&mut self, cx: &DirectiveContext<'_>) {
        let host = cx.host();
        if let Some(parent) = host.parent(cx.node()) {
            let start = host.create_anchor("repeat-start");
            host.insert(parent, start, Some(cx.node()));
            self.start = Some(start);
        }
    }

    fn update(&mut self, cx: &DirectiveContext<'_>, value: &Value, _old: &Value) {
        let runtime = cx.runtime();
        let mut previous: Vec<Option<Entry>> =
            std::mem::take(&mut self.entries).into_iter().map(Some).collect();
        let mut entries = Vec::new();

        for (index, item) in items(value).into_iter().enumerate() {
            let reused = previous
                .iter()
                .position(|slot| {
                    slot.as_ref()
                        .is_some_and(|e| e.key == item.key && e.value == item.value)
                })
                .and_then(|i| previous[i].take());

            match reused {
                Some(entry) => {
                    if let Some(locals) = &entry.block.locals {
                        locals.set("$index", index);
                    }
                    entries.push(entry);
                }
                None => {
                    let locals = Observable::wrap(runtime, self.locals(&item, index));
                    let Some(block) = runtime.render_block(
                        &self.repeat.body,
                        cx.render_context(),
                        cx.node(),
                        Some(locals),
                    ) else {
                        continue;
                    };
                    entries.push(Entry {
                        key: item.key,
                        value: item.value,
                        block,
                    });
                }
            }
        }

        for entry in previous.into_iter().flatten() {
            runtime.remove_block(entry.block);
        }

        let host = cx.host();
        if let (Some(start), Some(parent)) = (self.start, host.parent(cx.node())) {
            let mut previous_end = start;
            for entry in &entries {
                let expected = host.next_sibling(previous_end);
                if expected != Some(entry.block.start) {
                    dom::move_range(
                        host.as_ref(),
                        entry.block.start,
                        entry.block.end,
                        parent,
                        expected,
                    );
                }
                previous_end = entry.block.end;
            }
        }
        self.entries = entries;
    }

    fn unbind(&mut self, cx: &DirectiveContext<'_>) {
        for entry in self.entries.drain(..) {
            cx.runtime().teardown_block(entry.block);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::component::ComponentOptions;
    use crate::dom::MemoryHost;
    use crate::reactive::{Object, Value};
    use crate::render::{Expr, Template};
    use crate::runtime::Runtime;

    fn list_app(list: Value) -> ComponentOptions {
        ComponentOptions::new("app")
            .data(Object::new().with("list", list))
            .template(vec![Template::element("ul")
                .child(Template::repeat(
                    Expr::path("list"),
                    vec![Template::element("li")
                        .child(Template::interpolate(Expr::path("$index")))
                        .child(":")
                        .child(Template::interpolate(Expr::path("$value")))
                        .into()],
                ))
                .into()])
    }

    #[test]
    fn renders_items_in_order() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let el = host.attach_element("div");
        rt.mount(list_app(Value::from(vec!["a", "b"])), el);
        assert_eq!(host.inner_html(el), "<ul><li>0:a</li><li>1:b</li></ul>");
    }

    #[test]
    fn reorders_reused_blocks_and_refreshes_index() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let el = host.attach_element("div");
        let app = rt.mount(list_app(Value::from(vec!["a", "b", "c"])), el);
        let ul = host.elements(el)[0];
        let before = host.elements(ul);

        rt.set(app, "list", Value::from(vec!["c", "a"])).unwrap();
        rt.tick();
        assert_eq!(host.inner_html(el), "<ul><li>0:c</li><li>1:a</li></ul>");
        // `c` and `a` kept their nodes
        assert_eq!(host.elements(ul), vec![before[2], before[0]]);
    }

    #[test]
    fn repeats_over_objects_and_ranges() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let options = ComponentOptions::new("app")
            .data(
                Object::new()
                    .with("user", Object::new().with("name", "ada").with("lang", "en"))
                    .with("n", 3),
            )
            .template(vec![
                Template::repeat(
                    Expr::path("user"),
                    vec![Template::interpolate(Expr::path("$key"))],
                )
                .into(),
                Template::repeat(
                    Expr::path("n"),
                    vec![Template::interpolate(Expr::path("i"))],
                )
                .alias("i")
                .into(),
            ]);
        let el = host.attach_element("div");
        rt.mount(options, el);
        assert_eq!(host.text_content(el), "namelang012");
    }

    #[test]
    fn shrinking_the_list_removes_blocks() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let el = host.attach_element("div");
        let app = rt.mount(list_app(Value::from(vec![1, 2, 3])), el);
        let directives = rt.directive_count();

        rt.set(app, "list", Value::from(vec![2])).unwrap();
        rt.tick();
        assert_eq!(host.inner_html(el), "<ul><li>0:2</li></ul>");
        assert_eq!(rt.directive_count(), directives - 4);
    }
}
