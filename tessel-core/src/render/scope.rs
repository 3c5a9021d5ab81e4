use std::rc::Rc;

use indexmap::IndexMap;

use crate::reactive::{Observable, Value, WatcherId};
use crate::runtime::{Runtime, WeakRuntime};

/// What an expression can see: block locals, then computed properties,
/// then the component's data.
///
/// Every read goes through the observable layer, so an expression
/// evaluated inside a watcher subscribes it to exactly what it touched.
#[derive(Clone)]
pub struct Scope {
    runtime: WeakRuntime,
    data: Rc<Observable>,
    computed: Rc<IndexMap<String, WatcherId>>,
    /// Innermost last.
    locals: Vec<Rc<Observable>>,
}

impl Scope {
    pub(crate) fn new(
        runtime: &Runtime,
        data: Rc<Observable>,
        computed: Rc<IndexMap<String, WatcherId>>,
    ) -> Self {
        Self {
            runtime: runtime.downgrade(),
            data,
            computed,
            locals: Vec::new(),
        }
    }

    /// A child scope with one more layer of locals.
    pub(crate) fn with_locals(&self, locals: Rc<Observable>) -> Self {
        let mut scope = self.clone();
        scope.locals.push(locals);
        scope
    }

    /// The component's data.
    pub fn data(&self) -> &Rc<Observable> {
        &self.data
    }

    /// Read a single key.
    pub fn get(&self, key: &str) -> Value {
        self.lookup(key)
    }

    /// Read a dotted path.
    pub fn lookup(&self, path: &str) -> Value {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        if let Some(local) = self.locals.iter().rev().find(|l| l.contains_key(head)) {
            return local.get_path(path);
        }

        if let Some(id) = self.computed.get(head) {
            let value = self
                .runtime
                .upgrade()
                .map(|rt| rt.computed_value(*id))
                .unwrap_or_default();
            return match rest {
                Some(rest) => value.lookup(rest),
                None => value,
            };
        }

        self.data.get_path(path)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("data", &self.data)
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .field("locals", &self.locals.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryHost;
    use crate::reactive::Object;

    #[test]
    fn locals_shadow_data() {
        let rt = Runtime::new(Rc::new(MemoryHost::new()));
        let data = Observable::wrap(&rt, Object::new().with("x", 1).with("y", 2));
        let scope = Scope::new(&rt, data, Rc::new(IndexMap::new()));
        let inner = scope.with_locals(Observable::wrap(&rt, Object::new().with("x", 10)));

        assert_eq!(inner.get("x"), Value::from(10));
        assert_eq!(inner.get("y"), Value::from(2));
        assert_eq!(scope.get("x"), Value::from(1));
    }

    #[test]
    fn paths_walk_into_locals() {
        let rt = Runtime::new(Rc::new(MemoryHost::new()));
        let data = Observable::wrap(&rt, Object::new());
        let scope = Scope::new(&rt, data, Rc::new(IndexMap::new())).with_locals(
            Observable::wrap(&rt, Object::new().with("item", Object::new().with("id", 7))),
        );
        assert_eq!(scope.lookup("item.id"), Value::from(7));
        assert_eq!(scope.lookup("missing.id"), Value::Null);
    }
}
