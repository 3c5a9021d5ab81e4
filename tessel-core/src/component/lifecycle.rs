//! Lifecycle
//!
//! Attach, detach and destroy cascades over the instance tree.
//!
//! # Attach
//!
//! An instance entering the document fires its own `attached`, then attaches
//! each logical child in creation order, then fires `ready` once, the first
//! time it completes. `attached` is therefore pre-order and `ready`
//! post-order. Projected children are reached through their logical parent,
//! so they attach in the position their author wrote them; the physical host
//! only picks them up when it is re-attached on its own later.
//!
//! # Destroy
//!
//! ```text
//! beforeDestroy(self)
//!   destroy each child (without removing nodes)
//!   tear down own watchers and directives
//!   remove own nodes, then detached(self) and every attached descendant
//! destroyed(self)
//! ```
//!
//! Every step is idempotent. Destroying twice, or detaching something that
//! is not attached, does nothing.

use std::rc::Rc;

use tracing::{debug, trace};

use super::{ComponentId, Instance, LifecycleHook, LifecycleState};
use crate::dom::{self, NodeId};
use crate::error::{Error, Result};
use crate::runtime::Runtime;

impl Runtime {
    fn transition(&self, instance: &Instance, next: LifecycleState) {
        let current = instance.state.get();
        if current.can_transition_to(next) {
            instance.state.set(next);
        } else {
            trace!(component = %instance.id, from = ?current, to = ?next, "ignored transition");
        }
    }

    /// Run the hooks registered for `hook`, with tracking suspended.
    pub(crate) fn call_hook(&self, id: ComponentId, hook: LifecycleHook) {
        let Some(instance) = self.instance(id) else {
            return;
        };
        let hooks = instance.options.hooks.get(&hook).cloned().unwrap_or_default();
        trace!(component = %id, name = %instance.options.name, %hook, "hook");
        for f in hooks {
            self.untracked(|| f(self, id));
        }
    }

    /// Attach an instance that is in the document, then its subtree.
    pub(crate) fn call_attach(&self, id: ComponentId) {
        let Some(instance) = self.instance(id) else {
            return;
        };
        if instance.attached.get()
            || instance.being_destroyed.get()
            || !self.host().in_document(instance.start)
        {
            return;
        }

        instance.attached.set(true);
        if instance.state.get() == LifecycleState::Created {
            self.transition(&instance, LifecycleState::Mounted);
        }
        self.call_hook(id, LifecycleHook::Attached);

        let children = instance.children.borrow().clone();
        for child in children {
            self.call_attach(child);
        }
        let transcluded = instance.transcluded.borrow().clone();
        for child in transcluded {
            if self.logical_parent_settled(child) {
                self.call_attach(child);
            }
        }

        if !instance.ready.replace(true) {
            self.call_hook(id, LifecycleHook::Ready);
        }
    }

    /// Whether a projected child's logical parent has finished its own
    /// attach pass, in which case it will not visit the child itself.
    fn logical_parent_settled(&self, id: ComponentId) -> bool {
        self.instance(id)
            .and_then(|child| child.parent)
            .and_then(|parent| self.instance(parent))
            .is_some_and(|parent| parent.attached.get() && parent.ready.get())
    }

    /// Detach an instance, then every descendant that left the document
    /// with it.
    pub(crate) fn call_detach(&self, id: ComponentId) {
        let Some(instance) = self.instance(id) else {
            return;
        };
        if !instance.attached.replace(false) {
            trace!(component = %id, "detach of unattached instance ignored");
            return;
        }
        self.call_hook(id, LifecycleHook::Detached);

        let host = self.host();
        let mut descendants = instance.children.borrow().clone();
        descendants.extend(instance.transcluded.borrow().iter().copied());
        for child in descendants {
            let left = self
                .instance(child)
                .is_some_and(|c| c.attached.get() && !host.in_document(c.start));
            if left {
                self.call_detach(child);
            }
        }
    }

    /// Destroy an instance and its subtree. With `remove`, its nodes are
    /// taken out of the tree and `detached` fires for everything that was
    /// attached. Destroying twice is a no-op.
    pub fn destroy(&self, id: ComponentId, remove: bool) {
        let depth = self.inner.destroy_depth.get();
        self.inner.destroy_depth.set(depth + 1);
        self.destroy_instance(id, remove);
        self.inner.destroy_depth.set(depth);
        if depth == 0 {
            self.sweep();
        }
    }

    pub(crate) fn destroy_instance(&self, id: ComponentId, remove: bool) {
        let Some(instance) = self.instance(id) else {
            trace!(component = %id, "destroy of unknown instance ignored");
            return;
        };
        if instance.being_destroyed.replace(true) {
            trace!(component = %id, "already destroyed");
            return;
        }

        self.transition(&instance, LifecycleState::Unmounting);
        self.call_hook(id, LifecycleHook::BeforeDestroy);
        self.unlink(&instance);

        let children = instance.children.borrow().clone();
        for child in children {
            self.destroy_instance(child, false);
        }
        let transcluded = instance.transcluded.borrow().clone();
        for child in transcluded {
            self.destroy_instance(child, false);
        }

        let output = std::mem::take(&mut *instance.output.borrow_mut());
        self.teardown_output(output);

        if remove {
            dom::remove_range(self.host().as_ref(), instance.start, instance.end);
            self.call_detach(id);
        }

        self.transition(&instance, LifecycleState::Destroyed);
        self.call_hook(id, LifecycleHook::Destroyed);
        debug!(component = %id, name = %instance.options.name, "instance destroyed");
    }

    /// Drop the instance from a parent and physical host that outlive it.
    fn unlink(&self, instance: &Rc<Instance>) {
        let id = instance.id;
        if let Some(parent) = instance.parent.and_then(|p| self.instance(p)) {
            if !parent.being_destroyed.get() {
                parent.children.borrow_mut().retain(|c| *c != id);
                if let Some(name) = &instance.ref_name {
                    let mut refs = parent.refs.borrow_mut();
                    if refs.get(name) == Some(&id) {
                        refs.shift_remove(name);
                    }
                }
            }
        }
        if let Some(physical) = instance.physical_host.and_then(|p| self.instance(p)) {
            if !physical.being_destroyed.get() {
                physical.transcluded.borrow_mut().retain(|c| *c != id);
            }
        }
    }

    fn sweep(&self) {
        let removed: Vec<Rc<Instance>> = {
            let mut components = self.inner.components.borrow_mut();
            let dead: Vec<ComponentId> = components
                .iter()
                .filter(|(_, i)| i.state.get() == LifecycleState::Destroyed)
                .map(|(id, _)| *id)
                .collect();
            dead.iter().filter_map(|id| components.remove(id)).collect()
        };
        if !removed.is_empty() {
            trace!(count = removed.len(), "swept destroyed instances");
        }
    }

    /// Take an instance's nodes out of the tree without destroying it.
    pub fn remove(&self, id: ComponentId) -> Result<()> {
        let instance = self
            .instance(id)
            .filter(|i| !i.being_destroyed.get())
            .ok_or(Error::NoSuchInstance(id))?;
        let host = self.host();
        let fragment = host.create_fragment();
        dom::move_range(host.as_ref(), instance.start, instance.end, fragment, None);
        self.call_detach(id);
        Ok(())
    }

    /// Move an instance's nodes to the end of `target`. Entering the
    /// document attaches it; leaving it detaches it.
    pub fn append_to(&self, id: ComponentId, target: NodeId) -> Result<()> {
        let instance = self
            .instance(id)
            .filter(|i| !i.being_destroyed.get())
            .ok_or(Error::NoSuchInstance(id))?;
        let host = self.host();
        dom::move_range(host.as_ref(), instance.start, instance.end, target, None);
        if host.in_document(target) {
            self.call_attach(id);
        } else {
            self.call_detach(id);
        }
        Ok(())
    }

    /// Append on the next tick. If the instance is destroyed first, the
    /// append does nothing.
    pub fn append_to_deferred(&self, id: ComponentId, target: NodeId) {
        self.next_tick(move |rt| {
            if !rt.is_alive(id) {
                trace!(component = %id, "deferred append skipped, instance is gone");
                return;
            }
            if let Err(err) = rt.append_to(id, target) {
                rt.report(err);
            }
        });
    }

    /// Fire `updated` for a mounted instance whose watchers re-ran.
    pub(crate) fn component_updated(&self, id: ComponentId) {
        let Some(instance) = self.instance(id) else {
            return;
        };
        if instance.being_destroyed.get() || !instance.state.get().is_mounted() {
            return;
        }
        self.transition(&instance, LifecycleState::Updated);
        self.call_hook(id, LifecycleHook::Updated);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::component::ComponentOptions;
    use crate::dom::MemoryHost;
    use crate::reactive::Object;
    use crate::render::{Expr, Template};

    type Log = Rc<RefCell<Vec<String>>>;

    fn logged(name: &str, log: &Log) -> ComponentOptions {
        let mut options = ComponentOptions::new(name).template(vec![Template::text(name)]);
        for hook in [
            LifecycleHook::Attached,
            LifecycleHook::Ready,
            LifecycleHook::Detached,
            LifecycleHook::BeforeDestroy,
            LifecycleHook::Destroyed,
        ] {
            let log = Rc::clone(log);
            let name = name.to_owned();
            options = options.on(hook, move |_, _| log.borrow_mut().push(format!("{name}.{hook}")));
        }
        options
    }

    #[test]
    fn created_fires_before_render() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        let view = host.clone();
        let el = host.attach_element("div");
        let options = ComponentOptions::new("app")
            .template(vec![Template::text("body")])
            .on(LifecycleHook::Created, move |rt, id| {
                *s.borrow_mut() = Some((view.text_content(el), rt.state(id)));
            });
        rt.mount(options, el);
        assert_eq!(
            *seen.borrow(),
            Some((String::new(), Some(LifecycleState::Created)))
        );
    }

    #[test]
    fn detached_mount_attaches_on_append() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let log: Log = Rc::default();
        let app = rt.create(logged("app", &log));
        assert!(log.borrow().is_empty());
        assert_eq!(rt.state(app), Some(LifecycleState::Created));

        let el = host.attach_element("div");
        rt.append_to(app, el).unwrap();
        assert_eq!(*log.borrow(), vec!["app.attached", "app.ready"]);
        assert_eq!(host.inner_html(el), "app");
        assert_eq!(rt.state(app), Some(LifecycleState::Mounted));

        rt.remove(app).unwrap();
        rt.append_to(app, el).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["app.attached", "app.ready", "app.detached", "app.attached"]
        );
    }

    #[test]
    fn destroy_is_idempotent() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let log: Log = Rc::default();
        let el = host.attach_element("div");
        let app = rt.mount(logged("app", &log), el);
        log.borrow_mut().clear();

        rt.destroy(app, true);
        rt.destroy(app, true);
        assert_eq!(
            *log.borrow(),
            vec!["app.beforeDestroy", "app.detached", "app.destroyed"]
        );
        assert_eq!(rt.component_count(), 0);
        assert_eq!(rt.state(app), None);
        assert!(matches!(rt.remove(app), Err(Error::NoSuchInstance(_))));
    }

    #[test]
    fn destroy_without_remove_keeps_nodes_and_skips_detached() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let log: Log = Rc::default();
        let el = host.attach_element("div");
        let app = rt.mount(logged("app", &log), el);
        log.borrow_mut().clear();

        rt.destroy(app, false);
        assert_eq!(*log.borrow(), vec!["app.beforeDestroy", "app.destroyed"]);
        assert_eq!(host.inner_html(el), "app");
    }

    #[test]
    fn deferred_append_is_skipped_after_destroy() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let log: Log = Rc::default();
        let el = host.attach_element("div");
        let app = rt.create(logged("app", &log));

        rt.append_to_deferred(app, el);
        rt.destroy(app, true);
        rt.tick();
        assert_eq!(*log.borrow(), vec!["app.beforeDestroy", "app.destroyed"]);
        assert_eq!(host.inner_html(el), "");
        assert!(rt.take_diagnostics().is_empty());
    }

    #[test]
    fn deferred_append_attaches_on_tick() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let log: Log = Rc::default();
        let el = host.attach_element("div");
        let app = rt.create(logged("app", &log));

        rt.append_to_deferred(app, el);
        assert!(log.borrow().is_empty());
        rt.tick();
        assert_eq!(*log.borrow(), vec!["app.attached", "app.ready"]);
        assert!(rt.is_attached(app));
    }

    #[test]
    fn updated_fires_once_per_flush() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let updates = Rc::new(RefCell::new(0));
        let u = Rc::clone(&updates);
        let options = ComponentOptions::new("app")
            .data(Object::new().with("a", 1).with("b", 2))
            .template(vec![
                Template::interpolate(Expr::path("a")),
                Template::interpolate(Expr::path("b")),
            ])
            .on(LifecycleHook::Updated, move |_, _| *u.borrow_mut() += 1);
        let el = host.attach_element("div");
        let app = rt.mount(options, el);

        rt.set(app, "a", 10).unwrap();
        rt.set(app, "b", 20).unwrap();
        rt.tick();
        assert_eq!(*updates.borrow(), 1);
        assert_eq!(rt.state(app), Some(LifecycleState::Updated));
        assert_eq!(host.text_content(el), "1020");
    }

    #[test]
    fn user_watchers_are_torn_down_with_their_component() {
        let host = Rc::new(MemoryHost::new());
        let rt = Runtime::new(host.clone());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let el = host.attach_element("div");
        let app = rt.mount(
            ComponentOptions::new("app").data(Object::new().with("n", 1)),
            el,
        );

        let s = Rc::clone(&seen);
        rt.watch(app, Expr::path("n"), move |_, new, old| {
            s.borrow_mut().push((new.clone(), old.clone()))
        })
        .unwrap();
        rt.set(app, "n", 2).unwrap();
        rt.tick();
        assert_eq!(seen.borrow().len(), 1);

        rt.destroy(app, true);
        assert_eq!(rt.watcher_count(), 0);
    }
}
