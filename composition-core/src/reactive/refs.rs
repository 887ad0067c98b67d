//! Ref: a reactive single-value cell.
//!
//! Reading a ref registers the running effect as a dependent and subscribes
//! the current component instance. Writing a value that is not the
//! [`SameValue`] as the stored one notifies every subscribed instance and
//! then re-runs every dependent effect, all before `set` returns.
//!
//! ```rust,ignore
//! let count = use_ref(0);
//! count.set(0); // unchanged: nothing happens
//! count.set(1); // subscribers get (None, &0), then effects re-run
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::context::untrack;
use super::ids::TargetId;
use super::runtime::{Runtime, VALUE};
use super::same_value::SameValue;
use crate::component::{current_instance, Instance};
use crate::error::ReactiveError;

/// A reactive reference: something with a tracked `get` and a notifying
/// `set`. Both [`Ref`] and [`Computed`](super::Computed) implement it, which
/// lets reactive objects hold either behind one type.
pub trait ReactiveRef<T>: Send + Sync {
    /// Tracked read.
    fn get(&self) -> T;

    /// Write through the reference.
    fn set(&self, value: T) -> Result<(), ReactiveError>;

    /// The handle dependencies on this reference are registered under.
    fn target_id(&self) -> TargetId;
}

struct RefCore<T> {
    id: TargetId,
    value: RwLock<T>,
}

impl<T> Drop for RefCore<T> {
    fn drop(&mut self) {
        Runtime::forget_target(self.id);
    }
}

/// A reactive value cell. Clones share the same cell.
pub struct Ref<T> {
    core: Arc<RefCore<T>>,
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T> Ref<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            core: Arc::new(RefCore {
                id: TargetId::new(),
                value: RwLock::new(value),
            }),
        }
    }

    /// Read the value, tracking it in the running effect and subscribing
    /// the current instance.
    pub fn get(&self) -> T {
        self.track();
        self.core.value.read().clone()
    }

    /// Read the value without tracking or subscribing.
    pub fn get_untracked(&self) -> T {
        self.core.value.read().clone()
    }

    /// Tracked read through a borrow, for values that are costly to clone.
    ///
    /// `f` must not write to this ref.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.core.value.read())
    }

    /// Store `value`. Does nothing when it is the same value as the current
    /// one; otherwise notifies subscribed instances with the old value and
    /// then triggers dependent effects.
    pub fn set(&self, value: T) {
        let old = {
            let mut slot = self.core.value.write();
            if slot.same_value(&value) {
                return;
            }
            std::mem::replace(&mut *slot, value)
        };

        trace!(target = %self.core.id, "ref changed");
        untrack(|| {
            Runtime::notify_instances(self.core.id, &old);
            Runtime::trigger(self.core.id, VALUE);
        });
    }

    /// Replace the value with `f(&current)`.
    ///
    /// `f` runs on a copy of the value, so it may read or write this ref.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let current = self.core.value.read().clone();
        self.set(f(&current));
    }

    /// Subscribe an instance explicitly, without reading the value.
    pub fn subscribe(&self, instance: &Instance) {
        Runtime::subscribe_instance(self.core.id, instance);
    }

    pub fn id(&self) -> TargetId {
        self.core.id
    }

    /// Number of component instances subscribed to this ref.
    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.core.id)
    }

    /// Check whether two handles share one cell.
    pub fn ptr_eq(&self, other: &Ref<T>) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    fn track(&self) {
        Runtime::track(self.core.id, VALUE);
        if let Some(instance) = current_instance() {
            Runtime::subscribe_instance(self.core.id, &instance);
        }
    }
}

impl<T> ReactiveRef<T> for Ref<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Ref::get(self)
    }

    fn set(&self, value: T) -> Result<(), ReactiveError> {
        Ref::set(self, value);
        Ok(())
    }

    fn target_id(&self) -> TargetId {
        self.core.id
    }
}

impl<T> Default for Ref<T>
where
    T: Clone + Default + SameValue + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("id", &self.core.id)
            .field("value", &*self.core.value.read())
            .finish()
    }
}

/// Create a ref holding `value`.
pub fn use_ref<T>(value: T) -> Ref<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    Ref::new(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{with_current_instance, UpdateHost};
    use crate::reactive::watch_effect;
    use parking_lot::Mutex;
    use std::any::Any;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[derive(Default)]
    struct RecordingHost {
        requests: Mutex<Vec<Option<i32>>>,
    }

    impl UpdateHost for RecordingHost {
        fn request_update(&self, _property: Option<&str>, old_value: &dyn Any) {
            self.requests.lock().push(old_value.downcast_ref::<i32>().copied());
        }
    }

    fn instance(host: &Arc<RecordingHost>) -> Instance {
        let host: Arc<dyn UpdateHost> = host.clone();
        Instance::new(Arc::downgrade(&host))
    }

    #[test]
    fn ref_get_set() {
        let r = use_ref(42);
        assert_eq!(r.get(), 42);

        r.set(100);
        assert_eq!(r.get(), 100);

        r.update(|v| v + 1);
        assert_eq!(r.get_untracked(), 101);
    }

    #[test]
    fn same_value_write_is_silent() {
        let r = use_ref(0);
        let runs = Arc::new(AtomicI32::new(0));
        let (rc, runs_c) = (r.clone(), runs.clone());
        let handle = watch_effect(move || {
            rc.get();
            runs_c.fetch_add(1, Ordering::SeqCst);
        });

        r.set(0);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        r.set(1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        handle.stop();
    }

    #[test]
    fn nan_write_is_silent() {
        let r = use_ref(f64::NAN);
        let runs = Arc::new(AtomicI32::new(0));
        let (rc, runs_c) = (r.clone(), runs.clone());
        let handle = watch_effect(move || {
            rc.get();
            runs_c.fetch_add(1, Ordering::SeqCst);
        });

        r.set(f64::NAN);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        r.set(-0.0);
        r.set(0.0);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        handle.stop();
    }

    #[test]
    fn read_inside_instance_subscribes_it() {
        let host = Arc::new(RecordingHost::default());
        let inst = instance(&host);
        let r = use_ref(0);

        r.get();
        assert_eq!(r.subscriber_count(), 0);

        with_current_instance(&inst, || r.get());
        assert_eq!(r.subscriber_count(), 1);

        // Reading again does not duplicate the subscription.
        with_current_instance(&inst, || r.get());
        assert_eq!(r.subscriber_count(), 1);

        r.set(1);
        r.set(1);
        r.set(2);
        assert_eq!(*host.requests.lock(), vec![Some(0), Some(1)]);
    }

    #[test]
    fn subscribers_are_notified_before_effects() {
        let order = Arc::new(Mutex::new(Vec::new()));

        struct OrderHost(Arc<Mutex<Vec<&'static str>>>);
        impl UpdateHost for OrderHost {
            fn request_update(&self, _property: Option<&str>, _old: &dyn Any) {
                self.0.lock().push("instance");
            }
        }

        let host: Arc<dyn UpdateHost> = Arc::new(OrderHost(order.clone()));
        let inst = Instance::new(Arc::downgrade(&host));
        let r = use_ref(0);
        r.subscribe(&inst);

        let (rc, o) = (r.clone(), order.clone());
        let handle = watch_effect(move || {
            if rc.get() > 0 {
                o.lock().push("effect");
            }
        });

        r.set(1);
        assert_eq!(*order.lock(), vec!["instance", "effect"]);
        handle.stop();
    }

    #[test]
    fn dropping_last_handle_forgets_target() {
        let slot = Arc::new(Mutex::new(Some(use_ref(1))));
        let id = slot.lock().as_ref().map(Ref::id).unwrap();

        let s = slot.clone();
        let handle = watch_effect(move || {
            if let Some(r) = s.lock().as_ref() {
                r.get();
            }
        });
        assert_eq!(Runtime::dependent_count(id, VALUE), 1);

        // The effect is still alive, but the ref is gone.
        slot.lock().take();
        assert_eq!(Runtime::dependent_count(id, VALUE), 0);
        handle.stop();
    }

    #[test]
    fn update_closure_may_touch_the_ref() {
        let r = use_ref(1);
        let rc = r.clone();
        r.update(|v| {
            rc.set(v + 10);
            rc.get() + 1
        });
        assert_eq!(r.get(), 12);
    }

    #[test]
    fn dropped_instances_are_not_counted() {
        let host = Arc::new(RecordingHost::default());
        let r = use_ref(0);
        let kept = instance(&host);
        let dropped = instance(&host);
        r.subscribe(&kept);
        r.subscribe(&dropped);
        assert_eq!(r.subscriber_count(), 2);

        drop(dropped);
        assert_eq!(r.subscriber_count(), 1);

        r.set(1);
        assert_eq!(*host.requests.lock(), vec![Some(0)]);
        assert_eq!(r.subscriber_count(), 1);
    }

    #[test]
    fn clones_share_one_cell() {
        let a = use_ref(String::from("a"));
        let b = a.clone();
        b.set("b".into());
        assert_eq!(a.get(), "b");
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&use_ref(String::from("b"))));
    }
}
