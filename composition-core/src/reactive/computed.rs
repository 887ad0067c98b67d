//! Computed: a derived, cached reactive value.
//!
//! A computed owns an internal effect that runs its getter. The first run
//! only fills the cache. Later runs compare the new value with the cache
//! and, when it differs, notify the subscribed instances and trigger the
//! computed's own `value` key, so computeds chained on it re-run in turn.
//!
//! A dependency change first marks the computed (and everything downstream
//! of it) dirty. A dirty computed re-evaluates on the next read, or when
//! its internal effect is reached, whichever comes first; the other one
//! finds the cache clean and does nothing. Each computed therefore
//! evaluates once per change, and a reader never sees an old cache.
//!
//! # Chains
//!
//! ```rust,ignore
//! let base = use_ref(1);
//! let b = base.clone();
//! let double = computed(move || b.get() * 2);
//! let d = double.clone();
//! let quad = computed(move || d.get() * 2);
//!
//! base.set(2);
//! assert_eq!(quad.get(), 8);
//! ```
//!
//! Propagation is synchronous, so by the time `base.set` returns every
//! computed downstream of it already holds its new value.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::context::untrack;
use super::effect::EffectCore;
use super::ids::TargetId;
use super::refs::ReactiveRef;
use super::runtime::{Runtime, VALUE};
use super::same_value::SameValue;
use crate::component::{current_instance, Instance};
use crate::error::ReactiveError;

pub type ComputedGetter<T> = Arc<dyn Fn() -> T + Send + Sync>;
pub type ComputedSetter<T> = Arc<dyn Fn(T) + Send + Sync>;

/// The object form of a computed: a getter and an optional setter.
pub struct ComputedOptions<T> {
    pub get: ComputedGetter<T>,
    pub set: Option<ComputedSetter<T>>,
}

impl<T> ComputedOptions<T> {
    pub fn new(get: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            get: Arc::new(get),
            set: None,
        }
    }

    pub fn with_setter(mut self, set: impl Fn(T) + Send + Sync + 'static) -> Self {
        self.set = Some(Arc::new(set));
        self
    }
}

struct ComputedState<T> {
    cached: Option<T>,
    /// Set while the cache cannot be trusted: before the first evaluation,
    /// after a dependency changed, and after a getter that did not return.
    dirty: bool,
    /// Cleared until the first evaluation, which never notifies.
    initialized: bool,
}

struct ComputedCore<T> {
    id: TargetId,
    state: Mutex<ComputedState<T>>,
    getter: ComputedGetter<T>,
    setter: Option<ComputedSetter<T>>,
    effect: Arc<EffectCore>,
}

impl<T> ComputedCore<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    /// Body of the internal effect.
    fn refresh(&self) {
        self.state.lock().dirty = true;
        let next = (self.getter)();

        let old = {
            let mut state = self.state.lock();
            state.dirty = false;

            if !state.initialized {
                state.initialized = true;
                state.cached = Some(next);
                return;
            }

            let unchanged = state
                .cached
                .as_ref()
                .is_some_and(|current| current.same_value(&next));
            let old = state.cached.replace(next);
            if unchanged {
                return;
            }
            old
        };

        trace!(target = %self.id, "computed changed");
        untrack(|| {
            let old: &dyn Any = match &old {
                Some(value) => value,
                None => &(),
            };
            Runtime::notify_instances(self.id, old);
            Runtime::trigger(self.id, VALUE);
        });
    }

    /// A dependency changed. Marks the cache stale and passes the mark on
    /// to whatever reads this computed.
    fn invalidate(&self) {
        let was_dirty = std::mem::replace(&mut self.state.lock().dirty, true);
        if !was_dirty {
            Runtime::mark_dependents_dirty(self.id, VALUE);
        }
    }

    /// Triggered run: skipped when a reader already brought the cache up
    /// to date.
    fn run_if_dirty(&self) {
        let dirty = self.state.lock().dirty;
        if dirty {
            self.effect.execute();
        }
    }

    fn current(&self) -> T {
        {
            let state = self.state.lock();
            if !state.dirty {
                if let Some(value) = &state.cached {
                    return value.clone();
                }
            }
        }

        // Stale cache: evaluate now instead of waiting for a trigger.
        self.effect.execute();
        let state = self.state.lock();
        match &state.cached {
            Some(value) => value.clone(),
            None => (self.getter)(),
        }
    }
}

impl<T> Drop for ComputedCore<T> {
    fn drop(&mut self) {
        Runtime::forget_target(self.id);
    }
}

/// A derived reactive value. Clones share the same cache.
pub struct Computed<T> {
    core: Arc<ComputedCore<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T> Computed<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    pub fn from_options(options: ComputedOptions<T>) -> Self {
        let core = Arc::new_cyclic(|this: &Weak<ComputedCore<T>>| {
            let (run, schedule, dirty) = (this.clone(), this.clone(), this.clone());
            let effect = EffectCore::with_scheduler(
                move || {
                    if let Some(core) = run.upgrade() {
                        core.refresh();
                    }
                },
                move || {
                    if let Some(core) = schedule.upgrade() {
                        core.run_if_dirty();
                    }
                },
                move || {
                    if let Some(core) = dirty.upgrade() {
                        core.invalidate();
                    }
                },
            );
            ComputedCore {
                id: TargetId::new(),
                state: Mutex::new(ComputedState {
                    cached: None,
                    dirty: true,
                    initialized: false,
                }),
                getter: options.get,
                setter: options.set,
                effect,
            }
        });

        core.effect.execute();
        Self { core }
    }

    /// Tracked read. Subscribes the current instance and recomputes first if
    /// the cache is stale.
    ///
    /// The recomputation happens before the reader is registered, so the
    /// change it may announce does not re-enter the running reader.
    pub fn get(&self) -> T {
        let value = self.core.current();
        Runtime::track(self.core.id, VALUE);
        if let Some(instance) = current_instance() {
            Runtime::subscribe_instance(self.core.id, &instance);
        }
        value
    }

    pub fn get_untracked(&self) -> T {
        self.core.current()
    }

    /// Pass `value` to the setter.
    ///
    /// The write itself notifies nobody; any change is picked up by the
    /// internal effect once the setter has updated the computed's inputs.
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        match &self.core.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => Err(ReactiveError::ComputedReadOnly),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.core.setter.is_some()
    }

    pub fn subscribe(&self, instance: &Instance) {
        Runtime::subscribe_instance(self.core.id, instance);
    }

    pub fn id(&self) -> TargetId {
        self.core.id
    }

    pub fn subscriber_count(&self) -> usize {
        Runtime::subscriber_count(self.core.id)
    }

    /// Number of times the getter has been evaluated.
    pub fn evaluations(&self) -> usize {
        self.core.effect.run_count()
    }

    pub fn ptr_eq(&self, other: &Computed<T>) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl<T> ReactiveRef<T> for Computed<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    fn get(&self) -> T {
        Computed::get(self)
    }

    fn set(&self, value: T) -> Result<(), ReactiveError> {
        Computed::set(self, value)
    }

    fn target_id(&self) -> TargetId {
        self.core.id
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.lock();
        f.debug_struct("Computed")
            .field("id", &self.core.id)
            .field("cached", &state.cached)
            .field("dirty", &state.dirty)
            .field("writable", &self.core.setter.is_some())
            .finish()
    }
}

/// Create a read-only computed from a getter.
pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::from_options(ComputedOptions::new(getter))
}

/// Create a computed that forwards writes to `set`.
pub fn writable_computed<T, G, S>(get: G, set: S) -> Computed<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
    G: Fn() -> T + Send + Sync + 'static,
    S: Fn(T) + Send + Sync + 'static,
{
    Computed::from_options(ComputedOptions::new(get).with_setter(set))
}
