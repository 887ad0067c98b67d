//! Reactive Runtime
//!
//! The runtime is the dependency tracker that connects refs, computeds and
//! effects. It owns three process-wide tables:
//!
//! - the dependency map: `(target, key) -> effects that read it during their
//!   last run`,
//! - the instance subscriber map: `target -> component instances that read it`,
//! - the retention registry that keeps detached effects alive until stopped.
//!
//! # How It Works
//!
//! 1. When a ref is read while an effect is running, [`Runtime::track`]
//!    records the effect under `(ref id, "value")`.
//!
//! 2. When the ref's value changes, [`Runtime::trigger`] snapshots the
//!    effects registered under that key, marks all of them dirty and only
//!    then runs each of them once. Computeds pass the dirty mark on to
//!    their own dependents, so no effect can read a cache that is about to
//!    be recomputed.
//!
//! 3. Before an effect re-runs it clears its registrations, so every run
//!    starts from a fresh dependency set.
//!
//! # Ownership
//!
//! The dependency map only holds weak references to effects. An effect is
//! kept alive by whoever owns it: a computed owns its internal effect, and
//! `watch_effect` parks its runner in the retention registry. Targets are
//! keyed by [`TargetId`] and removed explicitly when their owner is dropped.
//!
//! No lock is held while user code runs, so effects are free to read and
//! write other reactive values during propagation.

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::context::EffectContext;
use super::ids::{EffectId, InstanceId, TargetId};
use crate::component::{Instance, WeakInstance};

/// Property key a dependency is registered under.
pub type PropertyKey = Cow<'static, str>;

/// The key refs and computeds register their own value under.
pub const VALUE: &str = "value";

/// A computation that can be re-run when something it read changes.
pub trait Reactive: Send + Sync {
    /// Get the effect ID for this computation.
    fn effect_id(&self) -> EffectId;

    /// Something this computation read has changed; it is about to be run.
    fn mark_dirty(&self) {}

    /// Re-run the computation.
    fn run(&self);
}

type EffectSet = IndexMap<EffectId, Weak<dyn Reactive>>;

#[derive(Default)]
struct DependencyMap {
    targets: HashMap<TargetId, HashMap<PropertyKey, EffectSet>>,
    /// Reverse index used to drop an effect's registrations before it re-runs.
    registrations: HashMap<EffectId, SmallVec<[(TargetId, PropertyKey); 4]>>,
}

type SubscriberMap = HashMap<TargetId, IndexMap<InstanceId, WeakInstance>>;

static DEPENDENCIES: OnceLock<Mutex<DependencyMap>> = OnceLock::new();
static SUBSCRIBERS: OnceLock<Mutex<SubscriberMap>> = OnceLock::new();
static RETAINED: OnceLock<Mutex<HashMap<EffectId, Arc<dyn Reactive>>>> = OnceLock::new();

fn dependencies() -> &'static Mutex<DependencyMap> {
    DEPENDENCIES.get_or_init(|| Mutex::new(DependencyMap::default()))
}

fn subscribers() -> &'static Mutex<SubscriberMap> {
    SUBSCRIBERS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn retained() -> &'static Mutex<HashMap<EffectId, Arc<dyn Reactive>>> {
    RETAINED.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The global reactive runtime.
pub struct Runtime;

impl Runtime {
    /// Record that the running effect read `(target, key)`.
    ///
    /// No-op when no effect is running (or reads are untracked).
    pub fn track(target: TargetId, key: impl Into<PropertyKey>) {
        let Some(active) = EffectContext::current() else {
            return;
        };
        let key = key.into();

        let mut guard = dependencies().lock();
        let deps = &mut *guard;
        let previous = deps
            .targets
            .entry(target)
            .or_default()
            .entry(key.clone())
            .or_default()
            .insert(active.id, active.effect);

        if previous.is_none() {
            deps.registrations
                .entry(active.id)
                .or_default()
                .push((target, key));
        }
    }

    fn snapshot(target: TargetId, key: &str) -> Vec<Arc<dyn Reactive>> {
        let mut deps = dependencies().lock();
        let Some(set) = deps
            .targets
            .get_mut(&target)
            .and_then(|keys| keys.get_mut(key))
        else {
            return Vec::new();
        };
        set.retain(|_, effect| effect.strong_count() > 0);
        set.values().filter_map(Weak::upgrade).collect()
    }

    /// Re-run every effect registered under `(target, key)`.
    ///
    /// The effect set is snapshotted before anything runs, so effects that
    /// re-register (or drop) themselves while running are invoked exactly
    /// once per trigger. Every effect in the snapshot is marked dirty
    /// before the first one runs.
    pub fn trigger(target: TargetId, key: &str) {
        let effects = Self::snapshot(target, key);
        if effects.is_empty() {
            return;
        }

        trace!(%target, key, effects = effects.len(), "trigger");
        for effect in &effects {
            effect.mark_dirty();
        }
        for effect in effects {
            effect.run();
        }
    }

    /// Mark every effect registered under `(target, key)` dirty without
    /// running any of them.
    pub fn mark_dependents_dirty(target: TargetId, key: &str) {
        for effect in Self::snapshot(target, key) {
            effect.mark_dirty();
        }
    }

    /// Remove every registration of an effect.
    ///
    /// Called before re-running a computation to clear stale dependencies,
    /// and when an effect is stopped or dropped.
    pub fn clear_dependencies(effect_id: EffectId) {
        let mut guard = dependencies().lock();
        let deps = &mut *guard;
        let Some(registrations) = deps.registrations.remove(&effect_id) else {
            return;
        };

        for (target, key) in registrations {
            let target_empty = match deps.targets.get_mut(&target) {
                Some(keys) => {
                    let key_empty = match keys.get_mut(&key) {
                        Some(set) => {
                            set.shift_remove(&effect_id);
                            set.is_empty()
                        }
                        None => false,
                    };
                    if key_empty {
                        keys.remove(&key);
                    }
                    keys.is_empty()
                }
                None => false,
            };
            if target_empty {
                deps.targets.remove(&target);
            }
        }
    }

    /// Drop everything registered against a target.
    ///
    /// Called when a ref, computed or plain object is dropped.
    pub fn forget_target(target: TargetId) {
        dependencies().lock().targets.remove(&target);
        subscribers().lock().remove(&target);
    }

    /// Number of live effects registered under `(target, key)`.
    pub fn dependent_count(target: TargetId, key: &str) -> usize {
        dependencies()
            .lock()
            .targets
            .get(&target)
            .and_then(|keys| keys.get(key))
            .map(|set| set.values().filter(|e| e.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Register a component instance to receive update requests when the
    /// target changes.
    pub fn subscribe_instance(target: TargetId, instance: &Instance) {
        subscribers()
            .lock()
            .entry(target)
            .or_default()
            .entry(instance.id())
            .or_insert_with(|| instance.downgrade());
    }

    /// Ask every instance subscribed to `target` for an update.
    ///
    /// Follows the host convention of passing no property name and the
    /// previous value.
    pub fn notify_instances(target: TargetId, old_value: &dyn Any) {
        let instances: Vec<Instance> = {
            let mut subs = subscribers().lock();
            let Some(set) = subs.get_mut(&target) else {
                return;
            };
            set.retain(|_, instance| instance.is_alive());
            let live = set.values().filter_map(WeakInstance::upgrade).collect();
            if set.is_empty() {
                subs.remove(&target);
            }
            live
        };

        for instance in instances {
            instance.request_update(None, old_value);
        }
    }

    /// Number of live instances subscribed to a target.
    pub fn subscriber_count(target: TargetId) -> usize {
        subscribers()
            .lock()
            .get(&target)
            .map(|set| set.values().filter(|i| i.is_alive()).count())
            .unwrap_or(0)
    }

    /// Remove an instance from every subscriber set.
    pub fn release_instance(instance_id: InstanceId) {
        let mut subs = subscribers().lock();
        let mut released = 0usize;
        for set in subs.values_mut() {
            if set.shift_remove(&instance_id).is_some() {
                released += 1;
            }
        }
        subs.retain(|_, set| !set.is_empty());
        debug!(%instance_id, targets = released, "released instance subscriptions");
    }

    /// Keep an effect alive until [`Runtime::release`] is called.
    pub fn retain(effect: Arc<dyn Reactive>) {
        retained().lock().insert(effect.effect_id(), effect);
    }

    /// Stop keeping an effect alive. Returns whether it was retained.
    pub fn release(effect_id: EffectId) -> bool {
        retained().lock().remove(&effect_id).is_some()
    }

    /// Check whether an effect is held by the retention registry.
    pub fn is_retained(effect_id: EffectId) -> bool {
        retained().lock().contains_key(&effect_id)
    }

    /// Check if reads are currently being tracked.
    pub fn is_tracking() -> bool {
        EffectContext::is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    struct MockReactive {
        id: EffectId,
        runs: AtomicI32,
        log: Option<Arc<Mutex<Vec<(EffectId, &'static str)>>>>,
    }

    impl MockReactive {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: EffectId::new(),
                runs: AtomicI32::new(0),
                log: None,
            })
        }

        fn logging(log: &Arc<Mutex<Vec<(EffectId, &'static str)>>>) -> Arc<Self> {
            Arc::new(Self {
                id: EffectId::new(),
                runs: AtomicI32::new(0),
                log: Some(log.clone()),
            })
        }

        fn record(&self, event: &'static str) {
            if let Some(log) = &self.log {
                log.lock().push((self.id, event));
            }
        }
    }

    impl Reactive for MockReactive {
        fn effect_id(&self) -> EffectId {
            self.id
        }

        fn mark_dirty(&self) {
            self.record("dirty");
        }

        fn run(&self) {
            self.record("run");
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn track_as(effect: &Arc<MockReactive>, target: TargetId, key: &'static str) {
        let as_dyn: Arc<dyn Reactive> = effect.clone();
        let _ctx = EffectContext::enter(effect.id, Arc::downgrade(&as_dyn));
        Runtime::track(target, key);
    }

    #[test]
    fn track_without_effect_is_noop() {
        let target = TargetId::new();
        Runtime::track(target, VALUE);
        assert_eq!(Runtime::dependent_count(target, VALUE), 0);
    }

    #[test]
    fn runtime_triggers_registered_effects() {
        let target = TargetId::new();
        let first = MockReactive::new();
        let second = MockReactive::new();

        track_as(&first, target, VALUE);
        track_as(&second, target, VALUE);
        assert_eq!(Runtime::dependent_count(target, VALUE), 2);

        Runtime::trigger(target, VALUE);

        assert_eq!(first.runs.load(Ordering::SeqCst), 1);
        assert_eq!(second.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trigger_marks_every_effect_before_running_any() {
        let target = TargetId::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = MockReactive::logging(&log);
        let second = MockReactive::logging(&log);

        track_as(&first, target, VALUE);
        track_as(&second, target, VALUE);
        Runtime::trigger(target, VALUE);

        assert_eq!(
            *log.lock(),
            vec![
                (first.id, "dirty"),
                (second.id, "dirty"),
                (first.id, "run"),
                (second.id, "run"),
            ]
        );

        log.lock().clear();
        Runtime::mark_dependents_dirty(target, VALUE);
        assert_eq!(*log.lock(), vec![(first.id, "dirty"), (second.id, "dirty")]);
        assert_eq!(first.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn duplicate_tracking_registers_once() {
        let target = TargetId::new();
        let effect = MockReactive::new();

        track_as(&effect, target, VALUE);
        track_as(&effect, target, VALUE);

        Runtime::trigger(target, VALUE);
        assert_eq!(effect.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn trigger_only_runs_matching_key() {
        let target = TargetId::new();
        let effect = MockReactive::new();

        track_as(&effect, target, "count");

        Runtime::trigger(target, "label");
        assert_eq!(effect.runs.load(Ordering::SeqCst), 0);

        Runtime::trigger(target, "count");
        assert_eq!(effect.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn runtime_clears_dependencies() {
        let target = TargetId::new();
        let effect = MockReactive::new();

        track_as(&effect, target, VALUE);
        assert_eq!(Runtime::dependent_count(target, VALUE), 1);

        Runtime::clear_dependencies(effect.id);
        assert_eq!(Runtime::dependent_count(target, VALUE), 0);

        Runtime::trigger(target, VALUE);
        assert_eq!(effect.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropped_effects_are_skipped() {
        let target = TargetId::new();
        let effect = MockReactive::new();
        track_as(&effect, target, VALUE);

        drop(effect);
        assert_eq!(Runtime::dependent_count(target, VALUE), 0);

        // Must not panic or run anything.
        Runtime::trigger(target, VALUE);
    }

    #[test]
    fn forget_target_drops_registrations() {
        let target = TargetId::new();
        let effect = MockReactive::new();
        track_as(&effect, target, VALUE);

        Runtime::forget_target(target);
        Runtime::trigger(target, VALUE);

        assert_eq!(effect.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn retention_registry_round_trip() {
        let effect = MockReactive::new();
        let id = effect.id;

        Runtime::retain(effect);
        assert!(Runtime::is_retained(id));

        assert!(Runtime::release(id));
        assert!(!Runtime::is_retained(id));
        assert!(!Runtime::release(id));
    }
}
