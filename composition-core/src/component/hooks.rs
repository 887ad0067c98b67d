//! Lifecycle hooks.
//!
//! Setup code registers callbacks with the `on_*` functions. Each call
//! appends to a list owned by the current instance; the composition host
//! runs the list after the host's own lifecycle callback for that phase.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use super::element::PropertyValues;
use super::instance::require_current_instance;
use crate::error::CompositionError;

pub type Callback = Arc<dyn Fn() + Send + Sync>;
pub type ChangedCallback = Arc<dyn Fn(&PropertyValues) + Send + Sync>;
pub type ChangedPredicate = Arc<dyn Fn(&PropertyValues) -> bool + Send + Sync>;

/// The lifecycle phases hooks can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Connected,
    Disconnected,
    WillUpdate,
    ShouldUpdate,
    Update,
    FirstUpdated,
    Updated,
    PerformUpdate,
}

impl LifecyclePhase {
    /// Every phase, in the order a first mount runs them.
    pub const ALL: [LifecyclePhase; 8] = [
        LifecyclePhase::Connected,
        LifecyclePhase::WillUpdate,
        LifecyclePhase::ShouldUpdate,
        LifecyclePhase::Update,
        LifecyclePhase::FirstUpdated,
        LifecyclePhase::Updated,
        LifecyclePhase::PerformUpdate,
        LifecyclePhase::Disconnected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::Connected => "connected",
            LifecyclePhase::Disconnected => "disconnected",
            LifecyclePhase::WillUpdate => "will_update",
            LifecyclePhase::ShouldUpdate => "should_update",
            LifecyclePhase::Update => "update",
            LifecyclePhase::FirstUpdated => "first_updated",
            LifecyclePhase::Updated => "updated",
            LifecyclePhase::PerformUpdate => "perform_update",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered callbacks for one phase.
pub struct HookList<F> {
    callbacks: Mutex<SmallVec<[F; 2]>>,
}

impl<F: Clone> HookList<F> {
    fn push(&self, callback: F) {
        self.callbacks.lock().push(callback);
    }

    /// Copy of the list, so no lock is held while callbacks run.
    fn snapshot(&self) -> SmallVec<[F; 2]> {
        self.callbacks.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<F> Default for HookList<F> {
    fn default() -> Self {
        Self {
            callbacks: Mutex::new(SmallVec::new()),
        }
    }
}

/// All hook lists of one instance.
#[derive(Default)]
pub struct Hooks {
    connected: HookList<Callback>,
    disconnected: HookList<Callback>,
    will_update: HookList<ChangedCallback>,
    should_update: HookList<ChangedPredicate>,
    update: HookList<ChangedCallback>,
    first_updated: HookList<ChangedCallback>,
    updated: HookList<ChangedCallback>,
    perform_update: HookList<Callback>,
}

impl Hooks {
    pub fn run_connected(&self) {
        run_all(&self.connected);
    }

    pub fn run_disconnected(&self) {
        run_all(&self.disconnected);
    }

    pub fn run_will_update(&self, changed: &PropertyValues) {
        run_all_with(&self.will_update, changed);
    }

    /// Evaluate every predicate and report whether any of them asked for an
    /// update. All predicates run, even after one returned `true`.
    pub fn run_should_update(&self, changed: &PropertyValues) -> bool {
        let mut any = false;
        for predicate in self.should_update.snapshot() {
            any |= predicate(changed);
        }
        any
    }

    pub fn run_update(&self, changed: &PropertyValues) {
        run_all_with(&self.update, changed);
    }

    pub fn run_first_updated(&self, changed: &PropertyValues) {
        run_all_with(&self.first_updated, changed);
    }

    pub fn run_updated(&self, changed: &PropertyValues) {
        run_all_with(&self.updated, changed);
    }

    pub fn run_perform_update(&self) {
        run_all(&self.perform_update);
    }

    /// Number of hooks registered for a phase.
    pub fn count(&self, phase: LifecyclePhase) -> usize {
        match phase {
            LifecyclePhase::Connected => self.connected.len(),
            LifecyclePhase::Disconnected => self.disconnected.len(),
            LifecyclePhase::WillUpdate => self.will_update.len(),
            LifecyclePhase::ShouldUpdate => self.should_update.len(),
            LifecyclePhase::Update => self.update.len(),
            LifecyclePhase::FirstUpdated => self.first_updated.len(),
            LifecyclePhase::Updated => self.updated.len(),
            LifecyclePhase::PerformUpdate => self.perform_update.len(),
        }
    }

    /// Number of hooks registered across all phases.
    pub fn total(&self) -> usize {
        LifecyclePhase::ALL
            .iter()
            .map(|phase| self.count(*phase))
            .sum()
    }
}

fn run_all(list: &HookList<Callback>) {
    for callback in list.snapshot() {
        callback();
    }
}

fn run_all_with(list: &HookList<ChangedCallback>, changed: &PropertyValues) {
    for callback in list.snapshot() {
        callback(changed);
    }
}

fn register(
    api: &'static str,
    phase: LifecyclePhase,
    add: impl FnOnce(&Hooks),
) -> Result<(), CompositionError> {
    let instance = require_current_instance(api)?;
    add(instance.hooks());
    trace!(instance = %instance.id(), %phase, "hook registered");
    Ok(())
}

/// Run `callback` every time the element is connected.
pub fn on_connected(callback: impl Fn() + Send + Sync + 'static) -> Result<(), CompositionError> {
    register("on_connected", LifecyclePhase::Connected, |hooks| {
        hooks.connected.push(Arc::new(callback))
    })
}

/// Run `callback` every time the element is disconnected.
pub fn on_disconnected(
    callback: impl Fn() + Send + Sync + 'static,
) -> Result<(), CompositionError> {
    register("on_disconnected", LifecyclePhase::Disconnected, |hooks| {
        hooks.disconnected.push(Arc::new(callback))
    })
}

pub fn on_will_update(
    callback: impl Fn(&PropertyValues) + Send + Sync + 'static,
) -> Result<(), CompositionError> {
    register("on_will_update", LifecyclePhase::WillUpdate, |hooks| {
        hooks.will_update.push(Arc::new(callback))
    })
}

/// Register an update predicate. The element updates when its own decision
/// or any registered predicate is `true`.
pub fn on_should_update(
    predicate: impl Fn(&PropertyValues) -> bool + Send + Sync + 'static,
) -> Result<(), CompositionError> {
    register("on_should_update", LifecyclePhase::ShouldUpdate, |hooks| {
        hooks.should_update.push(Arc::new(predicate))
    })
}

pub fn on_update(
    callback: impl Fn(&PropertyValues) + Send + Sync + 'static,
) -> Result<(), CompositionError> {
    register("on_update", LifecyclePhase::Update, |hooks| {
        hooks.update.push(Arc::new(callback))
    })
}

pub fn on_first_updated(
    callback: impl Fn(&PropertyValues) + Send + Sync + 'static,
) -> Result<(), CompositionError> {
    register("on_first_updated", LifecyclePhase::FirstUpdated, |hooks| {
        hooks.first_updated.push(Arc::new(callback))
    })
}

pub fn on_updated(
    callback: impl Fn(&PropertyValues) + Send + Sync + 'static,
) -> Result<(), CompositionError> {
    register("on_updated", LifecyclePhase::Updated, |hooks| {
        hooks.updated.push(Arc::new(callback))
    })
}

pub fn on_perform_update(
    callback: impl Fn() + Send + Sync + 'static,
) -> Result<(), CompositionError> {
    register("on_perform_update", LifecyclePhase::PerformUpdate, |hooks| {
        hooks.perform_update.push(Arc::new(callback))
    })
}
