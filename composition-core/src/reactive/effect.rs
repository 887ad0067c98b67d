//! Effect Runner
//!
//! An effect is a function that runs immediately and re-runs whenever a
//! reactive value it read during its last run changes.
//!
//! # How Effects Work
//!
//! 1. On creation the effect runs its function inside an effect context, so
//!    every tracked read registers the effect with the runtime.
//!
//! 2. When one of those values changes, the runtime triggers the effect and
//!    it re-runs in full.
//!
//! 3. Before each run the previous registrations are cleared, so a value the
//!    function stopped reading no longer triggers it.
//!
//! Propagation is synchronous and depth-first: a write returns only after
//! every effect it triggered (and everything those triggered) has run.
//!
//! # Re-entrancy
//!
//! An effect that writes a value it also reads triggers itself from inside
//! its own run. Nothing guards against this; if the write never settles on
//! the same value, the recursion does not terminate.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, trace};

use super::context::EffectContext;
use super::ids::EffectId;
use super::runtime::{Reactive, Runtime};

type EffectFn = Box<dyn Fn() + Send + Sync>;

/// The shared state of one effect.
pub(crate) struct EffectCore {
    id: EffectId,
    run: EffectFn,
    /// Replaces `execute` when the runtime triggers the effect.
    scheduler: Option<EffectFn>,
    /// Called for every effect of a trigger before any of them runs.
    on_dirty: Option<EffectFn>,
    this: Weak<EffectCore>,
    stopped: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectCore {
    /// Create an effect without running it.
    pub(crate) fn new<F>(run: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new_cyclic(|this| Self {
            id: EffectId::new(),
            run: Box::new(run),
            scheduler: None,
            on_dirty: None,
            this: this.clone(),
            stopped: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        })
    }

    /// Create an effect whose triggered runs go through `scheduler`, and
    /// which is told through `on_dirty` as soon as a trigger reaches it.
    pub(crate) fn with_scheduler<F, S, D>(run: F, scheduler: S, on_dirty: D) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
        S: Fn() + Send + Sync + 'static,
        D: Fn() + Send + Sync + 'static,
    {
        Arc::new_cyclic(|this| Self {
            id: EffectId::new(),
            run: Box::new(run),
            scheduler: Some(Box::new(scheduler)),
            on_dirty: Some(Box::new(on_dirty)),
            this: this.clone(),
            stopped: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        })
    }

    pub(crate) fn id(&self) -> EffectId {
        self.id
    }

    /// Execute the effect function, collecting a fresh dependency set.
    pub(crate) fn execute(&self) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        Runtime::clear_dependencies(self.id);

        let this: Weak<dyn Reactive> = self.this.clone();
        let _ctx = EffectContext::enter(self.id, this);

        trace!(effect = %self.id, "run");
        (self.run)();

        self.run_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            Runtime::clear_dependencies(self.id);
            Runtime::release(self.id);
            debug!(effect = %self.id, "stopped");
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn run_count(&self) -> usize {
        self.run_count.load(Ordering::SeqCst)
    }
}

impl Reactive for EffectCore {
    fn effect_id(&self) -> EffectId {
        self.id
    }

    fn mark_dirty(&self) {
        if let Some(on_dirty) = &self.on_dirty {
            on_dirty();
        }
    }

    fn run(&self) {
        match &self.scheduler {
            Some(scheduler) => scheduler(),
            None => self.execute(),
        }
    }
}

impl Drop for EffectCore {
    fn drop(&mut self) {
        Runtime::clear_dependencies(self.id);
    }
}

/// Handle returned by [`watch_effect`] and [`watch`](super::watch).
///
/// Dropping the handle does not stop the effect; call [`StopHandle::stop`].
#[derive(Clone)]
pub struct StopHandle {
    core: Arc<EffectCore>,
}

impl StopHandle {
    /// Stop the effect: it is unregistered from everything it read and will
    /// not run again. Stopping twice is a no-op.
    pub fn stop(&self) {
        self.core.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.core.is_stopped()
    }

    /// Number of times the effect has run, including the initial run.
    pub fn run_count(&self) -> usize {
        self.core.run_count()
    }

    pub fn id(&self) -> EffectId {
        self.core.id()
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("id", &self.core.id)
            .field("run_count", &self.run_count())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Run `f` now and again whenever a reactive value it read changes.
///
/// ```rust,ignore
/// let count = use_ref(0);
///
/// let c = count.clone();
/// let handle = watch_effect(move || println!("count is {}", c.get()));
///
/// count.set(5); // prints "count is 5"
/// handle.stop();
/// ```
pub fn watch_effect<F>(f: F) -> StopHandle
where
    F: Fn() + Send + Sync + 'static,
{
    let core = EffectCore::new(f);
    Runtime::retain(core.clone());
    core.execute();
    StopHandle { core }
}
