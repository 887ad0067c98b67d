//! Watch: run a callback when a source changes.
//!
//! A watcher is an effect that reads its source, compares the result with
//! the previous snapshot and calls the callback with `(new, old)` when they
//! differ. Sources are refs, computeds, getters and ordered lists of those.
//! A list changes when its length or any position differs.
//!
//! The callback runs untracked: what it reads does not become a dependency
//! of the watcher.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::computed::Computed;
use super::context::untrack;
use super::effect::{watch_effect, StopHandle};
use super::refs::Ref;
use super::same_value::SameValue;

/// Something a watcher can read.
pub trait WatchSource: Send + Sync + 'static {
    type Value: Clone + SameValue + Send + Sync + 'static;

    /// Tracked read of the current value.
    fn read(&self) -> Self::Value;
}

impl<T> WatchSource for Ref<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    type Value = T;

    fn read(&self) -> T {
        self.get()
    }
}

impl<T> WatchSource for Computed<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    type Value = T;

    fn read(&self) -> T {
        self.get()
    }
}

/// A zero-argument function used as a watch source.
pub struct Getter<F>(F);

/// Wrap a closure so it can be watched.
pub fn getter<F, T>(f: F) -> Getter<F>
where
    F: Fn() -> T + Send + Sync + 'static,
{
    Getter(f)
}

impl<F, T> WatchSource for Getter<F>
where
    F: Fn() -> T + Send + Sync + 'static,
    T: Clone + SameValue + Send + Sync + 'static,
{
    type Value = T;

    fn read(&self) -> T {
        (self.0)()
    }
}

impl<S: WatchSource> WatchSource for Vec<S> {
    type Value = Vec<S::Value>;

    fn read(&self) -> Self::Value {
        self.iter().map(WatchSource::read).collect()
    }
}

impl<A: WatchSource, B: WatchSource> WatchSource for (A, B) {
    type Value = (A::Value, B::Value);

    fn read(&self) -> Self::Value {
        (self.0.read(), self.1.read())
    }
}

impl<A: WatchSource, B: WatchSource, C: WatchSource> WatchSource for (A, B, C) {
    type Value = (A::Value, B::Value, C::Value);

    fn read(&self) -> Self::Value {
        (self.0.read(), self.1.read(), self.2.read())
    }
}

impl<V> WatchSource for Arc<dyn WatchSource<Value = V>>
where
    V: Clone + SameValue + Send + Sync + 'static,
{
    type Value = V;

    fn read(&self) -> V {
        (**self).read()
    }
}

/// Watcher configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Call the callback once at registration with `(current, None)`.
    pub immediate: bool,
}

impl WatchOptions {
    pub fn immediate() -> Self {
        Self { immediate: true }
    }
}

struct Snapshot<V> {
    previous: Option<V>,
    initialized: bool,
}

/// Watch `source` and call `callback(new, old)` whenever it changes.
///
/// `old` is `None` only for the immediate call. Both arguments are owned
/// snapshots, so a callback can keep them without seeing later changes.
///
/// ```rust,ignore
/// let a = use_ref(1);
/// let b = use_ref("x");
/// let handle = watch((a.clone(), b.clone()), |new, old| {
///     println!("{new:?} <- {old:?}");
/// }, WatchOptions::default());
/// ```
pub fn watch<S, F>(source: S, callback: F, options: WatchOptions) -> StopHandle
where
    S: WatchSource,
    F: Fn(&S::Value, Option<&S::Value>) + Send + Sync + 'static,
{
    let snapshot = Mutex::new(Snapshot::<S::Value> {
        previous: None,
        initialized: false,
    });

    watch_effect(move || {
        let next = source.read();

        let previous = {
            let mut snapshot = snapshot.lock();
            if !snapshot.initialized {
                snapshot.initialized = true;
                snapshot.previous = Some(next.clone());
                drop(snapshot);
                if options.immediate {
                    untrack(|| callback(&next, None));
                }
                return;
            }

            let unchanged = snapshot
                .previous
                .as_ref()
                .is_some_and(|previous| previous.same_value(&next));
            if unchanged {
                return;
            }
            snapshot.previous.replace(next.clone())
        };

        untrack(|| callback(&next, previous.as_ref()));
    })
}
