//! Reactive Primitives
//!
//! This module implements the reactivity engine: refs, computeds, effects,
//! watchers and reactive objects, all connected by one dependency tracker.
//!
//! # Concepts
//!
//! ## Refs
//!
//! A [`Ref`] is a container for mutable state. Reading it inside an effect
//! registers the effect as a dependent; reading it while a component is
//! being set up or rendered subscribes that component. Writing a different
//! value notifies both.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. It re-evaluates
//! when one of its dependencies changes and only notifies its own readers
//! when the result actually differs.
//!
//! ## Effects
//!
//! An effect ([`watch_effect`]) is a side-effecting computation that re-runs
//! whenever its dependencies change. [`watch`] builds on it to hand a
//! callback the new and previous values of a source.
//!
//! ## Reactive objects
//!
//! [`reactive`] turns a [`PlainObject`] holding refs and nested objects into
//! a view that reads and writes through them.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: a thread-local stack records the
//! running effect, and every tracked read registers it under the
//! `(target, key)` it read. Propagation is synchronous and depth-first.

mod computed;
mod context;
mod effect;
mod ids;
mod object;
mod refs;
mod runtime;
mod same_value;
mod watch;

pub use computed::{
    computed, writable_computed, Computed, ComputedGetter, ComputedOptions, ComputedSetter,
};
pub use context::{untrack, ActiveEffect, EffectContext};
pub use effect::{watch_effect, StopHandle};
pub use ids::{EffectId, InstanceId, TargetId};
pub use object::{
    is_reactive, is_ref, reactive, reactive_with, Field, IntoReactive, PlainObject,
    ReactiveObject, ReactiveOptions, ReactiveValue, ValueRef,
};
pub use refs::{use_ref, ReactiveRef, Ref};
pub use runtime::{PropertyKey, Reactive, Runtime, VALUE};
pub use same_value::SameValue;
pub use watch::{getter, watch, Getter, WatchOptions, WatchSource};

/// Record that the running effect read `key` of `target`.
pub fn track(target: TargetId, key: impl Into<PropertyKey>) {
    Runtime::track(target, key);
}

/// Re-run the effects that read `key` of `target`.
pub fn trigger(target: TargetId, key: &str) {
    Runtime::trigger(target, key);
}
