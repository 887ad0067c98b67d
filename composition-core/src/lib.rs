//! Composition Core
//!
//! This crate provides fine-grained reactivity and a hook-based composition
//! model for component classes that live outside of it. It implements:
//!
//! - Reactive primitives (refs, computeds, effects, watchers)
//! - Reactive views over plain objects
//! - The current-instance context that lets free functions attach hooks to
//!   the component being set up
//! - A composition host that runs setup, render and lifecycle hooks around
//!   a host element
//!
//! # Architecture
//!
//! - `reactive`: dependency tracking and the reactive primitives
//! - `component`: instance context, hooks, composition host, provide/inject
//! - `error`: error types shared by both
//!
//! # Example
//!
//! ```rust,ignore
//! use composition_core::prelude::*;
//!
//! // Create a ref
//! let count = use_ref(0);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = computed(move || c.get() * 2);
//!
//! // Create an effect
//! let (c, d) = (count.clone(), doubled.clone());
//! watch_effect(move || {
//!     println!("Count: {}, Doubled: {}", c.get(), d.get());
//! });
//!
//! // Update the ref
//! count.set(5);
//! // Effect runs before `set` returns, prints: "Count: 5, Doubled: 10"
//! ```
//!
//! Components get the same primitives inside setup:
//!
//! ```rust,ignore
//! let options = ElementOptions::new().setup(|_element| {
//!     let clicks = use_ref(0);
//!     on_connected(|| tracing::info!("mounted"))?;
//!     Ok(Some(render_fn(move |_: &Button| format!("clicked {} times", clicks.get()))))
//! });
//! let button = Composed::new(Arc::new(Button::default()), options)?;
//! ```

pub mod component;
pub mod error;
pub mod prelude;
pub mod reactive;

pub use component::{
    create_context, current_instance, inject, on_connected, on_disconnected, on_first_updated,
    on_perform_update, on_should_update, on_update, on_updated, on_will_update, provide,
    with_current_instance, Composed, ElementOptions, Instance, PropertyDeclaration,
    PropertyValues, ReactiveElement, UpdateHost,
};
pub use error::{CompositionError, ReactiveError};
pub use reactive::{
    computed, is_reactive, is_ref, reactive, track, trigger, use_ref, watch, watch_effect,
    writable_computed, Computed, PlainObject, ReactiveObject, Ref, StopHandle, WatchOptions,
};
