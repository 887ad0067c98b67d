//! Composition host.
//!
//! This module connects the reactive core to a host component:
//!
//! - [`Instance`] and the current-instance slot that setup code and render
//!   functions run under,
//! - the `on_*` hook registration functions,
//! - [`Composed`], which wraps a [`ReactiveElement`] and runs setup, render
//!   and the registered hooks around the element's own lifecycle,
//! - [`provide`] and [`inject`] for passing values down the component tree.

mod element;
mod hooks;
mod host;
mod instance;
mod provide;

pub use element::{PropertyValues, ReactiveElement, UpdateHost};
pub use hooks::{
    on_connected, on_disconnected, on_first_updated, on_perform_update, on_should_update,
    on_update, on_updated, on_will_update, Callback, ChangedCallback, ChangedPredicate, HookList,
    Hooks, LifecyclePhase,
};
pub use host::{render_fn, Composed, ElementOptions, PropertyDeclaration, RenderFn};
pub use instance::{
    current_instance, require_current_instance, with_current_instance, Instance, WeakInstance,
};
pub use provide::{create_context, inject, provide, ContextConsumer, ContextKey};
