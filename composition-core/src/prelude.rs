//! Glob-importable public surface.

pub use crate::component::{
    create_context, current_instance, inject, on_connected, on_disconnected, on_first_updated,
    on_perform_update, on_should_update, on_update, on_updated, on_will_update, provide,
    render_fn, with_current_instance, Composed, ContextConsumer, ContextKey, ElementOptions,
    Instance, PropertyDeclaration, PropertyValues, ReactiveElement, RenderFn, UpdateHost,
};
pub use crate::error::{CompositionError, ReactiveError};
pub use crate::reactive::{
    computed, getter, is_reactive, is_ref, reactive, reactive_with, untrack, use_ref, watch,
    watch_effect, writable_computed, Computed, Field, PlainObject, ReactiveObject,
    ReactiveOptions, ReactiveRef, ReactiveValue, Ref, SameValue, StopHandle, WatchOptions,
    WatchSource,
};
