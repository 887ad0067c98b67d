//! Provide / inject.
//!
//! A component provides a value for a [`ContextKey`] during setup; any
//! component nested below it can inject the key and read the nearest
//! provided value. Provided values are refs, so a consumer that reads one
//! while rendering re-renders when the provider updates it.
//!
//! The parent chain is taken from [`ReactiveElement::parent_instance`]
//! when a component is connected, and is resolved lazily on every read.
//!
//! [`ReactiveElement::parent_instance`]: super::ReactiveElement::parent_instance

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::trace;

use super::instance::{require_current_instance, WeakInstance};
use crate::error::CompositionError;
use crate::reactive::{Ref, SameValue};

/// Identifies one context value and its type.
pub struct ContextKey<T> {
    id: u64,
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> PartialEq for ContextKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ContextKey<T> {}

impl<T> fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextKey")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Create a new, distinct context key.
pub fn create_context<T>(name: &'static str) -> ContextKey<T> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    ContextKey {
        id: COUNTER.fetch_add(1, Ordering::Relaxed),
        name,
        _marker: PhantomData,
    }
}

/// Provide a value to every component below the current one.
///
/// Returns the ref holding the value so the provider can update it.
pub fn provide<T>(key: &ContextKey<T>, initial: T) -> Result<Ref<T>, CompositionError>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    let instance = require_current_instance("provide")?;
    let value = Ref::new(initial);
    instance.provide_value(key.id, Arc::new(value.clone()));
    trace!(instance = %instance.id(), context = key.name, "context provided");
    Ok(value)
}

/// Consume a context value provided by an ancestor.
pub fn inject<T>(key: &ContextKey<T>) -> Result<ContextConsumer<T>, CompositionError>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    let instance = require_current_instance("inject")?;
    Ok(ContextConsumer {
        instance: instance.downgrade(),
        key: *key,
    })
}

/// Handle returned by [`inject`].
pub struct ContextConsumer<T> {
    instance: WeakInstance,
    key: ContextKey<T>,
}

impl<T> Clone for ContextConsumer<T> {
    fn clone(&self) -> Self {
        Self {
            instance: self.instance.clone(),
            key: self.key,
        }
    }
}

impl<T> ContextConsumer<T>
where
    T: Clone + SameValue + Send + Sync + 'static,
{
    /// The ref of the nearest ancestor that provides this key.
    pub fn provider(&self) -> Option<Ref<T>> {
        let mut next = self.instance.upgrade()?.parent();
        while let Some(instance) = next {
            if let Some(value) = instance.provided_value(self.key.id) {
                if let Some(found) = value.downcast_ref::<Ref<T>>() {
                    return Some(found.clone());
                }
            }
            next = instance.parent();
        }
        None
    }

    /// Tracked read of the provided value; `None` when no ancestor
    /// provides it.
    pub fn get(&self) -> Option<T> {
        self.provider().map(|value| value.get())
    }
}

impl<T> fmt::Debug for ContextConsumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextConsumer")
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{with_current_instance, Instance, UpdateHost};
    use std::any::Any;

    struct NullHost;

    impl UpdateHost for NullHost {
        fn request_update(&self, _property: Option<&str>, _old_value: &dyn Any) {}
    }

    fn instance(host: &Arc<dyn UpdateHost>) -> Instance {
        Instance::new(Arc::downgrade(host))
    }

    #[test]
    fn provide_and_inject_require_setup() {
        let key = create_context::<i32>("theme");
        assert_eq!(
            provide(&key, 1).unwrap_err(),
            CompositionError::NoCurrentInstance { api: "provide" }
        );
        assert_eq!(
            inject(&key).unwrap_err(),
            CompositionError::NoCurrentInstance { api: "inject" }
        );
    }

    #[test]
    fn nearest_ancestor_wins() {
        let host: Arc<dyn UpdateHost> = Arc::new(NullHost);
        let root = instance(&host);
        let middle = instance(&host);
        let leaf = instance(&host);
        middle.set_parent(Some(&root));
        leaf.set_parent(Some(&middle));

        let key = create_context::<String>("theme");
        with_current_instance(&root, || provide(&key, "light".to_string())).unwrap();
        let middle_value =
            with_current_instance(&middle, || provide(&key, "dark".to_string())).unwrap();

        let consumer = with_current_instance(&leaf, || inject(&key)).unwrap();
        assert_eq!(consumer.get().as_deref(), Some("dark"));

        middle_value.set("dim".to_string());
        assert_eq!(consumer.get().as_deref(), Some("dim"));
    }

    #[test]
    fn own_value_is_not_visible() {
        let host: Arc<dyn UpdateHost> = Arc::new(NullHost);
        let only = instance(&host);
        let key = create_context::<i32>("depth");

        let consumer = with_current_instance(&only, || {
            provide(&key, 1)?;
            inject(&key)
        })
        .unwrap();
        assert_eq!(consumer.get(), None);
    }

    #[test]
    fn keys_are_distinct_even_with_equal_names() {
        let host: Arc<dyn UpdateHost> = Arc::new(NullHost);
        let parent = instance(&host);
        let child = instance(&host);
        child.set_parent(Some(&parent));

        let first = create_context::<i32>("n");
        let second = create_context::<i32>("n");
        assert_ne!(first, second);

        with_current_instance(&parent, || provide(&first, 1)).unwrap();
        let consumer = with_current_instance(&child, || inject(&second)).unwrap();
        assert_eq!(consumer.get(), None);
    }
}
