//! Instance Context
//!
//! An [`Instance`] is the type-erased handle the reactive core keeps for one
//! component instance: enough to request an update from the host, to hold
//! the hooks registered during setup, and to store provided context values.
//!
//! The "current instance" is a thread-local single slot. It is only ever
//! changed through [`with_current_instance`], which saves the previous value
//! and restores it when the scope ends, including on panic. That makes
//! nested construction and render calls safe.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::element::UpdateHost;
use super::hooks::Hooks;
use crate::error::CompositionError;
use crate::reactive::InstanceId;

thread_local! {
    static CURRENT_INSTANCE: RefCell<Option<Instance>> = const { RefCell::new(None) };
}

/// Handle to a component instance.
///
/// Cloning is cheap; all clones refer to the same instance.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

struct InstanceInner {
    id: InstanceId,
    host: Weak<dyn UpdateHost>,
    hooks: Hooks,
    provided: Mutex<HashMap<u64, Arc<dyn Any + Send + Sync>>>,
    parent: Mutex<Option<WeakInstance>>,
}

impl Instance {
    /// Create an instance handle for a host element.
    ///
    /// The handle does not keep the host alive; update requests made after
    /// the host is gone are ignored.
    pub fn new(host: Weak<dyn UpdateHost>) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                id: InstanceId::new(),
                host,
                hooks: Hooks::default(),
                provided: Mutex::new(HashMap::new()),
                parent: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.inner.id
    }

    /// Forward an update request to the host element, if it is still alive.
    pub fn request_update(&self, property: Option<&str>, old_value: &dyn Any) {
        if let Some(host) = self.inner.host.upgrade() {
            host.request_update(property, old_value);
        }
    }

    /// Hooks registered against this instance.
    pub fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance(Arc::downgrade(&self.inner))
    }

    /// Check whether two handles refer to the same instance.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The instance this one is nested under, if the host reported one.
    pub fn parent(&self) -> Option<Instance> {
        self.inner.parent.lock().as_ref().and_then(WeakInstance::upgrade)
    }

    pub(crate) fn set_parent(&self, parent: Option<&Instance>) {
        *self.inner.parent.lock() = parent.map(Instance::downgrade);
    }

    pub(crate) fn provide_value(&self, key: u64, value: Arc<dyn Any + Send + Sync>) {
        self.inner.provided.lock().insert(key, value);
    }

    pub(crate) fn provided_value(&self, key: u64) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.provided.lock().get(&key).cloned()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.inner.id)
            .field("host_alive", &(self.inner.host.strong_count() > 0))
            .finish()
    }
}

/// Non-owning handle to an instance, stored in subscriber sets.
#[derive(Clone)]
pub struct WeakInstance(Weak<InstanceInner>);

impl WeakInstance {
    pub fn upgrade(&self) -> Option<Instance> {
        self.0.upgrade().map(|inner| Instance { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

fn set_current_instance(instance: Option<Instance>) -> Option<Instance> {
    CURRENT_INSTANCE.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), instance))
}

/// The instance currently executing setup or render, if any.
pub fn current_instance() -> Option<Instance> {
    CURRENT_INSTANCE.with(|slot| slot.borrow().clone())
}

/// Like [`current_instance`], but a missing instance is a usage error.
///
/// `api` names the function that needed the instance and ends up in the
/// error message.
pub fn require_current_instance(api: &'static str) -> Result<Instance, CompositionError> {
    current_instance().ok_or(CompositionError::NoCurrentInstance { api })
}

/// Restores the previous slot value when dropped.
struct InstanceScope {
    previous: Option<Instance>,
}

impl Drop for InstanceScope {
    fn drop(&mut self) {
        set_current_instance(self.previous.take());
    }
}

/// Run `f` with `instance` as the current instance.
///
/// The previous instance is restored when `f` returns or unwinds.
pub fn with_current_instance<R>(instance: &Instance, f: impl FnOnce() -> R) -> R {
    let _scope = InstanceScope {
        previous: set_current_instance(Some(instance.clone())),
    };
    f()
}
