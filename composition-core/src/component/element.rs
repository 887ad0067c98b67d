//! Host element interfaces.
//!
//! The component base class, its rendering pipeline and its property
//! handling live outside this crate. These traits are the small surface the
//! composition layer needs from it.

use std::any::Any;

use indexmap::IndexMap;
use serde_json::Value;

use super::instance::Instance;

/// Properties that changed since the last update, mapped to their previous
/// values.
pub type PropertyValues = IndexMap<String, Value>;

/// Something that can be asked to schedule a UI update.
///
/// This is the only capability refs and computeds need from a component, so
/// it is kept object safe.
pub trait UpdateHost: Send + Sync + 'static {
    /// Request an update. `property` is the changed property, if known, and
    /// `old_value` its previous value.
    fn request_update(&self, property: Option<&str>, old_value: &dyn Any);
}

/// The lifecycle surface of a host component.
///
/// Every callback has an empty default so hosts only implement what they
/// actually do. The composition host calls these first and then runs the
/// hooks registered for the same phase.
pub trait ReactiveElement: UpdateHost {
    /// Whatever the host's render method produces.
    type Template;

    /// The element's own render method, used when setup returns none.
    fn render(&self) -> Self::Template;

    fn connected_callback(&self) {}

    fn disconnected_callback(&self) {}

    fn will_update(&self, _changed: &PropertyValues) {}

    /// The host's own decision on whether to update.
    fn should_update(&self, _changed: &PropertyValues) -> bool {
        true
    }

    fn update(&self, _changed: &PropertyValues) {}

    fn first_updated(&self, _changed: &PropertyValues) {}

    fn updated(&self, _changed: &PropertyValues) {}

    fn perform_update(&self) {}

    /// Current value of a declared property, `None` when unset.
    fn property(&self, _name: &str) -> Option<Value> {
        None
    }

    fn set_property(&self, _name: &str, _value: Value) {}

    /// The composed instance this element is nested under, used to resolve
    /// injected context values.
    fn parent_instance(&self) -> Option<Instance> {
        None
    }
}
