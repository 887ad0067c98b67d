//! Composition Host
//!
//! [`Composed`] wraps a host element and gives it a setup phase. Setup runs
//! once, during construction, with the element's [`Instance`] as the current
//! instance, so it can create refs and register hooks with the free `on_*`
//! functions. It may return a render function that replaces the element's
//! own.
//!
//! # Lifecycle
//!
//! Every lifecycle callback first calls the element's base callback and then
//! the hooks registered for that phase, in registration order, with the same
//! arguments. [`Composed::perform_update`] drives one whole update cycle:
//!
//! 1. `will_update`
//! 2. `should_update`; the cycle stops here when it is `false`
//! 3. `update`, then `render`
//! 4. `first_updated`, on the first completed cycle only
//! 5. `updated`
//! 6. `perform_update`
//!
//! so the first mount of a component runs connected, will_update,
//! first_updated, updated and perform_update hooks in that order.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::element::{PropertyValues, ReactiveElement, UpdateHost};
use super::instance::{with_current_instance, Instance};
use crate::error::CompositionError;
use crate::reactive::Runtime;

/// A render function that replaces the element's own `render`.
pub type RenderFn<E> = Arc<dyn Fn(&E) -> <E as ReactiveElement>::Template + Send + Sync>;

type SetupFn<E> = Box<dyn FnOnce(&Arc<E>) -> Result<Option<RenderFn<E>>, CompositionError>>;

/// Wrap a closure as a [`RenderFn`].
pub fn render_fn<E, F>(f: F) -> RenderFn<E>
where
    E: ReactiveElement,
    F: Fn(&E) -> E::Template + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Declaration of one element property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyDeclaration {
    /// Assigned during construction when the element reports the property
    /// unset or `null`.
    pub default: Option<Value>,
    /// Attribute name, when it differs from the property name.
    pub attribute: Option<String>,
    /// Whether the property is reflected to its attribute.
    pub reflect: bool,
}

impl PropertyDeclaration {
    pub fn with_default(value: impl Into<Value>) -> Self {
        Self {
            default: Some(value.into()),
            ..Self::default()
        }
    }
}

/// Options for [`Composed::new`].
pub struct ElementOptions<E: ReactiveElement> {
    setup: Option<SetupFn<E>>,
    render: Option<RenderFn<E>>,
    props: IndexMap<String, PropertyDeclaration>,
}

impl<E: ReactiveElement> ElementOptions<E> {
    pub fn new() -> Self {
        Self {
            setup: None,
            render: None,
            props: IndexMap::new(),
        }
    }

    /// Setup function. Runs once with the new instance as the current
    /// instance; returning a render function overrides every other render.
    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&Arc<E>) -> Result<Option<RenderFn<E>>, CompositionError> + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }

    /// Render function used when setup does not return one.
    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&E) -> E::Template + Send + Sync + 'static,
    {
        self.render = Some(Arc::new(render));
        self
    }

    pub fn prop(mut self, name: impl Into<String>, declaration: PropertyDeclaration) -> Self {
        self.props.insert(name.into(), declaration);
        self
    }

    pub fn props(mut self, props: IndexMap<String, PropertyDeclaration>) -> Self {
        self.props.extend(props);
        self
    }
}

impl<E: ReactiveElement> Default for ElementOptions<E> {
    fn default() -> Self {
        Self::new()
    }
}

enum RenderSlot<E: ReactiveElement> {
    Custom(RenderFn<E>),
    Base,
}

/// A host element with a setup phase and hook-aware lifecycle.
pub struct Composed<E: ReactiveElement> {
    element: Arc<E>,
    instance: Instance,
    render: RenderSlot<E>,
    props: IndexMap<String, PropertyDeclaration>,
    has_updated: AtomicBool,
}

impl<E: ReactiveElement> Composed<E> {
    /// Construct the component: assign property defaults, run setup and pick
    /// the render function, all with the new instance as current instance.
    ///
    /// A setup error aborts construction and is returned unchanged.
    pub fn new(element: Arc<E>, options: ElementOptions<E>) -> Result<Self, CompositionError> {
        let ElementOptions {
            setup,
            render,
            props,
        } = options;
        let instance = Self::create_instance(&element);

        let slot = with_current_instance(&instance, || {
            assign_defaults(&*element, &props);
            let from_setup = match setup {
                Some(setup) => setup(&element)?,
                None => None,
            };
            Ok::<_, CompositionError>(
                from_setup
                    .or(render)
                    .map_or(RenderSlot::Base, RenderSlot::Custom),
            )
        })?;

        debug!(
            instance = %instance.id(),
            hooks = instance.hooks().total(),
            "component constructed"
        );
        Ok(Self::assemble(element, instance, slot, props))
    }

    /// Render-only component: no setup, no properties.
    pub fn functional<F>(element: Arc<E>, render: F) -> Self
    where
        F: Fn(&E) -> E::Template + Send + Sync + 'static,
    {
        let instance = Self::create_instance(&element);
        Self::assemble(
            element,
            instance,
            RenderSlot::Custom(Arc::new(render)),
            IndexMap::new(),
        )
    }

    fn create_instance(element: &Arc<E>) -> Instance {
        let host: Arc<dyn UpdateHost> = element.clone();
        Instance::new(Arc::downgrade(&host))
    }

    fn assemble(
        element: Arc<E>,
        instance: Instance,
        render: RenderSlot<E>,
        props: IndexMap<String, PropertyDeclaration>,
    ) -> Self {
        Self {
            element,
            instance,
            render,
            props,
            has_updated: AtomicBool::new(false),
        }
    }

    pub fn element(&self) -> &Arc<E> {
        &self.element
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Declared properties.
    pub fn properties(&self) -> &IndexMap<String, PropertyDeclaration> {
        &self.props
    }

    /// Whether an update cycle has rendered at least once.
    pub fn has_updated(&self) -> bool {
        self.has_updated.load(Ordering::SeqCst)
    }

    /// Render with this component as the current instance, so every ref
    /// read while rendering subscribes it.
    pub fn render(&self) -> E::Template {
        with_current_instance(&self.instance, || match &self.render {
            RenderSlot::Custom(render) => render(&self.element),
            RenderSlot::Base => self.element.render(),
        })
    }

    pub fn connected_callback(&self) {
        self.instance.set_parent(self.element.parent_instance().as_ref());
        self.element.connected_callback();
        self.instance.hooks().run_connected();
    }

    /// Also drops this instance from every subscriber set; it subscribes
    /// again on its next render.
    pub fn disconnected_callback(&self) {
        self.element.disconnected_callback();
        self.instance.hooks().run_disconnected();
        Runtime::release_instance(self.instance.id());
    }

    pub fn will_update(&self, changed: &PropertyValues) {
        self.element.will_update(changed);
        self.instance.hooks().run_will_update(changed);
    }

    /// The element's decision OR'ed with every registered predicate. All
    /// predicates run.
    pub fn should_update(&self, changed: &PropertyValues) -> bool {
        let base = self.element.should_update(changed);
        let hooks = self.instance.hooks().run_should_update(changed);
        base || hooks
    }

    pub fn update(&self, changed: &PropertyValues) {
        self.element.update(changed);
        self.instance.hooks().run_update(changed);
    }

    pub fn first_updated(&self, changed: &PropertyValues) {
        self.element.first_updated(changed);
        self.instance.hooks().run_first_updated(changed);
    }

    pub fn updated(&self, changed: &PropertyValues) {
        self.element.updated(changed);
        self.instance.hooks().run_updated(changed);
    }

    /// Run one update cycle. Returns the rendered template, or `None` when
    /// the update was vetoed.
    pub fn perform_update(&self, changed: &PropertyValues) -> Option<E::Template> {
        self.will_update(changed);

        let template = if self.should_update(changed) {
            self.update(changed);
            let template = self.render();
            if !self.has_updated.swap(true, Ordering::SeqCst) {
                self.first_updated(changed);
            }
            self.updated(changed);
            Some(template)
        } else {
            None
        };

        self.element.perform_update();
        self.instance.hooks().run_perform_update();
        template
    }
}

impl<E: ReactiveElement> fmt::Debug for Composed<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composed")
            .field("instance", &self.instance)
            .field("custom_render", &matches!(self.render, RenderSlot::Custom(_)))
            .field("props", &self.props.keys().collect::<Vec<_>>())
            .field("has_updated", &self.has_updated())
            .finish()
    }
}

fn assign_defaults<E: ReactiveElement>(element: &E, props: &IndexMap<String, PropertyDeclaration>) {
    for (name, declaration) in props {
        let Some(default) = &declaration.default else {
            continue;
        };
        if element.property(name).map_or(true, |value| value.is_null()) {
            element.set_property(name, default.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::hooks::{on_connected, on_should_update, on_updated};
    use crate::reactive::use_ref;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::any::Any;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Counter {
        props: Mutex<HashMap<String, Value>>,
        requests: Mutex<usize>,
        veto: AtomicBool,
    }

    impl UpdateHost for Counter {
        fn request_update(&self, _property: Option<&str>, _old_value: &dyn Any) {
            *self.requests.lock() += 1;
        }
    }

    impl ReactiveElement for Counter {
        type Template = String;

        fn render(&self) -> String {
            "base".to_string()
        }

        fn should_update(&self, _changed: &PropertyValues) -> bool {
            !self.veto.load(Ordering::SeqCst)
        }

        fn property(&self, name: &str) -> Option<Value> {
            self.props.lock().get(name).cloned()
        }

        fn set_property(&self, name: &str, value: Value) {
            self.props.lock().insert(name.to_string(), value);
        }
    }

    #[test]
    fn render_falls_back_to_base() {
        let composed = Composed::new(Arc::new(Counter::default()), ElementOptions::new()).unwrap();
        assert_eq!(composed.render(), "base");
    }

    #[test]
    fn options_render_is_used_without_setup_render() {
        let options = ElementOptions::new().render(|_: &Counter| "options".to_string());
        let composed = Composed::new(Arc::new(Counter::default()), options).unwrap();
        assert_eq!(composed.render(), "options");
    }

    #[test]
    fn setup_render_wins() {
        let options = ElementOptions::new()
            .render(|_: &Counter| "options".to_string())
            .setup(|_| Ok(Some(render_fn(|_: &Counter| "setup".to_string()))));
        let composed = Composed::new(Arc::new(Counter::default()), options).unwrap();
        assert_eq!(composed.render(), "setup");
    }

    #[test]
    fn defaults_only_fill_unset_properties() {
        let element = Arc::new(Counter::default());
        element.set_property("label", json!("preset"));
        element.set_property("title", Value::Null);

        let options = ElementOptions::new()
            .prop("label", PropertyDeclaration::with_default("default"))
            .prop("count", PropertyDeclaration::with_default(3))
            .prop("title", PropertyDeclaration::with_default("untitled"))
            .prop("plain", PropertyDeclaration::default());
        let composed = Composed::new(element.clone(), options).unwrap();

        assert_eq!(element.property("label"), Some(json!("preset")));
        assert_eq!(element.property("title"), Some(json!("untitled")));
        assert_eq!(element.property("count"), Some(json!(3)));
        assert_eq!(element.property("plain"), None);
        assert_eq!(composed.properties().len(), 4);
    }

    #[test]
    fn setup_errors_abort_construction() {
        let options = ElementOptions::<Counter>::new()
            .setup(|_| Err(CompositionError::Setup("bad input".into())));
        let err = Composed::new(Arc::new(Counter::default()), options).unwrap_err();
        assert_eq!(err, CompositionError::Setup("bad input".into()));
    }

    #[test]
    fn setup_registers_hooks_on_its_instance() {
        let options = ElementOptions::<Counter>::new().setup(|_| {
            on_connected(|| {})?;
            on_updated(|_| {})?;
            Ok(None)
        });
        let composed = Composed::new(Arc::new(Counter::default()), options).unwrap();
        assert_eq!(composed.instance().hooks().total(), 2);
    }

    #[test]
    fn render_subscribes_instance() {
        let count = use_ref(0);
        let c = count.clone();
        let element = Arc::new(Counter::default());
        let composed = Composed::functional(element.clone(), move |_: &Counter| {
            format!("count: {}", c.get())
        });

        assert_eq!(composed.render(), "count: 0");
        count.set(1);
        assert_eq!(*element.requests.lock(), 1);
        assert_eq!(composed.render(), "count: 1");
    }

    #[test]
    fn predicates_can_force_an_update() {
        let element = Arc::new(Counter::default());
        element.veto.store(true, Ordering::SeqCst);

        let force = Arc::new(AtomicBool::new(false));
        let f = force.clone();
        let options = ElementOptions::new().setup(move |_| {
            on_should_update(move |_| f.load(Ordering::SeqCst))?;
            Ok(None)
        });
        let composed = Composed::new(element, options).unwrap();

        let changed = PropertyValues::new();
        assert!(composed.perform_update(&changed).is_none());
        assert!(!composed.has_updated());

        force.store(true, Ordering::SeqCst);
        assert_eq!(composed.perform_update(&changed).as_deref(), Some("base"));
        assert!(composed.has_updated());
    }

    #[test]
    fn disconnect_releases_subscriptions() {
        let count = use_ref(0);
        let c = count.clone();
        let element = Arc::new(Counter::default());
        let composed = Composed::functional(element.clone(), move |_: &Counter| c.get().to_string());

        composed.connected_callback();
        composed.render();
        assert_eq!(count.subscriber_count(), 1);

        composed.disconnected_callback();
        assert_eq!(count.subscriber_count(), 0);
        count.set(1);
        assert_eq!(*element.requests.lock(), 0);
    }

    #[test]
    fn declarations_deserialize() {
        let decl: PropertyDeclaration =
            serde_json::from_value(json!({ "default": 1, "reflect": true })).unwrap();
        assert_eq!(decl.default, Some(json!(1)));
        assert!(decl.reflect);
        assert_eq!(decl.attribute, None);
    }
}
