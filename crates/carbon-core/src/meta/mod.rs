//! String-keyed reflection
//!
//! A [`TypeMetadata`] is a capability table for one logical type: methods,
//! properties, constructors and events, all stored as erased closures. The
//! [`TypeRegistry`] maps type names to these tables and performs the
//! lookup-and-invoke steps for `call_method`, `get_property` and friends.

mod registry;

pub use registry::{
    call_method, create_instance, fire_event, get_property, register_type, set_property, MetaError,
    TypeRegistry,
};

use std::cmp::Reverse;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use carbon_types::TypeInfo;

use crate::any::Boxable;
use crate::boxed::{var, BoxedValue};
use crate::dispatch::{Callable, InvokeError, Method, MethodMut, MethodOverload, Overload};

/// Erased property getter
pub type Getter = Arc<dyn Fn(&BoxedValue) -> Result<BoxedValue, InvokeError> + Send + Sync>;

/// Erased property setter
pub type Setter = Arc<dyn Fn(&BoxedValue, &BoxedValue) -> Result<(), InvokeError> + Send + Sync>;

/// Event callback: the object the event fired on, plus event arguments
pub type EventListener = Arc<dyn Fn(&BoxedValue, &[BoxedValue]) + Send + Sync>;

/// Accessor pair of one property
#[derive(Clone)]
pub struct Property {
    value_type: TypeInfo,
    getter: Getter,
    setter: Option<Setter>,
    default: Option<BoxedValue>,
    description: String,
}

impl Property {
    /// Type of the property value
    pub fn value_type(&self) -> TypeInfo {
        self.value_type
    }

    /// Read through the getter
    pub fn get(&self, obj: &BoxedValue) -> Result<BoxedValue, InvokeError> {
        (self.getter)(obj)
    }

    /// Setter, absent for read-only properties
    pub fn setter(&self) -> Option<&Setter> {
        self.setter.as_ref()
    }

    /// Check for a setter
    pub fn is_readonly(&self) -> bool {
        self.setter.is_none()
    }

    /// Declared default value
    pub fn default_value(&self) -> Option<&BoxedValue> {
        self.default.as_ref()
    }

    /// Free-text description
    pub fn description(&self) -> &str {
        &self.description
    }
}

#[derive(Clone)]
struct Listener {
    priority: i32,
    callback: EventListener,
}

/// Named event with prioritized listeners
#[derive(Clone, Default)]
pub struct Event {
    description: String,
    listeners: Vec<Listener>,
}

impl Event {
    /// Free-text description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Number of listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Listeners, highest priority first; equal priorities keep insertion order
    pub fn listeners(&self) -> Vec<EventListener> {
        self.listeners.iter().map(|l| Arc::clone(&l.callback)).collect()
    }
}

/// Capability table of one logical type
#[derive(Clone, Default)]
pub struct TypeMetadata {
    description: String,
    methods: FxHashMap<String, Vec<MethodOverload>>,
    properties: FxHashMap<String, Property>,
    constructors: Vec<Overload>,
    events: FxHashMap<String, Event>,
}

impl TypeMetadata {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the type description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Type description
    pub fn description(&self) -> &str {
        &self.description
    }

    // ------------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------------

    /// Add an overload of a method taking `&T`
    pub fn add_method<T, Args>(&mut self, name: &str, f: impl Method<T, Args>) -> &mut Self {
        self.add_method_raw(name, f.into_method())
    }

    /// Add an overload of a method taking `&mut T`
    pub fn add_method_mut<T, Args>(&mut self, name: &str, f: impl MethodMut<T, Args>) -> &mut Self {
        self.add_method_raw(name, f.into_method_mut())
    }

    /// Add an erased method overload
    pub fn add_method_raw(&mut self, name: &str, method: MethodOverload) -> &mut Self {
        self.methods.entry(name.to_string()).or_default().push(method);
        self
    }

    /// Overloads of `name` in registration order
    pub fn method(&self, name: &str) -> Option<&[MethodOverload]> {
        self.methods.get(name).map(Vec::as_slice)
    }

    /// Check for a method
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Sorted method names
    pub fn method_names(&self) -> Vec<String> {
        sorted_keys(&self.methods)
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// Add a read/write property over `T`
    pub fn add_property<T, V>(
        &mut self,
        name: &str,
        getter: impl Fn(&T) -> V + Send + Sync + 'static,
        setter: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> &mut Self
    where
        T: Boxable,
        V: Boxable,
    {
        let setter: Setter = Arc::new(move |obj: &BoxedValue, value: &BoxedValue| {
            let v = value
                .cast::<V>()
                .map_err(|source| InvokeError::BadCast { index: 0, source })?;
            obj.with_mut::<T, _>(|this| setter(this, v))
                .map_err(InvokeError::Receiver)
        });
        self.insert_property::<T, V>(name, getter, Some(setter))
    }

    /// Add a property with no setter
    pub fn add_readonly_property<T, V>(
        &mut self,
        name: &str,
        getter: impl Fn(&T) -> V + Send + Sync + 'static,
    ) -> &mut Self
    where
        T: Boxable,
        V: Boxable,
    {
        self.insert_property::<T, V>(name, getter, None)
    }

    fn insert_property<T, V>(
        &mut self,
        name: &str,
        getter: impl Fn(&T) -> V + Send + Sync + 'static,
        setter: Option<Setter>,
    ) -> &mut Self
    where
        T: Boxable,
        V: Boxable,
    {
        let getter: Getter = Arc::new(move |obj: &BoxedValue| {
            obj.with_ref::<T, _>(|this| var(getter(this)))
                .map_err(InvokeError::Receiver)
        });
        self.properties.insert(
            name.to_string(),
            Property {
                value_type: TypeInfo::of::<V>(),
                getter,
                setter,
                default: None,
                description: String::new(),
            },
        );
        self
    }

    /// Attach a description to an existing property
    pub fn property_description(&mut self, name: &str, description: impl Into<String>) -> &mut Self {
        if let Some(p) = self.properties.get_mut(name) {
            p.description = description.into();
        }
        self
    }

    /// Attach a default value to an existing property
    pub fn property_default<V: Boxable>(&mut self, name: &str, value: V) -> &mut Self {
        if let Some(p) = self.properties.get_mut(name) {
            p.default = Some(var(value));
        }
        self
    }

    /// Look up a property
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Check for a property
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Sorted property names
    pub fn property_names(&self) -> Vec<String> {
        sorted_keys(&self.properties)
    }

    // ------------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------------

    /// Add a constructor overload
    pub fn add_constructor<Args>(&mut self, f: impl Callable<Args>) -> &mut Self {
        self.constructors.push(f.into_overload());
        self
    }

    /// Constructors in registration order
    pub fn constructors(&self) -> &[Overload] {
        &self.constructors
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Declare an event
    pub fn add_event(&mut self, name: &str, description: impl Into<String>) -> &mut Self {
        self.events.entry(name.to_string()).or_default().description = description.into();
        self
    }

    /// Attach a listener; higher priorities run first.
    ///
    /// Returns `false` when the event was never declared.
    pub fn add_event_listener(
        &mut self,
        event: &str,
        priority: i32,
        listener: impl Fn(&BoxedValue, &[BoxedValue]) + Send + Sync + 'static,
    ) -> bool {
        let Some(ev) = self.events.get_mut(event) else {
            return false;
        };
        ev.listeners.push(Listener {
            priority,
            callback: Arc::new(listener),
        });
        ev.listeners.sort_by_key(|l| Reverse(l.priority));
        true
    }

    /// Look up an event
    pub fn event(&self, name: &str) -> Option<&Event> {
        self.events.get(name)
    }

    /// Sorted event names
    pub fn event_names(&self) -> Vec<String> {
        sorted_keys(&self.events)
    }
}

impl fmt::Debug for TypeMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeMetadata")
            .field("methods", &self.method_names())
            .field("properties", &self.property_names())
            .field("constructors", &self.constructors.len())
            .field("events", &self.event_names())
            .finish()
    }
}

fn sorted_keys<V>(map: &FxHashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}
