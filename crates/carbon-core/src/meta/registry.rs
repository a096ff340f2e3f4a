//! Type registry
//!
//! Maps type names to [`TypeMetadata`] behind a `parking_lot::RwLock`.
//! Registration takes the write lock; lookups take the read lock just long
//! enough to clone the closures they need, so callables always run with the
//! registry unlocked and may themselves use the registry.
//!
//! Tests and embedders that want isolation construct their own registry with
//! [`TypeRegistry::new`]. [`TypeRegistry::instance`] is the process-wide
//! registry, initialised on first use; the free functions of this module
//! operate on it.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use carbon_types::TypeInfo;

use super::{Property, TypeMetadata};
use crate::any::Boxable;
use crate::boxed::BoxedValue;
use crate::dispatch::InvokeError;

/// Reflection failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetaError {
    /// No metadata registered under this name
    #[error("Type not found: {0}")]
    TypeNotFound(String),

    /// Unknown type or method
    #[error("Method not found: {type_name}.{method}")]
    MethodNotFound {
        /// Runtime type name of the object
        type_name: String,
        /// Requested method
        method: String,
    },

    /// Unknown type or property
    #[error("Property not found: {type_name}.{property}")]
    PropertyNotFound {
        /// Runtime type name of the object
        type_name: String,
        /// Requested property
        property: String,
    },

    /// Property has no setter
    #[error("Property {type_name}.{property} is read-only")]
    ReadonlyProperty {
        /// Runtime type name of the object
        type_name: String,
        /// Requested property
        property: String,
    },

    /// Object is const or read-only
    #[error("Cannot modify read-only value of type {0}")]
    ReadonlyValue(String),

    /// No constructor accepts the arguments
    #[error("No constructor of {type_name} accepts ({signature})")]
    ConstructorNotFound {
        /// Requested type
        type_name: String,
        /// Argument type names
        signature: String,
    },

    /// Unknown event
    #[error("Event not found: {type_name}.{event}")]
    EventNotFound {
        /// Type name
        type_name: String,
        /// Requested event
        event: String,
    },

    /// The target callable failed
    #[error("{target} failed: {source}")]
    Invocation {
        /// `Type.member` that was invoked
        target: String,
        /// Underlying failure
        source: InvokeError,
    },
}

/// Name → metadata map
#[derive(Default)]
pub struct TypeRegistry {
    types: RwLock<FxHashMap<String, TypeMetadata>>,
}

static GLOBAL: Lazy<TypeRegistry> = Lazy::new(TypeRegistry::new);

fn type_name_of(obj: &BoxedValue) -> String {
    obj.type_info().bare_short_name()
}

fn signature_of(args: &[BoxedValue]) -> String {
    args.iter()
        .map(BoxedValue::type_name)
        .collect::<Vec<_>>()
        .join(", ")
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn instance() -> &'static TypeRegistry {
        &GLOBAL
    }

    /// Register or replace metadata under `name`
    pub fn register_type(&self, name: &str, metadata: TypeMetadata) {
        debug!(
            type_name = name,
            methods = metadata.methods.len(),
            properties = metadata.properties.len(),
            "registered type metadata"
        );
        self.types.write().insert(name.to_string(), metadata);
    }

    /// Register metadata under `T`'s bare short name
    pub fn register<T: Boxable>(&self, metadata: TypeMetadata) {
        self.register_type(&TypeInfo::of::<T>().bare_short_name(), metadata);
    }

    /// Edit the metadata of `name`.
    ///
    /// `f` runs on a copy with the registry unlocked, and the copy replaces
    /// the entry afterwards; concurrent updates of one name are last-writer-wins.
    pub fn update(&self, name: &str, f: impl FnOnce(&mut TypeMetadata)) -> Result<(), MetaError> {
        let mut meta = self
            .metadata(name)
            .ok_or_else(|| MetaError::TypeNotFound(name.to_string()))?;
        f(&mut meta);
        self.types.write().insert(name.to_string(), meta);
        Ok(())
    }

    /// Copy of the metadata of `name`
    pub fn metadata(&self, name: &str) -> Option<TypeMetadata> {
        self.types.read().get(name).cloned()
    }

    /// Check for a registered name
    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Sorted registered names
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove `name`, reporting whether it was registered
    pub fn unregister(&self, name: &str) -> bool {
        self.types.write().remove(name).is_some()
    }

    /// Call `method` on `obj`.
    ///
    /// Overloads are tried in registration order; the first whose receiver
    /// and parameter types match is invoked. When none match, the first
    /// overload is invoked so its cast error reaches the caller.
    pub fn call_method(&self, obj: &BoxedValue, method: &str, args: &[BoxedValue]) -> Result<BoxedValue, MetaError> {
        let type_name = type_name_of(obj);
        let overloads = self
            .types
            .read()
            .get(&type_name)
            .and_then(|meta| meta.method(method))
            .map(<[_]>::to_vec)
            .ok_or_else(|| MetaError::MethodNotFound {
                type_name: type_name.clone(),
                method: method.to_string(),
            })?;

        let chosen = overloads
            .iter()
            .find(|ov| ov.accepts(obj, args))
            .or_else(|| overloads.first())
            .ok_or_else(|| MetaError::MethodNotFound {
                type_name: type_name.clone(),
                method: method.to_string(),
            })?;

        chosen.call(obj, args).map_err(|source| MetaError::Invocation {
            target: format!("{type_name}.{method}"),
            source,
        })
    }

    fn property_of(&self, obj: &BoxedValue, property: &str) -> Result<(String, Property), MetaError> {
        let type_name = type_name_of(obj);
        let prop = self
            .types
            .read()
            .get(&type_name)
            .and_then(|meta| meta.property(property))
            .cloned();
        match prop {
            Some(p) => Ok((type_name, p)),
            None => Err(MetaError::PropertyNotFound {
                type_name,
                property: property.to_string(),
            }),
        }
    }

    /// Read `property` of `obj`
    pub fn get_property(&self, obj: &BoxedValue, property: &str) -> Result<BoxedValue, MetaError> {
        let (type_name, prop) = self.property_of(obj, property)?;
        prop.get(obj).map_err(|source| MetaError::Invocation {
            target: format!("{type_name}.{property}"),
            source,
        })
    }

    /// Write `property` of `obj`.
    ///
    /// Fails on read-only objects and on properties without a setter.
    pub fn set_property(&self, obj: &BoxedValue, property: &str, value: &BoxedValue) -> Result<(), MetaError> {
        let (type_name, prop) = self.property_of(obj, property)?;
        if obj.is_readonly() || obj.is_const() {
            return Err(MetaError::ReadonlyValue(type_name));
        }
        let Some(setter) = prop.setter() else {
            return Err(MetaError::ReadonlyProperty {
                type_name,
                property: property.to_string(),
            });
        };
        setter(obj, value).map_err(|source| MetaError::Invocation {
            target: format!("{type_name}.{property}"),
            source,
        })
    }

    /// Build an instance of `type_name` with the first matching constructor
    pub fn create_instance(&self, type_name: &str, args: &[BoxedValue]) -> Result<BoxedValue, MetaError> {
        let constructors = self
            .types
            .read()
            .get(type_name)
            .map(|meta| meta.constructors().to_vec())
            .ok_or_else(|| MetaError::TypeNotFound(type_name.to_string()))?;

        let ctor = constructors
            .iter()
            .find(|c| c.accepts(args))
            .ok_or_else(|| MetaError::ConstructorNotFound {
                type_name: type_name.to_string(),
                signature: signature_of(args),
            })?;

        let instance = ctor.call(args).map_err(|source| MetaError::Invocation {
            target: format!("{type_name}::new"),
            source,
        })?;
        instance.reset_return_value();
        Ok(instance)
    }

    /// Run the listeners of `event` on `obj`, returning how many ran
    pub fn fire_event(&self, obj: &BoxedValue, event: &str, args: &[BoxedValue]) -> Result<usize, MetaError> {
        let type_name = type_name_of(obj);
        let listeners = {
            let types = self.types.read();
            let meta = types
                .get(&type_name)
                .ok_or_else(|| MetaError::TypeNotFound(type_name.clone()))?;
            meta.event(event)
                .map(|ev| ev.listeners())
                .ok_or_else(|| MetaError::EventNotFound {
                    type_name: type_name.clone(),
                    event: event.to_string(),
                })?
        };
        for listener in &listeners {
            listener(obj, args);
        }
        Ok(listeners.len())
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

// ============================================================================
// Global registry shortcuts
// ============================================================================

/// Register metadata in the process-wide registry
pub fn register_type(name: &str, metadata: TypeMetadata) {
    TypeRegistry::instance().register_type(name, metadata);
}

/// [`TypeRegistry::call_method`] on the process-wide registry
pub fn call_method(obj: &BoxedValue, method: &str, args: &[BoxedValue]) -> Result<BoxedValue, MetaError> {
    TypeRegistry::instance().call_method(obj, method, args)
}

/// [`TypeRegistry::get_property`] on the process-wide registry
pub fn get_property(obj: &BoxedValue, property: &str) -> Result<BoxedValue, MetaError> {
    TypeRegistry::instance().get_property(obj, property)
}

/// [`TypeRegistry::set_property`] on the process-wide registry
pub fn set_property(obj: &BoxedValue, property: &str, value: &BoxedValue) -> Result<(), MetaError> {
    TypeRegistry::instance().set_property(obj, property, value)
}

/// [`TypeRegistry::create_instance`] on the process-wide registry
pub fn create_instance(type_name: &str, args: &[BoxedValue]) -> Result<BoxedValue, MetaError> {
    TypeRegistry::instance().create_instance(type_name, args)
}

/// [`TypeRegistry::fire_event`] on the process-wide registry
pub fn fire_event(obj: &BoxedValue, event: &str, args: &[BoxedValue]) -> Result<usize, MetaError> {
    TypeRegistry::instance().fire_event(obj, event, args)
}
