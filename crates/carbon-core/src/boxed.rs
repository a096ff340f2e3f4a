//! Boxed values
//!
//! A [`BoxedValue`] is the dynamically typed value of the Carbon core: an
//! erased payload ([`ValueAny`]), the [`TypeInfo`] it is tagged with, a few
//! semantic flags and an optional attribute map of nested boxes.
//!
//! # Copy semantics
//!
//! `Clone` copies the whole data block, payload included. Payloads that are
//! shared handles (`Arc<T>`, `&'static T`) keep pointing at the same referent,
//! so a copy of a reference-like box still aliases the original object.
//!
//! # Thread safety
//!
//! Every accessor takes the per-instance reader/writer lock. Closures passed
//! to [`BoxedValue::with_ref`] / [`BoxedValue::with_mut`] run under that lock
//! and must not call back into the same box.

use std::any::Any;
use std::fmt;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use rustc_hash::FxHashMap;

use carbon_types::{TypeFlags, TypeInfo};

use crate::any::{BadAnyCast, Boxable, ValueAny};

/// Errors raised by in-place access to a boxed value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoxError {
    /// Mutation attempted on a const or read-only box
    #[error("Cannot modify read-only value of type {type_name}")]
    Readonly {
        /// Type held by the box
        type_name: String,
    },

    /// Stored payload is not of the requested type
    #[error(transparent)]
    BadCast(#[from] BadAnyCast),

    /// Access attempted on a box holding no value
    #[error("Cannot access undefined value")]
    Undefined,
}

struct Data {
    value: ValueAny,
    type_info: TypeInfo,
    attrs: Option<FxHashMap<String, BoxedValue>>,
    is_ref: bool,
    return_value: bool,
    readonly: bool,
}

impl Data {
    fn new(value: ValueAny, type_info: TypeInfo, return_value: bool, readonly: bool) -> Self {
        let is_ref = type_info
            .flags()
            .intersects(TypeFlags::REFERENCE | TypeFlags::POINTER);
        Data {
            value,
            type_info,
            attrs: None,
            is_ref,
            return_value,
            readonly,
        }
    }

    fn is_immutable(&self) -> bool {
        self.readonly || self.type_info.is_const()
    }
}

impl Clone for Data {
    fn clone(&self) -> Self {
        Data {
            value: self.value.clone(),
            type_info: self.type_info,
            attrs: self.attrs.clone(),
            is_ref: self.is_ref,
            return_value: self.return_value,
            readonly: self.readonly,
        }
    }
}

/// Type-erased value tagged with a [`TypeInfo`]
pub struct BoxedValue {
    data: RwLock<Data>,
}

impl BoxedValue {
    /// Box `value` as a mutable, non-return value
    pub fn new<T: Boxable>(value: T) -> Self {
        make_boxed_value(value, false, false)
    }

    fn from_data(data: Data) -> Self {
        BoxedValue {
            data: RwLock::new(data),
        }
    }

    /// Box with no type and no payload
    pub fn undefined() -> Self {
        Self::from_data(Data::new(
            ValueAny::empty(),
            TypeInfo::undefined(),
            false,
            false,
        ))
    }

    /// Box an already erased payload
    pub fn from_any(value: ValueAny) -> Self {
        let type_info = value.type_info();
        Self::from_data(Data::new(value, type_info, false, false))
    }

    /// Copy of the erased payload
    pub fn to_any(&self) -> ValueAny {
        self.data.read().value.clone()
    }

    /// Descriptor the box is tagged with
    pub fn type_info(&self) -> TypeInfo {
        self.data.read().type_info
    }

    /// Short name of the tagged type
    pub fn type_name(&self) -> String {
        self.data.read().type_info.short_name()
    }

    /// Check the tagged type against `ti`, ignoring qualifiers
    pub fn is_type(&self, ti: &TypeInfo) -> bool {
        self.data.read().type_info.bare_equal(ti)
    }

    /// No type known
    pub fn is_undef(&self) -> bool {
        self.data.read().type_info.is_undefined()
    }

    /// No payload (undefined or void)
    pub fn is_null(&self) -> bool {
        !self.data.read().value.has_value()
    }

    /// Tagged as the unit type, or undefined
    pub fn is_void(&self) -> bool {
        let ti = self.data.read().type_info;
        ti.is_void() || ti.is_undefined()
    }

    /// Tagged with a const type view
    pub fn is_const(&self) -> bool {
        self.data.read().type_info.is_const()
    }

    /// Marked read-only
    pub fn is_readonly(&self) -> bool {
        self.data.read().readonly
    }

    /// Payload is a reference or pointer to a shared referent
    pub fn is_ref(&self) -> bool {
        self.data.read().is_ref
    }

    /// Produced as the result of a call
    pub fn is_return_value(&self) -> bool {
        self.data.read().return_value
    }

    /// Clear the return-value marker
    pub fn reset_return_value(&self) {
        self.data.write().return_value = false;
    }

    /// Turn the box into a const, read-only view
    pub fn make_const(&self) {
        let mut data = self.data.write();
        data.type_info = data.type_info.with_const();
        data.readonly = true;
    }

    /// Erased view of the payload, without copying
    pub fn get(&self) -> Option<MappedRwLockReadGuard<'_, dyn Any + Send + Sync>> {
        RwLockReadGuard::try_map(self.data.read(), |data| data.value.get()).ok()
    }

    /// Hard cast: clone the payload out as `T` or fail with [`BadAnyCast`]
    pub fn cast<T: Boxable>(&self) -> Result<T, BadAnyCast> {
        let data = self.data.read();
        data.value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| BadAnyCast::new::<T>(&data.type_info))
    }

    /// Soft cast: `None` instead of a cast failure
    pub fn try_cast<T: Boxable>(&self) -> Option<T> {
        self.cast::<T>().ok()
    }

    /// Probe whether [`BoxedValue::try_cast`] would succeed
    pub fn can_cast<T: Boxable>(&self) -> bool {
        self.data.read().value.downcast_ref::<T>().is_some()
    }

    /// Run `f` on the payload borrowed as `T`
    pub fn with_ref<T: Boxable, R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, BoxError> {
        let data = self.data.read();
        if !data.value.has_value() {
            return Err(BoxError::Undefined);
        }
        match data.value.downcast_ref::<T>() {
            Some(v) => Ok(f(v)),
            None => Err(BadAnyCast::new::<T>(&data.type_info).into()),
        }
    }

    /// Run `f` on the payload borrowed mutably as `T`.
    ///
    /// Const and read-only boxes reject the call.
    pub fn with_mut<T: Boxable, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, BoxError> {
        let mut data = self.data.write();
        if !data.value.has_value() {
            return Err(BoxError::Undefined);
        }
        if data.is_immutable() {
            return Err(BoxError::Readonly {
                type_name: data.type_info.short_name(),
            });
        }
        let type_info = data.type_info;
        match data.value.downcast_mut::<T>() {
            Some(v) => Ok(f(v)),
            None => Err(BadAnyCast::new::<T>(&type_info).into()),
        }
    }

    /// Replace payload and type with a copy of `other`'s
    pub fn assign(&self, other: &BoxedValue) -> Result<(), BoxError> {
        if std::ptr::eq(self, other) {
            return Ok(());
        }
        let (value, type_info, is_ref) = {
            let src = other.data.read();
            (src.value.clone(), src.type_info.without_const(), src.is_ref)
        };
        let mut data = self.data.write();
        if data.is_immutable() {
            return Err(BoxError::Readonly {
                type_name: data.type_info.short_name(),
            });
        }
        data.value = value;
        data.type_info = type_info;
        data.is_ref = is_ref;
        Ok(())
    }

    /// Exchange the full data blocks of two boxes.
    ///
    /// Fails without touching either box when one of them is const or
    /// read-only.
    pub fn swap(&self, other: &BoxedValue) -> Result<(), BoxError> {
        if std::ptr::eq(self, other) {
            return Ok(());
        }
        // Lock in address order so concurrent swaps cannot deadlock.
        let (first, second) = if (self as *const Self) < (other as *const Self) {
            (self, other)
        } else {
            (other, self)
        };
        let mut a = first.data.write();
        let mut b = second.data.write();
        for data in [&*a, &*b] {
            if data.is_immutable() {
                return Err(BoxError::Readonly {
                    type_name: data.type_info.short_name(),
                });
            }
        }
        std::mem::swap(&mut *a, &mut *b);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------------

    /// Create or overwrite a named attribute.
    ///
    /// Attributes are metadata, so this succeeds on const boxes too.
    pub fn set_attr(&self, name: impl Into<String>, value: BoxedValue) {
        self.data
            .write()
            .attrs
            .get_or_insert_with(FxHashMap::default)
            .insert(name.into(), value);
    }

    /// Copy of a named attribute, or an undefined box
    pub fn get_attr(&self, name: &str) -> BoxedValue {
        self.data
            .read()
            .attrs
            .as_ref()
            .and_then(|attrs| attrs.get(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Check for a named attribute
    pub fn has_attr(&self, name: &str) -> bool {
        self.data
            .read()
            .attrs
            .as_ref()
            .is_some_and(|attrs| attrs.contains_key(name))
    }

    /// Remove a named attribute, reporting whether it existed
    pub fn remove_attr(&self, name: &str) -> bool {
        self.data
            .write()
            .attrs
            .as_mut()
            .is_some_and(|attrs| attrs.remove(name).is_some())
    }

    /// Attribute names in sorted order
    pub fn list_attrs(&self) -> Vec<String> {
        let data = self.data.read();
        let mut names: Vec<String> = data
            .attrs
            .as_ref()
            .map(|attrs| attrs.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Replace this box's attributes with copies of `other`'s
    pub fn copy_attrs(&self, other: &BoxedValue) {
        if std::ptr::eq(self, other) {
            return;
        }
        let attrs = other.data.read().attrs.clone();
        self.data.write().attrs = attrs;
    }

    /// Merge copies of `other`'s attributes into this box, overwriting
    /// entries with the same name
    pub fn clone_attrs(&self, other: &BoxedValue) {
        if std::ptr::eq(self, other) {
            return;
        }
        let Some(src) = other.data.read().attrs.clone() else {
            return;
        };
        self.data
            .write()
            .attrs
            .get_or_insert_with(FxHashMap::default)
            .extend(src);
    }

    /// One-line description for diagnostics
    pub fn debug_string(&self) -> String {
        let data = self.data.read();
        let mut flags = Vec::new();
        if data.is_ref {
            flags.push("ref");
        }
        if data.type_info.is_const() {
            flags.push("const");
        }
        if data.readonly {
            flags.push("readonly");
        }
        if data.return_value {
            flags.push("return");
        }
        let attrs = data.attrs.as_ref().map_or(0, |a| a.len());
        format!(
            "BoxedValue({}{}{}, attrs={})",
            data.type_info.short_name(),
            if flags.is_empty() { "" } else { " " },
            flags.join("|"),
            attrs
        )
    }
}

impl Clone for BoxedValue {
    fn clone(&self) -> Self {
        Self::from_data(self.data.read().clone())
    }
}

impl Default for BoxedValue {
    fn default() -> Self {
        Self::undefined()
    }
}

impl fmt::Debug for BoxedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug_string())
    }
}

// ============================================================================
// Boxing factories
// ============================================================================

/// Box `value` with explicit return-value and read-only markers.
///
/// Unit values produce a void box with no payload. Const-qualified types
/// (`&'static T`, `Arc<T>`) are always read-only.
pub fn make_boxed_value<T: Boxable>(value: T, is_return_value: bool, readonly: bool) -> BoxedValue {
    let type_info = TypeInfo::of::<T>();
    let readonly = readonly || type_info.is_const();
    let payload = if type_info.is_void() {
        ValueAny::empty()
    } else {
        ValueAny::new(value)
    };
    BoxedValue::from_data(Data::new(payload, type_info, is_return_value, readonly))
}

/// Box a mutable value
pub fn var<T: Boxable>(value: T) -> BoxedValue {
    make_boxed_value(value, false, false)
}

/// Box a value behind a const, read-only view
pub fn const_var<T: Boxable>(value: T) -> BoxedValue {
    let boxed = make_boxed_value(value, false, true);
    boxed.make_const();
    boxed
}

/// Box representing "no value"
pub fn void_var() -> BoxedValue {
    make_boxed_value((), false, false)
}

/// Box a call result
pub fn return_value<T: Boxable>(value: T) -> BoxedValue {
    make_boxed_value(value, true, false)
}
