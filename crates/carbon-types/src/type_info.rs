//! Runtime type descriptor
//!
//! A [`TypeInfo`] is a `Copy` snapshot of a type's identity and trait bits.
//! It carries two identities:
//!
//! - the **exact** identity of the described type, qualifiers included
//!   (`&'static i32`, `Arc<Point>`, ...)
//! - the **bare** identity of the type with references, pointers and shared
//!   ownership stripped (`i32`, `Point`, ...)
//!
//! Equality compares both identities and every flag bit; [`TypeInfo::bare_equal`]
//! compares only the bare identity and is what parameter matching uses.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::flags::TypeFlags;
use crate::reflect::Reflect;

/// Sentinel identity of a default-constructed descriptor
struct Undefined;

const UNDEFINED_NAME: &str = "undefined";

/// Immutable runtime type descriptor
#[derive(Clone, Copy)]
pub struct TypeInfo {
    type_id: TypeId,
    bare_id: TypeId,
    name: &'static str,
    bare_name: &'static str,
    flags: TypeFlags,
}

impl TypeInfo {
    /// Describe `T`
    pub fn of<T: Reflect + ?Sized>() -> Self {
        TypeInfo {
            type_id: TypeId::of::<T>(),
            bare_id: TypeId::of::<T::Bare>(),
            name: std::any::type_name::<T>(),
            bare_name: std::any::type_name::<T::Bare>(),
            flags: T::FLAGS,
        }
    }

    /// Describe the type of `value`
    pub fn of_val<T: Reflect + ?Sized>(_value: &T) -> Self {
        Self::of::<T>()
    }

    /// Describe a const view of `T` (same identities, `CONST` set)
    pub fn const_of<T: Reflect + ?Sized>() -> Self {
        Self::of::<T>().with_const()
    }

    /// Descriptor with no known type
    pub fn undefined() -> Self {
        TypeInfo {
            type_id: TypeId::of::<Undefined>(),
            bare_id: TypeId::of::<Undefined>(),
            name: UNDEFINED_NAME,
            bare_name: UNDEFINED_NAME,
            flags: TypeFlags::UNDEFINED,
        }
    }

    /// Same descriptor with the `CONST` bit set
    pub fn with_const(mut self) -> Self {
        if !self.is_undefined() {
            self.flags |= TypeFlags::CONST;
        }
        self
    }

    /// Same descriptor with the `CONST` bit cleared
    pub fn without_const(mut self) -> Self {
        self.flags = self.flags.without(TypeFlags::CONST);
        self
    }

    /// Compare only the bare identities
    #[inline]
    pub fn bare_equal(&self, other: &TypeInfo) -> bool {
        self.bare_id == other.bare_id
    }

    /// Compare the bare identity against a raw `TypeId`
    #[inline]
    pub fn bare_equal_type_id(&self, other: TypeId) -> bool {
        self.bare_id == other
    }

    /// Exact identity
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Bare identity
    #[inline]
    pub fn bare_type_id(&self) -> TypeId {
        self.bare_id
    }

    /// Trait bits
    #[inline]
    pub fn flags(&self) -> TypeFlags {
        self.flags
    }

    /// Fully qualified name of the exact type
    pub fn name(&self) -> &'static str {
        if self.is_undefined() {
            UNDEFINED_NAME
        } else {
            self.name
        }
    }

    /// Fully qualified name of the bare type
    pub fn bare_name(&self) -> &'static str {
        if self.is_undefined() {
            UNDEFINED_NAME
        } else {
            self.bare_name
        }
    }

    /// Exact name with module paths stripped (`Vec<String>`, `&Point`)
    pub fn short_name(&self) -> String {
        short_type_name(self.name())
    }

    /// Bare name with module paths stripped
    pub fn bare_short_name(&self) -> String {
        short_type_name(self.bare_name())
    }

    /// Immutable view
    pub fn is_const(&self) -> bool {
        self.flags.contains(TypeFlags::CONST)
    }

    /// Borrowed reference
    pub fn is_reference(&self) -> bool {
        self.flags.contains(TypeFlags::REFERENCE)
    }

    /// Raw or smart pointer
    pub fn is_pointer(&self) -> bool {
        self.flags.contains(TypeFlags::POINTER)
    }

    /// Unit type
    pub fn is_void(&self) -> bool {
        self.flags.contains(TypeFlags::VOID)
    }

    /// Integer, float, `bool` or `char` (possibly behind a reference)
    pub fn is_arithmetic(&self) -> bool {
        self.flags.contains(TypeFlags::ARITHMETIC)
    }

    /// Array or slice
    pub fn is_array(&self) -> bool {
        self.flags.contains(TypeFlags::ARRAY)
    }

    /// Enumeration
    pub fn is_enum(&self) -> bool {
        self.flags.contains(TypeFlags::ENUM)
    }

    /// Struct or container
    pub fn is_class(&self) -> bool {
        self.flags.contains(TypeFlags::CLASS)
    }

    /// Function pointer
    pub fn is_function(&self) -> bool {
        self.flags.contains(TypeFlags::FUNCTION)
    }

    /// Bitwise copyable
    pub fn is_trivial(&self) -> bool {
        self.flags.contains(TypeFlags::TRIVIAL)
    }

    /// Plain field layout
    pub fn is_standard_layout(&self) -> bool {
        self.flags.contains(TypeFlags::STANDARD_LAYOUT)
    }

    /// Plain old data
    pub fn is_pod(&self) -> bool {
        self.flags.contains(TypeFlags::POD)
    }

    /// No type known
    pub fn is_undefined(&self) -> bool {
        self.flags.contains(TypeFlags::UNDEFINED)
    }
}

impl Default for TypeInfo {
    fn default() -> Self {
        Self::undefined()
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.bare_id == other.bare_id && self.flags == other.flags
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.bare_id.hash(state);
        self.flags.hash(state);
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const() && !self.is_reference() && !self.is_pointer() {
            write!(f, "const {}", self.short_name())
        } else {
            f.write_str(&self.short_name())
        }
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name())
            .field("bare_name", &self.bare_name())
            .field("flags", &self.flags)
            .finish()
    }
}

/// Strip module paths from every path segment of a type name.
///
/// `core::option::Option<alloc::string::String>` becomes `Option<String>`.
pub fn short_type_name(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    let mut chars = full.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_alphanumeric() || c == '_' {
            segment.push(c);
        } else if c == ':' && chars.peek() == Some(&':') {
            chars.next();
            segment.clear();
        } else {
            out.push_str(&segment);
            segment.clear();
            out.push(c);
        }
    }
    out.push_str(&segment);
    out
}
