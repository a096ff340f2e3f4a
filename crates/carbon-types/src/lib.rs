//! Carbon Type Descriptors
//!
//! Runtime type identity for the Carbon value core:
//! - [`TypeInfo`]: immutable descriptor with an exact and a bare identity
//! - [`TypeFlags`]: qualifier and category bits carried by a descriptor
//! - [`Reflect`]: compile-time source of a descriptor for a host type
//!
//! Host types opt in with [`reflect_class!`] or [`reflect_enum!`]; the
//! standard scalar, string, container, reference and pointer types are
//! covered here.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod flags;
pub mod reflect;
pub mod type_info;

pub use flags::TypeFlags;
pub use reflect::Reflect;
pub use type_info::{short_type_name, TypeInfo};
