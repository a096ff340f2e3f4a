//! Carbon Core - dynamic values, conversion and dispatch
//!
//! A small dynamically typed runtime for statically typed hosts:
//!
//! - [`ValueAny`]: erased value with inline storage for small payloads
//! - [`BoxedValue`]: erased value tagged with a [`TypeInfo`], with const and
//!   reference semantics and an attribute map
//! - [`TypeConversions`]: conversion graph with breadth-first path search
//! - [`CommandDispatcher`]: named commands with overloads, aliases, groups,
//!   timeouts and pre/postconditions
//! - [`TypeMetadata`] / [`TypeRegistry`]: string-keyed methods, properties,
//!   constructors and events
//!
//! # Example
//!
//! ```ignore
//! use carbon_core::{CommandDispatcher, TypeConversions};
//!
//! let dispatcher = CommandDispatcher::new(TypeConversions::create_shared());
//! dispatcher.def("add", "math", "integer addition", |a: i32, b: i32| a + b)?;
//! dispatcher.def("add", "math", "", |a: String, b: String| a + &b)?;
//! assert_eq!(dispatcher.dispatch_as::<i32>("add", (3, 4))?, 7);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod any;
pub mod boxed;
pub mod convert;
pub mod defaults;
pub mod dispatch;
pub mod error;
pub mod meta;
pub mod options;

pub use carbon_types::{reflect_class, reflect_enum, Reflect, TypeFlags, TypeInfo};

pub use any::{BadAnyCast, Boxable, ValueAny};
pub use boxed::{const_var, make_boxed_value, return_value, var, void_var, BoxError, BoxedValue};
pub use convert::{ConversionError, TypeConversions};
pub use dispatch::{
    Arg, Callable, CommandDispatcher, CommandStats, DispatchError, InvokeError, IntoArgs,
    Method, MethodMut, Overload, Signature,
};
pub use error::{CarbonResult, Error};
pub use meta::{MetaError, TypeMetadata, TypeRegistry};
pub use options::{ConfigError, DispatcherOptions};
