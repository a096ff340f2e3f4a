//! Compile-time type description
//!
//! [`Reflect`] is the per-type source of a [`TypeInfo`](crate::TypeInfo): it
//! names the bare type and the trait bits. Implementations for scalars,
//! strings, std containers, tuples, function pointers, references, raw
//! pointers and `Arc` live here; host types use [`reflect_class!`] or
//! [`reflect_enum!`](crate::reflect_enum).

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::flags::TypeFlags;

/// Compile-time description of a type.
///
/// `Bare` is the type with references, pointers and shared ownership
/// stripped; for plain types it is `Self`.
pub trait Reflect: 'static {
    /// Type with qualifiers stripped
    type Bare: ?Sized + 'static;

    /// Trait bits of this exact type
    const FLAGS: TypeFlags;

    /// Referent of a shared-ownership handle or static reference.
    ///
    /// `Arc<T>` and `&'static T` return the `T` they point at so erased
    /// containers can hand out the referent without knowing the handle type.
    fn shared_target(&self) -> Option<&(dyn Any + Send + Sync)> {
        None
    }
}

macro_rules! reflect_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Reflect for $ty {
                type Bare = $ty;
                const FLAGS: TypeFlags = TypeFlags::SCALAR;
            }
        )*
    };
}

reflect_scalar!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, bool, char);

impl Reflect for () {
    type Bare = ();
    const FLAGS: TypeFlags = TypeFlags::VOID;
}

impl Reflect for str {
    type Bare = str;
    const FLAGS: TypeFlags = TypeFlags::CLASS;
}

impl Reflect for String {
    type Bare = String;
    const FLAGS: TypeFlags = TypeFlags::CLASS;
}

macro_rules! reflect_container {
    ($(($($param:ident),+) $ty:ty => $flags:expr;)*) => {
        $(
            impl<$($param: 'static),+> Reflect for $ty {
                type Bare = $ty;
                const FLAGS: TypeFlags = $flags;
            }
        )*
    };
}

reflect_container! {
    (T) Vec<T> => TypeFlags::CLASS;
    (T) VecDeque<T> => TypeFlags::CLASS;
    (T) HashSet<T> => TypeFlags::CLASS;
    (T) BTreeSet<T> => TypeFlags::CLASS;
    (K, V) HashMap<K, V> => TypeFlags::CLASS;
    (K, V) BTreeMap<K, V> => TypeFlags::CLASS;
    (T) Option<T> => TypeFlags::ENUM;
    (T) Box<T> => TypeFlags::CLASS;
    (T) [T] => TypeFlags::ARRAY;
}

impl<T: 'static, const N: usize> Reflect for [T; N] {
    type Bare = [T; N];
    const FLAGS: TypeFlags = TypeFlags::ARRAY;
}

macro_rules! reflect_tuple {
    ($(($($param:ident),+))*) => {
        $(
            impl<$($param: 'static),+> Reflect for ($($param,)+) {
                type Bare = ($($param,)+);
                const FLAGS: TypeFlags = TypeFlags::CLASS;
            }
        )*
    };
}

reflect_tuple! {
    (A)
    (A, B)
    (A, B, C)
    (A, B, C, D)
}

macro_rules! reflect_fn {
    ($(($($param:ident),*))*) => {
        $(
            impl<R: 'static, $($param: 'static),*> Reflect for fn($($param),*) -> R {
                type Bare = fn($($param),*) -> R;
                const FLAGS: TypeFlags = TypeFlags::FUNCTION
                    .union(TypeFlags::TRIVIAL)
                    .union(TypeFlags::POD);
            }
        )*
    };
}

reflect_fn! {
    ()
    (A)
    (A, B)
    (A, B, C)
    (A, B, C, D)
}

const CONST_REF: TypeFlags = TypeFlags::REFERENCE.union(TypeFlags::CONST);

impl<T: Reflect + Send + Sync> Reflect for &'static T {
    type Bare = T::Bare;
    const FLAGS: TypeFlags = TypeFlags::qualified(T::FLAGS, CONST_REF);

    fn shared_target(&self) -> Option<&(dyn Any + Send + Sync)> {
        let target: &T = self;
        Some(target)
    }
}

impl Reflect for &'static str {
    type Bare = str;
    const FLAGS: TypeFlags = TypeFlags::qualified(<str as Reflect>::FLAGS, CONST_REF);
}

impl<T: 'static> Reflect for &'static [T] {
    type Bare = [T];
    const FLAGS: TypeFlags = TypeFlags::qualified(<[T] as Reflect>::FLAGS, CONST_REF);
}

impl<T: Reflect + ?Sized> Reflect for &'static mut T {
    type Bare = T::Bare;
    const FLAGS: TypeFlags = TypeFlags::qualified(T::FLAGS, TypeFlags::REFERENCE);
}

impl<T: Reflect + ?Sized> Reflect for *const T {
    type Bare = T::Bare;
    const FLAGS: TypeFlags = TypeFlags::qualified(
        T::FLAGS,
        TypeFlags::POINTER
            .union(TypeFlags::CONST)
            .union(TypeFlags::TRIVIAL)
            .union(TypeFlags::POD),
    );
}

impl<T: Reflect + ?Sized> Reflect for *mut T {
    type Bare = T::Bare;
    const FLAGS: TypeFlags = TypeFlags::qualified(
        T::FLAGS,
        TypeFlags::POINTER.union(TypeFlags::TRIVIAL).union(TypeFlags::POD),
    );
}

impl<T: Reflect + Send + Sync> Reflect for Arc<T> {
    type Bare = T::Bare;
    const FLAGS: TypeFlags =
        TypeFlags::qualified(T::FLAGS, TypeFlags::POINTER.union(TypeFlags::CONST));

    fn shared_target(&self) -> Option<&(dyn Any + Send + Sync)> {
        let target: &T = self;
        Some(target)
    }
}

/// Declare host structs as class types.
///
/// ```ignore
/// struct Point { x: f64, y: f64 }
/// carbon_types::reflect_class!(Point);
/// ```
#[macro_export]
macro_rules! reflect_class {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Reflect for $ty {
                type Bare = $ty;
                const FLAGS: $crate::TypeFlags = $crate::TypeFlags::CLASS;
            }
        )+
    };
}

/// Declare host enums as enum types.
#[macro_export]
macro_rules! reflect_enum {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::Reflect for $ty {
                type Bare = $ty;
                const FLAGS: $crate::TypeFlags = $crate::TypeFlags::ENUM;
            }
        )+
    };
}
