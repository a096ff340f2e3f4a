//! Erased callables
//!
//! Native closures are turned into [`Overload`]s (free functions) and
//! [`MethodOverload`]s (functions taking a boxed receiver). Both unpack their
//! boxed arguments with hard casts and box the result as a return value.

use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

use rustc_hash::FxHasher;

use carbon_types::TypeInfo;

use crate::any::{BadAnyCast, Boxable};
use crate::boxed::{return_value, BoxError, BoxedValue};

/// Errors raised while unpacking arguments or running a callable
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvokeError {
    /// An argument could not be cast to the parameter type
    #[error("argument {index}: {source}")]
    BadCast {
        /// Zero-based argument position
        index: usize,
        /// Underlying cast failure
        source: BadAnyCast,
    },

    /// Wrong number of arguments
    #[error("expected {expected} arguments, got {got}")]
    Arity {
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// The receiver of a method could not be borrowed
    #[error("receiver: {0}")]
    Receiver(#[source] BoxError),

    /// The callable reported a failure
    #[error("{0}")]
    Failed(String),
}

/// Erased free function
pub type InvokeFn = Arc<dyn Fn(&[BoxedValue]) -> Result<BoxedValue, InvokeError> + Send + Sync>;

/// Erased method: receiver plus arguments
pub type MethodFn =
    Arc<dyn Fn(&BoxedValue, &[BoxedValue]) -> Result<BoxedValue, InvokeError> + Send + Sync>;

/// Structural hash of a parameter list: arity followed by each bare type id
pub fn signature_hash(params: &[TypeInfo]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write_usize(params.len());
    for p in params {
        std::hash::Hash::hash(&p.bare_type_id(), &mut hasher);
    }
    hasher.finish()
}

/// Structural hash of the runtime types of `args`
pub fn argument_hash(args: &[BoxedValue]) -> u64 {
    let types: Vec<TypeInfo> = args.iter().map(BoxedValue::type_info).collect();
    signature_hash(&types)
}

fn bare_match(params: &[TypeInfo], args: &[BoxedValue]) -> bool {
    params.len() == args.len() && params.iter().zip(args).all(|(p, a)| a.is_type(p))
}

// ============================================================================
// Overload
// ============================================================================

/// One native callable with its signature
#[derive(Clone)]
pub struct Overload {
    params: Vec<TypeInfo>,
    ret: TypeInfo,
    hash: u64,
    invoke: InvokeFn,
}

impl Overload {
    /// Wrap an erased function with an explicit signature
    pub fn new(params: Vec<TypeInfo>, ret: TypeInfo, invoke: InvokeFn) -> Self {
        let hash = signature_hash(&params);
        Overload {
            params,
            ret,
            hash,
            invoke,
        }
    }

    /// Parameter types
    pub fn params(&self) -> &[TypeInfo] {
        &self.params
    }

    /// Return type
    pub fn return_type(&self) -> TypeInfo {
        self.ret
    }

    /// Signature hash
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Check arity and bare parameter types against `args`
    pub fn accepts(&self, args: &[BoxedValue]) -> bool {
        bare_match(&self.params, args)
    }

    /// Invoke with boxed arguments
    pub fn call(&self, args: &[BoxedValue]) -> Result<BoxedValue, InvokeError> {
        (self.invoke)(args)
    }

    /// Same signature with the invocation wrapped by `wrap`
    pub fn map_invoke(self, wrap: impl FnOnce(InvokeFn) -> InvokeFn) -> Self {
        Overload {
            invoke: wrap(self.invoke),
            ..self
        }
    }
}

impl fmt::Debug for Overload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(TypeInfo::short_name).collect();
        write!(
            f,
            "fn({}) -> {} [{:016x}]",
            params.join(", "),
            self.ret.short_name(),
            self.hash
        )
    }
}

/// Native functions that can become an [`Overload`]
pub trait Callable<Args>: Send + Sync + 'static {
    /// Erase into an overload
    fn into_overload(self) -> Overload;
}

macro_rules! count {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count!($($tail)*) };
}

macro_rules! impl_callable {
    ($($ty:ident $arg:ident $idx:tt),*) => {
        impl<F, R, $($ty,)*> Callable<($($ty,)*)> for F
        where
            F: Fn($($ty),*) -> R + Send + Sync + 'static,
            R: Boxable,
            $($ty: Boxable,)*
        {
            fn into_overload(self) -> Overload {
                let params: Vec<TypeInfo> = vec![$(TypeInfo::of::<$ty>()),*];
                let invoke: InvokeFn = Arc::new(move |args: &[BoxedValue]| {
                    let expected = count!($($ty)*);
                    if args.len() != expected {
                        return Err(InvokeError::Arity { expected, got: args.len() });
                    }
                    $(
                        let $arg = args[$idx]
                            .cast::<$ty>()
                            .map_err(|source| InvokeError::BadCast { index: $idx, source })?;
                    )*
                    Ok(return_value((self)($($arg),*)))
                });
                Overload::new(params, TypeInfo::of::<R>(), invoke)
            }
        }
    };
}

impl_callable!();
impl_callable!(A0 a0 0);
impl_callable!(A0 a0 0, A1 a1 1);
impl_callable!(A0 a0 0, A1 a1 1, A2 a2 2);
impl_callable!(A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3);
impl_callable!(A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4);
impl_callable!(A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3, A4 a4 4, A5 a5 5);

// ============================================================================
// Methods
// ============================================================================

/// Callable taking a boxed receiver
#[derive(Clone)]
pub struct MethodOverload {
    receiver: TypeInfo,
    params: Vec<TypeInfo>,
    ret: TypeInfo,
    invoke: MethodFn,
}

impl MethodOverload {
    /// Wrap an erased method with an explicit signature
    pub fn new(receiver: TypeInfo, params: Vec<TypeInfo>, ret: TypeInfo, invoke: MethodFn) -> Self {
        MethodOverload {
            receiver,
            params,
            ret,
            invoke,
        }
    }

    /// Receiver type
    pub fn receiver(&self) -> TypeInfo {
        self.receiver
    }

    /// Parameter types, receiver excluded
    pub fn params(&self) -> &[TypeInfo] {
        &self.params
    }

    /// Return type
    pub fn return_type(&self) -> TypeInfo {
        self.ret
    }

    /// Check receiver and argument types, ignoring qualifiers
    pub fn accepts(&self, receiver: &BoxedValue, args: &[BoxedValue]) -> bool {
        receiver.is_type(&self.receiver) && bare_match(&self.params, args)
    }

    /// Invoke on `receiver`
    pub fn call(&self, receiver: &BoxedValue, args: &[BoxedValue]) -> Result<BoxedValue, InvokeError> {
        (self.invoke)(receiver, args)
    }
}

impl fmt::Debug for MethodOverload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(TypeInfo::short_name).collect();
        write!(
            f,
            "fn(&{}, {}) -> {}",
            self.receiver.short_name(),
            params.join(", "),
            self.ret.short_name()
        )
    }
}

/// Native functions over `&T` that can become a [`MethodOverload`]
pub trait Method<T, Args>: Send + Sync + 'static {
    /// Erase into a method overload
    fn into_method(self) -> MethodOverload;
}

/// Native functions over `&mut T` that can become a [`MethodOverload`]
pub trait MethodMut<T, Args>: Send + Sync + 'static {
    /// Erase into a mutating method overload
    fn into_method_mut(self) -> MethodOverload;
}

macro_rules! impl_method {
    ($($ty:ident $arg:ident $idx:tt),*) => {
        impl<F, T, R, $($ty,)*> Method<T, ($($ty,)*)> for F
        where
            F: Fn(&T, $($ty),*) -> R + Send + Sync + 'static,
            T: Boxable,
            R: Boxable,
            $($ty: Boxable,)*
        {
            fn into_method(self) -> MethodOverload {
                let params: Vec<TypeInfo> = vec![$(TypeInfo::of::<$ty>()),*];
                let invoke: MethodFn = Arc::new(move |receiver: &BoxedValue, args: &[BoxedValue]| {
                    let expected = count!($($ty)*);
                    if args.len() != expected {
                        return Err(InvokeError::Arity { expected, got: args.len() });
                    }
                    $(
                        let $arg = args[$idx]
                            .cast::<$ty>()
                            .map_err(|source| InvokeError::BadCast { index: $idx, source })?;
                    )*
                    receiver
                        .with_ref::<T, _>(|this| (self)(this, $($arg),*))
                        .map(return_value)
                        .map_err(InvokeError::Receiver)
                });
                MethodOverload::new(TypeInfo::of::<T>(), params, TypeInfo::of::<R>(), invoke)
            }
        }

        impl<F, T, R, $($ty,)*> MethodMut<T, ($($ty,)*)> for F
        where
            F: Fn(&mut T, $($ty),*) -> R + Send + Sync + 'static,
            T: Boxable,
            R: Boxable,
            $($ty: Boxable,)*
        {
            fn into_method_mut(self) -> MethodOverload {
                let params: Vec<TypeInfo> = vec![$(TypeInfo::of::<$ty>()),*];
                let invoke: MethodFn = Arc::new(move |receiver: &BoxedValue, args: &[BoxedValue]| {
                    let expected = count!($($ty)*);
                    if args.len() != expected {
                        return Err(InvokeError::Arity { expected, got: args.len() });
                    }
                    $(
                        let $arg = args[$idx]
                            .cast::<$ty>()
                            .map_err(|source| InvokeError::BadCast { index: $idx, source })?;
                    )*
                    receiver
                        .with_mut::<T, _>(|this| (self)(this, $($arg),*))
                        .map(return_value)
                        .map_err(InvokeError::Receiver)
                });
                MethodOverload::new(TypeInfo::of::<T>(), params, TypeInfo::of::<R>(), invoke)
            }
        }
    };
}

impl_method!();
impl_method!(A0 a0 0);
impl_method!(A0 a0 0, A1 a1 1);
impl_method!(A0 a0 0, A1 a1 1, A2 a2 2);
impl_method!(A0 a0 0, A1 a1 1, A2 a2 2, A3 a3 3);
