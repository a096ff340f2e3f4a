//! Small-object erased value
//!
//! [`ValueAny`] holds one value of any [`Boxable`] type. Values of at most
//! three machine words (alignment ≤ 8) live inline; larger values are boxed.
//!
//! ```text
//! ValueAny
//! ├── storage: Empty | Inline([u8; 3 words]) | Heap(Box<dyn Any>)
//! └── vtable:  &'static VTable  (type descriptor, clone, drop, accessors)
//! ```
//!
//! The vtable is a static per type, built from generic function items.

use std::any::{Any, TypeId};
use std::fmt;
use std::mem::{self, MaybeUninit};
use std::ptr;

use carbon_types::{Reflect, TypeInfo};

/// Types that can be erased into a [`ValueAny`] or a `BoxedValue`
pub trait Boxable: Reflect + Clone + Send + Sync {}

impl<T: Reflect + Clone + Send + Sync> Boxable for T {}

/// Low-level erased cast failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Bad any cast: expected {expected}, found {actual}")]
pub struct BadAnyCast {
    /// Requested type
    pub expected: String,
    /// Type actually stored
    pub actual: String,
}

impl BadAnyCast {
    /// Build a cast failure from the requested type and the stored descriptor
    pub fn new<T: ?Sized>(actual: &TypeInfo) -> Self {
        BadAnyCast {
            expected: carbon_types::short_type_name(std::any::type_name::<T>()),
            actual: actual.short_name(),
        }
    }
}

type ErasedRef<'a> = &'a (dyn Any + Send + Sync);
type ErasedMut<'a> = &'a mut (dyn Any + Send + Sync);

const INLINE_SIZE: usize = 3 * mem::size_of::<usize>();

#[repr(C, align(8))]
struct InlineBuf([MaybeUninit<u8>; INLINE_SIZE]);

impl InlineBuf {
    /// # Safety
    /// `T` must satisfy [`fits_inline`].
    unsafe fn write<T>(value: T) -> Self {
        let mut buf = InlineBuf([MaybeUninit::uninit(); INLINE_SIZE]);
        ptr::write(buf.0.as_mut_ptr() as *mut T, value);
        buf
    }
}

const fn fits_inline<T>() -> bool {
    mem::size_of::<T>() <= INLINE_SIZE && mem::align_of::<T>() <= mem::align_of::<InlineBuf>()
}

enum Storage {
    Empty,
    Inline(InlineBuf),
    Heap(Box<dyn Any + Send + Sync>),
}

struct VTable {
    type_info: fn() -> TypeInfo,
    inline_ref: unsafe fn(&InlineBuf) -> ErasedRef<'_>,
    inline_mut: unsafe fn(&mut InlineBuf) -> ErasedMut<'_>,
    inline_clone: unsafe fn(&InlineBuf) -> InlineBuf,
    inline_drop: unsafe fn(&mut InlineBuf),
    heap_clone: fn(ErasedRef<'_>) -> Box<dyn Any + Send + Sync>,
    shared_target: fn(ErasedRef<'_>) -> Option<ErasedRef<'_>>,
}

unsafe fn inline_ref<T: Boxable>(buf: &InlineBuf) -> ErasedRef<'_> {
    &*(buf.0.as_ptr() as *const T)
}

unsafe fn inline_mut<T: Boxable>(buf: &mut InlineBuf) -> ErasedMut<'_> {
    &mut *(buf.0.as_mut_ptr() as *mut T)
}

unsafe fn inline_clone<T: Boxable>(buf: &InlineBuf) -> InlineBuf {
    let value = (*(buf.0.as_ptr() as *const T)).clone();
    InlineBuf::write(value)
}

unsafe fn inline_drop<T: Boxable>(buf: &mut InlineBuf) {
    ptr::drop_in_place(buf.0.as_mut_ptr() as *mut T);
}

fn heap_clone<T: Boxable>(value: ErasedRef<'_>) -> Box<dyn Any + Send + Sync> {
    match value.downcast_ref::<T>() {
        Some(v) => Box::new(v.clone()),
        // Storage and vtable are always built together for the same T.
        None => unreachable!("vtable/type mismatch in ValueAny"),
    }
}

fn shared_target<T: Boxable>(value: ErasedRef<'_>) -> Option<ErasedRef<'_>> {
    value.downcast_ref::<T>().and_then(<T as Reflect>::shared_target)
}

fn vtable_of<T: Boxable>() -> &'static VTable {
    &VTable {
        type_info: TypeInfo::of::<T>,
        inline_ref: inline_ref::<T>,
        inline_mut: inline_mut::<T>,
        inline_clone: inline_clone::<T>,
        inline_drop: inline_drop::<T>,
        heap_clone: heap_clone::<T>,
        shared_target: shared_target::<T>,
    }
}

/// Type-erased value with small-object optimisation
pub struct ValueAny {
    storage: Storage,
    vtable: Option<&'static VTable>,
}

impl ValueAny {
    /// Erase `value`
    pub fn new<T: Boxable>(value: T) -> Self {
        let storage = if fits_inline::<T>() {
            // fits_inline was checked just above.
            Storage::Inline(unsafe { InlineBuf::write(value) })
        } else {
            Storage::Heap(Box::new(value))
        };
        ValueAny {
            storage,
            vtable: Some(vtable_of::<T>()),
        }
    }

    /// Container holding nothing
    pub const fn empty() -> Self {
        ValueAny {
            storage: Storage::Empty,
            vtable: None,
        }
    }

    /// Check whether a value is held
    pub fn has_value(&self) -> bool {
        !matches!(self.storage, Storage::Empty)
    }

    /// Check whether the value is stored inline
    pub fn is_inline(&self) -> bool {
        matches!(self.storage, Storage::Inline(_))
    }

    /// Descriptor of the held type (undefined when empty)
    pub fn type_info(&self) -> TypeInfo {
        self.vtable
            .map(|vt| (vt.type_info)())
            .unwrap_or_default()
    }

    /// Short name of the held type
    pub fn type_name(&self) -> String {
        self.type_info().short_name()
    }

    /// Check whether exactly `T` is held
    pub fn is<T: Boxable>(&self) -> bool {
        self.has_value() && self.type_info().type_id() == TypeId::of::<T>()
    }

    fn as_any(&self) -> Option<ErasedRef<'_>> {
        let vtable = self.vtable?;
        match &self.storage {
            Storage::Empty => None,
            Storage::Inline(buf) => Some(unsafe { (vtable.inline_ref)(buf) }),
            Storage::Heap(b) => Some(&**b),
        }
    }

    fn as_any_mut(&mut self) -> Option<ErasedMut<'_>> {
        let vtable = self.vtable?;
        match &mut self.storage {
            Storage::Empty => None,
            Storage::Inline(buf) => Some(unsafe { (vtable.inline_mut)(buf) }),
            Storage::Heap(b) => Some(&mut **b),
        }
    }

    /// Referent of a shared-ownership payload (`Arc<T>` yields the `T`)
    pub fn shared_target(&self) -> Option<ErasedRef<'_>> {
        let vtable = self.vtable?;
        (vtable.shared_target)(self.as_any()?)
    }

    /// Erased view of the held value
    pub fn get(&self) -> Option<ErasedRef<'_>> {
        self.as_any()
    }

    /// Borrow the value as `T`, looking through shared ownership
    pub fn downcast_ref<T: Boxable>(&self) -> Option<&T> {
        let any = self.as_any()?;
        if let Some(v) = any.downcast_ref::<T>() {
            return Some(v);
        }
        self.shared_target()?.downcast_ref::<T>()
    }

    /// Borrow the value mutably as exactly `T`
    pub fn downcast_mut<T: Boxable>(&mut self) -> Option<&mut T> {
        self.as_any_mut()?.downcast_mut::<T>()
    }

    /// Hard cast: clone out a `T` or fail with [`BadAnyCast`]
    pub fn cast<T: Boxable>(&self) -> Result<T, BadAnyCast> {
        self.downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| BadAnyCast::new::<T>(&self.type_info()))
    }

    /// Soft cast: clone out a `T` if held
    pub fn try_cast<T: Boxable>(&self) -> Option<T> {
        self.cast::<T>().ok()
    }

    /// Move the value out as exactly `T`; on mismatch the container is returned
    pub fn take<T: Boxable>(mut self) -> Result<T, ValueAny> {
        if !self.is::<T>() {
            return Err(self);
        }
        match mem::replace(&mut self.storage, Storage::Empty) {
            // The storage was replaced with Empty, so Drop will not touch it again.
            Storage::Inline(buf) => Ok(unsafe { ptr::read(buf.0.as_ptr() as *const T) }),
            Storage::Heap(b) => match b.downcast::<T>() {
                Ok(v) => Ok(*v),
                Err(b) => {
                    self.storage = Storage::Heap(b);
                    Err(self)
                }
            },
            Storage::Empty => Err(self),
        }
    }

    /// Drop the held value
    pub fn reset(&mut self) {
        self.release();
        self.vtable = None;
    }

    /// Exchange contents with `other`
    pub fn swap(&mut self, other: &mut ValueAny) {
        mem::swap(self, other);
    }

    fn release(&mut self) {
        if let Storage::Inline(buf) = &mut self.storage {
            if let Some(vtable) = self.vtable {
                // The buffer holds a live value of the vtable's type.
                unsafe { (vtable.inline_drop)(buf) };
            }
        }
        self.storage = Storage::Empty;
    }
}

impl Drop for ValueAny {
    fn drop(&mut self) {
        self.release();
    }
}

impl Clone for ValueAny {
    fn clone(&self) -> Self {
        let storage = match (&self.storage, self.vtable) {
            (Storage::Inline(buf), Some(vtable)) => {
                Storage::Inline(unsafe { (vtable.inline_clone)(buf) })
            }
            (Storage::Heap(b), Some(vtable)) => Storage::Heap((vtable.heap_clone)(&**b)),
            _ => Storage::Empty,
        };
        ValueAny {
            storage,
            vtable: self.vtable,
        }
    }
}

impl Default for ValueAny {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ValueAny {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.storage {
            Storage::Empty => write!(f, "ValueAny(empty)"),
            Storage::Inline(_) => write!(f, "ValueAny({}, inline)", self.type_name()),
            Storage::Heap(_) => write!(f, "ValueAny({}, heap)", self.type_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_small_values_inline() {
        assert!(ValueAny::new(42i32).is_inline());
        assert!(ValueAny::new(String::from("abc")).is_inline());
        assert!(!ValueAny::new([0u64; 8]).is_inline());
    }

    #[test]
    fn test_cast_roundtrip() {
        let v = ValueAny::new(7u64);
        assert_eq!(v.cast::<u64>().unwrap(), 7);
        assert!(v.try_cast::<i64>().is_none());

        let big = ValueAny::new(vec![1, 2, 3]);
        assert_eq!(big.cast::<Vec<i32>>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_bad_cast_names_types() {
        let err = ValueAny::new(1i32).cast::<String>().unwrap_err();
        assert_eq!(err.expected, "String");
        assert_eq!(err.actual, "i32");
    }

    #[test]
    fn test_clone_is_deep() {
        let mut a = ValueAny::new(String::from("left"));
        let b = a.clone();
        a.downcast_mut::<String>().unwrap().push_str("-changed");
        assert_eq!(b.cast::<String>().unwrap(), "left");
        assert_eq!(a.cast::<String>().unwrap(), "left-changed");
    }

    #[test]
    fn test_shared_payload_is_aliased() {
        let shared = Arc::new(5i32);
        let a = ValueAny::new(shared.clone());
        let b = a.clone();
        assert_eq!(Arc::strong_count(&shared), 3);
        assert_eq!(b.downcast_ref::<i32>(), Some(&5));
        assert_eq!(a.cast::<i32>().unwrap(), 5);
    }

    #[test]
    fn test_take_and_reset() {
        let v = ValueAny::new(String::from("moved"));
        assert_eq!(v.take::<String>().unwrap(), "moved");

        let v = ValueAny::new(3u8);
        let v = v.take::<u16>().unwrap_err();
        assert_eq!(v.cast::<u8>().unwrap(), 3);

        let mut v = ValueAny::new(1.5f64);
        v.reset();
        assert!(!v.has_value());
        assert!(v.type_info().is_undefined());
    }

    #[test]
    fn test_drop_runs_once() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        #[derive(Clone)]
        struct Tracked;
        carbon_types::reflect_class!(Tracked);

        impl Drop for Tracked {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        {
            let a = ValueAny::new(Tracked);
            let _b = a.clone();
        }
        assert_eq!(DROPS.load(Ordering::SeqCst), 2);

        let v = ValueAny::new(Tracked);
        let t = v.take::<Tracked>().unwrap();
        assert_eq!(DROPS.load(Ordering::SeqCst), 2);
        drop(t);
        assert_eq!(DROPS.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_swap() {
        let mut a = ValueAny::new(1i32);
        let mut b = ValueAny::new(String::from("b"));
        a.swap(&mut b);
        assert!(a.is::<String>());
        assert!(b.is::<i32>());
    }
}
