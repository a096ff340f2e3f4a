//! Trait bits carried by a [`TypeInfo`](crate::TypeInfo)
//!
//! ```text
//! bit  0  CONST            bit  7  CLASS
//! bit  1  REFERENCE        bit  8  FUNCTION
//! bit  2  POINTER          bit  9  TRIVIAL
//! bit  3  VOID             bit 10  STANDARD_LAYOUT
//! bit  4  ARITHMETIC       bit 11  POD
//! bit  5  ARRAY            bit 12  UNDEFINED
//! bit  6  ENUM
//! ```

use std::fmt;

/// Packed qualifier/category bits of a described type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct TypeFlags(u16);

impl TypeFlags {
    /// No bits set
    pub const EMPTY: TypeFlags = TypeFlags(0);
    /// Immutable view (`&T`, `*const T`, `Arc<T>`, const boxes)
    pub const CONST: TypeFlags = TypeFlags(1 << 0);
    /// Borrowed reference (`&T`, `&mut T`)
    pub const REFERENCE: TypeFlags = TypeFlags(1 << 1);
    /// Raw or smart pointer (`*const T`, `*mut T`, `Arc<T>`)
    pub const POINTER: TypeFlags = TypeFlags(1 << 2);
    /// The unit type
    pub const VOID: TypeFlags = TypeFlags(1 << 3);
    /// Integers, floats, `bool` and `char`
    pub const ARITHMETIC: TypeFlags = TypeFlags(1 << 4);
    /// Fixed-size arrays and slices
    pub const ARRAY: TypeFlags = TypeFlags(1 << 5);
    /// Enumerations
    pub const ENUM: TypeFlags = TypeFlags(1 << 6);
    /// Structs and library containers
    pub const CLASS: TypeFlags = TypeFlags(1 << 7);
    /// Function pointers
    pub const FUNCTION: TypeFlags = TypeFlags(1 << 8);
    /// Bitwise copyable with no drop glue
    pub const TRIVIAL: TypeFlags = TypeFlags(1 << 9);
    /// Plain field layout
    pub const STANDARD_LAYOUT: TypeFlags = TypeFlags(1 << 10);
    /// Trivial and standard layout
    pub const POD: TypeFlags = TypeFlags(1 << 11);
    /// Default-constructed descriptor with no known type
    pub const UNDEFINED: TypeFlags = TypeFlags(1 << 12);

    /// Bits shared by every scalar
    pub const SCALAR: TypeFlags = TypeFlags(
        Self::ARITHMETIC.0 | Self::TRIVIAL.0 | Self::STANDARD_LAYOUT.0 | Self::POD.0,
    );

    /// Category bits that survive reference/pointer qualification
    pub const CATEGORY: TypeFlags = TypeFlags(
        Self::ARITHMETIC.0 | Self::ARRAY.0 | Self::ENUM.0 | Self::CLASS.0 | Self::FUNCTION.0,
    );

    const NAMES: [(TypeFlags, &'static str); 13] = [
        (Self::CONST, "const"),
        (Self::REFERENCE, "reference"),
        (Self::POINTER, "pointer"),
        (Self::VOID, "void"),
        (Self::ARITHMETIC, "arithmetic"),
        (Self::ARRAY, "array"),
        (Self::ENUM, "enum"),
        (Self::CLASS, "class"),
        (Self::FUNCTION, "function"),
        (Self::TRIVIAL, "trivial"),
        (Self::STANDARD_LAYOUT, "standard_layout"),
        (Self::POD, "pod"),
        (Self::UNDEFINED, "undefined"),
    ];

    /// Raw bit pattern
    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Check that every bit of `other` is set
    #[inline]
    pub const fn contains(self, other: TypeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check that any bit of `other` is set
    #[inline]
    pub const fn intersects(self, other: TypeFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Bitwise union
    #[inline]
    pub const fn union(self, other: TypeFlags) -> TypeFlags {
        TypeFlags(self.0 | other.0)
    }

    /// Bitwise intersection
    #[inline]
    pub const fn intersection(self, other: TypeFlags) -> TypeFlags {
        TypeFlags(self.0 & other.0)
    }

    /// Clear every bit of `other`
    #[inline]
    pub const fn without(self, other: TypeFlags) -> TypeFlags {
        TypeFlags(self.0 & !other.0)
    }

    /// Flags of a reference or pointer to a type carrying `inner`.
    ///
    /// Only the category bits of the pointee survive; `qualifier` adds the
    /// reference/pointer/const bits of the wrapper itself.
    #[inline]
    pub const fn qualified(inner: TypeFlags, qualifier: TypeFlags) -> TypeFlags {
        inner.intersection(Self::CATEGORY).union(qualifier)
    }
}

impl std::ops::BitOr for TypeFlags {
    type Output = TypeFlags;

    fn bitor(self, rhs: TypeFlags) -> TypeFlags {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for TypeFlags {
    fn bitor_assign(&mut self, rhs: TypeFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for TypeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_set();
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                list.entry(&format_args!("{}", name));
            }
        }
        list.finish()
    }
}
