//! Type conversion engine
//!
//! [`TypeConversions`] owns a [`ConversionGraph`] of registered conversion
//! edges, a name table used to resolve the source type of a value, type
//! groups, and a memo of resolved paths.
//!
//! # Locking
//!
//! Graph, names and path cache sit behind separate `parking_lot` locks and
//! are always taken in the order graph, names, cache. Registering an edge
//! clears the cache while still holding the graph write lock; a lookup
//! stores its result while still holding the graph read lock. A reader can
//! therefore never see a path computed from an older graph.
//!
//! Conversion functions run after every lock has been released.

mod containers;
mod graph;

pub use graph::{shortest_path, Conversion, ConversionGraph, ConvertFn};

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use carbon_types::TypeInfo;

use crate::any::{Boxable, ValueAny};
use crate::boxed::BoxedValue;

/// Conversion failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// Rejected registration
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The value's type was never registered
    #[error("Source type not found: {0}")]
    SourceTypeNotFound(String),

    /// Search exhausted the graph
    #[error("No conversion path found from {from} to {to}")]
    NoConversionPath {
        /// Source type name
        from: String,
        /// Target type name
        to: String,
    },

    /// An edge exists but applying it failed
    #[error("Bad conversion from {from} to {to}: {reason}")]
    BadConversion {
        /// Source type name
        from: String,
        /// Target type name
        to: String,
        /// Failure reported by the converter
        reason: String,
    },
}

impl ConversionError {
    /// Failure of a typed converter between `From` and `To`
    pub fn bad<From: ?Sized, To: ?Sized>(reason: impl fmt::Display) -> Self {
        ConversionError::BadConversion {
            from: carbon_types::short_type_name(std::any::type_name::<From>()),
            to: carbon_types::short_type_name(std::any::type_name::<To>()),
            reason: reason.to_string(),
        }
    }
}

#[derive(Default)]
struct Names {
    /// Human-readable name or alias → identity
    by_name: FxHashMap<String, TypeInfo>,
    /// Every identity the engine knows about
    known: FxHashSet<TypeInfo>,
    /// Group name → member type names
    groups: FxHashMap<String, Vec<String>>,
}

impl Names {
    fn register(&mut self, name: &str, ti: TypeInfo) {
        self.by_name.insert(name.to_string(), ti);
        self.by_name.insert(ti.name().to_string(), ti);
        self.known.insert(ti);
    }

    fn register_identity(&mut self, ti: TypeInfo) {
        if self.known.insert(ti) {
            self.by_name.insert(ti.name().to_string(), ti);
            self.by_name.entry(ti.short_name()).or_insert(ti);
        }
    }
}

type PathKey = (TypeInfo, TypeInfo);

/// Conversion registry with a memoized path search
#[derive(Default)]
pub struct TypeConversions {
    graph: RwLock<ConversionGraph>,
    names: RwLock<Names>,
    path_cache: RwLock<FxHashMap<PathKey, Option<Vec<TypeInfo>>>>,
}

impl TypeConversions {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared engine with the builtin scalar and string names registered
    pub fn create_shared() -> Arc<Self> {
        let conversions = Self::new();
        conversions.register_builtin_types();
        Arc::new(conversions)
    }

    fn register_builtin_types(&self) {
        macro_rules! builtin {
            ($($ty:ty => $name:literal),* $(,)?) => {
                $( self.register_type::<$ty>($name); )*
            };
        }
        builtin! {
            bool => "bool",
            i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64", i128 => "i128", isize => "isize",
            u8 => "u8", u16 => "u16", u32 => "u32", u64 => "u64", u128 => "u128", usize => "usize",
            f32 => "f32", f64 => "f64",
            char => "char",
            String => "String",
        }
    }

    // ------------------------------------------------------------------------
    // Edge registration
    // ------------------------------------------------------------------------

    /// Insert an erased edge.
    ///
    /// Both endpoints become known types. Rejects `from == to` and clears
    /// the path cache.
    pub fn register_conversion_raw(
        &self,
        from: TypeInfo,
        to: TypeInfo,
        func: ConvertFn,
    ) -> Result<(), ConversionError> {
        let mut graph = self.graph.write();
        graph.insert(Conversion { from, to, func })?;
        {
            let mut names = self.names.write();
            names.register_identity(from);
            names.register_identity(to);
        }
        self.path_cache.write().clear();
        debug!(from = %from, to = %to, edges = graph.len(), "registered conversion");
        Ok(())
    }

    /// Register an infallible conversion
    pub fn add_conversion<From, To, F>(&self, f: F) -> Result<(), ConversionError>
    where
        From: Boxable,
        To: Boxable,
        F: Fn(From) -> To + Send + Sync + 'static,
    {
        self.add_fallible_conversion::<From, To, _, std::convert::Infallible>(move |v| Ok(f(v)))
    }

    /// Register a conversion that may fail
    pub fn add_fallible_conversion<From, To, F, E>(&self, f: F) -> Result<(), ConversionError>
    where
        From: Boxable,
        To: Boxable,
        F: Fn(From) -> Result<To, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        let func: ConvertFn = Arc::new(move |value: ValueAny| {
            let input = value
                .take::<From>()
                .map_err(|v| ConversionError::bad::<From, To>(format!("payload is {}", v.type_name())))?;
            f(input)
                .map(ValueAny::new)
                .map_err(ConversionError::bad::<From, To>)
        });
        self.register_conversion_raw(TypeInfo::of::<From>(), TypeInfo::of::<To>(), func)
    }

    /// Register `From → To` through `Into`
    pub fn add_into<From, To>(&self) -> Result<(), ConversionError>
    where
        From: Boxable + Into<To>,
        To: Boxable,
    {
        self.add_conversion::<From, To, _>(Into::into)
    }

    /// Register `Base → Derived` through `TryFrom`
    pub fn add_downcast<Base, Derived>(&self) -> Result<(), ConversionError>
    where
        Base: Boxable,
        Derived: Boxable + TryFrom<Base>,
        <Derived as TryFrom<Base>>::Error: fmt::Display,
    {
        self.add_fallible_conversion::<Base, Derived, _, _>(Derived::try_from)
    }

    /// Register upcasts from `Derived` (and `Arc<Derived>`) to the `Base` it embeds
    pub fn add_base_class<Base, Derived>(&self) -> Result<(), ConversionError>
    where
        Base: Boxable,
        Derived: Boxable + AsRef<Base>,
    {
        self.add_conversion::<Derived, Base, _>(|d| d.as_ref().clone())?;
        self.add_conversion::<Arc<Derived>, Base, _>(|d| (*d).as_ref().clone())
    }

    /// [`add_base_class`](Self::add_base_class) plus the `Base → Derived` downcast
    pub fn add_base_class_with_downcast<Base, Derived>(&self) -> Result<(), ConversionError>
    where
        Base: Boxable,
        Derived: Boxable + AsRef<Base> + TryFrom<Base>,
        <Derived as TryFrom<Base>>::Error: fmt::Display,
    {
        self.add_base_class::<Base, Derived>()?;
        self.add_downcast::<Base, Derived>()
    }

    // ------------------------------------------------------------------------
    // Names and groups
    // ------------------------------------------------------------------------

    /// Register `T` under a human-readable name
    pub fn register_type<T: Boxable>(&self, name: &str) {
        let ti = TypeInfo::of::<T>();
        self.names.write().register(name, ti);
        debug!(name, ty = %ti, "registered type name");
    }

    /// Register another name for `T`
    pub fn register_alias<T: Boxable>(&self, alias: &str) {
        self.register_type::<T>(alias);
    }

    /// Register a named group of type names
    pub fn register_type_group(&self, group: &str, members: &[&str]) {
        self.names.write().groups.insert(
            group.to_string(),
            members.iter().map(|m| (*m).to_string()).collect(),
        );
        debug!(group, members = members.len(), "registered type group");
    }

    /// Look up a type by name or alias
    pub fn type_by_name(&self, name: &str) -> Option<TypeInfo> {
        self.names.read().by_name.get(name).copied()
    }

    /// Resolved members of a group; names with no registered type are skipped
    pub fn group_members(&self, group: &str) -> Vec<TypeInfo> {
        let names = self.names.read();
        names
            .groups
            .get(group)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|m| names.by_name.get(m).copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check whether `ti` is a member of `group`, ignoring qualifiers
    pub fn is_in_group(&self, group: &str, ti: &TypeInfo) -> bool {
        self.group_members(group).iter().any(|m| m.bare_equal(ti))
    }

    /// Check whether `ti` was registered by name or through an edge
    pub fn is_known(&self, ti: &TypeInfo) -> bool {
        self.names.read().known.contains(ti)
    }

    // ------------------------------------------------------------------------
    // Path search
    // ------------------------------------------------------------------------

    /// Shortest conversion path, memoized until the next registration
    pub fn find_path(&self, from: &TypeInfo, to: &TypeInfo) -> Option<Vec<TypeInfo>> {
        let key = (*from, *to);
        if let Some(cached) = self.path_cache.read().get(&key) {
            trace!(from = %from, to = %to, "path cache hit");
            return cached.clone();
        }

        let graph = self.graph.read();
        let path = shortest_path(&graph, from, to);
        trace!(from = %from, to = %to, found = path.is_some(), "path cache miss");
        self.path_cache.write().insert(key, path.clone());
        path
    }

    /// Check whether a value of `from` can be turned into `to`
    pub fn can_convert(&self, from: &TypeInfo, to: &TypeInfo) -> bool {
        from == to || self.find_path(from, to).is_some()
    }

    /// Number of memoized lookups
    pub fn cached_paths(&self) -> usize {
        self.path_cache.read().len()
    }

    /// Number of registered edges
    pub fn conversion_count(&self) -> usize {
        self.graph.read().len()
    }

    /// Drop every memoized path
    pub fn clear_cache(&self) {
        self.path_cache.write().clear();
    }

    // ------------------------------------------------------------------------
    // Conversion
    // ------------------------------------------------------------------------

    /// Convert an erased value to the `to` identity
    pub fn convert_any(&self, value: ValueAny, to: &TypeInfo) -> Result<ValueAny, ConversionError> {
        let from = value.type_info();
        if from == *to {
            return Ok(value);
        }
        if from.is_undefined() || !self.is_known(&from) {
            return Err(ConversionError::SourceTypeNotFound(from.short_name()));
        }

        let path = self
            .find_path(&from, to)
            .ok_or_else(|| ConversionError::NoConversionPath {
                from: from.short_name(),
                to: to.short_name(),
            })?;

        let steps: Vec<Conversion> = {
            let graph = self.graph.read();
            path.windows(2)
                .map(|pair| {
                    graph.edge(&pair[0], &pair[1]).cloned().ok_or_else(|| {
                        ConversionError::BadConversion {
                            from: pair[0].short_name(),
                            to: pair[1].short_name(),
                            reason: "edge removed during conversion".to_string(),
                        }
                    })
                })
                .collect::<Result<_, _>>()?
        };

        steps.iter().try_fold(value, |acc, step| {
            step.apply(acc).map_err(|e| match e {
                e @ ConversionError::BadConversion { .. } => e,
                other => ConversionError::BadConversion {
                    from: step.from.short_name(),
                    to: step.to.short_name(),
                    reason: other.to_string(),
                },
            })
        })
    }

    /// Convert an erased value to `To`
    pub fn convert<To: Boxable>(&self, value: ValueAny) -> Result<To, ConversionError> {
        let from = value.type_name();
        self.convert_any(value, &TypeInfo::of::<To>())?
            .take::<To>()
            .map_err(|v| ConversionError::BadConversion {
                from,
                to: TypeInfo::of::<To>().short_name(),
                reason: format!("converter produced {}", v.type_name()),
            })
    }

    /// Convert a native value
    pub fn convert_value<From: Boxable, To: Boxable>(&self, value: From) -> Result<To, ConversionError> {
        self.convert::<To>(ValueAny::new(value))
    }

    /// Convert a boxed value, producing a fresh box of the `to` identity
    pub fn convert_boxed(&self, value: &BoxedValue, to: &TypeInfo) -> Result<BoxedValue, ConversionError> {
        self.convert_any(value.to_any(), to).map(BoxedValue::from_any)
    }
}

impl fmt::Debug for TypeConversions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeConversions")
            .field("conversions", &self.conversion_count())
            .field("cached_paths", &self.cached_paths())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Celsius(f64);
    #[derive(Clone, Debug, PartialEq)]
    struct Kelvin(f64);
    #[derive(Clone, Debug, PartialEq)]
    struct Fahrenheit(f64);
    carbon_types::reflect_class!(Celsius, Kelvin, Fahrenheit);

    #[derive(Clone, Debug, PartialEq)]
    struct Shape {
        sides: u32,
    }
    #[derive(Clone, Debug, PartialEq)]
    struct Square {
        base: Shape,
        side: f64,
    }
    carbon_types::reflect_class!(Shape, Square);

    impl AsRef<Shape> for Square {
        fn as_ref(&self) -> &Shape {
            &self.base
        }
    }

    impl TryFrom<Shape> for Square {
        type Error = String;
        fn try_from(s: Shape) -> Result<Self, String> {
            if s.sides == 4 {
                Ok(Square { base: s, side: 1.0 })
            } else {
                Err(format!("{} sides", s.sides))
            }
        }
    }

    fn temperature_chain() -> TypeConversions {
        let tc = TypeConversions::new();
        tc.add_conversion::<Celsius, Kelvin, _>(|c| Kelvin(c.0 + 273.15)).unwrap();
        tc.add_conversion::<Kelvin, Fahrenheit, _>(|k| Fahrenheit((k.0 - 273.15) * 1.8 + 32.0))
            .unwrap();
        tc
    }

    #[test]
    fn test_two_hop_composition() {
        let tc = temperature_chain();
        let f: Fahrenheit = tc.convert_value::<Celsius, Fahrenheit>(Celsius(100.0)).unwrap();
        assert!((f.0 - 212.0).abs() < 1e-9);
    }

    #[test]
    fn test_identity_conversion() {
        let tc = TypeConversions::new();
        assert_eq!(tc.convert_value::<i32, i32>(5).unwrap(), 5);
        assert!(tc.can_convert(&TypeInfo::of::<i32>(), &TypeInfo::of::<i32>()));
    }

    #[test]
    fn test_self_edge_rejected() {
        let tc = TypeConversions::new();
        let err = tc.add_conversion::<i32, i32, _>(|v| v).unwrap_err();
        assert!(matches!(err, ConversionError::InvalidArgument(_)));
    }

    #[test]
    fn test_no_path_vs_unknown_source() {
        let tc = temperature_chain();
        assert!(matches!(
            tc.convert_value::<Fahrenheit, Celsius>(Fahrenheit(0.0)),
            Err(ConversionError::NoConversionPath { .. })
        ));
        assert!(matches!(
            tc.convert_value::<u8, Celsius>(1),
            Err(ConversionError::SourceTypeNotFound(_))
        ));
    }

    #[test]
    fn test_registration_invalidates_cache() {
        let tc = temperature_chain();
        let c = TypeInfo::of::<Celsius>();
        let f = TypeInfo::of::<Fahrenheit>();
        assert_eq!(tc.find_path(&c, &f).unwrap().len(), 3);
        assert_eq!(tc.cached_paths(), 1);

        tc.add_conversion::<Celsius, Fahrenheit, _>(|c| Fahrenheit(c.0 * 1.8 + 32.0 + 1000.0))
            .unwrap();
        assert_eq!(tc.cached_paths(), 0);
        assert_eq!(tc.find_path(&c, &f).unwrap().len(), 2);

        let out: Fahrenheit = tc.convert_value::<Celsius, Fahrenheit>(Celsius(0.0)).unwrap();
        assert!((out.0 - 1032.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_result_is_cached_and_invalidated() {
        let tc = temperature_chain();
        let k = TypeInfo::of::<Kelvin>();
        let c = TypeInfo::of::<Celsius>();
        assert!(!tc.can_convert(&k, &c));
        assert_eq!(tc.cached_paths(), 1);
        tc.add_conversion::<Kelvin, Celsius, _>(|k| Celsius(k.0 - 273.15)).unwrap();
        assert!(tc.can_convert(&k, &c));
    }

    #[test]
    fn test_fallible_edge_reports_bad_conversion() {
        let tc = TypeConversions::new();
        tc.add_fallible_conversion::<i64, u8, _, _>(u8::try_from).unwrap();
        assert_eq!(tc.convert_value::<i64, u8>(7).unwrap(), 7);
        assert!(matches!(
            tc.convert_value::<i64, u8>(300),
            Err(ConversionError::BadConversion { .. })
        ));
    }

    #[test]
    fn test_base_class() {
        let tc = TypeConversions::new();
        tc.add_base_class_with_downcast::<Shape, Square>().unwrap();
        let sq = Square {
            base: Shape { sides: 4 },
            side: 2.0,
        };
        let up: Shape = tc.convert_value::<Square, Shape>(sq.clone()).unwrap();
        assert_eq!(up, Shape { sides: 4 });

        let up: Shape = tc.convert_value::<Arc<Square>, Shape>(Arc::new(sq)).unwrap();
        assert_eq!(up.sides, 4);

        let down: Square = tc.convert_value::<Shape, Square>(Shape { sides: 4 }).unwrap();
        assert_eq!(down.side, 1.0);
        assert!(tc.convert_value::<Shape, Square>(Shape { sides: 3 }).is_err());
    }

    #[test]
    fn test_names_and_groups() {
        let tc = TypeConversions::create_shared();
        assert_eq!(tc.type_by_name("i32"), Some(TypeInfo::of::<i32>()));
        tc.register_alias::<i32>("int");
        assert_eq!(tc.type_by_name("int"), Some(TypeInfo::of::<i32>()));

        tc.register_type_group("integer", &["i8", "i16", "int", "missing"]);
        assert_eq!(tc.group_members("integer").len(), 3);
        assert!(tc.is_in_group("integer", &TypeInfo::of::<i32>()));
        assert!(!tc.is_in_group("integer", &TypeInfo::of::<f32>()));
        assert!(tc.group_members("nope").is_empty());
    }

    #[test]
    fn test_convert_boxed() {
        let tc = TypeConversions::new();
        tc.add_into::<i32, i64>().unwrap();
        let b = crate::boxed::var(9i32);
        let out = tc.convert_boxed(&b, &TypeInfo::of::<i64>()).unwrap();
        assert_eq!(out.try_cast::<i64>(), Some(9));
    }
}
