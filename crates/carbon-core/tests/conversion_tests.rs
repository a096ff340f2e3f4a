use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use carbon_core::{reflect_class, var, ConversionError, TypeConversions, TypeInfo, ValueAny};

#[derive(Clone, Debug, PartialEq)]
struct Celsius(f64);
#[derive(Clone, Debug, PartialEq)]
struct Kelvin(f64);
#[derive(Clone, Debug, PartialEq)]
struct Reading(String);
reflect_class!(Celsius, Kelvin, Reading);

#[derive(Clone, Debug, PartialEq)]
struct Shape {
    sides: u32,
}
#[derive(Clone, Debug, PartialEq)]
struct Square {
    base: Shape,
    side: f64,
}
reflect_class!(Shape, Square);

impl AsRef<Shape> for Square {
    fn as_ref(&self) -> &Shape {
        &self.base
    }
}

impl TryFrom<Shape> for Square {
    type Error = String;

    fn try_from(shape: Shape) -> Result<Self, Self::Error> {
        if shape.sides == 4 {
            Ok(Square { base: shape, side: 1.0 })
        } else {
            Err(format!("{} sides", shape.sides))
        }
    }
}

fn temperature_chain() -> TypeConversions {
    let tc = TypeConversions::new();
    tc.add_conversion::<Celsius, Kelvin, _>(|c| Kelvin(c.0 + 273.15)).unwrap();
    tc.add_conversion::<Kelvin, Reading, _>(|k| Reading(format!("{:.2}K", k.0))).unwrap();
    tc
}

// ============================================================================
// Paths
// ============================================================================

#[test]
fn test_multi_step_conversion() {
    let tc = temperature_chain();
    let path = tc
        .find_path(&TypeInfo::of::<Celsius>(), &TypeInfo::of::<Reading>())
        .unwrap();
    assert_eq!(path.len(), 3);
    assert_eq!(
        tc.convert_value::<Celsius, Reading>(Celsius(0.0)).unwrap(),
        Reading("273.15K".into())
    );
}

#[test]
fn test_identity_and_missing_paths() {
    let tc = temperature_chain();
    assert_eq!(tc.convert_value::<Kelvin, Kelvin>(Kelvin(1.0)).unwrap(), Kelvin(1.0));
    assert!(!tc.can_convert(&TypeInfo::of::<Reading>(), &TypeInfo::of::<Celsius>()));
    assert!(matches!(
        tc.convert_value::<Reading, Celsius>(Reading(String::new())),
        Err(ConversionError::NoConversionPath { .. })
    ));
    assert!(matches!(
        tc.convert_any(ValueAny::new(1u8), &TypeInfo::of::<Kelvin>()),
        Err(ConversionError::SourceTypeNotFound(_))
    ));
}

#[test]
fn test_new_edge_invalidates_cached_miss() {
    let tc = temperature_chain();
    let from = TypeInfo::of::<Reading>();
    let to = TypeInfo::of::<Celsius>();
    assert!(tc.find_path(&from, &to).is_none());
    assert!(tc.cached_paths() > 0);

    tc.add_conversion::<Reading, Celsius, _>(|_| Celsius(0.0)).unwrap();
    assert_eq!(tc.cached_paths(), 0);
    assert_eq!(tc.find_path(&from, &to).map(|p| p.len()), Some(2));
}

#[test]
fn test_const_view_cached_separately() {
    let tc = temperature_chain();
    let plain = TypeInfo::of::<Celsius>();
    let konst = TypeInfo::const_of::<Celsius>();
    let to = TypeInfo::of::<Kelvin>();

    assert!(tc.find_path(&konst, &to).is_none());
    let path = tc.find_path(&plain, &to).unwrap();
    assert_eq!(path[0], plain);
    assert!(tc.find_path(&konst, &to).is_none());

    tc.clear_cache();
    assert_eq!(tc.find_path(&plain, &to).map(|p| p.len()), Some(2));
    assert!(tc.find_path(&konst, &to).is_none());
    assert_eq!(tc.cached_paths(), 2);
}

#[test]
fn test_self_loop_rejected() {
    let tc = TypeConversions::new();
    assert!(matches!(
        tc.add_conversion::<i32, i32, _>(|v| v),
        Err(ConversionError::InvalidArgument(_))
    ));
    assert_eq!(tc.conversion_count(), 0);
}

// ============================================================================
// Class hierarchy
// ============================================================================

#[test]
fn test_upcast_and_downcast() {
    let tc = TypeConversions::new();
    tc.add_base_class_with_downcast::<Shape, Square>().unwrap();

    let square = Square { base: Shape { sides: 4 }, side: 2.0 };
    assert_eq!(tc.convert_value::<Square, Shape>(square.clone()).unwrap(), Shape { sides: 4 });
    assert_eq!(
        tc.convert_value::<Arc<Square>, Shape>(Arc::new(square)).unwrap(),
        Shape { sides: 4 }
    );
    assert!(tc.convert_value::<Shape, Square>(Shape { sides: 4 }).is_ok());
    assert!(matches!(
        tc.convert_value::<Shape, Square>(Shape { sides: 3 }),
        Err(ConversionError::BadConversion { .. })
    ));
}

// ============================================================================
// Containers and names
// ============================================================================

#[test]
fn test_container_conversions() {
    let tc = TypeConversions::new();
    tc.add_vector_conversion::<i32, u8>().unwrap();
    tc.add_map_conversion::<&'static str, i64, String, i32>().unwrap();

    assert_eq!(tc.convert_value::<Vec<i32>, Vec<u8>>(vec![1, 2]).unwrap(), vec![1u8, 2]);
    assert!(tc.convert_value::<Vec<i32>, Vec<u8>>(vec![1, 300]).is_err());

    let map = HashMap::from([("a", 5i64)]);
    let out = tc.convert_value::<HashMap<&'static str, i64>, HashMap<String, i32>>(map).unwrap();
    assert_eq!(out["a"], 5);
}

#[test]
fn test_names_and_groups() {
    let tc = TypeConversions::create_shared();
    tc.register_type::<Celsius>("celsius");
    tc.register_alias::<Celsius>("degC");
    tc.register_type_group("temperature", &["celsius", "i32"]);

    assert_eq!(tc.type_by_name("degC"), Some(TypeInfo::of::<Celsius>()));
    assert_eq!(tc.type_by_name("f64"), Some(TypeInfo::of::<f64>()));
    assert!(tc.is_in_group("temperature", &TypeInfo::of::<i32>()));
    assert!(!tc.is_in_group("temperature", &TypeInfo::of::<f64>()));
    assert_eq!(tc.group_members("temperature").len(), 2);
}

#[test]
fn test_convert_boxed_keeps_value() {
    let tc = temperature_chain();
    let boxed = var(Celsius(10.0));
    let out = tc.convert_boxed(&boxed, &TypeInfo::of::<Kelvin>()).unwrap();
    assert!((out.try_cast::<Kelvin>().unwrap().0 - 283.15).abs() < 1e-9);
    assert_eq!(boxed.try_cast::<Celsius>(), Some(Celsius(10.0)));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_registration_and_lookup() {
    let tc = Arc::new(temperature_chain());
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let tc = Arc::clone(&tc);
            thread::spawn(move || {
                for _ in 0..200 {
                    let r = tc.convert_value::<Celsius, Reading>(Celsius(1.0)).unwrap();
                    assert_eq!(r, Reading("274.15K".into()));
                }
            })
        })
        .collect();
    let writer = {
        let tc = Arc::clone(&tc);
        thread::spawn(move || {
            tc.add_conversion::<Reading, String, _>(|r| r.0).unwrap();
            tc.add_conversion::<Kelvin, f64, _>(|k| k.0).unwrap();
        })
    };
    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(tc.conversion_count(), 4);
}
