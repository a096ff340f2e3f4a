use std::collections::HashMap;
use std::sync::Arc;

use carbon_types::{reflect_class, reflect_enum, TypeFlags, TypeInfo};

#[derive(Clone)]
struct Widget;
#[derive(Clone, Copy)]
enum Mode {
    _On,
}
reflect_class!(Widget);
reflect_enum!(Mode);

// ============================================================================
// Identity
// ============================================================================

#[test]
fn test_equal_per_type() {
    assert_eq!(TypeInfo::of::<Widget>(), TypeInfo::of::<Widget>());
    assert_eq!(TypeInfo::of::<Vec<u8>>(), TypeInfo::of::<Vec<u8>>());
    assert_ne!(TypeInfo::of::<Vec<u8>>(), TypeInfo::of::<Vec<i8>>());
    assert_ne!(TypeInfo::of::<Widget>(), TypeInfo::of::<Mode>());
}

#[test]
fn test_bare_equal_with_const_reference() {
    let plain = TypeInfo::of::<Widget>();
    let const_ref = TypeInfo::of::<&'static Widget>();
    assert!(plain.bare_equal(&const_ref));
    assert!(const_ref.is_const());
    assert!(const_ref.is_reference());
    assert_ne!(plain, const_ref);

    let shared = TypeInfo::of::<Arc<Widget>>();
    assert!(plain.bare_equal(&shared));
    assert!(shared.is_pointer());
}

#[test]
fn test_usable_as_map_key() {
    let mut map = HashMap::new();
    map.insert(TypeInfo::of::<i32>(), "int");
    map.insert(TypeInfo::const_of::<i32>(), "const int");
    map.insert(TypeInfo::of::<&'static i32>(), "ref int");
    assert_eq!(map.len(), 3);
    assert_eq!(map[&TypeInfo::of::<i32>()], "int");
}

// ============================================================================
// Names and flags
// ============================================================================

#[test]
fn test_names() {
    assert_eq!(TypeInfo::of::<Widget>().short_name(), "Widget");
    assert_eq!(TypeInfo::of::<Arc<Widget>>().bare_short_name(), "Widget");
    assert_eq!(TypeInfo::of::<HashMap<String, i32>>().short_name(), "HashMap<String, i32>");
    assert_eq!(TypeInfo::default().name(), "undefined");
    assert_eq!(TypeInfo::default().bare_name(), "undefined");
}

#[test]
fn test_category_flags() {
    assert!(TypeInfo::of::<Widget>().is_class());
    assert!(TypeInfo::of::<Mode>().is_enum());
    assert!(TypeInfo::of::<u64>().is_arithmetic());
    assert!(TypeInfo::of::<()>().is_void());
    assert!(TypeInfo::of::<[f32; 3]>().is_array());
    assert!(TypeInfo::of::<fn() -> ()>().is_function());
    assert!(TypeInfo::of::<*mut Widget>().flags().contains(TypeFlags::POINTER));
    assert!(TypeInfo::default().is_undefined());
}
