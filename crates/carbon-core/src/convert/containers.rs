//! Element-wise container conversions
//!
//! Each helper registers one edge between two instantiations of the same
//! container. The edge builds a fresh container; the first element that fails
//! to convert aborts the whole conversion.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

use super::{ConversionError, TypeConversions};
use crate::any::Boxable;

fn convert_elements<Src, Dst, I, C>(items: I) -> Result<C, String>
where
    Dst: TryFrom<Src>,
    <Dst as TryFrom<Src>>::Error: fmt::Display,
    I: IntoIterator<Item = Src>,
    C: FromIterator<Dst>,
{
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| Dst::try_from(item).map_err(|e| format!("element {i}: {e}")))
        .collect()
}

impl TypeConversions {
    /// Register `Vec<Src> → Vec<Dst>`
    pub fn add_vector_conversion<Src, Dst>(&self) -> Result<(), ConversionError>
    where
        Src: Boxable,
        Dst: Boxable + TryFrom<Src>,
        <Dst as TryFrom<Src>>::Error: fmt::Display,
    {
        self.add_fallible_conversion::<Vec<Src>, Vec<Dst>, _, _>(convert_elements::<Src, Dst, _, _>)
    }

    /// Register `VecDeque<Src> → VecDeque<Dst>`
    pub fn add_sequence_conversion<Src, Dst>(&self) -> Result<(), ConversionError>
    where
        Src: Boxable,
        Dst: Boxable + TryFrom<Src>,
        <Dst as TryFrom<Src>>::Error: fmt::Display,
    {
        self.add_fallible_conversion::<VecDeque<Src>, VecDeque<Dst>, _, _>(
            convert_elements::<Src, Dst, _, _>,
        )
    }

    /// Register `HashSet<Src> → HashSet<Dst>`
    pub fn add_set_conversion<Src, Dst>(&self) -> Result<(), ConversionError>
    where
        Src: Boxable,
        Dst: Boxable + TryFrom<Src> + Eq + Hash,
        <Dst as TryFrom<Src>>::Error: fmt::Display,
    {
        self.add_fallible_conversion::<HashSet<Src>, HashSet<Dst>, _, _>(
            convert_elements::<Src, Dst, _, _>,
        )
    }

    /// Register `HashMap<K1, V1> → HashMap<K2, V2>`.
    ///
    /// Keys convert through `From`, values through `TryFrom`.
    pub fn add_map_conversion<K1, V1, K2, V2>(&self) -> Result<(), ConversionError>
    where
        K1: Boxable,
        V1: Boxable,
        K2: Boxable + From<K1> + Eq + Hash,
        V2: Boxable + TryFrom<V1>,
        <V2 as TryFrom<V1>>::Error: fmt::Display,
    {
        self.add_fallible_conversion::<HashMap<K1, V1>, HashMap<K2, V2>, _, _>(|map| {
            map.into_iter()
                .map(|(k, v)| {
                    let key = K2::from(k);
                    V2::try_from(v)
                        .map(|v| (key, v))
                        .map_err(|e| format!("map value: {e}"))
                })
                .collect::<Result<HashMap<_, _>, String>>()
        })
    }

    /// Register `BTreeMap<K1, V1> → BTreeMap<K2, V2>`
    pub fn add_btree_map_conversion<K1, V1, K2, V2>(&self) -> Result<(), ConversionError>
    where
        K1: Boxable,
        V1: Boxable,
        K2: Boxable + From<K1> + Ord,
        V2: Boxable + TryFrom<V1>,
        <V2 as TryFrom<V1>>::Error: fmt::Display,
    {
        self.add_fallible_conversion::<BTreeMap<K1, V1>, BTreeMap<K2, V2>, _, _>(|map| {
            map.into_iter()
                .map(|(k, v)| {
                    let key = K2::from(k);
                    V2::try_from(v)
                        .map(|v| (key, v))
                        .map_err(|e| format!("map value: {e}"))
                })
                .collect::<Result<BTreeMap<_, _>, String>>()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector() {
        let tc = TypeConversions::new();
        tc.add_vector_conversion::<i32, i64>().unwrap();
        let out: Vec<i64> = tc.convert_value::<Vec<i32>, Vec<i64>>(vec![1, 2, 3]).unwrap();
        assert_eq!(out, vec![1i64, 2, 3]);
    }

    #[test]
    fn test_vector_element_failure_aborts() {
        let tc = TypeConversions::new();
        tc.add_vector_conversion::<i32, u8>().unwrap();
        let err = tc
            .convert_value::<Vec<i32>, Vec<u8>>(vec![1, 2, 999, 4])
            .unwrap_err();
        match err {
            ConversionError::BadConversion { reason, .. } => assert!(reason.contains("element 2")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_sequence_and_set() {
        let tc = TypeConversions::new();
        tc.add_sequence_conversion::<u8, u32>().unwrap();
        tc.add_set_conversion::<u8, u32>().unwrap();

        let deque: VecDeque<u8> = [1u8, 2].into_iter().collect();
        let out: VecDeque<u32> = tc.convert_value::<VecDeque<u8>, VecDeque<u32>>(deque).unwrap();
        assert_eq!(out, VecDeque::from(vec![1u32, 2]));

        let set: HashSet<u8> = [3u8, 4].into_iter().collect();
        let out: HashSet<u32> = tc.convert_value::<HashSet<u8>, HashSet<u32>>(set).unwrap();
        assert!(out.contains(&3) && out.contains(&4));
    }

    #[test]
    fn test_maps() {
        let tc = TypeConversions::new();
        tc.add_map_conversion::<u8, i32, u16, i64>().unwrap();
        tc.add_btree_map_conversion::<u8, i64, u32, u8>().unwrap();

        let map: HashMap<u8, i32> = [(1u8, 10i32)].into_iter().collect();
        let out: HashMap<u16, i64> = tc
            .convert_value::<HashMap<u8, i32>, HashMap<u16, i64>>(map)
            .unwrap();
        assert_eq!(out.get(&1), Some(&10));

        let tree: BTreeMap<u8, i64> = [(1u8, 1i64), (2, -1)].into_iter().collect();
        assert!(tc
            .convert_value::<BTreeMap<u8, i64>, BTreeMap<u32, u8>>(tree)
            .is_err());
    }
}
