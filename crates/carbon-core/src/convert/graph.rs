//! Conversion graph and shortest-path search
//!
//! Nodes are exact [`TypeInfo`]s, edges are erased conversion functions.
//! [`shortest_path`] is a plain breadth-first search over a borrowed graph;
//! memoization lives one level up in [`TypeConversions`](super::TypeConversions).

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use carbon_types::TypeInfo;

use super::ConversionError;
use crate::any::ValueAny;

/// Erased conversion function
pub type ConvertFn = Arc<dyn Fn(ValueAny) -> Result<ValueAny, ConversionError> + Send + Sync>;

/// One directed edge of the graph
#[derive(Clone)]
pub struct Conversion {
    /// Source identity
    pub from: TypeInfo,
    /// Target identity
    pub to: TypeInfo,
    /// Converter applied to payloads of the source identity
    pub func: ConvertFn,
}

impl Conversion {
    /// Apply the converter
    pub fn apply(&self, value: ValueAny) -> Result<ValueAny, ConversionError> {
        (self.func)(value)
    }
}

impl std::fmt::Debug for Conversion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Conversion({} -> {})", self.from, self.to)
    }
}

/// Directed adjacency structure over type identities
#[derive(Default, Clone)]
pub struct ConversionGraph {
    edges: FxHashMap<TypeInfo, Vec<Conversion>>,
    count: usize,
}

impl ConversionGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an edge; a later edge with the same endpoints replaces the earlier one.
    ///
    /// Self-loops are rejected.
    pub fn insert(&mut self, conversion: Conversion) -> Result<(), ConversionError> {
        if conversion.from == conversion.to {
            return Err(ConversionError::InvalidArgument(format!(
                "conversion from {} to itself",
                conversion.from
            )));
        }
        let out = self.edges.entry(conversion.from).or_default();
        match out.iter_mut().find(|c| c.to == conversion.to) {
            Some(existing) => *existing = conversion,
            None => {
                out.push(conversion);
                self.count += 1;
            }
        }
        Ok(())
    }

    /// Outgoing edges of `from`, in registration order
    pub fn outgoing(&self, from: &TypeInfo) -> &[Conversion] {
        self.edges.get(from).map_or(&[], Vec::as_slice)
    }

    /// Edge between two adjacent nodes
    pub fn edge(&self, from: &TypeInfo, to: &TypeInfo) -> Option<&Conversion> {
        self.outgoing(from).iter().find(|c| c.to == *to)
    }

    /// Check for a direct edge
    pub fn has_edge(&self, from: &TypeInfo, to: &TypeInfo) -> bool {
        self.edge(from, to).is_some()
    }

    /// Number of edges
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check for an edgeless graph
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Breadth-first search for the shortest path from `from` to `to`.
///
/// The returned path includes both endpoints. Among paths of equal length the
/// first one discovered wins, which follows edge registration order.
pub fn shortest_path(graph: &ConversionGraph, from: &TypeInfo, to: &TypeInfo) -> Option<Vec<TypeInfo>> {
    if from == to {
        return Some(vec![*from]);
    }

    let mut visited = FxHashSet::default();
    let mut parent: FxHashMap<TypeInfo, TypeInfo> = FxHashMap::default();
    let mut queue = VecDeque::new();

    visited.insert(*from);
    queue.push_back(*from);

    while let Some(node) = queue.pop_front() {
        for edge in graph.outgoing(&node) {
            if !visited.insert(edge.to) {
                continue;
            }
            parent.insert(edge.to, node);
            if edge.to == *to {
                return Some(unwind(&parent, from, to));
            }
            queue.push_back(edge.to);
        }
    }
    None
}

fn unwind(parent: &FxHashMap<TypeInfo, TypeInfo>, from: &TypeInfo, to: &TypeInfo) -> Vec<TypeInfo> {
    let mut path = vec![*to];
    let mut cur = *to;
    while cur != *from {
        match parent.get(&cur) {
            Some(prev) => {
                path.push(*prev);
                cur = *prev;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge<A: crate::any::Boxable, B: crate::any::Boxable>() -> Conversion {
        Conversion {
            from: TypeInfo::of::<A>(),
            to: TypeInfo::of::<B>(),
            func: Arc::new(|v: ValueAny| Ok::<_, ConversionError>(v)),
        }
    }

    #[test]
    fn test_rejects_self_loop() {
        let mut g = ConversionGraph::new();
        assert!(matches!(
            g.insert(edge::<i32, i32>()),
            Err(ConversionError::InvalidArgument(_))
        ));
        assert!(g.is_empty());
    }

    #[test]
    fn test_replaces_duplicate_edge() {
        let mut g = ConversionGraph::new();
        g.insert(edge::<i32, i64>()).unwrap();
        g.insert(edge::<i32, i64>()).unwrap();
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_multi_hop() {
        let mut g = ConversionGraph::new();
        g.insert(edge::<u8, u16>()).unwrap();
        g.insert(edge::<u16, u32>()).unwrap();
        let path = shortest_path(&g, &TypeInfo::of::<u8>(), &TypeInfo::of::<u32>()).unwrap();
        assert_eq!(
            path,
            vec![TypeInfo::of::<u8>(), TypeInfo::of::<u16>(), TypeInfo::of::<u32>()]
        );
        assert!(shortest_path(&g, &TypeInfo::of::<u32>(), &TypeInfo::of::<u8>()).is_none());
    }

    #[test]
    fn test_prefers_shorter_and_first_discovered() {
        let mut g = ConversionGraph::new();
        g.insert(edge::<u8, u16>()).unwrap();
        g.insert(edge::<u8, i16>()).unwrap();
        g.insert(edge::<u16, u64>()).unwrap();
        g.insert(edge::<i16, u64>()).unwrap();
        let path = shortest_path(&g, &TypeInfo::of::<u8>(), &TypeInfo::of::<u64>()).unwrap();
        assert_eq!(path[1], TypeInfo::of::<u16>());

        g.insert(edge::<u8, u64>()).unwrap();
        let path = shortest_path(&g, &TypeInfo::of::<u8>(), &TypeInfo::of::<u64>()).unwrap();
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut g = ConversionGraph::new();
        g.insert(edge::<u8, u16>()).unwrap();
        g.insert(edge::<u16, u8>()).unwrap();
        assert!(shortest_path(&g, &TypeInfo::of::<u8>(), &TypeInfo::of::<String>()).is_none());
    }
}
