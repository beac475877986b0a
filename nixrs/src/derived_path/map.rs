use std::collections::BTreeMap;

use super::OutputName;
use crate::store_path::StorePath;

/// Maps a (possibly dynamically-derived) derivation path to a value, where the
/// path to a dynamic derivation is itself an output of another entry in the
/// map. Mirrors the recursive shape of `SingleDerivedPath`: a child node may
/// either carry a value directly (for a plain `StorePath` key) or hold a
/// further map keyed by output name (for a `Built { drv_path, output }` key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildNode<V> {
    pub value: Option<V>,
    pub child_map: BTreeMap<OutputName, ChildNode<V>>,
}

impl<V> Default for ChildNode<V> {
    fn default() -> Self {
        ChildNode {
            value: None,
            child_map: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedPathMap<V> {
    map: BTreeMap<StorePath, ChildNode<V>>,
}

impl<V> Default for DerivedPathMap<V> {
    fn default() -> Self {
        DerivedPathMap {
            map: BTreeMap::new(),
        }
    }
}

impl<V> DerivedPathMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn root_map(&self) -> &BTreeMap<StorePath, ChildNode<V>> {
        &self.map
    }

    /// Finds (or inserts a default) node for the given chain of outputs
    /// rooted at `path`.
    pub fn ensure_node_mut(&mut self, path: &StorePath, outputs: &[OutputName]) -> &mut ChildNode<V>
    where
        V: Default,
    {
        let mut node = self.map.entry(path.clone()).or_default();
        for output in outputs {
            node = node.child_map.entry(output.clone()).or_default();
        }
        node
    }

    pub fn node(&self, path: &StorePath, outputs: &[OutputName]) -> Option<&ChildNode<V>> {
        let mut node = self.map.get(path)?;
        for output in outputs {
            node = node.child_map.get(output)?;
        }
        Some(node)
    }
}

#[cfg(test)]
mod unittests {
    use super::*;
    use crate::store_path::StorePath;

    fn store_path(name: &str) -> StorePath {
        format!("00000000000000000000000000000000-{name}")
            .parse()
            .unwrap()
    }

    #[test]
    fn insert_and_lookup_root_value() {
        let mut map: DerivedPathMap<u32> = DerivedPathMap::new();
        let path = store_path("foo.drv");
        map.ensure_node_mut(&path, &[]).value = Some(42);
        assert_eq!(map.node(&path, &[]).and_then(|n| n.value), Some(42));
    }

    #[test]
    fn insert_and_lookup_nested_output() {
        let mut map: DerivedPathMap<u32> = DerivedPathMap::new();
        let path = store_path("foo.drv");
        let out: OutputName = "out".parse().unwrap();
        map.ensure_node_mut(&path, std::slice::from_ref(&out)).value = Some(7);
        assert_eq!(
            map.node(&path, std::slice::from_ref(&out))
                .and_then(|n| n.value),
            Some(7)
        );
        assert!(map.node(&path, &[]).is_some());
    }
}
