//! Block-state and biome registry interface used by the storage bridge.
//!
//! The per-version id tables themselves are external data; this module only
//! defines the lookup seam and an in-memory implementation that can be
//! filled by hand or from a JSON table.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::WorldError;

/// A block state as it appears in a chunk palette: a namespaced name plus
/// optional string properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockState {
    pub name: String,
    pub properties: IndexMap<String, String>,
}

impl BlockState {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: IndexMap::new(),
        }
    }

    pub fn with_properties<I, K, V>(name: impl Into<String>, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Canonical lookup key: name plus sorted properties.
    fn key(&self) -> String {
        let mut props: Vec<(&str, &str)> = self
            .properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        props.sort_unstable();
        let mut key = self.name.clone();
        for (k, v) in props {
            key.push('|');
            key.push_str(k);
            key.push('=');
            key.push_str(v);
        }
        key
    }
}

/// Maps between global ids and definitions, both for block states and for
/// biomes.
pub trait StateRegistry {
    fn block_id(&self, state: &BlockState) -> Option<u32>;
    fn block_state(&self, id: u32) -> Option<&BlockState>;
    fn biome_id(&self, name: &str) -> Option<u32>;
    fn biome_name(&self, id: u32) -> Option<&str>;
}

/// Simple in-memory registry.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    states: Vec<BlockState>,
    state_index: HashMap<String, u32>,
    biomes: Vec<String>,
    biome_index: HashMap<String, u32>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a block state; re-registering returns the existing id.
    pub fn register_block(&mut self, state: BlockState) -> u32 {
        let key = state.key();
        if let Some(&id) = self.state_index.get(&key) {
            return id;
        }
        let id = self.states.len() as u32;
        self.state_index.insert(key, id);
        self.states.push(state);
        id
    }

    pub fn register_biome(&mut self, name: impl Into<String>) -> u32 {
        let name = name.into();
        if let Some(&id) = self.biome_index.get(&name) {
            return id;
        }
        let id = self.biomes.len() as u32;
        self.biome_index.insert(name.clone(), id);
        self.biomes.push(name);
        id
    }

    /// Load property-free block states from a JSON table of name -> id.
    /// Ids must be dense starting at zero.
    pub fn from_block_table(doc: &str) -> Result<Self, WorldError> {
        let table: HashMap<String, u32> = serde_json::from_str(doc)
            .map_err(|e| WorldError::FileFormat(format!("block table: {e}")))?;
        let mut ordered: Vec<(u32, String)> =
            table.into_iter().map(|(name, id)| (id, name)).collect();
        ordered.sort_unstable();

        let mut registry = Self::new();
        for (expected, (id, name)) in ordered.into_iter().enumerate() {
            if id as usize != expected {
                return Err(WorldError::FileFormat(format!(
                    "block table ids are not dense at {id}"
                )));
            }
            registry.register_block(BlockState::simple(name));
        }
        Ok(registry)
    }
}

impl StateRegistry for MemoryRegistry {
    fn block_id(&self, state: &BlockState) -> Option<u32> {
        self.state_index.get(&state.key()).copied()
    }

    fn block_state(&self, id: u32) -> Option<&BlockState> {
        self.states.get(id as usize)
    }

    fn biome_id(&self, name: &str) -> Option<u32> {
        self.biome_index.get(name).copied()
    }

    fn biome_name(&self, id: u32) -> Option<&str> {
        self.biomes.get(id as usize).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut reg = MemoryRegistry::new();
        let air = reg.register_block(BlockState::simple("minecraft:air"));
        let stone = reg.register_block(BlockState::simple("minecraft:stone"));
        assert_eq!(air, 0);
        assert_eq!(stone, 1);
        assert_eq!(reg.block_id(&BlockState::simple("minecraft:stone")), Some(1));
        assert_eq!(reg.block_state(0).unwrap().name, "minecraft:air");
        assert_eq!(reg.block_state(9), None);
    }

    #[test]
    fn properties_distinguish_states() {
        let mut reg = MemoryRegistry::new();
        reg.register_block(BlockState::simple("minecraft:air"));
        let north = reg.register_block(BlockState::with_properties(
            "minecraft:oak_stairs",
            [("facing", "north")],
        ));
        let south = reg.register_block(BlockState::with_properties(
            "minecraft:oak_stairs",
            [("facing", "south")],
        ));
        assert_ne!(north, south);
        // Property order does not matter for identity.
        let a = BlockState::with_properties("x", [("a", "1"), ("b", "2")]);
        let b = BlockState::with_properties("x", [("b", "2"), ("a", "1")]);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn reregistering_is_idempotent() {
        let mut reg = MemoryRegistry::new();
        let first = reg.register_block(BlockState::simple("minecraft:dirt"));
        let second = reg.register_block(BlockState::simple("minecraft:dirt"));
        assert_eq!(first, second);
    }

    #[test]
    fn biome_lookup() {
        let mut reg = MemoryRegistry::new();
        let plains = reg.register_biome("minecraft:plains");
        let desert = reg.register_biome("minecraft:desert");
        assert_eq!(plains, 0);
        assert_eq!(desert, 1);
        assert_eq!(reg.biome_id("minecraft:desert"), Some(1));
        assert_eq!(reg.biome_name(0), Some("minecraft:plains"));
        assert_eq!(reg.biome_name(7), None);
    }

    #[test]
    fn block_table_loading() {
        let reg = MemoryRegistry::from_block_table(
            r#"{"minecraft:air": 0, "minecraft:stone": 1, "minecraft:dirt": 2}"#,
        )
        .unwrap();
        assert_eq!(reg.block_id(&BlockState::simple("minecraft:dirt")), Some(2));

        assert!(MemoryRegistry::from_block_table(r#"{"minecraft:air": 5}"#).is_err());
    }
}
