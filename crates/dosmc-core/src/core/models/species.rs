use super::ids::SpeciesId;
use std::collections::HashMap;

/// Maps species names to dense [`SpeciesId`]s in registration order.
///
/// The registry is an explicit value owned by whoever builds a system, so independent
/// systems (for example replicas) never share a naming table by accident.
#[derive(Debug, Clone, Default)]
pub struct SpeciesRegistry {
    names: Vec<String>,
    lookup: HashMap<String, SpeciesId>,
}

impl SpeciesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name`, returning its existing id if it is already known.
    pub fn register(&mut self, name: &str) -> SpeciesId {
        if let Some(&id) = self.lookup.get(name) {
            return id;
        }
        let id = SpeciesId(self.names.len());
        self.names.push(name.to_string());
        self.lookup.insert(name.to_string(), id);
        id
    }

    pub fn id(&self, name: &str) -> Option<SpeciesId> {
        self.lookup.get(name).copied()
    }

    pub fn name(&self, id: SpeciesId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SpeciesId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (SpeciesId(i), name.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_assigns_dense_ids_in_order() {
        let mut registry = SpeciesRegistry::new();
        assert_eq!(registry.register("A"), SpeciesId(0));
        assert_eq!(registry.register("B"), SpeciesId(1));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn register_is_idempotent_for_known_names() {
        let mut registry = SpeciesRegistry::new();
        let first = registry.register("LJ");
        let second = registry.register("LJ");
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_by_name_and_id_round_trips() {
        let mut registry = SpeciesRegistry::new();
        registry.register("A");
        let b = registry.register("B");
        assert_eq!(registry.id("B"), Some(b));
        assert_eq!(registry.name(b), Some("B"));
        assert_eq!(registry.id("C"), None);
        assert_eq!(registry.name(SpeciesId(7)), None);
    }
}
