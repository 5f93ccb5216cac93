use super::world::World;
use crate::core::models::ids::WorldId;
use rand::Rng;

/// Owns every world of one simulation and hands out their identifiers.
///
/// Ids are dense and assigned at registration, so per-world tables (cutoffs, tail
/// corrections) can be indexed directly by `WorldId::index`.
#[derive(Debug, Clone, Default)]
pub struct WorldManager {
    worlds: Vec<World>,
}

impl WorldManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a world and returns the id it was assigned.
    pub fn add_world(&mut self, mut world: World) -> WorldId {
        let id = WorldId(self.worlds.len());
        world.set_id(id);
        self.worlds.push(world);
        id
    }

    pub fn get(&self, id: WorldId) -> Option<&World> {
        self.worlds.get(id.index())
    }

    pub fn get_mut(&mut self, id: WorldId) -> Option<&mut World> {
        self.worlds.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &World> {
        self.worlds.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut World> {
        self.worlds.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }

    /// Uniformly random world, or `None` when no world is registered.
    pub fn draw_random_world<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<WorldId> {
        if self.worlds.is_empty() {
            None
        } else {
            Some(WorldId(rng.gen_range(0..self.worlds.len())))
        }
    }

    /// Total particle count across all worlds.
    pub fn particle_count(&self) -> usize {
        self.worlds.iter().map(World::particle_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::world::geometry::SimulationBox;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn world() -> World {
        World::new(SimulationBox::cubic(10.0).unwrap(), 2.0, 1.0).unwrap()
    }

    #[test]
    fn worlds_receive_dense_ids_at_registration() {
        let mut manager = WorldManager::new();
        let a = manager.add_world(world());
        let b = manager.add_world(world());
        assert_eq!(a, WorldId(0));
        assert_eq!(b, WorldId(1));
        assert_eq!(manager.get(b).unwrap().id(), b);
    }

    #[test]
    fn empty_manager_draws_nothing() {
        let manager = WorldManager::new();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(manager.draw_random_world(&mut rng).is_none());
        assert!(manager.get(WorldId(0)).is_none());
    }

    #[test]
    fn random_world_draw_covers_every_world() {
        let mut manager = WorldManager::new();
        for _ in 0..3 {
            manager.add_world(world());
        }
        let mut rng = StdRng::seed_from_u64(4);
        let mut seen = [false; 3];
        for _ in 0..100 {
            seen[manager.draw_random_world(&mut rng).unwrap().index()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }
}
