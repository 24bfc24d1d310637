use std::collections::VecDeque;

use crate::component::{ComponentId, ComponentMask};
use crate::entity::Entity;
use crate::error::EcsError;

/// Default number of destroyed entities that must queue up before an index is reused.
pub const RECYCLE_ENTITY_COUNT: usize = 2048;

/// Allocates and recycles entity indices and tracks which components each entity holds.
///
/// Index 0 is reserved for [`Entity::NULL`]. Freed indices wait in a FIFO queue
/// and are only handed out again once the queue holds `recycle_threshold`
/// entries, which keeps the 16-bit generation from wrapping onto handles that
/// are still held somewhere.
pub(crate) struct EntityDirectory {
    generations: Vec<u16>,
    masks: Vec<ComponentMask>,
    free: VecDeque<u64>,
    recycle_threshold: usize,
    live: usize,
}

impl EntityDirectory {
    pub fn new(recycle_threshold: usize) -> Self {
        Self {
            generations: vec![0],
            masks: vec![ComponentMask::EMPTY],
            free: VecDeque::new(),
            recycle_threshold,
            live: 0,
        }
    }

    /// Allocate a new entity, reusing the oldest freed index once enough have queued up.
    pub fn allocate(&mut self) -> Entity {
        self.live += 1;

        let recycled = if self.free.len() >= self.recycle_threshold {
            self.free.pop_front()
        } else {
            None
        };

        if let Some(index) = recycled {
            let idx = index as usize;
            assert!(
                self.masks[idx].is_empty(),
                "entity index {index} was freed with components still attached"
            );
            // Generation was bumped when the previous holder was destroyed.
            return Entity::new(index, self.generations[idx]);
        }

        let index = self.generations.len() as u64;
        self.generations.push(0);
        self.masks.push(ComponentMask::EMPTY);
        Entity::new(index, 0)
    }

    /// Invalidate an entity and queue its index for reuse.
    ///
    /// The caller must already have removed the entity's components from their pools.
    pub fn release(&mut self, entity: Entity) -> Result<(), EcsError> {
        if !self.valid(entity) {
            return Err(EcsError::InvalidEntity(entity));
        }
        let idx = entity.index() as usize;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.masks[idx] = ComponentMask::EMPTY;
        self.free.push_back(entity.index());
        self.live -= 1;
        Ok(())
    }

    /// Check that the entity's generation matches the one stored for its index.
    pub fn valid(&self, entity: Entity) -> bool {
        !entity.is_null()
            && self.generations.get(entity.index() as usize) == Some(&entity.generation())
    }

    /// The presence mask of a valid entity.
    pub fn mask(&self, entity: Entity) -> Option<ComponentMask> {
        self.valid(entity)
            .then(|| self.masks[entity.index() as usize])
    }

    pub fn set_present(&mut self, entity: Entity, id: ComponentId, present: bool) {
        assert!(self.valid(entity), "presence update for invalid entity {entity}");
        let mask = &mut self.masks[entity.index() as usize];
        if present {
            mask.insert(id);
        } else {
            mask.remove(id);
        }
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
