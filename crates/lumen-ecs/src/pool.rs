use std::any::Any;

use tracing::debug;

use crate::component::Component;
use crate::entity::Entity;
use crate::error::EcsError;

/// Type-erased component pool interface.
pub(crate) trait ComponentStorage: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// The name the component type was registered with.
    fn name(&self) -> &'static str;
    fn remove(&mut self, entity: Entity) -> Result<(), EcsError>;
    fn has(&self, entity: Entity) -> bool;
    /// Number of live components. Soft-removed slots are not counted.
    fn len(&self) -> usize;
    /// Number of occupied storage slots, including soft-removed ones.
    fn slot_count(&self) -> usize;
    /// Owners of every live slot, in slot order. Soft-removed slots are left out.
    fn owners(&self) -> Vec<Entity>;
    /// Switch into soft-remove mode for the duration of an iteration.
    fn begin_iteration(&mut self) -> Result<(), EcsError>;
    /// Leave soft-remove mode and compact every slot removed meanwhile.
    fn end_iteration(&mut self) -> Result<(), EcsError>;
}

/// Dense storage for a single component type.
///
/// Components live in one contiguous `Vec` with no holes, so removal normally
/// swaps the last slot into the freed one. While an iteration is in progress
/// removals only null the slot's owner and queue the slot, so the order seen by
/// in-flight iterators never changes. The queued slots are compacted when the
/// iteration ends.
///
/// References handed out are not stable across inserts or removals.
pub(crate) struct ComponentPool<T> {
    name: &'static str,
    /// Owner and value for each slot.
    slots: Vec<(Entity, T)>,
    /// Maps entity index → slot. `None` means the entity has no component.
    sparse: Vec<Option<usize>>,
    soft_remove: bool,
    /// Slots soft-removed during the current iteration.
    pending: Vec<usize>,
    /// World-wide value for this type, independent of any entity.
    global: Option<T>,
}

impl<T: Component> ComponentPool<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Vec::new(),
            sparse: Vec::new(),
            soft_remove: false,
            pending: Vec::new(),
            global: None,
        }
    }

    fn slot_of(&self, entity: Entity) -> Option<usize> {
        let slot = (*self.sparse.get(entity.index() as usize)?)?;
        (self.slots[slot].0 == entity).then_some(slot)
    }

    /// Insert or replace the component for an entity.
    pub fn insert(&mut self, entity: Entity, value: T) -> &mut T {
        if let Some(slot) = self.slot_of(entity) {
            let component = &mut self.slots[slot].1;
            *component = value;
            return component;
        }

        assert!(!entity.is_null(), "cannot attach {} to the null entity", self.name);
        let idx = entity.index() as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, None);
        }
        assert!(
            self.sparse[idx].is_none(),
            "{} pool maps index {idx} to a slot owned by another generation",
            self.name
        );

        let slot = self.slots.len();
        self.slots.push((entity, value));
        self.sparse[idx] = Some(slot);
        &mut self.slots[slot].1
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.slot_of(entity).map(|slot| &self.slots[slot].1)
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slot_of(entity).map(|slot| &mut self.slots[slot].1)
    }

    pub fn global(&self) -> Option<&T> {
        self.global.as_ref()
    }

    pub fn global_mut(&mut self) -> Option<&mut T> {
        self.global.as_mut()
    }

    pub fn set_global(&mut self, value: T) -> &mut T {
        self.global.insert(value)
    }

    pub fn take_global(&mut self) -> Option<T> {
        self.global.take()
    }

    /// Swap the last slot into `slot` and shrink by one.
    fn hard_remove(&mut self, slot: usize) {
        self.slots.swap_remove(slot);
        if let Some((moved, _)) = self.slots.get(slot) {
            assert!(
                !moved.is_null(),
                "{} pool moved a soft-removed slot during compaction",
                self.name
            );
            self.sparse[moved.index() as usize] = Some(slot);
        }
    }
}

impl<T: Component> ComponentStorage for ComponentPool<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn remove(&mut self, entity: Entity) -> Result<(), EcsError> {
        let Some(slot) = self.slot_of(entity) else {
            return Err(EcsError::MissingComponent {
                entity,
                component: self.name,
            });
        };
        self.sparse[entity.index() as usize] = None;

        if self.soft_remove {
            self.slots[slot].0 = Entity::NULL;
            self.pending.push(slot);
        } else {
            self.hard_remove(slot);
        }
        Ok(())
    }

    fn has(&self, entity: Entity) -> bool {
        self.slot_of(entity).is_some()
    }

    fn len(&self) -> usize {
        self.slots.len() - self.pending.len()
    }

    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn owners(&self) -> Vec<Entity> {
        self.slots
            .iter()
            .map(|(entity, _)| *entity)
            .filter(|entity| !entity.is_null())
            .collect()
    }

    fn begin_iteration(&mut self) -> Result<(), EcsError> {
        if self.soft_remove {
            return Err(EcsError::IterationInProgress(self.name));
        }
        self.soft_remove = true;
        Ok(())
    }

    fn end_iteration(&mut self) -> Result<(), EcsError> {
        if !self.soft_remove {
            return Err(EcsError::NotIterating(self.name));
        }

        let mut pending = std::mem::take(&mut self.pending);
        // Highest slot first: every swap then pulls a live slot into the hole.
        pending.sort_unstable_by(|a, b| b.cmp(a));
        let compacted = pending.len();
        for slot in pending.drain(..) {
            self.hard_remove(slot);
        }
        self.pending = pending;
        self.soft_remove = false;

        if compacted > 0 {
            debug!(pool = self.name, compacted, "compacted soft-removed components");
        }
        Ok(())
    }
}
