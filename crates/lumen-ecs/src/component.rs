use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;

use crate::error::EcsError;

/// Marker trait for types that can be stored as ECS components.
pub trait Component: 'static + Send + Sync {}

/// Blanket implementation: any `'static + Send + Sync` type is a valid component.
impl<T: 'static + Send + Sync> Component for T {}

/// Maximum number of component types a world can register.
pub const MAX_COMPONENTS: usize = 64;

/// Dense id assigned to a component type when it is registered, in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u8);

impl ComponentId {
    pub(crate) fn new(index: usize) -> Self {
        assert!(index < MAX_COMPONENTS, "component id {index} out of range");
        Self(index as u8)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a presence mask is tested against a query mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskMatch {
    /// The entity holds at least one of the queried types.
    Any,
    /// The entity holds every queried type.
    All,
}

/// A set of component ids, one bit per registered type.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ComponentMask(u64);

impl ComponentMask {
    pub const EMPTY: ComponentMask = ComponentMask(0);

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn with(self, id: ComponentId) -> Self {
        Self(self.0 | (1 << id.0))
    }

    pub fn insert(&mut self, id: ComponentId) {
        self.0 |= 1 << id.0;
    }

    pub fn remove(&mut self, id: ComponentId) {
        self.0 &= !(1 << id.0);
    }

    pub fn contains(self, id: ComponentId) -> bool {
        self.0 & (1 << id.0) != 0
    }

    pub fn contains_all(self, other: ComponentMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: ComponentMask) -> bool {
        self.0 & other.0 != 0
    }

    /// Test this presence mask against `query` using the given policy.
    pub fn matches(self, query: ComponentMask, policy: MaskMatch) -> bool {
        match policy {
            MaskMatch::Any => self.intersects(query),
            MaskMatch::All => self.contains_all(query),
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Ids in this mask, in ascending order.
    pub fn iter(self) -> impl Iterator<Item = ComponentId> {
        (0..MAX_COMPONENTS as u8)
            .filter(move |bit| self.0 & (1 << bit) != 0)
            .map(ComponentId)
    }
}

impl fmt::Debug for ComponentMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentMask({:#b})", self.0)
    }
}

/// Maps component types to their ids and registered names.
#[derive(Default)]
pub(crate) struct ComponentRegistry {
    ids: HashMap<TypeId, ComponentId>,
    names: Vec<&'static str>,
}

impl ComponentRegistry {
    pub fn register<T: Component>(&mut self, name: &'static str) -> Result<ComponentId, EcsError> {
        if self.ids.contains_key(&TypeId::of::<T>()) {
            return Err(EcsError::DuplicateComponent(type_name::<T>()));
        }
        if self.names.len() >= MAX_COMPONENTS {
            return Err(EcsError::TooManyComponents { max: MAX_COMPONENTS });
        }
        let id = ComponentId::new(self.names.len());
        self.ids.insert(TypeId::of::<T>(), id);
        self.names.push(name);
        Ok(id)
    }

    pub fn id_of<T: Component>(&self) -> Result<ComponentId, EcsError> {
        self.ids
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or(EcsError::Unregistered(type_name::<T>()))
    }

    pub fn name(&self, id: ComponentId) -> &'static str {
        self.names[id.index()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Mask containing every registered id.
    pub fn all(&self) -> ComponentMask {
        (0..self.names.len())
            .map(ComponentId::new)
            .fold(ComponentMask::EMPTY, ComponentMask::with)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    struct Velocity;

    #[test]
    fn mask_set_operations() {
        let a = ComponentId::new(0);
        let b = ComponentId::new(5);
        let c = ComponentId::new(63);

        let mut mask = ComponentMask::EMPTY.with(a).with(c);
        assert!(mask.contains(a));
        assert!(!mask.contains(b));
        assert_eq!(mask.len(), 2);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![a, c]);

        mask.remove(a);
        mask.insert(b);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![b, c]);
    }

    #[test]
    fn mask_matching_policies() {
        let a = ComponentId::new(1);
        let b = ComponentId::new(2);
        let entity = ComponentMask::EMPTY.with(a);
        let query = ComponentMask::EMPTY.with(a).with(b);

        assert!(entity.matches(query, MaskMatch::Any));
        assert!(!entity.matches(query, MaskMatch::All));
        assert!(entity.with(b).matches(query, MaskMatch::All));
        assert!(!ComponentMask::EMPTY.matches(query, MaskMatch::Any));
    }

    #[test]
    fn registry_assigns_ids_in_order() {
        let mut registry = ComponentRegistry::default();
        let pos = registry.register::<Position>("position").unwrap();
        let vel = registry.register::<Velocity>("velocity").unwrap();
        assert_eq!(pos.index(), 0);
        assert_eq!(vel.index(), 1);
        assert_eq!(registry.name(vel), "velocity");
        assert_eq!(registry.id_of::<Velocity>().unwrap(), vel);
        assert_eq!(registry.all().len(), 2);
    }

    #[test]
    fn registry_rejects_duplicates_and_unknown_types() {
        let mut registry = ComponentRegistry::default();
        registry.register::<Position>("position").unwrap();
        assert!(matches!(
            registry.register::<Position>("again"),
            Err(EcsError::DuplicateComponent(_))
        ));
        assert!(matches!(
            registry.id_of::<Velocity>(),
            Err(EcsError::Unregistered(_))
        ));
    }
}
