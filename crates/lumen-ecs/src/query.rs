use std::iter::FusedIterator;

use crate::component::{Component, ComponentId, ComponentMask};
use crate::entity::Entity;
use crate::error::{Access, EcsError};
use crate::lock::Lock;
use crate::world::World;

/// A tuple of component types, used to name the components a query requires.
pub trait ComponentSet {
    fn mask(world: &World) -> Result<ComponentMask, EcsError>;
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn mask(world: &World) -> Result<ComponentMask, EcsError> {
                Ok(ComponentMask::EMPTY $(.with(world.component_id::<$name>()?))+)
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);

/// Iterator over the entities holding every component of a query mask.
///
/// Takes the owners of the smallest pool in the mask when created and checks
/// each one's presence mask as it is reached, so components removed in the
/// meantime are skipped and components added are not visited. Components may
/// be borrowed freely through the lock while the iterator is alive. A
/// write-held driving pool stays in soft-remove mode until the iterator is
/// dropped.
pub struct EntitiesWith<'l, 'w> {
    lock: &'l Lock<'w>,
    driver: Option<ComponentId>,
    owners: std::vec::IntoIter<Entity>,
    mask: ComponentMask,
    iterating: bool,
}

impl<'l, 'w> EntitiesWith<'l, 'w> {
    pub(crate) fn new(lock: &'l Lock<'w>, mask: ComponentMask) -> Result<Self, EcsError> {
        let mut driver = None;
        let mut smallest = usize::MAX;
        for id in mask.iter() {
            lock.check_id(id, Access::Read)?;
            let len = lock.pool_len(id)?;
            if len < smallest {
                smallest = len;
                driver = Some(id);
            }
        }

        let mut query = Self {
            lock,
            driver,
            owners: Vec::new().into_iter(),
            mask,
            iterating: false,
        };
        let Some(driver) = driver else {
            return Ok(query);
        };

        query.iterating = lock.begin_iteration(driver)?;
        // On error `query` is dropped, which ends the iteration again.
        query.owners = lock.pool_owners(driver)?.into_iter();
        Ok(query)
    }
}

impl Iterator for EntitiesWith<'_, '_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        let (lock, mask) = (self.lock, self.mask);
        self.owners.find(|entity| {
            lock.entity_mask(*entity)
                .is_some_and(|present| present.contains_all(mask))
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.owners.len()))
    }
}

impl FusedIterator for EntitiesWith<'_, '_> {}

impl Drop for EntitiesWith<'_, '_> {
    fn drop(&mut self) {
        if let (true, Some(driver)) = (self.iterating, self.driver) {
            self.lock.finish_iteration(driver);
        }
    }
}
