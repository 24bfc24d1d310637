//! Transactions: the only way to touch entities and components.
//!
//! A [`Transaction`] declares up front which component types it reads and
//! writes, and whether it may create or destroy entities, attach or detach
//! components, or send events. [`Transaction::begin`] then blocks until every
//! declared pool is free of conflicting holders and returns a [`Lock`].
//!
//! Pool locks are always taken in ascending component id order, after the
//! structural lock when add/remove access is declared, and released in the
//! reverse order. Two transactions can therefore never wait on each other in
//! a cycle. Opening a second, conflicting transaction on the same thread
//! while the first is still alive deadlocks.

use std::any::type_name;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::time::Instant;

use parking_lot::{MutexGuard, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, trace, warn};

use crate::binding::{EventBindings, FocusLayer, FocusLock, SignalBindings, MAX_BINDING_DEPTH};
use crate::component::{Component, ComponentId, ComponentMask, MaskMatch};
use crate::entity::Entity;
use crate::error::{Access, EcsError};
use crate::event::{Event, EventInput, EventQueueRef, SignalOutput};
use crate::pool::{ComponentPool, ComponentStorage};
use crate::query::{ComponentSet, EntitiesWith};
use crate::world::World;

/// The capability set of a transaction. Write access implies read access.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub read: ComponentMask,
    pub write: ComponentMask,
    pub add_remove: bool,
    pub send_events: bool,
}

impl Permissions {
    pub fn can_read(&self, id: ComponentId) -> bool {
        self.read.contains(id)
    }

    pub fn can_write(&self, id: ComponentId) -> bool {
        self.write.contains(id)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "read={:?} write={:?}", self.read, self.write)?;
        if self.add_remove {
            f.write_str(" add_remove")?;
        }
        if self.send_events {
            f.write_str(" send_events")?;
        }
        Ok(())
    }
}

/// Builder for a transaction's capability set.
///
/// ```ignore
/// let lock = world
///     .transaction()
///     .read::<Velocity>()
///     .write::<Position>()
///     .begin()?;
/// ```
#[must_use = "a transaction does nothing until it is begun"]
pub struct Transaction<'w> {
    world: &'w World,
    permissions: Permissions,
    /// First declaration error, reported by `begin`.
    error: Option<EcsError>,
}

impl<'w> Transaction<'w> {
    pub(crate) fn new(world: &'w World) -> Self {
        Self {
            world,
            permissions: Permissions::default(),
            error: None,
        }
    }

    pub fn read<T: Component>(self) -> Self {
        self.declare::<T>(Access::Read)
    }

    pub fn write<T: Component>(self) -> Self {
        self.declare::<T>(Access::Write)
    }

    /// Read every registered component type.
    pub fn read_all(mut self) -> Self {
        self.permissions.read = self.world.registry.all();
        self
    }

    /// Write every registered component type.
    pub fn write_all(mut self) -> Self {
        let all = self.world.registry.all();
        self.permissions.read = all;
        self.permissions.write = all;
        self
    }

    /// Allow creating and destroying entities and attaching or detaching components.
    pub fn add_remove(mut self) -> Self {
        self.permissions.add_remove = true;
        self
    }

    /// Allow sending events. Implies read access to [`EventInput`],
    /// [`EventBindings`] and [`FocusLock`].
    pub fn send_events(mut self) -> Self {
        self.permissions.send_events = true;
        self.declare::<EventInput>(Access::Read)
            .declare::<EventBindings>(Access::Read)
            .declare::<FocusLock>(Access::Read)
    }

    /// Read access to everything [`Lock::signal`] consults: [`SignalOutput`],
    /// [`SignalBindings`] and [`FocusLock`].
    pub fn read_signals(self) -> Self {
        self.declare::<SignalOutput>(Access::Read)
            .declare::<SignalBindings>(Access::Read)
            .declare::<FocusLock>(Access::Read)
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    fn declare<T: Component>(mut self, access: Access) -> Self {
        match self.world.registry.id_of::<T>() {
            Ok(id) => {
                self.permissions.read.insert(id);
                if access == Access::Write {
                    self.permissions.write.insert(id);
                }
            }
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
        self
    }

    /// Block until every declared capability is available.
    pub fn begin(self) -> Result<Lock<'w>, EcsError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(Lock::acquire(self.world, self.permissions, true)
            .expect("blocking acquisition always succeeds"))
    }

    /// Like [`Transaction::begin`], but returns `Ok(None)` instead of blocking
    /// when any declared capability is held by a conflicting transaction.
    pub fn try_begin(self) -> Result<Option<Lock<'w>>, EcsError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(Lock::acquire(self.world, self.permissions, false))
    }

    /// Begin the transaction, run `f` with it, then release it.
    pub fn run<R>(self, f: impl FnOnce(&Lock<'w>) -> Result<R, EcsError>) -> Result<R, EcsError> {
        let lock = self.begin()?;
        let result = f(&lock);
        lock.commit();
        result
    }
}

enum PoolGuard<'w> {
    Read(RwLockReadGuard<'w, Box<dyn ComponentStorage>>),
    Write(RwLockWriteGuard<'w, Box<dyn ComponentStorage>>),
}

impl PoolGuard<'_> {
    fn storage(&self) -> &dyn ComponentStorage {
        match self {
            PoolGuard::Read(guard) => &***guard,
            PoolGuard::Write(guard) => &***guard,
        }
    }

    fn writable(&mut self) -> &mut dyn ComponentStorage {
        match self {
            PoolGuard::Write(guard) => &mut ***guard,
            PoolGuard::Read(guard) => panic!("{} pool is held for reading only", guard.name()),
        }
    }
}

fn typed<T: Component>(storage: &dyn ComponentStorage) -> &ComponentPool<T> {
    storage
        .as_any()
        .downcast_ref()
        .unwrap_or_else(|| panic!("pool type mismatch for {}", type_name::<T>()))
}

fn typed_mut<T: Component>(storage: &mut dyn ComponentStorage) -> &mut ComponentPool<T> {
    storage
        .as_any_mut()
        .downcast_mut()
        .unwrap_or_else(|| panic!("pool type mismatch for {}", type_name::<T>()))
}

/// An active transaction. Every declared pool stays locked until this is dropped.
///
/// All methods take `&self`, so components of different types can be borrowed
/// at the same time. Borrowing the same type mutably twice is reported as
/// [`EcsError::BorrowConflict`]. References returned by [`Lock::get`] and
/// friends must be dropped before adding or removing components of that type.
pub struct Lock<'w> {
    world: &'w World,
    permissions: Permissions,
    /// Indexed by component id. `Some` for every declared type.
    pools: Vec<Option<RefCell<PoolGuard<'w>>>>,
    /// Live queries driving each pool, indexed by component id.
    iterations: RefCell<Vec<u32>>,
    /// Iterations whose end could not be applied because the pool was borrowed.
    unfinished: RefCell<Vec<ComponentId>>,
    structure: Option<MutexGuard<'w, ()>>,
    opened_at: Instant,
    acquired: bool,
}

impl<'w> Lock<'w> {
    fn acquire(world: &'w World, permissions: Permissions, blocking: bool) -> Option<Self> {
        let mut lock = Self {
            world,
            permissions,
            pools: world.pools.iter().map(|_| None).collect(),
            iterations: RefCell::new(vec![0; world.pools.len()]),
            unfinished: RefCell::default(),
            structure: None,
            opened_at: Instant::now(),
            acquired: false,
        };

        if permissions.add_remove {
            let guard = if blocking {
                Some(world.structure.lock())
            } else {
                world.structure.try_lock()
            };
            lock.structure = Some(guard?);
        }

        // Ascending id order. Write access is a subset of read access.
        for id in permissions.read.iter() {
            let pool = &world.pools[id.index()];
            let guard = match (permissions.write.contains(id), blocking) {
                (true, true) => Some(PoolGuard::Write(pool.write())),
                (true, false) => pool.try_write().map(PoolGuard::Write),
                (false, true) => Some(PoolGuard::Read(pool.read())),
                (false, false) => pool.try_read().map(PoolGuard::Read),
            };
            lock.pools[id.index()] = Some(RefCell::new(guard?));
        }

        lock.acquired = true;
        trace!(permissions = %permissions, "transaction opened");
        Some(lock)
    }

    /// Release the transaction. Equivalent to dropping it.
    pub fn commit(self) {}

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    pub fn world(&self) -> &'w World {
        self.world
    }

    fn cell(&self, id: ComponentId) -> &RefCell<PoolGuard<'w>> {
        self.pools[id.index()]
            .as_ref()
            .unwrap_or_else(|| panic!("{} pool was not acquired", self.world.component_name(id)))
    }

    pub(crate) fn pool_len(&self, id: ComponentId) -> Result<usize, EcsError> {
        Ok(self.borrow(id)?.storage().len())
    }

    pub(crate) fn pool_owners(&self, id: ComponentId) -> Result<Vec<Entity>, EcsError> {
        Ok(self.borrow(id)?.storage().owners())
    }

    fn borrow(&self, id: ComponentId) -> Result<Ref<'_, PoolGuard<'w>>, EcsError> {
        self.cell(id)
            .try_borrow()
            .map_err(|_| EcsError::BorrowConflict(self.world.component_name(id)))
    }

    fn borrow_mut(&self, id: ComponentId) -> Result<RefMut<'_, PoolGuard<'w>>, EcsError> {
        self.cell(id)
            .try_borrow_mut()
            .map_err(|_| EcsError::BorrowConflict(self.world.component_name(id)))
    }

    fn check<T: Component>(&self, access: Access) -> Result<ComponentId, EcsError> {
        let id = self.world.component_id::<T>()?;
        self.check_id(id, access)?;
        Ok(id)
    }

    pub(crate) fn check_id(&self, id: ComponentId, access: Access) -> Result<(), EcsError> {
        let granted = match access {
            Access::Read => self.permissions.can_read(id),
            Access::Write => self.permissions.can_write(id),
        };
        if granted {
            Ok(())
        } else {
            Err(EcsError::Undeclared {
                component: self.world.component_name(id),
                access,
            })
        }
    }

    fn require_add_remove(&self) -> Result<(), EcsError> {
        if self.permissions.add_remove {
            Ok(())
        } else {
            Err(EcsError::AddRemoveNotDeclared)
        }
    }

    // --- Entities ---

    pub fn valid(&self, entity: Entity) -> bool {
        self.world.directory.read().valid(entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.world.directory.read().len()
    }

    /// Presence mask of a valid entity. Not restricted by the declared types.
    pub fn entity_mask(&self, entity: Entity) -> Option<ComponentMask> {
        self.world.directory.read().mask(entity)
    }

    /// Test an entity's presence mask against `mask`. Invalid entities never match.
    pub fn entity_matches(&self, entity: Entity, mask: ComponentMask, policy: MaskMatch) -> bool {
        self.entity_mask(entity)
            .is_some_and(|present| present.matches(mask, policy))
    }

    pub fn new_entity(&self) -> Result<Entity, EcsError> {
        self.require_add_remove()?;
        let entity = self.world.directory.write().allocate();
        trace!(entity = %entity, "entity created");
        Ok(entity)
    }

    /// Remove all of an entity's components and invalidate it.
    ///
    /// Requires write access to every component type the entity holds. Nothing
    /// is changed if any of them is undeclared or borrowed.
    pub fn destroy(&self, entity: Entity) -> Result<(), EcsError> {
        self.require_add_remove()?;
        let mask = self
            .entity_mask(entity)
            .ok_or(EcsError::InvalidEntity(entity))?;
        for id in mask.iter() {
            self.check_id(id, Access::Write)?;
        }

        let mut guards = mask
            .iter()
            .map(|id| self.borrow_mut(id))
            .collect::<Result<Vec<_>, _>>()?;
        for guard in &mut guards {
            if let Err(err) = guard.writable().remove(entity) {
                panic!("presence mask out of sync with pools: {err}");
            }
        }
        drop(guards);

        self.world.directory.write().release(entity)?;
        trace!(entity = %entity, "entity destroyed");
        Ok(())
    }

    // --- Components ---

    pub fn has<T: Component>(&self, entity: Entity) -> Result<bool, EcsError> {
        let id = self.check::<T>(Access::Read)?;
        Ok(self.borrow(id)?.storage().has(entity))
    }

    /// Number of entities holding a `T`. Components removed during an
    /// unfinished iteration are not counted.
    pub fn count<T: Component>(&self) -> Result<usize, EcsError> {
        let id = self.check::<T>(Access::Read)?;
        self.pool_len(id)
    }

    /// The entity's `T`, or `None` if it has none.
    pub fn get<T: Component>(&self, entity: Entity) -> Result<Option<Ref<'_, T>>, EcsError> {
        let id = self.check::<T>(Access::Read)?;
        let guard = self.borrow(id)?;
        Ok(Ref::filter_map(guard, |pool| typed::<T>(pool.storage()).get(entity)).ok())
    }

    pub fn get_mut<T: Component>(&self, entity: Entity) -> Result<Option<RefMut<'_, T>>, EcsError> {
        let id = self.check::<T>(Access::Write)?;
        let guard = self.borrow_mut(id)?;
        Ok(RefMut::filter_map(guard, |pool| typed_mut::<T>(pool.writable()).get_mut(entity)).ok())
    }

    /// Assign the entity's `T`, replacing any existing value.
    ///
    /// Replacing needs write access. Attaching a component the entity does not
    /// have yet also needs add/remove access.
    pub fn set<T: Component>(&self, entity: Entity, value: T) -> Result<RefMut<'_, T>, EcsError> {
        let id = self.check::<T>(Access::Write)?;
        let guard = self.borrow_mut(id)?;
        if !guard.storage().has(entity) {
            self.require_add_remove()?;
            let mut directory = self.world.directory.write();
            if !directory.valid(entity) {
                return Err(EcsError::InvalidEntity(entity));
            }
            directory.set_present(entity, id, true);
        }
        Ok(RefMut::map(guard, |pool| typed_mut::<T>(pool.writable()).insert(entity, value)))
    }

    pub fn remove<T: Component>(&self, entity: Entity) -> Result<(), EcsError> {
        let id = self.check::<T>(Access::Write)?;
        self.require_add_remove()?;
        self.borrow_mut(id)?.writable().remove(entity)?;
        self.world.directory.write().set_present(entity, id, false);
        Ok(())
    }

    // --- Queries ---

    /// Entities holding every component in `Q`.
    ///
    /// Only the smallest of the pools involved is walked. Components removed
    /// while the iterator is alive are skipped if not yet visited; components
    /// added meanwhile are not visited.
    pub fn entities_with<Q: ComponentSet>(&self) -> Result<EntitiesWith<'_, 'w>, EcsError> {
        let mask = Q::mask(self.world)?;
        self.entities_with_mask(mask)
    }

    /// Entities holding every component in `mask`.
    pub fn entities_with_mask(&self, mask: ComponentMask) -> Result<EntitiesWith<'_, 'w>, EcsError> {
        EntitiesWith::new(self, mask)
    }

    /// Put a write-held pool into soft-remove mode. Returns whether the
    /// caller must call [`Lock::finish_iteration`] later.
    ///
    /// Queries nest freely: only the outermost one switches the pool's mode.
    pub(crate) fn begin_iteration(&self, id: ComponentId) -> Result<bool, EcsError> {
        if !self.permissions.can_write(id) {
            // Nothing can remove from a read-held pool while we hold it.
            return Ok(false);
        }
        let mut iterations = self.iterations.borrow_mut();
        if iterations[id.index()] == 0 {
            let mut unfinished = self.unfinished.borrow_mut();
            match unfinished.iter().position(|pending| *pending == id) {
                // Still in soft-remove mode from an earlier query.
                Some(pos) => {
                    unfinished.swap_remove(pos);
                }
                None => self.borrow_mut(id)?.writable().begin_iteration()?,
            }
        }
        iterations[id.index()] += 1;
        Ok(true)
    }

    pub(crate) fn finish_iteration(&self, id: ComponentId) {
        let mut iterations = self.iterations.borrow_mut();
        let depth = &mut iterations[id.index()];
        *depth = depth.saturating_sub(1);
        if *depth > 0 {
            return;
        }
        match self.cell(id).try_borrow_mut() {
            Ok(mut guard) => end_iteration(guard.writable()),
            Err(_) => self.unfinished.borrow_mut().push(id),
        }
    }

    // --- Global components ---

    pub fn has_global<T: Component>(&self) -> Result<bool, EcsError> {
        let id = self.check::<T>(Access::Read)?;
        Ok(typed::<T>(self.borrow(id)?.storage()).global().is_some())
    }

    pub fn global<T: Component>(&self) -> Result<Option<Ref<'_, T>>, EcsError> {
        let id = self.check::<T>(Access::Read)?;
        let guard = self.borrow(id)?;
        Ok(Ref::filter_map(guard, |pool| typed::<T>(pool.storage()).global()).ok())
    }

    pub fn global_mut<T: Component>(&self) -> Result<Option<RefMut<'_, T>>, EcsError> {
        let id = self.check::<T>(Access::Write)?;
        let guard = self.borrow_mut(id)?;
        Ok(RefMut::filter_map(guard, |pool| typed_mut::<T>(pool.writable()).global_mut()).ok())
    }

    /// Set the world-wide `T`. Creating it needs add/remove access, replacing it does not.
    pub fn set_global<T: Component>(&self, value: T) -> Result<RefMut<'_, T>, EcsError> {
        let id = self.check::<T>(Access::Write)?;
        let guard = self.borrow_mut(id)?;
        if typed::<T>(guard.storage()).global().is_none() {
            self.require_add_remove()?;
        }
        Ok(RefMut::map(guard, |pool| typed_mut::<T>(pool.writable()).set_global(value)))
    }

    pub fn remove_global<T: Component>(&self) -> Result<T, EcsError> {
        let id = self.check::<T>(Access::Write)?;
        self.require_add_remove()?;
        typed_mut::<T>(self.borrow_mut(id)?.writable())
            .take_global()
            .ok_or(EcsError::MissingGlobal(self.world.component_name(id)))
    }

    // --- Events and signals ---

    /// Send `event` to `target`.
    ///
    /// The event is pushed to every queue the target's [`EventInput`]
    /// registered for its name, then forwarded along the target's
    /// [`EventBindings`] for that name. Bindings restricted to a focus layer
    /// are skipped unless that layer holds the primary focus. Returns the
    /// number of queues reached.
    pub fn send_event(&self, target: Entity, event: Event) -> Result<usize, EcsError> {
        if !self.permissions.send_events {
            return Err(EcsError::SendEventsNotDeclared);
        }
        let sent = self.route_event(target, &event, 0)?;
        trace!(event = %event.name, target = %target, sent, "event sent");
        Ok(sent)
    }

    fn route_event(&self, target: Entity, event: &Event, depth: usize) -> Result<usize, EcsError> {
        if depth > MAX_BINDING_DEPTH {
            warn!(event = %event.name, target = %target, "event binding depth exceeded");
            return Ok(0);
        }
        let mut sent = self
            .get::<EventInput>(target)?
            .map_or(0, |input| input.deliver(event));

        let Some(bindings) = self.get::<EventBindings>(target)? else {
            return Ok(sent);
        };
        for binding in bindings.bindings(&event.name) {
            if !self.in_focus(binding.if_focused)? {
                continue;
            }
            sent += match &binding.dest_name {
                Some(name) => {
                    let renamed = Event {
                        name: name.clone(),
                        ..event.clone()
                    };
                    self.route_event(binding.target, &renamed, depth + 1)?
                }
                None => self.route_event(binding.target, event, depth + 1)?,
            };
        }
        Ok(sent)
    }

    /// Whether a binding gated on `layer` applies. Gated bindings need a [`FocusLock`].
    fn in_focus(&self, layer: Option<FocusLayer>) -> Result<bool, EcsError> {
        let Some(layer) = layer else {
            return Ok(true);
        };
        Ok(self
            .global::<FocusLock>()?
            .is_some_and(|focus| focus.has_primary_focus(layer)))
    }

    /// Take the oldest event from a queue.
    pub fn poll_event(&self, queue: &EventQueueRef) -> Result<Option<Event>, EcsError> {
        self.check::<EventInput>(Access::Read)?;
        Ok(queue.poll())
    }

    /// Read a named signal.
    ///
    /// The entity's own [`SignalOutput`] wins. Otherwise its [`SignalBindings`]
    /// entry for `name` is followed, reading zero while the binding's focus
    /// layer does not hold the primary focus. Missing signals read as zero.
    pub fn signal(&self, entity: Entity, name: &str) -> Result<f64, EcsError> {
        self.resolve_signal(entity, name, 0)
    }

    fn resolve_signal(&self, entity: Entity, name: &str, depth: usize) -> Result<f64, EcsError> {
        if depth > MAX_BINDING_DEPTH {
            warn!(signal = name, entity = %entity, "signal binding depth exceeded");
            return Ok(0.0);
        }
        if let Some(value) = self
            .get::<SignalOutput>(entity)?
            .and_then(|output| output.signal(name))
        {
            return Ok(value);
        }

        let Some(bindings) = self.get::<SignalBindings>(entity)? else {
            return Ok(0.0);
        };
        let Some(binding) = bindings.binding(name) else {
            return Ok(0.0);
        };
        if !self.in_focus(binding.if_focused)? {
            return Ok(0.0);
        }
        self.resolve_signal(binding.source, &binding.signal, depth + 1)
    }
}

fn end_iteration(storage: &mut dyn ComponentStorage) {
    if let Err(err) = storage.end_iteration() {
        error!(pool = storage.name(), %err, "failed to end iteration");
    }
}

impl Drop for Lock<'_> {
    fn drop(&mut self) {
        for id in self.unfinished.get_mut().drain(..) {
            if let Some(cell) = self.pools[id.index()].as_mut() {
                end_iteration(cell.get_mut().writable());
            }
        }

        // Reverse of the acquisition order.
        for pool in self.pools.iter_mut().rev() {
            pool.take();
        }
        self.structure.take();

        if self.acquired {
            trace!(
                held_us = self.opened_at.elapsed().as_micros() as u64,
                "transaction released"
            );
        }
    }
}
