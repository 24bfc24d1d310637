use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::binding::{EventBindings, FocusLock, SignalBindings};
use crate::component::{Component, ComponentId, ComponentMask, ComponentRegistry};
use crate::config::WorldConfig;
use crate::directory::EntityDirectory;
use crate::error::EcsError;
use crate::event::{EventInput, EventQueue, EventQueueRef, SignalOutput};
use crate::lock::Transaction;
use crate::pool::{ComponentPool, ComponentStorage};
use crate::query::ComponentSet;

/// The central ECS container. Owns all entities and component pools.
///
/// Nothing inside is reachable without a transaction: open one with
/// [`World::transaction`], declare what it reads and writes, then `begin()` it.
/// A `World` is `Sync`, so systems on several threads can share one by reference.
pub struct World {
    config: WorldConfig,
    pub(crate) registry: ComponentRegistry,
    pub(crate) pools: Vec<RwLock<Box<dyn ComponentStorage>>>,
    pub(crate) directory: RwLock<EntityDirectory>,
    /// Held for the whole lifetime of every add/remove transaction.
    pub(crate) structure: Mutex<()>,
}

impl World {
    pub fn builder() -> WorldBuilder {
        WorldBuilder::new()
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Start declaring a transaction against this world.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    pub fn component_id<T: Component>(&self) -> Result<ComponentId, EcsError> {
        self.registry.id_of::<T>()
    }

    pub fn component_name(&self, id: ComponentId) -> &'static str {
        self.registry.name(id)
    }

    /// Number of registered component types, built-ins included.
    pub fn component_count(&self) -> usize {
        self.registry.len()
    }

    /// Mask of the component types in `Q`.
    pub fn mask_of<Q: ComponentSet>(&self) -> Result<ComponentMask, EcsError> {
        Q::mask(self)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.directory.read().len()
    }

    /// Create an event queue sized by [`WorldConfig::event_queue_capacity`].
    pub fn new_event_queue(&self) -> EventQueueRef {
        EventQueue::new(self.config.event_queue_capacity)
    }
}

/// Registers component types and builds a [`World`].
///
/// Registration errors are remembered and reported by [`WorldBuilder::build`].
pub struct WorldBuilder {
    config: WorldConfig,
    registry: ComponentRegistry,
    pools: Vec<Box<dyn ComponentStorage>>,
    error: Option<EcsError>,
}

impl WorldBuilder {
    pub fn new() -> Self {
        Self {
            config: WorldConfig::default(),
            registry: ComponentRegistry::default(),
            pools: Vec::new(),
            error: None,
        }
        .register::<EventInput>("event_input")
        .register::<EventBindings>("event_bindings")
        .register::<SignalOutput>("signal_output")
        .register::<SignalBindings>("signal_bindings")
        .register::<FocusLock>("focus_lock")
    }

    pub fn with_config(mut self, config: WorldConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a component type under a readable name.
    pub fn register<T: Component>(mut self, name: &'static str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.registry.register::<T>(name) {
            Ok(_) => self.pools.push(Box::new(ComponentPool::<T>::new(name))),
            Err(err) => self.error = Some(err),
        }
        self
    }

    pub fn build(self) -> Result<World, EcsError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        debug!(
            components = self.registry.len(),
            recycle_threshold = self.config.recycle_threshold,
            "world built"
        );
        Ok(World {
            directory: RwLock::new(EntityDirectory::new(self.config.recycle_threshold)),
            config: self.config,
            registry: self.registry,
            pools: self.pools.into_iter().map(RwLock::new).collect(),
            structure: Mutex::new(()),
        })
    }
}

impl Default for WorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}
