//! Lumen ECS - transactional Entity Component System
//!
//! Entities are generational `(index, generation)` handles. Each component type
//! lives in its own dense pool, and every access goes through a [`Transaction`]
//! that declares up front which types it reads and writes, so systems on
//! different threads can share one [`World`] safely.

mod binding;
mod component;
mod config;
mod directory;
mod entity;
mod error;
mod event;
mod lock;
mod pool;
mod query;
mod system;
mod world;

pub use binding::{
    EventBinding, EventBindings, FocusLayer, FocusLock, SignalBinding, SignalBindings,
    MAX_BINDING_DEPTH,
};
pub use component::{Component, ComponentId, ComponentMask, MaskMatch, MAX_COMPONENTS};
pub use config::WorldConfig;
pub use directory::RECYCLE_ENTITY_COUNT;
pub use entity::Entity;
pub use error::{Access, ConfigError, EcsError};
pub use event::{Event, EventData, EventInput, EventQueue, EventQueueRef, SignalOutput};
pub use lock::{Lock, Permissions, Transaction};
pub use query::{ComponentSet, EntitiesWith};
pub use system::{Named, System, SystemSchedule};
pub use world::{World, WorldBuilder};
