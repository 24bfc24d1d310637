//! Demo components and systems.
//!
//! Motes drift around, age, and are reaped when their lifetime runs out. The
//! aging system only announces expiry through an event; the reaper drains its
//! queue in its own transaction, destroys the mote and spawns a replacement.

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use lumen_ecs::{
    EcsError, Entity, Event, EventData, EventInput, EventQueueRef, Lock, Named, System,
    SystemSchedule, World, WorldConfig,
};

use crate::settings::SimulationSettings;

/// Event sent to the reaper when a mote's lifetime runs out.
pub const EXPIRED: &str = "expired";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity(pub Vec3);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lifetime {
    /// Seconds left
    pub remaining: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Name(pub String);

/// Global counters, updated once per frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub frame: u64,
    pub reaped: u64,
}

pub fn build_world(config: &WorldConfig) -> Result<World, EcsError> {
    World::builder()
        .with_config(config.clone())
        .register::<Transform>("transform")
        .register::<Velocity>("velocity")
        .register::<Lifetime>("lifetime")
        .register::<Name>("name")
        .register::<FrameStats>("frame_stats")
        .build()
}

struct Spawner {
    rng: StdRng,
    max_lifetime: f32,
    spawned: u64,
}

impl Spawner {
    fn new(settings: &SimulationSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            max_lifetime: settings.max_lifetime,
            spawned: 0,
        }
    }

    fn spawn(&mut self, lock: &Lock<'_>) -> Result<Entity, EcsError> {
        let e = lock.new_entity()?;
        let position = Vec3::new(
            self.rng.gen_range(-50.0..50.0),
            0.0,
            self.rng.gen_range(-50.0..50.0),
        );
        let velocity = Vec3::new(
            self.rng.gen_range(-1.0..1.0),
            self.rng.gen_range(0.0..0.5),
            self.rng.gen_range(-1.0..1.0),
        );
        let remaining = self.max_lifetime * self.rng.gen_range(0.25..=1.0f32);

        lock.set(e, Transform { position })?;
        lock.set(e, Velocity(velocity))?;
        lock.set(e, Lifetime { remaining })?;
        lock.set(e, Name(format!("mote-{}", self.spawned)))?;
        self.spawned += 1;
        Ok(e)
    }
}

/// Seed the world and build the per-frame schedule.
pub fn setup(world: &World, settings: &SimulationSettings) -> Result<SystemSchedule, EcsError> {
    let mut spawner = Spawner::new(settings);
    let queue = world.new_event_queue();

    let reaper = world.transaction().write_all().add_remove().run(|lock| {
        for _ in 0..settings.initial_entities {
            spawner.spawn(lock)?;
        }
        lock.set_global(FrameStats::default())?;

        let reaper = lock.new_entity()?;
        lock.set(reaper, Name("reaper".to_string()))?;
        lock.set(reaper, EventInput::default())?
            .register(EXPIRED, &queue);
        Ok(reaper)
    })?;
    info!(
        entities = settings.initial_entities,
        seed = ?settings.seed,
        "world seeded"
    );

    let dt = settings.frame_dt;
    let mut schedule = SystemSchedule::new();
    schedule.add_system(Named::new("movement", move |world: &World| movement(world, dt)));
    schedule.add_system(Aging { reaper, dt });
    schedule.add_system(Reaper { queue, spawner });
    schedule.add_system(Named::new("report", report));
    Ok(schedule)
}

pub fn movement(world: &World, dt: f32) -> Result<(), EcsError> {
    let lock = world
        .transaction()
        .write::<Transform>()
        .read::<Velocity>()
        .begin()?;
    for e in lock.entities_with::<(Transform, Velocity)>()? {
        let Some(velocity) = lock.get::<Velocity>(e)?.map(|v| v.0) else {
            continue;
        };
        if let Some(mut transform) = lock.get_mut::<Transform>(e)? {
            transform.position += velocity * dt;
        }
    }
    Ok(())
}

/// Counts lifetimes down and tells the reaper about the ones that ran out.
struct Aging {
    reaper: Entity,
    dt: f32,
}

impl System for Aging {
    fn name(&self) -> &str {
        "aging"
    }

    fn run(&mut self, world: &World) -> Result<(), EcsError> {
        let lock = world
            .transaction()
            .write::<Lifetime>()
            .send_events()
            .begin()?;

        let mut expired = Vec::new();
        for e in lock.entities_with::<(Lifetime,)>()? {
            if let Some(mut lifetime) = lock.get_mut::<Lifetime>(e)? {
                let was_alive = lifetime.remaining > 0.0;
                lifetime.remaining -= self.dt;
                if was_alive && lifetime.remaining <= 0.0 {
                    expired.push(e);
                }
            }
        }

        for e in &expired {
            lock.send_event(self.reaper, Event::new(EXPIRED, *e, *e))?;
        }
        if !expired.is_empty() {
            debug!(expired = expired.len(), "lifetimes ran out");
        }
        Ok(())
    }
}

/// Destroys expired motes and spawns a replacement for each.
struct Reaper {
    queue: EventQueueRef,
    spawner: Spawner,
}

impl System for Reaper {
    fn name(&self) -> &str {
        "reaper"
    }

    fn run(&mut self, world: &World) -> Result<(), EcsError> {
        let lock = world.transaction().write_all().add_remove().begin()?;

        let mut reaped = 0;
        while let Some(event) = lock.poll_event(&self.queue)? {
            let EventData::Entity(target) = event.data else {
                continue;
            };
            // Already gone if the event was queued twice.
            if !lock.valid(target) {
                continue;
            }
            lock.destroy(target)?;
            self.spawner.spawn(&lock)?;
            reaped += 1;
        }

        if let Some(mut stats) = lock.global_mut::<FrameStats>()? {
            stats.reaped += reaped;
        }
        Ok(())
    }
}

pub fn report(world: &World) -> Result<(), EcsError> {
    let lock = world
        .transaction()
        .read::<Transform>()
        .write::<FrameStats>()
        .begin()?;

    let mut count = 0usize;
    let mut centroid = Vec3::ZERO;
    for e in lock.entities_with::<(Transform,)>()? {
        if let Some(transform) = lock.get::<Transform>(e)? {
            centroid += transform.position;
            count += 1;
        }
    }
    if count > 0 {
        centroid /= count as f32;
    }

    let Some(mut stats) = lock.global_mut::<FrameStats>()? else {
        return Ok(());
    };
    stats.frame += 1;
    if stats.frame % 60 == 0 {
        info!(
            frame = stats.frame,
            motes = count,
            reaped = stats.reaped,
            centroid = ?centroid,
            "frame"
        );
    } else {
        debug!(frame = stats.frame, motes = count, "frame");
    }
    Ok(())
}
