use std::thread;

use tracing::warn;

use crate::error::EcsError;
use crate::world::World;

/// A system that operates on the world each tick.
///
/// Systems open their own transactions, so several can run against the same
/// world at once. Errors are reported by the schedule and the system is run
/// again next frame.
pub trait System: Send {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn run(&mut self, world: &World) -> Result<(), EcsError>;
}

/// Blanket implementation so closures can be used as systems.
impl<F: FnMut(&World) -> Result<(), EcsError> + Send> System for F {
    fn run(&mut self, world: &World) -> Result<(), EcsError> {
        (self)(world)
    }
}

/// A system with an explicit name, for closures.
pub struct Named<S> {
    name: String,
    system: S,
}

impl<S: System> Named<S> {
    pub fn new(name: impl Into<String>, system: S) -> Self {
        Self {
            name: name.into(),
            system,
        }
    }
}

impl<S: System> System for Named<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, world: &World) -> Result<(), EcsError> {
        self.system.run(world)
    }
}

/// An ordered list of systems to run each frame.
pub struct SystemSchedule {
    systems: Vec<Box<dyn System>>,
}

impl SystemSchedule {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
        }
    }

    /// Add a system to the end of the schedule.
    pub fn add_system<S: System + 'static>(&mut self, system: S) {
        self.systems.push(Box::new(system));
    }

    /// Run all systems in order on the given world. Returns how many failed.
    pub fn run_all(&mut self, world: &World) -> usize {
        let mut failed = 0;
        for system in &mut self.systems {
            let result = system.run(world);
            if report(system.name(), &result) {
                failed += 1;
            }
        }
        failed
    }

    /// Run every system on its own thread and wait for all of them.
    /// Returns how many failed.
    ///
    /// Ordering between systems comes only from the transactions they open.
    pub fn run_parallel(&mut self, world: &World) -> usize {
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .systems
                .iter_mut()
                .map(|system| {
                    scope.spawn(move || {
                        let result = system.run(world);
                        report(system.name(), &result)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .filter(|failed| *failed)
                .count()
        })
    }

    /// Number of systems in the schedule.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl Default for SystemSchedule {
    fn default() -> Self {
        Self::new()
    }
}

/// Log a failed run. Returns whether it failed.
fn report(system: &str, result: &Result<(), EcsError>) -> bool {
    match result {
        Ok(()) => false,
        Err(err) => {
            warn!(system, error = %err, "system failed, retrying next frame");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Ticks(u32);

    fn world() -> World {
        let world = World::builder().register::<Ticks>("ticks").build().unwrap();
        world
            .transaction()
            .write::<Ticks>()
            .add_remove()
            .run(|lock| lock.set_global(Ticks(0)).map(|_| ()))
            .unwrap();
        world
    }

    fn ticks(world: &World) -> u32 {
        world
            .transaction()
            .read::<Ticks>()
            .run(|lock| Ok(lock.global::<Ticks>()?.map_or(0, |t| t.0)))
            .unwrap()
    }

    fn tick(world: &World) -> Result<(), EcsError> {
        world.transaction().write::<Ticks>().run(|lock| {
            if let Some(mut ticks) = lock.global_mut::<Ticks>()? {
                ticks.0 += 1;
            }
            Ok(())
        })
    }

    #[test]
    fn closure_system() {
        let world = world();
        let mut system = |w: &World| tick(w);
        system.run(&world).unwrap();
        assert_eq!(ticks(&world), 1);
    }

    #[test]
    fn schedule_ordering() {
        let world = world();
        let log = Arc::new(Mutex::new(Vec::<u32>::new()));

        let mut schedule = SystemSchedule::new();
        for i in 1..=3 {
            let log = log.clone();
            schedule.add_system(move |_: &World| -> Result<(), EcsError> {
                log.lock().unwrap().push(i);
                Ok(())
            });
        }

        assert_eq!(schedule.run_all(&world), 0);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn failures_are_counted_not_fatal() {
        let world = world();
        let mut schedule = SystemSchedule::new();
        schedule.add_system(Named::new("undeclared", |w: &World| -> Result<(), EcsError> {
            let lock = w.transaction().read::<Ticks>().begin()?;
            lock.global_mut::<Ticks>()?;
            Ok(())
        }));
        schedule.add_system(tick);

        assert_eq!(schedule.run_all(&world), 1);
        assert_eq!(schedule.run_all(&world), 1);
        assert_eq!(ticks(&world), 2);
    }

    #[test]
    fn parallel_systems_share_the_world() {
        let world = world();
        let mut schedule = SystemSchedule::new();
        for _ in 0..4 {
            schedule.add_system(|w: &World| -> Result<(), EcsError> {
                for _ in 0..50 {
                    tick(w)?;
                }
                Ok(())
            });
        }
        assert_eq!(schedule.len(), 4);
        assert_eq!(schedule.run_parallel(&world), 0);
        assert_eq!(ticks(&world), 200);
    }

    #[test]
    fn named_systems() {
        let named = Named::new("movement", |_: &World| -> Result<(), EcsError> { Ok(()) });
        assert_eq!(named.name(), "movement");
    }
}
