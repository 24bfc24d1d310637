//! Forwarding of events and signals between entities, gated by input focus.
//!
//! An [`EventBindings`] component on a source entity forwards events sent to
//! it, optionally renamed, to other entities. A [`SignalBindings`] component
//! resolves a named signal to another entity's signal. Either kind of binding
//! can be restricted to a [`FocusLayer`], checked against the world's global
//! [`FocusLock`] at the moment the event is sent or the signal is read.

use std::collections::HashMap;
use std::fmt;

use crate::entity::Entity;

/// Bindings are followed at most this many hops deep.
pub const MAX_BINDING_DEPTH: usize = 10;

/// Input focus layers, lowest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FocusLayer {
    /// Never focused.
    Never,
    Game,
    Menu,
    Overlay,
    /// Always focused, whatever else is active.
    Always,
}

impl FocusLayer {
    const ACQUIRABLE: [FocusLayer; 3] = [FocusLayer::Game, FocusLayer::Menu, FocusLayer::Overlay];

    fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for FocusLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FocusLayer::Never => "never",
            FocusLayer::Game => "game",
            FocusLayer::Menu => "menu",
            FocusLayer::Overlay => "overlay",
            FocusLayer::Always => "always",
        };
        f.write_str(name)
    }
}

/// Global component tracking which focus layers are active.
///
/// The highest active layer holds the primary focus. Bindings restricted to a
/// layer only apply while that layer is primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusLock {
    active: u8,
}

impl FocusLock {
    pub fn new(layer: FocusLayer) -> Self {
        let mut lock = Self { active: 0 };
        lock.acquire_focus(layer);
        lock
    }

    /// Activate `layer`. Fails if a higher layer already holds the primary
    /// focus, or for the `Never`/`Always` pseudo layers.
    pub fn acquire_focus(&mut self, layer: FocusLayer) -> bool {
        if !FocusLayer::ACQUIRABLE.contains(&layer) {
            return false;
        }
        if self.primary_focus().is_some_and(|primary| primary > layer) {
            return false;
        }
        self.active |= layer.bit();
        true
    }

    pub fn release_focus(&mut self, layer: FocusLayer) {
        self.active &= !layer.bit();
    }

    pub fn has_focus(&self, layer: FocusLayer) -> bool {
        match layer {
            FocusLayer::Never => false,
            FocusLayer::Always => true,
            _ => self.active & layer.bit() != 0,
        }
    }

    /// The highest active layer, if any.
    pub fn primary_focus(&self) -> Option<FocusLayer> {
        FocusLayer::ACQUIRABLE
            .into_iter()
            .rev()
            .find(|layer| self.active & layer.bit() != 0)
    }

    pub fn has_primary_focus(&self, layer: FocusLayer) -> bool {
        match layer {
            FocusLayer::Never => false,
            FocusLayer::Always => true,
            _ => self.primary_focus() == Some(layer),
        }
    }
}

impl Default for FocusLock {
    fn default() -> Self {
        Self::new(FocusLayer::Game)
    }
}

impl fmt::Display for FocusLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for layer in FocusLayer::ACQUIRABLE {
            if self.has_focus(layer) {
                if !first {
                    f.write_str(", ")?;
                }
                write!(f, "{layer}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Where an event sent to the bound entity is forwarded.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBinding {
    pub target: Entity,
    /// Name the event is delivered under. `None` keeps the original name.
    pub dest_name: Option<String>,
    pub if_focused: Option<FocusLayer>,
}

impl EventBinding {
    pub fn new(target: Entity) -> Self {
        Self {
            target,
            dest_name: None,
            if_focused: None,
        }
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.dest_name = Some(name.into());
        self
    }

    pub fn if_focused(mut self, layer: FocusLayer) -> Self {
        self.if_focused = Some(layer);
        self
    }
}

/// Component forwarding events, by name, to other entities.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EventBindings {
    bindings: HashMap<String, Vec<EventBinding>>,
}

impl EventBindings {
    /// Forward events named `source` through `binding`. Existing bindings for
    /// the same name are kept.
    pub fn bind(&mut self, source: impl Into<String>, binding: EventBinding) {
        self.bindings.entry(source.into()).or_default().push(binding);
    }

    /// Drop every binding of `source` that targets `target`.
    pub fn unbind(&mut self, source: &str, target: Entity) {
        if let Some(bindings) = self.bindings.get_mut(source) {
            bindings.retain(|binding| binding.target != target);
            if bindings.is_empty() {
                self.bindings.remove(source);
            }
        }
    }

    pub fn bindings(&self, source: &str) -> &[EventBinding] {
        self.bindings.get(source).map_or(&[], Vec::as_slice)
    }

    pub fn is_bound(&self, source: &str) -> bool {
        self.bindings.contains_key(source)
    }
}

/// The signal another entity's named signal reads from.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalBinding {
    pub source: Entity,
    pub signal: String,
    pub if_focused: Option<FocusLayer>,
}

impl SignalBinding {
    pub fn new(source: Entity, signal: impl Into<String>) -> Self {
        Self {
            source,
            signal: signal.into(),
            if_focused: None,
        }
    }

    pub fn if_focused(mut self, layer: FocusLayer) -> Self {
        self.if_focused = Some(layer);
        self
    }
}

/// Component resolving named signals to signals of other entities.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SignalBindings {
    bindings: HashMap<String, SignalBinding>,
}

impl SignalBindings {
    /// Bind `name`, replacing any previous binding.
    pub fn set_binding(&mut self, name: impl Into<String>, binding: SignalBinding) {
        self.bindings.insert(name.into(), binding);
    }

    pub fn clear_binding(&mut self, name: &str) {
        self.bindings.remove(name);
    }

    pub fn binding(&self, name: &str) -> Option<&SignalBinding> {
        self.bindings.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_layers_take_primary_focus() {
        let mut focus = FocusLock::new(FocusLayer::Game);
        assert!(focus.has_primary_focus(FocusLayer::Game));

        assert!(focus.acquire_focus(FocusLayer::Menu));
        assert!(focus.has_focus(FocusLayer::Game));
        assert!(!focus.has_primary_focus(FocusLayer::Game));
        assert!(focus.has_primary_focus(FocusLayer::Menu));
        assert_eq!(focus.to_string(), "game, menu");

        // Game cannot steal focus back while the menu is up.
        assert!(!focus.acquire_focus(FocusLayer::Game));
        focus.release_focus(FocusLayer::Menu);
        assert_eq!(focus.primary_focus(), Some(FocusLayer::Game));
    }

    #[test]
    fn pseudo_layers() {
        let mut focus = FocusLock::new(FocusLayer::Menu);
        assert!(!focus.acquire_focus(FocusLayer::Always));
        assert!(!focus.acquire_focus(FocusLayer::Never));
        assert!(focus.has_primary_focus(FocusLayer::Always));
        assert!(!focus.has_primary_focus(FocusLayer::Never));

        focus.release_focus(FocusLayer::Menu);
        assert_eq!(focus.primary_focus(), None);
        assert!(focus.has_primary_focus(FocusLayer::Always));
    }

    #[test]
    fn event_bindings_by_source_name() {
        let player = Entity::new(1, 0);
        let hud = Entity::new(2, 0);
        let mut bindings = EventBindings::default();
        bindings.bind("/key/space", EventBinding::new(player).renamed("/action/jump"));
        bindings.bind("/key/space", EventBinding::new(hud).if_focused(FocusLayer::Menu));

        assert_eq!(bindings.bindings("/key/space").len(), 2);
        assert!(bindings.bindings("/key/enter").is_empty());

        bindings.unbind("/key/space", player);
        assert_eq!(bindings.bindings("/key/space")[0].target, hud);
        bindings.unbind("/key/space", hud);
        assert!(!bindings.is_bound("/key/space"));
    }

    #[test]
    fn signal_binding_replaces() {
        let mouse = Entity::new(3, 0);
        let mut bindings = SignalBindings::default();
        bindings.set_binding("fire", SignalBinding::new(mouse, "left"));
        bindings.set_binding("fire", SignalBinding::new(mouse, "right"));
        assert_eq!(bindings.binding("fire").unwrap().signal, "right");
        bindings.clear_binding("fire");
        assert!(bindings.binding("fire").is_none());
    }
}
