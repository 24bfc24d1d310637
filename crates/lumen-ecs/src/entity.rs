use std::fmt;

/// A generational entity handle packed into 64 bits: 48-bit index, 16-bit generation.
///
/// The raw value `0` is the null entity and never refers to live data.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Entity(u64);

impl Entity {
    /// Number of low bits holding the index. The rest hold the generation.
    pub const INDEX_BITS: u32 = 48;
    /// Mask selecting the index bits of the raw value.
    pub const INDEX_MASK: u64 = (1 << Self::INDEX_BITS) - 1;
    /// The reserved null entity.
    pub const NULL: Entity = Entity(0);

    /// Create an entity from its index and generation.
    ///
    /// # Panics
    /// Panics if `index` does not fit in 48 bits.
    pub fn new(index: u64, generation: u16) -> Self {
        assert!(
            index <= Self::INDEX_MASK,
            "entity index {index} does not fit in {} bits",
            Self::INDEX_BITS
        );
        Self((u64::from(generation) << Self::INDEX_BITS) | index)
    }

    /// Rebuild an entity from a value previously returned by [`Entity::to_raw`].
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// The slot index of this entity.
    pub fn index(self) -> u64 {
        self.0 & Self::INDEX_MASK
    }

    /// The generation of this entity (incremented each time its index is destroyed).
    pub fn generation(self) -> u16 {
        (self.0 >> Self::INDEX_BITS) as u16
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("Entity(null)");
        }
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_round_trip() {
        let e = Entity::new(12345, 7);
        assert_eq!(e.index(), 12345);
        assert_eq!(e.generation(), 7);
        assert_eq!(Entity::from_raw(e.to_raw()), e);
    }

    #[test]
    fn max_index_and_generation() {
        let e = Entity::new(Entity::INDEX_MASK, u16::MAX);
        assert_eq!(e.index(), Entity::INDEX_MASK);
        assert_eq!(e.generation(), u16::MAX);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn oversized_index_panics() {
        Entity::new(1 << 48, 0);
    }

    #[test]
    fn null_is_default() {
        assert!(Entity::default().is_null());
        assert_eq!(Entity::new(0, 0), Entity::NULL);
        assert!(!Entity::new(1, 0).is_null());
        assert!(!Entity::new(0, 1).is_null());
    }

    #[test]
    fn ordering_uses_raw_value() {
        let a = Entity::new(5, 0);
        let b = Entity::new(1, 1);
        assert!(a < b);
        assert!(Entity::new(1, 0) < a);
    }

    #[test]
    fn formatting() {
        let e = Entity::new(3, 2);
        assert_eq!(format!("{e}"), "3v2");
        assert_eq!(format!("{e:?}"), "Entity(3v2)");
        assert_eq!(format!("{:?}", Entity::NULL), "Entity(null)");
    }
}
