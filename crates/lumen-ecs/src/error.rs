use std::fmt;

use crate::entity::Entity;

/// The kind of access a transaction declared for a component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

/// Misuse errors reported by the world and its transactions.
///
/// These leave the world in a valid state. Broken internal bookkeeping is not
/// represented here; it panics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    #[error("component type {0} is not registered with this world")]
    Unregistered(&'static str),

    #[error("component type {0} is registered twice")]
    DuplicateComponent(&'static str),

    #[error("cannot register more than {max} component types")]
    TooManyComponents { max: usize },

    #[error("transaction did not declare {access} access to {component}")]
    Undeclared {
        component: &'static str,
        access: Access,
    },

    #[error("transaction did not declare add/remove access")]
    AddRemoveNotDeclared,

    #[error("transaction did not declare send-events access")]
    SendEventsNotDeclared,

    #[error("entity {0} is not valid; it may have already been destroyed")]
    InvalidEntity(Entity),

    #[error("entity {entity} has no {component} component")]
    MissingComponent {
        entity: Entity,
        component: &'static str,
    },

    #[error("no global {0} component is set")]
    MissingGlobal(&'static str),

    #[error("iteration over {0} is already in progress")]
    IterationInProgress(&'static str),

    #[error("no iteration over {0} is in progress")]
    NotIterating(&'static str),

    #[error("{0} is already borrowed by this transaction")]
    BorrowConflict(&'static str),
}

/// Errors from loading a [`WorldConfig`](crate::WorldConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse world config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid world config: {0}")]
    Invalid(String),
}
