//! Core containment-tracking engine for HomeStash.
//! This crate is the single source of truth for location derivation: every
//! view that shows "where is this thing" consumes the resolution services
//! defined here instead of walking the transition log itself.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entity::{Entity, EntityId, EntityKind, EntityRef, EntityValidationError};
pub use model::transition::{Transition, TransitionValidationError};
pub use repo::entity_repo::{
    EntityRepoError, EntityRepoResult, EntityRepository, SqliteEntityRepository,
};
pub use repo::transition_repo::{
    SqliteTransitionRepository, TransitionRepoError, TransitionRepoResult, TransitionRepository,
};
pub use service::inventory::{InventoryError, InventoryService};
pub use service::location::{
    ChainLink, LocationError, LocationResult, LocationService, MAX_RESOLUTION_DEPTH,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
