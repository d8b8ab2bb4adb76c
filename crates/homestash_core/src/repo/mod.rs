//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for entities and the
//!   transition log.
//! - Isolate SQLite query details from resolution/service orchestration.
//!
//! # Invariants
//! - Entity writes must enforce `Entity::validate()` before persistence.
//! - The transition log is append-only: no repository exposes an update or
//!   delete on `transitions`.
//! - Bulk reads (`get_by_ids`, `latest_for`) issue a bounded number of
//!   queries regardless of the id count.

pub mod entity_repo;
pub mod transition_repo;
