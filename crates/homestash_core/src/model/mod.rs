//! Domain model for containment tracking.
//!
//! # Responsibility
//! - Define the canonical entity record shared by all five inventory kinds.
//! - Define the immutable transition event asserting one movement.
//!
//! # Invariants
//! - Every domain object is identified by a stable `EntityId`.
//! - Deletion is represented by soft-delete tombstones, not hard delete.
//! - Transitions are append-only facts; current location is always derived.

pub mod entity;
pub mod transition;
