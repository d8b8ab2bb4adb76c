//! Transition event model.
//!
//! # Responsibility
//! - Define the immutable movement record and its endpoint rules.
//!
//! # Invariants
//! - A transition is created once and never updated or deleted; moving back
//!   is a new transition, not an edit.
//! - Subjects are mobile kinds only (item/place/container).
//! - Destinations are room/place/container/furniture only.
//! - The current transition for a subject is the one with the maximum
//!   `created_at`, ties broken by the highest `id`.

use crate::model::entity::{EntityKind, EntityRef};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Endpoint validation errors rejected synchronously on append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionValidationError {
    /// Subject kind is not a mobile entity kind.
    InvalidSubject(EntityKind),
    /// Destination kind is not an allowed containment target.
    InvalidDestination(EntityKind),
}

impl Display for TransitionValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSubject(kind) => {
                write!(f, "transition subject must be item/place/container, got {kind}")
            }
            Self::InvalidDestination(kind) => write!(
                f,
                "transition destination must be room/place/container/furniture, got {kind}"
            ),
        }
    }
}

impl Error for TransitionValidationError {}

/// Immutable log record asserting "this subject was moved to this destination
/// at this time."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Monotonic storage id; tiebreaker for equal timestamps.
    pub id: i64,
    /// The moved entity.
    pub subject: EntityRef,
    /// Where the subject was moved to.
    pub destination: EntityRef,
    /// Move timestamp in epoch milliseconds, immutable once written.
    pub created_at: i64,
}

impl Transition {
    /// Validates subject/destination kinds for a prospective append.
    pub fn validate_endpoints(
        subject: EntityRef,
        destination: EntityRef,
    ) -> Result<(), TransitionValidationError> {
        if !subject.kind.is_subject() {
            return Err(TransitionValidationError::InvalidSubject(subject.kind));
        }
        if !destination.kind.is_destination() {
            return Err(TransitionValidationError::InvalidDestination(
                destination.kind,
            ));
        }
        Ok(())
    }
}
