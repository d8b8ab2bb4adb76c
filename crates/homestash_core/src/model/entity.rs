//! Entity domain model.
//!
//! # Responsibility
//! - Define the canonical record shared by room/place/container/furniture/item
//!   projections.
//! - Provide lifecycle helpers for soft-delete semantics.
//!
//! # Invariants
//! - `uuid` is stable and never reused for another entity.
//! - `is_deleted` is the source of truth for tombstone state.
//! - `room_uuid` is meaningful only for furniture; furniture is bound to a
//!   room by attribute, never by transition.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for every inventory entity.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type EntityId = Uuid;

/// Unified category for all inventory entities.
///
/// Rooms are terminal: they anchor every resolvable containment chain and are
/// never the subject of a transition. Furniture is fixed-location: its room is
/// a stored attribute. Items, places and containers are mobile and carry their
/// location in the transition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Terminal chain anchor; never moves.
    Room,
    /// Mobile named location (a shelf, a desk corner).
    Place,
    /// Mobile box/bin that can hold other entities.
    Container,
    /// Fixed-location entity bound to one room by attribute.
    Furniture,
    /// Plain inventory object.
    Item,
}

impl EntityKind {
    /// Returns whether this kind may be the subject of a transition.
    pub fn is_subject(self) -> bool {
        matches!(self, Self::Item | Self::Place | Self::Container)
    }

    /// Returns whether this kind may be the destination of a transition.
    pub fn is_destination(self) -> bool {
        matches!(
            self,
            Self::Room | Self::Place | Self::Container | Self::Furniture
        )
    }

    /// Returns whether this kind has a transition-derived location.
    pub fn is_mobile(self) -> bool {
        self.is_subject()
    }

    /// Stable database/display token for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Room => "room",
            Self::Place => "place",
            Self::Container => "container",
            Self::Furniture => "furniture",
            Self::Item => "item",
        }
    }

    /// Parses the stable database token back into a kind.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "room" => Some(Self::Room),
            "place" => Some(Self::Place),
            "container" => Some(Self::Container),
            "furniture" => Some(Self::Furniture),
            "item" => Some(Self::Item),
            _ => None,
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Typed reference to one entity, used throughout resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Referenced entity kind.
    pub kind: EntityKind,
    /// Referenced stable id.
    pub uuid: EntityId,
}

impl EntityRef {
    /// Creates a typed reference.
    pub fn new(kind: EntityKind, uuid: EntityId) -> Self {
        Self { kind, uuid }
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.uuid)
    }
}

/// Validation errors for entity records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityValidationError {
    /// Display name is blank after trim.
    BlankName,
    /// `room_uuid` set on a kind that is not furniture.
    RoomAttributeOnNonFurniture(EntityKind),
}

impl Display for EntityValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "entity name must not be blank"),
            Self::RoomAttributeOnNonFurniture(kind) => {
                write!(f, "room attribute is only valid for furniture, got {kind}")
            }
        }
    }
}

impl Error for EntityValidationError {}

/// Canonical record for all inventory entities.
///
/// One storage shape supports all five kinds; kind-specific behavior lives in
/// the resolution services, not in per-kind record types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable global ID used for transitions, linking and auditing.
    pub uuid: EntityId,
    /// Entity category driving resolution behavior.
    pub kind: EntityKind,
    /// User-facing display name.
    pub name: String,
    /// Fixed room binding. Meaningful only when `kind == Furniture`.
    pub room_uuid: Option<EntityId>,
    /// Soft delete tombstone; deleted entities never resolve a chain.
    pub is_deleted: bool,
}

impl Entity {
    /// Creates a new entity with a generated stable ID.
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), kind, name)
    }

    /// Creates a new entity with a caller-provided stable ID.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(uuid: EntityId, kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            uuid,
            kind,
            name: name.into(),
            room_uuid: None,
            is_deleted: false,
        }
    }

    /// Returns the typed reference for this entity.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.kind, self.uuid)
    }

    /// Validates record-level invariants before persistence.
    pub fn validate(&self) -> Result<(), EntityValidationError> {
        if self.name.trim().is_empty() {
            return Err(EntityValidationError::BlankName);
        }
        if self.room_uuid.is_some() && self.kind != EntityKind::Furniture {
            return Err(EntityValidationError::RoomAttributeOnNonFurniture(
                self.kind,
            ));
        }
        Ok(())
    }

    /// Marks this entity as softly deleted (tombstoned).
    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
    }

    /// Clears the soft delete flag.
    pub fn restore(&mut self) {
        self.is_deleted = false;
    }

    /// Returns whether this entity should be considered visible/active.
    pub fn is_active(&self) -> bool {
        !self.is_deleted
    }
}
