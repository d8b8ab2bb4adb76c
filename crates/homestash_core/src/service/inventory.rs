//! Inventory movement use-case service.
//!
//! # Responsibility
//! - Validate movement invariants above the repository layer before a
//!   transition is appended.
//! - Provide the furniture placement path (room attribute, not log).
//!
//! # Invariants
//! - A move is recorded only when both endpoints exist and are active; a
//!   tombstoned destination is rejected at append time, never coerced.
//! - Appends are the only mutation of the transition log; corrections are
//!   expressed as further appends.

use crate::model::entity::{Entity, EntityId, EntityKind, EntityRef};
use crate::model::transition::Transition;
use crate::repo::entity_repo::{EntityRepoError, EntityRepository};
use crate::repo::transition_repo::{TransitionRepoError, TransitionRepository};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from inventory movement operations.
#[derive(Debug)]
pub enum InventoryError {
    /// Moved entity kind cannot be a transition subject.
    InvalidSubject(EntityKind),
    /// Target kind cannot be a containment destination.
    InvalidDestination(EntityKind),
    /// Moved entity does not exist or is soft-deleted.
    SubjectNotFound(EntityRef),
    /// Target entity does not exist or is soft-deleted.
    DestinationNotFound(EntityRef),
    /// Furniture placement target is not furniture.
    NotFurniture(EntityId),
    /// Transition log failure.
    Transitions(TransitionRepoError),
    /// Entity storage failure.
    Entities(EntityRepoError),
}

impl Display for InventoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSubject(kind) => {
                write!(f, "entity kind {kind} cannot be moved")
            }
            Self::InvalidDestination(kind) => {
                write!(f, "entity kind {kind} cannot hold other entities")
            }
            Self::SubjectNotFound(node) => write!(f, "moved entity not found: {node}"),
            Self::DestinationNotFound(node) => write!(f, "destination not found: {node}"),
            Self::NotFurniture(id) => write!(f, "entity is not furniture: {id}"),
            Self::Transitions(err) => write!(f, "{err}"),
            Self::Entities(err) => write!(f, "{err}"),
        }
    }
}

impl Error for InventoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transitions(err) => Some(err),
            Self::Entities(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransitionRepoError> for InventoryError {
    fn from(value: TransitionRepoError) -> Self {
        Self::Transitions(value)
    }
}

impl From<EntityRepoError> for InventoryError {
    fn from(value: EntityRepoError) -> Self {
        match value {
            EntityRepoError::NotFurniture(id) => Self::NotFurniture(id),
            other => Self::Entities(other),
        }
    }
}

/// Movement use-case facade over entity storage and the transition log.
pub struct InventoryService<T: TransitionRepository, E: EntityRepository> {
    transitions: T,
    entities: E,
}

impl<T: TransitionRepository, E: EntityRepository> InventoryService<T, E> {
    /// Creates the service from repository implementations.
    pub fn new(transitions: T, entities: E) -> Self {
        Self {
            transitions,
            entities,
        }
    }

    /// Records one movement: subject relocated into destination.
    ///
    /// Both endpoints must exist and be active. Returns the stored
    /// transition.
    pub fn move_entity(
        &self,
        subject: EntityRef,
        destination: EntityRef,
    ) -> Result<Transition, InventoryError> {
        if !subject.kind.is_subject() {
            return Err(InventoryError::InvalidSubject(subject.kind));
        }
        if !destination.kind.is_destination() {
            return Err(InventoryError::InvalidDestination(destination.kind));
        }

        if self.lookup_active(subject)?.is_none() {
            return Err(InventoryError::SubjectNotFound(subject));
        }
        if self.lookup_active(destination)?.is_none() {
            return Err(InventoryError::DestinationNotFound(destination));
        }

        let transition = self.transitions.append(subject, destination)?;
        info!(
            "event=move_recorded module=inventory status=ok subject={subject} destination={destination} transition_id={}",
            transition.id
        );
        Ok(transition)
    }

    /// Binds one furniture entity to its room via the stored attribute.
    ///
    /// Furniture does not move through the transition log; this is the one
    /// deliberate asymmetry in the containment model.
    pub fn place_furniture(
        &self,
        furniture_uuid: EntityId,
        room_uuid: EntityId,
    ) -> Result<(), InventoryError> {
        let room_ref = EntityRef::new(EntityKind::Room, room_uuid);
        if self.lookup_active(room_ref)?.is_none() {
            return Err(InventoryError::DestinationNotFound(room_ref));
        }

        self.entities.set_furniture_room(furniture_uuid, room_uuid)?;
        info!(
            "event=furniture_placed module=inventory status=ok furniture={furniture_uuid} room={room_uuid}"
        );
        Ok(())
    }

    fn lookup_active(&self, node: EntityRef) -> Result<Option<Entity>, InventoryError> {
        let mut fetched = self.entities.get_by_ids(node.kind, &[node.uuid])?;
        Ok(fetched.remove(&node.uuid).filter(Entity::is_active))
    }
}
