//! Location resolution engine.
//!
//! # Responsibility
//! - Derive the current containment chain of any entity from its latest
//!   transition, recursively resolving mobile destinations up to a room.
//! - Provide the batched variant that amortizes lookups across shared
//!   ancestors for list views.
//!
//! # Invariants
//! - The soft-delete filter applies at every hop: a tombstoned destination is
//!   never part of a `Resolved` chain; it is always the break point.
//! - Resolution terminates on any log, including cyclic ones: visited-set
//!   cycle guard plus a fixed depth bound, iterative rather than recursive.
//! - A broken node is reported in `broken_at` and never included in
//!   `partial_chain`; the partial chain holds everything resolved strictly
//!   before the break.
//! - `resolve_many(set)[e] == resolve(e)` for every entity in the set, given
//!   a consistent snapshot of the store.

use crate::model::entity::{Entity, EntityId, EntityKind, EntityRef};
use crate::repo::entity_repo::{EntityRepoError, EntityRepository};
use crate::repo::transition_repo::{TransitionRepoError, TransitionRepository};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Maximum containment hops walked before a chain is declared unresolvable.
///
/// Sixteen is far beyond any plausible household nesting; hitting the bound
/// indicates a corrupted or adversarial log, not a deep home.
pub const MAX_RESOLUTION_DEPTH: usize = 16;

/// One resolved hop of a containment chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    /// Destination kind at this hop.
    pub kind: EntityKind,
    /// Destination stable id.
    pub uuid: EntityId,
    /// Destination display name at resolution time.
    pub name: String,
}

/// Outcome of resolving one entity's current location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LocationResult {
    /// No transition (or, for furniture, no room attribute) exists.
    Unplaced,
    /// Full chain from immediate destination up to a room.
    Resolved {
        /// Ordered hops; the last link is always a room.
        chain: Vec<ChainLink>,
    },
    /// Chain broken by a missing, soft-deleted, or unresolved ancestor.
    Orphaned {
        /// Everything resolved strictly before the break.
        partial_chain: Vec<ChainLink>,
        /// The node at which the chain broke.
        broken_at: EntityRef,
    },
    /// Cycle or depth bound hit before reaching a room.
    Unresolvable,
}

/// Errors from location resolution.
#[derive(Debug)]
pub enum LocationError {
    /// The requested kind has no derivable location (rooms are the terminus).
    NotResolvable(EntityKind),
    /// Transition log read failed.
    Transitions(TransitionRepoError),
    /// Entity lookup failed.
    Entities(EntityRepoError),
}

impl Display for LocationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotResolvable(kind) => {
                write!(f, "entity kind {kind} has no derivable location")
            }
            Self::Transitions(err) => write!(f, "{err}"),
            Self::Entities(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LocationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotResolvable(_) => None,
            Self::Transitions(err) => Some(err),
            Self::Entities(err) => Some(err),
        }
    }
}

impl From<TransitionRepoError> for LocationError {
    fn from(value: TransitionRepoError) -> Self {
        Self::Transitions(value)
    }
}

impl From<EntityRepoError> for LocationError {
    fn from(value: EntityRepoError) -> Self {
        Self::Entities(value)
    }
}

/// Resolution state for one batch entity walking the containment graph.
struct Walk {
    origin: (EntityKind, EntityId),
    chain: Vec<ChainLink>,
    visited: HashSet<EntityRef>,
    destination: EntityRef,
    depth: usize,
}

/// Memoized per-node outcome shared across one `resolve_many` call.
///
/// Each node is looked up once per batch; every walk that reaches it reuses
/// the recorded link and onward hop. State is read once per call, so memo
/// entries cannot go stale within the call.
enum NodeInfo {
    /// Missing from storage or soft-deleted; breaks any chain that hits it.
    Broken,
    /// Terminal room hop.
    Room(ChainLink),
    /// Furniture hop; onward room comes from the stored attribute.
    Furniture(ChainLink, Option<EntityRef>),
    /// Place/container hop; onward destination from its latest transition.
    Mobile(ChainLink, Option<EntityRef>),
}

/// Location resolution service over transition log and entity storage.
pub struct LocationService<T: TransitionRepository, E: EntityRepository> {
    transitions: T,
    entities: E,
}

impl<T: TransitionRepository, E: EntityRepository> LocationService<T, E> {
    /// Creates the service from repository implementations.
    pub fn new(transitions: T, entities: E) -> Self {
        Self {
            transitions,
            entities,
        }
    }

    /// Resolves the current containment chain for one entity.
    ///
    /// Rooms are rejected: they are the terminus of every chain and never
    /// the subject of resolution.
    pub fn resolve(
        &self,
        kind: EntityKind,
        uuid: EntityId,
    ) -> Result<LocationResult, LocationError> {
        match kind {
            EntityKind::Room => Err(LocationError::NotResolvable(kind)),
            EntityKind::Furniture => self.resolve_furniture(uuid),
            EntityKind::Place | EntityKind::Container | EntityKind::Item => {
                self.resolve_mobile(kind, uuid)
            }
        }
    }

    /// Resolves containment chains for many entities at once.
    ///
    /// Lookups are batched level by level across the containment graph and
    /// shared ancestors are resolved once per call. Any storage failure fails
    /// the whole call; no partial map is returned. Duplicate input pairs
    /// collapse onto one result entry.
    pub fn resolve_many(
        &self,
        targets: &[(EntityKind, EntityId)],
    ) -> Result<HashMap<(EntityKind, EntityId), LocationResult>, LocationError> {
        let started_at = Instant::now();

        let mut unique = Vec::with_capacity(targets.len());
        let mut seen = HashSet::with_capacity(targets.len());
        for target in targets {
            if target.0 == EntityKind::Room {
                return Err(LocationError::NotResolvable(EntityKind::Room));
            }
            if seen.insert(*target) {
                unique.push(*target);
            }
        }

        let mut results = HashMap::with_capacity(unique.len());
        self.resolve_furniture_batch(&unique, &mut results)?;
        let pending = self.seed_mobile_walks(&unique, &mut results)?;
        let levels = self.run_walks(pending, &mut results)?;

        info!(
            "event=resolve_batch module=location status=ok targets={} unique={} levels={levels} duration_ms={}",
            targets.len(),
            unique.len(),
            started_at.elapsed().as_millis()
        );
        Ok(results)
    }

    fn resolve_furniture(&self, uuid: EntityId) -> Result<LocationResult, LocationError> {
        let mut rooms = self.entities.room_ids_for_furniture(&[uuid])?;
        let Some(room_uuid) = rooms.remove(&uuid) else {
            return Ok(LocationResult::Unplaced);
        };

        let room_ref = EntityRef::new(EntityKind::Room, room_uuid);
        match self.lookup_active(room_ref)? {
            Some(room) => Ok(LocationResult::Resolved {
                chain: vec![link_for(room_ref, &room)],
            }),
            None => Ok(LocationResult::Orphaned {
                partial_chain: Vec::new(),
                broken_at: room_ref,
            }),
        }
    }

    fn resolve_mobile(
        &self,
        kind: EntityKind,
        uuid: EntityId,
    ) -> Result<LocationResult, LocationError> {
        let start = EntityRef::new(kind, uuid);
        let Some(first) = self.latest_destination(start)? else {
            return Ok(LocationResult::Unplaced);
        };

        let mut chain: Vec<ChainLink> = Vec::new();
        let mut visited = HashSet::from([start]);
        let mut destination = first;

        for _depth in 0..MAX_RESOLUTION_DEPTH {
            if !visited.insert(destination) {
                warn!("event=resolve_cycle module=location subject={start} node={destination}");
                return Ok(LocationResult::Unresolvable);
            }

            let Some(entity) = self.lookup_active(destination)? else {
                return Ok(LocationResult::Orphaned {
                    partial_chain: chain,
                    broken_at: destination,
                });
            };

            match destination.kind {
                EntityKind::Room => {
                    chain.push(link_for(destination, &entity));
                    return Ok(LocationResult::Resolved { chain });
                }
                EntityKind::Furniture => match entity.room_uuid {
                    // Roomless furniture cannot anchor the chain; it breaks
                    // exactly like a transition-less place.
                    None => {
                        return Ok(LocationResult::Orphaned {
                            partial_chain: chain,
                            broken_at: destination,
                        });
                    }
                    Some(room_uuid) => {
                        chain.push(link_for(destination, &entity));
                        destination = EntityRef::new(EntityKind::Room, room_uuid);
                    }
                },
                EntityKind::Place | EntityKind::Container => {
                    match self.latest_destination(destination)? {
                        None => {
                            return Ok(LocationResult::Orphaned {
                                partial_chain: chain,
                                broken_at: destination,
                            });
                        }
                        Some(next) => {
                            chain.push(link_for(destination, &entity));
                            destination = next;
                        }
                    }
                }
                // Items are never destinations; repository parsing rejects
                // such rows before they reach the engine.
                EntityKind::Item => return Ok(LocationResult::Unresolvable),
            }
        }

        warn!("event=resolve_depth_exhausted module=location subject={start} node={destination}");
        Ok(LocationResult::Unresolvable)
    }

    /// Resolves all furniture inputs of a batch in two bulk lookups.
    fn resolve_furniture_batch(
        &self,
        unique: &[(EntityKind, EntityId)],
        results: &mut HashMap<(EntityKind, EntityId), LocationResult>,
    ) -> Result<(), LocationError> {
        let furniture_ids: Vec<EntityId> = unique
            .iter()
            .filter(|(kind, _)| *kind == EntityKind::Furniture)
            .map(|(_, uuid)| *uuid)
            .collect();
        if furniture_ids.is_empty() {
            return Ok(());
        }

        let rooms = self.entities.room_ids_for_furniture(&furniture_ids)?;
        let mut room_ids: Vec<EntityId> = rooms.values().copied().collect();
        room_ids.sort_unstable();
        room_ids.dedup();
        let room_records = self.entities.get_by_ids(EntityKind::Room, &room_ids)?;

        for furniture_uuid in furniture_ids {
            let result = match rooms.get(&furniture_uuid) {
                None => LocationResult::Unplaced,
                Some(room_uuid) => {
                    let room_ref = EntityRef::new(EntityKind::Room, *room_uuid);
                    match room_records.get(room_uuid).filter(|room| room.is_active()) {
                        Some(room) => LocationResult::Resolved {
                            chain: vec![link_for(room_ref, room)],
                        },
                        None => LocationResult::Orphaned {
                            partial_chain: Vec::new(),
                            broken_at: room_ref,
                        },
                    }
                }
            };
            results.insert((EntityKind::Furniture, furniture_uuid), result);
        }
        Ok(())
    }

    /// Fetches current transitions per subject kind and seeds one walk per
    /// placed mobile input. One `latest_for` query per subject kind.
    fn seed_mobile_walks(
        &self,
        unique: &[(EntityKind, EntityId)],
        results: &mut HashMap<(EntityKind, EntityId), LocationResult>,
    ) -> Result<Vec<Walk>, LocationError> {
        let mut by_kind: HashMap<EntityKind, Vec<EntityId>> = HashMap::new();
        for (kind, uuid) in unique {
            if kind.is_mobile() {
                by_kind.entry(*kind).or_default().push(*uuid);
            }
        }

        let mut pending = Vec::new();
        for (kind, ids) in by_kind {
            let latest = self.transitions.latest_for(kind, &ids)?;
            for uuid in ids {
                match latest.get(&uuid) {
                    None => {
                        results.insert((kind, uuid), LocationResult::Unplaced);
                    }
                    Some(transition) => {
                        let start = EntityRef::new(kind, uuid);
                        pending.push(Walk {
                            origin: (kind, uuid),
                            chain: Vec::new(),
                            visited: HashSet::from([start]),
                            destination: transition.destination,
                            depth: 0,
                        });
                    }
                }
            }
        }
        Ok(pending)
    }

    /// Advances all walks level by level until every one terminates.
    ///
    /// Each level batches the lookups for the not-yet-memoized frontier
    /// (one entity query per kind, one transition query per mobile kind),
    /// then every walk advances as far as the memo allows. Returns the
    /// number of levels expanded.
    fn run_walks(
        &self,
        mut pending: Vec<Walk>,
        results: &mut HashMap<(EntityKind, EntityId), LocationResult>,
    ) -> Result<usize, LocationError> {
        let mut memo: HashMap<EntityRef, NodeInfo> = HashMap::new();
        let mut levels = 0;

        while !pending.is_empty() {
            levels += 1;
            self.expand_frontier(&pending, &mut memo)?;

            let mut still_pending = Vec::with_capacity(pending.len());
            'walks: for mut walk in pending {
                loop {
                    let destination = walk.destination;
                    let Some(info) = memo.get(&destination) else {
                        // Unknown node; resolve it next level.
                        still_pending.push(walk);
                        continue 'walks;
                    };

                    if walk.depth == MAX_RESOLUTION_DEPTH {
                        warn!(
                            "event=resolve_depth_exhausted module=location subject={}:{} node={destination}",
                            walk.origin.0, walk.origin.1
                        );
                        results.insert(walk.origin, LocationResult::Unresolvable);
                        continue 'walks;
                    }
                    if !walk.visited.insert(destination) {
                        warn!(
                            "event=resolve_cycle module=location subject={}:{} node={destination}",
                            walk.origin.0, walk.origin.1
                        );
                        results.insert(walk.origin, LocationResult::Unresolvable);
                        continue 'walks;
                    }
                    walk.depth += 1;

                    match info {
                        NodeInfo::Broken => {
                            results.insert(
                                walk.origin,
                                LocationResult::Orphaned {
                                    partial_chain: walk.chain,
                                    broken_at: destination,
                                },
                            );
                            continue 'walks;
                        }
                        NodeInfo::Room(room_link) => {
                            walk.chain.push(room_link.clone());
                            results.insert(
                                walk.origin,
                                LocationResult::Resolved { chain: walk.chain },
                            );
                            continue 'walks;
                        }
                        NodeInfo::Furniture(node_link, next)
                        | NodeInfo::Mobile(node_link, next) => match next {
                            None => {
                                results.insert(
                                    walk.origin,
                                    LocationResult::Orphaned {
                                        partial_chain: walk.chain,
                                        broken_at: destination,
                                    },
                                );
                                continue 'walks;
                            }
                            Some(next) => {
                                walk.chain.push(node_link.clone());
                                walk.destination = *next;
                            }
                        },
                    }
                }
            }
            pending = still_pending;
        }
        Ok(levels)
    }

    /// Memoizes every not-yet-known frontier node with batched lookups.
    fn expand_frontier(
        &self,
        pending: &[Walk],
        memo: &mut HashMap<EntityRef, NodeInfo>,
    ) -> Result<(), LocationError> {
        let mut unknown: Vec<EntityRef> = Vec::new();
        let mut unknown_seen: HashSet<EntityRef> = HashSet::new();
        for walk in pending {
            let destination = walk.destination;
            if !memo.contains_key(&destination) && unknown_seen.insert(destination) {
                unknown.push(destination);
            }
        }
        if unknown.is_empty() {
            return Ok(());
        }

        let mut refs_by_kind: HashMap<EntityKind, Vec<EntityId>> = HashMap::new();
        for node in &unknown {
            refs_by_kind.entry(node.kind).or_default().push(node.uuid);
        }

        let mut records: HashMap<EntityRef, Entity> = HashMap::new();
        for (kind, ids) in &refs_by_kind {
            let fetched = self.entities.get_by_ids(*kind, ids)?;
            for (uuid, entity) in fetched {
                records.insert(EntityRef::new(*kind, uuid), entity);
            }
        }

        // Onward hops for active mobile nodes, one bulk query per kind.
        let mut next_by_ref: HashMap<EntityRef, EntityRef> = HashMap::new();
        for kind in [EntityKind::Place, EntityKind::Container] {
            let ids: Vec<EntityId> = unknown
                .iter()
                .filter(|node| node.kind == kind)
                .filter(|node| records.get(*node).is_some_and(Entity::is_active))
                .map(|node| node.uuid)
                .collect();
            if ids.is_empty() {
                continue;
            }
            let latest = self.transitions.latest_for(kind, &ids)?;
            for (uuid, transition) in latest {
                next_by_ref.insert(EntityRef::new(kind, uuid), transition.destination);
            }
        }

        for node in unknown {
            let info = match records.get(&node).filter(|entity| entity.is_active()) {
                None => NodeInfo::Broken,
                Some(entity) => {
                    let node_link = link_for(node, entity);
                    match node.kind {
                        EntityKind::Room => NodeInfo::Room(node_link),
                        EntityKind::Furniture => NodeInfo::Furniture(
                            node_link,
                            entity
                                .room_uuid
                                .map(|room_uuid| EntityRef::new(EntityKind::Room, room_uuid)),
                        ),
                        EntityKind::Place | EntityKind::Container => {
                            NodeInfo::Mobile(node_link, next_by_ref.get(&node).copied())
                        }
                        // Items are never destinations; repository parsing
                        // rejects such rows before they reach the engine.
                        EntityKind::Item => NodeInfo::Broken,
                    }
                }
            };
            memo.insert(node, info);
        }
        Ok(())
    }

    fn lookup_active(&self, node: EntityRef) -> Result<Option<Entity>, LocationError> {
        let mut fetched = self.entities.get_by_ids(node.kind, &[node.uuid])?;
        Ok(fetched.remove(&node.uuid).filter(Entity::is_active))
    }

    fn latest_destination(
        &self,
        subject: EntityRef,
    ) -> Result<Option<EntityRef>, LocationError> {
        let mut latest = self.transitions.latest_for(subject.kind, &[subject.uuid])?;
        Ok(latest
            .remove(&subject.uuid)
            .map(|transition| transition.destination))
    }
}

fn link_for(node: EntityRef, entity: &Entity) -> ChainLink {
    ChainLink {
        kind: node.kind,
        uuid: node.uuid,
        name: entity.name.clone(),
    }
}
