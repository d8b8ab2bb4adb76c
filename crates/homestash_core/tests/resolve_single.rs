use homestash_core::db::open_db_in_memory;
use homestash_core::{
    ChainLink, Entity, EntityKind, EntityRef, EntityRepository, LocationError, LocationResult,
    LocationService, SqliteEntityRepository, SqliteTransitionRepository, TransitionRepository,
    MAX_RESOLUTION_DEPTH,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn create(conn: &Connection, kind: EntityKind, name: &str) -> Entity {
    let entity = Entity::new(kind, name);
    SqliteEntityRepository::try_new(conn)
        .unwrap()
        .create_entity(&entity)
        .unwrap();
    entity
}

fn create_furniture_in(conn: &Connection, name: &str, room: &Entity) -> Entity {
    let mut furniture = Entity::new(EntityKind::Furniture, name);
    furniture.room_uuid = Some(room.uuid);
    SqliteEntityRepository::try_new(conn)
        .unwrap()
        .create_entity(&furniture)
        .unwrap();
    furniture
}

fn move_to(conn: &Connection, subject: &Entity, destination: &Entity) {
    SqliteTransitionRepository::try_new(conn)
        .unwrap()
        .append(subject.entity_ref(), destination.entity_ref())
        .unwrap();
}

fn locator(
    conn: &Connection,
) -> LocationService<SqliteTransitionRepository<'_>, SqliteEntityRepository<'_>> {
    LocationService::new(
        SqliteTransitionRepository::try_new(conn).unwrap(),
        SqliteEntityRepository::try_new(conn).unwrap(),
    )
}

fn link(entity: &Entity) -> ChainLink {
    ChainLink {
        kind: entity.kind,
        uuid: entity.uuid,
        name: entity.name.clone(),
    }
}

#[test]
fn item_in_place_in_room_resolves_full_chain() {
    let conn = setup();
    let room = create(&conn, EntityKind::Room, "Living room");
    let place = create(&conn, EntityKind::Place, "Bookshelf");
    let item = create(&conn, EntityKind::Item, "Atlas");
    move_to(&conn, &place, &room);
    move_to(&conn, &item, &place);

    let result = locator(&conn).resolve(EntityKind::Item, item.uuid).unwrap();
    assert_eq!(
        result,
        LocationResult::Resolved {
            chain: vec![link(&place), link(&room)],
        }
    );
}

#[test]
fn nested_containers_resolve_in_order() {
    let conn = setup();
    let room = create(&conn, EntityKind::Room, "Garage");
    let outer = create(&conn, EntityKind::Container, "Shelving crate");
    let inner = create(&conn, EntityKind::Container, "Screw box");
    let item = create(&conn, EntityKind::Item, "Wood screws");
    move_to(&conn, &outer, &room);
    move_to(&conn, &inner, &outer);
    move_to(&conn, &item, &inner);

    let result = locator(&conn).resolve(EntityKind::Item, item.uuid).unwrap();
    assert_eq!(
        result,
        LocationResult::Resolved {
            chain: vec![link(&inner), link(&outer), link(&room)],
        }
    );
}

#[test]
fn destination_without_own_transition_is_orphaned_not_unplaced() {
    let conn = setup();
    let place = create(&conn, EntityKind::Place, "Unanchored shelf");
    let item = create(&conn, EntityKind::Item, "Vase");
    move_to(&conn, &item, &place);

    let result = locator(&conn).resolve(EntityKind::Item, item.uuid).unwrap();
    assert_eq!(
        result,
        LocationResult::Orphaned {
            partial_chain: vec![],
            broken_at: place.entity_ref(),
        }
    );
}

#[test]
fn entity_without_transitions_is_unplaced() {
    let conn = setup();
    let item = create(&conn, EntityKind::Item, "Unsorted cable");

    let result = locator(&conn).resolve(EntityKind::Item, item.uuid).unwrap();
    assert_eq!(result, LocationResult::Unplaced);
}

#[test]
fn cyclic_containers_are_unresolvable() {
    let conn = setup();
    let first = create(&conn, EntityKind::Container, "Box A");
    let second = create(&conn, EntityKind::Container, "Box B");
    move_to(&conn, &first, &second);
    move_to(&conn, &second, &first);

    let service = locator(&conn);
    assert_eq!(
        service.resolve(EntityKind::Container, first.uuid).unwrap(),
        LocationResult::Unresolvable
    );
    assert_eq!(
        service.resolve(EntityKind::Container, second.uuid).unwrap(),
        LocationResult::Unresolvable
    );
}

#[test]
fn self_referencing_container_is_unresolvable() {
    let conn = setup();
    let container = create(&conn, EntityKind::Container, "Klein box");
    move_to(&conn, &container, &container);

    let result = locator(&conn)
        .resolve(EntityKind::Container, container.uuid)
        .unwrap();
    assert_eq!(result, LocationResult::Unresolvable);
}

#[test]
fn furniture_resolves_to_its_stored_room() {
    let conn = setup();
    let room = create(&conn, EntityKind::Room, "Bedroom");
    let wardrobe = create_furniture_in(&conn, "Wardrobe", &room);

    let result = locator(&conn)
        .resolve(EntityKind::Furniture, wardrobe.uuid)
        .unwrap();
    assert_eq!(
        result,
        LocationResult::Resolved {
            chain: vec![link(&room)],
        }
    );
}

#[test]
fn furniture_without_room_is_unplaced() {
    let conn = setup();
    let bench = create(&conn, EntityKind::Furniture, "Unassembled bench");

    let result = locator(&conn)
        .resolve(EntityKind::Furniture, bench.uuid)
        .unwrap();
    assert_eq!(result, LocationResult::Unplaced);
}

#[test]
fn furniture_in_deleted_room_is_orphaned() {
    let conn = setup();
    let room = create(&conn, EntityKind::Room, "Old office");
    let desk = create_furniture_in(&conn, "Desk", &room);
    SqliteEntityRepository::try_new(&conn)
        .unwrap()
        .soft_delete_entity(room.uuid)
        .unwrap();

    let result = locator(&conn)
        .resolve(EntityKind::Furniture, desk.uuid)
        .unwrap();
    assert_eq!(
        result,
        LocationResult::Orphaned {
            partial_chain: vec![],
            broken_at: room.entity_ref(),
        }
    );
}

#[test]
fn item_on_furniture_resolves_in_exactly_two_hops() {
    let conn = setup();
    let room = create(&conn, EntityKind::Room, "Living room");
    let sideboard = create_furniture_in(&conn, "Sideboard", &room);
    let item = create(&conn, EntityKind::Item, "Key bowl");
    move_to(&conn, &item, &sideboard);

    // Unrelated log noise must not change the chain shape.
    let other_room = create(&conn, EntityKind::Room, "Hallway");
    let other_item = create(&conn, EntityKind::Item, "Umbrella");
    move_to(&conn, &other_item, &other_room);

    let result = locator(&conn).resolve(EntityKind::Item, item.uuid).unwrap();
    assert_eq!(
        result,
        LocationResult::Resolved {
            chain: vec![link(&sideboard), link(&room)],
        }
    );
}

#[test]
fn roomless_furniture_hop_breaks_the_chain() {
    let conn = setup();
    let bench = create(&conn, EntityKind::Furniture, "Unassembled bench");
    let item = create(&conn, EntityKind::Item, "Clamp");
    move_to(&conn, &item, &bench);

    let result = locator(&conn).resolve(EntityKind::Item, item.uuid).unwrap();
    assert_eq!(
        result,
        LocationResult::Orphaned {
            partial_chain: vec![],
            broken_at: bench.entity_ref(),
        }
    );
}

#[test]
fn soft_deleted_intermediate_ancestor_orphans_with_prior_chain() {
    let conn = setup();
    let room = create(&conn, EntityKind::Room, "Garage");
    let outer = create(&conn, EntityKind::Container, "Big crate");
    let inner = create(&conn, EntityKind::Container, "Parts box");
    let item = create(&conn, EntityKind::Item, "Hinge");
    move_to(&conn, &outer, &room);
    move_to(&conn, &inner, &outer);
    move_to(&conn, &item, &inner);

    SqliteEntityRepository::try_new(&conn)
        .unwrap()
        .soft_delete_entity(outer.uuid)
        .unwrap();

    let result = locator(&conn).resolve(EntityKind::Item, item.uuid).unwrap();
    assert_eq!(
        result,
        LocationResult::Orphaned {
            partial_chain: vec![link(&inner)],
            broken_at: outer.entity_ref(),
        }
    );
}

#[test]
fn missing_destination_is_orphaned_at_first_hop() {
    let conn = setup();
    let item = create(&conn, EntityKind::Item, "Remote");
    let ghost = EntityRef::new(EntityKind::Container, Uuid::new_v4());
    SqliteTransitionRepository::try_new(&conn)
        .unwrap()
        .append(item.entity_ref(), ghost)
        .unwrap();

    let result = locator(&conn).resolve(EntityKind::Item, item.uuid).unwrap();
    assert_eq!(
        result,
        LocationResult::Orphaned {
            partial_chain: vec![],
            broken_at: ghost,
        }
    );
}

#[test]
fn resolve_follows_only_the_latest_transition() {
    let conn = setup();
    let room_a = create(&conn, EntityKind::Room, "Garage");
    let room_b = create(&conn, EntityKind::Room, "Attic");
    let item = create(&conn, EntityKind::Item, "Fan");
    move_to(&conn, &item, &room_a);
    move_to(&conn, &item, &room_b);

    let result = locator(&conn).resolve(EntityKind::Item, item.uuid).unwrap();
    assert_eq!(
        result,
        LocationResult::Resolved {
            chain: vec![link(&room_b)],
        }
    );
}

#[test]
fn chains_deeper_than_the_bound_are_unresolvable() {
    let conn = setup();
    let room = create(&conn, EntityKind::Room, "Garage");

    let mut containers = Vec::new();
    for index in 0..=MAX_RESOLUTION_DEPTH {
        containers.push(create(&conn, EntityKind::Container, &format!("Nest {index}")));
    }
    // Outermost container sits in the room; each next one nests inside it.
    move_to(&conn, &containers[0], &room);
    for index in 1..containers.len() {
        move_to(&conn, &containers[index], &containers[index - 1]);
    }
    let item = create(&conn, EntityKind::Item, "Needle");
    move_to(&conn, &item, containers.last().unwrap());

    // The item needs MAX_RESOLUTION_DEPTH + 2 hops to reach the room.
    let result = locator(&conn).resolve(EntityKind::Item, item.uuid).unwrap();
    assert_eq!(result, LocationResult::Unresolvable);

    // The outermost container itself resolves fine.
    let result = locator(&conn)
        .resolve(EntityKind::Container, containers[0].uuid)
        .unwrap();
    assert_eq!(
        result,
        LocationResult::Resolved {
            chain: vec![link(&room)],
        }
    );
}

#[test]
fn resolve_is_idempotent_without_intervening_appends() {
    let conn = setup();
    let room = create(&conn, EntityKind::Room, "Garage");
    let place = create(&conn, EntityKind::Place, "Pegboard");
    let item = create(&conn, EntityKind::Item, "Wrench");
    move_to(&conn, &place, &room);
    move_to(&conn, &item, &place);

    let service = locator(&conn);
    let first = service.resolve(EntityKind::Item, item.uuid).unwrap();
    let second = service.resolve(EntityKind::Item, item.uuid).unwrap();
    assert_eq!(first, second);
}

#[test]
fn rooms_are_not_resolvable() {
    let conn = setup();
    let room = create(&conn, EntityKind::Room, "Garage");

    let err = locator(&conn)
        .resolve(EntityKind::Room, room.uuid)
        .unwrap_err();
    assert!(matches!(err, LocationError::NotResolvable(EntityKind::Room)));
}

#[test]
fn location_result_serializes_with_status_tag() {
    let conn = setup();
    let room = create(&conn, EntityKind::Room, "Garage");
    let item = create(&conn, EntityKind::Item, "Drill");
    move_to(&conn, &item, &room);

    let result = locator(&conn).resolve(EntityKind::Item, item.uuid).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["status"], "resolved");
    assert_eq!(json["chain"][0]["kind"], "room");
    assert_eq!(json["chain"][0]["name"], "Garage");

    let unplaced = serde_json::to_value(LocationResult::Unplaced).unwrap();
    assert_eq!(unplaced["status"], "unplaced");
}
