use homestash_core::db::open_db_in_memory;
use homestash_core::{
    Entity, EntityKind, EntityRepoError, EntityRepository, EntityValidationError,
    SqliteEntityRepository,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

#[test]
fn validate_rejects_blank_name() {
    let entity = Entity::new(EntityKind::Item, "   ");
    assert_eq!(entity.validate(), Err(EntityValidationError::BlankName));
}

#[test]
fn validate_rejects_room_attribute_on_non_furniture() {
    let mut entity = Entity::new(EntityKind::Container, "Toolbox");
    entity.room_uuid = Some(Uuid::new_v4());
    assert_eq!(
        entity.validate(),
        Err(EntityValidationError::RoomAttributeOnNonFurniture(
            EntityKind::Container
        ))
    );
}

#[test]
fn soft_delete_helpers_flip_tombstone() {
    let mut entity = Entity::new(EntityKind::Place, "Desk corner");
    assert!(entity.is_active());

    entity.soft_delete();
    assert!(entity.is_deleted);
    assert!(!entity.is_active());

    entity.restore();
    assert!(entity.is_active());
}

#[test]
fn kind_predicates_match_containment_rules() {
    assert!(EntityKind::Item.is_subject());
    assert!(EntityKind::Place.is_subject());
    assert!(EntityKind::Container.is_subject());
    assert!(!EntityKind::Room.is_subject());
    assert!(!EntityKind::Furniture.is_subject());

    assert!(EntityKind::Room.is_destination());
    assert!(EntityKind::Furniture.is_destination());
    assert!(!EntityKind::Item.is_destination());
}

#[test]
fn create_and_get_roundtrip() {
    let conn = setup();
    let repo = SqliteEntityRepository::try_new(&conn).unwrap();

    let entity = Entity::new(EntityKind::Container, "Blue bin");
    let id = repo.create_entity(&entity).unwrap();

    let loaded = repo.get_entity(id, false).unwrap().unwrap();
    assert_eq!(loaded.uuid, entity.uuid);
    assert_eq!(loaded.kind, EntityKind::Container);
    assert_eq!(loaded.name, "Blue bin");
    assert_eq!(loaded.room_uuid, None);
    assert!(!loaded.is_deleted);
}

#[test]
fn create_preserves_furniture_room_attribute() {
    let conn = setup();
    let repo = SqliteEntityRepository::try_new(&conn).unwrap();

    let room = Entity::new(EntityKind::Room, "Bedroom");
    repo.create_entity(&room).unwrap();

    let mut wardrobe = Entity::new(EntityKind::Furniture, "Wardrobe");
    wardrobe.room_uuid = Some(room.uuid);
    repo.create_entity(&wardrobe).unwrap();

    let loaded = repo.get_entity(wardrobe.uuid, false).unwrap().unwrap();
    assert_eq!(loaded.room_uuid, Some(room.uuid));
}

#[test]
fn get_by_ids_is_scoped_by_kind_and_includes_deleted_rows() {
    let conn = setup();
    let repo = SqliteEntityRepository::try_new(&conn).unwrap();

    let item = Entity::new(EntityKind::Item, "Drill");
    repo.create_entity(&item).unwrap();
    let mut deleted_item = Entity::new(EntityKind::Item, "Broken lamp");
    deleted_item.soft_delete();
    repo.create_entity(&deleted_item).unwrap();
    let place = Entity::new(EntityKind::Place, "Shelf");
    repo.create_entity(&place).unwrap();

    let fetched = repo
        .get_by_ids(
            EntityKind::Item,
            &[item.uuid, deleted_item.uuid, place.uuid, Uuid::new_v4()],
        )
        .unwrap();

    assert_eq!(fetched.len(), 2);
    assert!(fetched[&item.uuid].is_active());
    assert!(fetched[&deleted_item.uuid].is_deleted);
    // Kind mismatch behaves like a missing row.
    assert!(!fetched.contains_key(&place.uuid));
}

#[test]
fn get_by_ids_with_empty_input_is_empty() {
    let conn = setup();
    let repo = SqliteEntityRepository::try_new(&conn).unwrap();
    assert!(repo.get_by_ids(EntityKind::Room, &[]).unwrap().is_empty());
}

#[test]
fn room_ids_for_furniture_maps_only_bound_furniture() {
    let conn = setup();
    let repo = SqliteEntityRepository::try_new(&conn).unwrap();

    let room = Entity::new(EntityKind::Room, "Garage");
    repo.create_entity(&room).unwrap();

    let mut bench = Entity::new(EntityKind::Furniture, "Workbench");
    bench.room_uuid = Some(room.uuid);
    repo.create_entity(&bench).unwrap();

    let loose_shelf = Entity::new(EntityKind::Furniture, "Unassembled shelf");
    repo.create_entity(&loose_shelf).unwrap();

    let rooms = repo
        .room_ids_for_furniture(&[bench.uuid, loose_shelf.uuid])
        .unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[&bench.uuid], room.uuid);
}

#[test]
fn set_furniture_room_rejects_non_furniture_target() {
    let conn = setup();
    let repo = SqliteEntityRepository::try_new(&conn).unwrap();

    let room = Entity::new(EntityKind::Room, "Kitchen");
    repo.create_entity(&room).unwrap();
    let item = Entity::new(EntityKind::Item, "Kettle");
    repo.create_entity(&item).unwrap();

    let err = repo.set_furniture_room(item.uuid, room.uuid).unwrap_err();
    assert!(matches!(err, EntityRepoError::NotFurniture(id) if id == item.uuid));

    let err = repo
        .set_furniture_room(Uuid::new_v4(), room.uuid)
        .unwrap_err();
    assert!(matches!(err, EntityRepoError::NotFound(_)));
}

#[test]
fn soft_delete_hides_entity_from_default_reads() {
    let conn = setup();
    let repo = SqliteEntityRepository::try_new(&conn).unwrap();

    let entity = Entity::new(EntityKind::Place, "Window sill");
    repo.create_entity(&entity).unwrap();
    repo.soft_delete_entity(entity.uuid).unwrap();

    assert!(repo.get_entity(entity.uuid, false).unwrap().is_none());
    let loaded = repo.get_entity(entity.uuid, true).unwrap().unwrap();
    assert!(loaded.is_deleted);

    let err = repo.soft_delete_entity(entity.uuid).unwrap_err();
    assert!(matches!(err, EntityRepoError::NotFound(id) if id == entity.uuid));
}

#[test]
fn rename_rejects_blank_and_missing() {
    let conn = setup();
    let repo = SqliteEntityRepository::try_new(&conn).unwrap();

    let entity = Entity::new(EntityKind::Item, "Label maker");
    repo.create_entity(&entity).unwrap();

    repo.rename_entity(entity.uuid, "Labeler").unwrap();
    let loaded = repo.get_entity(entity.uuid, false).unwrap().unwrap();
    assert_eq!(loaded.name, "Labeler");

    let err = repo.rename_entity(entity.uuid, "  ").unwrap_err();
    assert!(matches!(
        err,
        EntityRepoError::Validation(EntityValidationError::BlankName)
    ));

    let err = repo.rename_entity(Uuid::new_v4(), "Ghost").unwrap_err();
    assert!(matches!(err, EntityRepoError::NotFound(_)));
}
