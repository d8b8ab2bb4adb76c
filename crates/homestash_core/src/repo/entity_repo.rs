//! Entity repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide stable read/write APIs over canonical `entities` storage.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Write paths must call `Entity::validate()` before SQL mutations.
//! - `get_by_ids` returns soft-deleted rows too: resolution distinguishes
//!   "deleted" from "missing", and the soft-delete filter is applied by the
//!   resolvers, uniformly at every hop.
//! - Read paths must reject invalid persisted state instead of masking it.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::entity::{Entity, EntityId, EntityKind, EntityValidationError};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const ENTITY_SELECT_SQL: &str = "SELECT
    uuid,
    kind,
    name,
    room_uuid,
    is_deleted
FROM entities";

pub type EntityRepoResult<T> = Result<T, EntityRepoError>;

/// Errors from entity persistence and query operations.
#[derive(Debug)]
pub enum EntityRepoError {
    /// Record-level invariant violation.
    Validation(EntityValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Target entity does not exist or is soft-deleted.
    NotFound(EntityId),
    /// Target entity exists but is not furniture.
    NotFurniture(EntityId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for EntityRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "entity not found: {id}"),
            Self::NotFurniture(id) => write!(f, "entity is not furniture: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "entity repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "entity repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "entity repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted entity data: {message}"),
        }
    }
}

impl Error for EntityRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EntityValidationError> for EntityRepoError {
    fn from(value: EntityValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for EntityRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for EntityRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for entity lookup and lifecycle operations.
pub trait EntityRepository {
    /// Creates one entity and returns its stable id.
    fn create_entity(&self, entity: &Entity) -> EntityRepoResult<EntityId>;
    /// Loads one entity by id.
    fn get_entity(&self, uuid: EntityId, include_deleted: bool)
        -> EntityRepoResult<Option<Entity>>;
    /// Loads many entities of one kind in a single query.
    ///
    /// Returned map includes soft-deleted rows; absent key means the id does
    /// not exist under that kind.
    fn get_by_ids(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
    ) -> EntityRepoResult<HashMap<EntityId, Entity>>;
    /// Loads the stored room binding for many furniture ids in one query.
    ///
    /// Absent key means the furniture does not exist or has no room set.
    fn room_ids_for_furniture(
        &self,
        ids: &[EntityId],
    ) -> EntityRepoResult<HashMap<EntityId, EntityId>>;
    /// Sets the fixed room binding for one active furniture entity.
    fn set_furniture_room(
        &self,
        furniture_uuid: EntityId,
        room_uuid: EntityId,
    ) -> EntityRepoResult<()>;
    /// Renames one active entity.
    fn rename_entity(&self, uuid: EntityId, name: &str) -> EntityRepoResult<()>;
    /// Soft-deletes one entity by id.
    fn soft_delete_entity(&self, uuid: EntityId) -> EntityRepoResult<()>;
}

/// SQLite-backed entity repository.
pub struct SqliteEntityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntityRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> EntityRepoResult<Self> {
        ensure_entity_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl EntityRepository for SqliteEntityRepository<'_> {
    fn create_entity(&self, entity: &Entity) -> EntityRepoResult<EntityId> {
        entity.validate()?;

        self.conn.execute(
            "INSERT INTO entities (
                uuid,
                kind,
                name,
                room_uuid,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                entity.uuid.to_string(),
                entity.kind.as_str(),
                entity.name.as_str(),
                entity.room_uuid.map(|value| value.to_string()),
                i64::from(entity.is_deleted),
            ],
        )?;

        Ok(entity.uuid)
    }

    fn get_entity(
        &self,
        uuid: EntityId,
        include_deleted: bool,
    ) -> EntityRepoResult<Option<Entity>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ENTITY_SELECT_SQL}
             WHERE uuid = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;

        let mut rows = stmt.query(params![uuid.to_string(), i64::from(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_entity_row(row)?));
        }
        Ok(None)
    }

    fn get_by_ids(
        &self,
        kind: EntityKind,
        ids: &[EntityId],
    ) -> EntityRepoResult<HashMap<EntityId, Entity>> {
        let mut result = HashMap::with_capacity(ids.len());
        if ids.is_empty() {
            return Ok(result);
        }

        let placeholders = (2..ids.len() + 2)
            .map(|position| format!("?{position}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "{ENTITY_SELECT_SQL}
             WHERE kind = ?1
               AND uuid IN ({placeholders});"
        );

        let mut bind_values: Vec<Value> = Vec::with_capacity(ids.len() + 1);
        bind_values.push(Value::from(kind.as_str().to_string()));
        for id in ids {
            bind_values.push(Value::from(id.to_string()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        while let Some(row) = rows.next()? {
            let entity = parse_entity_row(row)?;
            result.insert(entity.uuid, entity);
        }
        Ok(result)
    }

    fn room_ids_for_furniture(
        &self,
        ids: &[EntityId],
    ) -> EntityRepoResult<HashMap<EntityId, EntityId>> {
        let mut result = HashMap::with_capacity(ids.len());
        if ids.is_empty() {
            return Ok(result);
        }

        let placeholders = (1..=ids.len())
            .map(|position| format!("?{position}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT uuid, room_uuid
             FROM entities
             WHERE kind = 'furniture'
               AND room_uuid IS NOT NULL
               AND uuid IN ({placeholders});"
        );

        let bind_values = ids
            .iter()
            .map(|id| Value::from(id.to_string()))
            .collect::<Vec<_>>();

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        while let Some(row) = rows.next()? {
            let furniture_text: String = row.get(0)?;
            let room_text: String = row.get(1)?;
            result.insert(
                parse_uuid(&furniture_text, "entities.uuid")?,
                parse_uuid(&room_text, "entities.room_uuid")?,
            );
        }
        Ok(result)
    }

    fn set_furniture_room(
        &self,
        furniture_uuid: EntityId,
        room_uuid: EntityId,
    ) -> EntityRepoResult<()> {
        let kind: Option<String> = self
            .conn
            .query_row(
                "SELECT kind
                 FROM entities
                 WHERE uuid = ?1
                   AND is_deleted = 0;",
                [furniture_uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match kind.as_deref() {
            None => return Err(EntityRepoError::NotFound(furniture_uuid)),
            Some("furniture") => {}
            Some(_) => return Err(EntityRepoError::NotFurniture(furniture_uuid)),
        }

        self.conn.execute(
            "UPDATE entities
             SET room_uuid = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND is_deleted = 0;",
            params![furniture_uuid.to_string(), room_uuid.to_string()],
        )?;
        Ok(())
    }

    fn rename_entity(&self, uuid: EntityId, name: &str) -> EntityRepoResult<()> {
        if name.trim().is_empty() {
            return Err(EntityRepoError::Validation(EntityValidationError::BlankName));
        }

        let changed = self.conn.execute(
            "UPDATE entities
             SET name = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND is_deleted = 0;",
            params![uuid.to_string(), name],
        )?;
        if changed == 0 {
            return Err(EntityRepoError::NotFound(uuid));
        }
        Ok(())
    }

    fn soft_delete_entity(&self, uuid: EntityId) -> EntityRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE entities
             SET is_deleted = 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND is_deleted = 0;",
            [uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(EntityRepoError::NotFound(uuid));
        }
        Ok(())
    }
}

fn parse_entity_row(row: &Row<'_>) -> EntityRepoResult<Entity> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "entities.uuid")?;

    let kind_text: String = row.get("kind")?;
    let kind = EntityKind::parse(&kind_text).ok_or_else(|| {
        EntityRepoError::InvalidData(format!("invalid entity kind `{kind_text}` in entities.kind"))
    })?;

    let room_uuid = row
        .get::<_, Option<String>>("room_uuid")?
        .map(|value| parse_uuid(&value, "entities.room_uuid"))
        .transpose()?;

    let is_deleted = match row.get::<_, i64>("is_deleted")? {
        0 => false,
        1 => true,
        other => {
            return Err(EntityRepoError::InvalidData(format!(
                "invalid is_deleted value `{other}` in entities.is_deleted"
            )));
        }
    };

    Ok(Entity {
        uuid,
        kind,
        name: row.get("name")?,
        room_uuid,
        is_deleted,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> EntityRepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| EntityRepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn ensure_entity_connection_ready(conn: &Connection) -> EntityRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(EntityRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "entities")? {
        return Err(EntityRepoError::MissingRequiredTable("entities"));
    }

    for column in ["uuid", "kind", "name", "room_uuid", "is_deleted"] {
        if !table_has_column(conn, "entities", column)? {
            return Err(EntityRepoError::MissingRequiredColumn {
                table: "entities",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> EntityRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> EntityRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
