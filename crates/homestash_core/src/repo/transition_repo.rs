//! Transition log repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the append-only write path for movement events.
//! - Answer "most recent transition per subject" for arbitrary id sets in a
//!   bounded number of queries.
//!
//! # Invariants
//! - `transitions` rows are never updated or deleted through this layer;
//!   moving an entity back is a new append.
//! - Endpoint kinds are validated before any SQL mutation.
//! - `latest_for` issues exactly one query regardless of the id count.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::entity::{EntityId, EntityKind, EntityRef};
use crate::model::transition::{Transition, TransitionValidationError};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const TRANSITION_SELECT_COLUMNS: &str = "id,
    subject_kind,
    subject_uuid,
    destination_kind,
    destination_uuid,
    created_at";

pub type TransitionRepoResult<T> = Result<T, TransitionRepoError>;

/// Errors from transition log operations.
#[derive(Debug)]
pub enum TransitionRepoError {
    /// Endpoint kind rejected on append.
    Validation(TransitionValidationError),
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
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

impl Display for TransitionRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "transition repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "transition repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "transition repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted transition data: {message}")
            }
        }
    }
}

impl Error for TransitionRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransitionValidationError> for TransitionRepoError {
    fn from(value: TransitionValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for TransitionRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for TransitionRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for the append-only transition log.
pub trait TransitionRepository {
    /// Appends one movement event and returns the stored record.
    ///
    /// Fails with `InvalidSubject`/`InvalidDestination` when endpoint kinds
    /// violate the log contract. There is no update or delete counterpart.
    fn append(
        &self,
        subject: EntityRef,
        destination: EntityRef,
    ) -> TransitionRepoResult<Transition>;
    /// Loads the most recent transition per subject id in one query.
    ///
    /// Recency is `created_at` descending, ties broken by highest `id`.
    /// Absent key means the subject has no recorded transition.
    fn latest_for(
        &self,
        subject_kind: EntityKind,
        ids: &[EntityId],
    ) -> TransitionRepoResult<HashMap<EntityId, Transition>>;
    /// Loads the full movement history for one subject, newest first.
    fn history_for(&self, subject: EntityRef) -> TransitionRepoResult<Vec<Transition>>;
}

/// SQLite-backed transition log repository.
pub struct SqliteTransitionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTransitionRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> TransitionRepoResult<Self> {
        ensure_transition_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl TransitionRepository for SqliteTransitionRepository<'_> {
    fn append(
        &self,
        subject: EntityRef,
        destination: EntityRef,
    ) -> TransitionRepoResult<Transition> {
        Transition::validate_endpoints(subject, destination)?;

        self.conn.execute(
            "INSERT INTO transitions (
                subject_kind,
                subject_uuid,
                destination_kind,
                destination_uuid
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                subject.kind.as_str(),
                subject.uuid.to_string(),
                destination.kind.as_str(),
                destination.uuid.to_string(),
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRANSITION_SELECT_COLUMNS}
             FROM transitions
             WHERE id = ?1;"
        ))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => parse_transition_row(row),
            None => Err(TransitionRepoError::InvalidData(format!(
                "appended transition {id} not readable"
            ))),
        }
    }

    fn latest_for(
        &self,
        subject_kind: EntityKind,
        ids: &[EntityId],
    ) -> TransitionRepoResult<HashMap<EntityId, Transition>> {
        if !subject_kind.is_subject() {
            return Err(TransitionValidationError::InvalidSubject(subject_kind).into());
        }

        let mut result = HashMap::with_capacity(ids.len());
        if ids.is_empty() {
            return Ok(result);
        }

        let placeholders = (2..ids.len() + 2)
            .map(|position| format!("?{position}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {TRANSITION_SELECT_COLUMNS}
             FROM (
                SELECT
                    id,
                    subject_kind,
                    subject_uuid,
                    destination_kind,
                    destination_uuid,
                    created_at,
                    ROW_NUMBER() OVER (
                        PARTITION BY subject_uuid
                        ORDER BY created_at DESC, id DESC
                    ) AS recency_rank
                FROM transitions
                WHERE subject_kind = ?1
                  AND subject_uuid IN ({placeholders})
             )
             WHERE recency_rank = 1;"
        );

        let mut bind_values: Vec<Value> = Vec::with_capacity(ids.len() + 1);
        bind_values.push(Value::from(subject_kind.as_str().to_string()));
        for id in ids {
            bind_values.push(Value::from(id.to_string()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        while let Some(row) = rows.next()? {
            let transition = parse_transition_row(row)?;
            result.insert(transition.subject.uuid, transition);
        }
        Ok(result)
    }

    fn history_for(&self, subject: EntityRef) -> TransitionRepoResult<Vec<Transition>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TRANSITION_SELECT_COLUMNS}
             FROM transitions
             WHERE subject_kind = ?1
               AND subject_uuid = ?2
             ORDER BY created_at DESC, id DESC;"
        ))?;

        let mut rows = stmt.query(params![subject.kind.as_str(), subject.uuid.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_transition_row(row)?);
        }
        Ok(items)
    }
}

fn parse_transition_row(row: &Row<'_>) -> TransitionRepoResult<Transition> {
    let subject_kind = parse_kind(row, "subject_kind")?;
    if !subject_kind.is_subject() {
        return Err(TransitionRepoError::InvalidData(format!(
            "non-subject kind `{subject_kind}` in transitions.subject_kind"
        )));
    }

    let destination_kind = parse_kind(row, "destination_kind")?;
    if !destination_kind.is_destination() {
        return Err(TransitionRepoError::InvalidData(format!(
            "non-destination kind `{destination_kind}` in transitions.destination_kind"
        )));
    }

    let subject_uuid_text: String = row.get("subject_uuid")?;
    let destination_uuid_text: String = row.get("destination_uuid")?;

    Ok(Transition {
        id: row.get("id")?,
        subject: EntityRef::new(
            subject_kind,
            parse_uuid(&subject_uuid_text, "transitions.subject_uuid")?,
        ),
        destination: EntityRef::new(
            destination_kind,
            parse_uuid(&destination_uuid_text, "transitions.destination_uuid")?,
        ),
        created_at: row.get("created_at")?,
    })
}

fn parse_kind(row: &Row<'_>, column: &'static str) -> TransitionRepoResult<EntityKind> {
    let text: String = row.get(column)?;
    EntityKind::parse(&text).ok_or_else(|| {
        TransitionRepoError::InvalidData(format!(
            "invalid entity kind `{text}` in transitions.{column}"
        ))
    })
}

fn parse_uuid(value: &str, column: &'static str) -> TransitionRepoResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        TransitionRepoError::InvalidData(format!("invalid uuid `{value}` in {column}"))
    })
}

fn ensure_transition_connection_ready(conn: &Connection) -> TransitionRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(TransitionRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "transitions")? {
        return Err(TransitionRepoError::MissingRequiredTable("transitions"));
    }

    for column in [
        "id",
        "subject_kind",
        "subject_uuid",
        "destination_kind",
        "destination_uuid",
        "created_at",
    ] {
        if !table_has_column(conn, "transitions", column)? {
            return Err(TransitionRepoError::MissingRequiredColumn {
                table: "transitions",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> TransitionRepoResult<bool> {
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

fn table_has_column(conn: &Connection, table: &str, column: &str) -> TransitionRepoResult<bool> {
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
