use crate::domain::models::{SourceType, TimeBlock};
use crate::infrastructure::error::CoreError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub fn initialize_database(path: &Path) -> Result<(), CoreError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Persistence seam for time blocks. Every write is a full-row upsert so
/// lifecycle transitions never need per-column statements.
pub trait BlockStore: Send + Sync {
    fn find(&self, id: &str) -> Result<Option<TimeBlock>, CoreError>;

    /// All blocks with `start_time` inside `[from, to)`, excluded ones
    /// included, ordered by start.
    fn list_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeBlock>, CoreError>;

    fn save(&self, block: &TimeBlock) -> Result<(), CoreError>;

    fn save_many(&self, blocks: &[TimeBlock]) -> Result<(), CoreError>;

    /// Physically removes auto blocks in `[from, to)`. Only the regeneration
    /// path calls this; everything else soft-deletes via `excluded`.
    fn delete_auto_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize, CoreError>;
}

#[derive(Debug, Clone)]
pub struct SqliteBlockStore {
    db_path: PathBuf,
}

impl SqliteBlockStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, CoreError> {
        Connection::open(&self.db_path).map_err(CoreError::from)
    }
}

fn conversion_failure(
    index: usize,
    message: String,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn parse_timestamp(raw: &str, index: usize, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| {
            conversion_failure(index, format!("invalid time_blocks.{column} '{raw}': {error}"))
        })
}

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<TimeBlock> {
    let start_time_raw: String = row.get(1)?;
    let end_time_raw: String = row.get(2)?;
    let source_type_raw: String = row.get(4)?;
    let deleted_at_raw: Option<String> = row.get(5)?;
    let created_at_raw: String = row.get(6)?;
    let updated_at_raw: String = row.get(7)?;

    let source_type: SourceType = source_type_raw
        .parse()
        .map_err(|message: String| conversion_failure(4, message))?;

    Ok(TimeBlock {
        id: row.get(0)?,
        start_time: parse_timestamp(&start_time_raw, 1, "start_time")?,
        end_time: parse_timestamp(&end_time_raw, 2, "end_time")?,
        approved: row.get(3)?,
        source_type,
        deleted_at: deleted_at_raw
            .as_deref()
            .map(|raw| parse_timestamp(raw, 5, "deleted_at"))
            .transpose()?,
        created_at: parse_timestamp(&created_at_raw, 6, "created_at")?,
        updated_at: parse_timestamp(&updated_at_raw, 7, "updated_at")?,
    })
}

const SELECT_COLUMNS: &str =
    "id, start_time, end_time, approved, source_type, deleted_at, created_at, updated_at";

fn upsert(connection: &Connection, block: &TimeBlock) -> Result<(), CoreError> {
    connection.execute(
        "INSERT INTO time_blocks
             (id, start_time, end_time, approved, source_type, deleted_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
             start_time = excluded.start_time,
             end_time = excluded.end_time,
             approved = excluded.approved,
             source_type = excluded.source_type,
             deleted_at = excluded.deleted_at,
             updated_at = excluded.updated_at",
        params![
            block.id,
            block.start_time.to_rfc3339(),
            block.end_time.to_rfc3339(),
            block.approved,
            block.source_type.as_str(),
            block.deleted_at.map(|deleted_at| deleted_at.to_rfc3339()),
            block.created_at.to_rfc3339(),
            block.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

impl BlockStore for SqliteBlockStore {
    fn find(&self, id: &str) -> Result<Option<TimeBlock>, CoreError> {
        let connection = self.connect()?;
        let block = connection
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM time_blocks WHERE id = ?1"),
                params![id],
                block_from_row,
            )
            .optional()?;
        Ok(block)
    }

    fn list_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeBlock>, CoreError> {
        let connection = self.connect()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM time_blocks
             WHERE start_time >= ?1 AND start_time < ?2
             ORDER BY start_time"
        ))?;
        let rows = statement.query_map(
            params![from.to_rfc3339(), to.to_rfc3339()],
            block_from_row,
        )?;

        let mut blocks = Vec::new();
        for row in rows {
            blocks.push(row?);
        }
        Ok(blocks)
    }

    fn save(&self, block: &TimeBlock) -> Result<(), CoreError> {
        block.validate().map_err(CoreError::Validation)?;
        let connection = self.connect()?;
        upsert(&connection, block)
    }

    fn save_many(&self, blocks: &[TimeBlock]) -> Result<(), CoreError> {
        for block in blocks {
            block.validate().map_err(CoreError::Validation)?;
        }
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        for block in blocks {
            upsert(&transaction, block)?;
        }
        transaction.commit()?;
        Ok(())
    }

    fn delete_auto_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize, CoreError> {
        let connection = self.connect()?;
        let deleted = connection.execute(
            "DELETE FROM time_blocks
             WHERE source_type = 'auto' AND start_time >= ?1 AND start_time < ?2",
            params![from.to_rfc3339(), to.to_rfc3339()],
        )?;
        Ok(deleted)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBlockStore {
    blocks: Mutex<Vec<TimeBlock>>,
}

impl InMemoryBlockStore {
    fn locked(&self) -> Result<std::sync::MutexGuard<'_, Vec<TimeBlock>>, CoreError> {
        self.blocks
            .lock()
            .map_err(|error| CoreError::InvalidConfig(format!("block store lock poisoned: {error}")))
    }
}

impl BlockStore for InMemoryBlockStore {
    fn find(&self, id: &str) -> Result<Option<TimeBlock>, CoreError> {
        let blocks = self.locked()?;
        Ok(blocks.iter().find(|block| block.id == id).cloned())
    }

    fn list_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimeBlock>, CoreError> {
        let blocks = self.locked()?;
        let mut selected: Vec<TimeBlock> = blocks
            .iter()
            .filter(|block| block.start_time >= from && block.start_time < to)
            .cloned()
            .collect();
        selected.sort_by(|left, right| left.start_time.cmp(&right.start_time));
        Ok(selected)
    }

    fn save(&self, block: &TimeBlock) -> Result<(), CoreError> {
        block.validate().map_err(CoreError::Validation)?;
        let mut blocks = self.locked()?;
        if let Some(existing) = blocks.iter_mut().find(|existing| existing.id == block.id) {
            *existing = block.clone();
        } else {
            blocks.push(block.clone());
        }
        Ok(())
    }

    fn save_many(&self, blocks: &[TimeBlock]) -> Result<(), CoreError> {
        for block in blocks {
            self.save(block)?;
        }
        Ok(())
    }

    fn delete_auto_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<usize, CoreError> {
        let mut blocks = self.locked()?;
        let before = blocks.len();
        blocks.retain(|block| {
            block.source_type != SourceType::Auto
                || block.start_time < from
                || block.start_time >= to
        });
        Ok(before - blocks.len())
    }
}
