//! Ingestion cursor persistence.

use crate::model::artifact::IngestionCursor;
use crate::repo::{StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension};

/// Repository interface for per-file ingestion cursors.
pub trait CursorRepository {
    fn get_cursor(&self, file_path: &str) -> StoreResult<Option<IngestionCursor>>;
    fn save_cursor(&self, cursor: &IngestionCursor) -> StoreResult<()>;
}

/// SQLite-backed cursor repository over `ingested_files`.
pub struct SqliteCursorRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCursorRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CursorRepository for SqliteCursorRepository<'_> {
    fn get_cursor(&self, file_path: &str) -> StoreResult<Option<IngestionCursor>> {
        let row = self
            .conn
            .query_row(
                "SELECT mtime, size, last_line FROM ingested_files WHERE path = ?1;",
                [file_path],
                |row| {
                    Ok((
                        row.get::<_, f64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((mtime, size, last_line)) = row else {
            return Ok(None);
        };

        let to_u64 = |value: i64, column: &str| {
            u64::try_from(value).map_err(|_| {
                StoreError::InvalidData(format!(
                    "negative {column} `{value}` in ingested_files for `{file_path}`"
                ))
            })
        };

        Ok(Some(IngestionCursor {
            file_path: file_path.to_string(),
            mtime,
            size: to_u64(size, "size")?,
            last_line: to_u64(last_line, "last_line")?,
        }))
    }

    fn save_cursor(&self, cursor: &IngestionCursor) -> StoreResult<()> {
        let size = i64::try_from(cursor.size)
            .map_err(|_| StoreError::InvalidData(format!("file size {} overflows", cursor.size)))?;
        let last_line = i64::try_from(cursor.last_line).map_err(|_| {
            StoreError::InvalidData(format!("line number {} overflows", cursor.last_line))
        })?;

        self.conn.execute(
            "INSERT OR REPLACE INTO ingested_files (path, mtime, size, last_line)
             VALUES (?1, ?2, ?3, ?4);",
            params![cursor.file_path.as_str(), cursor.mtime, size, last_line],
        )?;
        Ok(())
    }
}
