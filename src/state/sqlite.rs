use super::types::{Decision, TrackedImage, UpdatedKind, WatchEntry};
use crate::error::{Error, Result};
use crate::image::ImageRef;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

const DB_FILE_NAME: &str = "tagwatch.db";
const LOCK_FILE_NAME: &str = ".lock";

const SELECT_COLUMNS: &str = "id, image, tag, container_id, container_name, created_at, \
                              docker_hub_last_updated, is_active, is_updated";

/// SQLite-backed table of tracked images.
///
/// File databases run in WAL mode and hold an advisory lock (`<data>/.lock`)
/// for the lifetime of the store so two watchers never share one data
/// directory unnoticed. Every multi-row write runs in a single transaction.
pub struct TrackedImageStore {
    conn: Connection,
    #[allow(dead_code)]
    lock_file: Option<std::fs::File>,
}

impl TrackedImageStore {
    /// Open (or create) the database under `data_dir`.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir).map_err(|e| {
            Error::Filesystem(format!(
                "Failed to create data directory {}: {}",
                data_dir.display(),
                e
            ))
        })?;

        let lock_file = Self::try_acquire_lock(&data_dir.join(LOCK_FILE_NAME))?;
        let db_path = data_dir.join(DB_FILE_NAME);
        let conn = Connection::open(&db_path).await?;

        conn.call(|conn: &mut rusqlite::Connection| {
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "busy_timeout", 5000)?;
            Ok(())
        })
        .await?;

        debug!("Opened tracked-image database at {:?}", db_path);
        Ok(Self {
            conn,
            lock_file,
        })
    }

    /// In-memory database with no file lock. Nothing survives the process.
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open(":memory:").await?;
        Ok(Self {
            conn,
            lock_file: None,
        })
    }

    /// Take the advisory lock, or warn and carry on if another process holds it.
    fn try_acquire_lock(lock_path: &Path) -> Result<Option<std::fs::File>> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| Error::Filesystem(format!("Failed to open lock file: {}", e)))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let _ = file.set_len(0);
                let _ = writeln!(file, "{}", std::process::id());
                debug!("Acquired advisory lock on {:?}", lock_path);
                Ok(Some(file))
            }
            Err(e) => {
                let owner = std::fs::read_to_string(lock_path)
                    .map(|contents| contents.trim().to_string())
                    .unwrap_or_default();
                warn!(
                    "Another tagwatch instance{} is using this data directory ({}). \
                     Proceeding anyway, but tracked state may be overwritten.",
                    if owner.is_empty() {
                        String::new()
                    } else {
                        format!(" (PID {})", owner)
                    },
                    e
                );
                Ok(None)
            }
        }
    }

    async fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.conn
            .call(move |conn: &mut rusqlite::Connection| {
                let tx = conn.transaction()?;
                let result = f(&tx)?;
                tx.commit()?;
                Ok(result)
            })
            .await
            .map_err(Error::from)
    }

    async fn query(&self, sql: String, flag: Option<i64>) -> Result<Vec<TrackedImage>> {
        self.conn
            .call(move |conn: &mut rusqlite::Connection| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = match flag {
                    Some(value) => stmt
                        .query_map([value], row_to_tracked)?
                        .collect::<rusqlite::Result<Vec<_>>>()?,
                    None => stmt
                        .query_map([], row_to_tracked)?
                        .collect::<rusqlite::Result<Vec<_>>>()?,
                };
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }

    /// Create the schema. With `first_run` the table is dropped first, so a
    /// fresh process always starts from an empty table.
    pub async fn init(&self, first_run: bool) -> Result<()> {
        self.with_transaction(move |tx| {
            if first_run {
                tx.execute("DROP TABLE IF EXISTS tracked_images", [])?;
            }
            tx.execute(
                "CREATE TABLE IF NOT EXISTS tracked_images (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    image TEXT NOT NULL,
                    tag TEXT NOT NULL,
                    container_id TEXT,
                    container_name TEXT,
                    created_at TEXT,
                    docker_hub_last_updated TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    is_updated INTEGER NOT NULL DEFAULT 0,
                    UNIQUE(image, tag)
                )",
                [],
            )?;
            tx.execute(
                "CREATE INDEX IF NOT EXISTS idx_tracked_images_active ON tracked_images(is_active)",
                [],
            )?;
            Ok(())
        })
        .await?;

        if first_run {
            info!("Initialized tracked-image table");
        }
        Ok(())
    }

    /// Record the current snapshot.
    ///
    /// Every row is deactivated, then each entry is inserted or refreshed and
    /// reactivated. Entries sharing an `(image, tag)` collapse to one row: a
    /// container entry beats an extra image, and the last container wins.
    /// Returns the rows touched, in snapshot order.
    pub async fn upsert(&self, entries: Vec<WatchEntry>) -> Result<Vec<TrackedImage>> {
        let entries = collapse_entries(entries);
        let count = entries.len();

        let touched = self
            .with_transaction(move |tx| {
                tx.execute("UPDATE tracked_images SET is_active = 0", [])?;

                {
                    let mut insert = tx.prepare(
                        "INSERT INTO tracked_images
                            (image, tag, container_id, container_name, created_at, is_active, is_updated)
                         VALUES (?1, ?2, ?3, ?4, ?5, 1, 0)
                         ON CONFLICT(image, tag) DO UPDATE SET
                            container_id = excluded.container_id,
                            container_name = excluded.container_name,
                            created_at = excluded.created_at,
                            is_active = 1",
                    )?;
                    for entry in &entries {
                        insert.execute(params![
                            entry.image.image,
                            entry.image.tag,
                            entry.container_id,
                            entry.container_name,
                            entry.created_at.map(|t| t.to_rfc3339()),
                        ])?;
                    }
                }

                let mut select = tx.prepare(&format!(
                    "SELECT {} FROM tracked_images WHERE image = ?1 AND tag = ?2",
                    SELECT_COLUMNS
                ))?;
                let mut touched = Vec::with_capacity(entries.len());
                for entry in &entries {
                    if let Some(row) = select
                        .query_row(params![entry.image.image, entry.image.tag], row_to_tracked)
                        .optional()?
                    {
                        touched.push(row);
                    }
                }
                Ok(touched)
            })
            .await?;

        debug!(entries = count, "Upserted snapshot");
        Ok(touched)
    }

    /// Rows seen in the most recent snapshot.
    pub async fn active(&self) -> Result<Vec<TrackedImage>> {
        self.query(
            format!(
                "SELECT {} FROM tracked_images WHERE is_active = ?1 ORDER BY id",
                SELECT_COLUMNS
            ),
            Some(1),
        )
        .await
    }

    /// Rows flagged as updated this cycle.
    pub async fn updated(&self, kind: UpdatedKind) -> Result<Vec<TrackedImage>> {
        let filter = match kind {
            UpdatedKind::All => "",
            UpdatedKind::WithContainer => " AND container_id IS NOT NULL",
        };
        self.query(
            format!(
                "SELECT {} FROM tracked_images WHERE is_updated = ?1{} ORDER BY id",
                SELECT_COLUMNS, filter
            ),
            Some(1),
        )
        .await
    }

    /// Every row, active or not.
    pub async fn all(&self) -> Result<Vec<TrackedImage>> {
        self.query(
            format!("SELECT {} FROM tracked_images ORDER BY id", SELECT_COLUMNS),
            None,
        )
        .await
    }

    /// Persist registry results for a batch, all or nothing.
    pub async fn apply_decisions(&self, decisions: Vec<Decision>) -> Result<usize> {
        if decisions.is_empty() {
            return Ok(0);
        }
        self.with_transaction(move |tx| {
            let mut update = tx.prepare(
                "UPDATE tracked_images SET docker_hub_last_updated = ?1, is_updated = ?2 WHERE id = ?3",
            )?;
            let mut changed = 0;
            for decision in &decisions {
                changed += update.execute(params![
                    decision.registry_last_updated.to_rfc3339(),
                    decision.is_updated,
                    decision.id,
                ])?;
            }
            Ok(changed)
        })
        .await
    }

    /// Consume this cycle's update signals.
    pub async fn clear_updated_flags(&self) -> Result<usize> {
        self.with_transaction(|tx| {
            tx.execute(
                "UPDATE tracked_images SET is_updated = 0 WHERE is_updated = 1",
                [],
            )
        })
        .await
    }

    /// Look up the row for `image` (repository name, any tag).
    ///
    /// Prefers an active row backed by a container when several tags match.
    pub async fn find_by_image(&self, image: &str) -> Result<Option<TrackedImage>> {
        let image = ImageRef::parse(image).image;
        let sql = format!(
            "SELECT {} FROM tracked_images WHERE image = ?1
             ORDER BY is_active DESC, container_id IS NULL, id LIMIT 1",
            SELECT_COLUMNS
        );
        self.conn
            .call(move |conn: &mut rusqlite::Connection| {
                Ok(conn
                    .query_row(&sql, [image], row_to_tracked)
                    .optional()?)
            })
            .await
            .map_err(Error::from)
    }
}

/// Deduplicate on `(image, tag)`, keeping first-seen order.
fn collapse_entries(entries: Vec<WatchEntry>) -> Vec<WatchEntry> {
    let mut index: HashMap<ImageRef, usize> = HashMap::new();
    let mut collapsed: Vec<WatchEntry> = Vec::with_capacity(entries.len());

    for entry in entries {
        match index.get(&entry.image) {
            Some(&i) => {
                if entry.has_container() || !collapsed[i].has_container() {
                    collapsed[i] = entry;
                }
            }
            None => {
                index.insert(entry.image.clone(), collapsed.len());
                collapsed.push(entry);
            }
        }
    }
    collapsed
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_to_tracked(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackedImage> {
    Ok(TrackedImage {
        id: row.get(0)?,
        image: row.get(1)?,
        tag: row.get(2)?,
        container_id: row.get(3)?,
        container_name: row.get(4)?,
        created_at: parse_timestamp(row.get(5)?),
        docker_hub_last_updated: parse_timestamp(row.get(6)?),
        is_active: row.get(7)?,
        is_updated: row.get(8)?,
    })
}
