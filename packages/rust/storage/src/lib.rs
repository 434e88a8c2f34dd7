//! libSQL storage layer for content items and their research.
//!
//! The [`Storage`] struct wraps an embedded libSQL database holding
//! `content_items` and `research_data`. It is opened once at process start and
//! shared (behind an `Arc`) by the orchestrator and the HTTP layer.
//!
//! **Write rules:**
//! - Research is written only through [`Storage::upsert_research`], which is a
//!   single conditional insert/update and is serialized per content item.
//! - Deleting a content item removes its research first.

mod migrations;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use draftsmith_shared::{
    ContentItem, ContentItemId, ContentStatus, DraftsmithError, PipelineState, ResearchBundle,
    ResearchRecord, Result,
};
use libsql::{Connection, Database, params};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

const ITEM_COLUMNS: &str = "id, topic, content, status, stage, created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    research_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Partial update for a content item (plain CRUD).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItemPatch {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub status: Option<ContentStatus>,
}

/// Row counts, used by `db check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub content_items: u64,
    pub research_records: u64,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DraftsmithError::io(parent, e))?;
        }

        let storage = Self::connect(path, false).await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` for inspection only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly,
            research_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DraftsmithError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DraftsmithError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Round-trip a trivial query. Used by health checks.
    pub async fn ping(&self) -> Result<()> {
        let mut rows = self
            .conn
            .query("SELECT 1", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) if row.get::<i64>(0).map_err(storage_err)? == 1 => Ok(()),
            _ => Err(DraftsmithError::Storage(
                "database returned unexpected result".into(),
            )),
        }
    }

    // -----------------------------------------------------------------------
    // Content item operations
    // -----------------------------------------------------------------------

    /// Insert a new content item. The store assigns the identifier.
    pub async fn insert_content_item(
        &self,
        topic: Option<&str>,
        content: Option<&str>,
        status: ContentStatus,
    ) -> Result<ContentItem> {
        self.check_writable()?;

        let topic = topic.map(str::trim).filter(|t| !t.is_empty());
        let stage = match (status, topic) {
            (ContentStatus::Published, _) => PipelineState::Published,
            (_, Some(_)) => PipelineState::TopicSelected,
            (_, None) => PipelineState::NoTopic,
        };

        let now = Utc::now();
        let item = ContentItem {
            id: ContentItemId::new(),
            topic: topic.map(String::from),
            content: content.map(String::from),
            status,
            stage,
            created_at: now,
            updated_at: now,
        };

        self.conn
            .execute(
                "INSERT INTO content_items (id, topic, content, status, stage, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    item.id.to_string(),
                    item.topic.as_deref(),
                    item.content.as_deref(),
                    item.status.as_str(),
                    item.stage.as_str(),
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;

        debug!(id = %item.id, stage = %item.stage, "content item created");
        Ok(item)
    }

    /// Get a content item by ID.
    pub async fn get_content_item(&self, id: &ContentItemId) -> Result<Option<ContentItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM content_items WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_content_item(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Get a content item, failing with `NotFound` if it does not exist.
    pub async fn require_content_item(&self, id: &ContentItemId) -> Result<ContentItem> {
        self.get_content_item(id)
            .await?
            .ok_or_else(|| DraftsmithError::not_found(format!("content item {id} not found")))
    }

    /// List all content items, newest first.
    pub async fn list_content_items(&self) -> Result<Vec<ContentItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM content_items ORDER BY created_at DESC");
        let mut rows = self
            .conn
            .query(&sql, params![])
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_content_item(&row)?);
        }
        Ok(results)
    }

    /// Apply a partial update. Returns `None` if the item does not exist.
    ///
    /// Status may only move from `draft` to `published`.
    pub async fn update_content_item(
        &self,
        id: &ContentItemId,
        patch: &ContentItemPatch,
    ) -> Result<Option<ContentItem>> {
        self.check_writable()?;

        let Some(mut item) = self.get_content_item(id).await? else {
            return Ok(None);
        };

        if let Some(topic) = patch.topic.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            item.topic = Some(topic.to_string());
            if item.stage == PipelineState::NoTopic {
                item.stage = PipelineState::TopicSelected;
            }
        }
        if let Some(content) = &patch.content {
            item.content = Some(content.clone());
        }
        match (item.status, patch.status) {
            (ContentStatus::Published, Some(ContentStatus::Draft)) => {
                return Err(DraftsmithError::precondition(format!(
                    "content item {id} is published and cannot return to draft"
                )));
            }
            (_, Some(ContentStatus::Published)) => {
                item.status = ContentStatus::Published;
                item.stage = PipelineState::Published;
            }
            _ => {}
        }

        self.write_item(&mut item).await?;
        Ok(Some(item))
    }

    /// Set the topic and reset the item to `TopicSelected`.
    ///
    /// Research gathered for a different topic is removed in the same
    /// transaction. Fails with `Precondition` once the item is published.
    pub async fn set_topic(&self, id: &ContentItemId, topic: &str) -> Result<ContentItem> {
        self.check_writable()?;
        let topic = topic.trim();

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        let stale = tx
            .execute(
                "DELETE FROM research_data
                 WHERE content_item_id = ?1
                   AND (SELECT topic FROM content_items WHERE id = ?1) IS NOT ?2",
                params![id.to_string(), topic],
            )
            .await
            .map_err(storage_err)?;
        let updated = tx
            .execute(
                "UPDATE content_items SET topic = ?1, stage = ?2, updated_at = ?3
                 WHERE id = ?4 AND status = ?5",
                params![
                    topic,
                    PipelineState::TopicSelected.as_str(),
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    ContentStatus::Draft.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;

        if updated == 0 {
            tx.rollback().await.map_err(storage_err)?;
            return Err(self.unpublished_miss(id).await);
        }
        tx.commit().await.map_err(storage_err)?;

        if stale > 0 {
            debug!(%id, "research for previous topic removed");
        }
        self.require_content_item(id).await
    }

    /// Record a new pipeline state. Fails with `Precondition` once published.
    pub async fn set_stage(&self, id: &ContentItemId, stage: PipelineState) -> Result<ContentItem> {
        self.check_writable()?;
        let updated = self
            .conn
            .execute(
                "UPDATE content_items SET stage = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = ?4",
                params![
                    stage.as_str(),
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    ContentStatus::Draft.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        self.after_unpublished_update(id, updated).await
    }

    /// Store a draft and record the state it leaves the item in.
    /// Fails with `Precondition` once published.
    pub async fn set_draft(
        &self,
        id: &ContentItemId,
        content: &str,
        stage: PipelineState,
    ) -> Result<ContentItem> {
        self.check_writable()?;
        let updated = self
            .conn
            .execute(
                "UPDATE content_items SET content = ?1, stage = ?2, updated_at = ?3
                 WHERE id = ?4 AND status = ?5",
                params![
                    content,
                    stage.as_str(),
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    ContentStatus::Draft.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        self.after_unpublished_update(id, updated).await
    }

    /// Mark an item published. One-way: publishing twice is a `Precondition` failure.
    pub async fn publish(&self, id: &ContentItemId) -> Result<ContentItem> {
        self.check_writable()?;
        let updated = self
            .conn
            .execute(
                "UPDATE content_items SET status = ?1, stage = ?2, updated_at = ?3
                 WHERE id = ?4 AND status = ?5",
                params![
                    ContentStatus::Published.as_str(),
                    PipelineState::Published.as_str(),
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                    ContentStatus::Draft.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        self.after_unpublished_update(id, updated).await
    }

    async fn after_unpublished_update(&self, id: &ContentItemId, updated: u64) -> Result<ContentItem> {
        if updated == 0 {
            return Err(self.unpublished_miss(id).await);
        }
        self.require_content_item(id).await
    }

    /// Error for a guarded update that matched no row.
    async fn unpublished_miss(&self, id: &ContentItemId) -> DraftsmithError {
        match self.get_content_item(id).await {
            Ok(Some(_)) => DraftsmithError::precondition(format!(
                "content item {id} is already published"
            )),
            Ok(None) => DraftsmithError::not_found(format!("content item {id} not found")),
            Err(e) => e,
        }
    }

    /// Delete a content item and its research. Returns `false` if it did not exist.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete_content_item(&self, id: &ContentItemId) -> Result<bool> {
        self.check_writable()?;

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        tx.execute(
            "DELETE FROM research_data WHERE content_item_id = ?1",
            params![id.to_string()],
        )
        .await
        .map_err(storage_err)?;
        let deleted = tx
            .execute("DELETE FROM content_items WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;
        self.research_locks.lock().await.remove(&id.to_string());

        info!(deleted, "content item removed");
        Ok(deleted > 0)
    }

    /// Remove every record. Used by `db reset`.
    pub async fn clear_all(&self) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute_batch("DELETE FROM research_data; DELETE FROM content_items;")
            .await
            .map_err(storage_err)?;
        self.research_locks.lock().await.clear();
        Ok(())
    }

    /// Count stored records.
    pub async fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            content_items: self.count("SELECT COUNT(*) FROM content_items").await?,
            research_records: self.count("SELECT COUNT(*) FROM research_data").await?,
        })
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(storage_err)? as u64),
            None => Ok(0),
        }
    }

    async fn write_item(&self, item: &mut ContentItem) -> Result<()> {
        item.updated_at = Utc::now();
        self.conn
            .execute(
                "UPDATE content_items
                 SET topic = ?1, content = ?2, status = ?3, stage = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    item.topic.as_deref(),
                    item.content.as_deref(),
                    item.status.as_str(),
                    item.stage.as_str(),
                    item.updated_at.to_rfc3339(),
                    item.id.to_string(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Research operations
    // -----------------------------------------------------------------------

    /// Insert or overwrite the research bundle for a content item.
    ///
    /// Existing rows keep their `id` and `created_at`; every other field is
    /// replaced. Writes for the same content item are serialized.
    #[instrument(skip(self, bundle), fields(content_item_id = %content_item_id))]
    pub async fn upsert_research(
        &self,
        content_item_id: &ContentItemId,
        bundle: &ResearchBundle,
    ) -> Result<()> {
        self.check_writable()?;
        let payload = bundle.encode()?;

        let key_lock = self.research_lock(content_item_id).await;
        let result = {
            let _guard = key_lock.lock().await;
            self.write_research(content_item_id, bundle, payload).await
        };
        self.release_research_lock(content_item_id, key_lock).await;
        result
    }

    async fn write_research(
        &self,
        content_item_id: &ContentItemId,
        bundle: &ResearchBundle,
        payload: String,
    ) -> Result<()> {
        self.require_content_item(content_item_id).await?;

        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO research_data (id, content_item_id, source, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(content_item_id) DO UPDATE SET
                   source = excluded.source,
                   content = excluded.content,
                   updated_at = excluded.updated_at",
                params![
                    Uuid::now_v7().to_string(),
                    content_item_id.to_string(),
                    bundle.source.as_str(),
                    payload,
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;

        debug!(related = bundle.related_topics.len(), "research upserted");
        Ok(())
    }

    /// Get the research stored for a content item.
    ///
    /// A payload that cannot be decoded is a `DataIntegrity` error, distinct
    /// from `Ok(None)`.
    pub async fn get_research(
        &self,
        content_item_id: &ContentItemId,
    ) -> Result<Option<ResearchRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, content_item_id, source, content, created_at, updated_at
                 FROM research_data WHERE content_item_id = ?1",
                params![content_item_id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_research(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn research_lock(&self, content_item_id: &ContentItemId) -> Arc<Mutex<()>> {
        let mut locks = self.research_locks.lock().await;
        locks
            .entry(content_item_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the per-item lock once no other writer is waiting on it.
    async fn release_research_lock(&self, content_item_id: &ContentItemId, key_lock: Arc<Mutex<()>>) {
        let mut locks = self.research_locks.lock().await;
        let key = content_item_id.to_string();
        let ours = locks.get(&key).is_some_and(|held| Arc::ptr_eq(held, &key_lock));
        // One reference in the map, one held here.
        if ours && Arc::strong_count(&key_lock) == 2 {
            locks.remove(&key);
        }
    }
}

fn storage_err(e: libsql::Error) -> DraftsmithError {
    DraftsmithError::Storage(e.to_string())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DraftsmithError::DataIntegrity(format!("invalid timestamp '{raw}': {e}")))
}

fn parse_item_id(raw: &str) -> Result<ContentItemId> {
    raw.parse()
        .map_err(|_| DraftsmithError::DataIntegrity(format!("invalid content item id '{raw}'")))
}

/// Convert a database row to a [`ContentItem`].
fn row_to_content_item(row: &libsql::Row) -> Result<ContentItem> {
    let id: String = row.get(0).map_err(storage_err)?;
    let status: String = row.get(3).map_err(storage_err)?;
    let stage: String = row.get(4).map_err(storage_err)?;
    let created_at: String = row.get(5).map_err(storage_err)?;
    let updated_at: String = row.get(6).map_err(storage_err)?;

    Ok(ContentItem {
        id: parse_item_id(&id)?,
        topic: row.get::<String>(1).ok(),
        content: row.get::<String>(2).ok(),
        status: status
            .parse()
            .map_err(|_| DraftsmithError::DataIntegrity(format!("unknown status '{status}'")))?,
        stage: stage.parse()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Convert a database row to a [`ResearchRecord`], decoding the payload.
fn row_to_research(row: &libsql::Row) -> Result<ResearchRecord> {
    let id: String = row.get(0).map_err(storage_err)?;
    let content_item_id: String = row.get(1).map_err(storage_err)?;
    let source: String = row.get(2).map_err(storage_err)?;
    let content: String = row.get(3).map_err(storage_err)?;
    let created_at: String = row.get(4).map_err(storage_err)?;
    let updated_at: String = row.get(5).map_err(storage_err)?;

    Ok(ResearchRecord {
        id,
        content_item_id: parse_item_id(&content_item_id)?,
        source,
        content: ResearchBundle::decode(&content)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftsmith_shared::TopicSummary;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ds_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn bundle(title: &str, points: usize) -> ResearchBundle {
        ResearchBundle {
            source: "https://en.wikipedia.org".into(),
            main_topic: TopicSummary {
                title: title.into(),
                description: "test".into(),
                summary: (0..points).map(|i| format!("• Point {i}.")).collect(),
                url: format!("https://en.wikipedia.org/wiki/{title}"),
            },
            related_topics: vec![],
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
        storage.ping().await.expect("ping");
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("ds_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn content_item_crud() {
        let storage = test_storage().await;

        let item = storage
            .insert_content_item(Some("Quantum Computing"), None, ContentStatus::Draft)
            .await
            .expect("insert");
        assert_eq!(item.stage, PipelineState::TopicSelected);

        let untitled = storage
            .insert_content_item(None, Some("loose notes"), ContentStatus::Draft)
            .await
            .expect("insert untitled");
        assert_eq!(untitled.stage, PipelineState::NoTopic);

        let found = storage.get_content_item(&item.id).await.unwrap().unwrap();
        assert_eq!(found.topic.as_deref(), Some("Quantum Computing"));
        assert_eq!(found.status, ContentStatus::Draft);

        let all = storage.list_content_items().await.unwrap();
        assert_eq!(all.len(), 2);

        let patch = ContentItemPatch {
            content: Some("new body".into()),
            ..Default::default()
        };
        let updated = storage
            .update_content_item(&item.id, &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content.as_deref(), Some("new body"));
        assert!(updated.updated_at >= item.updated_at);

        let missing = storage
            .update_content_item(&ContentItemId::new(), &patch)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn status_is_one_way() {
        let storage = test_storage().await;
        let item = storage
            .insert_content_item(Some("Rust"), None, ContentStatus::Draft)
            .await
            .unwrap();

        let published = storage.publish(&item.id).await.unwrap();
        assert_eq!(published.status, ContentStatus::Published);
        assert_eq!(published.stage, PipelineState::Published);

        let patch = ContentItemPatch {
            status: Some(ContentStatus::Draft),
            ..Default::default()
        };
        let err = storage.update_content_item(&item.id, &patch).await.unwrap_err();
        assert!(matches!(err, DraftsmithError::Precondition { .. }));
    }

    #[tokio::test]
    async fn upsert_replay_keeps_one_record() {
        let storage = test_storage().await;
        let item = storage
            .insert_content_item(Some("Rust"), None, ContentStatus::Draft)
            .await
            .unwrap();

        storage.upsert_research(&item.id, &bundle("Rust", 2)).await.unwrap();
        let first = storage.get_research(&item.id).await.unwrap().unwrap();

        storage.upsert_research(&item.id, &bundle("Rust", 2)).await.unwrap();
        storage
            .upsert_research(&item.id, &bundle("Rust (programming language)", 3))
            .await
            .unwrap();

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.research_records, 1);

        let latest = storage.get_research(&item.id).await.unwrap().unwrap();
        assert_eq!(latest.id, first.id);
        assert_eq!(latest.created_at, first.created_at);
        assert_eq!(latest.content.main_topic.title, "Rust (programming language)");
        assert_eq!(latest.content.main_topic.summary.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_upserts_for_one_item() {
        let storage = Arc::new(test_storage().await);
        let item = storage
            .insert_content_item(Some("Rust"), None, ContentStatus::Draft)
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let storage = Arc::clone(&storage);
            let id = item.id.clone();
            handles.push(tokio::spawn(async move {
                storage.upsert_research(&id, &bundle(&format!("Take {i}"), 1)).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("upsert");
        }

        assert_eq!(storage.stats().await.unwrap().research_records, 1);
    }

    #[tokio::test]
    async fn upsert_for_unknown_item_is_not_found() {
        let storage = test_storage().await;
        let err = storage
            .upsert_research(&ContentItemId::new(), &bundle("Rust", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DraftsmithError::NotFound { .. }));
    }

    #[tokio::test]
    async fn malformed_research_is_integrity_error() {
        let storage = test_storage().await;
        let item = storage
            .insert_content_item(Some("Rust"), None, ContentStatus::Draft)
            .await
            .unwrap();

        let now = Utc::now().to_rfc3339();
        storage
            .conn
            .execute(
                "INSERT INTO research_data (id, content_item_id, source, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    "r1",
                    item.id.to_string(),
                    "AI Trends",
                    "AI has been growing exponentially...",
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .unwrap();

        let err = storage.get_research(&item.id).await.unwrap_err();
        assert!(matches!(err, DraftsmithError::DataIntegrity(_)));

        let absent = storage.get_research(&ContentItemId::new()).await.unwrap();
        assert!(absent.is_none());
    }

    #[tokio::test]
    async fn delete_cascades_to_research() {
        let storage = test_storage().await;
        let item = storage
            .insert_content_item(Some("Rust"), None, ContentStatus::Draft)
            .await
            .unwrap();
        storage.upsert_research(&item.id, &bundle("Rust", 1)).await.unwrap();

        assert!(storage.delete_content_item(&item.id).await.unwrap());
        assert!(storage.get_content_item(&item.id).await.unwrap().is_none());
        assert_eq!(
            storage.stats().await.unwrap(),
            StorageStats {
                content_items: 0,
                research_records: 0
            }
        );
        assert!(!storage.delete_content_item(&item.id).await.unwrap());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("ds_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_content_item(Some("Rust"), None, ContentStatus::Draft)
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_content_items().await.unwrap().len(), 1);
        let result = ro
            .insert_content_item(Some("Go"), None, ContentStatus::Draft)
            .await;
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn retarget_drops_research_for_old_topic() {
        let storage = test_storage().await;
        let item = storage
            .insert_content_item(Some("Quantum Computing"), None, ContentStatus::Draft)
            .await
            .unwrap();
        storage
            .upsert_research(&item.id, &bundle("Quantum computing", 2))
            .await
            .unwrap();

        // Same topic keeps what was gathered.
        storage.set_topic(&item.id, " Quantum Computing ").await.unwrap();
        assert!(storage.get_research(&item.id).await.unwrap().is_some());

        let item = storage.set_topic(&item.id, "Medieval Cooking").await.unwrap();
        assert_eq!(item.topic.as_deref(), Some("Medieval Cooking"));
        assert_eq!(item.stage, PipelineState::TopicSelected);
        assert!(storage.get_research(&item.id).await.unwrap().is_none());
        assert_eq!(storage.stats().await.unwrap().research_records, 0);
    }

    #[tokio::test]
    async fn stage_writes_on_published_item_are_rejected() {
        let storage = test_storage().await;
        let item = storage
            .insert_content_item(Some("Rust"), Some("final text"), ContentStatus::Draft)
            .await
            .unwrap();
        storage.upsert_research(&item.id, &bundle("Rust", 1)).await.unwrap();
        storage.publish(&item.id).await.unwrap();

        let err = storage
            .set_draft(&item.id, "rewritten", PipelineState::Drafted)
            .await
            .unwrap_err();
        assert!(matches!(err, DraftsmithError::Precondition { .. }));
        let err = storage.set_stage(&item.id, PipelineState::Edited).await.unwrap_err();
        assert!(matches!(err, DraftsmithError::Precondition { .. }));
        let err = storage.set_topic(&item.id, "Go").await.unwrap_err();
        assert!(matches!(err, DraftsmithError::Precondition { .. }));
        let err = storage.publish(&item.id).await.unwrap_err();
        assert!(matches!(err, DraftsmithError::Precondition { .. }));

        let stored = storage.require_content_item(&item.id).await.unwrap();
        assert_eq!(stored.status, ContentStatus::Published);
        assert_eq!(stored.stage, PipelineState::Published);
        assert_eq!(stored.topic.as_deref(), Some("Rust"));
        assert_eq!(stored.content.as_deref(), Some("final text"));
        // The rolled-back re-target left research in place.
        assert!(storage.get_research(&item.id).await.unwrap().is_some());

        let err = storage
            .set_stage(&ContentItemId::new(), PipelineState::Drafted)
            .await
            .unwrap_err();
        assert!(matches!(err, DraftsmithError::NotFound { .. }));
    }

    #[tokio::test]
    async fn research_locks_do_not_accumulate() {
        let storage = Arc::new(test_storage().await);

        for round in 0..50 {
            let item = storage
                .insert_content_item(Some("Rust"), None, ContentStatus::Draft)
                .await
                .unwrap();
            storage
                .upsert_research(&item.id, &bundle(&format!("Round {round}"), 1))
                .await
                .unwrap();
            assert!(storage.delete_content_item(&item.id).await.unwrap());
        }
        assert!(storage.research_locks.lock().await.is_empty());

        let item = storage
            .insert_content_item(Some("Rust"), None, ContentStatus::Draft)
            .await
            .unwrap();
        let mut handles = Vec::new();
        for i in 0..8 {
            let storage = Arc::clone(&storage);
            let id = item.id.clone();
            handles.push(tokio::spawn(async move {
                storage.upsert_research(&id, &bundle(&format!("Take {i}"), 1)).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("upsert");
        }
        assert!(storage.research_locks.lock().await.is_empty());

        storage.clear_all().await.unwrap();
        assert!(storage.research_locks.lock().await.is_empty());
    }
}
