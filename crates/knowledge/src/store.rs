//! Fragment store: the retrieval collaborator of the control loop.
//!
//! `SqliteFragmentStore` keeps fragments and their embeddings in SQLite and
//! ranks them by cosine similarity against the embedded query.

use crate::embeddings::EmbeddingProvider;
use crate::types::{DocumentSummary, FragmentKind, RawFragment, StoreStats};
use chrono::{DateTime, Utc};
use ragloop_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Read access to stored fragments.
#[async_trait::async_trait]
pub trait FragmentStore: Send + Sync {
    /// Top `k` fragments for a query, best first.
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<RawFragment>>;

    /// Every fragment sharing a parent identity, in no particular order.
    async fn fetch_by_parent(&self, parent_id: &str) -> AppResult<Vec<RawFragment>>;

    /// Document and fragment counts.
    async fn stats(&self) -> AppResult<StoreStats>;
}

/// SQLite-backed fragment store.
///
/// Queries run on the blocking pool so a scan never stalls an async worker.
pub struct SqliteFragmentStore {
    conn: Arc<Mutex<Connection>>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for SqliteFragmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteFragmentStore")
            .field("embedder", &self.embedder)
            .finish_non_exhaustive()
    }
}

impl SqliteFragmentStore {
    /// Open (or create) a store at `db_path`.
    pub fn open(db_path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Knowledge(format!("Failed to create store directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open fragment store: {}", e)))?;

        tracing::debug!("Opened fragment store at {:?}", db_path);
        Self::with_connection(conn, embedder)
    }

    /// Open a store that lives only as long as this value.
    pub fn open_in_memory(embedder: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            AppError::Knowledge(format!("Failed to open in-memory fragment store: {}", e))
        })?;
        Self::with_connection(conn, embedder)
    }

    fn with_connection(conn: Connection, embedder: Arc<dyn EmbeddingProvider>) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                parent_id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                imported_at TEXT NOT NULL,
                fragment_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fragments (
                id TEXT PRIMARY KEY,
                parent_id TEXT NOT NULL,
                source TEXT NOT NULL,
                page INTEGER NOT NULL,
                element_index INTEGER NOT NULL,
                kind TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                FOREIGN KEY (parent_id) REFERENCES documents(parent_id)
            );

            CREATE INDEX IF NOT EXISTS idx_fragments_parent ON fragments(parent_id);
            "#,
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to create tables: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedder,
        })
    }

    /// The embedder used for queries and imports.
    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        lock_connection(&self.conn)
    }

    /// Run `query` against the connection on the blocking pool.
    async fn blocking<T, F>(&self, query: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = lock_connection(&conn)?;
            query(&conn)
        })
        .await
        .map_err(|e| AppError::Knowledge(format!("Fragment store task failed: {}", e)))?
    }

    /// Store one parent document and its fragments in a single transaction.
    ///
    /// `embeddings` must line up with `fragments`.
    pub fn insert_document(
        &self,
        parent_id: &str,
        source: &str,
        fragments: &[RawFragment],
        embeddings: &[Vec<f32>],
    ) -> AppResult<()> {
        if fragments.len() != embeddings.len() {
            return Err(AppError::Knowledge(format!(
                "Got {} embeddings for {} fragments",
                embeddings.len(),
                fragments.len()
            )));
        }

        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT OR REPLACE INTO documents (parent_id, source, imported_at, fragment_count)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                parent_id,
                source,
                Utc::now().to_rfc3339(),
                fragments.len() as i64
            ],
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to insert document: {}", e)))?;

        for (fragment, embedding) in fragments.iter().zip(embeddings) {
            tx.execute(
                "INSERT OR REPLACE INTO fragments
                 (id, parent_id, source, page, element_index, kind, text, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    fragment.id,
                    fragment.parent_id,
                    fragment.source,
                    fragment.page as i64,
                    fragment.element_index as i64,
                    fragment.kind.as_str(),
                    fragment.text,
                    embedding_to_bytes(embedding),
                ],
            )
            .map_err(|e| AppError::Knowledge(format!("Failed to insert fragment: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| AppError::Knowledge(format!("Failed to commit document: {}", e)))?;

        tracing::debug!(
            "Stored document {} ({}) with {} fragments",
            parent_id,
            source,
            fragments.len()
        );
        Ok(())
    }

    /// Delete every document and fragment.
    pub fn clear(&self) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute_batch("DELETE FROM fragments; DELETE FROM documents;")
            .map_err(|e| AppError::Knowledge(format!("Failed to clear fragment store: {}", e)))?;

        tracing::info!("Cleared fragment store");
        Ok(())
    }
}

#[async_trait::async_trait]
impl FragmentStore for SqliteFragmentStore {
    async fn search(&self, query: &str, k: usize) -> AppResult<Vec<RawFragment>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let results = self
            .blocking(move |conn| {
                let scored = scored_fragments(conn, &query_embedding)?;
                Ok(top_k(scored, k))
            })
            .await?;

        tracing::debug!(
            "Search returned {} fragments (requested top-{})",
            results.len(),
            k
        );

        Ok(results)
    }

    async fn fetch_by_parent(&self, parent_id: &str) -> AppResult<Vec<RawFragment>> {
        let parent_id = parent_id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, parent_id, source, page, element_index, kind, text
                     FROM fragments WHERE parent_id = ?1",
                )
                .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

            let fragments = stmt
                .query_map(params![parent_id], fragment_from_row)
                .map_err(|e| AppError::Knowledge(format!("Failed to query siblings: {}", e)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::Knowledge(format!("Failed to read sibling: {}", e)))?;

            Ok(fragments)
        })
        .await
    }

    async fn stats(&self) -> AppResult<StoreStats> {
        self.blocking(read_stats).await
    }
}

fn lock_connection(conn: &Mutex<Connection>) -> AppResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| AppError::Knowledge("Fragment store lock poisoned".to_string()))
}

/// Every fragment paired with its cosine score, in insertion order.
fn scored_fragments(
    conn: &Connection,
    query_embedding: &[f32],
) -> AppResult<Vec<(RawFragment, f32)>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, parent_id, source, page, element_index, kind, text, embedding
             FROM fragments ORDER BY rowid",
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            let embedding_bytes: Vec<u8> = row.get(7)?;
            Ok((fragment_from_row(row)?, embedding_bytes))
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to query fragments: {}", e)))?;

    let mut scored = Vec::new();
    for row in rows {
        let (fragment, bytes) =
            row.map_err(|e| AppError::Knowledge(format!("Failed to read fragment: {}", e)))?;
        let embedding = bytes_to_embedding(&bytes)?;
        scored.push((fragment, cosine_similarity(query_embedding, &embedding)));
    }

    Ok(scored)
}

/// Best `k` items, highest score first. NaN scores sink to the bottom.
fn top_k<T>(scored: Vec<(T, f32)>, k: usize) -> Vec<T> {
    let mut scored: Vec<(T, f32)> = scored
        .into_iter()
        .map(|(item, s)| (item, if s.is_nan() { f32::NEG_INFINITY } else { s }))
        .collect();

    // Stable: equal scores keep insertion order
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);

    scored.into_iter().map(|(item, _)| item).collect()
}

fn read_stats(conn: &Connection) -> AppResult<StoreStats> {
    let fragments_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM fragments", [], |row| row.get(0))
        .map_err(|e| AppError::Knowledge(format!("Failed to count fragments: {}", e)))?;

    let mut stmt = conn
        .prepare(
            "SELECT parent_id, source, imported_at, fragment_count
             FROM documents ORDER BY imported_at DESC",
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

    let documents = stmt
        .query_map([], |row| {
            let imported_at: String = row.get(2)?;
            Ok(DocumentSummary {
                parent_id: row.get(0)?,
                source: row.get(1)?,
                imported_at: DateTime::parse_from_rfc3339(&imported_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_default(),
                fragment_count: row.get::<_, i64>(3)? as u32,
            })
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to query documents: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Knowledge(format!("Failed to read document: {}", e)))?;

    Ok(StoreStats {
        documents_count: documents.len() as u32,
        fragments_count: fragments_count as u32,
        documents,
    })
}

fn fragment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawFragment> {
    let kind: String = row.get(5)?;
    Ok(RawFragment {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        source: row.get(2)?,
        page: row.get::<_, i64>(3)? as u32,
        element_index: row.get::<_, i64>(4)? as u32,
        kind: FragmentKind::parse(&kind),
        text: row.get(6)?,
    })
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Knowledge(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Cosine similarity; mismatched or zero vectors score 0.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
