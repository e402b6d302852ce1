//! Postgres + pgvector chunk store.
//!
//! One table holds every chunk. Lexical ranking runs on a generated
//! `tsvector` column (`websearch_to_tsquery` + `ts_rank_cd`), vector ranking
//! on a `VECTOR(D)` column through the cosine distance operator `<=>`.

use async_trait::async_trait;
use pgvector::Vector;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio_postgres::types::Json;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::chunk::{Chunk, ChunkMetadata};
use crate::config::EMBEDDING_DIMENSION;
use crate::store::{ChunkStore, ScoredChunk, StoredChunk};
use crate::{Error, Result};

/// Where and how chunks are laid out in Postgres.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PgStoreConfig {
    pub schema: String,
    pub table: String,
    /// Text search configuration used for both documents and queries
    pub text_search_config: String,
    pub dimension: usize,
    /// Parent event table; when set, chunks cascade on event deletion
    pub event_table: Option<String>,
    /// Create the extension, table and indexes on connect
    pub prepare_schema: bool,
}

impl Default for PgStoreConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: "event_chunks".to_string(),
            text_search_config: "english".to_string(),
            dimension: EMBEDDING_DIMENSION,
            event_table: None,
            prepare_schema: false,
        }
    }
}

/// Schema-qualified table identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Result<Self> {
        let schema = schema.into();
        let table = table.into();
        if schema.trim().is_empty() || table.trim().is_empty() {
            return Err(Error::Configuration(
                "schema and table names are required".to_string(),
            ));
        }
        Ok(Self { schema, table })
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Name for a secondary index on this table, e.g. `public_event_chunks_tsv_idx`.
    pub fn index_name(&self, suffix: &str) -> String {
        quote_ident(&format!(
            "{}_{}_{suffix}_idx",
            sanitize_ident(&self.schema),
            sanitize_ident(&self.table)
        ))
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

fn quote_literal(input: &str) -> String {
    format!("'{}'", input.replace('\'', "''"))
}

fn sanitize_ident(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// Chunk store backed by a single tokio-postgres connection.
///
/// Reads share the connection; a re-index takes it exclusively for the
/// duration of its transaction.
pub struct PgChunkStore {
    // TODO: swap the single connection for a pool once several indexers share a process
    client: RwLock<Client>,
    table: TableName,
    config: PgStoreConfig,
}

impl PgChunkStore {
    /// Connect, optionally create the schema, then check the stored vector
    /// column has `config.dimension` dimensions.
    pub async fn connect(database_url: &str, config: PgStoreConfig) -> Result<Self> {
        if config.dimension == 0 {
            return Err(Error::Configuration(
                "embedding dimension must be positive".to_string(),
            ));
        }
        let table = TableName::new(config.schema.clone(), config.table.clone())?;

        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "postgres connection error");
            }
        });

        let store = Self {
            client: RwLock::new(client),
            table,
            config,
        };
        if store.config.prepare_schema {
            store.prepare_schema().await?;
        }
        store.verify_dimension().await?;
        Ok(store)
    }

    /// Create the `vector` extension, chunk table and its indexes if missing.
    pub async fn prepare_schema(&self) -> Result<()> {
        let client = self.client.read().await;
        for statement in schema_sql(&self.table, &self.config) {
            debug!(sql = %statement, "applying schema statement");
            client.batch_execute(&statement).await?;
        }
        info!(table = %self.table.qualified(), dimension = self.config.dimension, "schema ready");
        Ok(())
    }

    /// Fail with a configuration error unless the `embedding` column exists
    /// with exactly the configured dimension.
    pub async fn verify_dimension(&self) -> Result<()> {
        let client = self.client.read().await;
        let row = client
            .query_opt(
                "SELECT atttypmod FROM pg_attribute \
                 WHERE attrelid = to_regclass($1::text) AND attname = 'embedding' AND NOT attisdropped",
                &[&self.table.qualified()],
            )
            .await?;
        let Some(row) = row else {
            return Err(Error::Configuration(format!(
                "table {} has no embedding column; prepare the schema first",
                self.table.qualified()
            )));
        };
        let stored: i32 = row.try_get("atttypmod")?;
        if usize::try_from(stored).ok() != Some(self.config.dimension) {
            return Err(Error::Configuration(format!(
                "table {} stores {stored}-dimensional embeddings, expected {}",
                self.table.qualified(),
                self.config.dimension
            )));
        }
        Ok(())
    }
}

fn schema_sql(table: &TableName, config: &PgStoreConfig) -> Vec<String> {
    let qualified = table.qualified();
    let ts_config = quote_literal(&config.text_search_config);
    let references = match &config.event_table {
        Some(events) => format!(
            " REFERENCES {}.{}(id) ON DELETE CASCADE",
            quote_ident(&config.schema),
            quote_ident(events)
        ),
        None => String::new(),
    };

    vec![
        "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
        format!(
            "CREATE TABLE IF NOT EXISTS {qualified} (
                id UUID PRIMARY KEY,
                event_id UUID NOT NULL{references},
                chunk_index INTEGER NOT NULL,
                search_text TEXT NOT NULL,
                raw_text TEXT NOT NULL,
                metadata JSONB NOT NULL,
                embedding VECTOR({dims}) NOT NULL,
                search_tsv TSVECTOR GENERATED ALWAYS AS (to_tsvector({ts_config}, search_text)) STORED,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (event_id, chunk_index)
            )",
            dims = config.dimension
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {qualified} USING GIN (search_tsv)",
            table.index_name("tsv")
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {qualified} USING hnsw (embedding vector_cosine_ops)",
            table.index_name("embedding")
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {qualified} (event_id)",
            table.index_name("event")
        ),
    ]
}

const COLUMNS: &str = "id, event_id, chunk_index, search_text, raw_text, metadata";

fn insert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} ({COLUMNS}, embedding) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        table.qualified()
    )
}

fn select_lexical_sql(table: &TableName, ts_config: &str) -> String {
    format!(
        "WITH query AS (SELECT websearch_to_tsquery({ts_config}, $1) AS q)
        SELECT {COLUMNS}, ts_rank_cd(search_tsv, query.q) AS score
        FROM {table}
        CROSS JOIN query
        WHERE search_tsv @@ query.q
          AND ($3::uuid[] IS NULL OR event_id = ANY($3))
        ORDER BY score DESC, chunk_index ASC
        LIMIT $2",
        ts_config = quote_literal(ts_config),
        table = table.qualified()
    )
}

fn select_dense_sql(table: &TableName) -> String {
    format!(
        "SELECT {COLUMNS}, embedding <=> $1 AS distance
        FROM {}
        WHERE ($3::uuid[] IS NULL OR event_id = ANY($3))
        ORDER BY distance ASC, chunk_index ASC
        LIMIT $2",
        table.qualified()
    )
}

fn chunk_from_row(row: &Row) -> Result<Chunk> {
    let chunk_index: i32 = row.try_get("chunk_index")?;
    let Json(metadata): Json<ChunkMetadata> = row.try_get("metadata")?;
    Ok(Chunk {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        chunk_index: usize::try_from(chunk_index)
            .map_err(|_| Error::Store(format!("negative chunk_index {chunk_index}")))?,
        search_text: row.try_get("search_text")?,
        raw_text: row.try_get("raw_text")?,
        metadata,
    })
}

fn as_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl ChunkStore for PgChunkStore {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn replace_event_chunks(&self, event_id: Uuid, rows: &[StoredChunk]) -> Result<usize> {
        for row in rows {
            row.validate(event_id, self.config.dimension)?;
        }

        let mut client = self.client.write().await;
        // dropping the transaction without commit rolls it back
        let transaction = client.transaction().await?;
        let deleted = transaction
            .execute(
                &format!("DELETE FROM {} WHERE event_id = $1", self.table.qualified()),
                &[&event_id],
            )
            .await?;

        let statement = transaction.prepare(&insert_sql(&self.table)).await?;
        for row in rows {
            let chunk = &row.chunk;
            let chunk_index = i32::try_from(chunk.chunk_index).map_err(|_| {
                Error::Validation(format!("chunk_index {} exceeds i32 range", chunk.chunk_index))
            })?;
            let vector = Vector::from(row.embedding.clone());
            transaction
                .execute(
                    &statement,
                    &[
                        &chunk.id,
                        &chunk.event_id,
                        &chunk_index,
                        &chunk.search_text,
                        &chunk.raw_text,
                        &Json(&chunk.metadata),
                        &vector,
                    ],
                )
                .await?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;
        debug!(%event_id, deleted, inserted = rows.len(), "replaced event chunks");
        Ok(rows.len())
    }

    async fn delete_event_chunks(&self, event_id: Uuid) -> Result<usize> {
        let client = self.client.read().await;
        let deleted = client
            .execute(
                &format!("DELETE FROM {} WHERE event_id = $1", self.table.qualified()),
                &[&event_id],
            )
            .await?;
        Ok(deleted as usize)
    }

    async fn count_event_chunks(&self, event_id: Uuid) -> Result<usize> {
        let client = self.client.read().await;
        let row = client
            .query_one(
                &format!(
                    "SELECT COUNT(*) AS n FROM {} WHERE event_id = $1",
                    self.table.qualified()
                ),
                &[&event_id],
            )
            .await?;
        let count: i64 = row.try_get("n")?;
        Ok(count.max(0) as usize)
    }

    async fn search_text(
        &self,
        query: &str,
        limit: usize,
        event_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ScoredChunk>> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let sql = select_lexical_sql(&self.table, &self.config.text_search_config);
        let filter: Option<Vec<Uuid>> = event_ids.map(<[Uuid]>::to_vec);
        let client = self.client.read().await;
        let rows = client
            .query(&sql, &[&query, &as_limit(limit), &filter])
            .await?;

        rows.iter()
            .map(|row| {
                let score: f32 = row.try_get("score")?;
                Ok(ScoredChunk {
                    chunk: chunk_from_row(row)?,
                    score,
                })
            })
            .collect()
    }

    async fn search_vector(
        &self,
        embedding: &[f32],
        limit: usize,
        event_ids: Option<&[Uuid]>,
    ) -> Result<Vec<ScoredChunk>> {
        if embedding.len() != self.config.dimension {
            return Err(Error::Configuration(format!(
                "query embedding has {} dimensions, store expects {}",
                embedding.len(),
                self.config.dimension
            )));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }
        let vector = Vector::from(embedding.to_vec());
        let filter: Option<Vec<Uuid>> = event_ids.map(<[Uuid]>::to_vec);
        let client = self.client.read().await;
        let rows = client
            .query(&select_dense_sql(&self.table), &[&vector, &as_limit(limit), &filter])
            .await?;

        rows.iter()
            .map(|row| {
                let distance: f64 = row.try_get("distance")?;
                Ok(ScoredChunk {
                    chunk: chunk_from_row(row)?,
                    score: (1.0 - distance) as f32,
                })
            })
            .collect()
    }

    async fn len(&self) -> Result<usize> {
        let client = self.client.read().await;
        let row = client
            .query_one(
                &format!("SELECT COUNT(*) AS n FROM {}", self.table.qualified()),
                &[],
            )
            .await?;
        let count: i64 = row.try_get("n")?;
        Ok(count.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableName {
        TableName::new("public", "event_chunks").unwrap()
    }

    #[test]
    fn test_table_name_quotes() {
        let table = TableName::new("my\"schema", "chunks").unwrap();
        assert_eq!(table.qualified(), "\"my\"\"schema\".\"chunks\"");
        assert!(TableName::new("", "chunks").is_err());
        assert_eq!(table.index_name("tsv"), "\"my_schema_chunks_tsv_idx\"");
    }

    #[test]
    fn test_schema_sql_shape() {
        let config = PgStoreConfig {
            event_table: Some("event".to_string()),
            ..PgStoreConfig::default()
        };
        let statements = schema_sql(&table(), &config);
        assert_eq!(statements[0], "CREATE EXTENSION IF NOT EXISTS vector");
        assert!(statements[1].contains("VECTOR(1024)"));
        assert!(statements[1].contains("to_tsvector('english', search_text)"));
        assert!(statements[1].contains("REFERENCES \"public\".\"event\"(id) ON DELETE CASCADE"));
        assert!(statements[2].contains("USING GIN (search_tsv)"));
        assert!(statements[3].contains("USING hnsw (embedding vector_cosine_ops)"));
        assert!(statements[4].contains("(event_id)"));
    }

    #[test]
    fn test_schema_sql_without_event_table() {
        let statements = schema_sql(&table(), &PgStoreConfig::default());
        assert!(!statements[1].contains("REFERENCES"));
    }

    #[test]
    fn test_lexical_sql() {
        let sql = select_lexical_sql(&table(), "english");
        assert!(sql.contains("websearch_to_tsquery('english', $1)"));
        assert!(sql.contains("ts_rank_cd(search_tsv, query.q)"));
        assert!(sql.contains("ORDER BY score DESC, chunk_index ASC"));
        assert!(sql.contains("$3::uuid[] IS NULL OR event_id = ANY($3)"));
    }

    #[test]
    fn test_dense_sql() {
        let sql = select_dense_sql(&table());
        assert!(sql.contains("embedding <=> $1 AS distance"));
        assert!(sql.contains("ORDER BY distance ASC, chunk_index ASC"));
        assert!(sql.contains("LIMIT $2"));
    }

    #[test]
    fn test_literal_escaping() {
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[tokio::test]
    #[ignore] // Requires Postgres with pgvector, run with: DATABASE_URL=... cargo test -- --ignored
    async fn test_roundtrip_against_postgres() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let config = PgStoreConfig {
            table: format!("chunks_test_{}", Uuid::new_v4().simple()),
            dimension: 3,
            prepare_schema: true,
            ..PgStoreConfig::default()
        };
        let store = PgChunkStore::connect(&url, config).await.unwrap();

        let event = Uuid::new_v4();
        let text = "the chief guest discussed solar energy";
        let row = StoredChunk {
            chunk: Chunk {
                id: Uuid::new_v4(),
                event_id: event,
                chunk_index: 0,
                search_text: text.to_string(),
                raw_text: text.to_string(),
                metadata: ChunkMetadata {
                    chunk_index: 0,
                    word_count: 6,
                    ..Default::default()
                },
            },
            embedding: vec![1.0, 0.0, 0.0],
        };
        store.replace_event_chunks(event, &[row]).await.unwrap();
        assert_eq!(store.count_event_chunks(event).await.unwrap(), 1);

        let lexical = store.search_text("solar energy", 5, Some(&[event])).await.unwrap();
        assert_eq!(lexical.len(), 1);
        let dense = store.search_vector(&[1.0, 0.0, 0.0], 5, None).await.unwrap();
        assert!((dense[0].score - 1.0).abs() < 1e-5);

        assert_eq!(store.delete_event_chunks(event).await.unwrap(), 1);
    }
}
