//! Keynote CLI - index event transcripts and search them
//!
//! # Commands
//!
//! ```bash
//! # Show how a transcript is segmented
//! keynote chunk talk.txt --event-name "Water Futures Forum"
//!
//! # Demo: index a file in memory and search it (offline hashing embedder)
//! keynote demo talk.txt "groundwater recharge"
//!
//! # Postgres-backed workflow
//! keynote prepare
//! keynote index events.json
//! keynote search "groundwater recharge" --mode hybrid -k 5
//! keynote purge 6f1c0a6e-3d1f-4b8e-9a43-2f0f5f6d1c11
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use keynote_lib::{
    chunk::TextSegmenter,
    config::{ChunkingConfig, EngineConfig, IndexingConfig, SearchConfig},
    embed::{EmbeddingProvider, HashingEmbedder, JinaConfig, JinaEmbedder},
    event::{EventContext, EventRecord},
    search::{SearchEngine, SearchHit, SearchMode},
    store::{ChunkStore, MemoryStore, PgChunkStore, PgStoreConfig},
};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "keynote")]
#[command(about = "Hybrid lexical + vector search over event transcripts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment a transcript and show the chunks
    Chunk {
        /// Transcript file
        input: PathBuf,

        #[command(flatten)]
        event: EventArgs,

        #[command(flatten)]
        chunking: ChunkArgs,
    },

    /// Embed text and show vector info
    Embed {
        /// Text to embed
        text: String,

        /// Embed as a search query instead of a passage
        #[arg(short, long)]
        query: bool,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Demo: index a transcript in memory and search it (all in one command)
    Demo {
        /// Transcript file
        input: PathBuf,

        /// Query to search for
        query: String,

        /// Number of results to return
        #[arg(short, long, default_value = "3")]
        k: usize,

        /// lexical, vector or hybrid
        #[arg(short, long, default_value = "hybrid")]
        mode: SearchMode,

        #[command(flatten)]
        event: EventArgs,

        #[command(flatten)]
        chunking: ChunkArgs,

        #[command(flatten)]
        search: SearchArgs,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Create the pgvector extension, chunk table and indexes
    Prepare {
        #[command(flatten)]
        db: DbArgs,
    },

    /// Index event records (a JSON object or array) into Postgres
    Index {
        /// JSON file with event records including their transcription
        input: PathBuf,

        #[command(flatten)]
        chunking: ChunkArgs,

        #[command(flatten)]
        provider: ProviderArgs,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Search indexed transcripts
    Search {
        /// Query text
        query: String,

        /// Number of results to return
        #[arg(short, long, default_value = "10")]
        k: usize,

        /// lexical, vector or hybrid
        #[arg(short, long, default_value = "hybrid")]
        mode: SearchMode,

        /// Restrict to these events (repeatable)
        #[arg(long = "event")]
        events: Vec<Uuid>,

        /// Print hits as JSON lines
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        search: SearchArgs,

        #[command(flatten)]
        provider: ProviderArgs,

        #[command(flatten)]
        db: DbArgs,
    },

    /// Delete every chunk of an event
    Purge {
        event_id: Uuid,

        #[command(flatten)]
        db: DbArgs,
    },
}

#[derive(Args)]
struct EventArgs {
    /// Event id (random when omitted)
    #[arg(long)]
    event_id: Option<Uuid>,

    #[arg(long, default_value = "")]
    event_name: String,

    #[arg(long, default_value = "")]
    guest: String,

    #[arg(long, default_value = "")]
    organizer: String,

    #[arg(long, default_value = "")]
    venue: String,
}

impl EventArgs {
    fn context(&self) -> Result<EventContext> {
        let context = EventContext::builder()
            .id(self.event_id.unwrap_or_else(Uuid::new_v4))
            .name(self.event_name.as_str())
            .guest(self.guest.as_str())
            .organizer(self.organizer.as_str())
            .venue(self.venue.as_str())
            .build()?;
        Ok(context)
    }
}

#[derive(Args)]
struct ChunkArgs {
    /// Words per chunk
    #[arg(long, env = "KEYNOTE_CHUNK_SIZE", default_value_t = 500)]
    chunk_size: usize,

    /// Words shared by adjacent chunks
    #[arg(long, env = "KEYNOTE_OVERLAP_SIZE", default_value_t = 80)]
    overlap_size: usize,

    /// Transcripts shorter than this stay a single chunk
    #[arg(long, env = "KEYNOTE_MIN_CHUNK_SIZE", default_value_t = 50)]
    min_chunk_size: usize,
}

impl ChunkArgs {
    fn config(&self) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: self.chunk_size,
            overlap_size: self.overlap_size,
            min_chunk_size: self.min_chunk_size,
        }
    }
}

#[derive(Args)]
struct SearchArgs {
    /// Candidates fetched per modality = k * multiplier
    #[arg(long, env = "KEYNOTE_CANDIDATE_MULTIPLIER", default_value_t = 3)]
    candidate_multiplier: usize,

    /// Reciprocal Rank Fusion constant
    #[arg(long, env = "KEYNOTE_RRF_K", default_value_t = 60.0)]
    rrf_k: f64,

    /// Per-modality search timeout in milliseconds
    #[arg(long, env = "KEYNOTE_SEARCH_TIMEOUT_MS", default_value_t = 5000)]
    timeout_ms: u64,
}

impl SearchArgs {
    fn config(&self) -> SearchConfig {
        SearchConfig {
            candidate_multiplier: self.candidate_multiplier,
            rrf_k: self.rrf_k,
            timeout: Duration::from_millis(self.timeout_ms),
            ..SearchConfig::default()
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderKind {
    /// Offline bag-of-words hashing, no model required
    Hashing,
    /// Jina AI embeddings API (needs JINA_API_KEY)
    Jina,
    /// Local BAAI/bge-large-en-v1.5 (build with --features bge)
    Bge,
}

#[derive(Args)]
struct ProviderArgs {
    /// Embedding provider
    #[arg(long, env = "KEYNOTE_PROVIDER", value_enum, default_value = "hashing")]
    provider: ProviderKind,

    #[arg(long, env = "JINA_API_KEY", hide_env_values = true)]
    jina_api_key: Option<String>,

    /// Embedding dimension shared by the provider and the store
    #[arg(long, env = "KEYNOTE_DIMENSION", default_value_t = 1024)]
    dimension: usize,
}

impl ProviderArgs {
    fn build(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        let provider: Arc<dyn EmbeddingProvider> = match self.provider {
            ProviderKind::Hashing => Arc::new(HashingEmbedder::new(self.dimension)),
            ProviderKind::Jina => {
                let key = self
                    .jina_api_key
                    .as_deref()
                    .context("JINA_API_KEY is required for the jina provider")?;
                let config = JinaConfig {
                    dimensions: self.dimension,
                    ..JinaConfig::default()
                };
                Arc::new(JinaEmbedder::new(key, config)?)
            }
            ProviderKind::Bge => bge_provider()?,
        };
        info!(model = provider.model_name(), dimension = provider.dimension(), "embedding provider ready");
        Ok(provider)
    }
}

#[cfg(feature = "bge")]
fn bge_provider() -> Result<Arc<dyn EmbeddingProvider>> {
    println!("Loading BGE model (first run downloads ~1.2GB)...");
    Ok(Arc::new(keynote_lib::embed::BgeEmbedder::new()?))
}

#[cfg(not(feature = "bge"))]
fn bge_provider() -> Result<Arc<dyn EmbeddingProvider>> {
    bail!("keynote was built without the `bge` feature")
}

#[derive(Args)]
struct DbArgs {
    /// Postgres connection string (postgres://...)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(long, env = "KEYNOTE_PG_SCHEMA", default_value = "public")]
    schema: String,

    #[arg(long, env = "KEYNOTE_PG_TABLE", default_value = "event_chunks")]
    table: String,

    /// Event table whose deletes cascade to chunks (id UUID primary key)
    #[arg(long, env = "KEYNOTE_PG_EVENT_TABLE")]
    event_table: Option<String>,

    /// Must match the embedding provider's dimension
    #[arg(long, env = "KEYNOTE_DIMENSION", default_value_t = 1024)]
    store_dimension: usize,
}

impl DbArgs {
    async fn connect(&self, prepare_schema: bool) -> Result<Arc<PgChunkStore>> {
        let config = PgStoreConfig {
            schema: self.schema.clone(),
            table: self.table.clone(),
            dimension: self.store_dimension,
            event_table: self.event_table.clone(),
            prepare_schema,
            ..PgStoreConfig::default()
        };
        let store = PgChunkStore::connect(&self.database_url, config)
            .await
            .context("failed to open the chunk store")?;
        Ok(Arc::new(store))
    }
}

fn engine(
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn ChunkStore>,
    chunking: ChunkingConfig,
    search: SearchConfig,
) -> Result<SearchEngine<dyn EmbeddingProvider, dyn ChunkStore>> {
    let config = EngineConfig {
        dimension: provider.dimension(),
        indexing: IndexingConfig {
            chunking,
            ..IndexingConfig::default()
        },
        search,
    };
    Ok(SearchEngine::new(provider, store, config)?)
}

fn read_records(path: &Path) -> Result<Vec<EventRecord>> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {path:?}"))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("{path:?} is not valid JSON"))?;
    let records = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(records)
}

fn print_hits(hits: &[SearchHit]) {
    println!("\n=== Results ===\n");
    for (i, hit) in hits.iter().enumerate() {
        let ranks = match (hit.lexical_rank, hit.vector_rank) {
            (Some(l), Some(v)) => format!(", lexical #{}, vector #{}", l + 1, v + 1),
            (Some(l), None) => format!(", lexical #{}", l + 1),
            (None, Some(v)) => format!(", vector #{}", v + 1),
            (None, None) => String::new(),
        };
        println!(
            "#{} (score: {:.4}{ranks}) {} chunk {}",
            i + 1,
            hit.score,
            hit.metadata.event_name,
            hit.chunk_index
        );
        println!("---");
        let preview: String = hit.text.chars().take(300).collect();
        let ellipsis = if hit.text.chars().count() > 300 { "..." } else { "" };
        println!("{preview}{ellipsis}\n");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chunk {
            input,
            event,
            chunking,
        } => {
            let text = fs::read_to_string(&input)?;
            let segmenter = TextSegmenter::from_config(&chunking.config())?;
            let chunks = segmenter.segment(&event.context()?, &text);

            println!("Segmented {input:?} into {} chunks:\n", chunks.len());
            for chunk in &chunks {
                let meta = &chunk.metadata;
                println!(
                    "--- Chunk {} ({} words, overlap {}/{}) ---",
                    chunk.chunk_index, meta.word_count, meta.overlap_prev, meta.overlap_next
                );
                // Show preview (first 200 chars)
                let preview: String = chunk.search_text.chars().take(200).collect();
                let ellipsis = if chunk.search_text.chars().count() > 200 { "..." } else { "" };
                println!("{preview}{ellipsis}\n");
            }
        }

        Commands::Embed {
            text,
            query,
            provider,
        } => {
            let provider = provider.build()?;
            let embedding = if query {
                println!("Embedding as query: {text}");
                provider.embed_query(&text).await?
            } else {
                println!("Embedding as passage: {text}");
                provider
                    .embed_passages(&[text])
                    .await?
                    .into_iter()
                    .next()
                    .context("provider returned no embedding")?
            };

            println!("\nEmbedding stats:");
            println!("  Model: {}", provider.model_name());
            println!("  Dimensions: {}", embedding.len());
            println!("  First 5 values: {:?}", &embedding[..embedding.len().min(5)]);
            println!("  Min: {:.4}", embedding.iter().cloned().fold(f32::INFINITY, f32::min));
            println!("  Max: {:.4}", embedding.iter().cloned().fold(f32::NEG_INFINITY, f32::max));
        }

        Commands::Demo {
            input,
            query,
            k,
            mode,
            event,
            chunking,
            search,
            provider,
        } => {
            println!("Loading {input:?}...");
            let transcript = fs::read_to_string(&input)?;
            let event = event.context()?;

            let provider = provider.build()?;
            let store: Arc<dyn ChunkStore> = Arc::new(MemoryStore::new(provider.dimension()));
            let engine = engine(provider, store, chunking.config(), search.config())?;

            let result = engine.index(&event, &transcript).await;
            if !result.is_success() {
                bail!(
                    "indexing failed: {}",
                    result.failure.unwrap_or_else(|| "unknown error".to_string())
                );
            }
            println!("Indexed {} chunks for event {}", result.chunks_indexed, event.id);

            println!("\nSearching: '{query}' (k={k}, mode={mode})");
            let hits = engine.query(&query, k, None, mode).await?;
            print_hits(&hits);
        }

        Commands::Prepare { db } => {
            let store = db.connect(true).await?;
            println!(
                "Schema ready ({} dimensions, {} chunks stored)",
                store.dimension(),
                store.len().await?
            );
        }

        Commands::Index {
            input,
            chunking,
            provider,
            db,
        } => {
            let records = read_records(&input)?;
            let provider = provider.build()?;
            let store: Arc<dyn ChunkStore> = db.connect(false).await?;
            let engine = engine(provider, store, chunking.config(), SearchConfig::default())?;

            let ids: Vec<Option<String>> = records.iter().map(|r| r.event_id.clone()).collect();
            let results = engine.index_many(records).await;

            let mut failed = 0;
            for (id, result) in ids.iter().zip(&results) {
                if !result.is_success() {
                    failed += 1;
                }
                println!(
                    "{} {}",
                    id.as_deref().unwrap_or("<missing id>"),
                    serde_json::to_string(result)?
                );
            }
            println!("\nIndexed {} of {} events", results.len() - failed, results.len());
            if failed > 0 {
                bail!("{failed} event(s) failed to index");
            }
        }

        Commands::Search {
            query,
            k,
            mode,
            events,
            json,
            search,
            provider,
            db,
        } => {
            let provider = provider.build()?;
            let store: Arc<dyn ChunkStore> = db.connect(false).await?;
            let engine = engine(provider, store, ChunkingConfig::default(), search.config())?;

            let filter = (!events.is_empty()).then_some(events);
            let hits = engine.query(&query, k, filter, mode).await?;
            if json {
                for hit in &hits {
                    println!("{}", serde_json::to_string(hit)?);
                }
            } else {
                print_hits(&hits);
            }
        }

        Commands::Purge { event_id, db } => {
            let store = db.connect(false).await?;
            let removed = store.delete_event_chunks(event_id).await?;
            println!("Removed {removed} chunks for event {event_id}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_embed_subcommand_parses() {
        let cli = Cli::try_parse_from(["keynote", "embed", "solar energy", "--query", "--dimension", "64"]).unwrap();
        match cli.command {
            Commands::Embed { text, query, provider } => {
                assert_eq!(text, "solar energy");
                assert!(query);
                assert_eq!(provider.dimension, 64);
            }
            _ => panic!("expected the embed subcommand"),
        }
    }
}
