//! Keynote - hybrid retrieval over event transcripts
//!
//! # Architecture
//!
//! ```text
//! EventContext + transcript -> TextSegmenter -> EmbeddingProvider -> ChunkStore
//!                                                                      |    |
//! Query ------------------------------------> LexicalSearcher <--------+    |
//!   \-> EmbeddingProvider -> VectorSearcher <-------------------------------+
//!                                   \                /
//!                                    FusionRanker (RRF)
//!                                          |
//!                                      SearchHits
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use keynote_lib::{config::EngineConfig, embed::JinaEmbedder, search::{SearchEngine, SearchMode}};
//! use keynote_lib::store::{PgChunkStore, PgStoreConfig};
//!
//! let provider = Arc::new(JinaEmbedder::new(&api_key, Default::default())?);
//! let store = Arc::new(PgChunkStore::connect(&database_url, PgStoreConfig::default()).await?);
//! let engine = SearchEngine::new(provider, store, EngineConfig::default())?;
//!
//! // Index an event's transcript
//! let result = engine.index(&event, &transcript).await;
//!
//! // Search
//! let hits = engine.query("What did the chief guest say about water?", 5, None, SearchMode::Hybrid).await?;
//! ```

pub mod chunk;
pub mod config;
pub mod embed;
pub mod error;
pub mod event;
pub mod index;
pub mod retry;
pub mod search;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
