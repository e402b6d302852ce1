//! Transcript segmentation
//!
//! Transcripts are split into overlapping word windows. Every window is
//! stored twice: `raw_text` for citations, and `search_text` with a short
//! event header so that lexical and semantic retrieval both "see" which event
//! a generic passage ("thank you all for coming") belongs to.
//!
//! # Usage
//!
//! ```ignore
//! use keynote_lib::chunk::TextSegmenter;
//!
//! let segmenter = TextSegmenter::new(500, 80, 50)?;
//! let chunks = segmenter.segment(&event, &transcript);
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A window of an event transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Unique identifier, generated at creation
    pub id: Uuid,
    /// Owning event
    pub event_id: Uuid,
    /// 0-based position within the event's chunk sequence
    pub chunk_index: usize,
    /// Context header followed by the window text; indexed and embedded
    pub search_text: String,
    /// Window text alone, for display
    pub raw_text: String,
    /// Denormalized event labels and overlap bookkeeping
    pub metadata: ChunkMetadata,
}

/// Metadata stored with every chunk.
///
/// The key set is fixed: decoding a metadata blob with extra keys fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChunkMetadata {
    pub chunk_index: usize,
    pub word_count: usize,
    pub event_name: String,
    pub guest: String,
    pub organizer: String,
    pub venue: String,
    /// Words shared with the previous chunk
    pub overlap_prev: usize,
    /// Words shared with the next chunk
    pub overlap_next: usize,
}

impl Chunk {
    /// Number of whitespace-separated words in `raw_text`.
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.raw_text.split_whitespace().count()
    }
}

mod window;

pub use window::*;
