use tracing::{debug, warn};
use uuid::Uuid;

use crate::chunk::{Chunk, ChunkMetadata};
use crate::config::ChunkingConfig;
use crate::event::EventContext;
use crate::{Error, Result};

/// Word-window segmenter - splits a transcript by word count
///
/// Parameters:
/// - chunk_size: words per window
/// - overlap_size: words shared by adjacent windows
/// - min_chunk_size: transcripts shorter than this become a single chunk
#[derive(Debug, Clone)]
pub struct TextSegmenter {
    chunk_size: usize,
    overlap_size: usize,
    min_chunk_size: usize,
}

impl TextSegmenter {
    /// Create a segmenter, rejecting window settings that cannot make progress.
    pub fn new(chunk_size: usize, overlap_size: usize, min_chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Configuration("chunk size must be positive".to_string()));
        }
        if overlap_size >= chunk_size {
            return Err(Error::Configuration(format!(
                "overlap size {overlap_size} must be less than chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap_size,
            min_chunk_size,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.overlap_size, config.min_chunk_size)
    }

    /// Distance in words between the starts of adjacent windows.
    #[must_use]
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap_size
    }

    /// Split a transcript into ordered, overlapping chunks for `event`.
    pub fn segment(&self, event: &EventContext, transcript: &str) -> Vec<Chunk> {
        let words: Vec<&str> = transcript.split_whitespace().collect();
        if words.is_empty() {
            warn!(event_id = %event.id, "no transcript text to segment");
            return Vec::new();
        }

        let header = context_header(event);

        // short transcripts stay whole
        if words.len() < self.min_chunk_size {
            return vec![build_chunk(event, &header, 0, &words, 0, 0)];
        }

        let mut chunks = Vec::with_capacity(words.len().div_ceil(self.step()));
        let mut start = 0;
        loop {
            let end = (start + self.chunk_size).min(words.len());
            let overlap_prev = if start > 0 { self.overlap_size } else { 0 };
            let overlap_next = if end < words.len() { self.overlap_size } else { 0 };

            chunks.push(build_chunk(
                event,
                &header,
                chunks.len(),
                &words[start..end],
                overlap_prev,
                overlap_next,
            ));

            if end == words.len() {
                break;
            }
            start += self.step();
        }

        debug!(event_id = %event.id, words = words.len(), chunks = chunks.len(), "segmented transcript");
        chunks
    }
}

/// One-line label prepended to every window's search text.
///
/// Empty fields are left out; an event with no labels gets no header.
#[must_use]
pub fn context_header(event: &EventContext) -> String {
    [
        ("Event", &event.name),
        ("Guest", &event.guest),
        ("Organizer", &event.organizer),
        ("Venue", &event.venue),
    ]
    .iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(label, value)| format!("{label}: {value}"))
    .collect::<Vec<_>>()
    .join(" | ")
}

fn build_chunk(
    event: &EventContext,
    header: &str,
    chunk_index: usize,
    words: &[&str],
    overlap_prev: usize,
    overlap_next: usize,
) -> Chunk {
    let raw_text = words.join(" ");
    let search_text = if header.is_empty() {
        raw_text.clone()
    } else {
        format!("{header}\n{raw_text}")
    };

    Chunk {
        id: Uuid::new_v4(),
        event_id: event.id,
        chunk_index,
        search_text,
        raw_text,
        metadata: ChunkMetadata {
            chunk_index,
            word_count: words.len(),
            event_name: event.name.clone(),
            guest: event.guest.clone(),
            organizer: event.organizer.clone(),
            venue: event.venue.clone(),
            overlap_prev,
            overlap_next,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn event() -> EventContext {
        EventContext::builder()
            .id(Uuid::new_v4())
            .name("AI Summit")
            .guest("Dr. Rao")
            .organizer("IEEE")
            .venue("Hall A")
            .build()
            .unwrap()
    }

    fn numbered_words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    /// Word-level view of a chunk's raw text.
    fn words(chunk: &Chunk) -> Vec<&str> {
        chunk.raw_text.split(' ').collect()
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        assert!(matches!(
            TextSegmenter::new(10, 10, 0),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            TextSegmenter::new(10, 12, 0),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            TextSegmenter::new(0, 0, 0),
            Err(Error::Configuration(_))
        ));
        assert!(TextSegmenter::new(10, 9, 0).is_ok());
    }

    #[test]
    fn test_boundary_arithmetic() {
        let segmenter = TextSegmenter::new(500, 80, 50).unwrap();
        let transcript = numbered_words(1200);
        let chunks = segmenter.segment(&event(), &transcript);

        assert_eq!(segmenter.step(), 420);
        assert_eq!(chunks.len(), 3);

        // [0:500], [420:920], [840:1200]
        let bounds: Vec<(&str, &str, usize)> = chunks
            .iter()
            .map(|c| {
                let w = words(c);
                (w[0], w[w.len() - 1], w.len())
            })
            .collect();
        assert_eq!(bounds[0], ("w0", "w499", 500));
        assert_eq!(bounds[1], ("w420", "w919", 500));
        assert_eq!(bounds[2], ("w840", "w1199", 360));

        assert_eq!(
            (chunks[0].metadata.overlap_prev, chunks[0].metadata.overlap_next),
            (0, 80)
        );
        assert_eq!(
            (chunks[1].metadata.overlap_prev, chunks[1].metadata.overlap_next),
            (80, 80)
        );
        assert_eq!(
            (chunks[2].metadata.overlap_prev, chunks[2].metadata.overlap_next),
            (80, 0)
        );
    }

    #[test]
    fn test_short_transcript_single_chunk() {
        let segmenter = TextSegmenter::new(500, 80, 50).unwrap();
        let chunks = segmenter.segment(&event(), &numbered_words(10));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].metadata.word_count, 10);
        assert_eq!(chunks[0].metadata.overlap_prev, 0);
        assert_eq!(chunks[0].metadata.overlap_next, 0);
    }

    #[test]
    fn test_empty_and_whitespace_transcripts() {
        let segmenter = TextSegmenter::new(500, 80, 50).unwrap();
        assert!(segmenter.segment(&event(), "").is_empty());
        assert!(segmenter.segment(&event(), " \n\t  \n").is_empty());
    }

    #[test]
    fn test_coverage_reproduces_transcript() {
        for (size, overlap, total) in [(7, 3, 40), (5, 0, 23), (10, 9, 31), (4, 1, 4), (6, 2, 7)] {
            let segmenter = TextSegmenter::new(size, overlap, 0).unwrap();
            let transcript = numbered_words(total);
            let chunks = segmenter.segment(&event(), &transcript);

            let mut rebuilt: Vec<&str> = Vec::new();
            for chunk in &chunks {
                rebuilt.extend(words(chunk).into_iter().skip(chunk.metadata.overlap_prev));
            }
            assert_eq!(
                rebuilt.join(" "),
                transcript,
                "size={size} overlap={overlap} total={total}"
            );
        }
    }

    #[test]
    fn test_adjacent_chunks_share_overlap() {
        let segmenter = TextSegmenter::new(8, 3, 0).unwrap();
        let chunks = segmenter.segment(&event(), &numbered_words(30));

        for pair in chunks.windows(2) {
            let prev = words(&pair[0]);
            let next = words(&pair[1]);
            assert_eq!(&prev[prev.len() - 3..], &next[..3]);
        }
    }

    #[test]
    fn test_indices_and_ownership() {
        let ctx = event();
        let segmenter = TextSegmenter::new(5, 2, 0).unwrap();
        let chunks = segmenter.segment(&ctx, &numbered_words(20));

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.metadata.chunk_index, i);
            assert_eq!(chunk.event_id, ctx.id);
            assert_eq!(chunk.metadata.word_count, chunk.word_count());
        }
        let ids: HashSet<Uuid> = chunks.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), chunks.len());
    }

    #[test]
    fn test_search_text_carries_header() {
        let segmenter = TextSegmenter::new(500, 80, 50).unwrap();
        let chunks = segmenter.segment(&event(), "thank   you\nall for\tcoming");

        let chunk = &chunks[0];
        assert_eq!(chunk.raw_text, "thank you all for coming");
        assert_eq!(
            chunk.search_text,
            "Event: AI Summit | Guest: Dr. Rao | Organizer: IEEE | Venue: Hall A\nthank you all for coming"
        );
        assert_eq!(chunk.metadata.event_name, "AI Summit");
        assert_eq!(chunk.metadata.venue, "Hall A");
    }

    #[test]
    fn test_header_skips_empty_fields() {
        let bare = EventContext::builder().id(Uuid::new_v4()).build().unwrap();
        assert_eq!(context_header(&bare), "");

        let partial = EventContext::builder()
            .id(Uuid::new_v4())
            .name("Demo Day")
            .venue("Atrium")
            .build()
            .unwrap();
        assert_eq!(context_header(&partial), "Event: Demo Day | Venue: Atrium");

        let segmenter = TextSegmenter::new(5, 1, 0).unwrap();
        let chunks = segmenter.segment(&bare, "one two");
        assert_eq!(chunks[0].search_text, chunks[0].raw_text);
    }
}
