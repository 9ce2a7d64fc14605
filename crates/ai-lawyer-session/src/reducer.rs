//! Streaming reply reducer.

use std::collections::HashSet;

use ai_lawyer_core::Source;
use ai_lawyer_transport::{Citation, StreamChunk};

/// Running state of one streamed model reply.
///
/// Text is the in-order concatenation of every delta. Sources are unique by
/// URI in first-seen order; a later duplicate never replaces the title.
#[derive(Debug, Clone, Default)]
pub struct StreamReducer {
    text: String,
    sources: Vec<Source>,
    seen: HashSet<String>,
}

impl StreamReducer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the running state.
    pub fn apply(&mut self, chunk: &StreamChunk) {
        if let Some(delta) = &chunk.text {
            self.text.push_str(delta);
        }
        if let Some(citations) = &chunk.citations {
            self.merge_citations(citations);
        }
    }

    /// Append citations not seen yet; incomplete ones are skipped.
    pub fn merge_citations(&mut self, citations: &[Citation]) {
        for source in citations.iter().filter_map(Citation::to_source) {
            if self.seen.insert(source.uri.clone()) {
                self.sources.push(source);
            }
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }
}
