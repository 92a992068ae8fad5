//! Transcript buffer
//!
//! Accumulates recognized speech for the current answer. Partial segments
//! are advisory, display-only text; only committed (final) segments are
//! ever submitted.

use crate::channel::TranscriptUpdate;

#[derive(Debug, Default, Clone)]
pub struct TranscriptBuffer {
    committed: String,
    pending: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one transcript update. A final segment clears the pending
    /// text and appends to the committed transcript; a partial segment
    /// replaces the pending text.
    pub fn apply(&mut self, update: &TranscriptUpdate) {
        if update.is_final {
            let text = update.text.trim();
            if !text.is_empty() {
                if !self.committed.is_empty() {
                    self.committed.push(' ');
                }
                self.committed.push_str(text);
            }
            self.pending.clear();
        } else {
            self.pending = update.text.clone();
        }
    }

    /// Finalized transcript accepted for submission.
    pub fn committed(&self) -> &str {
        &self.committed
    }

    /// Interim text for display only.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Committed plus pending, for live display.
    pub fn display(&self) -> String {
        if self.pending.is_empty() {
            self.committed.clone()
        } else if self.committed.is_empty() {
            self.pending.clone()
        } else {
            format!("{} {}", self.committed, self.pending)
        }
    }

    pub fn has_committed_text(&self) -> bool {
        !self.committed.trim().is_empty()
    }

    /// Reset between questions.
    pub fn clear(&mut self) {
        self.committed.clear();
        self.pending.clear();
    }
}
