//! Summary struct - the output of a successful summarisation.

use serde::{Deserialize, Serialize};

/// Prose summary returned by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// The summary text, trimmed
    pub text: String,
    /// Model identifier that produced it
    pub model: String,
}

impl Summary {
    /// Create a new summary
    pub fn new(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
        }
    }

    /// Number of whitespace-separated words
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Check if the summary has any content
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}
