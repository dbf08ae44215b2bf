//! # Error Types
//!
//! Every fallible operation of the model returns [`HalResult`]. None of these
//! are fatal to the host: the personality loader and the reply path turn them
//! into a fresh model or a canned sentence and log a warning.

use thiserror::Error;

/// Main error type for model operations
#[derive(Error, Debug)]
pub enum HalError {
    /// Missing or unreadable file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Brain file that does not follow the binary layout
    #[error("Format error: {0}")]
    Format(String),

    /// Brain file that ends before the layout is complete
    #[error("Brain file truncated while reading {0}")]
    Truncated(&'static str),

    /// The 16-bit symbol space is full
    #[error("Capacity limit reached: {current} >= {max}")]
    CapacityLimit { current: usize, max: usize },

    /// Sentence with more words than a phrase can record
    #[error("Sentence of {words} words exceeds the {max} word limit")]
    PhraseTooLong { words: usize, max: usize },

    /// Model order outside 1..=5
    #[error("Invalid model order {0} (expected 1..=5)")]
    InvalidOrder(usize),
}

/// Result type for model operations
pub type HalResult<T> = Result<T, HalError>;

impl HalError {
    /// Create a format error
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// True for errors that mean "this file is not a usable brain"
    pub fn is_unusable_brain(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Format(_) | Self::Truncated(_))
    }
}
