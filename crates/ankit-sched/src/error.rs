//! Error types for ankit-sched.

use thiserror::Error;

use crate::card::{CardId, DeckId, Queue};

/// Result type for ankit-sched operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while scheduling.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed deck, deck-config, or scheduler setting.
    #[error("configuration error: {0}")]
    Config(String),

    /// SQLite error from the collection backend.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// JSON (de)serialization error for persisted collection data.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error for scheduler settings.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A card was answered while in a queue the answer processor cannot handle.
    #[error("card {card_id} cannot be answered from queue {queue:?}")]
    InvalidState {
        /// The offending card.
        card_id: CardId,
        /// The queue the card was in.
        queue: Queue,
    },

    /// An ease outside the buttons available for the card.
    #[error("ease {ease} is not valid for a card with {buttons} answer buttons")]
    InvalidEase {
        /// The ease that was submitted.
        ease: u8,
        /// Number of buttons the card offers.
        buttons: u8,
    },

    /// Deck not found.
    #[error("deck not found: {0}")]
    DeckNotFound(DeckId),

    /// Deck configuration not found.
    #[error("deck config not found: {0}")]
    DeckConfigNotFound(i64),

    /// Card not found.
    #[error("card not found: {0}")]
    CardNotFound(CardId),

    /// A filtered-deck operation was invoked on a normal deck.
    #[error("deck {0} is not a filtered deck")]
    NotFiltered(DeckId),

    /// Unparseable search expression.
    #[error("invalid search: {0}")]
    Search(String),
}
