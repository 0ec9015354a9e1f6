//! Spaced-repetition scheduling over Anki collection files.
//!
//! `ankit-sched` opens an Anki schema-11 SQLite collection and decides which
//! card to study next, how answers change a card's schedule, and how many
//! cards are due per deck. It covers learning steps, reviews, lapses and
//! relearning, leeches, burying, suspension, and filtered decks, under either
//! the three-button or the four-button policy.
//!
//! # Quick Start
//!
//! ```
//! use ankit_sched::{Collection, ManualClock};
//!
//! # fn example() -> ankit_sched::Result<()> {
//! let mut col = Collection::builder()
//!     .clock(ManualClock::at(1_700_000_000))
//!     .open()?;
//!
//! let note = col.add_note(&["der Hund", "the dog"], &["german"])?;
//! col.add_card(note, 1)?;
//!
//! let mut sched = col.sched();
//! let counts = sched.counts()?;
//! assert_eq!(counts.new, 1);
//!
//! if let Some(card) = sched.get_next_card()? {
//!     let outcome = sched.answer(&card, 3)?;
//!     println!("next due: {}", outcome.card.due);
//! }
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! # Configuration
//!
//! Engine-wide settings ([`SchedulerConfig`]) load from TOML. Per-deck
//! options live in the collection itself as deck configurations.
//!
//! ```toml
//! version = "v2"
//! review_pop_order = "head_first"
//! rollover_unbury = "siblings"
//! report_limit = 1000
//! ```
//!
//! # Time
//!
//! All day boundaries derive from an injected [`Clock`]. Tests use
//! [`ManualClock`] to step through days deterministically.

#![warn(missing_docs)]

mod card;
mod clock;
mod collection;
mod config;
mod deck;
mod decks;
mod error;
mod revlog;
pub mod sched;
mod schema;
mod search;
mod storage;

pub use card::{Card, CardId, CardType, DeckId, NoteId, Queue};
pub use clock::{Clock, ManualClock, SystemClock};
pub use collection::{Collection, CollectionBuilder};
pub use config::{ReviewPopOrder, RolloverUnbury, SchedulerConfig, SchedulerVersion};
pub use deck::{
    CollectionConf, DailyCount, Deck, DeckConfig, DeckConfigId, FilterOrder, FilterTerm,
    LapseConfig, LeechAction, NewConfig, NewSpread, ReviewConfig,
};
pub use decks::{DECK_SEPARATOR, DeckManager, EffectiveConfig, PreviewDelays};
pub use error::{Error, Result};
pub use revlog::{ReviewLogEntry, RevlogKind};
pub use sched::{
    AnswerOutcome, CancelToken, Counts, DeckDueNode, Fill, Leech, QueueHeads, Rollover, Scheduler,
    SchedulerState, UnburyKind,
};
pub use schema::LEECH_TAG;
pub use search::{SearchBuilder, SqlSearch};
pub use storage::Storage;
