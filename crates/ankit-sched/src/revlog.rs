//! Review log entries.

use serde::Serialize;

use crate::card::CardId;

/// Which kind of answer a log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevlogKind {
    /// Answer on a new or learning card.
    Learn,
    /// Answer on a review card.
    Review,
    /// Answer on a relearning card.
    Relearn,
    /// Answer inside a filtered deck (cramming, early review, preview).
    Cram,
}

impl RevlogKind {
    /// The integer stored in the `type` column.
    pub fn as_i64(self) -> i64 {
        match self {
            RevlogKind::Learn => 0,
            RevlogKind::Review => 1,
            RevlogKind::Relearn => 2,
            RevlogKind::Cram => 3,
        }
    }
}

/// One row of the review log.
///
/// Negative intervals are learning delays in seconds; positive intervals
/// are days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewLogEntry {
    /// Millisecond timestamp, unique across the log.
    pub id: i64,
    /// The card answered.
    pub card_id: CardId,
    /// Ease pressed.
    pub ease: u8,
    /// Interval after the answer.
    pub interval: i64,
    /// Interval before the answer.
    pub last_interval: i64,
    /// Ease factor after the answer.
    pub factor: i64,
    /// Milliseconds spent on the card.
    pub time_taken: i64,
    /// Answer kind.
    pub kind: RevlogKind,
}
