//! Card scheduling state.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

/// Card identifier.
pub type CardId = i64;
/// Note identifier.
pub type NoteId = i64;
/// Deck identifier.
pub type DeckId = i64;

/// Due values above this are epoch seconds rather than day indexes.
pub(crate) const EPOCH_DUE_THRESHOLD: i64 = 1_000_000_000;

/// The queue a card is currently scheduled in.
///
/// The meaning of [`Card::due`] depends on the queue: epoch seconds for
/// [`Queue::Learn`], a day index for [`Queue::Review`] and
/// [`Queue::DayLearn`], and an insertion position for [`Queue::New`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Queue {
    /// Held out of scheduling until unsuspended.
    Suspended,
    /// Buried automatically because a sibling was answered.
    BuriedSibling,
    /// Buried by the user.
    BuriedManual,
    /// Never studied.
    New,
    /// Learning or relearning, due within the day.
    Learn,
    /// Graduated and due on a day index.
    Review,
    /// Learning or relearning with a step that crosses the day cutoff.
    DayLearn,
}

impl Queue {
    /// The integer stored in the `queue` column.
    pub fn as_i64(self) -> i64 {
        match self {
            Queue::Suspended => -1,
            Queue::BuriedSibling => -2,
            Queue::BuriedManual => -3,
            Queue::New => 0,
            Queue::Learn => 1,
            Queue::Review => 2,
            Queue::DayLearn => 3,
        }
    }

    /// Parse the integer stored in the `queue` column.
    pub fn from_i64(value: i64) -> Option<Self> {
        Some(match value {
            -1 => Queue::Suspended,
            -2 => Queue::BuriedSibling,
            -3 => Queue::BuriedManual,
            0 => Queue::New,
            1 => Queue::Learn,
            2 => Queue::Review,
            3 => Queue::DayLearn,
            _ => return None,
        })
    }

    /// Whether the card is buried, by either mechanism.
    pub fn is_buried(self) -> bool {
        matches!(self, Queue::BuriedSibling | Queue::BuriedManual)
    }
}

impl ToSql for Queue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_i64()))
    }
}

impl FromSql for Queue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        Queue::from_i64(raw).ok_or(FromSqlError::OutOfRange(raw))
    }
}

/// The kind of card, independent of which queue it sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    /// Never studied.
    New,
    /// In initial learning.
    Learn,
    /// Graduated.
    Review,
    /// Lapsed and relearning.
    Relearn,
}

impl CardType {
    /// The integer stored in the `type` column.
    pub fn as_i64(self) -> i64 {
        match self {
            CardType::New => 0,
            CardType::Learn => 1,
            CardType::Review => 2,
            CardType::Relearn => 3,
        }
    }

    /// Parse the integer stored in the `type` column.
    pub fn from_i64(value: i64) -> Option<Self> {
        Some(match value {
            0 => CardType::New,
            1 => CardType::Learn,
            2 => CardType::Review,
            3 => CardType::Relearn,
            _ => return None,
        })
    }
}

impl ToSql for CardType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_i64()))
    }
}

impl FromSql for CardType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        CardType::from_i64(raw).ok_or(FromSqlError::OutOfRange(raw))
    }
}

/// A card's scheduling fields.
///
/// Note content is owned by the note store; only `note_id` links to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    /// Card ID.
    pub id: CardId,
    /// Owning note.
    pub note_id: NoteId,
    /// Deck the card currently lives in.
    pub deck_id: DeckId,
    /// Template ordinal.
    pub ord: i64,
    /// Modification time (epoch seconds).
    pub mtime: i64,
    /// Update sequence number.
    pub usn: i64,
    /// Card type.
    pub ctype: CardType,
    /// Queue.
    pub queue: Queue,
    /// Queue-dependent due value.
    pub due: i64,
    /// Interval in days.
    pub interval: i64,
    /// Ease factor in permille.
    pub factor: i64,
    /// Number of answers.
    pub reps: i64,
    /// Number of lapses.
    pub lapses: i64,
    /// Packed learning steps: `remaining + 1000 * remaining_today`.
    pub left: i64,
    /// Due value to restore when leaving a filtered deck or relearning.
    pub original_due: Option<i64>,
    /// Home deck while the card sits in a filtered deck.
    pub original_deck_id: Option<DeckId>,
    /// User flags.
    pub flags: i64,
    /// Opaque extra data.
    pub data: String,
}

impl Card {
    /// A new card at the given position.
    pub fn new(id: CardId, note_id: NoteId, deck_id: DeckId, position: i64) -> Self {
        Self {
            id,
            note_id,
            deck_id,
            ord: 0,
            mtime: 0,
            usn: 0,
            ctype: CardType::New,
            queue: Queue::New,
            due: position,
            interval: 0,
            factor: 0,
            reps: 0,
            lapses: 0,
            left: 0,
            original_due: None,
            original_deck_id: None,
            flags: 0,
            data: String::new(),
        }
    }

    /// Whether the card currently sits in a filtered deck.
    pub fn is_filtered(&self) -> bool {
        self.original_deck_id.is_some()
    }

    /// The deck the card belongs to outside of any filtered deck.
    pub fn home_deck_id(&self) -> DeckId {
        self.original_deck_id.unwrap_or(self.deck_id)
    }

    /// Return to the home deck, dropping the filtered linkage.
    pub(crate) fn remove_from_filtered(&mut self) {
        if let Some(home) = self.original_deck_id.take() {
            self.deck_id = home;
            self.original_due = None;
        }
    }

    /// Restore the pre-filtered due and deck, then clear the linkage.
    pub(crate) fn restore_from_filtered(&mut self) {
        if let Some(due) = self.original_due.take() {
            self.due = due;
        }
        if let Some(home) = self.original_deck_id.take() {
            self.deck_id = home;
        }
    }

    /// Like [`Card::restore_from_filtered`], but a new card that was
    /// mid-learning inside a filtered deck goes back to being new.
    pub(crate) fn unlink_filtered(&mut self) {
        let was_filtered = self.is_filtered();
        self.restore_from_filtered();
        if was_filtered && self.ctype == CardType::Learn {
            self.ctype = CardType::New;
            self.left = 0;
        }
    }

    /// The schedulable queue implied by the card's type.
    ///
    /// Learning types map to the intraday or day-based learning queue
    /// depending on whether `due` holds epoch seconds.
    pub fn restored_queue(&self) -> Queue {
        match self.ctype {
            CardType::New => Queue::New,
            CardType::Review => Queue::Review,
            CardType::Learn | CardType::Relearn => {
                if self.due > EPOCH_DUE_THRESHOLD {
                    Queue::Learn
                } else {
                    Queue::DayLearn
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_round_trips_column_values() {
        for raw in -3..=3 {
            assert_eq!(Queue::from_i64(raw).unwrap().as_i64(), raw);
        }
        assert_eq!(Queue::from_i64(4), None);
    }

    #[test]
    fn test_restored_queue_by_type() {
        let mut card = Card::new(1, 1, 1, 5);
        assert_eq!(card.restored_queue(), Queue::New);

        card.ctype = CardType::Relearn;
        card.due = 1_700_000_000;
        assert_eq!(card.restored_queue(), Queue::Learn);

        card.due = 42;
        assert_eq!(card.restored_queue(), Queue::DayLearn);
    }

    #[test]
    fn test_unlink_filtered_turns_learning_back_to_new() {
        let mut card = Card::new(1, 1, 7, 5);
        card.ctype = CardType::Learn;
        card.queue = Queue::Learn;
        card.due = 1_700_000_000;
        card.original_deck_id = Some(2);
        card.original_due = Some(5);

        card.unlink_filtered();

        assert_eq!(card.deck_id, 2);
        assert_eq!(card.due, 5);
        assert_eq!(card.ctype, CardType::New);
        assert!(!card.is_filtered());
        assert_eq!(card.original_due, None);
    }
}
