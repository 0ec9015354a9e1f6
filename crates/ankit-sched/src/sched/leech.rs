//! Leech detection.

use serde::Serialize;

use crate::card::{Card, CardId, NoteId, Queue};
use crate::deck::{LapseConfig, LeechAction};

/// A card that just became a leech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Leech {
    /// The card.
    pub card_id: CardId,
    /// Its note, which was tagged.
    pub note_id: NoteId,
    /// Whether the card was suspended.
    pub suspended: bool,
}

/// Whether a card with `lapses` lapses has just crossed a leech threshold.
///
/// The first threshold is `leech_fails`; after that the card is flagged
/// again every `leech_fails / 2` lapses. A threshold of zero disables
/// detection.
///
/// ```
/// use ankit_sched::sched::is_leech;
///
/// assert!(is_leech(8, 8));
/// assert!(!is_leech(9, 8));
/// assert!(is_leech(12, 8));
/// assert!(!is_leech(3, 0));
/// ```
pub fn is_leech(lapses: i64, leech_fails: i64) -> bool {
    if leech_fails <= 0 || lapses < leech_fails {
        return false;
    }
    (lapses - leech_fails) % (leech_fails / 2).max(1) == 0
}

/// Apply the leech action to a card that has just lapsed.
///
/// Returns `None` if the card is not a leech. Tagging the note is left to
/// the caller, which owns the transaction.
pub(crate) fn handle_leech(card: &mut Card, lapse: &LapseConfig) -> Option<Leech> {
    if !is_leech(card.lapses, lapse.leech_fails) {
        return None;
    }
    let suspended = lapse.leech_action == LeechAction::Suspend;
    if suspended {
        card.restore_from_filtered();
        card.queue = Queue::Suspended;
    }
    Some(Leech {
        card_id: card.id,
        note_id: card.note_id,
        suspended,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn lapse(leech_fails: i64, leech_action: LeechAction) -> LapseConfig {
        LapseConfig {
            delays: vec![10.0],
            min_int: 1,
            mult: 0.0,
            leech_fails,
            leech_action,
            other: Map::new(),
        }
    }

    #[test]
    fn test_leech_boundaries() {
        assert!(!is_leech(7, 8));
        assert!(is_leech(8, 8));
        assert!(!is_leech(9, 8));
        assert!(!is_leech(11, 8));
        assert!(is_leech(12, 8));
        assert!(is_leech(16, 8));
    }

    #[test]
    fn test_small_thresholds_repeat_every_lapse() {
        assert!(is_leech(1, 1));
        assert!(is_leech(2, 1));
        assert!(is_leech(3, 2));
        assert!(is_leech(4, 3));
        assert!(!is_leech(5, 4));
    }

    #[test]
    fn test_suspend_restores_filtered_card() {
        let mut card = Card::new(1, 7, 9, 0);
        card.lapses = 8;
        card.original_deck_id = Some(2);
        card.original_due = Some(40);
        card.due = -100_000;

        let leech = handle_leech(&mut card, &lapse(8, LeechAction::Suspend)).unwrap();
        assert!(leech.suspended);
        assert_eq!(leech.note_id, 7);
        assert_eq!(card.queue, Queue::Suspended);
        assert_eq!(card.deck_id, 2);
        assert_eq!(card.due, 40);
        assert!(!card.is_filtered());
    }

    #[test]
    fn test_tag_only_leaves_queue() {
        let mut card = Card::new(1, 7, 9, 0);
        card.lapses = 8;
        let leech = handle_leech(&mut card, &lapse(8, LeechAction::TagOnly)).unwrap();
        assert!(!leech.suspended);
        assert_eq!(card.queue, Queue::New);

        card.lapses = 9;
        assert_eq!(handle_leech(&mut card, &lapse(8, LeechAction::TagOnly)), None);
    }
}
