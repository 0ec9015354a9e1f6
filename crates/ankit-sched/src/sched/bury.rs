//! Burying, suspending, forgetting, and manual rescheduling.

use rand::Rng;
use serde::Serialize;
use tracing::info;

use super::Scheduler;
use super::intervals::STARTING_FACTOR;
use crate::card::{Card, CardId, CardType, DeckId, NoteId, Queue};
use crate::collection::save_conf;
use crate::config::SchedulerVersion;
use crate::error::{Error, Result};
use crate::storage::{Storage, ids_sql};

/// Which buried cards to lift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnburyKind {
    /// Sibling and manual buries.
    All,
    /// Only cards the user buried.
    Manual,
    /// Only cards buried because a sibling was answered.
    Siblings,
}

impl UnburyKind {
    fn clause(self) -> &'static str {
        match self {
            UnburyKind::All => "queue IN (-2, -3)",
            UnburyKind::Manual => "queue = -3",
            UnburyKind::Siblings => "queue = -2",
        }
    }
}

/// Put buried or suspended cards back in the queue their type implies.
pub(crate) fn restore_buried(storage: &Storage, cards: Vec<Card>, now: i64) -> Result<usize> {
    let count = cards.len();
    for mut card in cards {
        card.queue = card.restored_queue();
        card.mtime = now;
        card.usn = -1;
        storage.update_card(&card)?;
    }
    Ok(count)
}

impl Scheduler<'_> {
    // ========================================================================
    // Suspend and bury
    // ========================================================================

    /// Suspend cards until they are unsuspended.
    pub fn suspend_cards(&mut self, ids: &[CardId]) -> Result<usize> {
        let count = self.park_cards(ids, Queue::Suspended)?;
        info!(count, "suspended cards");
        Ok(count)
    }

    /// Return suspended cards to scheduling.
    pub fn unsuspend_cards(&mut self, ids: &[CardId]) -> Result<usize> {
        self.restore_where(&format!("queue = -1 AND id IN {}", ids_sql(ids)))
    }

    /// Bury cards until the next day, or until unburied.
    ///
    /// `manual` marks a user bury; otherwise the cards count as buried
    /// siblings.
    pub fn bury_cards(&mut self, ids: &[CardId], manual: bool) -> Result<usize> {
        let queue = if manual { Queue::BuriedManual } else { Queue::BuriedSibling };
        let count = self.park_cards(ids, queue)?;
        info!(count, manual, "buried cards");
        Ok(count)
    }

    /// Bury every schedulable card of a note.
    pub fn bury_note(&mut self, note_id: NoteId) -> Result<usize> {
        let ids = self
            .col
            .storage
            .query_ids("SELECT id FROM cards WHERE nid = ?1 AND queue >= 0", [note_id])?;
        self.bury_cards(&ids, true)
    }

    /// Lift buries on the given cards, whichever deck they are in.
    pub fn unbury_cards(&mut self, ids: &[CardId]) -> Result<usize> {
        self.restore_where(&format!("queue IN (-2, -3) AND id IN {}", ids_sql(ids)))
    }

    /// Lift every bury in a deck and its subdecks.
    pub fn unbury_deck(&mut self, did: DeckId) -> Result<usize> {
        self.unbury_deck_kind(did, UnburyKind::All)
    }

    /// Lift buries of one kind in a deck and its subdecks.
    pub fn unbury_deck_kind(&mut self, did: DeckId, kind: UnburyKind) -> Result<usize> {
        self.col.decks.get(did)?;
        let dids = ids_sql(&self.col.decks.self_and_children_ids(did));
        let count = self.restore_where(&format!("{} AND did IN {dids}", kind.clause()))?;
        info!(deck_id = did, ?kind, count, "unburied deck");
        Ok(count)
    }

    /// Whether the deck or its subdecks hold buried cards.
    pub fn have_buried(&mut self, did: DeckId) -> Result<bool> {
        self.col.decks.get(did)?;
        let dids = ids_sql(&self.col.decks.self_and_children_ids(did));
        let found: i64 = self.col.storage.query_scalar(
            &format!("SELECT EXISTS (SELECT 1 FROM cards WHERE queue IN (-2, -3) AND did IN {dids})"),
            [],
        )?;
        Ok(found != 0)
    }

    // ========================================================================
    // Forget and reschedule
    // ========================================================================

    /// Turn cards back into new cards at the end of the new queue.
    pub fn forget_cards(&mut self, ids: &[CardId]) -> Result<usize> {
        let now = self.now();
        let mut cards = self.col.storage.get_cards(ids)?;
        cards.sort_by_key(|c| c.id);
        let mut conf = self.col.conf.clone();
        for card in &mut cards {
            card.restore_from_filtered();
            card.ctype = CardType::New;
            card.queue = Queue::New;
            card.interval = 0;
            card.factor = STARTING_FACTOR;
            card.left = 0;
            card.due = conf.next_pos;
            conf.next_pos += 1;
            card.mtime = now;
            card.usn = -1;
        }
        self.col.storage.transact(|s| {
            for card in &cards {
                s.update_card(card)?;
            }
            save_conf(s, &conf, now)
        })?;
        self.col.conf = conf;
        self.after_change(ids);
        info!(count = cards.len(), "forgot cards");
        Ok(cards.len())
    }

    /// Make cards review cards due in `min_days..=max_days` days.
    pub fn reschedule_cards(&mut self, ids: &[CardId], min_days: i64, max_days: i64) -> Result<usize> {
        if min_days < 0 || max_days < min_days {
            return Err(Error::Config(format!(
                "invalid reschedule range {min_days}..={max_days}"
            )));
        }
        let today = self.day_cutoff()?.today;
        let now = self.now();
        let mut cards = self.col.storage.get_cards(ids)?;
        for card in &mut cards {
            let days = self.col.rng.random_range(min_days..=max_days);
            card.restore_from_filtered();
            card.ctype = CardType::Review;
            card.queue = Queue::Review;
            card.interval = days.max(1);
            card.due = today + days;
            card.factor = STARTING_FACTOR;
            card.left = 0;
            card.mtime = now;
            card.usn = -1;
        }
        self.col.storage.transact(|s| {
            for card in &cards {
                s.update_card(card)?;
            }
            Ok(())
        })?;
        self.after_change(ids);
        info!(count = cards.len(), min_days, max_days, "rescheduled cards");
        Ok(cards.len())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Move cards into a non-schedulable queue, unlinking them from
    /// filtered decks first.
    pub(crate) fn park_cards(&mut self, ids: &[CardId], queue: Queue) -> Result<usize> {
        let now = self.now();
        let version = self.col.config.version;
        let mut conf = self.col.conf.clone();
        let mut cards = self.col.storage.get_cards(ids)?;
        for card in &mut cards {
            match version {
                SchedulerVersion::V1 => {
                    card.unlink_filtered();
                    pull_out_of_learning(card, &mut conf.next_pos);
                }
                SchedulerVersion::V2 => card.restore_from_filtered(),
            }
            card.queue = queue;
            card.mtime = now;
            card.usn = -1;
        }
        self.col.storage.transact(|s| {
            for card in &cards {
                s.update_card(card)?;
            }
            if conf != self.col.conf {
                save_conf(s, &conf, now)?;
            }
            Ok(())
        })?;
        self.col.conf = conf;
        self.after_change(ids);
        Ok(cards.len())
    }

    fn restore_where(&mut self, clause: &str) -> Result<usize> {
        let now = self.now();
        let cards = self.col.storage.cards_where(clause, [])?;
        let ids: Vec<CardId> = cards.iter().map(|c| c.id).collect();
        let count = self.col.storage.transact(|s| restore_buried(s, cards, now))?;
        self.after_change(&ids);
        Ok(count)
    }

    /// Drop stale queue entries and counts after cards changed.
    fn after_change(&mut self, ids: &[CardId]) {
        let state = &mut self.col.state;
        if state.current_id().is_some_and(|id| ids.contains(&id)) {
            state.current = None;
        }
        state.queues.remove(ids);
        state.counts = None;
    }
}

/// Learning cards under the three-button policy leave learning entirely
/// when parked: relearning reviews go back to review, new learners back to
/// new.
fn pull_out_of_learning(card: &mut Card, next_pos: &mut i64) {
    if !matches!(card.queue, Queue::Learn | Queue::DayLearn) {
        return;
    }
    match card.ctype {
        CardType::Review | CardType::Relearn => {
            if let Some(due) = card.original_due.take() {
                card.due = due;
            }
            card.ctype = CardType::Review;
        }
        CardType::Learn | CardType::New => {
            card.ctype = CardType::New;
            card.due = *next_pos;
            *next_pos += 1;
        }
    }
    card.left = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_out_of_learning() {
        let mut pos = 10;
        let mut relearning = Card::new(1, 1, 1, 0);
        relearning.ctype = CardType::Review;
        relearning.queue = Queue::Learn;
        relearning.due = 1_700_000_000;
        relearning.original_due = Some(42);
        relearning.left = 1001;
        pull_out_of_learning(&mut relearning, &mut pos);
        assert_eq!(relearning.due, 42);
        assert_eq!(relearning.restored_queue(), Queue::Review);
        assert_eq!(relearning.left, 0);

        let mut learner = Card::new(2, 1, 1, 0);
        learner.ctype = CardType::Learn;
        learner.queue = Queue::DayLearn;
        learner.due = 5;
        pull_out_of_learning(&mut learner, &mut pos);
        assert_eq!(learner.ctype, CardType::New);
        assert_eq!(learner.due, 10);
        assert_eq!(pos, 11);
    }

    #[test]
    fn test_review_cards_are_untouched() {
        let mut pos = 1;
        let mut card = Card::new(1, 1, 1, 0);
        card.ctype = CardType::Review;
        card.queue = Queue::Review;
        card.due = 7;
        pull_out_of_learning(&mut card, &mut pos);
        assert_eq!(card.due, 7);
        assert_eq!(pos, 1);
    }
}
