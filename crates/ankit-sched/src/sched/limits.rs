//! Per-deck daily limits.
//!
//! A deck's limit is its own options-group limit minus what was studied
//! today, clamped by every ancestor's limit computed the same way. When a
//! card is in play, decks it counts against give up one slot so that counts
//! shown beside that card do not include it twice.

use std::collections::HashMap;

use super::Scheduler;
use crate::card::{DeckId, Queue};
use crate::deck::Deck;
use crate::error::Result;

/// Which daily limit a lookup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LimitKind {
    New,
    Review,
}

impl LimitKind {
    fn queue(self) -> Queue {
        match self {
            LimitKind::New => Queue::New,
            LimitKind::Review => Queue::Review,
        }
    }
}

impl Scheduler<'_> {
    /// Remaining new cards the deck may introduce today.
    pub fn new_limit(&mut self, did: DeckId) -> Result<i64> {
        let today = self.day_cutoff()?.today;
        self.deck_limit(did, LimitKind::New, today)
    }

    /// Remaining reviews the deck may show today.
    pub fn review_limit(&mut self, did: DeckId) -> Result<i64> {
        let today = self.day_cutoff()?.today;
        self.deck_limit(did, LimitKind::Review, today)
    }

    /// The deck's own limit, ignoring its ancestors.
    pub(crate) fn single_limit(&self, deck: &Deck, kind: LimitKind, today: i64) -> Result<i64> {
        if deck.filtered {
            return Ok(self.col.config.report_limit as i64);
        }
        let conf = self.col.decks.config_for(deck.id)?;
        let (per_day, done) = match kind {
            LimitKind::New => (conf.new.per_day, deck.new_today.count_on(today)),
            LimitKind::Review => (conf.rev.per_day, deck.rev_today.count_on(today)),
        };
        let mut limit = (per_day - done).max(0);
        if self.current_counts_against(deck.id, kind.queue()) {
            limit -= 1;
        }
        Ok(limit.max(0))
    }

    /// The deck's limit clamped by all of its ancestors.
    pub(crate) fn deck_limit(&self, did: DeckId, kind: LimitKind, today: i64) -> Result<i64> {
        let mut limit = self.single_limit(self.col.decks.get(did)?, kind, today)?;
        for parent in self.col.decks.parents(did)? {
            limit = limit.min(self.single_limit(parent, kind, today)?);
        }
        Ok(limit)
    }

    /// Sum `count(did, limit)` over the active decks, charging each deck's
    /// result against its ancestors' remaining limits.
    pub(crate) fn walking_count(
        &self,
        kind: LimitKind,
        today: i64,
        mut count: impl FnMut(DeckId, i64) -> Result<i64>,
    ) -> Result<i64> {
        let mut remaining: HashMap<DeckId, i64> = HashMap::new();
        let mut total = 0;
        for did in self.col.active_deck_ids() {
            let deck = self.col.decks.get(did)?;
            let mut limit = self.single_limit(deck, kind, today)?;
            if limit == 0 {
                continue;
            }
            let parents = self.col.decks.parents(did)?;
            for parent in &parents {
                let left = match remaining.get(&parent.id) {
                    Some(left) => *left,
                    None => {
                        let left = self.single_limit(parent, kind, today)?;
                        remaining.insert(parent.id, left);
                        left
                    }
                };
                limit = limit.min(left);
            }
            if limit <= 0 {
                continue;
            }
            let found = count(did, limit)?;
            for parent in &parents {
                if let Some(left) = remaining.get_mut(&parent.id) {
                    *left -= found;
                }
            }
            remaining.insert(did, limit - found);
            total += found;
        }
        Ok(total)
    }

    /// Whether the card in play belongs to `queue` and lives in `did` or
    /// beneath it.
    fn current_counts_against(&self, did: DeckId, queue: Queue) -> bool {
        match self.col.state.current {
            Some(current) => {
                current.queue == queue && self.col.decks.is_self_or_descendant(current.deck_id, did)
            }
            None => false,
        }
    }
}
