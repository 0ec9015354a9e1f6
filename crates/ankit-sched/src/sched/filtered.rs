//! Filtered-deck rebuild and empty.
//!
//! Moving a card in records its home deck and due in `odid`/`odue` and
//! gives it a synthetic due that preserves search order. Emptying reverses
//! that exactly.

use tracing::{debug, info};

use super::Scheduler;
use crate::card::{Card, CardId, CardType, DeckId, Queue};
use crate::collection::save_conf;
use crate::config::SchedulerVersion;
use crate::error::{Error, Result};
use crate::search::{SearchBuilder, SearchContext, compile};
use crate::storage::Storage;

/// Synthetic due given to the first card moved into a filtered deck.
const FILTERED_DUE_BASE: i64 = -100_000;

impl Scheduler<'_> {
    /// Empty a filtered deck and refill it from its search terms.
    ///
    /// Returns the number of cards moved in. A deck whose terms match
    /// nothing is left empty. A non-empty result selects the deck.
    pub fn rebuild_filtered(&mut self, did: DeckId) -> Result<usize> {
        let day = self.day_cutoff()?;
        let deck = self.col.decks.get(did)?;
        if !deck.filtered {
            return Err(Error::NotFiltered(did));
        }
        if deck.terms.is_empty() {
            return Err(Error::Config(format!("filtered deck {did} has no search terms")));
        }
        let terms = deck.terms.clone();
        let resched = deck.resched;
        let version = self.col.config.version;
        let now = self.now();

        // compile every term up front so a bad search changes nothing
        let ctx = SearchContext {
            decks: &self.col.decks,
            today: day.today,
            cutoff: day.cutoff,
        };
        let mut searches = Vec::with_capacity(terms.len());
        for term in &terms {
            let query = SearchBuilder::new()
                .group(&term.search)
                .not_suspended()
                .not_buried()
                .not_filtered()
                .not_learn()
                .build();
            searches.push((compile(&query, &ctx)?, term.order.sql(day.today), term.limit));
        }

        let mut conf = self.col.conf.clone();
        let moved = self.col.storage.transact(|s| {
            empty_deck(s, did, version, now)?;
            let mut moved = 0usize;
            for (search, order, limit) in &searches {
                let ids = s.find_cards(search, Some(order), Some(*limit))?;
                debug!(deck_id = did, matched = ids.len(), "filtered term");
                for (i, id) in ids.iter().enumerate() {
                    let due = FILTERED_DUE_BASE + (moved + i) as i64;
                    let card = s.get_card(*id)?;
                    s.update_card(&move_into(card, did, due, day.today, resched, version, now))?;
                }
                moved += ids.len();
            }
            if moved > 0 {
                conf.cur_deck = did;
                save_conf(s, &conf, now)?;
            }
            Ok(moved)
        })?;

        self.col.conf = conf;
        self.col.state.current = None;
        self.col.state.invalidate();
        info!(deck_id = did, moved, "rebuilt filtered deck");
        Ok(moved)
    }

    /// Return every card in a filtered deck to its home deck.
    pub fn empty_filtered(&mut self, did: DeckId) -> Result<usize> {
        if !self.col.decks.get(did)?.filtered {
            return Err(Error::NotFiltered(did));
        }
        let version = self.col.config.version;
        let now = self.now();
        let count = self
            .col
            .storage
            .transact(|s| empty_deck(s, did, version, now))?;
        self.col.state.current = None;
        self.col.state.invalidate();
        info!(deck_id = did, count, "emptied filtered deck");
        Ok(count)
    }
}

fn empty_deck(storage: &Storage, did: DeckId, version: SchedulerVersion, now: i64) -> Result<usize> {
    let cards = storage.cards_where("did = ?1", [did])?;
    for mut card in cards.iter().cloned() {
        match version {
            SchedulerVersion::V1 => card.unlink_filtered(),
            SchedulerVersion::V2 => card.restore_from_filtered(),
        }
        if card.queue.as_i64() >= 0 {
            card.queue = card.restored_queue();
        }
        card.mtime = now;
        card.usn = -1;
        storage.update_card(&card)?;
    }
    let ids: Vec<CardId> = cards.iter().map(|c| c.id).collect();
    debug!(deck_id = did, count = ids.len(), "emptied cards");
    Ok(ids.len())
}

fn move_into(
    mut card: Card,
    did: DeckId,
    due: i64,
    today: i64,
    resched: bool,
    version: SchedulerVersion,
    now: i64,
) -> Card {
    card.original_deck_id = Some(card.original_deck_id.unwrap_or(card.deck_id));
    card.deck_id = did;
    // a zero due cannot be told apart from "no original due"
    if card.due != 0 {
        card.original_due = Some(card.original_due.unwrap_or(card.due));
        card.due = due;
    }
    let home_due = card.original_due.unwrap_or(card.due);
    card.queue = match version {
        SchedulerVersion::V1 => {
            if card.ctype == CardType::Review && home_due <= today {
                Queue::Review
            } else {
                Queue::New
            }
        }
        SchedulerVersion::V2 if !resched => Queue::Review,
        SchedulerVersion::V2 => card.queue,
    };
    card.mtime = now;
    card.usn = -1;
    card
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review_card(due: i64) -> Card {
        let mut card = Card::new(1, 1, 3, 0);
        card.ctype = CardType::Review;
        card.queue = Queue::Review;
        card.due = due;
        card.interval = 10;
        card
    }

    #[test]
    fn test_v1_not_due_reviews_become_cram_cards() {
        let due = move_into(review_card(35), 9, -100_000, 40, true, SchedulerVersion::V1, 0);
        assert_eq!(due.queue, Queue::Review);
        assert_eq!(due.original_due, Some(35));

        let early = move_into(review_card(45), 9, -99_999, 40, true, SchedulerVersion::V1, 0);
        assert_eq!(early.queue, Queue::New);
        assert_eq!(early.original_deck_id, Some(3));
        assert_eq!(early.due, -99_999);
    }

    #[test]
    fn test_v2_preview_uses_review_queue() {
        let card = Card::new(1, 1, 3, 7);
        let moved = move_into(card.clone(), 9, -100_000, 40, false, SchedulerVersion::V2, 0);
        assert_eq!(moved.queue, Queue::Review);
        let moved = move_into(card, 9, -100_000, 40, true, SchedulerVersion::V2, 0);
        assert_eq!(moved.queue, Queue::New);
        assert_eq!(moved.original_due, Some(7));
    }
}
