//! In-memory queues and fetch precedence.
//!
//! Queues are filled lazily from storage, a deck at a time for new, review,
//! and day-learning cards. Counts are the authority on how many cards may
//! still be served: a fill never runs while its bucket count is zero.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rusqlite::params;
use serde::Serialize;
use tracing::debug;

use super::limits::LimitKind;
use super::{CancelToken, CurrentCard, Scheduler};
use crate::card::{Card, CardId, DeckId, Queue};
use crate::config::ReviewPopOrder;
use crate::deck::NewSpread;
use crate::error::{Error, Result};
use crate::storage::ids_sql;

/// Outcome of a queue fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fill {
    /// At least one card is waiting.
    Ready,
    /// Nothing left to serve.
    Empty,
    /// Cancelled between decks; the queue can be filled again later.
    Incomplete,
}

/// The card each queue would serve next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueHeads {
    /// Intraday learning.
    pub learn: Option<CardId>,
    /// Day-based learning.
    pub day_learn: Option<CardId>,
    /// Reviews.
    pub review: Option<CardId>,
    /// New cards.
    pub new: Option<CardId>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Queues {
    built: bool,
    learn_filled: bool,
    /// `(due, id)` sorted by due.
    learn: VecDeque<(i64, CardId)>,
    day_learn: VecDeque<CardId>,
    review: VecDeque<CardId>,
    new: VecDeque<CardId>,
    new_dids: VecDeque<DeckId>,
    review_dids: VecDeque<DeckId>,
    day_learn_dids: VecDeque<DeckId>,
}

impl Queues {
    /// Forget the given cards.
    pub(crate) fn remove(&mut self, ids: &[CardId]) {
        self.learn.retain(|(_, id)| !ids.contains(id));
        self.day_learn.retain(|id| !ids.contains(id));
        self.review.retain(|id| !ids.contains(id));
        self.new.retain(|id| !ids.contains(id));
    }

    /// Put a learning card back in due order. Cards that tie go after
    /// existing entries.
    pub(crate) fn requeue_learn(&mut self, due: i64, id: CardId) {
        if !self.learn_filled {
            // the next fill will read it from storage
            return;
        }
        let pos = self.learn.partition_point(|(d, _)| *d <= due);
        self.learn.insert(pos, (due, id));
    }

    /// Due time of the first learning card.
    pub(crate) fn learn_front(&self) -> Option<i64> {
        self.learn.front().map(|(due, _)| *due)
    }
}

impl Scheduler<'_> {
    /// Fetch the next card to study, or `None` when nothing is due.
    ///
    /// A card already in play is returned to the queues first, so calling
    /// this again without answering yields the same card.
    pub fn get_next_card(&mut self) -> Result<Option<Card>> {
        self.check_day()?;
        self.discard_current_card();
        let cancel = CancelToken::new();
        loop {
            let Some((id, queue)) = self.pop_next(&cancel)? else {
                return Ok(None);
            };
            let card = match self.col.storage.get_card(id) {
                Ok(card) => card,
                Err(Error::CardNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if card.queue != queue {
                debug!(card_id = id, expected = ?queue, actual = ?card.queue, "skipping stale queue entry");
                continue;
            }
            let shown_at_ms = self.col.clock.now_millis();
            let state = &mut self.col.state;
            state.current = Some(CurrentCard {
                id,
                deck_id: card.deck_id,
                queue,
                shown_at_ms,
            });
            state.counts = None;
            return Ok(Some(card));
        }
    }

    /// Fill every queue without serving a card.
    ///
    /// Fills are idempotent: calling this again without an intervening
    /// change leaves the queue heads as they were.
    pub fn fill(&mut self, cancel: &CancelToken) -> Result<Fill> {
        self.check_day()?;
        let exclude = self.col.state.current_id();
        let results = [
            self.fill_learn(exclude, cancel)?,
            self.fill_day_learn(exclude, cancel)?,
            self.fill_review(exclude, cancel)?,
            self.fill_new(exclude, cancel)?,
        ];
        Ok(if results.contains(&Fill::Incomplete) {
            Fill::Incomplete
        } else if results.contains(&Fill::Ready) {
            Fill::Ready
        } else {
            Fill::Empty
        })
    }

    /// The head of each queue as currently filled.
    pub fn queue_heads(&self) -> QueueHeads {
        let queues = &self.col.state.queues;
        QueueHeads {
            learn: queues.learn.front().map(|(_, id)| *id),
            day_learn: queues.day_learn.front().copied(),
            review: match self.col.config.review_pop_order {
                ReviewPopOrder::HeadFirst => queues.review.front().copied(),
                ReviewPopOrder::TailFirst => queues.review.back().copied(),
            },
            new: queues.new.front().copied(),
        }
    }

    // ========================================================================
    // Precedence
    // ========================================================================

    fn pop_next(&mut self, cancel: &CancelToken) -> Result<Option<(CardId, Queue)>> {
        let collapse = self.col.conf.collapse_time;

        if self.fill_learn(None, cancel)? == Fill::Ready {
            let horizon = self.now() + collapse;
            if let Some(&(due, id)) = self.col.state.queues.learn.front() {
                if due < horizon {
                    self.col.state.queues.learn.pop_front();
                    return Ok(Some((id, Queue::Learn)));
                }
            }
        }

        if self.time_for_new_card()? {
            if let Some(id) = self.pop_new(cancel)? {
                return Ok(Some((id, Queue::New)));
            }
        }

        if self.fill_review(None, cancel)? == Fill::Ready {
            let order = self.col.config.review_pop_order;
            let queue = &mut self.col.state.queues.review;
            let id = match order {
                ReviewPopOrder::HeadFirst => queue.pop_front(),
                ReviewPopOrder::TailFirst => queue.pop_back(),
            };
            if let Some(id) = id {
                return Ok(Some((id, Queue::Review)));
            }
        }

        if self.fill_day_learn(None, cancel)? == Fill::Ready {
            if let Some(id) = self.col.state.queues.day_learn.pop_front() {
                return Ok(Some((id, Queue::DayLearn)));
            }
        }

        if let Some(id) = self.pop_new(cancel)? {
            return Ok(Some((id, Queue::New)));
        }

        // last resort: learning cards beyond the collapse window
        if self.fill_learn(None, cancel)? == Fill::Ready {
            if let Some((_, id)) = self.col.state.queues.learn.pop_front() {
                return Ok(Some((id, Queue::Learn)));
            }
        }
        Ok(None)
    }

    fn pop_new(&mut self, cancel: &CancelToken) -> Result<Option<CardId>> {
        if self.fill_new(None, cancel)? == Fill::Ready {
            return Ok(self.col.state.queues.new.pop_front());
        }
        Ok(None)
    }

    /// Whether the interleaving policy wants a new card now.
    fn time_for_new_card(&mut self) -> Result<bool> {
        let counts = self.ensure_counts()?;
        if counts.new == 0 {
            return Ok(false);
        }
        Ok(match self.col.conf.new_spread {
            NewSpread::Last => false,
            NewSpread::First => true,
            NewSpread::Distribute => {
                let mut modulus = (counts.new + counts.review) / counts.new;
                if counts.review > 0 {
                    modulus = modulus.max(2);
                }
                let reps = i64::from(self.col.state.reps);
                reps != 0 && reps % modulus == 0
            }
        })
    }

    // ========================================================================
    // Fills
    // ========================================================================

    fn ensure_built(&mut self) {
        if self.col.state.queues.built {
            return;
        }
        let active: VecDeque<DeckId> = self.col.active_deck_ids().into();
        let queues = &mut self.col.state.queues;
        queues.new_dids = active.clone();
        queues.review_dids = active.clone();
        queues.day_learn_dids = active;
        queues.built = true;
    }

    pub(crate) fn fill_learn(&mut self, exclude: Option<CardId>, cancel: &CancelToken) -> Result<Fill> {
        self.ensure_built();
        if !self.col.state.queues.learn.is_empty() {
            return Ok(Fill::Ready);
        }
        if cancel.is_cancelled() {
            return Ok(Fill::Incomplete);
        }
        if self.ensure_counts()?.learn == 0 {
            return Ok(Fill::Empty);
        }
        let cutoff = self.cached_day().cutoff;
        let dids = ids_sql(&self.col.active_deck_ids());
        let cards = self.col.storage.cards_where(
            &format!("did IN {dids} AND queue = 1 AND due < ?1 AND id != ?2 ORDER BY due, id LIMIT ?3"),
            params![cutoff, exclude.unwrap_or(0), self.col.config.report_limit as i64],
        )?;
        let queues = &mut self.col.state.queues;
        queues.learn = cards.iter().map(|c| (c.due, c.id)).collect();
        queues.learn_filled = true;
        debug!(count = queues.learn.len(), "filled learn queue");
        Ok(if queues.learn.is_empty() { Fill::Empty } else { Fill::Ready })
    }

    pub(crate) fn fill_day_learn(&mut self, exclude: Option<CardId>, cancel: &CancelToken) -> Result<Fill> {
        self.ensure_built();
        if !self.col.state.queues.day_learn.is_empty() {
            return Ok(Fill::Ready);
        }
        if self.ensure_counts()?.learn == 0 {
            return Ok(Fill::Empty);
        }
        let today = self.cached_day().today;
        let limit = self.col.config.queue_limit as i64;
        while let Some(&did) = self.col.state.queues.day_learn_dids.front() {
            if cancel.is_cancelled() {
                return Ok(Fill::Incomplete);
            }
            let mut ids = self.col.storage.query_ids(
                "SELECT id FROM cards WHERE did = ?1 AND queue = 3 AND due <= ?2 AND id != ?3 \
                 ORDER BY due, id LIMIT ?4",
                params![did, today, exclude.unwrap_or(0), limit],
            )?;
            if !ids.is_empty() {
                ids.shuffle(&mut StdRng::seed_from_u64(today as u64));
                let queues = &mut self.col.state.queues;
                if (ids.len() as i64) < limit {
                    queues.day_learn_dids.pop_front();
                }
                debug!(deck_id = did, count = ids.len(), "filled day-learn queue");
                queues.day_learn.extend(ids);
                return Ok(Fill::Ready);
            }
            self.col.state.queues.day_learn_dids.pop_front();
        }
        Ok(Fill::Empty)
    }

    pub(crate) fn fill_review(&mut self, exclude: Option<CardId>, cancel: &CancelToken) -> Result<Fill> {
        self.ensure_built();
        if self.ensure_counts()?.review == 0 {
            self.col.state.queues.review.clear();
            return Ok(Fill::Empty);
        }
        if !self.col.state.queues.review.is_empty() {
            return Ok(Fill::Ready);
        }
        let today = self.cached_day().today;
        for attempt in 0..2 {
            while let Some(&did) = self.col.state.queues.review_dids.front() {
                if cancel.is_cancelled() {
                    return Ok(Fill::Incomplete);
                }
                let limit = self
                    .deck_limit(did, LimitKind::Review, today)?
                    .min(self.col.config.queue_limit as i64);
                if limit > 0 {
                    let mut ids = self.col.storage.query_ids(
                        "SELECT id FROM cards WHERE did = ?1 AND queue = 2 AND due <= ?2 AND id != ?3 \
                         ORDER BY due, id LIMIT ?4",
                        params![did, today, exclude.unwrap_or(0), limit],
                    )?;
                    if !ids.is_empty() {
                        if !self.col.decks.get(did)?.filtered {
                            ids.shuffle(&mut StdRng::seed_from_u64(today as u64));
                        }
                        let queues = &mut self.col.state.queues;
                        if (ids.len() as i64) < limit {
                            queues.review_dids.pop_front();
                        }
                        debug!(deck_id = did, count = ids.len(), "filled review queue");
                        queues.review.extend(ids);
                        return Ok(Fill::Ready);
                    }
                }
                self.col.state.queues.review_dids.pop_front();
            }
            if attempt == 0 {
                // counts say reviews remain; restart the deck cursor once
                self.col.state.queues.review_dids = self.col.active_deck_ids().into();
                self.col.state.counts = None;
                if self.ensure_counts()?.review == 0 {
                    break;
                }
            }
        }
        Ok(Fill::Empty)
    }

    pub(crate) fn fill_new(&mut self, exclude: Option<CardId>, cancel: &CancelToken) -> Result<Fill> {
        self.ensure_built();
        if self.ensure_counts()?.new == 0 {
            self.col.state.queues.new.clear();
            return Ok(Fill::Empty);
        }
        if !self.col.state.queues.new.is_empty() {
            return Ok(Fill::Ready);
        }
        let today = self.cached_day().today;
        for attempt in 0..2 {
            while let Some(&did) = self.col.state.queues.new_dids.front() {
                if cancel.is_cancelled() {
                    return Ok(Fill::Incomplete);
                }
                let limit = self
                    .deck_limit(did, LimitKind::New, today)?
                    .min(self.col.config.queue_limit as i64);
                if limit > 0 {
                    let ids = self.col.storage.query_ids(
                        "SELECT id FROM cards WHERE did = ?1 AND queue = 0 AND id != ?2 \
                         ORDER BY due, ord LIMIT ?3",
                        params![did, exclude.unwrap_or(0), limit],
                    )?;
                    if !ids.is_empty() {
                        let queues = &mut self.col.state.queues;
                        if (ids.len() as i64) < limit {
                            queues.new_dids.pop_front();
                        }
                        debug!(deck_id = did, count = ids.len(), "filled new queue");
                        queues.new.extend(ids);
                        return Ok(Fill::Ready);
                    }
                }
                self.col.state.queues.new_dids.pop_front();
            }
            if attempt == 0 {
                self.col.state.queues.new_dids = self.col.active_deck_ids().into();
                self.col.state.counts = None;
                if self.ensure_counts()?.new == 0 {
                    break;
                }
            }
        }
        Ok(Fill::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_learn_keeps_due_order() {
        let mut queues = Queues {
            learn_filled: true,
            learn: VecDeque::from([(10, 1), (30, 2)]),
            ..Queues::default()
        };
        queues.requeue_learn(20, 3);
        queues.requeue_learn(30, 4);
        let order: Vec<CardId> = queues.learn.iter().map(|(_, id)| *id).collect();
        assert_eq!(order, vec![1, 3, 2, 4]);
    }

    #[test]
    fn test_requeue_before_fill_is_deferred() {
        let mut queues = Queues::default();
        queues.requeue_learn(20, 3);
        assert_eq!(queues.learn_front(), None);
    }

    #[test]
    fn test_remove_drops_from_every_queue() {
        let mut queues = Queues {
            learn: VecDeque::from([(10, 1)]),
            review: VecDeque::from([1, 2]),
            new: VecDeque::from([3, 1]),
            ..Queues::default()
        };
        queues.remove(&[1]);
        assert!(queues.learn.is_empty());
        assert_eq!(queues.review, VecDeque::from([2]));
        assert_eq!(queues.new, VecDeque::from([3]));
    }
}
