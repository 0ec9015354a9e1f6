//! The scheduling engine.
//!
//! [`Scheduler`] is a short-lived view over a [`Collection`], obtained with
//! [`Collection::sched`]. Long-lived state (the cached day, the in-memory
//! queues, cached counts, and the card in play) lives in
//! [`SchedulerState`], owned by the collection.

mod answer;
mod bury;
mod counts;
mod cutoff;
mod filtered;
pub mod intervals;
mod leech;
mod limits;
mod queues;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::card::{CardId, DeckId, Queue};
use crate::collection::Collection;

pub use answer::AnswerOutcome;
pub use bury::UnburyKind;
pub use counts::{Counts, DeckDueNode};
pub use cutoff::{DayCutoff, Rollover, compute_day_cutoff};
pub use leech::{Leech, is_leech};
pub use queues::{Fill, QueueHeads};

pub(crate) use queues::Queues;

/// Scheduling operations on a collection.
///
/// # Example
///
/// ```
/// use ankit_sched::{Collection, ManualClock};
///
/// # fn example() -> ankit_sched::Result<()> {
/// let mut col = Collection::builder().clock(ManualClock::at(1_700_000_000)).open()?;
/// let note = col.add_note(&["front", "back"], &[])?;
/// col.add_card(note, 1)?;
///
/// let mut sched = col.sched();
/// while let Some(card) = sched.get_next_card()? {
///     sched.answer(&card, 3)?;
///     # break;
/// }
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub struct Scheduler<'a> {
    pub(crate) col: &'a mut Collection,
}

/// The card most recently handed out by [`Scheduler::get_next_card`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CurrentCard {
    pub id: CardId,
    pub deck_id: DeckId,
    pub queue: Queue,
    pub shown_at_ms: i64,
}

/// Mutable scheduler state owned by a collection.
#[derive(Debug, Default)]
pub struct SchedulerState {
    pub(crate) day: Option<DayCutoff>,
    pub(crate) queues: Queues,
    pub(crate) counts: Option<Counts>,
    pub(crate) current: Option<CurrentCard>,
    /// Answers given since the collection was opened; paces new cards.
    pub(crate) reps: u32,
}

impl SchedulerState {
    /// Drop the in-memory queues and cached counts.
    pub(crate) fn invalidate(&mut self) {
        self.queues = Queues::default();
        self.counts = None;
    }

    pub(crate) fn current_id(&self) -> Option<CardId> {
        self.current.map(|c| c.id)
    }
}

/// Cooperative cancellation flag for long queue fills and tree builds.
///
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Scheduler<'_> {
    /// The collection this scheduler operates on.
    pub fn collection(&self) -> &Collection {
        self.col
    }

    /// Return the card in play to the queues without answering it.
    pub fn discard_current_card(&mut self) {
        if let Some(current) = self.col.state.current.take() {
            tracing::debug!(card_id = current.id, "discarded current card");
            // the card was popped from a queue; rebuild so it can be served again
            self.col.state.invalidate();
        }
    }

    /// Drop the in-memory queues so the next fetch rebuilds them.
    pub fn reset(&mut self) {
        self.col.state.invalidate();
    }

    pub(crate) fn now(&self) -> i64 {
        self.col.clock.now()
    }
}
