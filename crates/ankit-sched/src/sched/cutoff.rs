//! Day index and rollover.

use serde::Serialize;
use tracing::info;

use super::Scheduler;
use super::bury::restore_buried;
use super::intervals::SECS_PER_DAY;
use crate::collection::{save_conf, save_decks};
use crate::config::RolloverUnbury;
use crate::error::Result;

/// The scheduling day and the moment it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DayCutoff {
    /// Days elapsed since the collection was created.
    pub today: i64,
    /// Epoch seconds at which `today` ends.
    pub cutoff: i64,
}

/// Compute the day index and cutoff for `now`.
///
/// A clock before the creation time gives a negative day.
pub fn compute_day_cutoff(creation_time: i64, now: i64) -> DayCutoff {
    let today = (now - creation_time).div_euclid(SECS_PER_DAY);
    DayCutoff {
        today,
        cutoff: creation_time + (today + 1) * SECS_PER_DAY,
    }
}

/// What happened when the scheduler noticed a new day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rollover {
    /// The new day index.
    pub today: i64,
    /// When the new day ends.
    pub cutoff: i64,
    /// Decks whose daily counters were reset.
    pub decks_reset: usize,
    /// Cards lifted by the automatic unbury pass, if it ran.
    pub unburied: Option<usize>,
}

impl Scheduler<'_> {
    /// The current day, checking for rollover first.
    pub fn day_cutoff(&mut self) -> Result<DayCutoff> {
        self.check_day()?;
        Ok(self.cached_day())
    }

    /// Detect a day change and apply it.
    ///
    /// On a new day every deck's daily counters are reset, buried cards are
    /// lifted once per day, and the in-memory queues are dropped. Returns
    /// `None` when the day has not changed since the last call.
    pub fn check_day(&mut self) -> Result<Option<Rollover>> {
        let now = self.now();
        if let Some(day) = self.col.state.day {
            if now < day.cutoff {
                return Ok(None);
            }
        }
        let day = compute_day_cutoff(self.col.crt, now);
        if self.col.state.day == Some(day) {
            return Ok(None);
        }

        let mut decks = self.col.decks.clone();
        let decks_reset = decks.reset_counters(day.today);
        let mut conf = self.col.conf.clone();
        let unbury = conf.last_unburied < day.today;
        let scope = self.col.config.rollover_unbury;
        conf.last_unburied = day.today;

        let unburied = self.col.storage.transact(|s| {
            let unburied = if unbury {
                let clause = match scope {
                    RolloverUnbury::Siblings => "queue = -2",
                    RolloverUnbury::All => "queue IN (-2, -3)",
                };
                Some(restore_buried(s, s.cards_where(clause, [])?, now)?)
            } else {
                None
            };
            save_decks(s, &decks, now)?;
            save_conf(s, &conf, now)?;
            Ok(unburied)
        })?;

        self.col.decks = decks;
        self.col.conf = conf;
        self.col.state.day = Some(day);
        self.col.state.invalidate();
        info!(today = day.today, decks_reset, unburied = ?unburied, "day rollover");
        Ok(Some(Rollover {
            today: day.today,
            cutoff: day.cutoff,
            decks_reset,
            unburied,
        }))
    }

    /// The cached day. Only meaningful after [`Scheduler::check_day`].
    pub(crate) fn cached_day(&self) -> DayCutoff {
        self.col
            .state
            .day
            .unwrap_or_else(|| compute_day_cutoff(self.col.crt, self.col.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff_at_creation() {
        assert_eq!(compute_day_cutoff(1000, 1000), DayCutoff { today: 0, cutoff: 87_400 });
    }

    #[test]
    fn test_cutoff_boundary_belongs_to_next_day() {
        let day = compute_day_cutoff(0, SECS_PER_DAY - 1);
        assert_eq!(day.today, 0);
        let next = compute_day_cutoff(0, day.cutoff);
        assert_eq!(next.today, 1);
        assert_eq!(next.cutoff, 2 * SECS_PER_DAY);
    }

    #[test]
    fn test_clock_before_creation() {
        assert_eq!(compute_day_cutoff(SECS_PER_DAY, 10), DayCutoff { today: -1, cutoff: SECS_PER_DAY });
    }
}
