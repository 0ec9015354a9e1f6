//! Interval and learning-step arithmetic.
//!
//! Everything here is a pure function of its inputs (plus an RNG where fuzz
//! or jitter is involved), shared by both answer policies.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::deck::{LapseConfig, ReviewConfig};

/// Seconds in a scheduling day.
pub const SECS_PER_DAY: i64 = 86_400;

/// Lowest ease factor a card can reach, in permille.
pub const MIN_FACTOR: i64 = 1300;

/// Ease factor given to forgotten and rescheduled cards.
pub const STARTING_FACTOR: i64 = 2500;

/// Candidate intervals for the three passing review answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReviewIntervals {
    /// Interval for ease 2.
    pub hard: i64,
    /// Interval for ease 3.
    pub good: i64,
    /// Interval for ease 4.
    pub easy: i64,
}

impl ReviewIntervals {
    /// The interval for a passing ease (2, 3 or 4).
    pub fn for_ease(&self, ease: u8) -> i64 {
        match ease {
            2 => self.hard,
            3 => self.good,
            _ => self.easy,
        }
    }
}

// ============================================================================
// Review intervals
// ============================================================================

/// Unfuzzed intervals for a review card answered `days_late` days after it
/// was due.
///
/// Each ease is at least one day longer than the one before it, and all are
/// capped at the configured maximum interval.
pub fn review_intervals(interval: i64, factor: i64, days_late: i64, rev: &ReviewConfig) -> ReviewIntervals {
    let ivl = interval as f64;
    let late = days_late.max(0) as f64;
    let fct = factor as f64 / 1000.0;
    let constrain = |raw: f64, prev: i64| ((raw * rev.ivl_fct).round() as i64).max(prev + 1);

    let hard = constrain((ivl + late / 4.0) * rev.hard_factor, interval);
    let good = constrain((ivl + late / 2.0) * fct, hard);
    let easy = constrain((ivl + late) * fct * rev.ease4, good);
    let max = rev.max_ivl.max(1);
    ReviewIntervals {
        hard: hard.min(max),
        good: good.min(max),
        easy: easy.min(max),
    }
}

/// Apply fuzz along the hard, good, easy chain.
///
/// Each fuzzed value is floored at the previous one, so the ordering of the
/// unfuzzed intervals survives.
pub fn fuzz_review_intervals(
    ideal: ReviewIntervals,
    interval: i64,
    max_ivl: i64,
    rng: &mut impl Rng,
) -> ReviewIntervals {
    let max = max_ivl.max(1);
    let hard = fuzzed_interval(ideal.hard, rng).max(interval + 1).min(max);
    let good = fuzzed_interval(ideal.good, rng).max(hard).min(max);
    let easy = fuzzed_interval(ideal.easy, rng).max(good).min(max);
    ReviewIntervals { hard, good, easy }
}

/// The generator used to fuzz a review answer.
///
/// Seeded from the card and its repetition count, so the same card state
/// always fuzzes the same way.
pub fn review_fuzz_rng(card_id: i64, reps: i64) -> StdRng {
    StdRng::seed_from_u64((card_id as u64).wrapping_mul(31).wrapping_add(reps as u64))
}

/// Inclusive range an interval may be fuzzed into.
pub fn fuzz_range(interval: i64) -> (i64, i64) {
    if interval < 2 {
        return (1, 1);
    }
    if interval == 2 {
        return (2, 3);
    }
    let ivl = interval as f64;
    let fuzz = if interval < 7 {
        (ivl * 0.25) as i64
    } else if interval < 30 {
        ((ivl * 0.15) as i64).max(2)
    } else {
        ((ivl * 0.05) as i64).max(4)
    };
    let fuzz = fuzz.max(1);
    (interval - fuzz, interval + fuzz)
}

/// A random interval within [`fuzz_range`].
pub fn fuzzed_interval(interval: i64, rng: &mut impl Rng) -> i64 {
    let (low, high) = fuzz_range(interval);
    rng.random_range(low..=high)
}

// ============================================================================
// Learning steps
// ============================================================================

/// How many of the last `left` steps can be completed before the cutoff.
pub fn left_today(delays: &[f64], left: i64, now: i64, cutoff: i64) -> i64 {
    let len = delays.len();
    let offset = (left.max(0) as usize).min(len);
    let mut t = now;
    let mut ok = 0;
    for i in 0..offset {
        t += (delays[len - offset + i] * 60.0) as i64;
        if t > cutoff {
            break;
        }
        ok = i as i64;
    }
    ok + 1
}

/// The packed `left` value for a card entering a list of steps.
pub fn starting_left(delays: &[f64], now: i64, cutoff: i64) -> i64 {
    let total = delays.len() as i64;
    total + left_today(delays, total, now, cutoff) * 1000
}

/// Delay in seconds for the step a card with packed `left` is on.
///
/// Out-of-range step indexes clamp to the nearest configured step.
pub fn delay_for_grade(delays: &[f64], left: i64) -> i64 {
    if delays.is_empty() {
        return 60;
    }
    let len = delays.len() as i64;
    let index = (len - left % 1000).clamp(0, len - 1) as usize;
    (delays[index] * 60.0) as i64
}

/// Delay for repeating the current step: the average of it and the next
/// step, or 1.5 times the step when there is only one.
pub fn delay_for_repeating_grade(delays: &[f64], left: i64) -> i64 {
    let current = delay_for_grade(delays, left);
    let next = if delays.len() > 1 {
        delay_for_grade(delays, left - 1)
    } else {
        current * 2
    };
    (current + current.max(next)) / 2
}

/// Due day for a learning step that lands on or after the cutoff.
pub fn day_learn_due(due_secs: i64, today: i64, cutoff: i64) -> i64 {
    today + (due_secs - cutoff) / SECS_PER_DAY + 1
}

// ============================================================================
// Lapses and filtered decks
// ============================================================================

/// Interval after a lapse.
pub fn lapse_interval(interval: i64, lapse: &LapseConfig) -> i64 {
    let shrunk = (interval as f64 * lapse.mult).floor() as i64;
    shrunk.max(lapse.min_int).max(1)
}

/// Interval given to a review card seen for the first time inside a
/// rescheduling filtered deck.
///
/// Credits the time that has passed since the last review at a factor
/// halfway between the card's ease and 1.2.
pub fn dyn_interval_boost(interval: i64, factor: i64, original_due: i64, today: i64, max_ivl: i64) -> i64 {
    let elapsed = interval - (original_due - today);
    let fct = (factor as f64 / 1000.0 + 1.2) / 2.0;
    let boosted = (elapsed as f64 * fct).floor() as i64;
    boosted.max(interval).max(1).min(max_ivl.max(1))
}

/// Interval for a review answered before its home due date.
pub fn early_review_interval(
    interval: i64,
    factor: i64,
    original_due: i64,
    today: i64,
    ease: u8,
    rev: &ReviewConfig,
) -> i64 {
    let elapsed = (interval - (original_due - today)) as f64;
    let card_factor = factor as f64 / 1000.0;
    let (fct, min_new, easy_bonus) = match ease {
        2 => (rev.hard_factor, rev.hard_factor / 2.0, 1.0),
        3 => (card_factor, 1.0, 1.0),
        _ => (card_factor, 1.0, rev.ease4 - (rev.ease4 - 1.0) / 2.0),
    };
    let ivl = (elapsed * fct).max(1.0);
    let ivl = (interval as f64 * min_new).max(ivl) * easy_bonus;
    ((ivl * rev.ivl_fct) as i64).max(1).min(rev.max_ivl.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::LeechAction;
    use serde_json::Map;

    fn rev() -> ReviewConfig {
        ReviewConfig {
            per_day: 200,
            ease4: 1.3,
            max_ivl: 36500,
            ivl_fct: 1.0,
            hard_factor: 1.2,
            bury: true,
            other: Map::new(),
        }
    }

    fn lapse(min_int: i64, mult: f64) -> LapseConfig {
        LapseConfig {
            delays: vec![10.0],
            min_int,
            mult,
            leech_fails: 8,
            leech_action: LeechAction::Suspend,
            other: Map::new(),
        }
    }

    #[test]
    fn test_late_good_review() {
        let ivls = review_intervals(10, 2500, 3, &rev());
        assert_eq!(ivls.hard, 13);
        assert_eq!(ivls.good, 29);
        assert_eq!(ivls.easy, 42);
    }

    #[test]
    fn test_intervals_grow_by_at_least_a_day() {
        let ivls = review_intervals(1, 1300, 0, &rev());
        assert_eq!(ivls.hard, 2);
        assert_eq!(ivls.good, 3);
        assert_eq!(ivls.easy, 4);
    }

    #[test]
    fn test_intervals_capped() {
        let mut conf = rev();
        conf.max_ivl = 20;
        let ivls = review_intervals(100, 2500, 0, &conf);
        assert_eq!(ivls, ReviewIntervals { hard: 20, good: 20, easy: 20 });
    }

    #[test]
    fn test_fuzz_ranges() {
        assert_eq!(fuzz_range(1), (1, 1));
        assert_eq!(fuzz_range(2), (2, 3));
        assert_eq!(fuzz_range(4), (3, 5));
        assert_eq!(fuzz_range(10), (8, 12));
        assert_eq!(fuzz_range(29), (25, 33));
        assert_eq!(fuzz_range(60), (56, 64));
        assert_eq!(fuzz_range(1000), (950, 1050));
    }

    #[test]
    fn test_fuzzed_chain_stays_ordered() {
        for seed in 0..200 {
            let mut rng = review_fuzz_rng(seed, 3);
            let ideal = review_intervals(10, 2500, 3, &rev());
            let fuzzed = fuzz_review_intervals(ideal, 10, 36500, &mut rng);
            assert!(fuzzed.hard >= 11);
            assert!(fuzzed.good >= fuzzed.hard);
            assert!(fuzzed.easy >= fuzzed.good);
            assert!((25..=33).contains(&fuzzed.good));
        }
    }

    #[test]
    fn test_starting_left_counts_steps_before_cutoff() {
        // two steps of 1 and 10 minutes, plenty of time left
        assert_eq!(starting_left(&[1.0, 10.0], 0, 86_400), 2002);
        // only the first step fits
        assert_eq!(starting_left(&[1.0, 10.0], 0, 300), 1002);
        assert_eq!(starting_left(&[], 0, 86_400), 1000);
    }

    #[test]
    fn test_delay_for_grade() {
        let delays = [1.0, 10.0];
        assert_eq!(delay_for_grade(&delays, 2002), 60);
        assert_eq!(delay_for_grade(&delays, 1001), 600);
        // more steps left than configured clamps to the first
        assert_eq!(delay_for_grade(&delays, 5), 60);
        assert_eq!(delay_for_grade(&delays, 0), 600);
        assert_eq!(delay_for_grade(&[], 1), 60);
    }

    #[test]
    fn test_delay_for_repeating_grade() {
        assert_eq!(delay_for_repeating_grade(&[1.0, 10.0], 2002), 330);
        assert_eq!(delay_for_repeating_grade(&[10.0], 1001), 900);
    }

    #[test]
    fn test_day_learn_due() {
        assert_eq!(day_learn_due(1000, 5, 1000), 6);
        assert_eq!(day_learn_due(1000 + SECS_PER_DAY, 5, 1000), 7);
    }

    #[test]
    fn test_lapse_interval() {
        assert_eq!(lapse_interval(100, &lapse(1, 0.0)), 1);
        assert_eq!(lapse_interval(100, &lapse(1, 0.5)), 50);
        assert_eq!(lapse_interval(3, &lapse(4, 0.5)), 4);
        assert_eq!(lapse_interval(1, &lapse(0, 0.0)), 1);
    }

    #[test]
    fn test_dyn_interval_boost() {
        // due in 5 days, interval 10: 5 days elapsed at (2.5 + 1.2) / 2
        assert_eq!(dyn_interval_boost(10, 2500, 105, 100, 36500), 10);
        // overdue by 10 days
        assert_eq!(dyn_interval_boost(10, 2500, 90, 100, 36500), 37);
        assert_eq!(dyn_interval_boost(10, 2500, 90, 100, 20), 20);
    }

    #[test]
    fn test_early_review_interval() {
        let conf = rev();
        // 5 of 10 days elapsed
        assert_eq!(early_review_interval(10, 2500, 105, 100, 3, &conf), 12);
        assert_eq!(early_review_interval(10, 2500, 105, 100, 2, &conf), 6);
        assert_eq!(early_review_interval(10, 2500, 105, 100, 4, &conf), 14);
    }
}
