//! Answer processing.
//!
//! An answer is computed on a copy of the card, then the card, the review
//! log entry, sibling buries, leech tag, and daily counters are written in
//! one transaction. In-memory state only changes once that commits.
//!
//! Two policies share the interval math:
//!
//! - [`SchedulerVersion::V1`]: learning cards have three buttons (again,
//!   good, easy) and relearning cards keep the review type.
//! - [`SchedulerVersion::V2`]: four buttons throughout, a relearning type,
//!   preview mode in filtered decks that do not reschedule, and early
//!   reviews inside filtered decks.

use rand::Rng;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info};

use super::intervals::{
    MIN_FACTOR, SECS_PER_DAY, day_learn_due, delay_for_grade, delay_for_repeating_grade,
    dyn_interval_boost, early_review_interval, fuzz_review_intervals, fuzzed_interval,
    lapse_interval, left_today, review_fuzz_rng, review_intervals, starting_left,
};
use super::leech::{Leech, handle_leech};
use super::Scheduler;
use crate::card::{Card, CardId, CardType, Queue};
use crate::collection::{save_conf, save_decks};
use crate::config::SchedulerVersion;
use crate::decks::{DailyStat, EffectiveConfig};
use crate::error::{Error, Result};
use crate::revlog::{ReviewLogEntry, RevlogKind};
use crate::schema::LEECH_TAG;

/// The result of answering a card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerOutcome {
    /// The card as persisted.
    pub card: Card,
    /// The review log entry written.
    pub log: ReviewLogEntry,
    /// Set when the answer made the card a leech.
    pub leech: Option<Leech>,
}

struct AnswerContext {
    version: SchedulerVersion,
    conf: EffectiveConfig,
    now: i64,
    today: i64,
    cutoff: i64,
    /// Front of the learning queue when nothing else is left to study.
    learn_guard: Option<i64>,
}

impl AnswerContext {
    /// Learning steps for a card: relearning steps once it has graduated.
    fn delays(&self, card: &Card) -> &[f64] {
        match card.ctype {
            CardType::Review | CardType::Relearn => &self.conf.lapse.delays,
            CardType::New | CardType::Learn => &self.conf.new.delays,
        }
    }

    fn starting_left(&self, card: &Card) -> i64 {
        starting_left(self.delays(card), self.now, self.cutoff)
    }

    /// Days the card is overdue, measured against its home due.
    fn days_late(&self, card: &Card) -> i64 {
        let due = card.original_due.filter(|_| card.is_filtered()).unwrap_or(card.due);
        (self.today - due).max(0)
    }
}

/// A card being answered, plus what will be logged.
struct Answering<'a> {
    ctx: &'a AnswerContext,
    rng: &'a mut StdRng,
    next_pos: &'a mut i64,
    card: Card,
    kind: RevlogKind,
    interval: i64,
    last_interval: i64,
    leech: Option<Leech>,
}

impl Scheduler<'_> {
    /// Number of answer buttons the card offers.
    pub fn answer_buttons(&self, card: &Card) -> Result<u8> {
        if self.col.config.version == SchedulerVersion::V2 {
            return Ok(4);
        }
        if card.original_due.is_some() {
            if card.is_filtered() && card.queue == Queue::Review {
                return Ok(4);
            }
            let conf = self.col.decks.effective_config(card, SchedulerVersion::V1)?;
            let many_steps = conf.lapse.delays.len() > 1;
            return Ok(if matches!(card.ctype, CardType::New | CardType::Learn) || many_steps {
                3
            } else {
                2
            });
        }
        Ok(if card.queue == Queue::Review { 4 } else { 3 })
    }

    /// Answer a card with an ease from 1 to [`Scheduler::answer_buttons`].
    pub fn answer(&mut self, card: &Card, ease: u8) -> Result<AnswerOutcome> {
        let day = self.day_cutoff()?;
        let buttons = self.answer_buttons(card)?;
        if ease == 0 || ease > buttons {
            return Err(Error::InvalidEase { ease, buttons });
        }
        if !matches!(card.queue, Queue::New | Queue::Learn | Queue::DayLearn | Queue::Review) {
            return Err(Error::InvalidState {
                card_id: card.id,
                queue: card.queue,
            });
        }

        let version = self.col.config.version;
        let conf = self.col.decks.effective_config(card, version)?;
        let counts = self.ensure_counts()?;
        let learn_guard = self
            .col
            .state
            .queues
            .learn_front()
            .filter(|_| counts.new == 0 && counts.review == 0);
        let now_ms = self.col.clock.now_millis();
        let ctx = AnswerContext {
            version,
            conf,
            now: now_ms.div_euclid(1000),
            today: day.today,
            cutoff: day.cutoff,
            learn_guard,
        };

        let mut col_conf = self.col.conf.clone();
        let mut answering = Answering {
            ctx: &ctx,
            rng: &mut self.col.rng,
            next_pos: &mut col_conf.next_pos,
            card: card.clone(),
            kind: RevlogKind::Learn,
            interval: 0,
            last_interval: card.interval,
            leech: None,
        };
        answering.run(ease)?;
        let Answering {
            card: mut updated,
            kind,
            interval,
            last_interval,
            leech,
            ..
        } = answering;
        updated.mtime = ctx.now;
        updated.usn = -1;

        let time_taken = match self.col.state.current {
            Some(current) if current.id == card.id => {
                (now_ms - current.shown_at_ms).clamp(0, ctx.conf.max_taken.max(0) * 1000)
            }
            _ => 0,
        };
        let log = ReviewLogEntry {
            id: now_ms,
            card_id: card.id,
            ease,
            interval,
            last_interval,
            factor: updated.factor,
            time_taken,
            kind,
        };

        let mut decks = self.col.decks.clone();
        let stat = match card.queue {
            Queue::New => DailyStat::New,
            Queue::Review => DailyStat::Review,
            _ => DailyStat::Learn,
        };
        decks.record(card.deck_id, day.today, stat, 1)?;
        decks.record(card.deck_id, day.today, DailyStat::Time, time_taken)?;

        let to_bury = self.siblings_to_bury(card, &ctx.conf, day.today)?;

        let now = ctx.now;
        let result = self.col.storage.transact(|s| {
            s.set_queue(&to_bury, Queue::BuriedSibling, now)?;
            s.update_card(&updated)?;
            let id = s.insert_revlog(&log)?;
            if let Some(leech) = &leech {
                s.add_note_tag(leech.note_id, LEECH_TAG, now)?;
            }
            save_decks(s, &decks, now)?;
            if col_conf != self.col.conf {
                save_conf(s, &col_conf, now)?;
            }
            Ok(id)
        });
        let log_id = match result {
            Ok(id) => id,
            Err(e) => {
                self.col.state.invalidate();
                return Err(e);
            }
        };

        self.col.decks = decks;
        self.col.conf = col_conf;
        let state = &mut self.col.state;
        state.current = None;
        state.counts = None;
        state.reps += 1;
        state.queues.remove(&to_bury);
        state.queues.remove(&[card.id]);
        if updated.queue == Queue::Learn
            && updated.due < day.cutoff
            && self.col.active_deck_ids().contains(&updated.deck_id)
        {
            self.col.state.queues.requeue_learn(updated.due, updated.id);
        }

        debug!(card_id = card.id, ease, queue = ?updated.queue, due = updated.due, "answered card");
        if !to_bury.is_empty() {
            debug!(card_id = card.id, count = to_bury.len(), "buried siblings");
        }
        if let Some(leech) = &leech {
            info!(card_id = leech.card_id, note_id = leech.note_id, suspended = leech.suspended, "card is a leech");
        }
        Ok(AnswerOutcome {
            card: updated,
            log: ReviewLogEntry { id: log_id, ..log },
            leech,
        })
    }

    /// Seconds until the card would be due again after `ease`, without fuzz.
    pub fn next_interval(&mut self, card: &Card, ease: u8) -> Result<i64> {
        let day = self.day_cutoff()?;
        let version = self.col.config.version;
        let ctx = AnswerContext {
            version,
            conf: self.col.decks.effective_config(card, version)?,
            now: self.now(),
            today: day.today,
            cutoff: day.cutoff,
            learn_guard: None,
        };
        Ok(preview_interval(&ctx, card, ease))
    }

    fn siblings_to_bury(&self, card: &Card, conf: &EffectiveConfig, today: i64) -> Result<Vec<CardId>> {
        let mut kinds = Vec::new();
        if conf.new.bury {
            kinds.push("queue = 0".to_string());
        }
        if conf.rev.bury {
            kinds.push(format!("(queue = 2 AND due <= {today})"));
        }
        if kinds.is_empty() {
            return Ok(Vec::new());
        }
        self.col.storage.query_ids(
            &format!(
                "SELECT id FROM cards WHERE nid = ?1 AND id != ?2 AND ({})",
                kinds.join(" OR ")
            ),
            [card.note_id, card.id],
        )
    }
}

impl Answering<'_> {
    fn run(&mut self, ease: u8) -> Result<()> {
        self.card.reps += 1;
        match self.ctx.version {
            SchedulerVersion::V1 => self.v1(ease),
            SchedulerVersion::V2 => self.v2(ease),
        }
    }

    fn invalid_state(&self) -> Error {
        Error::InvalidState {
            card_id: self.card.id,
            queue: self.card.queue,
        }
    }

    /// Put a card on a learning step `due` seconds from epoch.
    fn place_learning(&mut self, due: i64) {
        let card = &mut self.card;
        card.due = due;
        if due < self.ctx.cutoff {
            card.queue = Queue::Learn;
            if let Some(front) = self.ctx.learn_guard {
                // don't show the same card twice in a row
                card.due = card.due.max(front + 1);
            }
        } else {
            card.due = day_learn_due(due, self.ctx.today, self.ctx.cutoff);
            card.queue = Queue::DayLearn;
        }
    }

    fn adjust_factor(&mut self, ease: u8) {
        let delta = match ease {
            2 => -150,
            3 => 0,
            _ => 150,
        };
        self.card.factor = (self.card.factor + delta).max(MIN_FACTOR);
    }

    fn fuzzed_review_interval(&mut self, ease: u8) -> i64 {
        let card = &self.card;
        let rev = &self.ctx.conf.rev;
        let ideal = review_intervals(card.interval, card.factor, self.ctx.days_late(card), rev);
        let mut rng = review_fuzz_rng(card.id, card.reps);
        fuzz_review_intervals(ideal, card.interval, rev.max_ivl, &mut rng).for_ease(ease)
    }

    // ========================================================================
    // Three-button policy
    // ========================================================================

    fn v1(&mut self, ease: u8) -> Result<()> {
        let from_new = self.card.queue == Queue::New;
        if from_new {
            let card = &mut self.card;
            card.queue = Queue::Learn;
            if card.ctype == CardType::New {
                card.ctype = CardType::Learn;
            }
            let left = self.ctx.starting_left(&self.card);
            let card = &mut self.card;
            card.left = left;
            if card.is_filtered() && card.ctype == CardType::Review && self.ctx.conf.resched {
                // first sight of a review card in a cramming deck
                card.interval = dyn_interval_boost(
                    card.interval,
                    card.factor,
                    card.original_due.unwrap_or(self.ctx.today),
                    self.ctx.today,
                    self.ctx.conf.rev.max_ivl,
                );
                card.original_due = Some(self.ctx.today + card.interval);
            }
        }
        match self.card.queue {
            Queue::Learn | Queue::DayLearn => self.v1_learning(ease, from_new),
            Queue::Review => self.v1_review(ease),
            _ => Err(self.invalid_state()),
        }
    }

    fn v1_learning(&mut self, ease: u8, from_new: bool) -> Result<()> {
        let ctx = self.ctx;
        let delays = ctx.delays(&self.card).to_vec();
        self.kind = if self.card.is_filtered() && !from_new {
            RevlogKind::Cram
        } else if self.card.ctype == CardType::Review {
            RevlogKind::Relearn
        } else {
            RevlogKind::Learn
        };
        let last_left = self.card.left;
        let remaining = self.card.left % 1000 - 1;

        if ease == 3 || (ease == 2 && remaining <= 0) {
            self.v1_graduate(ease == 3);
            self.interval = self.card.interval;
        } else {
            if ease == 2 {
                self.card.left = left_today(&delays, remaining, ctx.now, ctx.cutoff) * 1000 + remaining;
            } else {
                self.card.left = starting_left(&delays, ctx.now, ctx.cutoff);
                let card = &mut self.card;
                if card.ctype == CardType::Review && ctx.conf.resched {
                    card.interval = lapse_interval(card.interval, &ctx.conf.lapse);
                    if card.is_filtered() {
                        card.original_due = Some(ctx.today);
                    }
                }
            }
            let mut delay = delay_for_grade(&delays, self.card.left);
            if self.card.due < ctx.now {
                delay = (delay as f64 * self.rng.random_range(1.0..1.25)) as i64;
            }
            self.place_learning(ctx.now + delay);
            self.interval = -delay_for_grade(&delays, self.card.left);
        }
        self.last_interval = -delay_for_grade(&delays, last_left);
        Ok(())
    }

    fn v1_graduate(&mut self, early: bool) {
        let ctx = self.ctx;
        let home_due = self.card.original_due;
        let card = &mut self.card;
        let lapse = card.ctype == CardType::Review;
        if lapse {
            card.due = if ctx.conf.resched {
                home_due.unwrap_or(0).max(ctx.today + 1)
            } else {
                home_due.unwrap_or(ctx.today)
            };
            card.original_due = None;
        } else {
            let ideal = ctx.conf.new.ints.get(usize::from(early)).copied().unwrap_or(1);
            card.interval = fuzzed_interval(ideal, &mut *self.rng);
            card.due = ctx.today + card.interval;
            card.factor = ctx.conf.new.initial_factor;
            card.ctype = CardType::Review;
        }
        card.queue = Queue::Review;
        card.left = 0;

        if card.is_filtered() {
            card.remove_from_filtered();
            if !ctx.conf.resched && !lapse {
                // cramming without rescheduling leaves new cards new
                card.ctype = CardType::New;
                card.queue = Queue::New;
                card.interval = 0;
                card.due = match home_due {
                    Some(due) => due,
                    None => {
                        let pos = *self.next_pos;
                        *self.next_pos += 1;
                        pos
                    }
                };
            }
        }
    }

    fn v1_review(&mut self, ease: u8) -> Result<()> {
        let ctx = self.ctx;
        self.kind = RevlogKind::Review;
        self.last_interval = self.card.interval;
        if ease == 1 {
            let delay = self.v1_lapse();
            self.interval = if delay > 0 { -delay } else { self.card.interval };
            return Ok(());
        }
        if ctx.conf.resched {
            let interval = self.fuzzed_review_interval(ease);
            self.card.interval = interval;
            self.adjust_factor(ease);
            self.card.due = ctx.today + interval;
        } else if let Some(due) = self.card.original_due {
            self.card.due = due;
        }
        self.card.remove_from_filtered();
        self.interval = self.card.interval;
        Ok(())
    }

    /// Returns the relearning delay, or 0 if the card is not relearning.
    fn v1_lapse(&mut self) -> i64 {
        let ctx = self.ctx;
        let lapse = &ctx.conf.lapse;
        let card = &mut self.card;
        card.lapses += 1;
        if ctx.conf.resched {
            card.interval = lapse_interval(card.interval, lapse);
            card.factor = (card.factor - 200).max(MIN_FACTOR);
            card.due = ctx.today + card.interval;
            if card.is_filtered() {
                card.original_due = Some(card.due);
            }
        }
        self.leech = handle_leech(&mut self.card, lapse);
        if self.leech.is_some_and(|l| l.suspended) || lapse.delays.is_empty() {
            return 0;
        }
        let card = &mut self.card;
        if card.original_due.is_none() {
            card.original_due = Some(card.due);
        }
        let delay = delay_for_grade(&lapse.delays, lapse.delays.len() as i64);
        card.left = starting_left(&lapse.delays, ctx.now, ctx.cutoff);
        self.place_learning(ctx.now + delay);
        delay
    }

    // ========================================================================
    // Four-button policy
    // ========================================================================

    fn v2(&mut self, ease: u8) -> Result<()> {
        if let Some(preview) = self.ctx.conf.preview {
            let delay = match ease {
                1 => preview.again,
                2 => preview.hard,
                3 => preview.good,
                _ => 0,
            };
            self.v2_preview(delay);
            return Ok(());
        }
        if self.card.queue == Queue::New {
            self.card.queue = Queue::Learn;
            self.card.ctype = CardType::Learn;
            self.card.left = self.ctx.starting_left(&self.card);
        }
        match self.card.queue {
            Queue::Learn | Queue::DayLearn => self.v2_learning(ease),
            Queue::Review => self.v2_review(ease),
            _ => return Err(self.invalid_state()),
        }
        // the pre-filtered due no longer applies once answered
        self.card.original_due = None;
        Ok(())
    }

    fn v2_preview(&mut self, delay: i64) {
        let ctx = self.ctx;
        self.kind = RevlogKind::Cram;
        self.last_interval = self.card.interval;
        if delay > 0 {
            self.card.queue = Queue::Learn;
            self.card.due = (ctx.now + delay).min(ctx.cutoff - 1);
            self.interval = -delay;
        } else {
            let card = &mut self.card;
            card.restore_from_filtered();
            card.queue = card.restored_queue();
            self.interval = card.interval;
        }
    }

    fn v2_learning(&mut self, ease: u8) {
        let ctx = self.ctx;
        let delays = ctx.delays(&self.card).to_vec();
        self.kind = if matches!(self.card.ctype, CardType::Review | CardType::Relearn) {
            RevlogKind::Relearn
        } else {
            RevlogKind::Learn
        };
        let last_left = self.card.left;
        let remaining = self.card.left % 1000 - 1;

        let delay = match ease {
            4 => None,
            3 if remaining <= 0 => None,
            3 => {
                self.card.left = left_today(&delays, remaining, ctx.now, ctx.cutoff) * 1000 + remaining;
                Some(delay_for_grade(&delays, self.card.left))
            }
            2 => Some(delay_for_repeating_grade(&delays, self.card.left)),
            _ => Some(self.v2_first_step(&delays)),
        };
        match delay {
            Some(delay) => {
                self.v2_place_learning(delay);
                self.interval = -delay_for_grade(&delays, self.card.left);
            }
            None => {
                self.v2_graduate(ease == 4);
                self.interval = self.card.interval;
            }
        }
        self.last_interval = -delay_for_grade(&delays, last_left);
    }

    /// Restart the steps; relearning cards take another interval cut.
    fn v2_first_step(&mut self, delays: &[f64]) -> i64 {
        let ctx = self.ctx;
        let card = &mut self.card;
        card.left = starting_left(delays, ctx.now, ctx.cutoff);
        if card.ctype == CardType::Relearn {
            card.interval = lapse_interval(card.interval, &ctx.conf.lapse);
        }
        delay_for_grade(delays, card.left)
    }

    fn v2_place_learning(&mut self, delay: i64) {
        let ctx = self.ctx;
        let mut due = ctx.now + delay;
        if due < ctx.cutoff {
            // spread cards answered together
            let max_extra = 300.min((delay as f64 * 0.25) as i64);
            if max_extra > 0 {
                due = (due + self.rng.random_range(0..max_extra)).min(ctx.cutoff - 1);
            }
        }
        self.place_learning(due);
    }

    fn v2_graduate(&mut self, early: bool) {
        let ctx = self.ctx;
        let card = &mut self.card;
        if matches!(card.ctype, CardType::Review | CardType::Relearn) {
            if early {
                card.interval += 1;
            }
        } else {
            let ideal = ctx.conf.new.ints.get(usize::from(early)).copied().unwrap_or(1);
            card.interval = fuzzed_interval(ideal, &mut *self.rng);
            card.factor = ctx.conf.new.initial_factor;
        }
        card.due = ctx.today + card.interval;
        card.ctype = CardType::Review;
        card.queue = Queue::Review;
        card.left = 0;
        card.remove_from_filtered();
    }

    fn v2_review(&mut self, ease: u8) {
        let ctx = self.ctx;
        let early = self.card.is_filtered() && self.card.original_due.is_some_and(|due| due > ctx.today);
        self.kind = if early { RevlogKind::Cram } else { RevlogKind::Review };
        self.last_interval = self.card.interval;

        if ease == 1 {
            let delay = self.v2_lapse();
            self.interval = if delay > 0 { -delay } else { self.card.interval };
            return;
        }
        let interval = if early {
            let card = &self.card;
            early_review_interval(
                card.interval,
                card.factor,
                card.original_due.unwrap_or(ctx.today),
                ctx.today,
                ease,
                &ctx.conf.rev,
            )
        } else {
            self.fuzzed_review_interval(ease)
        };
        self.card.interval = interval;
        self.adjust_factor(ease);
        self.card.due = ctx.today + interval;
        self.card.remove_from_filtered();
        self.interval = interval;
    }

    /// Returns the relearning delay, or 0 if the card is not relearning.
    fn v2_lapse(&mut self) -> i64 {
        let ctx = self.ctx;
        let lapse = &ctx.conf.lapse;
        let card = &mut self.card;
        card.lapses += 1;
        card.factor = (card.factor - 200).max(MIN_FACTOR);
        self.leech = handle_leech(&mut self.card, lapse);
        let suspended = self.leech.is_some_and(|l| l.suspended);

        if !lapse.delays.is_empty() && !suspended {
            self.card.ctype = CardType::Relearn;
            let delay = self.v2_first_step(&lapse.delays);
            self.v2_place_learning(delay);
            return delay;
        }
        let card = &mut self.card;
        card.interval = lapse_interval(card.interval, lapse);
        card.due = ctx.today + card.interval;
        card.ctype = CardType::Review;
        card.queue = if suspended { Queue::Suspended } else { Queue::Review };
        card.remove_from_filtered();
        0
    }
}

/// Seconds until `card` is due again after `ease`, without fuzz or jitter.
fn preview_interval(ctx: &AnswerContext, card: &Card, ease: u8) -> i64 {
    let conf = &ctx.conf;
    if ctx.version == SchedulerVersion::V2 {
        if let Some(preview) = conf.preview {
            return match ease {
                1 => preview.again,
                2 => preview.hard,
                3 => preview.good,
                _ => 0,
            };
        }
    }

    if matches!(card.queue, Queue::New | Queue::Learn | Queue::DayLearn) {
        let mut card = card.clone();
        if card.queue == Queue::New {
            if ctx.version == SchedulerVersion::V2 || card.ctype == CardType::New {
                card.ctype = CardType::Learn;
            }
            card.left = ctx.starting_left(&card);
        }
        let delays = ctx.delays(&card);
        let remaining = card.left % 1000 - 1;
        let graduating = |early: bool| -> i64 {
            let days = match card.ctype {
                CardType::Review | CardType::Relearn => {
                    if ctx.version == SchedulerVersion::V1 && card.is_filtered() && conf.resched {
                        dyn_interval_boost(
                            card.interval,
                            card.factor,
                            card.original_due.unwrap_or(ctx.today),
                            ctx.today,
                            conf.rev.max_ivl,
                        )
                    } else if ctx.version == SchedulerVersion::V2 && early {
                        card.interval + 1
                    } else {
                        card.interval
                    }
                }
                CardType::New | CardType::Learn => {
                    conf.new.ints.get(usize::from(early)).copied().unwrap_or(1)
                }
            };
            days * SECS_PER_DAY
        };
        let easy = match ctx.version {
            SchedulerVersion::V1 => 3,
            SchedulerVersion::V2 => 4,
        };
        return match ease {
            1 => delay_for_grade(delays, delays.len() as i64),
            e if e == easy => graduating(true),
            2 if ctx.version == SchedulerVersion::V2 => delay_for_repeating_grade(delays, card.left),
            _ if remaining <= 0 => graduating(false),
            _ => delay_for_grade(delays, remaining),
        };
    }

    if ease == 1 {
        if !conf.lapse.delays.is_empty() {
            return delay_for_grade(&conf.lapse.delays, conf.lapse.delays.len() as i64);
        }
        return lapse_interval(card.interval, &conf.lapse) * SECS_PER_DAY;
    }
    let early = ctx.version == SchedulerVersion::V2
        && card.is_filtered()
        && card.original_due.is_some_and(|due| due > ctx.today);
    let days = if early {
        early_review_interval(
            card.interval,
            card.factor,
            card.original_due.unwrap_or(ctx.today),
            ctx.today,
            ease,
            &conf.rev,
        )
    } else {
        review_intervals(card.interval, card.factor, ctx.days_late(card), &conf.rev).for_ease(ease)
    };
    days * SECS_PER_DAY
}
