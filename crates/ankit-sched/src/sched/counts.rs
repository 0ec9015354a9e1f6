//! Due counts, the per-deck due tree, and time estimates.

use rusqlite::params;
use serde::Serialize;

use super::limits::LimitKind;
use super::{CancelToken, Scheduler};
use crate::card::DeckId;
use crate::decks::DECK_SEPARATOR;
use crate::error::Result;
use crate::storage::ids_sql;

/// Days of answer history the ETA looks back over.
const ETA_WINDOW_DAYS: i64 = 10;

/// Answer rounds the ETA allows for failed cards coming back.
const ETA_MAX_ROUNDS: i32 = 10;

/// Cards due in each bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    /// New cards.
    pub new: i64,
    /// Learning cards (intraday and day-based), one per card.
    pub learn: i64,
    /// Review cards.
    pub review: i64,
}

impl Counts {
    /// Sum of all buckets.
    pub fn total(&self) -> i64 {
        self.new + self.learn + self.review
    }
}

/// Due counts for one deck and its subdecks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeckDueNode {
    /// Deck ID.
    pub deck_id: DeckId,
    /// Full deck name.
    pub name: String,
    /// New cards, including subdecks, within this deck's limit.
    pub new: i64,
    /// Learning cards, including subdecks.
    pub learn: i64,
    /// Reviews, including subdecks, within this deck's limit.
    pub review: i64,
    /// Immediate subdecks.
    pub children: Vec<DeckDueNode>,
}

/// Per-bucket history used by the ETA.
#[derive(Debug, Clone, Copy)]
struct AnswerStats {
    secs_per_answer: f64,
    pass_rate: f64,
}

impl Scheduler<'_> {
    /// Cards due today in the active decks.
    ///
    /// The card in play is not included.
    pub fn counts(&mut self) -> Result<Counts> {
        self.check_day()?;
        self.ensure_counts()
    }

    pub(crate) fn ensure_counts(&mut self) -> Result<Counts> {
        if let Some(counts) = self.col.state.counts {
            return Ok(counts);
        }
        let counts = self.compute_counts()?;
        self.col.state.counts = Some(counts);
        Ok(counts)
    }

    fn compute_counts(&self) -> Result<Counts> {
        let day = self.cached_day();
        let exclude = self.col.state.current_id().unwrap_or(0);
        let storage = &self.col.storage;

        let new = self.walking_count(LimitKind::New, day.today, |did, limit| {
            storage.query_scalar(
                "SELECT count() FROM (SELECT 1 FROM cards WHERE did = ?1 AND queue = 0 \
                 AND id != ?2 LIMIT ?3)",
                params![did, exclude, limit],
            )
        })?;
        let review = self.walking_count(LimitKind::Review, day.today, |did, limit| {
            storage.query_scalar(
                "SELECT count() FROM (SELECT 1 FROM cards WHERE did = ?1 AND queue = 2 \
                 AND due <= ?2 AND id != ?3 LIMIT ?4)",
                params![did, day.today, exclude, limit],
            )
        })?;

        let dids = ids_sql(&self.col.active_deck_ids());
        let report_limit = self.col.config.report_limit as i64;
        let intraday: i64 = storage.query_scalar(
            &format!(
                "SELECT count() FROM (SELECT 1 FROM cards WHERE did IN {dids} AND queue = 1 \
                 AND due < ?1 AND id != ?2 LIMIT ?3)"
            ),
            params![day.cutoff, exclude, report_limit],
        )?;
        let day_learn: i64 = storage.query_scalar(
            &format!(
                "SELECT count() FROM (SELECT 1 FROM cards WHERE did IN {dids} AND queue = 3 \
                 AND due <= ?1 AND id != ?2 LIMIT ?3)"
            ),
            params![day.today, exclude, report_limit],
        )?;

        Ok(Counts {
            new,
            learn: intraday + day_learn,
            review,
        })
    }

    // ========================================================================
    // Deck tree
    // ========================================================================

    /// Due counts for every deck, nested by name.
    ///
    /// Each deck's new and review counts include its subdecks and are capped
    /// by its own limit, which is in turn clamped by its parents. Returns
    /// `None` if cancelled.
    pub fn deck_due_tree(&mut self, cancel: &CancelToken) -> Result<Option<Vec<DeckDueNode>>> {
        let day = self.day_cutoff()?;
        let storage = &self.col.storage;

        // (node, own limits) in name order, so parents precede children
        let mut flat: Vec<(DeckDueNode, i64, i64)> = Vec::new();
        for deck in self.col.decks.sorted() {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let mut new_limit = self.single_limit(deck, LimitKind::New, day.today)?;
            let mut rev_limit = self.single_limit(deck, LimitKind::Review, day.today)?;
            if let Some(parent) = parent_name(&deck.name) {
                if let Some((_, pn, pr)) = flat.iter().find(|(n, _, _)| n.name.eq_ignore_ascii_case(parent)) {
                    new_limit = new_limit.min(*pn);
                    rev_limit = rev_limit.min(*pr);
                }
            }
            let new: i64 = storage.query_scalar(
                "SELECT count() FROM (SELECT 1 FROM cards WHERE did = ?1 AND queue = 0 LIMIT ?2)",
                params![deck.id, new_limit],
            )?;
            let review: i64 = storage.query_scalar(
                "SELECT count() FROM (SELECT 1 FROM cards WHERE did = ?1 AND queue = 2 \
                 AND due <= ?2 LIMIT ?3)",
                params![deck.id, day.today, rev_limit],
            )?;
            let learn: i64 = storage.query_scalar(
                "SELECT count() FROM cards WHERE did = ?1 AND \
                 ((queue = 1 AND due < ?2) OR (queue = 3 AND due <= ?3))",
                params![deck.id, day.cutoff, day.today],
            )?;
            let node = DeckDueNode {
                deck_id: deck.id,
                name: deck.name.clone(),
                new,
                learn,
                review,
                children: Vec::new(),
            };
            flat.push((node, new_limit, rev_limit));
        }
        Ok(Some(nest(flat)))
    }

    // ========================================================================
    // ETA
    // ========================================================================

    /// Estimated seconds to finish the given counts.
    ///
    /// Uses the last ten days of answers: average time per answer and pass
    /// rate per bucket, with failed answers coming back for up to ten
    /// rounds. Buckets without history assume the configured default time
    /// and no failures.
    pub fn eta(&mut self, counts: Counts) -> Result<i64> {
        let day = self.day_cutoff()?;
        let since_ms = (day.cutoff - ETA_WINDOW_DAYS * super::intervals::SECS_PER_DAY) * 1000;
        let default = AnswerStats {
            secs_per_answer: self.col.config.default_answer_time_secs,
            pass_rate: 1.0,
        };
        // revlog types: 0 learn, 1 review, 2 relearn, 3 filtered
        let new = self.answer_stats("type = 0", since_ms)?.unwrap_or(default);
        let learn = self.answer_stats("type IN (0, 2)", since_ms)?.unwrap_or(default);
        let review = self.answer_stats("type IN (1, 3)", since_ms)?.unwrap_or(default);

        let secs = bucket_secs(counts.new, new) + bucket_secs(counts.learn, learn) + bucket_secs(counts.review, review);
        Ok(secs.round() as i64)
    }

    fn answer_stats(&self, clause: &str, since_ms: i64) -> Result<Option<AnswerStats>> {
        let (answers, millis, passed): (i64, Option<i64>, Option<i64>) = self.col.storage.conn().query_row(
            &format!(
                "SELECT count(), sum(time), sum(CASE WHEN ease = 1 THEN 0 ELSE 1 END) \
                 FROM revlog WHERE id > ?1 AND {clause}"
            ),
            [since_ms],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        if answers == 0 {
            return Ok(None);
        }
        Ok(Some(AnswerStats {
            secs_per_answer: millis.unwrap_or(0) as f64 / 1000.0 / answers as f64,
            pass_rate: passed.unwrap_or(0) as f64 / answers as f64,
        }))
    }
}

/// Expected seconds for `cards` cards, counting failed answers that come
/// back.
fn bucket_secs(cards: i64, stats: AnswerStats) -> f64 {
    let fail = (1.0 - stats.pass_rate).clamp(0.0, 1.0);
    let answers_per_card: f64 = (0..ETA_MAX_ROUNDS).map(|round| fail.powi(round)).sum();
    cards as f64 * answers_per_card * stats.secs_per_answer
}

fn parent_name(name: &str) -> Option<&str> {
    name.rfind(DECK_SEPARATOR).map(|i| &name[..i])
}

/// Turn the name-sorted flat list into a tree, summing children into their
/// parents and capping at each parent's limits.
fn nest(flat: Vec<(DeckDueNode, i64, i64)>) -> Vec<DeckDueNode> {
    fn take_children(
        items: &mut std::iter::Peekable<std::vec::IntoIter<(DeckDueNode, i64, i64)>>,
        prefix: &str,
    ) -> Vec<DeckDueNode> {
        let mut out = Vec::new();
        while let Some((node, _, _)) = items.peek() {
            let lower = node.name.to_lowercase();
            if !prefix.is_empty() && !lower.starts_with(prefix) {
                break;
            }
            let Some((mut node, new_limit, rev_limit)) = items.next() else {
                break;
            };
            let child_prefix = format!("{}{DECK_SEPARATOR}", node.name.to_lowercase());
            node.children = take_children(items, &child_prefix);
            for child in &node.children {
                node.new += child.new;
                node.learn += child.learn;
                node.review += child.review;
            }
            node.new = node.new.min(new_limit);
            node.review = node.review.min(rev_limit);
            out.push(node);
        }
        out
    }

    let mut items = flat.into_iter().peekable();
    take_children(&mut items, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, new: i64, review: i64) -> (DeckDueNode, i64, i64) {
        (
            DeckDueNode {
                deck_id: 0,
                name: name.into(),
                new,
                learn: 1,
                review,
                children: Vec::new(),
            },
            5,
            100,
        )
    }

    #[test]
    fn test_nest_sums_and_caps_children() {
        let tree = nest(vec![
            node("A", 1, 10),
            node("A::B", 3, 20),
            node("A::B::C", 4, 1),
            node("Z", 0, 0),
        ]);
        assert_eq!(tree.len(), 2);
        let a = &tree[0];
        assert_eq!(a.children.len(), 1);
        assert_eq!(a.children[0].children[0].name, "A::B::C");
        // B: 3 + 4 capped at 5
        assert_eq!(a.children[0].new, 5);
        assert_eq!(a.new, 5);
        assert_eq!(a.review, 31);
        assert_eq!(a.learn, 3);
        assert_eq!(tree[1].name, "Z");
    }

    #[test]
    fn test_bucket_secs() {
        let perfect = AnswerStats { secs_per_answer: 10.0, pass_rate: 1.0 };
        assert_eq!(bucket_secs(3, perfect), 30.0);

        let half = AnswerStats { secs_per_answer: 10.0, pass_rate: 0.5 };
        let secs = bucket_secs(1, half);
        assert!(secs > 19.9 && secs < 20.0);

        let never = AnswerStats { secs_per_answer: 1.0, pass_rate: 0.0 };
        assert_eq!(bucket_secs(1, never), 10.0);
    }

    #[test]
    fn test_parent_name() {
        assert_eq!(parent_name("A::B::C"), Some("A::B"));
        assert_eq!(parent_name("A"), None);
    }
}
