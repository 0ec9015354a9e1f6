//! The deck and deck-config store.
//!
//! Decks form a hierarchy through their `::`-separated names. Limits,
//! counters, and "active deck" selection all follow that hierarchy, so most
//! lookups here are name-prefix walks.

use std::collections::BTreeMap;

use tracing::debug;

use crate::card::{Card, DeckId};
use crate::config::SchedulerVersion;
use crate::deck::{Deck, DeckConfig, DeckConfigId, FilterTerm, LapseConfig, NewConfig, ReviewConfig};
use crate::error::{Error, Result};

/// Separator between deck name components.
pub const DECK_SEPARATOR: &str = "::";

/// Which daily counter an answer feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DailyStat {
    New,
    Learn,
    Review,
    Time,
}

/// Delays used when answering inside a preview-mode filtered deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewDelays {
    /// Seconds until an "again" card is shown again.
    pub again: i64,
    /// Seconds until a "hard" card is shown again.
    pub hard: i64,
    /// Seconds until a "good" card is shown again; zero returns it home.
    pub good: i64,
}

/// The options that apply to one card at answer time.
///
/// Cards in filtered decks take most options from their home deck, with the
/// filtered deck's reschedule flag, step override, and preview delays on
/// top.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveConfig {
    /// New card options.
    pub new: NewConfig,
    /// Review options.
    pub rev: ReviewConfig,
    /// Lapse options.
    pub lapse: LapseConfig,
    /// Cap on recorded answer time, in seconds.
    pub max_taken: i64,
    /// Whether the card currently sits in a filtered deck.
    pub filtered: bool,
    /// Whether answers change the card's real schedule.
    pub resched: bool,
    /// Set when the card is being previewed rather than studied.
    pub preview: Option<PreviewDelays>,
}

/// In-memory view of the `decks` and `dconf` columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeckManager {
    decks: BTreeMap<DeckId, Deck>,
    configs: BTreeMap<DeckConfigId, DeckConfig>,
}

impl DeckManager {
    /// Parse the persisted JSON maps (keyed by stringified ID).
    pub(crate) fn from_json(decks: &str, configs: &str) -> Result<Self> {
        let decks: BTreeMap<String, Deck> = serde_json::from_str(decks)?;
        let configs: BTreeMap<String, DeckConfig> = serde_json::from_str(configs)?;
        Ok(Self {
            decks: decks.into_values().map(|d| (d.id, d)).collect(),
            configs: configs.into_values().map(|c| (c.id, c)).collect(),
        })
    }

    /// Serialize back to the persisted `(decks, dconf)` JSON pair.
    pub(crate) fn to_json(&self) -> Result<(String, String)> {
        let decks: BTreeMap<String, &Deck> =
            self.decks.values().map(|d| (d.id.to_string(), d)).collect();
        let configs: BTreeMap<String, &DeckConfig> =
            self.configs.values().map(|c| (c.id.to_string(), c)).collect();
        Ok((serde_json::to_string(&decks)?, serde_json::to_string(&configs)?))
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Look up a deck.
    pub fn get(&self, did: DeckId) -> Result<&Deck> {
        self.decks.get(&did).ok_or(Error::DeckNotFound(did))
    }

    pub(crate) fn get_mut(&mut self, did: DeckId) -> Result<&mut Deck> {
        self.decks.get_mut(&did).ok_or(Error::DeckNotFound(did))
    }

    /// Find a deck by its full name, ignoring case.
    pub fn by_name(&self, name: &str) -> Option<&Deck> {
        let wanted = normalize_name(name);
        self.decks
            .values()
            .find(|d| d.name.eq_ignore_ascii_case(&wanted))
    }

    /// All decks in ID order.
    pub fn iter(&self) -> impl Iterator<Item = &Deck> {
        self.decks.values()
    }

    /// All decks sorted by name, each parent directly followed by its
    /// descendants.
    pub fn sorted(&self) -> Vec<&Deck> {
        let mut decks: Vec<&Deck> = self.decks.values().collect();
        decks.sort_by_key(|d| sort_key(&d.name));
        decks
    }

    /// Look up an options group.
    pub fn config(&self, id: DeckConfigId) -> Result<&DeckConfig> {
        self.configs.get(&id).ok_or(Error::DeckConfigNotFound(id))
    }

    /// All options groups.
    pub fn configs(&self) -> impl Iterator<Item = &DeckConfig> {
        self.configs.values()
    }

    /// The options group of a normal deck.
    pub fn config_for(&self, did: DeckId) -> Result<&DeckConfig> {
        let deck = self.get(did)?;
        if deck.filtered {
            return Err(Error::Config(format!("filtered deck {did} has no options group")));
        }
        let id = deck
            .conf
            .ok_or_else(|| Error::Config(format!("deck {did} is missing its options group")))?;
        self.config(id)
    }

    /// Existing ancestors of a deck, outermost first.
    pub fn parents(&self, did: DeckId) -> Result<Vec<&Deck>> {
        let name = &self.get(did)?.name;
        let parts: Vec<&str> = name.split(DECK_SEPARATOR).collect();
        let mut parents = Vec::new();
        for depth in 1..parts.len() {
            let prefix = parts[..depth].join(DECK_SEPARATOR);
            if let Some(parent) = self.by_name(&prefix) {
                parents.push(parent);
            }
        }
        Ok(parents)
    }

    /// Every descendant of a deck, sorted by name.
    pub fn children(&self, did: DeckId) -> Result<Vec<&Deck>> {
        let prefix = format!("{}{DECK_SEPARATOR}", self.get(did)?.name.to_lowercase());
        let mut children: Vec<&Deck> = self
            .decks
            .values()
            .filter(|d| d.name.to_lowercase().starts_with(&prefix))
            .collect();
        children.sort_by_key(|d| sort_key(&d.name));
        Ok(children)
    }

    /// The deck and every descendant. Empty if the deck does not exist.
    pub fn self_and_children_ids(&self, did: DeckId) -> Vec<DeckId> {
        match self.children(did) {
            Ok(children) => std::iter::once(did).chain(children.iter().map(|d| d.id)).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Whether `did` is `ancestor` or lives beneath it.
    pub fn is_self_or_descendant(&self, did: DeckId, ancestor: DeckId) -> bool {
        if did == ancestor {
            return true;
        }
        match (self.decks.get(&did), self.decks.get(&ancestor)) {
            (Some(deck), Some(anc)) => deck
                .name
                .to_lowercase()
                .starts_with(&format!("{}{DECK_SEPARATOR}", anc.name.to_lowercase())),
            _ => false,
        }
    }

    // ========================================================================
    // Effective options
    // ========================================================================

    /// Resolve the options that apply when answering `card`.
    pub fn effective_config(&self, card: &Card, version: SchedulerVersion) -> Result<EffectiveConfig> {
        let home = self.config_for(card.home_deck_id())?;
        let deck = self.get(card.deck_id)?;
        let mut conf = EffectiveConfig {
            new: home.new.clone(),
            rev: home.rev.clone(),
            lapse: home.lapse.clone(),
            max_taken: home.max_taken,
            filtered: deck.filtered,
            resched: true,
            preview: None,
        };
        if deck.filtered {
            conf.resched = deck.resched;
            match version {
                SchedulerVersion::V1 => {
                    if let Some(delays) = &deck.delays {
                        conf.new.delays = delays.clone();
                        conf.lapse.delays = delays.clone();
                    }
                }
                SchedulerVersion::V2 if !deck.resched => {
                    conf.preview = Some(PreviewDelays {
                        again: deck.preview_again_secs,
                        hard: deck.preview_hard_secs,
                        good: deck.preview_good_secs,
                    });
                }
                SchedulerVersion::V2 => {}
            }
        }
        Ok(conf)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    pub(crate) fn insert_deck(&mut self, deck: Deck) {
        self.decks.insert(deck.id, deck);
    }

    /// Create a normal deck and any missing parents. Returns the existing ID
    /// if the name is taken by a normal deck.
    pub(crate) fn add_deck(&mut self, name: &str, conf: DeckConfigId) -> Result<DeckId> {
        self.config(conf)?;
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(Error::Config("deck name is empty".into()));
        }
        if let Some(existing) = self.by_name(&name) {
            if existing.filtered {
                return Err(Error::Config(format!("'{name}' is a filtered deck")));
            }
            return Ok(existing.id);
        }
        self.ensure_parents(&name, conf)?;
        let id = self.next_deck_id();
        self.decks.insert(id, Deck::normal(id, name.clone(), conf));
        debug!(deck_id = id, name = %name, "added deck");
        Ok(id)
    }

    /// Create a filtered deck. Missing parents are created as normal decks.
    pub(crate) fn add_filtered(
        &mut self,
        name: &str,
        terms: Vec<FilterTerm>,
        resched: bool,
    ) -> Result<DeckId> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(Error::Config("deck name is empty".into()));
        }
        if self.by_name(&name).is_some() {
            return Err(Error::Config(format!("deck '{name}' already exists")));
        }
        let default_conf = self
            .configs
            .keys()
            .next()
            .copied()
            .ok_or_else(|| Error::Config("collection has no options groups".into()))?;
        self.ensure_parents(&name, default_conf)?;
        let id = self.next_deck_id();
        self.decks.insert(id, Deck::filtered(id, name.clone(), terms, resched));
        debug!(deck_id = id, name = %name, "added filtered deck");
        Ok(id)
    }

    /// Store an options group under a fresh ID.
    pub(crate) fn add_config(&mut self, mut config: DeckConfig) -> DeckConfigId {
        let id = self.configs.keys().next_back().map_or(1, |last| last + 1);
        config.id = id;
        self.configs.insert(id, config);
        id
    }

    /// Replace an existing options group.
    pub(crate) fn update_config(&mut self, config: DeckConfig) -> Result<()> {
        match self.configs.get_mut(&config.id) {
            Some(slot) => {
                *slot = config;
                Ok(())
            }
            None => Err(Error::DeckConfigNotFound(config.id)),
        }
    }

    /// Replace an existing deck.
    pub(crate) fn update_deck(&mut self, deck: Deck) -> Result<()> {
        match self.decks.get_mut(&deck.id) {
            Some(slot) => {
                *slot = deck;
                Ok(())
            }
            None => Err(Error::DeckNotFound(deck.id)),
        }
    }

    /// Add to a daily counter of the deck and all of its parents.
    pub(crate) fn record(&mut self, did: DeckId, today: i64, stat: DailyStat, amount: i64) -> Result<()> {
        let mut ids: Vec<DeckId> = self.parents(did)?.iter().map(|d| d.id).collect();
        ids.push(did);
        for id in ids {
            let deck = self.get_mut(id)?;
            let counter = match stat {
                DailyStat::New => &mut deck.new_today,
                DailyStat::Learn => &mut deck.lrn_today,
                DailyStat::Review => &mut deck.rev_today,
                DailyStat::Time => &mut deck.time_today,
            };
            counter.add(today, amount);
        }
        Ok(())
    }

    /// Reset stale daily counters on every deck. Returns how many decks changed.
    pub(crate) fn reset_counters(&mut self, today: i64) -> usize {
        self.decks
            .values_mut()
            .map(|deck| deck.reset_counters(today))
            .filter(|changed| *changed)
            .count()
    }

    fn ensure_parents(&mut self, name: &str, conf: DeckConfigId) -> Result<()> {
        let parts: Vec<&str> = name.split(DECK_SEPARATOR).collect();
        for depth in 1..parts.len() {
            let prefix = parts[..depth].join(DECK_SEPARATOR);
            match self.by_name(&prefix) {
                Some(parent) if parent.filtered => {
                    return Err(Error::Config(format!(
                        "filtered deck '{prefix}' cannot have children"
                    )));
                }
                Some(_) => {}
                None => {
                    let id = self.next_deck_id();
                    self.decks.insert(id, Deck::normal(id, prefix, conf));
                }
            }
        }
        Ok(())
    }

    fn next_deck_id(&self) -> DeckId {
        self.decks.keys().next_back().map_or(1, |last| last + 1)
    }
}

/// Compare names component by component, so "A::B" sorts before "A B".
fn sort_key(name: &str) -> Vec<String> {
    name.split(DECK_SEPARATOR).map(str::to_lowercase).collect()
}

/// Trim whitespace around each `::` component.
fn normalize_name(name: &str) -> String {
    name.split(DECK_SEPARATOR)
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(DECK_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Card;
    use crate::deck::FilterOrder;
    use crate::schema::{DEFAULT_DCONF, DEFAULT_DECKS};

    fn manager() -> DeckManager {
        DeckManager::from_json(DEFAULT_DECKS, DEFAULT_DCONF).unwrap()
    }

    #[test]
    fn test_add_deck_creates_parents() {
        let mut decks = manager();
        let leaf = decks.add_deck("Lang :: Spanish::Verbs", 1).unwrap();
        let names: Vec<&str> = decks.parents(leaf).unwrap().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["Lang", "Lang::Spanish"]);

        // existing name returns the same deck
        assert_eq!(decks.add_deck("lang::spanish::verbs", 1).unwrap(), leaf);
    }

    #[test]
    fn test_children_and_descendant_checks() {
        let mut decks = manager();
        let lang = decks.add_deck("Lang", 1).unwrap();
        let verbs = decks.add_deck("Lang::Verbs", 1).unwrap();
        let other = decks.add_deck("Language", 1).unwrap();

        assert_eq!(decks.self_and_children_ids(lang), vec![lang, verbs]);
        assert!(decks.is_self_or_descendant(verbs, lang));
        assert!(!decks.is_self_or_descendant(other, lang));
        assert!(decks.self_and_children_ids(999).is_empty());
    }

    #[test]
    fn test_filtered_deck_cannot_parent() {
        let mut decks = manager();
        decks
            .add_filtered("Cram", vec![FilterTerm::new("", 10, FilterOrder::Due)], true)
            .unwrap();
        assert!(matches!(decks.add_deck("Cram::Sub", 1), Err(Error::Config(_))));
        assert!(matches!(decks.add_filtered("Cram", vec![], true), Err(Error::Config(_))));
    }

    #[test]
    fn test_record_updates_parents() {
        let mut decks = manager();
        let leaf = decks.add_deck("A::B", 1).unwrap();
        let parent = decks.by_name("A").unwrap().id;

        decks.record(leaf, 5, DailyStat::New, 1).unwrap();
        decks.record(leaf, 5, DailyStat::New, 1).unwrap();

        assert_eq!(decks.get(leaf).unwrap().new_today.count_on(5), 2);
        assert_eq!(decks.get(parent).unwrap().new_today.count_on(5), 2);
        assert_eq!(decks.get(1).unwrap().new_today.count_on(5), 0);
    }

    #[test]
    fn test_effective_config_for_filtered_card() {
        let mut decks = manager();
        let cram = decks.add_filtered("Cram", vec![], false).unwrap();
        let mut card = Card::new(1, 1, cram, 0);
        card.original_deck_id = Some(1);

        let v2 = decks.effective_config(&card, SchedulerVersion::V2).unwrap();
        assert!(v2.filtered);
        assert!(!v2.resched);
        assert_eq!(v2.preview.map(|p| p.again), Some(60));

        let mut deck = decks.get(cram).unwrap().clone();
        deck.delays = Some(vec![5.0]);
        decks.update_deck(deck).unwrap();
        let v1 = decks.effective_config(&card, SchedulerVersion::V1).unwrap();
        assert_eq!(v1.preview, None);
        assert_eq!(v1.new.delays, vec![5.0]);
        assert_eq!(v1.lapse.delays, vec![5.0]);
    }

    #[test]
    fn test_config_for_filtered_deck_fails() {
        let mut decks = manager();
        let cram = decks.add_filtered("Cram", vec![], true).unwrap();
        assert!(matches!(decks.config_for(cram), Err(Error::Config(_))));
        assert!(matches!(decks.config(42), Err(Error::DeckConfigNotFound(42))));
    }

    #[test]
    fn test_json_round_trip_keeps_ids() {
        let mut decks = manager();
        decks.add_deck("Extra", 1).unwrap();
        let (d, c) = decks.to_json().unwrap();
        assert_eq!(DeckManager::from_json(&d, &c).unwrap(), decks);
    }
}
