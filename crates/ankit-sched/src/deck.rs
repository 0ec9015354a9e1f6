//! Deck, deck-config, and collection-config types.
//!
//! These mirror the JSON stored in the `col` table (`decks`, `dconf`, and
//! `conf` columns), using Anki's camelCase keys. Unknown keys are kept in
//! `other` so that round-tripping a collection does not drop them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::card::DeckId;

/// Deck configuration identifier.
pub type DeckConfigId = i64;

/// A `[day, count]` pair tracking consumption for one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i64; 2]", into = "[i64; 2]")]
pub struct DailyCount {
    /// Day index the count belongs to.
    pub day: i64,
    /// Amount consumed on that day.
    pub count: i64,
}

impl From<[i64; 2]> for DailyCount {
    fn from([day, count]: [i64; 2]) -> Self {
        Self { day, count }
    }
}

impl From<DailyCount> for [i64; 2] {
    fn from(value: DailyCount) -> Self {
        [value.day, value.count]
    }
}

impl DailyCount {
    /// The count consumed on `today`, or zero if the pair is stale.
    pub fn count_on(&self, today: i64) -> i64 {
        if self.day == today { self.count.max(0) } else { 0 }
    }

    /// Add to today's count, resetting a stale pair first.
    pub fn add(&mut self, today: i64, amount: i64) {
        self.reset(today);
        self.count = (self.count + amount).max(0);
    }

    /// Reset the pair if it belongs to another day. Returns whether it changed.
    pub fn reset(&mut self, today: i64) -> bool {
        if self.day != today {
            *self = Self { day: today, count: 0 };
            true
        } else {
            false
        }
    }
}

/// Search order for a filtered-deck term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum FilterOrder {
    /// Least recently modified first.
    OldestSeenFirst,
    /// Random.
    Random,
    /// Smallest interval first.
    IntervalsAscending,
    /// Largest interval first.
    IntervalsDescending,
    /// Most lapses first.
    Lapses,
    /// Order the notes were added.
    Added,
    /// By due value.
    #[default]
    Due,
    /// Reverse order the notes were added.
    ReverseAdded,
    /// Most overdue relative to interval first.
    DuePriority,
}

impl From<i64> for FilterOrder {
    fn from(value: i64) -> Self {
        match value {
            0 => FilterOrder::OldestSeenFirst,
            1 => FilterOrder::Random,
            2 => FilterOrder::IntervalsAscending,
            3 => FilterOrder::IntervalsDescending,
            4 => FilterOrder::Lapses,
            5 => FilterOrder::Added,
            7 => FilterOrder::ReverseAdded,
            8 => FilterOrder::DuePriority,
            // unknown orders fall back to due order
            _ => FilterOrder::Due,
        }
    }
}

impl From<FilterOrder> for i64 {
    fn from(value: FilterOrder) -> Self {
        match value {
            FilterOrder::OldestSeenFirst => 0,
            FilterOrder::Random => 1,
            FilterOrder::IntervalsAscending => 2,
            FilterOrder::IntervalsDescending => 3,
            FilterOrder::Lapses => 4,
            FilterOrder::Added => 5,
            FilterOrder::Due => 6,
            FilterOrder::ReverseAdded => 7,
            FilterOrder::DuePriority => 8,
        }
    }
}

impl FilterOrder {
    /// SQL `ORDER BY` expression over `cards c JOIN notes n`.
    pub(crate) fn sql(self, today: i64) -> String {
        match self {
            FilterOrder::OldestSeenFirst => "c.mod".into(),
            FilterOrder::Random => "random()".into(),
            FilterOrder::IntervalsAscending => "c.ivl".into(),
            FilterOrder::IntervalsDescending => "c.ivl desc".into(),
            FilterOrder::Lapses => "c.lapses desc".into(),
            FilterOrder::Added => "n.id".into(),
            FilterOrder::Due => "c.due, c.ord".into(),
            FilterOrder::ReverseAdded => "n.id desc".into(),
            FilterOrder::DuePriority => format!(
                "(case when c.queue = 2 and c.due <= {today} \
                 then (c.ivl / cast({today} - c.due + 0.001 as real)) \
                 else 100000 + c.due end)"
            ),
        }
    }
}

/// One `[search, limit, order]` term of a filtered deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, u32, FilterOrder)", into = "(String, u32, FilterOrder)")]
pub struct FilterTerm {
    /// Search expression.
    pub search: String,
    /// Maximum number of cards pulled by this term.
    pub limit: u32,
    /// Order the matches are taken in.
    pub order: FilterOrder,
}

impl From<(String, u32, FilterOrder)> for FilterTerm {
    fn from((search, limit, order): (String, u32, FilterOrder)) -> Self {
        Self { search, limit, order }
    }
}

impl From<FilterTerm> for (String, u32, FilterOrder) {
    fn from(value: FilterTerm) -> Self {
        (value.search, value.limit, value.order)
    }
}

impl FilterTerm {
    /// Create a term.
    pub fn new(search: impl Into<String>, limit: u32, order: FilterOrder) -> Self {
        Self { search: search.into(), limit, order }
    }
}

/// A deck, normal or filtered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    /// Deck ID.
    pub id: DeckId,
    /// Full `::`-separated name.
    pub name: String,
    /// Modification time.
    #[serde(rename = "mod", default)]
    pub mtime: i64,
    /// Update sequence number.
    #[serde(default)]
    pub usn: i64,
    /// Whether this is a filtered deck.
    #[serde(rename = "dyn", default, with = "int_bool")]
    pub filtered: bool,
    /// Options group for normal decks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conf: Option<DeckConfigId>,
    /// New cards introduced today.
    #[serde(default)]
    pub new_today: DailyCount,
    /// Reviews answered today.
    #[serde(default)]
    pub rev_today: DailyCount,
    /// Learning answers today.
    #[serde(default)]
    pub lrn_today: DailyCount,
    /// Milliseconds spent answering today.
    #[serde(default)]
    pub time_today: DailyCount,
    /// Filter terms for filtered decks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terms: Vec<FilterTerm>,
    /// Whether answers in this filtered deck affect scheduling.
    #[serde(default = "default_true")]
    pub resched: bool,
    /// Learning-step override for filtered decks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delays: Option<Vec<f64>>,
    /// Preview delay for "again", in seconds.
    #[serde(default = "default_preview_again")]
    pub preview_again_secs: i64,
    /// Preview delay for "hard", in seconds.
    #[serde(default = "default_preview_hard")]
    pub preview_hard_secs: i64,
    /// Preview delay for "good", in seconds. Zero returns the card home.
    #[serde(default)]
    pub preview_good_secs: i64,
    /// Keys this crate does not interpret.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Deck {
    /// A normal deck using the given options group.
    pub fn normal(id: DeckId, name: impl Into<String>, conf: DeckConfigId) -> Self {
        Self {
            id,
            name: name.into(),
            mtime: 0,
            usn: -1,
            filtered: false,
            conf: Some(conf),
            new_today: DailyCount::default(),
            rev_today: DailyCount::default(),
            lrn_today: DailyCount::default(),
            time_today: DailyCount::default(),
            terms: Vec::new(),
            resched: true,
            delays: None,
            preview_again_secs: default_preview_again(),
            preview_hard_secs: default_preview_hard(),
            preview_good_secs: 0,
            other: Map::new(),
        }
    }

    /// A filtered deck with the given terms.
    pub fn filtered(
        id: DeckId,
        name: impl Into<String>,
        terms: Vec<FilterTerm>,
        resched: bool,
    ) -> Self {
        Self {
            filtered: true,
            conf: None,
            terms,
            resched,
            ..Self::normal(id, name, 0)
        }
    }

    /// Reset every daily counter that belongs to another day.
    pub fn reset_counters(&mut self, today: i64) -> bool {
        // evaluate all four, no short-circuit
        let changed = [
            self.new_today.reset(today),
            self.rev_today.reset(today),
            self.lrn_today.reset(today),
            self.time_today.reset(today),
        ];
        changed.contains(&true)
    }
}

/// What happens to a card detected as a leech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum LeechAction {
    /// Suspend the card and tag the note.
    Suspend,
    /// Only tag the note.
    TagOnly,
}

impl TryFrom<i64> for LeechAction {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LeechAction::Suspend),
            1 => Ok(LeechAction::TagOnly),
            other => Err(format!("unknown leech action {other}")),
        }
    }
}

impl From<LeechAction> for i64 {
    fn from(value: LeechAction) -> Self {
        match value {
            LeechAction::Suspend => 0,
            LeechAction::TagOnly => 1,
        }
    }
}

/// Options group shared by normal decks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckConfig {
    /// The config ID.
    pub id: DeckConfigId,
    /// The config name.
    pub name: String,
    /// Cap on recorded answer time, in seconds.
    #[serde(default = "default_max_taken")]
    pub max_taken: i64,
    /// New card settings.
    pub new: NewConfig,
    /// Review settings.
    pub rev: ReviewConfig,
    /// Lapse settings.
    pub lapse: LapseConfig,
    /// Keys this crate does not interpret.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Configuration for new cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConfig {
    /// Learning steps in minutes.
    pub delays: Vec<f64>,
    /// Graduating intervals in days: `[normal, easy, ..]`.
    pub ints: Vec<i64>,
    /// Initial ease factor in permille.
    pub initial_factor: i64,
    /// Maximum new cards per day.
    pub per_day: i64,
    /// Bury new siblings when a card of the note is answered.
    #[serde(default = "default_true")]
    pub bury: bool,
    /// Insertion order (0 random, 1 due).
    #[serde(default = "default_new_order")]
    pub order: i64,
    /// Keys this crate does not interpret.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Configuration for reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewConfig {
    /// Maximum reviews per day.
    pub per_day: i64,
    /// Easy bonus multiplier.
    pub ease4: f64,
    /// Maximum interval in days.
    pub max_ivl: i64,
    /// Interval modifier.
    #[serde(default = "default_one")]
    pub ivl_fct: f64,
    /// Multiplier for "hard" answers.
    #[serde(default = "default_hard_factor")]
    pub hard_factor: f64,
    /// Bury due review siblings when a card of the note is answered.
    #[serde(default = "default_true")]
    pub bury: bool,
    /// Keys this crate does not interpret.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Configuration for lapses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapseConfig {
    /// Relearning steps in minutes.
    pub delays: Vec<f64>,
    /// Minimum interval after a lapse.
    pub min_int: i64,
    /// Interval multiplier applied on a lapse.
    pub mult: f64,
    /// Leech threshold; zero disables leech detection.
    pub leech_fails: i64,
    /// Leech action.
    pub leech_action: LeechAction,
    /// Keys this crate does not interpret.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// How new cards are mixed with reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum NewSpread {
    /// Interleave new cards among reviews.
    #[default]
    Distribute,
    /// Show new cards after reviews.
    Last,
    /// Show new cards before reviews.
    First,
}

impl From<i64> for NewSpread {
    fn from(value: i64) -> Self {
        match value {
            1 => NewSpread::Last,
            2 => NewSpread::First,
            _ => NewSpread::Distribute,
        }
    }
}

impl From<NewSpread> for i64 {
    fn from(value: NewSpread) -> Self {
        match value {
            NewSpread::Distribute => 0,
            NewSpread::Last => 1,
            NewSpread::First => 2,
        }
    }
}

/// Collection-wide configuration (`col.conf`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionConf {
    /// The selected deck.
    #[serde(default = "default_cur_deck")]
    pub cur_deck: DeckId,
    /// New card interleaving.
    #[serde(default)]
    pub new_spread: NewSpread,
    /// Seconds ahead a learning card may be shown early.
    #[serde(default = "default_collapse_time")]
    pub collapse_time: i64,
    /// Next new-card position.
    #[serde(default = "default_next_pos")]
    pub next_pos: i64,
    /// Day index of the last automatic unbury pass.
    #[serde(default)]
    pub last_unburied: i64,
    /// Keys this crate does not interpret.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

fn default_hard_factor() -> f64 {
    1.2
}

fn default_new_order() -> i64 {
    1
}

fn default_max_taken() -> i64 {
    60
}

fn default_preview_again() -> i64 {
    60
}

fn default_preview_hard() -> i64 {
    600
}

fn default_cur_deck() -> DeckId {
    1
}

fn default_collapse_time() -> i64 {
    1200
}

fn default_next_pos() -> i64 {
    1
}

/// Anki stores `dyn` as 0/1; older files use booleans.
mod int_bool {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(i64::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Int(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Bool(b) => b,
            Raw::Int(i) => i != 0,
        })
    }
}
