//! The collection handle and its builder.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::card::{Card, CardId, DeckId, NoteId};
use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::deck::{CollectionConf, Deck, DeckConfig, DeckConfigId, FilterTerm};
use crate::decks::DeckManager;
use crate::error::{Error, Result};
use crate::sched::{Scheduler, SchedulerState, compute_day_cutoff};
use crate::search::{SearchContext, compile};
use crate::storage::Storage;

/// An open collection: storage, decks, settings, and scheduler state.
///
/// # Example
///
/// ```
/// use ankit_sched::{Collection, ManualClock};
///
/// # fn example() -> ankit_sched::Result<()> {
/// let clock = ManualClock::at(1_700_000_000);
/// let mut col = Collection::builder().clock(clock).open()?;
///
/// let deck = col.add_deck("Spanish")?;
/// let note = col.add_note(&["hola", "hello"], &[])?;
/// col.add_card(note, deck)?;
/// col.select_deck(deck)?;
///
/// let counts = col.sched().counts()?;
/// assert_eq!(counts.new, 1);
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub struct Collection {
    pub(crate) storage: Storage,
    pub(crate) decks: DeckManager,
    pub(crate) conf: CollectionConf,
    pub(crate) crt: i64,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: SchedulerConfig,
    pub(crate) state: SchedulerState,
    pub(crate) rng: StdRng,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("crt", &self.crt)
            .field("config", &self.config)
            .field("cur_deck", &self.conf.cur_deck)
            .finish_non_exhaustive()
    }
}

impl Collection {
    /// Create a builder for opening a collection.
    pub fn builder() -> CollectionBuilder {
        CollectionBuilder::new()
    }

    /// Open (or create) a collection file with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().path(path).open()
    }

    /// Open a fresh in-memory collection with default settings.
    pub fn open_in_memory() -> Result<Self> {
        Self::builder().open()
    }

    /// Access the scheduler.
    pub fn sched(&mut self) -> Scheduler<'_> {
        Scheduler { col: self }
    }

    /// The storage backend.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Decks and options groups.
    pub fn decks(&self) -> &DeckManager {
        &self.decks
    }

    /// Collection-wide configuration.
    pub fn conf(&self) -> &CollectionConf {
        &self.conf
    }

    /// Scheduler settings.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Collection creation time (epoch seconds), the origin of day indexes.
    pub fn creation_time(&self) -> i64 {
        self.crt
    }

    /// The current time according to the collection's clock.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// The selected deck and its descendants.
    pub fn active_deck_ids(&self) -> Vec<DeckId> {
        self.decks.self_and_children_ids(self.conf.cur_deck)
    }

    // ========================================================================
    // Cards and notes
    // ========================================================================

    /// Load a card.
    pub fn get_card(&self, id: CardId) -> Result<Card> {
        self.storage.get_card(id)
    }

    /// Overwrite a card's scheduling fields.
    ///
    /// Intended for imports and fixtures; the in-memory queues are rebuilt
    /// on next use.
    pub fn update_card(&mut self, card: &Card) -> Result<()> {
        self.storage.update_card(card)?;
        self.state.invalidate();
        Ok(())
    }

    /// Add a note with the given fields and tags.
    pub fn add_note(&mut self, fields: &[&str], tags: &[&str]) -> Result<NoteId> {
        let id: NoteId = self
            .storage
            .query_scalar("SELECT coalesce(max(id), 0) + 1 FROM notes", [])?;
        self.storage.add_note(id, fields, tags)?;
        Ok(id)
    }

    /// Add a new card for a note at the end of the new queue.
    pub fn add_card(&mut self, note_id: NoteId, deck_id: DeckId) -> Result<Card> {
        if self.decks.get(deck_id)?.filtered {
            return Err(Error::Config(format!(
                "cards cannot be added to filtered deck {deck_id}"
            )));
        }
        let now = self.now();
        let id: CardId = self
            .storage
            .query_scalar("SELECT coalesce(max(id), 0) + 1 FROM cards", [])?;
        let ord: i64 = self
            .storage
            .query_scalar("SELECT count() FROM cards WHERE nid = ?1", [note_id])?;

        let mut conf = self.conf.clone();
        let mut card = Card::new(id, note_id, deck_id, conf.next_pos);
        conf.next_pos += 1;
        card.ord = ord;
        card.mtime = now;
        card.usn = -1;

        self.storage.transact(|s| {
            s.insert_card(&card)?;
            save_conf(s, &conf, now)
        })?;
        self.conf = conf;
        self.state.invalidate();
        Ok(card)
    }

    /// Card IDs matching a search, optionally ordered and limited.
    ///
    /// `order` is an SQL expression over `cards c JOIN notes n`.
    pub fn find_cards(&self, query: &str, order: Option<&str>, limit: Option<u32>) -> Result<Vec<CardId>> {
        let day = compute_day_cutoff(self.crt, self.now());
        let ctx = SearchContext {
            decks: &self.decks,
            today: day.today,
            cutoff: day.cutoff,
        };
        let search = compile(query, &ctx)?;
        self.storage.find_cards(&search, order, limit)
    }

    // ========================================================================
    // Decks
    // ========================================================================

    /// Create a normal deck using the first options group, returning the
    /// existing ID if the name is taken.
    pub fn add_deck(&mut self, name: &str) -> Result<DeckId> {
        let conf = self
            .decks
            .configs()
            .next()
            .map(|c| c.id)
            .ok_or_else(|| Error::Config("collection has no options groups".into()))?;
        self.add_deck_with_config(name, conf)
    }

    /// Create a normal deck using the given options group.
    pub fn add_deck_with_config(&mut self, name: &str, conf: DeckConfigId) -> Result<DeckId> {
        self.update_decks(|decks| decks.add_deck(name, conf))
    }

    /// Create a filtered deck. It starts empty; see
    /// [`Scheduler::rebuild_filtered`].
    pub fn add_filtered_deck(&mut self, name: &str, terms: Vec<FilterTerm>, resched: bool) -> Result<DeckId> {
        let did = self.update_decks(|decks| decks.add_filtered(name, terms, resched))?;
        info!(deck_id = did, name, "created filtered deck");
        Ok(did)
    }

    /// Store a new options group, returning its ID.
    pub fn add_deck_config(&mut self, config: DeckConfig) -> Result<DeckConfigId> {
        self.update_decks(|decks| Ok(decks.add_config(config)))
    }

    /// Replace an existing options group.
    pub fn update_deck_config(&mut self, config: DeckConfig) -> Result<()> {
        self.update_decks(|decks| decks.update_config(config))
    }

    /// Replace an existing deck.
    pub fn update_deck(&mut self, deck: Deck) -> Result<()> {
        self.update_decks(|decks| decks.update_deck(deck))
    }

    /// Select the deck to study. Its descendants become active too.
    pub fn select_deck(&mut self, did: DeckId) -> Result<()> {
        self.decks.get(did)?;
        let mut conf = self.conf.clone();
        conf.cur_deck = did;
        save_conf(&self.storage, &conf, self.now())?;
        self.conf = conf;
        self.state.invalidate();
        debug!(deck_id = did, "selected deck");
        Ok(())
    }

    /// Apply `f` to a copy of the deck store, persist it, then keep it.
    fn update_decks<T>(&mut self, f: impl FnOnce(&mut DeckManager) -> Result<T>) -> Result<T> {
        let mut decks = self.decks.clone();
        let out = f(&mut decks)?;
        save_decks(&self.storage, &decks, self.now())?;
        self.decks = decks;
        self.state.invalidate();
        Ok(out)
    }
}

pub(crate) fn save_decks(storage: &Storage, decks: &DeckManager, mtime: i64) -> Result<()> {
    let (decks, dconf) = decks.to_json()?;
    storage.save_decks(&decks, &dconf, mtime)
}

pub(crate) fn save_conf(storage: &Storage, conf: &CollectionConf, mtime: i64) -> Result<()> {
    storage.save_conf(&serde_json::to_string(conf)?, mtime)
}

/// Builder for opening a [`Collection`].
///
/// # Example
///
/// ```
/// use ankit_sched::{Collection, ManualClock, SchedulerConfig, SchedulerVersion};
///
/// # fn example() -> ankit_sched::Result<()> {
/// let col = Collection::builder()
///     .clock(ManualClock::at(1_700_000_000))
///     .creation_time(1_699_920_000)
///     .config(SchedulerConfig::default().with_version(SchedulerVersion::V1))
///     .seed(7)
///     .open()?;
/// assert_eq!(col.creation_time(), 1_699_920_000);
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct CollectionBuilder {
    path: Option<PathBuf>,
    clock: Option<Arc<dyn Clock>>,
    creation_time: Option<i64>,
    config: SchedulerConfig,
    seed: Option<u64>,
}

impl CollectionBuilder {
    /// Create a builder for an in-memory collection on the system clock.
    pub fn new() -> Self {
        Self {
            path: None,
            clock: None,
            creation_time: None,
            config: SchedulerConfig::default(),
            seed: None,
        }
    }

    /// Use a collection file instead of memory.
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use a custom time source.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Creation time for a new collection.
    ///
    /// Defaults to the most recent UTC midnight. Ignored for existing files.
    pub fn creation_time(mut self, secs: i64) -> Self {
        self.creation_time = Some(secs);
        self
    }

    /// Scheduler settings.
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed the generator used for learning-step jitter and rescheduling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Open the collection, creating it if needed.
    pub fn open(self) -> Result<Collection> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let storage = match &self.path {
            Some(path) => Storage::open(path)?,
            None => Storage::open_in_memory()?,
        };

        let now = clock.now();
        let crt = self
            .creation_time
            .unwrap_or_else(|| now - now.rem_euclid(86_400));
        if storage.initialize(crt, now)? {
            info!(crt, "created collection");
        }

        let row = storage.load_col()?;
        let decks = DeckManager::from_json(&row.decks, &row.dconf)?;
        let conf: CollectionConf = serde_json::from_str(&row.conf)?;
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        debug!(crt = row.crt, version = ?self.config.version, "opened collection");

        Ok(Collection {
            storage,
            decks,
            conf,
            crt: row.crt,
            clock,
            config: self.config,
            state: SchedulerState::default(),
            rng,
        })
    }
}

impl Default for CollectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Queue;
    use crate::clock::ManualClock;

    fn collection() -> Collection {
        Collection::builder()
            .clock(ManualClock::at(1_000_000))
            .creation_time(0)
            .seed(1)
            .open()
            .unwrap()
    }

    #[test]
    fn test_default_creation_time_is_midnight() {
        let col = Collection::builder()
            .clock(ManualClock::at(86_400 * 3 + 500))
            .open()
            .unwrap();
        assert_eq!(col.creation_time(), 86_400 * 3);
    }

    #[test]
    fn test_add_card_takes_next_position() {
        let mut col = collection();
        let note = col.add_note(&["a", "b"], &[]).unwrap();
        let first = col.add_card(note, 1).unwrap();
        let second = col.add_card(note, 1).unwrap();

        assert_eq!(first.due, 1);
        assert_eq!(second.due, 2);
        assert_eq!(second.ord, 1);
        assert_eq!(col.conf().next_pos, 3);
        assert_eq!(col.get_card(second.id).unwrap().queue, Queue::New);
    }

    #[test]
    fn test_cards_cannot_go_into_filtered_decks() {
        let mut col = collection();
        let did = col.add_filtered_deck("Cram", vec![], true).unwrap();
        let note = col.add_note(&["a"], &[]).unwrap();
        assert!(matches!(col.add_card(note, did), Err(Error::Config(_))));
    }

    #[test]
    fn test_decks_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collection.anki2");
        {
            let mut col = Collection::builder()
                .path(&path)
                .clock(ManualClock::at(1_000_000))
                .open()
                .unwrap();
            let did = col.add_deck("Spanish::Verbs").unwrap();
            col.select_deck(did).unwrap();
        }
        let col = Collection::builder()
            .path(&path)
            .clock(ManualClock::at(2_000_000))
            .open()
            .unwrap();
        let verbs = col.decks().by_name("spanish::verbs").unwrap();
        assert_eq!(col.conf().cur_deck, verbs.id);
        assert!(col.decks().by_name("Spanish").is_some());
    }

    #[test]
    fn test_find_cards() {
        let mut col = collection();
        let did = col.add_deck("Spanish").unwrap();
        let note = col.add_note(&["hola"], &["greeting"]).unwrap();
        let card = col.add_card(note, did).unwrap();
        let other = col.add_note(&["adios"], &[]).unwrap();
        col.add_card(other, 1).unwrap();

        assert_eq!(col.find_cards("deck:Spanish", None, None).unwrap(), vec![card.id]);
        assert_eq!(col.find_cards("tag:greeting is:new", None, None).unwrap(), vec![card.id]);
        assert_eq!(col.find_cards("", Some("c.id"), Some(1)).unwrap(), vec![card.id]);
    }
}
