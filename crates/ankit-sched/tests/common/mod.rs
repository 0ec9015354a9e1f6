//! Common test utilities for scheduler tests.

use ankit_sched::{
    Card, CardType, Collection, DeckId, ManualClock, Queue, SchedulerConfig, SchedulerVersion,
};

/// Seconds in a day.
pub const DAY: i64 = 86_400;

/// Day index the tests start on.
pub const TODAY: i64 = 100;

/// One hour into [`TODAY`], with the collection created at epoch zero.
pub const START: i64 = TODAY * DAY + 3_600;

/// Open an in-memory collection on a manual clock the test keeps a handle to.
pub fn collection(version: SchedulerVersion) -> (Collection, ManualClock) {
    collection_with(SchedulerConfig::default().with_version(version))
}

/// Like [`collection`], with custom settings.
pub fn collection_with(config: SchedulerConfig) -> (Collection, ManualClock) {
    let clock = ManualClock::at(START);
    let col = Collection::builder()
        .clock(clock.clone())
        .creation_time(0)
        .config(config)
        .seed(7)
        .open()
        .unwrap();
    (col, clock)
}

/// Add `n` new cards to a deck, each on its own note.
pub fn add_new_cards(col: &mut Collection, did: DeckId, n: usize) -> Vec<Card> {
    (0..n)
        .map(|i| {
            let front = format!("front {i}");
            let note = col.add_note(&[front.as_str(), "back"], &[]).unwrap();
            col.add_card(note, did).unwrap()
        })
        .collect()
}

/// Turn a card into a review card due on `due`.
pub fn make_review(col: &mut Collection, card: &Card, interval: i64, due: i64) -> Card {
    let mut card = card.clone();
    card.ctype = CardType::Review;
    card.queue = Queue::Review;
    card.interval = interval;
    card.due = due;
    card.factor = 2500;
    card.reps = 5;
    col.update_card(&card).unwrap();
    card
}

/// Number of rows in the review log.
pub fn revlog_count(col: &Collection) -> i64 {
    col.storage()
        .query_scalar("SELECT count() FROM revlog", [])
        .unwrap()
}
