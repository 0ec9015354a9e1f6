//! Tests for due counts, deck limits, the deck tree, and queue fills.

mod common;

use ankit_sched::{CancelToken, Counts, Fill, Queue, SchedulerVersion};
use common::{DAY, TODAY, add_new_cards, collection, make_review};

#[test]
fn test_counts_by_bucket() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let cards = add_new_cards(&mut col, 1, 5);
    make_review(&mut col, &cards[0], 10, TODAY - 1);
    make_review(&mut col, &cards[1], 10, TODAY);
    make_review(&mut col, &cards[2], 10, TODAY + 1);
    let mut sched = col.sched();

    assert_eq!(
        sched.counts().unwrap(),
        Counts {
            new: 2,
            learn: 0,
            review: 2
        }
    );
}

#[test]
fn test_card_in_play_is_not_counted() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    add_new_cards(&mut col, 1, 3);
    let mut sched = col.sched();
    assert_eq!(sched.counts().unwrap().new, 3);

    let card = sched.get_next_card().unwrap().unwrap();
    assert_eq!(sched.counts().unwrap().new, 2);

    sched.answer(&card, 3).unwrap();
    let counts = sched.counts().unwrap();
    assert_eq!(counts.new, 2);
    assert_eq!(counts.learn, 1);
}

#[test]
fn test_new_limit_caps_counts_and_serving() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let mut conf = col.decks().config(1).unwrap().clone();
    conf.new.per_day = 2;
    col.update_deck_config(conf).unwrap();
    add_new_cards(&mut col, 1, 5);
    let mut sched = col.sched();

    assert_eq!(sched.counts().unwrap().new, 2);
    assert_eq!(sched.new_limit(1).unwrap(), 2);

    let mut served = 0;
    while let Some(card) = sched.get_next_card().unwrap() {
        if card.queue != Queue::New {
            break;
        }
        sched.answer(&card, 4).unwrap();
        served += 1;
    }
    assert_eq!(served, 2);
    assert_eq!(sched.new_limit(1).unwrap(), 0);
}

#[test]
fn test_parent_limit_clamps_child() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let mut strict = col.decks().config(1).unwrap().clone();
    strict.new.per_day = 1;
    let strict = col.add_deck_config(strict).unwrap();
    let parent = col.add_deck_with_config("Spanish", strict).unwrap();
    let child = col.add_deck("Spanish::Verbs").unwrap();
    add_new_cards(&mut col, child, 3);
    col.select_deck(parent).unwrap();
    let mut sched = col.sched();

    assert_eq!(sched.new_limit(child).unwrap(), 1);
    assert_eq!(sched.counts().unwrap().new, 1);

    let tree = sched.deck_due_tree(&CancelToken::new()).unwrap().unwrap();
    let spanish = tree.iter().find(|n| n.name == "Spanish").unwrap();
    assert_eq!(spanish.new, 1);
    assert_eq!(spanish.children.len(), 1);
    assert_eq!(spanish.children[0].name, "Spanish::Verbs");
    assert_eq!(spanish.children[0].new, 1);
}

#[test]
fn test_deck_tree_sums_children() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let verbs = col.add_deck("Spanish::Verbs").unwrap();
    let nouns = col.add_deck("Spanish::Nouns").unwrap();
    add_new_cards(&mut col, verbs, 2);
    let cards = add_new_cards(&mut col, nouns, 3);
    make_review(&mut col, &cards[0], 5, TODAY);
    let mut sched = col.sched();

    let tree = sched.deck_due_tree(&CancelToken::new()).unwrap().unwrap();
    let names: Vec<&str> = tree.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Default", "Spanish"]);
    let spanish = &tree[1];
    assert_eq!(spanish.new, 4);
    assert_eq!(spanish.review, 1);
    assert_eq!(spanish.children[0].name, "Spanish::Nouns");
}

#[test]
fn test_fill_is_idempotent() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let cards = add_new_cards(&mut col, 1, 4);
    make_review(&mut col, &cards[0], 10, TODAY);
    make_review(&mut col, &cards[1], 10, TODAY);
    let mut sched = col.sched();
    let cancel = CancelToken::new();

    assert_eq!(sched.fill(&cancel).unwrap(), Fill::Ready);
    let heads = sched.queue_heads();
    assert!(heads.new.is_some());
    assert!(heads.review.is_some());
    assert_eq!(sched.fill(&cancel).unwrap(), Fill::Ready);
    assert_eq!(sched.queue_heads(), heads);
}

#[test]
fn test_cancelled_work_stops_early() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    add_new_cards(&mut col, 1, 2);
    let mut sched = col.sched();
    let cancel = CancelToken::new();
    cancel.cancel();

    assert_eq!(sched.fill(&cancel).unwrap(), Fill::Incomplete);
    assert!(sched.deck_due_tree(&cancel).unwrap().is_none());
    // a later fill still works
    assert_eq!(sched.fill(&CancelToken::new()).unwrap(), Fill::Ready);
}

#[test]
fn test_empty_collection() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let mut sched = col.sched();
    assert_eq!(sched.fill(&CancelToken::new()).unwrap(), Fill::Empty);
    assert!(sched.get_next_card().unwrap().is_none());
    assert_eq!(sched.counts().unwrap().total(), 0);
}

#[test]
fn test_eta_without_history() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let mut sched = col.sched();
    let counts = Counts {
        new: 3,
        learn: 0,
        review: 2,
    };
    // twenty seconds per card by default
    assert_eq!(sched.eta(counts).unwrap(), 100);
}

#[test]
fn test_discard_restores_counts() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let cards = add_new_cards(&mut col, 1, 4);
    make_review(&mut col, &cards[0], 10, TODAY);
    make_review(&mut col, &cards[1], 10, TODAY);
    let mut sched = col.sched();
    let before = sched.counts().unwrap();

    let card = sched.get_next_card().unwrap().unwrap();
    assert_eq!(card.queue, Queue::Review);
    let in_play = sched.counts().unwrap();
    assert_eq!(in_play.review, before.review - 1);
    assert_eq!(in_play.new, before.new);

    sched.discard_current_card();
    assert_eq!(sched.counts().unwrap(), before);
}

#[test]
fn test_fill_cancelled_between_decks_resumes() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let first_deck = col.add_deck("Lang::A").unwrap();
    let second_deck = col.add_deck("Lang::B").unwrap();
    let first = add_new_cards(&mut col, first_deck, 1).remove(0);
    let second = add_new_cards(&mut col, second_deck, 1).remove(0);
    let parent = col.decks().by_name("Lang").unwrap().id;
    col.select_deck(parent).unwrap();
    let mut sched = col.sched();

    assert_eq!(sched.fill(&CancelToken::new()).unwrap(), Fill::Ready);
    assert_eq!(sched.queue_heads().new, Some(first.id));
    let card = sched.get_next_card().unwrap().unwrap();
    assert_eq!(card.id, first.id);

    // the next fill has to move on to the second deck
    let cancel = CancelToken::new();
    cancel.cancel();
    assert_eq!(sched.fill(&cancel).unwrap(), Fill::Incomplete);
    assert_eq!(sched.queue_heads().new, None);

    assert_eq!(sched.fill(&CancelToken::new()).unwrap(), Fill::Ready);
    assert_eq!(sched.queue_heads().new, Some(second.id));
    assert_eq!(sched.counts().unwrap().new, 1);
}

#[test]
fn test_rollover_resets_daily_counters() {
    let (mut col, clock) = collection(SchedulerVersion::V2);
    let cards = add_new_cards(&mut col, 1, 2);
    let review = make_review(&mut col, &cards[1], 10, TODAY);
    let mut sched = col.sched();
    sched.answer(&cards[0], 3).unwrap();
    sched.answer(&review, 3).unwrap();
    let deck = sched.collection().decks().get(1).unwrap();
    assert_eq!(deck.new_today.count_on(TODAY), 1);
    assert_eq!(deck.rev_today.count_on(TODAY), 1);

    clock.advance(DAY);
    let rollover = sched.check_day().unwrap().unwrap();
    assert_eq!(rollover.today, TODAY + 1);
    assert!(rollover.decks_reset >= 1);
    let deck = sched.collection().decks().get(1).unwrap();
    for counter in [deck.new_today, deck.rev_today, deck.lrn_today, deck.time_today] {
        assert_eq!(counter.day, TODAY + 1);
        assert_eq!(counter.count, 0);
    }
    assert_eq!(sched.new_limit(1).unwrap(), 20);
}
