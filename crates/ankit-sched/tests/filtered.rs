//! Tests for filtered-deck rebuild, empty, and answering inside them.

mod common;

use ankit_sched::{
    CardType, Error, FilterOrder, FilterTerm, Queue, ReviewPopOrder, RevlogKind, SchedulerConfig,
    SchedulerVersion, SearchBuilder,
};
use common::{START, TODAY, add_new_cards, collection, collection_with, make_review};

fn default_deck_term() -> Vec<FilterTerm> {
    vec![FilterTerm::new("deck:Default", 100, FilterOrder::Due)]
}

#[test]
fn test_rebuild_then_empty_restores_cards() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let cards = add_new_cards(&mut col, 1, 4);
    make_review(&mut col, &cards[0], 10, TODAY - 5);
    make_review(&mut col, &cards[1], 10, TODAY - 2);
    make_review(&mut col, &cards[2], 10, TODAY + 20);
    let before: Vec<_> = cards.iter().map(|c| col.get_card(c.id).unwrap()).collect();
    let did = col.add_filtered_deck("Cram", default_deck_term(), true).unwrap();
    let mut sched = col.sched();

    assert_eq!(sched.rebuild_filtered(did).unwrap(), 4);
    assert_eq!(sched.collection().conf().cur_deck, did);
    for card in &before {
        let moved = sched.collection().get_card(card.id).unwrap();
        assert_eq!(moved.deck_id, did);
        assert_eq!(moved.original_deck_id, Some(1));
        assert_eq!(moved.original_due, Some(card.due));
        assert!(moved.due < 0);
    }

    assert_eq!(sched.empty_filtered(did).unwrap(), 4);
    for card in &before {
        let restored = sched.collection().get_card(card.id).unwrap();
        assert_eq!(restored.deck_id, card.deck_id);
        assert_eq!(restored.due, card.due);
        assert_eq!(restored.queue, card.queue);
        assert_eq!(restored.ctype, card.ctype);
        assert!(!restored.is_filtered());
    }
}

#[test]
fn test_rebuild_skips_suspended_and_learning_cards() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let cards = add_new_cards(&mut col, 1, 3);
    let mut learning = cards[1].clone();
    learning.ctype = CardType::Learn;
    learning.queue = Queue::Learn;
    learning.due = START + 60;
    col.update_card(&learning).unwrap();
    let did = col.add_filtered_deck("Cram", default_deck_term(), true).unwrap();
    let mut sched = col.sched();
    sched.suspend_cards(&[cards[2].id]).unwrap();

    assert_eq!(sched.rebuild_filtered(did).unwrap(), 1);
    assert_eq!(sched.collection().get_card(cards[0].id).unwrap().deck_id, did);
    assert_eq!(sched.collection().get_card(cards[1].id).unwrap().deck_id, 1);
}

#[test]
fn test_rebuild_normal_deck_fails() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let mut sched = col.sched();
    assert!(matches!(sched.rebuild_filtered(1), Err(Error::NotFiltered(1))));
    assert!(matches!(sched.empty_filtered(1), Err(Error::NotFiltered(1))));
}

#[test]
fn test_v2_early_review_returns_card_home() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let card = add_new_cards(&mut col, 1, 1).remove(0);
    make_review(&mut col, &card, 20, TODAY + 10);
    let did = col.add_filtered_deck("Ahead", default_deck_term(), true).unwrap();
    let mut sched = col.sched();
    sched.rebuild_filtered(did).unwrap();

    let card = sched.get_next_card().unwrap().unwrap();
    assert_eq!(card.queue, Queue::Review);
    let outcome = sched.answer(&card, 3).unwrap();
    assert_eq!(outcome.log.kind, RevlogKind::Cram);
    assert_eq!(outcome.card.deck_id, 1);
    assert!(!outcome.card.is_filtered());
    assert!(outcome.card.interval >= 20);
    assert_eq!(outcome.card.due, TODAY + outcome.card.interval);
}

#[test]
fn test_v2_preview_does_not_reschedule() {
    let (mut col, clock) = collection(SchedulerVersion::V2);
    let card = add_new_cards(&mut col, 1, 1).remove(0);
    let did = col.add_filtered_deck("Preview", default_deck_term(), false).unwrap();
    let mut sched = col.sched();
    sched.rebuild_filtered(did).unwrap();

    let shown = sched.get_next_card().unwrap().unwrap();
    assert_eq!(shown.queue, Queue::Review);
    assert_eq!(sched.next_interval(&shown, 1).unwrap(), 60);
    let again = sched.answer(&shown, 1).unwrap();
    assert_eq!(again.card.queue, Queue::Learn);
    assert_eq!(again.card.due, START + 60);
    assert_eq!(again.card.deck_id, did);
    assert_eq!(again.log.kind, RevlogKind::Cram);

    clock.advance(120);
    let shown = sched.get_next_card().unwrap().unwrap();
    let done = sched.answer(&shown, 4).unwrap();
    assert_eq!(done.card.deck_id, 1);
    assert_eq!(done.card.queue, Queue::New);
    assert_eq!(done.card.ctype, CardType::New);
    assert_eq!(done.card.due, card.due);
}

#[test]
fn test_v1_cramming_review_card() {
    let (mut col, _clock) = collection(SchedulerVersion::V1);
    let card = add_new_cards(&mut col, 1, 1).remove(0);
    make_review(&mut col, &card, 20, TODAY + 20);
    let did = col.add_filtered_deck("Cram", default_deck_term(), true).unwrap();
    let mut sched = col.sched();
    sched.rebuild_filtered(did).unwrap();

    // not yet due, so it is crammed from the new queue
    let shown = sched.get_next_card().unwrap().unwrap();
    assert_eq!(shown.queue, Queue::New);
    assert_eq!(sched.answer_buttons(&shown).unwrap(), 2);

    let outcome = sched.answer(&shown, 2).unwrap();
    assert_eq!(outcome.card.deck_id, 1);
    assert_eq!(outcome.card.queue, Queue::Review);
    assert_eq!(outcome.card.interval, 20);
    assert_eq!(outcome.card.due, TODAY + 20);
}

#[test]
fn test_pop_order_in_filtered_deck() {
    for (order, expected) in [(ReviewPopOrder::HeadFirst, 0), (ReviewPopOrder::TailFirst, 2)] {
        let config = SchedulerConfig {
            review_pop_order: order,
            ..SchedulerConfig::default()
        };
        let (mut col, _clock) = collection_with(config);
        let cards = add_new_cards(&mut col, 1, 3);
        for (i, card) in cards.iter().enumerate() {
            make_review(&mut col, card, 10, TODAY - 3 + i as i64);
        }
        let did = col
            .add_filtered_deck("Due", vec![FilterTerm::new("is:due", 10, FilterOrder::Due)], true)
            .unwrap();
        let mut sched = col.sched();
        sched.rebuild_filtered(did).unwrap();

        let first = sched.get_next_card().unwrap().unwrap();
        assert_eq!(first.id, cards[expected].id, "{order:?}");
    }
}

#[test]
fn test_rebuild_with_built_search_terms() {
    let (mut col, _clock) = collection(SchedulerVersion::V2);
    let cards = add_new_cards(&mut col, 1, 4);
    make_review(&mut col, &cards[1], 10, TODAY + 3);
    make_review(&mut col, &cards[2], 30, TODAY + 3);
    let mut struggling = make_review(&mut col, &cards[3], 5, TODAY + 3);
    struggling.lapses = 4;
    col.update_card(&struggling).unwrap();

    let mature = SearchBuilder::new().deck("Default").is_review().interval_gt(20).build();
    let lapsed = SearchBuilder::new().deck("Default").lapses_gte(3).build();
    let fresh = SearchBuilder::new().deck("Default").is_new().build();
    assert_eq!(mature, "deck:Default is:review prop:ivl>20");
    let terms = vec![
        FilterTerm::new(&mature, 10, FilterOrder::Due),
        FilterTerm::new(&lapsed, 10, FilterOrder::Due),
        FilterTerm::new(&fresh, 10, FilterOrder::Due),
    ];
    let did = col.add_filtered_deck("Mixed", terms, true).unwrap();
    let mut sched = col.sched();

    assert_eq!(sched.rebuild_filtered(did).unwrap(), 3);
    let deck_of = |i: usize| sched.collection().get_card(cards[i].id).unwrap().deck_id;
    assert_eq!(deck_of(0), did);
    assert_eq!(deck_of(1), 1);
    assert_eq!(deck_of(2), did);
    assert_eq!(deck_of(3), did);
}
