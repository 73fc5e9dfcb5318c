use std::collections::BTreeSet;
use std::sync::Arc;

use parley_core::scoring::AlignedWord;
use parley_core::{
    align, score, AlignThresholds, Completion, Exchange, LevelingPolicy, LevelingState, Outcome,
    ParleyError, ProgressionConfig, Script, Session, Tier, WordTag,
};

fn script(lines: &[(&str, &str)]) -> Arc<Script> {
    let exchanges = lines
        .iter()
        .map(|(prompt, expected)| Exchange::new(*prompt, *expected))
        .collect();
    Arc::new(Script::new("practice", Tier::Easy, exchanges).expect("valid script"))
}

#[test]
fn identical_text_scores_full_marks() {
    for text in ["hello", "I like pizza", "Yes, it's 1776!", "ÇA VA"] {
        assert_eq!(score(text, text), Some(100), "{text}");
        assert_eq!(score(&text.to_uppercase(), text), Some(100), "{text}");
    }
}

#[test]
fn scores_stay_in_range() {
    let pairs = [
        ("a", "completely different sentence"),
        ("completely different sentence", "a"),
        ("same", "same"),
        ("I like pizza", "I liked pizzas"),
    ];
    for (a, b) in pairs {
        let s = score(a, b).expect("non-empty inputs");
        assert!(s <= 100, "{a} / {b} → {s}");
    }
}

#[test]
fn aligning_text_with_itself_is_all_correct() {
    let text = "Most people spoke some English";
    let alignment = align(text, text, &AlignThresholds::default());
    assert!(alignment.missing().is_empty());
    assert!(alignment.extra().is_empty());
    assert_eq!(alignment.correct_count(), 5);
    assert!(alignment.pairs().all(|(_, _, tag)| tag == WordTag::Correct));
    assert_eq!(alignment.summary(), "5/5 correct");
}

#[test]
fn scenario_a_advance_then_retry() {
    let mut session = Session::new(
        script(&[("What do you like?", "I like pizza"), ("Me too!", "Me too")]),
        ProgressionConfig::default(),
    );

    match session.submit("I like pizza").expect("submit") {
        Outcome::Advanced { turn, next } => {
            assert_eq!(turn.score, 100);
            assert_eq!(next.expected_response, "Me too");
        }
        other => panic!("expected advance, got {other:?}"),
    }
    assert_eq!(session.index(), 1);

    match session.submit("xyz").expect("submit") {
        Outcome::Retry { turn, prompt } => {
            assert!(turn.score < 70);
            assert_eq!(prompt.expected_response, "Me too");
        }
        other => panic!("expected retry, got {other:?}"),
    }
    assert_eq!(session.index(), 1);
    assert!(!session.is_completed());
}

#[test]
fn scenario_b_single_exchange_completes_then_rejects() {
    let mut session = Session::new(script(&[("Hi!", "Hello there")]), ProgressionConfig::default());

    let outcome = session.submit("hello there").expect("submit");
    assert!(matches!(outcome, Outcome::Completed { .. }));
    assert_eq!(session.index(), 1);
    assert_eq!(session.completion(), Some(Completion::Finished));

    let err = session.submit("hello there").unwrap_err();
    assert!(matches!(err, ParleyError::TerminalState));
    assert_eq!(session.index(), 1);
}

#[test]
fn scenario_c_word_alignment() {
    let alignment = align("the cat sat", "the cat sit", &AlignThresholds::default());
    let pairs: Vec<_> = alignment.pairs().collect();
    assert_eq!(pairs.len(), 3);
    assert_eq!(pairs[0], ("the", "the", WordTag::Correct));
    assert_eq!(pairs[1], ("cat", "cat", WordTag::Correct));
    assert_eq!((pairs[2].0, pairs[2].1), ("sat", "sit"));
    assert!(matches!(pairs[2].2, WordTag::Close | WordTag::Incorrect));
    assert_eq!(alignment.correct_count(), 2);
    assert_eq!(alignment.summary(), "2/3 correct");
}

#[test]
fn unequal_replace_spans_spill_into_missing_and_extra() {
    let alignment = align(
        "we grilled burger",
        "we grilled hamburgers and hot dogs",
        &AlignThresholds::default(),
    );
    assert_eq!(alignment.expected_words, 6);
    assert_eq!(alignment.candidate_words, 3);
    assert!(alignment
        .words
        .iter()
        .any(|w| matches!(w, AlignedWord::Missing { .. })));
    assert_eq!(alignment.correct_count(), 2);
}

#[test]
fn scenario_d_leveling_thresholds() {
    let policy = LevelingPolicy::with_thresholds(2, 5);
    assert_eq!(policy.available_tiers(1), BTreeSet::from([Tier::Easy]));
    assert_eq!(
        policy.available_tiers(2),
        BTreeSet::from([Tier::Easy, Tier::Medium])
    );

    let mut state = LevelingState {
        completed_count: 1,
        tier: Tier::Easy,
    };
    assert_eq!(state.record_completion(&policy), Some(Tier::Medium));
    assert_eq!(state.available_tiers(&policy).len(), 2);
}

#[test]
fn index_is_monotonic_and_completion_sticks() {
    let lines = [
        ("Q1", "I went to see fireworks"),
        ("Q2", "We grilled hamburgers"),
        ("Q3", "I hope so"),
    ];
    let mut session = Session::new(script(&lines), ProgressionConfig::default());
    let attempts = [
        "nope",
        "",
        "I went to see fireworks",
        "we grilled hamburger",
        "completely wrong",
        "  ",
        "i hope so",
        "i hope so",
        "anything",
    ];

    let mut last_index = session.index();
    let mut was_completed = false;
    for attempt in attempts {
        let before = session.index();
        match session.submit(attempt) {
            Ok(_) => {}
            Err(ParleyError::EmptyInput) => assert_eq!(session.index(), before),
            Err(ParleyError::TerminalState) => assert!(was_completed),
            Err(other) => panic!("unexpected error {other}"),
        }
        assert!(session.index() >= last_index);
        if was_completed {
            assert!(session.is_completed());
        }
        last_index = session.index();
        was_completed = session.is_completed();
    }

    assert!(session.is_completed());
    assert_eq!(session.index(), lines.len());
    assert!(session.current_prompt().is_none());
}
