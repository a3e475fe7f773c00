//! Tests for the merge primitives.

use super::*;

#[derive(Debug, Default, Clone, PartialEq)]
struct Slot {
    index: Option<usize>,
    name: Option<String>,
    text: DeltaText,
}

impl Slot {
    fn at(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Default::default()
        }
    }

    fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    fn delta(mut self, fragment: &str) -> Self {
        self.text = DeltaText::from_delta(fragment.to_string());
        self
    }

    fn done(mut self, value: &str) -> Self {
        self.text = DeltaText::from_settled(value.to_string());
        self
    }

    fn text(&self) -> Option<&str> {
        self.text.value().map(String::as_str)
    }
}

impl Indexed for Slot {
    fn index(&self) -> Option<usize> {
        self.index
    }
}

impl Merge for Slot {
    fn merge(&mut self, incoming: Self) {
        set_once(&mut self.name, incoming.name);
        self.text.merge(incoming.text);
    }
}

#[test]
fn test_delta_concatenation_preserves_order() {
    let fragments = ["The ", "quick ", "brown ", "fox"];
    let mut text = DeltaText::new();
    for f in fragments {
        text.push(&f.to_string());
    }
    assert_eq!(text.value().map(String::as_str), Some("The quick brown fox"));
    assert!(!text.is_settled());
}

#[test]
fn test_final_value_replaces_accumulation() {
    let mut text = DeltaText::new();
    text.push(&"Hel".to_string());
    text.push(&"lo".to_string());
    text.settle("Hello world".to_string());

    assert_eq!(text.value().map(String::as_str), Some("Hello world"));
    assert!(text.is_settled());
}

#[test]
fn test_reset_clears_buffer() {
    let mut text = DeltaText::from_delta("partial".to_string());
    text.reset();
    assert!(text.is_empty());
    assert_eq!(text.value(), None);

    text.push(&"fresh".to_string());
    assert_eq!(text.value().map(String::as_str), Some("fresh"));
}

#[test]
fn test_set_once_first_write_wins() {
    let mut name = None;
    assert!(set_once(&mut name, Some("foo".to_string())));
    assert!(!set_once(&mut name, Some("bar".to_string())));
    assert_eq!(name.as_deref(), Some("foo"));
}

#[test]
fn test_set_once_blank_does_not_count() {
    let mut name = Some(String::new());
    assert!(!set_once(&mut name, Some(String::new())));
    assert!(!set_once(&mut name, None));
    assert!(set_once(&mut name, Some("late".to_string())));
    assert_eq!(name.as_deref(), Some("late"));
}

#[test]
fn test_merge_at_new_index_extends_collection() {
    let mut items = vec![Slot::at(0), Slot::at(1)];
    let outcome = merge_at(&mut items, Some(Slot::at(2).delta("x")));
    assert_eq!(outcome, MergeOutcome::Inserted(2));
    assert_eq!(items.len(), 3);
    assert_eq!(items[2].text(), Some("x"));
}

#[test]
fn test_merge_at_existing_index_keeps_length() {
    let mut items = vec![Slot::at(0).delta("a"), Slot::at(1), Slot::at(2)];
    let outcome = merge_at(&mut items, Some(Slot::at(0).delta("b")));
    assert_eq!(outcome, MergeOutcome::Merged(0));
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].text(), Some("ab"));
}

#[test]
fn test_merge_at_without_index_appends() {
    let mut items = vec![Slot::at(0)];
    let outcome = merge_at(&mut items, Some(Slot::default().named("tail")));
    assert_eq!(outcome, MergeOutcome::Appended(1));
    assert_eq!(items[1].name.as_deref(), Some("tail"));
}

#[test]
fn test_merge_at_none_is_noop() {
    let mut items = vec![Slot::at(0)];
    assert_eq!(merge_at(&mut items, None), MergeOutcome::Skipped);
    assert_eq!(items.len(), 1);
}

#[test]
fn test_merge_at_gap_pads_with_placeholders() {
    let mut items = vec![Slot::at(0)];
    let outcome = merge_at(&mut items, Some(Slot::at(3).delta("late")));
    assert_eq!(outcome, MergeOutcome::Padded { index: 3, gap: 2 });
    assert!(outcome.is_gap());
    assert_eq!(items.len(), 4);
    assert_eq!(items[1], Slot::default());
    assert_eq!(items[3].text(), Some("late"));
}

#[test]
fn test_merge_at_identity_and_text_together() {
    let mut calls = Vec::new();
    merge_at(&mut calls, Some(Slot::at(0).named("foo").delta("{\"x\":")));
    merge_at(&mut calls, Some(Slot::at(0).named("bar").delta("1}")));
    merge_at(&mut calls, Some(Slot::at(0).done("{\"x\":1}")));

    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name.as_deref(), Some("foo"));
    assert_eq!(calls[0].text(), Some("{\"x\":1}"));
    assert!(calls[0].text.is_settled());
}

#[test]
fn test_insert_at_shifts_later_elements() {
    let mut items = vec![Slot::at(0).named("a"), Slot::at(1).named("c")];
    let outcome = insert_at(&mut items, 1, Slot::at(1).named("b"));
    assert_eq!(outcome, MergeOutcome::Inserted(1));
    let names: Vec<_> = items.iter().filter_map(|s| s.name.as_deref()).collect();
    assert_eq!(names, ["a", "b", "c"]);
}

#[test]
fn test_insert_at_past_end_pads() {
    let mut items: Vec<Slot> = Vec::new();
    let outcome = insert_at(&mut items, 2, Slot::at(2).named("z"));
    assert_eq!(outcome, MergeOutcome::Padded { index: 2, gap: 2 });
    assert_eq!(items.len(), 3);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Error,
    Transcript,
    Audio,
    Response,
}

static ROUTES: &[Route<Family>] = &[
    Route::exact("error", Family::Error),
    Route::prefix("response.audio_transcript", Family::Transcript),
    Route::prefix("response.audio", Family::Audio),
    Route::prefix("response.", Family::Response),
];

#[test]
fn test_router_prefix_order() {
    let router = Router::new(ROUTES);
    assert_eq!(router.classify("error"), Some(Family::Error));
    assert_eq!(
        router.classify("response.audio_transcript.delta"),
        Some(Family::Transcript)
    );
    assert_eq!(
        router.classify("response.audio_transcript.done"),
        Some(Family::Transcript)
    );
    assert_eq!(router.classify("response.audio.delta"), Some(Family::Audio));
    assert_eq!(router.classify("response.created"), Some(Family::Response));
    assert_eq!(router.classify("totally.unknown.kind"), None);
    assert!(router.validate().is_ok());
}

#[test]
fn test_router_exact_wins_over_prefix() {
    static TABLE: &[Route<Family>] = &[
        Route::prefix("response.", Family::Response),
        Route::exact("response.audio.done", Family::Audio),
    ];
    let router = Router::new(TABLE);
    assert_eq!(router.classify("response.audio.done"), Some(Family::Audio));
    assert_eq!(router.classify("response.audio.delta"), Some(Family::Response));
}

#[test]
fn test_router_detects_shadowed_prefix() {
    static TABLE: &[Route<Family>] = &[
        Route::prefix("response.audio", Family::Audio),
        Route::prefix("response.audio_transcript", Family::Transcript),
    ];
    let err = Router::new(TABLE).validate().unwrap_err();
    assert_eq!(
        err,
        RouteTableError::Shadowed {
            earlier: "response.audio",
            later: "response.audio_transcript",
        }
    );
}

#[test]
fn test_action_suffix() {
    assert_eq!(action("response.text.delta"), "delta");
    assert_eq!(action("conversation.item.input_audio_transcription.completed"), "completed");
    assert_eq!(action("error"), "error");
}
