//! Property tests for normalization, extraction and local classification

use async_trait::async_trait;
use fitvoice::core::error::Result;
use fitvoice::core::types::{EntityKind, Unit};
use fitvoice::llm::context::ClassifierContext;
use fitvoice::llm::fallback;
use fitvoice::llm::{IntentClassifier, ReasoningBackend};
use fitvoice::nlp::numbers::parse_word_window;
use fitvoice::nlp::{EntityExtractor, ExerciseCatalog, ExtractionHints, TranscriptNormalizer};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn pipeline() -> (TranscriptNormalizer, EntityExtractor, Arc<ExerciseCatalog>) {
    let catalog = Arc::new(ExerciseCatalog::builtin());
    (
        TranscriptNormalizer::new(catalog.clone()),
        EntityExtractor::new(catalog.clone(), 0.7, 0.2),
        catalog,
    )
}

/// Every (spelling, exercise id, display name) the catalog knows
fn alias_spellings() -> Vec<(String, String, String)> {
    let catalog = ExerciseCatalog::builtin();
    catalog
        .iter()
        .flat_map(|def| {
            std::iter::once(def.name.clone())
                .chain(def.aliases.iter().cloned())
                .map(move |alias| (alias, def.id.clone(), def.name.clone()))
        })
        .collect()
}

/// Backend that always answers with the same text
struct ScriptedBackend {
    reply: String,
}

#[async_trait]
impl ReasoningBackend for ScriptedBackend {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        Ok(self.reply.clone())
    }
}

/// JSON tokens a misbehaving backend might put in a numeric field
fn numeric_token() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<f64>().prop_filter("finite", |v| v.is_finite()).prop_map(|v| v.to_string()),
        prop::sample::select(vec!["-5.0", "7.3", "NaN", "1e300", "-1e300", "null", "0"]).prop_map(String::from),
    ]
}

const UNITS: [&str; 20] = [
    "", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
    "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen", "nineteen",
];
const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];

proptest! {
    #[test]
    fn confidences_stay_in_unit_interval(text in "[a-z0-9 @.]{0,40}") {
        let (normalizer, extractor, _) = pipeline();
        let normalized = normalizer.normalize(&text);
        let extraction = extractor.extract(&normalized, &ExtractionHints::default());
        for entity in &extraction.entities {
            prop_assert!((0.0..=1.0).contains(&entity.confidence));
        }

        let result = fallback::classify(&normalized, &extraction, &ClassifierContext::default());
        prop_assert!((0.0..=1.0).contains(&result.confidence));
        for alternative in &result.alternatives {
            prop_assert!((0.0..=1.0).contains(&alternative.confidence));
        }
    }

    #[test]
    fn every_alias_spelling_yields_the_same_entities(
        (alias, id, name) in prop::sample::select(alias_spellings()),
        upper in proptest::collection::vec(any::<bool>(), 32),
        apostrophes in proptest::collection::vec(any::<bool>(), 32),
        separators in proptest::collection::vec(prop::sample::select(vec![" ", "-", "_", ", ", " - "]), 4),
        trailing in prop::sample::select(vec!["", ".", "!", "?", ","]),
    ) {
        let (normalizer, extractor, _) = pipeline();

        let mut noisy = String::new();
        for (w, word) in alias.split(' ').enumerate() {
            if w > 0 {
                noisy.push_str(separators[(w - 1) % separators.len()]);
            }
            for (i, c) in word.chars().enumerate() {
                if i > 0 && apostrophes[(i + w) % apostrophes.len()] {
                    noisy.push('\'');
                }
                noisy.push(if upper[i % upper.len()] { c.to_ascii_uppercase() } else { c });
            }
        }
        noisy.push_str(trailing);

        let normalized = normalizer.normalize(&noisy);
        prop_assert_eq!(&normalized, &name);

        let from_alias = extractor.extract(&normalized, &ExtractionHints::default());
        let from_name = extractor.extract(&normalizer.normalize(&name), &ExtractionHints::default());
        prop_assert_eq!(from_alias.exercise_id(), Some(id.as_str()));
        prop_assert_eq!(from_alias, from_name);
    }

    #[test]
    fn backend_confidences_are_clamped(
        label in prop::sample::select(vec!["log_exercise", "quick_log", "ask_ai", "nutrition", "not_a_label"]),
        confidence in numeric_token(),
        alternative in numeric_token(),
        reps in numeric_token(),
        weight in numeric_token(),
        text in "[a-z0-9 ]{0,30}",
    ) {
        let (normalizer, extractor, catalog) = pipeline();
        let reply = format!(
            r#"{{"intent": "{}", "confidence": {}, "exercise": "bench press", "reps": {}, "weight": {}, "unit": "kg", "alternatives": [{{"intent": "help", "confidence": {}}}]}}"#,
            label, confidence, reps, weight, alternative
        );
        let backend: Arc<dyn ReasoningBackend> = Arc::new(ScriptedBackend { reply });
        let classifier = IntentClassifier::new(Some(backend), Duration::from_secs(1), catalog, 0.7);

        let normalized = normalizer.normalize(&text);
        let extraction = extractor.extract(&normalized, &ExtractionHints::default());
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let result = runtime.block_on(classifier.classify(
            &normalized,
            &extraction,
            &ClassifierContext::default(),
            &CancellationToken::new(),
        ));

        prop_assert!((0.0..=1.0).contains(&result.confidence));
        for alternative in &result.alternatives {
            prop_assert!((0.0..=1.0).contains(&alternative.confidence));
        }
        for entity in &result.entities {
            prop_assert!((0.0..=1.0).contains(&entity.confidence));
        }
    }

    #[test]
    fn spoken_hundreds_compose(hundreds in 1usize..10, tens in 2usize..10, ones in 1usize..10) {
        let words = [UNITS[hundreds], TENS[tens], UNITS[ones]];
        let expected = (hundreds * 100 + tens * 10 + ones) as u32;
        prop_assert_eq!(parse_word_window(&words), Some(expected));
    }

    #[test]
    fn number_after_marker_is_weight(reps in 1u32..30, weight in 40u32..500) {
        let (normalizer, extractor, _) = pipeline();
        let normalized = normalizer.normalize(&format!("bench press {} at {}", reps, weight));
        let extraction = extractor.extract(&normalized, &ExtractionHints::default());

        prop_assert_eq!(extraction.reps(), Some(reps));
        prop_assert_eq!(extraction.weight(), Some(f64::from(weight)));
    }

    #[test]
    fn number_before_unit_is_weight(weight in 1u32..500) {
        let (normalizer, extractor, _) = pipeline();
        let normalized = normalizer.normalize(&format!("{} pounds", weight));
        let extraction = extractor.extract(&normalized, &ExtractionHints::default());

        prop_assert_eq!(extraction.weight(), Some(f64::from(weight)));
        prop_assert_eq!(extraction.weight_unit(), Some(Unit::Lbs));
        prop_assert!(!extraction.has(EntityKind::Reps));
    }
}

#[test]
fn test_word_numbers() {
    let (normalizer, extractor, _) = pipeline();
    let cases = [("eight", EntityKind::Reps, 8.0), ("two twenty five", EntityKind::Weight, 225.0)];
    for (text, kind, value) in cases {
        let extraction = extractor.extract(&normalizer.normalize(text), &ExtractionHints::default());
        let entity = extraction.first(kind).unwrap();
        assert_eq!(entity.as_number(), Some(value), "{}", text);
    }
}

#[test]
fn test_fuzzy_match_respects_threshold() {
    let (normalizer, extractor, _) = pipeline();
    let extraction = extractor.extract(&normalizer.normalize("did squatt 5 reps"), &ExtractionHints::default());
    assert_eq!(extraction.exercise_id(), Some("squat"));

    let extraction = extractor.extract(&normalizer.normalize("sat 5 reps"), &ExtractionHints::default());
    assert!(!extraction.has(EntityKind::Exercise));
}
