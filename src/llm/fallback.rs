//! Local keyword classification
//!
//! Used whenever the reasoning backend is missing, slow, or unparsable.
//! Rules are checked in order; the first match is the answer and later
//! matches become alternatives. Never fails.

use crate::core::types::EntityKind;
use crate::llm::context::ClassifierContext;
use crate::llm::intent::{ClassificationSource, IntentAlternative, IntentLabel, IntentResult};
use crate::nlp::extractor::Extraction;

/// Confidence when nothing matched
pub const UNKNOWN_CONFIDENCE: f32 = 0.1;

struct Utterance<'a> {
    text: String,
    tokens: Vec<&'a str>,
    extraction: &'a Extraction,
    context: &'a ClassifierContext,
}

impl<'a> Utterance<'a> {
    fn new(normalized: &'a str, extraction: &'a Extraction, context: &'a ClassifierContext) -> Self {
        Self {
            text: format!(" {} ", normalized),
            tokens: normalized.split_whitespace().collect(),
            extraction,
            context,
        }
    }

    fn any(&self, words: &[&str]) -> bool {
        self.tokens.iter().any(|t| words.contains(t))
    }

    fn phrase(&self, phrases: &[&str]) -> bool {
        phrases.iter().any(|p| self.text.contains(&format!(" {} ", p)))
    }

    fn has(&self, kind: EntityKind) -> bool {
        self.extraction.has(kind)
    }

    fn has_amount(&self) -> bool {
        self.has(EntityKind::Reps) || self.has(EntityKind::Weight)
    }
}

struct Rule {
    label: IntentLabel,
    confidence: f32,
    reason: &'static str,
    matches: fn(&Utterance<'_>) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        label: IntentLabel::RestTimer,
        confidence: 0.6,
        reason: "rest timer phrasing",
        matches: |u| {
            u.any(&["timer"])
                || u.phrase(&["take a break", "take a rest"])
                || (u.any(&["rest", "resting"])
                    && (u.has(EntityKind::Rest) || u.any(&["start", "begin", "set"])))
        },
    },
    Rule {
        label: IntentLabel::WorkoutControl,
        confidence: 0.6,
        reason: "workout control phrasing",
        matches: |u| {
            u.phrase(&["next exercise", "next one", "move on", "skip exercise", "skip this"])
                || u.any(&["pause", "resume"])
                || (u.any(&["workout", "session", "training"])
                    && u.any(&["start", "begin", "end", "finish", "finished", "stop", "done", "continue"]))
        },
    },
    Rule {
        label: IntentLabel::LogExercise,
        confidence: 0.85,
        reason: "exercise, reps and weight all present",
        matches: |u| {
            u.has(EntityKind::Exercise) && u.has(EntityKind::Reps) && u.has(EntityKind::Weight)
        },
    },
    Rule {
        label: IntentLabel::QuickLog,
        confidence: 0.6,
        reason: "numbers for the exercise in progress",
        matches: |u| {
            u.has_amount() && !u.has(EntityKind::Exercise) && u.context.current_exercise.is_some()
        },
    },
    Rule {
        label: IntentLabel::LogExercise,
        confidence: 0.6,
        reason: "logging verb",
        matches: |u| {
            u.any(&["did", "completed", "finished", "done", "log", "logged", "record", "got"])
        },
    },
    Rule {
        label: IntentLabel::FormAnalysis,
        confidence: 0.5,
        reason: "technique question",
        matches: |u| u.any(&["form", "technique", "posture", "cue", "cues", "grip", "stance"]),
    },
    Rule {
        label: IntentLabel::Nutrition,
        confidence: 0.5,
        reason: "food vocabulary",
        matches: |u| {
            u.any(&[
                "eat", "eating", "protein", "calories", "calorie", "meal", "diet", "nutrition",
                "carbs", "food", "hungry", "snack",
            ])
        },
    },
    Rule {
        label: IntentLabel::Motivation,
        confidence: 0.5,
        reason: "needs encouragement",
        matches: |u| {
            u.any(&["motivate", "motivation", "motivated", "unmotivated", "tired", "quit"])
                || u.phrase(&["give up", "pump me up", "cant do", "feel like quitting"])
        },
    },
    Rule {
        label: IntentLabel::Help,
        confidence: 0.5,
        reason: "asks what is possible",
        matches: |u| {
            u.tokens == ["help"]
                || u.phrase(&["what can i say", "what can you do", "help me use", "list commands"])
                || u.any(&["commands"])
        },
    },
    Rule {
        label: IntentLabel::Navigation,
        confidence: 0.5,
        reason: "screen name with navigation verb",
        matches: |u| {
            u.any(&["go", "show", "open", "navigate"])
                && u.any(&["history", "stats", "progress", "settings", "profile", "home", "calendar"])
        },
    },
    Rule {
        label: IntentLabel::ExerciseInfo,
        confidence: 0.5,
        reason: "asks about a named exercise",
        matches: |u| {
            u.has(EntityKind::Exercise)
                && (u.phrase(&["what is", "what are", "tell me about", "how do i", "explain"])
                    || u.any(&["muscles", "works"]))
        },
    },
    Rule {
        label: IntentLabel::AskAi,
        confidence: 0.5,
        reason: "question words",
        matches: |u| u.any(&["how", "what", "help", "why", "should"]),
    },
    Rule {
        label: IntentLabel::LogExercise,
        confidence: 0.5,
        reason: "exercise with numbers",
        matches: |u| u.has(EntityKind::Exercise) && u.has_amount(),
    },
    Rule {
        label: IntentLabel::LogExercise,
        confidence: 0.4,
        reason: "bare exercise name",
        matches: |u| u.has(EntityKind::Exercise),
    },
];

/// Classify with keyword rules; always returns a usable result
pub fn classify(normalized: &str, extraction: &Extraction, context: &ClassifierContext) -> IntentResult {
    let utterance = Utterance::new(normalized, extraction, context);

    let mut matched = RULES.iter().filter(|rule| (rule.matches)(&utterance));
    let Some(best) = matched.next() else {
        return IntentResult::new(
            IntentLabel::Unknown,
            UNKNOWN_CONFIDENCE,
            extraction.entities.clone(),
            ClassificationSource::Fallback,
            "no local rule matched",
        );
    };

    let mut alternatives: Vec<IntentAlternative> = Vec::new();
    for rule in matched {
        if rule.label != best.label && alternatives.iter().all(|a| a.label != rule.label) {
            alternatives.push(IntentAlternative::new(rule.label, rule.confidence, rule.reason));
        }
    }

    IntentResult::new(
        best.label,
        best.confidence,
        extraction.entities.clone(),
        ClassificationSource::Fallback,
        format!("local rule: {}", best.reason),
    )
    .with_alternatives(alternatives)
}
