//! Intent labels and classification results

use crate::core::types::{clamp_confidence, Entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the user is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    /// Record a completed set
    LogExercise,
    /// Record a set for the exercise already in progress
    QuickLog,
    /// Open question for the coach
    AskAi,
    Motivation,
    FormAnalysis,
    Nutrition,
    /// Start, end, pause, resume, next exercise
    WorkoutControl,
    RestTimer,
    /// Switch app screen
    Navigation,
    Help,
    ExerciseInfo,
    Unknown,
}

impl IntentLabel {
    /// Every label the reasoning backend may answer with
    pub const ALL: [IntentLabel; 12] = [
        IntentLabel::LogExercise,
        IntentLabel::QuickLog,
        IntentLabel::AskAi,
        IntentLabel::Motivation,
        IntentLabel::FormAnalysis,
        IntentLabel::Nutrition,
        IntentLabel::WorkoutControl,
        IntentLabel::RestTimer,
        IntentLabel::Navigation,
        IntentLabel::Help,
        IntentLabel::ExerciseInfo,
        IntentLabel::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentLabel::LogExercise => "log_exercise",
            IntentLabel::QuickLog => "quick_log",
            IntentLabel::AskAi => "ask_ai",
            IntentLabel::Motivation => "motivation",
            IntentLabel::FormAnalysis => "form_analysis",
            IntentLabel::Nutrition => "nutrition",
            IntentLabel::WorkoutControl => "workout_control",
            IntentLabel::RestTimer => "rest_timer",
            IntentLabel::Navigation => "navigation",
            IntentLabel::Help => "help",
            IntentLabel::ExerciseInfo => "exercise_info",
            IntentLabel::Unknown => "unknown",
        }
    }

    /// Parse a label as the backend writes it; case and separators are loose
    pub fn parse(label: &str) -> Option<Self> {
        let key = label.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|l| l.as_str() == key)
    }

    pub fn description(&self) -> &'static str {
        match self {
            IntentLabel::LogExercise => "record a completed set (exercise, reps, weight)",
            IntentLabel::QuickLog => "record reps/weight for the exercise already in progress",
            IntentLabel::AskAi => "general fitness question for the coach",
            IntentLabel::Motivation => "user wants encouragement or feels unmotivated",
            IntentLabel::FormAnalysis => "question or complaint about lifting technique",
            IntentLabel::Nutrition => "food, protein, calories, meals",
            IntentLabel::WorkoutControl => "start/end/pause/resume workout or next exercise",
            IntentLabel::RestTimer => "start a rest timer",
            IntentLabel::Navigation => "open a screen such as history, stats or settings",
            IntentLabel::Help => "what commands are available",
            IntentLabel::ExerciseInfo => "what an exercise is or which muscles it works",
            IntentLabel::Unknown => "none of the above",
        }
    }
}

/// Where a classification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Backend,
    Fallback,
}

/// A runner-up interpretation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAlternative {
    pub label: IntentLabel,
    pub confidence: f32,
    pub reason: String,
}

impl IntentAlternative {
    pub fn new(label: IntentLabel, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            label,
            confidence: clamp_confidence(confidence),
            reason: reason.into(),
        }
    }
}

/// Classified intent for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub label: IntentLabel,
    pub confidence: f32,
    pub entities: Vec<Entity>,
    pub alternatives: Vec<IntentAlternative>,
    pub interpretation_note: String,
    pub source: ClassificationSource,
    pub timestamp: DateTime<Utc>,
}

impl IntentResult {
    pub fn new(
        label: IntentLabel,
        confidence: f32,
        entities: Vec<Entity>,
        source: ClassificationSource,
        note: impl Into<String>,
    ) -> Self {
        Self {
            label,
            confidence: clamp_confidence(confidence),
            entities,
            alternatives: Vec::new(),
            interpretation_note: note.into(),
            source,
            timestamp: Utc::now(),
        }
    }

    pub fn with_alternatives(mut self, alternatives: Vec<IntentAlternative>) -> Self {
        self.alternatives = alternatives;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parse_is_loose() {
        assert_eq!(IntentLabel::parse("log_exercise"), Some(IntentLabel::LogExercise));
        assert_eq!(IntentLabel::parse(" Quick-Log "), Some(IntentLabel::QuickLog));
        assert_eq!(IntentLabel::parse("rest timer"), Some(IntentLabel::RestTimer));
        assert_eq!(IntentLabel::parse("dance"), None);
    }

    #[test]
    fn test_label_serialization_matches_as_str() {
        for label in IntentLabel::ALL {
            let json = serde_json::to_string(&label).unwrap();
            assert_eq!(json, format!("\"{}\"", label.as_str()));
        }
    }

    #[test]
    fn test_result_clamps_confidence() {
        let result = IntentResult::new(
            IntentLabel::Help,
            4.2,
            Vec::new(),
            ClassificationSource::Fallback,
            "",
        );
        assert_eq!(result.confidence, 1.0);
        let alt = IntentAlternative::new(IntentLabel::Help, -1.0, "x");
        assert_eq!(alt.confidence, 0.0);
    }
}
