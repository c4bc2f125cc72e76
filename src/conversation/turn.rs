//! Per-turn input and output values
//!
//! Field names on the wire follow the host app's camelCase convention.

use crate::command::executor::Action;
use crate::conversation::flow::{FlowKind, FlowStep};
use crate::core::types::Transcript;
use crate::llm::intent::{IntentLabel, IntentResult};
use crate::memory::signals::Signals;
use serde::{Deserialize, Serialize};

/// What the host app knows going into a turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub current_exercise_name: Option<String>,
    pub previous_intent: Option<IntentLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInput {
    /// Final transcript from speech-to-text
    pub transcript: String,
    pub recognizer_confidence: Option<f32>,
    #[serde(default)]
    pub session_context: SessionContext,
}

impl TurnInput {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            recognizer_confidence: None,
            session_context: SessionContext::default(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.recognizer_confidence = Some(confidence);
        self
    }

    pub fn with_context(mut self, context: SessionContext) -> Self {
        self.session_context = context;
        self
    }

    pub fn with_exercise(mut self, name: impl Into<String>) -> Self {
        self.session_context.current_exercise_name = Some(name.into());
        self
    }
}

/// Tone hint for text-to-speech and UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionTag {
    Encouraging,
    Celebratory,
    Instructional,
    Questioning,
    #[default]
    Neutral,
    Apologetic,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutput {
    pub response_text: String,
    #[serde(rename = "emotionTag")]
    pub emotion: EmotionTag,
    pub expects_follow_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_replies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

impl TurnOutput {
    pub fn say(text: impl Into<String>, emotion: EmotionTag) -> Self {
        Self {
            response_text: text.into(),
            emotion,
            ..Default::default()
        }
    }

    /// Expect an answer within `timeout_ms`
    pub fn asking(mut self, timeout_ms: u64) -> Self {
        self.expects_follow_up = true;
        self.follow_up_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggested_replies = suggestions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }
}

/// Why a turn was refused before any processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    LowConfidence,
    EmptyTranscript,
}

/// Where the active flow stands after a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    pub kind: FlowKind,
    pub step: FlowStep,
}

/// Everything a turn produced
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub transcript: Transcript,
    pub output: TurnOutput,
    /// Absent when the turn was answered inside a flow or rejected
    pub intent: Option<IntentResult>,
    pub next_context: SessionContext,
    pub signals: Signals,
    pub rejected: Option<RejectReason>,
    pub active_flow: Option<FlowState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_wire_names() {
        let output = TurnOutput::say("How many reps?", EmotionTag::Questioning).asking(30_000);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["responseText"], "How many reps?");
        assert_eq!(json["emotionTag"], "questioning");
        assert_eq!(json["expectsFollowUp"], true);
        assert_eq!(json["followUpTimeoutMs"], 30_000);
        assert!(json.get("actions").is_none());
    }

    #[test]
    fn test_input_from_host_json() {
        let input: TurnInput = serde_json::from_str(
            r#"{"transcript": "8 reps", "recognizerConfidence": 0.9,
                "sessionContext": {"currentExerciseName": "bench press", "previousIntent": "log_exercise"}}"#,
        )
        .unwrap();
        assert_eq!(input.session_context.current_exercise_name.as_deref(), Some("bench press"));
        assert_eq!(input.session_context.previous_intent, Some(IntentLabel::LogExercise));
    }
}
