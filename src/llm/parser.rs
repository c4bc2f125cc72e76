//! Prompt construction and reply parsing for backend intent classification
//!
//! The backend answers with a JSON object; models like to wrap it in prose
//! or code fences, so the outermost object is cut out before parsing.

use crate::core::error::{Result, VoiceError};
use crate::llm::context::ClassifierContext;
use crate::llm::intent::IntentLabel;
use serde::Deserialize;

/// Reply shape requested from the backend
#[derive(Debug, Clone, Deserialize)]
pub struct BackendReply {
    pub intent: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub exercise: Option<String>,
    #[serde(default)]
    pub reps: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<BackendAlternative>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendAlternative {
    pub intent: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A reply whose intent is a known label
#[derive(Debug, Clone)]
pub struct ParsedReply {
    pub label: IntentLabel,
    pub reply: BackendReply,
}

/// Build the user half of the classification prompt
pub fn build_user_prompt(normalized: &str, context: &ClassifierContext) -> String {
    format!(
        "CONTEXT:\n{}\nUSER SAID:\n{}\n\nClassify this utterance into JSON:",
        context.summary(),
        normalized
    )
}

/// Build the system prompt with the fixed intent enumeration
pub fn system_prompt() -> String {
    let mut intents = String::new();
    for label in IntentLabel::ALL {
        intents.push_str(&format!("- {}: {}\n", label.as_str(), label.description()));
    }
    format!("{}{}{}", PROMPT_HEAD, intents, PROMPT_TAIL)
}

/// Parse the backend's text into a reply with a known intent label
pub fn parse_reply(response: &str) -> Result<ParsedReply> {
    let json_str = extract_json(response)?;
    let reply: BackendReply = serde_json::from_str(json_str).map_err(|e| {
        VoiceError::MalformedReply(format!("Failed to parse intent: {} - Response: {}", e, response))
    })?;

    let label = IntentLabel::parse(&reply.intent)
        .ok_or_else(|| VoiceError::MalformedReply(format!("Unknown intent label: {}", reply.intent)))?;

    if let Some(confidence) = reply.confidence {
        if !confidence.is_finite() {
            return Err(VoiceError::MalformedReply("Non-finite confidence".into()));
        }
    }

    Ok(ParsedReply { label, reply })
}

/// Extract JSON object from LLM response (handles surrounding text)
fn extract_json(response: &str) -> Result<&str> {
    let start = response
        .find('{')
        .ok_or_else(|| VoiceError::MalformedReply("No JSON found in response".into()))?;
    let end = response
        .rfind('}')
        .ok_or_else(|| VoiceError::MalformedReply("No closing brace found in response".into()))?;
    if end < start {
        return Err(VoiceError::MalformedReply("Braces out of order in response".into()));
    }
    Ok(&response[start..=end])
}

const PROMPT_HEAD: &str = r#"You classify short spoken commands from someone in the middle of a gym workout.
The transcript is already lower-cased, with exercise names and units normalized
(lbs, kg, reps, min, sec). Speech recognition is noisy; prefer the reading that
makes sense for weight training.

SUPPORTED INTENTS:
"#;

const PROMPT_TAIL: &str = r#"
OUTPUT FORMAT (JSON only, no explanation):
{
  "intent": "one of the intents above",
  "confidence": 0.0-1.0,
  "exercise": "exercise name or null",
  "reps": number or null,
  "weight": number or null,
  "unit": "lbs|kg or null",
  "alternatives": [{"intent": "...", "confidence": 0.0-1.0, "reason": "..."}],
  "note": "one short sentence on how you read it"
}

Examples:
"did bench press 8 at 185" -> {"intent": "log_exercise", "confidence": 0.95, "exercise": "bench press", "reps": 8, "weight": 185, "unit": "lbs", "alternatives": [], "note": "complete set"}
"8 more" (current exercise squat) -> {"intent": "quick_log", "confidence": 0.85, "exercise": null, "reps": 8, "weight": null, "unit": null, "alternatives": [], "note": "reps for the current exercise"}
"how much protein do i need" -> {"intent": "nutrition", "confidence": 0.9, "exercise": null, "reps": null, "weight": null, "unit": null, "alternatives": [{"intent": "ask_ai", "confidence": 0.4, "reason": "general question"}], "note": "protein question"}
"#;
