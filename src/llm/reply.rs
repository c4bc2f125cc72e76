//! Free-text replies for conversational turns
//!
//! Form, nutrition and motivation exchanges (and open questions) are phrased
//! by the reasoning backend. Without a backend a canned local reply is used.
//! Mood and phase signals go into the prompt so the backend can match tone.

use crate::core::error::{Result, VoiceError};
use crate::llm::client::{complete_within, ReasoningBackend};
use crate::memory::profile::CommunicationStyle;
use crate::memory::signals::{Mood, Signals, WorkoutPhase};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What the conversational reply is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Form,
    Nutrition,
    Motivation,
    ExerciseInfo,
    General,
}

impl Topic {
    fn as_str(&self) -> &'static str {
        match self {
            Topic::Form => "lifting form and technique",
            Topic::Nutrition => "nutrition",
            Topic::Motivation => "motivation",
            Topic::ExerciseInfo => "exercise information",
            Topic::General => "general fitness",
        }
    }
}

/// Everything the generator sees for one reply
#[derive(Debug, Clone, Copy)]
pub struct ReplyRequest<'a> {
    pub topic: Topic,
    /// Normalized utterance being answered
    pub utterance: &'a str,
    /// Display name of the exercise in context
    pub exercise: Option<&'a str>,
    pub signals: Signals,
    pub style: CommunicationStyle,
    /// True when this reply closes a one-exchange conversation
    pub closing: bool,
}

pub struct ReplyGenerator {
    backend: Option<Arc<dyn ReasoningBackend>>,
    timeout: Duration,
}

impl ReplyGenerator {
    pub fn new(backend: Option<Arc<dyn ReasoningBackend>>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn offline() -> Self {
        Self::new(None, Duration::from_secs(1))
    }

    /// Phrase a reply; errors only when a configured backend fails
    pub async fn generate(&self, request: &ReplyRequest<'_>, cancel: &CancellationToken) -> Result<String> {
        let Some(backend) = &self.backend else {
            return Ok(canned(request));
        };

        let user = build_prompt(request);
        let reply = complete_within(backend.as_ref(), REPLY_SYSTEM_PROMPT, &user, self.timeout, cancel).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(VoiceError::MalformedReply("Empty reply text".into()));
        }
        Ok(reply.to_string())
    }
}

fn build_prompt(request: &ReplyRequest<'_>) -> String {
    let mut prompt = format!("TOPIC: {}\n", request.topic.as_str());
    if let Some(exercise) = request.exercise {
        prompt.push_str(&format!("CURRENT EXERCISE: {}\n", exercise));
    }
    prompt.push_str(&format!(
        "USER MOOD: {:?}\nWORKOUT PHASE: {:?}\nSTYLE: {:?}\n",
        request.signals.mood, request.signals.phase, request.style
    ));
    if request.closing {
        prompt.push_str("This is the last reply of the exchange; do not ask a question.\n");
    } else {
        prompt.push_str("End with one short follow-up question.\n");
    }
    prompt.push_str(&format!("\nUSER SAID:\n{}\n", request.utterance));
    prompt
}

/// Local reply used when no backend is configured
pub fn canned(request: &ReplyRequest<'_>) -> String {
    let opener = match request.signals.mood {
        Mood::Tired => "You've been working hard. ",
        Mood::Frustrated => "Tough sets happen. ",
        Mood::Proud => "Nice work. ",
        Mood::Energized => "Love the energy. ",
        Mood::Neutral => "",
    };

    let body = match (request.topic, request.closing) {
        (Topic::Form, false) => match request.exercise {
            Some(name) => format!("Let's look at your {}. Where do you feel it, and what part of the lift feels off?", name),
            None => "Which exercise is giving you trouble, and what feels off?".to_string(),
        },
        (Topic::Form, true) => "Slow the lowering phase, keep your core braced, and film a set from the side if you can. If anything hurts, drop the weight.".to_string(),
        (Topic::Nutrition, false) => "Are you asking about eating around this workout or your day overall?".to_string(),
        (Topic::Nutrition, true) => "Aim for a protein-rich meal within a couple of hours of training and keep water going during the session.".to_string(),
        (Topic::Motivation, false) => "What's getting in the way today?".to_string(),
        (Topic::Motivation, true) => match request.signals.phase {
            WorkoutPhase::CoolingDown => "You showed up and finished. That's how progress gets built.".to_string(),
            _ => "One more set. Just focus on the next rep, not the whole workout.".to_string(),
        },
        (Topic::ExerciseInfo, _) => match request.exercise {
            Some(name) => format!("{} is in your exercise list. Ask me about form if you want cues for it.", capitalize(name)),
            None => "Tell me which exercise you want to know about.".to_string(),
        },
        (Topic::General, _) => "I can't reach the coach right now. I can still log sets, start rest timers and move you through your workout.".to_string(),
    };

    if request.style == CommunicationStyle::Concise {
        return body;
    }
    format!("{}{}", opener, body)
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

const REPLY_SYSTEM_PROMPT: &str = r#"You are a concise strength coach talking to someone mid-workout through a voice assistant.
Your reply will be spoken aloud: two sentences at most, no lists, no markdown, no emoji.
Match the user's mood. Never claim to have logged anything; logging is handled elsewhere.
"#;
