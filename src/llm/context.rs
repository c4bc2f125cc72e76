//! Conversation context for backend prompts
//!
//! Summarizes what the classifier should know about the session so it can
//! disambiguate short utterances like "eight more".

use crate::llm::intent::IntentLabel;
use crate::memory::signals::Signals;

/// Context handed to the classifier for one turn
#[derive(Debug, Clone, Default)]
pub struct ClassifierContext {
    /// Exercise in progress, already resolved to a display name
    pub current_exercise: Option<String>,
    pub previous_intent: Option<IntentLabel>,
    /// Most recent user utterances, oldest first
    pub recent_inputs: Vec<String>,
    pub signals: Signals,
}

impl ClassifierContext {
    /// Keep only the last few utterances
    pub fn with_recent(mut self, inputs: impl IntoIterator<Item = String>) -> Self {
        self.recent_inputs = inputs.into_iter().collect();
        if self.recent_inputs.len() > 3 {
            let excess = self.recent_inputs.len() - 3;
            self.recent_inputs.drain(..excess);
        }
        self
    }

    /// Text summary for prompt construction
    pub fn summary(&self) -> String {
        let mut s = String::new();

        match &self.current_exercise {
            Some(name) => s.push_str(&format!("Current exercise: {}\n", name)),
            None => s.push_str("Current exercise: none\n"),
        }
        if let Some(intent) = self.previous_intent {
            s.push_str(&format!("Previous intent: {}\n", intent.as_str()));
        }
        s.push_str(&format!(
            "User mood: {:?}, workout phase: {:?}\n",
            self.signals.mood, self.signals.phase
        ));

        if !self.recent_inputs.is_empty() {
            s.push_str("\nRecent utterances:\n");
            for input in &self.recent_inputs {
                s.push_str(&format!("- {}\n", input));
            }
        }

        s
    }
}
