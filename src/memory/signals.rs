//! Keyword-derived mood and workout-phase signals
//!
//! These bias the tone of generated replies. They are cheap heuristics over
//! the normalized transcript, not a model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Energized,
    Tired,
    Frustrated,
    Proud,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutPhase {
    WarmingUp,
    Working,
    Resting,
    CoolingDown,
    #[default]
    Unknown,
}

/// Mood and phase read from one utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signals {
    pub mood: Mood,
    pub phase: WorkoutPhase,
}

const MOOD_KEYWORDS: &[(Mood, &[&str])] = &[
    (Mood::Frustrated, &["ugh", "terrible", "failed", "awful", "annoying", "cant", "hate"]),
    (Mood::Tired, &["tired", "exhausted", "dead", "wiped", "sore", "drained"]),
    (Mood::Proud, &["pr", "record", "personal", "crushed", "nailed", "easy"]),
    (Mood::Energized, &["pumped", "great", "strong", "awesome", "ready", "lets"]),
];

const PHASE_KEYWORDS: &[(WorkoutPhase, &[&str])] = &[
    (WorkoutPhase::WarmingUp, &["warm", "warmup", "warming", "starting"]),
    (WorkoutPhase::CoolingDown, &["cool", "cooldown", "stretch", "stretching", "finished", "done"]),
    (WorkoutPhase::Resting, &["rest", "resting", "break", "breather"]),
    (WorkoutPhase::Working, &["did", "set", "sets", "reps", "lifting", "working"]),
];

fn first_match<T: Copy + Default>(tokens: &[&str], table: &[(T, &[&str])]) -> T {
    table
        .iter()
        .find(|(_, words)| tokens.iter().any(|t| words.contains(t)))
        .map(|(value, _)| *value)
        .unwrap_or_default()
}

/// Detect signals from a normalized transcript
pub fn detect(normalized: &str) -> Signals {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    Signals {
        mood: first_match(&tokens, MOOD_KEYWORDS),
        phase: first_match(&tokens, PHASE_KEYWORDS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_by_default() {
        assert_eq!(detect("log bench press"), Signals::default());
    }

    #[test]
    fn test_mood_priority() {
        // frustration outranks the energized keyword
        assert_eq!(detect("ugh i feel strong but failed").mood, Mood::Frustrated);
        assert_eq!(detect("so tired today").mood, Mood::Tired);
        assert_eq!(detect("new pr on squat").mood, Mood::Proud);
    }

    #[test]
    fn test_phase_detection() {
        assert_eq!(detect("warming up with the bar").phase, WorkoutPhase::WarmingUp);
        assert_eq!(detect("start rest timer").phase, WorkoutPhase::Resting);
        assert_eq!(detect("did 10 reps").phase, WorkoutPhase::Working);
    }
}
