//! Spoken response templates
//!
//! Every path through the flow manager ends in one of these. Text is short
//! because it is read aloud mid-set.

use crate::command::executor::{Action, WorkoutControl};
use crate::command::resolver::{SetRequest, WeightSource};
use crate::conversation::flow::{FlowData, FlowKind, FlowStep};
use crate::conversation::turn::{EmotionTag, TurnOutput};
use crate::core::types::MuscleGroup;
use crate::memory::signals::Mood;

/// Question for the step a flow is waiting on
pub fn ask(step: FlowStep, exercise_name: Option<&str>, timeout_ms: u64) -> TurnOutput {
    let exercise = exercise_name.unwrap_or("that");
    let (text, suggestions): (String, Vec<&str>) = match step {
        FlowStep::AwaitingExercise => (
            "Which exercise did you do?".into(),
            vec!["bench press", "squat", "deadlift"],
        ),
        FlowStep::AwaitingReps => (format!("How many reps of {}?", exercise), vec!["5 reps", "8 reps", "10 reps"]),
        FlowStep::AwaitingWeight => (
            format!("What weight did you use for {}?", exercise),
            vec!["135 lbs", "185 lbs", "bodyweight"],
        ),
        FlowStep::AwaitingMuscleGroup => (
            "What do you want to train today?".into(),
            vec!["chest", "legs", "back", "full body"],
        ),
        FlowStep::AwaitingDuration => (
            "How many minutes do you have?".into(),
            vec!["30 minutes", "45 minutes", "60 minutes"],
        ),
        FlowStep::AwaitingFollowUp => ("Tell me more.".into(), Vec::new()),
        FlowStep::Complete => ("All set.".into(), Vec::new()),
    };

    TurnOutput::say(text, EmotionTag::Questioning)
        .asking(timeout_ms)
        .with_suggestions(suggestions)
}

/// Same step again after an answer we could not use
pub fn reprompt(step: FlowStep, exercise_name: Option<&str>, timeout_ms: u64) -> TurnOutput {
    let missing = match step {
        FlowStep::AwaitingExercise => "the exercise",
        FlowStep::AwaitingReps => "the reps",
        FlowStep::AwaitingWeight => "the weight",
        FlowStep::AwaitingMuscleGroup => "what you want to train",
        FlowStep::AwaitingDuration => "how long",
        FlowStep::AwaitingFollowUp | FlowStep::Complete => "that",
    };
    let mut output = ask(step, exercise_name, timeout_ms);
    output.response_text = format!("Sorry, I didn't catch {}. {}", missing, output.response_text);
    output
}

/// Confirmation after a set is logged
pub fn logged(request: &SetRequest, actions: Vec<Action>, mood: Mood) -> TurnOutput {
    let mut text = format!("Logged {} reps of {}", request.reps, request.exercise_name);
    match (request.weight, request.unit) {
        (Some(weight), Some(unit)) if weight > 0.0 => {
            text.push_str(&format!(" at {} {}", format_number(weight), unit.as_str()));
        }
        (Some(weight), None) if weight > 0.0 => text.push_str(&format!(" at {}", format_number(weight))),
        _ => {}
    }
    text.push('.');
    if request.weight_source == Some(WeightSource::LastLogged) {
        text.push_str(" Same weight as last time.");
    }

    let emotion = match mood {
        Mood::Tired | Mood::Frustrated => {
            text.push_str(" Good job pushing through.");
            EmotionTag::Encouraging
        }
        _ => EmotionTag::Celebratory,
    };
    TurnOutput::say(text, emotion).with_actions(actions)
}

pub fn cancelled(kind: FlowKind) -> TurnOutput {
    let what = match kind {
        FlowKind::SetLogging => "Okay, I won't log that set.",
        FlowKind::WorkoutSetup => "Okay, workout setup cancelled.",
        FlowKind::FormDiscussion | FlowKind::NutritionChat | FlowKind::MotivationSession => "Okay, we can pick that up later.",
    };
    TurnOutput::say(what, EmotionTag::Neutral)
}

pub fn nothing_to_cancel() -> TurnOutput {
    TurnOutput::say("Nothing to cancel.", EmotionTag::Neutral)
}

pub fn low_confidence() -> TurnOutput {
    TurnOutput::say("Sorry, I didn't quite hear that. Could you say it again?", EmotionTag::Apologetic)
}

pub fn empty_transcript() -> TurnOutput {
    TurnOutput::say("I didn't hear anything. Try again when you're ready.", EmotionTag::Apologetic)
}

pub fn help() -> TurnOutput {
    TurnOutput::say(
        "You can say things like \"bench press eight reps at one eighty five\", \"start a rest timer\", or \"next exercise\".",
        EmotionTag::Instructional,
    )
    .with_suggestions(["log a set", "start rest timer", "next exercise"])
}

/// A number with nothing to attach it to
pub fn clarify_number(value: f64, timeout_ms: u64) -> TurnOutput {
    TurnOutput::say(
        format!("Is {} your reps or the weight, and for which exercise?", format_number(value)),
        EmotionTag::Questioning,
    )
    .asking(timeout_ms)
    .with_suggestions([
        format!("{} reps", format_number(value)),
        format!("{} lbs", format_number(value)),
    ])
}

pub fn rest_timer(seconds: u32, actions: Vec<Action>) -> TurnOutput {
    let text = if seconds % 60 == 0 {
        let minutes = seconds / 60;
        format!("Resting {} minute{}. I'll let you know.", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        format!("Resting {} seconds. I'll let you know.", seconds)
    };
    TurnOutput::say(text, EmotionTag::Neutral).with_actions(actions)
}

pub fn workout_control(control: WorkoutControl, next_hint: Option<&str>, actions: Vec<Action>) -> TurnOutput {
    let (text, emotion) = match control {
        WorkoutControl::NextExercise => match next_hint {
            Some(name) => (format!("Moving on. Last time you did {} next.", name), EmotionTag::Encouraging),
            None => ("Moving on to the next exercise.".to_string(), EmotionTag::Encouraging),
        },
        WorkoutControl::End => ("Workout finished. Great session.".to_string(), EmotionTag::Celebratory),
        WorkoutControl::Pause => ("Workout paused.".to_string(), EmotionTag::Neutral),
        WorkoutControl::Resume => ("Back at it.".to_string(), EmotionTag::Encouraging),
    };
    TurnOutput::say(text, emotion).with_actions(actions)
}

pub fn workout_started(data: &FlowData, actions: Vec<Action>) -> TurnOutput {
    let group = data.muscle_group.map(muscle_group_name).unwrap_or("full body");
    let text = match data.duration_min {
        Some(minutes) => format!("Starting a {} minute {} workout. Let's go.", minutes, group),
        None => format!("Starting a {} workout. Let's go.", group),
    };
    TurnOutput::say(text, EmotionTag::Encouraging).with_actions(actions)
}

pub fn navigate(screen: &str, actions: Vec<Action>) -> TurnOutput {
    TurnOutput::say(format!("Opening {}.", screen), EmotionTag::Neutral).with_actions(actions)
}

pub fn unknown_screen() -> TurnOutput {
    TurnOutput::say(
        "Which screen? You can say history, stats, progress or settings.",
        EmotionTag::Questioning,
    )
    .with_suggestions(["history", "stats", "settings"])
}

/// The workout command was understood but not which one
pub fn unclear_control() -> TurnOutput {
    TurnOutput::say(
        "Do you want the next exercise, or to pause or end the workout?",
        EmotionTag::Questioning,
    )
    .with_suggestions(["next exercise", "pause workout", "end workout"])
}

/// Backend could not phrase a reply; the flow stays open for a retry
pub fn generation_failed(timeout_ms: u64) -> TurnOutput {
    TurnOutput::say(
        "Sorry, I lost my train of thought. Say that once more?",
        EmotionTag::Apologetic,
    )
    .asking(timeout_ms)
}

/// A command that was understood but rejected by the executor
pub fn rejected(reason: &str) -> TurnOutput {
    TurnOutput::say(format!("I couldn't do that: {}.", reason.to_lowercase()), EmotionTag::Apologetic)
}

pub fn muscle_group_name(group: MuscleGroup) -> &'static str {
    match group {
        MuscleGroup::FullBody => "full body",
        other => other.as_str(),
    }
}

/// Whole numbers without a trailing ".0"
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::resolver::ExerciseSource;
    use crate::core::types::Unit;

    fn request(weight: Option<f64>, source: Option<WeightSource>) -> SetRequest {
        SetRequest {
            exercise_id: "squat".into(),
            exercise_name: "squat".into(),
            reps: 10,
            weight,
            unit: weight.map(|_| Unit::Lbs),
            exercise_source: ExerciseSource::Utterance,
            weight_source: source,
        }
    }

    #[test]
    fn test_logged_text() {
        let output = logged(&request(Some(225.0), Some(WeightSource::Utterance)), Vec::new(), Mood::Neutral);
        assert_eq!(output.response_text, "Logged 10 reps of squat at 225 lbs.");
        assert_eq!(output.emotion, EmotionTag::Celebratory);
        assert!(!output.expects_follow_up);
    }

    #[test]
    fn test_logged_reused_weight_mentioned() {
        let output = logged(&request(Some(185.0), Some(WeightSource::LastLogged)), Vec::new(), Mood::Tired);
        assert!(output.response_text.contains("Same weight as last time"));
        assert_eq!(output.emotion, EmotionTag::Encouraging);
    }

    #[test]
    fn test_ask_expects_follow_up() {
        let output = ask(FlowStep::AwaitingReps, Some("bench press"), 30_000);
        assert_eq!(output.response_text, "How many reps of bench press?");
        assert!(output.expects_follow_up);
        assert_eq!(output.follow_up_timeout_ms, Some(30_000));
        assert_eq!(output.suggested_replies.len(), 3);
    }

    #[test]
    fn test_reprompt_keeps_question() {
        let output = reprompt(FlowStep::AwaitingWeight, Some("squat"), 30_000);
        assert!(output.response_text.starts_with("Sorry, I didn't catch the weight."));
        assert!(output.response_text.ends_with("for squat?"));
    }

    #[test]
    fn test_clarify_number() {
        let output = clarify_number(225.0, 30_000);
        assert!(output.response_text.contains("225"));
        assert!(output.expects_follow_up);
        assert!(output.actions.is_empty());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(225.0), "225");
        assert_eq!(format_number(22.5), "22.5");
    }

    #[test]
    fn test_rest_timer_text() {
        assert_eq!(rest_timer(90, Vec::new()).response_text, "Resting 90 seconds. I'll let you know.");
        assert_eq!(rest_timer(120, Vec::new()).response_text, "Resting 2 minutes. I'll let you know.");
    }
}
