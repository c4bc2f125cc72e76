//! Command execution - converts resolved commands into host actions
//!
//! The engine never touches workout data itself. Executing a command means
//! producing the action records the workout data store will carry out.

use crate::command::resolver::SetRequest;
use crate::core::types::MuscleGroup;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    LogSet,
    StartRestTimer,
    NextExercise,
    StartWorkout,
    EndWorkout,
    PauseWorkout,
    ResumeWorkout,
    Navigate,
}

/// A side effect for the host to carry out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Action {
    fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            parameters: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.parameters.insert(key.to_string(), value);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkoutControl {
    NextExercise,
    End,
    Pause,
    Resume,
}

impl WorkoutControl {
    /// Read a control verb from a normalized utterance
    pub fn detect(normalized: &str) -> Option<Self> {
        let padded = format!(" {} ", normalized);
        let has = |words: &[&str]| words.iter().any(|w| padded.contains(&format!(" {} ", w)));

        if has(&["next", "skip", "move on"]) {
            Some(WorkoutControl::NextExercise)
        } else if has(&["pause", "hold on"]) {
            Some(WorkoutControl::Pause)
        } else if has(&["resume", "continue", "unpause"]) {
            Some(WorkoutControl::Resume)
        } else if has(&["end", "finish", "finished", "stop", "done"]) {
            Some(WorkoutControl::End)
        } else {
            None
        }
    }
}

/// A fully resolved request the executor can act on
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LogSet(SetRequest),
    StartRestTimer { seconds: u32 },
    StartWorkout {
        muscle_group: MuscleGroup,
        duration_min: u32,
    },
    Workout(WorkoutControl),
    Navigate { screen: String },
}

/// Executes commands by producing actions
pub struct CommandExecutor;

impl CommandExecutor {
    pub fn execute(command: &Command) -> ExecutionResult {
        match command {
            Command::LogSet(request) => {
                if request.reps == 0 {
                    return ExecutionResult::failed("A set needs at least one rep");
                }
                let mut action = Action::new(ActionKind::LogSet)
                    .with("exercise_id", json!(request.exercise_id))
                    .with("exercise_name", json!(request.exercise_name))
                    .with("reps", json!(request.reps));
                if let Some(weight) = request.weight {
                    action = action.with("weight", json!(weight));
                }
                if let Some(unit) = request.unit {
                    action = action.with("unit", json!(unit.as_str()));
                }
                ExecutionResult::single(action)
            }
            Command::StartRestTimer { seconds } => {
                if *seconds == 0 {
                    return ExecutionResult::failed("Rest timer needs a duration");
                }
                ExecutionResult::single(Action::new(ActionKind::StartRestTimer).with("seconds", json!(seconds)))
            }
            Command::StartWorkout {
                muscle_group,
                duration_min,
            } => ExecutionResult::single(
                Action::new(ActionKind::StartWorkout)
                    .with("muscle_group", json!(muscle_group.as_str()))
                    .with("duration_min", json!(duration_min)),
            ),
            Command::Workout(control) => {
                let kind = match control {
                    WorkoutControl::NextExercise => ActionKind::NextExercise,
                    WorkoutControl::End => ActionKind::EndWorkout,
                    WorkoutControl::Pause => ActionKind::PauseWorkout,
                    WorkoutControl::Resume => ActionKind::ResumeWorkout,
                };
                ExecutionResult::single(Action::new(kind))
            }
            Command::Navigate { screen } => {
                ExecutionResult::single(Action::new(ActionKind::Navigate).with("screen", json!(screen)))
            }
        }
    }
}

/// Result of executing a command
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub actions: Vec<Action>,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn single(action: Action) -> Self {
        Self {
            actions: vec![action],
            error: None,
        }
    }

    fn failed(reason: &str) -> Self {
        Self {
            actions: Vec::new(),
            error: Some(reason.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::resolver::{ExerciseSource, WeightSource};
    use crate::core::types::Unit;

    fn bench(reps: u32, weight: Option<f64>) -> SetRequest {
        SetRequest {
            exercise_id: "bench_press".into(),
            exercise_name: "bench press".into(),
            reps,
            weight,
            unit: weight.map(|_| Unit::Lbs),
            exercise_source: ExerciseSource::Utterance,
            weight_source: weight.map(|_| WeightSource::Utterance),
        }
    }

    #[test]
    fn test_log_set_parameters() {
        let result = CommandExecutor::execute(&Command::LogSet(bench(8, Some(185.0))));
        assert!(result.is_ok());
        assert_eq!(result.actions.len(), 1);
        let action = &result.actions[0];
        assert_eq!(action.kind, ActionKind::LogSet);
        assert_eq!(action.parameters["reps"], 8);
        assert_eq!(action.parameters["weight"], 185.0);
        assert_eq!(action.parameters["unit"], "lbs");
    }

    #[test]
    fn test_log_set_without_weight_omits_it() {
        let result = CommandExecutor::execute(&Command::LogSet(bench(12, None)));
        assert!(!result.actions[0].parameters.contains_key("weight"));
    }

    #[test]
    fn test_zero_reps_rejected() {
        let result = CommandExecutor::execute(&Command::LogSet(bench(0, Some(135.0))));
        assert!(!result.is_ok());
        assert!(result.actions.is_empty());
    }

    #[test]
    fn test_action_kind_wire_names() {
        let json = serde_json::to_string(&ActionKind::StartRestTimer).unwrap();
        assert_eq!(json, "\"START_REST_TIMER\"");
    }

    #[test]
    fn test_workout_control_detection() {
        assert_eq!(WorkoutControl::detect("next exercise"), Some(WorkoutControl::NextExercise));
        assert_eq!(WorkoutControl::detect("pause workout"), Some(WorkoutControl::Pause));
        assert_eq!(WorkoutControl::detect("im done with the workout"), Some(WorkoutControl::End));
        assert_eq!(WorkoutControl::detect("start workout"), None);
    }
}
