//! Command pipeline
//!
//! Extracted entities -> SetResolver -> SetRequest -> CommandExecutor -> Vec<Action>

pub mod executor;
pub mod resolver;

pub use executor::{Action, ActionKind, Command, CommandExecutor, ExecutionResult, WorkoutControl};
pub use resolver::{ExerciseMatch, ExerciseSource, SetRequest, SetResolution, SetResolver, WeightSource};
