//! Conversation flows and their step graphs
//!
//! A flow holds the partial data for one multi-turn exchange. Steps only move
//! forward along a fixed graph per kind; one turn may fill several slots and
//! skip steps.

use crate::core::types::{EntityKind, MuscleGroup, Unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowKind {
    SetLogging,
    WorkoutSetup,
    FormDiscussion,
    NutritionChat,
    MotivationSession,
}

impl FlowKind {
    /// Open-ended flows that close after one follow-up
    pub fn is_conversational(&self) -> bool {
        matches!(
            self,
            FlowKind::FormDiscussion | FlowKind::NutritionChat | FlowKind::MotivationSession
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowKind::SetLogging => "SET_LOGGING",
            FlowKind::WorkoutSetup => "WORKOUT_SETUP",
            FlowKind::FormDiscussion => "FORM_DISCUSSION",
            FlowKind::NutritionChat => "NUTRITION_CHAT",
            FlowKind::MotivationSession => "MOTIVATION_SESSION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStep {
    AwaitingExercise,
    AwaitingReps,
    AwaitingWeight,
    AwaitingMuscleGroup,
    AwaitingDuration,
    AwaitingFollowUp,
    Complete,
}

impl FlowStep {
    /// Entity kind a slot step is waiting for
    pub fn expected_kind(&self) -> Option<EntityKind> {
        match self {
            FlowStep::AwaitingExercise => Some(EntityKind::Exercise),
            FlowStep::AwaitingReps => Some(EntityKind::Reps),
            FlowStep::AwaitingWeight => Some(EntityKind::Weight),
            FlowStep::AwaitingMuscleGroup => Some(EntityKind::MuscleGroup),
            FlowStep::AwaitingDuration => Some(EntityKind::Duration),
            FlowStep::AwaitingFollowUp | FlowStep::Complete => None,
        }
    }

    /// Position in its kind's graph
    fn rank(&self) -> u8 {
        match self {
            FlowStep::AwaitingExercise | FlowStep::AwaitingMuscleGroup | FlowStep::AwaitingFollowUp => 0,
            FlowStep::AwaitingReps | FlowStep::AwaitingDuration => 1,
            FlowStep::AwaitingWeight => 2,
            FlowStep::Complete => 3,
        }
    }
}

/// Slots collected so far
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowData {
    pub exercise_id: Option<String>,
    pub exercise_name: Option<String>,
    /// Set with `exercise_id`; bodyweight exercises skip the weight step
    pub bodyweight: bool,
    pub reps: Option<u32>,
    pub weight: Option<f64>,
    pub unit: Option<Unit>,
    pub muscle_group: Option<MuscleGroup>,
    pub duration_min: Option<u32>,
    /// User turns answered inside a conversational flow
    pub exchanges: u32,
}

/// One open multi-turn exchange
#[derive(Debug, Clone)]
pub struct ConversationFlow {
    pub id: Uuid,
    pub kind: FlowKind,
    pub step: FlowStep,
    pub data: FlowData,
    pub started_at: DateTime<Utc>,
    pub step_timeout: Duration,
    pub deadline: Instant,
    /// Reply generation failed last turn and is owed on the next one
    pub retry_pending: bool,
    /// Times the current step has been asked again
    pub reprompts: u32,
}

impl ConversationFlow {
    pub fn new(kind: FlowKind, data: FlowData, step_timeout: Duration) -> Self {
        let mut flow = Self {
            id: Uuid::new_v4(),
            kind,
            step: FlowStep::AwaitingExercise,
            data,
            started_at: Utc::now(),
            step_timeout,
            deadline: Instant::now() + step_timeout,
            retry_pending: false,
            reprompts: 0,
        };
        flow.step = flow.first_unfilled();
        flow
    }

    /// First step whose slot is still empty
    pub fn first_unfilled(&self) -> FlowStep {
        let d = &self.data;
        match self.kind {
            FlowKind::SetLogging => {
                if d.exercise_id.is_none() {
                    FlowStep::AwaitingExercise
                } else if d.reps.is_none() {
                    FlowStep::AwaitingReps
                } else if d.weight.is_none() && !d.bodyweight {
                    FlowStep::AwaitingWeight
                } else {
                    FlowStep::Complete
                }
            }
            FlowKind::WorkoutSetup => {
                if d.muscle_group.is_none() {
                    FlowStep::AwaitingMuscleGroup
                } else if d.duration_min.is_none() {
                    FlowStep::AwaitingDuration
                } else {
                    FlowStep::Complete
                }
            }
            FlowKind::FormDiscussion | FlowKind::NutritionChat | FlowKind::MotivationSession => {
                if d.exchanges == 0 {
                    FlowStep::AwaitingFollowUp
                } else {
                    FlowStep::Complete
                }
            }
        }
    }

    /// Move to the next unfilled step; returns true if the step changed
    pub fn advance(&mut self) -> bool {
        let next = self.first_unfilled();
        debug_assert!(next.rank() >= self.step.rank(), "flow steps only move forward");
        if next == self.step {
            return false;
        }
        self.step = next;
        self.reprompts = 0;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.step == FlowStep::Complete
    }

    /// Push the deadline out by one step timeout from `now`
    pub fn rearm(&mut self, now: Instant) {
        self.deadline = now + self.step_timeout;
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Milliseconds left before the step expires
    pub fn remaining_ms(&self, now: Instant) -> u64 {
        self.deadline.saturating_duration_since(now).as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_logging(data: FlowData) -> ConversationFlow {
        ConversationFlow::new(FlowKind::SetLogging, data, Duration::from_secs(30))
    }

    #[test]
    fn test_set_logging_starts_at_first_gap() {
        assert_eq!(set_logging(FlowData::default()).step, FlowStep::AwaitingExercise);

        let flow = set_logging(FlowData {
            exercise_id: Some("bench_press".into()),
            weight: Some(185.0),
            ..Default::default()
        });
        assert_eq!(flow.step, FlowStep::AwaitingReps);
    }

    #[test]
    fn test_multiple_slots_skip_steps() {
        let mut flow = set_logging(FlowData::default());
        flow.data.exercise_id = Some("squat".into());
        flow.data.reps = Some(5);
        flow.data.weight = Some(225.0);
        assert!(flow.advance());
        assert!(flow.is_complete());
    }

    #[test]
    fn test_bodyweight_skips_weight() {
        let mut flow = set_logging(FlowData::default());
        flow.data.exercise_id = Some("push_up".into());
        flow.data.bodyweight = true;
        flow.advance();
        assert_eq!(flow.step, FlowStep::AwaitingReps);
        flow.data.reps = Some(20);
        flow.advance();
        assert!(flow.is_complete());
    }

    #[test]
    fn test_no_advance_without_data() {
        let mut flow = set_logging(FlowData::default());
        flow.reprompts = 1;
        assert!(!flow.advance());
        assert_eq!(flow.reprompts, 1);
    }

    #[test]
    fn test_workout_setup_graph() {
        let mut flow = ConversationFlow::new(FlowKind::WorkoutSetup, FlowData::default(), Duration::from_secs(30));
        assert_eq!(flow.step, FlowStep::AwaitingMuscleGroup);
        assert_eq!(flow.step.expected_kind(), Some(EntityKind::MuscleGroup));
        flow.data.muscle_group = Some(MuscleGroup::Legs);
        flow.advance();
        assert_eq!(flow.step, FlowStep::AwaitingDuration);
    }

    #[test]
    fn test_conversational_single_exchange() {
        let mut flow = ConversationFlow::new(FlowKind::NutritionChat, FlowData::default(), Duration::from_secs(45));
        assert!(flow.kind.is_conversational());
        assert_eq!(flow.step, FlowStep::AwaitingFollowUp);
        flow.data.exchanges = 1;
        flow.advance();
        assert!(flow.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline() {
        let flow = set_logging(FlowData::default());
        let start = Instant::now();
        assert!(!flow.is_expired(start));
        assert_eq!(flow.remaining_ms(start), 30_000);
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(flow.is_expired(Instant::now()));
    }
}
