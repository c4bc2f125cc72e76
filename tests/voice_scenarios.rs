//! End-to-end turns through a voice session

use fitvoice::command::ActionKind;
use fitvoice::conversation::{EmotionTag, FlowKind, FlowStep, SessionContext, TurnInput, TurnOutcome};
use fitvoice::core::types::{EntityKind, Unit};
use fitvoice::llm::IntentLabel;
use fitvoice::memory::MemoryStore;
use fitvoice::{Engine, EngineConfig, VoiceSession};
use std::sync::Arc;
use std::time::Duration;

async fn start() -> VoiceSession {
    let engine = Arc::new(Engine::offline(EngineConfig::default()).unwrap());
    VoiceSession::start(engine, Arc::new(MemoryStore::new()), "athlete").await
}

fn log_set_count(outcome: &TurnOutcome) -> usize {
    outcome
        .output
        .actions
        .iter()
        .filter(|a| a.kind == ActionKind::LogSet)
        .count()
}

/// Scenario A: a complete set logs immediately
#[tokio::test]
async fn test_complete_set_logs_without_flow() {
    let mut session = start().await;
    let outcome = session
        .handle_turn(TurnInput::new("I did squats 10 times with 225 lbs"))
        .await;

    let intent = outcome.intent.as_ref().unwrap();
    assert_eq!(intent.label, IntentLabel::LogExercise);
    assert!(intent.confidence >= 0.8);

    let exercise = intent.entities.iter().find(|e| e.kind == EntityKind::Exercise).unwrap();
    assert_eq!(exercise.as_text(), Some("squat"));
    let weight = intent.entities.iter().find(|e| e.kind == EntityKind::Weight).unwrap();
    assert_eq!(weight.as_number(), Some(225.0));
    assert_eq!(weight.unit, Some(Unit::Lbs));

    assert!(outcome.active_flow.is_none());
    assert_eq!(log_set_count(&outcome), 1);
    let params = &outcome.output.actions[0].parameters;
    assert_eq!(params["exercise_id"], "squat");
    assert_eq!(params["reps"], 10);
    assert_eq!(params["unit"], "lbs");
}

/// Scenario B: reps for the exercise the app already shows
#[tokio::test]
async fn test_quick_log_inherits_exercise() {
    let mut session = start().await;
    let outcome = session
        .handle_turn(TurnInput::new("8 reps").with_exercise("bench press"))
        .await;

    let intent = outcome.intent.as_ref().unwrap();
    assert_eq!(intent.label, IntentLabel::QuickLog);
    assert_eq!(intent.entities.len(), 1);
    assert_eq!(intent.entities[0].kind, EntityKind::Reps);
    assert_eq!(intent.entities[0].as_number(), Some(8.0));

    assert!(outcome.active_flow.is_none());
    assert!(!outcome.output.expects_follow_up);
    assert_eq!(log_set_count(&outcome), 1);
    assert_eq!(outcome.output.actions[0].parameters["exercise_id"], "bench_press");
}

/// Scenario C: a bare number is questioned, not guessed
#[tokio::test]
async fn test_bare_number_asks_before_acting() {
    let mut session = start().await;
    let outcome = session.handle_turn(TurnInput::new("225")).await;

    let intent = outcome.intent.as_ref().unwrap();
    assert_eq!(intent.label, IntentLabel::Unknown);
    assert!(intent.confidence < 0.3);
    assert!(outcome.output.expects_follow_up);
    assert_eq!(outcome.output.emotion, EmotionTag::Questioning);
    assert!(outcome.output.actions.is_empty());
    assert!(outcome.active_flow.is_none());
}

/// Scenario D: cancel mid-flow
#[tokio::test]
async fn test_cancel_mid_flow() {
    let mut session = start().await;
    let outcome = session.handle_turn(TurnInput::new("log bench press")).await;
    assert_eq!(outcome.active_flow.unwrap().kind, FlowKind::SetLogging);

    let outcome = session.handle_turn(TurnInput::new("cancel")).await;
    assert!(outcome.active_flow.is_none());
    assert!(outcome.output.actions.is_empty());
    assert!(outcome.output.response_text.starts_with("Okay"));

    // the next number is a fresh turn, not an answer to the cancelled flow
    let outcome = session.handle_turn(TurnInput::new("8")).await;
    assert_eq!(log_set_count(&outcome), 0);
}

#[tokio::test]
async fn test_three_turn_logging_emits_one_set() {
    let mut session = start().await;
    let mut context = SessionContext::default();
    let mut log_sets = 0;

    let steps = [
        ("log a set", Some(FlowStep::AwaitingExercise)),
        ("deadlift", Some(FlowStep::AwaitingReps)),
        ("five", Some(FlowStep::AwaitingWeight)),
        ("three fifteen", None),
    ];
    for (text, expected) in steps {
        let outcome = session
            .handle_turn(TurnInput::new(text).with_context(context.clone()))
            .await;
        assert_eq!(outcome.active_flow.map(|f| f.step), expected, "after {:?}", text);
        log_sets += log_set_count(&outcome);
        context = outcome.next_context;
    }

    assert_eq!(log_sets, 1);
    assert_eq!(context.current_exercise_name.as_deref(), Some("deadlift"));
}

#[tokio::test]
async fn test_one_turn_can_fill_several_slots() {
    let mut session = start().await;
    session.handle_turn(TurnInput::new("log a set")).await;

    let outcome = session.handle_turn(TurnInput::new("bench press 8 at 185")).await;
    assert!(outcome.active_flow.is_none());
    assert_eq!(log_set_count(&outcome), 1);
    assert_eq!(outcome.output.actions[0].parameters["weight"], 185.0);
}

#[tokio::test]
async fn test_bodyweight_answer_completes_weight_step() {
    let mut session = start().await;
    session.handle_turn(TurnInput::new("log squats")).await;
    session.handle_turn(TurnInput::new("twelve")).await;

    let outcome = session.handle_turn(TurnInput::new("bodyweight")).await;
    assert_eq!(log_set_count(&outcome), 1);
    assert!(!outcome.output.actions[0].parameters.contains_key("unit"));
}

#[tokio::test(start_paused = true)]
async fn test_expired_flow_leaves_next_turn_fresh() {
    let mut session = start().await;
    let outcome = session.handle_turn(TurnInput::new("log bench press")).await;
    assert_eq!(outcome.output.follow_up_timeout_ms, Some(30_000));

    tokio::time::sleep(Duration::from_secs(30) + Duration::from_millis(1)).await;

    let outcome = session.handle_turn(TurnInput::new("eight")).await;
    assert!(outcome.intent.is_some());
    assert!(outcome.active_flow.is_none());
    assert_eq!(log_set_count(&outcome), 0);

    session.flush_learning().await;
    assert_eq!(session.profile().await.expired_flows, 1);
}

#[tokio::test(start_paused = true)]
async fn test_answer_rearms_step_timer() {
    let mut session = start().await;
    session.handle_turn(TurnInput::new("log bench press")).await;

    tokio::time::sleep(Duration::from_secs(20)).await;
    let outcome = session.handle_turn(TurnInput::new("eight")).await;
    assert_eq!(outcome.active_flow.unwrap().step, FlowStep::AwaitingWeight);

    // 40 s after the flow opened but only 20 s after the last answer
    tokio::time::sleep(Duration::from_secs(20)).await;
    let outcome = session.handle_turn(TurnInput::new("one eighty five")).await;
    assert_eq!(log_set_count(&outcome), 1);
}

#[tokio::test]
async fn test_stateless_intents_open_no_flow() {
    let mut session = start().await;
    for text in ["help", "what muscles does deadlift work", "show my history", "next exercise"] {
        let outcome = session.handle_turn(TurnInput::new(text)).await;
        assert!(outcome.active_flow.is_none(), "{}", text);
    }
}

#[tokio::test]
async fn test_workout_controls_emit_actions() {
    let mut session = start().await;
    let cases = [
        ("next exercise", ActionKind::NextExercise),
        ("pause the workout", ActionKind::PauseWorkout),
        ("resume", ActionKind::ResumeWorkout),
        ("end workout", ActionKind::EndWorkout),
        ("start rest timer for 2 minutes", ActionKind::StartRestTimer),
        ("go to settings", ActionKind::Navigate),
    ];
    for (text, kind) in cases {
        let outcome = session.handle_turn(TurnInput::new(text)).await;
        assert_eq!(outcome.output.actions.len(), 1, "{}", text);
        assert_eq!(outcome.output.actions[0].kind, kind, "{}", text);
    }
}

#[tokio::test]
async fn test_rest_timer_duration() {
    let mut session = start().await;
    let outcome = session
        .handle_turn(TurnInput::new("start rest timer for 2 minutes"))
        .await;
    assert_eq!(outcome.output.actions[0].parameters["seconds"], 120);
}

#[tokio::test]
async fn test_conversational_flow_closes_after_follow_up() {
    let mut session = start().await;
    let outcome = session
        .handle_turn(TurnInput::new("how much protein should I eat"))
        .await;
    assert_eq!(outcome.intent.as_ref().unwrap().label, IntentLabel::Nutrition);
    assert_eq!(outcome.active_flow.unwrap().kind, FlowKind::NutritionChat);
    assert_eq!(outcome.output.follow_up_timeout_ms, Some(45_000));

    let outcome = session.handle_turn(TurnInput::new("about 180 pounds")).await;
    assert!(outcome.active_flow.is_none());
    assert!(outcome.output.actions.is_empty());
}

#[tokio::test]
async fn test_signals_reported() {
    let mut session = start().await;
    let outcome = session
        .handle_turn(TurnInput::new("ugh that set was terrible"))
        .await;
    assert_eq!(outcome.signals.mood, fitvoice::memory::Mood::Frustrated);
}
