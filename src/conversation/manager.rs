//! Conversation flow manager
//!
//! Owns the session's single flow slot and its step timer. Each turn either
//! answers the active flow (scoped extraction, no classification) or is
//! classified and routed. Side effects are only ever produced as actions, and
//! a flow's terminal action is emitted by the turn that completes it.

use crate::command::executor::{Command, CommandExecutor, WorkoutControl};
use crate::command::resolver::{ExerciseSource, SetRequest, SetResolution, SetResolver, WeightSource};
use crate::conversation::flow::{ConversationFlow, FlowData, FlowKind};
use crate::conversation::responses;
use crate::conversation::timer::{FlowSlot, FlowTimer, SharedSlot};
use crate::conversation::turn::{EmotionTag, FlowState, SessionContext, TurnOutput};
use crate::core::error::Result;
use crate::core::types::{EntityKind, Unit};
use crate::llm::context::ClassifierContext;
use crate::llm::intent::{IntentLabel, IntentResult};
use crate::llm::reply::{self, ReplyRequest, Topic};
use crate::memory::learning::{phrasing_key, LearningEvent};
use crate::memory::profile::UserPreferenceProfile;
use crate::memory::signals::Signals;
use crate::nlp::extractor::{Extraction, ExtractionHints};
use crate::session::engine::Engine;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const CANCEL_PHRASES: &[&str] = &["cancel", "stop", "never mind", "nevermind", "forget it"];

/// Longest utterance still read as a cancel command while a flow is open
const CANCEL_MAX_WORDS: usize = 4;

const SCREENS: &[&str] = &["history", "stats", "progress", "settings", "profile", "home", "calendar"];

/// Read-only inputs for one turn
pub struct TurnContext<'a> {
    pub normalized: &'a str,
    pub session: &'a SessionContext,
    /// Snapshot taken at turn start
    pub profile: &'a UserPreferenceProfile,
    pub signals: Signals,
    pub recent_inputs: Vec<String>,
    pub cancel: &'a CancellationToken,
}

/// What the manager decided for one turn
#[derive(Debug)]
pub struct FlowTurn {
    pub output: TurnOutput,
    pub intent: Option<IntentResult>,
    pub next_context: SessionContext,
    pub events: Vec<LearningEvent>,
    pub active_flow: Option<FlowState>,
}

pub struct FlowManager {
    slot: SharedSlot,
    timer: FlowTimer,
}

impl Default for FlowManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowManager {
    pub fn new() -> Self {
        let slot: SharedSlot = Arc::new(Mutex::new(FlowSlot::default()));
        Self {
            timer: FlowTimer::new(slot.clone()),
            slot,
        }
    }

    pub async fn active_flow(&self) -> Option<FlowState> {
        self.slot.lock().await.flow().map(|flow| FlowState {
            kind: flow.kind,
            step: flow.step,
        })
    }

    /// Run one turn through the active flow or the intent router
    pub async fn handle(&mut self, engine: &Engine, ctx: TurnContext<'_>) -> FlowTurn {
        self.timer.cancel();
        // The slot stays unlocked while the turn runs; a stale timer can no
        // longer match its generation once the flow is taken
        let (expired, mut active) = {
            let mut slot = self.slot.lock().await;
            (slot.take_expired(), slot.take())
        };

        let mut run = TurnRun::new(engine, &ctx);
        if let Some(kind) = expired {
            run.events.push(LearningEvent::FlowExpired(kind));
        }

        if let Some(flow) = &active {
            if flow.is_expired(Instant::now()) {
                tracing::info!("{} flow expired before this turn; starting fresh", flow.kind.as_str());
                run.events.push(LearningEvent::FlowExpired(flow.kind));
                active = None;
            }
        }

        let handled = match active {
            Some(flow) if is_cancel(ctx.normalized, CANCEL_MAX_WORDS) => {
                tracing::info!("{} flow cancelled by user", flow.kind.as_str());
                run.events.push(LearningEvent::FlowCancelled(flow.kind));
                Handled::done(responses::cancelled(flow.kind))
            }
            Some(flow) if flow.kind.is_conversational() => run.continue_conversation(flow).await,
            Some(flow) => run.continue_slots(flow),
            None if is_cancel(ctx.normalized, 2) => Handled::done(responses::nothing_to_cancel()),
            None => run.route().await,
        };

        let active_flow = match handled.flow {
            Some(mut flow) => {
                flow.rearm(Instant::now());
                let state = FlowState {
                    kind: flow.kind,
                    step: flow.step,
                };
                let timeout = flow.step_timeout;
                let generation = self.slot.lock().await.install(flow);
                self.timer.arm(generation, timeout);
                Some(state)
            }
            None => None,
        };

        run.finish(handled.output, handled.intent, active_flow)
    }

    /// Stop the step timer; the flow itself is left in place
    pub fn shutdown(&mut self) {
        self.timer.shutdown();
    }
}

/// Result of one handler before the flow is stored back
struct Handled {
    output: TurnOutput,
    intent: Option<IntentResult>,
    flow: Option<ConversationFlow>,
}

impl Handled {
    fn done(output: TurnOutput) -> Self {
        Self {
            output,
            intent: None,
            flow: None,
        }
    }

    fn open(output: TurnOutput, flow: ConversationFlow) -> Self {
        Self {
            output,
            intent: None,
            flow: Some(flow),
        }
    }

    fn with_intent(mut self, intent: IntentResult) -> Self {
        self.intent = Some(intent);
        self
    }
}

/// Per-turn working state
struct TurnRun<'e, 'c> {
    engine: &'e Engine,
    ctx: &'c TurnContext<'c>,
    events: Vec<LearningEvent>,
    units: Vec<Unit>,
    next_context: SessionContext,
}

impl<'e, 'c> TurnRun<'e, 'c> {
    fn new(engine: &'e Engine, ctx: &'c TurnContext<'c>) -> Self {
        Self {
            engine,
            ctx,
            events: Vec::new(),
            units: Vec::new(),
            next_context: ctx.session.clone(),
        }
    }

    fn resolver(&self) -> SetResolver<'_> {
        SetResolver::new(
            &self.engine.catalog,
            self.ctx.profile,
            self.engine.config.fuzzy_match_threshold,
        )
    }

    fn slot_timeout_ms(&self) -> u64 {
        self.engine.config.slot_step_timeout_ms
    }

    fn extract(&mut self, hints: ExtractionHints<'_>) -> Extraction {
        let extraction = self.engine.extractor.extract(self.ctx.normalized, &hints);
        self.note_units(&extraction);
        extraction
    }

    fn note_units(&mut self, extraction: &Extraction) {
        self.units.extend(
            extraction
                .entities
                .iter()
                .filter_map(|e| e.unit)
                .filter(Unit::is_weight),
        );
    }

    // === ACTIVE FLOWS ===

    fn continue_slots(&mut self, mut flow: ConversationFlow) -> Handled {
        let expected = flow.step.expected_kind();
        let active_exercise = flow.data.exercise_id.clone();
        let extraction = self.extract(ExtractionHints {
            active_exercise: active_exercise.as_deref(),
            expected,
            profile: Some(self.ctx.profile),
        });

        let filled = match flow.kind {
            FlowKind::SetLogging => self.fill_set(&mut flow.data, &extraction),
            FlowKind::WorkoutSetup => fill_workout(&mut flow.data, &extraction),
            _ => false,
        };

        if !filled {
            flow.reprompts += 1;
            tracing::debug!(
                "No {:?} in {:?}; asking again ({} times)",
                expected,
                self.ctx.normalized,
                flow.reprompts
            );
            let output = responses::reprompt(
                flow.step,
                flow.data.exercise_name.as_deref(),
                self.slot_timeout_ms(),
            );
            return Handled::open(output, flow);
        }

        if flow.advance() {
            tracing::debug!("{} flow advanced to {:?}", flow.kind.as_str(), flow.step);
        }
        self.settle(flow)
    }

    /// Ask for the next step, or run the terminal action
    fn settle(&mut self, flow: ConversationFlow) -> Handled {
        if !flow.is_complete() {
            let output = responses::ask(flow.step, flow.data.exercise_name.as_deref(), self.slot_timeout_ms());
            return Handled::open(output, flow);
        }

        tracing::info!("{} flow complete", flow.kind.as_str());
        let output = match flow.kind {
            FlowKind::SetLogging => match set_request_from(&flow.data) {
                Some(request) => self.log_set(request, None),
                None => responses::rejected("Set is missing its exercise or reps"),
            },
            FlowKind::WorkoutSetup => match (flow.data.muscle_group, flow.data.duration_min) {
                (Some(muscle_group), Some(duration_min)) => {
                    let result = CommandExecutor::execute(&Command::StartWorkout {
                        muscle_group,
                        duration_min,
                    });
                    responses::workout_started(&flow.data, result.actions)
                }
                _ => responses::rejected("Workout setup is incomplete"),
            },
            _ => TurnOutput::say("All set.", EmotionTag::Neutral),
        };
        Handled::done(output)
    }

    fn fill_set(&self, data: &mut FlowData, extraction: &Extraction) -> bool {
        let mut filled = false;

        if data.exercise_id.is_none() {
            if let Some(id) = extraction.exercise_id() {
                let exercise = self.resolver().by_id(id, ExerciseSource::Flow);
                data.exercise_id = Some(exercise.id);
                data.exercise_name = Some(exercise.name);
                data.bodyweight = exercise.bodyweight;
                filled = true;
            }
        }
        if data.reps.is_none() {
            if let Some(reps) = extraction.reps().filter(|r| *r > 0) {
                data.reps = Some(reps);
                filled = true;
            }
        }
        if data.weight.is_none() {
            if let Some(weight) = extraction.weight() {
                data.weight = Some(weight);
                data.unit = self.resolver().unit_for(weight, extraction.weight_unit());
                filled = true;
            }
        }
        filled
    }

    async fn continue_conversation(&mut self, mut flow: ConversationFlow) -> Handled {
        let topic = topic_for(flow.kind);
        let exercise = flow.data.exercise_name.clone();

        match self.converse(topic, exercise.as_deref(), true).await {
            Ok(text) => {
                flow.data.exchanges += 1;
                flow.advance();
                tracing::info!("{} flow closed after follow-up", flow.kind.as_str());
                Handled::done(TurnOutput::say(text, emotion_for(topic)))
            }
            Err(e) if !flow.retry_pending => {
                tracing::warn!(
                    "Reply generation failed; keeping {} flow for one retry: {}",
                    flow.kind.as_str(),
                    e
                );
                flow.retry_pending = true;
                let timeout_ms = flow.step_timeout.as_millis() as u64;
                Handled::open(responses::generation_failed(timeout_ms), flow)
            }
            Err(e) => {
                tracing::warn!("Reply generation failed again; closing with local reply: {}", e);
                let request = self.reply_request(topic, exercise.as_deref(), true);
                Handled::done(TurnOutput::say(reply::canned(&request), emotion_for(topic)))
            }
        }
    }

    // === ROUTING ===

    async fn route(&mut self) -> Handled {
        let ctx = self.ctx;
        let context_exercise = ctx
            .session
            .current_exercise_name
            .as_deref()
            .map(|name| self.resolver().context_exercise(name));

        let extraction = self.extract(ExtractionHints {
            active_exercise: context_exercise.as_ref().map(|e| e.id.as_str()),
            expected: None,
            profile: Some(ctx.profile),
        });

        let classifier_context = ClassifierContext {
            current_exercise: context_exercise.as_ref().map(|e| e.name.clone()),
            previous_intent: ctx.session.previous_intent,
            signals: ctx.signals,
            ..Default::default()
        }
        .with_recent(ctx.recent_inputs.iter().cloned());

        let intent = self
            .engine
            .classifier
            .classify(ctx.normalized, &extraction, &classifier_context, ctx.cancel)
            .await;
        tracing::debug!(
            "Intent {} ({:.2}, {:?}): {}",
            intent.label.as_str(),
            intent.confidence,
            intent.source,
            intent.interpretation_note
        );

        // Backend guesses may have added entities
        let extraction = Extraction {
            entities: intent.entities.clone(),
        };
        self.next_context.previous_intent = Some(intent.label);
        let context_name = ctx.session.current_exercise_name.as_deref();

        let handled = match intent.label {
            IntentLabel::LogExercise => {
                let resolution = self.resolver().resolve(&extraction, context_name);
                self.log_or_open(resolution)
            }
            IntentLabel::QuickLog => {
                let resolution = self.resolver().resolve_quick(&extraction, context_name);
                match resolution.clone().into_request() {
                    Some(request) => Handled::done(self.log_set(request, phrasing_key(ctx.normalized))),
                    None => self.open_set_logging(resolution),
                }
            }
            IntentLabel::RestTimer => Handled::done(self.rest_timer(&extraction)),
            IntentLabel::WorkoutControl => {
                let context_id = context_exercise.as_ref().map(|e| e.id.as_str());
                self.workout_control(&extraction, context_id)
            }
            IntentLabel::Navigation => Handled::done(self.navigate()),
            IntentLabel::Help => Handled::done(responses::help()),
            IntentLabel::FormAnalysis => {
                let fallback = context_exercise.as_ref().map(|e| e.name.clone());
                self.open_conversation(FlowKind::FormDiscussion, &extraction, fallback)
                    .await
            }
            IntentLabel::Nutrition => {
                self.open_conversation(FlowKind::NutritionChat, &extraction, None)
                    .await
            }
            IntentLabel::Motivation => {
                self.open_conversation(FlowKind::MotivationSession, &extraction, None)
                    .await
            }
            IntentLabel::ExerciseInfo | IntentLabel::AskAi => {
                let topic = if intent.label == IntentLabel::ExerciseInfo {
                    Topic::ExerciseInfo
                } else {
                    Topic::General
                };
                let exercise = self
                    .exercise_name(&extraction)
                    .or_else(|| context_exercise.as_ref().map(|e| e.name.clone()));
                Handled::done(self.answer(topic, exercise.as_deref()).await)
            }
            IntentLabel::Unknown => Handled::done(self.unknown(&extraction)),
        };
        handled.with_intent(intent)
    }

    fn log_or_open(&mut self, resolution: SetResolution) -> Handled {
        if resolution.is_complete() {
            if let Some(request) = resolution.into_request() {
                return Handled::done(self.log_set(request, phrasing_key(self.ctx.normalized)));
            }
            return Handled::done(responses::rejected("Set is missing its exercise or reps"));
        }
        self.open_set_logging(resolution)
    }

    fn open_set_logging(&mut self, resolution: SetResolution) -> Handled {
        let mut data = FlowData {
            reps: resolution.reps.filter(|r| *r > 0),
            weight: resolution.weight,
            unit: resolution.unit,
            ..Default::default()
        };
        if let Some(exercise) = resolution.exercise {
            data.exercise_id = Some(exercise.id);
            data.exercise_name = Some(exercise.name);
            data.bodyweight = exercise.bodyweight;
        }

        let flow = ConversationFlow::new(FlowKind::SetLogging, data, self.engine.slot_step_timeout());
        tracing::info!("Opened SET_LOGGING flow {} at {:?}", flow.id, flow.step);
        self.settle(flow)
    }

    fn log_set(&mut self, request: SetRequest, phrasing: Option<String>) -> TurnOutput {
        let result = CommandExecutor::execute(&Command::LogSet(request.clone()));
        if let Some(error) = result.error {
            return responses::rejected(&error);
        }

        tracing::info!(
            "Logging {} x{} at {:?} {:?}",
            request.exercise_id,
            request.reps,
            request.weight,
            request.unit
        );
        self.events.push(LearningEvent::SetLogged {
            exercise_id: request.exercise_id.clone(),
            reps: Some(request.reps),
            weight: request.weight,
            unit: request.unit,
            phrasing,
            at: Utc::now(),
        });
        self.next_context.current_exercise_name = Some(request.exercise_name.clone());
        responses::logged(&request, result.actions, self.ctx.signals.mood)
    }

    fn rest_timer(&self, extraction: &Extraction) -> TurnOutput {
        let seconds = extraction
            .rest_seconds()
            .or_else(|| extraction.duration_seconds())
            .or_else(|| first_number(extraction).map(|v| v.round() as u32))
            .filter(|s| *s > 0)
            .unwrap_or(self.engine.config.default_rest_seconds);

        let result = CommandExecutor::execute(&Command::StartRestTimer { seconds });
        match result.error {
            Some(error) => responses::rejected(&error),
            None => responses::rest_timer(seconds, result.actions),
        }
    }

    fn workout_control(&mut self, extraction: &Extraction, context_exercise_id: Option<&str>) -> Handled {
        let ctx = self.ctx;
        if ctx
            .normalized
            .split_whitespace()
            .any(|t| matches!(t, "start" | "begin" | "new"))
        {
            return self.start_workout(extraction);
        }

        let Some(control) = WorkoutControl::detect(ctx.normalized) else {
            return Handled::done(responses::unclear_control());
        };
        let result = CommandExecutor::execute(&Command::Workout(control));
        let next_hint = match control {
            WorkoutControl::NextExercise => context_exercise_id
                .and_then(|id| ctx.profile.likely_next(id))
                .map(|id| self.engine.catalog.display_name(id).to_string()),
            _ => None,
        };
        Handled::done(responses::workout_control(control, next_hint.as_deref(), result.actions))
    }

    fn start_workout(&mut self, extraction: &Extraction) -> Handled {
        let mut data = FlowData::default();
        fill_workout(&mut data, extraction);
        let flow = ConversationFlow::new(FlowKind::WorkoutSetup, data, self.engine.slot_step_timeout());
        if !flow.is_complete() {
            tracing::info!("Opened WORKOUT_SETUP flow {} at {:?}", flow.id, flow.step);
        }
        self.settle(flow)
    }

    fn navigate(&self) -> TurnOutput {
        let screen = self
            .ctx
            .normalized
            .split_whitespace()
            .find(|t| SCREENS.contains(t));
        let Some(screen) = screen else {
            return responses::unknown_screen();
        };
        let result = CommandExecutor::execute(&Command::Navigate {
            screen: screen.to_string(),
        });
        responses::navigate(screen, result.actions)
    }

    fn unknown(&self, extraction: &Extraction) -> TurnOutput {
        if !extraction.has(EntityKind::Exercise) {
            if let Some(value) = first_number(extraction) {
                return responses::clarify_number(value, self.slot_timeout_ms());
            }
        }
        responses::help()
    }

    // === CONVERSATIONAL REPLIES ===

    async fn open_conversation(
        &mut self,
        kind: FlowKind,
        extraction: &Extraction,
        fallback_exercise: Option<String>,
    ) -> Handled {
        let exercise_name = self.exercise_name(extraction).or(fallback_exercise);
        let data = FlowData {
            exercise_id: extraction.exercise_id().map(str::to_string),
            exercise_name: exercise_name.clone(),
            ..Default::default()
        };
        let mut flow = ConversationFlow::new(kind, data, self.engine.conversational_step_timeout());
        let timeout_ms = flow.step_timeout.as_millis() as u64;
        let topic = topic_for(kind);

        let output = match self.converse(topic, exercise_name.as_deref(), false).await {
            Ok(text) => TurnOutput::say(text, emotion_for(topic)).asking(timeout_ms),
            Err(e) => {
                tracing::warn!("Opening reply failed; {} flow will retry next turn: {}", kind.as_str(), e);
                flow.retry_pending = true;
                responses::generation_failed(timeout_ms)
            }
        };
        tracing::info!("Opened {} flow {}", kind.as_str(), flow.id);
        Handled::open(output, flow)
    }

    /// Stateless answer; local reply when the backend fails
    async fn answer(&self, topic: Topic, exercise: Option<&str>) -> TurnOutput {
        let text = match self.converse(topic, exercise, true).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Answer generation failed; using local reply: {}", e);
                reply::canned(&self.reply_request(topic, exercise, true))
            }
        };
        TurnOutput::say(text, emotion_for(topic))
    }

    async fn converse(&self, topic: Topic, exercise: Option<&str>, closing: bool) -> Result<String> {
        let request = self.reply_request(topic, exercise, closing);
        self.engine.replies.generate(&request, self.ctx.cancel).await
    }

    fn reply_request<'r>(&'r self, topic: Topic, exercise: Option<&'r str>, closing: bool) -> ReplyRequest<'r> {
        ReplyRequest {
            topic,
            utterance: self.ctx.normalized,
            exercise,
            signals: self.ctx.signals,
            style: self.ctx.profile.communication_style,
            closing,
        }
    }

    fn exercise_name(&self, extraction: &Extraction) -> Option<String> {
        extraction
            .exercise_id()
            .map(|id| self.engine.catalog.display_name(id).to_string())
    }

    // === WRAP-UP ===

    fn finish(mut self, output: TurnOutput, intent: Option<IntentResult>, active_flow: Option<FlowState>) -> FlowTurn {
        let words = self.ctx.normalized.split_whitespace().count();
        if words > 0 {
            self.events.push(LearningEvent::Utterance {
                words,
                units: std::mem::take(&mut self.units),
                signals: self.ctx.signals,
            });
        }
        FlowTurn {
            output,
            intent,
            next_context: self.next_context,
            events: self.events,
            active_flow,
        }
    }
}

fn fill_workout(data: &mut FlowData, extraction: &Extraction) -> bool {
    let mut filled = false;
    if data.muscle_group.is_none() {
        if let Some(group) = extraction.muscle_group() {
            data.muscle_group = Some(group);
            filled = true;
        }
    }
    if data.duration_min.is_none() {
        let minutes = extraction
            .duration_seconds()
            .map(|s| (f64::from(s) / 60.0).round() as u32)
            .or_else(|| extraction.reps().filter(|_| !extraction.has(EntityKind::Duration)));
        if let Some(minutes) = minutes.filter(|m| *m > 0) {
            data.duration_min = Some(minutes);
            filled = true;
        }
    }
    filled
}

fn set_request_from(data: &FlowData) -> Option<SetRequest> {
    let exercise_id = data.exercise_id.clone()?;
    Some(SetRequest {
        exercise_name: data.exercise_name.clone().unwrap_or_else(|| exercise_id.clone()),
        exercise_id,
        reps: data.reps?,
        weight: data.weight,
        unit: data.unit,
        exercise_source: ExerciseSource::Flow,
        weight_source: data.weight.map(|_| WeightSource::Utterance),
    })
}

fn first_number(extraction: &Extraction) -> Option<f64> {
    extraction.entities.iter().find_map(|e| e.as_number())
}

fn topic_for(kind: FlowKind) -> Topic {
    match kind {
        FlowKind::FormDiscussion => Topic::Form,
        FlowKind::NutritionChat => Topic::Nutrition,
        FlowKind::MotivationSession => Topic::Motivation,
        FlowKind::SetLogging | FlowKind::WorkoutSetup => Topic::General,
    }
}

fn emotion_for(topic: Topic) -> EmotionTag {
    match topic {
        Topic::Form | Topic::Nutrition | Topic::ExerciseInfo => EmotionTag::Instructional,
        Topic::Motivation => EmotionTag::Encouraging,
        Topic::General => EmotionTag::Neutral,
    }
}

/// Short utterance containing a cancel phrase
fn is_cancel(normalized: &str, max_words: usize) -> bool {
    let words = normalized.split_whitespace().count();
    if words == 0 || words > max_words {
        return false;
    }
    let padded = format!(" {} ", normalized);
    CANCEL_PHRASES.iter().any(|p| padded.contains(&format!(" {} ", p)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::executor::ActionKind;
    use crate::conversation::flow::FlowStep;
    use crate::core::config::EngineConfig;
    use crate::core::error::VoiceError;
    use crate::llm::client::ReasoningBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Harness {
        engine: Engine,
        manager: FlowManager,
        profile: UserPreferenceProfile,
        session: SessionContext,
        cancel: CancellationToken,
    }

    impl Harness {
        fn new(engine: Engine) -> Self {
            Self {
                engine,
                manager: FlowManager::new(),
                profile: UserPreferenceProfile::default(),
                session: SessionContext::default(),
                cancel: CancellationToken::new(),
            }
        }

        fn offline() -> Self {
            Self::new(Engine::offline(EngineConfig::default()).unwrap())
        }

        async fn say(&mut self, text: &str) -> FlowTurn {
            let normalized = self.engine.normalizer.normalize(text);
            let ctx = TurnContext {
                normalized: &normalized,
                session: &self.session,
                profile: &self.profile,
                signals: Signals::default(),
                recent_inputs: Vec::new(),
                cancel: &self.cancel,
            };
            let turn = self.manager.handle(&self.engine, ctx).await;
            self.session = turn.next_context.clone();
            turn
        }
    }

    fn log_sets(turn: &FlowTurn) -> usize {
        turn.output.actions.iter().filter(|a| a.kind == ActionKind::LogSet).count()
    }

    #[tokio::test]
    async fn test_complete_log_emits_immediately() {
        let mut h = Harness::offline();
        let turn = h.say("I did squats 10 times with 225 lbs").await;

        assert_eq!(turn.intent.as_ref().unwrap().label, IntentLabel::LogExercise);
        assert_eq!(log_sets(&turn), 1);
        assert!(turn.active_flow.is_none());
        assert_eq!(h.session.current_exercise_name.as_deref(), Some("squat"));
        assert!(turn.events.iter().any(|e| matches!(e, LearningEvent::SetLogged { .. })));
    }

    #[tokio::test]
    async fn test_three_turn_set_logging() {
        let mut h = Harness::offline();

        let turn = h.say("log a set").await;
        assert_eq!(turn.active_flow.unwrap().step, FlowStep::AwaitingExercise);
        assert!(turn.output.expects_follow_up);

        let turn = h.say("bench press").await;
        assert!(turn.intent.is_none());
        assert_eq!(turn.active_flow.unwrap().step, FlowStep::AwaitingReps);
        assert_eq!(log_sets(&turn), 0);

        let turn = h.say("eight").await;
        assert_eq!(turn.active_flow.unwrap().step, FlowStep::AwaitingWeight);

        let turn = h.say("one eighty five").await;
        assert!(turn.active_flow.is_none());
        assert_eq!(log_sets(&turn), 1);
        let params = &turn.output.actions[0].parameters;
        assert_eq!(params["exercise_id"], "bench_press");
        assert_eq!(params["reps"], 8);
        assert_eq!(params["weight"], 185.0);

        assert!(h.manager.active_flow().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_extraction_reprompts_same_step() {
        let mut h = Harness::offline();
        h.say("log bench press").await;
        let turn = h.say("banana").await;
        assert_eq!(turn.active_flow.unwrap().step, FlowStep::AwaitingReps);
        assert!(turn.output.response_text.starts_with("Sorry, I didn't catch the reps"));
    }

    #[tokio::test]
    async fn test_cancel_clears_flow() {
        let mut h = Harness::offline();
        h.say("log bench press").await;
        let turn = h.say("never mind").await;

        assert!(turn.active_flow.is_none());
        assert!(turn.output.actions.is_empty());
        assert!(turn.output.response_text.contains("won't log"));
        assert!(turn
            .events
            .contains(&LearningEvent::FlowCancelled(FlowKind::SetLogging)));
        assert!(h.manager.active_flow().await.is_none());
    }

    #[tokio::test]
    async fn test_quick_log_uses_context() {
        let mut h = Harness::offline();
        h.session.current_exercise_name = Some("bench press".into());
        let turn = h.say("8 reps").await;

        assert_eq!(turn.intent.as_ref().unwrap().label, IntentLabel::QuickLog);
        assert_eq!(log_sets(&turn), 1);
        assert_eq!(turn.output.actions[0].parameters["exercise_id"], "bench_press");
        assert!(turn.active_flow.is_none());
    }

    #[tokio::test]
    async fn test_bare_number_asks_for_clarification() {
        let mut h = Harness::offline();
        let turn = h.say("225").await;
        assert_eq!(turn.intent.as_ref().unwrap().label, IntentLabel::Unknown);
        assert!(turn.output.expects_follow_up);
        assert!(turn.output.actions.is_empty());
        assert!(turn.active_flow.is_none());
    }

    #[tokio::test]
    async fn test_rest_timer_default() {
        let mut h = Harness::offline();
        let turn = h.say("start a rest timer").await;
        assert_eq!(turn.output.actions[0].kind, ActionKind::StartRestTimer);
        assert_eq!(turn.output.actions[0].parameters["seconds"], 90);
    }

    #[tokio::test]
    async fn test_workout_setup_flow() {
        let mut h = Harness::offline();
        let turn = h.say("start a leg workout").await;
        assert_eq!(turn.active_flow.unwrap().step, FlowStep::AwaitingDuration);

        let turn = h.say("45 minutes").await;
        assert!(turn.active_flow.is_none());
        let action = &turn.output.actions[0];
        assert_eq!(action.kind, ActionKind::StartWorkout);
        assert_eq!(action.parameters["muscle_group"], "legs");
        assert_eq!(action.parameters["duration_min"], 45);
    }

    #[tokio::test]
    async fn test_conversational_flow_single_follow_up() {
        let mut h = Harness::offline();
        let turn = h.say("can you check my squat form").await;
        assert_eq!(turn.active_flow.unwrap().kind, FlowKind::FormDiscussion);
        assert!(turn.output.expects_follow_up);

        let turn = h.say("my knees cave in at the bottom").await;
        assert!(turn.active_flow.is_none());
        assert!(!turn.output.expects_follow_up);
    }

    struct FlakyBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReasoningBackend for FlakyBackend {
        async fn complete(&self, system: &str, _user: &str) -> Result<String> {
            // intent prompts succeed, the first reply prompt after opening fails
            if system.contains("SUPPORTED INTENTS") {
                return Ok(r#"{"intent": "motivation", "confidence": 0.9}"#.into());
            }
            match self.calls.fetch_add(1, Ordering::SeqCst) {
                1 => Err(VoiceError::Backend("overloaded".into())),
                _ => Ok("You've got this.".into()),
            }
        }
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_flow_for_retry() {
        let backend: Arc<dyn ReasoningBackend> = Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
        });
        let engine = Engine::new(EngineConfig::default(), Some(backend)).unwrap();
        let mut h = Harness::new(engine);

        let turn = h.say("i need some motivation").await;
        assert_eq!(turn.active_flow.unwrap().kind, FlowKind::MotivationSession);

        let turn = h.say("legs feel heavy").await;
        assert_eq!(turn.output.emotion, EmotionTag::Apologetic);
        assert_eq!(turn.active_flow.unwrap().kind, FlowKind::MotivationSession);

        let turn = h.say("legs feel heavy").await;
        assert_eq!(turn.output.response_text, "You've got this.");
        assert!(turn.active_flow.is_none());
    }

    struct SlowBackend;

    #[async_trait]
    impl ReasoningBackend for SlowBackend {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(r#"{"intent": "exercise_info", "confidence": 0.9}"#.into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_unlocked_while_backend_works() {
        let backend: Arc<dyn ReasoningBackend> = Arc::new(SlowBackend);
        let engine = Engine::new(EngineConfig::default(), Some(backend)).unwrap();
        let mut h = Harness::new(engine);
        let slot = h.manager.slot.clone();

        let (turn, unlocked) = tokio::join!(h.say("what muscles does deadlift work"), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            slot.try_lock().is_ok()
        });
        assert!(unlocked);
        assert!(turn.intent.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_flow_is_not_answered() {
        let mut h = Harness::offline();
        h.say("log bench press").await;

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(h.manager.active_flow().await.is_none());

        let turn = h.say("8").await;
        assert!(turn.intent.is_some());
        assert!(turn.events.contains(&LearningEvent::FlowExpired(FlowKind::SetLogging)));
        assert_eq!(log_sets(&turn), 0);
    }

    #[test]
    fn test_cancel_phrases() {
        assert!(is_cancel("cancel", 4));
        assert!(is_cancel("never mind that", 4));
        assert!(is_cancel("forget it", 2));
        assert!(!is_cancel("stop the workout now please thanks", 4));
        assert!(!is_cancel("stopwatch", 4));
    }
}
