//! Per-user voice session
//!
//! Owns everything mutable for one user: the flow manager and its timer,
//! the short-term turn history with its writer task, and the learning task
//! that writes the profile. Turns are processed one at a time.

use crate::conversation::manager::{FlowManager, TurnContext};
use crate::conversation::responses;
use crate::conversation::turn::{RejectReason, SessionContext, TurnInput, TurnOutcome, TurnOutput};
use crate::core::types::Transcript;
use crate::memory::history::{ConversationTurn, HistoryWriter, HistoryWriterHandle, TurnHistory};
use crate::memory::learning::{LearningEngine, LearningEvent, LearningHandle};
use crate::memory::profile::{LoggedSet, UserPreferenceProfile};
use crate::memory::signals::{self, Signals};
use crate::memory::store::{history_key, load_json, profile_key, KeyValueStore};
use crate::session::engine::Engine;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Utterances handed to the classifier as context
const RECENT_INPUTS: usize = 3;

pub struct VoiceSession {
    engine: Arc<Engine>,
    user_id: String,
    manager: FlowManager,
    history: TurnHistory,
    history_writer: HistoryWriterHandle,
    profile: Arc<RwLock<UserPreferenceProfile>>,
    learning: LearningHandle,
    cancel: CancellationToken,
}

impl VoiceSession {
    /// Load the user's profile and history and start the learning task
    ///
    /// Storage failures are logged and the session starts from defaults.
    pub async fn start(engine: Arc<Engine>, store: Arc<dyn KeyValueStore>, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let config = &engine.config;

        let profile = match load_json::<UserPreferenceProfile>(store.as_ref(), &profile_key(&user_id)).await {
            Ok(Some(profile)) => profile,
            Ok(None) => UserPreferenceProfile::default(),
            Err(e) => {
                tracing::warn!("Could not load profile for {}, starting fresh: {}", user_id, e);
                UserPreferenceProfile::default()
            }
        };
        let turns = match load_json::<Vec<ConversationTurn>>(store.as_ref(), &history_key(&user_id)).await {
            Ok(turns) => turns.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Could not load history for {}, starting empty: {}", user_id, e);
                Vec::new()
            }
        };
        let history = TurnHistory::from_turns(turns, config.history_limit);
        tracing::info!(
            "Session for {} started: {} exercises known, {} turns of history",
            user_id,
            profile.exercises.len(),
            history.len()
        );

        let profile = Arc::new(RwLock::new(profile));
        let learning = LearningEngine::new(
            profile.clone(),
            store.clone(),
            profile_key(&user_id),
            config.phrasing_limit,
        )
        .spawn();
        let history_writer = HistoryWriter::new(store, history_key(&user_id)).spawn();

        Self {
            manager: FlowManager::new(),
            engine,
            user_id,
            history,
            history_writer,
            profile,
            learning,
            cancel: CancellationToken::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Run one utterance through the pipeline; never fails
    pub async fn handle_turn(&mut self, input: TurnInput) -> TurnOutcome {
        let context = input.session_context.clone();
        let mut transcript = Transcript::captured(input.transcript.clone(), input.recognizer_confidence);

        if input.transcript.trim().is_empty() {
            return rejected(transcript, responses::empty_transcript(), RejectReason::EmptyTranscript, context);
        }
        if let Some(confidence) = input.recognizer_confidence {
            if confidence < self.engine.config.min_recognizer_confidence {
                tracing::debug!(
                    "Rejecting {:?}: recognizer confidence {:.2} below {:.2}",
                    input.transcript,
                    confidence,
                    self.engine.config.min_recognizer_confidence
                );
                return rejected(transcript, responses::low_confidence(), RejectReason::LowConfidence, context);
            }
        }

        transcript.normalized = self.engine.normalizer.normalize(&transcript.raw);
        let signals = signals::detect(&transcript.normalized);
        let profile = self.profile.read().await.clone();
        tracing::debug!("Turn {:?} normalized to {:?}", transcript.raw, transcript.normalized);

        let turn = self
            .manager
            .handle(
                &self.engine,
                TurnContext {
                    normalized: &transcript.normalized,
                    session: &context,
                    profile: &profile,
                    signals,
                    recent_inputs: self.history.recent_inputs(RECENT_INPUTS),
                    cancel: &self.cancel,
                },
            )
            .await;

        self.history.push(ConversationTurn {
            user_input: input.transcript.clone(),
            system_response_text: turn.output.response_text.clone(),
            timestamp: Utc::now(),
            flow_kind_at_time: turn.active_flow.map(|f| f.kind),
            confidence: turn.intent.as_ref().map(|i| i.confidence).unwrap_or(1.0),
        });
        self.persist_history();

        for event in turn.events {
            self.learning.record(event);
        }

        TurnOutcome {
            transcript,
            output: turn.output,
            intent: turn.intent,
            next_context: turn.next_context,
            signals,
            rejected: None,
            active_flow: turn.active_flow,
        }
    }

    /// Seed the profile's ranges from the workout data store
    pub fn seed_history(&self, sets: Vec<LoggedSet>) {
        if !sets.is_empty() {
            self.learning.record(LearningEvent::HistorySeeded(sets));
        }
    }

    /// Current profile, including everything learned so far
    pub async fn profile(&self) -> UserPreferenceProfile {
        self.profile.read().await.clone()
    }

    pub fn history(&self) -> &TurnHistory {
        &self.history
    }

    /// Wait until queued learning events have been applied
    pub async fn flush_learning(&self) {
        self.learning.flush().await;
    }

    /// Wait until queued history snapshots have been written
    pub async fn flush_history(&self) {
        self.history_writer.flush().await;
    }

    /// Cancel timers and in-flight backend calls, then drain learning and
    /// history writes
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.manager.shutdown();
        self.learning.shutdown().await;
        self.history_writer.shutdown().await;
        tracing::info!("Session for {} closed", self.user_id);
    }

    fn persist_history(&self) {
        self.history_writer
            .save(self.history.tail(self.engine.config.persisted_history_limit));
    }
}

fn rejected(
    transcript: Transcript,
    output: TurnOutput,
    reason: RejectReason,
    context: SessionContext,
) -> TurnOutcome {
    TurnOutcome {
        transcript,
        output,
        intent: None,
        next_context: context,
        signals: Signals::default(),
        rejected: Some(reason),
        active_flow: None,
    }
}
