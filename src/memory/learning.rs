//! Adaptive learning over the preference profile
//!
//! The turn path only enqueues events. A background task applies them to the
//! shared profile and persists the result; the profile is never written
//! anywhere else.

use crate::conversation::flow::FlowKind;
use crate::core::types::Unit;
use crate::memory::profile::{CommunicationStyle, LoggedSet, UserPreferenceProfile};
use crate::memory::signals::{Signals, WorkoutPhase};
use crate::memory::store::{save_json, KeyValueStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

/// Utterances needed before a communication style is inferred
const STYLE_MIN_UTTERANCES: u32 = 5;
const CONCISE_MAX_WORDS: f64 = 4.0;
const DETAILED_MIN_WORDS: f64 = 10.0;

/// Something the learning engine should fold into the profile
#[derive(Debug, Clone, PartialEq)]
pub enum LearningEvent {
    /// A set was logged from conversation
    SetLogged {
        exercise_id: String,
        reps: Option<u32>,
        weight: Option<f64>,
        unit: Option<Unit>,
        phrasing: Option<String>,
        at: DateTime<Utc>,
    },
    /// Any accepted utterance
    Utterance {
        words: usize,
        units: Vec<Unit>,
        signals: Signals,
    },
    FlowCancelled(FlowKind),
    FlowExpired(FlowKind),
    /// Sets from the workout data store
    HistorySeeded(Vec<LoggedSet>),
}

/// Leading words of a logging utterance, used as a phrasing key
pub fn phrasing_key(normalized: &str) -> Option<String> {
    let words: Vec<&str> = normalized.split_whitespace().take(2).collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

enum Message {
    Event(LearningEvent),
    Flush(oneshot::Sender<()>),
}

pub struct LearningEngine {
    profile: Arc<RwLock<UserPreferenceProfile>>,
    store: Arc<dyn KeyValueStore>,
    key: String,
    phrasing_limit: usize,
}

impl LearningEngine {
    pub fn new(
        profile: Arc<RwLock<UserPreferenceProfile>>,
        store: Arc<dyn KeyValueStore>,
        key: String,
        phrasing_limit: usize,
    ) -> Self {
        Self {
            profile,
            store,
            key,
            phrasing_limit,
        }
    }

    /// Fold one event into a profile
    pub fn apply(profile: &mut UserPreferenceProfile, event: &LearningEvent, phrasing_limit: usize) {
        match event {
            LearningEvent::SetLogged {
                exercise_id,
                reps,
                weight,
                unit,
                phrasing,
                at,
            } => {
                let stats = profile.exercises.entry(exercise_id.clone()).or_default();
                stats.observe(*reps, *weight, *unit);
                stats.completions += 1;
                stats.last_logged_at = Some(*at);

                if let Some(previous) = profile.last_exercise.as_deref() {
                    if previous != exercise_id {
                        *profile.pairings.entry(format!("{}>{}", previous, exercise_id)).or_insert(0) += 1;
                    }
                }
                profile.last_exercise = Some(exercise_id.clone());

                if let Some(phrasing) = phrasing {
                    record_phrasing(profile, phrasing, phrasing_limit);
                }
            }
            LearningEvent::Utterance { words, units, signals } => {
                profile.utterances_observed += 1;
                let n = f64::from(profile.utterances_observed);
                profile.mean_utterance_words += (*words as f64 - profile.mean_utterance_words) / n;
                profile.communication_style = infer_style(profile.utterances_observed, profile.mean_utterance_words);

                for unit in units {
                    match unit {
                        Unit::Lbs => profile.lbs_mentions += 1,
                        Unit::Kg => profile.kg_mentions += 1,
                        _ => {}
                    }
                }

                profile.mood = signals.mood;
                if signals.phase != WorkoutPhase::Unknown {
                    profile.phase = signals.phase;
                }
            }
            LearningEvent::FlowCancelled(_) => profile.cancelled_flows += 1,
            LearningEvent::FlowExpired(_) => profile.expired_flows += 1,
            LearningEvent::HistorySeeded(sets) => profile.seed_from_history(sets),
        }
        profile.updated_at = Some(Utc::now());
    }

    /// Start the background task that owns profile writes
    pub fn spawn(self) -> LearningHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message {
                    Message::Event(event) => {
                        let snapshot = {
                            let mut profile = self.profile.write().await;
                            Self::apply(&mut profile, &event, self.phrasing_limit);
                            profile.clone()
                        };
                        if let Err(e) = save_json(self.store.as_ref(), &self.key, &snapshot).await {
                            tracing::warn!("Profile write for {} skipped: {}", self.key, e);
                        }
                    }
                    Message::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("Learning task for {} stopped", self.key);
        });

        LearningHandle { tx, task }
    }
}

fn infer_style(observed: u32, mean_words: f64) -> CommunicationStyle {
    if observed < STYLE_MIN_UTTERANCES {
        CommunicationStyle::Balanced
    } else if mean_words <= CONCISE_MAX_WORDS {
        CommunicationStyle::Concise
    } else if mean_words >= DETAILED_MIN_WORDS {
        CommunicationStyle::Detailed
    } else {
        CommunicationStyle::Balanced
    }
}

fn record_phrasing(profile: &mut UserPreferenceProfile, phrasing: &str, limit: usize) {
    if let Some(count) = profile.phrasings.get_mut(phrasing) {
        *count += 1;
        return;
    }
    if limit == 0 {
        return;
    }
    if profile.phrasings.len() >= limit {
        let rarest = profile
            .phrasings
            .iter()
            .min_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(k, _)| k.clone());
        if let Some(rarest) = rarest {
            profile.phrasings.remove(&rarest);
        }
    }
    profile.phrasings.insert(phrasing.to_string(), 1);
}

/// Sender side of the learning task
pub struct LearningHandle {
    tx: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

impl LearningHandle {
    /// Enqueue an event; never waits
    pub fn record(&self, event: LearningEvent) {
        if self.tx.send(Message::Event(event)).is_err() {
            tracing::warn!("Learning task gone; event dropped");
        }
    }

    /// Wait until every event recorded so far has been applied
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Drain queued events and stop the task
    pub async fn shutdown(self) {
        let LearningHandle { tx, task } = self;
        drop(tx);
        if let Err(e) = task.await {
            tracing::warn!("Learning task ended abnormally: {}", e);
        }
    }
}
