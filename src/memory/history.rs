//! Short-term conversation history
//!
//! Persisted snapshots go through one writer task per session, so a slow
//! write can never land on top of a newer one.

use crate::conversation::flow::FlowKind;
use crate::memory::store::{save_json, KeyValueStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// One user turn and what the engine said back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_input: String,
    pub system_response_text: String,
    pub timestamp: DateTime<Utc>,
    pub flow_kind_at_time: Option<FlowKind>,
    pub confidence: f32,
}

/// Bounded history; the oldest turn is dropped first
#[derive(Debug, Clone)]
pub struct TurnHistory {
    turns: VecDeque<ConversationTurn>,
    limit: usize,
}

impl TurnHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(limit.min(64)),
            limit: limit.max(1),
        }
    }

    /// Rebuild from persisted turns, keeping the newest `limit`
    pub fn from_turns(turns: Vec<ConversationTurn>, limit: usize) -> Self {
        let mut history = Self::new(limit);
        for turn in turns {
            history.push(turn);
        }
        history
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        while self.turns.len() >= self.limit {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    /// Last `n` user inputs, oldest first
    pub fn recent_inputs(&self, n: usize) -> Vec<String> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).map(|t| t.user_input.clone()).collect()
    }

    /// Newest `n` turns for persistence, oldest first
    pub fn tail(&self, n: usize) -> Vec<ConversationTurn> {
        let skip = self.turns.len().saturating_sub(n);
        self.turns.iter().skip(skip).cloned().collect()
    }
}

enum WriterMessage {
    Snapshot(Vec<ConversationTurn>),
    Flush(oneshot::Sender<()>),
}

/// Background task that owns history writes for one key
pub struct HistoryWriter {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl HistoryWriter {
    pub fn new(store: Arc<dyn KeyValueStore>, key: String) -> Self {
        Self { store, key }
    }

    pub fn spawn(self) -> HistoryWriterHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriterMessage>();

        let task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                // Only the newest queued snapshot is written
                let mut latest = None;
                let mut waiters = Vec::new();
                let mut next = Some(message);
                while let Some(message) = next {
                    match message {
                        WriterMessage::Snapshot(turns) => latest = Some(turns),
                        WriterMessage::Flush(done) => waiters.push(done),
                    }
                    next = rx.try_recv().ok();
                }

                if let Some(turns) = latest {
                    if let Err(e) = save_json(self.store.as_ref(), &self.key, &turns).await {
                        tracing::warn!("History write for {} skipped: {}", self.key, e);
                    }
                }
                for done in waiters {
                    let _ = done.send(());
                }
            }
            tracing::debug!("History writer for {} stopped", self.key);
        });

        HistoryWriterHandle { tx, task }
    }
}

/// Sender side of the history writer
pub struct HistoryWriterHandle {
    tx: mpsc::UnboundedSender<WriterMessage>,
    task: JoinHandle<()>,
}

impl HistoryWriterHandle {
    /// Queue a snapshot; never waits
    pub fn save(&self, turns: Vec<ConversationTurn>) {
        if self.tx.send(WriterMessage::Snapshot(turns)).is_err() {
            tracing::warn!("History writer gone; snapshot dropped");
        }
    }

    /// Wait until every snapshot queued so far has been written
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriterMessage::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Write what is queued and stop the task
    pub async fn shutdown(self) {
        let HistoryWriterHandle { tx, task } = self;
        drop(tx);
        if let Err(e) = task.await {
            tracing::warn!("History writer ended abnormally: {}", e);
        }
    }
}
