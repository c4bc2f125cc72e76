//! Step timeouts for the active flow
//!
//! The flow lives in a slot shared with one timer task. Every change to the
//! slot bumps its generation; a timer only clears the flow if nothing touched
//! the slot since it was armed.

use crate::conversation::flow::{ConversationFlow, FlowKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct FlowSlot {
    flow: Option<ConversationFlow>,
    generation: u64,
    /// Kind of a flow the timer cleared, not yet reported
    expired: Option<FlowKind>,
}

impl FlowSlot {
    pub fn flow(&self) -> Option<&ConversationFlow> {
        self.flow.as_ref()
    }

    /// Store a flow (new or updated) and return the new generation
    pub fn install(&mut self, flow: ConversationFlow) -> u64 {
        self.flow = Some(flow);
        self.generation += 1;
        self.generation
    }

    pub fn take(&mut self) -> Option<ConversationFlow> {
        self.generation += 1;
        self.flow.take()
    }

    /// Clear the flow if the slot is still at `generation`
    pub fn expire(&mut self, generation: u64) -> bool {
        if self.generation != generation {
            return false;
        }
        match self.flow.take() {
            Some(flow) => {
                self.generation += 1;
                self.expired = Some(flow.kind);
                true
            }
            None => false,
        }
    }

    /// Report (once) that a flow expired since the last turn
    pub fn take_expired(&mut self) -> Option<FlowKind> {
        self.expired.take()
    }
}

pub type SharedSlot = Arc<Mutex<FlowSlot>>;

/// Owns the single pending step timer of a session
pub struct FlowTimer {
    slot: SharedSlot,
    root: CancellationToken,
    current: Option<CancellationToken>,
}

impl FlowTimer {
    pub fn new(slot: SharedSlot) -> Self {
        Self {
            slot,
            root: CancellationToken::new(),
            current: None,
        }
    }

    /// Cancel any pending timer and start a new one for `generation`
    pub fn arm(&mut self, generation: u64, after: Duration) {
        self.cancel();
        let token = self.root.child_token();
        let slot = self.slot.clone();
        let task_token = token.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    let mut slot = slot.lock().await;
                    if slot.expire(generation) {
                        tracing::info!("Flow step timed out after {} ms; cleared", after.as_millis());
                    }
                }
            }
        });

        self.current = Some(token);
    }

    pub fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }

    /// Cancel the pending timer and refuse to arm new ones
    pub fn shutdown(&mut self) {
        self.cancel();
        self.root.cancel();
    }
}

impl Drop for FlowTimer {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::flow::FlowData;

    fn flow() -> ConversationFlow {
        ConversationFlow::new(FlowKind::SetLogging, FlowData::default(), Duration::from_secs(30))
    }

    #[test]
    fn test_stale_generation_does_not_expire() {
        let mut slot = FlowSlot::default();
        let armed_at = slot.install(flow());
        slot.install(flow());
        assert!(!slot.expire(armed_at));
        assert!(slot.flow().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_clears_flow() {
        let slot: SharedSlot = Arc::new(Mutex::new(FlowSlot::default()));
        let mut timer = FlowTimer::new(slot.clone());
        let generation = slot.lock().await.install(flow());

        timer.arm(generation, Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(31)).await;

        let mut guard = slot.lock().await;
        assert!(guard.flow().is_none());
        assert_eq!(guard.take_expired(), Some(FlowKind::SetLogging));
        assert_eq!(guard.take_expired(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_keeps_flow() {
        let slot: SharedSlot = Arc::new(Mutex::new(FlowSlot::default()));
        let mut timer = FlowTimer::new(slot.clone());
        let generation = slot.lock().await.install(flow());

        timer.arm(generation, Duration::from_secs(30));
        timer.cancel();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(slot.lock().await.flow().is_some());
    }
}
