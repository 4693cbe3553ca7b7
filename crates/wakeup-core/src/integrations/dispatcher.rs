//! In-process dispatcher backed by a tokio timer task.

use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::traits::{DispatchAction, DispatchPayload, Dispatcher};
use crate::clock::Clock;
use crate::error::{CoreError, Result};

struct Pending {
    action: DispatchAction,
    task: JoinHandle<()>,
}

/// Delivers payloads over an mpsc channel when their wall-clock time comes.
///
/// Holds at most one timer task. Must be used from inside a tokio runtime.
pub struct TokioDispatcher {
    clock: Arc<dyn Clock>,
    tx: mpsc::UnboundedSender<DispatchPayload>,
    slot: Mutex<Option<Pending>>,
}

impl TokioDispatcher {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<DispatchPayload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            clock,
            tx,
            slot: Mutex::new(None),
        };
        (dispatcher, rx)
    }

    /// Action of the timer still waiting to go off, if any.
    pub fn pending(&self) -> Option<DispatchAction> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref()
            .filter(|p| !p.task.is_finished())
            .map(|p| p.action)
    }
}

impl Dispatcher for TokioDispatcher {
    fn schedule(&self, at: NaiveDateTime, payload: DispatchPayload) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| CoreError::unavailable("dispatcher", e.to_string()))?;

        // Past instants fire immediately.
        let delay = (at - self.clock.now()).to_std().unwrap_or_default();
        let deadline = tokio::time::Instant::now() + delay;
        let action = payload.action;
        let tx = self.tx.clone();

        let task = handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if tx.send(payload).is_err() {
                tracing::debug!("dispatch receiver dropped");
            }
        });

        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(Pending { action, task }) {
            previous.task.abort();
        }
        tracing::debug!(?action, %at, "dispatcher armed");
        Ok(())
    }

    fn cancel(&self, action: DispatchAction) -> Result<()> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|p| p.action == action) {
            if let Some(pending) = slot.take() {
                pending.task.abort();
                tracing::debug!(?action, "dispatcher cancelled");
            }
        }
        Ok(())
    }
}

impl Drop for TokioDispatcher {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(pending) = slot.take() {
            pending.task.abort();
        }
    }
}
