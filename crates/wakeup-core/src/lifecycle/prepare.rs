//! Readiness gate for the background data preparation task.
//!
//! Firing waits (bounded) until preparation is done instead of polling a
//! flag. A [`PreparationTicket`] marks the data ready when dropped, so a
//! preparation task that errors out or panics still opens the gate.

use std::time::Duration;

use tokio::sync::watch;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct PreparationGate {
    ready: watch::Sender<bool>,
}

impl Default for PreparationGate {
    fn default() -> Self {
        Self::ready()
    }
}

impl PreparationGate {
    /// A gate that is already open.
    pub fn ready() -> Self {
        Self {
            ready: watch::Sender::new(true),
        }
    }

    /// Close the gate; it reopens when the returned ticket is dropped.
    pub fn begin(&self) -> PreparationTicket {
        self.ready.send_replace(false);
        PreparationTicket {
            ready: self.ready.clone(),
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait until preparation finishes or `limit` elapses.
    pub async fn wait(&self, limit: Duration) -> Result<()> {
        let mut rx = self.ready.subscribe();
        let outcome = tokio::time::timeout(limit, rx.wait_for(|ready| *ready))
            .await
            .map(|waited| waited.map(|_| ()));
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(CoreError::unavailable(
                "preparation",
                "preparation task went away",
            )),
            Err(_) => Err(CoreError::unavailable(
                "preparation",
                format!("data not ready after {}s", limit.as_secs()),
            )),
        }
    }
}

/// Held by the preparation task while it runs.
#[derive(Debug)]
pub struct PreparationTicket {
    ready: watch::Sender<bool>,
}

impl PreparationTicket {
    pub fn finish(self) {}
}

impl Drop for PreparationTicket {
    fn drop(&mut self) {
        self.ready.send_replace(true);
    }
}
