use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::alarm::{AlarmConfig, TrackRef};
use crate::error::{CoreError, Result};
use crate::lifecycle::EpochKey;

/// Source of alarm definitions plus the persisted lifecycle surface.
pub trait AlarmRegistry: Send + Sync {
    /// Enabled alarms, ascending by id.
    fn list_enabled(&self) -> Result<Vec<AlarmConfig>>;

    /// `None` when the alarm has been deleted.
    fn get(&self, id: i64) -> Result<Option<AlarmConfig>>;

    fn put(&self, alarm: &AlarmConfig) -> Result<()>;

    fn load_epoch_key(&self) -> Result<Option<EpochKey>>;

    /// `None` clears the stored key.
    fn store_epoch_key(&self, key: Option<&EpochKey>) -> Result<()>;

    fn load_snooze_remaining(&self) -> Result<Option<u32>>;

    fn store_snooze_remaining(&self, remaining: Option<u32>) -> Result<()>;

    /// Alarm whose snooze countdown the stored epoch key belongs to.
    fn load_snoozed_alarm(&self) -> Result<Option<i64>>;

    fn store_snoozed_alarm(&self, alarm_id: Option<i64>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchAction {
    /// Start ringing.
    Fire,
    /// Ringing ran for the alarm's full duration.
    AutoStop,
}

/// What the dispatcher hands back when its timer expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub alarm_id: i64,
    pub action: DispatchAction,
    pub epoch_key: EpochKey,
}

/// Single-slot one-shot timer.
///
/// Scheduling replaces whatever was pending. Cancelling only affects a
/// pending payload of the given action and is a no-op otherwise.
pub trait Dispatcher: Send + Sync {
    fn schedule(&self, at: NaiveDateTime, payload: DispatchPayload) -> Result<()>;

    fn cancel(&self, action: DispatchAction) -> Result<()>;
}

pub trait AudioPlayer: Send + Sync {
    fn play(&self, track: &TrackRef, volume: u8) -> Result<()>;

    fn stop(&self) -> Result<()>;
}

/// Reads the alarm out loud.
pub trait Speech: Send + Sync {
    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;
}

pub trait Vibrator: Send + Sync {
    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;
}

/// Keeps the device awake while an alarm is ringing or snoozed.
pub trait WakeLock: Send + Sync {
    fn acquire(&self) -> Result<()>;

    fn release(&self) -> Result<()>;
}

/// Collects errors the controller recovered from.
pub trait ErrorSink: Send + Sync {
    fn report(&self, message: &str, cause: Option<&CoreError>);
}

/// Holds a [`WakeLock`] until dropped.
pub struct WakeGuard {
    lock: Arc<dyn WakeLock>,
}

impl WakeGuard {
    pub fn acquire(lock: Arc<dyn WakeLock>) -> Result<Self> {
        lock.acquire()?;
        Ok(Self { lock })
    }
}

impl std::fmt::Debug for WakeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WakeGuard").finish_non_exhaustive()
    }
}

impl Drop for WakeGuard {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release() {
            tracing::warn!(error = %e, "failed to release wake lock");
        }
    }
}
