//! Alarm lifecycle controller.
//!
//! Owns the single alarm timeline and serializes every transition behind
//! one async mutex.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Armed -> Firing -> (SnoozeCountdown -> Firing)* -> Idle | Armed
//! ```
//!
//! Dispatcher callbacks carry the epoch key they were armed with. A callback
//! whose key no longer matches the current state is stale and is dropped
//! without side effects.
//!
//! Collaborator failures never abort a transition. They are reported to the
//! [`ErrorSink`] and the controller carries on with the safest state it can
//! reach: a failed re-arm ends `Idle`, a failed audio start still ends
//! `Firing` so the alarm can be stopped.
//!
//! A snooze countdown outlives the process: the alarm id is persisted next
//! to the epoch key, and the first re-arm of a fresh controller resumes the
//! countdown instead of arming the next recurrence.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use tokio::sync::Mutex;

use super::prepare::PreparationGate;
use super::state::{EpochKey, LifecycleState};
use super::volume::effective_volume;
use crate::alarm::{AlarmConfig, RecurrenceResolver};
use crate::clock::Clock;
use crate::error::CoreError;
use crate::events::Event;
use crate::integrations::{
    AlarmRegistry, AudioPlayer, DispatchAction, DispatchPayload, Dispatcher, ErrorSink, Speech,
    Vibrator, WakeGuard, WakeLock,
};

/// Default bound on waiting for background data preparation.
pub const DEFAULT_PREPARATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the controller talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn AlarmRegistry>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub audio: Arc<dyn AudioPlayer>,
    pub speech: Arc<dyn Speech>,
    pub vibrator: Arc<dyn Vibrator>,
    pub wake_lock: Arc<dyn WakeLock>,
    pub errors: Arc<dyn ErrorSink>,
    pub clock: Arc<dyn Clock>,
}

/// The alarm currently ringing or snoozed.
struct ActiveAlarm {
    config: AlarmConfig,
    remaining_repeats: u32,
}

#[derive(Default)]
struct Inner {
    state: LifecycleState,
    active: Option<ActiveAlarm>,
    wake: Option<WakeGuard>,
    /// Highest epoch generation handed out by this controller.
    generation: u64,
}

pub struct AlarmController {
    resolver: RecurrenceResolver,
    deps: Collaborators,
    gate: PreparationGate,
    preparation_timeout: Duration,
    inner: Mutex<Inner>,
}

impl AlarmController {
    /// Create an `Idle` controller. Nothing is armed until [`rearm`](Self::rearm).
    pub fn new(resolver: RecurrenceResolver, deps: Collaborators) -> Self {
        Self {
            resolver,
            deps,
            gate: PreparationGate::ready(),
            preparation_timeout: DEFAULT_PREPARATION_TIMEOUT,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Make firing wait on `gate` for at most `timeout`.
    pub fn with_preparation(mut self, gate: PreparationGate, timeout: Duration) -> Self {
        self.gate = gate;
        self.preparation_timeout = timeout;
        self
    }

    pub async fn current_state(&self) -> LifecycleState {
        self.inner.lock().await.state.clone()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Arm the dispatcher for the earliest enabled alarm.
    ///
    /// Deferred while an alarm is ringing or snoozed; stopping it re-arms.
    /// From `Idle`, a persisted snooze countdown is resumed first.
    pub async fn rearm(&self) -> Option<Event> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_active() {
            tracing::debug!(state = inner.state.name(), "rearm deferred");
            return None;
        }
        if inner.state == LifecycleState::Idle {
            if let Some(event) = self.restore_snooze_locked(&mut inner) {
                return Some(event);
            }
        }
        self.rearm_locked(&mut inner)
    }

    /// Route a payload delivered by the dispatcher.
    pub async fn dispatch(&self, payload: DispatchPayload) -> Option<Event> {
        match payload.action {
            DispatchAction::Fire => self.on_dispatch(payload.alarm_id, &payload.epoch_key).await,
            DispatchAction::AutoStop => {
                self.on_auto_stop(payload.alarm_id, &payload.epoch_key)
                    .await
            }
        }
    }

    /// Start ringing, if the callback is still current.
    ///
    /// The lock is released while waiting on the preparation gate, so a
    /// stop can land in that window; the key is checked again afterwards.
    pub async fn on_dispatch(&self, alarm_id: i64, epoch_key: &EpochKey) -> Option<Event> {
        let mut inner = self.inner.lock().await;
        let Some(snoozed_remaining) = fire_target(&inner.state, alarm_id, epoch_key) else {
            tracing::debug!(alarm_id, %epoch_key, state = inner.state.name(), "stale dispatch ignored");
            return None;
        };

        let alarm = match self.deps.registry.get(alarm_id) {
            Ok(Some(alarm)) if alarm.enabled => alarm,
            Ok(_) => {
                tracing::info!(alarm_id, "alarm is turned off");
                self.deps.errors.report("alarm is turned off", None);
                self.release_locked(&mut inner);
                return self.rearm_locked(&mut inner);
            }
            Err(e) => {
                self.report("could not load alarm to fire", &e);
                self.release_locked(&mut inner);
                return self.rearm_locked(&mut inner);
            }
        };

        if inner.wake.is_none() {
            match WakeGuard::acquire(Arc::clone(&self.deps.wake_lock)) {
                Ok(guard) => inner.wake = Some(guard),
                Err(e) => self.report("could not acquire wake lock", &e),
            }
        }
        if alarm.vibrate {
            if let Err(e) = self.deps.vibrator.start() {
                self.report("could not start vibration", &e);
            }
        }

        if !self.gate.is_ready() {
            drop(inner);
            let waited = self.gate.wait(self.preparation_timeout).await;
            inner = self.inner.lock().await;
            if let Err(e) = waited {
                self.report("preparation did not finish before firing", &e);
            }
            if fire_target(&inner.state, alarm_id, epoch_key) != Some(snoozed_remaining) {
                tracing::debug!(alarm_id, %epoch_key, state = inner.state.name(), "fire superseded during preparation");
                if !inner.state.is_active() {
                    self.silence();
                    self.release_locked(&mut inner);
                }
                return None;
            }
        }

        let remaining_repeats = match snoozed_remaining {
            Some(remaining) => remaining,
            None => match self.deps.registry.load_snooze_remaining() {
                Ok(stored) => stored.unwrap_or(alarm.snooze.max_repeats),
                Err(e) => {
                    self.report("could not load snooze count", &e);
                    alarm.snooze.max_repeats
                }
            },
        };
        let volume = effective_volume(alarm.music_volume, &alarm.snooze, remaining_repeats);

        if let Err(e) = self.deps.audio.play(&alarm.track, volume) {
            self.report("could not start audio", &e);
        }
        if alarm.speak {
            if let Err(e) = self.deps.speech.start() {
                self.report("could not start speech", &e);
            }
        }

        let now = self.deps.clock.now();
        let stop_at = now + ChronoDuration::seconds(i64::from(alarm.duration_seconds));
        let auto_stop = DispatchPayload {
            alarm_id,
            action: DispatchAction::AutoStop,
            epoch_key: epoch_key.clone(),
        };
        if let Err(e) = self.deps.dispatcher.schedule(stop_at, auto_stop) {
            self.report("could not schedule auto-stop", &e);
        }

        tracing::info!(alarm_id, volume, title = %alarm.title, "alarm firing");
        inner.state = LifecycleState::Firing {
            alarm_id,
            epoch_key: epoch_key.clone(),
        };
        inner.active = Some(ActiveAlarm {
            config: alarm,
            remaining_repeats,
        });
        Some(Event::AlarmFired {
            alarm_id,
            volume,
            at: now,
        })
    }

    /// Ringing ran its full duration: snooze if repeats remain, else stop.
    pub async fn on_auto_stop(&self, alarm_id: i64, epoch_key: &EpochKey) -> Option<Event> {
        let mut inner = self.inner.lock().await;
        match &inner.state {
            LifecycleState::Firing {
                alarm_id: id,
                epoch_key: key,
            } if *id == alarm_id && key == epoch_key => {}
            state => {
                tracing::debug!(alarm_id, %epoch_key, state = state.name(), "stale auto-stop ignored");
                return None;
            }
        }
        self.snooze_locked(&mut inner, alarm_id)
    }

    /// Silence the alarm and arm the next one.
    ///
    /// When nothing is ringing or snoozed this only re-arms. A stop for an
    /// alarm other than the active one is ignored.
    pub async fn on_stop(&self, alarm_id: i64) -> Option<Event> {
        let mut inner = self.inner.lock().await;
        if !inner.state.is_active() {
            return self.rearm_locked(&mut inner);
        }
        if inner.state.alarm_id() != Some(alarm_id) {
            tracing::debug!(alarm_id, active = ?inner.state.alarm_id(), "stop for inactive alarm ignored");
            return None;
        }
        Some(self.stop_locked(&mut inner, alarm_id))
    }

    /// Snooze the ringing alarm. Only valid while `Firing`.
    pub async fn on_user_snooze_request(&self, alarm_id: i64) -> Option<Event> {
        let mut inner = self.inner.lock().await;
        match &inner.state {
            LifecycleState::Firing { alarm_id: id, .. } if *id == alarm_id => {}
            state => {
                tracing::debug!(alarm_id, state = state.name(), "snooze request ignored");
                return None;
            }
        }
        self.snooze_locked(&mut inner, alarm_id)
    }

    /// Stop everything, forget persisted lifecycle state and re-arm.
    pub async fn reset(&self) -> Option<Event> {
        let mut inner = self.inner.lock().await;
        self.cancel_all();
        self.silence();
        self.release_locked(&mut inner);
        inner.state = LifecycleState::Idle;
        if let Err(e) = self.deps.registry.store_epoch_key(None) {
            self.report("could not clear epoch key", &e);
        }
        if let Err(e) = self.deps.registry.store_snooze_remaining(None) {
            self.report("could not clear snooze count", &e);
        }
        tracing::info!("lifecycle reset");
        self.rearm_locked(&mut inner)
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Resume the snooze countdown an earlier process left behind.
    ///
    /// `None` when there is nothing to resume: no persisted snooze, the
    /// alarm is gone or disabled, or its ringing window has already passed.
    fn restore_snooze_locked(&self, inner: &mut Inner) -> Option<Event> {
        let alarm_id = match self.deps.registry.load_snoozed_alarm() {
            Ok(id) => id?,
            Err(e) => {
                self.report("could not load snoozed alarm", &e);
                return None;
            }
        };
        let epoch_key = match self.deps.registry.load_epoch_key() {
            Ok(key) => key?,
            Err(e) => {
                self.report("could not load epoch key", &e);
                return None;
            }
        };
        let alarm = match self.deps.registry.get(alarm_id) {
            Ok(Some(alarm)) if alarm.enabled => alarm,
            Ok(_) => {
                tracing::info!(alarm_id, "snoozed alarm is turned off");
                return None;
            }
            Err(e) => {
                self.report("could not load snoozed alarm", &e);
                return None;
            }
        };

        let now = self.deps.clock.now();
        let fire_at = epoch_key.fire_at();
        if fire_at + ChronoDuration::seconds(i64::from(alarm.duration_seconds)) <= now {
            tracing::info!(alarm_id, %fire_at, "persisted snooze expired");
            return None;
        }
        let remaining_repeats = match self.deps.registry.load_snooze_remaining() {
            Ok(stored) => stored.unwrap_or(alarm.snooze.max_repeats),
            Err(e) => {
                self.report("could not load snooze count", &e);
                alarm.snooze.max_repeats
            }
        };

        let payload = DispatchPayload {
            alarm_id,
            action: DispatchAction::Fire,
            epoch_key: epoch_key.clone(),
        };
        if let Err(e) = self.deps.dispatcher.schedule(fire_at.max(now), payload) {
            self.report("could not program snooze", &e);
            return None;
        }
        if inner.wake.is_none() {
            match WakeGuard::acquire(Arc::clone(&self.deps.wake_lock)) {
                Ok(guard) => inner.wake = Some(guard),
                Err(e) => self.report("could not acquire wake lock", &e),
            }
        }

        tracing::info!(alarm_id, %fire_at, remaining_repeats, "snooze resumed");
        inner.generation = inner.generation.max(epoch_key.generation());
        inner.state = LifecycleState::SnoozeCountdown {
            alarm_id,
            fire_at,
            epoch_key,
            remaining_repeats,
        };
        Some(Event::AlarmSnoozed {
            alarm_id,
            fire_at,
            remaining_repeats,
        })
    }

    fn rearm_locked(&self, inner: &mut Inner) -> Option<Event> {
        if let Err(e) = self.deps.registry.store_snoozed_alarm(None) {
            self.report("could not clear snoozed alarm", &e);
        }
        let now = self.deps.clock.now();
        let alarms = match self.deps.registry.list_enabled() {
            Ok(alarms) => alarms,
            Err(e) => {
                self.report("could not read alarms", &e);
                return Some(self.disarm_locked(inner, now));
            }
        };
        for alarm in &alarms {
            if let Err(e) = alarm.recurrence.check() {
                tracing::warn!(alarm_id = alarm.id, error = %e, "alarm cannot fire");
            }
        }

        let Some((alarm, fire_at)) = self.resolver.earliest(&alarms, now) else {
            return Some(self.disarm_locked(inner, now));
        };

        let epoch_key = self.next_key(inner, fire_at);
        let payload = DispatchPayload {
            alarm_id: alarm.id,
            action: DispatchAction::Fire,
            epoch_key: epoch_key.clone(),
        };
        if let Err(e) = self.deps.dispatcher.schedule(fire_at, payload) {
            self.report("could not program dispatcher", &e);
            return Some(self.disarm_locked(inner, now));
        }
        if let Err(e) = self.deps.registry.store_epoch_key(Some(&epoch_key)) {
            self.report("could not persist epoch key", &e);
        }
        if alarm.snooze.is_enabled() {
            if let Err(e) = self
                .deps
                .registry
                .store_snooze_remaining(Some(alarm.snooze.max_repeats))
            {
                self.report("could not persist snooze count", &e);
            }
        }

        tracing::info!(alarm_id = alarm.id, %fire_at, %epoch_key, "alarm armed");
        inner.state = LifecycleState::Armed {
            alarm_id: alarm.id,
            fire_at,
            epoch_key: epoch_key.clone(),
        };
        Some(Event::AlarmArmed {
            alarm_id: alarm.id,
            fire_at,
            epoch_key,
        })
    }

    fn disarm_locked(&self, inner: &mut Inner, now: NaiveDateTime) -> Event {
        if let Err(e) = self.deps.dispatcher.cancel(DispatchAction::Fire) {
            self.report("could not cancel dispatcher", &e);
        }
        if let Err(e) = self.deps.registry.store_epoch_key(None) {
            self.report("could not clear epoch key", &e);
        }
        tracing::info!("no alarm to arm");
        inner.state = LifecycleState::Idle;
        Event::AlarmsIdle { at: now }
    }

    fn snooze_locked(&self, inner: &mut Inner, alarm_id: i64) -> Option<Event> {
        let (snooze, remaining) = match &inner.active {
            Some(active) => (active.config.snooze, active.remaining_repeats),
            None => return Some(self.stop_locked(inner, alarm_id)),
        };
        if !snooze.is_enabled() || remaining == 0 {
            return Some(self.stop_locked(inner, alarm_id));
        }

        if let Err(e) = self.deps.dispatcher.cancel(DispatchAction::AutoStop) {
            self.report("could not cancel auto-stop", &e);
        }
        self.silence();

        let now = self.deps.clock.now();
        let fire_at = now + ChronoDuration::minutes(i64::from(snooze.length_minutes));
        let remaining_repeats = remaining - 1;
        if let Err(e) = self
            .deps
            .registry
            .store_snooze_remaining(Some(remaining_repeats))
        {
            self.report("could not persist snooze count", &e);
        }

        let epoch_key = self.next_key(inner, fire_at);
        let payload = DispatchPayload {
            alarm_id,
            action: DispatchAction::Fire,
            epoch_key: epoch_key.clone(),
        };
        if let Err(e) = self.deps.dispatcher.schedule(fire_at, payload) {
            self.report("could not program snooze", &e);
            return Some(self.stop_locked(inner, alarm_id));
        }
        if let Err(e) = self.deps.registry.store_epoch_key(Some(&epoch_key)) {
            self.report("could not persist epoch key", &e);
        }
        if let Err(e) = self.deps.registry.store_snoozed_alarm(Some(alarm_id)) {
            self.report("could not persist snoozed alarm", &e);
        }

        tracing::info!(alarm_id, %fire_at, remaining_repeats, "alarm snoozed");
        inner.state = LifecycleState::SnoozeCountdown {
            alarm_id,
            fire_at,
            epoch_key,
            remaining_repeats,
        };
        if let Some(active) = inner.active.as_mut() {
            active.remaining_repeats = remaining_repeats;
        }
        Some(Event::AlarmSnoozed {
            alarm_id,
            fire_at,
            remaining_repeats,
        })
    }

    /// Full stop of the active alarm followed by a re-arm.
    fn stop_locked(&self, inner: &mut Inner, alarm_id: i64) -> Event {
        self.cancel_all();
        self.silence();

        let max_repeats = match inner.active.as_ref() {
            Some(active) => Some(active.config.snooze.max_repeats),
            None => self
                .deps
                .registry
                .get(alarm_id)
                .ok()
                .flatten()
                .map(|a| a.snooze.max_repeats),
        };
        self.release_locked(inner);
        if let Err(e) = self.deps.registry.store_snooze_remaining(max_repeats) {
            self.report("could not reset snooze count", &e);
        }

        let now = self.deps.clock.now();
        tracing::info!(alarm_id, "alarm stopped");
        inner.state = LifecycleState::Idle;
        self.rearm_locked(inner);
        Event::AlarmStopped { alarm_id, at: now }
    }

    fn next_key(&self, inner: &mut Inner, fire_at: NaiveDateTime) -> EpochKey {
        let persisted = match self.deps.registry.load_epoch_key() {
            Ok(key) => key.map_or(0, |k| k.generation()),
            Err(e) => {
                self.report("could not load epoch key", &e);
                0
            }
        };
        let latest = EpochKey::new(fire_at, inner.generation.max(persisted));
        let key = EpochKey::next(fire_at, Some(&latest));
        inner.generation = key.generation();
        key
    }

    fn release_locked(&self, inner: &mut Inner) {
        inner.active = None;
        inner.wake = None;
    }

    fn cancel_all(&self) {
        for action in [DispatchAction::Fire, DispatchAction::AutoStop] {
            if let Err(e) = self.deps.dispatcher.cancel(action) {
                self.report("could not cancel dispatcher", &e);
            }
        }
    }

    fn silence(&self) {
        if let Err(e) = self.deps.audio.stop() {
            self.report("could not stop audio", &e);
        }
        if let Err(e) = self.deps.speech.stop() {
            self.report("could not stop speech", &e);
        }
        if let Err(e) = self.deps.vibrator.stop() {
            self.report("could not stop vibration", &e);
        }
    }

    fn report(&self, message: &str, error: &CoreError) {
        tracing::warn!(error = %error, "{message}");
        self.deps.errors.report(message, Some(error));
    }
}

/// What a fire callback for `alarm_id`/`epoch_key` would resume from:
/// `Some(None)` when armed, `Some(Some(remaining))` when snoozed, `None`
/// when the callback is stale.
fn fire_target(state: &LifecycleState, alarm_id: i64, epoch_key: &EpochKey) -> Option<Option<u32>> {
    match state {
        LifecycleState::Armed {
            alarm_id: id,
            epoch_key: key,
            ..
        } if *id == alarm_id && key == epoch_key => Some(None),
        LifecycleState::SnoozeCountdown {
            alarm_id: id,
            epoch_key: key,
            remaining_repeats,
            ..
        } if *id == alarm_id && key == epoch_key => Some(Some(*remaining_repeats)),
        _ => None,
    }
}
