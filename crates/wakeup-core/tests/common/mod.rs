//! Recording fakes for the lifecycle collaborators.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use wakeup_core::alarm::{AlarmConfig, TimeOfDay, TrackRef};
use wakeup_core::integrations::{AudioPlayer, Speech, Vibrator, WakeLock};
use wakeup_core::{
    AlarmController, AlarmRegistry, Collaborators, CoreError, Database, DispatchAction,
    DispatchPayload, Dispatcher, EpochKey, ErrorSink, HolidayCalendar, ManualClock,
    RecurrenceResolver,
};

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, 0)
        .unwrap()
}

pub fn enabled_alarm(id: i64, hour: u8, minute: u8) -> AlarmConfig {
    let mut alarm = AlarmConfig::new(id, format!("Alarm {id}"));
    alarm.enabled = true;
    alarm.time_of_day = TimeOfDay::new(hour, minute);
    alarm
}

/// Single-slot dispatcher that remembers what it was asked to do.
#[derive(Default)]
pub struct RecordingDispatcher {
    slot: Mutex<Option<(NaiveDateTime, DispatchPayload)>>,
    scheduled: Mutex<Vec<(NaiveDateTime, DispatchPayload)>>,
    pub fail: AtomicBool,
}

impl RecordingDispatcher {
    pub fn pending(&self) -> Option<(NaiveDateTime, DispatchPayload)> {
        self.slot.lock().unwrap().clone()
    }

    /// Take the pending payload as if the timer went off.
    pub fn fire(&self) -> Option<DispatchPayload> {
        self.slot.lock().unwrap().take().map(|(_, p)| p)
    }

    pub fn schedule_count(&self) -> usize {
        self.scheduled.lock().unwrap().len()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn schedule(&self, at: NaiveDateTime, payload: DispatchPayload) -> Result<(), CoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::unavailable("dispatcher", "alarm service down"));
        }
        self.scheduled.lock().unwrap().push((at, payload.clone()));
        *self.slot.lock().unwrap() = Some((at, payload));
        Ok(())
    }

    fn cancel(&self, action: DispatchAction) -> Result<(), CoreError> {
        let mut slot = self.slot.lock().unwrap();
        if slot.as_ref().is_some_and(|(_, p)| p.action == action) {
            *slot = None;
        }
        Ok(())
    }
}

/// Audio, speech, vibration and wake lock in one recorder.
#[derive(Default)]
pub struct RecordingOutput {
    pub volumes: Mutex<Vec<u8>>,
    pub tracks: Mutex<Vec<TrackRef>>,
    pub playing: AtomicBool,
    pub speaking: AtomicBool,
    pub vibrating: AtomicBool,
    pub awake: AtomicBool,
    pub fail_audio: AtomicBool,
}

impl RecordingOutput {
    pub fn volumes(&self) -> Vec<u8> {
        self.volumes.lock().unwrap().clone()
    }

    pub fn is_silent(&self) -> bool {
        !self.playing.load(Ordering::SeqCst)
            && !self.speaking.load(Ordering::SeqCst)
            && !self.vibrating.load(Ordering::SeqCst)
    }

    pub fn is_awake(&self) -> bool {
        self.awake.load(Ordering::SeqCst)
    }
}

impl AudioPlayer for RecordingOutput {
    fn play(&self, track: &TrackRef, volume: u8) -> Result<(), CoreError> {
        if self.fail_audio.load(Ordering::SeqCst) {
            return Err(CoreError::unavailable("audio", "no output device"));
        }
        self.volumes.lock().unwrap().push(volume);
        self.tracks.lock().unwrap().push(track.clone());
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), CoreError> {
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Speech for RecordingOutput {
    fn start(&self) -> Result<(), CoreError> {
        self.speaking.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), CoreError> {
        self.speaking.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Vibrator for RecordingOutput {
    fn start(&self) -> Result<(), CoreError> {
        self.vibrating.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), CoreError> {
        self.vibrating.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl WakeLock for RecordingOutput {
    fn acquire(&self) -> Result<(), CoreError> {
        assert!(
            !self.awake.swap(true, Ordering::SeqCst),
            "wake lock acquired twice"
        );
        Ok(())
    }

    fn release(&self) -> Result<(), CoreError> {
        self.awake.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingErrors {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingErrors {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ErrorSink for RecordingErrors {
    fn report(&self, message: &str, _cause: Option<&CoreError>) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// Registry whose every call fails.
pub struct FailingRegistry;

impl AlarmRegistry for FailingRegistry {
    fn list_enabled(&self) -> Result<Vec<AlarmConfig>, CoreError> {
        Err(CoreError::unavailable("registry", "storage offline"))
    }

    fn get(&self, _id: i64) -> Result<Option<AlarmConfig>, CoreError> {
        Err(CoreError::unavailable("registry", "storage offline"))
    }

    fn put(&self, _alarm: &AlarmConfig) -> Result<(), CoreError> {
        Err(CoreError::unavailable("registry", "storage offline"))
    }

    fn load_epoch_key(&self) -> Result<Option<EpochKey>, CoreError> {
        Err(CoreError::unavailable("registry", "storage offline"))
    }

    fn store_epoch_key(&self, _key: Option<&EpochKey>) -> Result<(), CoreError> {
        Err(CoreError::unavailable("registry", "storage offline"))
    }

    fn load_snooze_remaining(&self) -> Result<Option<u32>, CoreError> {
        Err(CoreError::unavailable("registry", "storage offline"))
    }

    fn store_snooze_remaining(&self, _remaining: Option<u32>) -> Result<(), CoreError> {
        Err(CoreError::unavailable("registry", "storage offline"))
    }

    fn load_snoozed_alarm(&self) -> Result<Option<i64>, CoreError> {
        Err(CoreError::unavailable("registry", "storage offline"))
    }

    fn store_snoozed_alarm(&self, _alarm_id: Option<i64>) -> Result<(), CoreError> {
        Err(CoreError::unavailable("registry", "storage offline"))
    }
}

/// A controller wired to recording fakes and an in-memory database.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub db: Arc<Database>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub output: Arc<RecordingOutput>,
    pub errors: Arc<RecordingErrors>,
    pub controller: AlarmController,
}

impl Harness {
    pub fn new(now: NaiveDateTime, alarms: &[AlarmConfig]) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for alarm in alarms {
            db.put(alarm).unwrap();
        }
        Self::with_registry(now, db.clone(), db)
    }

    pub fn with_registry(
        now: NaiveDateTime,
        db: Arc<Database>,
        registry: Arc<dyn AlarmRegistry>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let output = Arc::new(RecordingOutput::default());
        let errors = Arc::new(RecordingErrors::default());
        let deps = Collaborators {
            registry,
            dispatcher: dispatcher.clone(),
            audio: output.clone(),
            speech: output.clone(),
            vibrator: output.clone(),
            wake_lock: output.clone(),
            errors: errors.clone(),
            clock: clock.clone(),
        };
        let controller =
            AlarmController::new(RecurrenceResolver::new(HolidayCalendar::Japan), deps);
        Self {
            clock,
            db,
            dispatcher,
            output,
            errors,
            controller,
        }
    }

    /// Move the clock to the pending instant and deliver the payload.
    pub async fn deliver(&self) -> Option<wakeup_core::Event> {
        let (at, payload) = self.dispatcher.pending().expect("nothing scheduled");
        self.clock.set(at);
        self.dispatcher.fire();
        self.controller.dispatch(payload).await
    }
}
