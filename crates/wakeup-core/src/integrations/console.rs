//! Collaborators that only log what a real device would do.
//!
//! Used by the CLI daemon, where no audio or speech engine is attached.

use std::sync::atomic::{AtomicBool, Ordering};

use super::traits::{AudioPlayer, Speech, Vibrator, WakeLock};
use crate::alarm::TrackRef;
use crate::error::Result;

#[derive(Debug, Default)]
pub struct ConsoleOutput {
    playing: AtomicBool,
    awake: AtomicBool,
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn is_awake(&self) -> bool {
        self.awake.load(Ordering::SeqCst)
    }
}

impl AudioPlayer for ConsoleOutput {
    fn play(&self, track: &TrackRef, volume: u8) -> Result<()> {
        self.playing.store(true, Ordering::SeqCst);
        tracing::info!(%track, volume, "audio: play");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if self.playing.swap(false, Ordering::SeqCst) {
            tracing::info!("audio: stop");
        }
        Ok(())
    }
}

impl Speech for ConsoleOutput {
    fn start(&self) -> Result<()> {
        tracing::info!("speech: start");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        tracing::debug!("speech: stop");
        Ok(())
    }
}

impl Vibrator for ConsoleOutput {
    fn start(&self) -> Result<()> {
        tracing::info!("vibration: start");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        tracing::debug!("vibration: stop");
        Ok(())
    }
}

impl WakeLock for ConsoleOutput {
    fn acquire(&self) -> Result<()> {
        self.awake.store(true, Ordering::SeqCst);
        tracing::debug!("wake lock acquired");
        Ok(())
    }

    fn release(&self) -> Result<()> {
        self.awake.store(false, Ordering::SeqCst);
        tracing::debug!("wake lock released");
        Ok(())
    }
}
