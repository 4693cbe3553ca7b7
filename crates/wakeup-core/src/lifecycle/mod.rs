//! The alarm lifecycle: arming, firing, snoozing and stopping.

mod controller;
mod prepare;
mod state;
mod volume;

pub use controller::{AlarmController, Collaborators, DEFAULT_PREPARATION_TIMEOUT};
pub use prepare::{PreparationGate, PreparationTicket};
pub use state::{EpochKey, LifecycleState};
pub use volume::effective_volume;
