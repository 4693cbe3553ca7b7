//! # Wakeup Core Library
//!
//! This library provides the core logic for the Wakeup alarm clock. All
//! operations are available through the standalone `wakeup` CLI, which is a
//! thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Calendar**: Sunday and Japanese public holiday classification
//! - **Alarm**: Alarm definitions and the recurrence resolver that turns a
//!   rule into the next fire instant
//! - **Lifecycle**: The arm/fire/snooze/stop state machine, guarded against
//!   stale timer callbacks by epoch keys
//! - **Integrations**: Collaborator traits (registry, dispatcher, audio...)
//!   and in-process implementations
//! - **Storage**: SQLite alarm storage and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`RecurrenceResolver`]: Next fire instant per rule
//! - [`AlarmController`]: Lifecycle state machine
//! - [`Database`]: Alarm and lifecycle persistence
//! - [`Config`]: Application configuration management

pub mod alarm;
pub mod calendar;
pub mod clock;
pub mod error;
pub mod events;
pub mod integrations;
pub mod lifecycle;
pub mod storage;

pub use alarm::{
    AlarmConfig, DaySet, RecurrenceResolver, RecurrenceRule, SnoozeMode, SnoozeSettings,
    TimeOfDay, TrackRef,
};
pub use calendar::{Holiday, HolidayCalendar};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use events::Event;
pub use integrations::{
    AlarmRegistry, ConsoleOutput, DispatchAction, DispatchPayload, Dispatcher, ErrorSink,
    TokioDispatcher,
};
pub use lifecycle::{
    AlarmController, Collaborators, EpochKey, LifecycleState, PreparationGate, PreparationTicket,
};
pub use storage::{Config, Database, ErrorRecord};
