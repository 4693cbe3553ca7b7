//! Collaborator interfaces the lifecycle controller drives, plus the
//! in-process implementations used by the CLI.

pub mod console;
pub mod dispatcher;
pub mod traits;

pub use console::ConsoleOutput;
pub use dispatcher::TokioDispatcher;
pub use traits::{
    AlarmRegistry, AudioPlayer, DispatchAction, DispatchPayload, Dispatcher, ErrorSink, Speech,
    Vibrator, WakeGuard, WakeLock,
};
