//! Foreground alarm daemon.
//!
//! Reads one command per line from stdin: `stop [id]`, `snooze [id]`,
//! `status`, `rearm`, `reset`. Lifecycle events are printed to stdout as
//! JSON lines. Ctrl-C exits.
//!
//! Alarm edits made by other `wakeup` invocations are picked up by polling
//! the database's alarm revision, and trigger a re-arm.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use wakeup_core::{
    AlarmController, Clock, Collaborators, Config, ConsoleOutput, CoreError, Database, ErrorSink,
    Event, PreparationGate, SystemClock, TokioDispatcher,
};

use crate::common::CliResult;

/// How often the daemon looks for alarm edits.
const EDIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Tracks the alarm revision last acted on.
struct RevisionWatch {
    db: Arc<Database>,
    seen: u64,
}

impl RevisionWatch {
    fn new(db: Arc<Database>) -> Result<Self, CoreError> {
        let seen = db.alarms_revision()?;
        Ok(Self { db, seen })
    }

    /// True once per batch of edits since the last call.
    fn changed(&mut self) -> Result<bool, CoreError> {
        let current = self.db.alarms_revision()?;
        if current == self.seen {
            return Ok(false);
        }
        self.seen = current;
        Ok(true)
    }
}

pub fn run(config: Config) -> CliResult {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(daemon(config))
}

fn print_event(event: Option<Event>) {
    if let Some(event) = event {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to encode event"),
        }
    }
}

async fn daemon(config: Config) -> CliResult {
    let db = Arc::new(Database::open()?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (dispatcher, mut deliveries) = TokioDispatcher::new(clock.clone());
    let output = Arc::new(ConsoleOutput::new());

    let gate = PreparationGate::ready();
    let ticket = gate.begin();
    let preparation = {
        let db = db.clone();
        let template = config.alarm_template(0, "");
        let count = config.runtime.seed_alarm_count;
        tokio::task::spawn_blocking(move || {
            let _ticket = ticket;
            db.seed_default_alarms(count, &template)
        })
    };

    let controller = AlarmController::new(
        config.resolver(),
        Collaborators {
            registry: db.clone(),
            dispatcher: Arc::new(dispatcher),
            audio: output.clone(),
            speech: output.clone(),
            vibrator: output.clone(),
            wake_lock: output.clone(),
            errors: db.clone(),
            clock,
        },
    )
    .with_preparation(gate, config.preparation_timeout());

    match preparation.await {
        Ok(Ok(seeded)) => tracing::debug!(seeded, "alarm data prepared"),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "alarm data preparation failed");
            db.report("could not prepare alarm data", Some(&e));
        }
        Err(e) => tracing::warn!(error = %e, "preparation task aborted"),
    }

    let mut edits = RevisionWatch::new(db.clone())?;
    print_event(controller.rearm().await);
    tracing::info!("daemon running; commands: stop, snooze, status, rearm, reset");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut poll = tokio::time::interval(EDIT_POLL_INTERVAL);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(payload) = deliveries.recv() => {
                print_event(controller.dispatch(payload).await);
            }
            _ = poll.tick() => match edits.changed() {
                Ok(true) => {
                    tracing::info!("alarms edited; re-arming");
                    print_event(controller.rearm().await);
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(error = %e, "could not check for alarm edits"),
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(e) = handle_command(&controller, line.trim()).await {
                        tracing::warn!(error = %e, "command failed");
                    }
                }
                Ok(None) => {
                    tracing::debug!("stdin closed");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "could not read command");
                    // a garbled line is skipped; anything else means stdin is unusable
                    if e.kind() != ErrorKind::InvalidData {
                        stdin_open = false;
                    }
                    db.report("could not read command", Some(&CoreError::Io(e)));
                }
            },
            _ = &mut shutdown => {
                tracing::info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}

async fn handle_command(controller: &AlarmController, line: &str) -> CliResult {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(());
    };
    let id = match parts.next() {
        Some(raw) => Some(raw.parse::<i64>()?),
        None => controller.current_state().await.alarm_id(),
    };

    match command {
        "stop" => match id {
            Some(id) => print_event(controller.on_stop(id).await),
            None => print_event(controller.rearm().await),
        },
        "snooze" => match id {
            Some(id) => print_event(controller.on_user_snooze_request(id).await),
            None => tracing::info!("nothing is ringing"),
        },
        "status" => println!("{}", serde_json::to_string(&controller.current_state().await)?),
        "rearm" => print_event(controller.rearm().await),
        "reset" => print_event(controller.reset().await),
        other => tracing::warn!(command = other, "unknown command"),
    }
    Ok(())
}
