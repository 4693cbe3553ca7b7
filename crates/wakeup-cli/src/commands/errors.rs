use clap::Subcommand;
use wakeup_core::Database;

use crate::common::{print_json, CliResult};

#[derive(Subcommand)]
pub enum ErrorsAction {
    /// Show recorded errors, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Delete all recorded errors
    Clear,
}

pub fn run(action: ErrorsAction) -> CliResult {
    let db = Database::open()?;
    match action {
        ErrorsAction::List { limit } => print_json(&db.list_errors(limit)?),
        ErrorsAction::Clear => {
            let removed = db.clear_errors()?;
            println!("cleared {removed} errors");
            Ok(())
        }
    }
}
