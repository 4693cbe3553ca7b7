use clap::{CommandFactory, Parser, Subcommand};
use wakeup_core::Config;

mod commands;
mod common;

#[derive(Parser)]
#[command(name = "wakeup", version, about = "Wakeup alarm clock CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Alarm management
    Alarm {
        #[command(subcommand)]
        action: commands::alarm::AlarmAction,
    },
    /// Rest day and holiday lookup
    Holiday {
        #[command(subcommand)]
        action: commands::holiday::HolidayAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Recorded lifecycle errors
    Errors {
        #[command(subcommand)]
        action: commands::errors::ErrorsAction,
    },
    /// Run the alarm daemon in the foreground
    Run,
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    let config = Config::load_or_default();
    init_tracing(&config);

    let result = match cli.command {
        Commands::Alarm { action } => commands::alarm::run(action, &config),
        Commands::Holiday { action } => commands::holiday::run(action, &config),
        Commands::Config { action } => commands::config::run(action),
        Commands::Errors { action } => commands::errors::run(action),
        Commands::Run => commands::run::run(config),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "wakeup", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
