mod commands;

use clap::{Parser, Subcommand};
use pg_migrate_engine::{init_logging, LoggingConfig, MigrateError};
use std::process::ExitCode;
use tracing::error;

use commands::migrate::{self, MigrateArgs};

#[derive(Parser)]
#[command(name = "migration-tool")]
#[command(about = "Versioned SQL schema migrations for PostgreSQL")]
#[command(version)]
struct Cli {
    /// Log level (ignored when RUST_LOG is set)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migration management
    Migrate(MigrateArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let logging = LoggingConfig::default()
        .with_level(cli.log_level)
        .json(cli.log_json);
    let _guard = match init_logging(&logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: invalid log level: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (operation, result) = match cli.command {
        Commands::Migrate(args) => (args.command.name(), migrate::run(args).await),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<MigrateError>() {
                Some(err) => error!(
                    operation,
                    kind = err.kind(),
                    version = err.version(),
                    "{}",
                    err
                ),
                None => error!(operation, "{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}
