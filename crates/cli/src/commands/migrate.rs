use anyhow::Result;
use clap::{Args, Subcommand};
use pg_migrate_engine::migrations::Rename;
use pg_migrate_engine::{
    CommandOutcome, ConfigOverrides, DatabaseConfig, MigrationCommand, MigrationSource, Migrator,
    PostgresDatabase, VersionScheme,
};
use tracing::info;

#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: MigrateCommands,
}

/// Connection settings. Each falls back to its environment variable, then to
/// a built-in default.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// Database name [env: DB_NAME]
    #[arg(long, global = true)]
    pub db_name: Option<String>,

    /// Database user [env: DB_USER]
    #[arg(long, global = true)]
    pub db_user: Option<String>,

    /// Database password [env: DB_PASSWORD]
    #[arg(long, global = true)]
    pub db_password: Option<String>,

    /// Database host [env: DB_HOST]
    #[arg(long, global = true)]
    pub db_host: Option<String>,

    /// Database port [env: DB_PORT]
    #[arg(long, global = true)]
    pub db_port: Option<String>,

    /// Schema holding the version table [env: DB_SCHEMA]
    #[arg(long, global = true)]
    pub db_schema: Option<String>,

    /// Directory containing migration files [env: DB_MIGRATION_PATH]
    #[arg(long, global = true)]
    pub db_migration_path: Option<String>,

    /// Version table name [env: DB_MIGRATION_TABLE]
    #[arg(long, global = true)]
    pub db_table: Option<String>,

    /// Do not take the advisory lock [env: DB_MIGRATION_LOCK=false]
    #[arg(long, global = true)]
    pub no_lock: bool,
}

impl ConnectionArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            db_name: self.db_name.clone(),
            db_user: self.db_user.clone(),
            db_password: self.db_password.clone(),
            db_host: self.db_host.clone(),
            db_port: self.db_port.clone(),
            db_schema: self.db_schema.clone(),
            migration_path: self.db_migration_path.clone(),
            migration_table: self.db_table.clone(),
            no_lock: self.no_lock,
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum MigrateCommands {
    /// Apply all pending migrations
    Up,

    /// Apply the next pending migration
    UpByOne,

    /// Apply pending migrations up to and including a version
    UpTo {
        #[arg(long)]
        version: i64,
    },

    /// Revert the most recently applied migration
    Down,

    /// Revert applied migrations above a version (0 reverts everything)
    DownTo {
        #[arg(long)]
        version: i64,
    },

    /// Revert and reapply the most recently applied migration
    Redo,

    /// Revert all applied migrations
    Reset,

    /// Show applied and pending migrations
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the current version
    Version,

    /// Create a new migration file
    Create {
        /// Migration name, e.g. add_users
        #[arg(long)]
        name: String,

        /// Number the file after the highest version instead of a timestamp
        #[arg(long)]
        sequential: bool,
    },

    /// Renumber timestamp and colliding versions sequentially
    Fix,
}

impl MigrateCommands {
    pub fn name(&self) -> &'static str {
        self.to_command().name()
    }

    pub fn to_command(&self) -> MigrationCommand {
        match self {
            MigrateCommands::Up => MigrationCommand::Up,
            MigrateCommands::UpByOne => MigrationCommand::UpByOne,
            MigrateCommands::UpTo { version } => MigrationCommand::UpTo(*version),
            MigrateCommands::Down => MigrationCommand::Down,
            MigrateCommands::DownTo { version } => MigrationCommand::DownTo(*version),
            MigrateCommands::Redo => MigrationCommand::Redo,
            MigrateCommands::Reset => MigrationCommand::Reset,
            MigrateCommands::Status { .. } => MigrationCommand::Status,
            MigrateCommands::Version => MigrationCommand::Version,
            MigrateCommands::Create { name, sequential } => MigrationCommand::Create {
                name: name.clone(),
                scheme: if *sequential {
                    VersionScheme::Sequential
                } else {
                    VersionScheme::Timestamp
                },
            },
            MigrateCommands::Fix => MigrationCommand::Fix,
        }
    }

    fn json(&self) -> bool {
        matches!(self, MigrateCommands::Status { json: true })
    }
}

pub async fn run(args: MigrateArgs) -> Result<()> {
    let config = DatabaseConfig::load(&args.connection.overrides())?;
    let command = args.command.to_command();
    let source = MigrationSource::from_dir(&config.migrations_dir);

    let outcome = match command {
        MigrationCommand::Create { name, scheme } => {
            CommandOutcome::Created(source.create(&name, scheme)?)
        }
        MigrationCommand::Fix => CommandOutcome::Fixed(source.fix()?),
        command => {
            info!(
                url = %config.display_url(),
                table = %config.qualified_table(),
                command = %command,
                "Running migration command"
            );
            let db = PostgresDatabase::connect(&config).await?;
            let migrator = Migrator::new(source, db);
            let result = migrator.run(command).await;
            migrator.database().close().await;
            result?
        }
    };

    print_outcome(&outcome, args.command.json())
}

fn print_outcome(outcome: &CommandOutcome, json: bool) -> Result<()> {
    match outcome {
        CommandOutcome::Executed(_) => {}
        CommandOutcome::Status(report) if json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        CommandOutcome::Status(report) => print!("{}", report),
        CommandOutcome::Version(version) => println!("version {}", version),
        CommandOutcome::Created(migration) => {
            println!("Created new file: {}", migration.path.display());
        }
        CommandOutcome::Fixed(renames) if renames.is_empty() => {
            println!("Nothing to fix");
        }
        CommandOutcome::Fixed(renames) => {
            for rename in renames {
                println!("{}", rename_line(rename));
            }
        }
    }
    Ok(())
}

fn rename_line(rename: &Rename) -> String {
    format!(
        "RENAMED {} => {}",
        file_name(&rename.from),
        file_name(&rename.to)
    )
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
