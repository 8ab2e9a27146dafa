use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::{ConfigLoader, Overrides};
use crate::storage;

pub mod commands;

use self::commands::{
    AddArgs, ClearArgs, EditArgs, ExportArgs, IdArgs, ImportArgs, ListArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "return-deadlines",
    version,
    about = "Keep track of how long you have left to return a purchase"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over RETURN_DEADLINES_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over RETURN_DEADLINES_DATA)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show tracked purchases with their return deadlines (default)
    List(ListArgs),
    /// Print active, due-soon and late counts
    Summary,
    /// Track a new purchase
    Add(AddArgs),
    /// Change fields of a tracked purchase
    Edit(EditArgs),
    /// Stop tracking a purchase
    Delete(IdArgs),
    /// Mark a purchase as returned
    Return(IdArgs),
    /// Mark a returned purchase as active again
    Undo(IdArgs),
    /// Remove every tracked purchase
    Clear(ClearArgs),
    /// Append purchases from a CSV file
    Import(ImportArgs),
    /// Write all purchases as CSV
    Export(ExportArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level);
    let loader = ConfigLoader::discover(Overrides {
        config: cli.config,
        data_dir: cli.data_dir,
    })?;
    let config = loader.load_or_init()?;
    let gateway = storage::init(&config)?;
    let mut app = App::open(gateway);
    if app.migrated() > 0 {
        println!("Migrated {} record(s) from the previous data file.", app.migrated());
    }

    let command = cli
        .command
        .unwrap_or_else(|| Commands::List(ListArgs::default()));
    match command {
        Commands::List(args) => commands::list(&app, &config, args),
        Commands::Summary => commands::summary(&app),
        Commands::Add(args) => commands::add(&mut app, args),
        Commands::Edit(args) => commands::edit(&mut app, args),
        Commands::Delete(args) => commands::delete(&mut app, args),
        Commands::Return(args) => commands::mark_returned(&mut app, args),
        Commands::Undo(args) => commands::undo_return(&mut app, args),
        Commands::Clear(args) => commands::clear(&mut app, args),
        Commands::Import(args) => commands::import(&mut app, args),
        Commands::Export(args) => commands::export(&app, &config, args),
    }
}

/// `RUST_LOG` wins when set. Otherwise `level` applies to this crate and
/// dependencies stay at `warn`.
fn init_tracing(level: &str) {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_init(|| {
        let (filter, rejected) = match EnvFilter::try_from_default_env() {
            Ok(filter) => (filter, None),
            Err(_) => match EnvFilter::try_new(crate_directive(level)) {
                Ok(filter) => (filter, None),
                Err(err) => (EnvFilter::new(crate_directive("warn")), Some(err)),
            },
        };
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        if let Some(err) = rejected {
            tracing::warn!(level, error = %err, "invalid --log-level, using warn");
        }
    });
}

fn crate_directive(level: &str) -> String {
    format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level.trim())
}
