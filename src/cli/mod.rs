//! CLI commands for tabnap.
//!
//! Drives the library against a JSON tab snapshot: settings editing, list
//! browsing, dry runs, one-shot enforcement and a long-running daemon.

pub mod daemon;
pub mod settings;
pub mod tabs;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::SuspendMode;
use crate::core::SortOrder;
use crate::store::SettingsStore;

#[derive(Parser)]
#[command(name = "tabnap")]
#[command(about = "Suspend idle browser tabs to free memory", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings storage file (default: <config dir>/tabnap/storage.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub storage: Option<PathBuf>,

    /// Tab snapshot file the commands operate on
    #[arg(long, global = true, value_name = "PATH", default_value = "tabs.json")]
    pub tabs: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show or edit auto-suspend settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommands,
    },

    /// List tabs with optional search and sort
    List {
        /// Case-insensitive filter on title or URL
        #[arg(long, short)]
        search: Option<String>,

        /// Sort order: active, recent, title or url
        #[arg(long, default_value = "active")]
        sort: SortOrder,
    },

    /// Show which tabs the current policy would suspend, without suspending
    Plan,

    /// Run one auto-suspend pass under the current settings
    Enforce,

    /// Suspend tabs by id, ignoring exclusion rules
    Suspend {
        /// Tab ids to suspend
        #[arg(required_unless_present = "all")]
        ids: Vec<i64>,

        /// Suspend every loaded background tab
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },

    /// Close a tab
    Close {
        id: i64,
    },

    /// Switch to a tab and focus its window
    Activate {
        id: i64,
    },

    /// Keep enforcing the policy until interrupted
    Run {
        /// Seconds between periodic evaluations
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,

        /// Seconds between checks for external settings or tab changes
        #[arg(long, default_value_t = 2)]
        poll_secs: u64,
    },
}

#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print the current settings
    Show,

    /// Restore the defaults
    Reset,

    /// Change one or more fields
    Set(SetArgs),
}

#[derive(Args, Debug, Default)]
pub struct SetArgs {
    /// manual, max-tabs or auto-timer
    #[arg(long)]
    pub mode: Option<SuspendMode>,

    /// Tab-count threshold for max-tabs mode
    #[arg(long)]
    pub max_tabs: Option<u32>,

    /// Idle minutes before a tab is suspended in auto-timer mode
    #[arg(long)]
    pub auto_suspend_minutes: Option<u32>,

    /// Never auto-suspend tabs that are playing audio
    #[arg(long)]
    pub ignore_audible: Option<bool>,

    /// Enable the domain whitelist
    #[arg(long)]
    pub use_whitelist: Option<bool>,

    /// Whitelisted domain substrings (pass with no values to clear)
    #[arg(long, num_args = 0..)]
    pub whitelist: Option<Vec<String>>,
}

impl Cli {
    pub fn settings_store(&self) -> SettingsStore {
        match self.storage {
            Some(ref path) => SettingsStore::open(path),
            None => SettingsStore::open_default(),
        }
    }
}

/// Run the parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let store = cli.settings_store();

    match cli.command {
        Commands::Settings { action } => match action {
            SettingsCommands::Show => settings::show(&store),
            SettingsCommands::Reset => settings::reset(&store),
            SettingsCommands::Set(args) => settings::set(&store, args),
        },
        Commands::List { search, sort } => tabs::list(&cli.tabs, search.as_deref(), sort).await,
        Commands::Plan => tabs::plan(&store, &cli.tabs).await,
        Commands::Enforce => tabs::enforce(&store, &cli.tabs).await,
        Commands::Suspend { ids, all } => tabs::suspend(&store, &cli.tabs, &ids, all).await,
        Commands::Close { id } => tabs::close(&cli.tabs, id).await,
        Commands::Activate { id } => tabs::activate(&cli.tabs, id).await,
        Commands::Run {
            interval_secs,
            poll_secs,
        } => daemon::run(store, &cli.tabs, interval_secs, poll_secs).await,
    }
}
