use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::HOME_ENV;
pub use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "tillsync")]
#[command(about = "Inspect and resolve the offline write queue of a point-of-sale client")]
#[command(long_about = "tillsync - offline write queue administration

Writes made while the till is offline wait in a local queue until they can
be applied to the remote store. Items the remote refuses end up 'failed'
or 'conflict' and stay there until someone looks at them. This tool shows
the queue and lets you re-arm, requeue or discard those items.

QUICK START:
  tillsync status                    Queue counts at a glance
  tillsync list --status conflict    Items waiting for a decision
  tillsync show 42                   Full detail of one item
  tillsync requeue 42 --payload '{\"receipt\":\"R-1b\"}'

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

For more information on a specific command, run:
  tillsync <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Defaults to `general.default_output` from the config file.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Data directory holding config.yaml and tillsync.db
    #[arg(long, global = true, env = HOME_ENV)]
    pub home: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show queue counts per status
    ///
    /// # Examples
    ///
    ///   tillsync status
    ///   tillsync status -o json
    #[command(alias = "s")]
    Status,

    /// List queued items with a given status
    ///
    /// Pending items are listed in the order the next pass applies them;
    /// other statuses oldest first.
    ///
    /// # Examples
    ///
    ///   tillsync list                      Pending items
    ///   tillsync list --status failed
    ///   tillsync ls -s conflict -n 5
    #[command(alias = "ls")]
    List {
        /// Status to list (pending, syncing, synced, failed, conflict)
        #[arg(long, short = 's', default_value = "pending")]
        status: String,

        /// Maximum items to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Show one item in full
    Show {
        /// Queue item ID
        id: i64,
    },

    /// Queue a write by hand
    ///
    /// Mostly useful for testing a processor against a live remote.
    ///
    /// # Examples
    ///
    ///   tillsync enqueue sale '{"total": 1250, "currency": "EUR"}'
    ///   tillsync enqueue cash_movement '{"amount": -500}' --priority 1
    Enqueue(EnqueueArgs),

    /// Give a failed item more attempts
    ///
    /// The item returns to pending with its attempt count kept and its
    /// retry ceiling raised.
    Rearm {
        /// Queue item ID
        id: i64,

        /// Extra attempts to allow
        #[arg(long, short = 'a', default_value = "1")]
        attempts: u32,
    },

    /// Replace a failed or conflict item with a fresh pending one
    ///
    /// # Examples
    ///
    ///   tillsync requeue 42
    ///   tillsync requeue 42 --payload '{"receipt": "R-1b"}'
    Requeue {
        /// Queue item ID
        id: i64,

        /// Corrected payload as JSON (defaults to the original)
        #[arg(long, short = 'p')]
        payload: Option<String>,
    },

    /// Delete a failed or conflict item
    Discard {
        /// Queue item ID
        id: i64,
    },

    /// Delete synced items older than the retention window
    Cleanup {
        /// Age in hours (defaults to `sync.retention_hours`)
        #[arg(long)]
        older_than: Option<i64>,
    },

    /// Return items left syncing by a crashed process to pending
    Recover,

    /// Inspect or edit the reference-data cache
    Cache(CacheArgs),

    /// Show the effective configuration and file locations
    Config,

    /// Generate shell completions
    ///
    /// # Examples
    ///
    ///   tillsync completions zsh > ~/.zfunc/_tillsync
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for enqueueing an item.
#[derive(Args)]
pub struct EnqueueArgs {
    /// Entity type tag (sale, stock_movement, cash_movement, ...)
    pub entity_type: String,

    /// Payload as JSON
    pub payload: String,

    /// Priority, lower first (defaults to `sync.default_priority`)
    #[arg(long)]
    pub priority: Option<i32>,

    /// Retry ceiling (defaults to `sync.default_max_retries`)
    #[arg(long)]
    pub max_retries: Option<u32>,
}

/// Arguments for cache commands.
#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

/// Cache subcommands.
#[derive(Subcommand)]
pub enum CacheCommands {
    /// Show one cached snapshot
    Get {
        /// Entity type tag
        entity_type: String,
        /// Key within the entity type
        key: String,
    },

    /// Store a snapshot, replacing any previous one
    Put {
        /// Entity type tag
        entity_type: String,
        /// Key within the entity type
        key: String,
        /// Snapshot as JSON
        data: String,
    },

    /// List snapshots of an entity type
    List {
        /// Entity type tag
        entity_type: String,
    },

    /// Remove one snapshot
    Remove {
        /// Entity type tag
        entity_type: String,
        /// Key within the entity type
        key: String,
    },
}
