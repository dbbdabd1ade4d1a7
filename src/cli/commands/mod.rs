//! Command implementations for tillsync.
//!
//! Each command returns the text to print; `main` does the printing.

mod cache;
mod config;
mod queue;

pub use cache::cache;
pub use config::show_config;
pub use queue::{cleanup, discard, enqueue, list, rearm, recover, requeue, show, status};

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::args::Cli;

/// Generate completions for `shell`.
#[must_use]
pub fn completions(shell: Shell) -> String {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, name, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
