//! Console commands typed into the daemon's stdin.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use slot_config::log_console_debug;
use slot_core::{MountManager, OperationHandle};

use crate::render;

#[derive(Parser, Debug)]
#[command(name = "console", no_binary_name = true, disable_version_flag = true)]
pub struct ConsoleLine {
    #[command(subcommand)]
    pub command: ConsoleCommand,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ConsoleCommand {
    /// Request a swap to the slot at PATH
    Mount {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Confirm right away
        #[arg(long)]
        confirm: bool,
    },

    /// Run the pending mount or reset
    Confirm,

    /// Drop the pending request
    Abort,

    /// Request a reset of the active slot
    Reset,

    /// List the known slots
    List {
        #[arg(default_value_t = 1)]
        page: usize,
    },

    /// Rescan the search paths for slots
    Reload,

    /// Read or edit the pool config
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show or edit a slot's config
    Slot {
        #[command(subcommand)]
        action: SlotAction,
    },

    /// Show the manager state
    Status,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ConfigAction {
    Get { key: String },
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum SlotAction {
    Show {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    Set {
        #[arg(value_name = "PATH")]
        path: PathBuf,
        key: String,
        value: String,
    },
}

/// What a console line produced
pub struct Outcome {
    pub reply: String,
    /// A confirmed operation now running in the background
    pub operation: Option<OperationHandle>,
}

impl Outcome {
    fn reply(reply: String) -> Self {
        Self {
            reply,
            operation: None,
        }
    }
}

/// Split a console line into words; double quotes group words
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_word = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_word = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_word {
                    args.push(std::mem::take(&mut current));
                    has_word = false;
                }
            }
            c => {
                current.push(c);
                has_word = true;
            }
        }
    }
    if has_word {
        args.push(current);
    }
    args
}

pub fn parse(line: &str) -> Result<ConsoleCommand, clap::Error> {
    ConsoleLine::try_parse_from(split_args(line)).map(|l| l.command)
}

/// Parse and run one console line. Blank lines produce nothing.
pub fn handle_line(manager: &MountManager, line: &str) -> Option<Outcome> {
    if line.trim().is_empty() {
        return None;
    }
    log_console_debug!("Console command", line = line);
    Some(match parse(line) {
        Ok(command) => execute(manager, command),
        Err(e) => Outcome::reply(e.to_string()),
    })
}

pub fn execute(manager: &MountManager, command: ConsoleCommand) -> Outcome {
    match command {
        ConsoleCommand::Mount {
            path,
            confirm: false,
        } => Outcome::reply(match manager.request_mount(&path) {
            Ok(request) => render::pending(&request),
            Err(e) => render::error(&e),
        }),
        ConsoleCommand::Mount {
            path,
            confirm: true,
        } => started(manager.mount_now(&path)),
        ConsoleCommand::Confirm => started(manager.confirm()),
        ConsoleCommand::Abort => Outcome::reply(match manager.abort() {
            Ok(path) => render::aborted(&path),
            Err(e) => render::error(&e),
        }),
        ConsoleCommand::Reset => Outcome::reply(match manager.request_reset() {
            Ok(request) => render::pending(&request),
            Err(e) => render::error(&e),
        }),
        ConsoleCommand::List { page } => Outcome::reply(render::list(&manager.list_slots(page))),
        ConsoleCommand::Reload => Outcome::reply(match manager.reload() {
            Ok(detection) => render::detection(&detection),
            Err(e) => render::error(&e),
        }),
        ConsoleCommand::Config { action } => Outcome::reply(match action {
            ConfigAction::Get { key } => match manager.get_pool_config_value(&key) {
                Ok(value) => render::key_value(&key, &value),
                Err(e) => render::error(&e),
            },
            ConfigAction::Set { key, value } => {
                match manager.set_pool_config_value(&key, &value) {
                    Ok(stored) => render::key_value(&key, &stored),
                    Err(e) => render::error(&e),
                }
            }
        }),
        ConsoleCommand::Slot { action } => Outcome::reply(match action {
            SlotAction::Show { path } => match manager.get_slot_config(&path) {
                Ok(config) => render::slot_config(&path, &config),
                Err(e) => render::error(&e),
            },
            SlotAction::Set { path, key, value } => {
                match manager.set_slot_config_value(&path, &key, &value) {
                    Ok(stored) => render::key_value(&key, &stored),
                    Err(e) => render::error(&e),
                }
            }
        }),
        ConsoleCommand::Status => Outcome::reply(render::status(&manager.status())),
    }
}

fn started(result: slot_core::Result<OperationHandle>) -> Outcome {
    match result {
        Ok(handle) => Outcome {
            reply: render::started(handle.operation()),
            operation: Some(handle),
        },
        Err(e) => Outcome::reply(render::error(&e)),
    }
}
