//! Host implementation that runs the server as a child process.
//!
//! The server is driven through its console: `stop` and `say` are written
//! to its stdin, and its stdout is scanned for lifecycle and player lines.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use anyhow::{bail, Context, Result};
use slot_config::{log_host_info, log_host_warn};
use slot_core::{Host, LaunchPatch};
use tokio::sync::mpsc::UnboundedSender;

use crate::console::split_args;

/// Plugin search path handed to the server process
pub const PLUGIN_DIRS_ENV: &str = "SLOTMOUNT_PLUGIN_DIRS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The server finished starting up
    Started,
    /// The server process closed its output
    Stopped,
    PlayerJoined(String),
    PlayerLeft(String),
}

pub struct ProcessHost {
    launch: Mutex<LaunchPatch>,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    exit_after_stop: AtomicBool,
    events: UnboundedSender<HostEvent>,
}

impl ProcessHost {
    pub fn new(events: UnboundedSender<HostEvent>) -> Self {
        Self {
            launch: Mutex::new(LaunchPatch::default()),
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            exit_after_stop: AtomicBool::new(false),
            events,
        }
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_after_stop.load(Ordering::SeqCst)
    }

    fn send_line(&self, line: &str) -> Result<()> {
        let mut stdin = lock(&self.stdin);
        let Some(pipe) = stdin.as_mut() else {
            bail!("server is not running");
        };
        writeln!(pipe, "{line}").context("write to server console")?;
        pipe.flush()?;
        Ok(())
    }
}

impl Host for ProcessHost {
    fn stop(&self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }
        log_host_info!("Sending stop to server");
        self.send_line("stop")
    }

    fn wait_for_stop(&self) -> Result<()> {
        let child = lock(&self.child).take();
        if let Some(mut child) = child {
            let status = child.wait().context("wait for server process")?;
            log_host_info!("Server exited", status = tracing::field::display(status));
        }
        lock(&self.stdin).take();
        Ok(())
    }

    fn start(&self) -> Result<()> {
        if self.is_running() {
            bail!("server is already running");
        }
        let launch = lock(&self.launch).clone();
        let mut command = build_command(&launch)?;
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("start `{}`", launch.start_command))?;

        log_host_info!(
            "Server started",
            pid = child.id(),
            dir = tracing::field::display(launch.working_directory.display()),
            handler = launch.handler.as_str(),
        );

        if let Some(stdout) = child.stdout.take() {
            let events = self.events.clone();
            thread::Builder::new()
                .name("server-output".into())
                .spawn(move || forward_output(stdout, events))
                .context("spawn output reader")?;
        }
        *lock(&self.stdin) = child.stdin.take();
        *lock(&self.child) = Some(child);
        Ok(())
    }

    fn broadcast(&self, message: &str) -> Result<()> {
        self.send_line(&format!("say {message}"))
    }

    fn tell(&self, player: &str, message: &str) -> Result<()> {
        self.send_line(&format!("tell {player} {message}"))
    }

    fn is_running(&self) -> bool {
        match lock(&self.child).as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn reload_self(&self) -> Result<()> {
        log_host_info!("Manager state reloaded");
        Ok(())
    }

    fn plugin_directories(&self) -> Vec<PathBuf> {
        lock(&self.launch).plugin_directories.clone()
    }

    fn apply_launch(&self, patch: LaunchPatch) -> Result<()> {
        log_host_info!(
            "Launch settings updated",
            dir = tracing::field::display(patch.working_directory.display()),
            command = patch.start_command.as_str(),
        );
        *lock(&self.launch) = patch;
        Ok(())
    }

    fn set_exit_after_stop(&self) {
        self.exit_after_stop.store(true, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn build_command(launch: &LaunchPatch) -> Result<Command> {
    let args = split_args(&launch.start_command);
    let Some((program, rest)) = args.split_first() else {
        bail!("empty start command");
    };

    // A relative program with a directory part is taken from the slot
    let program = Path::new(program);
    let program = if program.is_relative() && program.components().count() > 1 {
        launch.working_directory.join(program)
    } else {
        program.to_path_buf()
    };

    let mut command = Command::new(program);
    command.args(rest).current_dir(&launch.working_directory);
    if !launch.plugin_directories.is_empty() {
        let joined = std::env::join_paths(&launch.plugin_directories)
            .context("plugin directories")?;
        command.env(PLUGIN_DIRS_ENV, joined);
    }
    Ok(command)
}

fn forward_output(stdout: impl std::io::Read, events: UnboundedSender<HostEvent>) {
    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log_host_warn!("Server output unreadable", error = tracing::field::display(&e));
                break;
            }
        };
        println!("{line}");
        if let Some(event) = parse_line(&line) {
            // The receiver is gone only when the daemon is shutting down
            let _ = events.send(event);
        }
    }
    let _ = events.send(HostEvent::Stopped);
}

/// Recognise the server log lines the manager cares about
pub fn parse_line(line: &str) -> Option<HostEvent> {
    let content = match line.rfind("]: ") {
        Some(i) => &line[i + 3..],
        None => line,
    }
    .trim();

    if content.starts_with("Done (") {
        return Some(HostEvent::Started);
    }
    if let Some(player) = content.strip_suffix(" joined the game") {
        return single_word(player).map(HostEvent::PlayerJoined);
    }
    if let Some(player) = content.strip_suffix(" left the game") {
        return single_word(player).map(HostEvent::PlayerLeft);
    }
    None
}

fn single_word(text: &str) -> Option<String> {
    (!text.is_empty() && !text.contains(char::is_whitespace)).then(|| text.to_string())
}
