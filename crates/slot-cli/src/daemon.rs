//! The `slotd run` loop: console input, server events and shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use slot_config::{log_manager_error, log_manager_info, log_manager_warn, PoolConfig};
use slot_core::{Host, MountManager, Operation, Worker};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;

use crate::console;
use crate::host::{HostEvent, ProcessHost};
use crate::render;

pub async fn run(config_path: PathBuf) -> Result<()> {
    let pool = PoolConfig::load(&config_path)
        .with_context(|| format!("load pool config {}", config_path.display()))?;

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let host = Arc::new(ProcessHost::new(events_tx));
    let worker = Worker::try_current()?;
    let manager = match MountManager::new(&config_path, host.clone(), worker) {
        Ok(manager) => manager,
        Err(e) => {
            if host.exit_requested() {
                log_manager_error!("Active slot is held by another manager, exiting");
            }
            return Err(e).context("start mount manager");
        }
    };

    if pool.auto_detect {
        match manager.reload() {
            Ok(detection) => println!("{}", render::detection(&detection)),
            Err(e) => println!("{}", render::error(&e)),
        }
    }

    host.apply_launch(manager.launch_patch())?;
    host.start()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line.context("read console")? {
                    Some(line) => {
                        if let Some(outcome) = console::handle_line(&manager, &line) {
                            println!("{}", outcome.reply);
                            if let Some(handle) = outcome.operation {
                                tokio::spawn(async move {
                                    if let Err(e) = handle.wait().await {
                                        println!("{}", render::error(&e));
                                    }
                                });
                            }
                        }
                    }
                    None => {
                        log_manager_info!("Console closed, running without input");
                        stdin_open = false;
                    }
                }
            }
            Some(event) = events.recv() => {
                if on_event(&manager, &host, event) {
                    log_manager_error!("Server stopped outside of a mount or reset, exiting");
                    return Ok(());
                }
            }
            _ = signal::ctrl_c() => {
                log_manager_info!("Shutdown signal received");
                break;
            }
        }
    }

    let host = Arc::clone(&host);
    tokio::task::spawn_blocking(move || {
        host.stop()?;
        host.wait_for_stop()
    })
    .await??;
    Ok(())
}

/// Forward a server event to the manager; true when the daemon should exit
fn on_event(manager: &MountManager, host: &ProcessHost, event: HostEvent) -> bool {
    let result = match &event {
        HostEvent::Started => manager.on_server_startup(),
        HostEvent::Stopped => manager.on_server_stop(),
        HostEvent::PlayerJoined(player) => manager.on_player_joined(player),
        HostEvent::PlayerLeft(player) => manager.on_player_left(player),
    };
    if let Err(e) = result {
        log_manager_warn!(
            "Server event handling failed",
            event = tracing::field::debug(&event),
            error = tracing::field::display(&e),
        );
    }

    // A restart stops the server with the gate held; anything else is a crash or `stop`
    event == HostEvent::Stopped
        && !host.is_running()
        && manager.current_operation() == Operation::Idle
}
