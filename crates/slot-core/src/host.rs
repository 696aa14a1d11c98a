//! Control surface of the process manager the slots are swapped under.

use std::path::{Path, PathBuf};

/// Launch settings the host applies the next time it starts the server
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchPatch {
    pub working_directory: PathBuf,
    pub start_command: String,
    pub handler: String,
    pub plugin_directories: Vec<PathBuf>,
}

/// The host process manager.
///
/// `stop`/`start` only signal; `wait_for_stop` blocks until the server has
/// fully terminated. Implementations are called from worker threads.
pub trait Host: Send + Sync {
    fn stop(&self) -> anyhow::Result<()>;

    fn wait_for_stop(&self) -> anyhow::Result<()>;

    fn start(&self) -> anyhow::Result<()>;

    fn broadcast(&self, message: &str) -> anyhow::Result<()>;

    /// Message a single player
    fn tell(&self, player: &str, message: &str) -> anyhow::Result<()>;

    fn is_running(&self) -> bool;

    /// Reload the manager's host-side integration after a restart
    fn reload_self(&self) -> anyhow::Result<()>;

    /// Plugin search path currently configured in the host
    fn plugin_directories(&self) -> Vec<PathBuf>;

    fn apply_launch(&self, patch: LaunchPatch) -> anyhow::Result<()>;

    /// Make the hosting process exit once the server has stopped
    fn set_exit_after_stop(&self);
}

/// Swap one slot's plugin directory for another's in the host search path.
///
/// `outgoing` is removed if present; `incoming` is appended unless already
/// listed. Every other entry keeps its position.
pub fn splice_plugin_dirs(
    mut dirs: Vec<PathBuf>,
    outgoing: Option<&Path>,
    incoming: Option<&Path>,
) -> Vec<PathBuf> {
    if let Some(outgoing) = outgoing {
        dirs.retain(|d| d != outgoing);
    }
    if let Some(incoming) = incoming {
        if !dirs.iter().any(|d| d == incoming) {
            dirs.push(incoming.to_path_buf());
        }
    }
    dirs
}
