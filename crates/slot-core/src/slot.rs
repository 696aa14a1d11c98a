//! A slot directory together with its config and lock handle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use slot_config::{log_slot_debug, SlotConfig, PROPERTIES_FILE};
use slot_lock::{LockRegistry, SlotLock};

use crate::error::Result;
use crate::host::LaunchPatch;

#[derive(Debug)]
pub struct Slot {
    path: PathBuf,
    config: SlotConfig,
    lock: SlotLock,
    /// Player name -> join time, only while stats are tracked
    sessions: HashMap<String, i64>,
}

impl Slot {
    /// Open the slot at `path`; a missing config reads as the default one
    pub fn open(path: &Path, locks: &LockRegistry) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            config: SlotConfig::load(path)?,
            lock: locks.lock_for(path),
            sessions: HashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory name of the slot
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn config(&self) -> &SlotConfig {
        &self.config
    }

    pub fn reload_config(&mut self) -> Result<()> {
        self.config = SlotConfig::load(&self.path)?;
        Ok(())
    }

    pub fn properties_path(&self) -> PathBuf {
        self.path.join(PROPERTIES_FILE)
    }

    pub fn plugin_dir(&self) -> Option<PathBuf> {
        self.config.plugin_dir_in(&self.path)
    }

    pub fn reset_dir(&self) -> Option<PathBuf> {
        self.config.reset_dir(&self.path)
    }

    /// Claim the slot for `owner`
    pub fn lock(&mut self, owner: &str) -> Result<()> {
        self.config = self.lock.acquire(owner)?;
        Ok(())
    }

    /// Drop `owner`'s claim on the slot
    pub fn release(&mut self, owner: &str) -> Result<()> {
        self.config = self.lock.release(owner)?;
        Ok(())
    }

    /// Edit one config key on disk; returns the value as stored
    pub fn edit_config(&mut self, key: &str, raw: &str) -> Result<String> {
        self.reload_config()?;
        let shown = self.config.set_value(key, raw)?;
        self.config.save(&self.path)?;
        log_slot_debug!(
            "Slot config edited",
            slot = tracing::field::display(self.path.display()),
            key = key,
            value = shown.as_str(),
        );
        Ok(shown)
    }

    pub fn launch_patch(&self, plugin_directories: Vec<PathBuf>) -> LaunchPatch {
        LaunchPatch {
            working_directory: self.path.clone(),
            start_command: self.config.start_command.clone(),
            handler: self.config.handler.clone(),
            plugin_directories,
        }
    }

    pub fn on_mount(&mut self) -> Result<()> {
        self.on_mount_at(now_nanos())
    }

    pub fn on_unmount(&mut self) -> Result<()> {
        self.on_unmount_at(now_nanos())
    }

    pub fn on_player_joined(&mut self, player: &str) -> Result<()> {
        self.on_player_joined_at(player, now_nanos())
    }

    pub fn on_player_left(&mut self, player: &str) -> Result<()> {
        self.on_player_left_at(player, now_nanos())
    }

    pub(crate) fn on_mount_at(&mut self, now: i64) -> Result<()> {
        self.sessions.clear();
        self.update_stats(|config, _| config.stats.last_mount_epoch_nanos = now)
    }

    /// Close the running use period and every open player session
    pub(crate) fn on_unmount_at(&mut self, now: i64) -> Result<()> {
        self.update_stats(|config, sessions| {
            let stats = &mut config.stats;
            if stats.last_mount_epoch_nanos > 0 {
                stats.total_use_time_nanos += elapsed(stats.last_mount_epoch_nanos, now);
                stats.last_mount_epoch_nanos = 0;
            }
            for (_, joined) in sessions.drain() {
                stats.total_player_time_nanos += elapsed(joined, now);
            }
        })
    }

    /// Forget a mount time that no stop will close
    pub fn clear_mount_stamp(&mut self) -> Result<()> {
        self.sessions.clear();
        self.update_stats(|config, _| config.stats.last_mount_epoch_nanos = 0)
    }

    pub(crate) fn on_player_joined_at(&mut self, player: &str, now: i64) -> Result<()> {
        self.update_stats(|config, sessions| {
            config.stats.total_players += 1;
            sessions.insert(player.to_string(), now);
        })
    }

    pub(crate) fn on_player_left_at(&mut self, player: &str, now: i64) -> Result<()> {
        self.update_stats(|config, sessions| {
            if let Some(joined) = sessions.remove(player) {
                config.stats.total_player_time_nanos += elapsed(joined, now);
            }
        })
    }

    /// Apply `update` to a freshly loaded config and persist it, if the
    /// slot tracks stats
    fn update_stats<F>(&mut self, update: F) -> Result<()>
    where
        F: FnOnce(&mut SlotConfig, &mut HashMap<String, i64>),
    {
        self.reload_config()?;
        if !self.config.track_stats {
            return Ok(());
        }
        update(&mut self.config, &mut self.sessions);
        self.config.save(&self.path)?;
        Ok(())
    }
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0)
}

fn elapsed(since: i64, now: i64) -> u64 {
    u64::try_from(now.saturating_sub(since)).unwrap_or(0)
}
