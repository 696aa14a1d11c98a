//! # slot-lock
//!
//! Exclusive ownership of slot directories.
//!
//! A slot belongs to the manager whose `mount_name` is written into the
//! `occupied_by` marker of the slot's `slot.toml`. Acquire and release each
//! run in a short critical section guarded by:
//! - an in-process mutex shared by every handle to the same directory
//!   (handed out by [`LockRegistry`])
//! - an advisory `flock` on `<slot>/.slot.lock`
//!
//! The marker is reloaded from disk inside the critical section, so changes
//! made by another manager since the slot was opened are seen. This is not
//! transactional against writers that ignore the file lock.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};

use fs2::FileExt;
use slot_config::{ConfigError, SlotConfig};
use thiserror::Error;
use tracing::debug;

/// Advisory lock file created inside every slot directory
pub const LOCK_FILE: &str = ".slot.lock";

#[derive(Error, Debug)]
pub enum LockError {
    /// Someone else holds the slot. `holder` is known when the on-disk
    /// marker names another manager, `None` when the slot is mid-transition
    /// in this process or in another one.
    #[error("slot {} is busy", .path.display())]
    Busy {
        path: PathBuf,
        holder: Option<String>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, LockError>;

/// Hands out [`SlotLock`]s; handles for the same directory share one mutex.
#[derive(Debug, Default, Clone)]
pub struct LockRegistry {
    table: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for the slot at `slot_dir`
    pub fn lock_for(&self, slot_dir: &Path) -> SlotLock {
        let key = slot_dir
            .canonicalize()
            .unwrap_or_else(|_| slot_dir.to_path_buf());
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let mutex = table.entry(key).or_default().clone();
        SlotLock {
            path: slot_dir.to_path_buf(),
            mutex,
        }
    }
}

/// Lock handle of one slot directory
#[derive(Debug, Clone)]
pub struct SlotLock {
    path: PathBuf,
    mutex: Arc<Mutex<()>>,
}

impl SlotLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Claim the slot for `owner` and return the config as persisted.
    ///
    /// Succeeds when the marker is empty or already names `owner`, so
    /// acquiring twice with the same owner is fine. Fails with
    /// [`LockError::Busy`] without waiting when another thread is inside the
    /// critical section, when another process holds the file lock, or when
    /// the marker names someone else.
    pub fn acquire(&self, owner: &str) -> Result<SlotConfig> {
        let _guard = match self.mutex.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(self.busy(None)),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let file = self.open_lock_file()?;
        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Err(self.busy(None)),
            Err(e) => return Err(e.into()),
        }

        let mut config = SlotConfig::load(&self.path)?;
        if !config.is_free_for(owner) {
            debug!(
                slot = %self.path.display(),
                holder = %config.occupied_by,
                "Slot occupied by another manager"
            );
            return Err(self.busy(Some(config.occupied_by)));
        }

        config.occupied_by = owner.to_string();
        config.save(&self.path)?;
        debug!(slot = %self.path.display(), owner, "Slot acquired");
        Ok(config)
    }

    /// Give up `owner`'s claim and return the config as persisted.
    ///
    /// The marker is cleared only if it still names `owner`; a stale handle
    /// never clears a claim made by someone else.
    pub fn release(&self, owner: &str) -> Result<SlotConfig> {
        let _guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        let file = self.open_lock_file()?;
        file.lock_exclusive()?;

        let mut config = SlotConfig::load(&self.path)?;
        if config.occupied_by == owner {
            config.occupied_by.clear();
            config.save(&self.path)?;
            debug!(slot = %self.path.display(), owner, "Slot released");
        } else {
            debug!(
                slot = %self.path.display(),
                owner,
                holder = %config.occupied_by,
                "Slot not held by owner, marker left untouched"
            );
        }
        Ok(config)
    }

    /// Current holder according to the on-disk marker
    pub fn holder(&self) -> Result<Option<String>> {
        let config = SlotConfig::load(&self.path)?;
        Ok(Some(config.occupied_by).filter(|h| !h.is_empty()))
    }

    fn open_lock_file(&self) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.path.join(LOCK_FILE))?)
    }

    fn busy(&self, holder: Option<String>) -> LockError {
        LockError::Busy {
            path: self.path.clone(),
            holder,
        }
    }
}
