//! Restore a slot's worlds from its snapshot directory.
//!
//! The main world is reset according to the slot's [`ResetType`]; auxiliary
//! worlds are always replaced wholesale. In region mode the per-player
//! subdirectories of the main world are left alone on both sides.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use slot_config::{log_reset_info, ResetType};
use thiserror::Error;
use walkdir::WalkDir;

/// World directories, main world first
pub const WORLDS: [&str; 3] = ["world", "world_nether", "world_the_end"];

/// Main-world subdirectories a region reset never touches
pub const RESERVED_DIRS: [&str; 3] = ["playerdata", "advancements", "stats"];

#[derive(Error, Debug)]
pub enum ResetError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{} is not inside {}", .path.display(), .root.display())]
    OutsideTree { path: PathBuf, root: PathBuf },
}

pub type Result<T> = std::result::Result<T, ResetError>;

#[derive(Debug, Clone)]
pub struct ResetExecutor {
    worlds: Vec<String>,
    reserved: Vec<String>,
}

impl Default for ResetExecutor {
    fn default() -> Self {
        Self::new(WORLDS, RESERVED_DIRS)
    }
}

impl ResetExecutor {
    /// `worlds` lists the main world first
    pub fn new<W, R>(worlds: W, reserved: R) -> Self
    where
        W: IntoIterator,
        W::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            worlds: worlds.into_iter().map(Into::into).collect(),
            reserved: reserved.into_iter().map(Into::into).collect(),
        }
    }

    /// Reset the worlds of the slot at `slot_path` from `snapshot`.
    ///
    /// `snapshot` is joined onto `slot_path`, so an absolute path is used
    /// as is. Worlds absent from the snapshot end up absent.
    pub fn reset(&self, slot_path: &Path, snapshot: &Path, reset_type: ResetType) -> Result<()> {
        let snapshot_root = slot_path.join(snapshot);
        log_reset_info!(
            "Resetting slot",
            slot = tracing::field::display(slot_path.display()),
            snapshot = tracing::field::display(snapshot_root.display()),
            reset_type = tracing::field::display(reset_type),
        );

        let Some((main, auxiliary)) = self.worlds.split_first() else {
            return Ok(());
        };

        let live_main = slot_path.join(main);
        let snap_main = snapshot_root.join(main);
        match reset_type {
            ResetType::Full => {
                remove_if_exists(&live_main)?;
                if snap_main.is_dir() {
                    copy_tree(&snap_main, &live_main)?;
                } else {
                    log_reset_info!("No main world in snapshot", world = main.as_str());
                }
            }
            ResetType::Region => self.reset_regions(&live_main, &snap_main)?,
        }

        for world in auxiliary {
            let live = slot_path.join(world);
            let snap = snapshot_root.join(world);
            remove_if_exists(&live)?;
            if snap.is_dir() {
                copy_tree(&snap, &live)?;
            }
        }

        log_reset_info!("Reset done", slot = tracing::field::display(slot_path.display()));
        Ok(())
    }

    fn reset_regions(&self, live: &Path, snap: &Path) -> Result<()> {
        if live.is_dir() {
            for entry in fs::read_dir(live)? {
                let entry = entry?;
                if !self.is_reserved(&entry.file_name()) {
                    remove_entry(&entry.path())?;
                }
            }
        }

        if !snap.is_dir() {
            log_reset_info!("No main world in snapshot");
            return Ok(());
        }
        fs::create_dir_all(live)?;
        for entry in fs::read_dir(snap)? {
            let entry = entry?;
            let name = entry.file_name();
            if self.is_reserved(&name) {
                continue;
            }
            let from = entry.path();
            let to = live.join(&name);
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                copy_tree(&from, &to)?;
            } else {
                log_reset_info!("Restoring", entry = tracing::field::display(to.display()));
                if file_type.is_symlink() {
                    copy_symlink(&from, &to)?;
                } else {
                    copy_file(&from, &to)?;
                }
            }
        }
        Ok(())
    }

    fn is_reserved(&self, name: &std::ffi::OsStr) -> bool {
        self.reserved.iter().any(|r| name == r.as_str())
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(_) => remove_entry(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remove_entry(path: &Path) -> Result<()> {
    log_reset_info!("Deleting", entry = tracing::field::display(path.display()));
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Copy the tree at `from` to `to`, which must not exist yet
pub fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    log_reset_info!(
        "Restoring",
        entry = tracing::field::display(to.display()),
        from = tracing::field::display(from.display()),
    );
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|_| ResetError::OutsideTree {
                path: entry.path().to_path_buf(),
                root: from.to_path_buf(),
            })?;
        let target = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to)?;
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = fs::read_link(from)?;
    std::os::unix::fs::symlink(target, to)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    copy_file(from, to)
}
