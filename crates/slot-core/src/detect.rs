//! Discovery of slot directories under the configured search paths.

use std::fs;
use std::path::{Path, PathBuf};

use slot_config::{default_start_command, log_slot_debug, log_slot_info, SlotConfig, IGNORE_MARKER};

use crate::error::Result;

/// Outcome of a detection pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    /// Added slots that had no config and got a generated one
    pub initialized: Vec<PathBuf>,
}

/// A directory carrying the ignore marker is never picked up
pub fn is_ignored(path: &Path) -> bool {
    path.join(IGNORE_MARKER).is_file()
}

/// Compare the slot directories found under `search_paths` with `known`.
///
/// Returns `(added, removed)`: directories found that are not known, and
/// known paths no longer found. Both are sorted and free of duplicates.
pub fn detect_slots(search_paths: &[PathBuf], known: &[PathBuf]) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut found = Vec::new();
    for search in search_paths {
        for entry in fs::read_dir(search)? {
            let path = entry?.path();
            if path.is_dir() && !is_ignored(&path) {
                found.push(path);
            }
        }
    }

    let mut added: Vec<PathBuf> = found.iter().filter(|p| !known.contains(p)).cloned().collect();
    let mut removed: Vec<PathBuf> = known.iter().filter(|p| !found.contains(p)).cloned().collect();
    for list in [&mut added, &mut removed] {
        list.sort();
        list.dedup();
    }

    log_slot_debug!(
        "Slot detection done",
        found = found.len(),
        added = added.len(),
        removed = removed.len(),
    );
    Ok((added, removed))
}

/// Write a generated config for a newly detected slot.
///
/// The slot starts unchecked. A `paper*.jar` in the slot root selects the
/// bukkit handler.
pub fn init_slot_config(path: &Path) -> Result<SlotConfig> {
    let mut config = SlotConfig {
        checked: false,
        start_command: default_start_command().to_string(),
        ..SlotConfig::default()
    };

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if entry.file_type()?.is_file() && name.starts_with("paper") && name.ends_with(".jar") {
            config.handler = "bukkit_handler".to_string();
            break;
        }
    }

    config.save(path)?;
    log_slot_info!(
        "Generated slot config",
        slot = tracing::field::display(path.display()),
        handler = config.handler.as_str(),
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use slot_config::testing::TestPool;

    #[test]
    fn test_detect_added_and_removed() {
        let pool = TestPool::new().unwrap();
        let a = pool.add_slot("A", true).unwrap();
        let b = pool.add_bare_slot("B").unwrap();
        let ignored = pool.add_bare_slot("C").unwrap();
        std::fs::write(ignored.join(IGNORE_MARKER), "").unwrap();
        pool.create_file("servers/notes.txt", b"not a slot").unwrap();
        let gone = pool.servers_dir.join("gone");

        let (added, removed) =
            detect_slots(&[pool.servers_dir.clone()], &[a.clone(), gone.clone()]).unwrap();
        assert_eq!(added, vec![b]);
        assert_eq!(removed, vec![gone]);
    }

    #[test]
    fn test_detect_missing_search_path_fails() {
        let pool = TestPool::new().unwrap();
        assert!(detect_slots(&[pool.root.join("nope")], &[]).is_err());
    }

    #[test]
    fn test_init_config_defaults() {
        let pool = TestPool::new().unwrap();
        let path = pool.add_bare_slot("vanilla").unwrap();

        let config = init_slot_config(&path).unwrap();
        assert!(!config.checked);
        assert_eq!(config.handler, "vanilla_handler");
        assert_eq!(config.start_command, default_start_command());
        assert_eq!(SlotConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_init_config_detects_paper() {
        let pool = TestPool::new().unwrap();
        let path = pool.add_bare_slot("paper").unwrap();
        pool.create_file("servers/paper/paper-1.20.4-435.jar", b"").unwrap();

        assert_eq!(init_slot_config(&path).unwrap().handler, "bukkit_handler");
    }
}
