//! Throw-away slot pools for isolated testing.
//!
//! Provides `TestPool` to manage:
//! - A temporary pool root with a `servers/` directory
//! - Slot directories with their `slot.toml` and `server.properties`
//! - The pool config file
//!
//! # Usage
//!
//! ```ignore
//! use slot_config::testing::TestPool;
//!
//! let pool = TestPool::new()?;
//! let a = pool.add_slot("A", true)?;
//! let b = pool.add_slot("B", true)?;
//! pool.write_pool_config("alpha", &[a.clone(), b], &a)?;
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use tempfile::TempDir;

use crate::{PoolConfig, SlotConfig, POOL_CONFIG_FILE, PROPERTIES_FILE};

/// Atomic counter for unique pool IDs
static POOL_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Isolated slot pool rooted in a temporary directory
pub struct TestPool {
    /// Temporary directory (dropped on cleanup)
    _temp_dir: TempDir,
    /// Pool root
    pub root: PathBuf,
    /// Directory holding the slot directories
    pub servers_dir: PathBuf,
    /// Location of `slotmount.toml`
    pub config_path: PathBuf,
    /// Unique pool ID
    pub pool_id: u32,
}

impl TestPool {
    pub fn new() -> anyhow::Result<Self> {
        let pool_id = POOL_COUNTER.fetch_add(1, Ordering::Relaxed);
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().to_path_buf();
        let servers_dir = root.join("servers");
        std::fs::create_dir_all(&servers_dir)?;

        Ok(Self {
            config_path: root.join(POOL_CONFIG_FILE),
            _temp_dir: temp_dir,
            root,
            servers_dir,
            pool_id,
        })
    }

    /// Create a slot directory with a config and a `server.properties`
    pub fn add_slot(&self, name: &str, checked: bool) -> anyhow::Result<PathBuf> {
        let path = self.add_bare_slot(name)?;
        let config = SlotConfig {
            checked,
            desc: format!("test slot {}", name),
            ..SlotConfig::default()
        };
        config.save(&path)?;
        std::fs::write(
            path.join(PROPERTIES_FILE),
            format!("motd={}\nserver-port=25565\n", name),
        )?;
        Ok(path)
    }

    /// Create a slot directory without any config file
    pub fn add_bare_slot(&self, name: &str) -> anyhow::Result<PathBuf> {
        let path = self.servers_dir.join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Rewrite the config of the slot at `path`
    pub fn edit_slot(
        &self,
        path: &Path,
        edit: impl FnOnce(&mut SlotConfig),
    ) -> anyhow::Result<SlotConfig> {
        let mut config = SlotConfig::load(path)?;
        edit(&mut config);
        config.save(path)?;
        Ok(config)
    }

    /// Write the pool config and return it
    pub fn write_pool_config(
        &self,
        mount_name: &str,
        slots: &[PathBuf],
        current: &Path,
    ) -> anyhow::Result<PoolConfig> {
        let config = PoolConfig {
            mount_name: mount_name.to_string(),
            servers_path: vec![self.servers_dir.clone()],
            available_servers: slots.to_vec(),
            current_server: current.to_path_buf(),
            ..PoolConfig::default()
        };
        config.save(&self.config_path)?;
        Ok(config)
    }

    /// Create a file below the pool root
    pub fn create_file(&self, relative_path: &str, content: &[u8]) -> anyhow::Result<PathBuf> {
        let path = self.root.join(relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }
}
