//! # slot-config
//!
//! Configuration management for slotmount.
//!
//! Two files are involved:
//! 1. `slotmount.toml` - the pool config owned by one manager instance
//! 2. `slot.toml` - the per-slot config stored inside every slot directory
//!
//! Both are TOML documents whose fields can also be read and edited by key
//! (see [`get_field`] and [`set_field`]), which is what the console commands
//! build on.

pub mod logging;
pub mod testing;

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Pool config file name
pub const POOL_CONFIG_FILE: &str = "slotmount.toml";

/// Per-slot config file name, relative to the slot directory
pub const SLOT_CONFIG_FILE: &str = "slot.toml";

/// A slot directory containing this file is skipped by detection
pub const IGNORE_MARKER: &str = ".slotignore";

/// Runtime property file of the hosted server, relative to the slot directory
pub const PROPERTIES_FILE: &str = "server.properties";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("invalid boolean value: {0}")]
    InvalidBool(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("config key is not editable: {0}")]
    NotEditable(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Pool-wide settings of one manager instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Identity written into `occupied_by` of every slot this manager holds
    pub mount_name: String,
    /// Directories scanned for slots on reload
    pub servers_path: Vec<PathBuf>,
    /// Scan `servers_path` when the daemon starts
    pub auto_detect: bool,
    /// Property override file applied after every swap ("" or "." disables)
    pub overwrite_path: String,
    /// Known slot paths, in listing order
    pub available_servers: Vec<PathBuf>,
    /// Path of the active slot
    pub current_server: PathBuf,
    /// Entries per page when listing slots
    pub list_size: usize,
    /// Greet players when they join
    pub welcome_player: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            mount_name: "MountDemo".to_string(),
            servers_path: vec![PathBuf::from("../MountableServers")],
            auto_detect: false,
            overwrite_path: String::new(),
            available_servers: Vec::new(),
            current_server: PathBuf::new(),
            list_size: 10,
            welcome_player: false,
        }
    }
}

impl PoolConfig {
    /// Load the pool config from `path`
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading pool config from {:?}", path);
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Persist the pool config to `path` (write-rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &toml::to_string_pretty(self)?)
    }

    /// Generate default config TOML string
    pub fn default_toml() -> Result<String> {
        Ok(toml::to_string_pretty(&PoolConfig::default())?)
    }

    /// The override file, if overwriting is enabled
    pub fn overwrite_file(&self) -> Option<PathBuf> {
        non_empty_path(&self.overwrite_path).map(PathBuf::from)
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        get_field(self, key).map(|v| display_value(&v))
    }

    /// Edit one field by key; returns the value as stored
    pub fn set_value(&mut self, key: &str, raw: &str) -> Result<String> {
        *self = set_field(self, key, raw)?;
        self.get_value(key)
    }
}

/// Granularity of a slot reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetType {
    /// Replace the whole main world
    Full,
    /// Replace the main world but keep player data
    Region,
}

impl fmt::Display for ResetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetType::Full => write!(f, "full"),
            ResetType::Region => write!(f, "region"),
        }
    }
}

impl FromStr for ResetType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(ResetType::Full),
            "region" => Ok(ResetType::Region),
            other => Err(ConfigError::InvalidValue {
                key: "reset_type".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Usage counters of a slot. Only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotStats {
    /// 0 when the slot was never mounted
    pub last_mount_epoch_nanos: i64,
    pub total_use_time_nanos: u64,
    pub total_player_time_nanos: u64,
    pub total_players: u64,
}

/// Config stored inside a slot directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotConfig {
    /// An operator validated this slot; unchecked slots cannot be mounted
    pub checked: bool,
    pub desc: String,
    /// `mount_name` of the manager holding this slot, empty when free
    pub occupied_by: String,
    /// Snapshot directory used for reset, relative to the slot ("" disables)
    pub reset_path: String,
    /// `full` or `region`
    pub reset_type: String,
    /// Extra plugin directory relative to the slot ("" disables)
    pub plugin_dir: String,
    pub start_command: String,
    pub handler: String,
    pub track_stats: bool,
    pub stats: SlotStats,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            checked: false,
            desc: String::new(),
            occupied_by: String::new(),
            reset_path: String::new(),
            reset_type: ResetType::Full.to_string(),
            plugin_dir: String::new(),
            start_command: default_start_command().to_string(),
            handler: "vanilla_handler".to_string(),
            track_stats: false,
            stats: SlotStats::default(),
        }
    }
}

impl SlotConfig {
    /// Path of the config file for the slot at `slot_dir`
    pub fn path_in(slot_dir: &Path) -> PathBuf {
        slot_dir.join(SLOT_CONFIG_FILE)
    }

    pub fn exists(slot_dir: &Path) -> bool {
        Self::path_in(slot_dir).is_file()
    }

    /// Load the config of the slot at `slot_dir`, default if it has none
    pub fn load(slot_dir: &Path) -> Result<Self> {
        let path = Self::path_in(slot_dir);
        if !path.is_file() {
            debug!("No slot config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn save(&self, slot_dir: &Path) -> Result<()> {
        write_atomic(&Self::path_in(slot_dir), &toml::to_string_pretty(self)?)
    }

    /// Parsed reset type, `None` when the stored value is not recognised
    pub fn reset_type(&self) -> Option<ResetType> {
        self.reset_type.parse().ok()
    }

    /// Absolute snapshot directory, if reset is configured
    pub fn reset_dir(&self, slot_dir: &Path) -> Option<PathBuf> {
        non_empty_path(&self.reset_path).map(|p| slot_dir.join(p))
    }

    /// Absolute plugin directory, if one is configured
    pub fn plugin_dir_in(&self, slot_dir: &Path) -> Option<PathBuf> {
        non_empty_path(&self.plugin_dir).map(|p| slot_dir.join(p))
    }

    pub fn is_free_for(&self, owner: &str) -> bool {
        self.occupied_by.is_empty() || self.occupied_by == owner
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        get_field(self, key).map(|v| display_value(&v))
    }

    /// Edit one field by key; returns the value as stored
    pub fn set_value(&mut self, key: &str, raw: &str) -> Result<String> {
        *self = set_field(self, key, raw)?;
        self.get_value(key)
    }
}

/// Start command written into new slot configs
pub fn default_start_command() -> &'static str {
    if cfg!(windows) {
        "start.bat"
    } else {
        "./start.sh"
    }
}

fn non_empty_path(raw: &str) -> Option<&str> {
    match raw.trim() {
        "" | "." => None,
        p => Some(p),
    }
}

/// Read a field of any serializable config by its key
pub fn get_field<T: Serialize>(config: &T, key: &str) -> Result<toml::Value> {
    to_table(config)?
        .remove(key)
        .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))
}

/// Return a copy of `config` with `key` set from its textual form.
///
/// The raw text is interpreted according to the current type of the field:
/// booleans accept yes/no style words, integers must parse, lists are
/// comma-separated. Nested tables are not editable.
pub fn set_field<T: Serialize + DeserializeOwned>(config: &T, key: &str, raw: &str) -> Result<T> {
    let mut table = to_table(config)?;
    let field = table
        .get_mut(key)
        .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    };

    let value = match &*field {
        toml::Value::Boolean(_) => toml::Value::Boolean(parse_bool(raw)?),
        toml::Value::Integer(_) => {
            toml::Value::Integer(raw.trim().parse().map_err(|_| invalid())?)
        }
        toml::Value::Float(_) => toml::Value::Float(raw.trim().parse().map_err(|_| invalid())?),
        toml::Value::Array(_) => toml::Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| toml::Value::String(s.to_string()))
                .collect(),
        ),
        toml::Value::String(_) => toml::Value::String(raw.to_string()),
        toml::Value::Table(_) | toml::Value::Datetime(_) => {
            return Err(ConfigError::NotEditable(key.to_string()))
        }
    };
    *field = value;

    Ok(toml::Value::Table(table).try_into()?)
}

/// Human-readable rendering of a config value
pub fn display_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Parse the boolean spellings accepted on the console
pub fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "ok" | "t" | "o" | "yes" | "y" => Ok(true),
        "false" | "no" | "f" | "n" => Ok(false),
        _ => Err(ConfigError::InvalidBool(raw.to_string())),
    }
}

fn to_table<T: Serialize>(config: &T) -> Result<toml::Table> {
    match toml::Value::try_from(config)? {
        toml::Value::Table(table) => Ok(table),
        _ => Err(ConfigError::NotEditable("<root>".to_string())),
    }
}

/// Write `contents` next to `path` and rename it into place
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
