//! Minimal `server.properties` handling.
//!
//! Lines are kept verbatim so a merge only touches the overridden keys;
//! comments, blank lines and ordering survive.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use slot_config::{log_slot_debug, log_slot_info};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Raw(String),
    /// `raw` holds the original text until the value is changed
    Entry {
        key: String,
        value: String,
        raw: Option<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    lines: Vec<Line>,
}

impl Properties {
    pub fn parse(text: &str) -> Self {
        let lines = text.lines().map(parse_line).collect();
        Self { lines }
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Set `key`, replacing the value in place or appending a new line
    pub fn set(&mut self, key: &str, value: &str) {
        for line in &mut self.lines {
            if let Line::Entry { key: k, value: v, raw } = line {
                if k == key {
                    *v = value.to_string();
                    *raw = None;
                    return;
                }
            }
        }
        self.lines.push(Line::Entry {
            key: key.to_string(),
            value: value.to_string(),
            raw: None,
        });
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { key, value, .. } => Some((key.as_str(), value.as_str())),
            Line::Raw(_) => None,
        })
    }

    /// Apply every entry of `overrides` on top of `self`
    pub fn merge(&mut self, overrides: &Properties) {
        for (key, value) in overrides.entries() {
            self.set(key, value);
        }
    }
}

impl fmt::Display for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            match line {
                Line::Raw(raw) | Line::Entry { raw: Some(raw), .. } => writeln!(f, "{raw}")?,
                Line::Entry { key, value, .. } => writeln!(f, "{key}={value}")?,
            }
        }
        Ok(())
    }
}

fn parse_line(line: &str) -> Line {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
        return Line::Raw(line.to_string());
    }

    let mut escaped = false;
    for (i, c) in trimmed.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '=' | ':' if !escaped => {
                return Line::Entry {
                    key: trimmed[..i].trim_end().to_string(),
                    value: trimmed[i + 1..].trim_start().to_string(),
                    raw: Some(line.to_string()),
                };
            }
            _ => escaped = false,
        }
    }
    Line::Entry {
        key: trimmed.trim_end().to_string(),
        value: String::new(),
        raw: Some(line.to_string()),
    }
}

/// Merge the override file into the target properties file.
///
/// Returns `false` when the override file does not exist. A missing target
/// is created from the overrides alone.
pub fn apply_overrides(override_file: &Path, target: &Path) -> io::Result<bool> {
    if !override_file.is_file() {
        log_slot_info!(
            "Override file missing, properties left untouched",
            path = tracing::field::display(override_file.display()),
        );
        return Ok(false);
    }
    let overrides = Properties::load(override_file)?;

    let mut properties = match Properties::load(target) {
        Ok(p) => p,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log_slot_info!(
                "Target properties missing, creating it",
                path = tracing::field::display(target.display()),
            );
            Properties::default()
        }
        Err(e) => return Err(e),
    };

    properties.merge(&overrides);
    properties.save(target)?;
    log_slot_debug!(
        "Properties overridden",
        target = tracing::field::display(target.display()),
        keys = overrides.entries().count(),
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "#Minecraft server properties\n\
                          motd=A Minecraft Server\n\
                          server-port=25565\n\
                          \n\
                          level-name = world\n";

    #[test]
    fn test_parse_and_get() {
        let props = Properties::parse(SAMPLE);
        assert_eq!(props.get("motd"), Some("A Minecraft Server"));
        assert_eq!(props.get("level-name"), Some("world"));
        assert_eq!(props.get("missing"), None);
        assert_eq!(props.entries().count(), 3);
    }

    #[test]
    fn test_escaped_separator_stays_in_key() {
        let props = Properties::parse("a\\=b=c\nflag\n");
        assert_eq!(props.get("a\\=b"), Some("c"));
        assert_eq!(props.get("flag"), Some(""));
    }

    #[test]
    fn test_merge_replaces_and_appends() {
        let mut props = Properties::parse(SAMPLE);
        props.merge(&Properties::parse("motd=Overridden\nmax-players=50\n"));

        assert_eq!(props.get("motd"), Some("Overridden"));
        assert_eq!(props.get("server-port"), Some("25565"));
        assert_eq!(props.get("max-players"), Some("50"));

        let text = props.to_string();
        assert!(text.starts_with("#Minecraft server properties\nmotd=Overridden\n"));
        assert!(text.contains("\nlevel-name = world\n"));
        assert!(text.ends_with("max-players=50\n"));
    }

    #[test]
    fn test_apply_overrides() {
        let temp = TempDir::new().unwrap();
        let overrides = temp.path().join("overwrite.properties");
        let target = temp.path().join("server.properties");
        fs::write(&overrides, "server-port=25570\n").unwrap();
        fs::write(&target, SAMPLE).unwrap();

        assert!(apply_overrides(&overrides, &target).unwrap());
        let props = Properties::load(&target).unwrap();
        assert_eq!(props.get("server-port"), Some("25570"));
        assert_eq!(props.get("motd"), Some("A Minecraft Server"));
    }

    #[test]
    fn test_apply_overrides_missing_files() {
        let temp = TempDir::new().unwrap();
        let overrides = temp.path().join("overwrite.properties");
        let target = temp.path().join("server.properties");

        assert!(!apply_overrides(&overrides, &target).unwrap());
        assert!(!target.exists());

        fs::write(&overrides, "motd=Fresh\n").unwrap();
        assert!(apply_overrides(&overrides, &target).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), "motd=Fresh\n");
    }
}
