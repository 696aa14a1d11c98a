//! Paged view over the known slots.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use slot_config::SlotConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    /// The active slot of this manager
    Current,
    Free,
    OccupiedBy(String),
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Current => write!(f, "current"),
            SlotState::Free => write!(f, "free"),
            SlotState::OccupiedBy(holder) => write!(f, "occupied by {holder}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotEntry {
    pub name: String,
    pub path: PathBuf,
    pub desc: String,
    pub checked: bool,
    pub state: SlotState,
}

impl SlotEntry {
    pub fn new(path: &Path, config: &SlotConfig, current: &Path) -> Self {
        let state = if path == current {
            SlotState::Current
        } else if config.occupied_by.is_empty() {
            SlotState::Free
        } else {
            SlotState::OccupiedBy(config.occupied_by.clone())
        };
        Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            path: path.to_path_buf(),
            desc: config.desc.clone(),
            checked: config.checked,
            state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    /// 1-based
    pub page: usize,
    pub max_page: usize,
    pub entries: Vec<SlotEntry>,
}

/// Resolve the requested page against `total` items.
///
/// Returns the page actually shown, the page count and the item range.
/// An out-of-range page falls back to the first one; an empty list still
/// has one (empty) page.
pub fn paginate(total: usize, page: usize, size: usize) -> (usize, usize, Range<usize>) {
    let size = size.max(1);
    let max_page = total.div_ceil(size).max(1);
    let page = if (1..=max_page).contains(&page) { page } else { 1 };
    let start = (page - 1) * size;
    let end = (start + size).min(total);
    (page, max_page, start.min(total)..end)
}
