//! Console replies.

use std::fmt::Write;
use std::path::Path;

use console::style;
use slot_config::SlotConfig;
use slot_core::{
    Detection, ListPage, ManagerStatus, MountError, Operation, PendingRequest, SlotState,
};

pub fn error(err: &MountError) -> String {
    format!("{} {}", style(err).red(), style(format!("[{}]", err.message_key())).dim())
}

pub fn pending(request: &PendingRequest) -> String {
    let what = match request {
        PendingRequest::Mount { path } => format!("Mount {}", path.display()),
        PendingRequest::Reset {
            path, reset_type, ..
        } => format!("Reset ({reset_type}) of {}", path.display()),
    };
    format!(
        "{what} requested. Type {} to proceed or {} to cancel.",
        style("confirm").green().bold(),
        style("abort").yellow().bold()
    )
}

pub fn started(operation: Operation) -> String {
    format!(
        "{} started, the server restarts shortly",
        style(operation.label()).cyan()
    )
}

pub fn aborted(path: &Path) -> String {
    format!("Aborted, {} released", path.display())
}

pub fn key_value(key: &str, value: &str) -> String {
    format!("{} = {value}", style(key).bold())
}

pub fn list(page: &ListPage) -> String {
    let mut out = format!(
        "{} (page {}/{})\n",
        style("Slots").bold(),
        page.page,
        page.max_page
    );
    if page.entries.is_empty() {
        out.push_str("  (none)\n");
    }
    for entry in &page.entries {
        let state = match &entry.state {
            SlotState::Current => style(entry.state.to_string()).green(),
            SlotState::Free => style(entry.state.to_string()).dim(),
            SlotState::OccupiedBy(_) => style(entry.state.to_string()).yellow(),
        };
        let checked = if entry.checked { "" } else { " [unchecked]" };
        let _ = writeln!(
            out,
            "  {} [{state}]{checked} {}",
            style(&entry.name).bold(),
            entry.desc
        );
        let _ = writeln!(out, "    {}", style(entry.path.display()).dim());
    }
    out
}

pub fn slot_config(path: &Path, config: &SlotConfig) -> String {
    let body = toml::to_string_pretty(config).unwrap_or_else(|e| format!("<unprintable: {e}>"));
    format!("{}\n{body}", style(path.display()).bold())
}

pub fn status(status: &ManagerStatus) -> String {
    let mut out = format!(
        "{} {}\n  operation: {}\n  current: {}\n",
        style("Manager").bold(),
        status.mount_name,
        status.operation,
        status.current.display()
    );
    if let Some(pending) = &status.pending {
        let _ = writeln!(out, "  pending: {}", pending.display());
    }
    out
}

pub fn detection(detection: &Detection) -> String {
    if detection.added.is_empty() && detection.removed.is_empty() {
        return "No new slots found".to_string();
    }
    let mut out = format!(
        "{} new slot(s), {} removed\n",
        detection.added.len(),
        detection.removed.len()
    );
    for path in &detection.added {
        let note = if detection.initialized.contains(path) {
            " (config generated, check it before mounting)"
        } else {
            ""
        };
        let _ = writeln!(out, "  + {}{note}", path.display());
    }
    for path in &detection.removed {
        let _ = writeln!(out, "  - {}", path.display());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use console::strip_ansi_codes;
    use slot_core::SlotEntry;
    use std::path::PathBuf;

    fn plain(text: String) -> String {
        strip_ansi_codes(&text).into_owned()
    }

    #[test]
    fn test_error_carries_message_key() {
        let text = plain(error(&MountError::Conflict {
            current: Operation::RequestMount,
        }));
        assert_eq!(
            text,
            "operation conflict, current operation: request mount [error.operation_conflict]"
        );
    }

    #[test]
    fn test_list_rendering() {
        let page = ListPage {
            page: 1,
            max_page: 2,
            entries: vec![
                SlotEntry {
                    name: "A".into(),
                    path: PathBuf::from("/srv/A"),
                    desc: "survival".into(),
                    checked: true,
                    state: SlotState::Current,
                },
                SlotEntry {
                    name: "B".into(),
                    path: PathBuf::from("/srv/B"),
                    desc: "creative".into(),
                    checked: false,
                    state: SlotState::OccupiedBy("beta".into()),
                },
            ],
        };
        let text = plain(list(&page));
        assert!(text.starts_with("Slots (page 1/2)\n"));
        assert!(text.contains("  A [current] survival\n"));
        assert!(text.contains("  B [occupied by beta] [unchecked] creative\n"));
    }

    #[test]
    fn test_pending_prompt() {
        let text = plain(pending(&PendingRequest::Mount {
            path: PathBuf::from("/srv/B"),
        }));
        assert_eq!(
            text,
            "Mount /srv/B requested. Type confirm to proceed or abort to cancel."
        );
    }

    #[test]
    fn test_detection_summary() {
        assert_eq!(detection(&Detection::default()), "No new slots found");

        let text = detection(&Detection {
            added: vec![PathBuf::from("/srv/C")],
            removed: vec![],
            initialized: vec![PathBuf::from("/srv/C")],
        });
        assert!(text.contains("+ /srv/C (config generated"));
    }
}
