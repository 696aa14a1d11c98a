use std::fmt;
use std::path::PathBuf;

use slot_config::ConfigError;
use slot_lock::LockError;
use thiserror::Error;

use crate::gate::Operation;
use crate::reset::ResetError;

/// Why a mount target was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidTarget {
    /// The target is the active slot
    AlreadyMounted,
    /// Not listed in `available_servers`
    UnknownPath,
    NotADirectory,
    /// The slot had no config; a default one was written, request again
    ConfigInitialized,
    /// No operator marked the slot as checked
    Unchecked,
}

impl fmt::Display for InvalidTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InvalidTarget::AlreadyMounted => "slot is already mounted",
            InvalidTarget::UnknownPath => "slot is not in available_servers",
            InvalidTarget::NotADirectory => "slot path is not a directory",
            InvalidTarget::ConfigInitialized => {
                "slot had no config, a default one was written; check it and request again"
            }
            InvalidTarget::Unchecked => "slot config has not been checked",
        };
        f.write_str(text)
    }
}

/// Why the active slot cannot be reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetPrecondition {
    /// `reset_path` is empty or the snapshot directory is missing
    NoSnapshot,
    /// `reset_type` is neither `full` nor `region`
    InvalidType(String),
}

impl fmt::Display for ResetPrecondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetPrecondition::NoSnapshot => write!(f, "no reset snapshot configured or present"),
            ResetPrecondition::InvalidType(t) => write!(f, "invalid reset type '{t}'"),
        }
    }
}

/// What a caller tried to act on while nothing was pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    Confirm,
    Abort,
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PendingAction::Confirm => write!(f, "confirm"),
            PendingAction::Abort => write!(f, "abort"),
        }
    }
}

#[derive(Error, Debug)]
pub enum MountError {
    /// The gate refused the transition; nothing changed
    #[error("operation conflict, current operation: {current}")]
    Conflict { current: Operation },

    /// The target slot is held by someone else
    #[error("slot {} is occupied", .path.display())]
    Occupied {
        path: PathBuf,
        holder: Option<String>,
    },

    #[error("cannot mount {}: {reason}", .path.display())]
    InvalidTarget { path: PathBuf, reason: InvalidTarget },

    #[error("cannot reset: {0}")]
    PreconditionFailed(ResetPrecondition),

    #[error("nothing to {0}")]
    NothingPending(PendingAction),

    /// The active slot is held by another manager at startup
    #[error("active slot {} is occupied by another manager", .path.display())]
    ActiveSlotOccupied {
        path: PathBuf,
        holder: Option<String>,
    },

    #[error("current_server is not set in the pool config")]
    NoActiveSlot,

    /// Pool keys naming this manager's slot ownership stay fixed while it runs
    #[error("{0} cannot be changed while the manager is running")]
    OwnershipKey(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("lock error: {0}")]
    Lock(LockError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reset failed: {0}")]
    Reset(#[from] ResetError),

    #[error(transparent)]
    Host(#[from] anyhow::Error),

    #[error("background operation failed: {0}")]
    Worker(String),
}

impl From<LockError> for MountError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Busy { path, holder } => MountError::Occupied { path, holder },
            LockError::Config(e) => MountError::Config(e),
            other => MountError::Lock(other),
        }
    }
}

impl MountError {
    /// Stable key of the message shown to the caller
    pub fn message_key(&self) -> &'static str {
        match self {
            MountError::Conflict { .. } => "error.operation_conflict",
            MountError::Occupied { .. } => "error.occupied",
            MountError::InvalidTarget { reason, .. } => match reason {
                InvalidTarget::AlreadyMounted => "error.is_current_mount",
                InvalidTarget::UnknownPath => "error.unknown_mount_path",
                InvalidTarget::NotADirectory => "error.invalid_mount_path",
                InvalidTarget::ConfigInitialized => "error.init_mountable_config",
                InvalidTarget::Unchecked => "error.unchecked_path",
            },
            MountError::PreconditionFailed(ResetPrecondition::NoSnapshot) => {
                "error.reset.invalid_path"
            }
            MountError::PreconditionFailed(ResetPrecondition::InvalidType(_)) => {
                "error.reset.invalid_type"
            }
            MountError::NothingPending(PendingAction::Confirm) => "error.nothing_to_confirm",
            MountError::NothingPending(PendingAction::Abort) => "error.nothing_to_abort",
            MountError::ActiveSlotOccupied { .. } => "error.current_occupied",
            MountError::NoActiveSlot => "error.no_current_server",
            MountError::OwnershipKey(_) => "error.config.ownership_key",
            MountError::Config(_) => "error.config",
            MountError::Lock(_) | MountError::Io(_) => "error.io",
            MountError::Reset(_) => "error.reset.failed",
            MountError::Host(_) => "error.host",
            MountError::Worker(_) => "error.worker",
        }
    }
}

pub type Result<T> = std::result::Result<T, MountError>;
