//! # slot-core
//!
//! Mounting of server slots for slotmount.
//!
//! A manager owns one active slot and swaps it for another in two phases:
//! a request stages the swap (and locks the target), a confirm runs it
//! while the host server is stopped. Resets of the active slot go through
//! the same protocol. All of it is serialized by one [`OperationGate`].
//!
//! ```text
//! request_mount(B) -> REQUEST_MOUNT --confirm--> MOUNT --(restart)--> IDLE
//!                               \----abort----> IDLE
//! ```

pub mod detect;
pub mod error;
pub mod gate;
pub mod host;
pub mod listing;
pub mod manager;
pub mod properties;
pub mod reset;
pub mod restart;
pub mod slot;
pub mod worker;

pub use detect::Detection;
pub use error::{InvalidTarget, MountError, PendingAction, ResetPrecondition, Result};
pub use gate::{Operation, OperationGate};
pub use host::{Host, LaunchPatch};
pub use listing::{ListPage, SlotEntry, SlotState};
pub use manager::{ManagerOptions, ManagerStatus, MountManager, PendingRequest};
pub use reset::{ResetError, ResetExecutor};
pub use restart::{RestartPolicy, RestartReason};
pub use slot::Slot;
pub use worker::{OperationHandle, Worker};
