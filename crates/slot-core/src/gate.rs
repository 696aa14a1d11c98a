//! Single-flight gate over the long-running operations of a manager.
//!
//! Allowed flows:
//! - `IDLE -> REQUEST_RESET -> RESET | IDLE`
//! - `IDLE -> REQUEST_MOUNT -> MOUNT | IDLE`
//!
//! `RESET` and `MOUNT` only leave through [`OperationGate::force_idle`], which
//! the restart wrapper calls once the operation body has run.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use slot_config::log_manager_debug;

use crate::error::{MountError, PendingAction, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    #[default]
    Idle,
    RequestReset,
    RequestMount,
    Reset,
    Mount,
}

impl Operation {
    pub fn label(self) -> &'static str {
        match self {
            Operation::Idle => "idle",
            Operation::RequestReset => "request reset",
            Operation::RequestMount => "request mount",
            Operation::Reset => "reset",
            Operation::Mount => "mount",
        }
    }

    pub fn is_request(self) -> bool {
        matches!(self, Operation::RequestReset | Operation::RequestMount)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Transition table of the gate
pub fn transition_allowed(current: Operation, requested: Operation) -> bool {
    matches!(
        (current, requested),
        (Operation::Idle, _)
            | (Operation::RequestReset, Operation::Reset)
            | (Operation::RequestMount, Operation::Mount)
            | (
                Operation::RequestReset | Operation::RequestMount,
                Operation::Idle
            )
    )
}

/// The operation state of one manager, behind one mutex
#[derive(Debug, Default)]
pub struct OperationGate {
    current: Mutex<Operation>,
}

impl OperationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Operation {
        *self.lock()
    }

    /// Evaluate a transition to `requested`.
    ///
    /// On success the gate stays locked until the returned guard is
    /// committed or dropped, so preconditions can be checked without another
    /// caller slipping in. Dropping the guard leaves the state unchanged.
    pub fn enter(&self, requested: Operation) -> Result<GateGuard<'_>> {
        let state = self.lock();
        let current = *state;
        let allowed = transition_allowed(current, requested);
        log_manager_debug!(
            "Evaluating operation",
            requested = requested.label(),
            current = current.label(),
            allowed = allowed,
        );
        if !allowed {
            return Err(MountError::Conflict { current });
        }
        Ok(GateGuard {
            state,
            previous: current,
            requested,
        })
    }

    /// Evaluate and commit in one step; returns the previous operation
    pub fn try_enter(&self, requested: Operation) -> Result<Operation> {
        Ok(self.enter(requested)?.commit())
    }

    /// Move a pending request into its running state.
    ///
    /// `REQUEST_RESET` becomes `RESET` and `REQUEST_MOUNT` becomes `MOUNT`;
    /// with nothing pending the caller gets `NothingPending`, while an
    /// operation that is already running is a conflict.
    pub fn enter_confirm(&self) -> Result<GateGuard<'_>> {
        let state = self.lock();
        let current = *state;
        let requested = match current {
            Operation::RequestReset => Operation::Reset,
            Operation::RequestMount => Operation::Mount,
            Operation::Idle => return Err(MountError::NothingPending(PendingAction::Confirm)),
            Operation::Reset | Operation::Mount => return Err(MountError::Conflict { current }),
        };
        log_manager_debug!(
            "Confirming operation",
            requested = requested.label(),
            current = current.label(),
        );
        Ok(GateGuard {
            state,
            previous: current,
            requested,
        })
    }

    /// Unconditionally return to `IDLE`
    pub fn force_idle(&self) {
        let mut state = self.lock();
        log_manager_debug!("Gate back to idle", previous = state.label());
        *state = Operation::Idle;
    }

    fn lock(&self) -> MutexGuard<'_, Operation> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An accepted, not yet committed transition. Holds the gate mutex.
pub struct GateGuard<'a> {
    state: MutexGuard<'a, Operation>,
    previous: Operation,
    requested: Operation,
}

impl GateGuard<'_> {
    /// State the gate was in when the guard was taken
    pub fn previous(&self) -> Operation {
        self.previous
    }

    pub fn requested(&self) -> Operation {
        self.requested
    }

    /// Store the requested state and release the gate
    pub fn commit(mut self) -> Operation {
        *self.state = self.requested;
        self.previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Operation; 5] = [
        Operation::Idle,
        Operation::RequestReset,
        Operation::RequestMount,
        Operation::Reset,
        Operation::Mount,
    ];

    fn gate_at(op: Operation) -> OperationGate {
        let gate = OperationGate::new();
        *gate.current.lock().unwrap() = op;
        gate
    }

    #[test]
    fn test_transition_table() {
        for current in ALL {
            for requested in ALL {
                let expected = match (current, requested) {
                    (Operation::Idle, _) => true,
                    (Operation::RequestReset, Operation::Reset) => true,
                    (Operation::RequestMount, Operation::Mount) => true,
                    (Operation::RequestReset, Operation::Idle) => true,
                    (Operation::RequestMount, Operation::Idle) => true,
                    _ => false,
                };
                assert_eq!(
                    transition_allowed(current, requested),
                    expected,
                    "{current} -> {requested}"
                );
            }
        }
    }

    #[test]
    fn test_denied_transition_reports_current() {
        let gate = gate_at(Operation::RequestMount);
        match gate.try_enter(Operation::RequestReset) {
            Err(MountError::Conflict { current }) => {
                assert_eq!(current, Operation::RequestMount);
                assert_eq!(current.label(), "request mount");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(gate.current(), Operation::RequestMount);
    }

    #[test]
    fn test_dropped_guard_leaves_state() {
        let gate = OperationGate::new();
        {
            let guard = gate.enter(Operation::RequestMount).unwrap();
            assert_eq!(guard.previous(), Operation::Idle);
        }
        assert_eq!(gate.current(), Operation::Idle);

        gate.enter(Operation::RequestMount).unwrap().commit();
        assert_eq!(gate.current(), Operation::RequestMount);
    }

    #[test]
    fn test_enter_confirm() {
        assert!(matches!(
            OperationGate::new().enter_confirm(),
            Err(MountError::NothingPending(PendingAction::Confirm))
        ));

        let gate = gate_at(Operation::RequestReset);
        gate.enter_confirm().unwrap().commit();
        assert_eq!(gate.current(), Operation::Reset);

        let gate = gate_at(Operation::RequestMount);
        gate.enter_confirm().unwrap().commit();
        assert_eq!(gate.current(), Operation::Mount);

        assert!(matches!(
            gate.enter_confirm(),
            Err(MountError::Conflict {
                current: Operation::Mount
            })
        ));
    }

    #[test]
    fn test_running_operation_needs_force_idle() {
        let gate = gate_at(Operation::Reset);
        assert!(gate.try_enter(Operation::Idle).is_err());
        gate.force_idle();
        assert_eq!(gate.current(), Operation::Idle);
    }

    /// Every sequence of committed transitions keeps request states
    /// reachable only from idle.
    #[test]
    fn test_requests_only_entered_from_idle() {
        fn walk(gate_state: Operation, depth: usize) {
            if depth == 0 {
                return;
            }
            for requested in ALL {
                let gate = gate_at(gate_state);
                if let Ok(previous) = gate.try_enter(requested) {
                    let now = gate.current();
                    if now.is_request() && now != previous {
                        assert_eq!(previous, Operation::Idle);
                    }
                    walk(now, depth - 1);
                }
            }
            let gate = gate_at(gate_state);
            gate.force_idle();
            walk(Operation::Idle, depth - 1);
        }
        walk(Operation::Idle, 4);
    }

    #[test]
    fn test_concurrent_requests_single_winner() {
        let gate = OperationGate::new();
        let wins = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|i| {
                    let gate = &gate;
                    s.spawn(move || {
                        let op = if i % 2 == 0 {
                            Operation::RequestMount
                        } else {
                            Operation::RequestReset
                        };
                        gate.try_enter(op).is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count()
        });
        assert_eq!(wins, 1);
        assert!(gate.current().is_request());
    }
}
