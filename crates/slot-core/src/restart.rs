//! Countdown, stop, run, start: the envelope around every confirmed operation.

use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use slot_config::{log_host_info, log_host_warn, log_manager_error};

use crate::error::Result;
use crate::gate::OperationGate;
use crate::host::Host;

/// Countdown announced before the host is stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub ticks: u32,
    pub tick: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            ticks: 10,
            tick: Duration::from_secs(1),
        }
    }
}

impl RestartPolicy {
    /// Same announcements, no waiting between them
    pub fn without_delay() -> Self {
        Self {
            tick: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartReason {
    Mount(PathBuf),
    Reset,
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartReason::Mount(path) => write!(f, "mounting {}", path.display()),
            RestartReason::Reset => write!(f, "resetting the current slot"),
        }
    }
}

/// Returns the gate to idle however the wrapped body ends
struct IdleOnExit<'a>(&'a OperationGate);

impl Drop for IdleOnExit<'_> {
    fn drop(&mut self) {
        self.0.force_idle();
    }
}

/// Run `body` while the host is down.
///
/// The countdown is broadcast first, then the host is stopped and awaited.
/// `body` is skipped when the host cannot be stopped or awaited. Once the
/// stop went through the host is started again even if waiting or `body`
/// fails, and the gate is back at idle when this returns, panics included.
/// The first error wins over a failed start.
pub fn with_restart<F>(
    host: &dyn Host,
    gate: &OperationGate,
    policy: &RestartPolicy,
    reason: &RestartReason,
    body: F,
) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    let _idle = IdleOnExit(gate);

    for remaining in (1..=policy.ticks).rev() {
        let message = format!("Server restarts in {remaining}s: {reason}");
        if let Err(e) = host.broadcast(&message) {
            log_host_warn!("Broadcast failed", error = tracing::field::display(&e));
        }
        thread::sleep(policy.tick);
    }

    log_host_info!("Stopping server", reason = tracing::field::display(reason));
    host.stop()?;

    // Once stopped, the server is started again whatever happens next
    let outcome = match host.wait_for_stop() {
        Ok(()) => body(),
        Err(e) => Err(e.into()),
    };
    if let Err(e) = &outcome {
        log_manager_error!(
            "Operation failed while the server was down",
            reason = tracing::field::display(reason),
            error = tracing::field::display(e),
        );
    }

    log_host_info!("Starting server");
    let started = host.start();
    outcome?;
    started?;
    Ok(())
}
