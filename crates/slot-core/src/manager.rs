//! Slot selection, the request/confirm/abort protocol, and the swap itself.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use slot_config::{
    log_manager_debug, log_manager_error, log_manager_info, log_manager_warn, PoolConfig,
    ResetType, SlotConfig,
};
use slot_lock::LockRegistry;

use crate::detect::{self, Detection};
use crate::error::{InvalidTarget, MountError, PendingAction, ResetPrecondition, Result};
use crate::gate::{Operation, OperationGate};
use crate::host::{splice_plugin_dirs, Host, LaunchPatch};
use crate::listing::{paginate, ListPage, SlotEntry};
use crate::properties;
use crate::reset::ResetExecutor;
use crate::restart::{with_restart, RestartPolicy, RestartReason};
use crate::slot::Slot;
use crate::worker::{OperationHandle, Worker};

/// Pool keys tied to the slot markers this manager holds
const OWNERSHIP_KEYS: [&str; 2] = ["mount_name", "current_server"];

/// A request accepted and waiting for confirm or abort
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingRequest {
    Mount {
        path: PathBuf,
    },
    Reset {
        path: PathBuf,
        snapshot: PathBuf,
        reset_type: ResetType,
    },
}

/// Snapshot of the manager's state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerStatus {
    pub mount_name: String,
    pub operation: Operation,
    pub current: PathBuf,
    pub pending: Option<PathBuf>,
}

/// Knobs that tests and embedders may want to change
#[derive(Debug, Clone, Default)]
pub struct ManagerOptions {
    pub restart: RestartPolicy,
    pub reset: ResetExecutor,
}

struct State {
    pool: PoolConfig,
    current: Slot,
    pending: Option<Slot>,
}

struct Inner {
    config_path: PathBuf,
    gate: OperationGate,
    state: Mutex<State>,
    host: Arc<dyn Host>,
    locks: LockRegistry,
    worker: Worker,
    options: ManagerOptions,
}

/// The mount manager of one pool member. Cheap to clone.
#[derive(Clone)]
pub struct MountManager {
    inner: Arc<Inner>,
}

impl MountManager {
    pub fn new(config_path: impl Into<PathBuf>, host: Arc<dyn Host>, worker: Worker) -> Result<Self> {
        Self::with_options(config_path, host, worker, ManagerOptions::default())
    }

    /// Load the pool config and take the lock on the active slot.
    ///
    /// When the active slot is held by another manager the host is told to
    /// stop and to exit afterwards, and [`MountError::ActiveSlotOccupied`]
    /// is returned.
    pub fn with_options(
        config_path: impl Into<PathBuf>,
        host: Arc<dyn Host>,
        worker: Worker,
        options: ManagerOptions,
    ) -> Result<Self> {
        let config_path = config_path.into();
        let pool = PoolConfig::load(&config_path)?;
        if pool.current_server.as_os_str().is_empty() {
            return Err(MountError::NoActiveSlot);
        }

        let locks = LockRegistry::new();
        let mut current = Slot::open(&pool.current_server, &locks)?;
        match current.lock(&pool.mount_name) {
            Ok(()) => {}
            Err(MountError::Occupied { path, holder }) => {
                log_manager_error!(
                    "Active slot is occupied, stopping the server",
                    slot = tracing::field::display(path.display()),
                    holder = holder.as_deref().unwrap_or("<in transition>"),
                );
                host.set_exit_after_stop();
                if let Err(e) = host.stop() {
                    log_manager_warn!("Stop request failed", error = tracing::field::display(&e));
                }
                return Err(MountError::ActiveSlotOccupied { path, holder });
            }
            Err(e) => return Err(e),
        }

        log_manager_info!(
            "Mount manager ready",
            mount_name = pool.mount_name.as_str(),
            current = tracing::field::display(pool.current_server.display()),
            slots = pool.available_servers.len(),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config_path,
                gate: OperationGate::new(),
                state: Mutex::new(State {
                    pool,
                    current,
                    pending: None,
                }),
                host,
                locks,
                worker,
                options,
            }),
        })
    }

    pub fn current_operation(&self) -> Operation {
        self.inner.gate.current()
    }

    pub fn current_slot(&self) -> PathBuf {
        self.inner.state().current.path().to_path_buf()
    }

    pub fn pending_slot(&self) -> Option<PathBuf> {
        self.inner.state().pending.as_ref().map(|s| s.path().to_path_buf())
    }

    pub fn status(&self) -> ManagerStatus {
        let operation = self.inner.gate.current();
        let state = self.inner.state();
        ManagerStatus {
            mount_name: state.pool.mount_name.clone(),
            operation,
            current: state.current.path().to_path_buf(),
            pending: state.pending.as_ref().map(|s| s.path().to_path_buf()),
        }
    }

    /// Stage a swap to the slot at `path`.
    ///
    /// On success the slot is locked for this manager and waits for
    /// [`confirm`](Self::confirm) or [`abort`](Self::abort). Any failure
    /// leaves the gate and the pending slot as they were.
    pub fn request_mount(&self, path: &Path) -> Result<PendingRequest> {
        let guard = self.inner.gate.enter(Operation::RequestMount)?;
        let mut state = self.inner.state();
        let invalid = |reason| MountError::InvalidTarget {
            path: path.to_path_buf(),
            reason,
        };

        if path == state.current.path() {
            return Err(invalid(InvalidTarget::AlreadyMounted));
        }
        if !state.pool.available_servers.iter().any(|p| p == path) {
            return Err(invalid(InvalidTarget::UnknownPath));
        }
        if !path.is_dir() {
            return Err(invalid(InvalidTarget::NotADirectory));
        }
        if !SlotConfig::exists(path) {
            SlotConfig::default().save(path)?;
            log_manager_info!(
                "Wrote default slot config",
                slot = tracing::field::display(path.display()),
            );
            return Err(invalid(InvalidTarget::ConfigInitialized));
        }

        let mut next = Slot::open(path, &self.inner.locks)?;
        if !next.config().checked {
            return Err(invalid(InvalidTarget::Unchecked));
        }
        next.lock(&state.pool.mount_name)?;

        if let Some(stale) = state.pending.replace(next) {
            let owner = state.pool.mount_name.clone();
            self.inner.release_quietly(stale, &owner);
        }
        guard.commit();
        log_manager_info!("Mount requested", slot = tracing::field::display(path.display()));
        Ok(PendingRequest::Mount {
            path: path.to_path_buf(),
        })
    }

    /// Stage a reset of the active slot
    pub fn request_reset(&self) -> Result<PendingRequest> {
        let guard = self.inner.gate.enter(Operation::RequestReset)?;
        let mut state = self.inner.state();
        state.current.reload_config()?;
        let slot = &state.current;

        let snapshot = match slot.reset_dir() {
            Some(dir) if dir.is_dir() => dir,
            _ => return Err(MountError::PreconditionFailed(ResetPrecondition::NoSnapshot)),
        };
        let reset_type = slot.config().reset_type().ok_or_else(|| {
            MountError::PreconditionFailed(ResetPrecondition::InvalidType(
                slot.config().reset_type.clone(),
            ))
        })?;

        guard.commit();
        log_manager_info!(
            "Reset requested",
            slot = tracing::field::display(slot.path().display()),
            reset_type = tracing::field::display(reset_type),
        );
        Ok(PendingRequest::Reset {
            path: slot.path().to_path_buf(),
            snapshot,
            reset_type,
        })
    }

    /// Run the pending request in the background.
    ///
    /// The gate is already in the running state when this returns.
    pub fn confirm(&self) -> Result<OperationHandle> {
        let guard = self.inner.gate.enter_confirm()?;
        let operation = guard.requested();
        let target = self.inner.state().pending.as_ref().map(|s| s.path().to_path_buf());

        let reason = match (operation, target) {
            (Operation::Mount, Some(path)) => RestartReason::Mount(path),
            (Operation::Mount, None) => {
                return Err(MountError::NothingPending(PendingAction::Confirm))
            }
            _ => RestartReason::Reset,
        };
        guard.commit();
        log_manager_info!("Operation confirmed", reason = tracing::field::display(&reason));

        let inner = Arc::clone(&self.inner);
        Ok(self
            .inner
            .worker
            .run(operation, move || inner.run_restarted(reason)))
    }

    /// Request then confirm a mount in one step
    pub fn mount_now(&self, path: &Path) -> Result<OperationHandle> {
        self.request_mount(path)?;
        self.confirm()
    }

    /// Drop the pending request.
    ///
    /// The gate goes back to idle whenever the transition is allowed, also
    /// when nothing was pending. Returns the slot whose lock was released.
    pub fn abort(&self) -> Result<PathBuf> {
        let guard = self.inner.gate.enter(Operation::Idle)?;
        let mut state = self.inner.state();
        let pending = state.pending.take();
        let owner = state.pool.mount_name.clone();
        drop(state);
        guard.commit();

        match pending {
            Some(mut slot) => {
                slot.release(&owner)?;
                log_manager_info!(
                    "Pending mount aborted",
                    slot = tracing::field::display(slot.path().display()),
                );
                Ok(slot.path().to_path_buf())
            }
            None => Err(MountError::NothingPending(PendingAction::Abort)),
        }
    }

    /// One page of the known slots, `page` is 1-based
    pub fn list_slots(&self, page: usize) -> ListPage {
        let (servers, current, size) = {
            let state = self.inner.state();
            (
                state.pool.available_servers.clone(),
                state.current.path().to_path_buf(),
                state.pool.list_size,
            )
        };

        let (page, max_page, range) = paginate(servers.len(), page, size);
        let entries = servers[range]
            .iter()
            .map(|path| {
                let config = SlotConfig::load(path).unwrap_or_else(|e| {
                    log_manager_warn!(
                        "Unreadable slot config",
                        slot = tracing::field::display(path.display()),
                        error = tracing::field::display(&e),
                    );
                    SlotConfig::default()
                });
                SlotEntry::new(path, &config, &current)
            })
            .collect();

        ListPage {
            page,
            max_page,
            entries,
        }
    }

    pub fn get_pool_config_value(&self, key: &str) -> Result<String> {
        Ok(self.inner.state().pool.get_value(key)?)
    }

    /// Edit one pool config key and persist it; returns the stored value.
    ///
    /// `mount_name` and `current_server` describe slot ownership and are
    /// refused while the manager runs.
    pub fn set_pool_config_value(&self, key: &str, value: &str) -> Result<String> {
        if OWNERSHIP_KEYS.contains(&key) {
            return Err(MountError::OwnershipKey(key.to_string()));
        }
        let mut state = self.inner.state();
        let mut pool = state.pool.clone();
        let shown = pool.set_value(key, value)?;
        pool.save(&self.inner.config_path)?;
        state.pool = pool;
        log_manager_info!("Pool config edited", key = key, value = shown.as_str());
        Ok(shown)
    }

    pub fn get_slot_config(&self, path: &Path) -> Result<SlotConfig> {
        self.ensure_known(path)?;
        Ok(SlotConfig::load(path)?)
    }

    /// Edit one key of a slot's config, then re-read the active slot
    pub fn set_slot_config_value(&self, path: &Path, key: &str, value: &str) -> Result<String> {
        self.ensure_known(path)?;
        let mut slot = Slot::open(path, &self.inner.locks)?;
        let shown = slot.edit_config(key, value)?;
        self.inner.state().current.reload_config()?;
        Ok(shown)
    }

    /// Rescan the search paths and update the known slots
    pub fn reload(&self) -> Result<Detection> {
        let mut state = self.inner.state();
        let mut pool = PoolConfig::load(&self.inner.config_path)?;
        let (added, removed) = detect::detect_slots(&pool.servers_path, &pool.available_servers)?;

        let mut initialized = Vec::new();
        for slot in &added {
            if !SlotConfig::exists(slot) {
                detect::init_slot_config(slot)?;
                initialized.push(slot.clone());
            }
        }
        pool.available_servers.extend(added.iter().cloned());
        pool.available_servers.retain(|p| !removed.contains(p));
        pool.save(&self.inner.config_path)?;

        state.pool = pool;
        state.current.reload_config()?;
        log_manager_info!(
            "Slots reloaded",
            added = added.len(),
            removed = removed.len(),
            initialized = initialized.len(),
        );
        Ok(Detection {
            added,
            removed,
            initialized,
        })
    }

    /// Re-read the pool config and the active slot's config
    pub fn reload_state(&self) -> Result<()> {
        self.inner.reload_state()
    }

    /// Launch settings for the active slot given the host's plugin path
    pub fn launch_patch(&self) -> LaunchPatch {
        let state = self.inner.state();
        let dirs = splice_plugin_dirs(
            self.inner.host.plugin_directories(),
            None,
            state.current.plugin_dir().as_deref(),
        );
        state.current.launch_patch(dirs)
    }

    pub fn on_server_startup(&self) -> Result<()> {
        self.inner.state().current.on_mount()
    }

    /// Close the active slot's use period.
    ///
    /// Ignored while an operation runs: the operation accounts the stop
    /// itself, and the active slot may already be the incoming one.
    pub fn on_server_stop(&self) -> Result<()> {
        if self.inner.gate.current() != Operation::Idle {
            log_manager_debug!("Server stop left to the running operation");
            return Ok(());
        }
        self.inner.state().current.on_unmount()
    }

    /// Count the player and greet them if the pool asks for it
    pub fn on_player_joined(&self, player: &str) -> Result<()> {
        let greeting = {
            let mut state = self.inner.state();
            state.current.on_player_joined(player)?;
            state.pool.welcome_player.then(|| {
                let config = state.current.config();
                let place = if config.desc.is_empty() {
                    state.current.name()
                } else {
                    config.desc.clone()
                };
                format!("Welcome to {place}")
            })
        };
        if let Some(message) = greeting {
            self.inner.host.tell(player, &message)?;
        }
        Ok(())
    }

    pub fn on_player_left(&self, player: &str) -> Result<()> {
        self.inner.state().current.on_player_left(player)
    }

    fn ensure_known(&self, path: &Path) -> Result<()> {
        let known = self
            .inner
            .state()
            .pool
            .available_servers
            .iter()
            .any(|p| p == path);
        if known {
            Ok(())
        } else {
            Err(MountError::InvalidTarget {
                path: path.to_path_buf(),
                reason: InvalidTarget::UnknownPath,
            })
        }
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Body of every confirmed operation, runs on a worker thread
    fn run_restarted(&self, reason: RestartReason) -> Result<()> {
        let outcome = with_restart(
            self.host.as_ref(),
            &self.gate,
            &self.options.restart,
            &reason,
            || {
                self.close_current_period();
                match &reason {
                    RestartReason::Mount(_) => self.swap_slots(),
                    RestartReason::Reset => self.reset_current(),
                }
            },
        );

        // A mount that never reached the swap still holds its target
        let stale = {
            let mut state = self.state();
            let owner = state.pool.mount_name.clone();
            state.pending.take().map(|slot| (slot, owner))
        };
        if let Some((slot, owner)) = stale {
            self.release_quietly(slot, &owner);
        }

        if let Err(e) = self.reload_state() {
            log_manager_warn!("State reload failed", error = tracing::field::display(&e));
        }
        if let Err(e) = self.host.reload_self() {
            log_manager_warn!("Host reload failed", error = tracing::field::display(&e));
        }
        outcome
    }

    fn swap_slots(&self) -> Result<()> {
        let mut state = self.state();
        let mut next = state
            .pending
            .take()
            .ok_or(MountError::NothingPending(PendingAction::Confirm))?;
        let owner = state.pool.mount_name.clone();

        if let Err(e) = self.prepare_incoming(&state, &next) {
            drop(state);
            self.release_quietly(next, &owner);
            return Err(e);
        }

        if let Err(e) = state.current.release(&owner) {
            log_manager_error!(
                "Outgoing slot release failed",
                slot = tracing::field::display(state.current.path().display()),
                error = tracing::field::display(&e),
            );
        }
        // Not running yet; a leftover stamp must not be charged on a late stop
        if let Err(e) = next.clear_mount_stamp() {
            log_manager_warn!("Stats update failed", error = tracing::field::display(&e));
        }

        let incoming = next.path().to_path_buf();
        let previous = std::mem::replace(&mut state.current, next);
        state.pool.current_server = incoming.clone();
        state.pool.save(&self.config_path)?;
        log_manager_info!(
            "Slot swapped",
            from = tracing::field::display(previous.path().display()),
            to = tracing::field::display(incoming.display()),
        );
        Ok(())
    }

    /// Property overrides and launch settings for the incoming slot
    fn prepare_incoming(&self, state: &State, next: &Slot) -> Result<()> {
        if let Some(overrides) = state.pool.overwrite_file() {
            properties::apply_overrides(&overrides, &next.properties_path())?;
        }
        let dirs = splice_plugin_dirs(
            self.host.plugin_directories(),
            state.current.plugin_dir().as_deref(),
            next.plugin_dir().as_deref(),
        );
        self.host.apply_launch(next.launch_patch(dirs))?;
        Ok(())
    }

    /// Account the use period that ended with the stop
    fn close_current_period(&self) {
        if let Err(e) = self.state().current.on_unmount() {
            log_manager_warn!("Stats update failed", error = tracing::field::display(&e));
        }
    }

    fn release_quietly(&self, mut slot: Slot, owner: &str) {
        match slot.release(owner) {
            Ok(()) => log_manager_info!(
                "Released unmounted slot",
                slot = tracing::field::display(slot.path().display()),
            ),
            Err(e) => log_manager_error!(
                "Slot release failed",
                slot = tracing::field::display(slot.path().display()),
                error = tracing::field::display(&e),
            ),
        }
    }

    fn reset_current(&self) -> Result<()> {
        let (path, snapshot, reset_type) = {
            let state = self.state();
            let config = state.current.config();
            let reset_type = config.reset_type().ok_or_else(|| {
                MountError::PreconditionFailed(ResetPrecondition::InvalidType(
                    config.reset_type.clone(),
                ))
            })?;
            (
                state.current.path().to_path_buf(),
                PathBuf::from(&config.reset_path),
                reset_type,
            )
        };
        self.options.reset.reset(&path, &snapshot, reset_type)?;
        Ok(())
    }

    fn reload_state(&self) -> Result<()> {
        let pool = PoolConfig::load(&self.config_path)?;
        let mut state = self.state();
        state.pool = pool;
        state.current.reload_config()
    }
}
