//! Shared fixtures for slot-core integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use slot_config::testing::TestPool;
use slot_core::{Host, LaunchPatch, ManagerOptions, MountManager, RestartPolicy, Worker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    Stop,
    WaitForStop,
    Start,
    Broadcast(String),
    Tell(String, String),
    ReloadSelf,
    ApplyLaunch(LaunchPatch),
    ExitAfterStop,
}

/// Host method that can be made to fail once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failing {
    Stop,
    WaitForStop,
    Start,
}

/// Host that records every call and never runs anything
#[derive(Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
    /// Next call of this method returns an error
    fail_next: Mutex<Option<Failing>>,
    plugin_dirs: Mutex<Vec<PathBuf>>,
    running: AtomicBool,
    /// When set, `wait_for_stop` blocks until a message arrives
    stop_gate: Mutex<Option<mpsc::Receiver<()>>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_plugin_dirs(dirs: Vec<PathBuf>) -> Arc<Self> {
        let host = Self::default();
        *host.plugin_dirs.lock().unwrap() = dirs;
        Arc::new(host)
    }

    /// Host whose `wait_for_stop` blocks until the returned sender fires
    pub fn held_at_stop() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let host = Self::default();
        *host.stop_gate.lock().unwrap() = Some(rx);
        (Arc::new(host), tx)
    }

    /// Host whose next call of `method` fails
    pub fn failing(method: Failing) -> Arc<Self> {
        let host = Self::default();
        *host.fail_next.lock().unwrap() = Some(method);
        Arc::new(host)
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn current_plugin_dirs(&self) -> Vec<PathBuf> {
        self.plugin_dirs.lock().unwrap().clone()
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn fail_if(&self, method: Failing) -> anyhow::Result<()> {
        let mut next = self.fail_next.lock().unwrap();
        if *next == Some(method) {
            *next = None;
            anyhow::bail!("{method:?} failed");
        }
        Ok(())
    }
}

impl Host for RecordingHost {
    fn stop(&self) -> anyhow::Result<()> {
        self.record(HostCall::Stop);
        self.fail_if(Failing::Stop)?;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn wait_for_stop(&self) -> anyhow::Result<()> {
        self.record(HostCall::WaitForStop);
        self.fail_if(Failing::WaitForStop)?;
        let gate = self.stop_gate.lock().unwrap().take();
        if let Some(rx) = gate {
            rx.recv()?;
        }
        Ok(())
    }

    fn start(&self) -> anyhow::Result<()> {
        self.record(HostCall::Start);
        self.fail_if(Failing::Start)?;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn broadcast(&self, message: &str) -> anyhow::Result<()> {
        self.record(HostCall::Broadcast(message.to_string()));
        Ok(())
    }

    fn tell(&self, player: &str, message: &str) -> anyhow::Result<()> {
        self.record(HostCall::Tell(player.to_string(), message.to_string()));
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn reload_self(&self) -> anyhow::Result<()> {
        self.record(HostCall::ReloadSelf);
        Ok(())
    }

    fn plugin_directories(&self) -> Vec<PathBuf> {
        self.current_plugin_dirs()
    }

    fn apply_launch(&self, patch: LaunchPatch) -> anyhow::Result<()> {
        *self.plugin_dirs.lock().unwrap() = patch.plugin_directories.clone();
        self.record(HostCall::ApplyLaunch(patch));
        Ok(())
    }

    fn set_exit_after_stop(&self) {
        self.record(HostCall::ExitAfterStop);
    }
}

/// Pool with checked slots `A` and `B`, manager `alpha` on `A`
pub struct Fixture {
    pub pool: TestPool,
    pub a: PathBuf,
    pub b: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let pool = TestPool::new().unwrap();
        let a = pool.add_slot("A", true).unwrap();
        let b = pool.add_slot("B", true).unwrap();
        pool.write_pool_config("alpha", &[a.clone(), b.clone()], &a)
            .unwrap();
        Self { pool, a, b }
    }

    pub fn manager(&self, host: Arc<RecordingHost>) -> MountManager {
        self.try_manager(host).unwrap()
    }

    pub fn try_manager(&self, host: Arc<RecordingHost>) -> slot_core::Result<MountManager> {
        MountManager::with_options(
            &self.pool.config_path,
            host,
            Worker::try_current().unwrap(),
            ManagerOptions {
                restart: RestartPolicy::without_delay(),
                ..ManagerOptions::default()
            },
        )
    }
}
