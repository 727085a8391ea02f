//! Process-wide run state shared by the sequencing loop and stop requests.
//!
//! [`RunState`] is the single piece of data touched by both execution
//! contexts: the task driving a run and whatever handles a stop request.
//! Every read/set/clear goes through one mutex, and the guards handed out
//! here clear their field on `Drop` so no exit path can leak a stale
//! process handle or a stuck "run active" flag.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use super::process::ProcessHandle;

/// Shared single-flight state for the orchestrator.
#[derive(Debug)]
pub struct RunState {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    run_active: bool,
    /// Cancel flag for the current (or most recent) run.
    cancel: CancellationToken,
    /// The one process currently running under orchestrator control.
    active_process: Option<ProcessHandle>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                run_active: false,
                cancel: CancellationToken::new(),
                active_process: None,
            }),
        }
    }

    /// Never panics on poisoning: the state is plain data and stays valid.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new run, resetting the cancel flag and process slot.
    ///
    /// Returns `None` if another run is still active.
    pub fn begin_run(self: &Arc<Self>) -> Option<RunGuard> {
        let mut inner = self.lock();
        if inner.run_active {
            return None;
        }
        inner.run_active = true;
        inner.cancel = CancellationToken::new();
        inner.active_process = None;

        Some(RunGuard {
            state: Arc::clone(self),
            cancel: inner.cancel.clone(),
        })
    }

    pub fn is_run_active(&self) -> bool {
        self.lock().run_active
    }

    /// Whether a stop has been requested for the current run.
    pub fn cancel_requested(&self) -> bool {
        self.lock().cancel.is_cancelled()
    }

    /// Snapshot of the active process handle, if any.
    pub fn active_process(&self) -> Option<ProcessHandle> {
        self.lock().active_process.clone()
    }

    /// Raise the cancel flag and return the process that was active at
    /// that instant, so the caller can cancel it.
    ///
    /// The flag is raised under the lock, so a concurrent
    /// [`reserve_process`](Self::reserve_process) either sees it or has
    /// already installed a handle that this call returns.
    pub fn signal_stop(&self) -> Option<ProcessHandle> {
        let inner = self.lock();
        inner.cancel.cancel();
        inner.active_process.clone()
    }

    /// Claim the process slot for `handle` before anything is spawned.
    ///
    /// Refused if `run_cancel` has fired or another handle holds the slot.
    /// Both checks and the install happen under one lock acquisition.
    pub(crate) fn reserve_process(
        self: &Arc<Self>,
        handle: ProcessHandle,
        run_cancel: &CancellationToken,
    ) -> Result<ActiveSlot, SlotRefused> {
        let mut inner = self.lock();
        if run_cancel.is_cancelled() {
            return Err(SlotRefused::Cancelled);
        }
        if let Some(active) = &inner.active_process {
            return Err(SlotRefused::Occupied(active.clone()));
        }
        let id = handle.id();
        inner.active_process = Some(handle);

        Ok(ActiveSlot {
            state: Arc::clone(self),
            id,
        })
    }

    fn record_pid(&self, id: u64, pid: Option<u32>) {
        let mut inner = self.lock();
        if let Some(active) = inner.active_process.as_mut().filter(|h| h.id() == id) {
            active.set_pid(pid);
        }
    }

    fn clear_process(&self, id: u64) {
        let mut inner = self.lock();
        if inner.active_process.as_ref().map(ProcessHandle::id) == Some(id) {
            inner.active_process = None;
        }
    }

    fn end_run(&self) {
        let mut inner = self.lock();
        inner.run_active = false;
        inner.active_process = None;
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof that the holder owns the current run. Dropping it ends the run.
#[derive(Debug)]
pub struct RunGuard {
    state: Arc<RunState>,
    cancel: CancellationToken,
}

impl RunGuard {
    /// The cancel token for this run.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state.end_run();
    }
}

/// Why [`RunState::reserve_process`] turned a module away.
#[derive(Debug)]
pub(crate) enum SlotRefused {
    /// The run was stopped before the module could start.
    Cancelled,
    /// Another process still holds the slot.
    Occupied(ProcessHandle),
}

/// Occupancy of [`RunState`]'s process slot. Dropping it empties the slot.
#[derive(Debug)]
pub(crate) struct ActiveSlot {
    state: Arc<RunState>,
    id: u64,
}

impl ActiveSlot {
    /// Publish the spawned child's pid on the installed handle.
    pub(crate) fn record_pid(&self, pid: Option<u32>) {
        self.state.record_pid(self.id, pid);
    }
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        self.state.clear_process(self.id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
