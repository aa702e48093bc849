//! # Runtime Lifecycle
//!
//! Lazy, exactly-once startup and idempotent shutdown.
//!
//! ```text
//!  NotStarted ──start()──→ Starting ──success──→ Started ──stop()──→ Stopped
//!                            │  ↑
//!                            └──┘ failure: stays Starting, next trigger retries
//! ```
//!
//! ## Invariants
//!
//! - Module initialization and bookkeeping cleanup run once per successful
//!   start, no matter how many threads race to trigger it.
//! - A thread that triggers startup while another thread is starting blocks
//!   until that attempt finishes. The starting thread itself never blocks on
//!   its own attempt.
//! - `Stopped` is terminal.
//! - `stop` returns, and modules are shut down, only after every dispatch
//!   that began before the stop has finished. Dispatches cannot begin once
//!   the runtime is stopped.
//! - State only changes through `transition`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use runtime_telemetry::STARTUP_ATTEMPTS;
use tracing::{debug, error, info, warn};

use crate::domain::errors::RuntimeError;

/// Lifecycle state of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RuntimeState {
    NotStarted = 0,
    Starting = 1,
    Started = 2,
    Stopped = 3,
}

impl RuntimeState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Starting,
            2 => Self::Started,
            _ => Self::Stopped,
        }
    }

    /// Whether `self → to` is a legal transition.
    pub fn can_transition_to(self, to: RuntimeState) -> bool {
        matches!(
            (self, to),
            (Self::NotStarted, Self::Starting)
                | (Self::Starting, Self::Started)
                | (Self::Started, Self::Stopped)
        )
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Work the lifecycle delegates to its owner.
pub trait LifecycleHooks {
    /// Initialize every registered module; returns the keys now in use.
    fn initialize_modules(&self) -> Result<BTreeSet<String>, RuntimeError>;

    /// Drop bookkeeping of modules not in `used`.
    fn perform_cleanup(&self, used: &BTreeSet<String>) -> Result<(), RuntimeError>;

    /// Shut every module down, best-effort.
    fn shutdown_modules(&self) -> Result<(), RuntimeError>;
}

struct LifecycleInner {
    state: RuntimeState,
    /// Thread running the current start attempt.
    starter: Option<ThreadId>,
    failed_attempts: u64,
    last_failure: Option<String>,
    /// Threads currently dispatching a transaction, one entry per dispatch.
    dispatching: Vec<ThreadId>,
}

impl LifecycleInner {
    fn dispatching_elsewhere(&self, current: ThreadId) -> usize {
        self.dispatching.iter().filter(|t| **t != current).count()
    }
}

/// Owns the lifecycle state of one runtime.
pub struct RuntimeLifecycle {
    name: String,
    inner: Mutex<LifecycleInner>,
    changed: Condvar,
    /// Lock-free mirror of `inner.state` for the per-transaction fast path.
    state: AtomicU8,
}

impl RuntimeLifecycle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(LifecycleInner {
                state: RuntimeState::NotStarted,
                starter: None,
                failed_attempts: 0,
                last_failure: None,
                dispatching: Vec::new(),
            }),
            changed: Condvar::new(),
            state: AtomicU8::new(RuntimeState::NotStarted as u8),
        }
    }

    /// Current state.
    pub fn state(&self) -> RuntimeState {
        RuntimeState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_started(&self) -> bool {
        self.state() == RuntimeState::Started
    }

    /// Number of start attempts that failed so far.
    pub fn failed_attempts(&self) -> u64 {
        self.inner.lock().failed_attempts
    }

    /// Start the runtime if it is not started yet.
    ///
    /// Returns immediately when already started, or when called re-entrantly
    /// from the thread that is running the start attempt.
    pub fn start<H: LifecycleHooks + ?Sized>(&self, hooks: &H) -> Result<(), RuntimeError> {
        let current = thread::current().id();
        let mut inner = self.inner.lock();

        loop {
            match (inner.state, inner.starter) {
                (RuntimeState::Started, _) => return Ok(()),
                (RuntimeState::Stopped, _) => return Err(RuntimeError::Stopped),
                (RuntimeState::Starting, Some(starter)) if starter == current => {
                    debug!("[Lifecycle] {} re-entrant start ignored", self.name);
                    return Ok(());
                }
                (RuntimeState::Starting, Some(_)) => {
                    let seen_failures = inner.failed_attempts;
                    debug!("[Lifecycle] {} waiting for startup on another thread", self.name);
                    while inner.state == RuntimeState::Starting && inner.starter.is_some() {
                        self.changed.wait(&mut inner);
                    }
                    if inner.failed_attempts != seen_failures {
                        let reason = inner
                            .last_failure
                            .clone()
                            .unwrap_or_else(|| "unknown failure".to_string());
                        return Err(RuntimeError::StartupAborted(reason));
                    }
                }
                (RuntimeState::NotStarted, _) | (RuntimeState::Starting, None) => break,
            }
        }

        if inner.state == RuntimeState::NotStarted {
            self.transition(&mut inner, RuntimeState::Starting);
        } else {
            info!(
                "[Lifecycle] {} retrying startup after {} failed attempt(s)",
                self.name, inner.failed_attempts
            );
        }
        inner.starter = Some(current);
        drop(inner);

        info!("[Lifecycle] {} starting", self.name);
        let attempt = StartAttempt {
            lifecycle: self,
            finished: false,
        };
        let result = hooks
            .initialize_modules()
            .and_then(|used| hooks.perform_cleanup(&used));
        attempt.finish(result)
    }

    /// Make sure the runtime is started, starting it on demand.
    ///
    /// Returns `Ok(true)` when the runtime is started and transactions should
    /// be dispatched, `Ok(false)` when it is stopped or when called
    /// re-entrantly during startup.
    pub fn make_sure_is_started<H: LifecycleHooks + ?Sized>(
        &self,
        hooks: &H,
    ) -> Result<bool, RuntimeError> {
        match self.state() {
            RuntimeState::Started => return Ok(true),
            RuntimeState::Stopped => return Ok(false),
            RuntimeState::NotStarted | RuntimeState::Starting => {}
        }

        match self.start(hooks) {
            Ok(()) => Ok(self.is_started()),
            Err(RuntimeError::Stopped) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Register a dispatch of one transaction to the modules.
    ///
    /// Returns `None` unless the runtime is started. While the guard is
    /// alive, `stop` will not shut modules down.
    pub fn begin_dispatch(&self) -> Option<DispatchGuard<'_>> {
        let mut inner = self.inner.lock();
        if inner.state != RuntimeState::Started {
            return None;
        }
        inner.dispatching.push(thread::current().id());
        Some(DispatchGuard { lifecycle: self })
    }

    /// Number of dispatches currently in progress.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().dispatching.len()
    }

    /// Stop the runtime. No-op unless started.
    ///
    /// New transactions stop being dispatched immediately; modules are shut
    /// down once the dispatches already running have drained. A dispatch on
    /// the calling thread (a module stopping its own runtime) is not waited
    /// for.
    pub fn stop<H: LifecycleHooks + ?Sized>(&self, hooks: &H) -> Result<(), RuntimeError> {
        let current = thread::current().id();
        {
            let mut inner = self.inner.lock();
            if inner.state != RuntimeState::Started {
                debug!("[Lifecycle] {} stop ignored in state {}", self.name, inner.state);
                return Ok(());
            }
            self.transition(&mut inner, RuntimeState::Stopped);
            self.changed.notify_all();

            let pending = inner.dispatching_elsewhere(current);
            if pending > 0 {
                info!(
                    "[Lifecycle] {} waiting for {} in-flight transaction(s)",
                    self.name, pending
                );
                while inner.dispatching_elsewhere(current) > 0 {
                    self.changed.wait(&mut inner);
                }
            }
        }

        info!("[Lifecycle] {} stopping modules", self.name);
        let result = hooks.shutdown_modules();
        match &result {
            Ok(()) => info!("[Lifecycle] {} stopped", self.name),
            Err(e) => warn!("[Lifecycle] {} stopped with errors: {}", self.name, e),
        }
        result
    }

    /// Block until the runtime is started or stopped, or until `timeout`.
    ///
    /// Returns whether the runtime is started.
    pub fn wait_until_started(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while !matches!(inner.state, RuntimeState::Started | RuntimeState::Stopped) {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        inner.state == RuntimeState::Started
    }

    fn transition(&self, inner: &mut LifecycleInner, to: RuntimeState) {
        let from = inner.state;
        if !from.can_transition_to(to) {
            error!("[Lifecycle] {} illegal transition {} -> {}", self.name, from, to);
            return;
        }
        inner.state = to;
        self.state.store(to as u8, Ordering::Release);
        debug!("[Lifecycle] {} {} -> {}", self.name, from, to);
    }

    fn record_failure(&self, inner: &mut LifecycleInner, reason: String) {
        inner.failed_attempts += 1;
        inner.last_failure = Some(reason);
        inner.starter = None;
    }
}

impl fmt::Debug for RuntimeLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeLifecycle")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Marks one transaction as being dispatched until dropped.
pub struct DispatchGuard<'a> {
    lifecycle: &'a RuntimeLifecycle,
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let current = thread::current().id();
        let mut inner = self.lifecycle.inner.lock();
        if let Some(pos) = inner.dispatching.iter().rposition(|t| *t == current) {
            inner.dispatching.swap_remove(pos);
        }
        if inner.state == RuntimeState::Stopped {
            self.lifecycle.changed.notify_all();
        }
    }
}

impl fmt::Debug for DispatchGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchGuard")
            .field("runtime", &self.lifecycle.name)
            .finish()
    }
}

/// Releases the starter slot however the attempt ends, including by panic.
struct StartAttempt<'a> {
    lifecycle: &'a RuntimeLifecycle,
    finished: bool,
}

impl StartAttempt<'_> {
    fn finish(mut self, result: Result<(), RuntimeError>) -> Result<(), RuntimeError> {
        let lifecycle = self.lifecycle;
        {
            let mut inner = lifecycle.inner.lock();
            match &result {
                Ok(()) => {
                    inner.starter = None;
                    lifecycle.transition(&mut inner, RuntimeState::Started);
                    STARTUP_ATTEMPTS.with_label_values(&["success"]).inc();
                    info!("[Lifecycle] {} started", lifecycle.name);
                }
                Err(e) => {
                    lifecycle.record_failure(&mut inner, e.to_string());
                    STARTUP_ATTEMPTS.with_label_values(&["failure"]).inc();
                    error!("[Lifecycle] {} failed to start: {}", lifecycle.name, e);
                }
            }
        }
        self.finished = true;
        lifecycle.changed.notify_all();
        result
    }
}

impl Drop for StartAttempt<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let lifecycle = self.lifecycle;
        lifecycle.record_failure(
            &mut lifecycle.inner.lock(),
            "startup panicked".to_string(),
        );
        STARTUP_ATTEMPTS.with_label_values(&["panic"]).inc();
        error!("[Lifecycle] {} startup panicked", lifecycle.name);
        lifecycle.changed.notify_all();
    }
}
