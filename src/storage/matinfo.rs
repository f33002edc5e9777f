//! Materialization state tracking.
//!
//! One `MatTableInfo` exists per global table name. Its status is a single
//! value changed only through `MatStatus::apply`, always under the record's
//! mutex. Winning the move into `Loading` hands the caller a `LoadPermit`; the
//! permit is the only way to finish or fail that load, and dropping it
//! unfinished counts as a failure so a record can never stay stuck in `Loading`.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatState {
    NeedsLoading,
    Loading,
    Loaded,
    FailedLoad,
}

impl fmt::Display for MatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatState::NeedsLoading => "NEEDS_LOADING",
            MatState::Loading => "LOADING",
            MatState::Loaded => "LOADED",
            MatState::FailedLoad => "FAILED_LOAD",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatStatus {
    pub state: MatState,
    pub valid: bool,
    pub ttl: Option<Duration>,
    /// Time of the last state change.
    pub updated_at: Instant,
    /// Rows installed by the last successful load.
    pub row_count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    /// Read path: begin a load if one is due.
    TryBeginLoad,
    /// Explicit refresh: force NEEDS_LOADING and take the load unless one is running.
    RequestRefresh { invalidate: bool },
    Loaded { rows: usize },
    Failed,
    SetTtl(Option<Duration>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Caller now owns the load; `was_valid` is the validity when it started.
    Began { was_valid: bool },
    /// Nothing to do.
    Skipped,
    /// A first load is running elsewhere; wait for it.
    MustWait,
    AlreadyLoading,
    Applied,
}

impl MatStatus {
    pub fn new(now: Instant) -> Self {
        Self { state: MatState::NeedsLoading, valid: false, ttl: None, updated_at: now, row_count: None }
    }

    /// True once the age since the last state change exceeds the TTL.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.saturating_duration_since(self.updated_at) > ttl,
            None => false,
        }
    }

    fn set_state(&mut self, state: MatState, now: Instant) {
        self.state = state;
        self.updated_at = now;
    }

    pub(crate) fn apply(&mut self, t: Transition, now: Instant) -> Outcome {
        match t {
            Transition::TryBeginLoad => {
                let due = match self.state {
                    MatState::NeedsLoading => true,
                    MatState::Loaded => self.is_expired(now),
                    // nothing valid to serve: the next read retries
                    MatState::FailedLoad => !self.valid || self.is_expired(now),
                    MatState::Loading => return if self.valid { Outcome::Skipped } else { Outcome::MustWait },
                };
                if !due { return Outcome::Skipped; }
                let was_valid = self.valid;
                self.set_state(MatState::Loading, now);
                Outcome::Began { was_valid }
            }
            Transition::RequestRefresh { invalidate } => {
                if invalidate { self.valid = false; }
                if self.state == MatState::Loading { return Outcome::AlreadyLoading; }
                self.set_state(MatState::NeedsLoading, now);
                let was_valid = self.valid;
                self.set_state(MatState::Loading, now);
                Outcome::Began { was_valid }
            }
            Transition::Loaded { rows } => {
                self.valid = true;
                self.row_count = Some(rows);
                self.set_state(MatState::Loaded, now);
                Outcome::Applied
            }
            Transition::Failed => {
                self.set_state(MatState::FailedLoad, now);
                Outcome::Applied
            }
            Transition::SetTtl(ttl) => {
                self.ttl = ttl;
                Outcome::Applied
            }
        }
    }
}

pub struct MatTableInfo {
    name: String,
    status: Mutex<MatStatus>,
    changed: Condvar,
}

impl fmt::Debug for MatTableInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatTableInfo").field("name", &self.name).field("status", &*self.status.lock()).finish()
    }
}

impl MatTableInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), status: Mutex::new(MatStatus::new(Instant::now())), changed: Condvar::new() }
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn status(&self) -> MatStatus { *self.status.lock() }
    pub fn state(&self) -> MatState { self.status.lock().state }
    pub fn is_valid(&self) -> bool { self.status.lock().valid }

    fn transition(&self, t: Transition) -> Outcome {
        let mut st = self.status.lock();
        let before = st.state;
        let out = st.apply(t, Instant::now());
        if st.state != before {
            debug!(target: "clarium::matviews", "mat state '{}' {} -> {} valid={}", self.name, before, st.state, st.valid);
            self.changed.notify_all();
        }
        out
    }

    /// Read path gate. Returns a permit when the caller won the move into
    /// `Loading` and must perform the load. Blocks while another caller is
    /// performing a first load (nothing valid to serve yet).
    pub fn should_load(self: &Arc<Self>) -> Option<LoadPermit> {
        let mut st = self.status.lock();
        loop {
            let before = st.state;
            match st.apply(Transition::TryBeginLoad, Instant::now()) {
                Outcome::Began { was_valid } => {
                    debug!(target: "clarium::matviews", "mat state '{}' {} -> LOADING valid={}", self.name, before, st.valid);
                    self.changed.notify_all();
                    return Some(LoadPermit::new(self.clone(), was_valid));
                }
                Outcome::MustWait => self.changed.wait(&mut st),
                _ => return None,
            }
        }
    }

    /// Explicit refresh. `None` means a load is already running (the record is
    /// left in `Loading`).
    pub fn request_refresh(self: &Arc<Self>, invalidate: bool) -> Option<LoadPermit> {
        match self.transition(Transition::RequestRefresh { invalidate }) {
            Outcome::Began { was_valid } => Some(LoadPermit::new(self.clone(), was_valid)),
            _ => None,
        }
    }

    pub fn set_ttl(&self, ttl: Option<Duration>) {
        self.transition(Transition::SetTtl(ttl));
    }

    /// Block until the record leaves `Loading` or `timeout` elapses. Returns the state seen last.
    pub fn wait_while_loading(&self, timeout: Duration) -> MatState {
        let deadline = Instant::now() + timeout;
        let mut st = self.status.lock();
        while st.state == MatState::Loading {
            if self.changed.wait_until(&mut st, deadline).timed_out() { break; }
        }
        st.state
    }
}

/// Ownership of one in-flight load.
#[must_use = "a dropped permit marks the load as failed"]
pub struct LoadPermit {
    info: Arc<MatTableInfo>,
    was_valid: bool,
    done: bool,
}

impl fmt::Debug for LoadPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadPermit").field("table", &self.info.name).field("was_valid", &self.was_valid).finish()
    }
}

impl LoadPermit {
    fn new(info: Arc<MatTableInfo>, was_valid: bool) -> Self { Self { info, was_valid, done: false } }

    /// Whether readers had valid data to fall back on when the load began.
    pub fn was_valid(&self) -> bool { self.was_valid }

    pub fn info(&self) -> &Arc<MatTableInfo> { &self.info }

    /// LOADING -> LOADED, valid=true.
    pub fn complete(mut self, rows: usize) {
        self.done = true;
        self.info.transition(Transition::Loaded { rows });
    }

    /// LOADING -> FAILED_LOAD, validity unchanged.
    pub fn fail(mut self) {
        self.done = true;
        self.info.transition(Transition::Failed);
    }
}

impl Drop for LoadPermit {
    fn drop(&mut self) {
        if !self.done {
            warn!(target: "clarium::matviews", "load of '{}' abandoned; marking FAILED_LOAD", self.info.name);
            self.info.transition(Transition::Failed);
        }
    }
}
