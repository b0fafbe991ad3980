//! Registry of live pipeline runs.

mod context;
mod events;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

pub use context::{ProcessHandle, RunContext, RunParams, RunState, TriggerKind};
pub use events::RunEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl RunId {
    /// Never assigned to a live run.
    pub const NONE: RunId = RunId(0);

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for RunId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct RunRegistry {
    counter: Mutex<u64>,
    runs: Mutex<HashMap<RunId, Arc<RunContext>>>,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    fn starting_after(last: u64) -> Self {
        Self {
            counter: Mutex::new(last),
            runs: Mutex::new(HashMap::new()),
        }
    }

    fn allocate(&self) -> RunId {
        let mut counter = self.counter.lock().unwrap_or_else(|e| e.into_inner());
        *counter = counter.wrapping_add(1);
        if *counter == 0 {
            *counter = 1;
        }
        RunId(*counter)
    }

    /// Assigns the run its ID and makes it addressable.
    pub fn register(&self, run: &Arc<RunContext>) -> RunId {
        let id = self.allocate();
        run.set_id(id);
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, run.clone());
        id
    }

    pub fn lookup(&self, id: RunId) -> Option<Arc<RunContext>> {
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn deregister(&self, id: RunId) -> Option<Arc<RunContext>> {
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    pub fn live(&self) -> Vec<RunId> {
        let mut ids: Vec<RunId> = self
            .runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.runs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deregisters its run when dropped, including during unwinding.
pub struct RunGuard {
    runs: Arc<RunRegistry>,
    id: RunId,
}

impl RunGuard {
    pub fn new(runs: Arc<RunRegistry>, id: RunId) -> Self {
        Self { runs, id }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runs.deregister(self.id);
    }
}
