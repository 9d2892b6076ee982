// Single-flight gate: at most one gated command awaits the link at a time

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

/// Busy flag plus the heading of the last admitted roll
#[derive(Debug, Default)]
pub struct CommandGate {
    busy: AtomicBool,
    last_heading: AtomicU16,
}

impl CommandGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the gate busy. Returns false, changing nothing, if it already was.
    pub fn try_enter(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Mark the gate free. Pair with every successful `try_enter`.
    pub fn leave(&self) {
        self.busy.store(false, Ordering::Release);
    }

    /// Enter the gate and get a permit that leaves it on drop.
    /// The permit owns a handle to the gate, so it can move to another task.
    pub fn try_acquire(self: &Arc<Self>) -> Option<GatePermit> {
        self.try_enter().then(|| GatePermit {
            gate: Arc::clone(self),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Heading replayed by stop, 0 until a roll is admitted
    pub fn last_heading(&self) -> u16 {
        self.last_heading.load(Ordering::Acquire)
    }

    pub fn record_heading(&self, heading: u16) {
        self.last_heading.store(heading, Ordering::Release);
    }
}

/// Held while a gated command is in flight
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<CommandGate>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.leave();
    }
}
