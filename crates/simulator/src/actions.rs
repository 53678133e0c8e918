//! Timer actions driving each simulated node.
//!
//! Actions hold only a weak reference to the cluster, which owns the tasks
//! that own the actions.

use crate::cluster::Shared;
use metronome_core::{TimerAction, UniformJitter};
use parking_lot::Mutex;
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Weak;
use std::time::Duration;
use tracing::trace;

/// Fires when a node has not heard from a leader in time.
pub(crate) struct ElectionTimeout {
    node: usize,
    shared: Weak<Shared>,
    jitter: UniformJitter,
    rng: Mutex<ChaCha8Rng>,
    finalized: AtomicUsize,
}

impl ElectionTimeout {
    pub(crate) fn new(node: usize, shared: Weak<Shared>, jitter: UniformJitter, rng: ChaCha8Rng) -> Self {
        Self {
            node,
            shared,
            jitter,
            rng: Mutex::new(rng),
            finalized: AtomicUsize::new(0),
        }
    }

    pub(crate) fn finalize_count(&self) -> usize {
        self.finalized.load(Ordering::SeqCst)
    }
}

impl TimerAction for ElectionTimeout {
    fn run(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_election_timeout(self.node);
        }
    }

    fn finalize(&self) {
        self.finalized.fetch_add(1, Ordering::SeqCst);
        trace!(node = self.node, "Election timer finalized");
    }

    fn adjust_timeout(&self, timeout: Duration) -> Duration {
        self.jitter.apply_with(&mut *self.rng.lock(), timeout)
    }
}

/// Fires periodically while a node leads.
pub(crate) struct Heartbeat {
    node: usize,
    shared: Weak<Shared>,
    finalized: AtomicUsize,
}

impl Heartbeat {
    pub(crate) fn new(node: usize, shared: Weak<Shared>) -> Self {
        Self {
            node,
            shared,
            finalized: AtomicUsize::new(0),
        }
    }

    pub(crate) fn finalize_count(&self) -> usize {
        self.finalized.load(Ordering::SeqCst)
    }
}

impl TimerAction for Heartbeat {
    fn run(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_heartbeat(self.node);
        }
    }

    fn finalize(&self) {
        self.finalized.fetch_add(1, Ordering::SeqCst);
        trace!(node = self.node, "Heartbeat timer finalized");
    }
}
