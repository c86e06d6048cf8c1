//! One-shot timers owned by the state they govern.
//!
//! A `TimerSlot` lives inside the entry it guards (a pending acknowledgement, a
//! counter, the reconnect schedule). Every armed timer carries a generation that is
//! unique for the process; a fired timer only acts after `take_fired` confirms its
//! generation is still the armed one, so a timer that fires concurrently with its
//! cancellation never mutates state.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Storage for at most one armed timer.
#[derive(Default)]
pub(crate) struct TimerSlot {
    armed: Option<ArmedTimer>,
}

impl TimerSlot {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Arms the slot, cancelling any timer it held.
    ///
    /// After `delay`, `on_fire` is called with the generation of this timer. It must
    /// pass that generation to `take_fired` before touching guarded state.
    pub(crate) fn arm<F, Fut>(&mut self, delay: Duration, on_fire: F)
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(generation).await;
        });
        self.armed = Some(ArmedTimer { generation, handle });
    }

    /// Cancels the armed timer. Returns true if one was armed.
    pub(crate) fn cancel(&mut self) -> bool {
        match self.armed.take() {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Clears the slot on behalf of a fired timer.
    ///
    /// Returns false if the slot was cancelled or re-armed since that timer was armed.
    pub(crate) fn take_fired(&mut self, generation: u64) -> bool {
        match &self.armed {
            Some(timer) if timer.generation == generation => {
                // The task is the caller itself; detach instead of aborting it.
                self.armed = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
