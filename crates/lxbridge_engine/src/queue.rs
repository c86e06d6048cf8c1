//! Ordered inbound event queue.
//!
//! The transport callback only appends; handling happens in `drain`, which takes
//! events one at a time in arrival order and awaits each before taking the next.
//! A run gate decides whether draining may proceed at all.
//!
//! ## Key Invariants
//!
//! - Events are handled in strict FIFO order, exactly once, without deduplication
//! - At most one drain is active; a second call returns immediately
//! - Events enqueued while a drain is active are handled by that same drain
//! - Stopping the queue discards its contents

use lxbridge_protocol::ControllerEvent;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use tracing::{debug, warn};

#[derive(Default)]
struct QueueState {
    events: VecDeque<ControllerEvent>,
    running: bool,
    draining: bool,
}

/// FIFO of inbound controller events with a run gate.
pub struct EventQueue {
    state: Mutex<QueueState>,
}

impl EventQueue {
    /// Creates a stopped, empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Appends an event. Accepted in any state; the gate applies to draining only.
    pub fn enqueue(&self, event: ControllerEvent) {
        self.state.lock().events.push_back(event);
    }

    /// Opens or closes the run gate.
    ///
    /// Closing the gate discards every queued event and returns how many were dropped.
    pub fn set_running(&self, running: bool) -> usize {
        let mut state = self.state.lock();
        state.running = running;
        if running {
            return 0;
        }

        let discarded = state.events.len();
        state.events.clear();
        drop(state);

        if discarded > 0 {
            warn!(discarded, "event queue stopped, discarding queued events");
        }
        discarded
    }

    /// Returns true if the run gate is open.
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Returns true while a drain is active.
    pub fn is_draining(&self) -> bool {
        self.state.lock().draining
    }

    /// Returns the number of queued events.
    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    /// Returns true if no events are queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().events.is_empty()
    }

    /// Handles queued events in order until the queue is empty or stopped.
    ///
    /// Returns the number of events handled by this call; 0 if the gate is closed
    /// or another drain is already active.
    pub async fn drain<F, Fut>(&self, mut handle: F) -> usize
    where
        F: FnMut(ControllerEvent) -> Fut,
        Fut: Future<Output = ()>,
    {
        {
            let mut state = self.state.lock();
            if !state.running || state.draining {
                return 0;
            }
            state.draining = true;
        }

        let mut guard = DrainGuard {
            queue: self,
            active: true,
        };
        let mut handled = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                let next = if state.running {
                    state.events.pop_front()
                } else {
                    None
                };
                if next.is_none() {
                    // Finish under the same lock an enqueue would take, so no event
                    // can slip in between the empty check and the release.
                    state.draining = false;
                    guard.active = false;
                }
                next
            };
            let Some(event) = next else { break };
            handle(event).await;
            handled += 1;
        }

        debug!(handled, "event queue drained");
        handled
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the drain flag if a drain future is dropped mid-way.
struct DrainGuard<'a> {
    queue: &'a EventQueue,
    active: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.active {
            self.queue.state.lock().draining = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn event(n: u32) -> ControllerEvent {
        ControllerEvent::value(format!("uuid-{n}"), f64::from(n))
    }

    #[tokio::test]
    async fn stopped_queue_does_not_drain() {
        let queue = EventQueue::new();
        queue.enqueue(event(1));

        let handled = queue.drain(|_| async {}).await;
        assert_eq!(handled, 0);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn drains_in_fifo_order() {
        let queue = EventQueue::new();
        for n in 0..5 {
            queue.enqueue(event(n));
        }
        queue.set_running(true);

        let seen = Mutex::new(Vec::new());
        let handled = queue
            .drain(|e| {
                seen.lock().push(e.uuid.to_string());
                async {}
            })
            .await;

        assert_eq!(handled, 5);
        assert_eq!(
            *seen.lock(),
            vec!["uuid-0", "uuid-1", "uuid-2", "uuid-3", "uuid-4"]
        );
        assert!(queue.is_empty());
        assert!(!queue.is_draining());
    }

    #[tokio::test]
    async fn events_enqueued_during_drain_are_handled() {
        let queue = EventQueue::new();
        queue.set_running(true);
        queue.enqueue(event(0));

        let seen = Mutex::new(Vec::new());
        let handled = queue
            .drain(|e| {
                let n = e.value.as_f64().unwrap() as u32;
                seen.lock().push(n);
                if n < 3 {
                    queue.enqueue(event(n + 1));
                }
                async {}
            })
            .await;

        assert_eq!(handled, 4);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn concurrent_drain_is_rejected() {
        let queue = EventQueue::new();
        queue.set_running(true);
        queue.enqueue(event(1));
        queue.enqueue(event(2));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let rx = Mutex::new(Some(rx));

        let first = queue.drain(|_| {
            let rx = rx.lock().take();
            async move {
                if let Some(rx) = rx {
                    let _ = rx.await;
                }
            }
        });
        let second = async {
            let handled = queue.drain(|_| async {}).await;
            let _ = tx.send(());
            handled
        };

        let (first, second) = tokio::join!(first, second);
        assert_eq!(first, 2);
        assert_eq!(second, 0);
        assert!(!queue.is_draining());
    }

    #[tokio::test]
    async fn stop_discards_and_reports_count() {
        let queue = EventQueue::new();
        queue.set_running(true);
        for n in 0..3 {
            queue.enqueue(event(n));
        }

        assert_eq!(queue.set_running(false), 3);
        assert!(queue.is_empty());
        assert_eq!(queue.set_running(false), 0);
    }

    #[tokio::test]
    async fn stop_during_drain_ends_the_drain() {
        let queue = Arc::new(EventQueue::new());
        queue.set_running(true);
        for n in 0..4 {
            queue.enqueue(event(n));
        }

        let q = Arc::clone(&queue);
        let handled = queue
            .drain(move |e| {
                if e.uuid.as_str() == "uuid-1" {
                    q.set_running(false);
                }
                async {}
            })
            .await;

        assert_eq!(handled, 2);
        assert!(queue.is_empty());
        assert!(!queue.is_draining());
    }

    #[tokio::test]
    async fn dropped_drain_releases_flag() {
        let queue = EventQueue::new();
        queue.set_running(true);
        queue.enqueue(event(1));

        {
            let drain = queue.drain(|_| std::future::pending::<()>());
            let _ = tokio::time::timeout(std::time::Duration::from_millis(10), drain).await;
        }

        assert!(!queue.is_draining());
        queue.enqueue(event(2));
        assert_eq!(queue.drain(|_| async {}).await, 1);
    }

    proptest! {
        #[test]
        fn drain_preserves_arrival_order(values in proptest::collection::vec(0u32..1000, 0..50)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let queue = EventQueue::new();
            queue.set_running(true);
            for v in &values {
                queue.enqueue(event(*v));
            }

            let seen = Mutex::new(Vec::new());
            let handled = rt.block_on(queue.drain(|e| {
                seen.lock().push(e.value.as_f64().unwrap() as u32);
                async {}
            }));

            prop_assert_eq!(handled, values.len());
            prop_assert_eq!(seen.into_inner(), values);
        }
    }
}
