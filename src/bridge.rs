//! Frame delivery bridge.
//!
//! Hardware "new frame ready" callbacks arrive on arbitrary threads at
//! arbitrary rates. The bridge collapses them into a single pending
//! render trigger: a boolean slot plus a waker. Bursts coalesce - the
//! render context always draws the latest frame, never a backlog.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Single-slot coalescing mailbox between the producer's notification
/// threads and the render context.
#[derive(Debug, Default)]
pub struct FrameBridge {
    pending: AtomicBool,
    notify: Notify,
}

impl FrameBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that a new frame is ready.
    ///
    /// Callable from any thread and never blocks. If a render is already
    /// pending, the signal is absorbed into it.
    pub fn notify_frame_ready(&self) {
        self.pending.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Report and clear the pending flag. Render context only.
    ///
    /// Returns `false` when no frame arrived since the last consume, in
    /// which case rendering is skipped.
    pub fn consume_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Wait until at least one notification has arrived.
    ///
    /// A wake-up does not guarantee a pending frame (the permit may
    /// predate a consume); callers must still check `consume_pending`.
    pub async fn ready(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn burst_coalesces_to_one_pending_render() {
        let bridge = Arc::new(FrameBridge::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bridge = bridge.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        bridge.notify_frame_ready();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Exactly one render is pending regardless of burst size.
        assert!(bridge.consume_pending());
        assert!(!bridge.consume_pending());
    }

    #[test]
    fn consume_without_notification_skips_render() {
        let bridge = FrameBridge::new();
        assert!(!bridge.consume_pending());
    }

    #[test]
    fn notifications_after_consume_pend_again() {
        let bridge = FrameBridge::new();
        bridge.notify_frame_ready();
        assert!(bridge.consume_pending());

        bridge.notify_frame_ready();
        bridge.notify_frame_ready();
        assert!(bridge.consume_pending());
        assert!(!bridge.consume_pending());
    }

    #[tokio::test]
    async fn ready_wakes_for_stored_permit() {
        let bridge = FrameBridge::new();
        bridge.notify_frame_ready();
        // The permit was stored before anyone waited; ready() must still
        // resolve immediately.
        bridge.ready().await;
        assert!(bridge.consume_pending());
    }
}
