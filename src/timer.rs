//! Session countdown timer
//!
//! A monotonic once-per-second countdown. Fires its terminal signal
//! exactly once on reaching zero; a session that completes through any
//! other path cancels the timer to avoid a duplicate trigger. An absent
//! duration means an untimed session and no timer is created at all; an
//! explicit zero duration fires immediately without ever ticking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

pub struct SessionTimer {
    remaining_rx: watch::Receiver<u64>,
    cancelled: Arc<AtomicBool>,
    fired: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SessionTimer {
    /// Start counting down `duration_secs`. `expired_tx` receives exactly
    /// one message when the countdown reaches zero.
    pub fn start(duration_secs: u64, expired_tx: mpsc::Sender<()>) -> Self {
        let (remaining_tx, remaining_rx) = watch::channel(duration_secs);
        let cancelled = Arc::new(AtomicBool::new(false));
        let fired = Arc::new(AtomicBool::new(false));

        if duration_secs == 0 {
            // Zero duration: never start counting, trigger immediately.
            fired.store(true, Ordering::SeqCst);
            let tx = expired_tx;
            tokio::spawn(async move {
                let _ = tx.send(()).await;
            });
            return Self {
                remaining_rx,
                cancelled,
                fired,
                task: None,
            };
        }

        info!("Session timer started: {}s", duration_secs);

        let task = {
            let cancelled = Arc::clone(&cancelled);
            let fired = Arc::clone(&fired);
            tokio::spawn(async move {
                let mut remaining = duration_secs;
                loop {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    if cancelled.load(Ordering::SeqCst) {
                        break;
                    }

                    remaining -= 1;
                    let _ = remaining_tx.send(remaining);

                    if remaining == 0 {
                        if !fired.swap(true, Ordering::SeqCst) {
                            info!("Session timer expired");
                            let _ = expired_tx.send(()).await;
                        }
                        break;
                    }
                }
            })
        };

        Self {
            remaining_rx,
            cancelled,
            fired,
            task: Some(task),
        }
    }

    /// Seconds left on the countdown.
    pub fn remaining_secs(&self) -> u64 {
        *self.remaining_rx.borrow()
    }

    pub fn watch_remaining(&self) -> watch::Receiver<u64> {
        self.remaining_rx.clone()
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Cancel the countdown. Idempotent; a cancelled timer never fires.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
