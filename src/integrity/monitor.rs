use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{AlertEntry, AlertType, IntegrityEvent, IntegrityLog};
use crate::api::{CheatingAlert, InterviewBackend};

/// Visibility-hidden transitions allowed before the session is forcibly
/// terminated.
pub const TAB_SWITCH_LIMIT: usize = 3;

/// Consumes integrity events, applies the violation policy, and forwards
/// alerts to the backend for audit.
pub struct IntegrityMonitor;

impl IntegrityMonitor {
    /// Spawn the monitor task. It runs until the event source closes or
    /// the returned handle is released.
    ///
    /// `limit_tx` fires once when the tab-switch count reaches
    /// [`TAB_SWITCH_LIMIT`]; the orchestrator turns that into a forced
    /// session end.
    pub fn spawn(
        mut events_rx: mpsc::Receiver<IntegrityEvent>,
        log: Arc<Mutex<IntegrityLog>>,
        api: Arc<dyn InterviewBackend>,
        response_id: String,
        limit_tx: mpsc::Sender<()>,
    ) -> MonitorHandle {
        let task = tokio::spawn(async move {
            info!("Integrity monitor started");

            while let Some(event) = events_rx.recv().await {
                match event {
                    IntegrityEvent::PageHidden => {
                        let (entry, count) = {
                            let mut log = log.lock().expect("integrity log poisoned");
                            let entry = log.append(AlertType::TabSwitch, None);
                            (entry, log.tab_switch_count())
                        };
                        info!("Tab switch detected ({}/{})", count, TAB_SWITCH_LIMIT);
                        forward_alert(&api, &response_id, entry);

                        if count == TAB_SWITCH_LIMIT {
                            // Terminal trigger, independent of other state.
                            let _ = limit_tx.send(()).await;
                        }
                    }
                    IntegrityEvent::WindowBlur => {
                        let entry = log
                            .lock()
                            .expect("integrity log poisoned")
                            .append(AlertType::WindowBlur, None);
                        forward_alert(&api, &response_id, entry);
                    }
                    IntegrityEvent::ScreenShareEnded => {
                        let entry = log.lock().expect("integrity log poisoned").append(
                            AlertType::ScreenSharingStopped,
                            Some("screen share ended while capture was live".to_string()),
                        );
                        forward_alert(&api, &response_id, entry);
                    }
                    IntegrityEvent::ScreenInactive { idle_ms } => {
                        let entry = log.lock().expect("integrity log poisoned").append(
                            AlertType::ScreenShareInactive,
                            Some(format!("no track activity for {idle_ms}ms")),
                        );
                        forward_alert(&api, &response_id, entry);
                    }
                    IntegrityEvent::ScreenTrackDead => {
                        let entry = log.lock().expect("integrity log poisoned").append(
                            AlertType::ScreenTrackEnded,
                            Some("track reports ended state".to_string()),
                        );
                        forward_alert(&api, &response_id, entry);
                    }
                    IntegrityEvent::PageVisible | IntegrityEvent::WindowFocus => {
                        debug!("Focus regained: {:?}", event);
                    }
                }
            }

            info!("Integrity monitor stopped");
        });

        MonitorHandle {
            task: Some(task),
            released: AtomicBool::new(false),
        }
    }
}

/// Best-effort audit forwarding: detached task, result ignored, errors
/// logged, never awaited by the caller.
fn forward_alert(api: &Arc<dyn InterviewBackend>, response_id: &str, entry: AlertEntry) {
    let api = Arc::clone(api);
    let alert = CheatingAlert {
        response_id: response_id.to_string(),
        alert_type: entry.alert_type.as_str().to_string(),
        details: entry.details,
        timestamp_ms: entry.timestamp_ms,
    };
    tokio::spawn(async move {
        if let Err(e) = api.record_alert(&alert).await {
            debug!("Alert forwarding failed (ignored): {}", e);
        }
    });
}

/// Scoped handle for the monitor task. Release runs exactly once, whether
/// through [`MonitorHandle::shutdown`] or drop.
pub struct MonitorHandle {
    task: Option<JoinHandle<()>>,
    released: AtomicBool,
}

impl MonitorHandle {
    pub fn shutdown(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
