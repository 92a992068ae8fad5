// Integration tests for the integrity monitor: alert logging, audit
// forwarding, and the tab-switch termination policy.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use common::MockApi;
use interview_client::integrity::{
    AlertType, IntegrityEvent, IntegrityLog, IntegrityMonitor, TAB_SWITCH_LIMIT,
};
use tokio::sync::mpsc;

async fn settle() {
    // Give the monitor and its detached forwarding tasks a moment.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_tab_switches_are_logged_and_forwarded() -> Result<()> {
    let api = MockApi::new();
    let log = Arc::new(Mutex::new(IntegrityLog::new()));
    let (events_tx, events_rx) = mpsc::channel(8);
    let (limit_tx, _limit_rx) = mpsc::channel(1);

    let _monitor = IntegrityMonitor::spawn(
        events_rx,
        Arc::clone(&log),
        api.clone(),
        "resp-1".to_string(),
        limit_tx,
    );

    events_tx.send(IntegrityEvent::PageHidden).await?;
    events_tx.send(IntegrityEvent::PageVisible).await?;
    events_tx.send(IntegrityEvent::PageHidden).await?;
    settle().await;

    assert_eq!(log.lock().unwrap().tab_switch_count(), 2);
    let alerts = api.alert_types();
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|t| t == "tab_switch"));
    Ok(())
}

#[tokio::test]
async fn test_limit_fires_at_three_switches_not_two() -> Result<()> {
    let api = MockApi::new();
    let log = Arc::new(Mutex::new(IntegrityLog::new()));
    let (events_tx, events_rx) = mpsc::channel(8);
    let (limit_tx, mut limit_rx) = mpsc::channel(1);

    let _monitor = IntegrityMonitor::spawn(
        events_rx,
        Arc::clone(&log),
        api.clone(),
        "resp-1".to_string(),
        limit_tx,
    );

    events_tx.send(IntegrityEvent::PageHidden).await?;
    events_tx.send(IntegrityEvent::PageHidden).await?;
    settle().await;
    assert!(
        limit_rx.try_recv().is_err(),
        "limit must not fire at {} switches",
        TAB_SWITCH_LIMIT - 1
    );

    events_tx.send(IntegrityEvent::PageHidden).await?;
    tokio::time::timeout(Duration::from_secs(1), limit_rx.recv())
        .await
        .expect("limit signal should arrive on the third switch")
        .expect("limit channel open");
    Ok(())
}

#[tokio::test]
async fn test_focus_events_are_observed_but_not_alerts() -> Result<()> {
    let api = MockApi::new();
    let log = Arc::new(Mutex::new(IntegrityLog::new()));
    let (events_tx, events_rx) = mpsc::channel(8);
    let (limit_tx, _limit_rx) = mpsc::channel(1);

    let _monitor = IntegrityMonitor::spawn(
        events_rx,
        Arc::clone(&log),
        api.clone(),
        "resp-1".to_string(),
        limit_tx,
    );

    events_tx.send(IntegrityEvent::PageVisible).await?;
    events_tx.send(IntegrityEvent::WindowFocus).await?;
    settle().await;

    assert!(log.lock().unwrap().is_empty());
    assert!(api.alerts.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_screen_events_map_to_distinct_alert_types() -> Result<()> {
    let api = MockApi::new();
    let log = Arc::new(Mutex::new(IntegrityLog::new()));
    let (events_tx, events_rx) = mpsc::channel(8);
    let (limit_tx, _limit_rx) = mpsc::channel(1);

    let _monitor = IntegrityMonitor::spawn(
        events_rx,
        Arc::clone(&log),
        api.clone(),
        "resp-1".to_string(),
        limit_tx,
    );

    events_tx.send(IntegrityEvent::WindowBlur).await?;
    events_tx.send(IntegrityEvent::ScreenShareEnded).await?;
    events_tx
        .send(IntegrityEvent::ScreenInactive { idle_ms: 31_000 })
        .await?;
    events_tx.send(IntegrityEvent::ScreenTrackDead).await?;
    settle().await;

    let entries = log.lock().unwrap().entries().to_vec();
    let types: Vec<AlertType> = entries.iter().map(|e| e.alert_type).collect();
    assert_eq!(
        types,
        vec![
            AlertType::WindowBlur,
            AlertType::ScreenSharingStopped,
            AlertType::ScreenShareInactive,
            AlertType::ScreenTrackEnded,
        ]
    );
    // None of these count as tab switches.
    assert_eq!(log.lock().unwrap().tab_switch_count(), 0);

    let forwarded = api.alert_types();
    assert!(forwarded.contains(&"screen_sharing_stopped".to_string()));
    assert!(forwarded.contains(&"screen_share_inactive".to_string()));
    Ok(())
}
