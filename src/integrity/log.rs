use serde::Serialize;

/// Kind of recorded integrity alert, as sent to the audit endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    TabSwitch,
    WindowBlur,
    /// The screen share stopped unexpectedly while capture was live.
    ScreenSharingStopped,
    /// No screen-track activity observed for a continuous window.
    ScreenShareInactive,
    /// The track itself reports an ended state.
    ScreenTrackEnded,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::TabSwitch => "tab_switch",
            AlertType::WindowBlur => "window_blur",
            AlertType::ScreenSharingStopped => "screen_sharing_stopped",
            AlertType::ScreenShareInactive => "screen_share_inactive",
            AlertType::ScreenTrackEnded => "screen_track_ended",
        }
    }
}

/// One recorded alert.
#[derive(Debug, Clone, Serialize)]
pub struct AlertEntry {
    pub alert_type: AlertType,
    pub timestamp_ms: i64,
    pub details: Option<String>,
}

/// Append-only ordered sequence of integrity alerts.
///
/// Entries are never removed; counters are derived by scanning, not kept
/// as separate mutable state.
#[derive(Debug, Default)]
pub struct IntegrityLog {
    entries: Vec<AlertEntry>,
}

impl IntegrityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an alert stamped with the current wall-clock time.
    pub fn append(&mut self, alert_type: AlertType, details: Option<String>) -> AlertEntry {
        let entry = AlertEntry {
            alert_type,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            details,
        };
        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[AlertEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Derived counter over `tab_switch` entries.
    pub fn tab_switch_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.alert_type == AlertType::TabSwitch)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_switch_count_is_derived_from_entries() {
        let mut log = IntegrityLog::new();
        assert_eq!(log.tab_switch_count(), 0);

        log.append(AlertType::TabSwitch, None);
        log.append(AlertType::WindowBlur, Some("focus lost".into()));
        log.append(AlertType::TabSwitch, None);

        assert_eq!(log.tab_switch_count(), 2);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn entries_keep_append_order() {
        let mut log = IntegrityLog::new();
        log.append(AlertType::TabSwitch, None);
        log.append(AlertType::ScreenSharingStopped, None);

        let kinds: Vec<_> = log.entries().iter().map(|e| e.alert_type).collect();
        assert_eq!(
            kinds,
            vec![AlertType::TabSwitch, AlertType::ScreenSharingStopped]
        );
    }
}
