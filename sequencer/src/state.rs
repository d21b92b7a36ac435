//! Trigger state and its published snapshot

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum TriggerPhase {
    #[default]
    Idle,
    /// Device query outstanding
    Polling,
    ThresholdReached,
    Flipping,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerState {
    pub phase: TriggerPhase,
    pub last_poll: Option<DateTime<Utc>>,
    pub last_safe_time_hours: Option<f64>,
    pub flip_in_progress: bool,
    pub earliest_flip: Option<DateTime<Utc>>,
    pub latest_flip: Option<DateTime<Utc>>,
    pub was_guiding_before_flip: bool,
}

impl TriggerState {
    pub fn clear_prediction(&mut self) {
        self.earliest_flip = None;
        self.latest_flip = None;
    }

    pub fn set_prediction(&mut self, at: DateTime<Utc>) {
        self.earliest_flip = Some(at);
        self.latest_flip = Some(at);
    }

    pub fn snapshot(&self) -> TriggerSnapshot {
        TriggerSnapshot {
            phase: self.phase,
            last_poll: self.last_poll,
            last_safe_time_hours: self.last_safe_time_hours,
            safe_time_display: format_safe_time(self.last_safe_time_hours),
            flip_in_progress: self.flip_in_progress,
            earliest_flip: self.earliest_flip,
            latest_flip: self.latest_flip,
            was_guiding_before_flip: self.was_guiding_before_flip,
        }
    }
}

/// Read-only view for UI and logs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSnapshot {
    pub phase: TriggerPhase,
    pub last_poll: Option<DateTime<Utc>>,
    pub last_safe_time_hours: Option<f64>,
    pub safe_time_display: String,
    pub flip_in_progress: bool,
    pub earliest_flip: Option<DateTime<Utc>>,
    pub latest_flip: Option<DateTime<Utc>>,
    pub was_guiding_before_flip: bool,
}

/// `HH:MM` for a safe time in hours, `--:--` when unknown or unrepresentable
pub fn format_safe_time(hours: Option<f64>) -> String {
    match hours {
        Some(h) if h.is_finite() && h.abs() < 1.0e6 => {
            let total_secs = (h.abs() * 3600.0).round() as i64;
            let sign = if h < 0.0 && total_secs > 0 { "-" } else { "" };
            format!("{}{:02}:{:02}", sign, total_secs / 3600, (total_secs % 3600) / 60)
        }
        _ => "--:--".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_safe_time() {
        assert_eq!(format_safe_time(Some(2.35)), "02:21");
        assert_eq!(format_safe_time(Some(0.05)), "00:03");
        assert_eq!(format_safe_time(Some(0.0)), "00:00");
        assert_eq!(format_safe_time(Some(-0.5)), "-00:30");
        assert_eq!(format_safe_time(Some(123.0)), "123:00");
    }

    #[test]
    fn test_format_safe_time_unknown() {
        assert_eq!(format_safe_time(None), "--:--");
        assert_eq!(format_safe_time(Some(f64::NAN)), "--:--");
        assert_eq!(format_safe_time(Some(f64::INFINITY)), "--:--");
        assert_eq!(format_safe_time(Some(1.0e12)), "--:--");
    }

    #[test]
    fn test_snapshot_mirrors_state() {
        let mut state = TriggerState::default();
        state.last_safe_time_hours = Some(1.5);
        state.set_prediction(Utc::now());
        let snap = state.snapshot();
        assert_eq!(snap.safe_time_display, "01:30");
        assert_eq!(snap.earliest_flip, snap.latest_flip);
        assert_eq!(snap.phase, TriggerPhase::Idle);

        state.clear_prediction();
        assert!(state.snapshot().earliest_flip.is_none());
    }
}
