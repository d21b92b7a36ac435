//! Flip configuration
//!
//! Every tunable has a declared valid range. Setters that receive a value
//! outside that range ignore it and keep the previous value. This is
//! intentional: the settings UI binds straight to these setters and a stray
//! keystroke must never leave the trigger with an unusable value, nor raise.
//! The same rule applies when loading persisted settings.

use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Valid safe-time threshold, minutes
pub const SAFE_TIME_THRESHOLD_RANGE: RangeInclusive<f64> = 0.0..=120.0;
/// Valid polling interval, seconds
pub const POLLING_INTERVAL_RANGE: RangeInclusive<i64> = 5..=300;
/// Upper bound for the plate-solve tolerance, arcseconds (lower bound is exclusive zero)
pub const PLATESOLVE_TOLERANCE_MAX_ARCSEC: f64 = 3600.0;
/// Valid number of centering attempts
pub const CENTERING_ATTEMPTS_RANGE: RangeInclusive<i64> = 1..=10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "PersistedFlipConfig")]
pub struct FlipConfig {
    safe_time_threshold_minutes: f64,
    polling_interval_seconds: u32,
    pause_guiding_during_flip: bool,
    recenter_after_flip: bool,
    platesolve_tolerance_arcsec: f64,
    max_centering_attempts: u32,
    autofocus_after_flip: bool,
    force_calibration_after_flip: bool,
}

impl Default for FlipConfig {
    fn default() -> Self {
        Self {
            safe_time_threshold_minutes: 5.0,
            polling_interval_seconds: 15,
            pause_guiding_during_flip: true,
            recenter_after_flip: false,
            platesolve_tolerance_arcsec: 30.0,
            max_centering_attempts: 3,
            autofocus_after_flip: false,
            force_calibration_after_flip: false,
        }
    }
}

impl FlipConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from JSON. Out-of-range fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    // Getters

    /// Flip fires once safe time is at or below this many minutes
    pub fn safe_time_threshold_minutes(&self) -> f64 {
        self.safe_time_threshold_minutes
    }

    pub fn polling_interval_seconds(&self) -> u32 {
        self.polling_interval_seconds
    }

    pub fn pause_guiding_during_flip(&self) -> bool {
        self.pause_guiding_during_flip
    }

    pub fn recenter_after_flip(&self) -> bool {
        self.recenter_after_flip
    }

    pub fn platesolve_tolerance_arcsec(&self) -> f64 {
        self.platesolve_tolerance_arcsec
    }

    pub fn max_centering_attempts(&self) -> u32 {
        self.max_centering_attempts
    }

    pub fn autofocus_after_flip(&self) -> bool {
        self.autofocus_after_flip
    }

    pub fn force_calibration_after_flip(&self) -> bool {
        self.force_calibration_after_flip
    }

    // Setters: validate, else ignore

    pub fn set_safe_time_threshold_minutes(&mut self, minutes: f64) {
        if SAFE_TIME_THRESHOLD_RANGE.contains(&minutes) {
            self.safe_time_threshold_minutes = minutes;
        } else {
            tracing::debug!("Ignoring safe time threshold {} (valid: {:?})", minutes, SAFE_TIME_THRESHOLD_RANGE);
        }
    }

    pub fn set_polling_interval_seconds(&mut self, seconds: i64) {
        if POLLING_INTERVAL_RANGE.contains(&seconds) {
            self.polling_interval_seconds = seconds as u32;
        } else {
            tracing::debug!("Ignoring polling interval {}s (valid: {:?})", seconds, POLLING_INTERVAL_RANGE);
        }
    }

    pub fn set_pause_guiding_during_flip(&mut self, enabled: bool) {
        self.pause_guiding_during_flip = enabled;
    }

    pub fn set_recenter_after_flip(&mut self, enabled: bool) {
        self.recenter_after_flip = enabled;
    }

    pub fn set_platesolve_tolerance_arcsec(&mut self, arcsec: f64) {
        if arcsec > 0.0 && arcsec <= PLATESOLVE_TOLERANCE_MAX_ARCSEC {
            self.platesolve_tolerance_arcsec = arcsec;
        } else {
            tracing::debug!("Ignoring plate solve tolerance {}\" (valid: (0, {}])", arcsec, PLATESOLVE_TOLERANCE_MAX_ARCSEC);
        }
    }

    pub fn set_max_centering_attempts(&mut self, attempts: i64) {
        if CENTERING_ATTEMPTS_RANGE.contains(&attempts) {
            self.max_centering_attempts = attempts as u32;
        } else {
            tracing::debug!("Ignoring centering attempts {} (valid: {:?})", attempts, CENTERING_ATTEMPTS_RANGE);
        }
    }

    pub fn set_autofocus_after_flip(&mut self, enabled: bool) {
        self.autofocus_after_flip = enabled;
    }

    pub fn set_force_calibration_after_flip(&mut self, enabled: bool) {
        self.force_calibration_after_flip = enabled;
    }
}

/// On-disk shape. Every field is optional and routed through its setter.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PersistedFlipConfig {
    safe_time_threshold_minutes: Option<f64>,
    polling_interval_seconds: Option<i64>,
    pause_guiding_during_flip: Option<bool>,
    recenter_after_flip: Option<bool>,
    platesolve_tolerance_arcsec: Option<f64>,
    max_centering_attempts: Option<i64>,
    autofocus_after_flip: Option<bool>,
    force_calibration_after_flip: Option<bool>,
}

impl From<PersistedFlipConfig> for FlipConfig {
    fn from(persisted: PersistedFlipConfig) -> Self {
        let mut config = FlipConfig::default();
        if let Some(v) = persisted.safe_time_threshold_minutes {
            config.set_safe_time_threshold_minutes(v);
        }
        if let Some(v) = persisted.polling_interval_seconds {
            config.set_polling_interval_seconds(v);
        }
        if let Some(v) = persisted.pause_guiding_during_flip {
            config.set_pause_guiding_during_flip(v);
        }
        if let Some(v) = persisted.recenter_after_flip {
            config.set_recenter_after_flip(v);
        }
        if let Some(v) = persisted.platesolve_tolerance_arcsec {
            config.set_platesolve_tolerance_arcsec(v);
        }
        if let Some(v) = persisted.max_centering_attempts {
            config.set_max_centering_attempts(v);
        }
        if let Some(v) = persisted.autofocus_after_flip {
            config.set_autofocus_after_flip(v);
        }
        if let Some(v) = persisted.force_calibration_after_flip {
            config.set_force_calibration_after_flip(v);
        }
        config
    }
}
