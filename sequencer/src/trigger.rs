//! Safe-Time Trigger
//!
//! Decides when to flip. Each `evaluate` may query the mount (throttled to
//! the polling interval), decode the safe time and update the predicted flip
//! instant. `execute` runs the flip sequence while holding the in-progress
//! flag, so overlapping flips are refused.

use crate::{
    Coordinates, FlipActionSequence, FlipCollaborators, FlipConfig, FlipError, FlipReport, NotificationLevel,
    ProgressFn, TriggerPhase, TriggerSnapshot, TriggerState,
};
use chrono::{DateTime, Local, TimeDelta, Utc};
use safeflip_link::{parse_number, DeviceLink, MountMediator, SAFE_TIME_COMMAND};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Outcome of the synchronous gate at the start of `evaluate`
enum Gate {
    Busy,
    NoDevice,
    Throttled,
    Poll,
}

pub struct SafeTimeTrigger {
    config: FlipConfig,
    mount: Option<Arc<dyn MountMediator>>,
    link: DeviceLink,
    collaborators: FlipCollaborators,
    state: Mutex<TriggerState>,
    snapshots: watch::Sender<TriggerSnapshot>,
}

impl SafeTimeTrigger {
    pub fn new(
        config: FlipConfig,
        mount: Option<Arc<dyn MountMediator>>,
        collaborators: FlipCollaborators,
    ) -> Self {
        let link = match &mount {
            Some(mediator) => DeviceLink::new(mediator.clone()),
            None => DeviceLink::detached(),
        };
        let state = TriggerState::default();
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            config,
            mount,
            link,
            collaborators,
            state: Mutex::new(state),
            snapshots,
        }
    }

    pub fn config(&self) -> &FlipConfig {
        &self.config
    }

    /// Replace the configuration between runs
    pub fn set_config(&mut self, config: FlipConfig) {
        self.config = config;
    }

    pub fn snapshot(&self) -> TriggerSnapshot {
        self.lock().snapshot()
    }

    /// Follow state changes
    pub fn subscribe(&self) -> watch::Receiver<TriggerSnapshot> {
        self.snapshots.subscribe()
    }

    /// Fresh trigger with the same configuration and collaborators
    pub fn duplicate(&self) -> Self {
        Self::new(self.config.clone(), self.mount.clone(), self.collaborators.clone())
    }

    /// Forget all polling state and the cached device binding.
    /// A flip that is already running keeps its in-progress flag.
    pub fn detach(&self) {
        self.update(|s| {
            let flipping = s.flip_in_progress;
            *s = TriggerState::default();
            if flipping {
                s.flip_in_progress = true;
                s.phase = TriggerPhase::Flipping;
            }
        });
        self.link.reset();
        tracing::debug!("Safe time trigger detached");
    }

    pub async fn evaluate(&self) -> bool {
        self.evaluate_at(Utc::now()).await
    }

    /// Decide whether a flip is due, treating `now` as the current time.
    ///
    /// Fires when `0 <= safe time minutes <= threshold`. Never raises: device
    /// and decode problems just mean "not now".
    pub async fn evaluate_at(&self, now: DateTime<Utc>) -> bool {
        let interval = TimeDelta::seconds(i64::from(self.config.polling_interval_seconds()));
        let gate = self.update(|s| {
            if s.flip_in_progress {
                return Gate::Busy;
            }
            if !self.link.has_mediator() {
                s.clear_prediction();
                return Gate::NoDevice;
            }
            if let Some(last) = s.last_poll {
                if now.signed_duration_since(last) < interval {
                    return Gate::Throttled;
                }
            }
            s.last_poll = Some(now);
            s.phase = TriggerPhase::Polling;
            Gate::Poll
        });

        match gate {
            Gate::Busy => {
                tracing::trace!("Flip in progress, not evaluating");
                return false;
            }
            Gate::NoDevice => {
                tracing::trace!("No mount connected");
                return false;
            }
            Gate::Throttled => return false,
            Gate::Poll => {}
        }

        let hours = self.poll_safe_time().await;
        let threshold = self.config.safe_time_threshold_minutes();

        self.update(|s| {
            let Some(hours) = hours else {
                s.clear_prediction();
                s.phase = TriggerPhase::Idle;
                return false;
            };
            s.last_safe_time_hours = Some(hours);
            let minutes = hours * 60.0;

            if minutes < 0.0 {
                tracing::debug!("Safe time {:.2}h is negative, not flipping", hours);
                s.clear_prediction();
                s.phase = TriggerPhase::Idle;
                return false;
            }

            let until_flip_ms = ((minutes - threshold).max(0.0) * 60_000.0).round() as i64;
            let predicted = TimeDelta::try_milliseconds(until_flip_ms).and_then(|d| now.checked_add_signed(d));
            match predicted {
                Some(at) => s.set_prediction(at),
                None => s.clear_prediction(),
            }

            tracing::info!(
                "Safe time: {:.2} hours ({:.1} minutes), threshold: {} minutes, flip at {}",
                hours,
                minutes,
                threshold,
                predicted
                    .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
                    .unwrap_or_else(|| "--:--:--".to_string())
            );

            // Re-checked: a flip may have started while the query was out
            let fire = minutes <= threshold && !s.flip_in_progress;
            if fire {
                tracing::info!("Safe time threshold reached, meridian flip required");
                s.phase = TriggerPhase::ThresholdReached;
            } else if !s.flip_in_progress {
                s.phase = TriggerPhase::Idle;
            }
            fire
        })
    }

    async fn poll_safe_time(&self) -> Option<f64> {
        if !self.link.is_connected().await {
            tracing::debug!("Mount not connected, skipping safe time query");
            return None;
        }
        let reply = self.link.send(SAFE_TIME_COMMAND).await;
        let hours = parse_number(reply.as_deref());
        if hours.is_none() {
            tracing::debug!("Could not decode safe time from {:?}", reply);
        }
        hours
    }

    /// Run the flip. `target` is the declared target of the surrounding
    /// sequence; without one the current pointing is used.
    pub async fn execute(
        &self,
        target: Option<Coordinates>,
        cancel: &CancellationToken,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<FlipReport, FlipError> {
        let acquired = self.update(|s| {
            if s.flip_in_progress {
                return false;
            }
            s.flip_in_progress = true;
            s.phase = TriggerPhase::Flipping;
            true
        });
        if !acquired {
            tracing::warn!("Meridian flip already in progress, skipping");
            return Err(FlipError::FlipInProgress);
        }
        let _guard = FlipGuard { trigger: self };

        let hours = self.lock().last_safe_time_hours;
        tracing::info!(
            "Starting meridian flip sequence. Safe time: {}",
            crate::format_safe_time(hours)
        );
        self.collaborators.notifier.notify(
            NotificationLevel::Info,
            &format!("Meridian flip: safe time at {} - starting flip", crate::format_safe_time(hours)),
        );

        let mut sequence = FlipActionSequence::new(&self.config, &self.collaborators, cancel, progress);
        let result = sequence.run(target).await;
        let was_guiding = sequence.was_guiding();
        self.update(|s| s.was_guiding_before_flip = was_guiding);

        match result {
            Ok(report) => {
                tracing::info!("Meridian flip completed successfully");
                self.collaborators
                    .notifier
                    .notify(NotificationLevel::Success, "Meridian flip completed successfully");
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Error during meridian flip - {}", e.detail());
                self.collaborators
                    .notifier
                    .notify(NotificationLevel::Error, &format!("Meridian flip failed: {}", e));
                Err(e)
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TriggerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate state and publish the snapshot if it changed
    fn update<R>(&self, f: impl FnOnce(&mut TriggerState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.lock();
            let result = f(&mut state);
            (result, state.snapshot())
        };
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
        result
    }
}

/// Clears the in-progress flag however the flip ends
struct FlipGuard<'a> {
    trigger: &'a SafeTimeTrigger,
}

impl Drop for FlipGuard<'_> {
    fn drop(&mut self) {
        self.trigger.update(|s| {
            s.flip_in_progress = false;
            s.phase = TriggerPhase::Idle;
        });
    }
}

impl fmt::Display for SafeTimeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SafeTimeTrigger(threshold={}min, poll={}s)",
            self.config.safe_time_threshold_minutes(),
            self.config.polling_interval_seconds()
        )
    }
}

impl fmt::Debug for SafeTimeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeTimeTrigger")
            .field("config", &self.config)
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use crate::Epoch;
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;
    use tokio::sync::Notify;

    struct Rig {
        mount: Arc<FakeMount>,
        telescope: Arc<FakeTelescope>,
        guider: Arc<FakeGuider>,
        notifier: Arc<RecordingNotifier>,
        trigger: SafeTimeTrigger,
    }

    fn rig_with(reply: &str, config: FlipConfig, telescope: FakeTelescope) -> Rig {
        let mount = FakeMount::replying(reply);
        let telescope = Arc::new(telescope);
        let guider = Arc::new(FakeGuider::guiding());
        let notifier = Arc::new(RecordingNotifier::default());
        let collaborators = FlipCollaborators::new(telescope.clone())
            .with_notifier(notifier.clone())
            .with_guider(guider.clone());
        let trigger = SafeTimeTrigger::new(config, Some(Arc::new(FakeMediator(mount.clone()))), collaborators);
        Rig { mount, telescope, guider, notifier, trigger }
    }

    fn rig(reply: &str) -> Rig {
        rig_with(reply, FlipConfig::default(), FakeTelescope::default())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 22, 0, 0).unwrap()
    }

    fn target() -> Coordinates {
        Coordinates::j2000(10.0, 30.0)
    }

    #[tokio::test]
    async fn test_fires_within_threshold() {
        // 0.05h = 3 minutes, threshold 5
        let rig = rig("0.05#");
        assert!(rig.trigger.evaluate_at(t0()).await);

        let snap = rig.trigger.snapshot();
        assert_eq!(snap.phase, TriggerPhase::ThresholdReached);
        assert_eq!(snap.last_safe_time_hours, Some(0.05));
        assert_eq!(snap.earliest_flip, Some(t0()));
        assert_eq!(snap.latest_flip, Some(t0()));
    }

    #[tokio::test]
    async fn test_does_not_fire_above_threshold() {
        // 0.10h = 6 minutes, threshold 5
        let rig = rig("0.10#");
        assert!(!rig.trigger.evaluate_at(t0()).await);

        let snap = rig.trigger.snapshot();
        assert_eq!(snap.phase, TriggerPhase::Idle);
        assert_eq!(snap.earliest_flip, Some(t0() + TimeDelta::minutes(1)));
        assert_eq!(snap.safe_time_display, "00:06");
    }

    #[tokio::test]
    async fn test_threshold_bounds_are_inclusive() {
        let rig = rig("0#");
        assert!(rig.trigger.evaluate_at(t0()).await);

        let mut config = FlipConfig::default();
        config.set_safe_time_threshold_minutes(6.5);
        let rig = rig_with("0.1#", config, FakeTelescope::default());
        assert!(rig.trigger.evaluate_at(t0()).await);
    }

    #[tokio::test]
    async fn test_prediction_for_distant_safe_time() {
        let rig = rig("2.35#");
        assert!(!rig.trigger.evaluate_at(t0()).await);
        // 141 minutes minus 5 minute threshold
        assert_eq!(rig.trigger.snapshot().earliest_flip, Some(t0() + TimeDelta::minutes(136)));
    }

    #[tokio::test]
    async fn test_negative_safe_time_never_fires() {
        for reply in ["-0.01#", "-0.5#", "-3#"] {
            let rig = rig(reply);
            assert!(!rig.trigger.evaluate_at(t0()).await, "reply {}", reply);
            let snap = rig.trigger.snapshot();
            assert!(snap.earliest_flip.is_none());
            assert!(snap.latest_flip.is_none());
        }
    }

    #[tokio::test]
    async fn test_polling_is_throttled() {
        let rig = rig("1.0#");
        assert!(!rig.trigger.evaluate_at(t0()).await);
        assert_eq!(rig.mount.sends(), 1);

        rig.mount.set_reply("0.01#");
        assert!(!rig.trigger.evaluate_at(t0() + TimeDelta::seconds(5)).await);
        assert_eq!(rig.mount.sends(), 1);
        assert_eq!(rig.trigger.snapshot().last_poll, Some(t0()));

        assert!(rig.trigger.evaluate_at(t0() + TimeDelta::seconds(16)).await);
        assert_eq!(rig.mount.sends(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_reply_clears_prediction() {
        let rig = rig("2.0#");
        rig.trigger.evaluate_at(t0()).await;
        assert!(rig.trigger.snapshot().earliest_flip.is_some());

        rig.mount.set_reply("garbage");
        assert!(!rig.trigger.evaluate_at(t0() + TimeDelta::seconds(20)).await);
        assert!(rig.trigger.snapshot().earliest_flip.is_none());
    }

    #[tokio::test]
    async fn test_no_mount_never_fires() {
        let telescope = Arc::new(FakeTelescope::default());
        let trigger = SafeTimeTrigger::new(FlipConfig::default(), None, FlipCollaborators::new(telescope));
        assert!(!trigger.evaluate_at(t0()).await);
        let snap = trigger.snapshot();
        assert!(snap.last_poll.is_none());
        assert!(snap.earliest_flip.is_none());
    }

    #[tokio::test]
    async fn test_disconnected_mount_is_not_queried() {
        let rig = rig("0.01#");
        rig.mount.connected.store(false, Ordering::SeqCst);
        assert!(!rig.trigger.evaluate_at(t0()).await);
        assert_eq!(rig.mount.sends(), 0);
    }

    #[tokio::test]
    async fn test_execute_runs_flip_and_clears_flag() {
        let rig = rig("0.05#");
        assert!(rig.trigger.evaluate_at(t0()).await);

        let cancel = CancellationToken::new();
        let report = rig.trigger.execute(Some(target()), &cancel, None).await.unwrap();

        assert_eq!(report.target, target());
        assert_eq!(rig.telescope.slews(), vec![target()]);
        assert_eq!(rig.guider.starts(), vec![false]);

        let snap = rig.trigger.snapshot();
        assert!(!snap.flip_in_progress);
        assert!(snap.was_guiding_before_flip);
        assert_eq!(snap.phase, TriggerPhase::Idle);
        assert!(rig.notifier.has(NotificationLevel::Info, "starting flip"));
        assert!(rig.notifier.has(NotificationLevel::Success, "completed successfully"));
    }

    #[tokio::test]
    async fn test_failed_flip_clears_flag_and_reports() {
        let rig = rig("0.05#");
        rig.telescope.fail_slew.store(true, Ordering::SeqCst);
        let cancel = CancellationToken::new();

        let err = rig.trigger.execute(Some(target()), &cancel, None).await.unwrap_err();

        assert!(matches!(err, FlipError::Slew(_)));
        assert!(!rig.trigger.snapshot().flip_in_progress);
        assert!(rig.guider.starts().is_empty());
        assert!(rig.notifier.has(NotificationLevel::Error, "Meridian flip failed"));
    }

    #[tokio::test]
    async fn test_missing_target_uses_pointing() {
        let rig = rig_with(
            "0.05#",
            FlipConfig::default(),
            FakeTelescope::pointing_at(Coordinates::j2000(3.0, -10.0)),
        );
        let cancel = CancellationToken::new();
        let report = rig.trigger.execute(None, &cancel, None).await.unwrap();
        assert_eq!(report.target, Coordinates::j2000(3.0, -10.0));
        assert_eq!(report.target.epoch, Epoch::J2000);
    }

    #[tokio::test]
    async fn test_no_target_at_all_fails() {
        let rig = rig("0.05#");
        let cancel = CancellationToken::new();
        let err = rig.trigger.execute(None, &cancel, None).await.unwrap_err();
        assert!(matches!(err, FlipError::NoTargetCoordinates));
        assert!(!rig.trigger.snapshot().flip_in_progress);
    }

    #[tokio::test]
    async fn test_no_double_fire_while_flipping() {
        let gate = Arc::new(Notify::new());
        let telescope = FakeTelescope { gate: Some(gate.clone()), ..Default::default() };
        let rig = rig_with("0.01#", FlipConfig::default(), telescope);
        let cancel = CancellationToken::new();

        let first = rig.trigger.execute(Some(target()), &cancel, None);
        let second = async {
            tokio::task::yield_now().await;
            // First flip is parked on the slew gate by now
            assert!(rig.trigger.snapshot().flip_in_progress);
            assert!(!rig.trigger.evaluate_at(t0()).await);
            assert_eq!(rig.mount.sends(), 0);

            let again = rig.trigger.execute(Some(target()), &cancel, None).await;
            assert!(matches!(again, Err(FlipError::FlipInProgress)));
            gate.notify_one();
        };
        let (first, ()) = tokio::join!(first, second);

        assert!(first.is_ok());
        assert_eq!(rig.telescope.slews().len(), 1);
        assert!(!rig.trigger.snapshot().flip_in_progress);
    }

    #[tokio::test]
    async fn test_dropped_flip_clears_flag() {
        let gate = Arc::new(Notify::new());
        let telescope = FakeTelescope { gate: Some(gate), ..Default::default() };
        let rig = rig_with("0.01#", FlipConfig::default(), telescope);
        let cancel = CancellationToken::new();

        let flip = rig.trigger.execute(Some(target()), &cancel, None);
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(10), flip).await;

        assert!(timed_out.is_err());
        assert!(!rig.trigger.snapshot().flip_in_progress);
    }

    #[tokio::test]
    async fn test_snapshots_are_published() {
        let rig = rig("0.05#");
        let mut rx = rig.trigger.subscribe();
        assert!(!rx.has_changed().unwrap());

        rig.trigger.evaluate_at(t0()).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().phase, TriggerPhase::ThresholdReached);

        // Throttled evaluation changes nothing
        rig.trigger.evaluate_at(t0() + TimeDelta::seconds(1)).await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_detach_resets_state() {
        let rig = rig("0.05#");
        rig.trigger.evaluate_at(t0()).await;
        rig.trigger.detach();

        let snap = rig.trigger.snapshot();
        assert!(snap.last_poll.is_none());
        assert!(snap.last_safe_time_hours.is_none());
        assert_eq!(snap.safe_time_display, "--:--");

        // Throttle no longer applies after detaching
        assert!(rig.trigger.evaluate_at(t0() + TimeDelta::seconds(1)).await);
        assert_eq!(rig.mount.sends(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_starts_fresh() {
        let mut config = FlipConfig::default();
        config.set_safe_time_threshold_minutes(10.0);
        let rig = rig_with("0.05#", config, FakeTelescope::default());
        rig.trigger.evaluate_at(t0()).await;

        let copy = rig.trigger.duplicate();
        assert_eq!(copy.config(), rig.trigger.config());
        assert!(copy.snapshot().last_poll.is_none());
        assert!(copy.evaluate_at(t0()).await);
    }

    #[test]
    fn test_display() {
        let telescope = Arc::new(FakeTelescope::default());
        let trigger = SafeTimeTrigger::new(FlipConfig::default(), None, FlipCollaborators::new(telescope));
        assert_eq!(trigger.to_string(), "SafeTimeTrigger(threshold=5min, poll=15s)");
    }
}
