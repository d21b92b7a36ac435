//! Meridian Flip Action Sequence
//!
//! Runs, in order:
//! 1. Wait for any running exposure (bounded)
//! 2. Pause guiding, remembering whether it was active
//! 3. Resolve the target (declared, else current pointing in J2000)
//! 4. Slew to the target so the mount takes the other pier side
//! 5. Optional autofocus
//! 6. Optional plate-solve recenter
//! 7. Resume guiding if it was active before
//!
//! Only a missing target, a failed slew, or cancellation during the exposure
//! wait abort the sequence. Later steps forward the token to their collaborator.
//! Autofocus, recenter and guiding failures are reported and skipped over.

use crate::{
    CenterRequest, Coordinates, FlipCollaborators, FlipConfig, FlipError, NotificationLevel, ProgressFn,
};
use crate::{AutofocusOps, GuiderOps, PlateSolverFactory};
use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Hard ceiling on the exposure wait, in ticks
pub const EXPOSURE_WAIT_MAX_TICKS: u32 = 300;
pub const EXPOSURE_WAIT_TICK: Duration = Duration::from_secs(1);
/// Ticks to wait when the camera gives no exposure signal at all
const EXPOSURE_WAIT_GRACE_TICKS: u32 = 2;
const EXPOSURE_WAIT_REPORT_EVERY: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Disabled in config, or not needed
    Skipped,
    /// Enabled but a required collaborator is missing
    Unavailable,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlipReport {
    pub target: Coordinates,
    pub was_guiding: bool,
    pub autofocus: StepOutcome,
    pub recenter: StepOutcome,
    pub resume_guiding: StepOutcome,
}

pub struct FlipActionSequence<'a> {
    config: &'a FlipConfig,
    collaborators: &'a FlipCollaborators,
    cancel: &'a CancellationToken,
    progress: Option<ProgressFn<'a>>,
    was_guiding: bool,
}

impl<'a> FlipActionSequence<'a> {
    pub fn new(
        config: &'a FlipConfig,
        collaborators: &'a FlipCollaborators,
        cancel: &'a CancellationToken,
        progress: Option<ProgressFn<'a>>,
    ) -> Self {
        Self { config, collaborators, cancel, progress, was_guiding: false }
    }

    /// Whether guiding was active (and stopped) before the slew
    pub fn was_guiding(&self) -> bool {
        self.was_guiding
    }

    pub async fn run(&mut self, declared_target: Option<Coordinates>) -> Result<FlipReport, FlipError> {
        self.wait_for_exposure().await?;

        if self.config.pause_guiding_during_flip() {
            if let Some(guider) = self.collaborators.guider.clone() {
                self.pause_guiding(guider.as_ref()).await;
            }
        }

        let target = self.resolve_target(declared_target).await?;
        self.slew(&target).await?;

        let autofocus = match (self.config.autofocus_after_flip(), self.collaborators.autofocus.clone()) {
            (false, _) => StepOutcome::Skipped,
            (true, Some(af)) => self.autofocus(af.as_ref()).await,
            (true, None) => {
                tracing::debug!("Autofocus after flip enabled but no focuser available");
                StepOutcome::Unavailable
            }
        };

        let recenter = match (self.config.recenter_after_flip(), self.collaborators.plate_solving.clone()) {
            (false, _) => StepOutcome::Skipped,
            (true, Some(factory)) => self.recenter(factory.as_ref(), &target).await,
            (true, None) => {
                self.unavailable("Recenter not available - check configuration");
                StepOutcome::Unavailable
            }
        };

        let resume_guiding = match (self.was_guiding, self.collaborators.guider.clone()) {
            (true, Some(guider)) => self.resume_guiding(guider.as_ref()).await,
            _ => StepOutcome::Skipped,
        };

        Ok(FlipReport {
            target,
            was_guiding: self.was_guiding,
            autofocus,
            recenter,
            resume_guiding,
        })
    }

    async fn wait_for_exposure(&self) -> Result<(), FlipError> {
        let Some(imaging) = self.collaborators.imaging.clone() else {
            return Ok(());
        };
        tracing::info!("Checking for active exposure...");

        for tick in 1..=EXPOSURE_WAIT_MAX_TICKS {
            self.check_cancelled()?;

            let signal = match imaging.exposure_in_progress().await {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::warn!("Error waiting for exposure - {:#}", e);
                    None
                }
            };
            match signal {
                Some(false) => {
                    tracing::debug!("No exposure in progress");
                    return Ok(());
                }
                None if tick > EXPOSURE_WAIT_GRACE_TICKS => {
                    tracing::debug!("No exposure signal, continuing after {}s", tick - 1);
                    return Ok(());
                }
                _ => {}
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(FlipError::Cancelled),
                _ = tokio::time::sleep(EXPOSURE_WAIT_TICK) => {}
            }

            if tick % EXPOSURE_WAIT_REPORT_EVERY == 0 {
                let message = format!("Waiting for exposure to finish... {}s", tick);
                tracing::debug!("{}", message);
                self.report(5.0, message);
            }
        }

        tracing::warn!(
            "Exposure still running after {}s, continuing with flip",
            EXPOSURE_WAIT_MAX_TICKS
        );
        Ok(())
    }

    async fn pause_guiding(&mut self, guider: &dyn GuiderOps) {
        self.report(10.0, "Stopping guiding...".to_string());

        self.was_guiding = match guider.status().await {
            Ok(status) if status.guiding => match guider.stop(self.cancel).await {
                Ok(()) => {
                    tracing::info!("Guiding stopped");
                    true
                }
                Err(e) => {
                    tracing::warn!("Failed to stop guiding - {:#}", e);
                    false
                }
            },
            Ok(_) => {
                tracing::info!("Guiding was not active");
                false
            }
            Err(e) => {
                tracing::warn!("Could not read guider status - {:#}", e);
                false
            }
        };
    }

    async fn resolve_target(&self, declared: Option<Coordinates>) -> Result<Coordinates, FlipError> {
        if let Some(target) = declared {
            return Ok(target);
        }

        tracing::warn!("Could not get target coordinates, using current telescope position");
        let pointing = match self.collaborators.telescope.pointing().await {
            Ok(pointing) => pointing,
            Err(e) => {
                tracing::warn!("Could not read telescope position - {:#}", e);
                None
            }
        };
        pointing
            .map(|c| c.to_j2000(Utc::now()))
            .ok_or(FlipError::NoTargetCoordinates)
    }

    async fn slew(&self, target: &Coordinates) -> Result<(), FlipError> {
        tracing::info!("Performing meridian flip slew to {}", target);
        self.report(30.0, "Performing meridian flip slew...".to_string());

        self.collaborators
            .telescope
            .slew_to(target, self.cancel)
            .await
            .map_err(FlipError::Slew)?;

        tracing::info!("Meridian flip slew completed");
        Ok(())
    }

    async fn autofocus(&self, af: &dyn AutofocusOps) -> StepOutcome {
        tracing::info!("Running autofocus after meridian flip");
        self.report(50.0, "Auto focusing after flip...".to_string());

        match af.run(self.cancel).await {
            Ok(Some(report)) => {
                tracing::info!("Auto focus completed at position {}", report.position);
                self.notify(
                    NotificationLevel::Success,
                    &format!("Auto focus completed at position {}", report.position),
                );
                StepOutcome::Succeeded
            }
            Ok(None) => {
                tracing::warn!("Auto focus returned no result");
                self.notify(NotificationLevel::Warning, "Auto focus failed - continuing anyway");
                StepOutcome::Failed
            }
            Err(e) => {
                tracing::warn!("Error during auto focus - {:#}", e);
                self.notify(NotificationLevel::Warning, &format!("Auto focus error - {}", e));
                StepOutcome::Failed
            }
        }
    }

    async fn recenter(&self, factory: &dyn PlateSolverFactory, target: &Coordinates) -> StepOutcome {
        tracing::info!("Recentering after meridian flip");
        self.report(70.0, "Recentering after flip...".to_string());

        let Some(profile) = self.collaborators.profile.as_ref().and_then(|p| p.active_profile()) else {
            self.unavailable("Recenter not available - no active profile");
            return StepOutcome::Unavailable;
        };
        let Some(capture) = profile.plate_solve.clone() else {
            self.unavailable("Recenter not available - check plate solver settings");
            return StepOutcome::Unavailable;
        };
        let Some(solver) = factory.plate_solver(&capture) else {
            self.unavailable("Plate solver not available");
            return StepOutcome::Unavailable;
        };
        let Some(blind_solver) = factory.blind_solver(&capture) else {
            self.unavailable("Blind solver not available");
            return StepOutcome::Unavailable;
        };
        let Some(centering) = factory.centering_solver(solver, blind_solver) else {
            self.unavailable("Centering solver not available");
            return StepOutcome::Unavailable;
        };

        let request = CenterRequest {
            target: *target,
            capture,
            tolerance_arcsec: self.config.platesolve_tolerance_arcsec(),
            max_attempts: self.config.max_centering_attempts(),
            focal_length_mm: profile.focal_length_mm,
            pixel_size_um: profile.pixel_size_um,
        };

        match centering.center(&request, self.cancel).await {
            Ok(outcome) if outcome.success => {
                let error = outcome.separation_arcsec.unwrap_or(0.0);
                tracing::info!("Recentered successfully ({:.1}\" error)", error);
                self.notify(
                    NotificationLevel::Success,
                    &format!("Recentered successfully ({:.1}\" error)", error),
                );
                StepOutcome::Succeeded
            }
            Ok(_) => {
                tracing::warn!("Recentering did not reach tolerance");
                self.notify(NotificationLevel::Warning, "Recentering failed - continuing anyway");
                StepOutcome::Failed
            }
            Err(e) => {
                tracing::error!("Error during recentering - {:#}", e);
                self.notify(NotificationLevel::Warning, &format!("Recenter error - {}", e));
                StepOutcome::Failed
            }
        }
    }

    async fn resume_guiding(&self, guider: &dyn GuiderOps) -> StepOutcome {
        tracing::info!("Resuming guiding after meridian flip");
        self.report(90.0, "Resuming guiding...".to_string());

        match guider.start(self.config.force_calibration_after_flip(), self.cancel).await {
            Ok(()) => {
                tracing::info!("Guiding resumed");
                StepOutcome::Succeeded
            }
            Err(e) => {
                tracing::warn!("Failed to resume guiding - {:#}", e);
                self.notify(NotificationLevel::Warning, &format!("Failed to resume guiding: {}", e));
                StepOutcome::Failed
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), FlipError> {
        if self.cancel.is_cancelled() {
            return Err(FlipError::Cancelled);
        }
        Ok(())
    }

    fn unavailable(&self, message: &str) {
        tracing::warn!("{}", message);
        self.notify(NotificationLevel::Warning, message);
    }

    fn notify(&self, level: NotificationLevel, message: &str) {
        self.collaborators.notifier.notify(level, message);
    }

    fn report(&self, percent: f64, message: String) {
        if let Some(progress) = self.progress {
            progress(percent, message);
        }
    }
}
