//! Collaborator Seams
//!
//! The flip sequence talks to the rest of the observatory only through the
//! traits in this module. The host wires in whatever it has; everything
//! except the telescope and the notifier is optional and its absence just
//! skips the related step.

use crate::Coordinates;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result type for collaborator operations
pub type OpResult<T> = anyhow::Result<T>;

// =========================================================================
// TELESCOPE
// =========================================================================

#[async_trait]
pub trait TelescopeOps: Send + Sync {
    /// Current pointing, in whatever epoch the mount reports
    async fn pointing(&self) -> OpResult<Option<Coordinates>>;

    /// Slew and wait for the slew to finish. Honors `cancel`.
    async fn slew_to(&self, target: &Coordinates, cancel: &CancellationToken) -> OpResult<()>;
}

// =========================================================================
// GUIDER
// =========================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuiderStatus {
    pub connected: bool,
    pub guiding: bool,
}

#[async_trait]
pub trait GuiderOps: Send + Sync {
    async fn status(&self) -> OpResult<GuiderStatus>;

    async fn stop(&self, cancel: &CancellationToken) -> OpResult<()>;

    async fn start(&self, force_calibration: bool, cancel: &CancellationToken) -> OpResult<()>;
}

// =========================================================================
// IMAGING
// =========================================================================

#[async_trait]
pub trait ImagingOps: Send + Sync {
    /// `Some(true)` while a frame is integrating, `Some(false)` when idle,
    /// `None` if the camera can't say.
    async fn exposure_in_progress(&self) -> OpResult<Option<bool>>;
}

// =========================================================================
// AUTOFOCUS
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AutofocusReport {
    pub position: i32,
    pub hfr: Option<f64>,
}

#[async_trait]
pub trait AutofocusOps: Send + Sync {
    /// `Ok(None)` when the run finished without a usable focus position
    async fn run(&self, cancel: &CancellationToken) -> OpResult<Option<AutofocusReport>>;
}

// =========================================================================
// PROFILE AND PLATE SOLVING
// =========================================================================

/// Capture settings used for solve frames
#[derive(Debug, Clone, PartialEq)]
pub struct PlateSolveSettings {
    pub exposure_secs: f64,
    pub binning: u16,
    pub gain: Option<i32>,
    pub filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquipmentProfile {
    pub name: String,
    pub plate_solve: Option<PlateSolveSettings>,
    pub focal_length_mm: f64,
    pub pixel_size_um: f64,
}

pub trait ProfileSource: Send + Sync {
    fn active_profile(&self) -> Option<EquipmentProfile>;
}

/// A configured solver engine
pub trait PlateSolver: Send + Sync {
    fn name(&self) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CenterRequest {
    pub target: Coordinates,
    pub capture: PlateSolveSettings,
    pub tolerance_arcsec: f64,
    pub max_attempts: u32,
    pub focal_length_mm: f64,
    pub pixel_size_um: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterOutcome {
    pub success: bool,
    pub separation_arcsec: Option<f64>,
}

/// Solve-and-sync loop built from a normal and a blind solver
#[async_trait]
pub trait CenteringSolver: Send + Sync {
    async fn center(&self, request: &CenterRequest, cancel: &CancellationToken) -> OpResult<CenterOutcome>;
}

pub trait PlateSolverFactory: Send + Sync {
    fn plate_solver(&self, settings: &PlateSolveSettings) -> Option<Arc<dyn PlateSolver>>;

    fn blind_solver(&self, settings: &PlateSolveSettings) -> Option<Arc<dyn PlateSolver>>;

    fn centering_solver(
        &self,
        solver: Arc<dyn PlateSolver>,
        blind_solver: Arc<dyn PlateSolver>,
    ) -> Option<Arc<dyn CenteringSolver>>;
}

// =========================================================================
// NOTIFICATIONS
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// User-facing messages
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotificationLevel, message: &str);
}

/// Notifier that only writes to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        match level {
            NotificationLevel::Info | NotificationLevel::Success => tracing::info!("{}", message),
            NotificationLevel::Warning => tracing::warn!("{}", message),
            NotificationLevel::Error => tracing::error!("{}", message),
        }
    }
}

// =========================================================================
// BUNDLE
// =========================================================================

/// Everything the flip sequence may call
#[derive(Clone)]
pub struct FlipCollaborators {
    pub telescope: Arc<dyn TelescopeOps>,
    pub notifier: Arc<dyn Notifier>,
    pub guider: Option<Arc<dyn GuiderOps>>,
    pub imaging: Option<Arc<dyn ImagingOps>>,
    pub autofocus: Option<Arc<dyn AutofocusOps>>,
    pub profile: Option<Arc<dyn ProfileSource>>,
    pub plate_solving: Option<Arc<dyn PlateSolverFactory>>,
}

impl FlipCollaborators {
    pub fn new(telescope: Arc<dyn TelescopeOps>) -> Self {
        Self {
            telescope,
            notifier: Arc::new(TracingNotifier),
            guider: None,
            imaging: None,
            autofocus: None,
            profile: None,
            plate_solving: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_guider(mut self, guider: Arc<dyn GuiderOps>) -> Self {
        self.guider = Some(guider);
        self
    }

    pub fn with_imaging(mut self, imaging: Arc<dyn ImagingOps>) -> Self {
        self.imaging = Some(imaging);
        self
    }

    pub fn with_autofocus(mut self, autofocus: Arc<dyn AutofocusOps>) -> Self {
        self.autofocus = Some(autofocus);
        self
    }

    pub fn with_profile(mut self, profile: Arc<dyn ProfileSource>) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_plate_solving(mut self, factory: Arc<dyn PlateSolverFactory>) -> Self {
        self.plate_solving = Some(factory);
        self
    }
}

impl std::fmt::Debug for FlipCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlipCollaborators")
            .field("guider", &self.guider.is_some())
            .field("imaging", &self.imaging.is_some())
            .field("autofocus", &self.autofocus.is_some())
            .field("profile", &self.profile.is_some())
            .field("plate_solving", &self.plate_solving.is_some())
            .finish_non_exhaustive()
    }
}
