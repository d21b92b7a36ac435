//! In-memory collaborators for unit tests

use crate::*;
use async_trait::async_trait;
use safeflip_link::{
    CommandFamily, ConnectionProperty, DeviceCapabilities, LinkError, MountDevice, MountMediator,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// =========================================================================
// MOUNT
// =========================================================================

pub struct FakeMount {
    pub reply: Mutex<Option<String>>,
    pub connected: AtomicBool,
    pub sends: AtomicUsize,
}

impl FakeMount {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Some(reply.to_string())),
            connected: AtomicBool::new(true),
            sends: AtomicUsize::new(0),
        })
    }

    pub fn set_reply(&self, reply: &str) {
        *self.reply.lock().unwrap() = Some(reply.to_string());
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MountDevice for FakeMount {
    fn name(&self) -> String {
        "Fake OAT".to_string()
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::new([CommandFamily::CommandString], [ConnectionProperty::Connected])
    }

    async fn read_connection(&self, _property: ConnectionProperty) -> Result<bool, LinkError> {
        Ok(self.connected.load(Ordering::SeqCst))
    }

    async fn execute(&self, _family: CommandFamily, _command: &str) -> Result<Option<String>, LinkError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.lock().unwrap().clone())
    }
}

pub struct FakeMediator(pub Arc<FakeMount>);

impl MountMediator for FakeMediator {
    fn device(&self) -> Option<Arc<dyn MountDevice>> {
        Some(self.0.clone())
    }
}

// =========================================================================
// TELESCOPE
// =========================================================================

#[derive(Default)]
pub struct FakeTelescope {
    pub pointing: Mutex<Option<Coordinates>>,
    pub fail_slew: AtomicBool,
    pub slews: Mutex<Vec<Coordinates>>,
    /// When set, slews block until notified
    pub gate: Option<Arc<Notify>>,
    /// Token state seen when the slew finished
    pub saw_cancel: AtomicBool,
}

impl FakeTelescope {
    pub fn pointing_at(coordinates: Coordinates) -> Self {
        Self {
            pointing: Mutex::new(Some(coordinates)),
            ..Default::default()
        }
    }

    pub fn slews(&self) -> Vec<Coordinates> {
        self.slews.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelescopeOps for FakeTelescope {
    async fn pointing(&self) -> OpResult<Option<Coordinates>> {
        Ok(*self.pointing.lock().unwrap())
    }

    async fn slew_to(&self, target: &Coordinates, cancel: &CancellationToken) -> OpResult<()> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.saw_cancel.store(cancel.is_cancelled(), Ordering::SeqCst);
        if self.fail_slew.load(Ordering::SeqCst) {
            anyhow::bail!("mount refused slew");
        }
        self.slews.lock().unwrap().push(*target);
        Ok(())
    }
}

// =========================================================================
// GUIDER
// =========================================================================

#[derive(Default)]
pub struct FakeGuider {
    pub guiding: bool,
    pub fail_stop: bool,
    pub fail_start: bool,
    pub stops: AtomicUsize,
    pub starts: Mutex<Vec<bool>>,
}

impl FakeGuider {
    pub fn guiding() -> Self {
        Self { guiding: true, ..Default::default() }
    }

    pub fn starts(&self) -> Vec<bool> {
        self.starts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GuiderOps for FakeGuider {
    async fn status(&self) -> OpResult<GuiderStatus> {
        Ok(GuiderStatus { connected: true, guiding: self.guiding })
    }

    async fn stop(&self, _cancel: &CancellationToken) -> OpResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            anyhow::bail!("guider did not stop");
        }
        Ok(())
    }

    async fn start(&self, force_calibration: bool, _cancel: &CancellationToken) -> OpResult<()> {
        self.starts.lock().unwrap().push(force_calibration);
        if self.fail_start {
            anyhow::bail!("no guide star");
        }
        Ok(())
    }
}

// =========================================================================
// IMAGING
// =========================================================================

/// Reports `Some(true)` for the first `busy_polls` queries, then `then`
pub struct FakeImaging {
    pub busy_polls: usize,
    pub then: Option<bool>,
    pub polls: AtomicUsize,
}

impl FakeImaging {
    pub fn new(busy_polls: usize, then: Option<bool>) -> Self {
        Self { busy_polls, then, polls: AtomicUsize::new(0) }
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImagingOps for FakeImaging {
    async fn exposure_in_progress(&self) -> OpResult<Option<bool>> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst);
        if n < self.busy_polls {
            Ok(Some(true))
        } else {
            Ok(self.then)
        }
    }
}

// =========================================================================
// AUTOFOCUS
// =========================================================================

pub enum AutofocusScript {
    Focused(i32),
    NoResult,
    Fails,
}

pub struct FakeAutofocus {
    pub script: AutofocusScript,
    pub runs: AtomicUsize,
}

impl FakeAutofocus {
    pub fn new(script: AutofocusScript) -> Self {
        Self { script, runs: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl AutofocusOps for FakeAutofocus {
    async fn run(&self, _cancel: &CancellationToken) -> OpResult<Option<AutofocusReport>> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.script {
            AutofocusScript::Focused(position) => Ok(Some(AutofocusReport { position, hfr: Some(2.1) })),
            AutofocusScript::NoResult => Ok(None),
            AutofocusScript::Fails => anyhow::bail!("focuser timeout"),
        }
    }
}

// =========================================================================
// PROFILE AND SOLVING
// =========================================================================

pub struct FakeProfile(pub Option<EquipmentProfile>);

impl FakeProfile {
    pub fn with_solver_settings() -> Self {
        Self(Some(EquipmentProfile {
            name: "Backyard".to_string(),
            plate_solve: Some(PlateSolveSettings {
                exposure_secs: 5.0,
                binning: 2,
                gain: Some(100),
                filter: Some("L".to_string()),
            }),
            focal_length_mm: 400.0,
            pixel_size_um: 3.76,
        }))
    }
}

impl ProfileSource for FakeProfile {
    fn active_profile(&self) -> Option<EquipmentProfile> {
        self.0.clone()
    }
}

pub struct NamedSolver(pub &'static str);

impl PlateSolver for NamedSolver {
    fn name(&self) -> String {
        self.0.to_string()
    }
}

pub struct FakeCentering {
    pub outcome: Option<CenterOutcome>,
    pub requests: Mutex<Vec<CenterRequest>>,
}

impl FakeCentering {
    /// `None` outcome means the solver errors
    pub fn new(outcome: Option<CenterOutcome>) -> Arc<Self> {
        Arc::new(Self { outcome, requests: Mutex::new(Vec::new()) })
    }

    pub fn requests(&self) -> Vec<CenterRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CenteringSolver for FakeCentering {
    async fn center(&self, request: &CenterRequest, _cancel: &CancellationToken) -> OpResult<CenterOutcome> {
        self.requests.lock().unwrap().push(request.clone());
        self.outcome.ok_or_else(|| anyhow::anyhow!("solve failed"))
    }
}

pub struct FakeSolverFactory {
    pub has_blind: bool,
    pub centering: Arc<FakeCentering>,
}

impl PlateSolverFactory for FakeSolverFactory {
    fn plate_solver(&self, _settings: &PlateSolveSettings) -> Option<Arc<dyn PlateSolver>> {
        Some(Arc::new(NamedSolver("astap")))
    }

    fn blind_solver(&self, _settings: &PlateSolveSettings) -> Option<Arc<dyn PlateSolver>> {
        self.has_blind.then(|| Arc::new(NamedSolver("astrometry")) as Arc<dyn PlateSolver>)
    }

    fn centering_solver(
        &self,
        _solver: Arc<dyn PlateSolver>,
        _blind_solver: Arc<dyn PlateSolver>,
    ) -> Option<Arc<dyn CenteringSolver>> {
        Some(self.centering.clone())
    }
}

// =========================================================================
// NOTIFIER
// =========================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(NotificationLevel, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(NotificationLevel, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn has(&self, level: NotificationLevel, needle: &str) -> bool {
        self.messages().iter().any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NotificationLevel, message: &str) {
        self.messages.lock().unwrap().push((level, message.to_string()));
    }
}
