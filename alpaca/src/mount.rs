//! Alpaca mount adapter
//!
//! [`AlpacaMount`] is the mediator: it hands out its device only while
//! attached. [`AlpacaMountDevice`] carries the real work for both seams,
//! raw `CommandString` for the safe-time link and pointing/slew for the flip.

use crate::{AlpacaDevice, AlpacaError, AlpacaTelescope, EquatorialSystem, SlewWait};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use safeflip_link::{
    CommandFamily, ConnectionProperty, DeviceCapabilities, LinkError, MountDevice, MountMediator,
};
use safeflip_sequencer::{Coordinates, Epoch, OpResult, TelescopeOps};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SLEW_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct AlpacaMountDevice {
    telescope: AlpacaTelescope,
    name: String,
}

impl AlpacaMountDevice {
    pub fn new(device: &AlpacaDevice) -> Result<Self, AlpacaError> {
        Ok(Self { telescope: AlpacaTelescope::new(device)?, name: device.display_name() })
    }

    pub fn telescope(&self) -> &AlpacaTelescope {
        &self.telescope
    }

    /// Epoch the mount reports and expects coordinates in
    async fn epoch(&self) -> Epoch {
        match self.telescope.equatorial_system().await {
            Ok(system) => epoch_for(system),
            Err(e) => {
                tracing::debug!("equatorialsystem unavailable, assuming JNow: {}", e);
                Epoch::JNow
            }
        }
    }
}

fn epoch_for(system: EquatorialSystem) -> Epoch {
    match system {
        EquatorialSystem::J2000 => Epoch::J2000,
        _ => Epoch::JNow,
    }
}

fn link_error(operation: &str, err: AlpacaError) -> LinkError {
    match err {
        e if e.is_not_connected() => LinkError::NotConnected,
        AlpacaError::DeviceError { message, .. } => LinkError::Device(message),
        e => LinkError::transport_with(operation, e),
    }
}

#[async_trait]
impl MountDevice for AlpacaMountDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::new([CommandFamily::CommandString], [ConnectionProperty::Connected])
    }

    async fn read_connection(&self, property: ConnectionProperty) -> Result<bool, LinkError> {
        match property {
            ConnectionProperty::Connected => {
                self.telescope.connected().await.map_err(|e| link_error("connected", e))
            }
            other => Err(LinkError::PropertyUnavailable(other)),
        }
    }

    async fn execute(&self, family: CommandFamily, command: &str) -> Result<Option<String>, LinkError> {
        match family {
            CommandFamily::CommandString => self
                .telescope
                .command_string(command, true)
                .await
                .map(Some)
                .map_err(|e| link_error("commandstring", e)),
            other => Err(LinkError::Unsupported(other)),
        }
    }
}

#[async_trait]
impl TelescopeOps for AlpacaMountDevice {
    async fn pointing(&self) -> OpResult<Option<Coordinates>> {
        let ra = self.telescope.right_ascension().await.context("rightascension")?;
        let dec = self.telescope.declination().await.context("declination")?;
        Ok(Some(Coordinates::new(ra, dec, self.epoch().await)))
    }

    async fn slew_to(&self, target: &Coordinates, cancel: &CancellationToken) -> OpResult<()> {
        let target = match self.epoch().await {
            Epoch::J2000 => target.to_j2000(Utc::now()),
            Epoch::JNow => target.to_jnow(Utc::now()),
        };
        tracing::debug!("Alpaca slew to {}", target);

        self.telescope
            .slew_to_coordinates_async(target.ra_hours, target.dec_degrees)
            .await
            .context("slewtocoordinatesasync")?;

        let timeout = Duration::from_millis(self.telescope.client().timeout_config().slew_complete_ms);
        let outcome = self
            .telescope
            .wait_for_slew_complete(SLEW_POLL_INTERVAL, timeout, cancel)
            .await
            .context("slewing")?;

        match outcome {
            SlewWait::Completed => Ok(()),
            SlewWait::TimedOut | SlewWait::Cancelled => {
                if let Err(e) = self.telescope.abort_slew().await {
                    tracing::warn!("abortslew failed: {}", e);
                }
                anyhow::bail!("Slew {:?}", outcome)
            }
        }
    }
}

/// Mediator over one Alpaca telescope
pub struct AlpacaMount {
    device: Arc<AlpacaMountDevice>,
    attached: AtomicBool,
}

impl AlpacaMount {
    pub fn new(device: &AlpacaDevice) -> Result<Self, AlpacaError> {
        Ok(Self { device: Arc::new(AlpacaMountDevice::new(device)?), attached: AtomicBool::new(false) })
    }

    /// Connect the driver and start handing it out
    pub async fn connect(&self) -> Result<(), AlpacaError> {
        self.device.telescope.set_connected(true).await?;
        self.attached.store(true, Ordering::SeqCst);
        tracing::info!("Connected to Alpaca mount {}", self.device.name);
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), AlpacaError> {
        self.attached.store(false, Ordering::SeqCst);
        self.device.telescope.set_connected(false).await?;
        tracing::info!("Disconnected from Alpaca mount {}", self.device.name);
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// The telescope collaborator for the flip sequence
    pub fn telescope_ops(&self) -> Arc<dyn TelescopeOps> {
        self.device.clone()
    }
}

impl MountMediator for AlpacaMount {
    fn device(&self) -> Option<Arc<dyn MountDevice>> {
        if self.is_attached() {
            Some(self.device.clone())
        } else {
            None
        }
    }
}
