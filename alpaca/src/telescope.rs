//! Alpaca Telescope endpoints used by the flip

use crate::{AlpacaClient, AlpacaDevice, AlpacaError, RetryConfig, TimeoutConfig};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// ASCOM EquatorialCoordinateType
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquatorialSystem {
    Other = 0,
    /// Topocentric, i.e. equinox of date
    Topocentric = 1,
    J2000 = 2,
    J2050 = 3,
    B1950 = 4,
}

impl From<i32> for EquatorialSystem {
    fn from(value: i32) -> Self {
        match value {
            1 => EquatorialSystem::Topocentric,
            2 => EquatorialSystem::J2000,
            3 => EquatorialSystem::J2050,
            4 => EquatorialSystem::B1950,
            _ => EquatorialSystem::Other,
        }
    }
}

/// How a slew wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlewWait {
    Completed,
    TimedOut,
    Cancelled,
}

pub struct AlpacaTelescope {
    client: AlpacaClient,
}

impl AlpacaTelescope {
    pub fn new(device: &AlpacaDevice) -> Result<Self, AlpacaError> {
        Ok(Self { client: AlpacaClient::new(device)? })
    }

    pub fn with_config(
        device: &AlpacaDevice,
        timeout_config: TimeoutConfig,
        retry_config: RetryConfig,
    ) -> Result<Self, AlpacaError> {
        Ok(Self { client: AlpacaClient::with_config(device, timeout_config, retry_config)? })
    }

    pub fn client(&self) -> &AlpacaClient {
        &self.client
    }

    // Connection

    pub async fn connected(&self) -> Result<bool, AlpacaError> {
        self.client.get_typed("connected").await
    }

    pub async fn set_connected(&self, connected: bool) -> Result<(), AlpacaError> {
        let value = if connected { "true" } else { "false" };
        self.client.put_void("connected", &[("Connected", value)]).await
    }

    // Position

    /// Hours
    pub async fn right_ascension(&self) -> Result<f64, AlpacaError> {
        self.client.get_typed("rightascension").await
    }

    /// Degrees
    pub async fn declination(&self) -> Result<f64, AlpacaError> {
        self.client.get_typed("declination").await
    }

    pub async fn equatorial_system(&self) -> Result<EquatorialSystem, AlpacaError> {
        let value: i32 = self.client.get_typed("equatorialsystem").await?;
        Ok(EquatorialSystem::from(value))
    }

    // Slewing

    pub async fn slewing(&self) -> Result<bool, AlpacaError> {
        self.client.get_typed("slewing").await
    }

    /// Start a slew and return immediately
    pub async fn slew_to_coordinates_async(&self, ra_hours: f64, dec_degrees: f64) -> Result<(), AlpacaError> {
        self.client
            .put_void(
                "slewtocoordinatesasync",
                &[
                    ("RightAscension", &ra_hours.to_string()),
                    ("Declination", &dec_degrees.to_string()),
                ],
            )
            .await
    }

    pub async fn abort_slew(&self) -> Result<(), AlpacaError> {
        self.client.put_void("abortslew", &[]).await
    }

    /// Poll `slewing` until it clears, the timeout passes, or `cancel` fires
    pub async fn wait_for_slew_complete(
        &self,
        poll_interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<SlewWait, AlpacaError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if !self.slewing().await? {
                return Ok(SlewWait::Completed);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(SlewWait::TimedOut);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(SlewWait::Cancelled),
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }

    // Raw commands

    /// Send a raw command and return the reply
    pub async fn command_string(&self, command: &str, raw: bool) -> Result<String, AlpacaError> {
        let raw = if raw { "true" } else { "false" };
        self.client
            .put_typed("commandstring", &[("Command", command), ("Raw", raw)])
            .await
    }

    /// Send a raw command that has no reply
    pub async fn command_blind(&self, command: &str, raw: bool) -> Result<(), AlpacaError> {
        let raw = if raw { "true" } else { "false" };
        self.client
            .put_void("commandblind", &[("Command", command), ("Raw", raw)])
            .await
    }
}
