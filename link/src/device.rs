//! Driver-facing seams
//!
//! A [`MountDevice`] is one connected mount driver. It declares up front
//! which command families and connection properties it exposes, so the link
//! can pick an entry point once per connection instead of probing on every
//! call. A [`MountMediator`] hands out whichever device is currently
//! connected.

use crate::{CommandFamily, ConnectionProperty, LinkError};
use async_trait::async_trait;
use std::sync::Arc;

/// What a connected driver exposes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub command_families: Vec<CommandFamily>,
    pub connection_properties: Vec<ConnectionProperty>,
}

impl DeviceCapabilities {
    pub fn new(
        command_families: impl Into<Vec<CommandFamily>>,
        connection_properties: impl Into<Vec<ConnectionProperty>>,
    ) -> Self {
        Self {
            command_families: command_families.into(),
            connection_properties: connection_properties.into(),
        }
    }
}

#[async_trait]
pub trait MountDevice: Send + Sync {
    /// Driver name for logs
    fn name(&self) -> String;

    fn capabilities(&self) -> DeviceCapabilities;

    /// Read a connection-state property
    async fn read_connection(&self, property: ConnectionProperty) -> Result<bool, LinkError>;

    /// Send an already-framed command through the given family.
    ///
    /// `Ok(None)` means the driver returned nothing.
    async fn execute(&self, family: CommandFamily, command: &str) -> Result<Option<String>, LinkError>;
}

/// Source of the currently connected mount driver
pub trait MountMediator: Send + Sync {
    fn device(&self) -> Option<Arc<dyn MountDevice>>;
}
