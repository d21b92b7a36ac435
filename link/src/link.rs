//! DeviceLink: one command out, one cleaned reply back

use crate::{
    clean_response, format_debug, CommandFamily, ConnectionProperty, MountDevice, MountMediator,
};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace, warn};

/// Entry points chosen for the currently connected device
#[derive(Clone)]
struct Binding {
    device: Arc<dyn MountDevice>,
    family: Option<CommandFamily>,
    connection: Option<ConnectionProperty>,
}

/// Sends single commands to the connected mount and returns cleaned replies.
///
/// The command family and connection property are chosen the first time a
/// given device is seen and reused until that device reports itself
/// disconnected or the mediator hands out a different one.
///
/// Every failure is logged and reported as `None`/`false`; nothing is raised.
/// Round-trips are spawned onto the tokio runtime and awaited without a
/// timeout, so a transport that never answers stalls the awaiting caller.
pub struct DeviceLink {
    mediator: Option<Arc<dyn MountMediator>>,
    binding: Mutex<Option<Binding>>,
}

impl DeviceLink {
    pub fn new(mediator: Arc<dyn MountMediator>) -> Self {
        Self {
            mediator: Some(mediator),
            binding: Mutex::new(None),
        }
    }

    /// A link with no mediator; every command returns `None`
    pub fn detached() -> Self {
        Self {
            mediator: None,
            binding: Mutex::new(None),
        }
    }

    pub fn has_mediator(&self) -> bool {
        self.mediator.is_some()
    }

    /// Forget the chosen entry points; the next call probes again
    pub fn reset(&self) {
        *self.binding.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn bind(&self) -> Option<Binding> {
        let device = self.mediator.as_ref()?.device()?;
        let mut slot = self.binding.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = slot.as_ref() {
            if Arc::ptr_eq(&existing.device, &device) {
                return Some(existing.clone());
            }
        }

        let capabilities = device.capabilities();
        let binding = Binding {
            family: CommandFamily::select(&capabilities.command_families),
            connection: ConnectionProperty::select(&capabilities.connection_properties),
            device,
        };
        debug!(
            "MountLink: bound to {} (command: {:?}, connection: {:?})",
            binding.device.name(),
            binding.family,
            binding.connection
        );
        *slot = Some(binding.clone());
        Some(binding)
    }

    /// Whether the connected device reports itself connected
    pub async fn is_connected(&self) -> bool {
        let Some(binding) = self.bind() else {
            return false;
        };

        let Some(property) = binding.connection else {
            debug!("MountLink: {} exposes no connection property", binding.device.name());
            return false;
        };

        match binding.device.read_connection(property).await {
            Ok(true) => true,
            Ok(false) => {
                self.reset();
                false
            }
            Err(e) => {
                warn!("MountLink: connection check error: {}", e.chain());
                false
            }
        }
    }

    /// Send a command and return the reply with trailing framing removed
    pub async fn send(&self, command: &str) -> Option<String> {
        if self.mediator.is_none() {
            debug!("MountLink: mediator not available");
            return None;
        }

        if command.is_empty() {
            debug!("MountLink: empty command");
            return None;
        }

        let Some(binding) = self.bind() else {
            debug!("MountLink: no device connected");
            return None;
        };

        let Some(family) = binding.family else {
            warn!(
                "MountLink: {} exposes no command entry point",
                binding.device.name()
            );
            return None;
        };

        let framed = family.normalize(command);
        debug!("MountLink: sending {} via {}", framed, family);

        let device = binding.device.clone();
        let worker = tokio::spawn(async move { device.execute(family, &framed).await });

        let reply = match worker.await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("MountLink: command error: {}", e.chain());
                return None;
            }
            Err(e) => {
                warn!("MountLink: command worker failed: {}", e);
                return None;
            }
        };

        trace!("MountLink: raw response -> '{}'", format_debug(reply.as_deref()));

        let cleaned = reply.as_deref().map(clean_response).unwrap_or_default();
        if cleaned.is_empty() {
            debug!("MountLink: no response from device");
            return None;
        }

        Some(cleaned.to_string())
    }
}
