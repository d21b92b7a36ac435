//! Safe-Time Meridian Flip Sequencer
//!
//! Polls the mount for its remaining safe tracking time, predicts when a
//! flip will be needed, and runs the flip (pause guiding, slew, autofocus,
//! recenter, resume guiding) once the reading drops to the configured
//! threshold.
//!
//! The host drives everything: it calls [`SafeTimeTrigger::evaluate`] on
//! each scheduler tick and [`SafeTimeTrigger::execute`] when that returns
//! true. Nothing here owns a timer or a background task.

pub mod config;
pub mod coordinates;
pub mod device_ops;
pub mod error;
pub mod flip;
pub mod state;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use config::*;
pub use coordinates::*;
pub use device_ops::*;
pub use error::*;
pub use flip::*;
pub use state::*;
pub use trigger::*;

pub use tokio_util::sync::CancellationToken;

/// Progress callback in the sequencer's `(percent, message)` style
pub type ProgressFn<'a> = &'a (dyn Fn(f64, String) + Send + Sync);
