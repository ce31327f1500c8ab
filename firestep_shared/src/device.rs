use async_trait::async_trait;
use thiserror::Error;

use crate::wire::{Command, Response, WireError};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device disconnected")]
    Disconnected,
    #[error("Malformed device reply: {0}")]
    Wire(#[from] WireError),
}

/// Anything that answers FireStep commands: the simulated protocol engine,
/// or a driver forwarding to real hardware.
///
/// The command queue awaits exactly one `respond` future at a time.
#[async_trait]
pub trait Device: Send {
    /// Driver name reported in channel status.
    fn name(&self) -> &str;

    async fn respond(&mut self, command: &Command) -> Result<Response, DeviceError>;
}

#[async_trait]
impl<D: Device + ?Sized> Device for Box<D> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn respond(&mut self, command: &Command) -> Result<Response, DeviceError> {
        (**self).respond(command).await
    }
}
