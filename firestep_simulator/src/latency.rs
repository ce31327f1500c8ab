use async_trait::async_trait;
use std::time::Duration;

use firestep_shared::device::{Device, DeviceError};
use firestep_shared::wire::{Command, Response};

/// Delays every reply of the wrapped device, standing in for the round
/// trip over a real serial link.
#[derive(Debug)]
pub struct LatencyDevice<D> {
    inner: D,
    latency: Duration,
}

impl<D: Device> LatencyDevice<D> {
    pub fn new(inner: D, latency: Duration) -> Self {
        Self { inner, latency }
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

#[async_trait]
impl<D: Device> Device for LatencyDevice<D> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn respond(&mut self, command: &Command) -> Result<Response, DeviceError> {
        tokio::time::sleep(self.latency).await;
        self.inner.respond(command).await
    }
}
