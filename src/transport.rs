//! Transport lifecycle for the device link. The byte stream itself is owned
//! by the [`Device`](firestep_shared::Device); a transport only decides
//! whether the link at a serial path can be opened.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Serial path that never resolves to a device.
pub const NOT_FOUND_PATH: &str = "NOTFOUND";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No device found at {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings handed to the transport on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    pub serial_path: String,
    pub baud_rate: u32,
    pub launch_timeout: Duration,
}

#[async_trait]
pub trait Transport: Send {
    async fn open(&mut self, settings: &PortSettings) -> Result<(), TransportError>;
    async fn close(&mut self);
    fn is_open(&self) -> bool;
}

/// In-memory port used with a simulated device. Opening succeeds for any
/// path except [`NOT_FOUND_PATH`].
#[derive(Debug, Default)]
pub struct SimulatedPort {
    open: bool,
}

impl SimulatedPort {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for SimulatedPort {
    async fn open(&mut self, settings: &PortSettings) -> Result<(), TransportError> {
        if settings.serial_path == NOT_FOUND_PATH {
            self.open = false;
            return Err(TransportError::NotFound(settings.serial_path.clone()));
        }
        tracing::debug!(
            "Simulated port {} open at {} baud",
            settings.serial_path,
            settings.baud_rate
        );
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(path: &str) -> PortSettings {
        PortSettings {
            serial_path: path.to_string(),
            baud_rate: 19200,
            launch_timeout: Duration::from_millis(3000),
        }
    }

    #[tokio::test]
    async fn test_simulated_port_lifecycle() {
        let mut port = SimulatedPort::new();
        assert!(!port.is_open());
        port.open(&settings("/dev/ttyACM0")).await.unwrap();
        assert!(port.is_open());
        port.close().await;
        assert!(!port.is_open());
    }

    #[tokio::test]
    async fn test_not_found_path_fails() {
        let mut port = SimulatedPort::new();
        let err = port.open(&settings(NOT_FOUND_PATH)).await.unwrap_err();
        assert!(matches!(err, TransportError::NotFound(path) if path == "NOTFOUND"));
        assert!(!port.is_open());
    }
}
