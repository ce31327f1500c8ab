use thiserror::Error;

use crate::transport::TransportError;
use firestep_shared::device::DeviceError;

/// Failures of the command channel itself. Command-level failures (unknown
/// commands, planner errors) are reported in-band as negative statuses.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Transport unavailable at {serial_path}: {source}")]
    TransportUnavailable {
        serial_path: String,
        #[source]
        source: TransportError,
    },
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Command queue worker has shut down")]
    WorkerGone,
}
