// firestep-rs: a serialized JSON command channel to FireStep motion
// controllers, with an in-process simulated device.

pub mod error;
pub mod events;
pub mod queue;
pub mod transport;

pub use error::ChannelError;
pub use events::{EventKind, QueueEvent};
pub use queue::{ChannelStatus, CommandQueue, Completion, HistoryEntry, QueueSettings};
pub use transport::{NOT_FOUND_PATH, PortSettings, SimulatedPort, Transport, TransportError};

pub use firestep_shared::{Command, Config, ConfigError, Response, load_config};
pub use firestep_simulator::ProtocolEngine;

/// Spawn a closed command queue in front of a simulated device built from
/// `config`.
pub fn simulated_queue(config: &Config) -> Result<CommandQueue, ConfigError> {
    config.validate()?;
    let kinematics = firestep_shared::create_kinematics(&config.kinematics)?;
    let engine = ProtocolEngine::new(kinematics);
    Ok(CommandQueue::spawn(
        QueueSettings::from(&config.device),
        engine,
        SimulatedPort::new(),
    ))
}
