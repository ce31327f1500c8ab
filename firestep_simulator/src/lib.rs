// firestep_simulator: an in-process FireStep device for the command channel.

pub mod engine;
pub mod latency;

pub use engine::{PROTOCOL_VERSION, ProtocolEngine};
pub use latency::LatencyDevice;
