// firestep_shared: wire types, kinematics and configuration shared by the
// command channel and the simulated device.

pub mod config;
pub mod device;
pub mod kinematics;
pub mod position;
pub mod wire;

pub use config::{Config, ConfigError, DeviceConfig, KinematicsConfig, load_config};
pub use device::{Device, DeviceError};
pub use kinematics::{
    CoreXyKinematics, Envelope, FixedRatioKinematics, GeometryKind, GeometryModule, Kinematics,
    KinematicsError, Mechanics, MtoXyzKinematics, create_kinematics,
};
pub use position::{Axis, MachineState, Travel, Xyz};
pub use wire::{Command, CommandKind, Response, WireError};
