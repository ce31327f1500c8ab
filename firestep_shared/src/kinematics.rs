// firestep_shared/src/kinematics.rs
//! Conversion between actuator pulse space and cartesian machine space.
//!
//! Two strategies sit behind the [`Kinematics`] trait:
//!
//! - fixed ratio: one scalar travel (machine units per pulse) per axis,
//! - full kinematics modules: geometry-specific forward/inverse functions
//!   ([`MtoXyzKinematics`], [`CoreXyKinematics`], or a caller-supplied
//!   [`GeometryModule`]).
//!
//! Callers treat every strategy as opaque. Inverse conversion rounds to the
//! nearest whole pulse, so a forward conversion of the result is not
//! guaranteed to reproduce the requested coordinate.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ConfigError, KinematicsConfig};
use crate::position::{Axis, MachineState, Travel, Xyz};

/// `sys.to` topology code reported by cartesian geometries.
pub const TOPOLOGY_CARTESIAN: u32 = 2;
/// `sys.to` topology code reported by CoreXY geometries.
pub const TOPOLOGY_COREXY: u32 = 3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KinematicsError {
    #[error("{axis} target is not a finite number")]
    NonFinite { axis: Axis },
    #[error("{axis} target {value} is outside the machine envelope [{min}, {max}]")]
    OutOfBounds {
        axis: Axis,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{axis} target overflows the pulse counter")]
    Overflow { axis: Axis },
}

/// Kinematics handler shared by the protocol engine and its callers.
pub trait Kinematics: KinematicsClone + Send + Sync + fmt::Debug {
    /// Geometry name, used to derive the device's `app` identity.
    fn name(&self) -> &str;

    /// Forward conversion: motor pulses to cartesian coordinates.
    fn pulses_to_xyz(&self, pulses: &MachineState) -> Xyz;

    /// Inverse conversion: cartesian coordinates to the nearest motor pulses.
    fn xyz_to_pulses(&self, xyz: &Xyz) -> Result<MachineState, KinematicsError>;

    /// Static machine envelope reported for `dim`.
    fn dimensions(&self) -> Value;

    /// Static system descriptor reported for `sys`.
    fn system(&self) -> Value;
}

pub trait KinematicsClone {
    fn clone_box(&self) -> Box<dyn Kinematics>;
}

impl<T> KinematicsClone for T
where
    T: 'static + Kinematics + Clone,
{
    fn clone_box(&self) -> Box<dyn Kinematics> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn Kinematics> {
    fn clone(&self) -> Box<dyn Kinematics> {
        self.clone_box()
    }
}

/// Nearest whole pulse count for `metric / travel`, rounding half away
/// from zero.
pub fn round_pulses(axis: Axis, metric: f64, travel: f64) -> Result<i64, KinematicsError> {
    let ratio = metric / travel;
    if !ratio.is_finite() {
        return Err(KinematicsError::NonFinite { axis });
    }
    let pulses = ratio.round();
    if pulses < i64::MIN as f64 || pulses >= i64::MAX as f64 {
        return Err(KinematicsError::Overflow { axis });
    }
    Ok(pulses as i64)
}

/// Drive train constants of one stepper axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mechanics {
    pub microsteps: u32,
    pub steps_per_revolution: u32,
    /// Pulley teeth on a 2 mm pitch belt.
    pub teeth: u32,
}

impl Default for Mechanics {
    fn default() -> Self {
        Self {
            microsteps: 16,
            steps_per_revolution: 200,
            teeth: 16,
        }
    }
}

impl Mechanics {
    /// Machine units per pulse.
    pub fn travel(&self) -> f64 {
        f64::from(self.teeth) * 2.0 / (f64::from(self.microsteps) * f64::from(self.steps_per_revolution))
    }
}

/// Reachable `[min, max]` range of each cartesian axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub x: [f64; 2],
    pub y: [f64; 2],
    pub z: [f64; 2],
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            x: [-200.0, 200.0],
            y: [-200.0, 200.0],
            z: [-200.0, 200.0],
        }
    }
}

impl Envelope {
    pub fn limits(&self, axis: Axis) -> [f64; 2] {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn check(&self, xyz: &Xyz) -> Result<(), KinematicsError> {
        for axis in Axis::ALL {
            let value = xyz.get(axis);
            if !value.is_finite() {
                return Err(KinematicsError::NonFinite { axis });
            }
            let [min, max] = self.limits(axis);
            if value < min || value > max {
                return Err(KinematicsError::OutOfBounds {
                    axis,
                    value,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }
}

/// Fixed-ratio kinematics: each motor drives one axis at a constant travel.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedRatioKinematics {
    travel: Travel,
}

impl FixedRatioKinematics {
    pub fn new(travel: Travel) -> Self {
        Self { travel }
    }

    pub fn from_mechanics(mechanics: &Mechanics) -> Self {
        Self::new(Travel::uniform(mechanics.travel()))
    }

    pub fn travel(&self) -> Travel {
        self.travel
    }
}

impl Kinematics for FixedRatioKinematics {
    fn name(&self) -> &str {
        "cartesian"
    }

    fn pulses_to_xyz(&self, pulses: &MachineState) -> Xyz {
        Xyz::new(
            pulses.p1 as f64 * self.travel.x,
            pulses.p2 as f64 * self.travel.y,
            pulses.p3 as f64 * self.travel.z,
        )
    }

    fn xyz_to_pulses(&self, xyz: &Xyz) -> Result<MachineState, KinematicsError> {
        Ok(MachineState::new(
            round_pulses(Axis::X, xyz.x, self.travel.x)?,
            round_pulses(Axis::Y, xyz.y, self.travel.y)?,
            round_pulses(Axis::Z, xyz.z, self.travel.z)?,
        ))
    }

    fn dimensions(&self) -> Value {
        json!({ "tr": { "x": self.travel.x, "y": self.travel.y, "z": self.travel.z } })
    }

    fn system(&self) -> Value {
        json!({ "to": TOPOLOGY_CARTESIAN })
    }
}

/// Cartesian geometry module with explicit drive mechanics and a bounded
/// work envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct MtoXyzKinematics {
    mechanics: Mechanics,
    envelope: Envelope,
}

impl MtoXyzKinematics {
    pub fn new(mechanics: Mechanics, envelope: Envelope) -> Self {
        Self { mechanics, envelope }
    }
}

impl Kinematics for MtoXyzKinematics {
    fn name(&self) -> &str {
        "MTO_XYZ"
    }

    fn pulses_to_xyz(&self, pulses: &MachineState) -> Xyz {
        let travel = self.mechanics.travel();
        Xyz::new(
            pulses.p1 as f64 * travel,
            pulses.p2 as f64 * travel,
            pulses.p3 as f64 * travel,
        )
    }

    fn xyz_to_pulses(&self, xyz: &Xyz) -> Result<MachineState, KinematicsError> {
        self.envelope.check(xyz)?;
        let travel = self.mechanics.travel();
        Ok(MachineState::new(
            round_pulses(Axis::X, xyz.x, travel)?,
            round_pulses(Axis::Y, xyz.y, travel)?,
            round_pulses(Axis::Z, xyz.z, travel)?,
        ))
    }

    fn dimensions(&self) -> Value {
        json!({
            "mp": self.mechanics.microsteps,
            "st": self.mechanics.steps_per_revolution,
            "tn": self.mechanics.teeth,
            "tr": self.mechanics.travel(),
            "xmin": self.envelope.x[0],
            "xmax": self.envelope.x[1],
            "ymin": self.envelope.y[0],
            "ymax": self.envelope.y[1],
            "zmin": self.envelope.z[0],
            "zmax": self.envelope.z[1],
        })
    }

    fn system(&self) -> Value {
        json!({ "to": TOPOLOGY_CARTESIAN, "mto": self.name() })
    }
}

/// CoreXY kinematics: motors A and B share the X/Y gantry.
///
/// ```text
/// A = X + Y        X = (A + B) / 2
/// B = X - Y        Y = (A - B) / 2
/// C = Z            Z = C
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CoreXyKinematics {
    travel: f64,
}

impl CoreXyKinematics {
    pub fn new(travel: f64) -> Self {
        Self { travel }
    }
}

impl Kinematics for CoreXyKinematics {
    fn name(&self) -> &str {
        "corexy"
    }

    fn pulses_to_xyz(&self, pulses: &MachineState) -> Xyz {
        let a = pulses.p1 as f64 * self.travel;
        let b = pulses.p2 as f64 * self.travel;
        Xyz::new((a + b) / 2.0, (a - b) / 2.0, pulses.p3 as f64 * self.travel)
    }

    fn xyz_to_pulses(&self, xyz: &Xyz) -> Result<MachineState, KinematicsError> {
        Ok(MachineState::new(
            round_pulses(Axis::X, xyz.x + xyz.y, self.travel)?,
            round_pulses(Axis::Y, xyz.x - xyz.y, self.travel)?,
            round_pulses(Axis::Z, xyz.z, self.travel)?,
        ))
    }

    fn dimensions(&self) -> Value {
        json!({ "tr": self.travel })
    }

    fn system(&self) -> Value {
        json!({ "to": TOPOLOGY_COREXY })
    }
}

pub type ForwardFn = Arc<dyn Fn(&MachineState) -> Xyz + Send + Sync>;
pub type InverseFn = Arc<dyn Fn(&Xyz) -> Result<MachineState, KinematicsError> + Send + Sync>;

/// Geometry supplied by the caller as a pair of opaque functions, for
/// machines whose linkage is not covered by the built-in modules.
#[derive(Clone)]
pub struct GeometryModule {
    name: String,
    forward: ForwardFn,
    inverse: InverseFn,
    dimensions: Value,
    system: Value,
}

impl GeometryModule {
    pub fn new<F, I>(name: impl Into<String>, forward: F, inverse: I) -> Self
    where
        F: Fn(&MachineState) -> Xyz + Send + Sync + 'static,
        I: Fn(&Xyz) -> Result<MachineState, KinematicsError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            forward: Arc::new(forward),
            inverse: Arc::new(inverse),
            dimensions: Value::Object(Default::default()),
            system: Value::Object(Default::default()),
        }
    }

    pub fn with_system(mut self, system: Value) -> Self {
        self.system = system;
        self
    }
}

impl fmt::Debug for GeometryModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeometryModule")
            .field("name", &self.name)
            .field("system", &self.system)
            .finish_non_exhaustive()
    }
}

impl Kinematics for GeometryModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn pulses_to_xyz(&self, pulses: &MachineState) -> Xyz {
        (self.forward)(pulses)
    }

    fn xyz_to_pulses(&self, xyz: &Xyz) -> Result<MachineState, KinematicsError> {
        (self.inverse)(xyz)
    }

    fn dimensions(&self) -> Value {
        self.dimensions.clone()
    }

    fn system(&self) -> Value {
        self.system.clone()
    }
}

/// Built-in full kinematics modules selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    #[serde(rename = "mto-xyz")]
    MtoXyz,
    #[serde(rename = "corexy")]
    CoreXy,
}

/// Factory for creating kinematics handlers from configuration.
///
/// A configured `module` selects full kinematics; otherwise an explicit
/// `travel` or the drive mechanics select fixed-ratio kinematics.
pub fn create_kinematics(config: &KinematicsConfig) -> Result<Box<dyn Kinematics>, ConfigError> {
    config.validate()?;
    let mechanics = config.mechanics();
    let kinematics: Box<dyn Kinematics> = match (config.module, config.travel) {
        (Some(GeometryKind::MtoXyz), _) => Box::new(MtoXyzKinematics::new(mechanics, config.envelope)),
        (Some(GeometryKind::CoreXy), _) => Box::new(CoreXyKinematics::new(mechanics.travel())),
        (None, Some(travel)) => Box::new(FixedRatioKinematics::new(travel)),
        (None, None) => Box::new(FixedRatioKinematics::from_mechanics(&mechanics)),
    };
    tracing::debug!("Kinematics: {}", kinematics.name());
    Ok(kinematics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) {
        assert!((a - b).abs() <= 1e-9, "expected {b}, got {a}");
    }

    #[test]
    fn test_default_mechanics_travel() {
        assert_eq!(Mechanics::default().travel(), 0.01);
    }

    #[test]
    fn test_fixed_ratio_rounding_is_lossy() {
        let kinematics = FixedRatioKinematics::from_mechanics(&Mechanics::default());
        let pulses = kinematics.xyz_to_pulses(&Xyz::new(1.0, 2.0, 3.485)).unwrap();
        assert_eq!(pulses, MachineState::new(100, 200, 349));
        let xyz = kinematics.pulses_to_xyz(&pulses);
        assert_eq!(xyz, Xyz::new(1.0, 2.0, 3.49));
    }

    #[test]
    fn test_rounds_half_away_from_zero() {
        assert_eq!(round_pulses(Axis::X, 3.485, 0.01), Ok(349));
        assert_eq!(round_pulses(Axis::X, -3.485, 0.01), Ok(-349));
        assert_eq!(round_pulses(Axis::Y, 0.004, 0.01), Ok(0));
    }

    #[test]
    fn test_round_rejects_non_finite_and_overflow() {
        assert_eq!(
            round_pulses(Axis::Z, f64::NAN, 0.01),
            Err(KinematicsError::NonFinite { axis: Axis::Z })
        );
        assert_eq!(
            round_pulses(Axis::Z, 1.0, 0.0),
            Err(KinematicsError::NonFinite { axis: Axis::Z })
        );
        assert_eq!(
            round_pulses(Axis::X, 1e300, 0.01),
            Err(KinematicsError::Overflow { axis: Axis::X })
        );
    }

    #[test]
    fn test_mto_xyz_rejects_targets_outside_envelope() {
        let kinematics = MtoXyzKinematics::new(Mechanics::default(), Envelope::default());
        let err = kinematics.xyz_to_pulses(&Xyz::new(0.0, 250.0, 0.0)).unwrap_err();
        assert!(matches!(err, KinematicsError::OutOfBounds { axis: Axis::Y, .. }));
        let pulses = kinematics.xyz_to_pulses(&Xyz::new(-10.0, 20.0, 0.5)).unwrap();
        assert_eq!(pulses, MachineState::new(-1000, 2000, 50));
        assert_eq!(kinematics.system()["to"], TOPOLOGY_CARTESIAN);
        assert_eq!(kinematics.dimensions()["mp"], 16);
    }

    #[test]
    fn test_corexy_round_trip() {
        let kinematics = CoreXyKinematics::new(0.01);
        let pulses = kinematics.xyz_to_pulses(&Xyz::new(10.0, 5.0, 1.0)).unwrap();
        assert_eq!(pulses, MachineState::new(1500, 500, 100));
        let xyz = kinematics.pulses_to_xyz(&pulses);
        approx_eq(xyz.x, 10.0);
        approx_eq(xyz.y, 5.0);
        approx_eq(xyz.z, 1.0);
    }

    #[test]
    fn test_geometry_module_is_opaque() {
        // Quadratic z lift: z = (p3 / 100)^2
        let module = GeometryModule::new(
            "lift",
            |p: &MachineState| Xyz::new(p.p1 as f64, p.p2 as f64, (p.p3 as f64 / 100.0).powi(2)),
            |xyz: &Xyz| {
                Ok(MachineState::new(
                    round_pulses(Axis::X, xyz.x, 1.0)?,
                    round_pulses(Axis::Y, xyz.y, 1.0)?,
                    round_pulses(Axis::Z, xyz.z.sqrt() * 100.0, 1.0)?,
                ))
            },
        )
        .with_system(json!({"to": 99}));
        let boxed: Box<dyn Kinematics> = Box::new(module);
        let cloned = boxed.clone();
        let pulses = cloned.xyz_to_pulses(&Xyz::new(1.0, 2.0, 4.0)).unwrap();
        assert_eq!(pulses, MachineState::new(1, 2, 200));
        approx_eq(cloned.pulses_to_xyz(&pulses).z, 4.0);
        assert_eq!(cloned.name(), "lift");
        assert_eq!(cloned.system(), json!({"to": 99}));
    }

    #[test]
    fn test_factory_selects_strategy() {
        let fixed = create_kinematics(&KinematicsConfig::default()).unwrap();
        assert_eq!(fixed.name(), "cartesian");

        let config = KinematicsConfig {
            travel: Some(Travel { x: 0.02, y: 0.01, z: 0.005 }),
            ..Default::default()
        };
        let custom = create_kinematics(&config).unwrap();
        assert_eq!(custom.xyz_to_pulses(&Xyz::new(1.0, 1.0, 1.0)).unwrap(), MachineState::new(50, 100, 200));

        let config = KinematicsConfig {
            module: Some(GeometryKind::CoreXy),
            ..Default::default()
        };
        assert_eq!(create_kinematics(&config).unwrap().name(), "corexy");

        let config = KinematicsConfig {
            module: Some(GeometryKind::MtoXyz),
            travel: Some(Travel::uniform(0.01)),
            ..Default::default()
        };
        assert!(matches!(create_kinematics(&config), Err(ConfigError::Invalid(_))));
    }
}
