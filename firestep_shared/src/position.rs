//! Pulse-space and cartesian position types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn name(&self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw actuator position, one pulse counter per motor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineState {
    #[serde(rename = "1")]
    pub p1: i64,
    #[serde(rename = "2")]
    pub p2: i64,
    #[serde(rename = "3")]
    pub p3: i64,
}

impl MachineState {
    pub const HOME: MachineState = MachineState { p1: 0, p2: 0, p3: 0 };

    pub fn new(p1: i64, p2: i64, p3: i64) -> Self {
        Self { p1, p2, p3 }
    }

    pub fn to_array(&self) -> [i64; 3] {
        [self.p1, self.p2, self.p3]
    }

    /// Adds per-motor deltas, `None` if any counter would overflow.
    pub fn checked_offset(&self, delta: [i64; 3]) -> Option<Self> {
        Some(Self {
            p1: self.p1.checked_add(delta[0])?,
            p2: self.p2.checked_add(delta[1])?,
            p3: self.p3.checked_add(delta[2])?,
        })
    }

    /// `{"1": p1, "2": p2, "3": p3}` as a JSON map.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("1".to_string(), Value::from(self.p1));
        map.insert("2".to_string(), Value::from(self.p2));
        map.insert("3".to_string(), Value::from(self.p3));
        map
    }
}

/// Cartesian position in machine units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Xyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Xyz {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
    }
}

/// Metric distance per pulse, per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Travel {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Travel {
    pub fn uniform(travel: f64) -> Self {
        Self {
            x: travel,
            y: travel,
            z: travel,
        }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}
