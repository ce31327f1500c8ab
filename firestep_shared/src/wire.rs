//! FireStep wire format: one JSON object per command, one `{s, r, t}`
//! envelope per reply.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::position::Axis;

pub const STATUS_OK: i32 = 0;
/// Target cannot be represented in pulse space (non-finite, outside the
/// machine envelope, or overflowing a pulse counter).
pub const STATUS_POSITION_ERROR: i32 = -120;
/// None of the command keys is known to the device.
pub const STATUS_UNRECOGNIZED_NAME: i32 = -402;
/// A command parameter is missing or has the wrong type.
pub const STATUS_FIELD_TYPE: i32 = -403;
/// The command name is known, but this device does not implement it.
pub const STATUS_NOT_IMPLEMENTED: i32 = -431;
/// Relative moves are rejected by the planner.
pub const STATUS_PLANNER_ERROR: i32 = -450;

/// Reported `t` for replies that carry no planned traversal time.
pub const DEFAULT_SECONDS: f64 = 0.001;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("command must be a JSON object, got: {0}")]
    NotAnObject(String),
}

/// Command kinds understood by the channel, selected by the primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Identify,
    Home,
    MoveRelative(Axis),
    MoveAbsolute,
    DeltaVelocityStroke,
    QueryPosition,
    QueryDimensions,
    QuerySystem,
    Comment,
    DisplaySettings,
    /// A FireStep command name this device recognises but does not model.
    Unsupported(&'static str),
    Unknown,
}

/// Primary keys in precedence order; the first one present wins.
const KIND_KEYS: &[(&str, CommandKind)] = &[
    ("id", CommandKind::Identify),
    ("hom", CommandKind::Home),
    ("movxr", CommandKind::MoveRelative(Axis::X)),
    ("movyr", CommandKind::MoveRelative(Axis::Y)),
    ("movzr", CommandKind::MoveRelative(Axis::Z)),
    ("mov", CommandKind::MoveAbsolute),
    ("dvs", CommandKind::DeltaVelocityStroke),
    ("mpo", CommandKind::QueryPosition),
    ("dim", CommandKind::QueryDimensions),
    ("sys", CommandKind::QuerySystem),
    ("cmt", CommandKind::Comment),
    ("dpyds", CommandKind::DisplaySettings),
];

/// FireStep names outside the simulated vocabulary.
pub const UNSUPPORTED_KEYS: &[&str] = &["cal", "eep", "idl", "io", "pgm", "prb", "tst"];

impl CommandKind {
    /// The wire key for this kind, if it has one.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            CommandKind::Unsupported(name) => Some(*name),
            CommandKind::Unknown => None,
            kind => KIND_KEYS.iter().find(|(_, k)| k == kind).map(|(key, _)| *key),
        }
    }
}

/// A single device command: a JSON object keyed by command name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(Map<String, Value>);

impl Command {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        let mut map = Map::new();
        map.insert(key.into(), value);
        Self(map)
    }

    pub fn identify() -> Self {
        Self::new("id", Value::String(String::new()))
    }

    pub fn home() -> Self {
        Self::new("hom", Value::String(String::new()))
    }

    /// Absolute move; omitted axes keep their current position.
    pub fn move_to(x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Self {
        let mut target = Map::new();
        for (name, value) in [("x", x), ("y", y), ("z", z)] {
            if let Some(value) = value {
                target.insert(name.to_string(), Value::from(value));
            }
        }
        Self::new("mov", Value::Object(target))
    }

    /// Delta velocity stroke: raw per-axis pulse deltas over `micros`.
    pub fn delta_velocity_stroke(dp: [i64; 3], micros: u64) -> Self {
        let mut dvs = Map::new();
        dvs.insert("dp".to_string(), Value::from(dp.to_vec()));
        dvs.insert("us".to_string(), Value::from(micros));
        Self::new("dvs", Value::Object(dvs))
    }

    pub fn query_position() -> Self {
        Self::new("mpo", Value::String(String::new()))
    }

    pub fn query_dimensions() -> Self {
        Self::new("dim", Value::String(String::new()))
    }

    pub fn query_system() -> Self {
        Self::new("sys", Value::String(String::new()))
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self::new("cmt", Value::String(text.into()))
    }

    pub fn kind(&self) -> CommandKind {
        if let Some((_, kind)) = KIND_KEYS.iter().find(|(key, _)| self.0.contains_key(*key)) {
            return *kind;
        }
        UNSUPPORTED_KEYS
            .iter()
            .find(|key| self.0.contains_key(**key))
            .map_or(CommandKind::Unknown, |key| CommandKind::Unsupported(*key))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Parse one wire line into a command.
    pub fn parse(line: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(line.trim())?;
        Self::try_from(value)
    }
}

impl From<Map<String, Value>> for Command {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Command {
    type Error = WireError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(WireError::NotAnObject(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&line)
    }
}

/// Reply envelope. `s == 0` is success, negative values are error codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "s")]
    pub status: i32,
    #[serde(rename = "r")]
    pub result: Value,
    #[serde(rename = "t")]
    pub seconds: f64,
}

impl Response {
    pub fn new(status: i32, result: Value) -> Self {
        Self {
            status,
            result,
            seconds: DEFAULT_SECONDS,
        }
    }

    pub fn ok(result: Value) -> Self {
        Self::new(STATUS_OK, result)
    }

    /// Reply with `status` that echoes the command back as its result.
    pub fn echo(status: i32, command: &Command) -> Self {
        Self::new(status, command.to_value())
    }

    pub fn with_seconds(mut self, seconds: f64) -> Self {
        self.seconds = seconds;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn parse(line: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_from_primary_key() {
        assert_eq!(Command::identify().kind(), CommandKind::Identify);
        assert_eq!(Command::move_to(Some(1.0), None, None).kind(), CommandKind::MoveAbsolute);
        assert_eq!(
            Command::new("movyr", json!(2)).kind(),
            CommandKind::MoveRelative(Axis::Y)
        );
        assert_eq!(Command::new("prb", json!("")).kind(), CommandKind::Unsupported("prb"));
        assert_eq!(Command::new("bogus", json!("")).kind(), CommandKind::Unknown);
        assert_eq!(Command::default().kind(), CommandKind::Unknown);
    }

    #[test]
    fn test_relative_key_takes_precedence_over_mov() {
        let cmd = Command::try_from(json!({"mov": {"x": 1}, "movxr": 3})).unwrap();
        assert_eq!(cmd.kind(), CommandKind::MoveRelative(Axis::X));
    }

    #[test]
    fn test_kind_key() {
        assert_eq!(CommandKind::QueryPosition.key(), Some("mpo"));
        assert_eq!(CommandKind::Unsupported("tst").key(), Some("tst"));
        assert_eq!(CommandKind::Unknown.key(), None);
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert!(matches!(Command::parse("[1,2]"), Err(WireError::NotAnObject(_))));
        assert!(matches!(Command::parse("{\"id\":"), Err(WireError::Json(_))));
        let cmd = Command::parse(" {\"hom\":\"\"}\n").unwrap();
        assert_eq!(cmd.kind(), CommandKind::Home);
    }

    #[test]
    fn test_response_wire_names() {
        let response = Response::ok(json!({"app": "mock-cartesian", "ver": 1.0}));
        let line = response.to_string();
        assert!(line.contains("\"s\":0"));
        assert!(line.contains("\"t\":0.001"));
        let parsed = Response::parse(&line).unwrap();
        assert_eq!(parsed, response);
        assert!(parsed.is_ok());
    }

    #[test]
    fn test_echo_keeps_command() {
        let cmd = Command::comment("hello");
        let response = Response::echo(STATUS_UNRECOGNIZED_NAME, &cmd);
        assert_eq!(response.result, json!({"cmt": "hello"}));
        assert!(!response.is_ok());
    }
}
