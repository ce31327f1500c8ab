//! Simulated FireStep device: interprets each command against an in-memory
//! pulse position and answers with a status-coded envelope.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use firestep_shared::device::{Device, DeviceError};
use firestep_shared::kinematics::Kinematics;
use firestep_shared::position::{Axis, MachineState};
use firestep_shared::wire::{
    Command, CommandKind, DEFAULT_SECONDS, Response, STATUS_FIELD_TYPE, STATUS_NOT_IMPLEMENTED, STATUS_OK,
    STATUS_PLANNER_ERROR, STATUS_POSITION_ERROR, STATUS_UNRECOGNIZED_NAME,
};

/// Protocol version reported by `id`.
pub const PROTOCOL_VERSION: f64 = 1.0;

/// Relative axis keys inside a `mov` body; the planner rejects them.
const RELATIVE_MOVE_KEYS: [&str; 3] = ["xr", "yr", "zr"];

/// A reply plus the machine state it commits, if any.
#[derive(Debug)]
struct Reply {
    response: Response,
    position: Option<MachineState>,
}

impl Reply {
    fn new(response: Response) -> Self {
        Self {
            response,
            position: None,
        }
    }

    fn moved(response: Response, position: MachineState) -> Self {
        Self {
            response,
            position: Some(position),
        }
    }
}

#[derive(Debug)]
pub struct ProtocolEngine {
    name: String,
    position: MachineState,
    kinematics: Box<dyn Kinematics>,
}

impl ProtocolEngine {
    pub fn new(kinematics: Box<dyn Kinematics>) -> Self {
        Self {
            name: format!("mock-{}", kinematics.name()),
            position: MachineState::HOME,
            kinematics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> MachineState {
        self.position
    }

    /// Interpret one command. The machine state only changes when the
    /// command succeeds, and then all axes change together.
    pub fn process(&mut self, command: &Command) -> Response {
        let kind = command.kind();
        match self.interpret(kind, command) {
            Ok(Reply { response, position }) => {
                if let Some(position) = position {
                    self.position = position;
                }
                response
            }
            Err(status) => {
                tracing::debug!(
                    "{} rejected {} with status {}",
                    self.name,
                    kind.key().unwrap_or("unknown command"),
                    status
                );
                Response::echo(status, command)
            }
        }
    }

    fn interpret(&self, kind: CommandKind, command: &Command) -> Result<Reply, i32> {
        match kind {
            CommandKind::Identify => Ok(Reply::new(Response::ok(json!({
                "app": self.name,
                "ver": PROTOCOL_VERSION,
            })))),
            CommandKind::Home => Ok(Reply::moved(Response::echo(STATUS_OK, command), MachineState::HOME)),
            CommandKind::MoveRelative(_) => Err(STATUS_PLANNER_ERROR),
            CommandKind::MoveAbsolute => self.move_absolute(command),
            CommandKind::DeltaVelocityStroke => self.delta_velocity_stroke(command),
            CommandKind::QueryPosition => Ok(Reply::new(Response::ok(json!({ "mpo": self.machine_position() })))),
            CommandKind::QueryDimensions => Ok(Reply::new(Response::ok(json!({ "dim": self.kinematics.dimensions() })))),
            CommandKind::QuerySystem => Ok(Reply::new(Response::ok(json!({ "sys": self.kinematics.system() })))),
            CommandKind::Comment | CommandKind::DisplaySettings => Ok(Reply::new(Response::echo(STATUS_OK, command))),
            CommandKind::Unsupported(_) => Err(STATUS_NOT_IMPLEMENTED),
            CommandKind::Unknown => Err(STATUS_UNRECOGNIZED_NAME),
        }
    }

    /// Raw pulse counts merged with the cartesian position.
    fn machine_position(&self) -> Map<String, Value> {
        let xyz = self.kinematics.pulses_to_xyz(&self.position);
        let mut mpo = self.position.to_map();
        for axis in Axis::ALL {
            mpo.insert(axis.name().to_string(), Value::from(xyz.get(axis)));
        }
        mpo
    }

    fn move_absolute(&self, command: &Command) -> Result<Reply, i32> {
        let Some(Value::Object(target)) = command.get("mov") else {
            return Err(STATUS_FIELD_TYPE);
        };
        if RELATIVE_MOVE_KEYS.iter().any(|key| target.contains_key(*key)) {
            return Err(STATUS_PLANNER_ERROR);
        }

        // Omitted axes keep their current cartesian value.
        let mut xyz = self.kinematics.pulses_to_xyz(&self.position);
        for axis in Axis::ALL {
            if let Some(value) = target.get(axis.name()) {
                xyz.set(axis, value.as_f64().ok_or(STATUS_FIELD_TYPE)?);
            }
        }

        let pulses = self.kinematics.xyz_to_pulses(&xyz).map_err(|e| {
            tracing::debug!("{}: {}", self.name, e);
            STATUS_POSITION_ERROR
        })?;
        Ok(Reply::moved(Response::echo(STATUS_OK, command), pulses))
    }

    fn delta_velocity_stroke(&self, command: &Command) -> Result<Reply, i32> {
        let dvs = command.get("dvs").and_then(Value::as_object).ok_or(STATUS_FIELD_TYPE)?;
        let dp = dvs
            .get("dp")
            .and_then(Value::as_array)
            .filter(|dp| dp.len() >= 3)
            .ok_or(STATUS_FIELD_TYPE)?;

        let mut delta = [0i64; 3];
        for (slot, value) in delta.iter_mut().zip(dp) {
            *slot = value.as_i64().ok_or(STATUS_FIELD_TYPE)?;
        }

        let seconds = match dvs.get("us") {
            Some(micros) => micros.as_u64().ok_or(STATUS_FIELD_TYPE)? as f64 / 1_000_000.0,
            None => DEFAULT_SECONDS,
        };

        let position = self.position.checked_offset(delta).ok_or(STATUS_POSITION_ERROR)?;

        let mut stroke = dvs.clone();
        stroke.insert("1".to_string(), Value::from(delta[0]));
        stroke.insert("2".to_string(), Value::from(delta[1]));
        stroke.insert("3".to_string(), Value::from(delta[2]));
        let response = Response::ok(json!({ "dvs": stroke })).with_seconds(seconds);
        Ok(Reply::moved(response, position))
    }
}

#[async_trait]
impl Device for ProtocolEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn respond(&mut self, command: &Command) -> Result<Response, DeviceError> {
        Ok(self.process(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firestep_shared::kinematics::{Envelope, FixedRatioKinematics, Mechanics, MtoXyzKinematics};

    fn cartesian() -> ProtocolEngine {
        ProtocolEngine::new(Box::new(FixedRatioKinematics::from_mechanics(&Mechanics::default())))
    }

    fn cmd(value: Value) -> Command {
        Command::try_from(value).unwrap()
    }

    #[test]
    fn test_identify() {
        let mut engine = cartesian();
        let response = engine.process(&Command::identify());
        assert_eq!(response, Response::ok(json!({"app": "mock-cartesian", "ver": 1.0})));
        assert_eq!(response.seconds, 0.001);
    }

    #[test]
    fn test_home_mov_mpo() {
        let mut engine = cartesian();
        assert!(engine.process(&Command::home()).is_ok());
        let mov = cmd(json!({"mov": {"x": 1, "y": 2, "z": 3.485}}));
        let response = engine.process(&mov);
        assert_eq!(response, Response::echo(STATUS_OK, &mov));
        assert_eq!(engine.position(), MachineState::new(100, 200, 349));

        let response = engine.process(&Command::query_position());
        let mpo = &response.result["mpo"];
        assert_eq!(mpo["1"], 100);
        assert_eq!(mpo["2"], 200);
        assert_eq!(mpo["3"], 349);
        assert_eq!(mpo["x"].as_f64(), Some(1.0));
        assert_eq!(mpo["y"].as_f64(), Some(2.0));
        assert_eq!(mpo["z"].as_f64(), Some(3.49));
    }

    #[test]
    fn test_mov_keeps_omitted_axes() {
        let mut engine = cartesian();
        engine.process(&Command::move_to(Some(1.0), Some(2.0), Some(3.0)));
        engine.process(&Command::move_to(None, Some(-4.0), None));
        assert_eq!(engine.position(), MachineState::new(100, -400, 300));
    }

    #[test]
    fn test_relative_moves_are_planner_errors() {
        let mut engine = cartesian();
        engine.process(&Command::move_to(Some(1.0), None, None));
        for command in [
            cmd(json!({"movxr": 1})),
            cmd(json!({"movyr": 1})),
            cmd(json!({"movzr": 1})),
            cmd(json!({"mov": {"x": 5, "zr": 1}})),
        ] {
            let response = engine.process(&command);
            assert_eq!(response.status, STATUS_PLANNER_ERROR);
            assert_eq!(response.result, command.to_value());
        }
        assert_eq!(engine.position(), MachineState::new(100, 0, 0));
    }

    #[test]
    fn test_mov_field_errors_leave_state() {
        let mut engine = cartesian();
        engine.process(&Command::move_to(Some(1.0), None, None));
        assert_eq!(engine.process(&cmd(json!({"mov": {"x": "far"}}))).status, STATUS_FIELD_TYPE);
        assert_eq!(engine.process(&cmd(json!({"mov": ""}))).status, STATUS_FIELD_TYPE);
        assert_eq!(engine.position(), MachineState::new(100, 0, 0));
    }

    #[test]
    fn test_mov_outside_envelope() {
        let mut engine = ProtocolEngine::new(Box::new(MtoXyzKinematics::new(
            Mechanics::default(),
            Envelope::default(),
        )));
        assert_eq!(engine.name(), "mock-MTO_XYZ");
        let response = engine.process(&Command::move_to(Some(500.0), None, None));
        assert_eq!(response.status, STATUS_POSITION_ERROR);
        assert_eq!(engine.position(), MachineState::HOME);
    }

    #[test]
    fn test_delta_velocity_stroke() {
        let mut engine = cartesian();
        let stroke = Command::delta_velocity_stroke([10, -20, 30], 250_000);
        let response = engine.process(&stroke);
        assert!(response.is_ok());
        assert_eq!(response.seconds, 0.25);
        assert_eq!(
            response.result,
            json!({"dvs": {"dp": [10, -20, 30], "us": 250_000, "1": 10, "2": -20, "3": 30}})
        );
        engine.process(&stroke);
        assert_eq!(engine.position(), MachineState::new(20, -40, 60));
    }

    #[test]
    fn test_delta_velocity_stroke_without_us() {
        let mut engine = cartesian();
        let response = engine.process(&cmd(json!({"dvs": {"dp": [1, 2, 3]}})));
        assert_eq!(response.seconds, DEFAULT_SECONDS);
        assert_eq!(engine.position(), MachineState::new(1, 2, 3));
    }

    #[test]
    fn test_delta_velocity_stroke_rejects_bad_input() {
        let mut engine = cartesian();
        for command in [
            cmd(json!({"dvs": ""})),
            cmd(json!({"dvs": {"us": 10}})),
            cmd(json!({"dvs": {"dp": [1, 2]}})),
            cmd(json!({"dvs": {"dp": [1, 2.5, 3]}})),
            cmd(json!({"dvs": {"dp": [1, 2, 3], "us": "soon"}})),
            cmd(json!({"dvs": {"dp": [1, 2, 3], "us": -5000000}})),
            cmd(json!({"dvs": {"dp": [1, 2, 3], "us": 2.5}})),
        ] {
            assert_eq!(engine.process(&command).status, STATUS_FIELD_TYPE);
        }
        assert_eq!(engine.position(), MachineState::HOME);
    }

    #[test]
    fn test_delta_velocity_stroke_overflow() {
        let mut engine = cartesian();
        engine.process(&Command::delta_velocity_stroke([i64::MAX, 0, 0], 1));
        let response = engine.process(&Command::delta_velocity_stroke([1, 0, 0], 1));
        assert_eq!(response.status, STATUS_POSITION_ERROR);
        assert_eq!(engine.position().p1, i64::MAX);
    }

    #[test]
    fn test_queries() {
        let mut engine = cartesian();
        assert_eq!(
            engine.process(&Command::query_system()).result,
            json!({"sys": {"to": 2}})
        );
        let dim = engine.process(&Command::query_dimensions());
        assert!(dim.is_ok());
        assert_eq!(dim.result["dim"]["tr"]["x"].as_f64(), Some(0.01));
    }

    #[test]
    fn test_inert_commands_echo() {
        let mut engine = cartesian();
        let comment = Command::comment("calibration pass 2");
        assert_eq!(engine.process(&comment), Response::echo(STATUS_OK, &comment));
        let dpyds = cmd(json!({"dpyds": 12}));
        assert_eq!(engine.process(&dpyds), Response::echo(STATUS_OK, &dpyds));
    }

    #[test]
    fn test_unknown_and_unsupported_are_distinct() {
        let mut engine = cartesian();
        let unknown = cmd(json!({"warp": 9}));
        let response = engine.process(&unknown);
        assert_eq!(response.status, STATUS_UNRECOGNIZED_NAME);
        assert_eq!(response.result, json!({"warp": 9}));

        let probe = cmd(json!({"prb": {"z": -10}}));
        let response = engine.process(&probe);
        assert_eq!(response.status, STATUS_NOT_IMPLEMENTED);
        assert_eq!(response.result, probe.to_value());
        assert_ne!(STATUS_UNRECOGNIZED_NAME, STATUS_NOT_IMPLEMENTED);
    }
}
