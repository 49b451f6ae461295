//! Operator <-> bridge message protocol.
//!
//! Every message is a single JSON object carried in one UDP datagram.
//!
//! Command stream (operator -> bridge):
//!
//! ```json
//! { "LFC": 90, "LFT": 45 }
//! { "command": "stand" }
//! { "command": "calibrate", "servo": "LBC", "inverted": true, "offset": -20 }
//! ```
//!
//! Response stream (bridge -> operator):
//!
//! ```json
//! { "type": "current_values", "values": { "LEFT": { "FRONT": { "LFC": { "angle": 90, "inverted": false, "offset": 0 } } } } }
//! ```

use crate::calibration::ServoTree;
use crate::servo::{InvalidServoId, ServoId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Largest datagram either side reads.
pub const MAX_DATAGRAM: usize = 4096;

/// Malformed inbound message. The message is dropped and the loop carries on.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("\"command\" must be a string")]
    CommandNotString,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("{0}")]
    InvalidServoId(#[from] InvalidServoId),
    #[error("angle for servo '{servo}' is not an integer: {value}")]
    InvalidAngle { servo: ServoId, value: String },
    #[error("angle batch is empty")]
    EmptyBatch,
}

/// Motion modes executed by the controller firmware. Only the token is sent;
/// the gait itself lives on the microcontroller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionMode {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Standby,
    TestServos,
}

impl MotionMode {
    pub const ALL: [MotionMode; 6] = [
        MotionMode::Forward,
        MotionMode::Backward,
        MotionMode::TurnLeft,
        MotionMode::TurnRight,
        MotionMode::Standby,
        MotionMode::TestServos,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            MotionMode::Forward => "forward",
            MotionMode::Backward => "backward",
            MotionMode::TurnLeft => "turn_left",
            MotionMode::TurnRight => "turn_right",
            MotionMode::Standby => "standby",
            MotionMode::TestServos => "test_servos",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.token() == token)
    }
}

impl fmt::Display for MotionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Partial calibration change for one servo; absent fields are left alone.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CalibrationUpdate {
    pub servo: ServoId,
    #[serde(default)]
    pub angle: Option<i32>,
    #[serde(default)]
    pub inverted: Option<bool>,
    #[serde(default)]
    pub offset: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Stand,
    GetValues,
    Status,
    Mode(MotionMode),
    Calibrate(CalibrationUpdate),
}

impl ControlCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::Stand => "stand",
            ControlCommand::GetValues => "get_values",
            ControlCommand::Status => "status",
            ControlCommand::Mode(mode) => mode.token(),
            ControlCommand::Calibrate(_) => "calibrate",
        }
    }

    /// Parse a control command from its name and the remaining object fields.
    pub fn from_parts(name: &str, fields: Map<String, Value>) -> Result<Self, ProtocolError> {
        match name {
            "stand" => Ok(ControlCommand::Stand),
            "get_values" => Ok(ControlCommand::GetValues),
            "status" => Ok(ControlCommand::Status),
            "calibrate" => Ok(ControlCommand::Calibrate(serde_json::from_value(
                Value::Object(fields),
            )?)),
            other => MotionMode::from_token(other)
                .map(ControlCommand::Mode)
                .ok_or_else(|| ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

/// One inbound message, consumed once by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Logical angles per servo.
    SetAngles(BTreeMap<ServoId, i32>),
    Control(ControlCommand),
}

impl Command {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let Value::Object(mut object) = serde_json::from_slice::<Value>(bytes)? else {
            return Err(ProtocolError::NotAnObject);
        };
        if let Some(name) = object.remove("command") {
            let Value::String(name) = name else {
                return Err(ProtocolError::CommandNotString);
            };
            return ControlCommand::from_parts(&name, object).map(Command::Control);
        }
        if object.is_empty() {
            return Err(ProtocolError::EmptyBatch);
        }
        let mut angles = BTreeMap::new();
        for (key, value) in object {
            let servo = ServoId::new(key)?;
            let angle = integer_angle(&value).ok_or_else(|| ProtocolError::InvalidAngle {
                servo: servo.clone(),
                value: value.to_string(),
            })?;
            angles.insert(servo, angle);
        }
        Ok(Command::SetAngles(angles))
    }

    pub fn to_json(&self) -> Value {
        match self {
            Command::SetAngles(angles) => Value::Object(
                angles
                    .iter()
                    .map(|(servo, angle)| (servo.to_string(), Value::from(*angle)))
                    .collect(),
            ),
            Command::Control(control) => {
                let mut object = Map::new();
                object.insert("command".to_string(), Value::from(control.name()));
                if let ControlCommand::Calibrate(update) = control {
                    object.insert("servo".to_string(), Value::from(update.servo.as_str()));
                    if let Some(angle) = update.angle {
                        object.insert("angle".to_string(), Value::from(angle));
                    }
                    if let Some(inverted) = update.inverted {
                        object.insert("inverted".to_string(), Value::from(inverted));
                    }
                    if let Some(offset) = update.offset {
                        object.insert("offset".to_string(), Value::from(offset));
                    }
                }
                Value::Object(object)
            }
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }
}

// Fractional angles are truncated, as the operator GUI always did.
fn integer_angle(value: &Value) -> Option<i32> {
    let whole = match value.as_i64() {
        Some(n) => n,
        None => {
            let f = value.as_f64().filter(|f| f.is_finite())?;
            f.trunc() as i64
        }
    };
    i32::try_from(whole).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkHealth {
    Connected,
    Disconnected,
}

/// Message on the response stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    CurrentValues {
        values: ServoTree,
    },
    Status {
        mode: String,
        link: LinkHealth,
        last_physical: BTreeMap<ServoId, u8>,
    },
    Error {
        message: String,
    },
}

impl Response {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
