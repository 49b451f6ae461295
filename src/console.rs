// src/console.rs - Text forms of operator commands
use hexapod_shared::protocol::{Command, ControlCommand, ProtocolError};
use hexapod_shared::servo::{InvalidServoId, ServoId};
use serde_json::Map;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("expected ID=ANGLE, got '{0}'")]
    InvalidAssignment(String),
    #[error(transparent)]
    InvalidServoId(#[from] InvalidServoId),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("no response from bridge within {0:?}")]
    Timeout(std::time::Duration),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse `LFC=45` into a servo and a logical angle.
pub fn parse_assignment(text: &str) -> Result<(ServoId, i32), OperatorError> {
    let invalid = || OperatorError::InvalidAssignment(text.to_string());
    let (id, angle) = text.split_once('=').ok_or_else(invalid)?;
    let angle = angle.trim().parse::<i32>().map_err(|_| invalid())?;
    Ok((ServoId::new(id.trim())?, angle))
}

/// Parse one console line.
///
/// `LFC=45 LFT=90` sets angles; a bare word is a control command name.
/// Blank lines yield `None`.
pub fn parse_console_line(line: &str) -> Result<Option<Command>, OperatorError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    if line.contains('=') {
        let angles = line
            .split_whitespace()
            .map(parse_assignment)
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        return Ok(Some(Command::SetAngles(angles)));
    }
    let control = ControlCommand::from_parts(line, Map::new())?;
    Ok(Some(Command::Control(control)))
}
