// hexapod_shared: servo model and wire protocol shared by the operator and the bridge

pub mod calibration;
pub mod calibration_file;
pub mod protocol;
pub mod serial_interface;
pub mod servo;
pub mod transform;

pub use calibration::{CalibrationTable, ServoCalibration, ServoSpec, ServoTree, TableError};
pub use calibration_file::{CalibrationFile, CalibrationFileError};
pub use protocol::{
    CalibrationUpdate, Command, ControlCommand, LinkHealth, MotionMode, ProtocolError, Response,
};
pub use serial_interface::{SerialInterface, SerialLine};
pub use servo::{InvalidServoId, Leg, Section, ServoId, Side};
pub use transform::transform;

/// Responses travel to the operator on the command port plus this offset.
pub const RESPONSE_PORT_OFFSET: u16 = 1;
