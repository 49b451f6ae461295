// src/calibration.rs - Calibration store owned by the bridge
use hexapod_shared::calibration::{CalibrationTable, MAX_ANGLE, ServoCalibration, ServoSpec, ServoTree};
use hexapod_shared::calibration_file::{CalibrationFile, CalibrationFileError};
use hexapod_shared::protocol::CalibrationUpdate;
use hexapod_shared::servo::{Leg, ServoId};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("unknown servo '{0}'")]
    UnknownServo(ServoId),
    #[error("angle {angle} for servo '{servo}' is outside 0..=180")]
    InvalidAngle { servo: ServoId, angle: i32 },
    #[error("failed to persist calibration: {0}")]
    Persist(#[from] CalibrationFileError),
}

/// Where calibration changes are written.
pub trait CalibrationSink: Send + Sync {
    fn persist(&self, file: &CalibrationFile) -> Result<(), CalibrationFileError>;
}

/// Persists to the JSON calibration file.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CalibrationSink for JsonFileSink {
    fn persist(&self, file: &CalibrationFile) -> Result<(), CalibrationFileError> {
        file.save(&self.path)?;
        tracing::info!("Saved calibration to {}", self.path.display());
        Ok(())
    }
}

/// Calibration table plus the network settings stored alongside it.
///
/// Reads never touch storage. Every successful [`CalibrationStore::update`]
/// has been written before it returns; a failed write leaves the table as it
/// was.
pub struct CalibrationStore {
    ip: String,
    port: u16,
    table: CalibrationTable,
    sink: Box<dyn CalibrationSink>,
}

impl CalibrationStore {
    pub fn new(file: &CalibrationFile, table: CalibrationTable, sink: Box<dyn CalibrationSink>) -> Self {
        Self {
            ip: file.ip.clone(),
            port: file.port,
            table,
            sink,
        }
    }

    /// Load from the calibration file, falling back to defaults.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (file, table) = CalibrationFile::load(&path);
        tracing::info!("Loaded calibration for {} servos", table.len());
        Self::new(&file, table, Box::new(JsonFileSink::new(path)))
    }

    pub fn get(&self, servo: &ServoId) -> Result<&ServoSpec, CalibrationError> {
        self.table
            .get(servo)
            .ok_or_else(|| CalibrationError::UnknownServo(servo.clone()))
    }

    pub fn table(&self) -> &CalibrationTable {
        &self.table
    }

    pub fn leg(&self, leg: Leg) -> impl Iterator<Item = &ServoSpec> {
        self.table.leg(leg)
    }

    /// Nested side/section/servo view for the operator.
    pub fn snapshot(&self) -> ServoTree {
        self.table.to_tree()
    }

    /// Command port recorded in the calibration file.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Apply the supplied fields of `update` and persist the result.
    pub fn update(&mut self, update: &CalibrationUpdate) -> Result<&ServoSpec, CalibrationError> {
        let current = self.get(&update.servo)?.calibration();
        let angle = match update.angle {
            Some(angle) => u8::try_from(angle)
                .ok()
                .filter(|a| i32::from(*a) <= MAX_ANGLE)
                .ok_or(CalibrationError::InvalidAngle {
                    servo: update.servo.clone(),
                    angle,
                })?,
            None => current.angle,
        };
        let calibration = ServoCalibration {
            angle,
            inverted: update.inverted.unwrap_or(current.inverted),
            offset: update.offset.unwrap_or(current.offset),
        };

        let mut candidate = self.table.clone();
        candidate.calibrate(&update.servo, calibration);
        let file = CalibrationFile {
            ip: self.ip.clone(),
            port: self.port,
            servos: candidate.to_tree(),
        };
        self.sink.persist(&file)?;
        self.table = candidate;
        tracing::info!(
            "Calibrated {}: angle={} inverted={} offset={}",
            update.servo,
            calibration.angle,
            calibration.inverted,
            calibration.offset
        );
        self.get(&update.servo)
    }
}

impl std::fmt::Debug for CalibrationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationStore")
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("servos", &self.table.len())
            .finish()
    }
}
