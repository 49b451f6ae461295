//! On-disk calibration document.
//!
//! ```json
//! {
//!   "ip": "192.168.8.39",
//!   "port": 5000,
//!   "servos": { "LEFT": { "FRONT": { "LFC": { "angle": 90, "inverted": false, "offset": 0 } } } }
//! }
//! ```
//!
//! `ip`/`port` locate the bridge for the operator side; `servos` is the
//! calibration table. A missing or unreadable file never stops startup: the
//! default document is used instead.

use crate::calibration::{CalibrationTable, ServoTree};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalibrationFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub servos: ServoTree,
}

impl Default for CalibrationFile {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: default_port(),
            servos: CalibrationTable::default().to_tree(),
        }
    }
}

fn default_ip() -> String { "192.168.8.39".to_string() }
fn default_port() -> u16 { 5000 }

impl CalibrationFile {
    pub fn read(path: impl AsRef<Path>) -> Result<Self, CalibrationFileError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Read the document, falling back to defaults when the file is missing,
    /// unparsable, or describes an invalid servo layout.
    pub fn load(path: impl AsRef<Path>) -> (Self, CalibrationTable) {
        let path = path.as_ref();
        let file = match Self::read(path) {
            Ok(file) => file,
            Err(CalibrationFileError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No calibration file at '{}', using defaults", path.display());
                return (Self::default(), CalibrationTable::default());
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable calibration file '{}': {}", path.display(), e);
                return (Self::default(), CalibrationTable::default());
            }
        };
        match CalibrationTable::from_tree(&file.servos) {
            Ok(table) => (file, table),
            Err(e) => {
                tracing::warn!(
                    "Calibration file '{}' has an invalid servo layout ({}), using default servos",
                    path.display(),
                    e
                );
                let table = CalibrationTable::default();
                (
                    Self {
                        servos: table.to_tree(),
                        ..file
                    },
                    table,
                )
            }
        }
    }

    /// Write the document atomically: a temporary file in the same directory
    /// is renamed over the target, so a failed write leaves the old file intact.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CalibrationFileError> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::servo::{Section, ServoId, Side};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempdir().unwrap();
        let (file, table) = CalibrationFile::load(dir.path().join("servo_config.json"));
        assert_eq!(file, CalibrationFile::default());
        assert_eq!(table, CalibrationTable::default());
    }

    #[test]
    fn test_corrupt_file_yields_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("servo_config.json");
        fs::write(&path, "{ \"servos\": ").unwrap();
        let (file, table) = CalibrationFile::load(&path);
        assert_eq!(file.port, 5000);
        assert_eq!(table.len(), 20);
    }

    #[test]
    fn test_invalid_layout_keeps_network_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("servo_config.json");
        fs::write(&path, r#"{"ip": "10.0.0.7", "port": 6000, "servos": {}}"#).unwrap();
        let (file, table) = CalibrationFile::load(&path);
        assert_eq!(file.ip, "10.0.0.7");
        assert_eq!(file.port, 6000);
        assert_eq!(table, CalibrationTable::default());
        assert_eq!(file.servos, table.to_tree());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("servo_config.json");
        let mut file = CalibrationFile::default();
        let lbc = ServoId::new("LBC").unwrap();
        file.servos
            .get_mut(&Side::Left)
            .unwrap()
            .get_mut(&Section::Back)
            .unwrap()
            .get_mut(&lbc)
            .unwrap()
            .offset = -20;
        file.save(&path).unwrap();

        let (loaded, table) = CalibrationFile::load(&path);
        assert_eq!(loaded, file);
        assert_eq!(table.get(&lbc).unwrap().offset, -20);
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent").join("servo_config.json");
        assert!(matches!(
            CalibrationFile::default().save(&path),
            Err(CalibrationFileError::Io(_))
        ));
    }
}
