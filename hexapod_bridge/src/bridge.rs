// src/bridge.rs - Command loop between the network and the motion layer
use crate::calibration::{CalibrationError, CalibrationStore};
use crate::channel::BridgeChannel;
use crate::motion::{MotionError, MotionOrchestrator};
use crate::state::{ActiveMode, MotionState};
use hexapod_shared::protocol::{Command, ControlCommand, MotionMode, ProtocolError, Response};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] ProtocolError),
    #[error(transparent)]
    Motion(#[from] MotionError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingCommand,
    Dispatching,
    ShuttingDown,
}

/// Owns calibration, motion and state; processes one message at a time.
#[derive(Debug)]
pub struct BridgeService {
    calibration: CalibrationStore,
    motion: MotionOrchestrator,
    state: MotionState,
    phase: Phase,
    shutdown_delay: Duration,
}

impl BridgeService {
    pub fn new(calibration: CalibrationStore, motion: MotionOrchestrator) -> Self {
        let state = MotionState::new(motion.link().health());
        Self {
            calibration,
            motion,
            state,
            phase: Phase::Idle,
            shutdown_delay: Duration::ZERO,
        }
    }

    /// Time the standby pose is given before the link closes on shutdown.
    pub fn with_shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = delay;
        self
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    pub fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }

    pub fn motion(&self) -> &MotionOrchestrator {
        &self.motion
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Decode and dispatch one raw message. Never fails: malformed input is
    /// logged and dropped, dispatch failures become an error response.
    pub async fn handle_message(&mut self, bytes: &[u8]) -> Option<Response> {
        let command = match Command::decode(bytes) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("Dropping malformed message: {}", e);
                return None;
            }
        };
        tracing::debug!("Dispatching {:?}", command);
        match self.dispatch(command).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Command failed: {}", e);
                Some(Response::Error {
                    message: e.to_string(),
                })
            }
        }
    }

    pub async fn dispatch(&mut self, command: Command) -> Result<Option<Response>, BridgeError> {
        let result = self.dispatch_inner(command).await;
        self.state.link = self.motion.link().health();
        result
    }

    async fn dispatch_inner(&mut self, command: Command) -> Result<Option<Response>, BridgeError> {
        match command {
            Command::SetAngles(angles) => {
                let batch = self.motion.apply_angles(&self.calibration, &angles).await?;
                self.state.record_batch(&batch);
                Ok(None)
            }
            Command::Control(ControlCommand::GetValues) => Ok(Some(self.current_values())),
            Command::Control(ControlCommand::Status) => Ok(Some(self.state.to_response())),
            Command::Control(ControlCommand::Stand) => {
                self.stand().await?;
                Ok(None)
            }
            Command::Control(ControlCommand::Mode(mode)) => {
                self.motion.dispatch_motion_mode(mode).await?;
                self.state.mode = ActiveMode::Motion(mode);
                Ok(None)
            }
            Command::Control(ControlCommand::Calibrate(update)) => {
                self.calibration.update(&update)?;
                Ok(Some(self.current_values()))
            }
        }
    }

    fn current_values(&self) -> Response {
        Response::CurrentValues {
            values: self.calibration.snapshot(),
        }
    }

    /// Run the stand sequence, recording whatever legs were applied, also
    /// when it aborts part way.
    pub async fn stand(&mut self) -> Result<(), MotionError> {
        let result = self.motion.stand_sequence(&self.calibration).await;
        self.state.link = self.motion.link().health();
        match result {
            Ok(batches) => {
                for batch in &batches {
                    self.state.record_batch(batch);
                }
                self.state.mode = ActiveMode::Stand;
                Ok(())
            }
            Err(e) => {
                // Legs sent before the abort are physically in place.
                if let MotionError::SequenceAborted { applied, .. } = &e {
                    for batch in applied {
                        self.state.record_batch(batch);
                    }
                }
                Err(e)
            }
        }
    }

    /// Serve commands until `shutdown` resolves. A message already being
    /// dispatched always completes first.
    pub async fn run(&mut self, channel: &BridgeChannel, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        self.phase = Phase::AwaitingCommand;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                received = channel.recv() => {
                    let (bytes, from) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            tracing::warn!("Command receive failed: {}", e);
                            continue;
                        }
                    };
                    self.phase = Phase::Dispatching;
                    if let Some(response) = self.handle_message(&bytes).await {
                        if let Err(e) = channel.respond(from, &response).await {
                            tracing::warn!("Failed to send response to {}: {}", from, e);
                        }
                    }
                    self.phase = Phase::AwaitingCommand;
                }
            }
        }
        self.shutdown().await;
    }

    /// Park the robot in standby and release the serial link.
    pub async fn shutdown(&mut self) {
        self.phase = Phase::ShuttingDown;
        tracing::info!("Shutting down bridge");
        match self.motion.dispatch_motion_mode(MotionMode::Standby).await {
            Ok(()) => {
                self.state.mode = ActiveMode::Motion(MotionMode::Standby);
                if !self.shutdown_delay.is_zero() {
                    tokio::time::sleep(self.shutdown_delay).await;
                }
            }
            Err(e) => tracing::warn!("Standby on shutdown failed: {}", e),
        }
        self.motion.link_mut().close();
        self.state.link = self.motion.link().health();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::JsonFileSink;
    use crate::hardware::BoardLink;
    use crate::motion::MotionSettings;
    use crate::testing::{RecordingSerial, link_settings};
    use hexapod_shared::protocol::LinkHealth;
    use hexapod_shared::{CalibrationFile, CalibrationTable};
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn service(serial: &RecordingSerial, calibration_path: &Path) -> BridgeService {
        let link = BoardLink::discover(Arc::new(serial.clone()), link_settings(&["/dev/ttyUSB0"]))
            .await
            .unwrap();
        let motion = MotionOrchestrator::new(
            link,
            MotionSettings {
                settle_delay: Duration::ZERO,
                stand_ack: false,
            },
        );
        let store = CalibrationStore::new(
            &CalibrationFile::default(),
            CalibrationTable::default(),
            Box::new(JsonFileSink::new(calibration_path)),
        );
        BridgeService::new(store, motion)
    }

    #[tokio::test]
    async fn test_malformed_message_is_dropped() {
        let dir = tempdir().unwrap();
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut bridge = service(&serial, &dir.path().join("servo_config.json")).await;

        assert!(bridge.handle_message(b"[1, 2, 3]").await.is_none());
        assert!(bridge.handle_message(br#"{"command": "dance"}"#).await.is_none());
        assert!(bridge.handle_message(br#"{"LFC": "up"}"#).await.is_none());
        assert!(serial.writes().is_empty());
        assert_eq!(bridge.state().mode, ActiveMode::None);
    }

    #[tokio::test]
    async fn test_stand_command_sets_mode() {
        let dir = tempdir().unwrap();
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut bridge = service(&serial, &dir.path().join("servo_config.json")).await;

        assert!(bridge.handle_message(br#"{"command": "stand"}"#).await.is_none());
        assert_eq!(serial.writes().len(), 6);
        assert_eq!(bridge.state().mode, ActiveMode::Stand);
        assert_eq!(bridge.state().last_physical.len(), CalibrationTable::default().len());
    }

    #[tokio::test]
    async fn test_link_loss_reported_in_error_and_status() {
        let dir = tempdir().unwrap();
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut bridge = service(&serial, &dir.path().join("servo_config.json")).await;

        serial.unplug("/dev/ttyUSB0");
        serial.fail_next_writes(1);
        let response = bridge.handle_message(br#"{"LFC": 10}"#).await;
        assert!(matches!(response, Some(Response::Error { .. })));
        assert_eq!(bridge.state().link, LinkHealth::Disconnected);
        assert!(bridge.state().last_physical.is_empty());

        serial.plug("/dev/ttyUSB0");
        assert!(bridge.handle_message(br#"{"LFC": 10}"#).await.is_none());
        assert_eq!(bridge.state().link, LinkHealth::Connected);
        assert_eq!(serial.writes(), vec!["LFC:10".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_calibration() {
        let dir = tempdir().unwrap();
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let missing_dir = dir.path().join("missing").join("servo_config.json");
        let mut bridge = service(&serial, &missing_dir).await;

        let response = bridge
            .handle_message(br#"{"command": "calibrate", "servo": "LFC", "offset": 12}"#)
            .await;
        assert!(matches!(response, Some(Response::Error { .. })));
        let lfc = hexapod_shared::ServoId::new("LFC").unwrap();
        assert_eq!(bridge.calibration().get(&lfc).unwrap().offset, 0);
    }

    #[tokio::test]
    async fn test_partial_stand_recorded_in_status() {
        let dir = tempdir().unwrap();
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut bridge = service(&serial, &dir.path().join("servo_config.json")).await;

        serial.disconnect_after(2);
        let response = bridge.handle_message(br#"{"command": "stand"}"#).await;
        let Some(Response::Error { message }) = response else {
            panic!("expected error response");
        };
        assert!(message.contains("LEFT-BACK"), "unexpected message: {}", message);

        let Response::Status { mode, link, last_physical } = bridge.state().to_response() else {
            panic!("expected status");
        };
        assert_eq!(serial.writes().len(), 2);
        assert_eq!(last_physical.len(), 6);
        assert!(last_physical.contains_key(&hexapod_shared::ServoId::new("RFT").unwrap()));
        assert!(!last_physical.contains_key(&hexapod_shared::ServoId::new("LBC").unwrap()));
        assert_eq!(mode, "none");
        assert_eq!(link, LinkHealth::Disconnected);
    }

    #[tokio::test]
    async fn test_run_on_spawned_task() {
        let dir = tempdir().unwrap();
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut bridge = service(&serial, &dir.path().join("servo_config.json")).await;
        let channel = BridgeChannel::bind("127.0.0.1:0".parse().unwrap(), 9).await.unwrap();

        let running = tokio::spawn(async move {
            bridge.run(&channel, async {}).await;
            bridge
        });
        let bridge = running.await.unwrap();
        assert_eq!(bridge.phase(), Phase::ShuttingDown);
        assert_eq!(serial.writes(), vec!["standby".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_sends_standby_and_closes_link() {
        let dir = tempdir().unwrap();
        let serial = RecordingSerial::with_ports(&["/dev/ttyUSB0"]);
        let mut bridge = service(&serial, &dir.path().join("servo_config.json")).await;

        bridge.shutdown().await;
        assert_eq!(serial.writes(), vec!["standby".to_string()]);
        assert_eq!(bridge.phase(), Phase::ShuttingDown);
        assert_eq!(bridge.state().link, LinkHealth::Disconnected);
    }
}
