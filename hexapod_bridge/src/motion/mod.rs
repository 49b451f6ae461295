// src/motion/mod.rs - Motion orchestration on top of the board link
use crate::calibration::{CalibrationError, CalibrationStore};
use crate::hardware::{BoardLink, LinkError};
use hexapod_shared::protocol::MotionMode;
use hexapod_shared::servo::{Leg, Section, ServoId, Side};
use hexapod_shared::transform::transform;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Order in which legs are raised. Mid legs carry four joints and go last so
/// a partly raised body is never carried on them alone.
pub const STAND_ORDER: [Leg; 6] = [
    Leg::new(Side::Left, Section::Front),
    Leg::new(Side::Right, Section::Front),
    Leg::new(Side::Left, Section::Back),
    Leg::new(Side::Right, Section::Back),
    Leg::new(Side::Left, Section::Mid),
    Leg::new(Side::Right, Section::Mid),
];

#[derive(Debug, Error)]
pub enum MotionError {
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("stand sequence aborted at {leg}: {source}")]
    SequenceAborted {
        leg: Leg,
        /// Groups written before the failure, in stand order.
        applied: Vec<Batch>,
        #[source]
        source: Box<MotionError>,
    },
}

/// Physical angles written in one serial line.
pub type Batch = Vec<(ServoId, u8)>;

#[derive(Debug, Clone)]
pub struct MotionSettings {
    /// Pause after each stand group.
    pub settle_delay: Duration,
    /// Request an acknowledgement for stand groups.
    pub stand_ack: bool,
}

/// Encode a batch as `ID:angle,ID:angle`.
pub fn format_line(batch: &[(ServoId, u8)]) -> String {
    batch
        .iter()
        .map(|(servo, angle)| format!("{}:{}", servo, angle))
        .collect::<Vec<_>>()
        .join(",")
}

/// Turns commands into ordered, calibrated writes on the board link.
#[derive(Debug)]
pub struct MotionOrchestrator {
    link: BoardLink,
    settings: MotionSettings,
}

impl MotionOrchestrator {
    pub fn new(link: BoardLink, settings: MotionSettings) -> Self {
        Self { link, settings }
    }

    pub fn link(&self) -> &BoardLink {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut BoardLink {
        &mut self.link
    }

    /// Transform every logical angle and send the batch as one line.
    ///
    /// All ids are resolved before anything is written: one unknown servo
    /// rejects the whole batch.
    pub async fn apply_angles(
        &mut self,
        calibration: &CalibrationStore,
        angles: &BTreeMap<ServoId, i32>,
    ) -> Result<Batch, MotionError> {
        let batch = angles
            .iter()
            .map(|(servo, logical)| {
                let spec = calibration.get(servo)?;
                Ok((servo.clone(), transform(*logical, spec)))
            })
            .collect::<Result<Batch, CalibrationError>>()?;
        if batch.is_empty() {
            return Ok(batch);
        }
        self.link.send(&format_line(&batch), false).await?;
        Ok(batch)
    }

    /// Bring every leg to its nominal angles, one leg per line, in
    /// [`STAND_ORDER`] with a settling pause after each.
    ///
    /// A failing leg aborts the sequence. Legs already sent stay where they
    /// are and are reported in [`MotionError::SequenceAborted`].
    pub async fn stand_sequence(&mut self, calibration: &CalibrationStore) -> Result<Vec<Batch>, MotionError> {
        let mut applied = Vec::with_capacity(STAND_ORDER.len());
        for leg in STAND_ORDER {
            let batch: Batch = calibration
                .leg(leg)
                .map(|spec| (spec.id.clone(), transform(i32::from(spec.nominal_angle), spec)))
                .collect();
            if batch.is_empty() {
                continue;
            }
            let line = format_line(&batch);
            tracing::info!("Stand: {} -> {}", leg, line);
            match self.link.send(&line, self.settings.stand_ack).await {
                Ok(Some(ack)) => tracing::debug!("Stand {} acknowledged: {}", leg, ack),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Stand sequence aborted at {}: {}", leg, e);
                    return Err(MotionError::SequenceAborted {
                        leg,
                        applied,
                        source: Box::new(MotionError::Link(e)),
                    });
                }
            }
            applied.push(batch);
            if !self.settings.settle_delay.is_zero() {
                tokio::time::sleep(self.settings.settle_delay).await;
            }
        }
        Ok(applied)
    }

    /// Forward a motion mode token untouched. Repeats are absorbed by the
    /// link's deduplication.
    pub async fn dispatch_motion_mode(&mut self, mode: MotionMode) -> Result<(), MotionError> {
        tracing::info!("Motion mode: {}", mode);
        self.link.send(mode.token(), false).await?;
        Ok(())
    }
}
