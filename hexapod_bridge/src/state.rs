// src/state.rs - Bridge-side motion state
use crate::motion::Batch;
use hexapod_shared::protocol::{LinkHealth, MotionMode, Response};
use hexapod_shared::servo::ServoId;
use std::collections::BTreeMap;

/// Last whole-body activity requested of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveMode {
    #[default]
    None,
    Stand,
    Motion(MotionMode),
}

impl ActiveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActiveMode::None => "none",
            ActiveMode::Stand => "stand",
            ActiveMode::Motion(mode) => mode.token(),
        }
    }
}

/// Mutated only by the command loop.
#[derive(Debug, Clone)]
pub struct MotionState {
    pub mode: ActiveMode,
    /// Physical angle most recently written per servo.
    pub last_physical: BTreeMap<ServoId, u8>,
    pub link: LinkHealth,
}

impl MotionState {
    pub fn new(link: LinkHealth) -> Self {
        Self {
            mode: ActiveMode::None,
            last_physical: BTreeMap::new(),
            link,
        }
    }

    pub fn record_batch(&mut self, batch: &Batch) {
        for (servo, angle) in batch {
            self.last_physical.insert(servo.clone(), *angle);
        }
    }

    pub fn to_response(&self) -> Response {
        Response::Status {
            mode: self.mode.as_str().to_string(),
            link: self.link,
            last_physical: self.last_physical.clone(),
        }
    }
}
