// hexapod_shared/src/calibration.rs - Typed calibration table
use crate::servo::{Leg, Section, ServoId, Side};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Upper bound of a servo angle in degrees. The lower bound is zero.
pub const MAX_ANGLE: i32 = 180;

/// Per-servo calibration triple as it is stored on disk and sent to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServoCalibration {
    /// Nominal (standing) logical angle.
    pub angle: u8,
    #[serde(default)]
    pub inverted: bool,
    #[serde(default)]
    pub offset: i32,
}

impl Default for ServoCalibration {
    fn default() -> Self {
        Self {
            angle: 90,
            inverted: false,
            offset: 0,
        }
    }
}

/// Nested side -> section -> servo layout used by the calibration file and
/// the `current_values` response.
pub type ServoTree = BTreeMap<Side, BTreeMap<Section, BTreeMap<ServoId, ServoCalibration>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServoSpec {
    pub id: ServoId,
    pub side: Side,
    pub section: Section,
    pub nominal_angle: u8,
    pub inverted: bool,
    pub offset: i32,
}

impl ServoSpec {
    pub fn leg(&self) -> Leg {
        Leg::new(self.side, self.section)
    }

    pub fn calibration(&self) -> ServoCalibration {
        ServoCalibration {
            angle: self.nominal_angle,
            inverted: self.inverted,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("leg {0} has no servos")]
    MissingLeg(Leg),
    #[error("leg {leg} has {count} servos")]
    JointCount { leg: Leg, count: usize },
    #[error("servo '{0}' appears in more than one leg")]
    DuplicateServo(ServoId),
    #[error("nominal angle {angle} of servo '{id}' is outside 0..=180")]
    AngleOutOfRange { id: ServoId, angle: u8 },
}

/// Calibration for every joint on the robot, keyed by servo id.
///
/// A table always covers all six legs: three joints on FRONT/BACK legs and
/// three or four on MID legs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationTable {
    servos: BTreeMap<ServoId, ServoSpec>,
}

impl CalibrationTable {
    /// Build a table from the nested layout, validating its shape.
    pub fn from_tree(tree: &ServoTree) -> Result<Self, TableError> {
        let mut servos = BTreeMap::new();
        for leg in Leg::all() {
            let joints = tree
                .get(&leg.side)
                .and_then(|sections| sections.get(&leg.section))
                .filter(|joints| !joints.is_empty())
                .ok_or(TableError::MissingLeg(leg))?;
            if !leg.section.joint_counts().contains(&joints.len()) {
                return Err(TableError::JointCount {
                    leg,
                    count: joints.len(),
                });
            }
            for (id, calibration) in joints {
                if i32::from(calibration.angle) > MAX_ANGLE {
                    return Err(TableError::AngleOutOfRange {
                        id: id.clone(),
                        angle: calibration.angle,
                    });
                }
                let spec = ServoSpec {
                    id: id.clone(),
                    side: leg.side,
                    section: leg.section,
                    nominal_angle: calibration.angle,
                    inverted: calibration.inverted,
                    offset: calibration.offset,
                };
                if servos.insert(id.clone(), spec).is_some() {
                    return Err(TableError::DuplicateServo(id.clone()));
                }
            }
        }
        Ok(Self { servos })
    }

    pub fn to_tree(&self) -> ServoTree {
        let mut tree = ServoTree::new();
        for spec in self.servos.values() {
            tree.entry(spec.side)
                .or_default()
                .entry(spec.section)
                .or_default()
                .insert(spec.id.clone(), spec.calibration());
        }
        tree
    }

    pub fn get(&self, id: &ServoId) -> Option<&ServoSpec> {
        self.servos.get(id)
    }

    /// Servos of one leg, ordered by id.
    pub fn leg(&self, leg: Leg) -> impl Iterator<Item = &ServoSpec> {
        self.servos.values().filter(move |spec| spec.leg() == leg)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServoSpec> {
        self.servos.values()
    }

    pub fn len(&self) -> usize {
        self.servos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servos.is_empty()
    }

    /// Replace the calibration triple of an existing servo. Side and section
    /// never change. Returns `None` when the id is not in the table.
    pub fn calibrate(&mut self, id: &ServoId, calibration: ServoCalibration) -> Option<&ServoSpec> {
        let spec = self.servos.get_mut(id)?;
        spec.nominal_angle = calibration.angle;
        spec.inverted = calibration.inverted;
        spec.offset = calibration.offset;
        Some(spec)
    }
}

/// Joint names per section in firmware order: coxa, femur(s), tibia.
const FRONT_BACK_JOINTS: [&str; 3] = ["C", "T", "B"];
const MID_JOINTS: [&str; 4] = ["C", "T", "B", "F"];

impl Default for CalibrationTable {
    /// The 20-joint layout the controller firmware addresses, every joint
    /// centred at 90 degrees.
    fn default() -> Self {
        let mut servos = BTreeMap::new();
        for leg in Leg::all() {
            let side = match leg.side {
                Side::Left => 'L',
                Side::Right => 'R',
            };
            let (section, joints): (char, &[&str]) = match leg.section {
                Section::Front => ('F', &FRONT_BACK_JOINTS),
                Section::Mid => ('M', &MID_JOINTS),
                Section::Back => ('B', &FRONT_BACK_JOINTS),
            };
            for joint in joints {
                let Ok(id) = ServoId::new(format!("{side}{section}{joint}")) else {
                    continue;
                };
                servos.insert(
                    id.clone(),
                    ServoSpec {
                        id,
                        side: leg.side,
                        section: leg.section,
                        nominal_angle: 90,
                        inverted: false,
                        offset: 0,
                    },
                );
            }
        }
        Self { servos }
    }
}
