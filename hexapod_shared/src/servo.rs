//! Servo identity and leg placement.
//!
//! A [`ServoId`] is the token the firmware knows a joint by (`LFC`, `RMT`, ...).
//! It travels verbatim on the serial line, so the characters that frame a
//! serial command (`:`, `,`, whitespace) are rejected up front.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid servo id '{0}'")]
pub struct InvalidServoId(pub String);

/// Validated servo identifier, unique across the robot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServoId(String);

impl ServoId {
    pub fn new(id: impl Into<String>) -> Result<Self, InvalidServoId> {
        let id = id.into();
        let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            Ok(Self(id))
        } else {
            Err(InvalidServoId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServoId {
    type Error = InvalidServoId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServoId> for String {
    fn from(id: ServoId) -> Self {
        id.0
    }
}

impl FromStr for ServoId {
    type Err = InvalidServoId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ServoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "LEFT",
            Side::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leg position along one side. MID legs carry an extra femur joint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Section {
    Front,
    Mid,
    Back,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Front, Section::Mid, Section::Back];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Front => "FRONT",
            Section::Mid => "MID",
            Section::Back => "BACK",
        }
    }

    /// Number of joints a leg in this section may carry.
    pub fn joint_counts(&self) -> std::ops::RangeInclusive<usize> {
        match self {
            Section::Mid => 3..=4,
            Section::Front | Section::Back => 3..=3,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One leg, addressed by (side, section).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Leg {
    pub side: Side,
    pub section: Section,
}

impl Leg {
    pub const fn new(side: Side, section: Section) -> Self {
        Self { side, section }
    }

    pub fn all() -> impl Iterator<Item = Leg> {
        Side::ALL
            .into_iter()
            .flat_map(|side| Section::ALL.into_iter().map(move |section| Leg::new(side, section)))
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.side, self.section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_servo_id_accepts_firmware_names() {
        for name in ["LFC", "RMF", "L12", "left_mid_2"] {
            assert_eq!(ServoId::new(name).unwrap().as_str(), name);
        }
    }

    #[test]
    fn test_servo_id_rejects_framing_characters() {
        for name in ["", "L:1", "L1,L2", "L 1", "L1\n"] {
            assert_eq!(ServoId::new(name), Err(InvalidServoId(name.to_string())));
        }
    }

    #[test]
    fn test_leg_display_and_enumeration() {
        assert_eq!(Leg::new(Side::Right, Section::Mid).to_string(), "RIGHT-MID");
        assert_eq!(Leg::all().count(), 6);
    }

    #[test]
    fn test_side_section_serde_names() {
        assert_eq!(serde_json::to_string(&Side::Left).unwrap(), "\"LEFT\"");
        let section: Section = serde_json::from_str("\"BACK\"").unwrap();
        assert_eq!(section, Section::Back);
    }
}
