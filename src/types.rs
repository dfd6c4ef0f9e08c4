//! Core type definitions for the formation ground station

use core::fmt;
use core::ops::Sub;
use serde::{Deserialize, Serialize};

/// Maximum supported fleet size.
///
/// Robot wire addresses occupy `1..=n` and the ground station sits above
/// them, so the fleet must leave room for the station address.
pub const MAX_FLEET_SIZE: usize = 64;

/// Wire address meaning "every robot".
pub const BROADCAST_ADDRESS: u8 = 0;

/// Default wire address of the ground station.
pub const DEFAULT_STATION_ADDRESS: u8 = 255;

/// Index of a robot within the fleet, in `[0, n)`.
///
/// On the wire a robot is addressed as `index + 1`; address 0 is the
/// broadcast address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RobotId(pub u8);

impl RobotId {
    /// Create a new RobotId from a fleet index
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Fleet index as usize, for slice access
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Wire address of this robot (`index + 1`)
    pub const fn wire_address(&self) -> u8 {
        self.0 + 1
    }

    /// Map a wire source/target address back to a robot in a fleet of `fleet_size`.
    ///
    /// Returns `None` for the broadcast address and for anything above the fleet.
    pub fn from_wire_address(address: u8, fleet_size: usize) -> Option<Self> {
        if address == BROADCAST_ADDRESS || address as usize > fleet_size {
            return None;
        }
        Some(Self(address - 1))
    }
}

impl fmt::Display for RobotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Robot {}", self.0)
    }
}

/// Addressee of an outbound command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Every robot (wire address 0)
    All,
    /// A single robot
    Robot(RobotId),
}

impl Target {
    /// Wire target address
    pub const fn wire_address(&self) -> u8 {
        match self {
            Target::All => BROADCAST_ADDRESS,
            Target::Robot(id) => id.wire_address(),
        }
    }

    /// Interpret an operator-supplied id: 0 is everyone, `k` is robot `k - 1`.
    ///
    /// Ids beyond the fleet are rejected with the offending id.
    pub fn from_operator_id(id: u8, fleet_size: usize) -> core::result::Result<Self, u8> {
        if id == BROADCAST_ADDRESS {
            return Ok(Target::All);
        }
        RobotId::from_wire_address(id, fleet_size)
            .map(Target::Robot)
            .ok_or(id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::All => write!(f, "all robots"),
            Target::Robot(id) => write!(f, "{} (wire {})", id, id.wire_address()),
        }
    }
}

/// 3D position in the shared local tangent-plane frame
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate (meters)
    pub x: f32,
    /// Y coordinate (meters)
    pub y: f32,
    /// Z coordinate (meters)
    pub z: f32,
}

impl Position {
    /// Create a position from its components
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Calculate Euclidean distance to another position
    pub fn distance_to(&self, other: &Position) -> f32 {
        let d = *self - *other;
        (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
    }

    /// Dot product, treating both positions as vectors from the frame origin
    pub fn dot(&self, other: &Position) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Whether every component is finite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl From<[f32; 3]> for Position {
    fn from(p: [f32; 3]) -> Self {
        Position::new(p[0], p[1], p[2])
    }
}

impl From<Position> for [f32; 3] {
    fn from(p: Position) -> Self {
        [p.x, p.y, p.z]
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Latest state reported by a robot, as published on its state channel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotState {
    /// Reception time (milliseconds since the UNIX epoch)
    pub timestamp_ms: u64,
    /// Robot holds the goal of the current mission
    pub received_goal: bool,
    /// Robot has started moving towards its goal
    pub mission_started: bool,
    /// Robot reached its goal
    pub arrived: bool,
    /// Current position
    pub position: Position,
}

/// Milliseconds since the UNIX epoch, saturating to 0 on a clock before 1970
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_address_offset() {
        assert_eq!(RobotId::new(0).wire_address(), 1);
        assert_eq!(RobotId::new(4).wire_address(), 5);
        assert_eq!(RobotId::from_wire_address(1, 5), Some(RobotId::new(0)));
        assert_eq!(RobotId::from_wire_address(5, 5), Some(RobotId::new(4)));
        assert_eq!(RobotId::from_wire_address(0, 5), None);
        assert_eq!(RobotId::from_wire_address(6, 5), None);
    }

    #[test]
    fn test_operator_target() {
        assert_eq!(Target::from_operator_id(0, 3), Ok(Target::All));
        assert_eq!(Target::from_operator_id(2, 3), Ok(Target::Robot(RobotId::new(1))));
        assert_eq!(Target::from_operator_id(4, 3), Err(4));
        assert_eq!(Target::All.wire_address(), 0);
    }

    #[test]
    fn test_position_math() {
        let a = Position::new(0.0, 0.0, 0.0);
        let b = Position::new(3.0, 4.0, 0.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-6);
        assert_eq!(b.dot(&Position::new(1.0, 1.0, 1.0)), 7.0);
    }
}
