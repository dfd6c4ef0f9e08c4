//! Formation Assignment Engine
//!
//! Decides which robot flies to which slot of the target formation and when
//! the whole fleet is expected to be there.
//!
//! Given start positions `P` and formation slots `S`, the engine:
//! 1. refuses configurations where two robots (or two slots) are closer than
//!    `delta = 2·√2·R`,
//! 2. solves the min-cost bijection over `K[i][j] = −(P[i]·S[j])` with the
//!    Kuhn–Munkres algorithm,
//! 3. sets the shared deadline `tf = max_i ‖P[i] − Goal[i]‖ / vmax`.

use std::time::Instant;

use heapless::Vec;
use log::{debug, info};
use pathfinding::kuhn_munkres::kuhn_munkres_min;
use pathfinding::matrix::Matrix;

use crate::error::FormationError;
use crate::types::{Position, RobotId, MAX_FLEET_SIZE};

/// Fixed-point scale applied to assignment costs before solving
pub const COST_SCALE: f64 = 1e4;

/// Minimum centre-to-centre spacing for robots of radius `robot_radius`
pub fn separation_threshold(robot_radius: f32) -> f32 {
    2.0 * core::f32::consts::SQRT_2 * robot_radius
}

/// Target geometry: slot `j` is where some robot must end up
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormationShape {
    slots: Vec<Position, MAX_FLEET_SIZE>,
}

impl FormationShape {
    /// Build a shape from its slots
    pub fn new(slots: &[Position]) -> Result<Self, FormationError> {
        Ok(Self {
            slots: bounded(slots)?,
        })
    }

    /// Slots in order
    pub fn slots(&self) -> &[Position] {
        &self.slots
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the shape has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Snapshot of every robot's position at mission start, indexed by RobotId
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartConfiguration {
    positions: Vec<Position, MAX_FLEET_SIZE>,
}

impl StartConfiguration {
    /// Build a snapshot from positions indexed by RobotId
    pub fn new(positions: &[Position]) -> Result<Self, FormationError> {
        Ok(Self {
            positions: bounded(positions)?,
        })
    }

    /// Positions indexed by RobotId
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Fleet size
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no robot is present
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

fn bounded(items: &[Position]) -> Result<Vec<Position, MAX_FLEET_SIZE>, FormationError> {
    Vec::from_slice(items).map_err(|_| FormationError::FleetTooLarge(items.len()))
}

/// Robot-to-slot bijection with per-robot goals and the shared deadline
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    slots: Vec<usize, MAX_FLEET_SIZE>,
    goals: Vec<Position, MAX_FLEET_SIZE>,
    completion_time: f32,
}

impl Assignment {
    /// Slot index assigned to each robot
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    /// Goal of each robot, indexed by RobotId
    pub fn goals(&self) -> &[Position] {
        &self.goals
    }

    /// Goal of one robot
    pub fn goal(&self, robot: RobotId) -> Option<Position> {
        self.goals.get(robot.index()).copied()
    }

    /// Seconds the slowest robot needs at maximum velocity
    pub fn completion_time(&self) -> f32 {
        self.completion_time
    }

    /// Number of robots assigned
    pub fn len(&self) -> usize {
        self.goals.len()
    }

    /// Whether the assignment is empty
    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }
}

/// Spacing validation and slot assignment for one fleet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormationEngine {
    robot_radius: f32,
    max_velocity: f32,
}

impl FormationEngine {
    /// Create an engine for robots of `robot_radius` flying at most `max_velocity`
    pub fn new(robot_radius: f32, max_velocity: f32) -> Result<Self, FormationError> {
        if !robot_radius.is_finite() || robot_radius < 0.0 {
            return Err(FormationError::InvalidParameter("robot radius"));
        }
        if !max_velocity.is_finite() || max_velocity <= 0.0 {
            return Err(FormationError::InvalidParameter("maximum velocity"));
        }
        Ok(Self {
            robot_radius,
            max_velocity,
        })
    }

    /// Minimum spacing between any two robots or any two slots
    pub fn delta(&self) -> f32 {
        separation_threshold(self.robot_radius)
    }

    /// Check sizes and spacing of a start configuration against a shape.
    pub fn validate(
        &self,
        start: &StartConfiguration,
        shape: &FormationShape,
    ) -> Result<(), FormationError> {
        if start.is_empty() {
            return Err(FormationError::EmptyFleet);
        }
        if start.len() != shape.len() {
            return Err(FormationError::SizeMismatch {
                robots: start.len(),
                slots: shape.len(),
            });
        }
        if !start.positions().iter().all(Position::is_finite)
            || !shape.slots().iter().all(Position::is_finite)
        {
            return Err(FormationError::InvalidParameter("non-finite coordinate"));
        }

        let threshold = self.delta();
        if let Some((first, second, distance)) = closest_violation(start.positions(), threshold) {
            return Err(FormationError::RobotsTooClose {
                first,
                second,
                distance,
                threshold,
            });
        }
        if let Some((first, second, distance)) = closest_violation(shape.slots(), threshold) {
            return Err(FormationError::GoalsTooClose {
                first,
                second,
                distance,
                threshold,
            });
        }
        Ok(())
    }

    /// Validate, then solve the assignment and the completion time.
    pub fn compute_assignment(
        &self,
        start: &StartConfiguration,
        shape: &FormationShape,
    ) -> Result<Assignment, FormationError> {
        self.validate(start, shape)?;

        let n = start.len();
        let started = Instant::now();

        let mut costs = std::vec::Vec::with_capacity(n * n);
        for p in start.positions() {
            for s in shape.slots() {
                let cost = -f64::from(p.dot(s)) * COST_SCALE;
                if !cost.is_finite() || cost.abs() >= i64::MAX as f64 / MAX_FLEET_SIZE as f64 {
                    return Err(FormationError::Solver(format!(
                        "cost {} out of range",
                        cost
                    )));
                }
                costs.push(cost.round() as i64);
            }
        }
        let matrix =
            Matrix::from_vec(n, n, costs).map_err(|e| FormationError::Solver(e.to_string()))?;
        let (total, columns) = kuhn_munkres_min(&matrix);

        let mut slots = Vec::new();
        let mut goals = Vec::new();
        let mut completion_time = 0.0_f32;
        for (robot, &slot) in columns.iter().enumerate() {
            let goal = shape.slots()[slot];
            let travel = start.positions()[robot].distance_to(&goal) / self.max_velocity;
            completion_time = completion_time.max(travel);
            slots
                .push(slot)
                .map_err(|_| FormationError::FleetTooLarge(n))?;
            goals
                .push(goal)
                .map_err(|_| FormationError::FleetTooLarge(n))?;
        }

        info!(
            "Assignment for {} robots solved in {:?} (tf = {:.2} s)",
            n,
            started.elapsed(),
            completion_time
        );
        debug!("Assignment slots {:?}, scaled cost {}", slots, total);

        Ok(Assignment {
            slots,
            goals,
            completion_time,
        })
    }
}

/// First pair (in index order) not strictly farther apart than `threshold`
fn closest_violation(points: &[Position], threshold: f32) -> Option<(usize, usize, f32)> {
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let distance = points[i].distance_to(&points[j]);
            if distance <= threshold {
                return Some((i, j, distance));
            }
        }
    }
    None
}
