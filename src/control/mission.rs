//! Mission State Machine
//!
//! Drives one formation mission through a barrier-synchronised protocol:
//!
//! ```text
//! Idle -> Configuring -> AssignmentComputed -> Broadcasting -> AwaitingGo -> InProgress -> Completed
//!   ^                                                                                        |
//!   +------------------------------------ land / hold (any phase) ---------------------------+
//! ```
//!
//! Goals are re-broadcast every tick until every robot reports it holds its
//! goal; then the go signal is repeated until every robot reports arrival.
//! Only reports stamped after the first goal broadcast of a mission count
//! toward a barrier, so flags left over from the previous mission never
//! skip the broadcast.
//! The controller never touches the link: [`MissionController::tick`] returns
//! the [`MissionAction`] the caller must transmit.

use heapless::Vec;
use log::{info, warn};

use crate::control::formation::{Assignment, FormationEngine, FormationShape, StartConfiguration};
use crate::error::{FormationError, MissionError};
use crate::types::{now_ms, Position, RobotId, RobotState, MAX_FLEET_SIZE};

/// Mission phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissionPhase {
    /// No mission
    #[default]
    Idle,
    /// Snapshotting positions and validating
    Configuring,
    /// Goals and completion time known, nothing sent yet
    AssignmentComputed,
    /// Goals being re-broadcast until every robot holds its own
    Broadcasting,
    /// Every robot holds its goal; go signal being sent
    AwaitingGo,
    /// Every robot reported it started moving
    InProgress,
    /// Every robot arrived
    Completed,
}

/// Mission flags and per-robot barrier state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissionState {
    pub positions_set: bool,
    pub shape_set: bool,
    pub goals_set: bool,
    pub started: bool,
    pub ended: bool,
    /// Robot `i` reports holding its goal
    pub received_goal: Vec<bool, MAX_FLEET_SIZE>,
    /// Robot `i` reports being at its goal
    pub arrived: Vec<bool, MAX_FLEET_SIZE>,
}

impl MissionState {
    fn for_fleet(fleet_size: usize) -> Self {
        let mut state = Self::default();
        state.received_goal.resize(fleet_size, false).ok();
        state.arrived.resize(fleet_size, false).ok();
        state
    }

    fn clear_configuration(&mut self) {
        self.positions_set = false;
        self.shape_set = false;
        self.goals_set = false;
    }
}

/// What the station must transmit this tick
#[derive(Debug, Clone, PartialEq)]
pub enum MissionAction {
    /// Send each robot its goal and the shared completion time
    BroadcastGoals {
        goals: Vec<Position, MAX_FLEET_SIZE>,
        completion_time: f32,
    },
    /// Release the barrier: every robot starts moving
    Go,
}

/// Owner of the mission state and the current assignment
#[derive(Debug, Clone)]
pub struct MissionController {
    engine: FormationEngine,
    shape: FormationShape,
    fleet_size: usize,
    phase: MissionPhase,
    state: MissionState,
    assignment: Option<Assignment>,
    /// When this mission's goals were first handed out for transmission
    goals_sent_ms: Option<u64>,
    /// Ticks without a phase change before the laggards are reported (0 = never)
    stall_timeout_ticks: u32,
    ticks_in_phase: u32,
    stall_reported: bool,
}

impl MissionController {
    /// Controller for `fleet_size` robots flying into `shape`
    pub fn new(engine: FormationEngine, shape: FormationShape, fleet_size: usize) -> Self {
        Self {
            engine,
            shape,
            fleet_size,
            phase: MissionPhase::Idle,
            state: MissionState::for_fleet(fleet_size),
            assignment: None,
            goals_sent_ms: None,
            stall_timeout_ticks: 0,
            ticks_in_phase: 0,
            stall_reported: false,
        }
    }

    /// Report robots holding the barrier after `ticks` ticks without progress
    pub fn with_stall_timeout(mut self, ticks: u32) -> Self {
        self.stall_timeout_ticks = ticks;
        self
    }

    /// Current phase
    pub fn phase(&self) -> MissionPhase {
        self.phase
    }

    /// Current flags
    pub fn state(&self) -> &MissionState {
        &self.state
    }

    /// Assignment of the running mission
    pub fn assignment(&self) -> Option<&Assignment> {
        if self.state.goals_set {
            self.assignment.as_ref()
        } else {
            None
        }
    }

    /// Goals last broadcast, kept after completion until the next start
    pub fn last_broadcast(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    /// Whether a mission is running
    pub fn is_started(&self) -> bool {
        self.state.started
    }

    /// Start a mission from the latest telemetry of every robot.
    ///
    /// A robot that never reported makes the snapshot incomplete and the start
    /// is refused.
    pub fn start(&mut self, fleet: &[Option<RobotState>]) -> Result<&Assignment, MissionError> {
        if self.state.started {
            warn!("Mission already started");
            return Err(MissionError::AlreadyStarted);
        }

        let mut positions: Vec<Position, MAX_FLEET_SIZE> = Vec::new();
        for (index, report) in fleet.iter().enumerate() {
            let position = match report {
                Some(state) => state.position,
                None => {
                    return Err(self.refuse(FormationError::MissingPosition(RobotId::new(
                        index as u8,
                    ))))
                }
            };
            if positions.push(position).is_err() {
                return Err(self.refuse(FormationError::FleetTooLarge(fleet.len())));
            }
        }
        self.start_from_positions(&positions)
    }

    /// Start a mission from an explicit start configuration, indexed by RobotId
    pub fn start_from_positions(
        &mut self,
        positions: &[Position],
    ) -> Result<&Assignment, MissionError> {
        if self.state.started {
            warn!("Mission already started");
            return Err(MissionError::AlreadyStarted);
        }

        self.enter(MissionPhase::Configuring);
        self.state = MissionState::for_fleet(self.fleet_size);
        self.goals_sent_ms = None;

        let start = match StartConfiguration::new(positions) {
            Ok(start) => start,
            Err(e) => return Err(self.refuse(e)),
        };
        self.state.positions_set = true;
        self.state.shape_set = true;

        let assignment = match self.engine.compute_assignment(&start, &self.shape) {
            Ok(assignment) => assignment,
            Err(e) => return Err(self.refuse(e)),
        };

        info!(
            "Mission started: {} robots, completion time {:.2} s",
            assignment.len(),
            assignment.completion_time()
        );
        self.state.goals_set = true;
        self.state.started = true;
        self.state.ended = false;
        self.enter(MissionPhase::AssignmentComputed);
        Ok(&*self.assignment.insert(assignment))
    }

    fn refuse(&mut self, error: FormationError) -> MissionError {
        warn!("Mission not started: {}", error);
        self.state.clear_configuration();
        self.state.started = false;
        self.enter(MissionPhase::Idle);
        MissionError::InvalidConfiguration(error)
    }

    /// Land or hold: drop the mission whatever its phase
    pub fn abort(&mut self) {
        if self.state.started {
            info!("Mission aborted in phase {:?}", self.phase);
        }
        self.state.started = false;
        self.state.clear_configuration();
        self.assignment = None;
        self.goals_sent_ms = None;
        self.enter(MissionPhase::Idle);
    }

    /// Advance one control period with the latest fleet telemetry.
    ///
    /// The first tick of a mission always broadcasts the goals.
    pub fn tick(&mut self, fleet: &[Option<RobotState>]) -> Option<MissionAction> {
        if !self.state.started {
            return None;
        }
        let (goals, completion_time) = {
            let assignment = self.assignment.as_ref()?;
            let mut goals = Vec::new();
            goals.extend_from_slice(assignment.goals()).ok();
            (goals, assignment.completion_time())
        };

        let since = self.goals_sent_ms;
        let mut all_started = true;
        for i in 0..self.fleet_size {
            let report = fleet
                .get(i)
                .copied()
                .flatten()
                .filter(|s| since.map_or(false, |t| s.timestamp_ms >= t));
            let received = report.map_or(false, |s| s.received_goal);
            let arrived = report.map_or(false, |s| s.arrived);
            all_started &= report.map_or(false, |s| s.mission_started);
            if let Some(flag) = self.state.received_goal.get_mut(i) {
                *flag = received;
            }
            if let Some(flag) = self.state.arrived.get_mut(i) {
                *flag = arrived;
            }
        }

        let action = if !self.state.received_goal.iter().all(|&r| r) {
            self.advance(MissionPhase::Broadcasting);
            self.goals_sent_ms.get_or_insert_with(now_ms);
            MissionAction::BroadcastGoals {
                goals,
                completion_time,
            }
        } else {
            if all_started {
                self.advance(MissionPhase::InProgress);
            } else {
                self.advance(MissionPhase::AwaitingGo);
            }
            MissionAction::Go
        };

        if matches!(self.phase, MissionPhase::AwaitingGo | MissionPhase::InProgress)
            && self.state.arrived.iter().all(|&a| a)
        {
            self.complete();
        } else {
            self.check_stall();
        }

        Some(action)
    }

    fn complete(&mut self) {
        info!("Formation complete");
        self.state.ended = true;
        self.state.started = false;
        self.state.clear_configuration();
        self.enter(MissionPhase::Completed);
    }

    /// Move to `phase`, counting ticks if it is the current one
    fn advance(&mut self, phase: MissionPhase) {
        if phase == self.phase {
            self.ticks_in_phase = self.ticks_in_phase.saturating_add(1);
        } else {
            self.enter(phase);
        }
    }

    fn enter(&mut self, phase: MissionPhase) {
        self.phase = phase;
        self.ticks_in_phase = 0;
        self.stall_reported = false;
    }

    fn check_stall(&mut self) {
        if self.stall_timeout_ticks == 0
            || self.stall_reported
            || self.ticks_in_phase < self.stall_timeout_ticks
        {
            return;
        }
        let laggards = self.stalled_robots();
        if laggards.is_empty() {
            return;
        }
        let names: std::vec::Vec<String> = laggards.iter().map(|r| r.to_string()).collect();
        warn!(
            "Mission stalled in {:?} for {} ticks, waiting on {}",
            self.phase,
            self.ticks_in_phase,
            names.join(", ")
        );
        self.stall_reported = true;
    }

    /// Robots holding the current barrier.
    ///
    /// While broadcasting: robots without their goal. Afterwards: robots that
    /// have not arrived.
    pub fn stalled_robots(&self) -> Vec<RobotId, MAX_FLEET_SIZE> {
        let flags = match self.phase {
            MissionPhase::Broadcasting => &self.state.received_goal,
            MissionPhase::AwaitingGo | MissionPhase::InProgress => &self.state.arrived,
            _ => return Vec::new(),
        };
        flags
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(i, _)| RobotId::new(i as u8))
            .collect()
    }
}
