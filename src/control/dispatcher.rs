//! Command Dispatcher
//!
//! Turns operator requests into generic command messages and hands them to
//! the transport. Stateless apart from its configuration.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::control::operator::OperatorCommand;
use crate::error::DispatchError;
use crate::network::codec::Command;
use crate::network::transport::CommandTransport;
use crate::types::{Position, RobotId, Target};

/// Pause between the messages of one goal broadcast
pub const DEFAULT_BURST_DELAY: Duration = Duration::from_millis(10);

/// Operator command to wire translation
pub struct CommandDispatcher {
    transport: Arc<dyn CommandTransport>,
    station_address: u8,
    fleet_size: usize,
    burst_delay: Duration,
    origin: Position,
    east: Position,
}

impl CommandDispatcher {
    /// Dispatcher for a fleet of `fleet_size` robots
    pub fn new(transport: Arc<dyn CommandTransport>, station_address: u8, fleet_size: usize) -> Self {
        Self {
            transport,
            station_address,
            fleet_size,
            burst_delay: DEFAULT_BURST_DELAY,
            origin: Position::default(),
            east: Position::default(),
        }
    }

    /// Pause between per-robot goal messages (zero disables)
    pub fn with_burst_delay(mut self, delay: Duration) -> Self {
        self.burst_delay = delay;
        self
    }

    /// References used by `origin` / `east` requests without coordinates
    pub fn with_references(mut self, origin: Position, east: Position) -> Self {
        self.origin = origin;
        self.east = east;
        self
    }

    /// Send one command to one robot or to all of them.
    pub fn send(&self, command: Command, target: Target) -> Result<(), DispatchError> {
        let message = command.to_message(self.station_address, target);
        self.transport.send(&message)?;
        debug!("Sent {} to {}", command.id().name(), target);
        Ok(())
    }

    /// Release the barrier for every robot
    pub fn send_go(&self) -> Result<(), DispatchError> {
        self.send(Command::Go, Target::All)
    }

    /// Send each robot its goal and the shared completion time.
    ///
    /// Robot `i` gets `goals[i]`; messages go out in increasing RobotId order.
    pub fn broadcast_goals(&self, goals: &[Position], completion_time: f32) -> Result<(), DispatchError> {
        if goals.len() != self.fleet_size {
            return Err(DispatchError::GoalCount {
                expected: self.fleet_size,
                actual: goals.len(),
            });
        }

        for (index, goal) in goals.iter().enumerate() {
            if index > 0 && !self.burst_delay.is_zero() {
                std::thread::sleep(self.burst_delay);
            }
            let command = Command::SetGoal {
                goal: *goal,
                completion_time,
            };
            self.send(command, Target::Robot(RobotId::new(index as u8)))?;
        }
        Ok(())
    }

    /// Resolve an operator robot id (0 = all robots) against the fleet
    pub fn target(&self, id: u8) -> Result<Target, DispatchError> {
        Target::from_operator_id(id, self.fleet_size).map_err(DispatchError::RobotOutOfRange)
    }

    /// Translate and send one operator request.
    ///
    /// `StartMission` transmits nothing: the mission controller owns it.
    pub fn dispatch(&self, request: &OperatorCommand) -> Result<(), DispatchError> {
        match request {
            OperatorCommand::Arm(id) => self.send(Command::Arm, self.target(*id)?),
            OperatorCommand::Disarm(id) => self.send(Command::Disarm, self.target(*id)?),
            OperatorCommand::Takeoff(id) => self.send(Command::Takeoff, self.target(*id)?),
            OperatorCommand::Land(id) => self.send(Command::Land, self.target(*id)?),
            OperatorCommand::Hold(id) => self.send(Command::Hold, self.target(*id)?),
            OperatorCommand::PositionControl(id) => {
                self.send(Command::PositionControl, self.target(*id)?)
            }
            OperatorCommand::Shutdown(id) => self.send(Command::Shutdown, self.target(*id)?),
            OperatorCommand::Reboot(id) => self.send(Command::Reboot, self.target(*id)?),
            OperatorCommand::SetRobotCount(n) => {
                if usize::from(*n) != self.fleet_size {
                    warn!(
                        "Telling robots the fleet has {} robots, station is configured for {}",
                        n, self.fleet_size
                    );
                }
                self.send(Command::SetRobotCount(*n), Target::All)
            }
            OperatorCommand::SetOrigin(point) => {
                self.send(Command::SetOrigin(point.unwrap_or(self.origin)), Target::All)
            }
            OperatorCommand::SetEastReference(point) => {
                self.send(Command::SetEastReference(point.unwrap_or(self.east)), Target::All)
            }
            OperatorCommand::SetTakeoffAltitude(altitude) => {
                self.send(Command::SetTakeoffAltitude(*altitude), Target::All)
            }
            OperatorCommand::FormationGoals {
                goals,
                completion_time,
            } => self.broadcast_goals(goals, *completion_time),
            OperatorCommand::Go => self.send_go(),
            OperatorCommand::StartMission => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::loopback::{LoopbackTransport, RobotEndpoint};

    fn dispatcher(fleet_size: usize) -> (CommandDispatcher, RobotEndpoint) {
        let (link, fleet) = LoopbackTransport::pair(255);
        let dispatcher = CommandDispatcher::new(Arc::new(link), 255, fleet_size)
            .with_burst_delay(Duration::ZERO)
            .with_references(Position::new(1.0, 2.0, 3.0), Position::new(4.0, 5.0, 6.0));
        (dispatcher, fleet)
    }

    #[test]
    fn test_operator_ids_are_wire_addresses() {
        let (d, fleet) = dispatcher(3);
        d.dispatch(&OperatorCommand::Takeoff(0)).unwrap();
        d.dispatch(&OperatorCommand::Takeoff(3)).unwrap();
        assert!(matches!(
            d.dispatch(&OperatorCommand::Takeoff(4)),
            Err(DispatchError::RobotOutOfRange(4))
        ));

        let (sent, _) = fleet.drain_commands();
        let targets: Vec<u8> = sent.iter().map(|m| m.target).collect();
        assert_eq!(targets, vec![0, 3]);
        assert!(sent.iter().all(|m| m.to_command() == Ok(Command::Takeoff)));
        assert!(sent.iter().all(|m| m.source == 255));
    }

    #[test]
    fn test_goals_in_robot_order() {
        let (d, fleet) = dispatcher(3);
        let goals = [
            Position::new(0.0, 2.0, 0.0),
            Position::new(1.0, 2.0, 0.0),
            Position::new(2.0, 2.0, 0.0),
        ];
        d.broadcast_goals(&goals, 2.0).unwrap();

        let (sent, _) = fleet.drain_commands();
        assert_eq!(sent.len(), 3);
        for (i, message) in sent.iter().enumerate() {
            assert_eq!(message.target as usize, i + 1);
            assert_eq!(
                message.to_command(),
                Ok(Command::SetGoal {
                    goal: goals[i],
                    completion_time: 2.0
                })
            );
        }

        assert!(matches!(
            d.broadcast_goals(&goals[..2], 2.0),
            Err(DispatchError::GoalCount { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn test_configured_references() {
        let (d, fleet) = dispatcher(2);
        d.dispatch(&OperatorCommand::SetOrigin(None)).unwrap();
        d.dispatch(&OperatorCommand::SetEastReference(Some(Position::new(9.0, 9.0, 9.0))))
            .unwrap();
        d.dispatch(&OperatorCommand::StartMission).unwrap();

        let (sent, _) = fleet.drain_commands();
        let commands: Vec<_> = sent.iter().map(|m| m.to_command().unwrap()).collect();
        assert_eq!(
            commands,
            vec![
                Command::SetOrigin(Position::new(1.0, 2.0, 3.0)),
                Command::SetEastReference(Position::new(9.0, 9.0, 9.0)),
            ]
        );
    }

    #[test]
    fn test_closed_link_surfaces() {
        let (d, fleet) = dispatcher(1);
        drop(fleet);
        assert!(matches!(d.send_go(), Err(DispatchError::Transport(_))));
    }
}
