//! Wire protocol tests
//!
//! Opcode catalog, parameter layout, addressing, and receiver filtering over
//! the in-process link.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use formation_master::error::ProtocolError;
use formation_master::network::codec::{decode, Command, CommandId, CommandMessage, OpcodeClass, Report};
use formation_master::network::{CommandTransport, LoopbackTransport, RawMessage};
use formation_master::*;

fn raw(message: &CommandMessage) -> RawMessage {
    RawMessage {
        header: message.header(0),
        message: message.to_mavlink(),
    }
}

#[cfg(test)]
mod catalog_tests {
    use super::*;

    #[test]
    fn test_every_command_uses_the_command_class() {
        let commands = [
            Command::Arm,
            Command::Disarm,
            Command::Takeoff,
            Command::Land,
            Command::PositionControl,
            Command::Hold,
            Command::Shutdown,
            Command::Reboot,
            Command::SetOrigin(Position::new(1.0, 2.0, 3.0)),
            Command::SetEastReference(Position::new(4.0, 5.0, 6.0)),
            Command::SetRobotCount(5),
            Command::Go,
            Command::SetGoal {
                goal: Position::new(7.0, 8.0, 9.0),
                completion_time: 10.0,
            },
            Command::SetTakeoffAltitude(2.0),
        ];
        for command in commands {
            let message = command.to_message(255, Target::All);
            assert_eq!(message.class(), Some(OpcodeClass::Command));
            assert_eq!(message.opcode_id, command.id().wire());
            let decoded = decode(&raw(&message)).expect("generic command");
            assert_eq!(decoded.to_command(), Ok(command));
        }
    }

    #[test]
    fn test_catalog_names() {
        assert_eq!(CommandId::Takeoff.name(), "MASTER_CMD_TKO");
        assert_eq!(CommandId::SetRobotCount.name(), "MASTER_CMD_SET_nROBOTS");
        for id in CommandId::ALL {
            assert_eq!(CommandId::from_wire(id.wire()), Some(id));
        }
    }

    #[test]
    fn test_unused_slots_are_zero() {
        let message = Command::SetRobotCount(4).to_message(255, Target::All);
        assert_eq!(message.params, [4.0, 0.0, 0.0, 0.0, 0.0]);
        let message = Command::Reboot.to_message(255, Target::All);
        assert_eq!(message.params, [0.0; 5]);
    }

    #[test]
    fn test_unknown_command_id() {
        let mut message = Command::Go.to_message(255, Target::All);
        message.opcode_id = 99;
        assert_eq!(message.to_command(), Err(ProtocolError::UnknownCommand(99)));
    }
}

#[cfg(test)]
mod addressing_tests {
    use super::*;

    #[test]
    fn test_address_round_trip() {
        for n in 1..=MAX_FLEET_SIZE {
            for index in 0..n {
                let id = RobotId::new(index as u8);
                assert_eq!(RobotId::from_wire_address(id.wire_address(), n), Some(id));
            }
            assert_eq!(RobotId::from_wire_address(0, n), None);
            assert_eq!(RobotId::from_wire_address(n as u8 + 1, n), None);
        }
    }

    #[test]
    fn test_broadcast_target() {
        let message = Command::Go.to_message(255, Target::All);
        assert_eq!(message.target, BROADCAST_ADDRESS);
        let message = Command::Go.to_message(255, Target::Robot(RobotId::new(0)));
        assert_eq!(message.target, 1);
    }
}

#[cfg(test)]
mod receiver_tests {
    use super::*;

    #[test]
    fn test_receiver_filters_and_publishes() {
        let board = Arc::new(StateBoard::new(2));
        let receiver = TelemetryReceiver::new(255, 2, board.clone(), 0);

        let state = RobotState {
            timestamp_ms: 0,
            received_goal: true,
            mission_started: false,
            arrived: false,
            position: Position::new(3.0, 4.0, 5.0),
        };
        let good = CommandMessage::state_report(RobotId::new(1), 255, &state);
        let foreign = CommandMessage::state_report(RobotId::new(1), 200, &state);

        assert!(!receiver.process(&raw(&foreign)));
        assert!(receiver.process(&raw(&good)));

        let snapshot = board.snapshot();
        assert!(snapshot[0].is_none());
        let published = snapshot[1].expect("robot 1 published");
        assert_eq!(published.position, state.position);
        assert!(published.received_goal);
    }

    #[test]
    fn test_receiver_stops_on_closed_link() {
        let (link, fleet) = LoopbackTransport::pair(255);
        let link = link.with_poll_timeout(Duration::from_millis(5));
        let board = Arc::new(StateBoard::new(1));
        let receiver = TelemetryReceiver::new(255, 1, board.clone(), 50);

        assert!(fleet.acknowledge(RobotId::new(0), CommandId::Hold));
        assert!(fleet.report_state(RobotId::new(0), &RobotState::default()));
        drop(fleet);

        let running = AtomicBool::new(true);
        let result = receiver.run(&link, &running);
        assert!(result.is_err());
        assert!(board.state(RobotId::new(0)).is_some());
        assert_eq!(board.last_ack(RobotId::new(0)), Some(CommandId::Hold));
    }

    #[test]
    fn test_receiver_exits_when_stopped() {
        let (link, _fleet) = LoopbackTransport::pair(255);
        let receiver = TelemetryReceiver::new(255, 1, StateBoard::new(1), 50);
        let running = AtomicBool::new(false);
        assert!(receiver.run(&link, &running).is_ok());
    }

    #[test]
    fn test_handle_returns_typed_reports() {
        let receiver = TelemetryReceiver::new(255, 3, StateBoard::new(3), 50);
        let ack = CommandMessage::acknowledgment(RobotId::new(2), 255, CommandId::SetGoal);
        assert_eq!(
            receiver.handle(&raw(&ack)),
            Ok(Report::Acknowledgment {
                robot: RobotId::new(2),
                command: CommandId::SetGoal
            })
        );
    }

    #[test]
    fn test_station_heartbeat_is_not_telemetry() {
        let (link, fleet) = LoopbackTransport::pair(255);
        link.send_heartbeat().unwrap();
        let frames = fleet.drain();
        assert_eq!(frames.len(), 1);

        let receiver = TelemetryReceiver::new(255, 3, StateBoard::new(3), 50);
        assert_eq!(
            receiver.handle(&frames[0]),
            Err(ProtocolError::NotGenericCommand)
        );
    }
}
