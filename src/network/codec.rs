//! Generic command codec
//!
//! Every ground-to-robot command and every robot-to-ground report travels as a
//! single MAVLink `COMMAND_LONG` carrying `MAV_CMD_USER_1`:
//!
//! | slot   | meaning                           |
//! |--------|-----------------------------------|
//! | param1 | opcode class ([`OpcodeClass`])    |
//! | param2 | opcode id ([`CommandId`])         |
//! | param3..param7 | five numeric parameters, unused ones 0 |
//!
//! Robot state reports reuse the opcode id slot for the received-goal flag:
//! `param2 = received_goal`, `param3 = mission_started`, `param4 = arrived`,
//! `param5..param7 = x, y, z`. Flags are "non-zero is true".
//!
//! The untyped [`CommandMessage`] never leaves this module's callers for long:
//! it converts straight into [`Command`] or [`Report`].

use mavlink::common::{MavCmd, MavMessage, COMMAND_LONG_DATA};
use mavlink::MavHeader;

use crate::error::ProtocolError;
use crate::network::transport::RawMessage;
use crate::types::{Position, RobotId, RobotState, Target};

/// MAVLink command number carrying the generic command channel
pub const GENERIC_COMMAND: MavCmd = MavCmd::MAV_CMD_USER_1;

/// Number of numeric parameters after the opcode pair
pub const PARAM_SLOTS: usize = 5;

/// Component id used for every transmission
pub const COMPONENT_ID: u8 = 0;

/// First-level opcode: what kind of message this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum OpcodeClass {
    /// Robot to ground: periodic state report
    RobotState = 1,
    /// Ground to robot: command
    Command = 2,
    /// Robot to ground: command acknowledgment
    Acknowledge = 16,
}

impl OpcodeClass {
    /// Parse a wire value
    pub fn from_wire(value: u16) -> Option<Self> {
        match value {
            1 => Some(OpcodeClass::RobotState),
            2 => Some(OpcodeClass::Command),
            16 => Some(OpcodeClass::Acknowledge),
            _ => None,
        }
    }

    /// Wire value
    pub const fn wire(self) -> u16 {
        self as u16
    }
}

/// Second-level opcode: which command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CommandId {
    /// Arm (p3 = 1) or disarm (p3 = 0)
    Arm = 3,
    Takeoff = 4,
    Land = 5,
    PositionControl = 6,
    Hold = 7,
    Shutdown = 8,
    Reboot = 9,
    SetOrigin = 10,
    SetEastReference = 11,
    SetRobotCount = 12,
    Go = 13,
    SetGoal = 14,
    SetTakeoffAltitude = 15,
    Acknowledge = 16,
}

impl CommandId {
    /// Every id in the catalog, in wire order
    pub const ALL: [CommandId; 14] = [
        CommandId::Arm,
        CommandId::Takeoff,
        CommandId::Land,
        CommandId::PositionControl,
        CommandId::Hold,
        CommandId::Shutdown,
        CommandId::Reboot,
        CommandId::SetOrigin,
        CommandId::SetEastReference,
        CommandId::SetRobotCount,
        CommandId::Go,
        CommandId::SetGoal,
        CommandId::SetTakeoffAltitude,
        CommandId::Acknowledge,
    ];

    /// Parse a wire value
    pub fn from_wire(value: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.wire() == value)
    }

    /// Wire value
    pub const fn wire(self) -> u16 {
        self as u16
    }

    /// Catalog name, as robot firmware logs it
    pub const fn name(self) -> &'static str {
        match self {
            CommandId::Arm => "MASTER_CMD_ARM",
            CommandId::Takeoff => "MASTER_CMD_TKO",
            CommandId::Land => "MASTER_CMD_LAND",
            CommandId::PositionControl => "MASTER_CMD_POSCTL",
            CommandId::Hold => "MASTER_CMD_HOLD",
            CommandId::Shutdown => "MASTER_CMD_SHUTDOWN",
            CommandId::Reboot => "MASTER_CMD_REBOOT",
            CommandId::SetOrigin => "MASTER_CMD_SET_ORIGIN",
            CommandId::SetEastReference => "MASTER_CMD_SET_EAST",
            CommandId::SetRobotCount => "MASTER_CMD_SET_nROBOTS",
            CommandId::Go => "MASTER_CMD_GO",
            CommandId::SetGoal => "MASTER_CMD_GOAL",
            CommandId::SetTakeoffAltitude => "MASTER_CMD_SET_TOALT",
            CommandId::Acknowledge => "MASTER_CMD_ACK",
        }
    }
}

/// Untyped wire shape: opcode pair plus five numeric slots
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandMessage {
    /// Sender wire address
    pub source: u8,
    /// Receiver wire address (0 = all robots)
    pub target: u8,
    /// First-level opcode (param1)
    pub opcode_class: u16,
    /// Second-level opcode (param2)
    pub opcode_id: u16,
    /// param3..param7
    pub params: [f32; PARAM_SLOTS],
}

/// Build a generic command message.
pub fn encode(
    source: u8,
    target: u8,
    opcode_class: u16,
    opcode_id: u16,
    params: [f32; PARAM_SLOTS],
) -> CommandMessage {
    CommandMessage {
        source,
        target,
        opcode_class,
        opcode_id,
        params,
    }
}

/// Extract a generic command message from a raw MAVLink message.
///
/// Returns `None` for any other message kind, and for opcode slots that do not
/// hold a non-negative integer.
pub fn decode(raw: &RawMessage) -> Option<CommandMessage> {
    let MavMessage::COMMAND_LONG(data) = &raw.message else {
        return None;
    };
    if data.command != GENERIC_COMMAND {
        return None;
    }

    Some(CommandMessage {
        source: raw.header.system_id,
        target: data.target_system,
        opcode_class: opcode(data.param1)?,
        opcode_id: opcode(data.param2)?,
        params: [data.param3, data.param4, data.param5, data.param6, data.param7],
    })
}

fn opcode(value: f32) -> Option<u16> {
    if value.is_finite() && value >= 0.0 && value <= u16::MAX as f32 && value.fract() == 0.0 {
        Some(value as u16)
    } else {
        None
    }
}

fn flag(value: f32) -> bool {
    value != 0.0 && !value.is_nan()
}

fn bit(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

impl CommandMessage {
    /// Decoded first-level opcode, if known
    pub fn class(&self) -> Option<OpcodeClass> {
        OpcodeClass::from_wire(self.opcode_class)
    }

    /// Robot-side state report, packed as described in the module docs.
    pub fn state_report(robot: RobotId, station: u8, state: &RobotState) -> Self {
        encode(
            robot.wire_address(),
            station,
            OpcodeClass::RobotState.wire(),
            state.received_goal as u16,
            [
                bit(state.mission_started),
                bit(state.arrived),
                state.position.x,
                state.position.y,
                state.position.z,
            ],
        )
    }

    /// Robot-side acknowledgment of `command`.
    pub fn acknowledgment(robot: RobotId, station: u8, command: CommandId) -> Self {
        encode(
            robot.wire_address(),
            station,
            OpcodeClass::Acknowledge.wire(),
            command.wire(),
            [0.0; PARAM_SLOTS],
        )
    }

    /// MAVLink message carrying this command
    pub fn to_mavlink(&self) -> MavMessage {
        MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: self.target,
            target_component: COMPONENT_ID,
            command: GENERIC_COMMAND,
            confirmation: 0,
            param1: self.opcode_class as f32,
            param2: self.opcode_id as f32,
            param3: self.params[0],
            param4: self.params[1],
            param5: self.params[2],
            param6: self.params[3],
            param7: self.params[4],
        })
    }

    /// MAVLink header for this message with the given sequence number
    pub fn header(&self, sequence: u8) -> MavHeader {
        MavHeader {
            system_id: self.source,
            component_id: COMPONENT_ID,
            sequence,
        }
    }

    /// Interpret a robot-to-ground message from a fleet of `fleet_size`.
    ///
    /// The returned state carries a zero timestamp; the receiver stamps it.
    pub fn to_report(&self, fleet_size: usize) -> Result<Report, ProtocolError> {
        let robot = RobotId::from_wire_address(self.source, fleet_size)
            .ok_or(ProtocolError::UnknownSource(self.source))?;

        match self.class() {
            Some(OpcodeClass::RobotState) => Ok(Report::State {
                robot,
                state: RobotState {
                    timestamp_ms: 0,
                    received_goal: self.opcode_id != 0,
                    mission_started: flag(self.params[0]),
                    arrived: flag(self.params[1]),
                    position: Position::new(self.params[2], self.params[3], self.params[4]),
                },
            }),
            Some(OpcodeClass::Acknowledge) => {
                let command = CommandId::from_wire(self.opcode_id)
                    .ok_or(ProtocolError::UnknownCommand(self.opcode_id))?;
                Ok(Report::Acknowledgment { robot, command })
            }
            _ => Err(ProtocolError::UnexpectedClass(self.opcode_class)),
        }
    }

    /// Interpret a ground-to-robot message, as robot firmware would.
    pub fn to_command(&self) -> Result<Command, ProtocolError> {
        if self.class() != Some(OpcodeClass::Command) {
            return Err(ProtocolError::UnexpectedClass(self.opcode_class));
        }
        let id = CommandId::from_wire(self.opcode_id)
            .ok_or(ProtocolError::UnknownCommand(self.opcode_id))?;
        let [p3, p4, p5, p6, _] = self.params;

        let command = match id {
            CommandId::Arm if flag(p3) => Command::Arm,
            CommandId::Arm => Command::Disarm,
            CommandId::Takeoff => Command::Takeoff,
            CommandId::Land => Command::Land,
            CommandId::PositionControl => Command::PositionControl,
            CommandId::Hold => Command::Hold,
            CommandId::Shutdown => Command::Shutdown,
            CommandId::Reboot => Command::Reboot,
            CommandId::SetOrigin => Command::SetOrigin(Position::new(p3, p4, p5)),
            CommandId::SetEastReference => Command::SetEastReference(Position::new(p3, p4, p5)),
            CommandId::SetRobotCount => Command::SetRobotCount(p3.clamp(0.0, u8::MAX as f32) as u8),
            CommandId::Go => Command::Go,
            CommandId::SetGoal => Command::SetGoal {
                goal: Position::new(p3, p4, p5),
                completion_time: p6,
            },
            CommandId::SetTakeoffAltitude => Command::SetTakeoffAltitude(p3),
            CommandId::Acknowledge => return Err(ProtocolError::UnknownCommand(id.wire())),
        };
        Ok(command)
    }
}

/// Typed ground-to-robot command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Arm,
    Disarm,
    Takeoff,
    Land,
    PositionControl,
    Hold,
    Shutdown,
    Reboot,
    /// Local frame origin reference
    SetOrigin(Position),
    /// Point defining the east axis of the local frame
    SetEastReference(Position),
    SetRobotCount(u8),
    /// Start moving towards the assigned goal
    Go,
    /// Assigned goal and the shared completion time (seconds)
    SetGoal { goal: Position, completion_time: f32 },
    SetTakeoffAltitude(f32),
}

impl Command {
    /// Wire id of this command
    pub const fn id(&self) -> CommandId {
        match self {
            Command::Arm | Command::Disarm => CommandId::Arm,
            Command::Takeoff => CommandId::Takeoff,
            Command::Land => CommandId::Land,
            Command::PositionControl => CommandId::PositionControl,
            Command::Hold => CommandId::Hold,
            Command::Shutdown => CommandId::Shutdown,
            Command::Reboot => CommandId::Reboot,
            Command::SetOrigin(_) => CommandId::SetOrigin,
            Command::SetEastReference(_) => CommandId::SetEastReference,
            Command::SetRobotCount(_) => CommandId::SetRobotCount,
            Command::Go => CommandId::Go,
            Command::SetGoal { .. } => CommandId::SetGoal,
            Command::SetTakeoffAltitude(_) => CommandId::SetTakeoffAltitude,
        }
    }

    /// The five parameter slots, unused ones 0
    pub fn params(&self) -> [f32; PARAM_SLOTS] {
        match *self {
            Command::Arm => [1.0, 0.0, 0.0, 0.0, 0.0],
            Command::SetOrigin(p) | Command::SetEastReference(p) => [p.x, p.y, p.z, 0.0, 0.0],
            Command::SetRobotCount(n) => [n as f32, 0.0, 0.0, 0.0, 0.0],
            Command::SetGoal {
                goal,
                completion_time,
            } => [goal.x, goal.y, goal.z, completion_time, 0.0],
            Command::SetTakeoffAltitude(altitude) => [altitude, 0.0, 0.0, 0.0, 0.0],
            _ => [0.0; PARAM_SLOTS],
        }
    }

    /// Encode this command from `source` to `target`
    pub fn to_message(&self, source: u8, target: Target) -> CommandMessage {
        encode(
            source,
            target.wire_address(),
            OpcodeClass::Command.wire(),
            self.id().wire(),
            self.params(),
        )
    }
}

/// Typed robot-to-ground message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Report {
    /// Periodic state report
    State { robot: RobotId, state: RobotState },
    /// Robot confirmed reception of a command
    Acknowledgment { robot: RobotId, command: CommandId },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(message: &CommandMessage) -> RawMessage {
        RawMessage {
            header: message.header(0),
            message: message.to_mavlink(),
        }
    }

    #[test]
    fn test_command_ids_match_catalog() {
        assert_eq!(CommandId::Arm.wire(), 3);
        assert_eq!(CommandId::Go.wire(), 13);
        assert_eq!(CommandId::Acknowledge.wire(), 16);
        assert_eq!(CommandId::from_wire(14), Some(CommandId::SetGoal));
        assert_eq!(CommandId::from_wire(2), None);
        assert_eq!(CommandId::from_wire(17), None);
    }

    #[test]
    fn test_arm_and_disarm_share_id() {
        let arm = Command::Arm.to_message(255, Target::All);
        let disarm = Command::Disarm.to_message(255, Target::All);
        assert_eq!(arm.opcode_id, disarm.opcode_id);
        assert_eq!(arm.params[0], 1.0);
        assert_eq!(disarm.params[0], 0.0);
        assert_eq!(disarm.to_command(), Ok(Command::Disarm));
    }

    #[test]
    fn test_goal_parameter_layout() {
        let goal = Command::SetGoal {
            goal: Position::new(1.0, 2.0, 3.0),
            completion_time: 4.5,
        };
        let msg = goal.to_message(255, Target::Robot(RobotId::new(2)));
        assert_eq!(msg.target, 3);
        assert_eq!(msg.opcode_class, 2);
        assert_eq!(msg.opcode_id, 14);
        assert_eq!(msg.params, [1.0, 2.0, 3.0, 4.5, 0.0]);
    }

    #[test]
    fn test_decode_through_mavlink() {
        let msg = Command::SetTakeoffAltitude(2.5).to_message(255, Target::All);
        let decoded = decode(&raw(&msg)).expect("generic command");
        assert_eq!(decoded, msg);
        assert_eq!(decoded.to_command(), Ok(Command::SetTakeoffAltitude(2.5)));
    }

    #[test]
    fn test_decode_ignores_other_messages() {
        let heartbeat = RawMessage {
            header: MavHeader::default(),
            message: crate::network::transport::heartbeat_message(),
        };
        assert!(decode(&heartbeat).is_none());

        let mut msg = Command::Go.to_message(255, Target::All).to_mavlink();
        if let MavMessage::COMMAND_LONG(data) = &mut msg {
            data.command = MavCmd::MAV_CMD_USER_2;
        }
        let other = RawMessage {
            header: MavHeader::default(),
            message: msg,
        };
        assert!(decode(&other).is_none());
    }

    #[test]
    fn test_decode_rejects_fractional_opcode() {
        let mut msg = Command::Go.to_message(255, Target::All).to_mavlink();
        if let MavMessage::COMMAND_LONG(data) = &mut msg {
            data.param1 = 1.5;
        }
        let raw = RawMessage {
            header: MavHeader::default(),
            message: msg,
        };
        assert!(decode(&raw).is_none());
    }

    #[test]
    fn test_state_report_packing() {
        let state = RobotState {
            timestamp_ms: 0,
            received_goal: true,
            mission_started: false,
            arrived: true,
            position: Position::new(1.5, -2.0, 3.25),
        };
        let msg = CommandMessage::state_report(RobotId::new(1), 255, &state);
        assert_eq!(msg.source, 2);
        assert_eq!(msg.opcode_class, 1);
        assert_eq!(msg.opcode_id, 1);
        assert_eq!(msg.params, [0.0, 1.0, 1.5, -2.0, 3.25]);

        let report = decode(&raw(&msg)).unwrap().to_report(3).unwrap();
        assert_eq!(
            report,
            Report::State {
                robot: RobotId::new(1),
                state
            }
        );
    }

    #[test]
    fn test_acknowledgment_report() {
        let msg = CommandMessage::acknowledgment(RobotId::new(0), 255, CommandId::Takeoff);
        assert_eq!(
            msg.to_report(1),
            Ok(Report::Acknowledgment {
                robot: RobotId::new(0),
                command: CommandId::Takeoff
            })
        );
    }

    #[test]
    fn test_report_from_unknown_source() {
        let state = RobotState::default();
        let msg = CommandMessage::state_report(RobotId::new(5), 255, &state);
        assert_eq!(msg.to_report(3), Err(ProtocolError::UnknownSource(6)));
    }

    #[test]
    fn test_command_is_not_a_report() {
        let msg = Command::Go.to_message(1, Target::All);
        assert_eq!(msg.to_report(3), Err(ProtocolError::UnexpectedClass(2)));
    }
}
