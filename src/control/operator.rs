//! Operator commands
//!
//! The inbound command surface of the ground station. The binary reads one
//! command per line from the console:
//!
//! ```text
//! arm 0            # 0 = every robot, k = robot k-1
//! takeoff 2
//! robots 5
//! origin 47.39 8.54 488.0
//! east             # no coordinates: use the configured reference
//! toalt 2.5
//! start
//! goals 12.0 0 2 0 1 2 0 2 2 0
//! go
//! ```

use core::str::FromStr;

use heapless::Vec;

use crate::types::{Position, MAX_FLEET_SIZE};

/// One operator request. Robot ids are wire addresses: 0 is every robot.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Arm(u8),
    Disarm(u8),
    Takeoff(u8),
    Land(u8),
    Hold(u8),
    PositionControl(u8),
    Shutdown(u8),
    Reboot(u8),
    SetRobotCount(u8),
    /// `None` uses the configured origin
    SetOrigin(Option<Position>),
    /// `None` uses the configured east reference
    SetEastReference(Option<Position>),
    SetTakeoffAltitude(f32),
    /// Snapshot positions and compute the assignment
    StartMission,
    /// Send explicit goals, one per robot in RobotId order
    FormationGoals {
        goals: Vec<Position, MAX_FLEET_SIZE>,
        completion_time: f32,
    },
    Go,
}

/// Console line that is not a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ParseCommandError(String);

fn err<T>(message: impl Into<String>) -> Result<T, ParseCommandError> {
    Err(ParseCommandError(message.into()))
}

fn number<T: FromStr>(word: Option<&str>, what: &str) -> Result<T, ParseCommandError> {
    match word {
        Some(w) => w
            .parse()
            .or_else(|_| err(format!("invalid {}: {:?}", what, w))),
        None => err(format!("missing {}", what)),
    }
}

fn floats(words: &[&str]) -> Result<std::vec::Vec<f32>, ParseCommandError> {
    words.iter().map(|w| number(Some(*w), "coordinate")).collect()
}

fn optional_position(words: &[&str]) -> Result<Option<Position>, ParseCommandError> {
    match floats(words)?.as_slice() {
        [] => Ok(None),
        [x, y, z] => Ok(Some(Position::new(*x, *y, *z))),
        _ => err("expected no coordinates or exactly x y z"),
    }
}

impl FromStr for OperatorCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: std::vec::Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return err("empty command");
        };
        let arg = args.first().copied();

        let command = match verb.to_ascii_lowercase().as_str() {
            "arm" => OperatorCommand::Arm(number(arg, "robot id")?),
            "disarm" => OperatorCommand::Disarm(number(arg, "robot id")?),
            "takeoff" => OperatorCommand::Takeoff(number(arg, "robot id")?),
            "land" => OperatorCommand::Land(number(arg, "robot id")?),
            "hold" => OperatorCommand::Hold(number(arg, "robot id")?),
            "posctl" => OperatorCommand::PositionControl(number(arg, "robot id")?),
            "shutdown" => OperatorCommand::Shutdown(number(arg, "robot id")?),
            "reboot" => OperatorCommand::Reboot(number(arg, "robot id")?),
            "robots" => OperatorCommand::SetRobotCount(number(arg, "robot count")?),
            "origin" => OperatorCommand::SetOrigin(optional_position(args)?),
            "east" => OperatorCommand::SetEastReference(optional_position(args)?),
            "toalt" => OperatorCommand::SetTakeoffAltitude(number(arg, "altitude")?),
            "start" => OperatorCommand::StartMission,
            "go" => OperatorCommand::Go,
            "goals" => {
                let completion_time = number(arg, "completion time")?;
                let coords = floats(&args[1..])?;
                if coords.is_empty() || coords.len() % 3 != 0 {
                    return err("goals need x y z triples after the completion time");
                }
                let mut goals = Vec::new();
                for xyz in coords.chunks_exact(3) {
                    goals
                        .push(Position::new(xyz[0], xyz[1], xyz[2]))
                        .or_else(|_| err("too many goals"))?;
                }
                OperatorCommand::FormationGoals {
                    goals,
                    completion_time,
                }
            }
            other => return err(format!("unknown command {:?}", other)),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_robot_commands() {
        assert_eq!("arm 0".parse::<OperatorCommand>(), Ok(OperatorCommand::Arm(0)));
        assert_eq!("  LAND 3 ".parse::<OperatorCommand>(), Ok(OperatorCommand::Land(3)));
        assert_eq!("posctl 1".parse::<OperatorCommand>(), Ok(OperatorCommand::PositionControl(1)));
        assert!("arm".parse::<OperatorCommand>().is_err());
        assert!("arm -1".parse::<OperatorCommand>().is_err());
        assert!("fly 1".parse::<OperatorCommand>().is_err());
        assert!("".parse::<OperatorCommand>().is_err());
    }

    #[test]
    fn test_parse_references() {
        assert_eq!(
            "origin 1 2 3".parse::<OperatorCommand>(),
            Ok(OperatorCommand::SetOrigin(Some(Position::new(1.0, 2.0, 3.0))))
        );
        assert_eq!("east".parse::<OperatorCommand>(), Ok(OperatorCommand::SetEastReference(None)));
        assert!("origin 1 2".parse::<OperatorCommand>().is_err());
        assert_eq!("toalt 2.5".parse::<OperatorCommand>(), Ok(OperatorCommand::SetTakeoffAltitude(2.5)));
    }

    #[test]
    fn test_parse_goals() {
        match "goals 4.5 0 2 0 1 2 0".parse::<OperatorCommand>() {
            Ok(OperatorCommand::FormationGoals {
                goals,
                completion_time,
            }) => {
                assert_eq!(completion_time, 4.5);
                assert_eq!(
                    goals.as_slice(),
                    &[Position::new(0.0, 2.0, 0.0), Position::new(1.0, 2.0, 0.0)]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!("goals 4.5 0 2".parse::<OperatorCommand>().is_err());
        assert!("goals 4.5".parse::<OperatorCommand>().is_err());
    }
}
