//! MAVLink link to the fleet
//!
//! Wraps a `mavlink` connection (serial port or outbound UDP) behind
//! [`CommandTransport`]. The connection's `recv` blocks, so the receiver
//! thread spends its life parked inside [`MavlinkTransport::receive`].
//!
//! # Example
//! ```rust,ignore
//! use formation_master::network::MavlinkTransport;
//!
//! let link = MavlinkTransport::connect("udpout:127.0.0.1:30000", 255)?;
//! link.send_heartbeat()?;
//! ```

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};

use ::mavlink::common::MavMessage;
use ::mavlink::error::MessageReadError;
use ::mavlink::{MavConnection, MavHeader};
use log::{debug, info};

use crate::error::TransportError;
use crate::network::codec::{CommandMessage, COMPONENT_ID};
use crate::network::transport::{heartbeat_message, CommandTransport, RawMessage};

/// MAVLink-backed command transport
pub struct MavlinkTransport {
    /// Underlying connection
    connection: Box<dyn MavConnection<MavMessage> + Send + Sync>,
    /// Connection string, kept for diagnostics
    address: String,
    /// Our system id (ground station wire address)
    system_id: u8,
    /// Message sequence number
    sequence: AtomicU8,
}

impl MavlinkTransport {
    /// Open a connection.
    ///
    /// `address` uses the `mavlink` connection syntax, e.g.
    /// `udpout:127.0.0.1:30000` or `serial:/dev/ttyUSB0:57600`.
    pub fn connect(address: &str, system_id: u8) -> Result<Self, TransportError> {
        let connection =
            ::mavlink::connect::<MavMessage>(address).map_err(|e| TransportError::Connect {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        info!("Ground station (MAVLink id {}) connected on {}", system_id, address);

        Ok(Self {
            connection,
            address: address.to_string(),
            system_id,
            sequence: AtomicU8::new(0),
        })
    }

    fn next_sequence(&self) -> u8 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn write(&self, header: &MavHeader, message: &MavMessage) -> Result<(), TransportError> {
        self.connection
            .send(header, message)
            .map(|_| ())
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}

impl CommandTransport for MavlinkTransport {
    fn send(&self, message: &CommandMessage) -> Result<(), TransportError> {
        let header = message.header(self.next_sequence());
        self.write(&header, &message.to_mavlink())
    }

    fn receive(&self) -> Result<Option<RawMessage>, TransportError> {
        match self.connection.recv() {
            Ok((header, message)) => Ok(Some(RawMessage { header, message })),
            Err(MessageReadError::Io(e)) => match e.kind() {
                io::ErrorKind::WouldBlock
                | io::ErrorKind::TimedOut
                | io::ErrorKind::Interrupted => Ok(None),
                _ => Err(TransportError::Io(e)),
            },
            Err(e) => {
                debug!("Dropping undecodable frame on {}: {:?}", self.address, e);
                Ok(None)
            }
        }
    }

    fn send_heartbeat(&self) -> Result<(), TransportError> {
        let header = MavHeader {
            system_id: self.system_id,
            component_id: COMPONENT_ID,
            sequence: self.next_sequence(),
        };
        self.write(&header, &heartbeat_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::codec::{decode, Command};
    use crate::types::{RobotId, Target};
    use ::mavlink::peek_reader::PeekReader;
    use std::io::Cursor;
    use std::net::UdpSocket;
    use std::time::Duration;

    #[test]
    fn test_connect_rejects_bad_address() {
        let result = MavlinkTransport::connect("carrier-pigeon:nowhere", 255);
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn test_udp_send_reaches_robot_socket() {
        let robot = UdpSocket::bind("127.0.0.1:0").unwrap();
        robot
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let address = format!("udpout:{}", robot.local_addr().unwrap());

        let link = MavlinkTransport::connect(&address, 255).unwrap();
        let message = Command::Takeoff.to_message(255, Target::Robot(RobotId::new(0)));
        link.send(&message).unwrap();

        let mut buf = [0u8; 280];
        let (len, _) = robot.recv_from(&mut buf).unwrap();
        let mut reader = PeekReader::new(Cursor::new(&buf[..len]));
        let (header, body) = ::mavlink::read_v2_msg::<MavMessage, _>(&mut reader).unwrap();

        let decoded = decode(&RawMessage {
            header,
            message: body,
        })
        .unwrap();
        assert_eq!(decoded, message);
    }
}
