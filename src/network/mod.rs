//! Ground-to-robot command channel: wire codec and link transports

pub mod codec;
pub mod loopback;
pub mod mavlink;
pub mod transport;

pub use codec::{decode, encode, Command, CommandId, CommandMessage, OpcodeClass, Report};
pub use loopback::{LoopbackTransport, RobotEndpoint};
pub use self::mavlink::MavlinkTransport;
pub use transport::{CommandTransport, RawMessage};
