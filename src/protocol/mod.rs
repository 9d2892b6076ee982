// Wire protocol: packet codec, sequence numbers and command layouts
pub mod command;
pub mod frame;
pub mod sequence;

pub use command::{Command, CommandKind, RollState};
pub use frame::{CommandFrame, ProtocolError};
pub use sequence::SequenceGenerator;
