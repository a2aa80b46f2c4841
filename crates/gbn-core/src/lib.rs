//! Go-Back-N sliding-window data-link protocol.
//!
//! The protocol is a pure state machine: it reacts to [`LinkEvent`]s and talks
//! to the network and physical layers only through [`LinkContext`]. Runtimes
//! (a simulator, a UDP station) provide the context and the event source.
//!
//! [`LinkEvent`]: gbn_abstract::LinkEvent
//! [`LinkContext`]: gbn_abstract::LinkContext

pub mod codec;
pub mod driver;
pub mod error;
pub mod link;
pub mod protocol;
pub mod receiver;
pub mod sender;

#[cfg(test)]
mod testing;

pub use codec::{Frame, FrameKind, MAX_FRAME_LEN, MIN_FRAME_LEN, crc32, decode, encode};
pub use driver::run;
pub use error::{FrameError, WindowError};
pub use protocol::{GoBackN, LinkState};
pub use receiver::{ReceiverSequencer, Reception};
pub use sender::SenderWindow;
