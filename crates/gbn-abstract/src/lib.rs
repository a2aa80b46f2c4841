pub mod config;
pub mod interface;
pub mod scenario;
pub mod seq;
pub mod traffic;

pub use interface::{
    DataLinkProtocol, LinkContext, LinkDriver, LinkEvent, OUTSTANDING_METRIC, StationId, TimerKey,
};
pub use seq::{MAX_SEQ, PKT_LEN, SEQ_SPACE, Seq, SeqOutOfRange, WINDOW_SIZE, between};

pub use config::{ProtocolConfig, SimConfig};
pub use scenario::{SimConfigOverride, TestAction, TestAssertion, TestScenario};
pub use traffic::{PACKET_ID_LEN, numbered_packet, packet_id};
