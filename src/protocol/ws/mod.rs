//! Console side of the bridge: the JSON message set, the socket abstraction
//! and the loop that drives one connection.
mod link;
mod messages;
mod socket;

pub use link::run_link;
pub use messages::{
    ConfigurationPayload, HeatingTipPayload, Inbound, ManualControlsPayload, MonitorPayload,
    Outbound, PerTip, TipPayload, TipsPayload, WorkPositionPayload,
};
pub use socket::{ChannelSocket, ConsoleEnd, MessageSocket, TungsteniteSocket};
