mod hub;
pub mod protocol;
mod ws;

pub use hub::{ConnId, ConnectionSession, Envelope, Hub};
pub use protocol::{ClientEvent, ServerEvent};
pub(crate) use ws::gateway_ws;
