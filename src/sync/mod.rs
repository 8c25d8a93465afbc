//! The uplink side of the daemon.
//!
//! - [`link`]: the connection state machine
//! - [`session`]: per-connection context handed to dialects and services
//! - [`actions`]: what services can ask a session to do
//! - [`stream`] and [`tls`]: the transport
//! - [`uplink`]: the connect/serve/reconnect loop

pub mod actions;
pub mod link;
pub mod session;
pub mod stream;
pub mod tls;
pub mod uplink;

pub use actions::PseudoClient;
pub use link::LinkState;
pub use session::{Identity, LinkSettings, Session};
pub use uplink::Uplink;
