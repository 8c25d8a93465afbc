//! The network model.
//!
//! [`Network`] holds servers, users and channels as seen from our side of
//! the link; [`modes`] defines the mode vocabulary shared by all dialects;
//! [`ts`] carries the channel timestamp rules; and [`ModeStacker`] batches
//! outgoing channel modes.

mod channel;
pub mod mode_stacker;
pub mod modes;
mod network;
mod server;
pub mod ts;
mod user;

pub use channel::{Channel, Topic};
pub use mode_stacker::{ModeBatch, ModeStacker};
pub use modes::{ChannelMode, ModeChange, ModeClass, ModeTable, UserMode, UserModeChange};
pub use network::Network;
pub use server::Server;
pub use ts::{BurstMember, TsOutcome};
pub use user::User;
