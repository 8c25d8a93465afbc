//! slsvcd - Straylight Services Daemon
//!
//! Links to an IRC network as a server over one of four dialects (TS6, P10,
//! InspIRCd, UnrealIRCd), keeps a model of the network from the uplink's
//! burst and hosts services that act on it.

pub mod config;
pub mod error;
pub mod event;
pub mod protocol;
pub mod services;
pub mod state;
pub mod sync;
pub mod telemetry;
pub mod timer;
