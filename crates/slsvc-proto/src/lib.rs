//! # slsvc-proto
//!
//! Wire-level building blocks for IRC server-to-server links.
//!
//! ## Features
//!
//! - Parsing and serializing the `:origin COMMAND params :trailing` grammar
//!   shared by TS6, P10, InspIRCd and UnrealIRCd links
//! - A newline-delimited codec for tokio (`tokio` feature)
//! - IRC casemapping (`rfc1459`, `strict-rfc1459`, `ascii`)
//!
//! ## Quick Start
//!
//! ```rust
//! use slsvc_proto::Message;
//!
//! let msg: Message = ":0AA SJOIN 1307151136 #malkier +nt :@0AAAAAAAA".parse().unwrap();
//! assert_eq!(msg.origin.as_deref(), Some("0AA"));
//! assert_eq!(msg.command, "SJOIN");
//! assert_eq!(msg.param(3), Some("@0AAAAAAAA"));
//!
//! let out = Message::new("PRIVMSG", ["#malkier", "hello there"]).with_origin("0AAAAAAAB");
//! assert_eq!(out.to_string(), ":0AAAAAAAB PRIVMSG #malkier :hello there");
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod casemap;
pub mod error;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;

pub use self::casemap::CaseMapping;
pub use self::error::{ProtocolError, Result};
#[cfg(feature = "tokio")]
pub use self::line::LineCodec;
pub use self::message::Message;
