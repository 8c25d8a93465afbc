//! Configuration loading and management.
//!
//! - [`types`]: the top-level [`Config`] and its smaller sections
//! - [`links`]: `[[uplinks]]` blocks and the [`Protocol`] selector
//! - [`validation`]: startup checks that report every problem at once

mod defaults;
mod links;
mod types;
mod validation;

pub use links::{Protocol, UplinkBlock};
pub use types::{
    Config, ConfigError, ConnectionConfig, NetworkConfig, ServerConfig, StatusConfig,
};
pub use validation::{validate, ValidationError};
