//! Services hosted on the link.
//!
//! Every service implements [`Service`] and is built from configuration by
//! [`from_config`] when the uplink first comes up.

pub mod status;
pub mod traits;

use std::rc::Rc;

pub use status::StatusService;
pub use traits::Service;

use crate::config::Config;

/// Build the services the configuration enables.
pub fn from_config(config: &Config) -> Vec<Rc<dyn Service>> {
    let mut services: Vec<Rc<dyn Service>> = Vec::new();
    if config.status.enabled {
        services.push(Rc::new(StatusService::new(config.status.clone())));
    }
    services
}
