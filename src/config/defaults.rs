//! Default value functions for configuration.

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_description() -> String {
    "IRC Services".to_string()
}

// =============================================================================
// Uplink Defaults
// =============================================================================

pub fn default_max_modes() -> usize {
    4
}

pub fn default_priority() -> u32 {
    0
}

// =============================================================================
// Connection Defaults
// =============================================================================

pub fn default_reconnect_delay() -> u64 {
    10
}

pub fn default_timer_ceiling() -> u64 {
    5000
}

pub fn default_connect_timeout() -> u64 {
    30
}

pub fn default_max_line_len() -> usize {
    slsvc_proto::line::DEFAULT_MAX_LINE_LEN
}

// =============================================================================
// Status Service Defaults
// =============================================================================

pub fn default_status_nick() -> String {
    "Status".to_string()
}

pub fn default_status_user() -> String {
    "status".to_string()
}

pub fn default_status_host() -> String {
    "services.int".to_string()
}

pub fn default_status_realname() -> String {
    "Link Status".to_string()
}

pub fn default_status_channel() -> String {
    "#services".to_string()
}
