//! User-related types and state.

use std::collections::{BTreeSet, HashMap};

use super::modes::{ChannelMode, UserMode};

/// A user somewhere on the network.
#[derive(Debug, Clone)]
pub struct User {
    /// UID on UID dialects, `None` on nick-keyed ones.
    pub uid: Option<String>,
    pub nick: String,
    pub username: String,
    pub hostname: String,
    pub realname: String,
    pub ip: String,
    /// Signon / nick timestamp.
    pub ts: i64,
    /// Key of the owning server.
    pub server: String,
    pub modes: BTreeSet<UserMode>,
    /// Folded channel name → status modes held there. Every channel the user
    /// is in has an entry, possibly empty.
    pub channels: HashMap<String, BTreeSet<ChannelMode>>,
    pub account: Option<String>,
    pub away: Option<String>,
}

impl User {
    pub fn new(
        nick: impl Into<String>,
        username: impl Into<String>,
        hostname: impl Into<String>,
        realname: impl Into<String>,
        server: impl Into<String>,
        ts: i64,
    ) -> Self {
        Self {
            uid: None,
            nick: nick.into(),
            username: username.into(),
            hostname: hostname.into(),
            realname: realname.into(),
            ip: "0".to_string(),
            ts,
            server: server.into(),
            modes: BTreeSet::new(),
            channels: HashMap::new(),
            account: None,
            away: None,
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    pub fn is_operator(&self) -> bool {
        self.modes.contains(&UserMode::Operator)
    }

    pub fn is_service(&self) -> bool {
        self.modes.contains(&UserMode::Service)
    }

    pub fn has_mode(&self, mode: UserMode) -> bool {
        self.modes.contains(&mode)
    }

    /// `nick!user@host`.
    pub fn hostmask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.username, self.hostname)
    }
}
