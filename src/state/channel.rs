//! Channel-related types and state.

use std::collections::{BTreeMap, BTreeSet};

use super::modes::ChannelMode;

/// Channel topic with metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub text: String,
    pub set_by: String,
    pub set_at: i64,
}

/// A channel.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Name as first seen.
    pub name: String,
    pub ts: i64,
    /// Member user keys.
    pub members: BTreeSet<String>,
    /// Plain flags.
    pub modes: BTreeSet<ChannelMode>,
    /// Parameter modes and their values.
    pub params: BTreeMap<ChannelMode, String>,
    /// List modes and their masks.
    pub lists: BTreeMap<ChannelMode, BTreeSet<String>>,
    pub topic: Option<Topic>,
}

impl Channel {
    pub fn new(name: impl Into<String>, ts: i64) -> Self {
        Self {
            name: name.into(),
            ts,
            members: BTreeSet::new(),
            modes: BTreeSet::new(),
            params: BTreeMap::new(),
            lists: BTreeMap::new(),
            topic: None,
        }
    }

    /// True if a flag or parameter mode is set.
    pub fn has_mode(&self, mode: ChannelMode) -> bool {
        self.modes.contains(&mode) || self.params.contains_key(&mode)
    }

    pub fn param(&self, mode: ChannelMode) -> Option<&str> {
        self.params.get(&mode).map(String::as_str)
    }

    pub fn key(&self) -> Option<&str> {
        self.param(ChannelMode::Key)
    }

    pub fn list(&self, mode: ChannelMode) -> impl Iterator<Item = &str> {
        self.lists.get(&mode).into_iter().flatten().map(String::as_str)
    }

    pub fn has_list_entry(&self, mode: ChannelMode, mask: &str) -> bool {
        self.lists.get(&mode).is_some_and(|l| l.contains(mask))
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
