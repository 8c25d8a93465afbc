//! The network model.
//!
//! [`Network`] owns every server, user and channel we know about and is the
//! only thing that mutates them. Each mutation posts the matching [`Event`]
//! so services can follow along. Operations naming something that does not
//! exist log and do nothing; the uplink is trusted but not infallible, and a
//! stale reference must never take the link down.

use std::collections::{BTreeSet, HashMap};

use slsvc_proto::CaseMapping;
use tracing::{debug, warn};

use super::channel::{Channel, Topic};
use super::modes::{ChannelMode, ModeChange, ModeClass, ModeTable, UserMode};
use super::server::Server;
use super::user::User;
use crate::event::{Event, EventQueue};

/// Everything we know about the network.
#[derive(Debug)]
pub struct Network {
    pub(super) casemap: CaseMapping,
    pub(super) table: &'static ModeTable,
    pub(super) keyed_by_uid: bool,
    /// Our own server's key. Not stored in `servers`.
    pub(super) local: Option<String>,
    pub(super) servers: HashMap<String, Server>,
    pub(super) users: HashMap<String, User>,
    /// Folded nick → user key. Only populated on UID dialects.
    pub(super) nicks: HashMap<String, String>,
    /// Folded name → channel.
    pub(super) channels: HashMap<String, Channel>,
}

impl Network {
    pub fn new(casemap: CaseMapping, table: &'static ModeTable, keyed_by_uid: bool) -> Self {
        Self {
            casemap,
            table,
            keyed_by_uid,
            local: None,
            servers: HashMap::new(),
            users: HashMap::new(),
            nicks: HashMap::new(),
            channels: HashMap::new(),
        }
    }

    pub fn mode_table(&self) -> &'static ModeTable {
        self.table
    }

    pub fn casemap(&self) -> CaseMapping {
        self.casemap
    }

    pub fn keyed_by_uid(&self) -> bool {
        self.keyed_by_uid
    }

    /// Fold a nick or channel name under the network casemapping.
    pub fn fold(&self, name: &str) -> String {
        self.casemap.fold(name)
    }

    /// Mark `key` as our own server, so users can be introduced on it.
    pub fn set_local_server(&mut self, key: impl Into<String>) {
        self.local = Some(key.into());
    }

    pub fn local_server(&self) -> Option<&str> {
        self.local.as_deref()
    }

    /// Forget everything except which server is ours.
    pub fn clear(&mut self) {
        self.servers.clear();
        self.users.clear();
        self.nicks.clear();
        self.channels.clear();
    }

    // ------------------------------------------------------------------
    // Servers
    // ------------------------------------------------------------------

    /// Returns false if a server with that key is already known.
    pub fn add_server(&mut self, events: &mut EventQueue, server: Server) -> bool {
        let key = server.key();
        if self.servers.contains_key(&key) || self.local.as_deref() == Some(key.as_str()) {
            warn!(server = %server.name, %key, "Server already exists");
            return false;
        }
        debug!(server = %server.name, %key, hops = server.hops, "Server added");
        events.post(Event::ServerAdded {
            name: server.name.clone(),
        });
        self.servers.insert(key, server);
        true
    }

    /// Remove a server, everything behind it and all of their users.
    pub fn remove_server(&mut self, events: &mut EventQueue, server: &str, reason: &str) {
        let Some(key) = self.server_key(server) else {
            warn!(%server, "SQUIT for unknown server");
            return;
        };

        // Collect the subtree first: servers introduced behind this one.
        let mut doomed = vec![key];
        let mut i = 0;
        while i < doomed.len() {
            let parent = doomed[i].clone();
            doomed.extend(
                self.servers
                    .iter()
                    .filter(|(_, s)| s.uplink.as_deref() == Some(parent.as_str()))
                    .map(|(k, _)| k.clone()),
            );
            i += 1;
        }

        // Leaves first so server_deleted arrives bottom-up.
        for key in doomed.into_iter().rev() {
            let Some(server) = self.servers.remove(&key) else {
                continue;
            };
            for user in &server.users {
                self.remove_user(events, user, reason);
            }
            debug!(server = %server.name, users = server.users.len(), "Server removed");
            events.post(Event::ServerDeleted { name: server.name });
        }
    }

    /// Resolve a server by key (SID/numeric) or name.
    pub fn server_key(&self, reference: &str) -> Option<String> {
        if self.servers.contains_key(reference) {
            return Some(reference.to_string());
        }
        let lowered = reference.to_ascii_lowercase();
        if self.servers.contains_key(&lowered) {
            return Some(lowered);
        }
        self.servers
            .iter()
            .find(|(_, s)| s.name.eq_ignore_ascii_case(reference))
            .map(|(k, _)| k.clone())
    }

    pub fn server(&self, reference: &str) -> Option<&Server> {
        self.server_key(reference).and_then(|k| self.servers.get(&k))
    }

    pub fn servers(&self) -> impl Iterator<Item = &Server> {
        self.servers.values()
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Registry key a user would get.
    fn key_for(&self, user: &User) -> Option<String> {
        if self.keyed_by_uid {
            user.uid.clone()
        } else {
            Some(self.fold(&user.nick))
        }
    }

    /// Add a user. Returns its key, or `None` if it was dropped.
    pub fn add_user(&mut self, events: &mut EventQueue, user: User) -> Option<String> {
        let Some(key) = self.key_for(&user) else {
            warn!(nick = %user.nick, "User introduced without a UID");
            return None;
        };

        let local = self.local.as_deref() == Some(user.server.as_str());
        if !local && !self.servers.contains_key(&user.server) {
            warn!(nick = %user.nick, server = %user.server, "User introduced by unknown server");
            return None;
        }

        if self.users.contains_key(&key) {
            warn!(nick = %user.nick, %key, "User key collision; replacing");
            self.remove_user(events, &key, "Nick collision");
        }

        if self.keyed_by_uid {
            let folded = self.fold(&user.nick);
            if let Some(previous) = self.nicks.insert(folded, key.clone()) {
                warn!(nick = %user.nick, %previous, "Nick already indexed to another user");
            }
        }
        if let Some(server) = self.servers.get_mut(&user.server) {
            server.users.push(key.clone());
        }

        debug!(nick = %user.nick, %key, "User added");
        self.users.insert(key.clone(), user);
        events.post(Event::UserAdded { key: key.clone() });
        Some(key)
    }

    /// Remove a user and its memberships. Channels left empty are destroyed.
    pub fn remove_user(&mut self, events: &mut EventQueue, reference: &str, reason: &str) {
        let Some(key) = self.resolve_user(reference) else {
            warn!(user = %reference, "Removing unknown user");
            return;
        };
        let Some(user) = self.users.remove(&key) else {
            return;
        };

        if self.keyed_by_uid {
            let folded = self.fold(&user.nick);
            if self.nicks.get(&folded) == Some(&key) {
                self.nicks.remove(&folded);
            }
        }
        if let Some(server) = self.servers.get_mut(&user.server) {
            server.users.retain(|u| u != &key);
        }
        for chan in user.channels.keys() {
            if let Some(channel) = self.channels.get_mut(chan) {
                channel.members.remove(&key);
            }
            self.prune_channel(events, chan);
        }

        debug!(nick = %user.nick, %key, %reason, "User removed");
        events.post(Event::UserDeleted {
            key,
            nick: user.nick,
            reason: reason.to_string(),
        });
    }

    /// Change a user's nick. On nick-keyed dialects the user moves to a new
    /// key, which is returned.
    pub fn rename_user(
        &mut self,
        events: &mut EventQueue,
        reference: &str,
        new_nick: &str,
        ts: Option<i64>,
    ) -> Option<String> {
        let Some(key) = self.resolve_user(reference) else {
            warn!(user = %reference, nick = %new_nick, "Nick change for unknown user");
            return None;
        };

        let new_key = if self.keyed_by_uid {
            key.clone()
        } else {
            self.fold(new_nick)
        };
        if new_key != key && self.users.contains_key(&new_key) {
            warn!(user = %reference, nick = %new_nick, "Nick change onto an existing user");
            return None;
        }

        let mut user = self.users.remove(&key)?;
        let old_nick = std::mem::replace(&mut user.nick, new_nick.to_string());
        if let Some(ts) = ts {
            user.ts = ts;
        }

        if self.keyed_by_uid {
            let old_folded = self.fold(&old_nick);
            if self.nicks.get(&old_folded) == Some(&key) {
                self.nicks.remove(&old_folded);
            }
            let new_folded = self.fold(new_nick);
            self.nicks.insert(new_folded, key.clone());
        } else if new_key != key {
            if let Some(server) = self.servers.get_mut(&user.server) {
                for u in server.users.iter_mut().filter(|u| **u == key) {
                    *u = new_key.clone();
                }
            }
            for chan in user.channels.keys() {
                if let Some(channel) = self.channels.get_mut(chan) {
                    channel.members.remove(&key);
                    channel.members.insert(new_key.clone());
                }
            }
        }

        self.users.insert(new_key.clone(), user);
        events.post(Event::NicknameChanged {
            key: new_key.clone(),
            old: old_nick,
            new: new_nick.to_string(),
        });
        Some(new_key)
    }

    /// Find a user's key from a key, UID or nick.
    pub fn resolve_user(&self, reference: &str) -> Option<String> {
        if self.users.contains_key(reference) {
            return Some(reference.to_string());
        }
        let folded = self.fold(reference);
        if self.keyed_by_uid {
            self.nicks.get(&folded).cloned()
        } else {
            self.users.contains_key(&folded).then_some(folded)
        }
    }

    pub fn user(&self, reference: &str) -> Option<&User> {
        self.resolve_user(reference).and_then(|k| self.users.get(&k))
    }

    pub fn user_mut(&mut self, reference: &str) -> Option<&mut User> {
        let key = self.resolve_user(reference)?;
        self.users.get_mut(&key)
    }

    pub fn user_by_nick(&self, nick: &str) -> Option<&User> {
        let folded = self.fold(nick);
        if self.keyed_by_uid {
            self.nicks.get(&folded).and_then(|k| self.users.get(k))
        } else {
            self.users.get(&folded)
        }
    }

    pub fn users(&self) -> impl Iterator<Item = (&String, &User)> {
        self.users.iter()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn is_local_user(&self, reference: &str) -> bool {
        self.user(reference)
            .is_some_and(|u| self.local.as_deref() == Some(u.server.as_str()))
    }

    /// Apply a user mode string.
    pub fn apply_user_modes<S: AsRef<str>>(
        &mut self,
        events: &mut EventQueue,
        reference: &str,
        modes: &str,
        params: &[S],
    ) {
        let Some(key) = self.resolve_user(reference) else {
            warn!(user = %reference, %modes, "MODE for unknown user");
            return;
        };
        let changes = self.table.parse_user(modes, params);
        let Some(user) = self.users.get_mut(&key) else {
            return;
        };

        for change in changes {
            if change.mode == UserMode::Account {
                let account = if change.adding { change.param } else { None };
                user.account.clone_from(&account);
                events.post(Event::AccountChanged {
                    key: key.clone(),
                    account,
                });
                continue;
            }

            if change.adding {
                user.modes.insert(change.mode);
                events.post(Event::ModeAddedOnUser {
                    mode: change.mode,
                    key: key.clone(),
                });
            } else {
                user.modes.remove(&change.mode);
                events.post(Event::ModeDeletedOnUser {
                    mode: change.mode,
                    key: key.clone(),
                });
            }
        }
    }

    pub fn set_account(&mut self, events: &mut EventQueue, reference: &str, account: Option<String>) {
        let Some(user) = self.user_mut(reference) else {
            warn!(user = %reference, "Account change for unknown user");
            return;
        };
        user.account.clone_from(&account);
        let key = self.resolve_user(reference).unwrap_or_else(|| reference.to_string());
        events.post(Event::AccountChanged { key, account });
    }

    pub fn set_away(&mut self, reference: &str, away: Option<String>) {
        match self.user_mut(reference) {
            Some(user) => user.away = away,
            None => warn!(user = %reference, "AWAY for unknown user"),
        }
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&self.fold(name))
    }

    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        let key = self.fold(name);
        self.channels.get_mut(&key)
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Create a channel if it does not exist. Returns true if created.
    pub fn ensure_channel(&mut self, events: &mut EventQueue, name: &str, ts: i64) -> bool {
        let key = self.fold(name);
        if self.channels.contains_key(&key) {
            return false;
        }
        debug!(channel = %name, ts, "Channel added");
        self.channels.insert(key, Channel::new(name, ts));
        events.post(Event::ChannelAdded {
            name: name.to_string(),
        });
        true
    }

    /// Put a user on an existing channel. Returns true if they were not
    /// already there.
    pub fn add_member(&mut self, events: &mut EventQueue, channel: &str, user: &str) -> bool {
        let chan_key = self.fold(channel);
        let Some(user_key) = self.resolve_user(user) else {
            warn!(%channel, %user, "JOIN for unknown user");
            return false;
        };
        let Some(chan) = self.channels.get_mut(&chan_key) else {
            warn!(%channel, %user, "JOIN to unknown channel");
            return false;
        };
        if !chan.members.insert(user_key.clone()) {
            return false;
        }
        let name = chan.name.clone();
        if let Some(u) = self.users.get_mut(&user_key) {
            u.channels.entry(chan_key).or_default();
        }
        events.post(Event::UserJoinedChannel {
            key: user_key,
            channel: name,
        });
        true
    }

    /// Take a user off a channel, destroying it if left empty.
    pub fn remove_member(&mut self, events: &mut EventQueue, channel: &str, user: &str) {
        let chan_key = self.fold(channel);
        let Some(user_key) = self.resolve_user(user) else {
            warn!(%channel, %user, "PART for unknown user");
            return;
        };
        let Some(chan) = self.channels.get_mut(&chan_key) else {
            warn!(%channel, %user, "PART from unknown channel");
            return;
        };
        if !chan.members.remove(&user_key) {
            debug!(%channel, %user, "PART from a channel the user is not on");
            return;
        }
        let name = chan.name.clone();
        if let Some(u) = self.users.get_mut(&user_key) {
            u.channels.remove(&chan_key);
        }
        events.post(Event::UserPartedChannel {
            key: user_key,
            channel: name,
        });
        self.prune_channel(events, &chan_key);
    }

    /// Take a user off every channel (`JOIN 0`).
    pub fn part_all(&mut self, events: &mut EventQueue, user: &str) {
        let Some(key) = self.resolve_user(user) else {
            warn!(%user, "JOIN 0 for unknown user");
            return;
        };
        let channels: Vec<String> = self
            .users
            .get(&key)
            .map(|u| u.channels.keys().cloned().collect())
            .unwrap_or_default();
        for channel in channels {
            self.remove_member(events, &channel, &key);
        }
    }

    /// Destroy a channel with no members, unless it is permanent.
    pub(super) fn prune_channel(&mut self, events: &mut EventQueue, chan_key: &str) {
        let Some(chan) = self.channels.get(chan_key) else {
            return;
        };
        if !chan.members.is_empty() || chan.modes.contains(&ChannelMode::Permanent) {
            return;
        }
        if let Some(chan) = self.channels.remove(chan_key) {
            debug!(channel = %chan.name, "Channel destroyed");
            events.post(Event::ChannelDeleted { name: chan.name });
        }
    }

    pub fn is_member(&self, channel: &str, user: &str) -> bool {
        match (self.channel(channel), self.resolve_user(user)) {
            (Some(chan), Some(key)) => chan.members.contains(&key),
            _ => false,
        }
    }

    pub fn has_status(&self, channel: &str, user: &str, mode: ChannelMode) -> bool {
        let chan_key = self.fold(channel);
        self.user(user)
            .and_then(|u| u.channels.get(&chan_key))
            .is_some_and(|s| s.contains(&mode))
    }

    /// Status modes a user holds on a channel.
    pub fn statuses(&self, channel: &str, user: &str) -> BTreeSet<ChannelMode> {
        let chan_key = self.fold(channel);
        self.user(user)
            .and_then(|u| u.channels.get(&chan_key))
            .cloned()
            .unwrap_or_default()
    }

    pub fn channel_has_mode(&self, channel: &str, mode: ChannelMode) -> bool {
        self.channel(channel).is_some_and(|c| c.has_mode(mode))
    }

    pub fn set_topic(
        &mut self,
        events: &mut EventQueue,
        channel: &str,
        text: &str,
        setter: &str,
        set_at: i64,
    ) {
        let Some(chan) = self.channel_mut(channel) else {
            warn!(%channel, "TOPIC for unknown channel");
            return;
        };
        chan.topic = (!text.is_empty()).then(|| Topic {
            text: text.to_string(),
            set_by: setter.to_string(),
            set_at,
        });
        events.post(Event::TopicChanged {
            channel: chan.name.clone(),
            topic: text.to_string(),
            setter: setter.to_string(),
        });
    }

    /// Parse and apply a channel mode string.
    pub fn apply_modes<S: AsRef<str>>(
        &mut self,
        events: &mut EventQueue,
        channel: &str,
        modes: &str,
        params: &[S],
    ) {
        if self.channel(channel).is_none() {
            warn!(%channel, %modes, "MODE for unknown channel");
            return;
        }
        let changes = self.table.parse_channel(modes, params);
        self.apply_changes(events, channel, &changes);
    }

    /// Apply already-parsed channel mode changes.
    pub fn apply_changes(&mut self, events: &mut EventQueue, channel: &str, changes: &[ModeChange]) {
        let chan_key = self.fold(channel);
        for change in changes {
            self.apply_change(events, &chan_key, change);
        }
    }

    fn apply_change(&mut self, events: &mut EventQueue, chan_key: &str, change: &ModeChange) {
        let Some(class) = self.table.class_of(change.mode) else {
            warn!(mode = ?change.mode, "Mode not in this protocol's table");
            return;
        };

        // Status targets are resolved before borrowing the channel.
        let status_target = match class {
            ModeClass::Status { .. } => {
                let Some(target) = change.param.as_deref() else {
                    warn!(mode = ?change.mode, "Status mode without a target");
                    return;
                };
                match self.resolve_user(target) {
                    Some(key) => Some(key),
                    None => {
                        warn!(mode = ?change.mode, user = %target, "Status mode for unknown user");
                        return;
                    }
                }
            }
            _ => None,
        };

        let Some(chan) = self.channels.get_mut(chan_key) else {
            warn!(channel = %chan_key, "MODE for unknown channel");
            return;
        };
        let name = chan.name.clone();

        let param = match class {
            ModeClass::Status { .. } => {
                let Some(key) = status_target else { return };
                let Some(statuses) = self
                    .users
                    .get_mut(&key)
                    .and_then(|u| u.channels.get_mut(chan_key))
                else {
                    warn!(channel = %name, user = %key, "Status mode for a non-member");
                    return;
                };
                if change.adding {
                    statuses.insert(change.mode);
                } else {
                    statuses.remove(&change.mode);
                }
                Some(key)
            }
            ModeClass::List => {
                let Some(mask) = change.param.clone() else {
                    warn!(channel = %name, mode = ?change.mode, "List mode without a mask");
                    return;
                };
                if change.adding {
                    chan.lists.entry(change.mode).or_default().insert(mask.clone());
                } else if let Some(list) = chan.lists.get_mut(&change.mode) {
                    list.remove(&mask);
                    if list.is_empty() {
                        chan.lists.remove(&change.mode);
                    }
                }
                Some(mask)
            }
            ModeClass::Param { .. } => {
                if change.adding {
                    let Some(value) = change.param.clone() else {
                        warn!(channel = %name, mode = ?change.mode, "Parameter mode without a value");
                        return;
                    };
                    chan.params.insert(change.mode, value.clone());
                    Some(value)
                } else {
                    let old = chan.params.remove(&change.mode);
                    change.param.clone().or(old)
                }
            }
            ModeClass::Flag => {
                if change.adding {
                    chan.modes.insert(change.mode);
                } else {
                    chan.modes.remove(&change.mode);
                }
                None
            }
        };

        events.post(if change.adding {
            Event::ModeAddedOnChannel {
                mode: change.mode,
                param,
                channel: name,
            }
        } else {
            Event::ModeDeletedOnChannel {
                mode: change.mode,
                param,
                channel: name,
            }
        });

        // Dropping +P may leave an empty channel behind.
        if !change.adding && change.mode == ChannelMode::Permanent {
            self.prune_channel(events, chan_key);
        }
    }
}
