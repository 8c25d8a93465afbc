//! Things services can ask the session to do.
//!
//! Every action checks its arguments, updates the network model and hands
//! the wire encoding to the dialect. Nothing reaches the send queue for a
//! request that fails validation.

use std::time::Instant;

use tracing::debug;

use super::session::Session;
use crate::error::{ActionError, ActionResult};
use crate::state::{ChannelMode, ModeChange, ModeClass, User};

/// A pseudo-user to introduce.
#[derive(Debug, Clone)]
pub struct PseudoClient {
    pub nick: String,
    pub user: String,
    pub host: String,
    pub realname: String,
}

const MAX_NICK_LEN: usize = 30;

fn valid_nick(nick: &str) -> bool {
    let special = |c: char| "[]\\`_^{|}-".contains(c);
    let mut chars = nick.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || (c != '-' && special(c)) => {}
        _ => return false,
    }
    nick.len() <= MAX_NICK_LEN && chars.all(|c| c.is_ascii_alphanumeric() || special(c))
}

fn valid_token(value: &str) -> bool {
    !value.is_empty() && !value.contains([' ', '\r', '\n', '\0', ':'])
}

pub(crate) fn valid_channel(name: &str) -> bool {
    name.len() > 1
        && name.starts_with(['#', '&'])
        && !name.contains([' ', ',', '\x07', '\r', '\n', '\0'])
}

fn check_text(text: &str) -> ActionResult {
    if text.is_empty() {
        return Err(ActionError::NoText);
    }
    if text.contains(['\r', '\n', '\0']) {
        return Err(ActionError::LineBreak);
    }
    Ok(())
}

fn check_channel(channel: &str) -> ActionResult {
    if !valid_channel(channel) {
        return Err(ActionError::InvalidChannel(channel.to_string()));
    }
    Ok(())
}

impl Session {
    fn require_link(&self) -> ActionResult {
        if !self.state().is_connected() {
            return Err(ActionError::NotConnected);
        }
        Ok(())
    }

    /// Resolve one of our own users, returning its key.
    fn local_user(&self, user: &str) -> ActionResult<String> {
        let key = self
            .network
            .resolve_user(user)
            .ok_or_else(|| ActionError::NoSuchUser(user.to_string()))?;
        if !self.network.is_local_user(&key) {
            return Err(ActionError::NotLocal(user.to_string()));
        }
        Ok(key)
    }

    /// Resolve a message target to its wire form.
    fn target_ref(&self, target: &str) -> ActionResult<String> {
        if target.starts_with(['#', '&']) {
            check_channel(target)?;
            return Ok(target.to_string());
        }
        let key = self
            .network
            .resolve_user(target)
            .ok_or_else(|| ActionError::NoSuchUser(target.to_string()))?;
        Ok(self.wire_ref(&key))
    }

    /// Introduce a pseudo-user on our server. Returns its key.
    pub fn introduce_user(&mut self, client: &PseudoClient) -> ActionResult<String> {
        self.require_link()?;
        if !valid_nick(&client.nick) {
            return Err(ActionError::InvalidNick(client.nick.clone()));
        }
        for (field, value) in [("user", &client.user), ("host", &client.host)] {
            if !valid_token(value) {
                return Err(ActionError::InvalidField {
                    field,
                    value: value.clone(),
                });
            }
        }
        check_text(&client.realname)?;
        if self.network.user_by_nick(&client.nick).is_some() {
            return Err(ActionError::NickInUse(client.nick.clone()));
        }

        let dialect = self.dialect();
        let server = self.identity().key();
        let mut user = User::new(
            &client.nick,
            &client.user,
            &client.host,
            &client.realname,
            &server,
            self.now_ts(),
        );
        if dialect.keys_by_uid() {
            let sid = self.identity().sid.clone().unwrap_or_default();
            let uid = self
                .uids
                .next(dialect.uid_format(), &sid)
                .ok_or(ActionError::UidsExhausted)?;
            user = user.with_uid(uid);
        }

        let key = self
            .network
            .add_user(&mut self.events, user)
            .ok_or_else(|| ActionError::NickInUse(client.nick.clone()))?;
        self.network
            .apply_user_modes(&mut self.events, &key, dialect.service_umodes(), &[] as &[&str]);
        dialect.introduce_user(self, &key);
        debug!(nick = %client.nick, %key, "Introduced pseudo-user");
        Ok(key)
    }

    /// Join one of our users to a channel, creating it (and taking op) if
    /// it does not exist.
    pub fn join(&mut self, user: &str, channel: &str) -> ActionResult {
        self.require_link()?;
        check_channel(channel)?;
        let key = self.local_user(user)?;
        if self.network.is_member(channel, &key) {
            return Ok(());
        }

        let now = self.now_ts();
        let created = self.network.ensure_channel(&mut self.events, channel, now);
        let ts = self.network.channel(channel).map_or(now, |c| c.ts);
        let name = self
            .network
            .channel(channel)
            .map_or_else(|| channel.to_string(), |c| c.name.clone());

        let wire = self.wire_ref(&key);
        let dialect = self.dialect();
        dialect.join(self, &wire, &name, ts, created);

        self.network.add_member(&mut self.events, &name, &key);
        if created {
            self.network.apply_changes(
                &mut self.events,
                &name,
                &[ModeChange::add(ChannelMode::Operator, Some(key))],
            );
        }
        Ok(())
    }

    pub fn part(&mut self, user: &str, channel: &str, reason: &str) -> ActionResult {
        self.require_link()?;
        check_channel(channel)?;
        let key = self.local_user(user)?;
        if !self.network.is_member(channel, &key) {
            return Err(ActionError::NotOnChannel {
                user: user.to_string(),
                channel: channel.to_string(),
            });
        }
        let wire = self.wire_ref(&key);
        let dialect = self.dialect();
        dialect.part(self, &wire, channel, reason);
        self.network.remove_member(&mut self.events, channel, &key);
        Ok(())
    }

    pub fn privmsg(&mut self, from: &str, target: &str, text: &str) -> ActionResult {
        self.require_link()?;
        check_text(text)?;
        let from = self.wire_ref(&self.local_user(from)?);
        let target = self.target_ref(target)?;
        let dialect = self.dialect();
        dialect.privmsg(self, &from, &target, text);
        Ok(())
    }

    pub fn notice(&mut self, from: &str, target: &str, text: &str) -> ActionResult {
        self.require_link()?;
        check_text(text)?;
        let from = self.wire_ref(&self.local_user(from)?);
        let target = self.target_ref(target)?;
        let dialect = self.dialect();
        dialect.notice(self, &from, &target, text);
        Ok(())
    }

    /// Set a channel topic as one of our users. An empty topic clears it.
    pub fn topic(&mut self, from: &str, channel: &str, text: &str) -> ActionResult {
        self.require_link()?;
        check_channel(channel)?;
        if text.contains(['\r', '\n', '\0']) {
            return Err(ActionError::LineBreak);
        }
        let key = self.local_user(from)?;
        if self.network.channel(channel).is_none() {
            return Err(ActionError::NoSuchChannel(channel.to_string()));
        }
        let wire = self.wire_ref(&key);
        let setter = self
            .network
            .user(&key)
            .map_or_else(|| wire.clone(), |u| u.nick.clone());
        let dialect = self.dialect();
        dialect.topic(self, &wire, channel, text);
        let now = self.now_ts();
        self.network
            .set_topic(&mut self.events, channel, text, &setter, now);
        Ok(())
    }

    /// Remove one of our users from the network.
    pub fn quit(&mut self, user: &str, reason: &str) -> ActionResult {
        self.require_link()?;
        let key = self.local_user(user)?;
        let wire = self.wire_ref(&key);
        let dialect = self.dialect();
        dialect.quit(self, &wire, reason);
        self.network.remove_user(&mut self.events, &key, reason);
        Ok(())
    }

    /// Message opers, from one of our users or from the server itself.
    pub fn operwall(&mut self, from: Option<&str>, text: &str) -> ActionResult {
        self.require_link()?;
        check_text(text)?;
        let from = match from {
            Some(user) => Some(self.wire_ref(&self.local_user(user)?)),
            None => None,
        };
        let dialect = self.dialect();
        dialect.operwall(self, from.as_deref(), text);
        Ok(())
    }

    /// Queue channel mode changes through the mode stacker. Status targets
    /// may be given by key or nick; a key removal without a parameter picks
    /// up the channel's current key.
    pub fn send_channel_mode(&mut self, channel: &str, changes: Vec<ModeChange>) -> ActionResult {
        self.require_link()?;
        check_channel(channel)?;
        let Some(chan) = self.network.channel(channel) else {
            return Err(ActionError::NoSuchChannel(channel.to_string()));
        };
        let name = chan.name.clone();
        let current_key = chan.key().map(str::to_string);
        let table = self.network.mode_table();

        let mut resolved = Vec::with_capacity(changes.len());
        for mut change in changes {
            match table.class_of(change.mode) {
                None => {
                    return Err(ActionError::InvalidField {
                        field: "mode",
                        value: format!("{:?}", change.mode),
                    });
                }
                Some(ModeClass::Status { .. }) => {
                    let target = change.param.as_deref().unwrap_or_default();
                    let key = self
                        .network
                        .resolve_user(target)
                        .ok_or_else(|| ActionError::NoSuchUser(target.to_string()))?;
                    change.param = Some(key);
                }
                Some(ModeClass::List) => {
                    if !change.param.as_deref().is_some_and(valid_token) {
                        return Err(ActionError::InvalidField {
                            field: "mask",
                            value: change.param.unwrap_or_default(),
                        });
                    }
                }
                Some(ModeClass::Param { .. }) => {
                    if change.adding && !change.param.as_deref().is_some_and(valid_token) {
                        return Err(ActionError::InvalidField {
                            field: "parameter",
                            value: change.param.unwrap_or_default(),
                        });
                    }
                    if !change.adding && change.mode == ChannelMode::Key && change.param.is_none()
                    {
                        change.param.clone_from(&current_key);
                    }
                }
                Some(ModeClass::Flag) => change.param = None,
            }
            resolved.push(change);
        }

        let chan_key = self.network.fold(&name);
        let now = Instant::now();
        for change in resolved {
            if let Some(batch) = self
                .stacker
                .push(&mut self.timers, now, &chan_key, &name, change)
            {
                self.flush_modes(batch);
            }
        }
        Ok(())
    }
}
