//! P10 (ircu family).
//!
//! After the handshake every line starts with the sender's bare numeric
//! (two characters for a server, five for a user) followed by a short
//! token. Decoding shifts the numeric into the origin and expands the token
//! to its long name before dispatch, so raw events read `irc_nick`,
//! `irc_burst`, `irc_end_of_burst` and so on.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use slsvc_proto::Message;
use tracing::{debug, warn};

use super::uid::{p10_decode, p10_encode, UidFormat};
use super::{
    arity, dispatch, origin, parse_ts, timestamped_modes, umode_string, CommandTable, Dialect,
};
use crate::error::UplinkError;
use crate::state::modes::{
    cm, um, ChannelModeDef, ModeTable, UserModeDef, FLAG, KEYED, LIST, PARAM, STATUS_O, STATUS_V,
};
use crate::state::{BurstMember, ChannelMode, ModeChange, ModeClass, Server, User, UserMode};
use crate::sync::Session;

static CHANNEL_MODES: &[ChannelModeDef] = &[
    cm('o', ChannelMode::Operator, STATUS_O),
    cm('v', ChannelMode::Voice, STATUS_V),
    cm('b', ChannelMode::Ban, LIST),
    cm('k', ChannelMode::Key, KEYED),
    cm('l', ChannelMode::Limit, PARAM),
    cm('i', ChannelMode::InviteOnly, FLAG),
    cm('m', ChannelMode::Moderated, FLAG),
    cm('n', ChannelMode::NoExternal, FLAG),
    cm('p', ChannelMode::Private, FLAG),
    cm('s', ChannelMode::Secret, FLAG),
    cm('t', ChannelMode::TopicLock, FLAG),
    cm('r', ChannelMode::RegisteredOnly, FLAG),
    cm('D', ChannelMode::DelayJoin, FLAG),
    cm('c', ChannelMode::NoColors, FLAG),
    cm('C', ChannelMode::NoCtcp, FLAG),
    cm('u', ChannelMode::NoPartMessages, FLAG),
];

static USER_MODES: &[UserModeDef] = &[
    um('i', UserMode::Invisible),
    um('w', UserMode::Wallops),
    um('o', UserMode::Operator),
    um('s', UserMode::ServerNotices),
    um('d', UserMode::Deaf),
    um('k', UserMode::Service),
    um('x', UserMode::Cloaked),
    um('g', UserMode::CallerId),
    UserModeDef {
        letter: 'r',
        mode: UserMode::Account,
        takes_param: true,
    },
];

/// P10 mode vocabulary.
pub static MODES: ModeTable = ModeTable {
    channel: CHANNEL_MODES,
    user: USER_MODES,
};

/// Short token → long command name.
const TOKENS: &[(&str, &str)] = &[
    ("A", "AWAY"),
    ("AC", "ACCOUNT"),
    ("B", "BURST"),
    ("C", "CREATE"),
    ("CM", "CLEARMODE"),
    ("D", "KILL"),
    ("EA", "END_OF_BURST_ACK"),
    ("EB", "END_OF_BURST"),
    ("G", "PING"),
    ("J", "JOIN"),
    ("K", "KICK"),
    ("L", "PART"),
    ("M", "MODE"),
    ("N", "NICK"),
    ("O", "NOTICE"),
    ("OM", "OPMODE"),
    ("P", "PRIVMSG"),
    ("Q", "QUIT"),
    ("S", "SERVER"),
    ("SQ", "SQUIT"),
    ("T", "TOPIC"),
    ("WA", "WALLOPS"),
    ("Y", "ERROR"),
    ("Z", "PONG"),
];

/// Commands the uplink sends before it starts prefixing numerics.
const UNPREFIXED: &[&str] = &["PASS", "SERVER", "ERROR"];

fn expand_token(token: &str) -> Option<&'static str> {
    TOKENS
        .iter()
        .find(|(short, _)| *short == token)
        .map(|(_, long)| *long)
}

/// Decode a P10 base-64 address: six characters for IPv4, three per
/// 16-bit group for IPv6 with `_` standing in for a run of zero groups.
pub fn decode_ip(encoded: &str) -> Option<IpAddr> {
    if encoded.len() == 6 && !encoded.contains('_') {
        let n = u32::try_from(p10_decode(encoded)?).ok()?;
        return Some(IpAddr::V4(Ipv4Addr::from(n)));
    }

    fn groups(s: &str) -> Option<Vec<u16>> {
        if s.len() % 3 != 0 {
            return None;
        }
        s.as_bytes()
            .chunks(3)
            .map(|c| {
                let text = std::str::from_utf8(c).ok()?;
                u16::try_from(p10_decode(text)?).ok()
            })
            .collect()
    }

    let (head, tail) = match encoded.split_once('_') {
        Some((head, tail)) => (groups(head)?, groups(tail)?),
        None => (groups(encoded)?, Vec::new()),
    };
    if head.len() + tail.len() > 8 {
        return None;
    }
    let mut segments = [0u16; 8];
    segments[..head.len()].copy_from_slice(&head);
    segments[8 - tail.len()..].copy_from_slice(&tail);
    Some(IpAddr::V6(Ipv6Addr::from(segments)))
}

/// Encode an IPv4 address for an N line. Anything else goes out as
/// `AAAAAA` (0.0.0.0).
pub fn encode_ip(ip: &str) -> String {
    ip.parse::<Ipv4Addr>()
        .ok()
        .and_then(|a| p10_encode(u64::from(u32::from(a)), 6))
        .unwrap_or_else(|| "AAAAAA".to_string())
}

/// A line in P10 form: `<numeric> <TOKEN> params...`.
fn line<I, S>(sender: &str, token: &str, params: I) -> Message
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut all = vec![token.to_string()];
    all.extend(params.into_iter().map(Into::into));
    Message::new(sender, all)
}

/// The P10 dialect.
pub struct P10 {
    commands: CommandTable<Self>,
}

impl Default for P10 {
    fn default() -> Self {
        Self::new()
    }
}

impl P10 {
    pub fn new() -> Self {
        let mut commands: CommandTable<Self> = CommandTable::new();

        commands.insert("PASS", Self::on_pass);
        commands.insert("SERVER", Self::on_server);
        commands.insert("ERROR", Self::on_error);
        commands.insert("PING", Self::on_ping);
        commands.insert("PONG", Self::on_passthrough);
        commands.insert("END_OF_BURST", Self::on_end_of_burst);
        commands.insert("END_OF_BURST_ACK", Self::on_passthrough);
        commands.insert("SQUIT", Self::on_squit);

        commands.insert("NICK", Self::on_nick);
        commands.insert("QUIT", Self::on_quit);
        commands.insert("KILL", Self::on_kill);
        commands.insert("AWAY", Self::on_away);
        commands.insert("ACCOUNT", Self::on_account);

        commands.insert("BURST", Self::on_burst);
        commands.insert("CREATE", Self::on_create);
        commands.insert("JOIN", Self::on_join);
        commands.insert("PART", Self::on_part);
        commands.insert("KICK", Self::on_kick);
        commands.insert("MODE", Self::on_mode);
        commands.insert("OPMODE", Self::on_mode);
        commands.insert("CLEARMODE", Self::on_clearmode);
        commands.insert("TOPIC", Self::on_topic);

        commands.insert("PRIVMSG", Self::on_passthrough);
        commands.insert("NOTICE", Self::on_passthrough);
        commands.insert("WALLOPS", Self::on_passthrough);

        Self { commands }
    }

    fn on_passthrough(&self, _s: &mut Session, _msg: &Message) -> Result<(), UplinkError> {
        Ok(())
    }

    /// `PASS :<password>`
    fn on_pass(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        s.check_password(msg.param(0).unwrap_or_default())
    }

    /// `SERVER <name> <hops> <start ts> <link ts> J10 <numeric><mask> +<flags> :<desc>`
    /// for the uplink, and the same after a numeric (`S`) for servers
    /// behind it.
    fn on_server(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 8) {
            return Ok(());
        }
        let p = &msg.params;
        let Some(numeric) = p[5].get(..2) else {
            warn!(numeric = %p[5], "SERVER with a short numeric");
            return Ok(());
        };
        let hops = p[1].parse().unwrap_or(1);
        let description = &p[p.len() - 1];

        if s.uplink_key().is_some() {
            let Some(behind) = origin(msg) else {
                return Ok(());
            };
            let server = Server::new(&p[0], description, hops)
                .with_sid(numeric)
                .behind(behind);
            s.network.add_server(&mut s.events, server);
            return Ok(());
        }

        s.require_password()?;
        s.check_uplink_name(&p[0])?;
        s.check_clock(parse_ts(&p[3]))?;
        s.set_peer_sid(numeric);
        s.accept_uplink(Server::new(&p[0], description, 1).with_sid(numeric));
        s.begin_burst();
        Ok(())
    }

    fn on_error(&self, _s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        Err(UplinkError::Remote(
            msg.last_param().unwrap_or_default().to_string(),
        ))
    }

    /// `<numeric> G [:]<token>`
    fn on_ping(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let token = msg.last_param().unwrap_or_default().to_string();
        self.pong(s, &token);
        Ok(())
    }

    fn on_end_of_burst(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if msg.origin.as_deref() != s.uplink_key() {
            debug!(server = ?msg.origin, "End of burst from behind the uplink");
            return Ok(());
        }
        s.end_burst();
        Ok(())
    }

    /// `<numeric> SQ <server> <link ts> :<reason>`
    fn on_squit(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 1) {
            return Ok(());
        }
        let target = &msg.params[0];
        let reason = msg.last_param().unwrap_or_default();
        if target.eq_ignore_ascii_case(&s.identity().name)
            || Some(target.as_str()) == s.identity().sid.as_deref()
        {
            return Err(UplinkError::Squit(reason.to_string()));
        }
        s.network.remove_server(&mut s.events, target, reason);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Introduction:
    /// `<server> N <nick> <hops> <ts> <user> <host> [+modes [args]] <ip> <numeric> :<real>`
    ///
    /// Nick change: `<user> N <newnick> <ts>`
    fn on_nick(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let Some(src) = origin(msg) else {
            return Ok(());
        };
        let p = &msg.params;

        if p.len() < 7 {
            if arity(msg, 1) {
                let ts = msg.param(1).map(parse_ts);
                s.network.rename_user(&mut s.events, src, &p[0], ts);
            }
            return Ok(());
        }

        let n = p.len();
        let ip = decode_ip(&p[n - 3]).map_or_else(|| "0".to_string(), |ip| ip.to_string());
        let user = User::new(&p[0], &p[3], &p[4], &p[n - 1], src, parse_ts(&p[2]))
            .with_ip(ip)
            .with_uid(&p[n - 2]);
        let Some(key) = s.network.add_user(&mut s.events, user) else {
            return Ok(());
        };

        if p[5].starts_with('+') {
            // +r carries `account[:ts]`.
            let args: Vec<&str> = p
                .get(6..n - 3)
                .unwrap_or_default()
                .iter()
                .map(|a| a.split(':').next().unwrap_or_default())
                .collect();
            s.network.apply_user_modes(&mut s.events, &key, &p[5], &args);
        }
        Ok(())
    }

    fn on_quit(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let Some(src) = origin(msg) else {
            return Ok(());
        };
        let reason = msg.param(0).unwrap_or_default();
        s.network.remove_user(&mut s.events, src, reason);
        Ok(())
    }

    /// `<killer> D <numeric> :<path> (<reason>)`
    fn on_kill(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 1) {
            return Ok(());
        }
        let reason = msg.param(1).unwrap_or("Killed");
        if s.network.is_local_user(&msg.params[0]) {
            warn!(user = %msg.params[0], %reason, "One of our users was killed");
        }
        s.network.remove_user(&mut s.events, &msg.params[0], reason);
        Ok(())
    }

    fn on_away(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let Some(src) = origin(msg) else {
            return Ok(());
        };
        let away = msg.param(0).filter(|m| !m.is_empty()).map(str::to_string);
        s.network.set_away(src, away);
        Ok(())
    }

    /// `<server> AC <numeric> [R|M] <account> [ts]` or `<server> AC <numeric> U`
    fn on_account(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        let p = &msg.params;
        let account = match p[1].as_str() {
            "U" => None,
            "R" | "M" => p.get(2).cloned(),
            name => Some(name.to_string()),
        };
        s.network.set_account(&mut s.events, &p[0], account);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// `<server> B <channel> <ts> [+modes [args]] [members] [:%bans]`
    ///
    /// Members are `numeric[:modes]`, comma separated; a member's modes
    /// stick to every following member until the next `:`.
    fn on_burst(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        let p = &msg.params;
        let channel = &p[0];
        let ts = parse_ts(&p[1]);

        let mut i = 2;
        let mut modes = Vec::new();
        if let Some(mode_str) = p.get(i).filter(|m| m.starts_with('+')) {
            i += 1;
            let wanted = mode_str
                .chars()
                .filter(|c| {
                    matches!(
                        MODES.channel_def(*c).map(|d| d.class),
                        Some(ModeClass::Param { .. })
                    )
                })
                .count();
            let end = (i + wanted).min(p.len());
            modes = MODES.parse_channel(mode_str, &p[i..end]);
            i = end;
        }

        let mut members = Vec::new();
        for param in &p[i..] {
            if let Some(bans) = param.strip_prefix('%') {
                modes.extend(
                    bans.split_whitespace()
                        .map(|mask| ModeChange::add(ChannelMode::Ban, Some(mask.to_string()))),
                );
                continue;
            }
            let mut sticky: Vec<ChannelMode> = Vec::new();
            for entry in param.split(',').filter(|e| !e.is_empty()) {
                let numeric = match entry.split_once(':') {
                    Some((numeric, flags)) => {
                        sticky = member_statuses(flags);
                        numeric
                    }
                    None => entry,
                };
                members.push(BurstMember::new(numeric, sticky.clone()));
            }
        }

        s.network
            .burst_channel(&mut s.events, channel, ts, &modes, &members);
        Ok(())
    }

    /// `<user> C <channel>[,<channel>...] <ts>`: the creator gets ops.
    fn on_create(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let (Some(src), true) = (origin(msg), arity(msg, 2)) else {
            return Ok(());
        };
        let ts = parse_ts(&msg.params[1]);
        for channel in msg.params[0].split(',') {
            let creator = BurstMember::new(src, vec![ChannelMode::Operator]);
            s.network
                .burst_channel(&mut s.events, channel, ts, &[], &[creator]);
        }
        Ok(())
    }

    /// `<user> J <channel>[,<channel>...] [ts]`, or `J 0`.
    fn on_join(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let (Some(src), true) = (origin(msg), arity(msg, 1)) else {
            return Ok(());
        };
        if msg.params[0] == "0" {
            s.network.part_all(&mut s.events, src);
            return Ok(());
        }
        for channel in msg.params[0].split(',') {
            let ts = match msg.param(1) {
                Some(ts) => parse_ts(ts),
                None => s
                    .network
                    .channel(channel)
                    .map_or_else(|| s.now_ts(), |c| c.ts),
            };
            let member = BurstMember::new(src, Vec::new());
            s.network
                .burst_channel(&mut s.events, channel, ts, &[], &[member]);
        }
        Ok(())
    }

    fn on_part(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let (Some(src), true) = (origin(msg), arity(msg, 1)) else {
            return Ok(());
        };
        for channel in msg.params[0].split(',') {
            s.network.remove_member(&mut s.events, channel, src);
        }
        Ok(())
    }

    /// `<src> K <channel> <numeric> :<reason>`
    fn on_kick(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        s.network
            .remove_member(&mut s.events, &msg.params[0], &msg.params[1]);
        Ok(())
    }

    /// `<src> M <channel> <modes> [args] [ts]`, `<src> OM ...`, or
    /// `<user> M <nick> :<umodes>`.
    ///
    /// A server-sourced channel change ending in a TS follows the TS rules.
    fn on_mode(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        let target = &msg.params[0];
        if target.starts_with(['#', '&', '+']) {
            let from_server = origin(msg).is_some_and(|o| s.network.server_key(o).is_some());
            match timestamped_modes(&MODES, &msg.params[1], &msg.params[2..]) {
                Some((ts, args)) if from_server => {
                    let changes = MODES.parse_channel(&msg.params[1], args);
                    s.network.ts_mode(&mut s.events, target, ts, &changes);
                }
                _ => s.network.apply_modes(
                    &mut s.events,
                    target,
                    &msg.params[1],
                    &msg.params[2..],
                ),
            }
        } else {
            s.network
                .apply_user_modes(&mut s.events, target, &msg.params[1], &msg.params[2..]);
        }
        Ok(())
    }

    /// `<src> CM <channel> <letters>`: clear every listed mode.
    fn on_clearmode(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        let channel = &msg.params[0];
        let Some(chan) = s.network.channel(channel) else {
            warn!(%channel, "CLEARMODE for unknown channel");
            return Ok(());
        };

        let mut changes = Vec::new();
        for letter in msg.params[1].chars() {
            let Some(def) = MODES.channel_def(letter) else {
                continue;
            };
            match def.class {
                ModeClass::Status { .. } => changes.extend(
                    chan.members
                        .iter()
                        .filter(|m| s.network.has_status(channel, m, def.mode))
                        .map(|m| ModeChange::delete(def.mode, Some(m.clone()))),
                ),
                ModeClass::List => changes.extend(
                    chan.list(def.mode)
                        .map(|mask| ModeChange::delete(def.mode, Some(mask.to_string()))),
                ),
                ModeClass::Param { .. } => {
                    if let Some(value) = chan.param(def.mode) {
                        changes.push(ModeChange::delete(def.mode, Some(value.to_string())));
                    }
                }
                ModeClass::Flag => {
                    if chan.has_mode(def.mode) {
                        changes.push(ModeChange::delete(def.mode, None));
                    }
                }
            }
        }
        s.network.apply_changes(&mut s.events, channel, &changes);
        Ok(())
    }

    /// `<src> T <channel> [<chan ts> <topic ts>] :<topic>`
    fn on_topic(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let (Some(src), true) = (origin(msg), arity(msg, 2)) else {
            return Ok(());
        };
        let p = &msg.params;
        let set_at = if p.len() >= 4 {
            parse_ts(&p[p.len() - 2])
        } else {
            s.now_ts()
        };
        let setter = s
            .network
            .user(src)
            .map_or_else(|| src.to_string(), |u| u.nick.clone());
        s.network
            .set_topic(&mut s.events, &p[0], &p[p.len() - 1], &setter, set_at);
        Ok(())
    }
}

/// Status modes named by a burst member's flags. A digit is an oplevel,
/// which implies op.
fn member_statuses(flags: &str) -> Vec<ChannelMode> {
    let mut out: Vec<ChannelMode> = flags
        .chars()
        .filter_map(|c| MODES.channel_def(c))
        .filter(|d| d.mode.is_status())
        .map(|d| d.mode)
        .collect();
    if flags.chars().any(|c| c.is_ascii_digit()) && !out.contains(&ChannelMode::Operator) {
        out.push(ChannelMode::Operator);
    }
    out
}

impl Dialect for P10 {
    fn name(&self) -> &'static str {
        "p10"
    }

    fn mode_table(&self) -> &'static ModeTable {
        &MODES
    }

    fn uid_format(&self) -> UidFormat {
        UidFormat::P10
    }

    fn service_umodes(&self) -> &'static str {
        "+iok"
    }

    fn handshake(&self, s: &mut Session) {
        let now = s.now_ts().to_string();
        let password = s.link().send_password.clone();
        let numeric = format!("{}]]]", s.local_ref());
        let (name, description) = (s.identity().name.clone(), s.identity().description.clone());

        s.send(Message::new("PASS", [password]).with_trailing());
        s.send(
            Message::new(
                "SERVER",
                [
                    name,
                    "1".into(),
                    now.clone(),
                    now,
                    "J10".into(),
                    numeric,
                    "+s6".into(),
                    description,
                ],
            )
            .with_trailing(),
        );
    }

    fn decode(&self, s: &mut Session, mut msg: Message) -> Result<(), UplinkError> {
        if msg.origin.is_none()
            && !msg.params.is_empty()
            && !UNPREFIXED.contains(&msg.command.as_str())
        {
            let token = msg.params.remove(0);
            msg.origin = Some(std::mem::replace(&mut msg.command, token));
        }
        if let Some(long) = expand_token(&msg.command) {
            msg.command = long.to_string();
        }
        dispatch(self, &self.commands, s, msg)
    }

    fn burst_complete(&self, s: &mut Session) {
        let us = s.local_ref();
        s.send(line(&us, "EB", [] as [&str; 0]));
        s.send(line(&us, "EA", [] as [&str; 0]));
    }

    fn pong(&self, s: &mut Session, token: &str) {
        let us = s.local_ref();
        s.send(line(&us, "Z", [us.as_str(), token]).with_trailing());
    }

    fn introduce_user(&self, s: &mut Session, key: &str) {
        let Some(user) = s.network.user(key) else {
            return;
        };
        let params = vec![
            user.nick.clone(),
            "1".into(),
            user.ts.to_string(),
            user.username.clone(),
            user.hostname.clone(),
            umode_string(&MODES, user.modes.iter().copied()),
            encode_ip(&user.ip),
            user.uid.clone().unwrap_or_default(),
            user.realname.clone(),
        ];
        let us = s.local_ref();
        s.send(line(&us, "N", params).with_trailing());
    }

    fn join(&self, s: &mut Session, user: &str, channel: &str, ts: i64, op: bool) {
        let token = if op { "C" } else { "J" };
        s.send(line(user, token, [channel.to_string(), ts.to_string()]));
    }

    fn part(&self, s: &mut Session, user: &str, channel: &str, reason: &str) {
        let msg = if reason.is_empty() {
            line(user, "L", [channel])
        } else {
            line(user, "L", [channel, reason]).with_trailing()
        };
        s.send(msg);
    }

    fn privmsg(&self, s: &mut Session, from: &str, target: &str, text: &str) {
        s.send(line(from, "P", [target, text]).with_trailing());
    }

    fn notice(&self, s: &mut Session, from: &str, target: &str, text: &str) {
        s.send(line(from, "O", [target, text]).with_trailing());
    }

    fn topic(&self, s: &mut Session, from: &str, channel: &str, text: &str) {
        s.send(line(from, "T", [channel, text]).with_trailing());
    }

    fn quit(&self, s: &mut Session, user: &str, reason: &str) {
        s.send(line(user, "Q", [reason]).with_trailing());
    }

    fn operwall(&self, s: &mut Session, from: Option<&str>, text: &str) {
        let sender = from.map_or_else(|| s.local_ref(), str::to_string);
        s.send(line(&sender, "WA", [text]).with_trailing());
    }

    fn channel_mode(
        &self,
        s: &mut Session,
        channel: &str,
        ts: i64,
        modes: &str,
        params: &[String],
    ) {
        let mut out = vec![channel.to_string(), modes.to_string()];
        out.extend(params.iter().cloned());
        out.push(ts.to_string());
        let us = s.local_ref();
        s.send(line(&us, "M", out));
    }
}
