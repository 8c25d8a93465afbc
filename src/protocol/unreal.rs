//! UnrealIRCd 3.2.
//!
//! Unreal has no UIDs: users are keyed by folded nickname and servers by
//! name, and every reference on the wire is a nick or a server name.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use slsvc_proto::Message;
use tracing::{debug, warn};

use super::uid::UidFormat;
use super::{
    arity, dispatch, origin, parse_ts, timestamped_modes, umode_string, CommandTable, Dialect,
};
use crate::error::UplinkError;
use crate::state::modes::{
    cm, um, ChannelModeDef, ModeTable, UserModeDef, FLAG, KEYED, LIST, PARAM, STATUS_A, STATUS_H,
    STATUS_O, STATUS_Q, STATUS_V,
};
use crate::state::{BurstMember, ChannelMode, ModeChange, Server, User, UserMode};
use crate::sync::Session;

const PROTOCTL: &[&str] = &[
    "NOQUIT", "NICKv2", "SJOIN", "SJOIN2", "UMODE2", "VL", "SJ3", "NICKIP", "TKLEXT",
];

static CHANNEL_MODES: &[ChannelModeDef] = &[
    cm('q', ChannelMode::Owner, STATUS_Q),
    cm('a', ChannelMode::Admin, STATUS_A),
    cm('o', ChannelMode::Operator, STATUS_O),
    cm('h', ChannelMode::Halfop, STATUS_H),
    cm('v', ChannelMode::Voice, STATUS_V),
    cm('b', ChannelMode::Ban, LIST),
    cm('e', ChannelMode::Except, LIST),
    cm('I', ChannelMode::InviteExcept, LIST),
    cm('k', ChannelMode::Key, KEYED),
    cm('l', ChannelMode::Limit, PARAM),
    cm('L', ChannelMode::Redirect, PARAM),
    cm('f', ChannelMode::Flood, PARAM),
    cm('j', ChannelMode::JoinThrottle, PARAM),
    cm('c', ChannelMode::NoColors, FLAG),
    cm('C', ChannelMode::NoCtcp, FLAG),
    cm('G', ChannelMode::Censor, FLAG),
    cm('i', ChannelMode::InviteOnly, FLAG),
    cm('m', ChannelMode::Moderated, FLAG),
    cm('M', ChannelMode::ModRegistered, FLAG),
    cm('n', ChannelMode::NoExternal, FLAG),
    cm('N', ChannelMode::NoNickChange, FLAG),
    cm('O', ChannelMode::OperOnly, FLAG),
    cm('p', ChannelMode::Private, FLAG),
    cm('Q', ChannelMode::NoKicks, FLAG),
    cm('r', ChannelMode::Registered, FLAG),
    cm('R', ChannelMode::RegisteredOnly, FLAG),
    cm('s', ChannelMode::Secret, FLAG),
    cm('S', ChannelMode::StripColors, FLAG),
    cm('t', ChannelMode::TopicLock, FLAG),
    cm('T', ChannelMode::NoNotice, FLAG),
    cm('u', ChannelMode::Auditorium, FLAG),
    cm('V', ChannelMode::NoInvite, FLAG),
    cm('z', ChannelMode::TlsOnly, FLAG),
];

static USER_MODES: &[UserModeDef] = &[
    um('i', UserMode::Invisible),
    um('w', UserMode::Wallops),
    um('o', UserMode::Operator),
    um('A', UserMode::Admin),
    um('S', UserMode::Service),
    um('d', UserMode::Deaf),
    um('r', UserMode::Registered),
    um('x', UserMode::Cloaked),
    um('s', UserMode::ServerNotices),
    um('B', UserMode::Bot),
    um('z', UserMode::Secure),
    um('H', UserMode::HideOper),
];

/// Unreal mode vocabulary.
pub static MODES: ModeTable = ModeTable {
    channel: CHANNEL_MODES,
    user: USER_MODES,
};

/// One entry of an SJOIN member list.
#[derive(Debug, PartialEq, Eq)]
enum SjoinEntry {
    Member(BurstMember),
    List(ChannelMode, String),
}

/// SJ3 member entries carry their own prefix set, distinct from NAMES:
/// `*` owner, `~` admin, `@` op, `%` halfop, `+` voice, and `&` `"` `'`
/// for ban, exception and invite-exception masks.
fn sjoin_entry(entry: &str) -> Option<SjoinEntry> {
    let list = match entry.chars().next()? {
        '&' => Some(ChannelMode::Ban),
        '"' => Some(ChannelMode::Except),
        '\'' => Some(ChannelMode::InviteExcept),
        _ => None,
    };
    if let Some(mode) = list {
        return Some(SjoinEntry::List(mode, entry[1..].to_string()));
    }

    let mut statuses = Vec::new();
    let mut rest = entry;
    while let Some(c) = rest.chars().next() {
        let status = match c {
            '*' => ChannelMode::Owner,
            '~' => ChannelMode::Admin,
            '@' => ChannelMode::Operator,
            '%' => ChannelMode::Halfop,
            '+' => ChannelMode::Voice,
            _ => break,
        };
        statuses.push(status);
        rest = &rest[c.len_utf8()..];
    }
    (!rest.is_empty()).then(|| SjoinEntry::Member(BurstMember::new(rest, statuses)))
}

/// Decode a NICKIP address: base64 of the 4 or 16 raw bytes, or `*`.
pub fn decode_ip(encoded: &str) -> Option<IpAddr> {
    let bytes = STANDARD.decode(encoded).ok()?;
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Encode an address for NICKIP, `*` if it is not one.
pub fn encode_ip(ip: &str) -> String {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => STANDARD.encode(v4.octets()),
        Ok(IpAddr::V6(v6)) => STANDARD.encode(v6.octets()),
        Err(_) => "*".to_string(),
    }
}

/// VL servers prefix their description with `U<protocol>-<flags>-<numeric> `.
fn strip_version_info(description: &str) -> &str {
    match description.split_once(' ') {
        Some((first, rest))
            if first.starts_with('U')
                && first[1..].chars().next().is_some_and(|c| c.is_ascii_digit())
                && first.contains('-') =>
        {
            rest
        }
        _ => description,
    }
}

/// The UnrealIRCd dialect.
pub struct Unreal {
    commands: CommandTable<Self>,
}

impl Default for Unreal {
    fn default() -> Self {
        Self::new()
    }
}

impl Unreal {
    pub fn new() -> Self {
        let mut commands: CommandTable<Self> = CommandTable::new();

        commands.insert("PASS", Self::on_pass);
        commands.insert("PROTOCTL", Self::on_protoctl);
        commands.insert("SERVER", Self::on_server);
        commands.insert("NETINFO", Self::on_netinfo);
        commands.insert("EOS", Self::on_eos);
        commands.insert("ERROR", Self::on_error);
        commands.insert("PING", Self::on_ping);
        commands.insert("PONG", Self::on_passthrough);
        commands.insert("SQUIT", Self::on_squit);

        commands.insert("NICK", Self::on_nick);
        commands.insert("QUIT", Self::on_quit);
        commands.insert("KILL", Self::on_kill);
        commands.insert("UMODE2", Self::on_umode2);
        commands.insert("AWAY", Self::on_away);

        commands.insert("SJOIN", Self::on_sjoin);
        commands.insert("JOIN", Self::on_join);
        commands.insert("PART", Self::on_part);
        commands.insert("KICK", Self::on_kick);
        commands.insert("MODE", Self::on_mode);
        commands.insert("TOPIC", Self::on_topic);

        commands.insert("PRIVMSG", Self::on_passthrough);
        commands.insert("NOTICE", Self::on_passthrough);

        Self { commands }
    }

    fn from_server(&self, s: &Session, command: &str, params: Vec<String>) -> Message {
        Message::new(command, params).with_origin(s.local_ref())
    }

    fn on_passthrough(&self, _s: &mut Session, _msg: &Message) -> Result<(), UplinkError> {
        Ok(())
    }

    fn on_pass(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        s.check_password(msg.param(0).unwrap_or_default())
    }

    fn on_protoctl(&self, _s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        debug!(tokens = ?msg.params, "PROTOCTL");
        Ok(())
    }

    /// Uplink: `SERVER <name> <hops> :<description>`
    ///
    /// Behind it: `:<origin> SERVER <name> <hops> :<description>`
    fn on_server(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 3) {
            return Ok(());
        }
        let p = &msg.params;
        let hops = p[1].parse().unwrap_or(1);
        let description = strip_version_info(&p[p.len() - 1]);

        if let Some(uplink) = s.uplink_key() {
            let behind = msg
                .origin
                .as_deref()
                .and_then(|o| s.network.server_key(o))
                .unwrap_or_else(|| uplink.to_string());
            let server = Server::new(&p[0], description, hops).behind(behind);
            s.network.add_server(&mut s.events, server);
            return Ok(());
        }

        s.require_password()?;
        s.check_uplink_name(&p[0])?;
        s.accept_uplink(Server::new(&p[0], description, 1));
        s.begin_burst();
        Ok(())
    }

    /// `NETINFO <max global> <ts> <protocol> <cloak hash> 0 0 0 :<network>`
    fn on_netinfo(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        s.check_clock(parse_ts(&msg.params[1]))
    }

    fn on_eos(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let from = msg.origin.as_deref().and_then(|o| s.network.server_key(o));
        if from.is_some() && from.as_deref() != s.uplink_key() {
            debug!(server = ?msg.origin, "End of sync from behind the uplink");
            return Ok(());
        }
        s.end_burst();
        Ok(())
    }

    fn on_error(&self, _s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        Err(UplinkError::Remote(
            msg.last_param().unwrap_or_default().to_string(),
        ))
    }

    fn on_ping(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let token = msg.param(0).unwrap_or_default().to_string();
        self.pong(s, &token);
        Ok(())
    }

    fn on_squit(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 1) {
            return Ok(());
        }
        let target = &msg.params[0];
        let reason = msg.param(1).unwrap_or_default();
        if target.eq_ignore_ascii_case(&s.identity().name) {
            return Err(UplinkError::Squit(reason.to_string()));
        }
        s.network.remove_server(&mut s.events, target, reason);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Introduction (NICKv2 + NICKIP):
    /// `NICK <nick> <hops> <ts> <user> <host> <server> <stamp> <umodes> <vhost> [<ip>] :<real>`
    ///
    /// Change: `:<nick> NICK <newnick> <ts>`
    fn on_nick(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let p = &msg.params;
        if p.len() < 10 {
            let (Some(nick), true) = (origin(msg), arity(msg, 1)) else {
                return Ok(());
            };
            let ts = msg.param(1).map(parse_ts);
            s.network.rename_user(&mut s.events, nick, &p[0], ts);
            return Ok(());
        }

        let Some(server) = s.network.server_key(&p[5]) else {
            warn!(nick = %p[0], server = %p[5], "NICK from unknown server");
            return Ok(());
        };
        let ip = if p.len() >= 11 {
            decode_ip(&p[9]).map_or_else(|| "0".to_string(), |ip| ip.to_string())
        } else {
            "0".to_string()
        };
        let user = User::new(&p[0], &p[3], &p[4], &p[p.len() - 1], server, parse_ts(&p[2]))
            .with_ip(ip);
        if let Some(key) = s.network.add_user(&mut s.events, user) {
            s.network
                .apply_user_modes(&mut s.events, &key, &p[7], &[] as &[&str]);
        }
        Ok(())
    }

    fn on_quit(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let Some(nick) = origin(msg) else {
            return Ok(());
        };
        let reason = msg.param(0).unwrap_or_default();
        s.network.remove_user(&mut s.events, nick, reason);
        Ok(())
    }

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

    /// `:<nick> UMODE2 <modes>`
    fn on_umode2(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let (Some(nick), true) = (origin(msg), arity(msg, 1)) else {
            return Ok(());
        };
        s.network
            .apply_user_modes(&mut s.events, nick, &msg.params[0], &[] as &[&str]);
        Ok(())
    }

    fn on_away(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let Some(nick) = origin(msg) else {
            return Ok(());
        };
        let away = msg.param(0).filter(|m| !m.is_empty()).map(str::to_string);
        s.network.set_away(nick, away);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// `:<server> SJOIN <ts> <channel> [<modes> [args]] :<entries>`
    fn on_sjoin(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 3) {
            return Ok(());
        }
        let p = &msg.params;
        let n = p.len();
        let mut modes = if n >= 4 {
            MODES.parse_channel(&p[2], &p[3..n - 1])
        } else {
            Vec::new()
        };

        let mut members = Vec::new();
        for entry in p[n - 1].split_whitespace().filter_map(sjoin_entry) {
            match entry {
                SjoinEntry::Member(member) => members.push(member),
                SjoinEntry::List(mode, mask) => modes.push(ModeChange::add(mode, Some(mask))),
            }
        }

        s.network
            .burst_channel(&mut s.events, &p[1], parse_ts(&p[0]), &modes, &members);
        Ok(())
    }

    /// `:<nick> JOIN <channel>[,<channel>...]`, or `JOIN 0`.
    fn on_join(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let (Some(nick), true) = (origin(msg), arity(msg, 1)) else {
            return Ok(());
        };
        if msg.params[0] == "0" {
            s.network.part_all(&mut s.events, nick);
            return Ok(());
        }
        for channel in msg.params[0].split(',') {
            let ts = s
                .network
                .channel(channel)
                .map_or_else(|| s.now_ts(), |c| c.ts);
            let member = BurstMember::new(nick, Vec::new());
            s.network
                .burst_channel(&mut s.events, channel, ts, &[], &[member]);
        }
        Ok(())
    }

    fn on_part(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let (Some(nick), true) = (origin(msg), arity(msg, 1)) else {
            return Ok(());
        };
        for channel in msg.params[0].split(',') {
            s.network.remove_member(&mut s.events, channel, nick);
        }
        Ok(())
    }

    fn on_kick(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        s.network
            .remove_member(&mut s.events, &msg.params[0], &msg.params[1]);
        Ok(())
    }

    /// `:<src> MODE <channel> <modes> [args] [ts]` or `:<nick> MODE <nick> :<umodes>`
    ///
    /// Servers append the channel TS; such changes follow the TS rules.
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

    /// `:<src> TOPIC <channel> [<setter> <ts>] :<topic>`
    fn on_topic(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let (Some(src), true) = (origin(msg), arity(msg, 2)) else {
            return Ok(());
        };
        let p = &msg.params;
        let (setter, set_at) = if p.len() >= 4 {
            (p[1].clone(), parse_ts(&p[2]))
        } else {
            (src.to_string(), s.now_ts())
        };
        s.network
            .set_topic(&mut s.events, &p[0], &p[p.len() - 1], &setter, set_at);
        Ok(())
    }
}

impl Dialect for Unreal {
    fn name(&self) -> &'static str {
        "unreal"
    }

    fn mode_table(&self) -> &'static ModeTable {
        &MODES
    }

    fn keys_by_uid(&self) -> bool {
        false
    }

    fn uid_format(&self) -> UidFormat {
        UidFormat::Nick
    }

    fn service_umodes(&self) -> &'static str {
        "+ioS"
    }

    fn handshake(&self, s: &mut Session) {
        let password = s.link().send_password.clone();
        let (name, description) = (s.identity().name.clone(), s.identity().description.clone());

        s.send(Message::new("PASS", [password]).with_trailing());
        s.send(Message::new("PROTOCTL", PROTOCTL.iter().copied()));
        s.send(Message::new("SERVER", [name, "1".into(), description]).with_trailing());
    }

    fn decode(&self, s: &mut Session, msg: Message) -> Result<(), UplinkError> {
        dispatch(self, &self.commands, s, msg)
    }

    fn burst_complete(&self, s: &mut Session) {
        let msg = self.from_server(s, "EOS", Vec::new());
        s.send(msg);
    }

    fn pong(&self, s: &mut Session, token: &str) {
        let name = s.identity().name.clone();
        let msg = self.from_server(s, "PONG", vec![name, token.to_string()]);
        s.send(msg.with_trailing());
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
            s.identity().name.clone(),
            "0".into(),
            umode_string(&MODES, user.modes.iter().copied()),
            user.hostname.clone(),
            encode_ip(&user.ip),
            user.realname.clone(),
        ];
        s.send(Message::new("NICK", params).with_trailing());
    }

    fn join(&self, s: &mut Session, user: &str, channel: &str, ts: i64, op: bool) {
        if op {
            let msg = self.from_server(
                s,
                "SJOIN",
                vec![ts.to_string(), channel.to_string(), "+".into(), format!("@{user}")],
            );
            s.send(msg.with_trailing());
        } else {
            s.send(Message::new("JOIN", [channel]).with_origin(user));
        }
    }

    fn part(&self, s: &mut Session, user: &str, channel: &str, reason: &str) {
        let params = if reason.is_empty() {
            vec![channel]
        } else {
            vec![channel, reason]
        };
        s.send(Message::new("PART", params).with_origin(user));
    }

    fn privmsg(&self, s: &mut Session, from: &str, target: &str, text: &str) {
        s.send(
            Message::new("PRIVMSG", [target, text])
                .with_origin(from)
                .with_trailing(),
        );
    }

    fn notice(&self, s: &mut Session, from: &str, target: &str, text: &str) {
        s.send(
            Message::new("NOTICE", [target, text])
                .with_origin(from)
                .with_trailing(),
        );
    }

    fn topic(&self, s: &mut Session, from: &str, channel: &str, text: &str) {
        s.send(
            Message::new("TOPIC", [channel, text])
                .with_origin(from)
                .with_trailing(),
        );
    }

    fn quit(&self, s: &mut Session, user: &str, reason: &str) {
        s.send(Message::new("QUIT", [reason]).with_origin(user).with_trailing());
    }

    fn operwall(&self, s: &mut Session, from: Option<&str>, text: &str) {
        let sender = from.map_or_else(|| s.local_ref(), str::to_string);
        s.send(
            Message::new("GLOBOPS", [text])
                .with_origin(sender)
                .with_trailing(),
        );
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
        let msg = self.from_server(s, "MODE", out);
        s.send(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::sync::actions::PseudoClient;
    use crate::sync::link::LinkState;
    use crate::sync::session::tests::{feed, sent, session_for, FIXTURE_TS};

    const BURST: &[&str] = &[
        "PASS :linkage",
        "PROTOCTL NOQUIT NICKv2 SJOIN SJOIN2 UMODE2 VL SJ3 NICKIP TKLEXT",
        "SERVER hub.malkier.net 1 :U2309-Fhin6XeOoEm-1 Hub",
        "NICK rakaur 1 1307151136 rakaur malkier.net hub.malkier.net 0 +io * RaKnLQ== :Eric Will",
        "NICK sycobuny 1 1307151140 syco h hub.malkier.net 0 +i * * :Sycobuny",
        ":hub.malkier.net SJOIN 1307151136 #malkier +ntk sekrit :*rakaur @+sycobuny &*!*@bad \"*!*@ex",
        "NETINFO 5 1307151136 2309 * 0 0 0 :Malkier",
        ":hub.malkier.net EOS",
    ];

    fn greeted() -> Session {
        let mut session = session_for(Protocol::Unreal, None);
        session.set_state(LinkState::Connecting);
        session.greet();
        session
    }

    #[test]
    fn sjoin_entries() {
        assert_eq!(
            sjoin_entry("*@rakaur"),
            Some(SjoinEntry::Member(BurstMember::new(
                "rakaur",
                vec![ChannelMode::Owner, ChannelMode::Operator]
            )))
        );
        assert_eq!(
            sjoin_entry("'*!*@inv"),
            Some(SjoinEntry::List(ChannelMode::InviteExcept, "*!*@inv".into()))
        );
        assert_eq!(sjoin_entry("@"), None);
    }

    #[test]
    fn ip_codec() {
        assert_eq!(decode_ip("RaKnLQ=="), Some("69.162.167.45".parse().unwrap()));
        assert_eq!(encode_ip("69.162.167.45"), "RaKnLQ==");
        assert_eq!(decode_ip("*"), None);
        assert_eq!(encode_ip("0"), "*");
    }

    #[test]
    fn handshake_lines() {
        let mut session = greeted();
        assert_eq!(
            sent(&mut session),
            vec![
                "PASS :linkage",
                "PROTOCTL NOQUIT NICKv2 SJOIN SJOIN2 UMODE2 VL SJ3 NICKIP TKLEXT",
                "SERVER services.malkier.net 1 :Services",
            ]
        );
    }

    #[test]
    fn burst_builds_the_model() {
        let mut session = greeted();
        sent(&mut session);
        feed(&mut session, BURST);

        let net = &session.network;
        assert_eq!(net.server("hub.malkier.net").map(|s| s.description.as_str()), Some("Hub"));

        let rakaur = net.user("RAKAUR").unwrap();
        assert_eq!(rakaur.uid, None);
        assert_eq!(rakaur.ip, "69.162.167.45");
        assert_eq!(rakaur.ts, FIXTURE_TS);
        assert!(rakaur.is_operator());

        let chan = net.channel("#malkier").unwrap();
        assert_eq!(chan.key(), Some("sekrit"));
        assert!(chan.has_list_entry(ChannelMode::Ban, "*!*@bad"));
        assert!(chan.has_list_entry(ChannelMode::Except, "*!*@ex"));
        assert!(net.has_status("#malkier", "rakaur", ChannelMode::Owner));
        assert!(net.has_status("#malkier", "sycobuny", ChannelMode::Operator));
        assert!(net.has_status("#malkier", "sycobuny", ChannelMode::Voice));

        assert_eq!(session.state(), LinkState::Synced);
        assert_eq!(sent(&mut session), vec![":services.malkier.net EOS"]);
    }

    #[test]
    fn nick_change_rekeys() {
        let mut session = greeted();
        feed(&mut session, BURST);
        feed(&mut session, &[":rakaur NICK rak 1307151300"]);
        let net = &session.network;
        assert!(net.user("rakaur").is_none());
        assert!(net.is_member("#malkier", "rak"));
        assert!(net.has_status("#malkier", "rak", ChannelMode::Owner));
    }

    #[test]
    fn umode2_topic_and_quit() {
        let mut session = greeted();
        feed(&mut session, BURST);
        feed(
            &mut session,
            &[
                ":rakaur UMODE2 -o",
                ":rakaur TOPIC #malkier rakaur 1307151200 :Hello",
                ":sycobuny JOIN #other",
                ":sycobuny JOIN 0",
            ],
        );
        let net = &session.network;
        assert!(!net.user("rakaur").unwrap().is_operator());
        let topic = net.channel("#malkier").unwrap().topic.clone().unwrap();
        assert_eq!((topic.set_by.as_str(), topic.set_at), ("rakaur", 1307151200));
        assert!(net.channel("#other").is_none());

        feed(&mut session, &[":rakaur QUIT :bye"]);
        assert_eq!(session.network.channel_count(), 0);
    }

    #[test]
    fn server_before_pass_is_refused() {
        let mut session = greeted();
        assert!(matches!(
            session.receive("SERVER hub.malkier.net 1 :Hub"),
            Err(UplinkError::Handshake(_))
        ));
        assert_eq!(session.network.server_count(), 0);
        assert_ne!(session.state(), LinkState::Bursting);
    }

    #[test]
    fn server_modes_follow_the_channel_ts() {
        let mut session = greeted();
        feed(&mut session, BURST);

        // Newer TS: dropped, status claim included.
        feed(&mut session, &[":hub.malkier.net MODE #malkier +os rakaur 1307159999"]);
        assert!(!session.network.has_status("#malkier", "rakaur", ChannelMode::Operator));
        assert!(!session.network.channel_has_mode("#malkier", ChannelMode::Secret));

        // Same TS: merged.
        feed(&mut session, &[":hub.malkier.net MODE #malkier +s 1307151136"]);
        let chan = session.network.channel("#malkier").unwrap();
        assert!(chan.has_mode(ChannelMode::Secret));
        assert_eq!(chan.key(), Some("sekrit"));

        // Older TS: our view is reset first.
        feed(&mut session, &[":hub.malkier.net MODE #malkier +m 1307150000"]);
        let chan = session.network.channel("#malkier").unwrap();
        assert_eq!(chan.ts, 1307150000);
        assert!(chan.has_mode(ChannelMode::Moderated));
        assert!(!chan.has_mode(ChannelMode::Secret));
        assert_eq!(chan.key(), None);
        assert!(!session.network.has_status("#malkier", "rakaur", ChannelMode::Owner));

        // Users' changes carry no TS and apply as given.
        feed(&mut session, &[":sycobuny MODE #malkier +i"]);
        assert!(session.network.channel_has_mode("#malkier", ChannelMode::InviteOnly));
    }

    #[test]
    fn clock_skew_in_netinfo() {
        let mut session = greeted();
        assert!(matches!(
            session.receive("NETINFO 5 1307140000 2309 * 0 0 0 :Malkier"),
            Err(UplinkError::ClockSkew(_))
        ));
    }

    #[test]
    fn pseudo_users_are_nick_keyed() {
        let mut session = greeted();
        feed(&mut session, BURST);
        sent(&mut session);

        let client = PseudoClient {
            nick: "Status".into(),
            user: "status".into(),
            host: "services.int".into(),
            realname: "Link Status".into(),
        };
        let key = session.introduce_user(&client).unwrap();
        assert_eq!(key, "status");
        session.join(&key, "#malkier").unwrap();
        session.privmsg(&key, "rakaur", "hello").unwrap();
        assert_eq!(
            sent(&mut session),
            vec![
                "NICK Status 1 1307151136 status services.int services.malkier.net 0 +ioS services.int * :Link Status",
                ":Status JOIN #malkier",
                ":Status PRIVMSG rakaur :hello",
            ]
        );
    }
}
