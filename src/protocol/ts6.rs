//! TS6 (charybdis / ratbox family).
//!
//! Servers are named by three-character SIDs and users by nine-character
//! UIDs. The uplink's burst has no explicit end marker: the first PING it
//! sends after bursting is taken as the end.

use slsvc_proto::Message;
use tracing::{debug, warn};

use super::uid::UidFormat;
use super::{arity, dispatch, origin, parse_ts, umode_string, CommandTable, Dialect};
use crate::error::UplinkError;
use crate::state::modes::{
    cm, um, ChannelModeDef, ModeTable, UserModeDef, FLAG, KEYED, LIST, PARAM, STATUS_O, STATUS_V,
};
use crate::state::{BurstMember, ChannelMode, ModeChange, Server, User, UserMode};
use crate::sync::Session;

static CHANNEL_MODES: &[ChannelModeDef] = &[
    cm('o', ChannelMode::Operator, STATUS_O),
    cm('v', ChannelMode::Voice, STATUS_V),
    cm('b', ChannelMode::Ban, LIST),
    cm('e', ChannelMode::Except, LIST),
    cm('I', ChannelMode::InviteExcept, LIST),
    cm('q', ChannelMode::Quiet, LIST),
    cm('k', ChannelMode::Key, KEYED),
    cm('l', ChannelMode::Limit, PARAM),
    cm('f', ChannelMode::Forward, PARAM),
    cm('j', ChannelMode::JoinThrottle, PARAM),
    cm('c', ChannelMode::NoColors, FLAG),
    cm('g', ChannelMode::FreeInvite, FLAG),
    cm('i', ChannelMode::InviteOnly, FLAG),
    cm('L', ChannelMode::LargeLists, FLAG),
    cm('m', ChannelMode::Moderated, FLAG),
    cm('n', ChannelMode::NoExternal, FLAG),
    cm('p', ChannelMode::Private, FLAG),
    cm('P', ChannelMode::Permanent, FLAG),
    cm('Q', ChannelMode::DisableForward, FLAG),
    cm('r', ChannelMode::RegisteredOnly, FLAG),
    cm('s', ChannelMode::Secret, FLAG),
    cm('t', ChannelMode::TopicLock, FLAG),
    cm('z', ChannelMode::OpModerated, FLAG),
    cm('F', ChannelMode::FreeTarget, FLAG),
    cm('C', ChannelMode::NoCtcp, FLAG),
    cm('T', ChannelMode::NoNotice, FLAG),
];

static USER_MODES: &[UserModeDef] = &[
    um('i', UserMode::Invisible),
    um('w', UserMode::Wallops),
    um('o', UserMode::Operator),
    um('a', UserMode::Admin),
    um('S', UserMode::Service),
    um('D', UserMode::Deaf),
    um('g', UserMode::CallerId),
    um('Q', UserMode::NoForward),
    um('s', UserMode::ServerNotices),
    um('x', UserMode::Cloaked),
    um('Z', UserMode::Secure),
];

/// TS6 mode vocabulary.
pub static MODES: ModeTable = ModeTable {
    channel: CHANNEL_MODES,
    user: USER_MODES,
};

const CAPABILITIES: &str = "QS EX IE KLN UNKLN ENCAP TB SERVICES EUID RSFNC";

/// The TS6 dialect.
pub struct Ts6 {
    commands: CommandTable<Self>,
}

impl Default for Ts6 {
    fn default() -> Self {
        Self::new()
    }
}

impl Ts6 {
    pub fn new() -> Self {
        let mut commands: CommandTable<Self> = CommandTable::new();

        // Handshake
        commands.insert("PASS", Self::on_pass);
        commands.insert("CAPAB", Self::on_capab);
        commands.insert("SERVER", Self::on_server);
        commands.insert("SVINFO", Self::on_svinfo);
        commands.insert("ERROR", Self::on_error);

        // Keepalive
        commands.insert("PING", Self::on_ping);
        commands.insert("PONG", Self::on_passthrough);

        // Topology
        commands.insert("SID", Self::on_sid);
        commands.insert("SQUIT", Self::on_squit);

        // Users
        commands.insert("UID", Self::on_uid);
        commands.insert("EUID", Self::on_euid);
        commands.insert("NICK", Self::on_nick);
        commands.insert("QUIT", Self::on_quit);
        commands.insert("KILL", Self::on_kill);
        commands.insert("AWAY", Self::on_away);
        commands.insert("ENCAP", Self::on_encap);

        // Channels
        commands.insert("SJOIN", Self::on_sjoin);
        commands.insert("JOIN", Self::on_join);
        commands.insert("PART", Self::on_part);
        commands.insert("KICK", Self::on_kick);
        commands.insert("TMODE", Self::on_tmode);
        commands.insert("MODE", Self::on_mode);
        commands.insert("BMASK", Self::on_bmask);
        commands.insert("TOPIC", Self::on_topic);
        commands.insert("TB", Self::on_tb);

        // Messages only feed events.
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

    // ------------------------------------------------------------------
    // Handshake
    // ------------------------------------------------------------------

    /// `PASS <password> TS 6 :<sid>`
    fn on_pass(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if msg.params.len() < 4 {
            return Err(UplinkError::Handshake("PASS without a SID".into()));
        }
        s.check_password(&msg.params[0])?;
        if msg.params[2] != "6" {
            return Err(UplinkError::Handshake(format!(
                "unsupported TS version {}",
                msg.params[2]
            )));
        }
        s.set_peer_sid(&msg.params[3]);
        Ok(())
    }

    fn on_capab(&self, _s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        debug!(capab = ?msg.last_param(), "Uplink capabilities");
        Ok(())
    }

    /// `SERVER <name> <hops> :<description>`
    fn on_server(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 3) {
            return Ok(());
        }
        let (name, description) = (&msg.params[0], &msg.params[2]);
        let hops = msg.params[1].parse().unwrap_or(1);

        // Pre-SID servers introduced behind the uplink.
        if let Some(uplink) = s.uplink_key() {
            let behind = msg
                .origin
                .as_deref()
                .and_then(|o| s.network.server_key(o))
                .unwrap_or_else(|| uplink.to_string());
            let server = Server::new(name, description, hops).behind(behind);
            s.network.add_server(&mut s.events, server);
            return Ok(());
        }

        s.check_uplink_name(name)?;
        let Some(sid) = s.peer_sid().map(str::to_string) else {
            return Err(UplinkError::Handshake("SERVER before PASS".into()));
        };
        s.accept_uplink(Server::new(name, description, 1).with_sid(sid));
        s.begin_burst();
        Ok(())
    }

    /// `SVINFO <ts version> <min ts version> 0 :<current time>`
    fn on_svinfo(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 4) {
            return Ok(());
        }
        s.check_clock(parse_ts(&msg.params[3]))
    }

    fn on_error(&self, _s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        Err(UplinkError::Remote(
            msg.last_param().unwrap_or_default().to_string(),
        ))
    }

    fn on_ping(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let token = msg.param(0).unwrap_or_default().to_string();
        self.pong(s, &token);
        if s.is_bursting() {
            s.end_burst();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Topology
    // ------------------------------------------------------------------

    /// `:<uplink sid> SID <name> <hops> <sid> :<description>`
    fn on_sid(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 4) {
            return Ok(());
        }
        let Some(behind) = origin(msg) else {
            return Ok(());
        };
        let hops = msg.params[1].parse().unwrap_or(1);
        let server = Server::new(&msg.params[0], &msg.params[3], hops)
            .with_sid(&msg.params[2])
            .behind(behind);
        s.network.add_server(&mut s.events, server);
        Ok(())
    }

    /// `SQUIT <server> :<reason>`
    fn on_squit(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 1) {
            return Ok(());
        }
        let target = &msg.params[0];
        let reason = msg.param(1).unwrap_or_default();
        if Some(target.as_str()) == s.identity().sid.as_deref()
            || target.eq_ignore_ascii_case(&s.identity().name)
        {
            return Err(UplinkError::Squit(reason.to_string()));
        }
        s.network.remove_server(&mut s.events, target, reason);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    fn introduce(
        &self,
        s: &mut Session,
        msg: &Message,
        realname: &str,
        account: Option<&str>,
    ) -> Result<(), UplinkError> {
        let Some(server) = origin(msg) else {
            return Ok(());
        };
        let p = &msg.params;
        let user = User::new(&p[0], &p[4], &p[5], realname, server, parse_ts(&p[2]))
            .with_ip(&p[6])
            .with_uid(&p[7]);
        let Some(key) = s.network.add_user(&mut s.events, user) else {
            return Ok(());
        };
        s.network
            .apply_user_modes(&mut s.events, &key, &p[3], &[] as &[&str]);
        if let Some(account) = account.filter(|a| *a != "*") {
            s.network
                .set_account(&mut s.events, &key, Some(account.to_string()));
        }
        Ok(())
    }

    /// `:<sid> UID <nick> <hops> <ts> <umodes> <user> <host> <ip> <uid> :<gecos>`
    fn on_uid(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 9) {
            return Ok(());
        }
        self.introduce(s, msg, &msg.params[8], None)
    }

    /// `:<sid> EUID <nick> <hops> <ts> <umodes> <user> <host> <ip> <uid>
    /// <realhost> <account> :<gecos>`
    fn on_euid(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 11) {
            return Ok(());
        }
        self.introduce(s, msg, &msg.params[10], Some(&msg.params[9]))
    }

    /// `:<uid> NICK <newnick> :<ts>`
    fn on_nick(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let (Some(uid), true) = (origin(msg), arity(msg, 1)) else {
            return Ok(());
        };
        let ts = msg.param(1).map(parse_ts);
        s.network
            .rename_user(&mut s.events, uid, &msg.params[0], ts);
        Ok(())
    }

    fn on_quit(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let Some(uid) = origin(msg) else {
            return Ok(());
        };
        let reason = msg.param(0).unwrap_or_default();
        s.network.remove_user(&mut s.events, uid, reason);
        Ok(())
    }

    /// `:<killer> KILL <uid> :<path> (<reason>)`
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
        let Some(uid) = origin(msg) else {
            return Ok(());
        };
        let away = msg.param(0).filter(|m| !m.is_empty()).map(str::to_string);
        s.network.set_away(uid, away);
        Ok(())
    }

    /// `:<src> ENCAP <target> <subcommand> [params]`: only account changes
    /// matter to us.
    fn on_encap(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        match msg.params[1].to_ascii_uppercase().as_str() {
            // :<uid> ENCAP * LOGIN <account>
            "LOGIN" => {
                if let (Some(uid), Some(account)) = (origin(msg), msg.param(2)) {
                    s.network
                        .set_account(&mut s.events, uid, Some(account.to_string()));
                }
            }
            // :<sid> ENCAP * SU <uid> [<account>]
            "SU" => {
                if let Some(uid) = msg.param(2) {
                    let account = msg.param(3).filter(|a| !a.is_empty()).map(str::to_string);
                    s.network.set_account(&mut s.events, uid, account);
                }
            }
            other => debug!(subcommand = %other, "Ignoring ENCAP"),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// `:<sid> SJOIN <ts> <channel> <modes> [params] :<[@+]uid ...>`
    fn on_sjoin(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 4) {
            return Ok(());
        }
        let p = &msg.params;
        let ts = parse_ts(&p[0]);
        let channel = &p[1];
        let modes = MODES.parse_channel(&p[2], &p[3..p.len() - 1]);

        let members: Vec<BurstMember> = p[p.len() - 1]
            .split_whitespace()
            .map(|entry| {
                let uid_at = entry
                    .find(|c: char| MODES.status_for_prefix(c).is_none())
                    .unwrap_or(entry.len());
                let (prefixes, uid) = entry.split_at(uid_at);
                BurstMember::new(uid, MODES.statuses_from_prefixes(prefixes))
            })
            .filter(|m| !m.user.is_empty())
            .collect();

        s.network
            .burst_channel(&mut s.events, channel, ts, &modes, &members);
        Ok(())
    }

    /// `:<uid> JOIN <ts> <channel> +`, or `:<uid> JOIN 0` to leave everything.
    fn on_join(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let (Some(uid), true) = (origin(msg), arity(msg, 1)) else {
            return Ok(());
        };
        if msg.params[0] == "0" {
            s.network.part_all(&mut s.events, uid);
            return Ok(());
        }
        if !arity(msg, 2) {
            return Ok(());
        }
        let member = BurstMember::new(uid, Vec::new());
        s.network.burst_channel(
            &mut s.events,
            &msg.params[1],
            parse_ts(&msg.params[0]),
            &[],
            &[member],
        );
        Ok(())
    }

    fn on_part(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let (Some(uid), true) = (origin(msg), arity(msg, 1)) else {
            return Ok(());
        };
        for channel in msg.params[0].split(',') {
            s.network.remove_member(&mut s.events, channel, uid);
        }
        Ok(())
    }

    /// `:<src> KICK <channel> <uid> :<reason>`
    fn on_kick(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        s.network
            .remove_member(&mut s.events, &msg.params[0], &msg.params[1]);
        Ok(())
    }

    /// `:<src> TMODE <ts> <channel> <modes> [params]`
    fn on_tmode(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 3) {
            return Ok(());
        }
        let changes = MODES.parse_channel(&msg.params[2], &msg.params[3..]);
        s.network.ts_mode(
            &mut s.events,
            &msg.params[1],
            parse_ts(&msg.params[0]),
            &changes,
        );
        Ok(())
    }

    /// `:<uid> MODE <uid> :<umodes>` or an untimestamped channel MODE.
    fn on_mode(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        let target = &msg.params[0];
        if target.starts_with(['#', '&']) {
            s.network
                .apply_modes(&mut s.events, target, &msg.params[1], &msg.params[2..]);
        } else {
            s.network
                .apply_user_modes(&mut s.events, target, &msg.params[1], &msg.params[2..]);
        }
        Ok(())
    }

    /// `:<sid> BMASK <ts> <channel> <type> :<mask> ...`
    fn on_bmask(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 4) {
            return Ok(());
        }
        let Some(mode) = msg.params[2]
            .chars()
            .next()
            .and_then(|c| MODES.channel_def(c))
            .map(|d| d.mode)
        else {
            warn!(kind = %msg.params[2], "BMASK for unknown list");
            return Ok(());
        };
        let changes: Vec<ModeChange> = msg.params[3]
            .split_whitespace()
            .map(|mask| ModeChange::add(mode, Some(mask.to_string())))
            .collect();
        s.network.ts_mode(
            &mut s.events,
            &msg.params[1],
            parse_ts(&msg.params[0]),
            &changes,
        );
        Ok(())
    }

    /// `:<uid> TOPIC <channel> :<topic>`
    fn on_topic(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let (Some(src), true) = (origin(msg), arity(msg, 2)) else {
            return Ok(());
        };
        let setter = s
            .network
            .user(src)
            .map_or_else(|| src.to_string(), |u| u.nick.clone());
        let now = s.now_ts();
        s.network
            .set_topic(&mut s.events, &msg.params[0], &msg.params[1], &setter, now);
        Ok(())
    }

    /// `:<sid> TB <channel> <topic ts> [setter] :<topic>`
    fn on_tb(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 3) {
            return Ok(());
        }
        let p = &msg.params;
        let setter = if p.len() > 3 {
            p[2].clone()
        } else {
            msg.origin.clone().unwrap_or_default()
        };
        s.network.set_topic(
            &mut s.events,
            &p[0],
            &p[p.len() - 1],
            &setter,
            parse_ts(&p[1]),
        );
        Ok(())
    }
}

impl Dialect for Ts6 {
    fn name(&self) -> &'static str {
        "ts6"
    }

    fn mode_table(&self) -> &'static ModeTable {
        &MODES
    }

    fn uid_format(&self) -> UidFormat {
        UidFormat::Ts6
    }

    fn service_umodes(&self) -> &'static str {
        "+ioS"
    }

    fn handshake(&self, s: &mut Session) {
        let sid = s.local_ref();
        let now = s.now_ts().to_string();
        let password = s.link().send_password.clone();
        let (name, description) = (s.identity().name.clone(), s.identity().description.clone());

        s.send(Message::new("PASS", [password, "TS".into(), "6".into(), sid]).with_trailing());
        s.send(Message::new("CAPAB", [CAPABILITIES]).with_trailing());
        s.send(Message::new("SERVER", [name, "1".into(), description]).with_trailing());
        s.send(Message::new("SVINFO", ["6", "6", "0", now.as_str()]).with_trailing());
    }

    fn decode(&self, s: &mut Session, msg: Message) -> Result<(), UplinkError> {
        dispatch(self, &self.commands, s, msg)
    }

    fn burst_complete(&self, _s: &mut Session) {
        // The PONG to the PING that ended the burst is all TS6 needs.
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
            umode_string(&MODES, user.modes.iter().copied()),
            user.username.clone(),
            user.hostname.clone(),
            user.ip.clone(),
            user.uid.clone().unwrap_or_default(),
            user.realname.clone(),
        ];
        let msg = self.from_server(s, "UID", params).with_trailing();
        s.send(msg);
    }

    fn join(&self, s: &mut Session, user: &str, channel: &str, ts: i64, op: bool) {
        let ts = ts.to_string();
        if op {
            let msg = self.from_server(
                s,
                "SJOIN",
                vec![ts, channel.into(), "+".into(), format!("@{user}")],
            );
            s.send(msg.with_trailing());
        } else {
            s.send(
                Message::new("JOIN", [ts.as_str(), channel, "+"]).with_origin(user),
            );
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
        let msg = match from {
            Some(user) => Message::new("OPERWALL", [text]).with_origin(user),
            None => self.from_server(s, "WALLOPS", vec![text.to_string()]),
        };
        s.send(msg.with_trailing());
    }

    fn channel_mode(
        &self,
        s: &mut Session,
        channel: &str,
        ts: i64,
        modes: &str,
        params: &[String],
    ) {
        let mut out = vec![ts.to_string(), channel.to_string(), modes.to_string()];
        out.extend(params.iter().cloned());
        let msg = self.from_server(s, "TMODE", out);
        s.send(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::sync::link::LinkState;
    use crate::sync::session::tests::{event_names, feed, sent, session_for, FIXTURE_TS};

    const BURST: &[&str] = &[
        "PASS linkage TS 6 :0AA",
        "CAPAB :QS EX IE KLN UNKLN ENCAP TB SERVICES EUID",
        "SERVER hub.malkier.net 1 :Hub",
        "SVINFO 6 6 0 :1307151136",
        ":0AA UID rakaur 1 1307151136 +io rakaur malkier.net 69.162.167.45 0AAAAAAAA :Eric Will",
        ":0AA SJOIN 1307151136 #malkier +nt :@0AAAAAAAA",
        "PING :hub.malkier.net",
    ];

    fn greeted() -> Session {
        let mut session = session_for(Protocol::Ts6, Some("0SV"));
        session.set_state(LinkState::Connecting);
        session.greet();
        session
    }

    #[test]
    fn handshake_lines() {
        let mut session = greeted();
        assert_eq!(
            sent(&mut session),
            vec![
                "PASS linkage TS 6 :0SV",
                "CAPAB :QS EX IE KLN UNKLN ENCAP TB SERVICES EUID RSFNC",
                "SERVER services.malkier.net 1 :Services",
                "SVINFO 6 6 0 :1307151136",
            ]
        );
    }

    #[test]
    fn burst_builds_the_model() {
        let mut session = greeted();
        sent(&mut session);
        feed(&mut session, BURST);

        let net = &session.network;
        assert_eq!(net.server_count(), 1);
        assert_eq!(net.user_count(), 1);
        assert_eq!(net.channel_count(), 1);

        let user = net.user("0AAAAAAAA").unwrap();
        assert_eq!(user.nick, "rakaur");
        assert_eq!(user.hostname, "malkier.net");
        assert_eq!(user.ip, "69.162.167.45");
        assert_eq!(user.ts, FIXTURE_TS);
        assert!(user.is_operator());

        let chan = net.channel("#malkier").unwrap();
        assert_eq!(chan.ts, FIXTURE_TS);
        assert!(chan.has_mode(ChannelMode::NoExternal));
        assert!(chan.has_mode(ChannelMode::TopicLock));
        assert!(net.has_status("#malkier", "0AAAAAAAA", ChannelMode::Operator));

        assert_eq!(session.state(), LinkState::Synced);
        assert_eq!(
            sent(&mut session),
            vec![":0SV PONG services.malkier.net :hub.malkier.net"]
        );
    }

    #[test]
    fn burst_events_in_order() {
        let mut session = greeted();
        feed(&mut session, BURST);
        let names = event_names(&mut session);

        let pos = |name: &str| names.iter().position(|n| n == name).unwrap();
        assert!(pos("server_added") < pos("start_of_burst"));
        assert!(pos("start_of_burst") < pos("user_added"));
        assert!(pos("user_added") < pos("channel_added"));
        assert!(pos("channel_added") < pos("end_of_burst"));
        assert!(names.contains(&"irc_sjoin".to_string()));
        assert_eq!(names.last().map(String::as_str), Some("irc_ping"));
    }

    #[test]
    fn bad_password_touches_nothing() {
        let mut session = greeted();
        let err = session.receive("PASS wrong TS 6 :0AA").unwrap_err();
        assert!(matches!(err, UplinkError::BadPassword));
        assert_eq!(session.network.server_count(), 0);
        assert_eq!(session.network.user_count(), 0);
        assert_eq!(session.network.channel_count(), 0);
    }

    #[test]
    fn wrong_uplink_name_is_fatal() {
        let mut session = greeted();
        feed(&mut session, &["PASS linkage TS 6 :0AA"]);
        let err = session.receive("SERVER leaf.malkier.net 1 :Leaf").unwrap_err();
        assert!(matches!(err, UplinkError::ServerNameMismatch { .. }));
        assert_eq!(session.network.server_count(), 0);
    }

    #[test]
    fn clock_skew_is_fatal() {
        let mut session = greeted();
        let err = session.receive("SVINFO 6 6 0 :1307150000").unwrap_err();
        assert!(matches!(err, UplinkError::ClockSkew(1136)));
    }

    #[test]
    fn sid_uid_and_squit() {
        let mut session = greeted();
        feed(&mut session, &BURST[..4]);
        feed(
            &mut session,
            &[
                ":0AA SID leaf.malkier.net 2 0LF :Leaf",
                ":0LF EUID xiphias 1 1307151200 +i x h.net 10.0.0.1 0LFAAAAAA h.net xiph :X",
                ":0AA SQUIT 0LF :split",
            ],
        );
        assert!(session.network.server("0LF").is_none());
        assert!(session.network.user("0LFAAAAAA").is_none());
    }

    #[test]
    fn pre_sid_server_named_by_its_parent() {
        let mut session = greeted();
        feed(&mut session, &BURST[..4]);
        feed(
            &mut session,
            &[
                ":0AA SID leaf.malkier.net 2 0LF :Leaf",
                ":leaf.malkier.net SERVER old.malkier.net 3 :Old",
            ],
        );
        assert_eq!(
            session
                .network
                .server("old.malkier.net")
                .and_then(|s| s.uplink.clone()),
            Some("0LF".into())
        );
        feed(&mut session, &[":0AA SQUIT 0LF :split"]);
        assert!(session.network.server_key("old.malkier.net").is_none());
    }

    #[test]
    fn euid_carries_account() {
        let mut session = greeted();
        feed(&mut session, &BURST[..4]);
        feed(
            &mut session,
            &[
                ":0AA EUID rakaur 1 1307151136 +i rakaur malkier.net 1.2.3.4 0AAAAAAAA malkier.net rakaur :Eric",
                ":0AA EUID nobody 1 1307151136 +i n h 1.2.3.5 0AAAAAAAB h * :N",
            ],
        );
        assert_eq!(
            session.network.user("0AAAAAAAA").and_then(|u| u.account.clone()),
            Some("rakaur".into())
        );
        assert_eq!(
            session.network.user("0AAAAAAAB").and_then(|u| u.account.clone()),
            None
        );
        feed(&mut session, &[":0AA ENCAP * SU 0AAAAAAAB :nobody"]);
        assert_eq!(
            session.network.user("nobody").and_then(|u| u.account.clone()),
            Some("nobody".into())
        );
    }

    #[test]
    fn squit_of_us_is_fatal() {
        let mut session = greeted();
        feed(&mut session, &BURST[..4]);
        let err = session.receive(":0AA SQUIT 0SV :bye").unwrap_err();
        assert!(matches!(err, UplinkError::Squit(_)));
    }

    #[test]
    fn nick_join_part_kick_quit() {
        let mut session = greeted();
        feed(&mut session, BURST);
        feed(
            &mut session,
            &[
                ":0AA UID sycobuny 1 1307151140 +i s h 1.1.1.1 0AAAAAAAB :S",
                ":0AAAAAAAB JOIN 1307151136 #malkier +",
                ":0AAAAAAAA NICK rak :1307151300",
                ":0AAAAAAAA KICK #malkier 0AAAAAAAB :out",
                ":0AAAAAAAB JOIN 1307151136 #other +",
                ":0AAAAAAAB PART #other",
            ],
        );
        let net = &session.network;
        assert_eq!(net.user_by_nick("rak").map(|u| u.ts), Some(1307151300));
        assert!(!net.is_member("#malkier", "0AAAAAAAB"));
        assert!(net.channel("#other").is_none());

        feed(&mut session, &[":0AAAAAAAA QUIT :bye"]);
        assert!(session.network.channel("#malkier").is_none());
    }

    #[test]
    fn join_zero_leaves_everything() {
        let mut session = greeted();
        feed(&mut session, BURST);
        feed(
            &mut session,
            &[
                ":0AAAAAAAA JOIN 1307151136 #other +",
                ":0AAAAAAAA JOIN 0",
            ],
        );
        assert_eq!(session.network.channel_count(), 0);
    }

    #[test]
    fn tmode_bmask_and_user_mode() {
        let mut session = greeted();
        feed(&mut session, BURST);
        feed(
            &mut session,
            &[
                ":0AA TMODE 1307151136 #malkier +ikl sekrit 10",
                ":0AA TMODE 1307151999 #malkier +m",
                ":0AA BMASK 1307151136 #malkier b :*!*@a *!*@b",
                ":0AAAAAAAA MODE 0AAAAAAAA :-o",
            ],
        );
        let chan = session.network.channel("#malkier").unwrap();
        assert!(chan.has_mode(ChannelMode::InviteOnly));
        assert_eq!(chan.key(), Some("sekrit"));
        assert_eq!(chan.param(ChannelMode::Limit), Some("10"));
        assert!(!chan.has_mode(ChannelMode::Moderated));
        assert_eq!(chan.list(ChannelMode::Ban).count(), 2);
        assert!(!session.network.user("rakaur").unwrap().is_operator());
    }

    #[test]
    fn lower_ts_sjoin_resets() {
        let mut session = greeted();
        feed(&mut session, BURST);
        feed(
            &mut session,
            &[
                ":0AA UID sycobuny 1 1307151140 +i s h 1.1.1.1 0AAAAAAAB :S",
                ":0AA SJOIN 1307150000 #malkier +s :@0AAAAAAAB",
            ],
        );
        let net = &session.network;
        let chan = net.channel("#malkier").unwrap();
        assert_eq!(chan.ts, 1307150000);
        assert!(chan.has_mode(ChannelMode::Secret));
        assert!(!chan.has_mode(ChannelMode::NoExternal));
        assert!(!net.has_status("#malkier", "0AAAAAAAA", ChannelMode::Operator));
        assert!(net.has_status("#malkier", "0AAAAAAAB", ChannelMode::Operator));
    }

    #[test]
    fn topics() {
        let mut session = greeted();
        feed(&mut session, BURST);
        feed(&mut session, &[":0AA TB #malkier 1307150000 rakaur :Welcome"]);
        let topic = session.network.channel("#malkier").unwrap().topic.clone().unwrap();
        assert_eq!((topic.text.as_str(), topic.set_by.as_str()), ("Welcome", "rakaur"));

        feed(&mut session, &[":0AAAAAAAA TOPIC #malkier :New"]);
        let topic = session.network.channel("#malkier").unwrap().topic.clone().unwrap();
        assert_eq!(topic.text, "New");
    }

    #[test]
    fn error_line_is_fatal() {
        let mut session = greeted();
        let err = session.receive("ERROR :Closing Link").unwrap_err();
        assert!(matches!(err, UplinkError::Remote(ref r) if r == "Closing Link"));
    }
}
