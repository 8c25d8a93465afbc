//! InspIRCd spanning tree, protocol 1202.

use slsvc_proto::Message;
use tracing::{debug, warn};

use super::uid::UidFormat;
use super::{arity, dispatch, origin, parse_ts, umode_string, CommandTable, Dialect};
use crate::error::UplinkError;
use crate::state::modes::{
    cm, um, ChannelModeDef, ModeTable, UserModeDef, FLAG, KEYED, LIST, PARAM, STATUS_A, STATUS_H,
    STATUS_O, STATUS_Q, STATUS_V,
};
use crate::state::{BurstMember, ChannelMode, Server, User, UserMode};
use crate::sync::Session;

const PROTOCOL_VERSION: &str = "1202";

static CHANNEL_MODES: &[ChannelModeDef] = &[
    cm('q', ChannelMode::Owner, STATUS_Q),
    cm('a', ChannelMode::Admin, STATUS_A),
    cm('o', ChannelMode::Operator, STATUS_O),
    cm('h', ChannelMode::Halfop, STATUS_H),
    cm('v', ChannelMode::Voice, STATUS_V),
    cm('b', ChannelMode::Ban, LIST),
    cm('e', ChannelMode::Except, LIST),
    cm('I', ChannelMode::InviteExcept, LIST),
    cm('g', ChannelMode::Filter, LIST),
    cm('k', ChannelMode::Key, KEYED),
    cm('l', ChannelMode::Limit, PARAM),
    cm('f', ChannelMode::Flood, PARAM),
    cm('j', ChannelMode::JoinThrottle, PARAM),
    cm('L', ChannelMode::Redirect, PARAM),
    cm('F', ChannelMode::NickFlood, PARAM),
    cm('c', ChannelMode::NoColors, FLAG),
    cm('C', ChannelMode::NoCtcp, FLAG),
    cm('D', ChannelMode::DelayJoin, FLAG),
    cm('G', ChannelMode::Censor, FLAG),
    cm('i', ChannelMode::InviteOnly, FLAG),
    cm('K', ChannelMode::NoKnock, FLAG),
    cm('m', ChannelMode::Moderated, FLAG),
    cm('M', ChannelMode::ModRegistered, FLAG),
    cm('n', ChannelMode::NoExternal, FLAG),
    cm('N', ChannelMode::NoNickChange, FLAG),
    cm('O', ChannelMode::OperOnly, FLAG),
    cm('p', ChannelMode::Private, FLAG),
    cm('P', ChannelMode::Permanent, FLAG),
    cm('Q', ChannelMode::NoKicks, FLAG),
    cm('r', ChannelMode::Registered, FLAG),
    cm('R', ChannelMode::RegisteredOnly, FLAG),
    cm('s', ChannelMode::Secret, FLAG),
    cm('S', ChannelMode::StripColors, FLAG),
    cm('t', ChannelMode::TopicLock, FLAG),
    cm('T', ChannelMode::NoNotice, FLAG),
    cm('u', ChannelMode::Auditorium, FLAG),
    cm('z', ChannelMode::TlsOnly, FLAG),
];

static USER_MODES: &[UserModeDef] = &[
    um('i', UserMode::Invisible),
    um('w', UserMode::Wallops),
    um('o', UserMode::Operator),
    um('s', UserMode::ServerNotices),
    um('k', UserMode::Service),
    um('B', UserMode::Bot),
    um('d', UserMode::Deaf),
    um('g', UserMode::CallerId),
    um('H', UserMode::HideOper),
    um('x', UserMode::Cloaked),
    um('r', UserMode::Registered),
    um('z', UserMode::Secure),
];

/// InspIRCd mode vocabulary.
pub static MODES: ModeTable = ModeTable {
    channel: CHANNEL_MODES,
    user: USER_MODES,
};

/// The InspIRCd dialect.
pub struct InspIrcd {
    commands: CommandTable<Self>,
}

impl Default for InspIrcd {
    fn default() -> Self {
        Self::new()
    }
}

impl InspIrcd {
    pub fn new() -> Self {
        let mut commands: CommandTable<Self> = CommandTable::new();

        commands.insert("CAPAB", Self::on_capab);
        commands.insert("SERVER", Self::on_server);
        commands.insert("BURST", Self::on_burst);
        commands.insert("ENDBURST", Self::on_endburst);
        commands.insert("ERROR", Self::on_error);
        commands.insert("PING", Self::on_ping);
        commands.insert("PONG", Self::on_passthrough);
        commands.insert("SQUIT", Self::on_squit);

        commands.insert("UID", Self::on_uid);
        commands.insert("NICK", Self::on_nick);
        commands.insert("QUIT", Self::on_quit);
        commands.insert("KILL", Self::on_kill);
        commands.insert("OPERTYPE", Self::on_opertype);
        commands.insert("AWAY", Self::on_away);
        commands.insert("METADATA", Self::on_metadata);

        commands.insert("FJOIN", Self::on_fjoin);
        commands.insert("PART", Self::on_part);
        commands.insert("KICK", Self::on_kick);
        commands.insert("FMODE", Self::on_fmode);
        commands.insert("MODE", Self::on_mode);
        commands.insert("FTOPIC", Self::on_ftopic);
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

    /// `CAPAB START|CAPABILITIES|MODULES|END ...`
    fn on_capab(&self, _s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        match msg.param(0) {
            Some("START") => {
                if let Some(version) = msg.param(1).filter(|v| *v != PROTOCOL_VERSION) {
                    warn!(%version, "Uplink speaks a different protocol version");
                }
            }
            Some(sub) => debug!(%sub, "CAPAB"),
            None => {}
        }
        Ok(())
    }

    /// Handshake: `SERVER <name> <password> <hops> <sid> :<description>`
    ///
    /// Behind the uplink: `:<sid> SERVER <name> * <hops> <sid> :<description>`
    fn on_server(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 5) {
            return Ok(());
        }
        let p = &msg.params;
        let hops = p[2].parse().unwrap_or(1);

        if s.uplink_key().is_some() {
            let Some(behind) = origin(msg) else {
                return Ok(());
            };
            let server = Server::new(&p[0], &p[4], hops)
                .with_sid(&p[3])
                .behind(behind);
            s.network.add_server(&mut s.events, server);
            return Ok(());
        }

        s.check_password(&p[1])?;
        s.check_uplink_name(&p[0])?;
        s.set_peer_sid(&p[3]);
        s.accept_uplink(Server::new(&p[0], &p[4], 1).with_sid(&p[3]));

        // Our own burst opens here; it closes when theirs does.
        let now = s.now_ts().to_string();
        let burst = self.from_server(s, "BURST", vec![now]);
        s.send(burst);
        let version = self.from_server(s, "VERSION", vec![env!("CARGO_PKG_NAME").to_string()]);
        s.send(version.with_trailing());
        Ok(())
    }

    /// `:<sid> BURST <ts>`
    fn on_burst(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if let Some(ts) = msg.param(0) {
            s.check_clock(parse_ts(ts))?;
        }
        s.begin_burst();
        Ok(())
    }

    fn on_endburst(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if msg.origin.as_deref() != s.uplink_key() {
            debug!(server = ?msg.origin, "End of burst from behind the uplink");
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

    /// `:<sid> PING <sid> <our sid>`
    fn on_ping(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let Some(from) = msg.param(0).or(msg.origin.as_deref()) else {
            return Ok(());
        };
        let from = from.to_string();
        self.pong(s, &from);
        Ok(())
    }

    /// `:<sid> SQUIT <server> :<reason>`
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

    /// `:<sid> UID <uid> <ts> <nick> <host> <dhost> <ident> <ip> <signon>
    /// +<modes> [mode args] :<gecos>`
    fn on_uid(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 10) {
            return Ok(());
        }
        let Some(server) = origin(msg) else {
            return Ok(());
        };
        let p = &msg.params;
        let n = p.len();
        let user = User::new(&p[2], &p[5], &p[4], &p[n - 1], server, parse_ts(&p[1]))
            .with_ip(&p[6])
            .with_uid(&p[0]);
        if let Some(key) = s.network.add_user(&mut s.events, user) {
            s.network
                .apply_user_modes(&mut s.events, &key, &p[8], &p[9..n - 1]);
        }
        Ok(())
    }

    /// `:<uid> NICK <newnick> <ts>`
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

    /// `:<uid> OPERTYPE <type>`: the user opered up.
    fn on_opertype(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let Some(uid) = origin(msg) else {
            return Ok(());
        };
        s.network
            .apply_user_modes(&mut s.events, uid, "+o", &[] as &[&str]);
        Ok(())
    }

    fn on_away(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        let Some(uid) = origin(msg) else {
            return Ok(());
        };
        let away = msg.last_param().filter(|m| !m.is_empty()).map(str::to_string);
        s.network.set_away(uid, away);
        Ok(())
    }

    /// `:<sid> METADATA <target> <key> :<value>`
    fn on_metadata(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        let p = &msg.params;
        if p[1] == "accountname" {
            let account = p.get(2).filter(|a| !a.is_empty()).cloned();
            s.network.set_account(&mut s.events, &p[0], account);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// `:<sid> FJOIN <channel> <ts> +<modes> [args] :<modes>,<uid> ...`
    fn on_fjoin(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 4) {
            return Ok(());
        }
        let p = &msg.params;
        let n = p.len();
        let modes = MODES.parse_channel(&p[2], &p[3..n - 1]);
        let members: Vec<BurstMember> = p[n - 1]
            .split_whitespace()
            .filter_map(|entry| {
                let (letters, uid) = entry.split_once(',')?;
                let statuses = letters
                    .chars()
                    .filter_map(|c| MODES.channel_def(c))
                    .filter(|d| d.mode.is_status())
                    .map(|d| d.mode)
                    .collect();
                Some(BurstMember::new(uid, statuses))
            })
            .collect();

        s.network
            .burst_channel(&mut s.events, &p[0], parse_ts(&p[1]), &modes, &members);
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

    fn on_kick(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        s.network
            .remove_member(&mut s.events, &msg.params[0], &msg.params[1]);
        Ok(())
    }

    /// `:<src> FMODE <channel> <ts> <modes> [args]`
    fn on_fmode(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 3) {
            return Ok(());
        }
        let changes = MODES.parse_channel(&msg.params[2], &msg.params[3..]);
        s.network.ts_mode(
            &mut s.events,
            &msg.params[0],
            parse_ts(&msg.params[1]),
            &changes,
        );
        Ok(())
    }

    /// `:<src> MODE <target> <modes> [args]`
    fn on_mode(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 2) {
            return Ok(());
        }
        let target = &msg.params[0];
        if target.starts_with('#') {
            s.network
                .apply_modes(&mut s.events, target, &msg.params[1], &msg.params[2..]);
        } else {
            s.network
                .apply_user_modes(&mut s.events, target, &msg.params[1], &msg.params[2..]);
        }
        Ok(())
    }

    /// `:<sid> FTOPIC <channel> <topic ts> <setter> :<topic>`
    fn on_ftopic(&self, s: &mut Session, msg: &Message) -> Result<(), UplinkError> {
        if !arity(msg, 4) {
            return Ok(());
        }
        let p = &msg.params;
        s.network
            .set_topic(&mut s.events, &p[0], &p[3], &p[2], parse_ts(&p[1]));
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
}

impl Dialect for InspIrcd {
    fn name(&self) -> &'static str {
        "inspircd"
    }

    fn mode_table(&self) -> &'static ModeTable {
        &MODES
    }

    fn uid_format(&self) -> UidFormat {
        UidFormat::Ts6
    }

    fn service_umodes(&self) -> &'static str {
        "+ik"
    }

    fn handshake(&self, s: &mut Session) {
        let password = s.link().send_password.clone();
        let sid = s.local_ref();
        let (name, description) = (s.identity().name.clone(), s.identity().description.clone());

        s.send(Message::new("CAPAB", ["START", PROTOCOL_VERSION]));
        s.send(
            Message::new("CAPAB", ["CAPABILITIES".to_string(), format!("PROTOCOL={PROTOCOL_VERSION}")])
                .with_trailing(),
        );
        s.send(Message::new("CAPAB", ["END"]));
        s.send(Message::new("SERVER", [name, password, "0".into(), sid, description]).with_trailing());
    }

    fn decode(&self, s: &mut Session, msg: Message) -> Result<(), UplinkError> {
        dispatch(self, &self.commands, s, msg)
    }

    fn burst_complete(&self, s: &mut Session) {
        let msg = self.from_server(s, "ENDBURST", Vec::new());
        s.send(msg);
    }

    fn pong(&self, s: &mut Session, token: &str) {
        let sid = s.local_ref();
        let msg = self.from_server(s, "PONG", vec![sid, token.to_string()]);
        s.send(msg);
    }

    fn introduce_user(&self, s: &mut Session, key: &str) {
        let Some(user) = s.network.user(key) else {
            return;
        };
        let ts = user.ts.to_string();
        let params = vec![
            user.uid.clone().unwrap_or_default(),
            ts.clone(),
            user.nick.clone(),
            user.hostname.clone(),
            user.hostname.clone(),
            user.username.clone(),
            user.ip.clone(),
            ts,
            umode_string(&MODES, user.modes.iter().copied()),
            user.realname.clone(),
        ];
        let msg = self.from_server(s, "UID", params).with_trailing();
        s.send(msg);
    }

    fn join(&self, s: &mut Session, user: &str, channel: &str, ts: i64, op: bool) {
        let member = if op {
            format!("o,{user}")
        } else {
            format!(",{user}")
        };
        let msg = self.from_server(
            s,
            "FJOIN",
            vec![channel.to_string(), ts.to_string(), "+".into(), member],
        );
        s.send(msg.with_trailing());
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
            Message::new("SNONOTICE", ["A", text])
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
        let mut out = vec![channel.to_string(), ts.to_string(), modes.to_string()];
        out.extend(params.iter().cloned());
        let msg = self.from_server(s, "FMODE", out);
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
        "CAPAB START 1202",
        "CAPAB CAPABILITIES :PROTOCOL=1202 PREFIX=(qaohv)~&@%+",
        "CAPAB END",
        "SERVER hub.malkier.net linkage 0 0AA :Hub",
        ":0AA BURST 1307151136",
        ":0AA UID 0AAAAAAAA 1307151136 rakaur malkier.net malkier.net rakaur 69.162.167.45 1307151136 +i :Eric Will",
        ":0AA UID 0AAAAAAAB 1307151140 sycobuny h h syco 10.0.0.1 1307151140 +iw :Sycobuny",
        ":0AAAAAAAA OPERTYPE NetAdmin",
        ":0AA METADATA 0AAAAAAAA accountname :rakaur",
        ":0AA FJOIN #malkier 1307151136 +ntk sekrit :qo,0AAAAAAAA v,0AAAAAAAB",
        ":0AA FTOPIC #malkier 1307151000 rakaur :Welcome",
        ":0AA ENDBURST",
    ];

    fn greeted() -> Session {
        let mut session = session_for(Protocol::Inspircd, Some("0SV"));
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
                "CAPAB START 1202",
                "CAPAB CAPABILITIES :PROTOCOL=1202",
                "CAPAB END",
                "SERVER services.malkier.net linkage 0 0SV :Services",
            ]
        );
    }

    #[test]
    fn burst_builds_the_model() {
        let mut session = greeted();
        sent(&mut session);
        feed(&mut session, BURST);

        let net = &session.network;
        let rakaur = net.user("0AAAAAAAA").unwrap();
        assert_eq!(rakaur.nick, "rakaur");
        assert_eq!(rakaur.username, "rakaur");
        assert_eq!(rakaur.ts, FIXTURE_TS);
        assert!(rakaur.is_operator());
        assert_eq!(rakaur.account.as_deref(), Some("rakaur"));
        assert!(net.user("sycobuny").unwrap().has_mode(UserMode::Wallops));

        let chan = net.channel("#malkier").unwrap();
        assert_eq!(chan.key(), Some("sekrit"));
        assert_eq!(chan.topic.as_ref().map(|t| t.set_by.as_str()), Some("rakaur"));
        assert!(net.has_status("#malkier", "0AAAAAAAA", ChannelMode::Owner));
        assert!(net.has_status("#malkier", "0AAAAAAAA", ChannelMode::Operator));
        assert!(net.has_status("#malkier", "0AAAAAAAB", ChannelMode::Voice));

        assert_eq!(session.state(), LinkState::Synced);
        assert_eq!(
            sent(&mut session),
            vec![
                ":0SV BURST 1307151136",
                ":0SV VERSION :slsvcd",
                ":0SV ENDBURST",
            ]
        );
    }

    #[test]
    fn burst_starts_on_burst_not_server() {
        let mut session = greeted();
        feed(&mut session, &BURST[..4]);
        assert_eq!(session.state(), LinkState::Handshaking);
        feed(&mut session, &BURST[4..5]);
        assert_eq!(session.state(), LinkState::Bursting);
        assert!(event_names(&mut session).contains(&"start_of_burst".to_string()));
    }

    #[test]
    fn bad_password_touches_nothing() {
        let mut session = greeted();
        feed(&mut session, &BURST[..3]);
        assert!(matches!(
            session.receive("SERVER hub.malkier.net nope 0 0AA :Hub"),
            Err(UplinkError::BadPassword)
        ));
        assert_eq!(session.network.server_count(), 0);
    }

    #[test]
    fn ping_pong() {
        let mut session = greeted();
        feed(&mut session, BURST);
        sent(&mut session);
        feed(&mut session, &[":0AA PING 0AA 0SV"]);
        assert_eq!(sent(&mut session), vec![":0SV PONG 0SV 0AA"]);
    }

    #[test]
    fn fmode_respects_ts() {
        let mut session = greeted();
        feed(&mut session, BURST);
        feed(
            &mut session,
            &[
                ":0AAAAAAAA FMODE #malkier 1307151136 +m",
                ":0AAAAAAAA FMODE #malkier 1307159999 +s",
                ":0AAAAAAAA MODE 0AAAAAAAB -w",
            ],
        );
        let net = &session.network;
        assert!(net.channel_has_mode("#malkier", ChannelMode::Moderated));
        assert!(!net.channel_has_mode("#malkier", ChannelMode::Secret));
        assert!(!net.user("0AAAAAAAB").unwrap().has_mode(UserMode::Wallops));
    }

    #[test]
    fn remote_server_split() {
        let mut session = greeted();
        feed(&mut session, BURST);
        feed(
            &mut session,
            &[
                ":0AA SERVER leaf.malkier.net * 1 0LF :Leaf",
                ":0LF UID 0LFAAAAAA 1307151136 leafy h h l 10.0.0.2 1307151136 +i :Leafy",
                ":0LFAAAAAA FJOIN #malkier 1307151136 + :,0LFAAAAAA",
                ":0AA SQUIT 0LF :split",
            ],
        );
        assert!(session.network.server("leaf.malkier.net").is_none());
        assert!(session.network.user("leafy").is_none());
        assert!(!session.network.is_member("#malkier", "0LFAAAAAA"));
    }

    #[test]
    fn encoders() {
        let mut session = greeted();
        sent(&mut session);
        let dialect = session.dialect();
        dialect.join(&mut session, "0SVAAAAAA", "#malkier", FIXTURE_TS, true);
        dialect.channel_mode(&mut session, "#malkier", FIXTURE_TS, "+v", &["0AAAAAAAA".into()]);
        dialect.operwall(&mut session, None, "hello opers");
        assert_eq!(
            sent(&mut session),
            vec![
                ":0SV FJOIN #malkier 1307151136 + :o,0SVAAAAAA",
                ":0SV FMODE #malkier 1307151136 +v 0AAAAAAAA",
                ":0SV SNONOTICE A :hello opers",
            ]
        );
    }
}
