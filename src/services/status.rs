//! The `status` pseudo-user.
//!
//! Introduced at the start of every burst, it joins its channel once the
//! burst is over, takes op there if the channel predates it, reports how
//! long the burst took and answers `STATUS` and `VERSION` by private
//! message.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::traits::Service;
use crate::config::StatusConfig;
use crate::event::{Dispatcher, Event};
use crate::state::{ChannelMode, ModeChange};
use crate::sync::{PseudoClient, Session};
use crate::timer::{TimerAction, TimerId};

/// Name carried by the periodic report timer's event.
const REPORT_TIMER: &str = "status_report";

/// `2d 3h 4m 5s`, dropping leading zero units.
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (d, h, m, s) = (secs / 86_400, secs / 3_600 % 24, secs / 60 % 60, secs % 60);
    match (d, h, m) {
        (0, 0, 0) => format!("{s}s"),
        (0, 0, _) => format!("{m}m {s}s"),
        (0, _, _) => format!("{h}h {m}m {s}s"),
        _ => format!("{d}d {h}h {m}m {s}s"),
    }
}

/// `3 servers, 10 users, 4 channels`
fn counts(s: &Session) -> String {
    format!(
        "{} servers, {} users, {} channels",
        s.network.server_count(),
        s.network.user_count(),
        s.network.channel_count(),
    )
}

pub struct StatusService {
    config: StatusConfig,
    started: Instant,
    /// Key of our pseudo-user while it exists.
    key: RefCell<Option<String>>,
    /// The report timer, armed once and kept across reconnects.
    report: Cell<Option<TimerId>>,
}

impl StatusService {
    pub fn new(config: StatusConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            key: RefCell::new(None),
            report: Cell::new(None),
        }
    }

    fn client(&self) -> PseudoClient {
        PseudoClient {
            nick: self.config.nick.clone(),
            user: self.config.user.clone(),
            host: self.config.host.clone(),
            realname: self.config.realname.clone(),
        }
    }

    fn current_key(&self) -> Option<String> {
        self.key.borrow().clone()
    }

    fn introduce(&self, s: &mut Session) {
        match s.introduce_user(&self.client()) {
            Ok(key) => {
                debug!(nick = %self.config.nick, %key, "Status client introduced");
                *self.key.borrow_mut() = Some(key);
            }
            Err(e) => warn!(nick = %self.config.nick, error = %e, "Cannot introduce status client"),
        }
    }

    fn join_channel(&self, s: &mut Session) {
        let Some(key) = self.current_key() else {
            return;
        };
        let channel = self.config.channel.as_str();
        let existed = s.network.channel(channel).is_some();
        if let Err(e) = s.join(&key, channel) {
            warn!(%channel, error = %e, "Status client cannot join");
            return;
        }
        if existed && !s.network.has_status(channel, &key, ChannelMode::Operator) {
            let op = ModeChange::add(ChannelMode::Operator, Some(key));
            if let Err(e) = s.send_channel_mode(channel, vec![op]) {
                warn!(%channel, error = %e, "Status client cannot op itself");
            }
        }
    }

    fn on_start_of_burst(&self, s: &mut Session) {
        self.introduce(s);
    }

    fn on_end_of_burst(&self, s: &mut Session, elapsed: Duration) {
        self.join_channel(s);
        self.arm_report(s);
        let text = format!(
            "Synced with {} in {}ms: {}",
            s.link().uplink_name,
            elapsed.as_millis(),
            counts(s),
        );
        self.say(s, &text);
    }

    fn arm_report(&self, s: &mut Session) {
        if self.config.report_interval_secs == 0 || self.report.get().is_some() {
            return;
        }
        let interval = Duration::from_secs(self.config.report_interval_secs);
        let action = TimerAction::Post(Event::TimerFired {
            name: REPORT_TIMER.to_string(),
        });
        let id = s.timers.every_persistent(Instant::now(), interval, action);
        debug!(secs = interval.as_secs(), "Status report timer armed");
        self.report.set(Some(id));
    }

    fn on_timer(&self, s: &mut Session, name: &str) {
        if name != REPORT_TIMER || s.is_bursting() {
            return;
        }
        let text = format!("Network: {}", counts(s));
        self.say(s, &text);
    }

    /// Message the status channel, if our client is around.
    fn say(&self, s: &mut Session, text: &str) {
        let Some(key) = self.current_key() else {
            return;
        };
        if let Err(e) = s.privmsg(&key, &self.config.channel, text) {
            debug!(error = %e, "Status message not sent");
        }
    }

    fn on_user_deleted(&self, s: &mut Session, key: &str) {
        if self.current_key().as_deref() != Some(key) {
            return;
        }
        info!(nick = %self.config.nick, "Status client removed; reintroducing");
        *self.key.borrow_mut() = None;
        if s.state().is_connected() {
            self.introduce(s);
            if !s.is_bursting() {
                self.join_channel(s);
            }
        }
    }

    fn on_exit(&self, s: &mut Session, reason: &str) {
        let Some(key) = self.key.borrow_mut().take() else {
            return;
        };
        if let Err(e) = s.quit(&key, reason) {
            debug!(error = %e, "Status client quit not sent");
        }
    }

    fn replies(&self, s: &Session, command: &str) -> Vec<String> {
        match command.to_ascii_uppercase().as_str() {
            "STATUS" => vec![
                format!("Link to {} is {}", s.link().uplink_name, s.state()),
                counts(s),
                format!("Up {}", format_uptime(self.started.elapsed())),
            ],
            "VERSION" => vec![format!(
                "{} {}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            )],
            "" => Vec::new(),
            other => vec![format!("Unknown command {other}. Try STATUS or VERSION.")],
        }
    }

    fn on_privmsg(&self, s: &mut Session, origin: Option<&str>, params: &[String]) {
        let Some(me) = self.current_key() else {
            return;
        };
        let (Some(target), Some(text)) = (params.first(), params.get(1)) else {
            return;
        };
        if s.network.resolve_user(target).as_deref() != Some(me.as_str()) {
            return;
        }
        let Some(sender) = origin.and_then(|o| s.network.resolve_user(o)) else {
            return;
        };
        let command = text.split_whitespace().next().unwrap_or_default();
        for line in self.replies(s, command) {
            if let Err(e) = s.notice(&me, &sender, &line) {
                debug!(error = %e, "Status reply not sent");
                break;
            }
        }
    }
}

impl Service for StatusService {
    fn name(&self) -> &'static str {
        "status"
    }

    fn register(self: Rc<Self>, dispatcher: &mut Dispatcher<Session>) {
        let this = Rc::clone(&self);
        dispatcher.handle_persistent("start_of_burst", move |s, _| this.on_start_of_burst(s));

        let this = Rc::clone(&self);
        dispatcher.handle_persistent("end_of_burst", move |s, ev| {
            if let Event::EndOfBurst { elapsed } = ev {
                this.on_end_of_burst(s, *elapsed);
            }
        });

        let this = Rc::clone(&self);
        dispatcher.handle_persistent("user_deleted", move |s, ev| {
            if let Event::UserDeleted { key, .. } = ev {
                this.on_user_deleted(s, key);
            }
        });

        let this = Rc::clone(&self);
        dispatcher.handle_persistent("irc_privmsg", move |s, ev| {
            if let Event::Command(cmd) = ev {
                this.on_privmsg(s, cmd.origin.as_deref(), &cmd.params);
            }
        });

        let this = Rc::clone(&self);
        dispatcher.handle_persistent("timer_fired", move |s, ev| {
            if let Event::TimerFired { name } = ev {
                this.on_timer(s, name);
            }
        });

        let this = Rc::clone(&self);
        dispatcher.handle_persistent("exit", move |s, ev| {
            if let Event::Exit { reason } = ev {
                this.on_exit(s, reason);
            }
        });

        let this = self;
        dispatcher.handle_persistent("disconnected", move |_, _| {
            this.key.borrow_mut().take();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use crate::sync::LinkState;
    use crate::sync::session::tests::{feed, sent, session_for};

    const LINK: &[&str] = &[
        "PASS linkage TS 6 :0AA",
        "SERVER hub.malkier.net 1 :Hub",
        "SVINFO 6 6 0 :1307151136",
        ":0AA UID rakaur 1 1307151136 +io rakaur malkier.net 69.162.167.45 0AAAAAAAA :Eric Will",
        ":0AA SJOIN 1307151136 #malkier +nt :@0AAAAAAAA",
        "PING :hub.malkier.net",
    ];

    fn burst(session: &mut Session, dispatcher: &mut Dispatcher<Session>) {
        session.set_state(LinkState::Connecting);
        session.greet();
        sent(session);
        for line in LINK {
            feed(session, &[*line]);
            dispatcher.drain(session);
        }
    }

    fn linked_with(config: StatusConfig) -> (Session, Dispatcher<Session>, Rc<StatusService>) {
        let mut session = session_for(Protocol::Ts6, Some("0SV"));
        let mut dispatcher = Dispatcher::new();
        let service = Rc::new(StatusService::new(config));
        Rc::clone(&service).register(&mut dispatcher);
        burst(&mut session, &mut dispatcher);
        (session, dispatcher, service)
    }

    fn linked() -> (Session, Dispatcher<Session>) {
        let (session, dispatcher, _) = linked_with(StatusConfig {
            channel: "#malkier".into(),
            ..StatusConfig::default()
        });
        (session, dispatcher)
    }

    #[test]
    fn uptime_formats() {
        assert_eq!(format_uptime(Duration::from_secs(5)), "5s");
        assert_eq!(format_uptime(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_uptime(Duration::from_secs(3_600)), "1h 0m 0s");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 1h 1m 1s");
    }

    #[test]
    fn introduces_joins_and_reports() {
        let (mut session, _) = linked();
        assert_eq!(session.state(), LinkState::Synced);

        let key = session.network.resolve_user("Status").unwrap();
        assert!(session.network.is_local_user(&key));
        assert!(session.network.is_member("#malkier", &key));

        let lines = sent(&mut session);
        assert!(lines[0].starts_with(":0SV UID Status 1 "));
        assert!(lines.iter().any(|l| l == ":0SVAAAAAA JOIN 1307151136 #malkier +"));
        assert!(
            lines
                .iter()
                .any(|l| l.starts_with(":0SVAAAAAA PRIVMSG #malkier :Synced with hub.malkier.net"))
        );

        // Op goes through the stacker.
        session.run_timers(Instant::now() + Duration::from_secs(1));
        assert!(session.network.has_status("#malkier", &key, ChannelMode::Operator));
        assert_eq!(
            sent(&mut session),
            vec![":0SV TMODE 1307151136 #malkier +o 0SVAAAAAA"]
        );
    }

    #[test]
    fn periodic_report_survives_reconnect() {
        let (mut session, mut dispatcher, service) = linked_with(StatusConfig {
            channel: "#malkier".into(),
            report_interval_secs: 60,
            ..StatusConfig::default()
        });
        let armed = service.report.get();
        assert!(armed.is_some());
        sent(&mut session);

        session.run_timers(Instant::now() + Duration::from_secs(61));
        dispatcher.drain(&mut session);
        assert!(
            sent(&mut session)
                .iter()
                .any(|l| l == ":0SVAAAAAA PRIVMSG #malkier :Network: 1 servers, 2 users, 1 channels")
        );

        session.teardown("gone");
        dispatcher.drain(&mut session);
        assert_eq!(session.timers.len(), 1);

        burst(&mut session, &mut dispatcher);
        assert_eq!(session.state(), LinkState::Synced);
        assert_eq!(service.report.get(), armed);
    }

    #[test]
    fn no_report_timer_by_default() {
        let (session, _, service) = linked_with(StatusConfig::default());
        assert_eq!(service.report.get(), None);
        assert!(session.timers.is_empty());
    }

    #[test]
    fn answers_status_and_version() {
        let (mut session, mut dispatcher) = linked();
        sent(&mut session);

        feed(&mut session, &[":0AAAAAAAA PRIVMSG 0SVAAAAAA :version"]);
        dispatcher.drain(&mut session);
        let lines = sent(&mut session);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(":0SVAAAAAA NOTICE 0AAAAAAAA :slsvcd "));

        feed(&mut session, &[":0AAAAAAAA PRIVMSG 0SVAAAAAA :STATUS"]);
        dispatcher.drain(&mut session);
        let lines = sent(&mut session);
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            ":0SVAAAAAA NOTICE 0AAAAAAAA :Link to hub.malkier.net is synced"
        );
        assert_eq!(
            lines[1],
            ":0SVAAAAAA NOTICE 0AAAAAAAA :1 servers, 2 users, 1 channels"
        );
    }

    #[test]
    fn ignores_channel_traffic() {
        let (mut session, mut dispatcher) = linked();
        sent(&mut session);
        feed(&mut session, &[":0AAAAAAAA PRIVMSG #malkier :status"]);
        dispatcher.drain(&mut session);
        assert!(sent(&mut session).is_empty());
    }

    #[test]
    fn reintroduced_after_kill() {
        let (mut session, mut dispatcher) = linked();
        sent(&mut session);
        feed(&mut session, &[":0AAAAAAAA KILL 0SVAAAAAA :go away"]);
        dispatcher.drain(&mut session);

        let key = session.network.resolve_user("Status").unwrap();
        assert_eq!(key, "0SVAAAAAB");
        assert!(session.network.is_member("#malkier", &key));
    }

    #[test]
    fn quits_on_exit() {
        let (mut session, mut dispatcher) = linked();
        sent(&mut session);
        session.events.post(Event::Exit {
            reason: "Shutting down".into(),
        });
        dispatcher.drain(&mut session);
        assert_eq!(
            sent(&mut session),
            vec![":0SVAAAAAA QUIT :Shutting down"]
        );
        assert!(session.network.resolve_user("Status").is_none());
    }

    #[test]
    fn disconnect_forgets_the_client() {
        let (mut session, mut dispatcher) = linked();
        session.teardown("test");
        dispatcher.drain(&mut session);
        assert_eq!(session.network.user_count(), 0);
        assert_eq!(dispatcher.handler_count("start_of_burst"), 1);
        dispatcher.clear_handlers();
        assert_eq!(dispatcher.handler_count("start_of_burst"), 1);
    }
}
