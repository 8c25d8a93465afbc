//! Per-connection context.
//!
//! A [`Session`] is built when the transport comes up and dropped when it
//! goes down. It owns the network model, the event queue, the send queue,
//! timers and the mode stacker, and is the single `&mut` handed to dialect
//! handlers and service callbacks alike.

use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use slsvc_proto::{CaseMapping, Message, ProtocolError};
use tracing::{debug, info, trace, warn};

use super::link::LinkState;
use crate::error::UplinkError;
use crate::event::{Event, EventContext, EventQueue};
use crate::protocol::{Dialect, UidGenerator};
use crate::state::{ModeBatch, ModeStacker, Network, Server};
use crate::timer::{TimerAction, Timers};

/// Warn above this much clock difference with the uplink.
pub const CLOCK_SKEW_WARN: i64 = 60;
/// Drop the link above this much.
pub const CLOCK_SKEW_FATAL: i64 = 300;

/// Who we are.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub description: String,
    /// SID or P10 numeric.
    pub sid: Option<String>,
}

impl Identity {
    /// Registry key of our server; also our wire origin on UID dialects.
    pub fn key(&self) -> String {
        match &self.sid {
            Some(sid) => sid.clone(),
            None => self.name.to_ascii_lowercase(),
        }
    }
}

/// Per-uplink link parameters.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Name the uplink must announce.
    pub uplink_name: String,
    pub send_password: String,
    pub receive_password: String,
    pub max_modes: usize,
}

/// Wall clock in unix seconds.
pub fn system_clock() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Per-connection state.
pub struct Session {
    pub network: Network,
    pub events: EventQueue,
    pub timers: Timers,
    pub(crate) stacker: ModeStacker,
    sendq: VecDeque<String>,
    dialect: Rc<dyn Dialect>,
    identity: Identity,
    link: LinkSettings,
    state: LinkState,
    pub(crate) uids: UidGenerator,
    clock: fn() -> i64,
    /// Key of the uplink server once it has introduced itself.
    uplink: Option<String>,
    /// Id the uplink gave in its greeting, before its server line.
    peer_sid: Option<String>,
    /// Set once the uplink's password has been checked and matched.
    password_ok: bool,
    burst_started: Option<Instant>,
    burst_elapsed: Option<Duration>,
}

impl Session {
    pub fn new(
        dialect: Rc<dyn Dialect>,
        identity: Identity,
        link: LinkSettings,
        casemap: CaseMapping,
        uids: UidGenerator,
    ) -> Self {
        let mut network = Network::new(casemap, dialect.mode_table(), dialect.keys_by_uid());
        network.set_local_server(identity.key());
        let stacker = ModeStacker::new(link.max_modes);

        Self {
            network,
            events: EventQueue::new(),
            timers: Timers::new(),
            stacker,
            sendq: VecDeque::new(),
            dialect,
            identity,
            link,
            state: LinkState::Disconnected,
            uids,
            clock: system_clock,
            uplink: None,
            peer_sid: None,
            password_ok: false,
            burst_started: None,
            burst_elapsed: None,
        }
    }

    pub fn dialect(&self) -> Rc<dyn Dialect> {
        Rc::clone(&self.dialect)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn link(&self) -> &LinkSettings {
        &self.link
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn set_state(&mut self, next: LinkState) -> bool {
        self.state.transition(next)
    }

    /// Replace the wall clock (tests feed fixtures with fixed timestamps).
    pub fn set_clock(&mut self, clock: fn() -> i64) {
        self.clock = clock;
    }

    /// Current unix time.
    pub fn now_ts(&self) -> i64 {
        (self.clock)()
    }

    /// Key of our uplink server, once known.
    pub fn uplink_key(&self) -> Option<&str> {
        self.uplink.as_deref()
    }

    /// Remember the id announced in the uplink's greeting.
    pub fn set_peer_sid(&mut self, sid: impl Into<String>) {
        self.peer_sid = Some(sid.into());
    }

    pub fn peer_sid(&self) -> Option<&str> {
        self.peer_sid.as_deref()
    }

    /// How long the uplink's burst took, once it is over.
    pub fn burst_elapsed(&self) -> Option<Duration> {
        self.burst_elapsed
    }

    // ------------------------------------------------------------------
    // Send queue
    // ------------------------------------------------------------------

    /// Queue a line for the uplink.
    pub fn send(&mut self, msg: Message) {
        let line = msg.to_string();
        trace!(line = %line, "Queued");
        self.sendq.push_back(line);
    }

    /// Take everything queued, oldest first.
    pub fn drain_sendq(&mut self) -> impl Iterator<Item = String> + '_ {
        self.sendq.drain(..)
    }

    pub fn sendq_len(&self) -> usize {
        self.sendq.len()
    }

    // ------------------------------------------------------------------
    // Link lifecycle
    // ------------------------------------------------------------------

    /// The transport is up: send our greeting.
    pub fn greet(&mut self) {
        self.set_state(LinkState::Handshaking);
        let dialect = self.dialect();
        dialect.handshake(self);
    }

    /// Parse and decode one line from the uplink.
    pub fn receive(&mut self, line: &str) -> Result<(), UplinkError> {
        trace!(%line, "Received");
        let msg = match Message::parse(line) {
            Ok(msg) => msg,
            Err(ProtocolError::EmptyMessage) => return Ok(()),
            Err(e) => {
                warn!(error = %e, %line, "Unparseable line from uplink");
                return Ok(());
            }
        };
        let dialect = self.dialect();
        dialect.decode(self, msg)
    }

    /// Verify the password the uplink sent.
    pub fn check_password(&mut self, received: &str) -> Result<(), UplinkError> {
        if received != self.link.receive_password {
            return Err(UplinkError::BadPassword);
        }
        self.password_ok = true;
        Ok(())
    }

    /// Fails unless a matching password has already arrived.
    pub fn require_password(&self) -> Result<(), UplinkError> {
        if !self.password_ok {
            return Err(UplinkError::Handshake("SERVER before PASS".into()));
        }
        Ok(())
    }

    /// Verify the uplink is the server we meant to link to.
    pub fn check_uplink_name(&self, announced: &str) -> Result<(), UplinkError> {
        if !announced.eq_ignore_ascii_case(&self.link.uplink_name) {
            return Err(UplinkError::ServerNameMismatch {
                expected: self.link.uplink_name.clone(),
                actual: announced.to_string(),
            });
        }
        Ok(())
    }

    /// Compare the uplink's clock with ours.
    pub fn check_clock(&self, remote_ts: i64) -> Result<(), UplinkError> {
        let skew = (self.now_ts() - remote_ts).abs();
        if skew >= CLOCK_SKEW_FATAL {
            return Err(UplinkError::ClockSkew(skew));
        }
        if skew >= CLOCK_SKEW_WARN {
            warn!(skew, "Clock skew with uplink");
        }
        Ok(())
    }

    /// Record the uplink's own server entry.
    pub fn accept_uplink(&mut self, server: Server) {
        let key = server.key();
        info!(uplink = %server.name, %key, "Uplink accepted");
        if self.network.add_server(&mut self.events, server) {
            self.uplink = Some(key);
        }
    }

    pub fn is_bursting(&self) -> bool {
        self.state == LinkState::Bursting
    }

    /// The uplink's burst has started.
    pub fn begin_burst(&mut self) {
        if !self.set_state(LinkState::Bursting) {
            return;
        }
        info!("Receiving burst");
        self.burst_started = Some(Instant::now());
        self.events.post(Event::StartOfBurst);
    }

    /// The uplink's burst is over: answer it and tell everyone.
    pub fn end_burst(&mut self) {
        if !self.is_bursting() {
            debug!(state = %self.state, "End of burst outside a burst");
            return;
        }
        let elapsed = self
            .burst_started
            .map(|t| t.elapsed())
            .unwrap_or_default();
        self.set_state(LinkState::Synced);
        self.burst_elapsed = Some(elapsed);

        let dialect = self.dialect();
        dialect.burst_complete(self);

        info!(
            elapsed_ms = elapsed.as_millis() as u64,
            servers = self.network.server_count(),
            users = self.network.user_count(),
            channels = self.network.channel_count(),
            "Burst complete"
        );
        self.events.post(Event::EndOfBurst { elapsed });
    }

    /// Drop everything tied to this connection and post `disconnected`.
    /// Persistent timers survive.
    pub fn teardown(&mut self, reason: &str) {
        self.network.clear();
        self.events.clear();
        self.sendq.clear();
        self.timers.clear_transient();
        self.stacker.clear();
        self.uplink = None;
        self.peer_sid = None;
        self.password_ok = false;
        self.burst_started = None;
        self.burst_elapsed = None;
        self.set_state(LinkState::Disconnected);
        self.events.post(Event::Disconnected {
            reason: reason.to_string(),
        });
    }

    // ------------------------------------------------------------------
    // Timers and mode flushing
    // ------------------------------------------------------------------

    /// Run every timer due at `now`.
    pub fn run_timers(&mut self, now: Instant) {
        for action in self.timers.due(now) {
            match action {
                TimerAction::FlushModes { channel } => {
                    if let Some(batch) = self.stacker.take(&mut self.timers, &channel) {
                        self.flush_modes(batch);
                    }
                }
                TimerAction::Post(event) => self.events.post(event),
            }
        }
    }

    /// Apply a batch to the model and send it.
    pub(crate) fn flush_modes(&mut self, batch: ModeBatch) {
        let Some(ts) = self.network.channel(&batch.channel).map(|c| c.ts) else {
            warn!(channel = %batch.channel, "Dropping modes for a vanished channel");
            return;
        };
        self.network
            .apply_changes(&mut self.events, &batch.channel, &batch.changes);

        // Status targets are keys internally; the wire wants ids or nicks.
        let wire: Vec<_> = batch
            .changes
            .into_iter()
            .map(|mut change| {
                if change.mode.is_status()
                    && let Some(key) = change.param.take()
                {
                    change.param = Some(self.wire_ref(&key));
                }
                change
            })
            .collect();

        let (modes, params) = self.network.mode_table().format_channel(&wire);
        if modes.is_empty() {
            return;
        }
        let dialect = self.dialect();
        dialect.channel_mode(self, &batch.channel, ts, &modes, &params);
    }

    /// How a user is named on the wire: its UID, or its nick on nick-keyed
    /// dialects.
    pub fn wire_ref(&self, key: &str) -> String {
        match self.network.user(key) {
            Some(user) => user.uid.clone().unwrap_or_else(|| user.nick.clone()),
            None => key.to_string(),
        }
    }

    /// How our server is named on the wire.
    pub fn local_ref(&self) -> String {
        self.identity
            .sid
            .clone()
            .unwrap_or_else(|| self.identity.name.clone())
    }
}

impl EventContext for Session {
    fn event_queue(&mut self) -> &mut EventQueue {
        &mut self.events
    }
}
