//! Wire dialects.
//!
//! A [`Dialect`] knows how to greet an uplink, how to turn each incoming
//! line into network model mutations, and how to encode the few things a
//! services server ever says. Decoding goes through a per-dialect table of
//! command handlers built once at construction.

use std::collections::HashMap;
use std::rc::Rc;

use slsvc_proto::Message;
use tracing::{debug, warn};

use crate::config::Protocol;
use crate::error::UplinkError;
use crate::event::{CommandEvent, Event};
use crate::state::{ModeClass, ModeTable, UserMode};
use crate::sync::Session;

pub mod inspircd;
pub mod p10;
pub mod ts6;
pub mod uid;
pub mod unreal;

pub use uid::{UidFormat, UidGenerator};

/// Handler for one incoming command.
pub(crate) type CommandFn<D> = fn(&D, &mut Session, &Message) -> Result<(), UplinkError>;

/// Command name → handler.
pub(crate) type CommandTable<D> = HashMap<&'static str, CommandFn<D>>;

/// Everything the core needs from a wire protocol.
///
/// Encoders receive user references already in wire form (UID, numeric or
/// nick) and push lines through [`Session::send`].
pub trait Dialect {
    fn name(&self) -> &'static str;
    fn mode_table(&self) -> &'static ModeTable;

    /// Whether users are keyed by UID (else by folded nick).
    fn keys_by_uid(&self) -> bool {
        true
    }

    fn uid_format(&self) -> UidFormat;

    /// User modes given to pseudo-users we introduce.
    fn service_umodes(&self) -> &'static str;

    /// Lines sent as soon as the transport is up.
    fn handshake(&self, s: &mut Session);

    /// Handle one parsed line.
    fn decode(&self, s: &mut Session, msg: Message) -> Result<(), UplinkError>;

    /// What we send once the uplink's burst has been received.
    fn burst_complete(&self, s: &mut Session);

    fn pong(&self, s: &mut Session, token: &str);

    /// Introduce the user stored under `key`.
    fn introduce_user(&self, s: &mut Session, key: &str);
    fn join(&self, s: &mut Session, user: &str, channel: &str, ts: i64, op: bool);
    fn part(&self, s: &mut Session, user: &str, channel: &str, reason: &str);
    fn privmsg(&self, s: &mut Session, from: &str, target: &str, text: &str);
    fn notice(&self, s: &mut Session, from: &str, target: &str, text: &str);
    fn topic(&self, s: &mut Session, from: &str, channel: &str, text: &str);
    fn quit(&self, s: &mut Session, user: &str, reason: &str);
    fn operwall(&self, s: &mut Session, from: Option<&str>, text: &str);
    fn channel_mode(
        &self,
        s: &mut Session,
        channel: &str,
        ts: i64,
        modes: &str,
        params: &[String],
    );
}

/// The dialect for a configured protocol.
pub fn for_protocol(protocol: Protocol) -> Rc<dyn Dialect> {
    match protocol {
        Protocol::Ts6 => Rc::new(ts6::Ts6::new()),
        Protocol::P10 => Rc::new(p10::P10::new()),
        Protocol::Inspircd => Rc::new(inspircd::InspIrcd::new()),
        Protocol::Unreal => Rc::new(unreal::Unreal::new()),
    }
}

/// Run the handler for `msg.command` and post the raw `irc_<command>`
/// event after it.
pub(crate) fn dispatch<D>(
    dialect: &D,
    table: &CommandTable<D>,
    s: &mut Session,
    msg: Message,
) -> Result<(), UplinkError> {
    let command = msg.command.to_ascii_uppercase();
    match table.get(command.as_str()) {
        Some(handler) => handler(dialect, s, &msg)?,
        None => debug!(%command, "Unhandled command"),
    }
    s.events.post(Event::Command(CommandEvent {
        command,
        origin: msg.origin,
        params: msg.params,
    }));
    Ok(())
}

/// Check a line carries at least `n` parameters, logging if not.
pub(crate) fn arity(msg: &Message, n: usize) -> bool {
    if msg.params.len() < n {
        warn!(
            command = %msg.command,
            got = msg.params.len(),
            need = n,
            "Too few parameters"
        );
        return false;
    }
    true
}

/// Parse a decimal timestamp, logging garbage as 0.
pub(crate) fn parse_ts(value: &str) -> i64 {
    value.parse().unwrap_or_else(|_| {
        warn!(%value, "Unparseable timestamp");
        0
    })
}

/// Split a trailing TS off a channel mode change's arguments.
///
/// Returns the TS and the remaining arguments only when there is an
/// argument left over after every one the mode string can consume and it
/// parses as a number.
pub(crate) fn timestamped_modes<'a>(
    table: &ModeTable,
    modes: &str,
    args: &'a [String],
) -> Option<(i64, &'a [String])> {
    let mut adding = true;
    let mut wanted = 0;
    for c in modes.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            _ => match table.channel_def(c).map(|d| d.class) {
                Some(ModeClass::Status { .. } | ModeClass::List) => wanted += 1,
                Some(ModeClass::Param { unset_takes_param }) if adding || unset_takes_param => {
                    wanted += 1;
                }
                _ => {}
            },
        }
    }
    let (last, rest) = args.split_last()?;
    if args.len() <= wanted {
        return None;
    }
    let ts = last.parse().ok()?;
    Some((ts, rest))
}

/// `+ioS` style string for a set of user modes.
pub(crate) fn umode_string(table: &ModeTable, modes: impl IntoIterator<Item = UserMode>) -> String {
    let mut out = String::from("+");
    out.extend(modes.into_iter().filter_map(|m| table.user_letter(m)));
    out
}

/// The origin of a line that must have one.
pub(crate) fn origin(msg: &Message) -> Option<&str> {
    let origin = msg.origin.as_deref();
    if origin.is_none() {
        warn!(command = %msg.command, "Line has no origin");
    }
    origin
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_counts_params() {
        let msg = Message::new("SJOIN", ["1", "#c"]);
        assert!(arity(&msg, 2));
        assert!(!arity(&msg, 3));
    }

    #[test]
    fn bad_ts_is_zero() {
        assert_eq!(parse_ts("1307151136"), 1307151136);
        assert_eq!(parse_ts("soon"), 0);
    }

    #[test]
    fn trailing_ts_is_split_off() {
        let table = &p10::MODES;
        let args = |a: &[&str]| a.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let with_ts = args(&["ABAAB", "1307151136"]);
        assert_eq!(
            timestamped_modes(table, "+o", &with_ts),
            Some((1307151136, &with_ts[..1]))
        );
        assert_eq!(timestamped_modes(table, "+o", &args(&["ABAAB"])), None);
        assert_eq!(timestamped_modes(table, "+im", &args(&[])), None);
        assert_eq!(
            timestamped_modes(table, "-k", &args(&["sekrit", "1307151136"])).map(|(ts, _)| ts),
            Some(1307151136)
        );
        // A key removal may carry the key itself; it is not a TS.
        assert_eq!(timestamped_modes(table, "-k", &args(&["1307151136"])), None);
        assert_eq!(timestamped_modes(table, "+l", &args(&["10", "soon"])), None);
    }

    #[test]
    fn every_protocol_has_a_dialect() {
        for (protocol, name) in [
            (Protocol::Ts6, "ts6"),
            (Protocol::P10, "p10"),
            (Protocol::Inspircd, "inspircd"),
            (Protocol::Unreal, "unreal"),
        ] {
            assert_eq!(for_protocol(protocol).name(), name);
        }
    }
}
