//! Channel timestamp rules.
//!
//! When two sides disagree about a channel, the older channel wins:
//!
//! - incoming TS lower than ours: our view is stale. Every status, flag,
//!   parameter and list entry is cleared, the lower TS adopted, and the
//!   incoming modes and members applied.
//! - equal: both sides merge.
//! - incoming TS higher: members are accepted but their modes and status
//!   claims are dropped.

use std::cmp::Ordering;

use tracing::{debug, warn};

use super::modes::{ChannelMode, ModeChange};
use super::network::Network;
use crate::event::{Event, EventQueue};

/// How an incoming TS compared to ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsOutcome {
    /// The channel did not exist and was created with the incoming TS.
    Created,
    /// Incoming was older; we reset and adopted it.
    Reset,
    /// Same TS; merge.
    Equal,
    /// Incoming was newer; only membership is accepted.
    Ignored,
}

impl TsOutcome {
    /// Whether modes arriving with this TS should be applied.
    pub fn accepts_modes(self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

/// A burst member: a user reference plus the status modes claimed for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstMember {
    pub user: String,
    pub statuses: Vec<ChannelMode>,
}

impl BurstMember {
    pub fn new(user: impl Into<String>, statuses: Vec<ChannelMode>) -> Self {
        Self {
            user: user.into(),
            statuses,
        }
    }
}

impl Network {
    /// Compare `ts` with the channel's, creating or resetting as needed.
    pub fn reconcile_ts(&mut self, events: &mut EventQueue, channel: &str, ts: i64) -> TsOutcome {
        if self.ensure_channel(events, channel, ts) {
            return TsOutcome::Created;
        }
        let Some(local) = self.channel(channel).map(|c| c.ts) else {
            return TsOutcome::Created;
        };
        match ts.cmp(&local) {
            Ordering::Less => {
                debug!(%channel, local, incoming = ts, "Lower TS, resetting channel");
                self.reset_channel(events, channel, ts);
                TsOutcome::Reset
            }
            Ordering::Equal => TsOutcome::Equal,
            Ordering::Greater => TsOutcome::Ignored,
        }
    }

    /// Drop every mode and status on a channel and take a new TS. Each
    /// removal is posted.
    pub fn reset_channel(&mut self, events: &mut EventQueue, channel: &str, ts: i64) {
        let chan_key = self.fold(channel);
        let Some(chan) = self.channels.get_mut(&chan_key) else {
            return;
        };
        chan.ts = ts;
        let name = chan.name.clone();
        let members: Vec<String> = chan.members.iter().cloned().collect();

        let mut removed = Vec::new();
        for mode in std::mem::take(&mut chan.modes) {
            removed.push((mode, None));
        }
        for (mode, value) in std::mem::take(&mut chan.params) {
            removed.push((mode, Some(value)));
        }
        for (mode, masks) in std::mem::take(&mut chan.lists) {
            removed.extend(masks.into_iter().map(|m| (mode, Some(m))));
        }

        for key in members {
            let Some(statuses) = self
                .users
                .get_mut(&key)
                .and_then(|u| u.channels.get_mut(&chan_key))
            else {
                continue;
            };
            for mode in std::mem::take(statuses) {
                removed.push((mode, Some(key.clone())));
            }
        }

        for (mode, param) in removed {
            events.post(Event::ModeDeletedOnChannel {
                mode,
                param,
                channel: name.clone(),
            });
        }
    }

    /// Apply a channel burst (SJOIN, FJOIN, BURST, or a TS-carrying JOIN).
    pub fn burst_channel(
        &mut self,
        events: &mut EventQueue,
        channel: &str,
        ts: i64,
        modes: &[ModeChange],
        members: &[BurstMember],
    ) -> TsOutcome {
        let outcome = self.reconcile_ts(events, channel, ts);
        let accept = outcome.accepts_modes();

        if accept {
            self.apply_changes(events, channel, modes);
        } else if !modes.is_empty() || members.iter().any(|m| !m.statuses.is_empty()) {
            warn!(%channel, ts, "Dropping modes from a burst with a newer TS");
        }

        for member in members {
            let Some(key) = self.resolve_user(&member.user) else {
                warn!(%channel, user = %member.user, "Burst member is not a known user");
                continue;
            };
            self.add_member(events, channel, &key);
            if accept {
                let statuses: Vec<ModeChange> = member
                    .statuses
                    .iter()
                    .map(|m| ModeChange::add(*m, Some(key.clone())))
                    .collect();
                self.apply_changes(events, channel, &statuses);
            }
        }

        // Nobody we know joined a channel created just now.
        let chan_key = self.fold(channel);
        self.prune_channel(events, &chan_key);
        outcome
    }

    /// Apply a TS-carrying mode change (TMODE, BMASK, FMODE, and
    /// server-sourced P10 M/OM or Unreal MODE).
    pub fn ts_mode(
        &mut self,
        events: &mut EventQueue,
        channel: &str,
        ts: i64,
        changes: &[ModeChange],
    ) -> Option<TsOutcome> {
        let Some(local) = self.channel(channel).map(|c| c.ts) else {
            warn!(%channel, "Timestamped MODE for unknown channel");
            return None;
        };
        let outcome = match ts.cmp(&local) {
            Ordering::Less => {
                self.reset_channel(events, channel, ts);
                TsOutcome::Reset
            }
            Ordering::Equal => TsOutcome::Equal,
            Ordering::Greater => {
                warn!(%channel, local, incoming = ts, "Dropping MODE with a newer TS");
                return Some(TsOutcome::Ignored);
            }
        };
        self.apply_changes(events, channel, changes);
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::network::tests::{add_uid, ts6_network};

    fn op(uid: &str) -> BurstMember {
        BurstMember::new(uid, vec![ChannelMode::Operator])
    }

    fn flags(names: &[ChannelMode]) -> Vec<ModeChange> {
        names.iter().map(|m| ModeChange::add(*m, None)).collect()
    }

    fn seeded() -> (Network, EventQueue) {
        let (mut net, mut events) = ts6_network();
        add_uid(&mut net, &mut events, "0AAAAAAAA", "rakaur");
        add_uid(&mut net, &mut events, "0AAAAAAAB", "sycobuny");
        net.burst_channel(
            &mut events,
            "#malkier",
            1000,
            &flags(&[ChannelMode::NoExternal, ChannelMode::TopicLock]),
            &[op("0AAAAAAAA")],
        );
        events.clear();
        (net, events)
    }

    #[test]
    fn new_channel_takes_burst() {
        let (net, _) = seeded();
        let chan = net.channel("#malkier").unwrap();
        assert_eq!(chan.ts, 1000);
        assert!(chan.has_mode(ChannelMode::TopicLock));
        assert!(net.has_status("#malkier", "0AAAAAAAA", ChannelMode::Operator));
    }

    #[test]
    fn lower_ts_resets_and_adopts() {
        let (mut net, mut events) = seeded();
        let outcome = net.burst_channel(
            &mut events,
            "#malkier",
            500,
            &flags(&[ChannelMode::Secret]),
            &[op("0AAAAAAAB")],
        );
        assert_eq!(outcome, TsOutcome::Reset);

        let chan = net.channel("#malkier").unwrap();
        assert_eq!(chan.ts, 500);
        assert!(!chan.has_mode(ChannelMode::NoExternal));
        assert!(chan.has_mode(ChannelMode::Secret));
        assert!(!net.has_status("#malkier", "0AAAAAAAA", ChannelMode::Operator));
        assert!(net.has_status("#malkier", "0AAAAAAAB", ChannelMode::Operator));
        assert!(net.is_member("#malkier", "0AAAAAAAA"));
    }

    #[test]
    fn equal_ts_merges() {
        let (mut net, mut events) = seeded();
        let outcome = net.burst_channel(
            &mut events,
            "#malkier",
            1000,
            &flags(&[ChannelMode::Secret]),
            &[op("0AAAAAAAB")],
        );
        assert_eq!(outcome, TsOutcome::Equal);
        let chan = net.channel("#malkier").unwrap();
        assert!(chan.has_mode(ChannelMode::NoExternal));
        assert!(chan.has_mode(ChannelMode::Secret));
        assert!(net.has_status("#malkier", "0AAAAAAAA", ChannelMode::Operator));
        assert!(net.has_status("#malkier", "0AAAAAAAB", ChannelMode::Operator));
    }

    #[test]
    fn higher_ts_accepts_members_only() {
        let (mut net, mut events) = seeded();
        let outcome = net.burst_channel(
            &mut events,
            "#malkier",
            2000,
            &flags(&[ChannelMode::Secret]),
            &[op("0AAAAAAAB")],
        );
        assert_eq!(outcome, TsOutcome::Ignored);
        let chan = net.channel("#malkier").unwrap();
        assert_eq!(chan.ts, 1000);
        assert!(!chan.has_mode(ChannelMode::Secret));
        assert!(net.is_member("#malkier", "0AAAAAAAB"));
        assert!(!net.has_status("#malkier", "0AAAAAAAB", ChannelMode::Operator));
    }

    #[test]
    fn reset_posts_every_removal() {
        let (mut net, mut events) = seeded();
        net.reset_channel(&mut events, "#malkier", 10);
        let mut removed = 0;
        while let Some(ev) = events.pop() {
            assert!(matches!(ev, Event::ModeDeletedOnChannel { .. }));
            removed += 1;
        }
        // +n, +t, and rakaur's op
        assert_eq!(removed, 3);
    }

    #[test]
    fn ts_mode_follows_the_same_rules() {
        let (mut net, mut events) = seeded();
        let secret = flags(&[ChannelMode::Secret]);

        assert_eq!(
            net.ts_mode(&mut events, "#malkier", 2000, &secret),
            Some(TsOutcome::Ignored)
        );
        assert!(!net.channel_has_mode("#malkier", ChannelMode::Secret));

        assert_eq!(
            net.ts_mode(&mut events, "#malkier", 1000, &secret),
            Some(TsOutcome::Equal)
        );
        assert!(net.channel_has_mode("#malkier", ChannelMode::NoExternal));
        assert!(net.channel_has_mode("#malkier", ChannelMode::Secret));

        assert_eq!(net.ts_mode(&mut events, "#nowhere", 1, &secret), None);
    }

    #[test]
    fn burst_of_unknown_users_leaves_no_channel() {
        let (mut net, mut events) = ts6_network();
        net.burst_channel(&mut events, "#empty", 1, &[], &[op("0AAZZZZZZ")]);
        assert!(net.channel("#empty").is_none());
    }
}
