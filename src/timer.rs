//! Cooperative timers.
//!
//! The uplink loop has no background tasks; instead it asks [`Timers`] for
//! the earliest deadline, sleeps until then (bounded by a ceiling), and runs
//! whatever is due. Deadlines are plain `std::time::Instant`s so the set can
//! be driven from tests with fabricated clocks.

use std::time::{Duration, Instant};

use crate::event::Event;

/// Opaque timer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// What a timer does when it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum TimerAction {
    /// Flush the pending mode stack for a channel (folded name).
    FlushModes { channel: String },
    /// Post an event.
    Post(Event),
}

#[derive(Debug)]
struct Entry {
    id: TimerId,
    deadline: Instant,
    interval: Option<Duration>,
    persistent: bool,
    action: TimerAction,
}

/// Set of pending timers.
#[derive(Debug, Default)]
pub struct Timers {
    entries: Vec<Entry>,
    next_id: u64,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire once after `delay`.
    pub fn after(&mut self, now: Instant, delay: Duration, action: TimerAction) -> TimerId {
        self.insert(now + delay, None, false, action)
    }

    /// Fire every `interval`, first after one interval. Repeating timers
    /// are persistent: [`clear_transient`](Self::clear_transient) keeps them.
    pub fn every_persistent(
        &mut self,
        now: Instant,
        interval: Duration,
        action: TimerAction,
    ) -> TimerId {
        self.insert(now + interval, Some(interval), true, action)
    }

    fn insert(
        &mut self,
        deadline: Instant,
        interval: Option<Duration>,
        persistent: bool,
        action: TimerAction,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            deadline,
            interval,
            persistent,
            action,
        });
        id
    }

    /// Returns whether the timer was still pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.deadline).min()
    }

    /// Remove and return due actions, earliest first. Repeating timers are
    /// rescheduled.
    pub fn due(&mut self, now: Instant) -> Vec<TimerAction> {
        let mut fired: Vec<(Instant, TimerId, TimerAction)> = Vec::new();

        self.entries.retain_mut(|e| {
            if e.deadline > now {
                return true;
            }
            fired.push((e.deadline, e.id, e.action.clone()));
            match e.interval {
                Some(interval) => {
                    while e.deadline <= now {
                        e.deadline += interval;
                    }
                    true
                }
                None => false,
            }
        });

        fired.sort_by_key(|(deadline, id, _)| (*deadline, id.0));
        fired.into_iter().map(|(_, _, action)| action).collect()
    }

    /// Drop every non-persistent timer.
    pub fn clear_transient(&mut self) {
        self.entries.retain(|e| e.persistent);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flush(channel: &str) -> TimerAction {
        TimerAction::FlushModes {
            channel: channel.into(),
        }
    }

    #[test]
    fn fires_in_deadline_order() {
        let t0 = Instant::now();
        let mut timers = Timers::new();
        timers.after(t0, Duration::from_millis(500), flush("#b"));
        timers.after(t0, Duration::from_millis(100), flush("#a"));

        assert_eq!(timers.next_deadline(), Some(t0 + Duration::from_millis(100)));
        assert!(timers.due(t0).is_empty());

        let fired = timers.due(t0 + Duration::from_secs(1));
        assert_eq!(fired, vec![flush("#a"), flush("#b")]);
        assert!(timers.is_empty());
    }

    #[test]
    fn cancel_removes_pending() {
        let t0 = Instant::now();
        let mut timers = Timers::new();
        let id = timers.after(t0, Duration::from_millis(500), flush("#a"));
        assert!(timers.cancel(id));
        assert!(!timers.cancel(id));
        assert!(timers.due(t0 + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn repeating_timers_reschedule() {
        let t0 = Instant::now();
        let mut timers = Timers::new();
        timers.every_persistent(t0, Duration::from_secs(10), flush("#a"));

        assert_eq!(timers.due(t0 + Duration::from_secs(25)).len(), 1);
        assert_eq!(timers.next_deadline(), Some(t0 + Duration::from_secs(30)));
    }

    #[test]
    fn clear_transient_keeps_persistent() {
        let t0 = Instant::now();
        let mut timers = Timers::new();
        timers.after(t0, Duration::from_secs(1), flush("#a"));
        timers.every_persistent(t0, Duration::from_secs(60), flush("#b"));
        timers.clear_transient();
        assert_eq!(timers.len(), 1);
    }
}
