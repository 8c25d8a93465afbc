//! Outgoing channel mode batching.
//!
//! Services tend to ask for modes one at a time ("op this user", "ban that
//! mask"). The stacker collects those requests per channel and releases them
//! as a single MODE line, either when the uplink's per-line limit is reached
//! or after a short quiet period.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::modes::ModeChange;
use crate::timer::{TimerAction, TimerId, Timers};

/// Quiet period before a partial stack is sent.
pub const FLUSH_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct Stack {
    channel: String,
    changes: Vec<ModeChange>,
    timer: Option<TimerId>,
}

/// A batch ready to go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeBatch {
    /// Channel name as requested.
    pub channel: String,
    pub changes: Vec<ModeChange>,
}

/// Per-channel pending mode changes.
#[derive(Debug)]
pub struct ModeStacker {
    stacks: HashMap<String, Stack>,
    max_modes: usize,
    delay: Duration,
}

impl ModeStacker {
    pub fn new(max_modes: usize) -> Self {
        Self {
            stacks: HashMap::new(),
            max_modes: max_modes.max(1),
            delay: FLUSH_DELAY,
        }
    }

    pub fn max_modes(&self) -> usize {
        self.max_modes
    }

    /// Queue one change for `channel` (folded into `key`). Returns a batch
    /// if the stack just filled up; otherwise (re)arms the quiet timer.
    pub fn push(
        &mut self,
        timers: &mut Timers,
        now: Instant,
        key: &str,
        channel: &str,
        change: ModeChange,
    ) -> Option<ModeBatch> {
        let stack = self.stacks.entry(key.to_string()).or_insert_with(|| Stack {
            channel: channel.to_string(),
            changes: Vec::new(),
            timer: None,
        });
        stack.changes.push(change);

        if let Some(id) = stack.timer.take() {
            timers.cancel(id);
        }

        if stack.changes.len() >= self.max_modes {
            return self.stacks.remove(key).map(|s| ModeBatch {
                channel: s.channel,
                changes: s.changes,
            });
        }

        stack.timer = Some(timers.after(
            now,
            self.delay,
            TimerAction::FlushModes {
                channel: key.to_string(),
            },
        ));
        None
    }

    /// Take whatever is pending for `key`, cancelling its timer.
    pub fn take(&mut self, timers: &mut Timers, key: &str) -> Option<ModeBatch> {
        let stack = self.stacks.remove(key)?;
        if let Some(id) = stack.timer {
            timers.cancel(id);
        }
        (!stack.changes.is_empty()).then_some(ModeBatch {
            channel: stack.channel,
            changes: stack.changes,
        })
    }

    /// Number of changes waiting for `key`.
    pub fn pending(&self, key: &str) -> usize {
        self.stacks.get(key).map_or(0, |s| s.changes.len())
    }

    pub fn clear(&mut self) {
        self.stacks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ChannelMode;

    fn voice(n: usize) -> ModeChange {
        ModeChange::add(ChannelMode::Voice, Some(format!("0AAAAAA{n:02}")))
    }

    #[test]
    fn full_stack_flushes_immediately() {
        let t0 = Instant::now();
        let mut timers = Timers::new();
        let mut stacker = ModeStacker::new(4);
        let mut batches = Vec::new();

        for n in 0..10 {
            if let Some(b) = stacker.push(&mut timers, t0, "#malkier", "#malkier", voice(n)) {
                batches.push(b);
            }
        }
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.changes.len() == 4));
        assert_eq!(stacker.pending("#malkier"), 2);

        // The remainder goes when the quiet timer fires.
        let fired = timers.due(t0 + FLUSH_DELAY);
        assert_eq!(
            fired,
            vec![TimerAction::FlushModes {
                channel: "#malkier".into()
            }]
        );
        let rest = stacker.take(&mut timers, "#malkier").unwrap();
        assert_eq!(rest.changes, vec![voice(8), voice(9)]);
    }

    #[test]
    fn exact_multiple_leaves_nothing_pending() {
        let t0 = Instant::now();
        let mut timers = Timers::new();
        let mut stacker = ModeStacker::new(4);
        let flushed = (0..8)
            .filter_map(|n| stacker.push(&mut timers, t0, "#c", "#c", voice(n)))
            .count();
        assert_eq!(flushed, 2);
        assert!(timers.is_empty());
        assert!(stacker.take(&mut timers, "#c").is_none());
    }

    #[test]
    fn each_push_replaces_the_timer() {
        let t0 = Instant::now();
        let mut timers = Timers::new();
        let mut stacker = ModeStacker::new(6);

        stacker.push(&mut timers, t0, "#c", "#c", voice(0));
        let t1 = t0 + Duration::from_millis(300);
        stacker.push(&mut timers, t1, "#c", "#c", voice(1));

        assert_eq!(timers.len(), 1);
        assert_eq!(timers.next_deadline(), Some(t1 + FLUSH_DELAY));
        assert!(timers.due(t0 + FLUSH_DELAY).is_empty());
    }

    #[test]
    fn stacks_are_per_channel() {
        let t0 = Instant::now();
        let mut timers = Timers::new();
        let mut stacker = ModeStacker::new(2);
        assert!(stacker.push(&mut timers, t0, "#a", "#a", voice(0)).is_none());
        assert!(stacker.push(&mut timers, t0, "#b", "#b", voice(1)).is_none());
        assert_eq!(timers.len(), 2);
        let batch = stacker.push(&mut timers, t0, "#a", "#A", voice(2)).unwrap();
        assert_eq!(batch.channel, "#a");
        assert_eq!(stacker.pending("#b"), 1);
    }
}
