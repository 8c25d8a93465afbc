//! Uplink connection state.

use std::fmt;

use tracing::{debug, warn};

/// Where the uplink connection is in its life.
///
/// ```text
/// Disconnected -> Connecting -> Handshaking -> Bursting -> Synced
///       ^______________|______________|____________|__________|
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    /// Opening TCP (and TLS).
    Connecting,
    /// Transport up, greeting sent, waiting for the uplink's.
    Handshaking,
    /// Uplink accepted; its burst is streaming in.
    Bursting,
    /// Burst complete.
    Synced,
}

impl LinkState {
    /// Whether `self -> next` is a legal step. Falling to `Disconnected` is
    /// always allowed.
    pub fn can_become(self, next: LinkState) -> bool {
        use LinkState::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Connecting, Handshaking)
                | (Handshaking, Bursting)
                | (Bursting, Synced)
        )
    }

    /// Move to `next`, logging illegal steps. Returns whether it moved.
    pub fn transition(&mut self, next: LinkState) -> bool {
        if *self == next {
            return false;
        }
        if !self.can_become(next) {
            warn!(from = %self, to = %next, "Illegal link state transition");
            return false;
        }
        debug!(from = %self, to = %next, "Link state");
        *self = next;
        true
    }

    /// True once the transport is up.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Handshaking | Self::Bursting | Self::Synced)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Bursting => "bursting",
            Self::Synced => "synced",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_forward() {
        let mut state = LinkState::default();
        for next in [
            LinkState::Connecting,
            LinkState::Handshaking,
            LinkState::Bursting,
            LinkState::Synced,
        ] {
            assert!(state.transition(next));
        }
        assert!(state.is_connected());
    }

    #[test]
    fn can_always_fall() {
        for state in [
            LinkState::Connecting,
            LinkState::Handshaking,
            LinkState::Bursting,
            LinkState::Synced,
        ] {
            let mut s = state;
            assert!(s.transition(LinkState::Disconnected));
        }
    }

    #[test]
    fn refuses_skips() {
        let mut state = LinkState::Handshaking;
        assert!(!state.transition(LinkState::Synced));
        assert_eq!(state, LinkState::Handshaking);
        let mut state = LinkState::Disconnected;
        assert!(!state.transition(LinkState::Bursting));
    }
}
