//! UID generation and P10 numeric encoding.

use std::cell::Cell;
use std::rc::Rc;

/// P10's base-64 alphabet.
pub const P10_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789[]";

const TS6_CHARS: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How a dialect names users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UidFormat {
    /// SID + `[A-Z][A-Z0-9]{5}`.
    Ts6,
    /// Two-character server numeric + three base-64 characters.
    P10,
    /// Users are keyed by nickname.
    Nick,
}

impl UidFormat {
    /// Build the `index`th UID for server `sid`. `None` once the id space is
    /// exhausted, or always for [`UidFormat::Nick`].
    pub fn encode(self, sid: &str, index: u64) -> Option<String> {
        match self {
            Self::Ts6 => ts6_suffix(index).map(|s| format!("{sid}{s}")),
            Self::P10 => p10_encode(index, 3).map(|s| format!("{sid}{s}")),
            Self::Nick => None,
        }
    }
}

/// Hands out user indices. Clones share the counter, so the uplink can keep
/// one across reconnects and ids are never reused within a process.
#[derive(Debug, Clone, Default)]
pub struct UidGenerator {
    counter: Rc<Cell<u64>>,
}

impl UidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next index.
    pub fn next_index(&self) -> u64 {
        let n = self.counter.get();
        self.counter.set(n + 1);
        n
    }

    /// Next UID in `format`, or `None` if the format has no UIDs or the
    /// space is used up.
    pub fn next(&self, format: UidFormat, sid: &str) -> Option<String> {
        if format == UidFormat::Nick {
            return None;
        }
        format.encode(sid, self.next_index())
    }
}

/// Six-character TS6 client id: first `A-Z`, the rest `A-Z0-9`.
fn ts6_suffix(mut n: u64) -> Option<String> {
    let mut out = [b'A'; 6];
    for slot in out[1..].iter_mut().rev() {
        *slot = TS6_CHARS[(n % 36) as usize];
        n /= 36;
    }
    if n >= 26 {
        return None;
    }
    out[0] = TS6_CHARS[n as usize];
    Some(String::from_utf8_lossy(&out).into_owned())
}

/// Encode `n` as exactly `width` P10 base-64 characters.
pub fn p10_encode(mut n: u64, width: usize) -> Option<String> {
    let mut out = vec![b'A'; width];
    for slot in out.iter_mut().rev() {
        *slot = P10_ALPHABET[(n % 64) as usize];
        n /= 64;
    }
    if n != 0 {
        return None;
    }
    Some(String::from_utf8_lossy(&out).into_owned())
}

fn p10_value(c: u8) -> Option<u64> {
    P10_ALPHABET.iter().position(|&a| a == c).map(|p| p as u64)
}

/// Decode a P10 base-64 string.
pub fn p10_decode(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }
    s.bytes()
        .try_fold(0u64, |acc, c| Some(acc.checked_mul(64)? + p10_value(c)?))
}

/// `[0-9][A-Z0-9]{2}`.
pub fn is_ts6_sid(sid: &str) -> bool {
    let b = sid.as_bytes();
    b.len() == 3
        && b[0].is_ascii_digit()
        && b[1..]
            .iter()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Two characters of the P10 alphabet.
pub fn is_p10_server_numeric(numeric: &str) -> bool {
    numeric.len() == 2 && numeric.bytes().all(|c| p10_value(c).is_some())
}
