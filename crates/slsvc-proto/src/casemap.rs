//! IRC case-mapping.
//!
//! IRC compares nicknames and channel names case-insensitively, and some
//! networks also treat `[]\~` as the uppercase forms of `{}|^`. The mapping in
//! force is announced by the network and configured per uplink.

use std::fmt;
use std::str::FromStr;

/// A casemapping rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum CaseMapping {
    /// ASCII letters plus `[]\~` → `{}|^`.
    #[default]
    Rfc1459,
    /// ASCII letters plus `[]\` → `{}|` (no tilde).
    StrictRfc1459,
    /// ASCII letters only.
    Ascii,
}

impl CaseMapping {
    /// Lowercase a single character under this mapping.
    #[inline]
    pub const fn fold_char(self, c: char) -> char {
        match (self, c) {
            (_, 'A'..='Z') => (c as u8 + 32) as char,
            (Self::Rfc1459 | Self::StrictRfc1459, '[') => '{',
            (Self::Rfc1459 | Self::StrictRfc1459, ']') => '}',
            (Self::Rfc1459 | Self::StrictRfc1459, '\\') => '|',
            (Self::Rfc1459, '~') => '^',
            _ => c,
        }
    }

    /// Lowercase a whole string under this mapping.
    pub fn fold(self, s: &str) -> String {
        s.chars().map(|c| self.fold_char(c)).collect()
    }

    /// Case-insensitive comparison under this mapping.
    pub fn eq(self, a: &str, b: &str) -> bool {
        a.len() == b.len()
            && a
                .chars()
                .zip(b.chars())
                .all(|(x, y)| self.fold_char(x) == self.fold_char(y))
    }

    /// The ISUPPORT token for this mapping.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rfc1459 => "rfc1459",
            Self::StrictRfc1459 => "strict-rfc1459",
            Self::Ascii => "ascii",
        }
    }
}

impl fmt::Display for CaseMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaseMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rfc1459" => Ok(Self::Rfc1459),
            "strict-rfc1459" => Ok(Self::StrictRfc1459),
            "ascii" => Ok(Self::Ascii),
            other => Err(format!("unknown casemapping: {other}")),
        }
    }
}
