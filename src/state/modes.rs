//! Mode vocabulary and per-dialect mode tables.
//!
//! Every dialect maps its wire letters onto the same semantic [`ChannelMode`]
//! and [`UserMode`] values, so the network model never has to know which
//! protocol it is fed by. The [`ModeTable`] a dialect exposes is used both to
//! parse incoming mode strings and to format outgoing ones.

use std::fmt;

use tracing::warn;

/// Semantic channel modes across all supported dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelMode {
    // Status
    Owner,
    Admin,
    Operator,
    Halfop,
    Voice,

    // Lists
    Ban,
    Except,
    InviteExcept,
    Quiet,
    Filter,

    // Parameters
    Key,
    Limit,
    Flood,
    JoinThrottle,
    Redirect,
    NickFlood,
    Forward,

    // Flags
    NoColors,
    NoCtcp,
    DelayJoin,
    Censor,
    FreeInvite,
    FreeTarget,
    InviteOnly,
    NoKnock,
    LargeLists,
    Moderated,
    ModRegistered,
    NoExternal,
    NoNickChange,
    NoNotice,
    OperOnly,
    Private,
    Permanent,
    NoKicks,
    DisableForward,
    Registered,
    RegisteredOnly,
    Secret,
    StripColors,
    TopicLock,
    Auditorium,
    NoInvite,
    TlsOnly,
    OpModerated,
    NoPartMessages,
}

impl ChannelMode {
    /// True for the member status modes.
    pub fn is_status(self) -> bool {
        matches!(
            self,
            Self::Owner | Self::Admin | Self::Operator | Self::Halfop | Self::Voice
        )
    }
}

/// Semantic user modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UserMode {
    Invisible,
    Wallops,
    Operator,
    Admin,
    Service,
    Deaf,
    CallerId,
    Registered,
    HideOper,
    Cloaked,
    ServerNotices,
    Bot,
    Secure,
    NoForward,
    /// P10 `+r`, which carries the account name.
    Account,
}

/// How a channel mode consumes parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeClass {
    /// Member status, shown in bursts with `prefix`. Always takes a user.
    Status { prefix: char },
    /// Mask list. Takes a mask both ways.
    List,
    /// Single value. Always takes one on set; on unset only if flagged.
    Param { unset_takes_param: bool },
    /// Plain flag.
    Flag,
}

/// One row of a channel mode table.
#[derive(Debug, Clone, Copy)]
pub struct ChannelModeDef {
    pub letter: char,
    pub mode: ChannelMode,
    pub class: ModeClass,
}

/// One row of a user mode table.
#[derive(Debug, Clone, Copy)]
pub struct UserModeDef {
    pub letter: char,
    pub mode: UserMode,
    pub takes_param: bool,
}

/// A dialect's mode vocabulary.
#[derive(Debug)]
pub struct ModeTable {
    pub channel: &'static [ChannelModeDef],
    pub user: &'static [UserModeDef],
}

/// A single parsed or requested channel mode change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeChange {
    pub adding: bool,
    pub mode: ChannelMode,
    pub param: Option<String>,
}

impl ModeChange {
    pub fn add(mode: ChannelMode, param: Option<String>) -> Self {
        Self {
            adding: true,
            mode,
            param,
        }
    }

    pub fn delete(mode: ChannelMode, param: Option<String>) -> Self {
        Self {
            adding: false,
            mode,
            param,
        }
    }
}

impl fmt::Display for ModeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.adding { '+' } else { '-' };
        match &self.param {
            Some(p) => write!(f, "{sign}{:?} {p}", self.mode),
            None => write!(f, "{sign}{:?}", self.mode),
        }
    }
}

/// A single parsed user mode change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserModeChange {
    pub adding: bool,
    pub mode: UserMode,
    pub param: Option<String>,
}

/// Shorthand for building table rows.
pub(crate) const fn cm(letter: char, mode: ChannelMode, class: ModeClass) -> ChannelModeDef {
    ChannelModeDef {
        letter,
        mode,
        class,
    }
}

pub(crate) const fn um(letter: char, mode: UserMode) -> UserModeDef {
    UserModeDef {
        letter,
        mode,
        takes_param: false,
    }
}

pub(crate) const STATUS_Q: ModeClass = ModeClass::Status { prefix: '~' };
pub(crate) const STATUS_A: ModeClass = ModeClass::Status { prefix: '&' };
pub(crate) const STATUS_O: ModeClass = ModeClass::Status { prefix: '@' };
pub(crate) const STATUS_H: ModeClass = ModeClass::Status { prefix: '%' };
pub(crate) const STATUS_V: ModeClass = ModeClass::Status { prefix: '+' };
pub(crate) const LIST: ModeClass = ModeClass::List;
pub(crate) const KEYED: ModeClass = ModeClass::Param {
    unset_takes_param: true,
};
pub(crate) const PARAM: ModeClass = ModeClass::Param {
    unset_takes_param: false,
};
pub(crate) const FLAG: ModeClass = ModeClass::Flag;

impl ModeTable {
    pub fn channel_def(&self, letter: char) -> Option<&ChannelModeDef> {
        self.channel.iter().find(|d| d.letter == letter)
    }

    pub fn channel_def_for(&self, mode: ChannelMode) -> Option<&ChannelModeDef> {
        self.channel.iter().find(|d| d.mode == mode)
    }

    pub fn channel_letter(&self, mode: ChannelMode) -> Option<char> {
        self.channel_def_for(mode).map(|d| d.letter)
    }

    pub fn class_of(&self, mode: ChannelMode) -> Option<ModeClass> {
        self.channel_def_for(mode).map(|d| d.class)
    }

    /// Status mode announced by a burst prefix character.
    pub fn status_for_prefix(&self, prefix: char) -> Option<ChannelMode> {
        self.channel
            .iter()
            .find(|d| d.class == ModeClass::Status { prefix })
            .map(|d| d.mode)
    }

    pub fn prefix_for(&self, mode: ChannelMode) -> Option<char> {
        match self.class_of(mode)? {
            ModeClass::Status { prefix } => Some(prefix),
            _ => None,
        }
    }

    pub fn user_def(&self, letter: char) -> Option<&UserModeDef> {
        self.user.iter().find(|d| d.letter == letter)
    }

    pub fn user_letter(&self, mode: UserMode) -> Option<char> {
        self.user.iter().find(|d| d.mode == mode).map(|d| d.letter)
    }

    /// Parse a channel mode string, consuming parameters as each class
    /// requires. Unknown letters are logged and skipped; a mode missing its
    /// parameter is skipped too, except a parameterless key removal which is
    /// kept with `param: None` for the caller to resolve.
    pub fn parse_channel<S: AsRef<str>>(&self, modes: &str, params: &[S]) -> Vec<ModeChange> {
        let mut out = Vec::new();
        let mut args = params.iter().map(|p| p.as_ref().to_string());
        let mut adding = true;

        for c in modes.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                _ => {
                    let Some(def) = self.channel_def(c) else {
                        warn!(mode = %c, modes, "Unknown channel mode");
                        continue;
                    };
                    let param = match def.class {
                        ModeClass::Flag => None,
                        ModeClass::Status { .. } | ModeClass::List => match args.next() {
                            Some(p) => Some(p),
                            None => {
                                warn!(mode = %c, modes, "Channel mode missing its parameter");
                                continue;
                            }
                        },
                        ModeClass::Param { unset_takes_param } => {
                            if adding {
                                match args.next() {
                                    Some(p) => Some(p),
                                    None => {
                                        warn!(mode = %c, modes, "Channel mode missing its parameter");
                                        continue;
                                    }
                                }
                            } else if unset_takes_param {
                                args.next()
                            } else {
                                None
                            }
                        }
                    };
                    out.push(ModeChange {
                        adding,
                        mode: def.mode,
                        param,
                    });
                }
            }
        }

        out
    }

    /// Parse a user mode string. Params are only consumed by modes that
    /// declare one (P10 `+r account`).
    pub fn parse_user<S: AsRef<str>>(&self, modes: &str, params: &[S]) -> Vec<UserModeChange> {
        let mut out = Vec::new();
        let mut args = params.iter().map(|p| p.as_ref().to_string());
        let mut adding = true;

        for c in modes.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                _ => {
                    let Some(def) = self.user_def(c) else {
                        warn!(mode = %c, modes, "Unknown user mode");
                        continue;
                    };
                    let param = if def.takes_param && adding {
                        args.next()
                    } else {
                        None
                    };
                    out.push(UserModeChange {
                        adding,
                        mode: def.mode,
                        param,
                    });
                }
            }
        }

        out
    }

    /// Format changes as one mode string plus its parameters, in order.
    /// A parameterless key removal is written with `*`. Modes this table
    /// cannot express are logged and left out.
    pub fn format_channel(&self, changes: &[ModeChange]) -> (String, Vec<String>) {
        let mut modes = String::new();
        let mut params = Vec::new();
        let mut sign = None;

        for change in changes {
            let Some(def) = self.channel_def_for(change.mode) else {
                warn!(mode = ?change.mode, "Mode not supported by this protocol");
                continue;
            };
            if sign != Some(change.adding) {
                modes.push(if change.adding { '+' } else { '-' });
                sign = Some(change.adding);
            }
            modes.push(def.letter);

            let wants_param = match def.class {
                ModeClass::Flag => false,
                ModeClass::Status { .. } | ModeClass::List => true,
                ModeClass::Param { unset_takes_param } => change.adding || unset_takes_param,
            };
            if wants_param {
                params.push(change.param.clone().unwrap_or_else(|| "*".to_string()));
            }
        }

        (modes, params)
    }

    /// Status modes for a burst prefix string such as `@+`.
    pub fn statuses_from_prefixes(&self, prefixes: &str) -> Vec<ChannelMode> {
        prefixes
            .chars()
            .filter_map(|p| self.status_for_prefix(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_CHANNEL: &[ChannelModeDef] = &[
        cm('o', ChannelMode::Operator, STATUS_O),
        cm('v', ChannelMode::Voice, STATUS_V),
        cm('b', ChannelMode::Ban, LIST),
        cm('k', ChannelMode::Key, KEYED),
        cm('l', ChannelMode::Limit, PARAM),
        cm('n', ChannelMode::NoExternal, FLAG),
        cm('t', ChannelMode::TopicLock, FLAG),
    ];

    static TEST_USER: &[UserModeDef] = &[
        um('i', UserMode::Invisible),
        um('o', UserMode::Operator),
        UserModeDef {
            letter: 'r',
            mode: UserMode::Account,
            takes_param: true,
        },
    ];

    static TABLE: ModeTable = ModeTable {
        channel: TEST_CHANNEL,
        user: TEST_USER,
    };

    #[test]
    fn consumes_params_by_class() {
        let changes = TABLE.parse_channel("+ontkl-lv", &["UID1", "sekrit", "10", "UID2"]);
        assert_eq!(
            changes,
            vec![
                ModeChange::add(ChannelMode::Operator, Some("UID1".into())),
                ModeChange::add(ChannelMode::NoExternal, None),
                ModeChange::add(ChannelMode::TopicLock, None),
                ModeChange::add(ChannelMode::Key, Some("sekrit".into())),
                ModeChange::add(ChannelMode::Limit, Some("10".into())),
                ModeChange::delete(ChannelMode::Limit, None),
                ModeChange::delete(ChannelMode::Voice, Some("UID2".into())),
            ]
        );
    }

    #[test]
    fn key_removal_without_param_is_kept() {
        let changes = TABLE.parse_channel("-k", &[] as &[&str]);
        assert_eq!(changes, vec![ModeChange::delete(ChannelMode::Key, None)]);
    }

    #[test]
    fn unknown_letters_are_skipped() {
        let changes = TABLE.parse_channel("+Xn", &[] as &[&str]);
        assert_eq!(changes, vec![ModeChange::add(ChannelMode::NoExternal, None)]);
    }

    #[test]
    fn missing_status_param_is_skipped() {
        let changes = TABLE.parse_channel("+ob", &["UID1"]);
        assert_eq!(
            changes,
            vec![ModeChange::add(ChannelMode::Operator, Some("UID1".into()))]
        );
    }

    #[test]
    fn formats_in_order() {
        let (modes, params) = TABLE.format_channel(&[
            ModeChange::add(ChannelMode::Operator, Some("UID1".into())),
            ModeChange::add(ChannelMode::Voice, Some("UID1".into())),
            ModeChange::delete(ChannelMode::Key, None),
            ModeChange::delete(ChannelMode::Limit, None),
            ModeChange::add(ChannelMode::NoExternal, None),
            ModeChange::add(ChannelMode::Secret, None),
        ]);
        assert_eq!(modes, "+ov-kl+n");
        assert_eq!(params, vec!["UID1", "UID1", "*"]);
    }

    #[test]
    fn prefixes_map_to_status() {
        assert_eq!(TABLE.status_for_prefix('@'), Some(ChannelMode::Operator));
        assert_eq!(TABLE.prefix_for(ChannelMode::Voice), Some('+'));
        assert_eq!(
            TABLE.statuses_from_prefixes("@+"),
            vec![ChannelMode::Operator, ChannelMode::Voice]
        );
        assert_eq!(TABLE.status_for_prefix('%'), None);
    }

    #[test]
    fn user_modes_with_account() {
        let changes = TABLE.parse_user("+ior-o", &["rakaur"]);
        assert_eq!(changes.len(), 4);
        assert_eq!(changes[2].mode, UserMode::Account);
        assert_eq!(changes[2].param.as_deref(), Some("rakaur"));
        assert!(!changes[3].adding);
    }
}
