//! The server-to-server line grammar.
//!
//! ```text
//! [@tags] [:origin] <command> [param ...] [:trailing]
//! ```
//!
//! Server links are looser than client connections: P10 sends numeric
//! commands without a leading colon on the origin and tokens such as `EB`,
//! and InspIRCd lines can carry far more than fifteen parameters. The parser
//! therefore accepts any non-space token as a command and does not cap the
//! parameter count. Tags are skipped; no supported dialect relies on them.

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::{take_till, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    sequence::preceded,
    IResult,
};
use smallvec::SmallVec;

use crate::error::ProtocolError;

/// An owned, parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// Explicit origin (the part after a leading `:`), if any.
    pub origin: Option<String>,
    /// Command name or token, as sent.
    pub command: String,
    /// Parameters, trailing parameter last.
    pub params: Vec<String>,
    /// Always introduce the last parameter with `:` when serializing.
    pub force_trailing: bool,
}

impl Message {
    /// Build a message with no origin.
    pub fn new<I, S>(command: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            origin: None,
            command: command.into(),
            params: params.into_iter().map(Into::into).collect(),
            force_trailing: false,
        }
    }

    /// Set the origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Always write the last parameter as a trailing (`:`-prefixed) one.
    pub fn with_trailing(mut self) -> Self {
        self.force_trailing = true;
        self
    }

    /// Parameter `i`, if present.
    #[inline]
    pub fn param(&self, i: usize) -> Option<&str> {
        self.params.get(i).map(String::as_str)
    }

    /// The last parameter, if any.
    #[inline]
    pub fn last_param(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Parse one line (terminator optional).
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.trim().is_empty() {
            return Err(ProtocolError::EmptyMessage);
        }
        match parse_line(trimmed) {
            Ok((_, parsed)) => Ok(Self {
                origin: parsed.origin.map(str::to_owned),
                command: parsed.command.to_owned(),
                params: parsed.params.iter().map(|p| (*p).to_owned()).collect(),
                force_trailing: false,
            }),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                Err(ProtocolError::InvalidMessage {
                    string: trimmed.to_owned(),
                    position: trimmed.len() - e.input.len(),
                })
            }
            Err(nom::Err::Incomplete(_)) => Err(ProtocolError::InvalidMessage {
                string: trimmed.to_owned(),
                position: trimmed.len(),
            }),
        }
    }
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Message::parse(s)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(origin) = &self.origin {
            write!(f, ":{} ", origin)?;
        }
        f.write_str(&self.command)?;

        let count = self.params.len();
        for (i, param) in self.params.iter().enumerate() {
            let last = i + 1 == count;
            let needs_colon =
                param.is_empty() || param.contains(' ') || param.starts_with(':');
            if last && (self.force_trailing || needs_colon) {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct ParsedLine<'a> {
    origin: Option<&'a str>,
    command: &'a str,
    params: SmallVec<[&'a str; 16]>,
}

fn parse_tags(input: &str) -> IResult<&str, &str> {
    preceded(char('@'), take_till(|c| c == ' '))(input)
}

fn parse_origin(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

fn parse_command(input: &str) -> IResult<&str, &str> {
    take_while1(|c| c != ' ')(input)
}

/// Split the parameter section. Runs of spaces separate parameters; a
/// parameter starting with `:` swallows the rest of the line.
fn parse_params(input: &str) -> SmallVec<[&str; 16]> {
    let mut params = SmallVec::new();
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(trailing) = rest.strip_prefix(':') {
            params.push(trailing);
            break;
        }
        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    params
}

fn parse_line(input: &str) -> IResult<&str, ParsedLine<'_>> {
    let (input, _) = space0(input)?;
    let (input, _tags) = opt(parse_tags)(input)?;
    let (input, _) = space0(input)?;
    let (input, origin) = opt(parse_origin)(input)?;
    let (input, _) = space0(input)?;
    let (input, command) = parse_command(input)?;
    let params = parse_params(input);

    Ok((
        "",
        ParsedLine {
            origin,
            command,
            params,
        },
    ))
}
