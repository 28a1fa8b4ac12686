//! Serialize and deserialize the line protocol.
//!
//! Every message is a single line of whitespace separated tokens:
//!
//! ```text
//! <ip>:<port> <seqno> <ttl> <OPERATION> [arguments...]
//! ```
//!
//! | Operation | Arguments                      |
//! |-----------|--------------------------------|
//! | `HELLO`   |                                |
//! | `BYE`     |                                |
//! | `SEARCH`  | `mode relay_port key hop_count`|
//! | `VAL`     | `mode key value hop_count`     |
//! | `<OP>_OK` |                                |

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use super::PeerAddress;

const ACKNOWLEDGEMENT_SUFFIX: &str = "_OK";

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// The node that created this message.
    pub origin: PeerAddress,
    /// Unique per origin, assigned by the origin.
    pub seqno: u64,
    /// Remaining hop budget, only meaningful for [Operation::Search].
    pub ttl: i64,

    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Hello,
    Bye,
    Search(SearchArguments),
    Val(ValArguments),
    /// `<OP>_OK`, carrying the name of the acknowledged operation.
    Acknowledgement(String),
    /// Anything else, kept verbatim so it can be reported and echoed.
    Unknown {
        name: String,
        arguments: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Dissemination strategy of a search.
pub enum SearchMode {
    /// `FL`
    Flood,
    /// `RW`
    RandomWalk,
    /// `BP`
    DepthFirst,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchArguments {
    pub mode: SearchMode,
    /// Listening port of the node that relayed this message last.
    pub relay_port: u16,
    pub key: String,
    /// Relays traversed so far, starting at 1.
    pub hop_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValArguments {
    pub mode: SearchMode,
    pub key: String,
    pub value: String,
    /// Copied from the search that found the key.
    pub hop_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Identity used to detect previously seen messages.
pub struct DedupKey {
    pub origin: PeerAddress,
    pub seqno: u64,
    pub tag: DedupTag,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupTag {
    Hello,
    Bye,
    Val,
    Acknowledgement,
    /// Searches of different modes may share a seqno, so the mode is part of the key.
    Search(SearchMode),
    Unknown(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Malformed wire message or bootstrap entry.
pub enum FormatError {
    #[error("Expected at least 4 tokens, found {0}")]
    TooFewTokens(usize),

    #[error("Could not resolve address: {0:?}")]
    InvalidAddress(String),

    #[error("Invalid {field}: {value:?} is not an integer")]
    InvalidInteger { field: &'static str, value: String },

    #[error("Invalid arguments for {operation}: {arguments:?}")]
    InvalidArguments {
        operation: &'static str,
        arguments: Vec<String>,
    },

    #[error("Unknown search mode: {0:?}")]
    InvalidSearchMode(String),

    #[error("Expected a `key value` pair, found {0:?}")]
    InvalidEntry(String),
}

impl Message {
    pub fn hello(origin: PeerAddress, seqno: u64) -> Self {
        Message {
            origin,
            seqno,
            ttl: 1,
            operation: Operation::Hello,
        }
    }

    pub fn bye(origin: PeerAddress, seqno: u64) -> Self {
        Message {
            origin,
            seqno,
            ttl: 1,
            operation: Operation::Bye,
        }
    }

    /// A freshly originated search, relayed by its own origin with a hop count of 1.
    pub fn search(
        origin: PeerAddress,
        seqno: u64,
        ttl: i64,
        mode: SearchMode,
        key: impl Into<String>,
    ) -> Self {
        Message {
            origin,
            seqno,
            ttl,
            operation: Operation::Search(SearchArguments {
                mode,
                relay_port: origin.port(),
                key: key.into(),
                hop_count: 1,
            }),
        }
    }

    pub fn val(
        origin: PeerAddress,
        seqno: u64,
        mode: SearchMode,
        key: impl Into<String>,
        value: impl Into<String>,
        hop_count: u32,
    ) -> Self {
        Message {
            origin,
            seqno,
            ttl: 1,
            operation: Operation::Val(ValArguments {
                mode,
                key: key.into(),
                value: value.into(),
                hop_count,
            }),
        }
    }

    /// Parses a single line, surrounding whitespace and the line terminator are ignored.
    pub fn parse(line: &str) -> Result<Self, FormatError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if tokens.len() < 4 {
            return Err(FormatError::TooFewTokens(tokens.len()));
        }

        let origin = PeerAddress::resolve(tokens[0])?;
        let seqno = parse_integer("seqno", tokens[1])?;
        let ttl = parse_integer("ttl", tokens[2])?;
        let operation = Operation::parse(&tokens[3].to_uppercase(), &tokens[4..])?;

        Ok(Message {
            origin,
            seqno,
            ttl,
            operation,
        })
    }

    pub fn dedup_key(&self) -> DedupKey {
        let tag = match &self.operation {
            Operation::Hello => DedupTag::Hello,
            Operation::Bye => DedupTag::Bye,
            Operation::Val(_) => DedupTag::Val,
            Operation::Acknowledgement(_) => DedupTag::Acknowledgement,
            Operation::Search(arguments) => DedupTag::Search(arguments.mode),
            Operation::Unknown { name, .. } => DedupTag::Unknown(name.clone()),
        };

        DedupKey {
            origin: self.origin,
            seqno: self.seqno,
            tag,
        }
    }

    /// The `<OP>_OK` reply the receiver writes back before processing this message.
    pub fn acknowledgement(&self) -> Message {
        Message {
            origin: self.origin,
            seqno: self.seqno,
            ttl: 1,
            operation: Operation::Acknowledgement(self.operation.name().into_owned()),
        }
    }

    /// Returns `true` if `reply` acknowledges this message.
    pub fn is_acknowledged_by(&self, reply: &Message) -> bool {
        matches!(&reply.operation, Operation::Acknowledgement(name) if *name == self.operation.name())
    }

    /// The same search relayed by `relay`: one less TTL, one more hop.
    ///
    /// Returns `None` for anything but [Operation::Search].
    pub fn forward(&self, relay: PeerAddress) -> Option<Message> {
        match &self.operation {
            Operation::Search(arguments) => Some(Message {
                origin: self.origin,
                seqno: self.seqno,
                // Both come off the wire, saturate so an expired search stays expired.
                ttl: self.ttl.saturating_sub(1),
                operation: Operation::Search(SearchArguments {
                    mode: arguments.mode,
                    relay_port: relay.port(),
                    key: arguments.key.clone(),
                    hop_count: arguments.hop_count.saturating_add(1),
                }),
            }),
            _ => None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.ttl <= 0
    }
}

impl FromStr for Message {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Message::parse(s)
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.origin,
            self.seqno,
            self.ttl,
            self.operation.name()
        )?;

        match &self.operation {
            Operation::Search(arguments) => write!(
                f,
                " {} {} {} {}",
                arguments.mode, arguments.relay_port, arguments.key, arguments.hop_count
            ),
            Operation::Val(arguments) => write!(
                f,
                " {} {} {} {}",
                arguments.mode, arguments.key, arguments.value, arguments.hop_count
            ),
            Operation::Unknown { arguments, .. } => {
                for argument in arguments {
                    write!(f, " {argument}")?;
                }
                Ok(())
            }
            Operation::Hello | Operation::Bye | Operation::Acknowledgement(_) => Ok(()),
        }
    }
}

impl Operation {
    /// Upper-case operation token as it appears on the wire.
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Operation::Hello => Cow::Borrowed("HELLO"),
            Operation::Bye => Cow::Borrowed("BYE"),
            Operation::Search(_) => Cow::Borrowed("SEARCH"),
            Operation::Val(_) => Cow::Borrowed("VAL"),
            Operation::Acknowledgement(name) => {
                Cow::Owned(format!("{name}{ACKNOWLEDGEMENT_SUFFIX}"))
            }
            Operation::Unknown { name, .. } => Cow::Borrowed(name),
        }
    }

    // Arguments of operations that take none are ignored rather than rejected.
    fn parse(name: &str, arguments: &[&str]) -> Result<Self, FormatError> {
        let invalid = |operation: &'static str| FormatError::InvalidArguments {
            operation,
            arguments: arguments.iter().map(|s| s.to_string()).collect(),
        };

        Ok(match name {
            "HELLO" => Operation::Hello,
            "BYE" => Operation::Bye,
            "SEARCH" => match arguments {
                [mode, relay_port, key, hop_count] => Operation::Search(SearchArguments {
                    mode: mode.parse()?,
                    relay_port: parse_integer("relay port", relay_port)?,
                    key: key.to_string(),
                    hop_count: parse_integer("hop count", hop_count)?,
                }),
                _ => return Err(invalid("SEARCH")),
            },
            "VAL" => match arguments {
                [mode, key, value, hop_count] => Operation::Val(ValArguments {
                    mode: mode.parse()?,
                    key: key.to_string(),
                    value: value.to_string(),
                    hop_count: parse_integer("hop count", hop_count)?,
                }),
                _ => return Err(invalid("VAL")),
            },
            _ => match name.strip_suffix(ACKNOWLEDGEMENT_SUFFIX) {
                Some(acknowledged) => Operation::Acknowledgement(acknowledged.to_string()),
                None => Operation::Unknown {
                    name: name.to_string(),
                    arguments: arguments.iter().map(|s| s.to_string()).collect(),
                },
            },
        })
    }
}

impl SearchMode {
    pub const ALL: [SearchMode; 3] = [
        SearchMode::Flood,
        SearchMode::RandomWalk,
        SearchMode::DepthFirst,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Flood => "FL",
            SearchMode::RandomWalk => "RW",
            SearchMode::DepthFirst => "BP",
        }
    }
}

impl FromStr for SearchMode {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FL" => Ok(SearchMode::Flood),
            "RW" => Ok(SearchMode::RandomWalk),
            "BP" => Ok(SearchMode::DepthFirst),
            _ => Err(FormatError::InvalidSearchMode(s.to_string())),
        }
    }
}

impl Display for SearchMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_integer<T: FromStr>(field: &'static str, value: &str) -> Result<T, FormatError> {
    value.parse().map_err(|_| FormatError::InvalidInteger {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn origin() -> PeerAddress {
        PeerAddress::resolve("127.0.0.1:5000").unwrap()
    }

    #[test]
    fn parse_search() {
        let message = Message::parse("127.0.0.1:5000 3 100 search FL 5001 apple 2\n").unwrap();

        assert_eq!(message.origin, origin());
        assert_eq!(message.seqno, 3);
        assert_eq!(message.ttl, 100);
        assert_eq!(
            message.operation,
            Operation::Search(SearchArguments {
                mode: SearchMode::Flood,
                relay_port: 5001,
                key: "apple".to_string(),
                hop_count: 2,
            })
        );
    }

    #[test]
    fn round_trip() {
        let messages = [
            Message::hello(origin(), 1),
            Message::bye(origin(), 7),
            Message::search(origin(), 2, 100, SearchMode::DepthFirst, "apple"),
            Message::val(origin(), 4, SearchMode::RandomWalk, "apple", "red", 3),
            Message::hello(origin(), 9).acknowledgement(),
            Message {
                origin: origin(),
                seqno: 5,
                ttl: -2,
                operation: Operation::Unknown {
                    name: "PING".to_string(),
                    arguments: vec!["a".to_string(), "b".to_string()],
                },
            },
        ];

        for message in messages {
            let line = message.to_string();
            assert_eq!(Message::parse(&line).unwrap(), message, "{line}");
        }
    }

    #[test]
    fn serialize_search() {
        let message = Message::search(origin(), 2, 100, SearchMode::RandomWalk, "apple");

        assert_eq!(message.to_string(), "127.0.0.1:5000 2 100 SEARCH RW 5000 apple 1");
    }

    #[test]
    fn reject_malformed() {
        assert_eq!(
            Message::parse("127.0.0.1:5000 1 1"),
            Err(FormatError::TooFewTokens(3))
        );
        assert!(matches!(
            Message::parse("nowhere 1 1 HELLO"),
            Err(FormatError::InvalidAddress(_))
        ));
        assert!(matches!(
            Message::parse("127.0.0.1:5000 one 1 HELLO"),
            Err(FormatError::InvalidInteger { field: "seqno", .. })
        ));
        assert!(matches!(
            Message::parse("127.0.0.1:5000 1 x HELLO"),
            Err(FormatError::InvalidInteger { field: "ttl", .. })
        ));
        assert!(matches!(
            Message::parse("127.0.0.1:5000 1 1 SEARCH FL 5001 apple"),
            Err(FormatError::InvalidArguments { operation: "SEARCH", .. })
        ));
        assert!(matches!(
            Message::parse("127.0.0.1:5000 1 1 SEARCH XX 5001 apple 1"),
            Err(FormatError::InvalidSearchMode(_))
        ));
    }

    #[test]
    fn acknowledgement() {
        let message = Message::search(origin(), 8, 50, SearchMode::Flood, "apple");
        let ack = message.acknowledgement();

        assert_eq!(ack.to_string(), "127.0.0.1:5000 8 1 SEARCH_OK");
        assert!(message.is_acknowledged_by(&ack));
        assert!(!Message::hello(origin(), 8).is_acknowledged_by(&ack));
    }

    #[test]
    fn forward_decrements_ttl_and_increments_hops() {
        let relay = PeerAddress::resolve("127.0.0.1:6000").unwrap();
        let message = Message::search(origin(), 2, 3, SearchMode::Flood, "apple");

        let forwarded = message.forward(relay).unwrap();

        assert_eq!(forwarded.ttl, 2);
        assert_eq!(forwarded.dedup_key(), message.dedup_key());
        match forwarded.operation {
            Operation::Search(arguments) => {
                assert_eq!(arguments.relay_port, 6000);
                assert_eq!(arguments.hop_count, 2);
                assert_eq!(arguments.mode, SearchMode::Flood);
            }
            _ => panic!("forwarded message is not a search"),
        }

        assert!(Message::hello(origin(), 1).forward(relay).is_none());
    }

    #[test]
    fn expiry() {
        let relay = origin();
        let message = Message::search(origin(), 2, 1, SearchMode::Flood, "apple");

        assert!(!message.is_expired());
        assert!(message.forward(relay).unwrap().is_expired());
    }

    #[test]
    fn forward_saturates_extreme_values() {
        let relay = origin();

        let message =
            Message::parse("127.0.0.1:9 1 -9223372036854775808 SEARCH FL 2 apple 1").unwrap();
        let forwarded = message.forward(relay).unwrap();
        assert_eq!(forwarded.ttl, i64::MIN);
        assert!(forwarded.is_expired());

        let message = Message::parse("127.0.0.1:9 1 5 SEARCH FL 2 apple 4294967295").unwrap();
        match message.forward(relay).unwrap().operation {
            Operation::Search(arguments) => assert_eq!(arguments.hop_count, u32::MAX),
            _ => panic!("forwarded message is not a search"),
        }
    }

    #[test]
    fn dedup_key_includes_search_mode() {
        let flood = Message::search(origin(), 2, 10, SearchMode::Flood, "apple");
        let walk = Message::search(origin(), 2, 10, SearchMode::RandomWalk, "apple");

        assert_ne!(flood.dedup_key(), walk.dedup_key());
        assert_eq!(
            Message::hello(origin(), 2).dedup_key().tag,
            DedupTag::Hello
        );
    }
}
