//! Commands, replies and pipelines.

use crate::adapter::{ScoreBound, ScoreLimit};
use std::collections::HashMap;

/// A single store command.
///
/// Commands mirror the Redis command set that docmap relies on. Every
/// direct call on a [`crate::ClientAdapter`] is a one-command pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `GET key`
    Get {
        /// Key to read.
        key: String,
    },
    /// `SET key value` (clears any TTL)
    Set {
        /// Key to write.
        key: String,
        /// Value to store.
        value: String,
    },
    /// `EXISTS key`
    Exists {
        /// Key to test.
        key: String,
    },
    /// `DEL key [key ...]`
    Del {
        /// Keys to delete.
        keys: Vec<String>,
    },
    /// `RENAME from to`
    Rename {
        /// Source key.
        from: String,
        /// Destination key.
        to: String,
    },
    /// `EXPIRE key seconds`
    Expire {
        /// Key to expire.
        key: String,
        /// Time to live in seconds.
        seconds: u64,
    },
    /// `TTL key`
    Ttl {
        /// Key to inspect.
        key: String,
    },
    /// `HGETALL key`
    HGetAll {
        /// Hash key.
        key: String,
    },
    /// `HSET key field value [field value ...]`
    HSetMany {
        /// Hash key.
        key: String,
        /// Field/value pairs.
        fields: Vec<(String, String)>,
    },
    /// `HMGET key field [field ...]`
    HMGet {
        /// Hash key.
        key: String,
        /// Fields to read.
        fields: Vec<String>,
    },
    /// `SADD key member [member ...]`
    SAdd {
        /// Set key.
        key: String,
        /// Members to add.
        members: Vec<String>,
    },
    /// `SREM key member [member ...]`
    SRem {
        /// Set key.
        key: String,
        /// Members to remove.
        members: Vec<String>,
    },
    /// `SMEMBERS key`
    SMembers {
        /// Set key.
        key: String,
    },
    /// `SCARD key`
    SCard {
        /// Set key.
        key: String,
    },
    /// `SINTERSTORE destination key [key ...]`
    SInterStore {
        /// Destination key.
        destination: String,
        /// Source set keys.
        keys: Vec<String>,
    },
    /// `ZADD key score member`
    ZAdd {
        /// Sorted set key.
        key: String,
        /// Member score.
        score: f64,
        /// Member to add or update.
        member: String,
    },
    /// `ZREM key member [member ...]`
    ZRem {
        /// Sorted set key.
        key: String,
        /// Members to remove.
        members: Vec<String>,
    },
    /// `ZCARD key`
    ZCard {
        /// Sorted set key.
        key: String,
    },
    /// `ZCOUNT key min max`
    ZCount {
        /// Sorted set key.
        key: String,
        /// Lower score bound.
        min: ScoreBound,
        /// Upper score bound.
        max: ScoreBound,
    },
    /// `ZRANGEBYSCORE key min max [LIMIT offset count]`
    ZRangeByScore {
        /// Sorted set key.
        key: String,
        /// Lower score bound.
        min: ScoreBound,
        /// Upper score bound.
        max: ScoreBound,
        /// Optional store-side pagination.
        limit: Option<ScoreLimit>,
    },
}

impl Command {
    /// Returns the Redis command name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Get { .. } => "GET",
            Self::Set { .. } => "SET",
            Self::Exists { .. } => "EXISTS",
            Self::Del { .. } => "DEL",
            Self::Rename { .. } => "RENAME",
            Self::Expire { .. } => "EXPIRE",
            Self::Ttl { .. } => "TTL",
            Self::HGetAll { .. } => "HGETALL",
            Self::HSetMany { .. } => "HSET",
            Self::HMGet { .. } => "HMGET",
            Self::SAdd { .. } => "SADD",
            Self::SRem { .. } => "SREM",
            Self::SMembers { .. } => "SMEMBERS",
            Self::SCard { .. } => "SCARD",
            Self::SInterStore { .. } => "SINTERSTORE",
            Self::ZAdd { .. } => "ZADD",
            Self::ZRem { .. } => "ZREM",
            Self::ZCard { .. } => "ZCARD",
            Self::ZCount { .. } => "ZCOUNT",
            Self::ZRangeByScore { .. } => "ZRANGEBYSCORE",
        }
    }

    /// Returns true if the command mutates the store.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Set { .. }
                | Self::Del { .. }
                | Self::Rename { .. }
                | Self::Expire { .. }
                | Self::HSetMany { .. }
                | Self::SAdd { .. }
                | Self::SRem { .. }
                | Self::SInterStore { .. }
                | Self::ZAdd { .. }
                | Self::ZRem { .. }
        )
    }
}

/// A reply to one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Absent value (`GET` on a missing key).
    Nil,
    /// Simple status reply (`OK`).
    Status(String),
    /// Integer reply.
    Integer(i64),
    /// Bulk string reply.
    Bulk(String),
    /// Multi-bulk reply of strings.
    Array(Vec<String>),
    /// Multi-bulk reply where entries may be absent (`HMGET`).
    OptionalArray(Vec<Option<String>>),
    /// Field/value reply (`HGETALL`).
    Hash(HashMap<String, String>),
}

impl Reply {
    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts a bulk/nil reply into an optional string.
    #[must_use]
    pub fn into_bulk(self) -> Option<String> {
        match self {
            Self::Bulk(s) => Some(s),
            _ => None,
        }
    }

    /// Converts an array reply into its members (nil becomes empty).
    #[must_use]
    pub fn into_array(self) -> Vec<String> {
        match self {
            Self::Array(items) => items,
            Self::OptionalArray(items) => items.into_iter().flatten().collect(),
            _ => Vec::new(),
        }
    }

    /// Converts an `HMGET` reply into its optional entries.
    #[must_use]
    pub fn into_optional_array(self) -> Vec<Option<String>> {
        match self {
            Self::OptionalArray(items) => items,
            Self::Array(items) => items.into_iter().map(Some).collect(),
            _ => Vec::new(),
        }
    }

    /// Converts an `HGETALL` reply into its field map.
    #[must_use]
    pub fn into_hash(self) -> HashMap<String, String> {
        match self {
            Self::Hash(map) => map,
            _ => HashMap::new(),
        }
    }
}

/// An ordered batch of commands sent as one round trip.
///
/// Replies come back in the order commands were queued.
///
/// ```rust
/// use docmap_store::Pipeline;
///
/// let mut pipeline = Pipeline::new();
/// pipeline.set("a", "1").expire("a", 60);
/// assert_eq!(pipeline.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pipeline holding one command.
    #[must_use]
    pub fn single(command: Command) -> Self {
        Self {
            commands: vec![command],
        }
    }

    /// Queues a raw command.
    pub fn push(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Appends every command of `other`.
    pub fn extend(&mut self, other: Pipeline) -> &mut Self {
        self.commands.extend(other.commands);
        self
    }

    /// Returns the number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns the queued commands.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Consumes the pipeline, returning its commands.
    #[must_use]
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    /// Returns the number of mutating commands.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_write()).count()
    }

    /// Queues `GET`.
    pub fn get(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::Get { key: key.into() })
    }

    /// Queues `SET`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push(Command::Set {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Queues `DEL` for a single key.
    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::Del {
            keys: vec![key.into()],
        })
    }

    /// Queues `EXPIRE`.
    pub fn expire(&mut self, key: impl Into<String>, seconds: u64) -> &mut Self {
        self.push(Command::Expire {
            key: key.into(),
            seconds,
        })
    }

    /// Queues `HGETALL`.
    pub fn hgetall(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::HGetAll { key: key.into() })
    }

    /// Queues `HSET` with several field/value pairs.
    pub fn hset_many(&mut self, key: impl Into<String>, fields: Vec<(String, String)>) -> &mut Self {
        self.push(Command::HSetMany {
            key: key.into(),
            fields,
        })
    }

    /// Queues `HMGET`.
    pub fn hmget(&mut self, key: impl Into<String>, fields: Vec<String>) -> &mut Self {
        self.push(Command::HMGet {
            key: key.into(),
            fields,
        })
    }

    /// Queues `SADD`.
    pub fn sadd<I, S>(&mut self, key: impl Into<String>, members: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Command::SAdd {
            key: key.into(),
            members: members.into_iter().map(Into::into).collect(),
        })
    }

    /// Queues `SREM`.
    pub fn srem<I, S>(&mut self, key: impl Into<String>, members: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Command::SRem {
            key: key.into(),
            members: members.into_iter().map(Into::into).collect(),
        })
    }

    /// Queues `SMEMBERS`.
    pub fn smembers(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::SMembers { key: key.into() })
    }

    /// Queues `SCARD`.
    pub fn scard(&mut self, key: impl Into<String>) -> &mut Self {
        self.push(Command::SCard { key: key.into() })
    }

    /// Queues `SINTERSTORE`.
    pub fn sinterstore(&mut self, destination: impl Into<String>, keys: Vec<String>) -> &mut Self {
        self.push(Command::SInterStore {
            destination: destination.into(),
            keys,
        })
    }

    /// Queues `ZADD` for one member.
    pub fn zadd(&mut self, key: impl Into<String>, score: f64, member: impl Into<String>) -> &mut Self {
        self.push(Command::ZAdd {
            key: key.into(),
            score,
            member: member.into(),
        })
    }

    /// Queues `ZREM` for one member.
    pub fn zrem(&mut self, key: impl Into<String>, member: impl Into<String>) -> &mut Self {
        self.push(Command::ZRem {
            key: key.into(),
            members: vec![member.into()],
        })
    }
}
