//! Client adapter trait definition.

use crate::error::{StoreError, StoreResult};
use crate::pipeline::{Command, Pipeline, Reply};
use std::collections::HashMap;
use std::fmt;

/// One bound of a sorted-set score range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ScoreBound {
    /// No bound (`-inf` / `+inf`).
    #[default]
    Unbounded,
    /// Bound that admits the score itself.
    Inclusive(f64),
    /// Bound that excludes the score itself (`(score`).
    Exclusive(f64),
}

impl ScoreBound {
    /// Creates a bound, inclusive or exclusive.
    #[must_use]
    pub const fn new(score: f64, inclusive: bool) -> Self {
        if inclusive {
            Self::Inclusive(score)
        } else {
            Self::Exclusive(score)
        }
    }

    /// Returns true if `score` satisfies this bound used as a minimum.
    #[must_use]
    pub fn admits_from_below(&self, score: f64) -> bool {
        match *self {
            Self::Unbounded => true,
            Self::Inclusive(min) => score >= min,
            Self::Exclusive(min) => score > min,
        }
    }

    /// Returns true if `score` satisfies this bound used as a maximum.
    #[must_use]
    pub fn admits_from_above(&self, score: f64) -> bool {
        match *self {
            Self::Unbounded => true,
            Self::Inclusive(max) => score <= max,
            Self::Exclusive(max) => score < max,
        }
    }

    /// Renders the bound in Redis syntax for the given side.
    #[must_use]
    pub fn to_redis(&self, is_min: bool) -> String {
        match *self {
            Self::Unbounded if is_min => "-inf".to_string(),
            Self::Unbounded => "+inf".to_string(),
            Self::Inclusive(score) => score.to_string(),
            Self::Exclusive(score) => format!("({score}"),
        }
    }
}

/// Store-side pagination for range reads (`LIMIT offset count`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreLimit {
    /// Number of matching members to skip.
    pub offset: usize,
    /// Maximum members to return; `None` means all remaining.
    pub count: Option<usize>,
}

impl ScoreLimit {
    /// Creates a limit.
    #[must_use]
    pub const fn new(offset: usize, count: Option<usize>) -> Self {
        Self { offset, count }
    }
}

/// Result of one cursor-scan step.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScanPage {
    /// Cursor for the next step; `0` means the iteration is complete.
    pub cursor: u64,
    /// Keys returned by this step.
    pub keys: Vec<String>,
}

impl ScanPage {
    /// Returns true if this was the final step.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.cursor == 0
    }
}

impl fmt::Display for ScoreBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::Inclusive(score) => write!(f, "[{score}"),
            Self::Exclusive(score) => write!(f, "({score}"),
        }
    }
}

/// Uniform interface over a Redis-style key-value protocol.
///
/// Adapters are **protocol plumbing**. They execute commands and return
/// replies; docmap owns all key layout and document interpretation.
///
/// # Required methods
///
/// Only [`execute`](ClientAdapter::execute) and [`scan`](ClientAdapter::scan)
/// must be implemented. Every direct operation has a default body that sends
/// a one-command pipeline and converts the reply.
///
/// # Invariants
///
/// - `execute` returns exactly one reply per command, in queue order
/// - `scan` never returns more than roughly `count` keys per call and never
///   blocks the store for the whole keyspace
/// - Adapters must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::InMemoryAdapter`] - For testing
pub trait ClientAdapter: Send + Sync {
    /// Executes a pipeline and returns ordered per-command replies.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects a command or the connection
    /// fails. Commands already applied before the failure are not rolled back.
    fn execute(&self, pipeline: Pipeline) -> StoreResult<Vec<Reply>>;

    /// Performs one cursor-scan step over keys matching `pattern`.
    ///
    /// Start with cursor `0`; iteration is complete when the returned
    /// cursor is `0` again.
    ///
    /// # Errors
    ///
    /// Returns an error if the cursor is invalid or the connection fails.
    fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage>;

    /// Reads a string value.
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(single(self, Command::Get { key: key.into() })?.into_bulk())
    }

    /// Writes a string value.
    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        single(
            self,
            Command::Set {
                key: key.into(),
                value: value.into(),
            },
        )?;
        Ok(())
    }

    /// Returns true if the key exists.
    fn exists(&self, key: &str) -> StoreResult<bool> {
        integer(self, Command::Exists { key: key.into() }).map(|n| n > 0)
    }

    /// Deletes keys, returning how many existed.
    fn del(&self, keys: &[String]) -> StoreResult<usize> {
        count(self, Command::Del { keys: keys.to_vec() })
    }

    /// Renames a key.
    fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        single(
            self,
            Command::Rename {
                from: from.into(),
                to: to.into(),
            },
        )?;
        Ok(())
    }

    /// Sets a time-to-live; returns false if the key does not exist.
    fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool> {
        integer(
            self,
            Command::Expire {
                key: key.into(),
                seconds,
            },
        )
        .map(|n| n > 0)
    }

    /// Returns the remaining time-to-live in seconds.
    ///
    /// `None` if the key is missing or has no expiry.
    fn ttl(&self, key: &str) -> StoreResult<Option<u64>> {
        let n = integer(self, Command::Ttl { key: key.into() })?;
        Ok(u64::try_from(n).ok())
    }

    /// Reads every field of a hash.
    fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        Ok(single(self, Command::HGetAll { key: key.into() })?.into_hash())
    }

    /// Writes several hash fields.
    fn hset_many(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        single(
            self,
            Command::HSetMany {
                key: key.into(),
                fields: fields.to_vec(),
            },
        )?;
        Ok(())
    }

    /// Reads several hash fields.
    fn hmget(&self, key: &str, fields: &[String]) -> StoreResult<Vec<Option<String>>> {
        Ok(single(
            self,
            Command::HMGet {
                key: key.into(),
                fields: fields.to_vec(),
            },
        )?
        .into_optional_array())
    }

    /// Adds members to a set, returning how many were new.
    fn sadd(&self, key: &str, members: &[String]) -> StoreResult<usize> {
        count(
            self,
            Command::SAdd {
                key: key.into(),
                members: members.to_vec(),
            },
        )
    }

    /// Removes members from a set, returning how many were present.
    fn srem(&self, key: &str, members: &[String]) -> StoreResult<usize> {
        count(
            self,
            Command::SRem {
                key: key.into(),
                members: members.to_vec(),
            },
        )
    }

    /// Returns every member of a set.
    fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(single(self, Command::SMembers { key: key.into() })?.into_array())
    }

    /// Returns the cardinality of a set.
    fn scard(&self, key: &str) -> StoreResult<usize> {
        count(self, Command::SCard { key: key.into() })
    }

    /// Stores the intersection of `keys` into `destination`.
    fn sinterstore(&self, destination: &str, keys: &[String]) -> StoreResult<usize> {
        count(
            self,
            Command::SInterStore {
                destination: destination.into(),
                keys: keys.to_vec(),
            },
        )
    }

    /// Adds or updates a sorted-set member.
    fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<usize> {
        count(
            self,
            Command::ZAdd {
                key: key.into(),
                score,
                member: member.into(),
            },
        )
    }

    /// Removes sorted-set members.
    fn zrem(&self, key: &str, members: &[String]) -> StoreResult<usize> {
        count(
            self,
            Command::ZRem {
                key: key.into(),
                members: members.to_vec(),
            },
        )
    }

    /// Returns the cardinality of a sorted set.
    fn zcard(&self, key: &str) -> StoreResult<usize> {
        count(self, Command::ZCard { key: key.into() })
    }

    /// Counts members with scores inside the bounds.
    fn zcount(&self, key: &str, min: ScoreBound, max: ScoreBound) -> StoreResult<usize> {
        count(
            self,
            Command::ZCount {
                key: key.into(),
                min,
                max,
            },
        )
    }

    /// Returns members with scores inside the bounds, ascending by score.
    fn zrange_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
        limit: Option<ScoreLimit>,
    ) -> StoreResult<Vec<String>> {
        Ok(single(
            self,
            Command::ZRangeByScore {
                key: key.into(),
                min,
                max,
                limit,
            },
        )?
        .into_array())
    }
}

fn single<A: ClientAdapter + ?Sized>(adapter: &A, command: Command) -> StoreResult<Reply> {
    let name = command.name();
    adapter
        .execute(Pipeline::single(command))?
        .pop()
        .ok_or_else(|| StoreError::unexpected_reply(name, "no reply"))
}

fn integer<A: ClientAdapter + ?Sized>(adapter: &A, command: Command) -> StoreResult<i64> {
    let name = command.name();
    match single(adapter, command)? {
        Reply::Integer(n) => Ok(n),
        other => Err(StoreError::unexpected_reply(name, other)),
    }
}

fn count<A: ClientAdapter + ?Sized>(adapter: &A, command: Command) -> StoreResult<usize> {
    let name = command.name();
    let n = integer(adapter, command)?;
    usize::try_from(n).map_err(|_| StoreError::unexpected_reply(name, n))
}
