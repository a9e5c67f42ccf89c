//! In-memory adapter for testing.

use crate::adapter::{ClientAdapter, ScanPage, ScoreBound, ScoreLimit};
use crate::error::{StoreError, StoreResult};
use crate::pattern::pattern_matches;
use crate::pipeline::{Command, Pipeline, Reply};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A value held by the in-memory adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    /// Plain string.
    String(String),
    /// Hash of field → value.
    Hash(BTreeMap<String, String>),
    /// Unordered set (kept sorted for deterministic dumps).
    Set(BTreeSet<String>),
    /// Sorted set of member → score.
    SortedSet(BTreeMap<String, f64>),
}

impl StoredValue {
    fn is_empty_container(&self) -> bool {
        match self {
            Self::String(_) => false,
            Self::Hash(h) => h.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::SortedSet(z) => z.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

/// Call counters for an [`InMemoryAdapter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdapterStats {
    /// Pipelines executed (direct calls count as one-command pipelines).
    pub pipelines: u64,
    /// Individual commands executed.
    pub commands: u64,
    /// Mutating commands executed.
    pub writes: u64,
    /// Scan steps performed.
    pub scans: u64,
    /// Largest number of keys examined by a single scan step.
    pub max_scan_step: u64,
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: BTreeMap<String, Entry>,
    /// Open scan cursors → last key returned.
    cursors: HashMap<u64, String>,
    next_cursor: u64,
}

/// An in-memory key-value store implementing [`ClientAdapter`].
///
/// This adapter follows Redis semantics closely enough for docmap and is
/// suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need a server
///
/// Expired keys are purged lazily on access. A pipeline executes under one
/// lock, so no other caller observes it half-applied.
///
/// # Thread Safety
///
/// This adapter is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use docmap_store::{ClientAdapter, InMemoryAdapter};
///
/// let store = InMemoryAdapter::new();
/// store.sadd("s", &["a".to_string(), "b".to_string()]).unwrap();
/// assert_eq!(store.scard("s").unwrap(), 2);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryAdapter {
    keyspace: Mutex<Keyspace>,
    pipelines: AtomicU64,
    commands: AtomicU64,
    writes: AtomicU64,
    scans: AtomicU64,
    max_scan_step: AtomicU64,
}

impl InMemoryAdapter {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every live key and value.
    ///
    /// Useful for asserting that an operation left the store untouched.
    #[must_use]
    pub fn dump(&self) -> BTreeMap<String, StoredValue> {
        let mut keyspace = self.keyspace.lock();
        keyspace.purge_expired();
        keyspace
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect()
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut keyspace = self.keyspace.lock();
        keyspace.purge_expired();
        keyspace.entries.len()
    }

    /// Returns true if the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every key.
    pub fn flush_all(&self) {
        let mut keyspace = self.keyspace.lock();
        keyspace.entries.clear();
        keyspace.cursors.clear();
    }

    /// Returns call counters.
    #[must_use]
    pub fn stats(&self) -> AdapterStats {
        AdapterStats {
            pipelines: self.pipelines.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            scans: self.scans.load(Ordering::Relaxed),
            max_scan_step: self.max_scan_step.load(Ordering::Relaxed),
        }
    }

    /// Resets call counters to zero.
    pub fn reset_stats(&self) {
        for counter in [
            &self.pipelines,
            &self.commands,
            &self.writes,
            &self.scans,
            &self.max_scan_step,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl ClientAdapter for InMemoryAdapter {
    fn execute(&self, pipeline: Pipeline) -> StoreResult<Vec<Reply>> {
        self.pipelines.fetch_add(1, Ordering::Relaxed);
        let commands = pipeline.into_commands();
        tracing::trace!(commands = commands.len(), "executing pipeline");
        let mut keyspace = self.keyspace.lock();
        let mut replies = Vec::with_capacity(commands.len());

        for command in commands {
            self.commands.fetch_add(1, Ordering::Relaxed);
            if command.is_write() {
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
            replies.push(keyspace.apply(command)?);
        }

        Ok(replies)
    }

    fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let step = count.max(1);
        self.max_scan_step
            .fetch_max(step as u64, Ordering::Relaxed);

        let mut keyspace = self.keyspace.lock();
        keyspace.scan(cursor, pattern, step)
    }
}

impl Keyspace {
    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.entries
            .retain(|_, e| e.expires_at.map_or(true, |at| at > now));
    }

    /// Returns the live entry for `key`, dropping it if expired.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self
            .entries
            .get(key)
            .is_some_and(|e| e.value.is_empty_container())
        {
            self.entries.remove(key);
        }
    }

    fn hash_mut(&mut self, key: &str) -> StoreResult<&mut BTreeMap<String, String>> {
        if self.live(key).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: StoredValue::Hash(BTreeMap::new()),
                    expires_at: None,
                },
            );
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(StoredValue::Hash(h)) => Ok(h),
            _ => Err(StoreError::wrong_type(key)),
        }
    }

    fn set_mut(&mut self, key: &str) -> StoreResult<&mut BTreeSet<String>> {
        if self.live(key).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: StoredValue::Set(BTreeSet::new()),
                    expires_at: None,
                },
            );
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(StoredValue::Set(s)) => Ok(s),
            _ => Err(StoreError::wrong_type(key)),
        }
    }

    fn zset_mut(&mut self, key: &str) -> StoreResult<&mut BTreeMap<String, f64>> {
        if self.live(key).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    value: StoredValue::SortedSet(BTreeMap::new()),
                    expires_at: None,
                },
            );
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(StoredValue::SortedSet(z)) => Ok(z),
            _ => Err(StoreError::wrong_type(key)),
        }
    }

    fn read_set(&mut self, key: &str) -> StoreResult<Option<BTreeSet<String>>> {
        match self.live(key).map(|e| &e.value) {
            None => Ok(None),
            Some(StoredValue::Set(s)) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::wrong_type(key)),
        }
    }

    fn read_zset(&mut self, key: &str) -> StoreResult<Option<&BTreeMap<String, f64>>> {
        match self.live(key).map(|e| &e.value) {
            None => Ok(None),
            Some(StoredValue::SortedSet(z)) => Ok(Some(z)),
            Some(_) => Err(StoreError::wrong_type(key)),
        }
    }

    fn apply(&mut self, command: Command) -> StoreResult<Reply> {
        match command {
            Command::Get { key } => match self.live(&key).map(|e| &e.value) {
                None => Ok(Reply::Nil),
                Some(StoredValue::String(s)) => Ok(Reply::Bulk(s.clone())),
                Some(_) => Err(StoreError::wrong_type(key)),
            },
            Command::Set { key, value } => {
                self.entries.insert(
                    key,
                    Entry {
                        value: StoredValue::String(value),
                        expires_at: None,
                    },
                );
                Ok(Reply::Status("OK".into()))
            }
            Command::Exists { key } => Ok(Reply::Integer(i64::from(self.live(&key).is_some()))),
            Command::Del { keys } => {
                let mut removed = 0;
                for key in keys {
                    if self.live(&key).is_some() {
                        self.entries.remove(&key);
                        removed += 1;
                    }
                }
                Ok(Reply::Integer(removed))
            }
            Command::Rename { from, to } => {
                if self.live(&from).is_none() {
                    return Err(StoreError::NoSuchKey { key: from });
                }
                if let Some(entry) = self.entries.remove(&from) {
                    self.entries.insert(to, entry);
                }
                Ok(Reply::Status("OK".into()))
            }
            Command::Expire { key, seconds } => match self.live(&key) {
                Some(entry) => {
                    entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
                    Ok(Reply::Integer(1))
                }
                None => Ok(Reply::Integer(0)),
            },
            Command::Ttl { key } => match self.live(&key) {
                None => Ok(Reply::Integer(-2)),
                Some(Entry {
                    expires_at: None, ..
                }) => Ok(Reply::Integer(-1)),
                Some(Entry {
                    expires_at: Some(at),
                    ..
                }) => {
                    let remaining = at.saturating_duration_since(Instant::now());
                    // Round up like Redis so a fresh EXPIRE 30 reports 30.
                    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                    Ok(Reply::Integer(i64::try_from(secs).unwrap_or(i64::MAX)))
                }
            },
            Command::HGetAll { key } => match self.live(&key).map(|e| &e.value) {
                None => Ok(Reply::Hash(HashMap::new())),
                Some(StoredValue::Hash(h)) => Ok(Reply::Hash(
                    h.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                )),
                Some(_) => Err(StoreError::wrong_type(key)),
            },
            Command::HSetMany { key, fields } => {
                if fields.is_empty() {
                    return Err(StoreError::InvalidArgument(
                        "HSET requires at least one field".into(),
                    ));
                }
                let hash = self.hash_mut(&key)?;
                let mut added = 0;
                for (field, value) in fields {
                    if hash.insert(field, value).is_none() {
                        added += 1;
                    }
                }
                Ok(Reply::Integer(added))
            }
            Command::HMGet { key, fields } => match self.live(&key).map(|e| &e.value) {
                None => Ok(Reply::OptionalArray(vec![None; fields.len()])),
                Some(StoredValue::Hash(h)) => Ok(Reply::OptionalArray(
                    fields.iter().map(|f| h.get(f).cloned()).collect(),
                )),
                Some(_) => Err(StoreError::wrong_type(key)),
            },
            Command::SAdd { key, members } => {
                let set = self.set_mut(&key)?;
                let added = members.into_iter().filter(|m| set.insert(m.clone())).count();
                self.drop_if_empty(&key);
                Ok(Reply::Integer(added as i64))
            }
            Command::SRem { key, members } => {
                let removed = match self.live(&key).map(|e| &mut e.value) {
                    None => 0,
                    Some(StoredValue::Set(set)) => {
                        members.iter().filter(|m| set.remove(m.as_str())).count()
                    }
                    Some(_) => return Err(StoreError::wrong_type(key)),
                };
                self.drop_if_empty(&key);
                Ok(Reply::Integer(removed as i64))
            }
            Command::SMembers { key } => Ok(Reply::Array(
                self.read_set(&key)?
                    .map(|s| s.into_iter().collect())
                    .unwrap_or_default(),
            )),
            Command::SCard { key } => Ok(Reply::Integer(
                self.read_set(&key)?.map_or(0, |s| s.len()) as i64,
            )),
            Command::SInterStore { destination, keys } => {
                let mut result: Option<BTreeSet<String>> = None;
                for key in &keys {
                    let set = self.read_set(key)?.unwrap_or_default();
                    result = Some(match result {
                        None => set,
                        Some(acc) => acc.intersection(&set).cloned().collect(),
                    });
                }
                let result = result.unwrap_or_default();
                let len = result.len() as i64;
                self.entries.remove(&destination);
                if !result.is_empty() {
                    self.entries.insert(
                        destination,
                        Entry {
                            value: StoredValue::Set(result),
                            expires_at: None,
                        },
                    );
                }
                Ok(Reply::Integer(len))
            }
            Command::ZAdd { key, score, member } => {
                if score.is_nan() {
                    return Err(StoreError::InvalidArgument("score is not a number".into()));
                }
                let zset = self.zset_mut(&key)?;
                let added = zset.insert(member, score).is_none();
                Ok(Reply::Integer(i64::from(added)))
            }
            Command::ZRem { key, members } => {
                let removed = match self.live(&key).map(|e| &mut e.value) {
                    None => 0,
                    Some(StoredValue::SortedSet(zset)) => members
                        .iter()
                        .filter(|m| zset.remove(m.as_str()).is_some())
                        .count(),
                    Some(_) => return Err(StoreError::wrong_type(key)),
                };
                self.drop_if_empty(&key);
                Ok(Reply::Integer(removed as i64))
            }
            Command::ZCard { key } => Ok(Reply::Integer(
                self.read_zset(&key)?.map_or(0, BTreeMap::len) as i64,
            )),
            Command::ZCount { key, min, max } => {
                let count = self
                    .read_zset(&key)?
                    .map_or(0, |z| ranked(z, min, max).len());
                Ok(Reply::Integer(count as i64))
            }
            Command::ZRangeByScore {
                key,
                min,
                max,
                limit,
            } => {
                let members = match self.read_zset(&key)? {
                    None => Vec::new(),
                    Some(zset) => {
                        let ranked = ranked(zset, min, max);
                        let ScoreLimit { offset, count } = limit.unwrap_or_default();
                        ranked
                            .into_iter()
                            .skip(offset)
                            .take(count.unwrap_or(usize::MAX))
                            .map(|(member, _)| member)
                            .collect()
                    }
                };
                Ok(Reply::Array(members))
            }
        }
    }

    fn scan(&mut self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let start = if cursor == 0 {
            Bound::Unbounded
        } else {
            let last = self
                .cursors
                .remove(&cursor)
                .ok_or_else(|| StoreError::InvalidArgument(format!("invalid cursor {cursor}")))?;
            Bound::Excluded(last)
        };

        let now = Instant::now();
        let mut examined = 0;
        let mut last_key = None;
        let mut keys = Vec::new();
        let mut exhausted = true;

        for (key, entry) in self.entries.range::<String, _>((start, Bound::Unbounded)) {
            if examined == count {
                exhausted = false;
                break;
            }
            examined += 1;
            last_key = Some(key.clone());
            if entry.expires_at.is_some_and(|at| at <= now) {
                continue;
            }
            if pattern_matches(pattern, key) {
                keys.push(key.clone());
            }
        }

        let next = match (exhausted, last_key) {
            (false, Some(last)) => {
                self.next_cursor += 1;
                let id = self.next_cursor;
                self.cursors.insert(id, last);
                id
            }
            _ => 0,
        };

        Ok(ScanPage { cursor: next, keys })
    }
}

/// Members inside the bounds, ordered by (score, member) like Redis.
fn ranked(zset: &BTreeMap<String, f64>, min: ScoreBound, max: ScoreBound) -> Vec<(String, f64)> {
    let mut members: Vec<(String, f64)> = zset
        .iter()
        .filter(|(_, &s)| min.admits_from_below(s) && max.admits_from_above(s))
        .map(|(m, &s)| (m.clone(), s))
        .collect();
    members.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    members
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryAdapter::new();
        assert!(store.is_empty());
        assert!(store.dump().is_empty());
    }

    #[test]
    fn string_set_get_delete() {
        let store = InMemoryAdapter::new();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
        assert!(store.exists("k").unwrap());
        assert_eq!(store.del(&strings(&["k", "missing"])).unwrap(), 1);
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn rename_moves_value() {
        let store = InMemoryAdapter::new();
        store.set("a", "1").unwrap();
        store.rename("a", "b").unwrap();
        assert!(!store.exists("a").unwrap());
        assert_eq!(store.get("b").unwrap().as_deref(), Some("1"));
        assert!(matches!(
            store.rename("missing", "c"),
            Err(StoreError::NoSuchKey { .. })
        ));
    }

    #[test]
    fn expire_and_ttl() {
        let store = InMemoryAdapter::new();
        store.set("k", "v").unwrap();
        assert_eq!(store.ttl("k").unwrap(), None);
        assert!(store.expire("k", 30).unwrap());
        assert_eq!(store.ttl("k").unwrap(), Some(30));
        assert!(!store.expire("missing", 30).unwrap());
    }

    #[test]
    fn expired_keys_disappear() {
        let store = InMemoryAdapter::new();
        store.set("k", "v").unwrap();
        store.expire("k", 0).unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn hash_operations() {
        let store = InMemoryAdapter::new();
        store
            .hset_many(
                "h",
                &[("a".into(), "1".into()), ("b".into(), "2".into())],
            )
            .unwrap();
        let all = store.hgetall("h").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            store.hmget("h", &strings(&["b", "zz"])).unwrap(),
            vec![Some("2".to_string()), None]
        );
        assert!(store.hgetall("missing").unwrap().is_empty());
    }

    #[test]
    fn wrong_type_is_rejected() {
        let store = InMemoryAdapter::new();
        store.set("k", "v").unwrap();
        assert!(matches!(
            store.sadd("k", &strings(&["x"])),
            Err(StoreError::WrongType { .. })
        ));
    }

    #[test]
    fn set_operations_and_empty_cleanup() {
        let store = InMemoryAdapter::new();
        assert_eq!(store.sadd("s", &strings(&["a", "b", "a"])).unwrap(), 2);
        assert_eq!(store.scard("s").unwrap(), 2);
        assert_eq!(store.srem("s", &strings(&["a", "b"])).unwrap(), 2);
        assert!(!store.exists("s").unwrap());
    }

    #[test]
    fn sinterstore_intersects() {
        let store = InMemoryAdapter::new();
        store.sadd("a", &strings(&["1", "2", "3"])).unwrap();
        store.sadd("b", &strings(&["2", "3", "4"])).unwrap();
        assert_eq!(
            store.sinterstore("dest", &strings(&["a", "b"])).unwrap(),
            2
        );
        assert_eq!(store.smembers("dest").unwrap(), strings(&["2", "3"]));

        assert_eq!(
            store.sinterstore("dest", &strings(&["a", "missing"])).unwrap(),
            0
        );
        assert!(!store.exists("dest").unwrap());
    }

    #[test]
    fn sorted_set_ranges() {
        let store = InMemoryAdapter::new();
        store.zadd("z", 5.0, "a").unwrap();
        store.zadd("z", 50.0, "b").unwrap();
        store.zadd("z", 500.0, "c").unwrap();

        let min = ScoreBound::Inclusive(10.0);
        let max = ScoreBound::Inclusive(500.0);
        assert_eq!(store.zcount("z", min, max).unwrap(), 2);
        assert_eq!(
            store.zrange_by_score("z", min, max, None).unwrap(),
            strings(&["b", "c"])
        );
        assert_eq!(
            store
                .zrange_by_score("z", ScoreBound::Unbounded, ScoreBound::Unbounded, Some(ScoreLimit::new(1, Some(1))))
                .unwrap(),
            strings(&["b"])
        );
        assert_eq!(
            store
                .zrange_by_score("z", ScoreBound::Unbounded, ScoreBound::Exclusive(500.0), None)
                .unwrap(),
            strings(&["a", "b"])
        );
        assert_eq!(store.zcard("z").unwrap(), 3);
    }

    #[test]
    fn sorted_set_update_moves_member() {
        let store = InMemoryAdapter::new();
        assert_eq!(store.zadd("z", 1.0, "a").unwrap(), 1);
        assert_eq!(store.zadd("z", 9.0, "a").unwrap(), 0);
        assert_eq!(
            store
                .zrange_by_score("z", ScoreBound::Inclusive(5.0), ScoreBound::Unbounded, None)
                .unwrap(),
            strings(&["a"])
        );
    }

    #[test]
    fn scan_is_bounded_and_complete() {
        let store = InMemoryAdapter::new();
        for i in 0..25 {
            store.set(&format!("app:users:{i:02}"), "x").unwrap();
        }
        store.set("app:posts:1", "x").unwrap();

        let mut cursor = 0;
        let mut found = Vec::new();
        loop {
            let page = store.scan(cursor, "app:users:*", 10).unwrap();
            assert!(page.keys.len() <= 10);
            found.extend(page.keys);
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(found.len(), 25);
        assert_eq!(store.stats().max_scan_step, 10);
    }

    #[test]
    fn scan_tolerates_deletes_between_steps() {
        let store = InMemoryAdapter::new();
        for i in 0..20 {
            store.set(&format!("k:{i:02}"), "x").unwrap();
        }

        let mut cursor = 0;
        let mut seen = 0;
        loop {
            let page = store.scan(cursor, "k:*", 5).unwrap();
            seen += page.keys.len();
            store.del(&page.keys).unwrap();
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(seen, 20);
        assert!(store.is_empty());
    }

    #[test]
    fn pipeline_replies_in_order() {
        let store = InMemoryAdapter::new();
        let mut pipeline = Pipeline::new();
        pipeline.set("a", "1").get("a").get("missing").sadd("s", ["x", "y"]);
        let replies = store.execute(pipeline).unwrap();

        assert_eq!(replies.len(), 4);
        assert_eq!(replies[1], Reply::Bulk("1".into()));
        assert_eq!(replies[2], Reply::Nil);
        assert_eq!(replies[3], Reply::Integer(2));
        assert_eq!(store.stats().pipelines, 1);
        assert_eq!(store.stats().writes, 2);
    }
}
