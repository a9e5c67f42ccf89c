//! Index maintenance commands.
//!
//! Every write that touches an index structure also refreshes its TTL, so
//! an expiring index lives as long as it keeps being written.

use crate::metadata::{IndexMetadata, KeySpace};
use docmap_store::Pipeline;

pub(crate) fn add(pipeline: &mut Pipeline, keys: &KeySpace, index: &IndexMetadata, value: &str, id: &str) {
    let key = keys.index(index.name(), value);
    pipeline.sadd(key.clone(), [id]);
    refresh(pipeline, key, index);
}

pub(crate) fn remove(pipeline: &mut Pipeline, keys: &KeySpace, index: &IndexMetadata, value: &str, id: &str) {
    let key = keys.index(index.name(), value);
    pipeline.srem(key.clone(), [id]);
    refresh(pipeline, key, index);
}

pub(crate) fn add_sorted(pipeline: &mut Pipeline, keys: &KeySpace, index: &IndexMetadata, score: f64, id: &str) {
    let key = keys.sorted(index.name());
    pipeline.zadd(key.clone(), score, id);
    refresh(pipeline, key, index);
}

pub(crate) fn remove_sorted(pipeline: &mut Pipeline, keys: &KeySpace, index: &IndexMetadata, id: &str) {
    let key = keys.sorted(index.name());
    pipeline.zrem(key.clone(), id);
    refresh(pipeline, key, index);
}

fn refresh(pipeline: &mut Pipeline, key: String, index: &IndexMetadata) {
    if let Some(ttl) = index.ttl_secs() {
        pipeline.expire(key, ttl);
    }
}
