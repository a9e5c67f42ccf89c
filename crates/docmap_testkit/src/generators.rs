//! Property-based test generators using proptest.
//!
//! Generated documents always satisfy their metadata: ids are unique
//! within a batch, emails are unique per user set and floats survive a
//! decimal round trip.

use crate::fixtures::{Article, Event, User};
use docmap_core::Criteria;
use proptest::prelude::*;

/// Categories drawn by [`article_strategy`].
pub const CATEGORIES: [&str; 4] = ["tech", "life", "sport", "travel"];

/// Statuses drawn by [`article_strategy`].
pub const STATUSES: [&str; 3] = ["draft", "published", "archived"];

/// Strategy for generating valid document ids.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating free text, including separators and glob
/// characters that must not leak into key patterns.
pub fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 :*?\\[\\]_-]{0,24}").expect("Invalid regex")
}

/// Strategy for ratings that round-trip exactly through their decimal form.
pub fn rating_strategy() -> impl Strategy<Value = Option<f64>> {
    prop::option::of((-400i32..400).prop_map(|n| f64::from(n) / 4.0))
}

/// Strategy for small JSON payloads. Never produces a bare `null`.
pub fn json_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..4).prop_map(|entries| {
        serde_json::Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k, serde_json::Value::from(v)))
                .collect(),
        )
    })
}

/// Strategy for a single article with the given id.
pub fn article_strategy(id: String) -> impl Strategy<Value = Article> {
    (
        text_strategy(),
        prop::sample::select(CATEGORIES.to_vec()),
        prop::sample::select(STATUSES.to_vec()),
        -1_000i64..1_000,
        rating_strategy(),
        any::<bool>(),
        prop::option::of(json_strategy()),
    )
        .prop_map(
            move |(title, category, status, score, rating, featured, meta)| Article {
                id: Some(id.clone()),
                title,
                category: category.to_string(),
                status: status.to_string(),
                score,
                rating,
                featured,
                meta,
            },
        )
}

/// Strategy for a batch of articles with distinct ids.
pub fn articles_strategy(max: usize) -> impl Strategy<Value = Vec<Article>> {
    prop::collection::btree_set(id_strategy(), 0..max).prop_flat_map(|ids| {
        ids.into_iter()
            .map(article_strategy)
            .collect::<Vec<_>>()
    })
}

/// Strategy for a batch of users with distinct ids and emails.
pub fn users_strategy(max: usize) -> impl Strategy<Value = Vec<User>> {
    prop::collection::btree_map(id_strategy(), ("[a-z]{1,8}", 0i64..120), 0..max).prop_map(
        |entries| {
            entries
                .into_iter()
                .map(|(id, (name, age))| User::new(&id, &format!("{id}@example.com"), &name, age))
                .collect()
        },
    )
}

/// Strategy for an event without an id.
pub fn event_strategy() -> impl Strategy<Value = Event> {
    (
        prop::sample::select(vec!["click", "view", "purchase"]),
        0i64..2_000_000_000,
        prop::option::of(json_strategy()),
    )
        .prop_map(|(kind, at, payload)| Event {
            payload,
            ..Event::new(kind, at)
        })
}

/// Strategy for article criteria over indexed and unindexed fields.
pub fn article_criteria_strategy() -> impl Strategy<Value = Criteria> {
    (
        prop::option::of(prop::sample::select(CATEGORIES.to_vec())),
        prop::option::of(prop::sample::select(STATUSES.to_vec())),
        prop::option::of(any::<bool>()),
    )
        .prop_map(|(category, status, featured)| {
            let mut criteria = Criteria::new();
            if let Some(category) = category {
                criteria = criteria.eq("category", category);
            }
            if let Some(status) = status {
                criteria = criteria.eq("status", status);
            }
            if let Some(featured) = featured {
                criteria = criteria.eq("featured", featured);
            }
            criteria
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
