//! Store key layout for one collection.

use docmap_store::escape_pattern;
use uuid::Uuid;

/// Builds every store key a collection touches.
///
/// Layout, with `P` the optional `prefix:` and `C` the collection:
///
/// | structure        | key                     |
/// |------------------|-------------------------|
/// | primary record   | `P C:id`                |
/// | secondary index  | `P idx:C:index:value`   |
/// | sorted index     | `P zidx:C:index`        |
/// | unique claim     | `P unq:C:field:value`   |
/// | intersection tmp | `P tmp:C:uuid`          |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    base: String,
    collection: String,
}

impl KeySpace {
    /// Creates the key space for a collection.
    #[must_use]
    pub fn new(prefix: Option<&str>, collection: &str) -> Self {
        let base = prefix.map(|p| format!("{p}:")).unwrap_or_default();
        Self {
            base,
            collection: collection.to_string(),
        }
    }

    /// Primary record key.
    #[must_use]
    pub fn primary(&self, id: &str) -> String {
        format!("{}{}:{id}", self.base, self.collection)
    }

    /// Secondary index set key for one value.
    #[must_use]
    pub fn index(&self, index: &str, value: &str) -> String {
        format!("{}idx:{}:{index}:{value}", self.base, self.collection)
    }

    /// Glob matching every value set of one secondary index.
    #[must_use]
    pub fn index_pattern(&self, index: &str) -> String {
        format!(
            "{}idx:{}:{}:*",
            escape_pattern(&self.base),
            escape_pattern(&self.collection),
            escape_pattern(index)
        )
    }

    /// Sorted index key.
    #[must_use]
    pub fn sorted(&self, index: &str) -> String {
        format!("{}zidx:{}:{index}", self.base, self.collection)
    }

    /// Unique claim key for one store field value.
    #[must_use]
    pub fn unique(&self, field: &str, value: &str) -> String {
        format!("{}unq:{}:{field}:{value}", self.base, self.collection)
    }

    /// Glob matching every unique claim of one store field.
    #[must_use]
    pub fn unique_pattern(&self, field: &str) -> String {
        format!(
            "{}unq:{}:{}:*",
            escape_pattern(&self.base),
            escape_pattern(&self.collection),
            escape_pattern(field)
        )
    }

    /// Glob matching every primary record of the collection.
    #[must_use]
    pub fn collection_pattern(&self) -> String {
        format!(
            "{}{}:*",
            escape_pattern(&self.base),
            escape_pattern(&self.collection)
        )
    }

    /// A fresh temporary key for store-side intersections.
    #[must_use]
    pub fn temporary(&self) -> String {
        format!(
            "{}tmp:{}:{}",
            self.base,
            self.collection,
            Uuid::new_v4().simple()
        )
    }

    /// Extracts the id from a primary key of this collection.
    #[must_use]
    pub fn id_from_primary<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(self.base.as_str())?
            .strip_prefix(self.collection.as_str())?
            .strip_prefix(':')
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unprefixed_layout() {
        let keys = KeySpace::new(None, "articles");
        assert_eq!(keys.primary("7"), "articles:7");
        assert_eq!(keys.index("by_cat", "tech"), "idx:articles:by_cat:tech");
        assert_eq!(keys.sorted("by_score"), "zidx:articles:by_score");
        assert_eq!(keys.unique("email", "a@x"), "unq:articles:email:a@x");
        assert_eq!(keys.collection_pattern(), "articles:*");
    }

    #[test]
    fn prefixed_layout() {
        let keys = KeySpace::new(Some("app"), "users");
        assert_eq!(keys.primary("1"), "app:users:1");
        assert_eq!(keys.index("i", "v"), "app:idx:users:i:v");
        assert_eq!(keys.collection_pattern(), "app:users:*");
        assert!(keys.temporary().starts_with("app:tmp:users:"));
    }

    #[test]
    fn patterns_escape_glob_characters() {
        let keys = KeySpace::new(Some("a*"), "c?");
        assert_eq!(keys.collection_pattern(), "a\\*:c\\?:*");
    }

    #[test]
    fn id_extraction() {
        let keys = KeySpace::new(Some("app"), "users");
        assert_eq!(keys.id_from_primary("app:users:42"), Some("42"));
        assert_eq!(keys.id_from_primary("app:users:"), None);
        assert_eq!(keys.id_from_primary("users:42"), None);
    }

    #[test]
    fn temporary_keys_are_unique() {
        let keys = KeySpace::new(None, "c");
        assert_ne!(keys.temporary(), keys.temporary());
    }

    proptest! {
        #[test]
        fn ids_survive_the_primary_key(
            prefix in prop::option::of("[a-z]{1,6}"),
            id in "[a-zA-Z0-9:_*-]{1,20}",
        ) {
            let keys = KeySpace::new(prefix.as_deref(), "docs");
            let key = keys.primary(&id);
            prop_assert_eq!(keys.id_from_primary(&key), Some(id.as_str()));
        }
    }
}
