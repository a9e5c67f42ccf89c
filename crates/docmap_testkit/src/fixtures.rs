//! Fixture document types and test contexts.
//!
//! Three types cover the mapper's surface:
//!
//! - [`Article`]: hash encoding, generated ids, two secondary indexes, a
//!   sorted index and one field of every scalar type
//! - [`User`]: prefixed keys, manual ids, a unique email stored under a
//!   different field name
//! - [`Event`]: JSON encoding, a datetime sorted index, an expiring
//!   secondary index and automatic timestamps

use docmap_codec::{FieldType, Value};
use docmap_core::{
    ClassMetadata, CoreResult, Document, FieldAccessors, FieldMetadata, HasTimestamps, IdStrategy,
    IndexMetadata, Manager, ManagerConfig, MetadataRegistry, Repository, StorageEncoding,
};
use docmap_store::InMemoryAdapter;
use std::sync::{Arc, Once};

/// A hash-encoded document with generated ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Article {
    /// Identifier; generated on first persist when `None`.
    pub id: Option<String>,
    /// Title.
    pub title: String,
    /// Category (indexed).
    pub category: String,
    /// Publication status (indexed).
    pub status: String,
    /// Score (sorted index).
    pub score: i64,
    /// Optional reader rating.
    pub rating: Option<f64>,
    /// Featured flag.
    pub featured: bool,
    /// Optional free-form metadata.
    pub meta: Option<serde_json::Value>,
}

impl Article {
    /// A published article titled after its id.
    pub fn sample(id: &str, category: &str, score: i64) -> Self {
        Self {
            id: Some(id.to_string()),
            title: format!("Article {id}"),
            category: category.to_string(),
            status: "published".to_string(),
            score,
            ..Self::default()
        }
    }
}

impl Document for Article {
    fn metadata() -> CoreResult<ClassMetadata> {
        ClassMetadata::builder("articles")
            .id("id", IdStrategy::Auto)
            .field(FieldMetadata::new("id", FieldType::String))
            .field(FieldMetadata::new("title", FieldType::String))
            .field(FieldMetadata::new("category", FieldType::String))
            .field(FieldMetadata::new("status", FieldType::String))
            .field(FieldMetadata::new("score", FieldType::Integer))
            .field(FieldMetadata::new("rating", FieldType::Float).nullable())
            .field(FieldMetadata::new("featured", FieldType::Boolean))
            .field(FieldMetadata::new("meta", FieldType::Json).nullable())
            .index("category", "category")
            .index("status", "status")
            .sorted_index("score", "score")
            .build()
    }

    fn accessors() -> FieldAccessors<Self> {
        FieldAccessors::<Self>::new()
            .field("id", |a: &Article| a.id.clone().into(), |a, v| {
                a.id = v.into_opt()?;
                Ok(())
            })
            .field("title", |a: &Article| a.title.clone().into(), |a, v| {
                a.title = v.try_into()?;
                Ok(())
            })
            .field("category", |a: &Article| a.category.clone().into(), |a, v| {
                a.category = v.try_into()?;
                Ok(())
            })
            .field("status", |a: &Article| a.status.clone().into(), |a, v| {
                a.status = v.try_into()?;
                Ok(())
            })
            .field("score", |a: &Article| a.score.into(), |a, v| {
                a.score = v.try_into()?;
                Ok(())
            })
            .field("rating", |a: &Article| a.rating.into(), |a, v| {
                a.rating = v.into_opt()?;
                Ok(())
            })
            .field("featured", |a: &Article| a.featured.into(), |a, v| {
                a.featured = v.try_into()?;
                Ok(())
            })
            .field("meta", |a: &Article| a.meta.clone().into(), |a, v| {
                a.meta = v.into_opt()?;
                Ok(())
            })
    }
}

/// A prefixed, manually keyed document with a unique email.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct User {
    /// Caller-chosen identifier.
    pub id: Option<String>,
    /// Unique email, stored as `mail`.
    pub email: String,
    /// Display name (indexed).
    pub name: String,
    /// Age (sorted index).
    pub age: i64,
}

impl User {
    /// Creates a user.
    pub fn new(id: &str, email: &str, name: &str, age: i64) -> Self {
        Self {
            id: Some(id.to_string()),
            email: email.to_string(),
            name: name.to_string(),
            age,
        }
    }
}

impl Document for User {
    fn metadata() -> CoreResult<ClassMetadata> {
        ClassMetadata::builder("users")
            .prefix("app")
            .id("id", IdStrategy::Manual)
            .field(FieldMetadata::new("id", FieldType::String))
            .field(
                FieldMetadata::new("email", FieldType::String)
                    .store_as("mail")
                    .unique(),
            )
            .field(FieldMetadata::new("name", FieldType::String))
            .field(FieldMetadata::new("age", FieldType::Integer))
            .index("name", "name")
            .sorted_index("age", "age")
            .build()
    }

    fn accessors() -> FieldAccessors<Self> {
        FieldAccessors::<Self>::new()
            .field("id", |u: &User| u.id.clone().into(), |u, v| {
                u.id = v.into_opt()?;
                Ok(())
            })
            .field("email", |u: &User| u.email.clone().into(), |u, v| {
                u.email = v.try_into()?;
                Ok(())
            })
            .field("name", |u: &User| u.name.clone().into(), |u, v| {
                u.name = v.try_into()?;
                Ok(())
            })
            .field("age", |u: &User| u.age.into(), |u, v| {
                u.age = v.try_into()?;
                Ok(())
            })
    }
}

/// A JSON-encoded document with timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    /// Identifier; generated on first persist when `None`.
    pub id: Option<String>,
    /// Event kind (indexed, expiring index).
    pub kind: String,
    /// When the event happened, epoch seconds (sorted index).
    pub at: i64,
    /// Optional payload.
    pub payload: Option<serde_json::Value>,
    /// Set on first commit.
    pub created_at: Option<i64>,
    /// Set on every commit.
    pub updated_at: Option<i64>,
    /// Per-record expiry in seconds; not persisted.
    pub expires_in: Option<u64>,
}

impl Event {
    /// Creates an event without an id.
    pub fn new(kind: &str, at: i64) -> Self {
        Self {
            kind: kind.to_string(),
            at,
            ..Self::default()
        }
    }
}

impl HasTimestamps for Event {
    fn created_at(&self) -> Option<i64> {
        self.created_at
    }

    fn set_created_at(&mut self, at: i64) {
        self.created_at = Some(at);
    }

    fn set_updated_at(&mut self, at: i64) {
        self.updated_at = Some(at);
    }
}

fn datetime(at: Option<i64>) -> Value {
    at.map_or(Value::Null, Value::DateTime)
}

impl Document for Event {
    fn metadata() -> CoreResult<ClassMetadata> {
        ClassMetadata::builder("events")
            .encoding(StorageEncoding::Json)
            .id("id", IdStrategy::Auto)
            .field(FieldMetadata::new("id", FieldType::String))
            .field(FieldMetadata::new("kind", FieldType::String))
            .field(FieldMetadata::new("at", FieldType::DateTime))
            .field(FieldMetadata::new("payload", FieldType::Json).nullable())
            .field(FieldMetadata::new("created_at", FieldType::DateTime).nullable())
            .field(FieldMetadata::new("updated_at", FieldType::DateTime).nullable())
            .index("kind", IndexMetadata::new("kind").ttl(3600))
            .sorted_index("at", "at")
            .build()
    }

    fn accessors() -> FieldAccessors<Self> {
        FieldAccessors::<Self>::new()
            .field("id", |e: &Event| e.id.clone().into(), |e, v| {
                e.id = v.into_opt()?;
                Ok(())
            })
            .field("kind", |e: &Event| e.kind.clone().into(), |e, v| {
                e.kind = v.try_into()?;
                Ok(())
            })
            .field("at", |e: &Event| Value::DateTime(e.at), |e, v| {
                e.at = v.try_into()?;
                Ok(())
            })
            .field("payload", |e: &Event| e.payload.clone().into(), |e, v| {
                e.payload = v.into_opt()?;
                Ok(())
            })
            .field("created_at", |e: &Event| datetime(e.created_at), |e, v| {
                e.created_at = v.into_opt()?;
                Ok(())
            })
            .field("updated_at", |e: &Event| datetime(e.updated_at), |e, v| {
                e.updated_at = v.into_opt()?;
                Ok(())
            })
    }

    fn timestamps(&mut self) -> Option<&mut dyn HasTimestamps> {
        Some(self)
    }

    fn ttl(&self) -> Option<u64> {
        self.expires_in
    }
}

/// A registry with every fixture type registered.
pub fn fixture_registry() -> MetadataRegistry {
    let registry = MetadataRegistry::new();
    registry.register::<Article>().expect("article metadata is valid");
    registry.register::<User>().expect("user metadata is valid");
    registry.register::<Event>().expect("event metadata is valid");
    registry
}

/// An in-memory store and a manager over it.
pub struct TestContext {
    /// The store, for direct inspection.
    pub adapter: Arc<InMemoryAdapter>,
    /// The manager under test.
    pub manager: Arc<Manager>,
}

impl TestContext {
    /// Creates a context with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    /// Creates a context with a custom configuration.
    pub fn with_config(config: ManagerConfig) -> Self {
        let adapter = Arc::new(InMemoryAdapter::new());
        let manager = Manager::new(adapter.clone(), Arc::new(fixture_registry())).with_config(config);
        Self {
            adapter,
            manager: Arc::new(manager),
        }
    }

    /// A repository for a fixture type.
    pub fn repository<D: Document>(&self) -> Repository<D> {
        self.manager
            .repository::<D>()
            .expect("fixture types are registered")
    }

    /// Drops tracked state and empties the store.
    pub fn reset(&self) {
        self.manager.clear();
        self.adapter.flush_all();
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

static LOGGING: Once = Once::new();

/// Installs a test-friendly `tracing` subscriber once per process.
///
/// Filtering follows `RUST_LOG`, defaulting to `warn`.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
