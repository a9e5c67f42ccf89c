//! Document types shared by unit tests.

use crate::document::{Document, FieldAccessors, HasTimestamps};
use crate::error::CoreResult;
use crate::manager::Manager;
use crate::metadata::{
    ClassMetadata, FieldMetadata, IdStrategy, IndexMetadata, MetadataRegistry, StorageEncoding,
};
use docmap_codec::FieldType;
use docmap_store::InMemoryAdapter;
use std::sync::Arc;

/// Hash-encoded, auto ids, two secondary indexes and one sorted index.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Article {
    pub id: Option<String>,
    pub title: String,
    pub category: String,
    pub status: String,
    pub score: i64,
    pub summary: Option<String>,
}

impl Article {
    pub fn new(id: &str, title: &str, category: &str, score: i64) -> Self {
        Self {
            id: (!id.is_empty()).then(|| id.to_string()),
            title: title.to_string(),
            category: category.to_string(),
            status: "published".to_string(),
            score,
            summary: Some(format!("About {title}")),
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
            .field(FieldMetadata::new("summary", FieldType::String).nullable())
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
            .field("summary", |a: &Article| a.summary.clone().into(), |a, v| {
                a.summary = v.into_opt()?;
                Ok(())
            })
    }
}

/// JSON-encoded, manual ids, a unique email and timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Profile {
    pub id: Option<String>,
    pub email: String,
    pub nickname: Option<String>,
    pub visits: i64,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub expires_in: Option<u64>,
}

impl Profile {
    pub fn new(id: &str, email: &str, nickname: Option<&str>) -> Self {
        Self {
            id: Some(id.to_string()),
            email: email.to_string(),
            nickname: nickname.map(str::to_string),
            ..Self::default()
        }
    }
}

impl HasTimestamps for Profile {
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

impl Document for Profile {
    fn metadata() -> CoreResult<ClassMetadata> {
        ClassMetadata::builder("profiles")
            .prefix("app")
            .encoding(StorageEncoding::Json)
            .id("id", IdStrategy::Manual)
            .field(FieldMetadata::new("id", FieldType::String))
            .field(
                FieldMetadata::new("email", FieldType::String)
                    .store_as("mail")
                    .unique(),
            )
            .field(FieldMetadata::new("nickname", FieldType::String).nullable())
            .field(FieldMetadata::new("visits", FieldType::Integer))
            .field(FieldMetadata::new("created_at", FieldType::DateTime).nullable())
            .field(FieldMetadata::new("updated_at", FieldType::DateTime).nullable())
            .index("nickname", IndexMetadata::new("nickname").ttl(600))
            .sorted_index("visits", "visits")
            .build()
    }

    fn accessors() -> FieldAccessors<Self> {
        FieldAccessors::<Self>::new()
            .field("id", |p: &Profile| p.id.clone().into(), |p, v| {
                p.id = v.into_opt()?;
                Ok(())
            })
            .field("email", |p: &Profile| p.email.clone().into(), |p, v| {
                p.email = v.try_into()?;
                Ok(())
            })
            .field("nickname", |p: &Profile| p.nickname.clone().into(), |p, v| {
                p.nickname = v.into_opt()?;
                Ok(())
            })
            .field("visits", |p: &Profile| p.visits.into(), |p, v| {
                p.visits = v.try_into()?;
                Ok(())
            })
            .field(
                "created_at",
                |p: &Profile| p.created_at.map_or(docmap_codec::Value::Null, docmap_codec::Value::DateTime),
                |p, v| {
                    p.created_at = v.into_opt()?;
                    Ok(())
                },
            )
            .field(
                "updated_at",
                |p: &Profile| p.updated_at.map_or(docmap_codec::Value::Null, docmap_codec::Value::DateTime),
                |p, v| {
                    p.updated_at = v.into_opt()?;
                    Ok(())
                },
            )
    }

    fn timestamps(&mut self) -> Option<&mut dyn HasTimestamps> {
        Some(self)
    }

    fn ttl(&self) -> Option<u64> {
        self.expires_in
    }
}

/// Hash-encoded, caller ids without a generator, a float sorted index.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Reading {
    pub id: Option<String>,
    pub tag: String,
    pub level: f64,
}

impl Reading {
    pub fn new(id: &str, tag: &str, level: f64) -> Self {
        Self {
            id: Some(id.to_string()),
            tag: tag.to_string(),
            level,
        }
    }
}

impl Document for Reading {
    fn metadata() -> CoreResult<ClassMetadata> {
        ClassMetadata::builder("readings")
            .id("id", IdStrategy::None)
            .field(FieldMetadata::new("id", FieldType::String))
            .field(FieldMetadata::new("tag", FieldType::String))
            .field(FieldMetadata::new("level", FieldType::Float))
            .index("tag", "tag")
            .sorted_index("level", "level")
            .build()
    }

    fn accessors() -> FieldAccessors<Self> {
        FieldAccessors::<Self>::new()
            .field("id", |r: &Reading| r.id.clone().into(), |r, v| {
                r.id = v.into_opt()?;
                Ok(())
            })
            .field("tag", |r: &Reading| r.tag.clone().into(), |r, v| {
                r.tag = v.try_into()?;
                Ok(())
            })
            .field("level", |r: &Reading| r.level.into(), |r, v| {
                r.level = v.try_into()?;
                Ok(())
            })
    }
}

pub(crate) fn test_registry() -> Arc<MetadataRegistry> {
    let registry = MetadataRegistry::new();
    registry.register::<Article>().unwrap();
    registry.register::<Profile>().unwrap();
    registry.register::<Reading>().unwrap();
    Arc::new(registry)
}

pub(crate) fn test_manager() -> (Arc<InMemoryAdapter>, Arc<Manager>) {
    let adapter = Arc::new(InMemoryAdapter::new());
    let manager = Manager::new(adapter.clone(), test_registry());
    (adapter, Arc::new(manager))
}
