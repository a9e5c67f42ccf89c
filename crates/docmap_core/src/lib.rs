//! # docmap Core
//!
//! Document mapping over a key-value store.
//!
//! This crate provides:
//! - Document type descriptors and an explicit registry
//! - A hydrator layer converting typed fields to store strings
//! - A [`Manager`] with an identity map, a unit of work and a two-phase
//!   commit that maintains secondary, sorted and unique indexes
//! - [`Repository`] queries: index lookup, store-side intersection and
//!   cursor-scan fallback, streaming and counting
//! - [`RangeQuery`] over sorted indexes with store-side paging
//! - Lazily hydrated [`ResultPage`]s with `pluck` projection
//! - Chunked [`BulkWriter`] helpers
//!
//! ## Example
//!
//! ```rust,ignore
//! use docmap_core::{Criteria, DocRef, Manager, MetadataRegistry};
//! use docmap_store::InMemoryAdapter;
//! use std::sync::Arc;
//!
//! let registry = MetadataRegistry::new();
//! registry.register::<Article>()?;
//!
//! let manager = Arc::new(Manager::new(Arc::new(InMemoryAdapter::new()), Arc::new(registry)));
//! manager.persist(&DocRef::new(Article::new("Rust", "tech")))?;
//! manager.commit()?;
//!
//! let tech = manager
//!     .repository::<Article>()?
//!     .find_by(&Criteria::new().eq("category", "tech"), &[], Some(10), 0)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bulk;
mod config;
mod document;
mod error;
mod hydrate;
mod manager;
mod metadata;
mod page;
mod repository;
mod scan;
mod stats;

#[cfg(test)]
mod test_support;

pub use bulk::{BulkReport, BulkWriter, DEFAULT_CHUNK_SIZE};
pub use config::ManagerConfig;
pub use document::{DocRef, Document, FieldAccessors, HasTimestamps};
pub use error::{CoreError, CoreResult};
pub use hydrate::{build_instance, extract_fields, Hydrator, RawDocument, Record, StandardHydrator};
pub use manager::{CommitSummary, Manager};
pub use metadata::{
    ClassMetadata, ClassMetadataBuilder, DocumentType, FieldMetadata, IdStrategy, IndexMetadata,
    KeySpace, MetadataRegistry, StorageEncoding,
};
pub use page::{PluckRow, ResultPage};
pub use repository::{Access, Criteria, Direction, OrderBy, QueryBuilder, QueryPlan, RangeQuery, Repository};
pub use stats::{ManagerStats, StatsSnapshot};

pub use docmap_codec::{FieldType, Value};
