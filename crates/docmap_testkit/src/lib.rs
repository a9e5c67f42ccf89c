//! # docmap Testkit
//!
//! Test utilities for docmap.
//!
//! This crate provides:
//! - Fixture document types covering every field type and encoding
//! - A [`TestContext`] bundling an in-memory store with a manager
//! - Property-based test generators using proptest
//! - A test logging initializer
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docmap_testkit::prelude::*;
//!
//! #[test]
//! fn finds_by_category() {
//!     let ctx = TestContext::new();
//!     ctx.manager.persist(&DocRef::new(Article::sample("a1", "tech", 10))).unwrap();
//!     ctx.manager.commit().unwrap();
//!     // ... queries
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use docmap_core::{
        Criteria, DocRef, Direction, Document, Manager, ManagerConfig, OrderBy, Repository,
    };
    pub use docmap_store::{ClientAdapter, InMemoryAdapter};
}

pub use fixtures::*;
pub use generators::*;
