//! # docmap Store
//!
//! Key-value client adapter contract for docmap.
//!
//! This crate provides the lowest-level store abstraction. Adapters speak a
//! Redis-style data model (strings, hashes, sets, sorted sets) and know
//! nothing about documents, indexes or key layout.
//!
//! ## Design Principles
//!
//! - Every operation is expressible as a [`Command`], so a [`Pipeline`] of
//!   commands is the one primitive an adapter must execute
//! - Key enumeration is cursor-based only; there is no blocking "all keys" call
//! - Adapters must be `Send + Sync` so a manager can share one client
//!
//! ## Available Adapters
//!
//! - [`InMemoryAdapter`] - For testing and ephemeral stores
//!
//! ## Example
//!
//! ```rust
//! use docmap_store::{ClientAdapter, InMemoryAdapter, Pipeline};
//!
//! let store = InMemoryAdapter::new();
//! store.set("greeting", "hello").unwrap();
//! assert_eq!(store.get("greeting").unwrap().as_deref(), Some("hello"));
//!
//! let mut pipeline = Pipeline::new();
//! pipeline.sadd("tags", ["a", "b"]).scard("tags");
//! let replies = store.execute(pipeline).unwrap();
//! assert_eq!(replies[1].as_integer(), Some(2));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod error;
mod memory;
mod pattern;
mod pipeline;

pub use adapter::{ClientAdapter, ScanPage, ScoreBound, ScoreLimit};
pub use error::{StoreError, StoreResult};
pub use memory::{AdapterStats, InMemoryAdapter, StoredValue};
pub use pattern::{escape_pattern, pattern_matches};
pub use pipeline::{Command, Pipeline, Reply};
