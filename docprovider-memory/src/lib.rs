//! In-memory document storage backend for docprovider.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is intended for
//! development and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Full filter support** - Every filter operator, dotted paths, logical clauses
//! - **Read options** - Projection, multi-key sort, skip and limit
//! - **Store accounting** - Matched/modified counts, upserts, unique indexes
//!
//! # Quick Start
//!
//! ```ignore
//! use docprovider::{connection::Connection, memory::InMemoryStore};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Connection::new(InMemoryStore::new());
//!     let items = connection.provider::<bson::Document>("items");
//!
//!     items.create(&doc! { "name": "A", "value": 1 }).await?;
//!     assert_eq!(items.query().is_equal("name", "A").count().await?, 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docprovider_memory;

mod evaluator;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
