//! Main docprovider crate: a data-access layer between application model types and a
//! document store.
//!
//! This crate is the primary entry point. It re-exports the core types from the sub-crates
//! and gives access to the storage backends.
//!
//! # Features
//!
//! - **Per-collection providers** - CRUD with normalized selector, update and bulk semantics
//! - **Fluent queries** - Chainable predicates composing into one filter tree
//! - **Cursors** - Lazy, rewindable iteration with scoped close
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docprovider::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Item {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<Identifier>,
//!     pub name: String,
//!     pub value: i32,
//! }
//!
//! impl Model for Item {
//!     fn collection_name() -> &'static str { "items" }
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let connection = Connection::open(InMemoryStore::builder()).await?;
//!     let items = connection.model::<Item>();
//!
//!     items
//!         .create_many(&[
//!             Item { id: None, name: "A".into(), value: 1 },
//!             Item { id: None, name: "B".into(), value: 2 },
//!         ])
//!         .await?;
//!
//!     let outcome = items
//!         .update(
//!             Query::builder().is_equal("name", "B"),
//!             bson::doc! { "value": 3 },
//!             UpdateOptions::new(),
//!         )
//!         .await?;
//!     assert_eq!(outcome, Outcome::Modified);
//!
//!     let mut cursor = items.query().is_greater_than("value", 1).each().await?;
//!     while let Some(item) = cursor.next().await? {
//!         println!("{:?}", item.current);
//!     }
//!
//!     connection.shutdown().await
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - `mongodb` - MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use docprovider_core::{
    backend, config, connection, cursor, document, error, filter, identifier, page, provider,
    query,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docprovider_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docprovider_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
