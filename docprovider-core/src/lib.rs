//! A data-access layer between application model types and a document store.
//!
//! This crate is the core of the docprovider project and provides:
//!
//! - **Identifiers** ([`identifier`]) - Canonical document keys and their conversions
//! - **Filters** ([`filter`]) - The typed predicate tree with its first-wins merge rule
//! - **Query builder** ([`query`]) - Fluent predicate and option accumulation
//! - **Store backend abstraction** ([`backend`]) - The contract storage backends implement
//! - **Providers** ([`provider`]) - Per-collection repositories with normalized CRUD semantics
//! - **Cursors** ([`cursor`]) - Lazy, resumable iteration over result sets
//! - **Connections** ([`connection`], [`config`]) - Backend ownership and connection settings
//! - **Error handling** ([`error`]) - Error types and result types
//! - **Pagination** ([`page`]) - Paged results
//!
//! # Example
//!
//! ```ignore
//! use docprovider::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Profile {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<Identifier>,
//!     pub title: String,
//! }
//!
//! impl Model for Profile {
//!     fn collection_name() -> &'static str {
//!         "profile"
//!     }
//! }
//!
//! let connection = Connection::new(InMemoryStore::new());
//! let profiles = connection.model::<Profile>();
//! let found = profiles.query().is_match("title", "^al").find().await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docprovider_core;

pub mod backend;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod document;
pub mod error;
pub mod filter;
pub mod identifier;
pub mod page;
pub mod provider;
pub mod query;
