//! MongoDB backend implementation for docprovider.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. Filter
//! trees are translated into MongoDB query documents and the driver's acknowledgement counts
//! are passed through unchanged, so provider-level update and remove classification sees
//! exactly what the server reported.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docprovider = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! The builder takes a [`ConnectionConfig`](docprovider_core::config::ConnectionConfig),
//! connects, and pings the server before handing the store out. Transport failures surface
//! as `StoreUnavailable`.
//!
//! # Example
//!
//! ```ignore
//! use docprovider::{backend::StoreBackendBuilder, config::ConnectionConfig, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder(ConnectionConfig::from_env())
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docprovider_mongodb;

mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
