//! The connection object owning a backend.
//!
//! A [`Connection`] replaces any process-wide handle: it owns the backend, hands out
//! [`Provider`]s borrowing it, and is shut down explicitly.
//!
//! # Example
//!
//! ```ignore
//! use docprovider::connection::Connection;
//! use docprovider::memory::InMemoryStore;
//!
//! let connection = Connection::new(InMemoryStore::new());
//! let items = connection.provider::<bson::Document>("items");
//! let profiles = connection.model::<Profile>();
//! ```

use tracing::debug;

use crate::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::{DocumentType, Model},
    error::DocumentStoreResult,
    provider::Provider,
};

/// Owner of a store backend.
#[derive(Debug)]
pub struct Connection<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> Connection<B> {
    /// Wraps an already built backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Builds the backend and wraps it.
    pub async fn open<Builder>(builder: Builder) -> DocumentStoreResult<Self>
    where
        Builder: StoreBackendBuilder<Backend = B>,
    {
        let backend = builder.build().await?;
        debug!(target: "docprovider::connection", ?backend, "connection opened");
        Ok(Self::new(backend))
    }

    /// Returns a provider for the named collection, decoding documents as `D`.
    pub fn provider<'a, D: DocumentType>(&'a self, name: &str) -> Provider<'a, B, D> {
        Provider::new(name, &self.backend)
    }

    /// Returns a provider for the collection the model is stored in.
    pub fn model<'a, M: Model>(&'a self) -> Provider<'a, B, M> {
        Provider::new(M::collection_name(), &self.backend)
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Consumes the connection and returns the backend.
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Shuts the backend down, releasing its resources.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        debug!(target: "docprovider::connection", "connection shutting down");
        self.backend.shutdown().await
    }
}
