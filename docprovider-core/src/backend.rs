//! Storage backend abstraction.
//!
//! The [`StoreBackend`] trait is the contract a provider consumes: a document store addressed
//! by collection name that reports acknowledgement counts for every write. Backends are
//! thread-safe (`Send + Sync`) and every operation is async.
//!
//! # Examples
//!
//! ```ignore
//! use docprovider::backend::StoreBackend;
//! use docprovider::filter::Filter;
//! use bson::doc;
//!
//! let id = backend.insert_one("profile", doc! { "title": "Alex" }).await?;
//! let found = backend
//!     .find_one("profile", &Filter::eq("_id", id), &Default::default())
//!     .await?;
//! ```

use async_trait::async_trait;
use bson::Document;
use std::fmt::{self, Debug};

use crate::{
    error::DocumentStoreResult,
    filter::Filter,
    identifier::Identifier,
    query::{FindOptions, SortDirection},
};

/// How an update patch is applied to a matched document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// Only the fields listed in the patch change.
    #[default]
    Merge,
    /// The document is substituted by the patch; the identifier is preserved.
    Replace,
}

/// Acknowledgement of a bulk insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertManyResult {
    /// Identifiers of the inserted documents, in input order.
    pub inserted_ids: Vec<Identifier>,
}

/// Acknowledgement of an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    /// Number of documents the filter matched.
    pub matched_count: u64,
    /// Number of documents actually changed.
    pub modified_count: u64,
    /// Identifier of the document created by an upsert, if any.
    pub upserted_id: Option<Identifier>,
}

/// Acknowledgement of a delete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Ordered index key specification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexKeys {
    keys: Vec<(String, SortDirection)>,
}

impl IndexKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ascending(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortDirection::Asc));
        self
    }

    pub fn descending(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortDirection::Desc));
        self
    }

    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the conventional index name, e.g. `value_1` or `name_1_rating_-1`.
    pub fn default_name(&self) -> String {
        self.keys
            .iter()
            .map(|(field, direction)| match direction {
                SortDirection::Asc => format!("{field}_1"),
                SortDirection::Desc => format!("{field}_-1"),
            })
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl From<&str> for IndexKeys {
    /// A single ascending key.
    fn from(field: &str) -> Self {
        IndexKeys::new().ascending(field)
    }
}

/// Options for [`StoreBackend::create_index`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexOptions {
    /// Explicit index name; the conventional name is used when absent.
    pub name: Option<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// A store-side cursor over a result set.
///
/// Wrapped by [`Cursor`](crate::cursor::Cursor), which adds decoding and scoped close.
#[async_trait]
pub trait RawCursor: Send + Debug {
    /// Returns the next document, or `None` once the result set is exhausted.
    async fn advance(&mut self) -> DocumentStoreResult<Option<Document>>;

    /// Restarts iteration from the first document.
    async fn rewind(&mut self) -> DocumentStoreResult<()>;

    /// Releases the store-side resources. Further `advance` calls return `None`.
    async fn close(&mut self) -> DocumentStoreResult<()>;
}

/// Abstract interface for document storage backends.
///
/// All operations are addressed by collection name; collections are created on first write.
/// Write operations report the store's acknowledgement counts verbatim. Interpreting those
/// counts is the provider's job.
///
/// # Error Handling
///
/// Transport failures surface as
/// [`DocumentStoreError::StoreUnavailable`](crate::error::DocumentStoreError::StoreUnavailable).
/// Other store rejections use the most specific variant available, falling back to
/// [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the key name of the identifier field.
    fn id_field(&self) -> &str {
        "_id"
    }

    /// Inserts one document, assigning an identifier when the document has none.
    async fn insert_one(&self, collection: &str, document: Document)
    -> DocumentStoreResult<Identifier>;

    /// Inserts documents in order.
    ///
    /// The call fails on the first rejected item; items inserted before it remain.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyResult>;

    /// Applies `patch` to the first document matching `filter`.
    ///
    /// With `upsert`, a new document is created when nothing matches.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
        mode: UpdateMode,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateResult>;

    /// Applies `patch` to every document matching `filter`.
    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
        mode: UpdateMode,
    ) -> DocumentStoreResult<UpdateResult>;

    /// Deletes the first document matching `filter`.
    async fn delete_one(&self, collection: &str, filter: &Filter)
    -> DocumentStoreResult<DeleteResult>;

    /// Deletes every document matching `filter`.
    async fn delete_many(&self, collection: &str, filter: &Filter)
    -> DocumentStoreResult<DeleteResult>;

    /// Returns the first document matching `filter` after sort and skip are applied.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Option<Document>>;

    /// Returns every matching document, in natural order unless `options` sorts.
    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Vec<Document>>;

    /// Returns the store's cheap estimate of the collection size.
    async fn estimated_count(&self, collection: &str) -> DocumentStoreResult<u64>;

    /// Counts the documents matching `filter` exactly.
    async fn count_documents(&self, collection: &str, filter: &Filter)
    -> DocumentStoreResult<u64>;

    /// Opens a cursor over the matching documents.
    async fn iterate(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Box<dyn RawCursor>>;

    /// Creates an index and returns its name.
    async fn create_index(
        &self,
        collection: &str,
        keys: &IndexKeys,
        options: &IndexOptions,
    ) -> DocumentStoreResult<String>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateMode::Merge => f.write_str("merge"),
            UpdateMode::Replace => f.write_str("replace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_names_follow_key_convention() {
        assert_eq!(IndexKeys::from("value").default_name(), "value_1");
        assert_eq!(
            IndexKeys::new()
                .ascending("name")
                .descending("rating")
                .default_name(),
            "name_1_rating_-1"
        );
    }
}
