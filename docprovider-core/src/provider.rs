//! Per-collection repository with normalized CRUD semantics.
//!
//! A [`Provider`] is bound to one collection of a backend and maps the store's raw
//! acknowledgements into caller-facing results:
//!
//! - selectors are either a bare [`Identifier`] or a structured [`Filter`] ([`Selector`]);
//!   the shape decides whether an operation targets one document or many;
//! - updates are classified into an [`Outcome`] and anything other than a modification or an
//!   upsert is reported as [`DocumentStoreError::UpdateFailed`], including updates that
//!   matched a document already holding the patched values;
//! - bulk creation either returns every identifier or fails as a whole.
//!
//! # Example
//!
//! ```ignore
//! use docprovider::prelude::*;
//! use bson::doc;
//!
//! let items = connection.provider::<bson::Document>("items");
//! let id = items.create(&doc! { "name": "A", "value": 1 }).await?;
//!
//! let outcome = items
//!     .update(id, doc! { "value": 2 }, UpdateOptions::default())
//!     .await?;
//! assert_eq!(outcome, Outcome::Modified);
//!
//! let bigger = items.query().is_greater_than("value", 1).find().await?;
//! ```

use bson::Document;
use std::{fmt, marker::PhantomData};
use tracing::{debug, warn};

use crate::{
    backend::{IndexKeys, IndexOptions, StoreBackend, UpdateMode, UpdateResult},
    cursor::Cursor,
    document::{DocumentExt, DocumentType},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Filter,
    identifier::Identifier,
    query::{FindOptions, QueryBuilder},
};

/// Target of an update, remove or lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Exactly the document with this identifier.
    ById(Identifier),
    /// Every document matching the filter.
    ByFilter(Filter),
}

impl Selector {
    /// Normalizes the selector into a filter; identifiers become `{id_field: id}`.
    pub fn into_filter(self, id_field: &str) -> Filter {
        match self {
            Selector::ById(id) => Filter::eq(id_field, id),
            Selector::ByFilter(filter) => filter,
        }
    }

    /// Returns `true` when the selector addresses a single document by identifier.
    pub fn is_by_id(&self) -> bool {
        matches!(self, Selector::ById(_))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::ById(id) => write!(f, "id {id}"),
            Selector::ByFilter(filter) => write!(f, "filter {filter}"),
        }
    }
}

impl From<Identifier> for Selector {
    fn from(id: Identifier) -> Self {
        Selector::ById(id)
    }
}

impl From<Filter> for Selector {
    fn from(filter: Filter) -> Self {
        Selector::ByFilter(filter)
    }
}

impl<T> From<QueryBuilder<T>> for Selector {
    fn from(builder: QueryBuilder<T>) -> Self {
        Selector::ByFilter(builder.into_filter())
    }
}

impl TryFrom<Document> for Selector {
    type Error = DocumentStoreError;

    /// Parses a raw query document into a [`Selector::ByFilter`].
    fn try_from(document: Document) -> Result<Self, Self::Error> {
        Filter::try_from(document).map(Selector::ByFilter)
    }
}

/// Classification of an update acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The targeted document(s) changed.
    Modified,
    /// Nothing matched and an upsert created this document.
    Created(Identifier),
    /// Something matched but the store reported a different number of changes.
    Unchanged,
    /// Nothing matched and nothing was created.
    NotFound,
}

impl Outcome {
    /// Classifies a single-target update.
    ///
    /// `Modified` requires exactly one match and one modification.
    pub fn classify_single(result: &UpdateResult) -> Outcome {
        match (result.matched_count, result.modified_count, result.upserted_id) {
            (1, 1, _) => Outcome::Modified,
            (0, _, Some(id)) => Outcome::Created(id),
            (0, _, None) => Outcome::NotFound,
            _ => Outcome::Unchanged,
        }
    }

    /// Classifies a multi-target update.
    ///
    /// `Modified` requires at least one match, every match modified.
    pub fn classify_many(result: &UpdateResult) -> Outcome {
        match (result.matched_count, result.modified_count) {
            (0, _) => Outcome::NotFound,
            (matched, modified) if matched == modified => Outcome::Modified,
            _ => Outcome::Unchanged,
        }
    }

    /// Returns `true` for [`Outcome::Modified`] and [`Outcome::Created`].
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Modified | Outcome::Created(_))
    }
}

/// Options for [`Provider::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Merge the patch into the document, or replace the document with it.
    pub mode: UpdateMode,
    /// Create a document when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: UpdateMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

/// A collection-bound repository over a borrowed backend.
///
/// # Type Parameters
///
/// * `'a` - Lifetime of the backend reference
/// * `B` - The storage backend type
/// * `D` - The document type results are decoded into (raw documents by default)
#[derive(Debug)]
pub struct Provider<'a, B: StoreBackend, D = Document> {
    name: String,
    backend: &'a B,
    _marker: PhantomData<fn() -> D>,
}

impl<'a, B: StoreBackend, D> Clone for Provider<'a, B, D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            backend: self.backend,
            _marker: PhantomData,
        }
    }
}

impl<'a, B, D> Provider<'a, B, D>
where
    B: StoreBackend,
    D: DocumentType,
{
    pub(crate) fn new(name: impl Into<String>, backend: &'a B) -> Self {
        Self {
            name: name.into(),
            backend,
            _marker: PhantomData,
        }
    }

    fn locate(&self, err: DocumentStoreError) -> DocumentStoreError {
        err.in_collection(&self.name)
    }

    /// Returns the name of the collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key name of the identifier field.
    pub fn id_field(&self) -> &str {
        self.backend.id_field()
    }

    /// Opens a query builder bound to this provider.
    pub fn query(&self) -> QueryBuilder<&Self> {
        QueryBuilder::with_target(self)
    }

    /// Inserts one document and returns its identifier.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::InsertFailed`] when the store rejects the document;
    /// [`DocumentStoreError::StoreUnavailable`] is passed through.
    pub async fn create(&self, value: &D) -> DocumentStoreResult<Identifier> {
        let document = value.to_document()?;
        let rendered = document.to_string();

        match self.backend.insert_one(&self.name, document).await {
            Ok(id) => {
                debug!(target: "docprovider::provider", collection = %self.name, %id, "document created");
                Ok(id)
            }
            Err(err) if err.is_unavailable() => Err(self.locate(err)),
            Err(err) => {
                warn!(target: "docprovider::provider", collection = %self.name, error = %err, "insert rejected");
                Err(DocumentStoreError::InsertFailed {
                    collection: self.name.clone(),
                    value: rendered,
                })
            }
        }
    }

    /// Inserts documents in order and returns their identifiers in input order.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::BulkInsertIncomplete`] unless every document was acknowledged.
    /// Documents inserted before the failure remain in the store.
    pub async fn create_many(&self, values: &[D]) -> DocumentStoreResult<Vec<Identifier>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let documents = values
            .iter()
            .map(DocumentExt::to_document)
            .collect::<DocumentStoreResult<Vec<_>>>()?;
        let expected = documents.len();

        let result = match self.backend.insert_many(&self.name, documents).await {
            Ok(result) => result,
            Err(err @ DocumentStoreError::StoreUnavailable { .. })
            | Err(err @ DocumentStoreError::BulkInsertIncomplete { .. }) => {
                return Err(self.locate(err));
            }
            Err(err) => {
                return Err(DocumentStoreError::BulkInsertIncomplete {
                    collection: self.name.clone(),
                    expected,
                    inserted: 0,
                    reason: err.to_string(),
                });
            }
        };

        let inserted = result.inserted_ids.len();
        if inserted != expected {
            warn!(
                target: "docprovider::provider",
                collection = %self.name,
                expected,
                inserted,
                "bulk insert acknowledged fewer documents than submitted"
            );
            return Err(DocumentStoreError::BulkInsertIncomplete {
                collection: self.name.clone(),
                expected,
                inserted,
                reason: "acknowledged count differs from input length".to_string(),
            });
        }

        debug!(target: "docprovider::provider", collection = %self.name, inserted, "documents created");
        Ok(result.inserted_ids)
    }

    /// Applies `patch` to the selected document(s).
    ///
    /// A [`Selector::ById`] targets one document. A [`Selector::ByFilter`] targets every match,
    /// unless `upsert` is requested, in which case it targets the first match.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::UpdateFailed`] unless the outcome is [`Outcome::Modified`] or
    /// [`Outcome::Created`].
    pub async fn update(
        &self,
        selector: impl Into<Selector>,
        patch: Document,
        options: UpdateOptions,
    ) -> DocumentStoreResult<Outcome> {
        let selector = selector.into();
        let single = selector.is_by_id() || options.upsert;
        let rendered = selector.to_string();
        let filter = selector.into_filter(self.id_field());

        let (result, outcome) = if single {
            let result = self
                .backend
                .update_one(&self.name, &filter, &patch, options.mode, options.upsert)
                .await
                .map_err(|err| self.locate(err))?;
            let outcome = Outcome::classify_single(&result);
            (result, outcome)
        } else {
            let result = self
                .backend
                .update_many(&self.name, &filter, &patch, options.mode)
                .await
                .map_err(|err| self.locate(err))?;
            let outcome = Outcome::classify_many(&result);
            (result, outcome)
        };

        if !outcome.is_success() {
            warn!(
                target: "docprovider::provider",
                collection = %self.name,
                selector = %rendered,
                matched = result.matched_count,
                modified = result.modified_count,
                ?outcome,
                "update had no effect"
            );
            return Err(DocumentStoreError::UpdateFailed {
                collection: self.name.clone(),
                selector: rendered,
                matched: result.matched_count,
                modified: result.modified_count,
            });
        }

        debug!(target: "docprovider::provider", collection = %self.name, mode = %options.mode, ?outcome, "update applied");
        Ok(outcome)
    }

    /// Replaces the selected document(s) with `value`, keeping their identifiers.
    ///
    /// Any identifier carried by `value` itself is ignored.
    pub async fn replace(
        &self,
        selector: impl Into<Selector>,
        value: &D,
        upsert: bool,
    ) -> DocumentStoreResult<Outcome> {
        let mut document = value.to_document()?;
        document.remove(self.id_field());

        self.update(
            selector,
            document,
            UpdateOptions::new()
                .with_mode(UpdateMode::Replace)
                .with_upsert(upsert),
        )
        .await
    }

    /// Removes the selected document(s) and returns the number removed.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::RemoveFailed`] when a [`Selector::ById`] did not remove exactly
    /// one document. A filter removing nothing is not an error.
    pub async fn remove(&self, selector: impl Into<Selector>) -> DocumentStoreResult<u64> {
        match selector.into() {
            Selector::ById(id) => {
                self.remove_one(Filter::eq(self.id_field(), id)).await?;
                Ok(1)
            }
            Selector::ByFilter(filter) => self.remove_many(filter).await,
        }
    }

    /// Removes the first document matching `filter`.
    ///
    /// # Errors
    ///
    /// [`DocumentStoreError::RemoveFailed`] unless exactly one document was removed.
    pub async fn remove_one(&self, filter: impl Into<Filter>) -> DocumentStoreResult<()> {
        let filter = filter.into();
        let result = self
            .backend
            .delete_one(&self.name, &filter)
            .await
            .map_err(|err| self.locate(err))?;

        if result.deleted_count != 1 {
            warn!(target: "docprovider::provider", collection = %self.name, %filter, deleted = result.deleted_count, "remove matched nothing");
            return Err(DocumentStoreError::RemoveFailed {
                collection: self.name.clone(),
                selector: filter.to_string(),
                deleted: result.deleted_count,
            });
        }

        debug!(target: "docprovider::provider", collection = %self.name, "document removed");
        Ok(())
    }

    /// Removes every document matching `filter` and returns the count.
    pub async fn remove_many(&self, filter: impl Into<Filter>) -> DocumentStoreResult<u64> {
        let filter = filter.into();
        let result = self
            .backend
            .delete_many(&self.name, &filter)
            .await
            .map_err(|err| self.locate(err))?;

        debug!(target: "docprovider::provider", collection = %self.name, deleted = result.deleted_count, "documents removed");
        Ok(result.deleted_count)
    }

    /// Returns the first selected document, or `None` when nothing matches.
    pub async fn get(
        &self,
        selector: impl Into<Selector>,
        options: FindOptions,
    ) -> DocumentStoreResult<Option<D>> {
        let filter = selector.into().into_filter(self.id_field());

        self.backend
            .find_one(&self.name, &filter, &options)
            .await
            .map_err(|err| self.locate(err))?
            .map(D::from_document)
            .transpose()
    }

    /// Returns every document matching `filter`.
    pub async fn find(
        &self,
        filter: impl Into<Filter>,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<D>> {
        let filter = filter.into();
        let documents = self
            .backend
            .find_many(&self.name, &filter, &options)
            .await
            .map_err(|err| self.locate(err))?;

        debug!(target: "docprovider::provider", collection = %self.name, %filter, found = documents.len(), "find");
        documents.into_iter().map(D::from_document).collect()
    }

    /// Opens a cursor over the documents matching `filter`.
    pub async fn for_each(
        &self,
        filter: impl Into<Filter>,
        options: FindOptions,
    ) -> DocumentStoreResult<Cursor<D>> {
        let filter = filter.into();
        let raw = self
            .backend
            .iterate(&self.name, &filter, &options)
            .await
            .map_err(|err| self.locate(err))?;

        Ok(Cursor::new(self.name.clone(), raw))
    }

    /// Counts the documents matching `filter`.
    ///
    /// An empty filter uses the store's estimated collection count.
    pub async fn count(&self, filter: impl Into<Filter>) -> DocumentStoreResult<u64> {
        let filter = filter.into();
        let count = if filter.is_empty() {
            self.backend.estimated_count(&self.name).await
        } else {
            self.backend.count_documents(&self.name, &filter).await
        };

        count.map_err(|err| self.locate(err))
    }

    /// Removes every document. Returns `true` when anything was removed.
    pub async fn clear(&self) -> DocumentStoreResult<bool> {
        Ok(self.remove_many(Filter::new()).await? > 0)
    }

    /// Creates an index and returns its name.
    pub async fn add_index(
        &self,
        keys: impl Into<IndexKeys>,
        options: IndexOptions,
    ) -> DocumentStoreResult<String> {
        let keys = keys.into();
        if keys.is_empty() {
            return Err(DocumentStoreError::InvalidDocument(
                "index requires at least one key".to_string(),
            ));
        }

        let name = self
            .backend
            .create_index(&self.name, &keys, &options)
            .await
            .map_err(|err| self.locate(err))?;

        debug!(target: "docprovider::provider", collection = %self.name, index = %name, "index created");
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(matched: u64, modified: u64, upserted: Option<Identifier>) -> UpdateResult {
        UpdateResult {
            matched_count: matched,
            modified_count: modified,
            upserted_id: upserted,
        }
    }

    #[test]
    fn single_target_classification() {
        let id = Identifier::new();

        assert_eq!(Outcome::classify_single(&result(1, 1, None)), Outcome::Modified);
        assert_eq!(Outcome::classify_single(&result(0, 0, Some(id))), Outcome::Created(id));
        assert_eq!(Outcome::classify_single(&result(0, 0, None)), Outcome::NotFound);
        assert_eq!(Outcome::classify_single(&result(1, 0, None)), Outcome::Unchanged);
    }

    #[test]
    fn many_target_classification() {
        assert_eq!(Outcome::classify_many(&result(3, 3, None)), Outcome::Modified);
        assert_eq!(Outcome::classify_many(&result(3, 2, None)), Outcome::Unchanged);
        assert_eq!(Outcome::classify_many(&result(0, 0, None)), Outcome::NotFound);
    }

    #[test]
    fn only_modified_and_created_succeed() {
        assert!(Outcome::Modified.is_success());
        assert!(Outcome::Created(Identifier::new()).is_success());
        assert!(!Outcome::Unchanged.is_success());
        assert!(!Outcome::NotFound.is_success());
    }

    #[test]
    fn selectors_normalize_to_filters() {
        let id = Identifier::new();

        assert_eq!(Selector::from(id).into_filter("_id"), Filter::eq("_id", id));

        let raw = bson::doc! { "value": { "$gt": 2 } };
        let selector = Selector::try_from(raw).unwrap();
        assert!(!selector.is_by_id());
    }
}
