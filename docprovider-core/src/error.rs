//! Error types and result types for provider and store operations.
//!
//! Every failure raised by a [`Provider`](crate::provider::Provider) operation surfaces as a
//! [`DocumentStoreError`] on the pending call. Variants that describe a rejected operation carry
//! the collection name and a rendering of the offending selector or value for diagnosis.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The input could not be parsed into the store's identifier format.
    #[error("Invalid identifier{}: {value}", located(.collection))]
    InvalidIdentifier {
        collection: Option<String>,
        value: String,
    },
    /// A single-document insert was not acknowledged by the store.
    #[error("Insert failed in collection {collection}: {value}")]
    InsertFailed {
        collection: String,
        value: String,
    },
    /// A bulk insert did not insert every item. Items inserted before the failure remain.
    #[error("Bulk insert incomplete in collection {collection}: {inserted} of {expected} documents acknowledged ({reason})")]
    BulkInsertIncomplete {
        collection: String,
        expected: usize,
        inserted: usize,
        reason: String,
    },
    /// An update neither modified a document nor upserted one.
    ///
    /// This includes the case where the target matched but already held the patched values.
    #[error("Update failed in collection {collection} for {selector}: matched {matched}, modified {modified}")]
    UpdateFailed {
        collection: String,
        selector: String,
        matched: u64,
        modified: u64,
    },
    /// A single-target delete did not remove exactly one document.
    #[error("Remove failed in collection {collection} for {selector}: deleted {deleted}")]
    RemoveFailed {
        collection: String,
        selector: String,
        deleted: u64,
    },
    /// The store could not be reached (connectivity or transport failure).
    #[error("Store unavailable{}: {reason}", located(.collection))]
    StoreUnavailable {
        collection: Option<String>,
        reason: String,
    },
    /// A document with the given identifier already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DuplicateKey(String, String),
    /// A filter could not be parsed, or could not be evaluated by the store.
    #[error("Invalid filter{}: {reason}", located(.collection))]
    InvalidFilter {
        collection: Option<String>,
        reason: String,
    },
    /// The document has an invalid structure for the requested operation.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

fn located(collection: &Option<String>) -> String {
    collection
        .as_deref()
        .map(|name| format!(" in collection {name}"))
        .unwrap_or_default()
}

impl DocumentStoreError {
    /// An [`InvalidIdentifier`](DocumentStoreError::InvalidIdentifier) not yet tied to a collection.
    pub fn invalid_identifier(value: impl Into<String>) -> Self {
        DocumentStoreError::InvalidIdentifier { collection: None, value: value.into() }
    }

    /// A [`StoreUnavailable`](DocumentStoreError::StoreUnavailable) not yet tied to a collection.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        DocumentStoreError::StoreUnavailable { collection: None, reason: reason.into() }
    }

    /// An [`InvalidFilter`](DocumentStoreError::InvalidFilter) not yet tied to a collection.
    pub fn invalid_filter(reason: impl Into<String>) -> Self {
        DocumentStoreError::InvalidFilter { collection: None, reason: reason.into() }
    }

    /// Records `name` as the collection of an error that does not carry one yet.
    pub fn in_collection(mut self, name: &str) -> Self {
        match &mut self {
            DocumentStoreError::InvalidIdentifier { collection, .. }
            | DocumentStoreError::StoreUnavailable { collection, .. }
            | DocumentStoreError::InvalidFilter { collection, .. }
                if collection.is_none() =>
            {
                *collection = Some(name.to_string());
            }
            _ => {}
        }
        self
    }

    /// Returns the collection the failed operation targeted, when the error records one.
    pub fn collection(&self) -> Option<&str> {
        match self {
            DocumentStoreError::InsertFailed { collection, .. }
            | DocumentStoreError::BulkInsertIncomplete { collection, .. }
            | DocumentStoreError::UpdateFailed { collection, .. }
            | DocumentStoreError::RemoveFailed { collection, .. } => Some(collection),
            DocumentStoreError::InvalidIdentifier { collection, .. }
            | DocumentStoreError::StoreUnavailable { collection, .. }
            | DocumentStoreError::InvalidFilter { collection, .. } => collection.as_deref(),
            DocumentStoreError::DuplicateKey(_, collection) => Some(collection),
            _ => None,
        }
    }

    /// Returns `true` for transport-level failures reported by the backend.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DocumentStoreError::StoreUnavailable { .. })
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
