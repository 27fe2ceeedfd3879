//! Canonical document identifiers.
//!
//! Identifiers have a dual representation: the store's native object id handle and its
//! 24 hex digit string form. Both canonicalize to the same [`Identifier`], which compares
//! by value and renders back to the string form through [`Display`](std::fmt::Display).
//!
//! # Example
//!
//! ```ignore
//! use docprovider::identifier::{Identifier, IntoIdentifier};
//!
//! let id = Identifier::new();
//! let same = id.to_string().into_identifier()?;
//! assert_eq!(id, same);
//! ```

use bson::{Bson, oid::ObjectId};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Opaque canonical key of a document within a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(ObjectId);

impl Identifier {
    /// Generates a fresh identifier.
    pub fn new() -> Self {
        Identifier(ObjectId::new())
    }

    /// Parses the string representation of an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidIdentifier`] if `value` is not a valid object id.
    pub fn parse(value: &str) -> DocumentStoreResult<Self> {
        ObjectId::parse_str(value)
            .map(Identifier)
            .map_err(|_| DocumentStoreError::invalid_identifier(value))
    }

    /// Returns the native handle.
    pub fn as_object_id(&self) -> &ObjectId {
        &self.0
    }
}

impl Default for Identifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

impl FromStr for Identifier {
    type Err = DocumentStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
    }
}

impl From<ObjectId> for Identifier {
    fn from(oid: ObjectId) -> Self {
        Identifier(oid)
    }
}

impl From<Identifier> for ObjectId {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl From<Identifier> for Bson {
    fn from(id: Identifier) -> Self {
        Bson::ObjectId(id.0)
    }
}

impl TryFrom<&Bson> for Identifier {
    type Error = DocumentStoreError;

    fn try_from(value: &Bson) -> Result<Self, Self::Error> {
        match value {
            Bson::ObjectId(oid) => Ok(Identifier(*oid)),
            Bson::String(s) => Identifier::parse(s),
            other => Err(DocumentStoreError::invalid_identifier(other.to_string())),
        }
    }
}

/// Conversion trait canonicalizing raw identifier representations.
///
/// Implemented for the native handle, string forms, BSON values and [`Identifier`] itself,
/// so call sites can accept whichever representation they were handed.
pub trait IntoIdentifier {
    /// Canonicalizes this value.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidIdentifier`] when the value cannot be parsed.
    fn into_identifier(self) -> DocumentStoreResult<Identifier>;
}

impl IntoIdentifier for Identifier {
    fn into_identifier(self) -> DocumentStoreResult<Identifier> {
        Ok(self)
    }
}

impl IntoIdentifier for ObjectId {
    fn into_identifier(self) -> DocumentStoreResult<Identifier> {
        Ok(Identifier(self))
    }
}

impl IntoIdentifier for &str {
    fn into_identifier(self) -> DocumentStoreResult<Identifier> {
        Identifier::parse(self)
    }
}

impl IntoIdentifier for String {
    fn into_identifier(self) -> DocumentStoreResult<Identifier> {
        Identifier::parse(&self)
    }
}

impl IntoIdentifier for &Bson {
    fn into_identifier(self) -> DocumentStoreResult<Identifier> {
        Identifier::try_from(self)
    }
}

impl IntoIdentifier for Bson {
    fn into_identifier(self) -> DocumentStoreResult<Identifier> {
        Identifier::try_from(&self)
    }
}
