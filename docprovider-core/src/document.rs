//! Document type traits and conversions.
//!
//! A [`Provider`](crate::provider::Provider) maps raw store documents into a bound
//! document type. Any serde type qualifies as a [`DocumentType`]; a [`Model`] additionally
//! names the collection it lives in so that a connection can hand out its provider directly.

use bson::{
    Document as BsonDocument,
    de::deserialize_from_document,
    ser::serialize_to_document,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::error::DocumentStoreResult;

/// Marker for types a provider can map documents into and out of.
///
/// Implemented for every `Serialize + DeserializeOwned` type, including [`bson::Document`]
/// itself for untyped access.
pub trait DocumentType: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> DocumentType for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// A document type bound to a named collection.
///
/// # Example
///
/// ```ignore
/// use docprovider::document::Model;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Profile {
///     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
///     pub id: Option<docprovider::identifier::Identifier>,
///     pub title: String,
///     pub email: String,
/// }
///
/// impl Model for Profile {
///     fn collection_name() -> &'static str {
///         "profile"
///     }
/// }
/// ```
pub trait Model: DocumentType {
    /// Returns the name of the collection this model is stored in.
    fn collection_name() -> &'static str;
}

/// Extension trait providing serialization utilities for document types.
///
/// Automatically implemented for all [`DocumentType`]s.
pub trait DocumentExt: DocumentType {
    /// Converts this value into a store document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the value is not a map.
    fn to_document(&self) -> DocumentStoreResult<BsonDocument>;

    /// Creates a value from a store document.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails or the structure is invalid.
    fn from_document(document: BsonDocument) -> DocumentStoreResult<Self>;

    /// Converts this value to a JSON value.
    fn to_json(&self) -> DocumentStoreResult<Value>;

    /// Creates a value from a JSON value.
    fn from_json(value: Value) -> DocumentStoreResult<Self>;
}

impl<D: DocumentType> DocumentExt for D {
    fn to_document(&self) -> DocumentStoreResult<BsonDocument> {
        Ok(serialize_to_document(self)?)
    }

    fn from_document(document: BsonDocument) -> DocumentStoreResult<Self> {
        Ok(deserialize_from_document(document)?)
    }

    fn to_json(&self) -> DocumentStoreResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> DocumentStoreResult<Self> {
        Ok(from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Identifier;
    use bson::doc;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
        id: Option<Identifier>,
        title: String,
    }

    #[test]
    fn typed_documents_map_to_and_from_store_documents() {
        let profile = Profile { id: None, title: "Alex".into() };
        let document = profile.to_document().unwrap();

        assert_eq!(document, doc! { "title": "Alex" });

        let id = Identifier::new();
        let restored = Profile::from_document(doc! { "_id": id, "title": "Alex" }).unwrap();
        assert_eq!(restored.id, Some(id));
    }

    #[test]
    fn json_conversion_keeps_fields() {
        let profile = Profile { id: None, title: "Alex".into() };
        let json = profile.to_json().unwrap();

        assert_eq!(json["title"], "Alex");
        assert_eq!(Profile::from_json(json).unwrap(), profile);
    }
}
