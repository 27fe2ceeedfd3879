use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, Cursor as MongoCursor, IndexModel,
    error::{Error as MongoError, ErrorKind, InsertManyError},
    options::{ClientOptions, FindOptions as MongoFindOptions, IndexOptions as MongoIndexOptions},
};
use tracing::{debug, warn};

use docprovider_core::{
    backend::{
        DeleteResult, IndexKeys, IndexOptions, InsertManyResult, RawCursor, StoreBackend,
        StoreBackendBuilder, UpdateMode, UpdateResult,
    },
    config::ConnectionConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Filter,
    identifier::Identifier,
    query::{FindOptions, SortDirection},
};

use crate::query::{MongoQueryTranslator, find_options};

/// Maps driver errors: transport and server selection failures mean the store is unreachable.
fn store_error(err: MongoError) -> DocumentStoreError {
    match err.kind.as_ref() {
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } => {
            DocumentStoreError::unavailable(err.to_string())
        }
        _ => DocumentStoreError::Backend(err.to_string()),
    }
}

/// Number of documents an ordered bulk insert stored before its first rejected write.
fn inserted_before_failure(err: &MongoError) -> Option<usize> {
    match err.kind.as_ref() {
        ErrorKind::InsertMany(InsertManyError { write_errors: Some(errors), .. }) => {
            errors.iter().map(|error| error.index).min()
        }
        _ => None,
    }
}

/// Gives the document a native identifier in front, converting a string form and assigning a
/// fresh one when absent.
fn with_identifier(document: Document, id_field: &str) -> DocumentStoreResult<(Identifier, Document)> {
    let id = match document.get(id_field) {
        Some(raw) => Identifier::try_from(raw)?,
        None => Identifier::new(),
    };

    let mut prepared = doc! { id_field: id };
    for (key, value) in document {
        if key != id_field {
            prepared.insert(key, value);
        }
    }

    Ok((id, prepared))
}

fn upserted(id: Option<Bson>) -> DocumentStoreResult<Option<Identifier>> {
    id.as_ref().map(Identifier::try_from).transpose()
}

fn without_id(patch: &Document, id_field: &str) -> Document {
    patch
        .iter()
        .filter(|(key, _)| *key != id_field)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(config: ConnectionConfig) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(config)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Identifier> {
        let (id, document) = with_identifier(document, self.id_field())?;

        self.get_collection(collection)
            .insert_one(document)
            .await
            .map_err(store_error)?;

        debug!(target: "docprovider::mongodb", collection, %id, "inserted document");
        Ok(id)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyResult> {
        let id_field = self.id_field();
        let expected = documents.len();
        let mut prepared = Vec::with_capacity(expected);
        let mut inserted_ids = Vec::with_capacity(expected);

        for document in documents {
            let (id, document) = with_identifier(document, id_field)?;
            prepared.push(document);
            inserted_ids.push(id);
        }

        let target = self.get_collection(collection);
        if let Err(failure) = target.insert_many(prepared).await {
            let rejected_at = inserted_before_failure(&failure);
            let err = store_error(failure);
            if err.is_unavailable() {
                return Err(err);
            }

            let inserted = match rejected_at {
                Some(index) => index,
                None => target
                    .count_documents(doc! { id_field: { "$in": inserted_ids.clone() } })
                    .await
                    .map_err(store_error)? as usize,
            };
            warn!(target: "docprovider::mongodb", collection, expected, inserted, error = %err, "bulk insert interrupted");

            return Err(DocumentStoreError::BulkInsertIncomplete {
                collection: collection.to_string(),
                expected,
                inserted,
                reason: err.to_string(),
            });
        }

        debug!(target: "docprovider::mongodb", collection, inserted = expected, "inserted documents");
        Ok(InsertManyResult { inserted_ids })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
        mode: UpdateMode,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateResult> {
        let target = self.get_collection(collection);
        let query = MongoQueryTranslator::translate(filter)?;
        let patch = without_id(patch, self.id_field());

        let result = match mode {
            UpdateMode::Merge => target
                .update_one(query, doc! { "$set": patch })
                .upsert(upsert)
                .await,
            UpdateMode::Replace => target
                .replace_one(query, patch)
                .upsert(upsert)
                .await,
        }
        .map_err(store_error)?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: upserted(result.upserted_id)?,
        })
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
        mode: UpdateMode,
    ) -> DocumentStoreResult<UpdateResult> {
        let target = self.get_collection(collection);
        let query = MongoQueryTranslator::translate(filter)?;
        let patch = without_id(patch, self.id_field());
        let id_field = self.id_field();

        let result = match mode {
            UpdateMode::Merge => target.update_many(query, doc! { "$set": patch }).await,
            UpdateMode::Replace => {
                let id_ref = format!("${id_field}");
                let pipeline = vec![doc! {
                    "$replaceWith": {
                        "$mergeObjects": [{ "$literal": patch }, { id_field: id_ref }],
                    },
                }];
                target.update_many(query, pipeline).await
            }
        }
        .map_err(store_error)?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: None,
        })
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<DeleteResult> {
        let result = self
            .get_collection(collection)
            .delete_one(MongoQueryTranslator::translate(filter)?)
            .await
            .map_err(store_error)?;

        Ok(DeleteResult { deleted_count: result.deleted_count })
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<DeleteResult> {
        let result = self
            .get_collection(collection)
            .delete_many(MongoQueryTranslator::translate(filter)?)
            .await
            .map_err(store_error)?;

        debug!(target: "docprovider::mongodb", collection, deleted = result.deleted_count, "deleted documents");
        Ok(DeleteResult { deleted_count: result.deleted_count })
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        let mut translated = find_options(options);
        translated.limit = Some(1);

        self.get_collection(collection)
            .find(MongoQueryTranslator::translate(filter)?)
            .with_options(translated)
            .await
            .map_err(store_error)?
            .try_next()
            .await
            .map_err(store_error)
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.get_collection(collection)
            .find(MongoQueryTranslator::translate(filter)?)
            .with_options(find_options(options))
            .await
            .map_err(store_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(store_error)
    }

    async fn estimated_count(&self, collection: &str) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .estimated_document_count()
            .await
            .map_err(store_error)
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<u64> {
        self.get_collection(collection)
            .count_documents(MongoQueryTranslator::translate(filter)?)
            .await
            .map_err(store_error)
    }

    async fn iterate(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Box<dyn RawCursor>> {
        let mut cursor = MongoRawCursor {
            collection: self.get_collection(collection),
            query: MongoQueryTranslator::translate(filter)?,
            options: find_options(options),
            cursor: None,
        };
        cursor.open().await?;

        Ok(Box::new(cursor))
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: &IndexKeys,
        options: &IndexOptions,
    ) -> DocumentStoreResult<String> {
        let spec = keys
            .keys()
            .iter()
            .map(|(field, direction)| {
                let direction = match direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                };
                (field.clone(), Bson::Int32(direction))
            })
            .collect::<Document>();

        let mut index_options = MongoIndexOptions::default();
        index_options.name = options.name.clone();
        index_options.unique = Some(options.unique);

        let result = self
            .get_collection(collection)
            .create_index(IndexModel::builder().keys(spec).options(index_options).build())
            .await
            .map_err(store_error)?;

        debug!(target: "docprovider::mongodb", collection, index = %result.index_name, "created index");
        Ok(result.index_name)
    }

    async fn shutdown(self) -> DocumentStoreResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// Driver cursor that can be reopened from its query.
#[derive(Debug)]
struct MongoRawCursor {
    collection: MongoCollection<Document>,
    query: Document,
    options: MongoFindOptions,
    cursor: Option<MongoCursor<Document>>,
}

impl MongoRawCursor {
    async fn open(&mut self) -> DocumentStoreResult<()> {
        let cursor = self
            .collection
            .find(self.query.clone())
            .with_options(self.options.clone())
            .await
            .map_err(store_error)?;

        self.cursor = Some(cursor);
        Ok(())
    }
}

#[async_trait]
impl RawCursor for MongoRawCursor {
    async fn advance(&mut self) -> DocumentStoreResult<Option<Document>> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor.try_next().await.map_err(store_error),
            None => Ok(None),
        }
    }

    async fn rewind(&mut self) -> DocumentStoreResult<()> {
        self.cursor = None;
        self.open().await
    }

    async fn close(&mut self) -> DocumentStoreResult<()> {
        // Dropping the driver cursor kills it server-side.
        self.cursor = None;
        Ok(())
    }
}

/// Builds a [`MongoDbStore`] from a [`ConnectionConfig`], verifying the server responds.
#[derive(Debug, Clone)]
pub struct MongoDbStoreBuilder {
    config: ConnectionConfig,
}

impl MongoDbStoreBuilder {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    /// Reads the configuration from `DB_URL` / `DB_NAME`.
    pub fn from_env() -> Self {
        Self::new(ConnectionConfig::from_env())
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let options = ClientOptions::parse(&self.config.url)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        let client = Client::with_options(options)
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        client
            .database(&self.config.database_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(store_error)?;

        debug!(target: "docprovider::mongodb", database = %self.config.database_name, "connected");
        Ok(MongoDbStore::new(client, self.config.database_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_identifier_is_assigned_in_front() {
        let (id, document) = with_identifier(doc! { "name": "A" }, "_id").unwrap();

        assert_eq!(document, doc! { "_id": id, "name": "A" });
    }

    #[test]
    fn string_identifier_is_stored_in_native_form() {
        let id = Identifier::new();
        let (parsed, document) =
            with_identifier(doc! { "name": "A", "_id": id.to_string() }, "_id").unwrap();

        assert_eq!(parsed, id);
        assert_eq!(document.get("_id"), Some(&Bson::ObjectId(*id.as_object_id())));
        assert_eq!(document.len(), 2);
    }

    #[test]
    fn malformed_identifier_is_rejected_before_insert() {
        let result = with_identifier(doc! { "_id": "not-hex" }, "_id");

        assert!(matches!(result, Err(DocumentStoreError::InvalidIdentifier { .. })));
    }

    fn insert_many_failure(write_errors: Document) -> MongoError {
        let failure: InsertManyError = bson::de::deserialize_from_document(write_errors).unwrap();
        MongoError::from(ErrorKind::InsertMany(failure))
    }

    #[test]
    fn bulk_insert_stops_at_first_rejected_write() {
        let err = insert_many_failure(doc! {
            "writeErrors": [
                { "index": 3_i64, "code": 11000, "errmsg": "duplicate key" },
                { "index": 2_i64, "code": 11000, "errmsg": "duplicate key" },
            ]
        });

        assert_eq!(inserted_before_failure(&err), Some(2));
    }

    #[test]
    fn write_concern_failure_leaves_count_to_store() {
        let err = insert_many_failure(doc! {
            "writeConcernError": { "code": 64, "errmsg": "waiting for replication timed out" }
        });

        assert_eq!(inserted_before_failure(&err), None);
    }
}
