//! In-memory storage implementation.
//!
//! Collections are ordered vectors of BSON documents kept behind an async-aware read-write
//! lock. Every operation takes the lock once, so each call is atomic with respect to the
//! others. Documents keep their insertion order, which is the natural order reads return
//! when no sort is requested.

use std::{cmp::Ordering, collections::{HashMap, VecDeque}, sync::Arc};

use async_trait::async_trait;
use bson::{Bson, Document};
use mea::rwlock::RwLock;
use tracing::debug;

use docprovider_core::{
    backend::{
        DeleteResult, IndexKeys, IndexOptions, InsertManyResult, RawCursor, StoreBackend,
        StoreBackendBuilder, UpdateMode, UpdateResult,
    },
    error::{DocumentStoreError, DocumentStoreResult},
    filter::{Clause, Condition, Filter},
    identifier::Identifier,
    query::{FindOptions, Projection, Sort, SortDirection},
};

use crate::evaluator::{Comparable, DocumentEvaluator, resolve};

const DEFAULT_ID_FIELD: &str = "_id";

#[derive(Debug, Clone)]
struct IndexSpec {
    name: String,
    fields: Vec<String>,
    unique: bool,
}

#[derive(Debug, Default)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<IndexSpec>,
}

type StoreMap = HashMap<String, CollectionState>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state; clones share the
/// same data. Queries scan every document of a collection. Indexes are recorded by name and
/// unique indexes are enforced on writes, but they never speed up reads.
///
/// # Example
///
/// ```ignore
/// use docprovider_memory::InMemoryStore;
/// use docprovider::backend::StoreBackend;
/// use docprovider::filter::Filter;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let id = store.insert_one("users", doc! { "name": "Alice", "age": 30 }).await?;
/// let found = store
///     .find_one("users", &Filter::eq("_id", id), &Default::default())
///     .await?;
/// assert!(found.is_some());
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    store: Arc<RwLock<StoreMap>>,
    id_field: Arc<str>,
}

impl InMemoryStore {
    /// Creates a new empty store using `_id` as the identifier field.
    pub fn new() -> Self {
        Self::with_id_field(DEFAULT_ID_FIELD)
    }

    /// Creates a new empty store using `id_field` as the identifier field.
    pub fn with_id_field(id_field: &str) -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
            id_field: Arc::from(id_field),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore` with custom options.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    async fn select(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;

        match store.get(collection) {
            Some(state) => state.select(filter, options, &self.id_field),
            None => Ok(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionState {
    fn position(&self, filter: &Filter) -> DocumentStoreResult<Option<usize>> {
        for (index, document) in self.documents.iter().enumerate() {
            if DocumentEvaluator::new(document).evaluate(filter)? {
                return Ok(Some(index));
            }
        }

        Ok(None)
    }

    fn positions(&self, filter: &Filter) -> DocumentStoreResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (index, document) in self.documents.iter().enumerate() {
            if DocumentEvaluator::new(document).evaluate(filter)? {
                positions.push(index);
            }
        }

        Ok(positions)
    }

    fn select(
        &self,
        filter: &Filter,
        options: &FindOptions,
        id_field: &str,
    ) -> DocumentStoreResult<Vec<Document>> {
        let mut matched = DocumentEvaluator::filter_documents(&self.documents, filter)?;

        if !options.sort.is_empty() {
            matched.sort_by(|a, b| compare_by(&options.sort, a, b));
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = match options.limit {
            Some(0) | None => usize::MAX,
            Some(limit) => limit as usize,
        };

        Ok(matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| match &options.projection {
                Some(projection) => project(document, projection, id_field),
                None => document,
            })
            .collect())
    }

    /// Rejects `candidate` when it collides with another document on the identifier or on a
    /// unique index. `skip` is the candidate's own position when it is already stored.
    fn check_unique(
        &self,
        collection: &str,
        candidate: &Document,
        id_field: &str,
        skip: Option<usize>,
    ) -> DocumentStoreResult<()> {
        let others = self
            .documents
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != skip)
            .map(|(_, document)| document);

        for other in others {
            if let (Some(a), Some(b)) = (candidate.get(id_field), other.get(id_field)) {
                if a == b {
                    return Err(DocumentStoreError::DuplicateKey(
                        a.to_string(),
                        collection.to_string(),
                    ));
                }
            }

            for index in self.indexes.iter().filter(|index| index.unique) {
                if index_key(candidate, &index.fields) == index_key(other, &index.fields) {
                    return Err(DocumentStoreError::DuplicateKey(
                        format!("{} (index {})", render_key(candidate, &index.fields), index.name),
                        collection.to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn compare_by(sort: &[Sort], a: &Document, b: &Document) -> Ordering {
    for key in sort {
        let left = resolve(a, &key.field);
        let right = resolve(b, &key.field);
        let left = left.first().map(|v| Comparable::from(*v)).unwrap_or(Comparable::Null);
        let right = right.first().map(|v| Comparable::from(*v)).unwrap_or(Comparable::Null);

        let ordering = match key.direction {
            SortDirection::Asc => left.sort_cmp(&right),
            SortDirection::Desc => right.sort_cmp(&left),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

fn index_key<'a>(document: &'a Document, fields: &[String]) -> Vec<Comparable<'a>> {
    fields
        .iter()
        .map(|field| {
            resolve(document, field)
                .first()
                .map(|v| Comparable::from(*v))
                .unwrap_or(Comparable::Null)
        })
        .collect()
}

fn render_key(document: &Document, fields: &[String]) -> String {
    fields
        .iter()
        .map(|field| {
            let value = resolve(document, field)
                .first()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "null".to_string());
            format!("{field}: {value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Applies a projection to top-level fields.
///
/// Any included field other than the identifier switches to inclusion mode, where the
/// identifier is kept unless explicitly excluded.
fn project(mut document: Document, projection: &Projection, id_field: &str) -> Document {
    let fields = projection.fields();
    let inclusion = fields
        .iter()
        .any(|(field, include)| *include && field != id_field);

    if !inclusion {
        for (field, _) in fields {
            document.remove(field);
        }
        return document;
    }

    let keep_id = !fields
        .iter()
        .any(|(field, include)| field == id_field && !include);
    let mut projected = Document::new();

    if keep_id {
        if let Some(id) = document.get(id_field) {
            projected.insert(id_field, id.clone());
        }
    }

    for (field, _) in fields
        .iter()
        .filter(|(field, include)| *include && field != id_field)
    {
        if let Some(value) = document.remove(field) {
            projected.insert(field.clone(), value);
        }
    }

    projected
}

/// Sets a dot-separated path, creating intermediate sub-documents as needed.
fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                set_path(child, rest, value);
            }
        }
    }
}

/// Applies `patch` and returns whether the document changed.
fn apply_patch(document: &mut Document, patch: &Document, mode: UpdateMode, id_field: &str) -> bool {
    let before = document.clone();

    match mode {
        UpdateMode::Merge => {
            for (key, value) in patch.iter().filter(|(key, _)| *key != id_field) {
                set_path(document, key, value.clone());
            }
        }
        UpdateMode::Replace => {
            let mut replaced = Document::new();
            if let Some(id) = document.get(id_field) {
                replaced.insert(id_field, id.clone());
            }
            for (key, value) in patch.iter().filter(|(key, _)| *key != id_field) {
                replaced.insert(key.clone(), value.clone());
            }
            *document = replaced;
        }
    }

    *document != before
}

/// Ensures the document carries a native identifier, assigning a fresh one when absent.
fn normalize_id(document: Document, id_field: &str) -> DocumentStoreResult<(Identifier, Document)> {
    match document.get(id_field) {
        Some(raw) => {
            let id = Identifier::try_from(raw)?;
            let mut document = document;
            document.insert(id_field, id);
            Ok((id, document))
        }
        None => {
            let id = Identifier::new();
            let mut with_id = Document::new();
            with_id.insert(id_field, id);
            with_id.extend(document);
            Ok((id, with_id))
        }
    }
}

/// Builds the document an upsert inserts: the filter's top-level equality fields (merge mode
/// only) overlaid with the patch.
fn upsert_seed(
    filter: &Filter,
    patch: &Document,
    mode: UpdateMode,
    id_field: &str,
) -> DocumentStoreResult<(Identifier, Document)> {
    let id = match filter.field(id_field) {
        Some(Condition::Literal(raw)) => Identifier::try_from(raw)?,
        _ => Identifier::new(),
    };

    let mut document = Document::new();
    document.insert(id_field, id);

    if mode == UpdateMode::Merge {
        for clause in filter.clauses() {
            if let Clause::Field { path, condition: Condition::Literal(value) } = clause {
                if path != id_field {
                    set_path(&mut document, path, value.clone());
                }
            }
        }
    }

    apply_patch(&mut document, patch, mode, id_field);
    Ok((id, document))
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    fn id_field(&self) -> &str {
        &self.id_field
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Identifier> {
        let (id, document) = normalize_id(document, &self.id_field)?;

        let mut store = self.store.write().await;
        let state = store.entry(collection.to_string()).or_default();

        state.check_unique(collection, &document, &self.id_field, None)?;
        state.documents.push(document);

        debug!(target: "docprovider::memory", collection, %id, "inserted document");
        Ok(id)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyResult> {
        let expected = documents.len();
        let mut store = self.store.write().await;
        let state = store.entry(collection.to_string()).or_default();
        let mut inserted_ids = Vec::with_capacity(expected);

        for document in documents {
            let stored = normalize_id(document, &self.id_field).and_then(|(id, document)| {
                state.check_unique(collection, &document, &self.id_field, None)?;
                Ok((id, document))
            });

            match stored {
                Ok((id, document)) => {
                    state.documents.push(document);
                    inserted_ids.push(id);
                }
                Err(err) => {
                    return Err(DocumentStoreError::BulkInsertIncomplete {
                        collection: collection.to_string(),
                        expected,
                        inserted: inserted_ids.len(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        debug!(target: "docprovider::memory", collection, inserted = inserted_ids.len(), "inserted documents");
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
        let mut store = self.store.write().await;
        let state = store.entry(collection.to_string()).or_default();

        match state.position(filter)? {
            Some(position) => {
                let mut candidate = state.documents[position].clone();
                let changed = apply_patch(&mut candidate, patch, mode, &self.id_field);

                if changed {
                    state.check_unique(collection, &candidate, &self.id_field, Some(position))?;
                    state.documents[position] = candidate;
                }

                Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: u64::from(changed),
                    upserted_id: None,
                })
            }
            None if upsert => {
                let (id, document) = upsert_seed(filter, patch, mode, &self.id_field)?;
                state.check_unique(collection, &document, &self.id_field, None)?;
                state.documents.push(document);

                debug!(target: "docprovider::memory", collection, %id, "upserted document");
                Ok(UpdateResult {
                    matched_count: 0,
                    modified_count: 0,
                    upserted_id: Some(id),
                })
            }
            None => Ok(UpdateResult::default()),
        }
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
        mode: UpdateMode,
    ) -> DocumentStoreResult<UpdateResult> {
        let mut store = self.store.write().await;
        let Some(state) = store.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };

        let positions = state.positions(filter)?;
        let mut modified_count = 0;

        for &position in &positions {
            let mut candidate = state.documents[position].clone();
            if apply_patch(&mut candidate, patch, mode, &self.id_field) {
                state.check_unique(collection, &candidate, &self.id_field, Some(position))?;
                state.documents[position] = candidate;
                modified_count += 1;
            }
        }

        Ok(UpdateResult {
            matched_count: positions.len() as u64,
            modified_count,
            upserted_id: None,
        })
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<DeleteResult> {
        let mut store = self.store.write().await;
        let Some(state) = store.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };

        match state.position(filter)? {
            Some(position) => {
                state.documents.remove(position);
                Ok(DeleteResult { deleted_count: 1 })
            }
            None => Ok(DeleteResult::default()),
        }
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<DeleteResult> {
        let mut store = self.store.write().await;
        let Some(state) = store.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };

        let doomed = state.positions(filter)?;
        let mut position = 0;
        state.documents.retain(|_| {
            let keep = doomed.binary_search(&position).is_err();
            position += 1;
            keep
        });

        debug!(target: "docprovider::memory", collection, deleted = doomed.len(), "deleted documents");
        Ok(DeleteResult { deleted_count: doomed.len() as u64 })
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        let options = FindOptions { limit: Some(1), ..options.clone() };
        Ok(self
            .select(collection, filter, &options)
            .await?
            .into_iter()
            .next())
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.select(collection, filter, options).await
    }

    async fn estimated_count(&self, collection: &str) -> DocumentStoreResult<u64> {
        Ok(self
            .store
            .read()
            .await
            .get(collection)
            .map_or(0, |state| state.documents.len() as u64))
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;

        match store.get(collection) {
            Some(state) => Ok(state.positions(filter)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn iterate(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Box<dyn RawCursor>> {
        let buffer = self.select(collection, filter, options).await?;

        Ok(Box::new(MemoryCursor {
            store: self.clone(),
            collection: collection.to_string(),
            filter: filter.clone(),
            options: options.clone(),
            buffer: buffer.into(),
            closed: false,
        }))
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: &IndexKeys,
        options: &IndexOptions,
    ) -> DocumentStoreResult<String> {
        let name = options.name.clone().unwrap_or_else(|| keys.default_name());
        let mut store = self.store.write().await;
        let state = store.entry(collection.to_string()).or_default();

        if state.indexes.iter().any(|index| index.name == name) {
            return Ok(name);
        }

        let spec = IndexSpec {
            name: name.clone(),
            fields: keys.keys().iter().map(|(field, _)| field.clone()).collect(),
            unique: options.unique,
        };

        if spec.unique {
            for (i, a) in state.documents.iter().enumerate() {
                for b in &state.documents[i + 1..] {
                    if index_key(a, &spec.fields) == index_key(b, &spec.fields) {
                        return Err(DocumentStoreError::DuplicateKey(
                            format!("{} (index {})", render_key(a, &spec.fields), name),
                            collection.to_string(),
                        ));
                    }
                }
            }
        }

        state.indexes.push(spec);

        debug!(target: "docprovider::memory", collection, index = %name, "created index");
        Ok(name)
    }
}

/// Cursor over a snapshot of matching documents; rewinding re-runs the query.
#[derive(Debug)]
struct MemoryCursor {
    store: InMemoryStore,
    collection: String,
    filter: Filter,
    options: FindOptions,
    buffer: VecDeque<Document>,
    closed: bool,
}

#[async_trait]
impl RawCursor for MemoryCursor {
    async fn advance(&mut self) -> DocumentStoreResult<Option<Document>> {
        if self.closed {
            return Ok(None);
        }

        Ok(self.buffer.pop_front())
    }

    async fn rewind(&mut self) -> DocumentStoreResult<()> {
        self.buffer = self
            .store
            .select(&self.collection, &self.filter, &self.options)
            .await?
            .into();
        self.closed = false;
        Ok(())
    }

    async fn close(&mut self) -> DocumentStoreResult<()> {
        self.closed = true;
        self.buffer.clear();
        Ok(())
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// ```ignore
/// use docprovider_memory::InMemoryStore;
/// use docprovider::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().with_id_field("key").build().await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    id_field: Option<String>,
}

impl InMemoryStoreBuilder {
    /// Sets the identifier field name (default `_id`).
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = Some(id_field.into());
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let id_field = self.id_field.as_deref().unwrap_or(DEFAULT_ID_FIELD);
        if id_field.is_empty() {
            return Err(DocumentStoreError::Initialization(
                "identifier field name must not be empty".to_string(),
            ));
        }

        Ok(InMemoryStore::with_id_field(id_field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docprovider_core::query::Query;

    fn values(documents: &[Document]) -> Vec<i32> {
        documents
            .iter()
            .map(|d| d.get_i32("value").unwrap())
            .collect()
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_many(
                "items",
                vec![
                    doc! { "name": "A", "value": 1 },
                    doc! { "name": "B", "value": 2 },
                    doc! { "name": "C", "value": 3 },
                    doc! { "name": "D", "value": 4 },
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn inserts_assign_identifiers_first() {
        let store = InMemoryStore::new();
        let id = store.insert_one("items", doc! { "name": "A" }).await.unwrap();

        let stored = store
            .find_one("items", &Filter::eq("_id", id), &FindOptions::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stored.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(stored.get_str("name").unwrap(), "A");
    }

    #[tokio::test]
    async fn duplicate_identifier_stops_bulk_insert_without_rollback() {
        let store = InMemoryStore::new();
        let id = Identifier::new();

        let result = store
            .insert_many(
                "items",
                vec![doc! { "_id": id, "n": 1 }, doc! { "n": 2 }, doc! { "_id": id, "n": 3 }, doc! { "n": 4 }],
            )
            .await;

        match result {
            Err(DocumentStoreError::BulkInsertIncomplete { expected, inserted, .. }) => {
                assert_eq!((expected, inserted), (4, 2));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(store.estimated_count("items").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sort_skip_limit_and_projection() {
        let store = seeded().await;
        let options = Query::builder()
            .sort("value", SortDirection::Desc)
            .skip(1)
            .limit(2)
            .select(["value"])
            .build()
            .options;

        let found = store
            .find_many("items", &Filter::new(), &options)
            .await
            .unwrap();

        assert_eq!(values(&found), vec![3, 2]);
        assert!(found.iter().all(|d| d.contains_key("_id") && !d.contains_key("name")));
    }

    #[tokio::test]
    async fn exclusion_projection_drops_listed_fields() {
        let store = seeded().await;
        let options = FindOptions::new().select(["-name", "-_id"]);

        let found = store
            .find_many("items", &Filter::eq("value", 1), &options)
            .await
            .unwrap();

        assert_eq!(found, vec![doc! { "value": 1 }]);
    }

    #[tokio::test]
    async fn merge_update_counts_only_real_changes() {
        let store = seeded().await;
        let filter = Filter::eq("name", "B");

        let changed = store
            .update_one("items", &filter, &doc! { "value": 20 }, UpdateMode::Merge, false)
            .await
            .unwrap();
        assert_eq!((changed.matched_count, changed.modified_count), (1, 1));

        let unchanged = store
            .update_one("items", &filter, &doc! { "value": 20 }, UpdateMode::Merge, false)
            .await
            .unwrap();
        assert_eq!((unchanged.matched_count, unchanged.modified_count), (1, 0));
    }

    #[tokio::test]
    async fn replace_keeps_the_identifier() {
        let store = InMemoryStore::new();
        let id = store
            .insert_one("items", doc! { "name": "A", "value": 1 })
            .await
            .unwrap();

        store
            .update_one("items", &Filter::eq("_id", id), &doc! { "label": "x" }, UpdateMode::Replace, false)
            .await
            .unwrap();

        let stored = store
            .find_one("items", &Filter::eq("_id", id), &FindOptions::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, doc! { "_id": id, "label": "x" });
    }

    #[tokio::test]
    async fn upsert_seeds_from_filter_equalities() {
        let store = seeded().await;

        let result = store
            .update_one("items", &Filter::eq("name", "F"), &doc! { "value": 6 }, UpdateMode::Merge, true)
            .await
            .unwrap();

        let id = result.upserted_id.unwrap();
        let stored = store
            .find_one("items", &Filter::eq("_id", id), &FindOptions::new())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stored.get_str("name").unwrap(), "F");
        assert_eq!(stored.get_i32("value").unwrap(), 6);
        assert_eq!(result.matched_count, 0);
    }

    #[tokio::test]
    async fn update_many_and_delete_many() {
        let store = seeded().await;
        let bigger = Query::builder().is_greater_than("value", 2).into_filter();

        let updated = store
            .update_many("items", &bigger, &doc! { "flag": true }, UpdateMode::Merge)
            .await
            .unwrap();
        assert_eq!((updated.matched_count, updated.modified_count), (2, 2));

        let deleted = store.delete_many("items", &bigger).await.unwrap();
        assert_eq!(deleted.deleted_count, 2);

        let left = store
            .find_many("items", &Filter::new(), &FindOptions::new())
            .await
            .unwrap();
        assert_eq!(values(&left), vec![1, 2]);
    }

    #[tokio::test]
    async fn unique_index_rejects_collisions() {
        let store = seeded().await;

        let name = store
            .create_index("items", &IndexKeys::from("name"), &IndexOptions { name: None, unique: true })
            .await
            .unwrap();
        assert_eq!(name, "name_1");

        let duplicate = store.insert_one("items", doc! { "name": "A", "value": 9 }).await;
        assert!(matches!(duplicate, Err(DocumentStoreError::DuplicateKey(_, _))));
    }

    #[tokio::test]
    async fn unique_index_over_duplicates_fails() {
        let store = seeded().await;
        store.insert_one("items", doc! { "name": "A", "value": 5 }).await.unwrap();

        let result = store
            .create_index("items", &IndexKeys::from("name"), &IndexOptions { name: None, unique: true })
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cursor_rewind_requeries() {
        let store = seeded().await;
        let mut cursor = store
            .iterate("items", &Filter::new(), &FindOptions::new())
            .await
            .unwrap();

        assert!(cursor.advance().await.unwrap().is_some());
        store.insert_one("items", doc! { "name": "E", "value": 5 }).await.unwrap();

        cursor.rewind().await.unwrap();
        let mut seen = 0;
        while cursor.advance().await.unwrap().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 5);

        cursor.close().await.unwrap();
        assert!(cursor.advance().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn custom_identifier_field() {
        let store = InMemoryStore::builder()
            .with_id_field("key")
            .build()
            .await
            .unwrap();

        let id = store.insert_one("items", doc! { "name": "A" }).await.unwrap();

        assert_eq!(store.id_field(), "key");
        assert!(store
            .find_one("items", &Filter::eq("key", id), &FindOptions::new())
            .await
            .unwrap()
            .is_some());
    }
}
