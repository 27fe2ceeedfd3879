use async_trait::async_trait;
use docprovider::bson::{Document, doc};
use serde::{Deserialize, Serialize};

use docprovider::{
    backend::{
        DeleteResult, IndexKeys, IndexOptions, InsertManyResult, RawCursor, StoreBackend,
        UpdateMode, UpdateResult,
    },
    memory::InMemoryStore,
    prelude::*,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<Identifier>,
    name: String,
    value: i32,
}

impl Item {
    fn new(name: &str, value: i32) -> Self {
        Self { id: None, name: name.to_string(), value }
    }
}

impl Model for Item {
    fn collection_name() -> &'static str {
        "items"
    }
}

async fn seeded(connection: &Connection<InMemoryStore>) -> Vec<Identifier> {
    connection
        .model::<Item>()
        .create_many(&[
            Item::new("A", 1),
            Item::new("B", 2),
            Item::new("C", 3),
            Item::new("D", 4),
        ])
        .await
        .unwrap()
}

#[tokio::test]
async fn created_documents_are_found_with_their_identifier() {
    let connection = Connection::new(InMemoryStore::new());
    let items = connection.model::<Item>();

    let id = items.create(&Item::new("A", 1)).await.unwrap();
    let found = items.get(id, FindOptions::new()).await.unwrap().unwrap();

    assert_eq!(found.id, Some(id));
    assert_eq!(found.name, "A");
    assert_eq!(items.name(), "items");
}

#[tokio::test]
async fn bulk_create_returns_identifiers_in_input_order() {
    let connection = Connection::new(InMemoryStore::new());
    let ids = seeded(&connection).await;
    let items = connection.model::<Item>();

    assert_eq!(ids.len(), 4);
    for (id, name) in ids.iter().zip(["A", "B", "C", "D"]) {
        let item = items.get(*id, FindOptions::new()).await.unwrap().unwrap();
        assert_eq!(item.name, name);
    }

    assert!(items.create_many(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_upsert_and_remove_scenario() {
    let connection = Connection::new(InMemoryStore::new());
    seeded(&connection).await;
    let items = connection.model::<Item>();

    let modified = items
        .update(Query::builder().is_equal("name", "B"), doc! { "value": 20 }, UpdateOptions::new())
        .await
        .unwrap();
    assert_eq!(modified, Outcome::Modified);
    let b = items.query().is_equal("name", "B").get().await.unwrap().unwrap();
    assert_eq!(b.value, 20);

    let created = items
        .update(
            Query::builder().is_equal("name", "F"),
            doc! { "value": 6 },
            UpdateOptions::new().with_upsert(true),
        )
        .await
        .unwrap();
    let Outcome::Created(id) = created else {
        panic!("expected an upsert, got {created:?}");
    };
    let upserted = items.get(id, FindOptions::new()).await.unwrap().unwrap();
    assert_eq!((upserted.name.as_str(), upserted.value), ("F", 6));

    assert_eq!(items.remove(Query::builder().is_equal("name", "F")).await.unwrap(), 1);
    assert!(items.query().is_equal("name", "F").get().await.unwrap().is_none());

    let bigger = Query::builder().is_greater_than("value", 2);
    let before = items.count(bigger.clone()).await.unwrap();
    let removed = items.remove(bigger).await.unwrap();

    assert_eq!(before, 3);
    assert_eq!(removed, before);
    assert_eq!(items.count(Filter::new()).await.unwrap(), 1);
    let remaining = items.find(Filter::new(), FindOptions::new()).await.unwrap();
    assert_eq!(
        remaining.iter().map(|item| (item.name.as_str(), item.value)).collect::<Vec<_>>(),
        vec![("A", 1)]
    );
}

#[tokio::test]
async fn updates_without_effect_fail() {
    let connection = Connection::new(InMemoryStore::new());
    let ids = seeded(&connection).await;
    let items = connection.model::<Item>();

    let unchanged = items
        .update(ids[0], doc! { "value": 1 }, UpdateOptions::new())
        .await;
    match unchanged {
        Err(DocumentStoreError::UpdateFailed { matched, modified, collection, .. }) => {
            assert_eq!((matched, modified), (1, 0));
            assert_eq!(collection, "items");
        }
        other => panic!("unexpected result {other:?}"),
    }

    let missing = items
        .update(Identifier::new(), doc! { "value": 9 }, UpdateOptions::new())
        .await;
    assert!(matches!(missing, Err(DocumentStoreError::UpdateFailed { matched: 0, .. })));

    let nothing_matched = items
        .update(Query::builder().is_equal("name", "Z"), doc! { "value": 9 }, UpdateOptions::new())
        .await;
    assert!(matches!(nothing_matched, Err(DocumentStoreError::UpdateFailed { .. })));
}

#[tokio::test]
async fn filter_updates_modify_every_match() {
    let connection = Connection::new(InMemoryStore::new());
    seeded(&connection).await;
    let items = connection.model::<Item>();

    let outcome = items
        .update(Query::builder().is_less_or_equal("value", 2), doc! { "value": 0 }, UpdateOptions::new())
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Modified);
    assert_eq!(items.query().is_equal("value", 0).count().await.unwrap(), 2);
}

#[tokio::test]
async fn replace_substitutes_the_document_and_keeps_its_identifier() {
    let connection = Connection::new(InMemoryStore::new());
    let ids = seeded(&connection).await;
    let items = connection.model::<Item>();

    let replacement = Item { id: Some(Identifier::new()), name: "Z".into(), value: 26 };
    let outcome = items.replace(ids[1], &replacement, false).await.unwrap();

    assert_eq!(outcome, Outcome::Modified);
    let stored = items.get(ids[1], FindOptions::new()).await.unwrap().unwrap();
    assert_eq!(stored, Item { id: Some(ids[1]), name: "Z".into(), value: 26 });
}

#[tokio::test]
async fn removing_a_missing_identifier_fails() {
    let connection = Connection::new(InMemoryStore::new());
    seeded(&connection).await;
    let items = connection.model::<Item>();

    match items.remove(Identifier::new()).await {
        Err(DocumentStoreError::RemoveFailed { deleted, .. }) => assert_eq!(deleted, 0),
        other => panic!("unexpected result {other:?}"),
    }

    assert_eq!(items.remove(Query::builder().is_equal("name", "nobody")).await.unwrap(), 0);
    assert_eq!(items.count(Filter::new()).await.unwrap(), 4);
}

#[tokio::test]
async fn remove_by_identifier_deletes_exactly_one() {
    let connection = Connection::new(InMemoryStore::new());
    let ids = seeded(&connection).await;
    let items = connection.model::<Item>();

    assert_eq!(items.remove(ids[2]).await.unwrap(), 1);
    assert!(items.get(ids[2], FindOptions::new()).await.unwrap().is_none());
    assert!(items.remove_one(Query::builder().is_equal("name", "C")).await.is_err());
}

#[tokio::test]
async fn range_modes_select_expected_values() {
    let connection = Connection::new(InMemoryStore::new());
    let items = connection.model::<Item>();
    items
        .create_many(&(1..=5).map(|v| Item::new("n", v)).collect::<Vec<_>>())
        .await
        .unwrap();

    let values = |found: Vec<Item>| found.into_iter().map(|i| i.value).collect::<Vec<_>>();

    let inclusive = items
        .query()
        .in_range("value", 2, 4, "==")
        .sort("value", SortDirection::Asc)
        .find()
        .await
        .unwrap();
    let exclusive = items.query().in_range("value", 2, 4, RangeMode::default()).find().await.unwrap();
    let upper = items
        .query()
        .in_range("value", 2, 4, "<=")
        .sort("value", SortDirection::Asc)
        .find()
        .await
        .unwrap();

    assert_eq!(values(inclusive), vec![2, 3, 4]);
    assert_eq!(values(exclusive), vec![3]);
    assert_eq!(values(upper), vec![3, 4]);
}

#[tokio::test]
async fn cursor_visits_each_document_and_closes_early() {
    let connection = Connection::new(InMemoryStore::new());
    seeded(&connection).await;
    let items = connection.model::<Item>();

    let mut cursor = items.query().each().await.unwrap();
    let mut seen = 0;
    while let Some(item) = cursor.next().await.unwrap() {
        assert!(!item.current.name.is_empty());
        seen += 1;
    }
    assert_eq!(seen, 4);

    let mut cursor = items
        .query()
        .sort("value", SortDirection::Desc)
        .each()
        .await
        .unwrap();
    let first = cursor.next().await.unwrap().unwrap();
    assert_eq!(first.current.value, 4);
    first.close().await.unwrap();
    assert!(cursor.next().await.unwrap().is_none());

    let mut total = 0;
    items
        .for_each(Query::builder().is_greater_than("value", 1), FindOptions::new())
        .await
        .unwrap()
        .try_for_each(|item| {
            total += item.value;
            async { Ok::<_, DocumentStoreError>(()) }
        })
        .await
        .unwrap();
    assert_eq!(total, 9);
}

#[tokio::test]
async fn cursor_rewind_restarts_iteration() {
    let connection = Connection::new(InMemoryStore::new());
    seeded(&connection).await;
    let items = connection.model::<Item>();

    let mut cursor = items.query().sort("value", SortDirection::Asc).each().await.unwrap();
    cursor.next().await.unwrap();
    let second = cursor.next().await.unwrap().unwrap();
    assert_eq!(second.current.value, 2);
    second.rewind().await.unwrap();

    let again = cursor.next().await.unwrap().unwrap();
    assert_eq!(again.current.value, 1);
    cursor.close().await.unwrap();
}

#[tokio::test]
async fn duplicate_identifier_makes_bulk_create_incomplete() {
    let connection = Connection::new(InMemoryStore::new());
    let items = connection.model::<Item>();
    let id = Identifier::new();

    let result = items
        .create_many(&[
            Item { id: Some(id), name: "A".into(), value: 1 },
            Item { id: Some(id), name: "B".into(), value: 2 },
            Item::new("C", 3),
        ])
        .await;

    match result {
        Err(DocumentStoreError::BulkInsertIncomplete { expected, inserted, collection, .. }) => {
            assert_eq!((expected, inserted), (3, 1));
            assert_eq!(collection, "items");
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(items.count(Filter::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn duplicate_identifier_makes_single_create_fail() {
    let connection = Connection::new(InMemoryStore::new());
    let items = connection.model::<Item>();
    let id = items.create(&Item::new("A", 1)).await.unwrap();

    let again = items.create(&Item { id: Some(id), name: "A".into(), value: 1 }).await;

    assert!(matches!(again, Err(DocumentStoreError::InsertFailed { .. })));
}

/// Acknowledges one document fewer than it stores.
#[derive(Debug, Default)]
struct ShortAckStore {
    inner: InMemoryStore,
}

#[async_trait]
impl StoreBackend for ShortAckStore {
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Identifier> {
        self.inner.insert_one(collection, document).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertManyResult> {
        let mut result = self.inner.insert_many(collection, documents).await?;
        result.inserted_ids.pop();
        Ok(result)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
        mode: UpdateMode,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateResult> {
        self.inner.update_one(collection, filter, patch, mode, upsert).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Document,
        mode: UpdateMode,
    ) -> DocumentStoreResult<UpdateResult> {
        self.inner.update_many(collection, filter, patch, mode).await
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<DeleteResult> {
        self.inner.delete_one(collection, filter).await
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<DeleteResult> {
        self.inner.delete_many(collection, filter).await
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        self.inner.find_one(collection, filter, options).await
    }

    async fn find_many(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        self.inner.find_many(collection, filter, options).await
    }

    async fn estimated_count(&self, collection: &str) -> DocumentStoreResult<u64> {
        self.inner.estimated_count(collection).await
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> DocumentStoreResult<u64> {
        self.inner.count_documents(collection, filter).await
    }

    async fn iterate(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> DocumentStoreResult<Box<dyn RawCursor>> {
        self.inner.iterate(collection, filter, options).await
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: &IndexKeys,
        options: &IndexOptions,
    ) -> DocumentStoreResult<String> {
        self.inner.create_index(collection, keys, options).await
    }
}

#[tokio::test]
async fn short_acknowledgement_makes_bulk_create_incomplete() {
    let connection = Connection::new(ShortAckStore::default());
    let items = connection.provider::<Document>("items");

    let result = items
        .create_many(&[doc! { "n": 1 }, doc! { "n": 2 }, doc! { "n": 3 }])
        .await;

    match result {
        Err(DocumentStoreError::BulkInsertIncomplete { expected, inserted, .. }) => {
            assert_eq!((expected, inserted), (3, 2));
        }
        other => panic!("unexpected result {other:?}"),
    }
    assert_eq!(items.count(Filter::new()).await.unwrap(), 3);
}

#[tokio::test]
async fn get_returns_none_and_honors_projection() {
    let connection = Connection::new(InMemoryStore::new());
    seeded(&connection).await;
    let raw = connection.provider::<Document>("items");

    assert!(raw.query().is_equal("name", "nobody").get().await.unwrap().is_none());

    let projected = raw
        .query()
        .is_equal("name", "C")
        .select(["-_id", "+name"])
        .get()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(projected, doc! { "name": "C" });
}

#[tokio::test]
async fn raw_filter_documents_select_like_builders() {
    let connection = Connection::new(InMemoryStore::new());
    seeded(&connection).await;
    let items = connection.model::<Item>();

    let selector = Selector::try_from(doc! { "$or": [{ "name": "A" }, { "value": { "$gte": 4 } }] }).unwrap();
    assert_eq!(items.remove(selector).await.unwrap(), 2);

    let invalid = Filter::try_from(doc! { "value": { "$near": 1 } });
    assert!(matches!(invalid, Err(DocumentStoreError::InvalidFilter { .. })));
}

#[tokio::test]
async fn store_errors_name_their_collection() {
    let connection = Connection::new(InMemoryStore::new());
    seeded(&connection).await;
    let items = connection.model::<Item>();

    let err = items.query().is_match("name", "(").find().await.unwrap_err();

    assert!(matches!(&err, DocumentStoreError::InvalidFilter { .. }));
    assert_eq!(err.collection(), Some("items"));
    assert!(err.to_string().starts_with("Invalid filter in collection items:"));
}

#[tokio::test]
async fn paginate_reports_navigation() {
    let connection = Connection::new(InMemoryStore::new());
    let items = connection.model::<Item>();
    items
        .create_many(&(1..=5).map(|v| Item::new("n", v)).collect::<Vec<_>>())
        .await
        .unwrap();

    let page = items
        .query()
        .sort("value", SortDirection::Asc)
        .paginate(2, 2)
        .await
        .unwrap();

    assert_eq!(page.items.iter().map(|i| i.value).collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!(page.count, 5);
    assert_eq!(page.next_page, Some(3));
    assert_eq!(page.previous_page, Some(1));
}

#[tokio::test]
async fn clear_and_indexes() {
    let connection = Connection::new(InMemoryStore::new());
    seeded(&connection).await;
    let items = connection.model::<Item>();

    assert_eq!(items.add_index("value", IndexOptions::default()).await.unwrap(), "value_1");
    assert!(items.add_index(IndexKeys::new(), IndexOptions::default()).await.is_err());

    assert!(items.clear().await.unwrap());
    assert!(!items.clear().await.unwrap());
}

#[tokio::test]
async fn connections_open_from_builders() {
    let connection = Connection::open(InMemoryStore::builder().with_id_field("key"))
        .await
        .unwrap();
    let raw = connection.provider::<Document>("things");

    let id = raw.create(&doc! { "n": 1 }).await.unwrap();
    assert_eq!(raw.id_field(), "key");
    assert!(raw.get(id, FindOptions::new()).await.unwrap().unwrap().contains_key("key"));

    connection.shutdown().await.unwrap();
}
