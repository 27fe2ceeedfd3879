//! Lazy, resumable iteration over a result set.
//!
//! A [`Cursor`] pulls documents from the store one at a time. Each call to [`Cursor::next`]
//! yields a [`CursorItem`] holding the decoded document in `current`; the item borrows the
//! cursor, so the next document cannot be requested until the item is dropped or consumed by
//! [`CursorItem::rewind`] / [`CursorItem::close`].
//!
//! ```ignore
//! let mut cursor = provider.for_each(Filter::new(), FindOptions::new()).await?;
//! while let Some(item) = cursor.next().await? {
//!     if item.current.get_i32("value")? > 2 {
//!         item.close().await?;
//!         break;
//!     }
//! }
//! ```
//!
//! A cursor abandoned before exhaustion must be closed. [`Cursor::try_for_each`] does that on
//! every exit path.

use std::{future::Future, marker::PhantomData};

use tracing::{debug, warn};

use crate::{
    backend::RawCursor,
    document::{DocumentExt, DocumentType},
    error::DocumentStoreResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Open,
    Exhausted,
    Closed,
}

/// Decoding wrapper around a store cursor.
#[derive(Debug)]
pub struct Cursor<D> {
    raw: Box<dyn RawCursor>,
    collection: String,
    state: CursorState,
    _marker: PhantomData<fn() -> D>,
}

impl<D: DocumentType> Cursor<D> {
    pub(crate) fn new(collection: impl Into<String>, raw: Box<dyn RawCursor>) -> Self {
        Self {
            raw,
            collection: collection.into(),
            state: CursorState::Open,
            _marker: PhantomData,
        }
    }

    /// Returns the collection this cursor reads from.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns `true` once the cursor has been closed.
    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    /// Advances to the next document.
    ///
    /// Returns `None` when the store is exhausted or the cursor was closed.
    pub async fn next(&mut self) -> DocumentStoreResult<Option<CursorItem<'_, D>>> {
        if self.state != CursorState::Open {
            return Ok(None);
        }

        let advanced = self
            .raw
            .advance()
            .await
            .map_err(|err| err.in_collection(&self.collection))?;

        match advanced {
            Some(document) => {
                let current = D::from_document(document)?;
                Ok(Some(CursorItem { current, cursor: self }))
            }
            None => {
                self.state = CursorState::Exhausted;
                Ok(None)
            }
        }
    }

    /// Restarts iteration from the first document.
    pub async fn rewind(&mut self) -> DocumentStoreResult<()> {
        self.raw.rewind().await?;
        self.state = CursorState::Open;
        debug!(target: "docprovider::cursor", collection = %self.collection, "cursor rewound");
        Ok(())
    }

    /// Releases the store-side cursor. Closing twice is a no-op.
    pub async fn close(&mut self) -> DocumentStoreResult<()> {
        if self.state == CursorState::Closed {
            return Ok(());
        }
        self.state = CursorState::Closed;
        self.raw.close().await
    }

    /// Feeds every remaining document to `f`, then closes the cursor.
    ///
    /// The cursor is closed whether `f`, decoding, or the store fails; the first error is
    /// returned.
    pub async fn try_for_each<F, Fut>(mut self, mut f: F) -> DocumentStoreResult<()>
    where
        F: FnMut(D) -> Fut,
        Fut: Future<Output = DocumentStoreResult<()>>,
    {
        let result = loop {
            match self.next().await {
                Ok(Some(item)) => {
                    if let Err(err) = f(item.current).await {
                        break Err(err);
                    }
                }
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        let closed = self.close().await;
        result.and(closed)
    }
}

impl<D> Drop for Cursor<D> {
    fn drop(&mut self) {
        if self.state == CursorState::Open {
            warn!(
                target: "docprovider::cursor",
                collection = %self.collection,
                "cursor dropped before exhaustion without close"
            );
        }
    }
}

/// One step of a [`Cursor`].
#[derive(Debug)]
pub struct CursorItem<'c, D> {
    /// The decoded document at the cursor position.
    pub current: D,
    cursor: &'c mut Cursor<D>,
}

impl<'c, D: DocumentType> CursorItem<'c, D> {
    /// Restarts the underlying cursor; the next call to `next` yields the first document.
    pub async fn rewind(self) -> DocumentStoreResult<()> {
        self.cursor.rewind().await
    }

    /// Closes the underlying cursor, ending the iteration.
    pub async fn close(self) -> DocumentStoreResult<()> {
        self.cursor.close().await
    }

    /// Consumes the item, returning the document.
    pub fn into_current(self) -> D {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bson::{Document, doc};

    #[derive(Debug)]
    struct VecCursor {
        documents: Vec<Document>,
        position: usize,
        closed: bool,
    }

    impl VecCursor {
        fn boxed(values: &[i32]) -> Box<dyn RawCursor> {
            Box::new(VecCursor {
                documents: values.iter().map(|v| doc! { "value": v }).collect(),
                position: 0,
                closed: false,
            })
        }
    }

    #[async_trait]
    impl RawCursor for VecCursor {
        async fn advance(&mut self) -> DocumentStoreResult<Option<Document>> {
            if self.closed {
                return Ok(None);
            }
            let next = self.documents.get(self.position).cloned();
            self.position += 1;
            Ok(next)
        }

        async fn rewind(&mut self) -> DocumentStoreResult<()> {
            self.position = 0;
            Ok(())
        }

        async fn close(&mut self) -> DocumentStoreResult<()> {
            self.closed = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn yields_every_document_then_ends() {
        let mut cursor = Cursor::<Document>::new("items", VecCursor::boxed(&[1, 2, 3]));
        let mut seen = Vec::new();

        while let Some(item) = cursor.next().await.unwrap() {
            seen.push(item.current.get_i32("value").unwrap());
        }

        assert_eq!(seen, vec![1, 2, 3]);
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn item_rewind_restarts_from_the_first_document() {
        let mut cursor = Cursor::<Document>::new("items", VecCursor::boxed(&[1, 2]));

        let first = cursor.next().await.unwrap().unwrap();
        first.rewind().await.unwrap();

        let again = cursor.next().await.unwrap().unwrap();
        assert_eq!(again.current.get_i32("value").unwrap(), 1);
        again.close().await.unwrap();

        assert!(cursor.is_closed());
        assert!(cursor.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn try_for_each_closes_on_error() {
        let cursor = Cursor::<Document>::new("items", VecCursor::boxed(&[1, 2, 3]));
        let mut visited = 0;

        let result = cursor
            .try_for_each(|document| {
                visited += 1;
                let value = document.get_i32("value").unwrap_or_default();
                async move {
                    if value == 2 {
                        Err(crate::error::DocumentStoreError::Backend("stop".into()))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(visited, 2);
    }
}
