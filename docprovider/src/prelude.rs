//! Convenient re-exports of commonly used types.
//!
//! ```ignore
//! use docprovider::prelude::*;
//! ```

pub use docprovider_core::{
    backend::{IndexKeys, IndexOptions, StoreBackend, StoreBackendBuilder, UpdateMode},
    config::ConnectionConfig,
    connection::Connection,
    cursor::{Cursor, CursorItem},
    document::{DocumentExt, DocumentType, Model},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Filter,
    identifier::{Identifier, IntoIdentifier},
    page::Page,
    provider::{Outcome, Provider, Selector, UpdateOptions},
    query::{FindOptions, Query, QueryBuilder, RangeMode, SortDirection},
};
