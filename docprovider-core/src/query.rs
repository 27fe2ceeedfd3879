//! Fluent query construction.
//!
//! A [`QueryBuilder`] accumulates a [`Filter`] and [`FindOptions`]. Every predicate call
//! merges its fragment into the filter with the first-wins rule documented in
//! [`crate::filter`] and hands the builder back, so calls chain:
//!
//! ```ignore
//! use docprovider::query::{Query, RangeMode};
//!
//! let query = Query::builder()
//!     .is_equal("status", "active")
//!     .is_one_of("role", ["operator"])
//!     .in_range("rating", 4, 5, RangeMode::Inclusive)
//!     .sort("rating", SortDirection::Desc)
//!     .page(2, 20)
//!     .build();
//! ```
//!
//! A builder obtained from [`Provider::query`](crate::provider::Provider::query) is bound to
//! that provider and also offers the terminal operations `find`, `each`, `get`, `count`
//! and `paginate`.
//!
//! # `and` versus `or` / `nor`
//!
//! `or` and `nor` nest their operands as a true logical clause. `and` does **not**: its
//! operands are combined shallowly (a later operand replaces an earlier operand's clause on
//! the same key) and the result is merged flat into this builder's filter.

use bson::Bson;
use std::str::FromStr;

use crate::{
    backend::StoreBackend,
    cursor::Cursor,
    document::DocumentType,
    error::DocumentStoreResult,
    filter::{Condition, Filter, LogicalOp, Operator},
    page::{Page, PaginationParams},
    provider::{Provider, Selector},
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field inclusion/exclusion map applied to returned documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    fields: Vec<(String, bool)>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a field spec: `+field` includes, `-field` excludes, a bare name includes.
    pub fn parse<I, S>(specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut projection = Projection::new();
        for spec in specs {
            let spec = spec.as_ref();
            match spec.strip_prefix('-') {
                Some(field) => projection.set(field, false),
                None => projection.set(spec.strip_prefix('+').unwrap_or(spec), true),
            }
        }
        projection
    }

    /// Sets the flag for `field`, replacing any earlier flag for the same field.
    pub fn set(&mut self, field: impl Into<String>, include: bool) {
        let field = field.into();
        match self.fields.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = include,
            None => self.fields.push((field, include)),
        }
    }

    /// Merges another projection into this one, later flags winning.
    pub fn extend(&mut self, other: Projection) {
        for (field, include) in other.fields {
            self.set(field, include);
        }
    }

    /// Returns `(field, include)` pairs in insertion order.
    pub fn fields(&self) -> &[(String, bool)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Options shaping the documents returned by a read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Fields to include or exclude.
    pub projection: Option<Projection>,
    /// Sort keys, applied in order.
    pub sort: Vec<Sort>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(Sort { field: field.into(), direction });
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the projection from `+field` / `-field` specs.
    pub fn select<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.projection
            .get_or_insert_with(Projection::new)
            .extend(Projection::parse(specs));
        self
    }
}

/// Bound inclusivity for [`QueryBuilder::in_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeMode {
    /// `from < v < to` (`"!="`, the default).
    #[default]
    Exclusive,
    /// `from < v <= to` (`"<="`).
    UpperInclusive,
    /// `from <= v < to` (`">="`).
    LowerInclusive,
    /// `from <= v <= to` (`"=="`).
    Inclusive,
}

impl From<&str> for RangeMode {
    /// Maps the operator-style mode strings; anything unrecognized is [`RangeMode::Exclusive`].
    fn from(mode: &str) -> Self {
        match mode {
            "<=" => RangeMode::UpperInclusive,
            ">=" => RangeMode::LowerInclusive,
            "==" => RangeMode::Inclusive,
            _ => RangeMode::Exclusive,
        }
    }
}

impl FromStr for RangeMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RangeMode::from(s))
    }
}

/// A finished query: the filter plus read options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Filter,
    pub options: FindOptions,
}

impl Query {
    /// Creates an empty query matching every document.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a detached query builder.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

/// Chainable accumulator of predicates and read options.
///
/// `T` is the target of the terminal operations: `()` for a detached builder, or a provider
/// reference for a builder obtained from [`Provider::query`].
#[derive(Debug, Clone)]
pub struct QueryBuilder<T = ()> {
    target: T,
    query: Query,
}

impl QueryBuilder {
    /// Creates a detached query builder.
    pub fn new() -> Self {
        QueryBuilder { target: (), query: Query::default() }
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> QueryBuilder<T> {
    pub(crate) fn with_target(target: T) -> Self {
        QueryBuilder { target, query: Query::default() }
    }

    /// Returns the filter accumulated so far.
    pub fn filter(&self) -> &Filter {
        &self.query.filter
    }

    /// Returns the options accumulated so far.
    pub fn options(&self) -> &FindOptions {
        &self.query.options
    }

    /// Consumes the builder, returning the accumulated filter.
    pub fn into_filter(self) -> Filter {
        self.query.filter
    }

    /// Consumes the builder, returning the accumulated query.
    pub fn build(self) -> Query {
        self.query
    }

    fn operator(mut self, key: impl Into<String>, op: Operator) -> Self {
        self.query
            .filter
            .merge_field(key, Condition::Operators(vec![op]));
        self
    }

    /// `key: value`
    pub fn is_equal(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.query
            .filter
            .merge_field(key, Condition::Literal(value.into()));
        self
    }

    /// `key: {ne: value}`
    pub fn is_not_equal(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator(key, Operator::Ne(value.into()))
    }

    /// `key: {in: values}`
    pub fn is_one_of<I, V>(self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.operator(key, Operator::In(values.into_iter().map(Into::into).collect()))
    }

    /// `key: {nin: values}`
    pub fn is_not_one_of<I, V>(self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.operator(key, Operator::Nin(values.into_iter().map(Into::into).collect()))
    }

    /// Case-insensitive pattern match (flags `"ig"`).
    pub fn is_match(self, key: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.is_match_with_flags(key, pattern, "ig")
    }

    /// Pattern match with explicit flags.
    pub fn is_match_with_flags(
        self,
        key: impl Into<String>,
        pattern: impl Into<String>,
        flags: &str,
    ) -> Self {
        self.operator(key, Operator::regex(pattern, flags))
    }

    /// `key: {lt: value}`
    pub fn is_less_than(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator(key, Operator::Lt(value.into()))
    }

    /// `key: {lte: value}`
    pub fn is_less_or_equal(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator(key, Operator::Lte(value.into()))
    }

    /// `key: {gt: value}`
    pub fn is_greater_than(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator(key, Operator::Gt(value.into()))
    }

    /// `key: {gte: value}`
    pub fn is_greater_or_equal(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.operator(key, Operator::Gte(value.into()))
    }

    /// Composes a lower and an upper bound on `key`.
    ///
    /// | mode | lower | upper |
    /// |---|---|---|
    /// | [`RangeMode::UpperInclusive`] | `gt from` | `lte to` |
    /// | [`RangeMode::LowerInclusive`] | `gte from` | `lt to` |
    /// | [`RangeMode::Inclusive`] | `gte from` | `lte to` |
    /// | [`RangeMode::Exclusive`] | `gt from` | `lt to` |
    pub fn in_range(
        self,
        key: impl Into<String>,
        from: impl Into<Bson>,
        to: impl Into<Bson>,
        mode: impl Into<RangeMode>,
    ) -> Self {
        let key = key.into();
        match mode.into() {
            RangeMode::UpperInclusive => self
                .is_greater_than(key.clone(), from)
                .is_less_or_equal(key, to),
            RangeMode::LowerInclusive => self
                .is_greater_or_equal(key.clone(), from)
                .is_less_than(key, to),
            RangeMode::Inclusive => self
                .is_greater_or_equal(key.clone(), from)
                .is_less_or_equal(key, to),
            RangeMode::Exclusive => self
                .is_greater_than(key.clone(), from)
                .is_less_than(key, to),
        }
    }

    /// `key: {all: values}`
    pub fn contains_all_of<I, V>(self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.operator(key, Operator::All(values.into_iter().map(Into::into).collect()))
    }

    /// `key: {exists: exists}`
    pub fn has_element(self, key: impl Into<String>, exists: bool) -> Self {
        self.operator(key, Operator::Exists(exists))
    }

    /// `key: {elemMatch: sub}`
    pub fn match_elements(self, key: impl Into<String>, sub: impl Into<Filter>) -> Self {
        self.operator(key, Operator::ElemMatch(sub.into()))
    }

    /// `{or: [sub, ...]}`
    pub fn or<I, F>(mut self, subs: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Filter>,
    {
        self.query
            .filter
            .merge_logical(LogicalOp::Or, subs.into_iter().map(Into::into).collect());
        self
    }

    /// `{nor: [sub, ...]}`
    pub fn nor<I, F>(mut self, subs: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Filter>,
    {
        self.query
            .filter
            .merge_logical(LogicalOp::Nor, subs.into_iter().map(Into::into).collect());
        self
    }

    /// Merges every operand flat into this filter (see the module docs).
    pub fn and<I, F>(mut self, subs: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Filter>,
    {
        let combined = subs
            .into_iter()
            .fold(Filter::new(), |mut acc, sub| {
                acc.assign(sub.into());
                acc
            });
        self.query.filter.merge(combined);
        self
    }

    /// Adds fields to the projection: `+field` includes, `-field` excludes, bare includes.
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.query.options = self.query.options.select(fields);
        self
    }

    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.options = self.query.options.sort(field, direction);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.query.options.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query.options.limit = Some(limit);
        self
    }

    /// Selects the 1-based page `page` of `page_size` documents.
    ///
    /// Page `0` is treated as the first page.
    pub fn page(mut self, page: u64, page_size: u64) -> Self {
        let params = PaginationParams::new(page, page_size);
        self.query.options.skip = Some(params.offset());
        self.query.options.limit = Some(page_size);
        self
    }
}

impl<T> From<QueryBuilder<T>> for Filter {
    fn from(builder: QueryBuilder<T>) -> Self {
        builder.into_filter()
    }
}

impl<'p, 'a, B, D> QueryBuilder<&'p Provider<'a, B, D>>
where
    B: StoreBackend,
    D: DocumentType,
{
    /// Returns every matching document.
    pub async fn find(self) -> DocumentStoreResult<Vec<D>> {
        let Query { filter, options } = self.query;
        self.target.find(filter, options).await
    }

    /// Returns a cursor over the matching documents.
    pub async fn each(self) -> DocumentStoreResult<Cursor<D>> {
        let Query { filter, options } = self.query;
        self.target.for_each(filter, options).await
    }

    /// Returns the first matching document, or `None`.
    pub async fn get(self) -> DocumentStoreResult<Option<D>> {
        let Query { filter, options } = self.query;
        self.target
            .get(Selector::ByFilter(filter), options)
            .await
    }

    /// Counts the matching documents.
    pub async fn count(self) -> DocumentStoreResult<u64> {
        self.target.count(self.query.filter).await
    }

    /// Returns one page of matching documents with navigation metadata.
    ///
    /// Any skip/limit already set on the builder is replaced by the page window.
    pub async fn paginate(self, page: u64, per_page: u64) -> DocumentStoreResult<Page<D>> {
        let params = PaginationParams::new(page, per_page);
        let provider = self.target;
        let Query { filter, options } = self.page(params.page, params.per_page).query;

        let count = provider.count(filter.clone()).await?;
        let items = provider.find(filter, options).await?;

        Ok(params.window(items, count))
    }
}
