//! Filter evaluation for in-memory documents.
//!
//! [`DocumentEvaluator`] walks a [`Filter`] tree against one document. Field paths are
//! dot-separated and fan out over arrays of sub-documents; numeric path segments index into
//! arrays. Literal equality also matches array fields containing the value, and a literal
//! `null` matches a missing field.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex::RegexBuilder;

use docprovider_core::{
    error::DocumentStoreError,
    filter::{Filter, FilterVisitor, LogicalOp, Operator},
};

/// Type-erased, comparable representation of BSON values.
///
/// Integers compare exactly as `i64`; a mix of integer and double compares as `f64`, so that
/// `Int32(2)` equals `Double(2.0)`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Values without a natural ordering; compared structurally.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Int(i64::from(*value)),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl Comparable<'_> {
    /// Cross-type rank used to give sorting a total order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Int(_) | Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other(_) => 8,
        }
    }

    /// Ordering for sort: by type rank first, then by value within a type.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Int(a), Comparable::Int(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::Int(a), Comparable::Number(b)) | (Comparable::Number(b), Comparable::Int(a)) => {
                *a as f64 == *b
            }
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Int(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Number(b)) => (*a as f64).partial_cmp(b),
            (Comparable::Number(a), Comparable::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Collects every value reachable at the dot-separated `path`.
///
/// An empty result means the field is missing.
pub(crate) fn resolve<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments = path.split('.').collect::<Vec<_>>();
    let mut values = Vec::new();

    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = document.get(*head) {
            collect_path(value, rest, &mut values);
        }
    }

    values
}

fn collect_path<'a>(value: &'a Bson, segments: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(next) = doc.get(*head) {
                collect_path(next, rest, out);
            }
        }
        Bson::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Some(next) = items.get(index) {
                    collect_path(next, rest, out);
                }
            }
            Err(_) => {
                for item in items.iter().filter(|item| matches!(item, Bson::Document(_))) {
                    collect_path(item, segments, out);
                }
            }
        },
        _ => {}
    }
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    Comparable::from(a) == Comparable::from(b)
}

/// Equality as a query sees it: an array field matches when it contains the value.
fn field_matches(field: &Bson, value: &Bson) -> bool {
    if values_equal(field, value) {
        return true;
    }

    match field {
        Bson::Array(items) => items.iter().any(|item| values_equal(item, value)),
        _ => false,
    }
}

fn literal_matches(values: &[&Bson], value: &Bson) -> bool {
    if values.is_empty() {
        return matches!(value, Bson::Null);
    }

    values.iter().any(|field| field_matches(field, value))
}

fn compare_matches(values: &[&Bson], value: &Bson, accept: fn(Ordering) -> bool) -> bool {
    let target = Comparable::from(value);
    let holds = |field: &Bson| {
        Comparable::from(field)
            .partial_cmp(&target)
            .is_some_and(accept)
    };

    values.iter().any(|field| match *field {
        Bson::Array(items) => items.iter().any(|item| holds(item)),
        other => holds(other),
    })
}

/// Evaluates filters against a single document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, filter: &Filter) -> Result<bool, DocumentStoreError> {
        self.visit_filter(filter)
    }

    /// Returns clones of the documents matching `filter`, in their original order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: &Filter,
    ) -> Result<Vec<Document>, DocumentStoreError> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).evaluate(filter)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    fn operator_holds(&mut self, values: &[&Bson], op: &Operator) -> Result<bool, DocumentStoreError> {
        Ok(match op {
            Operator::Ne(value) => !literal_matches(values, value),
            Operator::In(list) => list.iter().any(|value| literal_matches(values, value)),
            Operator::Nin(list) => !list.iter().any(|value| literal_matches(values, value)),
            Operator::Lt(value) => compare_matches(values, value, Ordering::is_lt),
            Operator::Lte(value) => compare_matches(values, value, Ordering::is_le),
            Operator::Gt(value) => compare_matches(values, value, Ordering::is_gt),
            Operator::Gte(value) => compare_matches(values, value, Ordering::is_ge),
            Operator::Exists(exists) => values.is_empty() != *exists,
            Operator::All(list) => {
                !list.is_empty()
                    && values
                        .iter()
                        .any(|field| list.iter().all(|value| field_matches(field, value)))
            }
            Operator::ElemMatch(sub) => {
                for field in values {
                    let Bson::Array(items) = field else { continue };
                    for item in items {
                        if let Bson::Document(element) = item {
                            if DocumentEvaluator::new(element).evaluate(sub)? {
                                return Ok(true);
                            }
                        }
                    }
                }
                false
            }
            Operator::Regex { pattern, options } => {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(options.contains('i'))
                    .multi_line(options.contains('m'))
                    .dot_matches_new_line(options.contains('s'))
                    .ignore_whitespace(options.contains('x'))
                    .build()
                    .map_err(|err| DocumentStoreError::invalid_filter(err.to_string()))?;

                values.iter().any(|field| match field {
                    Bson::String(text) => regex.is_match(text),
                    Bson::Array(items) => items
                        .iter()
                        .any(|item| matches!(item, Bson::String(text) if regex.is_match(text))),
                    _ => false,
                })
            }
        })
    }
}

impl FilterVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_filter(&mut self, filter: &Filter) -> Result<Self::Output, Self::Error> {
        for clause in filter.clauses() {
            if !self.visit_clause(clause)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_literal(&mut self, path: &str, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(literal_matches(&resolve(self.document, path), value))
    }

    fn visit_operators(
        &mut self,
        path: &str,
        operators: &[Operator],
    ) -> Result<Self::Output, Self::Error> {
        let values = resolve(self.document, path);

        for op in operators {
            if !self.operator_holds(&values, op)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_logical(
        &mut self,
        op: LogicalOp,
        filters: &[Filter],
    ) -> Result<Self::Output, Self::Error> {
        let mut any = false;
        for filter in filters {
            if self.visit_filter(filter)? {
                any = true;
                break;
            }
        }

        Ok(match op {
            LogicalOp::Or => any,
            LogicalOp::Nor => !any,
        })
    }
}
