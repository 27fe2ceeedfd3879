//! Typed filter trees and the visitor used by backends to consume them.
//!
//! A [`Filter`] is an ordered list of [`Clause`]s. A clause either constrains one field path
//! with a [`Condition`] (an exact-match literal or a set of comparison [`Operator`]s), or nests
//! a list of filters under a [`LogicalOp`]. Backends never see builder calls, only this tree:
//! the in-memory backend evaluates it, the MongoDB backend translates it into a query document.
//!
//! # Merge contract
//!
//! Filters are accumulated with a **first-wins** rule, see [`Filter::merge`]:
//!
//! - a field that already holds a literal keeps it, whatever is merged in later, except that
//!   two document literals are combined: sub-keys missing from the first are added, sub-keys
//!   present in both keep the first value (recursively);
//! - a field holding operators ignores a later literal;
//! - operators are merged by tag, and a tag already present keeps its original value
//!   (`elemMatch` sub-filters are merged recursively with the same rule);
//! - a logical clause (`or` / `nor`) already present keeps its original operands.
//!
//! Calling `gt` then `lt` on the same field therefore composes both bounds, while calling
//! `gt` twice keeps the first bound. Discarded fragments are reported at `debug` level.

use bson::{Bson, Document};
use std::fmt;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Tag identifying an [`Operator`] independently of its operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorTag {
    Ne,
    In,
    Nin,
    Lt,
    Lte,
    Gt,
    Gte,
    Exists,
    All,
    ElemMatch,
    Regex,
}

impl OperatorTag {
    /// Returns the neutral name of the operator (`"gt"`, `"elemMatch"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorTag::Ne => "ne",
            OperatorTag::In => "in",
            OperatorTag::Nin => "nin",
            OperatorTag::Lt => "lt",
            OperatorTag::Lte => "lte",
            OperatorTag::Gt => "gt",
            OperatorTag::Gte => "gte",
            OperatorTag::Exists => "exists",
            OperatorTag::All => "all",
            OperatorTag::ElemMatch => "elemMatch",
            OperatorTag::Regex => "regex",
        }
    }
}

/// A comparison applied to a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Not equal to.
    Ne(Bson),
    /// Equal to one of the values.
    In(Vec<Bson>),
    /// Equal to none of the values.
    Nin(Vec<Bson>),
    /// Less than.
    Lt(Bson),
    /// Less than or equal to.
    Lte(Bson),
    /// Greater than.
    Gt(Bson),
    /// Greater than or equal to.
    Gte(Bson),
    /// The field is present (`true`) or absent (`false`).
    Exists(bool),
    /// The array field contains every value.
    All(Vec<Bson>),
    /// At least one array element matches the sub-filter.
    ElemMatch(Filter),
    /// The string field matches the pattern. `options` only holds store-valid flags.
    Regex { pattern: String, options: String },
}

impl Operator {
    /// Returns the tag of this operator.
    pub fn tag(&self) -> OperatorTag {
        match self {
            Operator::Ne(_) => OperatorTag::Ne,
            Operator::In(_) => OperatorTag::In,
            Operator::Nin(_) => OperatorTag::Nin,
            Operator::Lt(_) => OperatorTag::Lt,
            Operator::Lte(_) => OperatorTag::Lte,
            Operator::Gt(_) => OperatorTag::Gt,
            Operator::Gte(_) => OperatorTag::Gte,
            Operator::Exists(_) => OperatorTag::Exists,
            Operator::All(_) => OperatorTag::All,
            Operator::ElemMatch(_) => OperatorTag::ElemMatch,
            Operator::Regex { .. } => OperatorTag::Regex,
        }
    }

    /// Builds a regex operator, keeping only the flags the store understands.
    ///
    /// `g` (global) has no meaning for a match predicate and is dropped; duplicate flags are
    /// collapsed and the remaining ones are sorted.
    pub fn regex(pattern: impl Into<String>, flags: &str) -> Self {
        let mut options = flags
            .chars()
            .filter(|c| matches!(c, 'i' | 'm' | 's' | 'x' | 'u'))
            .collect::<Vec<_>>();
        options.sort_unstable();
        options.dedup();

        Operator::Regex {
            pattern: pattern.into(),
            options: options.into_iter().collect(),
        }
    }
}

/// What a field clause requires of its field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Exact match against the value.
    Literal(Bson),
    /// Every operator must hold. Tags are unique within the list.
    Operators(Vec<Operator>),
}

impl Condition {
    /// Returns the operator with the given tag, if present.
    pub fn operator(&self, tag: OperatorTag) -> Option<&Operator> {
        match self {
            Condition::Literal(_) => None,
            Condition::Operators(ops) => ops.iter().find(|op| op.tag() == tag),
        }
    }
}

/// Logical combinators that nest their operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    /// At least one operand matches.
    Or,
    /// No operand matches.
    Nor,
}

impl LogicalOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOp::Or => "or",
            LogicalOp::Nor => "nor",
        }
    }
}

/// One entry of a filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Constrains the field at `path` (dot-separated for nested fields).
    Field { path: String, condition: Condition },
    /// Nests a list of filters under a logical combinator.
    Logical { op: LogicalOp, filters: Vec<Filter> },
}

impl Clause {
    fn same_key(&self, other: &Clause) -> bool {
        match (self, other) {
            (Clause::Field { path: a, .. }, Clause::Field { path: b, .. }) => a == b,
            (Clause::Logical { op: a, .. }, Clause::Logical { op: b, .. }) => a == b,
            _ => false,
        }
    }
}

/// A predicate tree describing which documents match.
///
/// An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Filter { clauses: Vec::new() }
    }

    /// Creates a filter matching documents whose `path` equals `value`.
    pub fn eq(path: impl Into<String>, value: impl Into<Bson>) -> Self {
        let mut filter = Filter::new();
        filter.merge_field(path, Condition::Literal(value.into()));
        filter
    }

    /// Returns `true` if the filter has no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Returns the clauses in insertion order.
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Returns the condition held for `path`, if any.
    pub fn field(&self, path: &str) -> Option<&Condition> {
        self.clauses.iter().find_map(|clause| match clause {
            Clause::Field { path: p, condition } if p == path => Some(condition),
            _ => None,
        })
    }

    /// Returns the operands of the logical clause `op`, if any.
    pub fn logical(&self, op: LogicalOp) -> Option<&[Filter]> {
        self.clauses.iter().find_map(|clause| match clause {
            Clause::Logical { op: o, filters } if *o == op => Some(filters.as_slice()),
            _ => None,
        })
    }

    /// Merges a field condition using the first-wins rule.
    pub fn merge_field(&mut self, path: impl Into<String>, condition: Condition) {
        self.merge_clause(Clause::Field { path: path.into(), condition });
    }

    /// Adds a logical clause unless one with the same combinator is already present.
    pub fn merge_logical(&mut self, op: LogicalOp, filters: Vec<Filter>) {
        self.merge_clause(Clause::Logical { op, filters });
    }

    /// Merges every clause of `other` into this filter using the first-wins rule.
    pub fn merge(&mut self, other: Filter) {
        for clause in other.clauses {
            self.merge_clause(clause);
        }
    }

    /// Copies every clause of `other` into this filter, replacing clauses on the same key.
    ///
    /// This is a shallow, last-wins assignment, unlike [`Filter::merge`].
    pub fn assign(&mut self, other: Filter) {
        for clause in other.clauses {
            match self.clauses.iter_mut().find(|c| c.same_key(&clause)) {
                Some(slot) => *slot = clause,
                None => self.clauses.push(clause),
            }
        }
    }

    fn merge_clause(&mut self, clause: Clause) {
        let Some(existing) = self.clauses.iter_mut().find(|c| c.same_key(&clause)) else {
            self.clauses.push(clause);
            return;
        };

        match (existing, clause) {
            (Clause::Field { path, condition }, Clause::Field { condition: incoming, .. }) => {
                merge_condition(path, condition, incoming);
            }
            (Clause::Logical { op, .. }, _) => {
                tracing::debug!(target: "docprovider::query", op = op.as_str(), "logical clause already present, keeping the first");
            }
            _ => unreachable!("clauses with the same key share a variant"),
        }
    }
}

fn merge_condition(path: &str, existing: &mut Condition, incoming: Condition) {
    match (existing, incoming) {
        (Condition::Literal(Bson::Document(current)), Condition::Literal(Bson::Document(incoming))) => {
            merge_document(path, current, incoming);
        }
        (Condition::Literal(_), _) => {
            tracing::debug!(target: "docprovider::query", field = %path, "field already holds a literal, discarding later fragment");
        }
        (Condition::Operators(_), Condition::Literal(_)) => {
            tracing::debug!(target: "docprovider::query", field = %path, "field already holds operators, discarding literal");
        }
        (Condition::Operators(current), Condition::Operators(incoming)) => {
            for op in incoming {
                match current.iter_mut().find(|o| o.tag() == op.tag()) {
                    Some(Operator::ElemMatch(sub)) => {
                        if let Operator::ElemMatch(other) = op {
                            sub.merge(other);
                        }
                    }
                    Some(kept) => {
                        tracing::debug!(target: "docprovider::query", field = %path, operator = kept.tag().as_str(), "operator already present, keeping the first");
                    }
                    None => current.push(op),
                }
            }
        }
    }
}

fn merge_document(path: &str, current: &mut Document, incoming: Document) {
    for (key, value) in incoming {
        match (current.get_mut(&key), value) {
            (Some(Bson::Document(nested)), Bson::Document(other)) => {
                merge_document(&format!("{path}.{key}"), nested, other);
            }
            (Some(_), _) => {
                tracing::debug!(target: "docprovider::query", field = %path, key = %key, "sub-key already present, keeping the first");
            }
            (None, value) => {
                current.insert(key, value);
            }
        }
    }
}

impl TryFrom<Document> for Filter {
    type Error = DocumentStoreError;

    /// Parses a raw MongoDB-shaped filter document.
    ///
    /// Top-level `$or` / `$nor` become logical clauses and `$and` operands are merged flat.
    /// A field value that is a document whose keys all start with `$` is read as operators,
    /// anything else is an exact-match literal.
    fn try_from(document: Document) -> Result<Self, Self::Error> {
        let mut filter = Filter::new();

        for (key, value) in document {
            match key.as_str() {
                "$or" => filter.merge_logical(LogicalOp::Or, parse_operands(&key, value)?),
                "$nor" => filter.merge_logical(LogicalOp::Nor, parse_operands(&key, value)?),
                "$and" => {
                    for operand in parse_operands(&key, value)? {
                        filter.merge(operand);
                    }
                }
                k if k.starts_with('$') => {
                    return Err(DocumentStoreError::invalid_filter(format!("unsupported top-level operator {k}")));
                }
                _ => {
                    let condition = parse_condition(&key, value)?;
                    filter.merge_field(key, condition);
                }
            }
        }

        Ok(filter)
    }
}

fn parse_operands(key: &str, value: Bson) -> DocumentStoreResult<Vec<Filter>> {
    match value {
        Bson::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Bson::Document(doc) => Filter::try_from(doc),
                other => Err(DocumentStoreError::invalid_filter(format!("{key} operand must be a document, got {other}"))),
            })
            .collect(),
        other => Err(DocumentStoreError::invalid_filter(format!("{key} expects an array, got {other}"))),
    }
}

fn parse_condition(path: &str, value: Bson) -> DocumentStoreResult<Condition> {
    let doc = match value {
        Bson::Document(doc) if !doc.is_empty() && doc.keys().all(|k| k.starts_with('$')) => doc,
        other => return Ok(Condition::Literal(other)),
    };

    if doc.len() == 1 {
        if let Some(value) = doc.get("$eq") {
            return Ok(Condition::Literal(value.clone()));
        }
    }

    let regex_options = match doc.get("$options") {
        Some(Bson::String(options)) => Some(options.clone()),
        Some(other) => return Err(DocumentStoreError::invalid_filter(format!("{path}: $options must be a string, got {other}"))),
        None => None,
    };

    let mut operators: Vec<Operator> = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        let op = match key.as_str() {
            "$ne" => Operator::Ne(value),
            "$in" => Operator::In(expect_array(path, &key, value)?),
            "$nin" => Operator::Nin(expect_array(path, &key, value)?),
            "$lt" => Operator::Lt(value),
            "$lte" => Operator::Lte(value),
            "$gt" => Operator::Gt(value),
            "$gte" => Operator::Gte(value),
            "$exists" => Operator::Exists(truthy(&value)),
            "$all" => Operator::All(expect_array(path, &key, value)?),
            "$elemMatch" => match value {
                Bson::Document(sub) => Operator::ElemMatch(Filter::try_from(sub)?),
                other => return Err(DocumentStoreError::invalid_filter(format!("{path}: $elemMatch expects a document, got {other}"))),
            },
            "$regex" => match value {
                Bson::String(pattern) => Operator::regex(pattern, regex_options.as_deref().unwrap_or("")),
                other => return Err(DocumentStoreError::invalid_filter(format!("{path}: $regex expects a string, got {other}"))),
            },
            "$options" if regex_options.is_some() => continue,
            other => return Err(DocumentStoreError::invalid_filter(format!("{path}: unsupported operator {other}"))),
        };

        if operators.iter().all(|o| o.tag() != op.tag()) {
            operators.push(op);
        }
    }

    Ok(Condition::Operators(operators))
}

fn expect_array(path: &str, key: &str, value: Bson) -> DocumentStoreResult<Vec<Bson>> {
    match value {
        Bson::Array(items) => Ok(items),
        other => Err(DocumentStoreError::invalid_filter(format!("{path}: {key} expects an array, got {other}"))),
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match clause {
                Clause::Field { path, condition: Condition::Literal(value) } => write!(f, "{path}: {value}")?,
                Clause::Field { path, condition: Condition::Operators(ops) } => {
                    write!(f, "{path}: {{")?;
                    for (j, op) in ops.iter().enumerate() {
                        if j > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}: ", op.tag().as_str())?;
                        match op {
                            Operator::Ne(v) | Operator::Lt(v) | Operator::Lte(v) | Operator::Gt(v) | Operator::Gte(v) => write!(f, "{v}")?,
                            Operator::In(vs) | Operator::Nin(vs) | Operator::All(vs) => write!(f, "{}", Bson::Array(vs.clone()))?,
                            Operator::Exists(b) => write!(f, "{b}")?,
                            Operator::ElemMatch(sub) => write!(f, "{sub}")?,
                            Operator::Regex { pattern, options } => write!(f, "/{pattern}/{options}")?,
                        }
                    }
                    f.write_str("}")?;
                }
                Clause::Logical { op, filters } => {
                    write!(f, "{}: [", op.as_str())?;
                    for (j, sub) in filters.iter().enumerate() {
                        if j > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{sub}")?;
                    }
                    f.write_str("]")?;
                }
            }
        }
        f.write_str("}")
    }
}

/// Visitor over a [`Filter`] tree, implemented by backends to evaluate or translate filters.
pub trait FilterVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    /// Combines the results of every clause of `filter`.
    fn visit_filter(&mut self, filter: &Filter) -> Result<Self::Output, Self::Error>;
    fn visit_literal(&mut self, path: &str, value: &Bson) -> Result<Self::Output, Self::Error>;
    fn visit_operators(
        &mut self,
        path: &str,
        operators: &[Operator],
    ) -> Result<Self::Output, Self::Error>;
    fn visit_logical(
        &mut self,
        op: LogicalOp,
        filters: &[Filter],
    ) -> Result<Self::Output, Self::Error>;

    fn visit_clause(&mut self, clause: &Clause) -> Result<Self::Output, Self::Error> {
        match clause {
            Clause::Field { path, condition: Condition::Literal(value) } => self.visit_literal(path, value),
            Clause::Field { path, condition: Condition::Operators(ops) } => self.visit_operators(path, ops),
            Clause::Logical { op, filters } => self.visit_logical(*op, filters),
        }
    }
}
