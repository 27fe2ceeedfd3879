//! Translation of filter trees and read options into MongoDB syntax.

use bson::{Bson, Document, doc};

use docprovider_core::{
    error::DocumentStoreError,
    filter::{Filter, FilterVisitor, LogicalOp, Operator},
    query::{FindOptions, SortDirection},
};
use mongodb::options::FindOptions as MongoFindOptions;

/// Translates filter trees into MongoDB query documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    pub fn translate(filter: &Filter) -> Result<Document, DocumentStoreError> {
        MongoQueryTranslator.visit_filter(filter)
    }

    fn operator(&mut self, op: &Operator, into: &mut Document) -> Result<(), DocumentStoreError> {
        match op {
            Operator::Ne(value) => into.insert("$ne", value.clone()),
            Operator::In(values) => into.insert("$in", values.clone()),
            Operator::Nin(values) => into.insert("$nin", values.clone()),
            Operator::Lt(value) => into.insert("$lt", value.clone()),
            Operator::Lte(value) => into.insert("$lte", value.clone()),
            Operator::Gt(value) => into.insert("$gt", value.clone()),
            Operator::Gte(value) => into.insert("$gte", value.clone()),
            Operator::Exists(exists) => into.insert("$exists", *exists),
            Operator::All(values) => into.insert("$all", values.clone()),
            Operator::ElemMatch(sub) => into.insert("$elemMatch", self.visit_filter(sub)?),
            Operator::Regex { pattern, options } => {
                if !options.is_empty() {
                    into.insert("$options", options.as_str());
                }
                into.insert("$regex", pattern.as_str())
            }
        };

        Ok(())
    }
}

impl FilterVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_filter(&mut self, filter: &Filter) -> Result<Self::Output, Self::Error> {
        let mut query = Document::new();
        for clause in filter.clauses() {
            query.extend(self.visit_clause(clause)?);
        }

        Ok(query)
    }

    fn visit_literal(&mut self, path: &str, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! { path: value.clone() })
    }

    fn visit_operators(
        &mut self,
        path: &str,
        operators: &[Operator],
    ) -> Result<Self::Output, Self::Error> {
        let mut condition = Document::new();
        for op in operators {
            self.operator(op, &mut condition)?;
        }

        Ok(doc! { path: condition })
    }

    fn visit_logical(
        &mut self,
        op: LogicalOp,
        filters: &[Filter],
    ) -> Result<Self::Output, Self::Error> {
        let operands = filters
            .iter()
            .map(|filter| self.visit_filter(filter).map(Bson::Document))
            .collect::<Result<Vec<_>, _>>()?;

        let key = match op {
            LogicalOp::Or => "$or",
            LogicalOp::Nor => "$nor",
        };

        Ok(doc! { key: operands })
    }
}

/// Maps read options onto driver find options.
pub(crate) fn find_options(options: &FindOptions) -> MongoFindOptions {
    let mut translated = MongoFindOptions::default();

    if let Some(projection) = options.projection.as_ref().filter(|p| !p.is_empty()) {
        translated.projection = Some(
            projection
                .fields()
                .iter()
                .map(|(field, include)| (field.clone(), Bson::Int32(i32::from(*include))))
                .collect(),
        );
    }
    if !options.sort.is_empty() {
        translated.sort = Some(
            options
                .sort
                .iter()
                .map(|sort| {
                    let direction = match sort.direction {
                        SortDirection::Asc => 1,
                        SortDirection::Desc => -1,
                    };
                    (sort.field.clone(), Bson::Int32(direction))
                })
                .collect(),
        );
    }
    translated.skip = options.skip;
    translated.limit = options.limit.map(|limit| limit as i64);

    translated
}

#[cfg(test)]
mod tests {
    use super::*;
    use docprovider_core::query::{Query, RangeMode};

    #[test]
    fn literal_and_operator_fields() {
        let filter = Query::builder()
            .is_equal("name", "B")
            .in_range("value", 2, 4, RangeMode::Inclusive)
            .is_one_of("role", ["admin"])
            .into_filter();

        assert_eq!(
            MongoQueryTranslator::translate(&filter).unwrap(),
            doc! {
                "name": "B",
                "value": { "$gte": 2, "$lte": 4 },
                "role": { "$in": ["admin"] },
            }
        );
    }

    #[test]
    fn regex_carries_store_flags_only() {
        let filter = Query::builder().is_match("title", "^al").into_filter();

        assert_eq!(
            MongoQueryTranslator::translate(&filter).unwrap(),
            doc! { "title": { "$options": "i", "$regex": "^al" } }
        );
    }

    #[test]
    fn logical_and_nested_clauses() {
        let filter = Query::builder()
            .or([
                Query::builder().is_equal("a", 1),
                Query::builder().has_element("b", false),
            ])
            .match_elements("scores", Query::builder().is_greater_than("value", 80))
            .into_filter();

        assert_eq!(
            MongoQueryTranslator::translate(&filter).unwrap(),
            doc! {
                "$or": [{ "a": 1 }, { "b": { "$exists": false } }],
                "scores": { "$elemMatch": { "value": { "$gt": 80 } } },
            }
        );
    }

    #[test]
    fn raw_documents_translate_back_to_the_same_shape() {
        let raw = doc! {
            "value": { "$gt": 2, "$lt": 9 },
            "$nor": [{ "name": "A" }],
        };

        let filter = Filter::try_from(raw.clone()).unwrap();
        assert_eq!(MongoQueryTranslator::translate(&filter).unwrap(), raw);
    }

    #[test]
    fn read_options_map_to_driver_options() {
        let options = Query::builder()
            .select(["+name", "-secret"])
            .sort("rating", SortDirection::Desc)
            .page(2, 10)
            .build()
            .options;

        let translated = find_options(&options);

        assert_eq!(translated.projection, Some(doc! { "name": 1, "secret": 0 }));
        assert_eq!(translated.sort, Some(doc! { "rating": -1 }));
        assert_eq!(translated.skip, Some(10));
        assert_eq!(translated.limit, Some(10));
    }
}
