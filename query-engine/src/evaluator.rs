//! In-memory evaluation of a [`Query`] against a collection of JSON records.
//!
//! Order of operations: filter, then sort, then project. Projection never
//! changes which records come back or in what order.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::QueryError;
use crate::parser::{FilterSpec, Predicate, Query, SortSpec};
use crate::schema::Schema;
use crate::value::TypedValue;

/// A stored record: a flat JSON object.
pub type Record = Map<String, Value>;

/// A matching record with its sort keys coerced once up front.
struct Row {
    sort_values: Vec<Option<TypedValue>>,
    id: Option<TypedValue>,
    record: Record,
}

/// Apply `query` to `records` under `schema`.
pub fn evaluate<I>(query: &Query, schema: &Schema, records: I) -> Result<Vec<Record>, QueryError>
where
    I: IntoIterator<Item = Record>,
{
    query.validate(schema)?;

    let mut scanned = 0usize;
    let mut rows = Vec::new();
    for record in records {
        scanned += 1;
        if matches_filter(&query.filter, schema, &record)? {
            rows.push(row_for(record, &query.sort, schema)?);
        }
    }

    rows.sort_by(|a, b| compare_rows(a, b, &query.sort));

    let id_field = schema.id_field();
    let results: Vec<Record> = rows
        .into_iter()
        .map(|row| {
            let mut record = row.record;
            if !query.projection.is_all() {
                record.retain(|field, _| query.projection.retains(field, id_field));
            }
            record
        })
        .collect();

    tracing::debug!(scanned, matched = results.len(), "Evaluated collection query");

    Ok(results)
}

/// Whether `record` satisfies every predicate of `filter`. A null or
/// missing field never matches.
pub fn matches_filter(
    filter: &FilterSpec,
    schema: &Schema,
    record: &Record,
) -> Result<bool, QueryError> {
    for predicate in filter.predicates() {
        if !matches_predicate(predicate, schema, record)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_predicate(
    predicate: &Predicate,
    schema: &Schema,
    record: &Record,
) -> Result<bool, QueryError> {
    let field = predicate.field();
    let field_type = schema.require(field)?;

    match typed_field(record, field, field_type)? {
        Some(value) => Ok(predicate.matches(&value)),
        None => Ok(false),
    }
}

fn typed_field(
    record: &Record,
    field: &str,
    field_type: crate::schema::FieldType,
) -> Result<Option<TypedValue>, QueryError> {
    match record.get(field) {
        Some(value) => TypedValue::from_json(field, value, field_type),
        None => Ok(None),
    }
}

fn row_for(record: Record, sort: &SortSpec, schema: &Schema) -> Result<Row, QueryError> {
    let sort_values = sort
        .keys()
        .iter()
        .map(|key| typed_field(&record, &key.field, schema.require(&key.field)?))
        .collect::<Result<Vec<_>, _>>()?;

    let id_field = schema.id_field();
    let id = typed_field(&record, id_field, schema.require(id_field)?)?;

    Ok(Row {
        sort_values,
        id,
        record,
    })
}

/// Listed keys in precedence order, then identifier ascending. Missing values
/// sort first in ascending order.
fn compare_rows(a: &Row, b: &Row, sort: &SortSpec) -> Ordering {
    sort.keys()
        .iter()
        .zip(a.sort_values.iter().zip(&b.sort_values))
        .map(|(key, (left, right))| key.direction.apply(compare_optional(left, right)))
        .find(|ordering| ordering.is_ne())
        .unwrap_or_else(|| compare_optional(&a.id, &b.id))
}

fn compare_optional(a: &Option<TypedValue>, b: &Option<TypedValue>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
