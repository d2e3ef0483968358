//! Query string parsing.
//!
//! A query is a flat list of `name=value` parameters:
//!
//! - `sort=field$1,other$-1` orders results (`1` ascending, `-1` descending),
//!   earlier entries taking precedence.
//! - `proj=field,other` keeps only the listed fields (plus the identifier).
//! - any other name filters on the field of that name. `value` is an equality
//!   match, `low$high` an inclusive range.
//!
//! When a parameter is repeated the last occurrence wins. Multi-valued
//! equality (`a=1&a=2` meaning "1 or 2") is intentionally not supported.

use std::collections::{BTreeSet, HashSet};

use crate::error::QueryError;
use crate::schema::{FieldType, Schema};
use crate::value::TypedValue;

pub const SORT_PARAM: &str = "sort";
pub const PROJECTION_PARAM: &str = "proj";
pub const DELIMITER: char = '$';

/// A single field predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equals {
        field: String,
        value: TypedValue,
    },
    /// Inclusive on both bounds.
    Range {
        field: String,
        low: TypedValue,
        high: TypedValue,
    },
}

impl Predicate {
    pub fn field(&self) -> &str {
        match self {
            Predicate::Equals { field, .. } | Predicate::Range { field, .. } => field,
        }
    }

    pub fn matches(&self, candidate: &TypedValue) -> bool {
        use std::cmp::Ordering::*;

        match self {
            Predicate::Equals { value, .. } => candidate.compare(value) == Some(Equal),
            Predicate::Range { low, high, .. } => {
                matches!(candidate.compare(low), Some(Greater | Equal))
                    && matches!(candidate.compare(high), Some(Less | Equal))
            }
        }
    }

    fn operand_types(&self) -> Vec<FieldType> {
        match self {
            Predicate::Equals { value, .. } => vec![value.field_type()],
            Predicate::Range { low, high, .. } => vec![low.field_type(), high.field_type()],
        }
    }
}

/// Predicates combined with logical AND, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    predicates: Vec<Predicate>,
}

impl FilterSpec {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn apply(self, ordering: std::cmp::Ordering) -> std::cmp::Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Sort keys in precedence order; the first entry is the primary key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    pub fn new(keys: Vec<SortKey>) -> Result<Self, QueryError> {
        let mut seen = HashSet::new();
        for key in &keys {
            if !seen.insert(key.field.as_str()) {
                return Err(QueryError::malformed(format!(
                    "sort field '{}' is listed more than once",
                    key.field
                )));
            }
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Fields to keep. Empty means every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionSpec {
    fields: BTreeSet<String>,
}

impl ProjectionSpec {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn is_all(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether `field` survives projection. The identifier always does.
    pub fn retains(&self, field: &str, id_field: &str) -> bool {
        self.is_all() || field == id_field || self.fields.contains(field)
    }
}

/// A parsed collection query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: FilterSpec,
    pub sort: SortSpec,
    pub projection: ProjectionSpec,
}

impl Query {
    /// Check every referenced field against `schema`.
    ///
    /// Parsing already does this, but a collection's schema can change
    /// between parse and evaluation.
    pub fn validate(&self, schema: &Schema) -> Result<(), QueryError> {
        for predicate in self.filter.predicates() {
            let field_type = schema.require(predicate.field())?;
            if predicate.operand_types().iter().any(|t| *t != field_type) {
                return Err(QueryError::TypeMismatch {
                    field: predicate.field().to_string(),
                    expected: field_type,
                    value: match predicate {
                        Predicate::Equals { value, .. } => value.to_string(),
                        Predicate::Range { low, high, .. } => {
                            format!("{}{}{}", low, DELIMITER, high)
                        }
                    },
                });
            }
        }

        for key in self.sort.keys() {
            schema.require(&key.field)?;
        }

        for field in self.projection.fields() {
            schema.require(field)?;
        }

        Ok(())
    }
}

/// Parse a raw `application/x-www-form-urlencoded` query string, with or
/// without the leading `?`.
pub fn parse_query_string(raw: &str, schema: &Schema) -> Result<Query, QueryError> {
    let raw = raw.strip_prefix('?').unwrap_or(raw);
    let params: Vec<(String, String)> = serde_urlencoded::from_str(raw)
        .map_err(|e| QueryError::malformed(format!("cannot decode query string: {}", e)))?;

    parse_params(params.iter().map(|(k, v)| (k.as_str(), v.as_str())), schema)
}

/// Parse already-decoded `(name, value)` pairs in the order they arrived.
pub fn parse_params<'a, I>(params: I, schema: &Schema) -> Result<Query, QueryError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut filters: Vec<(&str, &str)> = Vec::new();
    let mut sort = None;
    let mut projection = None;

    for (name, value) in params {
        match name {
            "" => return Err(QueryError::malformed("parameter name is empty")),
            SORT_PARAM => sort = Some(value),
            PROJECTION_PARAM => projection = Some(value),
            field => match filters.iter_mut().find(|(existing, _)| *existing == field) {
                // last occurrence wins, keeping the first position
                Some(slot) => slot.1 = value,
                None => filters.push((field, value)),
            },
        }
    }

    let predicates = filters
        .into_iter()
        .map(|(field, value)| parse_filter(field, value, schema))
        .collect::<Result<Vec<_>, _>>()?;

    let sort = match sort {
        Some(value) => parse_sort(value, schema)?,
        None => SortSpec::default(),
    };

    let projection = match projection {
        Some(value) => parse_projection(value, schema)?,
        None => ProjectionSpec::default(),
    };

    let query = Query {
        filter: FilterSpec::new(predicates),
        sort,
        projection,
    };

    tracing::debug!(
        predicates = query.filter.predicates().len(),
        sort_keys = query.sort.keys().len(),
        projected = !query.projection.is_all(),
        "Parsed collection query"
    );

    Ok(query)
}

fn parse_filter(field: &str, raw: &str, schema: &Schema) -> Result<Predicate, QueryError> {
    let field_type = schema.require(field)?;

    let Some((low_raw, high_raw)) = raw.split_once(DELIMITER) else {
        let value = TypedValue::parse(raw, field_type).ok_or_else(|| QueryError::TypeMismatch {
            field: field.to_string(),
            expected: field_type,
            value: raw.to_string(),
        })?;
        return Ok(Predicate::Equals {
            field: field.to_string(),
            value,
        });
    };

    if high_raw.contains(DELIMITER) {
        return Err(QueryError::malformed(format!(
            "range for '{}' must contain exactly one '{}'",
            field, DELIMITER
        )));
    }

    let low = parse_bound(field, field_type, low_raw)?;
    let high = parse_bound(field, field_type, high_raw)?;

    if low.compare(&high) == Some(std::cmp::Ordering::Greater) {
        return Err(QueryError::malformed(format!(
            "range for '{}' has low bound {} above high bound {}",
            field, low, high
        )));
    }

    Ok(Predicate::Range {
        field: field.to_string(),
        low,
        high,
    })
}

fn parse_bound(field: &str, field_type: FieldType, raw: &str) -> Result<TypedValue, QueryError> {
    if raw.is_empty() {
        return Err(QueryError::malformed(format!(
            "range for '{}' is missing a bound",
            field
        )));
    }

    TypedValue::parse(raw, field_type).ok_or_else(|| {
        QueryError::malformed(format!(
            "range bound '{}' for '{}' is not a valid {}",
            raw, field, field_type
        ))
    })
}

fn parse_sort(raw: &str, schema: &Schema) -> Result<SortSpec, QueryError> {
    let keys = raw
        .split(',')
        .map(str::trim)
        .map(|token| {
            let (field, direction) = token.split_once(DELIMITER).ok_or_else(|| {
                QueryError::malformed(format!(
                    "sort entry '{}' must look like field{}1 or field{}-1",
                    token, DELIMITER, DELIMITER
                ))
            })?;

            if field.is_empty() {
                return Err(QueryError::malformed("sort entry has an empty field name"));
            }

            let direction = match direction {
                "1" => SortDirection::Ascending,
                "-1" => SortDirection::Descending,
                other => {
                    return Err(QueryError::malformed(format!(
                        "sort direction '{}' for '{}' must be 1 or -1",
                        other, field
                    )))
                }
            };

            schema.require(field)?;

            Ok(SortKey {
                field: field.to_string(),
                direction,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    SortSpec::new(keys)
}

fn parse_projection(raw: &str, schema: &Schema) -> Result<ProjectionSpec, QueryError> {
    let fields = raw
        .split(',')
        .map(str::trim)
        .map(|field| {
            if field.is_empty() {
                return Err(QueryError::malformed("projection has an empty field name"));
            }
            if !schema.contains(field) {
                return Err(QueryError::malformed(format!(
                    "projection field '{}' is not part of the collection",
                    field
                )));
            }
            Ok(field)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProjectionSpec::new(fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new(
            "id",
            [
                ("id", FieldType::Number),
                ("name", FieldType::String),
                ("surname", FieldType::String),
                ("age", FieldType::Number),
                ("joined", FieldType::Timestamp),
            ],
        )
        .unwrap()
    }

    fn parse(raw: &str) -> Result<Query, QueryError> {
        parse_query_string(raw, &schema())
    }

    #[test]
    fn test_equals_predicate() {
        let query = parse("name=Ada").unwrap();
        assert_eq!(
            query.filter.predicates(),
            &[Predicate::Equals {
                field: "name".to_string(),
                value: TypedValue::Text("Ada".to_string()),
            }]
        );
        assert!(query.sort.is_empty());
        assert!(query.projection.is_all());
    }

    #[test]
    fn test_range_predicate() {
        let query = parse("?age=12$24").unwrap();
        assert_eq!(
            query.filter.predicates(),
            &[Predicate::Range {
                field: "age".to_string(),
                low: TypedValue::Number(12.0),
                high: TypedValue::Number(24.0),
            }]
        );
    }

    #[test]
    fn test_percent_encoded_delimiter() {
        let query = parse("age=12%2424").unwrap();
        assert!(matches!(
            query.filter.predicates()[0],
            Predicate::Range { .. }
        ));
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        assert!(matches!(
            parse("age=24$12"),
            Err(QueryError::MalformedQuery(_))
        ));
        // equal bounds are a valid single-point range
        assert!(parse("age=12$12").is_ok());
    }

    #[test]
    fn test_range_rejects_bad_operands() {
        for raw in ["age=ten$20", "age=$20", "age=10$", "age=1$2$3", "joined=2024-01-01$soon"] {
            assert!(
                matches!(parse(raw), Err(QueryError::MalformedQuery(_))),
                "{raw} should be malformed"
            );
        }
    }

    #[test]
    fn test_string_range_is_lexical() {
        assert!(parse("name=A$M").is_ok());
        assert!(matches!(
            parse("name=b$B"),
            Err(QueryError::MalformedQuery(_))
        ));
    }

    #[test]
    fn test_equals_type_mismatch() {
        assert_eq!(
            parse("age=old"),
            Err(QueryError::TypeMismatch {
                field: "age".to_string(),
                expected: FieldType::Number,
                value: "old".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_filter_field() {
        assert_eq!(
            parse("height=180"),
            Err(QueryError::UnknownField("height".to_string()))
        );
    }

    #[test]
    fn test_repeated_filter_last_wins() {
        let query = parse("age=1&name=Ada&age=30").unwrap();
        assert_eq!(
            query.filter.predicates(),
            &[
                Predicate::Equals {
                    field: "age".to_string(),
                    value: TypedValue::Number(30.0),
                },
                Predicate::Equals {
                    field: "name".to_string(),
                    value: TypedValue::Text("Ada".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_repeated_filter_only_last_is_validated() {
        assert!(parse("age=nonsense&age=4").is_ok());
    }

    #[test]
    fn test_sort_parsing() {
        let query = parse("sort=name$-1,surname$1").unwrap();
        assert_eq!(
            query.sort.keys(),
            &[
                SortKey {
                    field: "name".to_string(),
                    direction: SortDirection::Descending,
                },
                SortKey {
                    field: "surname".to_string(),
                    direction: SortDirection::Ascending,
                },
            ]
        );
    }

    #[test]
    fn test_sort_rejects_bad_directions() {
        for raw in ["sort=name$2", "sort=name$asc", "sort=name", "sort=name$", "sort=$1", "sort="] {
            assert!(
                matches!(parse(raw), Err(QueryError::MalformedQuery(_))),
                "{raw} should be malformed"
            );
        }
    }

    #[test]
    fn test_sort_rejects_duplicates() {
        assert!(matches!(
            parse("sort=name$1,name$-1"),
            Err(QueryError::MalformedQuery(_))
        ));
    }

    #[test]
    fn test_sort_unknown_field() {
        assert_eq!(
            parse("sort=height$1"),
            Err(QueryError::UnknownField("height".to_string()))
        );
    }

    #[test]
    fn test_projection_parsing() {
        let query = parse("proj=name,surname").unwrap();
        assert_eq!(query.projection.fields().collect::<Vec<_>>(), ["name", "surname"]);
        assert!(query.projection.retains("id", "id"));
        assert!(!query.projection.retains("age", "id"));
    }

    #[test]
    fn test_projection_unknown_field_is_malformed() {
        assert!(matches!(
            parse("proj=name,height"),
            Err(QueryError::MalformedQuery(_))
        ));
        assert!(matches!(
            parse("proj=name,,surname"),
            Err(QueryError::MalformedQuery(_))
        ));
    }

    #[test]
    fn test_empty_parameter_name() {
        assert!(matches!(parse("=5"), Err(QueryError::MalformedQuery(_))));
    }

    #[test]
    fn test_equals_round_trips() {
        for (raw, expected) in [("age=42", "42"), ("age=0.5", "0.5"), ("name=Grace", "Grace")] {
            let query = parse(raw).unwrap();
            match &query.filter.predicates()[0] {
                Predicate::Equals { value, .. } => assert_eq!(value.to_string(), expected),
                other => panic!("expected equality, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_detects_schema_drift() {
        let query = parse("age=3&sort=name$1").unwrap();

        let without_age = Schema::new(
            "id",
            [("id", FieldType::Number), ("name", FieldType::String)],
        )
        .unwrap();
        assert_eq!(
            query.validate(&without_age),
            Err(QueryError::UnknownField("age".to_string()))
        );

        let age_as_text = Schema::new(
            "id",
            [
                ("id", FieldType::Number),
                ("name", FieldType::String),
                ("age", FieldType::String),
            ],
        )
        .unwrap();
        assert!(matches!(
            query.validate(&age_as_text),
            Err(QueryError::TypeMismatch { .. })
        ));
    }
}
