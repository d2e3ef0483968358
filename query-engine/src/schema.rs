//! Record schema: the declared type of every queryable field.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::QueryError;

/// Declared type of a field, which drives how query operands and record
/// values are coerced and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Compared numerically.
    #[serde(alias = "numeric")]
    Number,
    /// RFC 3339, `YYYY-MM-DD`, or UNIX seconds; compared chronologically.
    Timestamp,
    /// Compared lexically, byte by byte.
    #[serde(alias = "text")]
    String,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Number => "number",
            FieldType::Timestamp => "timestamp",
            FieldType::String => "string",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_id_field() -> String {
    "id".to_string()
}

#[derive(Deserialize)]
struct RawSchema {
    #[serde(default = "default_id_field")]
    id_field: String,
    fields: BTreeMap<String, FieldType>,
}

/// Field declarations for one collection. The identifier field is always
/// declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSchema")]
pub struct Schema {
    id_field: String,
    fields: BTreeMap<String, FieldType>,
}

impl TryFrom<RawSchema> for Schema {
    type Error = QueryError;

    fn try_from(raw: RawSchema) -> Result<Self, Self::Error> {
        Schema::new(raw.id_field, raw.fields)
    }
}

impl Schema {
    pub fn new<I, K>(id_field: impl Into<String>, fields: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (K, FieldType)>,
        K: Into<String>,
    {
        let id_field = id_field.into();
        let fields: BTreeMap<String, FieldType> =
            fields.into_iter().map(|(k, t)| (k.into(), t)).collect();

        if let Some(name) = fields.keys().find(|name| !is_valid_field_name(name)) {
            return Err(QueryError::InvalidSchema(format!(
                "field name '{}' is empty or contains a reserved character",
                name
            )));
        }

        if !fields.contains_key(&id_field) {
            return Err(QueryError::InvalidSchema(format!(
                "identifier field '{}' is not declared",
                id_field
            )));
        }

        Ok(Self { id_field, fields })
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    /// Look up a field, failing with `UnknownField` when it is not declared.
    pub fn require(&self, name: &str) -> Result<FieldType, QueryError> {
        self.field_type(name)
            .ok_or_else(|| QueryError::UnknownField(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(k, t)| (k.as_str(), *t))
    }
}

fn is_valid_field_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['$', ',', '=', '&'])
}
