//! Canonical result types and normalization.
//!
//! Every connector collapses its native column types into [`CanonicalType`]
//! through a fixed [`TypeMapping`], and its rows into a [`CanonicalResult`].

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, RunnerError};

/// The small fixed set of types every native type collapses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CanonicalType {
    Boolean,
    Integer,
    Float,
    String,
    Date,
    Datetime,
    /// Native type absent from the connector's table. Serialized as `null`.
    #[default]
    Unknown,
}

impl CanonicalType {
    /// Returns the wire name, or `None` for [`CanonicalType::Unknown`].
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Boolean => Some("boolean"),
            Self::Integer => Some("integer"),
            Self::Float => Some("float"),
            Self::String => Some("string"),
            Self::Date => Some("date"),
            Self::Datetime => Some("datetime"),
            Self::Unknown => None,
        }
    }

    /// Parses a wire name. Unrecognized names degrade to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "boolean" => Self::Boolean,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "string" => Self::String,
            "date" => Self::Date,
            "datetime" => Self::Datetime,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().unwrap_or("unknown"))
    }
}

impl Serialize for CanonicalType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.as_str() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for CanonicalType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = Option::<String>::deserialize(deserializer)?;
        Ok(name.as_deref().map(Self::parse).unwrap_or_default())
    }
}

/// Fixed lookup from native type names to canonical types.
#[derive(Debug, Clone, Copy)]
pub struct TypeMapping {
    entries: &'static [(&'static str, CanonicalType)],
}

impl TypeMapping {
    pub const fn new(entries: &'static [(&'static str, CanonicalType)]) -> Self {
        Self { entries }
    }

    /// Maps a native type name. Lookup is exact; absent names map to `Unknown`.
    pub fn map_type(&self, native: &str) -> CanonicalType {
        self.entries
            .iter()
            .find(|(name, _)| *name == native)
            .map(|(_, ty)| *ty)
            .unwrap_or(CanonicalType::Unknown)
    }

    /// Returns every native type name in the table.
    pub fn native_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }
}

/// A column of a canonical result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: CanonicalType,
}

impl CanonicalColumn {
    pub fn new(name: impl Into<String>, column_type: CanonicalType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A row keyed by column name, in column order.
pub type Row = IndexMap<String, serde_json::Value>;

/// The canonical columnar result shape shared by all connectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResult {
    pub columns: Vec<CanonicalColumn>,
    pub rows: Vec<Row>,
}

impl CanonicalResult {
    /// Serializes the result to its JSON wire shape.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| RunnerError::internal(format!("Failed to serialize result: {e}")))
    }

    /// Parses a result from its JSON wire shape.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RunnerError::internal(format!("Failed to parse result: {e}")))
    }
}

/// A raw column descriptor as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeColumn {
    pub name: String,
    pub native_type: String,
}

impl NativeColumn {
    pub fn new(name: impl Into<String>, native_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            native_type: native_type.into(),
        }
    }
}

/// Builds canonical columns, renaming duplicates so every name is unique.
///
/// The second `a` becomes `a2`, the third `a3`, and so on.
pub fn canonical_columns(columns: &[NativeColumn], mapping: &TypeMapping) -> Vec<CanonicalColumn> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut taken: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(columns.len());

    for col in columns {
        let mut name = col.name.clone();
        while taken.contains(&name) {
            let counter = seen.entry(col.name.clone()).or_insert(1);
            *counter += 1;
            name = format!("{}{}", col.name, counter);
        }
        taken.insert(name.clone());
        out.push(CanonicalColumn::new(name, mapping.map_type(&col.native_type)));
    }

    out
}

/// Normalizes backend rows into a [`CanonicalResult`].
///
/// Rows shorter than the column list are padded with `null`; extra trailing
/// values are dropped.
pub fn normalize(
    columns: &[NativeColumn],
    rows: Vec<Vec<serde_json::Value>>,
    mapping: &TypeMapping,
) -> CanonicalResult {
    let columns = canonical_columns(columns, mapping);

    let rows = rows
        .into_iter()
        .map(|values| {
            let mut values = values.into_iter();
            columns
                .iter()
                .map(|col| {
                    (
                        col.name.clone(),
                        values.next().unwrap_or(serde_json::Value::Null),
                    )
                })
                .collect::<Row>()
        })
        .collect();

    CanonicalResult { columns, rows }
}

/// A table found by schema introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    /// Qualified name, `schema.table`.
    pub name: String,
    pub columns: Vec<String>,
}

/// Groups `(schema, table, column)` rows into schema entries in first-seen order.
///
/// Rows whose schema is listed in `excluded_schemas` are skipped.
pub fn group_schema<I>(rows: I, excluded_schemas: &[&str]) -> Vec<SchemaEntry>
where
    I: IntoIterator<Item = (String, String, String)>,
{
    let mut entries: IndexMap<String, Vec<String>> = IndexMap::new();

    for (schema, table, column) in rows {
        if excluded_schemas.contains(&schema.as_str()) {
            continue;
        }
        entries
            .entry(format!("{schema}.{table}"))
            .or_default()
            .push(column);
    }

    entries
        .into_iter()
        .map(|(name, columns)| SchemaEntry { name, columns })
        .collect()
}

/// Extracts `(schema, table, column)` triples from an introspection result.
pub fn schema_rows(result: &CanonicalResult) -> Result<Vec<(String, String, String)>> {
    fn text(row: &Row, key: &str) -> Result<String> {
        match row.get(key) {
            Some(serde_json::Value::String(s)) => Ok(s.clone()),
            Some(other) if !other.is_null() => Ok(other.to_string()),
            _ => Err(RunnerError::schema(format!(
                "Introspection row is missing '{key}'"
            ))),
        }
    }

    result
        .rows
        .iter()
        .map(|row| {
            Ok((
                text(row, "table_schema")?,
                text(row, "table_name")?,
                text(row, "column_name")?,
            ))
        })
        .collect()
}
