//! Schema introspection models.

use schemars::JsonSchema;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct TableInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table_type: TableType,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, table_type: TableType) -> Self {
        Self {
            name: name.into(),
            schema: None,
            table_type,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

/// Kind of table-like object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Table,
    View,
    MaterializedView,
    TemporaryTable,
}

impl TableType {
    /// Parse the type names reported by information_schema and sqlite_master.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "view" | "system view" => Self::View,
            "materialized view" | "matview" => Self::MaterializedView,
            "local temporary" | "temporary" | "temp" => Self::TemporaryTable,
            _ => Self::Table,
        }
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::View => write!(f, "view"),
            Self::MaterializedView => write!(f, "materialized_view"),
            Self::TemporaryTable => write!(f, "temporary_table"),
        }
    }
}

/// Columns and indexes of one table, read fresh on every request.
///
/// Columns keep ordinal order and indexes are sorted by name, so two reads
/// of an unchanged table compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct TableSchema {
    pub table_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    pub indexes: Vec<IndexInfo>,
}

impl TableSchema {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema_name: None,
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema_name = Some(schema.into());
        self
    }

    /// Attach columns and derive the primary key list from their flags.
    pub fn with_columns(mut self, columns: Vec<ColumnDefinition>) -> Self {
        self.primary_key = columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect();
        self.columns = columns;
        self
    }

    pub fn with_primary_key(mut self, columns: Vec<String>) -> Self {
        self.primary_key = columns;
        self
    }

    pub fn with_indexes(mut self, mut indexes: Vec<IndexInfo>) -> Self {
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        self.indexes = indexes;
        self
    }

    /// True when the table was not found (or has no visible columns).
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn qualified_name(&self) -> String {
        match &self.schema_name {
            Some(schema) => format!("{}.{}", schema, self.table_name),
            None => self.table_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct ColumnDefinition {
    pub name: String,
    /// Declared type (e.g., `character varying(30)`, `bigint unsigned`, `TEXT`)
    pub data_type: String,
    pub nullable: bool,
    /// Default converted to the closest JSON type; expressions stay strings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    pub is_primary_key: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
        }
    }

    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    pub fn with_default(mut self, default_value: serde_json::Value) -> Self {
        self.default_value = Some(default_value);
        self
    }

    /// Set the default from its SQL text, typed by the column's data type.
    pub fn with_default_str(mut self, default_str: &str) -> Self {
        self.default_value = Some(parse_default_value(default_str, &self.data_type));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
}

impl IndexInfo {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            is_unique: false,
            is_primary: false,
        }
    }

    pub fn with_unique(mut self, is_unique: bool) -> Self {
        self.is_unique = is_unique;
        self
    }

    /// Primary key indexes are always unique.
    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        if is_primary {
            self.is_unique = true;
        }
        self
    }
}

/// Convert a column default's SQL text into a JSON value.
///
/// Quoted literals lose their quotes and any PostgreSQL `::type` cast.
/// Integers, floats, booleans and JSON documents become their JSON types.
/// Decimals and expressions (`CURRENT_TIMESTAMP`, `nextval(...)`) stay strings.
pub fn parse_default_value(default_str: &str, data_type: &str) -> serde_json::Value {
    let dt_lower = data_type.to_ascii_lowercase();
    let literal = unquote_literal(default_str.trim());

    let Some(text) = literal else {
        return typed_default(default_str.trim(), &dt_lower);
    };

    if dt_lower == "json" || dt_lower == "jsonb" {
        if let Ok(parsed) = serde_json::from_str(&text) {
            return parsed;
        }
    }
    if dt_lower.contains("bool") {
        if let Some(b) = parse_bool(&text) {
            return serde_json::Value::Bool(b);
        }
    }
    serde_json::Value::String(text)
}

fn typed_default(raw: &str, dt_lower: &str) -> serde_json::Value {
    if dt_lower.contains("int") || dt_lower.contains("serial") {
        if let Ok(n) = raw.parse::<i64>() {
            return serde_json::Value::Number(n.into());
        }
    }

    if (dt_lower.contains("float") || dt_lower.contains("double") || dt_lower == "real")
        && !dt_lower.contains("decimal")
        && !dt_lower.contains("numeric")
    {
        if let Some(num) = raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
        {
            return serde_json::Value::Number(num);
        }
    }

    if dt_lower.contains("bool") {
        if let Some(b) = parse_bool(raw) {
            return serde_json::Value::Bool(b);
        }
    }

    serde_json::Value::String(raw.to_string())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "t" => Some(true),
        "false" | "0" | "f" => Some(false),
        _ => None,
    }
}

/// `'abc'` or `'abc'::text` -> `abc`, with doubled quotes collapsed.
fn unquote_literal(s: &str) -> Option<String> {
    let body = s.strip_prefix('\'')?;
    let end = body.rfind('\'')?;
    let rest = &body[end + 1..];
    if !rest.is_empty() && !rest.starts_with("::") {
        return None;
    }
    Some(body[..end].replace("''", "'"))
}
