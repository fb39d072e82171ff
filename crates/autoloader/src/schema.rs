//! Column-schema declarations.
//!
//! Schema files hold a JSON array of BigQuery field definitions, the same
//! format accepted by `bq mk --schema`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use snafu::prelude::*;

use crate::error::{InvalidFieldSnafu, JsonSnafu, NoFieldsSnafu, SchemaError};

const FIELD_TYPES: &[&str] = &[
    "STRING",
    "BYTES",
    "INTEGER",
    "INT64",
    "FLOAT",
    "FLOAT64",
    "NUMERIC",
    "BIGNUMERIC",
    "BOOLEAN",
    "BOOL",
    "TIMESTAMP",
    "DATE",
    "TIME",
    "DATETIME",
    "GEOGRAPHY",
    "JSON",
    "INTERVAL",
    "RANGE",
    "RECORD",
    "STRUCT",
];

const FIELD_MODES: &[&str] = &["NULLABLE", "REQUIRED", "REPEATED"];

/// A single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Nested columns of a RECORD.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldSchema>,
    /// Remaining column attributes (`precision`, `scale`, `maxLength`,
    /// `policyTags`, `rangeElementType`, ...), passed through unchanged.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// A validated table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub fields: Vec<FieldSchema>,
}

impl TableSchema {
    /// Parse and validate a schema declaration.
    ///
    /// Type and mode names are normalized to upper case.
    pub fn from_json(bytes: &[u8]) -> Result<Self, SchemaError> {
        let mut fields: Vec<FieldSchema> = serde_json::from_slice(bytes).context(JsonSnafu)?;
        ensure!(!fields.is_empty(), NoFieldsSnafu);
        for field in &mut fields {
            validate_field(field)?;
        }
        Ok(Self { fields })
    }
}

fn validate_field(field: &mut FieldSchema) -> Result<(), SchemaError> {
    ensure!(
        !field.name.trim().is_empty(),
        InvalidFieldSnafu {
            name: field.name.clone(),
            reason: "empty name",
        }
    );

    field.field_type = field.field_type.to_ascii_uppercase();
    ensure!(
        FIELD_TYPES.contains(&field.field_type.as_str()),
        InvalidFieldSnafu {
            name: field.name.clone(),
            reason: format!("unknown type {}", field.field_type),
        }
    );

    if let Some(mode) = field.mode.as_mut() {
        *mode = mode.to_ascii_uppercase();
        ensure!(
            FIELD_MODES.contains(&mode.as_str()),
            InvalidFieldSnafu {
                name: field.name.clone(),
                reason: format!("unknown mode {mode}"),
            }
        );
    }

    let is_record = matches!(field.field_type.as_str(), "RECORD" | "STRUCT");
    ensure!(
        is_record == !field.fields.is_empty(),
        InvalidFieldSnafu {
            name: field.name.clone(),
            reason: "nested fields are required for, and only allowed on, RECORD columns",
        }
    );

    for nested in &mut field.fields {
        validate_field(nested)?;
    }
    Ok(())
}
