use serde::Deserialize;
use std::path::Path;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryNote {
    #[serde(rename = "note")]
    pub text: String,
}

/// Declarative description of the queried table, as found in
/// `table_schema.yaml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchemaDescription {
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    #[serde(default, rename = "llm_query_notes")]
    pub query_notes: Vec<QueryNote>,
}

impl SchemaDescription {
    /// Loads the schema file, falling back to an empty description when the
    /// file is missing or cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Schema file not found or unreadable: {} ({})", path.display(), e);
                return Self::default();
            }
        };

        match serde_yaml::from_str::<Option<SchemaDescription>>(&contents) {
            Ok(schema) => {
                let schema = schema.unwrap_or_default();
                info!(
                    "Schema loaded successfully: {} columns, {} query notes",
                    schema.columns.len(),
                    schema.query_notes.len()
                );
                schema
            }
            Err(e) => {
                error!("Failed to load schema from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
