use minijinja::{context, Environment};
use std::path::Path;
use tracing::{error, info};

use crate::agent::schema::SchemaDescription;

pub const FALLBACK_TABLE_NAME: &str = "unknown_table";
const FALLBACK_DESCRIPTION: &str = "No description provided";

/// Instruction used when the template cannot be read or rendered.
pub fn fallback_instruction(schema: &SchemaDescription) -> String {
    format!(
        "You are an AI assistant. Please convert natural language questions into SQL queries \
         against the `{}` table, or answer conversationally when no query is needed.",
        table_name(schema)
    )
}

pub fn table_name(schema: &SchemaDescription) -> &str {
    schema
        .table_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(FALLBACK_TABLE_NAME)
}

fn render_columns(schema: &SchemaDescription) -> String {
    schema
        .columns
        .iter()
        .map(|col| format!("- **{}** ({}): {}\n", col.name, col.data_type, col.description))
        .collect()
}

fn render_notes(schema: &SchemaDescription) -> String {
    schema
        .query_notes
        .iter()
        .map(|note| format!("- {}\n", note.text))
        .collect()
}

/// Fills the template slots `database_description`, `table_schema`,
/// `query_notes` and `table_name` from the schema.
pub fn build(template: &str, schema: &SchemaDescription) -> String {
    let env = Environment::new();
    let description = schema
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(FALLBACK_DESCRIPTION);

    let rendered = env.render_str(
        template,
        context! {
            database_description => description,
            table_schema => render_columns(schema),
            query_notes => render_notes(schema),
            table_name => table_name(schema),
        },
    );

    match rendered {
        Ok(prompt) if !prompt.trim().is_empty() => prompt,
        Ok(_) => {
            error!("System prompt template rendered empty, using fallback instruction");
            fallback_instruction(schema)
        }
        Err(e) => {
            error!("Could not render system prompt template: {}", e);
            fallback_instruction(schema)
        }
    }
}

/// Reads the template document and builds the system instruction from it.
pub fn build_from_file(path: impl AsRef<Path>, schema: &SchemaDescription) -> String {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(template) => {
            info!("Loaded system prompt template from {}", path.display());
            build(&template, schema)
        }
        Err(e) => {
            error!("Could not load system prompt template {}: {}", path.display(), e);
            fallback_instruction(schema)
        }
    }
}
