use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::llm::LlmError;

/// How sure the model is about its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Structured decision produced by one generation call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedResponse {
    /// SQL to run, or `None` when the question is answered conversationally
    pub query: Option<String>,
    pub explanation: String,
    pub confidence: Confidence,
}

impl GeneratedResponse {
    pub fn chat_only(explanation: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            query: None,
            explanation: explanation.into(),
            confidence,
        }
    }
}

// Raw shape the model is asked to emit. An object carrying more than one of
// `query`, `sql_query` and `sql` is a duplicate-field error, which the manager
// treats as malformed output and asks again.
#[derive(Debug, Deserialize)]
struct RawOutput {
    #[serde(default, alias = "sql_query", alias = "sql")]
    query: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
}

/// Output contract appended to the system instruction for every backend.
pub const OUTPUT_CONTRACT: &str = r#"
### Output format:
Respond with a single JSON object and nothing else:
{"query": "<SQL query, or null when no query is needed>", "explanation": "<brief explanation of the query, or the answer to the user>", "confidence": "high" | "medium" | "low"}
"#;

fn fenced_block() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fence pattern is valid")
    })
}

// Pull the JSON object out of whatever the model wrapped it in
fn extract_json(content: &str) -> Option<&str> {
    if let Some(captures) = fenced_block().captures(content) {
        return captures.get(1).map(|m| m.as_str());
    }

    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&content[start..=end])
}

/// Parses model text into a [`GeneratedResponse`], rejecting anything that
/// breaks the output contract.
pub fn parse_generated_response(content: &str) -> Result<GeneratedResponse, LlmError> {
    let json = extract_json(content).ok_or_else(|| {
        LlmError::MalformedOutput(format!("no JSON object in model output: {}", content.trim()))
    })?;

    let raw: RawOutput = serde_json::from_str(json)
        .map_err(|e| LlmError::MalformedOutput(format!("invalid JSON from model: {}", e)))?;

    let explanation = raw
        .explanation
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| LlmError::MalformedOutput("explanation is missing or empty".to_string()))?;

    let confidence = match raw.confidence {
        Some(value) => Confidence::parse(&value).ok_or_else(|| {
            LlmError::MalformedOutput(format!("unknown confidence level: {}", value))
        })?,
        None => return Err(LlmError::MalformedOutput("confidence is missing".to_string())),
    };

    let query = raw.query.map(|q| q.trim().to_string());

    Ok(GeneratedResponse {
        query,
        explanation,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let response = parse_generated_response(
            r#"{"query": "SELECT COUNT(*) FROM purchases", "explanation": "Counts rows", "confidence": "high"}"#,
        )
        .unwrap();

        assert_eq!(response.query.as_deref(), Some("SELECT COUNT(*) FROM purchases"));
        assert_eq!(response.explanation, "Counts rows");
        assert_eq!(response.confidence, Confidence::High);
    }

    #[test]
    fn parses_fenced_json_with_alias_and_null_query() {
        let content = "Sure!\n```json\n{\"sql_query\": null, \"explanation\": \"Hello there\", \"confidence\": \"Medium\"}\n```";
        let response = parse_generated_response(content).unwrap();

        assert!(response.query.is_none());
        assert_eq!(response.confidence, Confidence::Medium);
    }

    #[test]
    fn query_text_is_kept_verbatim_apart_from_trimming() {
        let response = parse_generated_response(
            r#"{"query": "  SELECT * FROM purchases WHERE item_name = 'Model `X`'\n", "explanation": "x", "confidence": "low"}"#,
        )
        .unwrap();

        assert_eq!(
            response.query.as_deref(),
            Some("SELECT * FROM purchases WHERE item_name = 'Model `X`'")
        );
    }

    #[test]
    fn more_than_one_query_key_is_malformed() {
        let result = parse_generated_response(
            r#"{"query": "SELECT 1", "sql": "SELECT 2", "explanation": "x", "confidence": "low"}"#,
        );
        assert!(matches!(result, Err(LlmError::MalformedOutput(_))));
    }

    #[test]
    fn rejects_contract_violations() {
        assert!(matches!(
            parse_generated_response("I think the answer is 42"),
            Err(LlmError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_generated_response(r#"{"query": null, "explanation": "  ", "confidence": "high"}"#),
            Err(LlmError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_generated_response(r#"{"query": null, "explanation": "ok", "confidence": "certain"}"#),
            Err(LlmError::MalformedOutput(_))
        ));
    }
}
