//! Structure analysis of the document opening.
//!
//! Runs once, on the first chunk. The result only steers the bootstrap
//! prompt, so this step never fails: any LLM or parse failure degrades to
//! [`default_structure`].

use crate::config::ProjectContext;
use crate::pipeline::chunk::head_chars;
use crate::pipeline::llm::LlmInvoker;
use crate::pipeline::parse::try_extract_json;
use crate::prompts::{structure_prompt, STRUCTURE_SYSTEM_PROMPT};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// Characters of the first chunk that seed the running context.
pub const CONTEXT_SEED_CHARS: usize = 500;

/// Analyse `first_chunk` and return the structure record.
pub async fn analyze(
    invoker: &LlmInvoker,
    first_chunk: &str,
    project: &ProjectContext,
    language: &str,
) -> Value {
    let prompt = structure_prompt(first_chunk, project, language);
    match invoker
        .invoke("analyze_structure", STRUCTURE_SYSTEM_PROMPT, &prompt)
        .await
    {
        Ok(text) => match try_extract_json(&text) {
            Some(Value::Object(map)) => {
                debug!("Structure analysis returned {} keys", map.len());
                complete_structure(map, project, language)
            }
            _ => {
                warn!("Structure analysis returned no JSON object; using default structure");
                default_structure(project, language)
            }
        },
        Err(e) => {
            warn!("Structure analysis failed ({}); using default structure", e);
            default_structure(project, language)
        }
    }
}

/// Initial `accumulated_context`: the first [`CONTEXT_SEED_CHARS`] characters.
pub fn seed_context(first_chunk: &str) -> String {
    head_chars(first_chunk, CONTEXT_SEED_CHARS).to_string()
}

/// Structure record used whenever analysis produced nothing usable.
pub fn default_structure(project: &ProjectContext, language: &str) -> Value {
    let title = if project.topic.trim().is_empty() {
        "未命名文档"
    } else {
        project.topic.trim()
    };
    json!({
        "title": title,
        "type": "document",
        "sections": [],
        "key_concepts": [],
        "language": language,
        "complexity": "medium",
    })
}

// Missing keys are filled from the default so the bootstrap prompt always
// sees the same shape.
fn complete_structure(mut map: Map<String, Value>, project: &ProjectContext, language: &str) -> Value {
    if let Value::Object(defaults) = default_structure(project, language) {
        for (key, value) in defaults {
            let missing = match map.get(&key) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if missing {
                map.insert(key, value);
            }
        }
    }
    Value::Object(map)
}
