//! First outline, built from the structure record and the first chunk.
//!
//! Like structure analysis this step cannot fail: the response goes through
//! [`extract_json_from_response`], which already yields the one-slide default
//! for malformed output. An exhausted LLM call or a response without slides
//! yields that same default.

use crate::config::ProjectContext;
use crate::pipeline::llm::LlmInvoker;
use crate::pipeline::parse::{default_outline_value, extract_json_from_response, validate_ppt_structure};
use crate::prompts::{initial_outline_prompt, OUTLINE_SYSTEM_PROMPT};
use serde_json::Value;
use tracing::{info, warn};

/// Produce the initial outline value (already validated).
pub async fn bootstrap(
    invoker: &LlmInvoker,
    structure: &Value,
    first_chunk: &str,
    constraint: &str,
    project: &ProjectContext,
    language: &str,
) -> Value {
    let prompt = initial_outline_prompt(structure, first_chunk, constraint, project, language);
    let value = match invoker
        .invoke("generate_initial_outline", OUTLINE_SYSTEM_PROMPT, &prompt)
        .await
    {
        Ok(text) => extract_json_from_response(&text),
        Err(e) => {
            warn!("Initial outline failed ({}); starting from the default outline", e);
            default_outline_value()
        }
    };
    let value = validate_ppt_structure(value);
    let slides = value["slides"].as_array().map_or(0, Vec::len);
    if slides == 0 {
        warn!("Initial outline has no slides; starting from the default outline");
        return default_outline_value();
    }
    info!("Initial outline: {} slides", slides);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::output::DEFAULT_OUTLINE_TITLE;
    use crate::pipeline::llm::OutlineLlm;
    use crate::pipeline::retry::RetryPolicy;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct Reply(Option<&'static str>);

    #[async_trait]
    impl OutlineLlm for Reply {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
            self.0.map(str::to_string).ok_or(LlmError::EmptyResponse)
        }

        fn model_name(&self) -> &str {
            "reply"
        }
    }

    async fn run(reply: Option<&'static str>) -> Value {
        let invoker = LlmInvoker::new(Arc::new(Reply(reply)), RetryPolicy::new(2, Duration::ZERO));
        bootstrap(
            &invoker,
            &json!({"title": "Doc"}),
            "first chunk",
            "The outline must contain exactly 3 slides.",
            &ProjectContext::default(),
            "en",
        )
        .await
    }

    #[tokio::test]
    async fn valid_response_is_validated() {
        let v = run(Some(
            r#"Here's the JSON: {"title": "Solar", "slides": [
                {"title": "Solar", "slide_type": "title"},
                {"title": "Panels", "content_points": ["cells", 42]}
            ]}"#,
        ))
        .await;
        assert_eq!(v["title"], "Solar");
        assert_eq!(v["total_pages"], 2);
        assert_eq!(v["slides"][1]["page_number"], 2);
        assert_eq!(v["slides"][1]["content_points"][1], "42");
    }

    #[tokio::test]
    async fn malformed_response_yields_default() {
        let v = run(Some("I cannot help with that.")).await;
        assert_eq!(v["title"], DEFAULT_OUTLINE_TITLE);
        assert_eq!(v["total_pages"], 1);
    }

    #[tokio::test]
    async fn slideless_response_yields_default() {
        for reply in ["{}", r#"{"title": "Deck", "slides": []}"#, r#"{"slides": [1, "x"]}"#] {
            let v = run(Some(reply)).await;
            assert_eq!(v, default_outline_value(), "reply {reply:?}");
        }
    }

    #[tokio::test]
    async fn exhausted_llm_yields_default() {
        let v = run(None).await;
        assert_eq!(v["title"], DEFAULT_OUTLINE_TITLE);
        assert_eq!(v["slides"][0]["slide_type"], "title");
    }
}
