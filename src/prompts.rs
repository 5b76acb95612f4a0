//! Prompts for the three outline stages.
//!
//! Every prompt lives here so that wording changes touch exactly one file and
//! unit tests can inspect the text without a live model. Each stage has a
//! fixed system prompt and a builder for the user turn.
//!
//! All stages ask for bare JSON. The response parser tolerates fences and
//! prefaces anyway, but asking for bare JSON keeps the repair ladder short.

use crate::config::{PageCountMode, ProcessingConfig, ProjectContext};
use serde_json::Value;
use std::fmt::Write;

/// System prompt for the structure analysis step.
pub const STRUCTURE_SYSTEM_PROMPT: &str = r#"You are a document analyst. You read the opening of a document and describe its structure.

Respond with a single JSON object and nothing else:
{
  "title": "document title",
  "type": "report | paper | manual | proposal | article | other",
  "sections": ["main section headings in order"],
  "key_concepts": ["the most important concepts"],
  "language": "language code of the document",
  "complexity": "low | medium | high"
}

Do NOT wrap the JSON in code fences. Do NOT add commentary."#;

/// System prompt shared by outline creation and refinement.
pub const OUTLINE_SYSTEM_PROMPT: &str = r#"You are an expert presentation designer. You turn documents into slide outlines.

Rules:
1. Output ONLY a JSON object with this shape:
   {
     "title": "presentation title",
     "total_pages": <number of slides>,
     "page_count_mode": "estimated",
     "slides": [
       {
         "page_number": 1,
         "title": "slide title",
         "content_points": ["point", "point"],
         "slide_type": "title | content | conclusion",
         "description": "what this slide conveys"
       }
     ]
   }
2. page_number starts at 1 and increases by one per slide.
3. The first slide is a "title" slide; the last one is usually a "conclusion" slide.
4. Keep content points short: one idea each, no full paragraphs.
5. A slide may carry an optional "chart_config" object when the data calls for a chart.
6. Do NOT wrap the JSON in code fences. Do NOT add commentary."#;

/// Constraint sentence for the requested slide count.
///
/// `AiDecide` is bounded by the config's `min_slides..=max_slides`.
pub fn page_count_constraint(mode: &PageCountMode, config: &ProcessingConfig) -> String {
    match *mode {
        PageCountMode::Fixed { pages } => {
            format!("The outline must contain exactly {pages} slides.")
        }
        PageCountMode::CustomRange { min, max } => {
            format!("The outline must contain between {min} and {max} slides (inclusive).")
        }
        PageCountMode::AiDecide => format!(
            "Choose the number of slides that best fits the content, between {} and {} slides.",
            config.min_slides, config.max_slides
        ),
    }
}

/// User turn for the structure analysis step.
pub fn structure_prompt(first_chunk: &str, project: &ProjectContext, language: &str) -> String {
    let mut prompt = String::new();
    push_project(&mut prompt, project);
    let _ = writeln!(prompt, "Answer in language: {language}");
    let _ = write!(
        prompt,
        "\nAnalyse the structure of this document opening:\n---\n{first_chunk}\n---"
    );
    prompt
}

/// User turn for the first outline, built from the structure record and the
/// first chunk.
pub fn initial_outline_prompt(
    structure: &Value,
    first_chunk: &str,
    constraint: &str,
    project: &ProjectContext,
    language: &str,
) -> String {
    let mut prompt = String::new();
    push_project(&mut prompt, project);
    let _ = writeln!(prompt, "Write the outline in language: {language}");
    let _ = writeln!(prompt, "Slide count: {constraint}");
    let _ = writeln!(prompt, "\nDocument structure:\n{}", pretty(structure));
    let _ = write!(
        prompt,
        "\nCreate the first outline from this opening section. Later sections \
will be provided one at a time, so cover what is here and leave room for the rest.\n---\n{first_chunk}\n---"
    );
    prompt
}

/// Inputs for one refine prompt.
#[derive(Debug, Clone, Copy)]
pub struct RefinePromptInput<'a> {
    pub outline: &'a Value,
    pub chunk: &'a str,
    pub chunk_number: usize,
    pub total_chunks: usize,
    pub context: &'a str,
    pub constraint: &'a str,
    pub project: &'a ProjectContext,
    pub language: &'a str,
}

/// User turn for folding one more chunk into the running outline.
pub fn refine_prompt(input: &RefinePromptInput<'_>) -> String {
    let mut prompt = String::new();
    push_project(&mut prompt, input.project);
    let _ = writeln!(prompt, "Write the outline in language: {}", input.language);
    let _ = writeln!(prompt, "Slide count: {}", input.constraint);
    let _ = writeln!(prompt, "\nCurrent outline:\n{}", pretty(input.outline));
    if !input.context.is_empty() {
        let _ = writeln!(
            prompt,
            "\nContext from earlier sections:\n---\n{}\n---",
            input.context
        );
    }
    let _ = write!(
        prompt,
        "\nThis is section {} of {}. Integrate it into the outline: add, merge or \
reorder slides as needed, and return the COMPLETE updated outline.\n---\n{}\n---",
        input.chunk_number, input.total_chunks, input.chunk
    );
    prompt
}

fn push_project(prompt: &mut String, project: &ProjectContext) {
    let fields = [
        ("Topic", project.topic.as_str()),
        ("Scenario", project.scenario.as_str()),
        ("Target audience", project.target_audience.as_str()),
        ("Style", project.ppt_style.as_str()),
        ("Requirements", project.requirements.as_str()),
        (
            "Style instructions",
            project.custom_style_prompt.as_deref().unwrap_or(""),
        ),
    ];
    for (label, value) in fields {
        let value = value.trim();
        if !value.is_empty() {
            let _ = writeln!(prompt, "{label}: {value}");
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constraint_text_per_mode() {
        let config = ProcessingConfig::builder().slides(4, 12).build().unwrap();
        assert!(page_count_constraint(&PageCountMode::Fixed { pages: 8 }, &config)
            .contains("exactly 8 slides"));
        assert!(
            page_count_constraint(&PageCountMode::CustomRange { min: 5, max: 7 }, &config)
                .contains("between 5 and 7")
        );
        assert!(page_count_constraint(&PageCountMode::AiDecide, &config).contains("between 4 and 12"));
    }

    #[test]
    fn empty_project_fields_are_omitted() {
        let project = ProjectContext::new("Edge AI").with_audience("  ");
        let prompt = structure_prompt("chunk text", &project, "en");
        assert!(prompt.contains("Topic: Edge AI"));
        assert!(!prompt.contains("Target audience"));
        assert!(prompt.contains("chunk text"));
    }

    #[test]
    fn refine_prompt_carries_outline_chunk_and_context() {
        let outline = json!({"title": "Deck", "slides": []});
        let project = ProjectContext::default();
        let input = RefinePromptInput {
            outline: &outline,
            chunk: "second section body",
            chunk_number: 2,
            total_chunks: 3,
            context: "tail of the first section",
            constraint: "The outline must contain exactly 6 slides.",
            project: &project,
            language: "zh-CN",
        };
        let prompt = refine_prompt(&input);
        assert!(prompt.contains("\"title\": \"Deck\""));
        assert!(prompt.contains("section 2 of 3"));
        assert!(prompt.contains("tail of the first section"));
        assert!(prompt.contains("exactly 6 slides"));
    }

    #[test]
    fn refine_prompt_skips_empty_context() {
        let outline = json!({});
        let project = ProjectContext::default();
        let input = RefinePromptInput {
            outline: &outline,
            chunk: "body",
            chunk_number: 2,
            total_chunks: 2,
            context: "",
            constraint: "",
            project: &project,
            language: "en",
        };
        assert!(!refine_prompt(&input).contains("earlier sections"));
    }

    #[test]
    fn system_prompts_demand_bare_json() {
        assert!(STRUCTURE_SYSTEM_PROMPT.contains("key_concepts"));
        assert!(OUTLINE_SYSTEM_PROMPT.contains("content_points"));
        assert!(OUTLINE_SYSTEM_PROMPT.contains("code fences"));
    }
}
