//! Output types: the outline handed to the rendering layer plus run stats.

use crate::error::SkipReason;
use serde::{Deserialize, Serialize};

/// Lifecycle tag set by the bootstrapper: the page count is a first guess.
pub const MODE_ESTIMATED: &str = "estimated";

/// Lifecycle tag stamped at `End` under [`crate::config::TerminalTagging::MarkFinal`].
pub const MODE_FINAL: &str = "final";

/// Title used whenever the model gave us nothing usable.
pub const DEFAULT_OUTLINE_TITLE: &str = "PPT大纲";

/// Role of a slide inside the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlideType {
    Title,
    #[default]
    Content,
    Conclusion,
}

impl SlideType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Content => "content",
            Self::Conclusion => "conclusion",
        }
    }

    /// Map a model-supplied tag onto the enum; anything unknown is `Content`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "title" => Self::Title,
            "conclusion" => Self::Conclusion,
            _ => Self::Content,
        }
    }
}

/// One slide of the outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideInfo {
    /// 1-indexed position, unique within the outline.
    pub page_number: usize,
    pub title: String,
    #[serde(default)]
    pub content_points: Vec<String>,
    #[serde(default)]
    pub slide_type: SlideType,
    #[serde(default)]
    pub description: String,
    /// Opaque chart description passed through to the renderer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_config: Option<serde_json::Value>,
}

/// The structured presentation outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PptOutline {
    pub title: String,
    /// Always equal to `slides.len()` once validated.
    pub total_pages: usize,
    /// `ai_decide` / `fixed` / `custom_range`, or a lifecycle tag
    /// (`estimated`, `final`).
    pub page_count_mode: String,
    pub slides: Vec<SlideInfo>,
}

impl PptOutline {
    /// Serialize to the JSON value the prompts embed.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Statistics about one generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Number of chunks the document was split into.
    pub chunks: usize,
    /// Workflow transitions executed (excluding the completion signal).
    pub steps: usize,
    /// Refine steps whose response replaced the outline.
    pub refined_chunks: usize,
    /// Refine steps that left the outline untouched.
    pub skipped_chunks: usize,
    /// Wall-clock duration of the whole run.
    pub duration_ms: u64,
}

/// Complete result of a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub outline: PptOutline,
    /// Structure record produced by the analysis step.
    pub document_structure: serde_json::Value,
    pub stats: GenerationStats,
    /// Why individual chunks were skipped, in chunk order.
    pub skipped: Vec<SkipReason>,
}
