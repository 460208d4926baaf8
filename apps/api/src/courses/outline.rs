//! Outline Synthesizer — one LLM call turns (topic, level, duration, goal)
//! into a validated curriculum skeleton. A parse or schema failure is
//! terminal; no partial outline is ever accepted or persisted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::courses::prompts::{OUTLINE_PROMPT_TEMPLATE, OUTLINE_SYSTEM};
use crate::llm_client::{ChatMessage, CompletionOptions, LlmClient, LlmError};

/// Upper bound on modules accepted from the model.
pub const MAX_MODULES: usize = 8;
/// Accepted lessons-per-module range.
pub const MIN_LESSONS_PER_MODULE: usize = 4;
pub const MAX_LESSONS_PER_MODULE: usize = 5;

#[derive(Debug, Error)]
pub enum OutlineError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("{0}")]
    Invalid(String),
}

/// Requested difficulty tier. Drives the explanation length minimum during
/// enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl SkillLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Some(SkillLevel::Beginner),
            "intermediate" => Some(SkillLevel::Intermediate),
            "advanced" | "expert" => Some(SkillLevel::Advanced),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SkillLevel::Beginner => "beginner",
            SkillLevel::Intermediate => "intermediate",
            SkillLevel::Advanced => "advanced",
        }
    }

    /// Minimum acceptable word count for a lesson's deep explanation.
    pub fn min_explanation_words(&self) -> usize {
        match self {
            SkillLevel::Beginner | SkillLevel::Intermediate => 400,
            SkillLevel::Advanced => 800,
        }
    }
}

/// Inputs to outline synthesis, validated at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct OutlineRequest {
    pub topic: String,
    pub level: SkillLevel,
    pub duration: String,
    pub goal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonOutline {
    pub title: String,
    pub focus: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleOutline {
    pub title: String,
    pub lessons: Vec<LessonOutline>,
}

/// Full structured outline returned by the model. The order of `modules` and
/// `lessons` is exactly the model's order and becomes the persisted teaching
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseOutline {
    pub title: String,
    pub description: String,
    pub outcomes: Vec<String>,
    pub capstone_project: String,
    pub modules: Vec<ModuleOutline>,
}

/// Synthesizes a validated course outline with exactly one LLM call.
pub async fn synthesize_outline(
    llm: &LlmClient,
    request: &OutlineRequest,
) -> Result<CourseOutline, OutlineError> {
    let prompt = OUTLINE_PROMPT_TEMPLATE
        .replace("{topic}", &request.topic)
        .replace("{level}", request.level.as_str())
        .replace("{duration}", &request.duration)
        .replace("{goal}", &request.goal)
        .replace("{max_modules}", &MAX_MODULES.to_string());

    let messages = [ChatMessage::system(OUTLINE_SYSTEM), ChatMessage::user(prompt)];
    let opts = CompletionOptions {
        json_mode: true,
        ..Default::default()
    };

    let outline: CourseOutline = llm.complete_json(&messages, &opts).await?;
    validate_outline(&outline)?;
    Ok(outline)
}

/// Rejects any outline that does not meet the structural contract.
pub fn validate_outline(outline: &CourseOutline) -> Result<(), OutlineError> {
    if outline.title.trim().is_empty() {
        return Err(invalid("course title is empty"));
    }
    if outline.description.trim().is_empty() {
        return Err(invalid("course description is empty"));
    }
    if outline.capstone_project.trim().is_empty() {
        return Err(invalid("capstone project is empty"));
    }
    if outline.outcomes.is_empty() || outline.outcomes.iter().any(|o| o.trim().is_empty()) {
        return Err(invalid("outcomes must be a non-empty list of non-blank entries"));
    }
    if outline.modules.is_empty() {
        return Err(invalid("outline has no modules"));
    }
    if outline.modules.len() > MAX_MODULES {
        return Err(invalid(&format!(
            "{} modules exceeds the maximum of {MAX_MODULES}",
            outline.modules.len()
        )));
    }

    for (index, module) in outline.modules.iter().enumerate() {
        let position = index + 1;
        if module.title.trim().is_empty() {
            return Err(invalid(&format!("module {position} has an empty title")));
        }
        let lesson_count = module.lessons.len();
        if !(MIN_LESSONS_PER_MODULE..=MAX_LESSONS_PER_MODULE).contains(&lesson_count) {
            return Err(invalid(&format!(
                "module {position} has {lesson_count} lessons (expected {MIN_LESSONS_PER_MODULE}-{MAX_LESSONS_PER_MODULE})"
            )));
        }
        for (lesson_index, lesson) in module.lessons.iter().enumerate() {
            if lesson.title.trim().is_empty() || lesson.focus.trim().is_empty() {
                return Err(invalid(&format!(
                    "module {position}, lesson {} is missing a title or focus",
                    lesson_index + 1
                )));
            }
        }
    }

    Ok(())
}

fn invalid(message: &str) -> OutlineError {
    OutlineError::Invalid(message.to_string())
}
