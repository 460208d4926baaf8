use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a course's background generation phase.
///
/// `completed` and `failed` are terminal — the status never moves backward,
/// and the pipeline never re-enters a terminal course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Generating => "generating",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(GenerationStatus::Pending),
            "generating" => Some(GenerationStatus::Generating),
            "completed" => Some(GenerationStatus::Completed),
            "failed" => Some(GenerationStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }
}

impl std::fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CourseRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub topic: String,
    pub level: String,
    pub duration: String,
    pub goal: String,
    pub title: String,
    pub description: String,
    pub outcomes: Vec<String>,
    pub capstone_project: String,
    pub generation_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CourseRow {
    /// The stored status string as a typed value. Unknown strings read as
    /// `pending` rather than poisoning the row.
    pub fn status(&self) -> GenerationStatus {
        GenerationStatus::parse(&self.generation_status).unwrap_or(GenerationStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModuleRow {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    /// 1-based teaching order, unique within the course.
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LessonRow {
    pub id: Uuid,
    pub module_id: Uuid,
    pub title: String,
    /// Skeleton placeholder — the working note the outline produced.
    pub focus: String,
    /// 1-based teaching order, unique within the module.
    pub position: i32,
    pub explanation: Option<String>,
    pub real_world_example: Option<String>,
    pub code_example: Option<String>,
    pub common_mistakes: Option<Value>,
    pub exercise: Option<String>,
    pub interview_qa: Option<Value>,
    pub quiz: Option<Value>,
    pub video_id: Option<String>,
    pub video_title: Option<String>,
    pub video_channel: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LessonRow {
    /// The content fields are written together by a single update, so the
    /// explanation being present means the whole bundle is.
    pub fn is_enriched(&self) -> bool {
        self.explanation.is_some()
    }
}

/// Per-user lesson progress, keyed (user_id, lesson_id). Written only by
/// end-user interaction, never by the generation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProgressRow {
    pub user_id: Uuid,
    pub lesson_id: Uuid,
    pub completed: bool,
    pub quiz_score: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// A course with its ordered modules and lessons, as loaded by the store.
#[derive(Debug, Clone, Serialize)]
pub struct CourseTree {
    pub course: CourseRow,
    pub modules: Vec<ModuleTree>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleTree {
    pub module: ModuleRow,
    pub lessons: Vec<LessonRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in [
            GenerationStatus::Pending,
            GenerationStatus::Generating,
            GenerationStatus::Completed,
            GenerationStatus::Failed,
        ] {
            assert_eq!(GenerationStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_status_parse_rejects_unknown() {
        assert_eq!(GenerationStatus::parse("archived"), None);
    }

    #[test]
    fn test_only_completed_and_failed_are_terminal() {
        assert!(!GenerationStatus::Pending.is_terminal());
        assert!(!GenerationStatus::Generating.is_terminal());
        assert!(GenerationStatus::Completed.is_terminal());
        assert!(GenerationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serde_uses_lowercase() {
        let json = serde_json::to_string(&GenerationStatus::Generating).unwrap();
        assert_eq!(json, "\"generating\"");
    }
}
