//! Axum route handlers for the Course API.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::courses::outline::{synthesize_outline, OutlineError, OutlineRequest, SkillLevel};
use crate::courses::pipeline::{run_enrichment, spawn_enrichment};
use crate::courses::store;
use crate::errors::AppError;
use crate::llm_client::LlmError;
use crate::models::course::{CourseRow, GenerationStatus, LessonRow, ModuleRow, ProgressRow};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub user_id: Uuid,
    pub topic: String,
    pub level: String,
    pub duration: String,
    pub goal: String,
}

#[derive(Debug, Serialize)]
pub struct CreateCourseResponse {
    pub course_id: Uuid,
    pub generation_status: String,
}

#[derive(Debug, Serialize)]
pub struct EnrichResponse {
    pub course_id: Uuid,
    pub generation_status: String,
}

#[derive(Debug, Deserialize)]
pub struct CourseDetailsQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CourseDetailsResponse {
    pub course: CourseRow,
    pub modules: Vec<ModuleDetail>,
}

#[derive(Debug, Serialize)]
pub struct ModuleDetail {
    #[serde(flatten)]
    pub module: ModuleRow,
    pub lessons: Vec<LessonDetail>,
}

#[derive(Debug, Serialize)]
pub struct LessonDetail {
    #[serde(flatten)]
    pub lesson: LessonRow,
    pub enriched: bool,
    pub progress: Option<LessonProgress>,
}

#[derive(Debug, Serialize)]
pub struct LessonProgress {
    pub completed: bool,
    pub quiz_score: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct RecordProgressRequest {
    pub user_id: Uuid,
    pub completed: bool,
    pub quiz_score: Option<i32>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/courses
///
/// Fast path: synthesize and persist the skeleton, spawn background
/// enrichment, and return the course id before any lesson is enriched.
pub async fn handle_create_course(
    State(state): State<AppState>,
    Json(request): Json<CreateCourseRequest>,
) -> Result<Json<CreateCourseResponse>, AppError> {
    if request.topic.trim().is_empty() {
        return Err(AppError::Validation("topic cannot be empty".to_string()));
    }
    if request.duration.trim().is_empty() {
        return Err(AppError::Validation("duration cannot be empty".to_string()));
    }
    if request.goal.trim().is_empty() {
        return Err(AppError::Validation("goal cannot be empty".to_string()));
    }
    let level = SkillLevel::parse(&request.level).ok_or_else(|| {
        AppError::Validation(format!(
            "unknown level '{}' (expected beginner, intermediate, or advanced)",
            request.level
        ))
    })?;

    let outline_request = OutlineRequest {
        topic: request.topic,
        level,
        duration: request.duration,
        goal: request.goal,
    };

    let outline = synthesize_outline(&state.llm, &outline_request)
        .await
        .map_err(map_outline_error)?;

    let course_id = store::persist_skeleton(&state.db, request.user_id, &outline_request, &outline)
        .await?;

    info!(
        course_id = %course_id,
        user_id = %request.user_id,
        modules = outline.modules.len(),
        "course skeleton persisted, spawning enrichment"
    );
    spawn_enrichment(state.clone(), course_id);

    Ok(Json(CreateCourseResponse {
        course_id,
        generation_status: GenerationStatus::Generating.as_str().to_string(),
    }))
}

/// Maps outline synthesis failures onto the HTTP taxonomy: malformed or
/// schema-violating model output is a terminal 422; provider failures are
/// surfaced as LLM errors.
fn map_outline_error(e: OutlineError) -> AppError {
    match e {
        OutlineError::Invalid(msg) => {
            AppError::UnprocessableEntity(format!("invalid outline: {msg}"))
        }
        OutlineError::Llm(LlmError::Parse(parse)) => {
            AppError::UnprocessableEntity(format!("outline was not valid JSON: {parse}"))
        }
        OutlineError::Llm(other) => AppError::Llm(format!("outline synthesis failed: {other}")),
    }
}

/// POST /api/v1/courses/:id/enrich
///
/// Re-runs the enrichment phase to settlement. A no-op when the course has
/// already settled — the status controller guards terminal states.
pub async fn handle_start_enrichment(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<EnrichResponse>, AppError> {
    let course = store::get_course(&state.db, course_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Course {course_id} not found")))?;

    if !course.status().is_terminal() {
        run_enrichment(state.clone(), course_id)
            .await
            .map_err(AppError::Internal)?;
    }

    let course = store::get_course(&state.db, course_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Course {course_id} not found")))?;

    Ok(Json(EnrichResponse {
        course_id,
        generation_status: course.generation_status,
    }))
}

/// GET /api/v1/courses/:id
///
/// Returns the full course tree ordered by position, with per-user progress
/// merged in when `user_id` is supplied.
pub async fn handle_get_course(
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    Query(query): Query<CourseDetailsQuery>,
) -> Result<Json<CourseDetailsResponse>, AppError> {
    let tree = store::get_course_with_tree(&state.db, course_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Course {course_id} not found")))?;

    let lesson_ids: Vec<Uuid> = tree
        .modules
        .iter()
        .flat_map(|m| m.lessons.iter().map(|l| l.id))
        .collect();

    let progress_by_lesson: HashMap<Uuid, ProgressRow> = match query.user_id {
        Some(user_id) => store::get_progress_for_course(&state.db, user_id, &lesson_ids)
            .await?
            .into_iter()
            .map(|p| (p.lesson_id, p))
            .collect(),
        None => HashMap::new(),
    };

    let modules = tree
        .modules
        .into_iter()
        .map(|module_tree| ModuleDetail {
            module: module_tree.module,
            lessons: module_tree
                .lessons
                .into_iter()
                .map(|lesson| {
                    let progress = progress_by_lesson.get(&lesson.id).map(|p| LessonProgress {
                        completed: p.completed,
                        quiz_score: p.quiz_score,
                    });
                    LessonDetail {
                        enriched: lesson.is_enriched(),
                        progress,
                        lesson,
                    }
                })
                .collect(),
        })
        .collect();

    Ok(Json(CourseDetailsResponse {
        course: tree.course,
        modules,
    }))
}

/// PUT /api/v1/lessons/:id/progress
///
/// Upserts one user's completion flag and quiz score for a lesson.
pub async fn handle_record_progress(
    State(state): State<AppState>,
    Path(lesson_id): Path<Uuid>,
    Json(request): Json<RecordProgressRequest>,
) -> Result<Json<ProgressRow>, AppError> {
    if !store::lesson_exists(&state.db, lesson_id).await? {
        return Err(AppError::NotFound(format!("Lesson {lesson_id} not found")));
    }

    let progress = store::upsert_progress(
        &state.db,
        request.user_id,
        lesson_id,
        request.completed,
        request.quiz_score,
    )
    .await?;

    Ok(Json(progress))
}
