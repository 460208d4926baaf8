//! Pipeline Status Controller — drives a course's background enrichment and
//! owns its generation-status transitions.
//!
//! `generating` is set at skeleton-persist time. The course ends `completed`
//! once every lesson task has settled — success or caught failure — and
//! `failed` only when something outside the per-lesson isolation breaks
//! (loading the tree, the final status write).

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::courses::enricher::{enrich_lesson, LessonContext};
use crate::courses::executor::run_all;
use crate::courses::outline::SkillLevel;
use crate::courses::store;
use crate::models::course::GenerationStatus;
use crate::state::AppState;

/// Hard cap on lesson enrichment tasks in flight per pipeline run.
pub const ENRICHMENT_CONCURRENCY: usize = 5;

/// Runs the enrichment phase for a course to settlement. No-op when the
/// course has already reached a terminal status.
pub async fn run_enrichment(state: AppState, course_id: Uuid) -> Result<()> {
    match enrichment_phase(&state, course_id).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(course_id = %course_id, error = ?e, "enrichment phase failed");
            if let Err(status_err) =
                store::update_course_status(&state.db, course_id, GenerationStatus::Failed).await
            {
                error!(
                    course_id = %course_id,
                    error = %status_err,
                    "failed to mark course as failed"
                );
            }
            Err(e)
        }
    }
}

/// Detaches enrichment onto a background task so the creation response
/// returns before any lesson work starts.
pub fn spawn_enrichment(state: AppState, course_id: Uuid) {
    tokio::spawn(async move {
        // Failures are already logged and recorded in the course status.
        let _ = run_enrichment(state, course_id).await;
    });
}

async fn enrichment_phase(state: &AppState, course_id: Uuid) -> Result<()> {
    let tree = store::get_course_with_tree(&state.db, course_id)
        .await
        .context("failed to load course tree before enrichment")?;
    let Some(tree) = tree else {
        bail!("course {course_id} not found");
    };

    let status = tree.course.status();
    if status.is_terminal() {
        info!(
            course_id = %course_id,
            status = %status,
            "course already settled, skipping enrichment"
        );
        return Ok(());
    }

    let level = SkillLevel::parse(&tree.course.level).unwrap_or(SkillLevel::Beginner);

    let mut contexts = Vec::new();
    for module_tree in &tree.modules {
        for lesson in &module_tree.lessons {
            contexts.push(LessonContext {
                lesson_id: lesson.id,
                lesson_title: lesson.title.clone(),
                focus: lesson.focus.clone(),
                course_title: tree.course.title.clone(),
                module_title: module_tree.module.title.clone(),
                level,
            });
        }
    }

    let total = contexts.len();
    info!(
        course_id = %course_id,
        lessons = total,
        limit = ENRICHMENT_CONCURRENCY,
        "starting lesson enrichment"
    );

    let lesson_ids: Vec<Uuid> = contexts.iter().map(|c| c.lesson_id).collect();
    let tasks: Vec<_> = contexts
        .into_iter()
        .map(|ctx| {
            enrich_lesson(
                state.db.clone(),
                state.llm.clone(),
                Arc::clone(&state.video_search),
                ctx,
            )
        })
        .collect();

    let results = run_all(tasks, ENRICHMENT_CONCURRENCY).await;

    let mut failed = 0usize;
    for (lesson_id, result) in lesson_ids.iter().zip(&results) {
        if let Err(e) = result {
            failed += 1;
            warn!(
                course_id = %course_id,
                lesson_id = %lesson_id,
                error = ?e,
                "lesson enrichment failed, lesson stays unenriched"
            );
        }
    }

    // Settled is settled: the course completes even when individual lessons
    // failed. Callers observe per-lesson population state on the tree.
    store::update_course_status(&state.db, course_id, GenerationStatus::Completed)
        .await
        .context("failed to mark course as completed")?;

    info!(
        course_id = %course_id,
        enriched = total - failed,
        failed,
        "enrichment settled"
    );
    Ok(())
}
