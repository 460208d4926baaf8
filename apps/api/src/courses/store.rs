//! Persistence for courses, modules, lessons, and per-user progress.
//!
//! The skeleton insert is one transaction; every enrichment write is a single
//! UPDATE keyed by lesson id, so concurrent tasks never touch the same row.

use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::courses::enricher::EnrichedLesson;
use crate::courses::outline::{CourseOutline, OutlineRequest};
use crate::models::course::{
    CourseRow, CourseTree, GenerationStatus, LessonRow, ModuleRow, ModuleTree, ProgressRow,
};

/// Inserts the course skeleton: the course row in `generating` status, then
/// all modules and lessons with `position` values taken from outline order.
///
/// One transaction, no internal retry — a failure rolls everything back and
/// propagates, so the caller observes a clean creation failure rather than a
/// stuck course.
pub async fn persist_skeleton(
    pool: &PgPool,
    user_id: Uuid,
    request: &OutlineRequest,
    outline: &CourseOutline,
) -> Result<Uuid, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let course_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO courses
            (id, user_id, topic, level, duration, goal, title, description,
             outcomes, capstone_project, generation_status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(course_id)
    .bind(user_id)
    .bind(&request.topic)
    .bind(request.level.as_str())
    .bind(&request.duration)
    .bind(&request.goal)
    .bind(&outline.title)
    .bind(&outline.description)
    .bind(&outline.outcomes)
    .bind(&outline.capstone_project)
    .bind(GenerationStatus::Generating.as_str())
    .execute(&mut *tx)
    .await?;

    for (module_index, module) in outline.modules.iter().enumerate() {
        let module_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO modules (id, course_id, title, position)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(module_id)
        .bind(course_id)
        .bind(&module.title)
        .bind(module_index as i32 + 1)
        .execute(&mut *tx)
        .await?;

        for (lesson_index, lesson) in module.lessons.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO lessons (id, module_id, title, focus, position)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(module_id)
            .bind(&lesson.title)
            .bind(&lesson.focus)
            .bind(lesson_index as i32 + 1)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(course_id)
}

pub async fn get_course(pool: &PgPool, course_id: Uuid) -> Result<Option<CourseRow>, sqlx::Error> {
    sqlx::query_as::<_, CourseRow>("SELECT * FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(pool)
        .await
}

/// Loads a course with its modules and lessons, ordered by `position` at
/// each level.
pub async fn get_course_with_tree(
    pool: &PgPool,
    course_id: Uuid,
) -> Result<Option<CourseTree>, sqlx::Error> {
    let Some(course) = get_course(pool, course_id).await? else {
        return Ok(None);
    };

    let modules = sqlx::query_as::<_, ModuleRow>(
        "SELECT * FROM modules WHERE course_id = $1 ORDER BY position",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    let module_ids: Vec<Uuid> = modules.iter().map(|m| m.id).collect();
    let lessons = sqlx::query_as::<_, LessonRow>(
        "SELECT * FROM lessons WHERE module_id = ANY($1) ORDER BY position",
    )
    .bind(&module_ids)
    .fetch_all(pool)
    .await?;

    Ok(Some(assemble_tree(course, modules, lessons)))
}

/// Groups flat module and lesson rows into the nested tree, preserving the
/// fetch order within each module.
fn assemble_tree(course: CourseRow, modules: Vec<ModuleRow>, lessons: Vec<LessonRow>) -> CourseTree {
    let mut tree_modules: Vec<ModuleTree> = modules
        .into_iter()
        .map(|module| ModuleTree {
            module,
            lessons: Vec::new(),
        })
        .collect();

    for lesson in lessons {
        if let Some(entry) = tree_modules
            .iter_mut()
            .find(|m| m.module.id == lesson.module_id)
        {
            entry.lessons.push(lesson);
        }
    }

    CourseTree {
        course,
        modules: tree_modules,
    }
}

/// Writes every enrichment field for one lesson in a single UPDATE. Either
/// the whole bundle lands or the lesson stays in its placeholder state.
pub async fn update_lesson_enrichment(
    pool: &PgPool,
    lesson_id: Uuid,
    enriched: &EnrichedLesson,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE lessons
        SET explanation = $2,
            real_world_example = $3,
            code_example = $4,
            common_mistakes = $5,
            exercise = $6,
            interview_qa = $7,
            quiz = $8,
            video_id = $9,
            video_title = $10,
            video_channel = $11,
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(lesson_id)
    .bind(&enriched.explanation)
    .bind(&enriched.real_world_example)
    .bind(&enriched.code_example)
    .bind(Json(&enriched.common_mistakes))
    .bind(&enriched.exercise)
    .bind(Json(&enriched.interview_qa))
    .bind(Json(&enriched.quiz))
    .bind(enriched.video.as_ref().map(|v| v.video_id.as_str()))
    .bind(enriched.video.as_ref().map(|v| v.title.as_str()))
    .bind(enriched.video.as_ref().map(|v| v.channel_title.as_str()))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn update_course_status(
    pool: &PgPool,
    course_id: Uuid,
    status: GenerationStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE courses SET generation_status = $2, updated_at = now() WHERE id = $1")
        .bind(course_id)
        .bind(status.as_str())
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn lesson_exists(pool: &PgPool, lesson_id: Uuid) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM lessons WHERE id = $1)")
        .bind(lesson_id)
        .fetch_one(pool)
        .await
}

pub async fn get_progress_for_course(
    pool: &PgPool,
    user_id: Uuid,
    lesson_ids: &[Uuid],
) -> Result<Vec<ProgressRow>, sqlx::Error> {
    sqlx::query_as::<_, ProgressRow>(
        "SELECT * FROM lesson_progress WHERE user_id = $1 AND lesson_id = ANY($2)",
    )
    .bind(user_id)
    .bind(lesson_ids)
    .fetch_all(pool)
    .await
}

/// Upserts one user's progress for one lesson. End-user interaction only —
/// the generation pipeline never writes progress.
pub async fn upsert_progress(
    pool: &PgPool,
    user_id: Uuid,
    lesson_id: Uuid,
    completed: bool,
    quiz_score: Option<i32>,
) -> Result<ProgressRow, sqlx::Error> {
    sqlx::query_as::<_, ProgressRow>(
        r#"
        INSERT INTO lesson_progress (user_id, lesson_id, completed, quiz_score)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, lesson_id)
        DO UPDATE SET completed = $3, quiz_score = $4, updated_at = now()
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(lesson_id)
    .bind(completed)
    .bind(quiz_score)
    .fetch_one(pool)
    .await
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn course_row() -> CourseRow {
        CourseRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            topic: "Distributed Systems with Go".to_string(),
            level: "advanced".to_string(),
            duration: "4 Weeks".to_string(),
            goal: "Mastery".to_string(),
            title: "Distributed Systems with Go".to_string(),
            description: "Consensus and replication.".to_string(),
            outcomes: vec!["Build a replicated log".to_string()],
            capstone_project: "Fault-tolerant KV store".to_string(),
            generation_status: "generating".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn module_row(course_id: Uuid, position: i32) -> ModuleRow {
        ModuleRow {
            id: Uuid::new_v4(),
            course_id,
            title: format!("Module {position}"),
            position,
            created_at: Utc::now(),
        }
    }

    fn lesson_row(module_id: Uuid, position: i32) -> LessonRow {
        LessonRow {
            id: Uuid::new_v4(),
            module_id,
            title: format!("Lesson {position}"),
            focus: "focus".to_string(),
            position,
            explanation: None,
            real_world_example: None,
            code_example: None,
            common_mistakes: None,
            exercise: None,
            interview_qa: None,
            quiz: None,
            video_id: None,
            video_title: None,
            video_channel: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_assemble_tree_groups_lessons_under_their_module() {
        let course = course_row();
        let module_a = module_row(course.id, 1);
        let module_b = module_row(course.id, 2);

        let lessons = vec![
            lesson_row(module_a.id, 1),
            lesson_row(module_b.id, 1),
            lesson_row(module_a.id, 2),
            lesson_row(module_b.id, 2),
        ];

        let tree = assemble_tree(course, vec![module_a.clone(), module_b.clone()], lessons);

        assert_eq!(tree.modules.len(), 2);
        assert_eq!(tree.modules[0].module.id, module_a.id);
        assert_eq!(tree.modules[0].lessons.len(), 2);
        assert_eq!(tree.modules[1].lessons.len(), 2);
        // Fetch order (position) is preserved within each module.
        assert_eq!(tree.modules[0].lessons[0].position, 1);
        assert_eq!(tree.modules[0].lessons[1].position, 2);
    }

    #[test]
    fn test_assemble_tree_with_no_lessons() {
        let course = course_row();
        let module = module_row(course.id, 1);
        let tree = assemble_tree(course, vec![module], vec![]);
        assert_eq!(tree.modules.len(), 1);
        assert!(tree.modules[0].lessons.is_empty());
    }
}
