//! Lesson Enricher — the task body the executor runs once per lesson.
//!
//! Steps run in sequence for one lesson: deep explanation (length-enforced,
//! one retry) → quiz (degrades to an empty list) → video search + rank
//! (falls back to the first candidate, then to no video) → one persisting
//! UPDATE. Any error that escapes is caught at the task boundary by the
//! executor; siblings never see it.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::courses::outline::SkillLevel;
use crate::courses::prompts::{
    LESSON_PROMPT_TEMPLATE, LESSON_SYSTEM, QUIZ_PROMPT_TEMPLATE, QUIZ_SYSTEM,
    VIDEO_RANK_PROMPT_TEMPLATE, VIDEO_RANK_SYSTEM,
};
use crate::courses::store;
use crate::llm_client::{ChatMessage, CompletionOptions, LlmClient, LlmError};
use crate::video_search::{VideoCandidate, VideoSearch};

/// Content bundle produced by the deep-explanation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonDraft {
    pub explanation: String,
    pub real_world_example: String,
    pub code_example: String,
    pub common_mistakes: Vec<String>,
    pub exercise: String,
    pub interview_qa: Vec<InterviewQa>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewQa {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: u8,
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
struct RankedVideo {
    video_id: String,
}

/// Everything written back to a lesson row in one update.
#[derive(Debug, Clone)]
pub struct EnrichedLesson {
    pub explanation: String,
    pub real_world_example: String,
    pub code_example: String,
    pub common_mistakes: Vec<String>,
    pub exercise: String,
    pub interview_qa: Vec<InterviewQa>,
    pub quiz: Vec<QuizQuestion>,
    pub video: Option<VideoCandidate>,
}

/// Per-lesson context handed to one executor task.
#[derive(Debug, Clone)]
pub struct LessonContext {
    pub lesson_id: Uuid,
    pub lesson_title: String,
    pub focus: String,
    pub course_title: String,
    pub module_title: String,
    pub level: SkillLevel,
}

/// Enriches a single lesson end to end and persists the result.
pub async fn enrich_lesson(
    pool: PgPool,
    llm: LlmClient,
    video_search: Arc<dyn VideoSearch>,
    ctx: LessonContext,
) -> Result<()> {
    let draft = generate_draft(&llm, &ctx)
        .await
        .with_context(|| format!("deep explanation failed for lesson {}", ctx.lesson_id))?;

    let quiz = generate_quiz(&llm, &ctx, &draft.explanation).await;
    let video = find_video(&llm, video_search.as_ref(), &ctx).await;

    let enriched = EnrichedLesson {
        explanation: draft.explanation,
        real_world_example: draft.real_world_example,
        code_example: draft.code_example,
        common_mistakes: draft.common_mistakes,
        exercise: draft.exercise,
        interview_qa: draft.interview_qa,
        quiz,
        video,
    };

    store::update_lesson_enrichment(&pool, ctx.lesson_id, &enriched)
        .await
        .with_context(|| format!("failed to persist enrichment for lesson {}", ctx.lesson_id))?;

    info!(lesson_id = %ctx.lesson_id, lesson = %ctx.lesson_title, "lesson enriched");
    Ok(())
}

/// One draft call, plus exactly one retry with the same prompt when the
/// explanation misses the level's word minimum. The longer draft wins; there
/// is never a third call.
async fn generate_draft(llm: &LlmClient, ctx: &LessonContext) -> Result<LessonDraft, LlmError> {
    let min_words = ctx.level.min_explanation_words();
    let prompt = LESSON_PROMPT_TEMPLATE
        .replace("{course_title}", &ctx.course_title)
        .replace("{module_title}", &ctx.module_title)
        .replace("{lesson_title}", &ctx.lesson_title)
        .replace("{focus}", &ctx.focus)
        .replace("{level}", ctx.level.as_str())
        .replace("{min_words}", &min_words.to_string());

    let messages = [ChatMessage::system(LESSON_SYSTEM), ChatMessage::user(prompt)];
    let opts = CompletionOptions {
        json_mode: true,
        ..Default::default()
    };

    let first: LessonDraft = llm.complete_json(&messages, &opts).await?;
    let first_words = word_count(&first.explanation);
    if first_words >= min_words {
        return Ok(first);
    }

    warn!(
        lesson = %ctx.lesson_title,
        words = first_words,
        min_words,
        "explanation under minimum, retrying once"
    );

    match llm.complete_json::<LessonDraft>(&messages, &opts).await {
        Ok(second) if word_count(&second.explanation) > first_words => Ok(second),
        Ok(_) => Ok(first),
        Err(e) => {
            // The short draft in hand beats failing the lesson over a retry.
            warn!(lesson = %ctx.lesson_title, error = %e, "retry failed, keeping short draft");
            Ok(first)
        }
    }
}

/// Quiz synthesis from the accepted explanation. Degrades to an empty quiz
/// rather than failing the lesson.
async fn generate_quiz(
    llm: &LlmClient,
    ctx: &LessonContext,
    explanation: &str,
) -> Vec<QuizQuestion> {
    let prompt = QUIZ_PROMPT_TEMPLATE
        .replace("{lesson_title}", &ctx.lesson_title)
        .replace("{explanation}", explanation);

    let messages = [ChatMessage::system(QUIZ_SYSTEM), ChatMessage::user(prompt)];
    // json_object mode rejects top-level arrays; the quiz response is one.
    let opts = CompletionOptions::default();

    match llm.complete_json::<Vec<QuizQuestion>>(&messages, &opts).await {
        Ok(quiz) => quiz,
        Err(e) => {
            warn!(lesson = %ctx.lesson_title, error = %e, "quiz synthesis failed, storing empty quiz");
            Vec::new()
        }
    }
}

/// Searches for a lesson video and asks the model to rank the candidates.
/// Search failure or an empty result means no video; ranking failure falls
/// back to the first search result.
async fn find_video(
    llm: &LlmClient,
    video_search: &dyn VideoSearch,
    ctx: &LessonContext,
) -> Option<VideoCandidate> {
    let candidates = match video_search
        .search(&ctx.lesson_title, &ctx.course_title, ctx.level.as_str())
        .await
    {
        Ok(candidates) => candidates,
        Err(e) => {
            warn!(lesson = %ctx.lesson_title, error = %e, "video search failed, skipping video");
            return None;
        }
    };

    if candidates.is_empty() {
        warn!(lesson = %ctx.lesson_title, "video search returned no candidates");
        return None;
    }

    let ranked_id = rank_video(llm, ctx, &candidates).await;
    pick_ranked_candidate(&candidates, ranked_id.as_deref())
}

async fn rank_video(
    llm: &LlmClient,
    ctx: &LessonContext,
    candidates: &[VideoCandidate],
) -> Option<String> {
    let candidates_json = serde_json::to_string(candidates).ok()?;
    let prompt = VIDEO_RANK_PROMPT_TEMPLATE
        .replace("{lesson_title}", &ctx.lesson_title)
        .replace("{level}", ctx.level.as_str())
        .replace("{candidates_json}", &candidates_json);

    let messages = [
        ChatMessage::system(VIDEO_RANK_SYSTEM),
        ChatMessage::user(prompt),
    ];
    let opts = CompletionOptions {
        json_mode: true,
        ..Default::default()
    };

    match llm.complete_json::<RankedVideo>(&messages, &opts).await {
        Ok(ranked) => Some(ranked.video_id),
        Err(e) => {
            warn!(lesson = %ctx.lesson_title, error = %e, "video ranking failed, using first candidate");
            None
        }
    }
}

/// The ranked id must name a real candidate; anything else falls back to the
/// first search result. `None` only when there are no candidates at all.
fn pick_ranked_candidate(
    candidates: &[VideoCandidate],
    ranked_id: Option<&str>,
) -> Option<VideoCandidate> {
    if let Some(id) = ranked_id {
        if let Some(found) = candidates.iter().find(|c| c.video_id == id) {
            return Some(found.clone());
        }
        warn!(ranked_id = id, "ranked video id not among candidates, using first result");
    }
    candidates.first().cloned()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<VideoCandidate> {
        vec![
            VideoCandidate {
                video_id: "first".to_string(),
                title: "Intro".to_string(),
                channel_title: "A".to_string(),
            },
            VideoCandidate {
                video_id: "second".to_string(),
                title: "Deep Dive".to_string(),
                channel_title: "B".to_string(),
            },
        ]
    }

    #[test]
    fn test_word_count_splits_on_whitespace() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count("one"), 1);
        assert_eq!(word_count("consensus  needs\na quorum"), 4);
    }

    #[test]
    fn test_pick_ranked_candidate_honors_a_valid_id() {
        let picked = pick_ranked_candidate(&candidates(), Some("second")).unwrap();
        assert_eq!(picked.video_id, "second");
    }

    #[test]
    fn test_pick_ranked_candidate_falls_back_on_unknown_id() {
        let picked = pick_ranked_candidate(&candidates(), Some("hallucinated")).unwrap();
        assert_eq!(picked.video_id, "first");
    }

    #[test]
    fn test_pick_ranked_candidate_falls_back_without_ranking() {
        let picked = pick_ranked_candidate(&candidates(), None).unwrap();
        assert_eq!(picked.video_id, "first");
    }

    #[test]
    fn test_pick_ranked_candidate_empty_search_means_no_video() {
        assert!(pick_ranked_candidate(&[], Some("anything")).is_none());
        assert!(pick_ranked_candidate(&[], None).is_none());
    }

    #[test]
    fn test_lesson_draft_requires_every_content_field() {
        let missing_exercise = r#"{
            "explanation": "e",
            "real_world_example": "r",
            "code_example": "c",
            "common_mistakes": ["m"],
            "interview_qa": []
        }"#;
        let result: Result<LessonDraft, _> = serde_json::from_str(missing_exercise);
        assert!(result.is_err(), "LessonDraft without exercise must fail deserialization");
    }

    #[test]
    fn test_quiz_question_deserializes_from_model_shape() {
        let json = r#"{
            "question": "What does a quorum guarantee?",
            "options": ["Liveness", "Intersection", "Ordering", "Durability"],
            "correct_index": 1,
            "explanation": "Any two quorums share at least one member."
        }"#;
        let question: QuizQuestion = serde_json::from_str(json).unwrap();
        assert_eq!(question.options.len(), 4);
        assert_eq!(question.correct_index, 1);
    }
}
