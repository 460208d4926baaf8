// All LLM prompt constants for the course-generation pipeline.

/// System prompt for outline synthesis — enforces JSON-only output.
pub const OUTLINE_SYSTEM: &str =
    "You are an expert curriculum designer for a professional upskilling platform. \
    Design a structured course outline for the requested topic. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Outline prompt template. Replace `{topic}`, `{level}`, `{duration}`,
/// `{goal}`, `{max_modules}` before sending.
pub const OUTLINE_PROMPT_TEMPLATE: &str = r#"Design a course outline for the following request.

TOPIC: {topic}
LEVEL: {level}
DURATION: {duration}
GOAL: {goal}

Return a JSON object with this EXACT schema (no extra fields):
{
  "title": "Course title",
  "description": "Two or three sentences describing the course",
  "outcomes": ["What the learner can do after finishing"],
  "capstone_project": "A capstone project that exercises the whole course",
  "modules": [
    {
      "title": "Module title",
      "lessons": [
        {"title": "Lesson title", "focus": "One sentence on what this lesson must cover"}
      ]
    }
  ]
}

Rules:
- At most {max_modules} modules; pick a count that fits the duration.
- Each module has 4 or 5 lessons. Never fewer, never more.
- Order modules and lessons in teaching order — the order you return is the order learners see.
- Lesson focus notes are working notes for a later content pass, not learner-facing text.
- Calibrate depth to the level: a "{level}" learner should be stretched, not drowned."#;

/// System prompt for lesson content synthesis — enforces JSON-only output.
pub const LESSON_SYSTEM: &str =
    "You are an expert technical educator writing deep lesson content for a \
    professional upskilling platform. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Lesson content prompt template. Replace `{course_title}`, `{module_title}`,
/// `{lesson_title}`, `{focus}`, `{level}`, `{min_words}` before sending.
pub const LESSON_PROMPT_TEMPLATE: &str = r#"Write the full content for one lesson of a course.

COURSE: {course_title}
MODULE: {module_title}
LESSON: {lesson_title}
FOCUS: {focus}
LEVEL: {level}

Return a JSON object with this EXACT schema (no extra fields):
{
  "explanation": "The deep explanation of the lesson topic",
  "real_world_example": "A concrete real-world scenario applying the concept",
  "code_example": "A self-contained, runnable code example with brief inline comments",
  "common_mistakes": ["A mistake practitioners actually make"],
  "exercise": "A hands-on exercise the learner completes on their own",
  "interview_qa": [
    {"question": "An interview question on this topic", "answer": "A strong answer"}
  ]
}

Rules:
- The explanation MUST be at least {min_words} words. Write for a {level} learner.
- Give 3 to 5 common mistakes and 3 to 5 interview questions.
- The code example must match the lesson topic, not a generic placeholder."#;

/// System prompt for quiz synthesis — enforces JSON-only output.
pub const QUIZ_SYSTEM: &str =
    "You are an assessment writer creating quizzes that test understanding, \
    not recall of exact phrasing. \
    You MUST respond with valid JSON only — a JSON array of question objects. \
    Do NOT include any text outside the JSON array. \
    Do NOT use markdown code fences.";

/// Quiz prompt template. Replace `{lesson_title}`, `{explanation}` before sending.
pub const QUIZ_PROMPT_TEMPLATE: &str = r#"Write a quiz for the lesson "{lesson_title}" based on the explanation below.

Return a JSON array with this EXACT schema:
[
  {
    "question": "The question text",
    "options": ["Option A", "Option B", "Option C", "Option D"],
    "correct_index": 0,
    "explanation": "Why the correct option is correct"
  }
]

Rules:
- 4 to 6 questions, each with exactly 4 options and one correct answer.
- Questions must be answerable from the explanation alone.
- Distractors must be plausible — no joke options.

EXPLANATION:
{explanation}"#;

/// System prompt for video ranking — enforces JSON-only output.
pub const VIDEO_RANK_SYSTEM: &str =
    "You select the single best instructional video for a lesson and skill level. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object.";

/// Video ranking prompt template. Replace `{lesson_title}`, `{level}`,
/// `{candidates_json}` before sending.
pub const VIDEO_RANK_PROMPT_TEMPLATE: &str = r#"Pick the best video for the lesson "{lesson_title}" aimed at a {level} learner.

CANDIDATES (JSON array):
{candidates_json}

Return a JSON object with this EXACT schema:
{"video_id": "the video_id of the single best candidate"}

Rules:
- You MUST pick one of the candidate video_id values verbatim.
- Prefer depth-appropriate teaching over production polish."#;
