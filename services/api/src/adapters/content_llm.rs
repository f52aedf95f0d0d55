//! services/api/src/adapters/content_llm.rs
//!
//! This module contains the adapter for the content-generation LLM.
//! It implements the `ContentService` port from the `core` crate against any
//! OpenAI-compatible chat-completions API (Groq by default).

const QUESTIONS_SYSTEM: &str = "You write multiple-choice school assessments for students following the Egyptian national curriculum. Respond with a single JSON object and nothing else.";

const QUESTIONS_TEMPLATE: &str = r#"Write {count} varied multiple-choice questions for a student in grade {grade} of the {stage} stage.

Respond with JSON only, shaped exactly like:
{"questions": [{"q": "question text", "a": ["choice 1", "choice 2", "choice 3", "choice 4"], "correct": "the correct choice, copied exactly from a", "subject": "subject name"}]}

Every question must have exactly four choices, and "correct" must be one of them."#;

const PLAN_SYSTEM: &str = "You are a friendly study coach. Respond with HTML only (no Markdown), styled with Bootstrap classes.";

const PLAN_TEMPLATE: &str = r#"Student: {name}, grade {grade}.
Assessment result: {score}/{total} ({rating}). Time taken: {elapsed} seconds.
Weak subjects: {weaknesses}.
The student's routine for today, in their own words: "{routine}".

Produce:
1. A coloured card showing the score, the rating, and advice for the weak subjects.
2. A smart timetable for today:
   - Read the routine above. If it mentions school hours or lessons, build the timetable around them and place "School" and "Lessons" at their times.
   - Fill the free time with rest, lunch, studying a specific subject, and 30 minutes of a new skill.
   - Do not include any questions. Only the timetable and the analysis."#;

const NO_ROUTINE: &str = "no commitments recorded";

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client, error::OpenAIError,
};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use study_gate_core::{
    domain::Question,
    ports::{AssessmentRequest, ContentService, PlanRequest, PortError, PortResult},
};
use std::sync::OnceLock;
use tracing::warn;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ContentService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiContentAdapter {
    client: Option<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiContentAdapter {
    /// Creates a new `OpenAiContentAdapter`.
    ///
    /// Without an API key the adapter still constructs, and every call fails
    /// with a content-service error.
    pub fn new(api_key: Option<&str>, api_base: &str, model: String) -> Self {
        let client = api_key.map(|key| {
            Client::with_config(
                OpenAIConfig::new()
                    .with_api_base(api_base)
                    .with_api_key(key),
            )
        });
        Self { client, model }
    }

    async fn complete(
        &self,
        system: Option<&str>,
        user: String,
        format: Option<ResponseFormat>,
    ) -> PortResult<String> {
        let client = self.client.as_ref().ok_or_else(|| {
            PortError::ContentService("No API key configured for the content service".to_string())
        })?;

        let request = build_request(&self.model, system, user, format)?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::ContentService(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::ContentService("Content LLM response contained no text content.".to_string())
            })
    }
}

/// Builds a single-choice chat request. `format` is only set when the caller
/// needs structured output.
fn build_request(
    model: &str,
    system: Option<&str>,
    user: String,
    format: Option<ResponseFormat>,
) -> PortResult<CreateChatCompletionRequest> {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );
    }
    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(user)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
    );

    let mut args = CreateChatCompletionRequestArgs::default();
    args.model(model).messages(messages).n(1);
    if let Some(format) = format {
        args.response_format(format);
    }
    args.build().map_err(|e| PortError::Unexpected(e.to_string()))
}

//=========================================================================================
// Response Parsing
//=========================================================================================

#[derive(Deserialize)]
struct QuestionSetRecord {
    #[serde(default)]
    questions: Vec<QuestionRecord>,
}

#[derive(Deserialize)]
struct QuestionRecord {
    q: String,
    #[serde(default)]
    a: Vec<String>,
    correct: String,
    #[serde(default)]
    subject: String,
}
impl QuestionRecord {
    fn to_domain(self) -> Question {
        Question {
            prompt: self.q,
            choices: self.a,
            correct: self.correct,
            subject: self.subject,
        }
    }
}

/// Parses the question-set JSON, tolerating prose or code fences around the object.
fn parse_questions(raw: &str) -> PortResult<Vec<Question>> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => {
            return Err(PortError::ContentService(
                "Question response did not contain a JSON object".to_string(),
            ))
        }
    };

    let set: QuestionSetRecord = serde_json::from_str(json)
        .map_err(|e| PortError::ContentService(format!("Malformed question JSON: {}", e)))?;

    let questions: Vec<Question> = set.questions.into_iter().map(QuestionRecord::to_domain).collect();
    let odd = questions.iter().filter(|q| q.choices.len() != 4).count();
    if odd > 0 {
        warn!(odd, "Some generated questions do not have four choices");
    }
    Ok(questions)
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```[A-Za-z]*").expect("static pattern is valid"))
}

/// Removes Markdown code fences the model sometimes wraps around HTML.
fn strip_fences(text: &str) -> String {
    code_fence().replace_all(text, "").trim().to_string()
}

fn render_plan_prompt(request: &PlanRequest) -> String {
    let weaknesses = if request.result.weaknesses.is_empty() {
        "none".to_string()
    } else {
        request
            .result
            .weaknesses
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    PLAN_TEMPLATE
        .replace("{name}", request.student_name.as_deref().unwrap_or("the student"))
        .replace("{grade}", request.grade.as_deref().unwrap_or("unknown"))
        .replace("{score}", &request.result.score.to_string())
        .replace("{total}", &request.result.total.to_string())
        .replace("{rating}", request.result.rating.label())
        .replace("{elapsed}", &request.elapsed_seconds.to_string())
        .replace("{weaknesses}", &weaknesses)
        .replace("{routine}", request.today_routine.as_deref().unwrap_or(NO_ROUTINE))
}

//=========================================================================================
// `ContentService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ContentService for OpenAiContentAdapter {
    async fn generate_questions(&self, request: &AssessmentRequest) -> PortResult<Vec<Question>> {
        let prompt = QUESTIONS_TEMPLATE
            .replace("{count}", &request.question_count.to_string())
            .replace("{grade}", request.grade.as_deref().unwrap_or("any"))
            .replace("{stage}", request.stage.as_deref().unwrap_or("current"));

        let raw = self
            .complete(Some(QUESTIONS_SYSTEM), prompt, Some(ResponseFormat::JsonObject))
            .await?;
        parse_questions(&raw)
    }

    async fn generate_plan(&self, request: &PlanRequest) -> PortResult<String> {
        let raw = self
            .complete(Some(PLAN_SYSTEM), render_plan_prompt(request), None)
            .await?;
        Ok(strip_fences(&raw))
    }

    async fn chat(&self, message: &str) -> PortResult<String> {
        self.complete(None, message.to_string(), None).await
    }
}
