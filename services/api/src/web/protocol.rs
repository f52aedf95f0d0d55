//! services/api/src/web/protocol.rs
//!
//! Defines the JSON message protocol between the browser client and the API
//! server for each stage of the study flow.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use study_gate_core::{
    domain::{AssessmentResult, Question},
    flow::SessionStatus,
    fields::FieldMap,
};
use utoipa::ToSchema;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================
// Registration, schedule and answer submissions are free-form field maps, sent
// as flat JSON objects of strings.
//=========================================================================================

/// The access code typed on the entry page.
#[derive(Deserialize, ToSchema)]
pub struct CodeRequest {
    pub access_code: String,
}

/// A free-form form submission: field name to value. Non-string values are
/// kept in their JSON text form.
pub type FormFields = BTreeMap<String, serde_json::Value>;

pub fn into_field_map(form: FormFields) -> FieldMap {
    form.into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect()
}

#[derive(Deserialize, ToSchema)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Outcome of a code submission.
#[derive(Serialize, ToSchema)]
pub struct CodeResponse {
    pub accepted: bool,
    /// Where the client should go next when accepted.
    pub next: Option<String>,
    /// A message to show when the code was refused.
    pub error: Option<String>,
}

/// Acknowledges a stored form and names the next stage.
#[derive(Serialize, ToSchema)]
pub struct StageAck {
    pub next: String,
}

/// The stored free-form fields for a stage, for re-rendering its form.
#[derive(Serialize, ToSchema)]
pub struct FieldsView {
    pub fields: BTreeMap<String, String>,
}

impl From<&FieldMap> for FieldsView {
    fn from(fields: &FieldMap) -> Self {
        Self {
            fields: fields.clone().into_inner(),
        }
    }
}

/// A question as shown to the student. The correct answer is not sent.
#[derive(Serialize, ToSchema)]
pub struct QuestionView {
    pub index: usize,
    pub prompt: String,
    pub choices: Vec<String>,
    pub subject: String,
}

#[derive(Serialize, ToSchema)]
pub struct ExamResponse {
    pub questions: Vec<QuestionView>,
}

impl ExamResponse {
    pub fn from_questions(questions: &[Question]) -> Self {
        Self {
            questions: questions
                .iter()
                .enumerate()
                .map(|(index, q)| QuestionView {
                    index,
                    prompt: q.prompt.clone(),
                    choices: q.choices.clone(),
                    subject: q.subject.clone(),
                })
                .collect(),
        }
    }
}

/// The scored assessment and the plan built from it.
#[derive(Serialize, ToSchema)]
pub struct ResultResponse {
    pub score: usize,
    pub total: usize,
    pub rating: String,
    pub weaknesses: Vec<String>,
    pub plan: String,
    /// True when `plan` is fallback text because generation failed.
    pub degraded: bool,
    pub next: String,
}

impl ResultResponse {
    pub fn new(result: &AssessmentResult, plan: String, degraded: bool, next: &str) -> Self {
        Self {
            score: result.score,
            total: result.total,
            rating: result.rating.label().to_string(),
            weaknesses: result.weaknesses.iter().cloned().collect(),
            plan,
            degraded,
            next: next.to_string(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PlanResponse {
    pub plan: String,
}

#[derive(Serialize, ToSchema)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    pub authenticated: bool,
    pub stage: String,
    pub question_count: usize,
    pub has_plan: bool,
}

impl From<SessionStatus> for StatusResponse {
    fn from(status: SessionStatus) -> Self {
        Self {
            authenticated: status.authenticated,
            stage: status.stage.as_str().to_string(),
            question_count: status.question_count,
            has_plan: status.has_plan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_values_become_strings() {
        let form: FormFields = serde_json::from_str(r#"{"name": "Mona", "q0": 4, "time_taken": 12.5}"#).unwrap();
        let fields = into_field_map(form);
        assert_eq!(fields.get("name"), Some("Mona"));
        assert_eq!(fields.get("q0"), Some("4"));
        assert_eq!(fields.get("time_taken"), Some("12.5"));
    }

    #[test]
    fn exam_view_hides_answers() {
        let questions = vec![Question {
            prompt: "Capital of Egypt?".into(),
            choices: vec!["Cairo".into(), "Giza".into(), "Luxor".into(), "Aswan".into()],
            correct: "Cairo".into(),
            subject: "Geography".into(),
        }];
        let json = serde_json::to_value(ExamResponse::from_questions(&questions)).unwrap();
        assert_eq!(json["questions"][0]["index"], 0);
        assert!(json["questions"][0].get("correct").is_none());
    }
}
