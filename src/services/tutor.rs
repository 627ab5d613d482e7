use serde::Deserialize;

use crate::constants::{MAX_ANSWER_SCORE, QUESTIONS_PER_SESSION};
use crate::services::llm_provider::{ChatMessage, LlmError, LlmProvider};
use crate::store::operations::session_records::{AnswerGrade, Question};

/// Topic extraction, question generation and answer grading on top of the
/// completion client.
///
/// Model output is untrusted external input: every reply goes through a
/// strict serde schema, and a shape mismatch is an error rather than a cast.
#[derive(Debug, Clone)]
pub struct TutorService {
    llm: LlmProvider,
}

#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    #[error("completion failed: {0}")]
    Completion(#[from] LlmError),
    #[error("malformed model reply: {0}")]
    MalformedReply(String),
    #[error("model returned no questions")]
    NoQuestions,
}

#[derive(Debug, Clone)]
pub struct GradedAnswer {
    pub score: f64,
    pub review: String,
    pub model_answer: String,
    pub grade: AnswerGrade,
}

#[derive(Debug, Deserialize)]
struct TopicReply {
    topic: String,
}

#[derive(Debug, Deserialize)]
struct QuestionsReply {
    questions: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradingReply {
    score: f64,
    review: String,
    model_answer: String,
}

impl TutorService {
    pub fn new(llm: LlmProvider) -> Self {
        Self { llm }
    }

    /// Canonical short topic string for a free-form utterance.
    pub async fn extract_topic(&self, raw_input: &str) -> Result<String, TutorError> {
        let prompt = format!(
            "extract the topic. keep it short: \"{raw_input}\". \
             reply must parse as JSON {{ \"topic\": string }}"
        );
        let reply = self.llm.chat(vec![ChatMessage::user(prompt)]).await?;
        parse_topic_reply(&reply)
    }

    /// Beginner-level quiz questions for a topic, each wrapped with a fresh
    /// id here. The model is asked for a fixed count but not trusted to
    /// honor it: whatever non-zero length comes back is what the session
    /// runs with, and zero questions is a hard failure.
    pub async fn generate_questions(&self, topic: &str) -> Result<Vec<Question>, TutorError> {
        let prompt = format!(
            "{QUESTIONS_PER_SESSION} questions about \"{topic}\", beginner level. \
             reply must parse as JSON {{ \"questions\": string[] }}"
        );
        let reply = self.llm.chat(vec![ChatMessage::user(prompt)]).await?;
        let texts = parse_questions_reply(&reply)?;

        Ok(texts
            .into_iter()
            .map(|payload| Question {
                id: uuid::Uuid::new_v4().to_string(),
                payload,
            })
            .collect())
    }

    /// Score, review and model answer for one question/answer pair.
    pub async fn grade_answer(
        &self,
        question: &str,
        answer: &str,
    ) -> Result<GradedAnswer, TutorError> {
        let prompt = format!(
            "review the answer: \"{answer}\" to: \"{question}\". \
             score out of 100, as strict as possible. \
             reply must parse as JSON {{ \"score\": number, \"review\": string, \"modelAnswer\": string }}"
        );
        let reply = self.llm.chat(vec![ChatMessage::user(prompt)]).await?;
        parse_grading_reply(&reply)
    }
}

fn parse_topic_reply(reply: &str) -> Result<String, TutorError> {
    let parsed: TopicReply = serde_json::from_str(strip_code_fences(reply))
        .map_err(|e| TutorError::MalformedReply(e.to_string()))?;
    let topic = parsed.topic.trim().to_string();
    if topic.is_empty() {
        return Err(TutorError::MalformedReply("empty topic".to_string()));
    }
    Ok(topic)
}

fn parse_questions_reply(reply: &str) -> Result<Vec<String>, TutorError> {
    let parsed: QuestionsReply = serde_json::from_str(strip_code_fences(reply))
        .map_err(|e| TutorError::MalformedReply(e.to_string()))?;
    let questions: Vec<String> = parsed
        .questions
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();
    if questions.is_empty() {
        return Err(TutorError::NoQuestions);
    }
    Ok(questions)
}

fn parse_grading_reply(reply: &str) -> Result<GradedAnswer, TutorError> {
    let parsed: GradingReply = serde_json::from_str(strip_code_fences(reply))
        .map_err(|e| TutorError::MalformedReply(e.to_string()))?;
    if !parsed.score.is_finite() {
        return Err(TutorError::MalformedReply("non-finite score".to_string()));
    }
    let score = parsed.score.clamp(0.0, MAX_ANSWER_SCORE);
    Ok(GradedAnswer {
        score,
        review: parsed.review,
        model_answer: parsed.model_answer,
        grade: AnswerGrade::for_score(score),
    })
}

/// Some models wrap JSON replies in markdown fences despite instructions.
fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
