use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::session_records::{
    Answer, Question, SessionRecord, SessionRecordStatus,
};
use crate::store::StoreError;
use crate::validation::{validate_answer_input, validate_topic_input};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create).get(list))
        .route("/:id", get(get_one))
        .route("/:id/start", post(start))
        .route("/:id/answer", post(answer))
        .route("/:id/end", post(end))
        .route("/:id/retry", post(retry))
}

/// Record as the client sees it: the stored fields plus the derived mean
/// score.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecordView {
    id: String,
    status: SessionRecordStatus,
    topic: Option<String>,
    questions: Vec<Question>,
    answers: Vec<Answer>,
    current_question_index: Option<usize>,
    score: f64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl SessionRecordView {
    fn from_record(record: SessionRecord) -> Self {
        let score = record.score();
        Self {
            id: record.id,
            status: record.status,
            topic: record.topic,
            questions: record.questions,
            answers: record.answers,
            current_question_index: record.current_question_index,
            score,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    input: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerRequest {
    answer: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    status: Option<SessionRecordStatus>,
    cursor: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    items: Vec<SessionRecordView>,
    next_cursor: Option<String>,
}

/// Load the record and hide other users' records behind NOT_FOUND.
fn load_owned_record(
    state: &AppState,
    auth: &AuthUser,
    record_id: &str,
) -> Result<SessionRecord, AppError> {
    let record = state
        .store()
        .get_session_record(record_id)?
        .filter(|r| r.user_id == auth.user_id)
        .ok_or_else(|| AppError::not_found("Session record not found"))?;
    Ok(record)
}

async fn create(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let record = SessionRecord::new_pending(&auth.user_id);

    // 先抢占活跃会话槽位，再写记录。写入失败时回滚槽位，防止卡死。
    match state.store().claim_active_session(&auth.user_id, &record.id) {
        Ok(_) => {}
        Err(StoreError::Conflict { .. }) => return Err(AppError::active_session_exists()),
        Err(e) => return Err(e.into()),
    }

    if let Err(e) = state.store().create_session_record(&record) {
        let _ = state
            .store()
            .release_active_session(&auth.user_id, &record.id, 0.0);
        return Err(e.into());
    }

    tracing::info!(user_id = %auth.user_id, record_id = %record.id, "Session record created");
    Ok(created(SessionRecordView::from_record(record)))
}

async fn start(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    JsonBody(req): JsonBody<StartRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_topic_input(&req.input)
        .map_err(|msg| AppError::bad_request("INVALID_TOPIC_INPUT", msg))?;

    let record = load_owned_record(&state, &auth, &record_id)?;
    if record.status != SessionRecordStatus::Pending {
        return Err(AppError::invalid_transition());
    }

    // No state is touched until both completions have succeeded; a failure
    // here leaves the record Pending and retryable.
    let topic = state.tutor().extract_topic(&req.input).await.map_err(|e| {
        tracing::error!(record_id = %record_id, error = %e, "Topic extraction failed");
        AppError::invalid_topic_input()
    })?;
    let questions = state.tutor().generate_questions(&topic).await.map_err(|e| {
        tracing::error!(record_id = %record_id, topic = %topic, error = %e, "Question generation failed");
        AppError::invalid_topic_input()
    })?;

    let started = match state
        .store()
        .start_session_record(&record_id, &topic, &questions)
    {
        Ok(record) => record,
        Err(StoreError::Conflict { .. }) => return Err(AppError::invalid_transition()),
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        user_id = %auth.user_id,
        record_id = %record_id,
        topic = %topic,
        question_count = started.questions.len(),
        "Session started"
    );
    Ok(ok(SessionRecordView::from_record(started)))
}

async fn answer(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    JsonBody(req): JsonBody<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_answer_input(&req.answer)
        .map_err(|msg| AppError::bad_request("INVALID_ANSWER_INPUT", msg))?;

    let record = load_owned_record(&state, &auth, &record_id)?;
    if record.status != SessionRecordStatus::Started {
        return Err(AppError::invalid_transition());
    }
    let Some(cursor) = record.current_question_index else {
        return Err(AppError::invalid_transition());
    };
    let Some(question) = record.questions.get(cursor) else {
        return Err(AppError::invalid_transition());
    };

    let graded = state
        .tutor()
        .grade_answer(&question.payload, &req.answer)
        .await
        .map_err(|e| {
            tracing::error!(record_id = %record_id, cursor, error = %e, "Answer grading failed");
            AppError::answer_grading_failed()
        })?;

    let graded_answer = Answer {
        id: uuid::Uuid::new_v4().to_string(),
        question_id: question.id.clone(),
        payload: req.answer.clone(),
        score: graded.score,
        review: graded.review,
        model_answer: graded.model_answer,
        grade: graded.grade,
    };

    // CAS 以期望的游标位置为条件：并发重复提交只会有一个落盘
    let updated = match state.store().append_answer(&record_id, cursor, &graded_answer) {
        Ok(record) => record,
        Err(StoreError::Conflict { .. }) => return Err(AppError::invalid_transition()),
        Err(e) => return Err(e.into()),
    };

    if updated.status == SessionRecordStatus::Finished {
        let points = updated.answers_score_sum();
        state
            .store()
            .release_active_session(&auth.user_id, &record_id, points)?;
        tracing::info!(
            user_id = %auth.user_id,
            record_id = %record_id,
            points,
            "Session finished, points credited"
        );
    }

    Ok(ok(SessionRecordView::from_record(updated)))
}

async fn end(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(record_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = load_owned_record(&state, &auth, &record_id)?;
    if record.status == SessionRecordStatus::Finished {
        return Err(AppError::invalid_transition());
    }

    let finished = match state.store().finish_session_record(&record_id) {
        Ok(record) => record,
        Err(StoreError::Conflict { .. }) => return Err(AppError::invalid_transition()),
        Err(e) => return Err(e.into()),
    };

    // Ending early still credits whatever was scored so far (possibly zero).
    let points = finished.answers_score_sum();
    state
        .store()
        .release_active_session(&auth.user_id, &record_id, points)?;

    tracing::info!(user_id = %auth.user_id, record_id = %record_id, points, "Session ended early");
    Ok(ok(SessionRecordView::from_record(finished)))
}

async fn retry(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(record_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let source = load_owned_record(&state, &auth, &record_id)?;
    if source.status != SessionRecordStatus::Finished {
        return Err(AppError::invalid_transition());
    }

    let retry_record = SessionRecord::new_retry_of(&source);

    match state
        .store()
        .claim_active_session(&auth.user_id, &retry_record.id)
    {
        Ok(_) => {}
        Err(StoreError::Conflict { .. }) => return Err(AppError::active_session_exists()),
        Err(e) => return Err(e.into()),
    }

    if let Err(e) = state.store().create_session_record(&retry_record) {
        let _ = state
            .store()
            .release_active_session(&auth.user_id, &retry_record.id, 0.0);
        return Err(e.into());
    }

    tracing::info!(
        user_id = %auth.user_id,
        source_record_id = %source.id,
        record_id = %retry_record.id,
        "Session retry created"
    );
    Ok(created(SessionRecordView::from_record(retry_record)))
}

async fn get_one(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(record_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = load_owned_record(&state, &auth, &record_id)?;
    Ok(ok(SessionRecordView::from_record(record)))
}

async fn list(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit == 0 || limit > MAX_PAGE_SIZE {
        return Err(AppError::bad_request(
            "INVALID_LIMIT",
            "limit must be between 1 and 100",
        ));
    }

    let (records, next_cursor) = state.store().list_session_records(
        &auth.user_id,
        query.status,
        query.cursor.as_deref(),
        limit,
    )?;

    Ok(ok(ListResponse {
        items: records
            .into_iter()
            .map(SessionRecordView::from_record)
            .collect(),
        next_cursor,
    }))
}
