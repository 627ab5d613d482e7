use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_CAS_RETRIES;
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionRecordStatus {
    Pending,
    Started,
    Finished,
}

/// Letter grade for one answer, derived from its numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerGrade {
    A,
    B,
    C,
    D,
    F,
}

impl AnswerGrade {
    /// Inclusive lower bounds: 90 is an A, 60 is a D.
    pub fn for_score(score: f64) -> Self {
        if score >= 90.0 {
            AnswerGrade::A
        } else if score >= 80.0 {
            AnswerGrade::B
        } else if score >= 70.0 {
            AnswerGrade::C
        } else if score >= 60.0 {
            AnswerGrade::D
        } else {
            AnswerGrade::F
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub payload: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: String,
    pub question_id: String,
    pub payload: String,
    pub score: f64,
    pub review: String,
    pub model_answer: String,
    pub grade: AnswerGrade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub status: SessionRecordStatus,
    pub topic: Option<String>,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
    pub current_question_index: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new_pending(user_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            status: SessionRecordStatus::Pending,
            topic: None,
            questions: Vec::new(),
            answers: Vec::new(),
            current_question_index: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Fresh Started record reusing the topic and questions of a finished
    /// one. The source record is not touched.
    pub fn new_retry_of(source: &SessionRecord) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: source.user_id.clone(),
            status: SessionRecordStatus::Started,
            topic: source.topic.clone(),
            questions: source.questions.clone(),
            answers: Vec::new(),
            current_question_index: Some(0),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn answers_score_sum(&self) -> f64 {
        self.answers.iter().map(|a| a.score).sum()
    }

    /// Mean score over all questions. A record without questions has no
    /// meaningful score; return 0 rather than NaN (only Pending records can
    /// be in that shape, Started requires at least one question).
    pub fn score(&self) -> f64 {
        if self.questions.is_empty() {
            return 0.0;
        }
        self.answers_score_sum() / self.questions.len() as f64
    }
}

impl Store {
    pub fn create_session_record(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let key = keys::session_record_key(&record.id);
        let bytes = Self::serialize(record)?;
        self.session_records.insert(key.as_bytes(), bytes)?;

        let index_key = keys::session_record_user_index_key(&record.user_id, &record.id);
        self.session_records_by_user
            .insert(index_key.as_bytes(), record.id.as_bytes())?;
        Ok(())
    }

    pub fn get_session_record(&self, record_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let key = keys::session_record_key(record_id);
        match self.session_records.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Pending -> Started. Sets topic, questions and cursor 0 in one swap.
    /// Any state other than Pending observed under the CAS is a `Conflict`.
    pub fn start_session_record(
        &self,
        record_id: &str,
        topic: &str,
        questions: &[Question],
    ) -> Result<SessionRecord, StoreError> {
        if questions.is_empty() {
            return Err(StoreError::Validation(
                "cannot start a session without questions".to_string(),
            ));
        }
        self.update_record_cas(record_id, |record| {
            if record.status != SessionRecordStatus::Pending {
                return Err(StoreError::Conflict {
                    entity: "session_record".to_string(),
                    key: record.id.clone(),
                });
            }
            record.topic = Some(topic.to_string());
            record.questions = questions.to_vec();
            record.answers.clear();
            record.current_question_index = Some(0);
            record.status = SessionRecordStatus::Started;
            Ok(())
        })
    }

    /// Append one graded answer, keyed on the expected cursor position.
    ///
    /// Exactly one of {advance, finish} happens per accepted answer: on the
    /// last question the record flips to Finished and the cursor stays put,
    /// otherwise the cursor advances by one. A concurrent double-submit for
    /// the same position loses the swap, re-reads a moved cursor and fails
    /// with `Conflict` — no answer is appended twice.
    pub fn append_answer(
        &self,
        record_id: &str,
        expected_index: usize,
        answer: &Answer,
    ) -> Result<SessionRecord, StoreError> {
        self.update_record_cas(record_id, |record| {
            let conflict = || StoreError::Conflict {
                entity: "session_record".to_string(),
                key: record_id.to_string(),
            };
            if record.status != SessionRecordStatus::Started {
                return Err(conflict());
            }
            if record.current_question_index != Some(expected_index) {
                return Err(conflict());
            }
            if expected_index >= record.questions.len() {
                return Err(conflict());
            }

            record.answers.push(answer.clone());
            if expected_index == record.questions.len() - 1 {
                record.status = SessionRecordStatus::Finished;
            } else {
                record.current_question_index = Some(expected_index + 1);
            }
            Ok(())
        })
    }

    /// Any non-Finished state -> Finished. Questions, answers and topic are
    /// untouched; a Finished record observed under the CAS is a `Conflict`.
    pub fn finish_session_record(&self, record_id: &str) -> Result<SessionRecord, StoreError> {
        self.update_record_cas(record_id, |record| {
            if record.status == SessionRecordStatus::Finished {
                return Err(StoreError::Conflict {
                    entity: "session_record".to_string(),
                    key: record.id.clone(),
                });
            }
            record.status = SessionRecordStatus::Finished;
            Ok(())
        })
    }

    /// Page through one user's records in ascending id order. The cursor is
    /// inclusive: it names the first record of the page, and the caller gets
    /// back the id to use for the next page (fetch-one-extra).
    pub fn list_session_records(
        &self,
        user_id: &str,
        status: Option<SessionRecordStatus>,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<SessionRecord>, Option<String>), StoreError> {
        let prefix = keys::session_record_user_prefix(user_id);
        let start = match cursor {
            Some(cursor_id) => keys::session_record_user_index_key(user_id, cursor_id),
            None => prefix.clone(),
        };

        let mut items: Vec<SessionRecord> = Vec::new();
        for entry in self.session_records_by_user.range(start.as_bytes()..) {
            let (key, value) = entry?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let record_id = String::from_utf8_lossy(&value).to_string();
            let Some(record) = self.get_session_record(&record_id)? else {
                tracing::warn!(record_id, "Dangling session record index entry");
                continue;
            };
            if let Some(wanted) = status {
                if record.status != wanted {
                    continue;
                }
            }
            items.push(record);
            if items.len() > limit {
                break;
            }
        }

        let next_cursor = if items.len() > limit {
            items.pop().map(|extra| extra.id)
        } else {
            None
        };

        Ok((items, next_cursor))
    }

    fn update_record_cas<F>(&self, record_id: &str, mutate: F) -> Result<SessionRecord, StoreError>
    where
        F: Fn(&mut SessionRecord) -> Result<(), StoreError>,
    {
        let key = keys::session_record_key(record_id);
        for _ in 0..MAX_CAS_RETRIES {
            let Some(raw) = self.session_records.get(key.as_bytes())? else {
                return Err(StoreError::NotFound {
                    entity: "session_record".to_string(),
                    key: record_id.to_string(),
                });
            };

            let mut record: SessionRecord = Self::deserialize(&raw)?;
            mutate(&mut record)?;
            record.updated_at = Utc::now();

            let new_bytes = Self::serialize(&record)?;
            let swapped = self
                .session_records
                .compare_and_swap(key.as_bytes(), Some(raw.as_ref()), Some(new_bytes))
                .map_err(StoreError::Sled)?;

            if swapped.is_ok() {
                return Ok(record);
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "session_record".to_string(),
            key: record_id.to_string(),
            attempts: MAX_CAS_RETRIES,
        })
    }
}
