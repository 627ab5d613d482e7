use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_CAS_RETRIES;
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    /// Cumulative gamification points. Only ever incremented.
    pub points: f64,
    /// At most one non-finished session record per user; `None` means the
    /// user may create or retry a session.
    pub active_session_record_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    pub fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let email_key = keys::user_email_index_key(&user.email);

        // Atomic compare-and-swap: only insert if the email key does not exist.
        // This prevents the race condition where two concurrent registrations
        // with the same email both pass the existence check.
        let cas_result = self
            .users
            .compare_and_swap(
                email_key.as_bytes(),
                None::<&[u8]>,
                Some(user.id.as_bytes().to_vec()),
            )
            .map_err(StoreError::Sled)?;

        if cas_result.is_err() {
            return Err(StoreError::Conflict {
                entity: "user_email".to_string(),
                key: user.email.clone(),
            });
        }

        let user_key = keys::user_key(&user.id);
        let user_bytes = Self::serialize(user)?;
        if let Err(e) = self.users.insert(user_key.as_bytes(), user_bytes) {
            let _ = self.users.remove(email_key.as_bytes());
            return Err(StoreError::Sled(e));
        }

        Ok(())
    }

    pub fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let key = keys::user_key(user_id);
        match self.users.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let index_key = keys::user_email_index_key(email);
        let Some(user_id_raw) = self.users.get(index_key.as_bytes())? else {
            return Ok(None);
        };
        let user_id = match String::from_utf8(user_id_raw.to_vec()) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid UTF-8 in user email index");
                return Ok(None);
            }
        };
        self.get_user_by_id(&user_id)
    }

    /// Claim the user's active-session slot for `record_id`.
    ///
    /// Fails with `Conflict` when another non-finished record already holds
    /// the slot. The claim-if-none CAS closes the check-then-act window of a
    /// separate read followed by a write: two concurrent creates can both see
    /// an empty slot, but only one swap lands.
    pub fn claim_active_session(&self, user_id: &str, record_id: &str) -> Result<User, StoreError> {
        self.update_user_cas(user_id, |user| {
            if user.active_session_record_id.is_some() {
                return Err(StoreError::Conflict {
                    entity: "active_session".to_string(),
                    key: user.id.clone(),
                });
            }
            user.active_session_record_id = Some(record_id.to_string());
            Ok(())
        })
    }

    /// Release the active-session slot held by `record_id` and credit
    /// `points_delta` in the same atomic swap. The slot is only cleared when
    /// it still points at `record_id`; the credit applies either way.
    pub fn release_active_session(
        &self,
        user_id: &str,
        record_id: &str,
        points_delta: f64,
    ) -> Result<User, StoreError> {
        if points_delta < 0.0 {
            return Err(StoreError::Validation(
                "points delta must be non-negative".to_string(),
            ));
        }
        self.update_user_cas(user_id, |user| {
            if user.active_session_record_id.as_deref() == Some(record_id) {
                user.active_session_record_id = None;
            }
            user.points += points_delta;
            Ok(())
        })
    }

    /// 用户行 CAS 更新循环：读取-变更-交换，失败时重试。
    /// mutate 返回 Err 时立即中止（前置条件不满足，不重试）。
    fn update_user_cas<F>(&self, user_id: &str, mutate: F) -> Result<User, StoreError>
    where
        F: Fn(&mut User) -> Result<(), StoreError>,
    {
        let key = keys::user_key(user_id);
        for _ in 0..MAX_CAS_RETRIES {
            let Some(raw) = self.users.get(key.as_bytes())? else {
                return Err(StoreError::NotFound {
                    entity: "user".to_string(),
                    key: user_id.to_string(),
                });
            };

            let mut user: User = Self::deserialize(&raw)?;
            mutate(&mut user)?;
            user.updated_at = Utc::now();

            let new_bytes = Self::serialize(&user)?;
            let swapped = self
                .users
                .compare_and_swap(key.as_bytes(), Some(raw.as_ref()), Some(new_bytes))
                .map_err(StoreError::Sled)?;

            if swapped.is_ok() {
                return Ok(user);
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "user".to_string(),
            key: user_id.to_string(),
            attempts: MAX_CAS_RETRIES,
        })
    }
}
