use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Persisted login session, keyed by the SHA-256 hash of the access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token_hash: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl Store {
    pub fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        let key = keys::session_key(&session.token_hash);
        let index_key = keys::session_user_index_key(&session.user_id, &session.token_hash);
        let session_bytes = Self::serialize(session)?;

        self.sessions.insert(key.as_bytes(), session_bytes)?;
        self.sessions.insert(index_key.as_bytes(), &[] as &[u8])?;
        Ok(())
    }

    /// 获取会话，如果已过期或已撤销则返回 None。不产生删除副作用。
    pub fn get_session(&self, token_hash: &str) -> Result<Option<Session>, StoreError> {
        let key = keys::session_key(token_hash);
        let Some(raw) = self.sessions.get(key.as_bytes())? else {
            return Ok(None);
        };

        let session = Self::deserialize::<Session>(&raw)?;
        if session.revoked || session.expires_at <= Utc::now() {
            return Ok(None);
        }

        Ok(Some(session))
    }

    pub fn delete_session(&self, token_hash: &str) -> Result<(), StoreError> {
        let key = keys::session_key(token_hash);
        if let Some(raw) = self.sessions.get(key.as_bytes())? {
            if let Ok(session) = Self::deserialize::<Session>(&raw) {
                let index_key =
                    keys::session_user_index_key(&session.user_id, token_hash);
                self.sessions.remove(index_key.as_bytes())?;
            }
        }
        self.sessions.remove(key.as_bytes())?;
        Ok(())
    }
}
