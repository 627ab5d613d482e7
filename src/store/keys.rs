pub fn user_key(user_id: &str) -> String {
    user_id.to_string()
}

pub fn user_email_index_key(email: &str) -> String {
    format!("email:{}", email.to_lowercase())
}

pub fn session_key(token_hash: &str) -> String {
    token_hash.to_string()
}

pub fn session_user_index_key(user_id: &str, token_hash: &str) -> String {
    format!("user:{}:{}", user_id, token_hash)
}

pub fn session_record_key(record_id: &str) -> String {
    record_id.to_string()
}

/// Index key ordering record ids ascending within one user, which is the
/// order the list endpoint pages through.
pub fn session_record_user_index_key(user_id: &str, record_id: &str) -> String {
    format!("user:{}:{}", user_id, record_id)
}

pub fn session_record_user_prefix(user_id: &str) -> String {
    format!("user:{}:", user_id)
}
