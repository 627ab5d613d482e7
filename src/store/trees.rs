pub const USERS: &str = "users";
pub const SESSIONS: &str = "sessions";
pub const SESSION_RECORDS: &str = "session_records";
pub const SESSION_RECORDS_BY_USER: &str = "session_records_by_user";
pub const META: &str = "meta";
