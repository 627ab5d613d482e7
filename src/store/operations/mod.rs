pub mod session_records;
pub mod sessions;
pub mod users;
