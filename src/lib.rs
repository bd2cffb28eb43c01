pub mod broker;
pub mod cache;
pub mod config;
pub mod judge0;
pub mod providers;
pub mod routes;
pub mod sandbox;
pub mod web_server;

/// The only language this service accepts (Judge0 numbering).
pub const KOTLIN_LANGUAGE_ID: u32 = 78;

/// Largest accepted `source_code`, in bytes.
pub const MAX_SOURCE_BYTES: usize = 50_000;

pub fn create_timestamp() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
