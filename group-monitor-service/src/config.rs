use std::env;

/// Keyword that marks a group for monitoring.
///
/// Deliberately fixed in code rather than environment-exposed: the set of
/// groups we track is a product decision, not a deployment knob.
pub const TARGET_KEYWORD: &str = "neol";

#[derive(Clone)]
pub struct Config {
    pub db_path: String,
    pub session_dir: String,
    pub bridge_addr: String,
    pub mark_online_on_connect: bool,
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("GROUP_MONITOR_DB_PATH")
                .unwrap_or_else(|_| "./group_monitor.db".to_string()),
            session_dir: env::var("SESSION_DIR").unwrap_or_else(|_| "./session".to_string()),
            bridge_addr: env::var("BRIDGE_ADDR").unwrap_or_else(|_| "127.0.0.1:9331".to_string()),
            mark_online_on_connect: env::var("MARK_ONLINE_ON_CONNECT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            reconnect_max_attempts: env::var("RECONNECT_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            reconnect_base_delay_secs: env::var("RECONNECT_BASE_DELAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        }
    }
}
