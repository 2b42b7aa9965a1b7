//! `/` and `/health` endpoints.

use std::time::Instant;

use serde::Serialize;

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize)]
pub struct Liveness {
    pub message: &'static str,
}

pub fn liveness() -> Liveness {
    Liveness { message: "Healthy" }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    pub uptime_secs: u64,
    /// Users with a registered signaling connection.
    pub connections: usize,
    pub call_tracking: bool,
}

pub fn health_check(start_time: Instant, connections: usize, call_tracking: bool) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        call_tracking,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_body() {
        let v = serde_json::to_value(liveness()).unwrap();
        assert_eq!(v, serde_json::json!({"message": "Healthy"}));
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        assert!(health_check(start, 0, true).uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let resp = health_check(Instant::now(), 2, false);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 2);
        assert_eq!(parsed["call_tracking"], false);
        assert!(parsed["uptime_secs"].is_number());
    }
}
