//! Control-socket JSON RPC schema (§6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One request on the control socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub action: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Command {
    pub fn option_true(&self, key: &str) -> bool {
        self.options.get(key).map(|v| v == "true").unwrap_or(false)
    }
}

/// One response on the control socket.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Response {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<HashMap<String, serde_json::Value>>,
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".into(),
            message: Some(message.into()),
            error: None,
            data: None,
        }
    }

    pub fn success_with_data(message: impl Into<String>, data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            status: "success".into(),
            message: Some(message.into()),
            error: None,
            data: Some(data),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            message: None,
            error: Some(error.into()),
            data: None,
        }
    }
}

/// One entry in the bounded recent-activity log (§3 `ServerStats`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: u64,
    pub level: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_round_trips_through_json() {
        let json = r#"{"action":"start","options":{"continuous":"true"}}"#;
        let cmd: Command = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.action, "start");
        assert!(cmd.option_true("continuous"));
        assert!(!cmd.option_true("verbose"));
    }

    #[test]
    fn command_defaults_options_when_absent() {
        let cmd: Command = serde_json::from_str(r#"{"action":"status"}"#).unwrap();
        assert!(cmd.options.is_empty());
    }

    #[test]
    fn response_error_omits_message_and_data() {
        let resp = Response::error("Invalid command");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "Invalid command");
        assert!(json.get("message").is_none());
        assert!(json.get("data").is_none());
    }

    #[test]
    fn response_success_serializes_message() {
        let resp = Response::success("Transcriber is stopped");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "Transcriber is stopped");
    }
}
