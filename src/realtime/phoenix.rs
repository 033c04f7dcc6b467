//! Frames of the Phoenix channel protocol (vsn 1.0.0) as spoken by Supabase Realtime.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::base::{ChangeEvent, ChangeKind};

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const HEARTBEAT_TOPIC: &str = "phoenix";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl Message {
    pub fn join(topic: &str, table: &str, access_token: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [
                        { "event": "*", "schema": "public", "table": table }
                    ]
                },
                "access_token": access_token
            }),
            reference: Some(reference.to_string()),
        }
    }

    pub fn leave(topic: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: HEARTBEAT_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    /// Status of a `phx_reply`, e.g. "ok" or "error".
    pub fn reply_status(&self) -> Option<&str> {
        if self.event != EVENT_REPLY {
            return None;
        }
        self.payload.get("status").and_then(Value::as_str)
    }

    /// Turns a `postgres_changes` frame into a change notification.
    pub fn change_event(&self) -> Option<ChangeEvent> {
        if self.event != EVENT_POSTGRES_CHANGES {
            return None;
        }
        let data = self.payload.get("data")?;
        let kind = data
            .get("type")
            .and_then(Value::as_str)
            .map(ChangeKind::from_postgres)
            .unwrap_or(ChangeKind::Other);
        let table = data
            .get("table")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let record_id = ["record", "old_record"]
            .iter()
            .filter_map(|key| data.get(*key))
            .find_map(|row| row.get("id"))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        Some(ChangeEvent {
            kind,
            table,
            record_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that an insert notification is decoded with its row id.
    #[test]
    fn test_parse_postgres_insert() {
        let frame = r#"{
            "topic": "realtime:realtime-bookmarks",
            "event": "postgres_changes",
            "payload": {
                "ids": [123],
                "data": {
                    "schema": "public",
                    "table": "bookmarks",
                    "commit_timestamp": "2024-05-01T10:00:00Z",
                    "type": "INSERT",
                    "record": {"id": "b-1", "title": "Rust", "url": "https://rust-lang.org"},
                    "columns": []
                }
            },
            "ref": null
        }"#;
        let message: Message = serde_json::from_str(frame).unwrap();
        let event = message.change_event().unwrap();
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.table, "bookmarks");
        assert_eq!(event.record_id.as_deref(), Some("b-1"));
    }

    /// Test that deletes fall back to the old record for the id.
    #[test]
    fn test_parse_postgres_delete() {
        let frame = r#"{"topic":"realtime:x","event":"postgres_changes",
            "payload":{"data":{"table":"bookmarks","type":"DELETE","old_record":{"id":7}}},"ref":null}"#;
        let message: Message = serde_json::from_str(frame).unwrap();
        let event = message.change_event().unwrap();
        assert_eq!(event.kind, ChangeKind::Delete);
        assert_eq!(event.record_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_parse_join_reply() {
        let frame = r#"{"topic":"realtime:x","event":"phx_reply",
            "payload":{"status":"ok","response":{"postgres_changes":[]}},"ref":"1"}"#;
        let message: Message = serde_json::from_str(frame).unwrap();
        assert_eq!(message.reply_status(), Some("ok"));
        assert_eq!(message.reference.as_deref(), Some("1"));
        assert!(message.change_event().is_none());
    }

    /// Test that the join frame carries the table filter and the token.
    #[test]
    fn test_join_frame() {
        let message = Message::join("realtime:realtime-bookmarks", "bookmarks", "jwt", 1);
        let encoded = serde_json::to_value(&message).unwrap();
        assert_eq!(encoded["event"], "phx_join");
        assert_eq!(encoded["ref"], "1");
        assert_eq!(encoded["payload"]["access_token"], "jwt");
        assert_eq!(
            encoded["payload"]["config"]["postgres_changes"][0]["table"],
            "bookmarks"
        );
        assert_eq!(
            encoded["payload"]["config"]["postgres_changes"][0]["event"],
            "*"
        );
    }
}
