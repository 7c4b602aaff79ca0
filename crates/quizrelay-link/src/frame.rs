//! Wire frames carried in WebSocket text messages.
//!
//! ```text
//! {"type":"event","event":"player:team","data":{..},"ack":7}
//! {"type":"ack","id":7,"data":{"code":204}}
//! ```
//!
//! An `event` frame with an `ack` id expects exactly one `ack` frame back
//! carrying the same id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LinkError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Event {
        event: String,
        #[serde(default)]
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack: Option<u64>,
    },
    Ack {
        id: u64,
        #[serde(default)]
        data: Value,
    },
}

impl Frame {
    pub fn encode(&self) -> Result<String, LinkError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, LinkError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_without_ack_omits_field() {
        let frame = Frame::Event {
            event: "state".into(),
            data: json!({"ready": true, "number": 5}),
            ack: None,
        };
        let text = frame.encode().unwrap();
        let v: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["type"], "event");
        assert_eq!(v["event"], "state");
        assert!(v.get("ack").is_none());
    }

    #[test]
    fn decode_ack() {
        let frame = Frame::decode(r#"{"type":"ack","id":7,"data":{"code":204}}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Ack {
                id: 7,
                data: json!({"code": 204}),
            }
        );
    }

    #[test]
    fn missing_data_is_null() {
        let frame = Frame::decode(r#"{"type":"event","event":"helo","ack":1}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Event {
                event: "helo".into(),
                data: Value::Null,
                ack: Some(1),
            }
        );
    }

    #[test]
    fn unknown_type_rejected() {
        assert!(matches!(
            Frame::decode(r#"{"type":"ping"}"#),
            Err(LinkError::Codec(_))
        ));
        assert!(Frame::decode("not json").is_err());
    }
}
