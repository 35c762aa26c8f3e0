//! Frames exchanged with the inference backend over the chat socket.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::constants::{CHAT_SOCKET_PATH, is_interim};
use crate::ids::{ConversationId, RequestId};
use crate::messages::Subgraph;
use crate::trading::TradingAction;

/// Client → backend request frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundFrame {
    /// Numeric user id.
    pub user_id: i64,
    /// Conversation the request belongs to.
    pub thread_id: ConversationId,
    /// Prompt text.
    pub message: String,
    /// `None` for ordinary prompts, the answer when resuming after a
    /// confirmation question. Always serialized, as `null` when unset.
    pub human_feedback: Option<bool>,
    /// Correlation id of this request.
    pub request_id: RequestId,
}

/// Backend → client frame. Cumulative: `message` holds the full text so far.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Cumulative response text, or one of the interim status phrases.
    pub message: String,
    /// Knowledge subgraph; dropped if malformed.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub subgraph: Option<Subgraph>,
    /// Proposed order; dropped if not an object.
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub trading_action: Option<TradingAction>,
    /// Backend-reported error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Echo of the request's correlation id, when the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// Echo of the request's conversation id, when the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<ConversationId>,
}

impl InboundFrame {
    /// Frame carrying only text.
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// `true` while the backend is still working on the request.
    pub fn is_interim(&self) -> bool {
        is_interim(&self.message)
    }

    /// Whether this frame may belong to the given request. Frames without
    /// echoed ids match every request.
    pub fn concerns(&self, request_id: &RequestId, thread_id: &ConversationId) -> bool {
        self.request_id.as_ref().is_none_or(|r| r == request_id)
            && self.thread_id.as_ref().is_none_or(|t| t == thread_id)
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        serde_json::from_value(v)
            .inspect_err(|e| tracing::debug!(error = %e, "ignoring malformed frame payload"))
            .ok()
    }))
}

/// Chat socket URL for an HTTP(S) or WS(S) backend endpoint.
///
/// `https`/`wss` map to `wss`; everything else, including a bare host, maps
/// to `ws`.
pub fn ws_url(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    let (secure, rest) = if let Some(rest) = endpoint.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = endpoint.strip_prefix("wss://") {
        (true, rest)
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        (false, rest)
    } else if let Some(rest) = endpoint.strip_prefix("ws://") {
        (false, rest)
    } else {
        (false, endpoint)
    };
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{rest}{CHAT_SOCKET_PATH}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outbound_serializes_null_feedback() {
        let frame = OutboundFrame {
            user_id: 1,
            thread_id: ConversationId::from("t1"),
            message: "삼성전자 사줘".into(),
            human_feedback: None,
            request_id: RequestId::from("r1"),
        };
        let v = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            v,
            json!({
                "user_id": 1,
                "thread_id": "t1",
                "message": "삼성전자 사줘",
                "human_feedback": null,
                "request_id": "r1"
            })
        );
    }

    #[test]
    fn inbound_accepts_minimal_frame() {
        let f: InboundFrame = serde_json::from_str(r#"{"message":"데이터 분석 중입니다..."}"#).unwrap();
        assert!(f.is_interim());
        assert!(f.trading_action.is_none());
    }

    #[test]
    fn inbound_without_message_is_malformed() {
        assert!(serde_json::from_str::<InboundFrame>(r#"{"error":"x"}"#).is_err());
    }

    #[test]
    fn malformed_payloads_are_dropped_not_fatal() {
        let f: InboundFrame = serde_json::from_value(json!({
            "message": "done",
            "trading_action": "buy now",
            "subgraph": [1, 2, 3]
        }))
        .unwrap();
        assert_eq!(f.message, "done");
        assert!(f.trading_action.is_none());
        assert!(f.subgraph.is_none());
    }

    #[test]
    fn null_trading_action_is_none() {
        let f: InboundFrame =
            serde_json::from_value(json!({"message": "done", "trading_action": null})).unwrap();
        assert!(f.trading_action.is_none());
    }

    #[test]
    fn echoed_ids_filter_frames() {
        let r = RequestId::from("r1");
        let t = ConversationId::from("t1");
        assert!(InboundFrame::text("x").concerns(&r, &t));

        let mut f = InboundFrame::text("x");
        f.request_id = Some(RequestId::from("r2"));
        assert!(!f.concerns(&r, &t));

        f.request_id = Some(r.clone());
        f.thread_id = Some(ConversationId::from("t2"));
        assert!(!f.concerns(&r, &t));

        f.thread_id = Some(t.clone());
        assert!(f.concerns(&r, &t));
    }

    #[test]
    fn ws_url_maps_schemes() {
        assert_eq!(ws_url("http://localhost:8000"), "ws://localhost:8000/ws/stock/chat");
        assert_eq!(ws_url("https://api.example.com/"), "wss://api.example.com/ws/stock/chat");
        assert_eq!(ws_url("wss://h"), "wss://h/ws/stock/chat");
        assert_eq!(ws_url("127.0.0.1:9000"), "ws://127.0.0.1:9000/ws/stock/chat");
    }
}
