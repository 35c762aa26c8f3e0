//! Chat message model.
//!
//! A [`Message`] keeps who wrote it ([`MessageKind`]) apart from whether it
//! asks the user to confirm a trade ([`FeedbackState`]). Both collapse into the
//! single `role` string plus `feedbackResponse` field only at the JSON and
//! database boundary, through [`MessageRecord`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::constants::{ERROR_REPLY_TEXT, FEEDBACK_APPROVE_TEXT, FEEDBACK_REJECT_TEXT};
use crate::ids::MessageId;
use crate::protocol::InboundFrame;
use crate::trading::{TradingAction, ValidatedOrder};

// ─────────────────────────────────────────────────────────────────────────────
// Kind / feedback / role
// ─────────────────────────────────────────────────────────────────────────────

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Typed by the user (or recorded on their behalf).
    User,
    /// Produced by the assistant or synthesised locally.
    Assistant,
}

/// Confirmation status of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedbackState {
    /// Ordinary message, no confirmation involved.
    NotRequested,
    /// Question waiting for the user's approve/reject.
    Pending,
    /// Question the user already answered.
    Answered(bool),
}

/// Legacy single-field encoding used on the wire and in storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// `"user"`
    User,
    /// `"assistant"`
    Assistant,
    /// `"question"`: an assistant message awaiting confirmation.
    Question,
}

impl Role {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Question => "question",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `role` string that is none of the known values.
#[derive(Debug, Error)]
#[error("unknown message role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "question" => Ok(Self::Question),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Knowledge subgraph
// ─────────────────────────────────────────────────────────────────────────────

/// Knowledge subgraph the backend attaches to an answer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    /// Graph nodes.
    #[serde(default)]
    pub node: Vec<GraphNode>,
    /// Directed edges between nodes.
    #[serde(default)]
    pub relation: Vec<GraphRelation>,
}

/// One node of a [`Subgraph`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node label, e.g. `"Company"`.
    #[serde(default)]
    pub node_type: String,
    /// Display name.
    #[serde(default)]
    pub node_name: String,
    /// Free-form attributes.
    #[serde(default)]
    pub properties: Value,
}

/// One edge of a [`Subgraph`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphRelation {
    /// Edge label.
    #[serde(default)]
    pub relationship: String,
    /// Source node reference.
    #[serde(default)]
    pub start: NodeRef,
    /// Target node reference.
    #[serde(default)]
    pub end: NodeRef,
}

/// Reference to a node by name and type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    /// Node name.
    #[serde(default)]
    pub name: String,
    /// Node type.
    #[serde(default, rename = "type")]
    pub node_type: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Message
// ─────────────────────────────────────────────────────────────────────────────

/// A chat message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "MessageRecord", into = "MessageRecord")]
pub struct Message {
    /// Unique id.
    pub id: MessageId,
    /// Author.
    pub kind: MessageKind,
    /// Confirmation status.
    pub feedback: FeedbackState,
    /// Text shown to the user.
    pub content: String,
    /// Creation time (millisecond precision).
    pub timestamp: DateTime<Utc>,
    /// Knowledge subgraph, assistant messages only.
    pub subgraph: Option<Subgraph>,
    /// Proposed order, assistant messages only.
    pub trading_action: Option<TradingAction>,
    /// Error text carried by failed replies.
    pub error: Option<String>,
}

/// Current time truncated to milliseconds, the precision stored on disk.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

impl Message {
    fn base(kind: MessageKind, content: String) -> Self {
        Self {
            id: MessageId::new(),
            kind,
            feedback: FeedbackState::NotRequested,
            content,
            timestamp: now_millis(),
            subgraph: None,
            trading_action: None,
            error: None,
        }
    }

    /// A message typed by the user.
    pub fn user(content: impl Into<String>) -> Self {
        Self::base(MessageKind::User, content.into())
    }

    /// A plain assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::base(MessageKind::Assistant, content.into())
    }

    /// The assistant message built from a terminal backend frame.
    pub fn from_frame(frame: InboundFrame) -> Self {
        let mut msg = Self::assistant(frame.message);
        msg.subgraph = frame.subgraph;
        msg.trading_action = frame.trading_action;
        msg.error = frame.error;
        msg
    }

    /// Confirmation question for a validated order.
    pub fn question(order: &ValidatedOrder) -> Self {
        let mut msg = Self::assistant(order.confirmation_prompt());
        msg.feedback = FeedbackState::Pending;
        msg
    }

    /// The fallback assistant reply shown when a request fails.
    pub fn error_reply(error: impl Into<String>) -> Self {
        let mut msg = Self::assistant(ERROR_REPLY_TEXT);
        msg.error = Some(error.into());
        msg
    }

    /// The user's recorded answer to a confirmation question.
    pub fn feedback_reply(approved: bool) -> Self {
        Self::user(if approved {
            FEEDBACK_APPROVE_TEXT
        } else {
            FEEDBACK_REJECT_TEXT
        })
    }

    /// Legacy role encoding.
    pub fn role(&self) -> Role {
        match (self.kind, self.feedback) {
            (MessageKind::User, _) => Role::User,
            (MessageKind::Assistant, FeedbackState::Pending) => Role::Question,
            (MessageKind::Assistant, _) => Role::Assistant,
        }
    }

    /// `true` for a question still waiting on the user.
    pub fn is_pending_question(&self) -> bool {
        self.kind == MessageKind::Assistant && self.feedback == FeedbackState::Pending
    }

    /// Record the user's answer: the question becomes an ordinary assistant
    /// message that remembers the decision.
    pub fn answer(&mut self, approved: bool) {
        self.kind = MessageKind::Assistant;
        self.feedback = FeedbackState::Answered(approved);
    }

    /// Wire `feedbackResponse`: outer `None` means the field is absent.
    pub fn feedback_response(&self) -> Option<Option<bool>> {
        match self.feedback {
            FeedbackState::NotRequested => None,
            FeedbackState::Pending => Some(None),
            FeedbackState::Answered(b) => Some(Some(b)),
        }
    }

    /// Rebuild `kind` and `feedback` from the legacy encoding.
    pub fn split_role(
        role: Role,
        feedback_response: Option<Option<bool>>,
    ) -> (MessageKind, FeedbackState) {
        match (role, feedback_response) {
            (Role::User, _) => (MessageKind::User, FeedbackState::NotRequested),
            (_, Some(Some(b))) => (MessageKind::Assistant, FeedbackState::Answered(b)),
            (Role::Question, _) => (MessageKind::Assistant, FeedbackState::Pending),
            (Role::Assistant, _) => (MessageKind::Assistant, FeedbackState::NotRequested),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire record
// ─────────────────────────────────────────────────────────────────────────────

/// Serialized form of a [`Message`].
///
/// `feedbackResponse` distinguishes absent (`None`) from `null`
/// (`Some(None)`), which marks a pending question.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Message id.
    pub id: MessageId,
    /// Legacy role.
    pub role: Role,
    /// Text.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Knowledge subgraph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph: Option<Subgraph>,
    /// Proposed order.
    #[serde(
        default,
        rename = "trading_action",
        alias = "tradingAction",
        skip_serializing_if = "Option::is_none"
    )]
    pub trading_action: Option<TradingAction>,
    /// Error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Confirmation answer.
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub feedback_response: Option<Option<bool>>,
}

fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<bool>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<bool>::deserialize(deserializer).map(Some)
}

impl From<Message> for MessageRecord {
    fn from(msg: Message) -> Self {
        Self {
            role: msg.role(),
            feedback_response: msg.feedback_response(),
            id: msg.id,
            content: msg.content,
            timestamp: msg.timestamp,
            subgraph: msg.subgraph,
            trading_action: msg.trading_action,
            error: msg.error,
        }
    }
}

impl From<MessageRecord> for Message {
    fn from(rec: MessageRecord) -> Self {
        let (kind, feedback) = Message::split_role(rec.role, rec.feedback_response);
        Self {
            id: rec.id,
            kind,
            feedback,
            content: rec.content,
            timestamp: rec.timestamp,
            subgraph: rec.subgraph,
            trading_action: rec.trading_action,
            error: rec.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roles_collapse_from_kind_and_feedback() {
        let mut q = Message::assistant("q?");
        q.feedback = FeedbackState::Pending;
        assert_eq!(q.role(), Role::Question);
        q.answer(false);
        assert_eq!(q.role(), Role::Assistant);
        assert_eq!(Message::user("hi").role(), Role::User);
    }

    #[test]
    fn pending_question_serializes_null_feedback() {
        let mut q = Message::assistant("q?");
        q.feedback = FeedbackState::Pending;
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v["role"], "question");
        assert!(v.as_object().unwrap().contains_key("feedbackResponse"));
        assert_eq!(v["feedbackResponse"], Value::Null);
    }

    #[test]
    fn plain_messages_omit_feedback() {
        let v = serde_json::to_value(Message::user("hello")).unwrap();
        assert!(!v.as_object().unwrap().contains_key("feedbackResponse"));
        assert!(!v.as_object().unwrap().contains_key("trading_action"));
    }

    #[test]
    fn answered_question_round_trips() {
        let mut q = Message::assistant("q?");
        q.answer(true);
        let text = serde_json::to_string(&q).unwrap();
        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back.feedback, FeedbackState::Answered(true));
        assert_eq!(back, q);
    }

    #[test]
    fn parses_legacy_json() {
        let v = json!({
            "id": "m1",
            "role": "question",
            "content": "이 분석 결과에 따라 005930 10주를 매수하시겠습니까?",
            "timestamp": "2024-05-01T09:00:00.000Z",
            "feedbackResponse": null
        });
        let msg: Message = serde_json::from_value(v).unwrap();
        assert!(msg.is_pending_question());
    }

    #[test]
    fn assistant_with_null_feedback_is_plain() {
        let (kind, fb) = Message::split_role(Role::Assistant, Some(None));
        assert_eq!(kind, MessageKind::Assistant);
        assert_eq!(fb, FeedbackState::NotRequested);
    }

    #[test]
    fn error_reply_carries_error_text() {
        let msg = Message::error_reply("socket closed");
        assert_eq!(msg.content, ERROR_REPLY_TEXT);
        assert_eq!(msg.error.as_deref(), Some("socket closed"));
        assert_eq!(msg.kind, MessageKind::Assistant);
    }

    #[test]
    fn feedback_replies() {
        assert_eq!(Message::feedback_reply(true).content, FEEDBACK_APPROVE_TEXT);
        assert_eq!(Message::feedback_reply(false).content, FEEDBACK_REJECT_TEXT);
        assert_eq!(Message::feedback_reply(false).kind, MessageKind::User);
    }

    #[test]
    fn from_frame_keeps_payloads() {
        let frame: InboundFrame = serde_json::from_value(json!({
            "message": "분석 결과",
            "subgraph": {"node": [{"node_type": "Company", "node_name": "삼성전자", "properties": {}}],
                         "relation": []},
            "trading_action": {"order_side": "buy", "stock_code": "005930"}
        }))
        .unwrap();
        let msg = Message::from_frame(frame);
        assert_eq!(msg.content, "분석 결과");
        assert_eq!(msg.subgraph.unwrap().node[0].node_name, "삼성전자");
        assert!(msg.trading_action.unwrap().is_valid());
    }

    #[test]
    fn role_parses_from_str() {
        assert_eq!("question".parse::<Role>().unwrap(), Role::Question);
        assert!("system".parse::<Role>().is_err());
    }
}
