//! Fixed protocol strings and user-facing texts.

/// Status phrases the backend streams while a request is still in progress.
///
/// A frame whose `message` equals one of these exactly is interim; any other
/// text marks the frame terminal.
pub const INTERIM_SENTINELS: [&str; 4] = [
    "요청을 처리 중입니다. 잠시만 기다려주세요...",
    "데이터 분석 중입니다...",
    "시장 동향을 파악하고 있습니다...",
    "투자 전략을 수립 중입니다...",
];

/// Client-local storage key holding the active conversation id.
pub const CONVERSATION_STORAGE_KEY: &str = "currentConversationId";

/// Default title given to freshly created conversations.
pub const DEFAULT_CONVERSATION_TITLE: &str = "새 대화";

/// Content of the synthetic assistant message produced on failure.
pub const ERROR_REPLY_TEXT: &str = "죄송합니다, 응답을 처리하는 중에 오류가 발생했습니다.";

/// User reply recorded when a proposed trade is approved.
pub const FEEDBACK_APPROVE_TEXT: &str = "예, 진행합니다";

/// User reply recorded when a proposed trade is rejected.
pub const FEEDBACK_REJECT_TEXT: &str = "아니오";

/// Path of the chat socket on the inference backend.
pub const CHAT_SOCKET_PATH: &str = "/ws/stock/chat";

/// Length (in characters) of the first-message preview in conversation lists.
pub const PREVIEW_CHARS: usize = 50;

/// Returns `true` when `message` is one of the interim status phrases.
pub fn is_interim(message: &str) -> bool {
    INTERIM_SENTINELS.contains(&message)
}
