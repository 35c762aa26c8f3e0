//! Gateway contract tests against the `SQLite` store.

use std::sync::Arc;

use assert_matches::assert_matches;
use stockchat_core::{
    AuthGateway, ConversationId, FeedbackState, GatewayError, Message, PersistenceGateway,
};
use stockchat_store::{ChatStore, SqliteAuthGateway, SqliteGateway};

fn gateway() -> SqliteGateway {
    SqliteGateway::new(Arc::new(ChatStore::open_in_memory().unwrap()))
}

#[tokio::test]
async fn conversation_lifecycle() {
    let gw = gateway();
    let conv = gw.create_conversation(1).await.unwrap();
    let user = Message::user("삼성전자 사줘");
    let _ = gw.save_message(&conv.id, &user).await.unwrap();

    let page = gw.get_messages(&conv.id, 1, 10).await.unwrap();
    assert_eq!(page.messages, vec![user]);
    assert!(!page.has_more);

    let renamed = gw.rename_conversation(&conv.id, "삼성전자").await.unwrap();
    assert_eq!(renamed.title, "삼성전자");
    assert_eq!(gw.get_conversation(&conv.id).await.unwrap(), renamed);

    gw.delete_conversation(&conv.id).await.unwrap();
    assert_matches!(
        gw.get_messages(&conv.id, 1, 10).await,
        Err(GatewayError::NotFound(_))
    );
}

#[tokio::test]
async fn unknown_conversation_is_not_found() {
    let gw = gateway();
    let missing = ConversationId::from("missing");
    assert_matches!(
        gw.save_message(&missing, &Message::user("x")).await,
        Err(GatewayError::NotFound(id)) if id == "missing"
    );
    assert_matches!(
        gw.rename_conversation(&missing, "t").await,
        Err(GatewayError::NotFound(_))
    );
    assert_matches!(
        gw.get_conversation(&missing).await,
        Err(GatewayError::NotFound(id)) if id == "missing"
    );
}

#[tokio::test]
async fn feedback_round_trip() {
    let gw = gateway();
    let conv = gw.create_conversation(1).await.unwrap();
    let mut question = Message::assistant("이 분석 결과에 따라 005930 10주를 매수하시겠습니까?");
    question.feedback = FeedbackState::Pending;
    let _ = gw.save_message(&conv.id, &question).await.unwrap();

    assert_eq!(gw.save_feedback(&conv.id, &question.id, false).await.unwrap(), 1);
    let page = gw.get_messages(&conv.id, 1, 10).await.unwrap();
    assert_eq!(page.messages[0].feedback, FeedbackState::Answered(false));
    assert!(!page.messages[0].is_pending_question());
}

#[tokio::test]
async fn list_is_most_recent_first() {
    let gw = gateway();
    let first = gw.create_conversation(1).await.unwrap();
    let second = gw.create_conversation(1).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let _ = gw.save_message(&first.id, &Message::user("older one, now active")).await.unwrap();

    let list = gw.list_conversations(1, 10).await.unwrap();
    let ids: Vec<_> = list.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chat.db");
    let conv_id = {
        let gw = SqliteGateway::new(Arc::new(ChatStore::open_file(&path).unwrap()));
        let conv = gw.create_conversation(1).await.unwrap();
        let _ = gw.save_message(&conv.id, &Message::user("hello")).await.unwrap();
        conv.id
    };
    let gw = SqliteGateway::new(Arc::new(ChatStore::open_file(&path).unwrap()));
    let page = gw.get_messages(&conv_id, 1, 10).await.unwrap();
    assert_eq!(page.total_count, 1);
}

#[tokio::test]
async fn auth_sessions() {
    let auth = SqliteAuthGateway::new(Arc::new(ChatStore::open_in_memory().unwrap()));
    let token = auth.issue(3).await.unwrap();
    assert_eq!(auth.validate(&token).await.unwrap(), Some(3));
    auth.revoke(&token).await.unwrap();
    assert_eq!(auth.validate(&token).await.unwrap(), None);
    auth.revoke("never-issued").await.unwrap();
}
