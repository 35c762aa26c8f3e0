//! The REST client against a live server: both sides of the gateway contract.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use stockchat_client::HttpGateway;
use stockchat_core::{
    AuthGateway, ConversationId, FeedbackState, GatewayError, Message, MessageId,
    PersistenceGateway,
};
use stockchat_server::{ServerConfig, StockchatServer};
use stockchat_store::{ChatStore, SqliteAuthGateway, SqliteGateway};
use tokio::task::JoinHandle;

struct Running {
    server: StockchatServer,
    handle: JoinHandle<()>,
    url: String,
    auth: Arc<SqliteAuthGateway>,
}

impl Running {
    async fn stop(self) {
        self.server.shutdown(self.handle, Duration::from_secs(5)).await;
    }
}

async fn start(config: ServerConfig) -> Running {
    let store = Arc::new(ChatStore::open_in_memory().unwrap());
    let auth = Arc::new(SqliteAuthGateway::new(Arc::clone(&store)));
    let server = StockchatServer::new(
        config,
        Arc::new(SqliteGateway::new(store)),
        auth.clone(),
    );
    let (addr, handle) = server.listen().await.unwrap();
    Running {
        server,
        handle,
        url: format!("http://{addr}"),
        auth,
    }
}

#[tokio::test]
async fn http_gateway_round_trip() {
    let running = start(ServerConfig::default()).await;
    let gw = HttpGateway::new(running.url.clone());

    let conv = gw.create_conversation(1).await.unwrap();
    let user = Message::user("삼성전자 사줘");
    let _ = gw.save_message(&conv.id, &user).await.unwrap();
    let mut question = Message::assistant("이 분석 결과에 따라 005930 10주를 매수하시겠습니까?");
    question.feedback = FeedbackState::Pending;
    let _ = gw.save_message(&conv.id, &question).await.unwrap();

    let page = gw.get_messages(&conv.id, 1, 10).await.unwrap();
    assert_eq!(page.total_count, 2);
    assert_eq!(page.messages, vec![user, question.clone()]);

    assert_eq!(gw.save_feedback(&conv.id, &question.id, true).await.unwrap(), 1);
    let page = gw.get_messages(&conv.id, 1, 10).await.unwrap();
    assert_eq!(page.messages[1].feedback, FeedbackState::Answered(true));

    let list = gw.list_conversations(1, 10).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].message_count, 2);

    let renamed = gw.rename_conversation(&conv.id, "삼성전자").await.unwrap();
    assert_eq!(renamed.title, "삼성전자");
    assert_eq!(gw.get_conversation(&conv.id).await.unwrap(), renamed);
    assert_matches!(
        gw.rename_conversation(&conv.id, "").await,
        Err(GatewayError::Invalid(_))
    );

    gw.delete_conversation(&conv.id).await.unwrap();
    assert_matches!(
        gw.get_messages(&conv.id, 1, 10).await,
        Err(GatewayError::NotFound(id)) if id == conv.id.as_str()
    );
    assert_matches!(
        gw.delete_conversation(&ConversationId::from("missing")).await,
        Err(GatewayError::NotFound(_))
    );

    running.stop().await;
}

#[tokio::test]
async fn tokens_scope_and_guard_requests() {
    let running = start(ServerConfig {
        require_auth: true,
        ..ServerConfig::default()
    })
    .await;
    let url = running.url.clone();
    let token = running.auth.issue(9).await.unwrap();

    let anonymous = HttpGateway::new(url.clone());
    assert_matches!(
        anonymous.create_conversation(1).await,
        Err(GatewayError::Unauthorized)
    );

    let bogus = HttpGateway::new(url.clone()).with_token("not-a-token");
    assert_matches!(
        bogus.list_conversations(1, 10).await,
        Err(GatewayError::Unauthorized)
    );

    let user = HttpGateway::new(url).with_token(token);
    let conv = user.create_conversation(1).await.unwrap();
    assert_eq!(conv.user_id, 9);
    assert_eq!(user.list_conversations(9, 10).await.unwrap().len(), 1);

    running.stop().await;
}

#[tokio::test]
async fn conversations_are_private_to_their_owner() {
    let running = start(ServerConfig {
        require_auth: true,
        ..ServerConfig::default()
    })
    .await;
    let owner = HttpGateway::new(running.url.clone())
        .with_token(running.auth.issue(1).await.unwrap());
    let other = HttpGateway::new(running.url.clone())
        .with_token(running.auth.issue(2).await.unwrap());

    let conv = owner.create_conversation(1).await.unwrap();
    let _ = owner
        .save_message(&conv.id, &Message::user("삼성전자 사줘"))
        .await
        .unwrap();

    assert_matches!(
        other.get_conversation(&conv.id).await,
        Err(GatewayError::NotFound(_))
    );
    assert_matches!(
        other.get_messages(&conv.id, 1, 10).await,
        Err(GatewayError::NotFound(_))
    );
    assert_matches!(
        other.save_message(&conv.id, &Message::user("끼어들기")).await,
        Err(GatewayError::NotFound(_))
    );
    assert_matches!(
        other.save_feedback(&conv.id, &MessageId::from("m1"), true).await,
        Err(GatewayError::NotFound(_))
    );
    assert_matches!(
        other.rename_conversation(&conv.id, "탈취").await,
        Err(GatewayError::NotFound(_))
    );
    assert_matches!(
        other.delete_conversation(&conv.id).await,
        Err(GatewayError::NotFound(_))
    );
    assert!(other.list_conversations(2, 10).await.unwrap().is_empty());

    let list = owner.list_conversations(1, 10).await.unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].title, conv.title);
    assert_eq!(list[0].message_count, 1);

    running.stop().await;
}
