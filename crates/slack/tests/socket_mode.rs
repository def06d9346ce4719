use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{json, Value};
use slashbot_slack::{
    api::SlackApiClient,
    events::default_dispatcher,
    socket::{SocketError, TransportError},
    websocket::WebSocketTransport,
    GreetingCommandService, SocketModeRunner,
};
use tokio::{net::TcpListener, sync::oneshot};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn slack_api(connections_open: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/apps.connections.open"))
        .and(header("authorization", "Bearer xapp-1-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(connections_open))
        .mount(&server)
        .await;
    server
}

fn runner_for(api: &MockServer) -> SocketModeRunner {
    let client = SlackApiClient::new(api.uri()).expect("client");
    let transport =
        Arc::new(WebSocketTransport::new(client, SecretString::from("xapp-1-test".to_owned())));
    SocketModeRunner::new(transport, default_dispatcher(Arc::new(GreetingCommandService)))
}

fn text(value: Value) -> Message {
    Message::Text(value.to_string().into())
}

#[tokio::test]
async fn slash_command_is_answered_in_the_ack() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let ws_url = format!("ws://{}/link", listener.local_addr().expect("local addr"));
    let api = slack_api(json!({ "ok": true, "url": ws_url })).await;

    let (done_tx, done_rx) = oneshot::channel::<()>();
    let slack = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(tcp).await.expect("handshake");
        ws.send(text(json!({ "type": "hello", "num_connections": 1 }))).await.expect("hello");
        ws.send(text(json!({
            "envelope_id": "env-1",
            "type": "slash_commands",
            "accepts_response_payload": true,
            "payload": {
                "user_id": "U1",
                "user_name": "alice",
                "command": "/hello",
                "text": "world"
            }
        })))
        .await
        .expect("envelope");

        let ack = loop {
            match ws.next().await.expect("ack frame").expect("read") {
                Message::Text(body) => {
                    break serde_json::from_str::<Value>(body.as_str()).expect("ack json")
                }
                _ => continue,
            }
        };
        let _ = done_tx.send(());
        while let Some(Ok(_)) = ws.next().await {}
        ack
    });

    runner_for(&api)
        .run(async {
            let _ = done_rx.await;
        })
        .await
        .expect("clean shutdown");

    let ack = slack.await.expect("slack task");
    assert_eq!(
        ack,
        json!({
            "envelope_id": "env-1",
            "payload": { "text": "Hello, alice cmd/hello world", "response_type": "in_channel" }
        })
    );
}

#[tokio::test]
async fn server_close_ends_the_run_with_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let ws_url = format!("ws://{}/link", listener.local_addr().expect("local addr"));
    let api = slack_api(json!({ "ok": true, "url": ws_url })).await;

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let mut ws = accept_async(tcp).await.expect("handshake");
        ws.send(text(json!({ "type": "hello", "num_connections": 1 }))).await.expect("hello");
        let _ = ws.close(None).await;
    });

    let result = runner_for(&api).run(std::future::pending::<()>()).await;

    assert_eq!(result, Err(SocketError::StreamClosed));
}

#[tokio::test]
async fn rejected_app_token_fails_to_connect() {
    let api = slack_api(json!({ "ok": false, "error": "invalid_auth" })).await;

    let result = runner_for(&api).run(std::future::pending::<()>()).await;

    assert!(
        matches!(result, Err(SocketError::Transport(TransportError::Connect(ref message)))
            if message.contains("invalid_auth")),
        "unexpected result: {result:?}"
    );
}
