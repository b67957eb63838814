mod common;

use std::time::Duration;

use futures_util::StreamExt;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use uuid::Uuid;

use skillswap_server::models::{CreateSwapRequest, RegisterRequest};

fn registration(name: &str, email: &str) -> RegisterRequest {
    serde_json::from_value(common::registration(name, email)).expect("registration")
}

#[tokio::test]
async fn swap_request_is_pushed_to_the_recipient() {
    let (app, state) = common::test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move { axum::serve(listener, app).await });

    let requester = state
        .auth_service
        .register(registration("Ada Lovelace", "ada@example.com"))
        .await
        .expect("register");
    let recipient = state
        .auth_service
        .register(registration("Alan Turing", "alan@example.com"))
        .await
        .expect("register");

    let url = format!("ws://{addr}/ws?token={}", recipient.token);
    let (mut socket, _) = connect_async(url).await.expect("connect");

    let registered = async {
        while !state.ws_state.is_connected(recipient.user.id).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), registered)
        .await
        .expect("socket registered");

    state
        .swap_service
        .request_swap(
            requester.user.id,
            CreateSwapRequest {
                recipient_id: recipient.user.id,
                requested_skill: "Guitar".to_string(),
                offered_skill: "Python".to_string(),
                message: None,
                scheduled_date: None,
            },
        )
        .await
        .expect("request swap");

    let mut events = Vec::new();
    while events.len() < 2 {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame in time")
            .expect("stream open")
            .expect("frame");
        if let Message::Text(text) = frame {
            let value: serde_json::Value = serde_json::from_str(&text).expect("json");
            events.push(value["event"].as_str().unwrap_or_default().to_string());
        }
    }
    assert!(events.contains(&"new_swap_request".to_string()));
    assert!(events.contains(&"notification_received".to_string()));
}

#[tokio::test]
async fn invalid_token_is_refused() {
    let (app, _) = common::test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move { axum::serve(listener, app).await });

    let url = format!("ws://{addr}/ws?token={}", Uuid::new_v4());
    assert!(connect_async(url).await.is_err());
}

#[tokio::test]
async fn banned_user_is_refused() {
    let (app, state) = common::test_app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move { axum::serve(listener, app).await });

    let banned = state
        .auth_service
        .register(registration("Mallory Smith", "mallory@example.com"))
        .await
        .expect("register");
    state
        .user_service
        .set_banned(banned.user.id, true, Some("spam".to_string()))
        .await
        .expect("ban");

    let url = format!("ws://{addr}/ws?token={}", banned.token);
    match connect_async(url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 403)
        }
        Err(e) => panic!("unexpected handshake error: {e}"),
        Ok(_) => panic!("banned user opened a socket"),
    }
    assert!(!state.ws_state.is_connected(banned.user.id).await);
}
