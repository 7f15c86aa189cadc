mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use common::*;
use sitesage::answer::NOT_INITIALIZED;
use sitesage::engine::AnswerEngine;
use sitesage::server::serve;
use tokio::net::TcpListener;

async fn start(engine: AnswerEngine) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(Arc::new(engine), listener));
    addr
}

#[tokio::test]
async fn test_health() {
    let addr = start(default_engine()).await;
    let body: serde_json::Value = reqwest::get(format!("http://{addr}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "sitesage");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_chat_answers_from_knowledge() {
    let engine = default_engine();
    engine.initialize(&knowledge(tax_pages()).await).await;
    let addr = start(engine).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/api/chat"))
        .json(&serde_json::json!({"message": "tax credits carryforward"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["response"]
        .as_str()
        .unwrap()
        .contains("carry forward 20 years"));
    assert_eq!(body["sources"][0], "https://acme.com/tax-credits/overview");
}

#[tokio::test]
async fn test_chat_before_initialize() {
    let addr = start(default_engine()).await;

    let body: serde_json::Value = reqwest::Client::new()
        .post(format!("http://{addr}/api/chat"))
        .json(&serde_json::json!({"message": "hello"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["response"], NOT_INITIALIZED);
    assert_eq!(body["sources"], serde_json::json!([]));
}

#[tokio::test]
async fn test_chat_rejects_empty_and_malformed_messages() {
    let addr = start(default_engine()).await;
    let client = reqwest::Client::new();

    for payload in [
        serde_json::json!({"message": "   "}),
        serde_json::json!({"text": "wrong field"}),
    ] {
        let resp = client
            .post(format!("http://{addr}/api/chat"))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");
    }
}
