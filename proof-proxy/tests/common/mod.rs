#![allow(dead_code)]

/// Shared fixtures for integration tests
/// Mock zkfetch wrapper and attestation service built on wiremock

use std::time::Duration;

use proof_proxy::{AttestationConfig, ProxyConfig, ProxyKind, ZkfetchToolOptions};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const PROOF_ID: &str = "proof_7f3a";

/// zkfetch envelope around `data`
pub fn proof_envelope(data: Value, verified: bool, extracted: Value) -> Value {
    json!({
        "data": data,
        "proof": {
            "claimData": {
                "provider": "http",
                "parameters": "{}",
                "owner": "0x2f0e8e8b5a5c3e41",
                "timestampS": 1_735_000_000u64,
                "context": "{}",
                "identifier": "0xclaim01",
                "epoch": 1
            },
            "identifier": "0xclaim01",
            "signatures": ["0xsig01"],
            "witnesses": [{"id": "0xwitness", "url": "wss://witness.example/ws"}],
            "extractedParameterValues": extracted
        },
        "verified": verified,
        "onchainCompatible": true
    })
}

/// Plays a tool server behind the zkfetch wrapper: answers each
/// `tools/call` with the (masked) arguments it was sent plus a booking id.
pub struct EchoToolServer;

impl Respond for EchoToolServer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let payload: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let mut echoed = payload
            .pointer("/body/params/arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));
        echoed["booking_id"] = json!("BK-1042");

        let data = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"content": [{"type": "text", "text": echoed.to_string()}]}
        });
        ResponseTemplate::new(200).set_body_json(proof_envelope(
            data,
            true,
            json!({"booking_id": "BK-1042", "passenger_name": "{passenger_name}"}),
        ))
    }
}

pub async fn mount_zkfetch(server: &MockServer, envelope: Value) {
    Mock::given(method("POST"))
        .and(path("/zkfetch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope))
        .mount(server)
        .await;
}

pub async fn mount_attestation(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/proofs/submit"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "proof_id": PROOF_ID})),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub fn tool_call_config(zkfetch: &MockServer) -> ProxyConfig {
    ProxyConfig::new(zkfetch.uri(), ProxyKind::ToolCall)
        .with_tool_options_map(proof_proxy::shared::default_tool_options_map())
        .with_default_options(ZkfetchToolOptions::default())
        .with_proof_timeout(Duration::from_secs(5))
}

pub fn direct_fetch_config(zkfetch: &MockServer, defaults: Value) -> ProxyConfig {
    ProxyConfig::new(zkfetch.uri(), ProxyKind::DirectFetch)
        .with_default_options(ZkfetchToolOptions::from_json(defaults).unwrap())
        .with_proof_timeout(Duration::from_secs(5))
}

pub fn attestation(server: &MockServer) -> AttestationConfig {
    AttestationConfig::with_stage(server.uri(), "booking")
        .with_session("sess_test")
        .with_submitter("agent-a")
        .with_timeout(Duration::from_secs(2))
}

/// Raw bodies of every request a mock server received
pub async fn received_bodies(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
        .collect()
}

/// Server that answers every request with `200` headers announcing a large
/// body, sends one byte of it, then goes silent. Returns its base URL.
pub async fn stalling_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 64 * 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100000\r\n\r\n{",
                    )
                    .await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    });

    format!("http://{}", addr)
}
