//! Integration tests for the bridgeward daemon.
//!
//! These tests start a real bridge server on a loopback port and talk to it
//! over TCP to verify the authentication handshake, gating, and rate
//! limiting end to end.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use uuid::Uuid;

use bridgeward::auth::{
    AuthenticationManager, ClientInfo, IpReputationTracker, IssuedToken, ReputationPolicy,
    RevocationLedger, SecretKeyStore, TokenService,
};
use bridgeward::config::Settings;
use bridgeward::dispatch::DispatchRegistry;
use bridgeward::socket::BridgeServer;

/// Test bridge instance.
struct TestBridge {
    addr: SocketAddr,
    auth: Arc<AuthenticationManager>,
    _temp_dir: TempDir,
}

impl TestBridge {
    async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    async fn start_with(customize: impl FnOnce(&mut Settings)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        let mut settings = Settings::default();
        settings.listen.addr = "127.0.0.1:0".to_string();
        settings.paths.state_dir = temp_dir.path().join("state");
        settings.audit.enabled = false;
        settings.security.auth_deadline_seconds = 5;
        customize(&mut settings);
        let settings = Arc::new(settings);

        let auth = build_auth(&settings);
        let dispatch = Arc::new(DispatchRegistry::with_defaults());

        let server = BridgeServer::bind(Arc::clone(&settings), Arc::clone(&auth), dispatch)
            .await
            .expect("Failed to bind bridge server");
        let addr = server.local_addr().expect("Failed to read bound address");

        let shutdown = Arc::new(tokio::sync::Notify::new());
        let shutdown_for_run = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if let Err(e) = server.run(shutdown_for_run).await {
                eprintln!("Bridge server error: {}", e);
            }
        });

        // Wait for the accept loop to come up.
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            addr,
            auth,
            _temp_dir: temp_dir,
        }
    }

    fn issue_token(&self) -> IssuedToken {
        self.auth
            .request_token(ClientInfo {
                name: "tui".to_string(),
                version: "1.0".to_string(),
                platform: "linux".to_string(),
            })
            .expect("Failed to issue token")
    }

    fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(self.addr).expect("Failed to connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .expect("Failed to set read timeout");
        stream
            .set_write_timeout(Some(Duration::from_secs(10)))
            .expect("Failed to set write timeout");
        stream
    }
}

fn build_auth(settings: &Settings) -> Arc<AuthenticationManager> {
    let secret = SecretKeyStore::load_or_create(&settings.paths.secret_path())
        .expect("Failed to create secret");
    let ledger = Arc::new(RevocationLedger::load(settings.paths.revocation_path()));
    let reputation = Arc::new(IpReputationTracker::load(
        settings.paths.block_list_path(),
        ReputationPolicy::from_settings(&settings.security),
    ));
    let tokens = TokenService::new(
        &secret,
        Duration::from_secs(settings.security.token_ttl_seconds),
        Arc::clone(&ledger),
    );
    Arc::new(AuthenticationManager::new(tokens, reputation, ledger, None))
}

fn send_frame(stream: &mut TcpStream, payload: &[u8]) {
    let length = (payload.len() as u32).to_be_bytes();
    stream.write_all(&length).expect("Failed to write length");
    stream.write_all(payload).expect("Failed to write payload");
    stream.flush().expect("Failed to flush");
}

fn send_message(stream: &mut TcpStream, message: &Value) {
    let payload = serde_json::to_vec(message).expect("Failed to serialize message");
    send_frame(stream, &payload);
}

fn read_response(stream: &mut TcpStream) -> Value {
    let mut length_bytes = [0u8; 4];
    stream
        .read_exact(&mut length_bytes)
        .expect("Failed to read response length");
    let length = u32::from_be_bytes(length_bytes) as usize;

    let mut payload = vec![0u8; length];
    stream
        .read_exact(&mut payload)
        .expect("Failed to read response payload");

    serde_json::from_slice(&payload).expect("Failed to parse response")
}

/// True once the server has closed its end of the connection.
fn connection_closed(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 1];
    matches!(stream.read(&mut buf), Ok(0))
}

fn authenticate(stream: &mut TcpStream, token: &str) -> Value {
    send_message(stream, &json!({"type": "auth", "token": token}));
    read_response(stream)
}

fn error_code(response: &Value) -> &str {
    response["error"]["code"].as_str().unwrap_or("")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_auth_handshake_and_ping() {
    let bridge = TestBridge::start().await;
    let token = bridge.issue_token();
    let mut stream = bridge.connect();

    let response = authenticate(&mut stream, &token.token);
    assert_eq!(response["success"], true, "response: {}", response);
    assert_eq!(response["data"]["authenticated"], true);
    assert_eq!(response["data"]["expires_at"], token.claims.exp);

    send_message(&mut stream, &json!({"type": "ping"}));
    let response = read_response(&mut stream);
    assert_eq!(response["success"], true);
    assert_eq!(response["data"]["pong"], true);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_command_dispatch_after_auth() {
    let bridge = TestBridge::start().await;
    let token = bridge.issue_token();
    let mut stream = bridge.connect();

    authenticate(&mut stream, &token.token);

    let id = Uuid::new_v4();
    send_message(
        &mut stream,
        &json!({"type": "command", "id": id, "name": "ping", "params": {}}),
    );
    let response = read_response(&mut stream);
    assert_eq!(response["success"], true);
    assert_eq!(response["request_id"], id.to_string());
    assert_eq!(response["data"]["client"], "tui");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_command_rejected() {
    let bridge = TestBridge::start().await;
    let token = bridge.issue_token();
    let mut stream = bridge.connect();

    authenticate(&mut stream, &token.token);

    send_message(
        &mut stream,
        &json!({"type": "command", "id": Uuid::new_v4(), "name": "fs.delete_everything"}),
    );
    let response = read_response(&mut stream);
    assert_eq!(response["success"], false);
    assert_eq!(error_code(&response), "UNKNOWN_COMMAND");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_token_rejected_but_connection_survives() {
    let bridge = TestBridge::start().await;
    let token = bridge.issue_token();
    let mut stream = bridge.connect();

    let mut tampered = token.token.clone();
    tampered.truncate(tampered.len() - 4);
    tampered.push_str("AAAA");

    let response = authenticate(&mut stream, &tampered);
    assert_eq!(response["success"], false);
    assert_eq!(error_code(&response), "AUTH_INVALID");

    // The failure was message-terminal; a good credential still works.
    let response = authenticate(&mut stream, &token.token);
    assert_eq!(response["success"], true);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_revoked_token_rejected() {
    let bridge = TestBridge::start().await;
    let token = bridge.issue_token();

    bridge
        .auth
        .revoke_token(&token.claims.jti, "integration test")
        .unwrap();

    let mut stream = bridge.connect();
    let response = authenticate(&mut stream, &token.token);
    assert_eq!(response["success"], false);
    assert_eq!(error_code(&response), "AUTH_REVOKED");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_command_before_auth_rejected() {
    let bridge = TestBridge::start().await;
    let mut stream = bridge.connect();

    send_message(
        &mut stream,
        &json!({"type": "command", "id": Uuid::new_v4(), "name": "ping"}),
    );
    let response = read_response(&mut stream);
    assert_eq!(response["success"], false);
    assert_eq!(error_code(&response), "NOT_AUTHENTICATED");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_message_rejected() {
    let bridge = TestBridge::start().await;
    let token = bridge.issue_token();
    let mut stream = bridge.connect();

    send_frame(&mut stream, br#"{"no_type_tag": true}"#);
    let response = read_response(&mut stream);
    assert_eq!(response["success"], false);
    assert_eq!(error_code(&response), "MALFORMED_MESSAGE");

    // The frame itself was well-formed, so the stream is still usable.
    let response = authenticate(&mut stream, &token.token);
    assert_eq!(response["success"], true);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_frame_closes_connection() {
    let bridge = TestBridge::start_with(|settings| {
        settings.limits.max_message_size = 1024;
    })
    .await;
    let mut stream = bridge.connect();

    // Declare a 2 KiB frame without sending it.
    stream
        .write_all(&2048u32.to_be_bytes())
        .expect("Failed to write length");
    stream.flush().unwrap();

    let response = read_response(&mut stream);
    assert_eq!(response["success"], false);
    assert_eq!(error_code(&response), "PAYLOAD_TOO_LARGE");
    assert!(connection_closed(&mut stream));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_compressed_payload_rejected() {
    let bridge = TestBridge::start().await;
    let mut stream = bridge.connect();

    // gzip magic followed by junk.
    send_frame(&mut stream, &[0x1f, 0x8b, 0x08, 0x00, 0x01, 0x02]);

    let response = read_response(&mut stream);
    assert_eq!(response["success"], false);
    assert_eq!(error_code(&response), "COMPRESSED_PAYLOAD");
    assert!(connection_closed(&mut stream));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rate_limit_rejects_excess_messages() {
    let bridge = TestBridge::start_with(|settings| {
        settings.limits.messages_per_window = 3;
    })
    .await;
    let token = bridge.issue_token();
    let mut stream = bridge.connect();

    authenticate(&mut stream, &token.token);

    for _ in 0..3 {
        send_message(&mut stream, &json!({"type": "ping"}));
        let response = read_response(&mut stream);
        assert_eq!(response["success"], true);
    }

    send_message(&mut stream, &json!({"type": "ping"}));
    let response = read_response(&mut stream);
    assert_eq!(response["success"], false);
    assert_eq!(error_code(&response), "RATE_LIMITED");

    // Rejected, not disconnected: the next message still gets a response.
    send_message(&mut stream, &json!({"type": "ping"}));
    let response = read_response(&mut stream);
    assert_eq!(error_code(&response), "RATE_LIMITED");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocked_source_is_disconnected() {
    let bridge = TestBridge::start().await;
    let token = bridge.issue_token();

    bridge
        .auth
        .block_address("127.0.0.1".parse().unwrap(), "integration test")
        .unwrap();

    let mut stream = bridge.connect();
    let response = authenticate(&mut stream, &token.token);
    assert_eq!(response["success"], false);
    assert_eq!(error_code(&response), "AUTH_BLOCKED");
    assert!(connection_closed(&mut stream));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_auth_deadline_closes_idle_connection() {
    let bridge = TestBridge::start_with(|settings| {
        settings.security.auth_deadline_seconds = 1;
    })
    .await;
    let mut stream = bridge.connect();

    std::thread::sleep(Duration::from_millis(1500));
    assert!(connection_closed(&mut stream));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_block_and_revocation_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let mut settings = Settings::default();
    settings.paths.state_dir = temp_dir.path().join("state");
    settings.audit.enabled = false;

    let token = {
        let auth = build_auth(&settings);
        let token = auth
            .request_token(ClientInfo {
                name: "tui".to_string(),
                version: "1.0".to_string(),
                platform: "linux".to_string(),
            })
            .unwrap();
        auth.block_address("203.0.113.9".parse().unwrap(), "before restart")
            .unwrap();
        auth.revoke_token(&token.claims.jti, "before restart").unwrap();
        token
    };

    // Same state directory, fresh process state.
    let auth = build_auth(&settings);
    assert!(auth.reputation().is_blocked("203.0.113.9".parse().unwrap()));

    let result = auth.authenticate(&token.token, "198.51.100.1".parse().unwrap());
    let err = result.expect_err("revocation must survive restart");
    assert_eq!(err.code(), "AUTH_REVOKED");
}
