//! Integration tests for the vault HTTP API.

use std::{net::SocketAddr, sync::Arc};

use {
    base64::{Engine, engine::general_purpose::STANDARD as BASE64},
    serde_json::{Value, json},
    tokio::net::TcpListener,
};

use {
    custodian_gateway::build_app,
    custodian_vault::{AuthorizationGate, RootKey, Subject, Vault, VaultError},
};

/// Accepts `token-<subject>`; the token `down` simulates an unreachable
/// verification service.
struct TestGate;

#[async_trait::async_trait]
impl AuthorizationGate for TestGate {
    async fn verify(&self, token: &str) -> Result<Subject, VaultError> {
        if token == "down" {
            return Err(VaultError::Unavailable("connection refused".into()));
        }
        token
            .strip_prefix("token-")
            .map(|id| Subject { id: id.to_string() })
            .ok_or_else(|| VaultError::Unauthorized("invalid token".into()))
    }
}

/// Start a test server; the vault is returned for direct setup.
async fn start_server(with_key: bool) -> (SocketAddr, Arc<Vault>) {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    custodian_vault::run_migrations(&pool).await.unwrap();
    let vault = Arc::new(Vault::new(
        pool,
        RootKey::derive(b"gateway-test-root"),
        Arc::new(TestGate),
    ));
    if with_key {
        vault.add_master_key(None, Some("K1")).await.unwrap();
    }

    let app = build_app(Arc::clone(&vault));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, vault)
}

async fn post(addr: SocketAddr, path: &str, token: Option<&str>, body: Value) -> (u16, Value) {
    let mut req = reqwest::Client::new()
        .post(format!("http://{addr}{path}"))
        .json(&body);
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    let resp = req.send().await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

async fn encrypt_for(addr: SocketAddr, owner: &str, dek: &[u8; 32]) -> String {
    let (status, body) = post(
        addr,
        "/encrypt",
        None,
        json!({
            "data": BASE64.encode(b"card 4111-1111"),
            "dek": hex::encode(dek),
            "owner_id": owner,
        }),
    )
    .await;
    assert_eq!(status, 200, "{body}");
    body["encrypted_dek"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_active_key() {
    let (addr, _) = start_server(false).await;
    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({ "status": "ok", "active_key": false }));

    let (addr, _) = start_server(true).await;
    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["active_key"], true);
}

#[tokio::test]
async fn encrypt_returns_both_blobs() {
    let (addr, vault) = start_server(true).await;
    let (status, body) = post(
        addr,
        "/encrypt",
        None,
        json!({ "data": BASE64.encode(b"hello"), "dek": "11".repeat(32) }),
    )
    .await;
    assert_eq!(status, 200);

    let encrypted_key = BASE64
        .decode(body["encrypted_key"].as_str().unwrap())
        .unwrap();
    // nonce(16) || tag(16) || ciphertext(5)
    assert_eq!(encrypted_key.len(), 16 + 16 + 5);
    assert!(body["encrypted_dek"].as_str().is_some());

    // Without owner_id nothing is persisted.
    assert!(vault.envelopes().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn encrypt_validates_fields() {
    let (addr, _) = start_server(true).await;

    let (status, body) = post(addr, "/encrypt", None, json!({ "dek": "11".repeat(32) })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "data is required");

    let (status, _) = post(
        addr,
        "/encrypt",
        None,
        json!({ "data": "not base64!!", "dek": "11".repeat(32) }),
    )
    .await;
    assert_eq!(status, 400);

    let (status, body) = post(
        addr,
        "/encrypt",
        None,
        json!({ "data": BASE64.encode(b"x"), "dek": "11".repeat(16) }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "dek must be 32 bytes");

    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/encrypt"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn encrypt_without_master_key_is_500() {
    let (addr, _) = start_server(false).await;
    let (status, body) = post(
        addr,
        "/encrypt",
        None,
        json!({ "data": BASE64.encode(b"x"), "dek": "11".repeat(32) }),
    )
    .await;
    assert_eq!(status, 500);
    assert_eq!(body["error"], "internal error");
}

#[tokio::test]
async fn owner_gets_dek_back() {
    let (addr, _) = start_server(true).await;
    let dek = [0x42; 32];
    let encrypted_dek = encrypt_for(addr, "user-42", &dek).await;

    let (status, body) = post(
        addr,
        "/decrypt-dek",
        Some("token-user-42"),
        json!({ "encrypted_dek": encrypted_dek }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["dek"], hex::encode(dek));
}

#[tokio::test]
async fn other_subject_is_rejected() {
    let (addr, _) = start_server(true).await;
    let encrypted_dek = encrypt_for(addr, "user-42", &[0x42; 32]).await;

    let (status, body) = post(
        addr,
        "/decrypt-dek",
        Some("token-user-7"),
        json!({ "encrypted_dek": encrypted_dek }),
    )
    .await;
    assert_eq!(status, 401);
    assert_eq!(body, json!({ "error": "unauthorized" }));
}

#[tokio::test]
async fn missing_or_bad_token_is_rejected() {
    let (addr, _) = start_server(true).await;
    let encrypted_dek = encrypt_for(addr, "user-42", &[0x42; 32]).await;

    let (status, _) = post(
        addr,
        "/decrypt-dek",
        None,
        json!({ "encrypted_dek": encrypted_dek }),
    )
    .await;
    assert_eq!(status, 401);

    let (status, _) = post(
        addr,
        "/decrypt-dek",
        Some("garbage"),
        json!({ "encrypted_dek": encrypted_dek }),
    )
    .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn unknown_blob_is_rejected_like_foreign_one() {
    let (addr, _) = start_server(true).await;
    let (status, _) = post(
        addr,
        "/decrypt-dek",
        Some("token-user-42"),
        json!({ "encrypted_dek": BASE64.encode([0u8; 64]) }),
    )
    .await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn missing_encrypted_dek_is_400() {
    let (addr, _) = start_server(true).await;
    let (status, body) = post(addr, "/decrypt-dek", Some("token-user-42"), json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "encrypted_dek is required");
}

#[tokio::test]
async fn unreachable_gate_is_503() {
    let (addr, _) = start_server(true).await;
    let encrypted_dek = encrypt_for(addr, "user-42", &[0x42; 32]).await;
    let (status, _) = post(
        addr,
        "/decrypt-dek",
        Some("down"),
        json!({ "encrypted_dek": encrypted_dek }),
    )
    .await;
    assert_eq!(status, 503);
}

#[tokio::test]
async fn dek_survives_rotation() {
    let (addr, vault) = start_server(true).await;
    let dek = [0x5a; 32];
    let before = encrypt_for(addr, "user-42", &dek).await;

    let change = vault.add_master_key(None, Some("K2")).await.unwrap();
    assert_eq!(change.rotation.unwrap().migrated, 1);

    // The wrapped blob changed; the client must use the rotated one.
    let after = vault
        .envelopes()
        .get("user-42")
        .await
        .unwrap()
        .unwrap()
        .encrypted_dek;
    assert_ne!(before, after);

    let (status, body) = post(
        addr,
        "/decrypt-dek",
        Some("token-user-42"),
        json!({ "encrypted_dek": after }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["dek"], hex::encode(dek));
}
