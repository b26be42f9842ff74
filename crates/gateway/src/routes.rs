use {
    axum::{
        Json,
        extract::{State, rejection::JsonRejection},
        http::{HeaderMap, header::AUTHORIZATION},
    },
    base64::{Engine, engine::general_purpose::STANDARD as BASE64},
    serde::{Deserialize, Serialize},
};

use custodian_vault::{SealedEnvelope, key_wrap::KEY_LEN};

use crate::{error::ApiError, server::AppState};

#[derive(Debug, Deserialize)]
pub struct EncryptRequest {
    /// Base64 payload.
    #[serde(default)]
    pub data: String,
    /// Hex-encoded 32-byte DEK.
    #[serde(default)]
    pub dek: String,
    pub owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecryptDekRequest {
    #[serde(default)]
    pub encrypted_dek: String,
}

#[derive(Debug, Serialize)]
pub struct DecryptDekResponse {
    pub dek: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_key: bool,
}

/// `POST /encrypt`
pub async fn encrypt(
    State(state): State<AppState>,
    payload: Result<Json<EncryptRequest>, JsonRejection>,
) -> Result<Json<SealedEnvelope>, ApiError> {
    let Json(req) = payload?;

    if req.data.is_empty() {
        return Err(ApiError::bad_request("data is required"));
    }
    if req.dek.is_empty() {
        return Err(ApiError::bad_request("dek is required"));
    }

    let data = BASE64
        .decode(req.data.trim())
        .map_err(|_| ApiError::bad_request("data must be base64"))?;
    let dek = parse_dek(&req.dek)?;
    let owner_id = req
        .owner_id
        .as_deref()
        .map(str::trim)
        .filter(|o| !o.is_empty());

    let sealed = state.vault.encrypt(&data, &dek, owner_id).await?;
    Ok(Json(sealed))
}

/// `POST /decrypt-dek`
pub async fn decrypt_dek(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DecryptDekRequest>, JsonRejection>,
) -> Result<Json<DecryptDekResponse>, ApiError> {
    let Json(req) = payload?;

    let encrypted_dek = req.encrypted_dek.trim();
    if encrypted_dek.is_empty() {
        return Err(ApiError::bad_request("encrypted_dek is required"));
    }

    let dek = state
        .vault
        .decrypt_dek(bearer_token(&headers), encrypted_dek)
        .await?;
    Ok(Json(DecryptDekResponse {
        dek: hex::encode(dek.as_slice()),
    }))
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let active_key = state.vault.is_initialized().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        active_key,
    }))
}

fn parse_dek(hex_dek: &str) -> Result<[u8; KEY_LEN], ApiError> {
    let bytes =
        hex::decode(hex_dek.trim()).map_err(|_| ApiError::bad_request("dek must be hex"))?;
    <[u8; KEY_LEN]>::try_from(bytes.as_slice())
        .map_err(|_| ApiError::bad_request(format!("dek must be {KEY_LEN} bytes")))
}

/// Token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, axum::http::HeaderValue};

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn dek_must_be_32_hex_bytes() {
        assert_eq!(parse_dek(&"ab".repeat(32)).unwrap(), [0xab; 32]);
        assert!(parse_dek("zz").is_err());
        assert!(parse_dek(&"ab".repeat(16)).is_err());
        assert!(parse_dek(&"ab".repeat(33)).is_err());
    }
}
