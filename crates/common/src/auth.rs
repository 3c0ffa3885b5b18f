//! Account credentials for the cloud relay
//!
//! An account is a bearer token plus the 32-byte master secret. The secret
//! is stored URL-safe base64; users may also paste it in the grouped base32
//! "backup" form (`XXXXX-XXXXX-...`). Tokens are minted by signing a random
//! challenge with the Ed25519 key whose seed is the master secret.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use crate::crypto::{KeyError, MasterSecret, SECRET_SIZE};

/// Relay used when none is configured
pub const DEFAULT_SERVER_URL: &str = "https://api.cluster-fluster.com";
/// Section of the credentials file holding relay credentials
pub const CREDENTIALS_SECTION: &str = "cloud";

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const BACKUP_GROUP: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("auth error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("invalid secret key: {0}")]
    InvalidSecret(String),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("credentials file is not valid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token request rejected with {0}: {1}")]
    Rejected(reqwest::StatusCode, String),
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    /// URL-safe base64 master secret
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn master_secret(&self) -> Result<MasterSecret, AuthError> {
        decode_secret(&self.secret)
    }

    /// Load the relay section of a credentials file, `None` if absent
    pub fn load(path: &Path) -> Result<Option<Self>, AuthError> {
        if !path.exists() {
            return Ok(None);
        }
        let data: Value = serde_json::from_slice(&std::fs::read(path)?)?;
        match data.get(CREDENTIALS_SECTION) {
            Some(section) => Ok(Some(serde_json::from_value(section.clone())?)),
            None => Ok(None),
        }
    }

    /// Write the relay section, keeping any other sections in the file
    pub fn save(&self, path: &Path) -> Result<(), AuthError> {
        let mut data = match path.exists() {
            true => match serde_json::from_slice::<Value>(&std::fs::read(path)?)? {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            false => Map::new(),
        };
        data.insert(CREDENTIALS_SECTION.to_string(), serde_json::to_value(self)?);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(&Value::Object(data))?)?;
        Ok(())
    }
}

/// Decode a URL-safe base64 secret, padding optional
pub fn decode_secret(encoded: &str) -> Result<MasterSecret, AuthError> {
    Ok(MasterSecret::from_base64url(encoded)?)
}

/// Parse the grouped base32 backup form into URL-safe base64
///
/// Case-insensitive; `0`, `1`, `8` and `9` are read as `O`, `I`, `B` and `G`,
/// and anything outside the alphabet (dashes, spaces) is ignored.
pub fn parse_backup_secret_key(formatted: &str) -> Result<String, AuthError> {
    let cleaned: Vec<u8> = formatted
        .to_uppercase()
        .chars()
        .map(|c| match c {
            '0' => 'O',
            '1' => 'I',
            '8' => 'B',
            '9' => 'G',
            other => other,
        })
        .filter_map(|c| {
            BASE32_ALPHABET
                .iter()
                .position(|a| *a as char == c)
                .map(|v| v as u8)
        })
        .collect();
    if cleaned.is_empty() {
        return Err(AuthError::InvalidSecret("no valid characters found".into()));
    }

    let mut bytes = Vec::with_capacity(SECRET_SIZE);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for value in cleaned {
        buffer = (buffer << 5) | value as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            bytes.push((buffer >> bits) as u8);
        }
        buffer &= (1 << bits) - 1;
    }

    let secret = MasterSecret::from_slice(&bytes).map_err(|_| {
        AuthError::InvalidSecret(format!(
            "expected {} bytes, got {}",
            SECRET_SIZE,
            bytes.len()
        ))
    })?;
    Ok(secret.to_base64url())
}

/// Render a secret in the grouped base32 backup form
pub fn format_backup_secret_key(secret: &MasterSecret) -> String {
    let mut chars = String::new();
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for byte in secret.bytes() {
        buffer = (buffer << 8) | *byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            chars.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        chars.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    chars
        .as_bytes()
        .chunks(BACKUP_GROUP)
        .map(|group| String::from_utf8_lossy(group).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}

/// Accept either the base64url or the backup form, returning base64url
pub fn normalize_secret_key(key: &str) -> Result<String, AuthError> {
    let trimmed = key.trim();
    if trimmed.contains('-') || trimmed.contains(' ') || trimmed.len() > 50 {
        return parse_backup_secret_key(trimmed);
    }
    match decode_secret(trimmed) {
        Ok(_) => Ok(trimmed.to_string()),
        Err(_) => parse_backup_secret_key(trimmed),
    }
}

/// Body of the token request for `challenge`
pub fn challenge_request(secret: &MasterSecret, challenge: &[u8]) -> Value {
    let signing = SigningKey::from_bytes(secret);
    let signature = signing.sign(challenge);
    json!({
        "challenge": STANDARD.encode(challenge),
        "signature": STANDARD.encode(signature.to_bytes()),
        "publicKey": STANDARD.encode(signing.verifying_key().to_bytes()),
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Exchange a signed challenge for a bearer token at `{server}/v1/auth`
pub async fn request_token(secret: &MasterSecret, server_url: &Url) -> Result<String, AuthError> {
    let mut challenge = [0u8; 32];
    getrandom::getrandom(&mut challenge)
        .map_err(|e| anyhow::anyhow!("failed to generate challenge: {}", e))?;

    let url = server_url
        .join("v1/auth")
        .map_err(|e| anyhow::anyhow!("bad relay url: {}", e))?;
    let response = reqwest::Client::new()
        .post(url)
        .json(&challenge_request(secret, &challenge))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::Rejected(status, response.text().await?));
    }
    let body: TokenResponse = response.json().await?;
    tracing::info!("obtained relay token");
    Ok(body.token)
}
