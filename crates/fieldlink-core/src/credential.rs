//! Device credential derivation and shared access signatures

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::form_urlencoded;

use crate::error::CredentialError;

type HmacSha256 = Hmac<Sha256>;

/// Key name the provisioning service expects in registration tokens
pub const REGISTRATION_KEY_NAME: &str = "registration";

/// Default lifetime of generated tokens, in seconds
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 3600;

fn sign(key_b64: &str, message: &[u8]) -> Result<String, CredentialError> {
    let key = STANDARD
        .decode(key_b64.trim())
        .map_err(|e| CredentialError::InvalidKey(e.to_string()))?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| CredentialError::InvalidKey(e.to_string()))?;
    mac.update(message);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Derive a per-device key from a group key
///
/// `base64(HMAC-SHA256(base64decode(group_key), utf8(registration_id)))`
///
/// # Errors
/// Returns `CredentialError::InvalidKey` if the group key is not base64
pub fn derive_device_key(group_key: &str, registration_id: &str) -> Result<String, CredentialError> {
    sign(group_key, registration_id.as_bytes())
}

/// Build a `SharedAccessSignature` token for `resource_uri`
///
/// `expiry` is in unix seconds.
///
/// # Errors
/// Returns `CredentialError::InvalidKey` if the key is not base64
pub fn sas_token(
    resource_uri: &str,
    key: &str,
    key_name: Option<&str>,
    expiry: i64,
) -> Result<String, CredentialError> {
    let resource = encode(resource_uri);
    let signature = sign(key, format!("{resource}\n{expiry}").as_bytes())?;

    let mut token = format!(
        "SharedAccessSignature sr={resource}&sig={}&se={expiry}",
        encode(&signature)
    );
    if let Some(name) = key_name {
        token.push_str("&skn=");
        token.push_str(&encode(name));
    }
    Ok(token)
}

/// Token valid for [`DEFAULT_TOKEN_TTL_SECS`] from now
///
/// # Errors
/// See [`sas_token`]
pub fn sas_token_from_now(
    resource_uri: &str,
    key: &str,
    key_name: Option<&str>,
) -> Result<String, CredentialError> {
    let expiry = (Utc::now() + Duration::seconds(DEFAULT_TOKEN_TTL_SECS)).timestamp();
    sas_token(resource_uri, key, key_name, expiry)
}
