use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity prefix for recorder bots, so their own room events can be told
/// apart from real participants.
pub const BOT_IDENTITY_PREFIX: &str = "RB_";

const TOKEN_TTL_SECONDS: i64 = 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid api secret")]
    InvalidSecret,
    #[error("token error: {0}")]
    Token(#[from] jwt::Error),
    #[error("unknown api key")]
    UnknownApiKey,
    #[error("token expired")]
    Expired,
    #[error("missing body hash")]
    MissingBodyHash,
    #[error("body hash mismatch")]
    BodyHashMismatch,
}

/// Room access grants carried inside a token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoGrant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    pub room_join: bool,
    pub room_admin: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_publish_data: Option<bool>,
    pub hidden: bool,
    pub recorder: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClaimSet {
    iss: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    jti: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    video: Option<VideoGrant>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    sha256: Option<String>,
}

/// Mints the signed credentials this service needs: hidden recorder tokens
/// for bots joining a room and admin tokens for REST calls. Also verifies
/// the signature the room server puts on webhook deliveries.
#[derive(Clone)]
pub struct AccessTokenBuilder {
    api_key: String,
    api_secret: String,
}

impl AccessTokenBuilder {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self {
            api_key,
            api_secret,
        }
    }

    fn key(&self) -> Result<Hmac<Sha256>, AuthError> {
        Hmac::new_from_slice(self.api_secret.as_bytes()).map_err(|_| AuthError::InvalidSecret)
    }

    fn sign(&self, identity: &str, grant: VideoGrant) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = ClaimSet {
            iss: self.api_key.clone(),
            sub: Some(identity.to_string()),
            jti: Some(identity.to_string()),
            nbf: Some(now.timestamp()),
            exp: Some((now + Duration::seconds(TOKEN_TTL_SECONDS)).timestamp()),
            video: Some(grant),
            sha256: None,
        };

        Ok(claims.sign_with_key(&self.key()?)?)
    }

    /// Token for a bot joining a room: hidden, recorder, subscribe-only.
    pub fn recorder_token(&self, room: &str, identity: &str) -> Result<String, AuthError> {
        self.sign(
            identity,
            VideoGrant {
                room: Some(room.to_string()),
                room_join: true,
                can_subscribe: Some(true),
                can_publish: Some(false),
                can_publish_data: Some(false),
                hidden: true,
                recorder: true,
                ..Default::default()
            },
        )
    }

    /// Token for server-side REST calls against a room.
    pub fn admin_token(&self, room: &str) -> Result<String, AuthError> {
        let identity = self.api_key.clone();
        self.sign(
            &identity,
            VideoGrant {
                room: Some(room.to_string()),
                room_admin: true,
                ..Default::default()
            },
        )
    }

    /// Verifies a webhook delivery: the bearer token must be signed with our
    /// secret, name our api key and carry the SHA-256 of the body.
    pub fn verify_webhook(&self, token: &str, body: &[u8]) -> Result<(), AuthError> {
        let claims: ClaimSet = token.verify_with_key(&self.key()?)?;

        if claims.iss != self.api_key {
            return Err(AuthError::UnknownApiKey);
        }
        if let Some(exp) = claims.exp {
            if exp < Utc::now().timestamp() {
                return Err(AuthError::Expired);
            }
        }

        let expected = claims.sha256.ok_or(AuthError::MissingBodyHash)?;
        let digest = BASE64.encode(Sha256::digest(body));
        if digest != expected {
            return Err(AuthError::BodyHashMismatch);
        }

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn webhook_token(&self, body: &[u8]) -> Result<String, AuthError> {
        let claims = ClaimSet {
            iss: self.api_key.clone(),
            sub: None,
            jti: None,
            nbf: None,
            exp: Some((Utc::now() + Duration::seconds(60)).timestamp()),
            video: None,
            sha256: Some(BASE64.encode(Sha256::digest(body))),
        };

        Ok(claims.sign_with_key(&self.key()?)?)
    }

    #[cfg(test)]
    pub(crate) fn decode_claims(&self, token: &str) -> Result<serde_json::Value, AuthError> {
        Ok(token.verify_with_key(&self.key()?)?)
    }
}
