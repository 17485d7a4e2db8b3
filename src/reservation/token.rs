//! Токен удержания.
//!
//! Формат: `base64url(json claims) "." base64url(HMAC-SHA256(secret, json claims))`.
//! Токен самодостаточен: сервер не хранит реестр удержаний, а владение
//! местами всё равно перепроверяется по таблице блокировок.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::models::{HoldId, HolderId, SeatId, ShowId};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldClaims {
    #[serde(rename = "hid")]
    pub hold_id: HoldId,
    #[serde(rename = "sid")]
    pub show_id: ShowId,
    #[serde(rename = "seats")]
    pub seat_ids: Vec<SeatId>,
    #[serde(rename = "sub")]
    pub holder_id: HolderId,
    #[serde(rename = "exp")]
    pub expires_at: DateTime<Utc>,
}

impl HoldClaims {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed hold token")]
    Malformed,

    #[error("hold token signature mismatch")]
    BadSignature,

    #[error("invalid signing key")]
    InvalidKey,
}

#[derive(Clone)]
pub struct HoldTokenCodec {
    key: Vec<u8>,
}

impl HoldTokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self { key: secret.as_ref().to_vec() }
    }

    pub fn issue(&self, claims: &HoldClaims) -> Result<String, TokenError> {
        let payload = serde_json::to_vec(claims).map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&payload),
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Подпись проверяется до разбора JSON, сравнение за постоянное время.
    pub fn verify(&self, token: &str) -> Result<HoldClaims, TokenError> {
        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| TokenError::Malformed)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        mac.verify_slice(&signature).map_err(|_| TokenError::BadSignature)?;

        serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.key).map_err(|_| TokenError::InvalidKey)
    }
}
