//! Signed bearer tokens.
//!
//! Format: `base64url(claims_json).base64url(hmac_sha256(first_part))`.
//! The claims bind a user id to an expiry, so a token is useless after
//! `exp` and cannot be re-targeted at another user without the secret.

use std::{sync::Arc, time::Duration};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::{models::User, AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenSigner {
    key: Arc<[u8]>,
    ttl: Duration,
}

fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

impl TokenSigner {
    pub fn new(secret: &str, ttl: Duration) -> TokenSigner {
        TokenSigner {
            key: Arc::from(secret.as_bytes()),
            ttl,
        }
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {e}")))
    }

    pub fn issue(&self, user: &User) -> AppResult<String> {
        self.issue_at(user.id, &user.display_name, unix_now())
    }

    pub(crate) fn issue_at(&self, user_id: Uuid, name: &str, now: i64) -> AppResult<String> {
        let claims = Claims {
            sub: user_id,
            name: name.to_owned(),
            iat: now,
            exp: now.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{payload}.{signature}"))
    }

    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        self.verify_at(token, unix_now())
    }

    pub(crate) fn verify_at(&self, token: &str, now: i64) -> AppResult<Claims> {
        let invalid = || AppError::Auth("invalid token".to_owned());

        let (payload, signature) = token.split_once('.').ok_or_else(invalid)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| invalid())?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid())?;

        let claims_json = URL_SAFE_NO_PAD.decode(payload).map_err(|_| invalid())?;
        let claims: Claims = serde_json::from_slice(&claims_json).map_err(|_| invalid())?;

        if now >= claims.exp {
            return Err(AppError::Auth("token expired".to_owned()));
        }
        Ok(claims)
    }
}
