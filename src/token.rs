use axum::http::{header, HeaderMap};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::{Duration, OffsetDateTime};

type HmacSha256 = Hmac<Sha256>;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

#[derive(Serialize, Deserialize)]
struct JwtHeader {
    alg: String,
    typ: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) name: String,
    pub(crate) is_admin: bool,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
}

/// Signs and verifies HS256 JSON Web Tokens.
pub(crate) struct TokenSigner {
    key: Vec<u8>,
    ttl: Duration,
}

pub(crate) struct TokenSubject<'a> {
    pub(crate) id: &'a str,
    pub(crate) email: &'a str,
    pub(crate) name: &'a str,
    pub(crate) is_admin: bool,
}

impl TokenSigner {
    pub(crate) fn new(key: Vec<u8>, ttl: Duration) -> Self {
        Self { key, ttl }
    }

    pub(crate) fn issue(&self, subject: &TokenSubject<'_>, now: OffsetDateTime) -> String {
        let header = JwtHeader {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            id: subject.id.to_string(),
            email: subject.email.to_string(),
            name: subject.name.to_string(),
            is_admin: subject.is_admin,
            iat: now.unix_timestamp(),
            exp: (now + self.ttl).unix_timestamp(),
        };

        let header_json = serde_json::to_vec(&header).expect("jwt header must serialize to JSON");
        let claims_json = serde_json::to_vec(&claims).expect("jwt claims must serialize to JSON");
        let signing_input = format!("{}.{}", B64.encode(header_json), B64.encode(claims_json));

        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC key must be non-empty");
        mac.update(signing_input.as_bytes());
        let sig = mac.finalize().into_bytes();

        format!("{signing_input}.{}", B64.encode(sig))
    }

    pub(crate) fn verify(&self, token: &str, now: OffsetDateTime) -> Option<Claims> {
        let mut parts = token.split('.');
        let header_b64 = parts.next()?;
        let claims_b64 = parts.next()?;
        let sig_b64 = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let header: JwtHeader = serde_json::from_slice(&B64.decode(header_b64).ok()?).ok()?;
        if header.alg != "HS256" {
            return None;
        }

        let sig = B64.decode(sig_b64.as_bytes()).ok()?;
        let mut mac = HmacSha256::new_from_slice(&self.key).ok()?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&sig).ok()?;

        let claims: Claims = serde_json::from_slice(&B64.decode(claims_b64).ok()?).ok()?;
        if claims.exp <= now.unix_timestamp() {
            return None;
        }
        Some(claims)
    }
}

/// Pulls the token out of `Authorization`, accepting both `Bearer <token>`
/// and a bare token.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    if token.is_empty() || token == "Bearer" {
        None
    } else {
        Some(token)
    }
}
