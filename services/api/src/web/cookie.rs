//! services/api/src/web/cookie.rs
//!
//! The signed `session` cookie that ties a browser to its `Session`.
//!
//! The cookie value is `<session id>.<hex HMAC-SHA256 of the id>`, keyed with
//! the configured session secret. Values that fail verification are ignored.

use axum::http::{header, HeaderMap};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const COOKIE_NAME: &str = "session";

#[derive(Clone)]
pub struct SessionCookie {
    mac: HmacSha256,
    secure: bool,
    max_age_secs: i64,
}

impl SessionCookie {
    pub fn new(secret: &str, secure: bool, max_age: chrono::Duration) -> Self {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC-SHA256 accepts keys of any length");
        Self {
            mac,
            secure,
            max_age_secs: max_age.num_seconds(),
        }
    }

    /// The signed cookie value for `session_id`.
    pub fn sign(&self, session_id: Uuid) -> String {
        let mut mac = self.mac.clone();
        mac.update(session_id.as_bytes());
        format!("{}.{}", session_id, hex::encode(mac.finalize().into_bytes()))
    }

    /// Returns the session id carried by `value` if its signature checks out.
    pub fn verify(&self, value: &str) -> Option<Uuid> {
        let (id, signature) = value.split_once('.')?;
        let session_id = Uuid::parse_str(id).ok()?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(session_id)
    }

    /// Extracts and verifies the session id from a request's `Cookie` headers.
    pub fn session_id(&self, headers: &HeaderMap) -> Option<Uuid> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|c| c.trim().strip_prefix("session="))
            .find_map(|value| self.verify(value))
    }

    /// A `Set-Cookie` value establishing `session_id`.
    pub fn set_cookie(&self, session_id: Uuid) -> String {
        format!(
            "{}={}; HttpOnly;{} SameSite=Lax; Path=/; Max-Age={}",
            COOKIE_NAME,
            self.sign(session_id),
            if self.secure { " Secure;" } else { "" },
            self.max_age_secs
        )
    }

    /// A `Set-Cookie` value that clears the session cookie.
    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; HttpOnly;{} SameSite=Lax; Path=/; Max-Age=0",
            COOKIE_NAME,
            if self.secure { " Secure;" } else { "" }
        )
    }
}
