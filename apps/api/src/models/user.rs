//! Access token claims
//!
//! Tokens are issued by the managed auth platform and only verified here.
//! Its end users carry `role: "authenticated"`; staff accounts carry
//! `role: "admin"`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role carried in the access token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    /// Any other role the auth platform hands out
    #[default]
    #[serde(other)]
    User,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// JWT claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,

    /// User's email, when the platform includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default)]
    pub role: UserRole,

    /// Issued at timestamp (Unix epoch)
    #[serde(default)]
    pub iat: i64,

    /// Expiration timestamp (Unix epoch)
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl Claims {
    /// Claims for a token valid for `ttl_secs` from now
    pub fn new(user_id: Uuid, email: Option<String>, role: UserRole, ttl_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id,
            email,
            role,
            iat: now,
            exp: now + ttl_secs,
            iss: None,
            aud: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
