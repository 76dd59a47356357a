use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A stored refresh token. Rows are never deleted; revocation only sets `revoked_on`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RefreshToken {
    pub id: i32,
    pub token: String,
    pub user_id: i32,
    pub created_on: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
    pub revoked_on: Option<DateTime<Utc>>,
}

impl RefreshToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_on
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_on.is_some()
    }

    /// Neither revoked nor expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}

/// A freshly minted refresh token that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub created_on: DateTime<Utc>,
    pub expires_on: DateTime<Utc>,
}
