use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Single-use secret that can be exchanged once for the token it is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneTimeToken {
    pub one_time_secret_id: String,
    /// Accessor of the token that issued it
    pub accessor_id: String,
    pub expires_at: DateTime<Utc>,
    pub create_index: u64,
    pub modify_index: u64,
}

impl OneTimeToken {
    /// Expiry is inclusive: a token is unusable from `expires_at` on.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
