use std::time::Duration;

/// Lifetime of a one-time token unless configured otherwise
pub const DEFAULT_ONE_TIME_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

/// Longest one-time token lifetime a node accepts in its configuration
pub const MAX_ONE_TIME_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Runtime settings of the ACL subsystem
#[derive(Debug, Clone)]
pub struct AclConfig {
    /// When false every endpoint fails with `AclError::Disabled`
    pub enabled: bool,
    /// Lifetime of an issued one-time token
    pub one_time_token_ttl: Duration,
    /// Reads whose last leader contact is older than this are flagged stale
    pub max_stale: Duration,
    /// Longest a blocking query may wait for its minimum index
    pub max_query_wait: Duration,
    /// Proposals that may queue in front of the writer
    pub pipeline_capacity: usize,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            one_time_token_ttl: DEFAULT_ONE_TIME_TOKEN_TTL,
            max_stale: Duration::from_secs(5),
            max_query_wait: Duration::from_secs(300),
            pipeline_capacity: 64,
        }
    }
}
