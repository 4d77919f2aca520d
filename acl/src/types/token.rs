use crate::error::{AclError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name given to the token created by the bootstrap procedure
pub const BOOTSTRAP_TOKEN_NAME: &str = "Bootstrap Token";

const MAX_TOKEN_NAME_LENGTH: usize = 256;

/// Privilege class of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Unrestricted access; references no policies
    Management,
    /// Access limited to the attached policies
    Client,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Management => write!(f, "management"),
            TokenType::Client => write!(f, "client"),
        }
    }
}

impl FromStr for TokenType {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "management" => Ok(TokenType::Management),
            "client" => Ok(TokenType::Client),
            other => Err(AclError::InvalidRequest(format!(
                "token type must be client or management, got '{}'",
                other
            ))),
        }
    }
}

/// A long-lived credential.
///
/// `accessor_id` is the public handle; `secret_id` is the credential itself.
/// Both are assigned on creation and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Public identifier, generated when empty on create
    #[serde(default)]
    pub accessor_id: String,
    /// Private credential, generated when empty on create
    #[serde(default)]
    pub secret_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Policy names, in the order given by the writer. Not checked for existence.
    #[serde(default)]
    pub policies: Vec<String>,
    /// Whether the token is replicated to all regions
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub create_time: DateTime<Utc>,
    #[serde(default)]
    pub create_index: u64,
    #[serde(default)]
    pub modify_index: u64,
}

/// Token listing entry. Never carries the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStub {
    pub accessor_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub policies: Vec<String>,
    pub global: bool,
    pub create_time: DateTime<Utc>,
    pub create_index: u64,
    pub modify_index: u64,
}

impl Token {
    /// A client token with no identifiers yet
    pub fn client(name: impl Into<String>, policies: Vec<String>) -> Self {
        Self {
            accessor_id: String::new(),
            secret_id: String::new(),
            name: name.into(),
            token_type: TokenType::Client,
            policies,
            global: false,
            create_time: DateTime::<Utc>::default(),
            create_index: 0,
            modify_index: 0,
        }
    }

    /// A management token with no identifiers yet
    pub fn management(name: impl Into<String>) -> Self {
        Self {
            token_type: TokenType::Management,
            ..Self::client(name, Vec::new())
        }
    }

    pub fn is_management(&self) -> bool {
        self.token_type == TokenType::Management
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.chars().count() > MAX_TOKEN_NAME_LENGTH {
            return Err(AclError::InvalidRequest(format!(
                "token name longer than {}",
                MAX_TOKEN_NAME_LENGTH
            )));
        }
        match self.token_type {
            TokenType::Client if self.policies.is_empty() => Err(AclError::InvalidRequest(
                "client token missing policies".to_string(),
            )),
            TokenType::Management if !self.policies.is_empty() => Err(AclError::InvalidRequest(
                "management token cannot be associated with policies".to_string(),
            )),
            _ => Ok(()),
        }
    }

    pub fn stub(&self) -> TokenStub {
        TokenStub {
            accessor_id: self.accessor_id.clone(),
            name: self.name.clone(),
            token_type: self.token_type,
            policies: self.policies.clone(),
            global: self.global,
            create_time: self.create_time,
            create_index: self.create_index,
            modify_index: self.modify_index,
        }
    }
}

/// Generate a fresh random identifier for accessors and secrets
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
