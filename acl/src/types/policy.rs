use crate::error::{AclError, Result};
use serde::{Deserialize, Serialize};

const MAX_POLICY_NAME_LENGTH: usize = 128;
const MAX_DESCRIPTION_LENGTH: usize = 256;

/// A named, versioned rule document.
///
/// The rules themselves are opaque to this crate; they are resolved into
/// capabilities by whoever authorizes requests against them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Unique name; immutable once created
    pub name: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
    /// Opaque rule document
    #[serde(default)]
    pub rules: String,
    /// Index at which the policy was first written
    #[serde(default)]
    pub create_index: u64,
    /// Index of the latest write to the policy
    #[serde(default)]
    pub modify_index: u64,
}

/// Policy listing entry, without the rule body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStub {
    pub name: String,
    pub description: String,
    pub create_index: u64,
    pub modify_index: u64,
}

impl Policy {
    pub fn new(name: impl Into<String>, rules: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            rules: rules.into(),
            create_index: 0,
            modify_index: 0,
        }
    }

    /// Check the structural constraints on a policy before it is proposed.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_policy_name(&self.name) {
            return Err(AclError::InvalidRequest(format!(
                "invalid policy name '{}'",
                self.name
            )));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LENGTH {
            return Err(AclError::InvalidRequest(format!(
                "description longer than {}",
                MAX_DESCRIPTION_LENGTH
            )));
        }
        Ok(())
    }

    pub fn stub(&self) -> PolicyStub {
        PolicyStub {
            name: self.name.clone(),
            description: self.description.clone(),
            create_index: self.create_index,
            modify_index: self.modify_index,
        }
    }
}

fn is_valid_policy_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_POLICY_NAME_LENGTH
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_name_validation() {
        assert!(Policy::new("readonly", "").validate().is_ok());
        assert!(Policy::new("ops-team-2", "").validate().is_ok());

        for bad in ["", "has space", "dots.are.bad", "under_score"] {
            assert!(matches!(
                Policy::new(bad, "").validate(),
                Err(AclError::InvalidRequest(_))
            ));
        }

        let long = "a".repeat(MAX_POLICY_NAME_LENGTH + 1);
        assert!(Policy::new(long, "").validate().is_err());
    }

    #[test]
    fn test_description_length() {
        let mut policy = Policy::new("readonly", "");
        policy.description = "d".repeat(MAX_DESCRIPTION_LENGTH);
        assert!(policy.validate().is_ok());

        policy.description.push('d');
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_stub_drops_rules() {
        let mut policy = Policy::new("readonly", "namespace \"default\" { policy = \"read\" }");
        policy.create_index = 4;
        policy.modify_index = 9;

        let stub = policy.stub();
        assert_eq!(stub.name, "readonly");
        assert_eq!(stub.create_index, 4);
        assert_eq!(stub.modify_index, 9);
    }
}
