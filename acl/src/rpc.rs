// Tagged request/response types for the transport boundary
//
// A transport decodes one `AclRequest`, hands it to `Acl::dispatch`, and
// encodes whichever `AclResponse` variant comes back. Each operation has its
// own response variant, so callers match on the variant instead of
// inspecting what kind of object they were given.

use crate::endpoint::Acl;
use crate::error::Result;
use crate::types::{
    OneTimeToken, Policy, PolicyStub, QueryOptions, QueryResponse, Token, TokenStub, WriteResponse,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AclRequest {
    ListPolicies {
        auth_token: String,
        #[serde(default)]
        options: QueryOptions,
    },
    GetPolicy {
        auth_token: String,
        name: String,
        #[serde(default)]
        options: QueryOptions,
    },
    UpsertPolicies {
        auth_token: String,
        policies: Vec<Policy>,
    },
    DeletePolicy {
        auth_token: String,
        name: String,
    },
    ListTokens {
        auth_token: String,
        #[serde(default)]
        options: QueryOptions,
    },
    GetToken {
        auth_token: String,
        accessor_id: String,
        #[serde(default)]
        options: QueryOptions,
    },
    GetTokenSelf {
        auth_token: String,
        #[serde(default)]
        options: QueryOptions,
    },
    UpsertTokens {
        auth_token: String,
        tokens: Vec<Token>,
    },
    DeleteToken {
        auth_token: String,
        accessor_id: String,
    },
    Bootstrap,
    IssueOneTimeToken {
        auth_token: String,
    },
    ExchangeOneTimeToken {
        one_time_secret_id: String,
    },
}

impl AclRequest {
    /// Operation name, safe to log
    pub fn op(&self) -> &'static str {
        match self {
            AclRequest::ListPolicies { .. } => "list_policies",
            AclRequest::GetPolicy { .. } => "get_policy",
            AclRequest::UpsertPolicies { .. } => "upsert_policies",
            AclRequest::DeletePolicy { .. } => "delete_policy",
            AclRequest::ListTokens { .. } => "list_tokens",
            AclRequest::GetToken { .. } => "get_token",
            AclRequest::GetTokenSelf { .. } => "get_token_self",
            AclRequest::UpsertTokens { .. } => "upsert_tokens",
            AclRequest::DeleteToken { .. } => "delete_token",
            AclRequest::Bootstrap => "bootstrap",
            AclRequest::IssueOneTimeToken { .. } => "issue_one_time_token",
            AclRequest::ExchangeOneTimeToken { .. } => "exchange_one_time_token",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum AclResponse {
    PolicyList(QueryResponse<Vec<PolicyStub>>),
    Policy(QueryResponse<Policy>),
    TokenList(QueryResponse<Vec<TokenStub>>),
    Token(QueryResponse<Token>),
    TokensUpserted(WriteResponse<Vec<Token>>),
    Bootstrapped(WriteResponse<Token>),
    OneTimeToken(WriteResponse<OneTimeToken>),
    Exchanged(WriteResponse<Token>),
    /// A mutation with nothing to return but its index
    Empty(WriteResponse<()>),
}

impl AclResponse {
    /// Write index the response was served from or committed at
    pub fn index(&self) -> u64 {
        match self {
            AclResponse::PolicyList(r) => r.meta.index,
            AclResponse::Policy(r) => r.meta.index,
            AclResponse::TokenList(r) => r.meta.index,
            AclResponse::Token(r) => r.meta.index,
            AclResponse::TokensUpserted(r) => r.index,
            AclResponse::Bootstrapped(r) => r.index,
            AclResponse::OneTimeToken(r) => r.index,
            AclResponse::Exchanged(r) => r.index,
            AclResponse::Empty(r) => r.index,
        }
    }
}

impl Acl {
    /// Authenticate and run a decoded request
    pub async fn dispatch(&self, request: AclRequest) -> Result<AclResponse> {
        tracing::trace!("Dispatching {}", request.op());

        let response = match request {
            AclRequest::ListPolicies { auth_token, options } => {
                let identity = self.authenticate(&auth_token)?;
                AclResponse::PolicyList(self.list_policies(&identity, &options).await?)
            }
            AclRequest::GetPolicy {
                auth_token,
                name,
                options,
            } => {
                let identity = self.authenticate(&auth_token)?;
                AclResponse::Policy(self.get_policy(&identity, &name, &options).await?)
            }
            AclRequest::UpsertPolicies {
                auth_token,
                policies,
            } => {
                let identity = self.authenticate(&auth_token)?;
                AclResponse::Empty(self.upsert_policies(&identity, policies).await?)
            }
            AclRequest::DeletePolicy { auth_token, name } => {
                let identity = self.authenticate(&auth_token)?;
                AclResponse::Empty(self.delete_policy(&identity, &name).await?)
            }
            AclRequest::ListTokens { auth_token, options } => {
                let identity = self.authenticate(&auth_token)?;
                AclResponse::TokenList(self.list_tokens(&identity, &options).await?)
            }
            AclRequest::GetToken {
                auth_token,
                accessor_id,
                options,
            } => {
                let identity = self.authenticate(&auth_token)?;
                AclResponse::Token(self.get_token(&identity, &accessor_id, &options).await?)
            }
            AclRequest::GetTokenSelf { auth_token, options } => {
                AclResponse::Token(self.get_token_self(&auth_token, &options).await?)
            }
            AclRequest::UpsertTokens { auth_token, tokens } => {
                let identity = self.authenticate(&auth_token)?;
                AclResponse::TokensUpserted(self.upsert_tokens(&identity, tokens).await?)
            }
            AclRequest::DeleteToken {
                auth_token,
                accessor_id,
            } => {
                let identity = self.authenticate(&auth_token)?;
                AclResponse::Empty(self.delete_token(&identity, &accessor_id).await?)
            }
            AclRequest::Bootstrap => AclResponse::Bootstrapped(self.bootstrap().await?),
            AclRequest::IssueOneTimeToken { auth_token } => {
                AclResponse::OneTimeToken(self.issue_one_time_token(&auth_token).await?)
            }
            AclRequest::ExchangeOneTimeToken { one_time_secret_id } => {
                AclResponse::Exchanged(self.exchange_one_time_token(&one_time_secret_id).await?)
            }
        };

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AclConfig;
    use crate::consensus::LocalConsensus;
    use crate::error::AclError;
    use std::sync::Arc;

    #[test]
    fn test_request_wire_form() {
        let request: AclRequest = serde_json::from_str(
            r#"{"op":"get_policy","auth_token":"s3cr3t","name":"readonly"}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            AclRequest::GetPolicy {
                auth_token: "s3cr3t".to_string(),
                name: "readonly".to_string(),
                options: QueryOptions::default(),
            }
        );

        let bootstrap: AclRequest = serde_json::from_str(r#"{"op":"bootstrap"}"#).unwrap();
        assert_eq!(bootstrap.op(), "bootstrap");
    }

    #[tokio::test]
    async fn test_dispatch_resolves_variants() {
        let (acl, _) = Acl::new(AclConfig::default(), Arc::new(LocalConsensus::new()));

        let root = match acl.dispatch(AclRequest::Bootstrap).await.unwrap() {
            AclResponse::Bootstrapped(response) => response.value,
            other => panic!("unexpected response: {:?}", other),
        };

        let upsert = acl
            .dispatch(AclRequest::UpsertPolicies {
                auth_token: root.secret_id.clone(),
                policies: vec![Policy::new("readonly", "")],
            })
            .await
            .unwrap();
        assert!(matches!(upsert, AclResponse::Empty(_)));

        let listed = acl
            .dispatch(AclRequest::ListPolicies {
                auth_token: root.secret_id.clone(),
                options: QueryOptions::default(),
            })
            .await
            .unwrap();
        assert_eq!(listed.index(), upsert.index());
        match listed {
            AclResponse::PolicyList(response) => assert_eq!(response.value.len(), 1),
            other => panic!("unexpected response: {:?}", other),
        }

        let denied = acl
            .dispatch(AclRequest::ListTokens {
                auth_token: "bogus".to_string(),
                options: QueryOptions::default(),
            })
            .await
            .unwrap_err();
        assert_eq!(denied, AclError::PermissionDenied);
    }
}
