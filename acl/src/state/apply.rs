// Apply rules for each log entry
//
// Apply runs on a private copy of the state; returning an error discards the
// copy, so these functions mutate freely as they go.

use super::{AclState, Applied, BootstrapMarker, LogEntry, TokenWrite};
use crate::error::{AclError, Result};
use crate::types::{OneTimeToken, Policy, Token};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

impl AclState {
    pub(crate) fn apply(&mut self, index: u64, entry: LogEntry) -> Result<Applied> {
        let applied = match entry {
            LogEntry::UpsertPolicies { policies } => self.upsert_policies(index, policies)?,
            LogEntry::DeletePolicies { names } => self.delete_policies(index, &names)?,
            LogEntry::UpsertTokens { tokens } => self.upsert_tokens(index, tokens)?,
            LogEntry::DeleteTokens { accessor_ids } => self.delete_tokens(index, &accessor_ids)?,
            LogEntry::Bootstrap { token } => self.bootstrap_token(index, token)?,
            LogEntry::UpsertOneTimeToken { token } => self.upsert_one_time_token(index, token)?,
            LogEntry::ExchangeOneTimeToken {
                one_time_secret_id,
                now,
            } => self.exchange_one_time_token(index, &one_time_secret_id, now)?,
            LogEntry::ExpireOneTimeTokens { now } => self.expire_one_time_tokens(index, now),
        };

        if applied != Applied::Collided {
            self.index = index;
        }
        Ok(applied)
    }

    fn upsert_policies(&mut self, index: u64, policies: Vec<Policy>) -> Result<Applied> {
        if policies.is_empty() {
            return Err(AclError::InvalidRequest("must specify at least one policy".to_string()));
        }

        for mut policy in policies {
            policy.validate()?;
            policy.create_index = self
                .policies
                .get(&policy.name)
                .map_or(index, |existing| existing.create_index);
            policy.modify_index = index;
            self.policies.insert(policy.name.clone(), policy);
        }

        self.tables.policies = index;
        Ok(Applied::PoliciesUpserted)
    }

    fn delete_policies(&mut self, index: u64, names: &[String]) -> Result<Applied> {
        if names.is_empty() {
            return Err(AclError::InvalidRequest("must specify at least one policy".to_string()));
        }

        for name in names {
            // Tokens may still reference the policy; those references dangle.
            if self.policies.remove(name).is_none() {
                return Err(AclError::policy_not_found(name));
            }
        }

        self.tables.policies = index;
        Ok(Applied::PoliciesDeleted)
    }

    fn upsert_tokens(&mut self, index: u64, writes: Vec<TokenWrite>) -> Result<Applied> {
        if writes.is_empty() {
            return Err(AclError::InvalidRequest("must specify at least one token".to_string()));
        }

        let mut seen = HashSet::with_capacity(writes.len());
        let mut out = Vec::with_capacity(writes.len());

        for TokenWrite {
            mut token,
            minted_accessor,
            minted_secret,
        } in writes
        {
            token.validate()?;
            if token.accessor_id.is_empty() || token.secret_id.is_empty() {
                return Err(AclError::InvalidRequest(
                    "token identifiers must be assigned before commit".to_string(),
                ));
            }

            if !seen.insert(token.accessor_id.clone()) {
                if minted_accessor {
                    return Ok(Applied::Collided);
                }
                return Err(AclError::Conflict(format!(
                    "accessor ID {} appears more than once",
                    token.accessor_id
                )));
            }

            match self.tokens.get(&token.accessor_id) {
                Some(_) if minted_accessor => return Ok(Applied::Collided),
                Some(existing) => {
                    if !minted_secret && token.secret_id != existing.secret_id {
                        return Err(AclError::Conflict(format!(
                            "secret ID of token {} cannot be changed",
                            token.accessor_id
                        )));
                    }
                    token.secret_id = existing.secret_id.clone();
                    token.create_time = existing.create_time;
                    token.create_index = existing.create_index;
                }
                None => {
                    if self.secrets.contains_key(&token.secret_id) {
                        if minted_secret {
                            return Ok(Applied::Collided);
                        }
                        return Err(AclError::Conflict("secret ID already in use".to_string()));
                    }
                    token.create_index = index;
                }
            }

            token.modify_index = index;
            self.secrets
                .insert(token.secret_id.clone(), token.accessor_id.clone());
            self.tokens.insert(token.accessor_id.clone(), token.clone());
            out.push(token);
        }

        self.tables.tokens = index;
        Ok(Applied::TokensUpserted(out))
    }

    fn delete_tokens(&mut self, index: u64, accessor_ids: &[String]) -> Result<Applied> {
        if accessor_ids.is_empty() {
            return Err(AclError::InvalidRequest("must specify at least one token".to_string()));
        }

        for accessor_id in accessor_ids {
            let token = self
                .tokens
                .remove(accessor_id)
                .ok_or_else(|| AclError::token_not_found(accessor_id))?;
            self.secrets.remove(&token.secret_id);

            let before = self.one_time_tokens.len();
            self.one_time_tokens
                .retain(|_, ott| ott.accessor_id != *accessor_id);
            if self.one_time_tokens.len() != before {
                self.tables.one_time_tokens = index;
            }
        }

        self.tables.tokens = index;
        Ok(Applied::TokensDeleted)
    }

    fn bootstrap_token(&mut self, index: u64, mut token: Token) -> Result<Applied> {
        if let Some(marker) = &self.bootstrap {
            return Err(AclError::AlreadyBootstrapped {
                index: marker.index,
            });
        }
        if !token.is_management() {
            return Err(AclError::InvalidRequest(
                "bootstrap token must be a management token".to_string(),
            ));
        }
        if self.tokens.contains_key(&token.accessor_id)
            || self.secrets.contains_key(&token.secret_id)
        {
            return Ok(Applied::Collided);
        }

        token.create_index = index;
        token.modify_index = index;
        self.secrets
            .insert(token.secret_id.clone(), token.accessor_id.clone());
        self.tokens.insert(token.accessor_id.clone(), token.clone());
        self.bootstrap = Some(BootstrapMarker {
            index,
            accessor_id: token.accessor_id.clone(),
        });

        self.tables.tokens = index;
        Ok(Applied::Bootstrapped(token))
    }

    fn upsert_one_time_token(&mut self, index: u64, mut ott: OneTimeToken) -> Result<Applied> {
        // The issuing token may have been deleted since the request was made.
        if !self.tokens.contains_key(&ott.accessor_id) {
            return Err(AclError::PermissionDenied);
        }
        if self.one_time_tokens.contains_key(&ott.one_time_secret_id) {
            return Ok(Applied::Collided);
        }

        ott.create_index = index;
        ott.modify_index = index;
        self.one_time_tokens
            .insert(ott.one_time_secret_id.clone(), ott.clone());

        self.tables.one_time_tokens = index;
        Ok(Applied::OneTimeTokenIssued(ott))
    }

    fn exchange_one_time_token(
        &mut self,
        index: u64,
        one_time_secret_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Applied> {
        let ott = self
            .one_time_tokens
            .remove(one_time_secret_id)
            .ok_or(AclError::PermissionDenied)?;
        if ott.is_expired(now) {
            return Err(AclError::PermissionDenied);
        }
        let token = self
            .tokens
            .get(&ott.accessor_id)
            .cloned()
            .ok_or(AclError::PermissionDenied)?;

        self.tables.one_time_tokens = index;
        Ok(Applied::Exchanged(token))
    }

    fn expire_one_time_tokens(&mut self, index: u64, now: DateTime<Utc>) -> Applied {
        let before = self.one_time_tokens.len();
        self.one_time_tokens.retain(|_, ott| !ott.is_expired(now));
        let removed = before - self.one_time_tokens.len();

        if removed > 0 {
            self.tables.one_time_tokens = index;
        }
        Applied::OneTimeTokensExpired(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{generate_id, TokenType, BOOTSTRAP_TOKEN_NAME};
    use chrono::Duration;

    fn minted(mut token: Token) -> TokenWrite {
        token.accessor_id = generate_id();
        token.secret_id = generate_id();
        TokenWrite {
            token,
            minted_accessor: true,
            minted_secret: true,
        }
    }

    fn client(name: &str) -> Token {
        Token::client(name, vec!["readonly".to_string()])
    }

    fn bootstrap_token() -> Token {
        let mut token = Token::management(BOOTSTRAP_TOKEN_NAME);
        token.accessor_id = generate_id();
        token.secret_id = generate_id();
        token.global = true;
        token
    }

    fn upserted(applied: Applied) -> Vec<Token> {
        match applied {
            Applied::TokensUpserted(tokens) => tokens,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    fn create_clients(state: &mut AclState, index: u64, names: &[&str]) -> Vec<Token> {
        let tokens = names.iter().map(|name| minted(client(name))).collect();
        upserted(state.apply(index, LogEntry::UpsertTokens { tokens }).unwrap())
    }

    #[test]
    fn test_policy_upsert_preserves_create_index() {
        let mut state = AclState::default();
        state
            .apply(3, LogEntry::UpsertPolicies { policies: vec![Policy::new("readonly", "v1")] })
            .unwrap();
        state
            .apply(7, LogEntry::UpsertPolicies { policies: vec![Policy::new("readonly", "v2")] })
            .unwrap();

        let policy = state.policy("readonly").unwrap();
        assert_eq!(policy.rules, "v2");
        assert_eq!(policy.create_index, 3);
        assert_eq!(policy.modify_index, 7);
        assert_eq!(state.table_index(crate::state::Table::Policies), 7);
    }

    #[test]
    fn test_policy_batch_is_all_or_nothing() {
        let mut state = AclState::default();
        let err = state
            .apply(
                1,
                LogEntry::UpsertPolicies {
                    policies: vec![Policy::new("good", ""), Policy::new("bad name", "")],
                },
            )
            .unwrap_err();
        assert!(matches!(err, AclError::InvalidRequest(_)));
    }

    #[test]
    fn test_token_update_keeps_secret_and_creation() {
        let mut state = AclState::default();
        let created = create_clients(&mut state, 1, &["web"]);
        let original = created[0].clone();

        let mut update = original.clone();
        update.name = "web-renamed".to_string();
        update.secret_id = generate_id();
        let updated = upserted(
            state
                .apply(
                    2,
                    LogEntry::UpsertTokens {
                        tokens: vec![TokenWrite {
                            token: update,
                            minted_accessor: false,
                            minted_secret: true,
                        }],
                    },
                )
                .unwrap(),
        );

        assert_eq!(updated[0].secret_id, original.secret_id);
        assert_eq!(updated[0].create_index, 1);
        assert_eq!(updated[0].modify_index, 2);
        assert_eq!(updated[0].name, "web-renamed");
    }

    #[test]
    fn test_token_secret_change_is_conflict() {
        let mut state = AclState::default();
        let created = create_clients(&mut state, 1, &["web"]);

        let mut update = created[0].clone();
        update.secret_id = generate_id();
        let err = state
            .apply(
                2,
                LogEntry::UpsertTokens {
                    tokens: vec![TokenWrite {
                        token: update,
                        minted_accessor: false,
                        minted_secret: false,
                    }],
                },
            )
            .unwrap_err();
        assert!(matches!(err, AclError::Conflict(_)));
    }

    #[test]
    fn test_duplicate_explicit_accessor_in_batch_is_conflict() {
        let mut state = AclState::default();
        let mut first = client("a");
        first.accessor_id = "fixed".to_string();
        first.secret_id = generate_id();
        let mut second = client("b");
        second.accessor_id = "fixed".to_string();
        second.secret_id = generate_id();

        let writes = vec![first, second]
            .into_iter()
            .map(|token| TokenWrite {
                token,
                minted_accessor: false,
                minted_secret: true,
            })
            .collect();

        let err = state.apply(1, LogEntry::UpsertTokens { tokens: writes }).unwrap_err();
        assert!(matches!(err, AclError::Conflict(_)));
    }

    #[test]
    fn test_explicit_secret_reuse_is_conflict() {
        let mut state = AclState::default();
        let created = create_clients(&mut state, 1, &["a"]);

        let mut other = client("b");
        other.accessor_id = generate_id();
        other.secret_id = created[0].secret_id.clone();
        let err = state
            .apply(
                2,
                LogEntry::UpsertTokens {
                    tokens: vec![TokenWrite {
                        token: other,
                        minted_accessor: true,
                        minted_secret: false,
                    }],
                },
            )
            .unwrap_err();
        assert!(matches!(err, AclError::Conflict(_)));
    }

    #[test]
    fn test_minted_collision_reports_collided() {
        let mut state = AclState::default();
        let created = create_clients(&mut state, 1, &["a"]);

        let mut clash = minted(client("b"));
        clash.token.accessor_id = created[0].accessor_id.clone();
        let applied = state.apply(2, LogEntry::UpsertTokens { tokens: vec![clash] }).unwrap();

        assert_eq!(applied, Applied::Collided);
        assert_eq!(state.index(), 1);
    }

    #[test]
    fn test_bootstrap_is_compare_and_set() {
        let mut state = AclState::default();
        let first = state.apply(4, LogEntry::Bootstrap { token: bootstrap_token() }).unwrap();
        let token = match first {
            Applied::Bootstrapped(token) => token,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(token.token_type, TokenType::Management);
        assert_eq!(state.bootstrap_marker().unwrap().index, 4);

        let err = state
            .apply(5, LogEntry::Bootstrap { token: bootstrap_token() })
            .unwrap_err();
        assert_eq!(err, AclError::AlreadyBootstrapped { index: 4 });
        assert_eq!(state.tokens().count(), 1);
    }

    #[test]
    fn test_bootstrap_marker_survives_token_deletion() {
        let mut state = AclState::default();
        let token = bootstrap_token();
        let accessor = token.accessor_id.clone();
        state.apply(1, LogEntry::Bootstrap { token }).unwrap();
        state
            .apply(2, LogEntry::DeleteTokens { accessor_ids: vec![accessor] })
            .unwrap();

        assert!(state.bootstrap_marker().is_some());
        assert!(state.apply(3, LogEntry::Bootstrap { token: bootstrap_token() }).is_err());
    }

    fn issue(
        state: &mut AclState,
        index: u64,
        accessor_id: &str,
        expires_at: DateTime<Utc>,
    ) -> String {
        let secret = generate_id();
        state
            .apply(
                index,
                LogEntry::UpsertOneTimeToken {
                    token: OneTimeToken {
                        one_time_secret_id: secret.clone(),
                        accessor_id: accessor_id.to_string(),
                        expires_at,
                        create_index: 0,
                        modify_index: 0,
                    },
                },
            )
            .unwrap();
        secret
    }

    #[test]
    fn test_exchange_consumes_exactly_once() {
        let mut state = AclState::default();
        let created = create_clients(&mut state, 1, &["a"]);
        let now = Utc::now();
        let secret = issue(&mut state, 2, &created[0].accessor_id, now + Duration::minutes(10));

        let exchange = LogEntry::ExchangeOneTimeToken {
            one_time_secret_id: secret.clone(),
            now,
        };
        match state.apply(3, exchange.clone()).unwrap() {
            Applied::Exchanged(token) => assert_eq!(token, created[0]),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(state.one_time_token(&secret).is_none());
        assert_eq!(state.apply(4, exchange).unwrap_err(), AclError::PermissionDenied);
    }

    #[test]
    fn test_exchange_of_expired_token_is_denied() {
        let mut state = AclState::default();
        let created = create_clients(&mut state, 1, &["a"]);
        let now = Utc::now();
        let secret = issue(&mut state, 2, &created[0].accessor_id, now);

        let err = state
            .apply(
                3,
                LogEntry::ExchangeOneTimeToken {
                    one_time_secret_id: secret,
                    now,
                },
            )
            .unwrap_err();
        assert_eq!(err, AclError::PermissionDenied);
    }

    #[test]
    fn test_issue_for_unknown_accessor_is_denied() {
        let mut state = AclState::default();
        let err = state
            .apply(
                1,
                LogEntry::UpsertOneTimeToken {
                    token: OneTimeToken {
                        one_time_secret_id: generate_id(),
                        accessor_id: "nobody".to_string(),
                        expires_at: Utc::now(),
                        create_index: 0,
                        modify_index: 0,
                    },
                },
            )
            .unwrap_err();
        assert_eq!(err, AclError::PermissionDenied);
    }

    #[test]
    fn test_expire_and_cascade() {
        let mut state = AclState::default();
        let created = create_clients(&mut state, 1, &["a", "b"]);
        let now = Utc::now();
        issue(&mut state, 2, &created[0].accessor_id, now - Duration::seconds(1));
        issue(&mut state, 3, &created[0].accessor_id, now + Duration::minutes(10));
        issue(&mut state, 4, &created[1].accessor_id, now + Duration::minutes(10));

        assert!(state.has_expired_one_time_tokens(now));
        assert_eq!(
            state.apply(5, LogEntry::ExpireOneTimeTokens { now }).unwrap(),
            Applied::OneTimeTokensExpired(1)
        );
        assert_eq!(state.one_time_tokens().count(), 2);

        state
            .apply(6, LogEntry::DeleteTokens { accessor_ids: vec![created[0].accessor_id.clone()] })
            .unwrap();
        let remaining: Vec<_> = state.one_time_tokens().collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].accessor_id, created[1].accessor_id);
    }
}
