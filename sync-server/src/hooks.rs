//! Hooks supplied by the embedding application.
//!
//! Authentication and authorization are external, asynchronous policies.
//! The core awaits them with bounded timeouts and without holding any
//! shared lock, and discards their results if the session closed in the
//! meantime. A hook returning an error never crashes the process; it is
//! reported and treated as a denial.

use crate::reporter::SessionInfo;
use async_trait::async_trait;
use sync_types::{Action, Meta};

/// Result of a successful authentication hook call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credentials rejected; the session is closed as unauthenticated.
    Denied,
    /// Credentials accepted, optionally with a resolved user identity.
    Granted {
        /// Identity attached to the session and its actions.
        user: Option<String>,
    },
}

impl AuthOutcome {
    /// Grant without a user identity.
    pub fn granted() -> Self {
        Self::Granted { user: None }
    }

    /// Grant as the given user.
    pub fn user(user: impl Into<String>) -> Self {
        Self::Granted {
            user: Some(user.into()),
        }
    }
}

/// Decides whether a connecting node's credentials are valid.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Check `credentials` for the node claiming `node_id`.
    async fn authenticate(
        &self,
        credentials: &serde_json::Value,
        node_id: &str,
    ) -> anyhow::Result<AuthOutcome>;
}

/// Decides whether a session may submit an action.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Approve or deny `action` from `session`.
    async fn authorize(
        &self,
        action: &Action,
        meta: &Meta,
        session: &SessionInfo,
    ) -> anyhow::Result<bool>;
}

/// Authorizer that approves every action. The default policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(
        &self,
        _action: &Action,
        _meta: &Meta,
        _session: &SessionInfo,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Authenticator that accepts every node without an identity.
///
/// Useful in development and demos; production deployments supply their
/// own policy.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAccess;

#[async_trait]
impl Authenticator for OpenAccess {
    async fn authenticate(
        &self,
        _credentials: &serde_json::Value,
        _node_id: &str,
    ) -> anyhow::Result<AuthOutcome> {
        Ok(AuthOutcome::granted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::ActionId;

    #[tokio::test]
    async fn allow_all_approves() {
        let session = SessionInfo {
            session: 1,
            node_id: Some("client:a".into()),
            subprotocol: None,
            user: None,
        };
        let action = Action::new("test");
        let meta = Meta::new(ActionId::new(1, "client:a", 0), 0, "server:x");
        assert!(AllowAll.authorize(&action, &meta, &session).await.unwrap());
    }

    #[tokio::test]
    async fn open_access_grants_without_identity() {
        let outcome = OpenAccess
            .authenticate(&serde_json::Value::Null, "client:a")
            .await
            .unwrap();
        assert_eq!(outcome, AuthOutcome::granted());
    }
}
