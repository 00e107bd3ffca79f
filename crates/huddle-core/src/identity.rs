//! Identity verification.
//!
//! Token validation is delegated to an [`IdentityVerifier`]. The hub only
//! needs the claims a token resolves to; how tokens are issued or signed is
//! the provider's business.

use async_trait::async_trait;
use huddle_protocol::{ProfileTag, UserPresence};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Claims of a verified connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user id.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Email address, if the provider knows it.
    pub email: Option<String>,
    /// Profile tag, if the provider supplied a valid one.
    pub profile: Option<ProfileTag>,
}

impl Identity {
    /// The presence record announced for this identity.
    #[must_use]
    pub fn presence(&self) -> UserPresence {
        UserPresence::new(self.user_id.clone(), self.name.clone(), self.profile)
    }
}

/// Identity verification errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Identity provider error: {0}")]
    Provider(String),
}

/// Validates a bearer token and returns the caller's identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify a token.
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}

/// One entry of a static token table.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticUser {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Raw profile claim; values outside 1..=4 are treated as unknown.
    #[serde(default)]
    pub profile: Option<i64>,
}

/// Verifier backed by a fixed token table.
///
/// Suited to development and tests. Production deployments plug their own
/// provider in through [`IdentityVerifier`].
#[derive(Clone, Default)]
pub struct StaticIdentityVerifier {
    tokens: HashMap<String, StaticUser>,
}

impl fmt::Debug for StaticIdentityVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticIdentityVerifier")
            .field("tokens", &self.tokens.len())
            .finish()
    }
}

impl StaticIdentityVerifier {
    /// Create an empty verifier that rejects every token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a verifier from a token table.
    #[must_use]
    pub fn from_tokens(tokens: HashMap<String, StaticUser>) -> Self {
        Self { tokens }
    }

    /// Add a token.
    #[must_use]
    pub fn with_token(
        mut self,
        token: impl Into<String>,
        user_id: impl Into<String>,
        name: impl Into<String>,
        profile: Option<i64>,
    ) -> Self {
        self.tokens.insert(
            token.into(),
            StaticUser {
                user_id: user_id.into(),
                name: name.into(),
                email: None,
                profile,
            },
        );
        self
    }

    /// Number of known tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        if token.is_empty() {
            return Err(IdentityError::MissingToken);
        }
        let user = self.tokens.get(token).ok_or(IdentityError::InvalidToken)?;

        Ok(Identity {
            user_id: user.user_id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            profile: user.profile.and_then(ProfileTag::from_claim),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_verifier() {
        let verifier = StaticIdentityVerifier::new()
            .with_token("tok-a", "u1", "Alice", Some(2))
            .with_token("tok-b", "u2", "Bob", Some(9));

        let alice = verifier.verify("tok-a").await.unwrap();
        assert_eq!(alice.user_id, "u1");
        assert_eq!(alice.profile, Some(ProfileTag::Profile2));
        assert_eq!(alice.presence().name, "Alice");

        // Out-of-range profile claims degrade to unknown
        let bob = verifier.verify("tok-b").await.unwrap();
        assert_eq!(bob.profile, None);
    }

    #[tokio::test]
    async fn test_static_verifier_rejects() {
        let verifier = StaticIdentityVerifier::new().with_token("tok-a", "u1", "Alice", None);

        assert!(matches!(
            verifier.verify("").await,
            Err(IdentityError::MissingToken)
        ));
        assert!(matches!(
            verifier.verify("nope").await,
            Err(IdentityError::InvalidToken)
        ));
    }
}
