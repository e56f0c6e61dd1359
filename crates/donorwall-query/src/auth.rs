//! Bearer token gate in front of the query operations.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingHeader,
    #[error("authorization header is not a bearer token")]
    MalformedHeader,
    #[error("token rejected")]
    Rejected,
    #[error("no token verifier configured")]
    NoVerifier,
    #[error("token verification failed: {0}")]
    Verifier(String),
}

/// Decides whether a bearer token is valid. Token issuance lives elsewhere.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<bool, AuthError>;
}

/// Fixed allow-list of tokens.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashSet<String>,
}

impl StaticTokens {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    /// Comma-separated list, as held in an environment variable.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim))
    }
}

#[async_trait]
impl TokenVerifier for StaticTokens {
    async fn verify(&self, token: &str) -> Result<bool, AuthError> {
        Ok(self.tokens.contains(token))
    }
}

#[derive(Clone)]
pub struct Authenticator {
    enforced: bool,
    verifier: Option<Arc<dyn TokenVerifier>>,
}

impl Authenticator {
    /// Accepts every request.
    pub fn disabled() -> Self {
        Self {
            enforced: false,
            verifier: None,
        }
    }

    pub fn enforced(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            enforced: true,
            verifier: Some(verifier),
        }
    }

    /// Enforcement follows the deployment environment; `development` skips it.
    pub fn for_environment(environment: &str, verifier: Option<Arc<dyn TokenVerifier>>) -> Self {
        Self {
            enforced: !environment.eq_ignore_ascii_case("development"),
            verifier,
        }
    }

    pub fn is_enforced(&self) -> bool {
        self.enforced
    }

    /// `authorization` is the raw `Authorization` header value, if any.
    pub async fn authorize(&self, authorization: Option<&str>) -> Result<(), AuthError> {
        if !self.enforced {
            return Ok(());
        }

        let token = match authorization {
            Some(header) => header
                .strip_prefix("Bearer ")
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| {
                    debug!("malformed authorization header");
                    AuthError::MalformedHeader
                })?,
            None => {
                debug!("missing authorization header");
                return Err(AuthError::MissingHeader);
            }
        };

        let verifier = self.verifier.as_ref().ok_or(AuthError::NoVerifier)?;
        if verifier.verify(token).await? {
            Ok(())
        } else {
            debug!("invalid api token");
            Err(AuthError::Rejected)
        }
    }
}
