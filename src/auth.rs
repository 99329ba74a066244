//! Authentication tokens and session management
//!
//! Obtaining a token requires signing a challenge with the taxpayer's
//! certificate and private key (FIEL). That exchange belongs to the host
//! application, which plugs it in through the [`Authenticator`] trait. This
//! module only keeps the resulting token fresh for the length of a run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::AuthError;

/// Bearer token issued by the authentication service
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    /// Create a token that stops being valid at `expires_at`
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// The raw token, as sent in the authorization header
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the token stops being valid
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token is expired, or will be within `margin`, at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
        now + margin >= self.expires_at
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let visible: String = self.value.chars().take(8).collect();
        f.debug_struct("Token")
            .field("value", &format_args!("{visible}…"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Exchanges a signing identity for a token
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Obtain a new token
    ///
    /// # Errors
    ///
    /// [`AuthError::Rejected`] when the authority refuses the identity,
    /// [`AuthError::Transport`] when it cannot be reached.
    async fn authenticate(&self) -> Result<Token, AuthError>;
}

#[async_trait]
impl<T: Authenticator + ?Sized> Authenticator for std::sync::Arc<T> {
    async fn authenticate(&self) -> Result<Token, AuthError> {
        (**self).authenticate().await
    }
}

#[async_trait]
impl<T: Authenticator + ?Sized> Authenticator for Box<T> {
    async fn authenticate(&self) -> Result<Token, AuthError> {
        (**self).authenticate().await
    }
}

/// Authenticator that hands out a token obtained elsewhere
///
/// Useful when the host already ran the signed exchange (or for tests). Once
/// the token expires every further call fails with [`AuthError::Rejected`].
#[derive(Debug, Clone)]
pub struct StaticTokenAuthenticator {
    token: Token,
}

impl StaticTokenAuthenticator {
    /// Wrap an existing token
    pub fn new(token: Token) -> Self {
        Self { token }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self) -> Result<Token, AuthError> {
        if self.token.is_expired_at(Utc::now(), Duration::ZERO) {
            return Err(AuthError::Rejected(format!(
                "static token expired at {}",
                self.token.expires_at
            )));
        }
        Ok(self.token.clone())
    }
}

/// Caches the current token and renews it shortly before it expires
///
/// Tokens issued by the authority are short-lived compared with a polling
/// run, so every stage asks the session for a token right before using it.
pub struct Session<A> {
    authenticator: A,
    refresh_margin: Duration,
    current: Option<Token>,
}

impl<A: Authenticator> Session<A> {
    /// Create a session that renews tokens expiring within `refresh_margin`
    pub fn new(authenticator: A, refresh_margin: Duration) -> Self {
        Self {
            authenticator,
            refresh_margin,
            current: None,
        }
    }

    /// A token valid for at least `refresh_margin`, authenticating if needed
    pub async fn token(&mut self) -> Result<Token, AuthError> {
        let now = Utc::now();
        if let Some(token) = &self.current
            && !token.is_expired_at(now, self.refresh_margin)
        {
            return Ok(token.clone());
        }

        if self.current.is_some() {
            tracing::info!("token about to expire, re-authenticating");
        } else {
            tracing::info!("authenticating");
        }

        match self.authenticator.authenticate().await {
            Ok(token) => {
                tracing::debug!(expires_at = %token.expires_at(), "token obtained");
                self.current = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                tracing::error!(error = %e, "authentication failed");
                self.current = None;
                Err(e)
            }
        }
    }
}
