//! Session Authentication
//!
//! Validates the bearer credential presented at connection time and resolves
//! it to a user id. Runs once per connection, before the session is
//! registered; every failure is terminal for the connection attempt.

use std::sync::Arc;

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::domain::IdentityRepository;
use crate::shared::error::AuthError;

/// JWT claims carried by a session credential.
#[derive(Debug, Deserialize)]
pub struct Claims {
    /// Subject: a numeric user id, or an opaque external identifier.
    pub sub: String,
    pub exp: usize,
}

/// Validates session credentials and resolves identities.
pub struct SessionAuthenticator {
    decoding_key: DecodingKey,
    identities: Arc<dyn IdentityRepository>,
}

impl SessionAuthenticator {
    pub fn new(secret: &str, identities: Arc<dyn IdentityRepository>) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            identities,
        }
    }

    /// Authenticate a connection attempt.
    ///
    /// `token` is whatever credential accompanied the handshake, if any.
    /// Returns the resolved user id, or the failure the client is told about
    /// before close.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<i64, AuthError> {
        let token = token.ok_or(AuthError::MissingCredential)?;

        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredCredential,
                _ => AuthError::MalformedCredential,
            }
        })?;

        // A numeric subject is the user id directly; anything else is an
        // external identifier that must resolve to a known user.
        if let Ok(user_id) = data.claims.sub.parse::<i64>() {
            return Ok(user_id);
        }

        match self.identities.find_by_external_id(&data.claims.sub).await {
            Ok(Some(user_id)) => Ok(user_id),
            Ok(None) => Err(AuthError::UnresolvableIdentity),
            Err(e) => {
                tracing::error!(error = %e, "Identity lookup failed during authentication");
                Err(AuthError::UnresolvableIdentity)
            }
        }
    }
}
