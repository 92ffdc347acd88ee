//! Authentication middleware for JWT token validation

use access::models::Actor;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    /// User roles
    pub roles: Vec<String>,
    /// User permissions
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Issued at time
    pub iat: u64,
    /// Expiration time
    pub exp: u64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
}

/// Token type enum
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub enum TokenType {
    /// Access token
    Access,
    /// Refresh token
    Refresh,
}

/// Key material used to verify bearer tokens
#[derive(Debug, Clone)]
pub enum JwtKey {
    /// RS256 public key in PEM form
    RsaPublicPem(String),
    /// HS256 shared secret
    Secret(String),
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub key: JwtKey,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// `JWT_PUBLIC_KEY` (PEM, or a path to a PEM file) selects RS256;
    /// otherwise `JWT_SECRET` selects HS256.
    pub fn from_env() -> Result<Self, String> {
        if let Ok(public_key) = env::var("JWT_PUBLIC_KEY") {
            let public_key = if public_key.starts_with("-----BEGIN") {
                public_key
            } else {
                std::fs::read_to_string(&public_key)
                    .map_err(|e| format!("Failed to read public key file: {}", e))?
                    .trim()
                    .to_string()
            };
            return Ok(Self {
                key: JwtKey::RsaPublicPem(public_key),
            });
        }

        let secret = env::var("JWT_SECRET")
            .map_err(|_| "neither JWT_PUBLIC_KEY nor JWT_SECRET is set".to_string())?;
        if secret.is_empty() {
            return Err("JWT_SECRET is empty".to_string());
        }
        Ok(Self::hs256(secret))
    }

    pub fn hs256(secret: impl Into<String>) -> Self {
        Self {
            key: JwtKey::Secret(secret.into()),
        }
    }

    /// Build the verifier once; key parsing errors surface at start-up
    pub fn verifier(&self) -> Result<JwtVerifier, jsonwebtoken::errors::Error> {
        let (decoding_key, algorithm) = match &self.key {
            JwtKey::RsaPublicPem(pem) => (DecodingKey::from_rsa_pem(pem.as_bytes())?, Algorithm::RS256),
            JwtKey::Secret(secret) => (DecodingKey::from_secret(secret.as_bytes()), Algorithm::HS256),
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;

        info!("JWT verification configured with {:?}", algorithm);
        Ok(JwtVerifier {
            decoding_key,
            validation,
        })
    }
}

/// Validates bearer tokens against the configured key
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Decode an access token into the caller it names
    pub fn authenticate(&self, token: &str) -> Result<Actor, ApiError> {
        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!("Rejected bearer token: {}", e);
                ApiError::Unauthorized
            })?;

        let claims = token_data.claims;
        if claims.token_type != TokenType::Access {
            debug!("Rejected {:?} token used as bearer", claims.token_type);
            return Err(ApiError::Unauthorized);
        }

        Ok(Actor::from_roles(claims.sub, &claims.roles))
    }
}

/// Authentication middleware
///
/// Resolves the bearer token into an [`Actor`] and inserts it into the
/// request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(ApiError::Unauthorized)?;
    let actor = state.jwt.authenticate(bearer.token())?;

    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}
