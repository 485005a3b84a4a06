//! Staff authentication.
//!
//! Access tokens are HS256 JWTs signed with the shared `auth.jwt_secret`. They are issued
//! by `POST /staff/login` (or any other holder of the secret) and must carry the staff id
//! (`sub`) and the hospital the staff member works for (`hospital_id`). The hospital
//! becomes the scope of every patient operation on that request.

use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{config::AuthConfig, models::Staff, state::AppState};

/// JWT claims understood by this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffClaims {
    /// Staff id.
    pub sub: String,
    #[serde(default)]
    pub hospital_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: u64,
    #[serde(default)]
    pub iat: Option<u64>,
}

/// Authenticated staff member attached to the request by [`auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub staff_id: String,
    pub hospital_id: String,
    pub username: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AuthError {
    MissingToken,
    InvalidToken(String),
    MissingHospital,
    Misconfigured(String),
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken | Self::InvalidToken(_) | Self::MissingHospital => {
                StatusCode::UNAUTHORIZED
            }
            Self::Misconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::MissingToken => "missing bearer token".to_string(),
            Self::InvalidToken(msg) => format!("invalid bearer token: {msg}"),
            Self::MissingHospital => "token carries no hospital_id".to_string(),
            // Details stay in the log.
            Self::Misconfigured(_) => "internal error".to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Misconfigured(msg) = &self {
            tracing::error!("Authentication misconfigured: {}", msg);
        }

        let status = self.status();
        let mut response = (status, Json(json!({ "error": self.message() }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

/// Body of a successful `POST /staff/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Issues and verifies staff access tokens.
#[derive(Clone)]
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl_seconds: u64,
}

impl AuthManager {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.jwt_secret.trim().is_empty() {
            return Err(AuthError::Misconfigured(
                "auth.jwt_secret is not set".to_string(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_seconds;
        // Tokens are not audience-bound.
        validation.validate_aud = false;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            token_ttl_seconds: config.token_ttl_seconds,
        })
    }

    /// Sign an access token for `staff`, valid for `auth.token_ttl_seconds`.
    pub fn issue(&self, staff: &Staff) -> Result<IssuedToken, AuthError> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let claims = StaffClaims {
            sub: staff.id.to_string(),
            hospital_id: Some(staff.hospital_id.clone()),
            username: Some(staff.username.clone()),
            role: Some(staff.role.clone()),
            exp: now + self.token_ttl_seconds,
            iat: Some(now),
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Misconfigured(format!("failed to sign token: {e}")))?;

        Ok(IssuedToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.token_ttl_seconds,
        })
    }

    pub fn authenticate_headers(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let authz = headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?;

        let authz = authz.to_str().map_err(|_| {
            AuthError::InvalidToken("Authorization header is not valid UTF-8".to_string())
        })?;

        let token = authz
            .strip_prefix("Bearer ")
            .or_else(|| authz.strip_prefix("bearer "))
            .ok_or_else(|| {
                AuthError::InvalidToken("Authorization header must be 'Bearer <token>'".to_string())
            })?;

        self.verify(token.trim())
    }

    /// Decode and validate `token`, then map its claims to a [`Principal`].
    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let data = decode::<StaffClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        principal_from_claims(data.claims)
    }
}

fn principal_from_claims(claims: StaffClaims) -> Result<Principal, AuthError> {
    let staff_id = claims.sub.trim().to_string();
    if staff_id.is_empty() {
        return Err(AuthError::InvalidToken("token carries no subject".to_string()));
    }

    let hospital_id = claims
        .hospital_id
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .ok_or(AuthError::MissingHospital)?;

    Ok(Principal {
        staff_id,
        hospital_id,
        username: claims.username,
        role: claims.role,
    })
}

/// Extractor for the principal attached by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal(pub Principal);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthenticatedPrincipal)
            .ok_or(AuthError::MissingToken)
    }
}

/// Rejects requests without a valid staff token; attaches the [`Principal`] otherwise.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    match state.auth.authenticate_headers(req.headers()) {
        Ok(principal) => {
            tracing::Span::current().record("staff_id", principal.staff_id.as_str());
            req.extensions_mut().insert::<Principal>(principal);
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(path = %req.uri().path(), "Rejected request: {}", err.message());
            err.into_response()
        }
    }
}
