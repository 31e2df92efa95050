//! Bearer-token authentication (spec §6: "all non-idempotent operations
//! require an authorisation header").
//!
//! Grounded on the teacher's `rbp-auth::{Crypto, Claims}` and
//! `auth::middleware::{Auth, MaybeAuth}` — same `FromRequest` shape, same
//! "missing header / bad prefix / bad token" error ladder. Adapted because
//! this system has no local member table: identity is asserted by an
//! upstream identity provider (Clerk) and carried as the JWT's `sub` claim,
//! so there is no `SELECT revoked FROM sessions` step — verifying the
//! signature and expiry *is* the whole check.
//!
//! Anonymous share-link sessions authenticate with the session's own
//! opaque access token instead of a JWT (`ac_session::anonymous`); the two
//! credential kinds are unified behind [`Principal`] so a single extractor
//! serves every session-scoped handler.
use actix_web::FromRequest;
use actix_web::HttpRequest;
use actix_web::dev::Payload;
use actix_web::web;
use ac_core::AssessmentError;
use ac_session::SessionOwner;
use ac_session::TestSession;
use ac_session::hash_token;
use std::future::Future;
use std::pin::Pin;

const ACCESS_TOKEN_DURATION: chrono::Duration = chrono::Duration::hours(12);

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    /// Clerk user id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(clerk_user_id: impl Into<String>, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            sub: clerk_user_id.into(),
            iat: now.timestamp(),
            exp: (now + ACCESS_TOKEN_DURATION).timestamp(),
        }
    }

    pub fn expired(&self) -> bool {
        self.exp < chrono::Utc::now().timestamp()
    }

    pub fn clerk_user_id(&self) -> &str {
        &self.sub
    }
}

/// Verifies and (in tests) issues bearer tokens. Production only ever calls
/// [`Crypto::decode`] — tokens are minted by the upstream identity provider,
/// not by this service — but `encode` is kept for test fixtures and local
/// development, mirroring the teacher's `Crypto`.
pub struct Crypto {
    encoding: jsonwebtoken::EncodingKey,
    decoding: jsonwebtoken::DecodingKey,
}

impl Crypto {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: jsonwebtoken::EncodingKey::from_secret(secret),
            decoding: jsonwebtoken::DecodingKey::from_secret(secret),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("JWT_SECRET").unwrap_or_default().as_bytes())
    }

    pub fn encode(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        jsonwebtoken::encode(&jsonwebtoken::Header::default(), claims, &self.encoding)
    }

    pub fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &jsonwebtoken::Validation::default()).map(|data| data.claims)
    }
}

/// The identity behind a session-scoped request: either a Clerk member
/// asserted by a verified JWT, or the bearer of a session's own access
/// token (spec §4.E "the cleartext token is ... thereafter accepted as the
/// session's bearer credential").
#[derive(Debug, Clone)]
pub enum Principal {
    Member(String),
    Anonymous(String),
}

/// Extractor requiring *some* bearer credential. Does not by itself prove
/// the caller owns a particular session — pair with [`authorize_session`].
pub struct Authenticated(pub Principal);

impl FromRequest for Authenticated {
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let crypto = req.app_data::<web::Data<Crypto>>().cloned();
        let header = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_owned());
        Box::pin(async move {
            let header = header.ok_or_else(|| actix_web::error::ErrorUnauthorized("missing authorization header"))?;
            let token = header
                .strip_prefix("Bearer ")
                .ok_or_else(|| actix_web::error::ErrorUnauthorized("invalid authorization format"))?;
            let crypto = crypto.ok_or_else(|| actix_web::error::ErrorInternalServerError("token service not configured"))?;
            match crypto.decode(token) {
                Ok(claims) if !claims.expired() => Ok(Authenticated(Principal::Member(claims.sub))),
                Ok(_) => Err(actix_web::error::ErrorUnauthorized("token expired")),
                Err(_) => Ok(Authenticated(Principal::Anonymous(token.to_string()))),
            }
        })
    }
}

/// Non-failing variant for endpoints that accept but do not require a
/// credential (mirrors the teacher's `MaybeAuth`).
pub struct MaybeAuthenticated(pub Option<Principal>);

impl FromRequest for MaybeAuthenticated {
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let inner = Authenticated::from_request(req, payload);
        Box::pin(async move {
            match inner.await {
                Ok(Authenticated(principal)) => Ok(MaybeAuthenticated(Some(principal))),
                Err(_) => Ok(MaybeAuthenticated(None)),
            }
        })
    }
}

/// Guards against reading or mutating someone else's session (spec §4.E,
/// §7 `PermissionDenied`). A member principal must match the session's
/// `clerk_user_id`; an anonymous principal must present the cleartext token
/// whose hash matches the stored `access_token_hash`.
pub fn authorize_session(session: &TestSession, principal: &Principal) -> Result<(), AssessmentError> {
    match (session.owner(), principal) {
        (SessionOwner::Member(owner_id), Principal::Member(sub)) if owner_id == sub => Ok(()),
        (SessionOwner::Anonymous, Principal::Anonymous(token)) if session.access_token_hash() == Some(hash_token(token).as_str()) => Ok(()),
        _ => Err(AssessmentError::permission_denied("not authorized for this session")),
    }
}

/// Extracts the raw bearer token without decoding it, for endpoints (like
/// starting an anonymous session from a share link) that hand back a fresh
/// opaque token rather than checking an existing one.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn round_trips_and_reports_expiry() {
        let crypto = Crypto::new(b"test-secret");
        let claims = Claims::new("clerk_abc123", Utc::now());
        let token = crypto.encode(&claims).unwrap();
        let decoded = crypto.decode(&token).unwrap();
        assert_eq!(decoded.clerk_user_id(), "clerk_abc123");
        assert!(!decoded.expired());
    }

    #[test]
    fn rejects_token_signed_with_a_different_secret() {
        let crypto_a = Crypto::new(b"secret-a");
        let crypto_b = Crypto::new(b"secret-b");
        let token = crypto_a.encode(&Claims::new("clerk_abc123", Utc::now())).unwrap();
        assert!(crypto_b.decode(&token).is_err());
    }

    #[test]
    fn member_authorizes_only_their_own_session() {
        use ac_core::ID;
        use ac_session::TestSession;

        let session = TestSession::start(
            ID::default(),
            ID::default(),
            1,
            SessionOwner::Member("clerk_abc123".to_string()),
            vec![],
            42,
            600,
            None,
            None,
            Utc::now(),
        );
        assert!(authorize_session(&session, &Principal::Member("clerk_abc123".to_string())).is_ok());
        assert!(authorize_session(&session, &Principal::Member("someone_else".to_string())).is_err());
    }
}
