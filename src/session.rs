use std::{
    fmt,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::http::{HeaderMap, header};
use cookie::{Cookie, SameSite, time::Duration};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Sessions live for seven days; the same value drives the token `exp` and the cookie `Max-Age`.
pub const SESSION_TTL_DAYS: i64 = 7;

/// Role
///
/// The closed set of principals the application knows about. Any other value in a
/// session payload makes the whole payload invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
#[ts(export)]
pub enum Role {
    User,
    Broker,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Broker => "BROKER",
            Role::Admin => "ADMIN",
        }
    }

    /// Brokers and admins share the broker area.
    pub fn is_broker(&self) -> bool {
        matches!(self, Role::Broker | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role `{0}`")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "BROKER" => Ok(Role::Broker),
            "ADMIN" => Ok(Role::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Identity
///
/// The authenticated principal carried by the session cookie. Created at login or
/// registration, read (never mutated) by the gate on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_e164: Option<String>,
    pub verified: bool,
}

/// Why a raw cookie value did not yield an [`Identity`].
///
/// Bad signatures, expired tokens, unknown roles and plain garbage all land in
/// `Malformed`; callers only ever need to tell "no session" from "unusable session".
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("session cookie absent")]
    Absent,
    #[error("session cookie malformed")]
    Malformed,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    #[serde(flatten)]
    identity: Identity,
    iat: u64,
    exp: u64,
}

/// SessionCodec
///
/// Signs identities into HS256 tokens and verifies them back. Cheap to clone; the
/// keys are derived once from the configured secret.
#[derive(Clone)]
pub struct SessionCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCodec").finish_non_exhaustive()
    }
}

impl SessionCodec {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Signs `identity` into a token valid for [`SESSION_TTL_DAYS`].
    pub fn encode(&self, identity: &Identity) -> Result<String, jsonwebtoken::errors::Error> {
        let now = unix_now();
        let ttl = SESSION_TTL_DAYS as u64 * 24 * 60 * 60;
        self.encode_with_window(identity, now, now + ttl)
    }

    /// Signs with an explicit issue/expiry window.
    pub fn encode_with_window(
        &self,
        identity: &Identity,
        iat: u64,
        exp: u64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = SessionClaims {
            identity: identity.clone(),
            iat,
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// decode
    ///
    /// Turns the raw cookie value into an [`Identity`]. An empty value counts as
    /// absent, since that is what a cleared cookie looks like.
    pub fn decode(&self, raw: Option<&str>) -> Result<Identity, DecodeError> {
        let raw = match raw.map(str::trim) {
            None | Some("") => return Err(DecodeError::Absent),
            Some(raw) => raw,
        };

        match decode::<SessionClaims>(raw, &self.decoding, &self.validation) {
            Ok(data) => Ok(data.claims.identity),
            Err(e) => {
                tracing::debug!(reason = ?e.kind(), "rejecting session cookie");
                Err(DecodeError::Malformed)
            }
        }
    }

    /// decode_first
    ///
    /// Several `session` cookies can arrive at once when copies live under different
    /// paths; the first one that decodes wins. All-empty or none is `Absent`.
    pub fn decode_first(&self, raws: &[&str]) -> Result<Identity, DecodeError> {
        let mut outcome = Err(DecodeError::Absent);
        for raw in raws {
            match self.decode(Some(raw)) {
                Ok(identity) => return Ok(identity),
                Err(DecodeError::Malformed) => outcome = Err(DecodeError::Malformed),
                Err(DecodeError::Absent) => {}
            }
        }
        outcome
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// session_cookie
///
/// Builds the cookie written at login/registration: HTTP-only, `SameSite=Lax`,
/// seven-day `Max-Age`, root path, and `Secure` when `secure` is set.
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(SESSION_TTL_DAYS))
        .build()
}

/// removal_cookies
///
/// One expired, empty cookie per path the session was ever scoped to. Browsers key
/// cookies by (name, path), so clearing only `/` can leave an older copy alive.
pub fn removal_cookies(paths: &[String], secure: bool) -> Vec<Cookie<'static>> {
    paths
        .iter()
        .map(|path| {
            Cookie::build((SESSION_COOKIE, ""))
                .path(path.clone())
                .http_only(true)
                .secure(secure)
                .same_site(SameSite::Lax)
                .max_age(Duration::ZERO)
                .build()
        })
        .collect()
}

/// Every raw `session` value in the request's `Cookie` headers, in the order sent.
/// Browsers send the most specific path first, so a stale `/api/auth` copy can
/// precede the live `/` one.
pub fn read_session_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .filter(|c| c.name() == SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .collect()
}
