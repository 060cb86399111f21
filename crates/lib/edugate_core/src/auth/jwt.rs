//! JWT token generation and verification.
//!
//! Access and refresh tokens are HS256 JWTs signed with distinct secrets and
//! carrying distinct claim shapes.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use tracing::{debug, info, warn};

use super::{AuthError, INVALID_REFRESH_TOKEN};
use crate::models::auth::{AccessClaims, RefreshClaims, TokenPair};
use crate::models::user::UserRecord;

/// Access token lifetime when the configured duration is unusable: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Refresh token lifetime when the configured duration is unusable: 7 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Longest accepted token lifetime: 10 years.
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

fn expires_at(now: DateTime<Utc>, ttl_secs: i64) -> Result<DateTime<Utc>, AuthError> {
    Duration::try_seconds(ttl_secs)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| AuthError::TokenError(format!("token lifetime {ttl_secs}s out of range")))
}

/// Parse a `<integer><unit>` duration (`s`, `m`, `h`, `d`) into seconds.
///
/// Anything else, including zero, values above [`MAX_TTL_SECS`] or surrounding
/// whitespace, yields `fallback_secs`.
pub fn parse_duration(value: &str, fallback_secs: i64) -> i64 {
    let Some(unit) = value.chars().last() else {
        return fallback_secs;
    };
    let digits = &value[..value.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return fallback_secs;
    }
    let multiplier: i64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        _ => return fallback_secs,
    };
    match digits.parse::<i64>().ok().and_then(|n| n.checked_mul(multiplier)) {
        Some(secs) if secs > 0 && secs <= MAX_TTL_SECS => secs,
        _ => fallback_secs,
    }
}

/// Issues and verifies access/refresh token pairs.
#[derive(Clone)]
pub struct TokenIssuer {
    access_secret: Vec<u8>,
    refresh_secret: Vec<u8>,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Build an issuer from secrets and duration strings (e.g. `"15m"`, `"7d"`).
    pub fn new(
        access_secret: &str,
        access_duration: &str,
        refresh_secret: &str,
        refresh_duration: &str,
    ) -> Result<Self, AuthError> {
        if access_secret.is_empty() || refresh_secret.is_empty() {
            return Err(AuthError::Internal("token secrets must not be empty".into()));
        }
        if access_secret == refresh_secret {
            return Err(AuthError::Internal(
                "access and refresh secrets must differ".into(),
            ));
        }
        Ok(Self {
            access_secret: access_secret.as_bytes().to_vec(),
            refresh_secret: refresh_secret.as_bytes().to_vec(),
            access_ttl_secs: parse_duration(access_duration, DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl_secs: parse_duration(refresh_duration, DEFAULT_REFRESH_TTL_SECS),
        })
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    /// Sign a new access + refresh pair for `user`, scoped to the given tenant
    /// and school.
    pub fn generate_token_pair(
        &self,
        user: &UserRecord,
        tenant_id: Option<&str>,
        school_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let access_exp = expires_at(now, self.access_ttl_secs)?;
        let refresh_exp = expires_at(now, self.refresh_ttl_secs)?;

        let access = AccessClaims {
            id: user.id.clone(),
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.display_name(),
            tenant_id: tenant_id.map(str::to_string),
            school_id: school_id.map(str::to_string),
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
        };
        let refresh = RefreshClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
        };

        let access_token = encode(
            &Header::default(),
            &access,
            &EncodingKey::from_secret(&self.access_secret),
        )
        .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))?;
        let refresh_token = encode(
            &Header::default(),
            &refresh,
            &EncodingKey::from_secret(&self.refresh_secret),
        )
        .map_err(|e| AuthError::TokenError(format!("jwt encode: {e}")))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_token_expires_at: access_exp.timestamp_millis(),
            refresh_token_expires_at: refresh_exp.timestamp_millis(),
        })
    }

    /// Verify an access token's signature and expiry.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(&self.access_secret),
            &validation(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!(error = %e, "access token rejected");
            AuthError::Session(super::SessionRejection::InvalidToken)
        })
    }

    /// Verify a refresh token. Every failure mode yields the same error.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(&self.refresh_secret),
            &validation(),
        )
        .map(|data| data.claims)
        .map_err(|e| {
            debug!(error = %e, "refresh token rejected");
            AuthError::Unauthorized(INVALID_REFRESH_TOKEN.into())
        })
    }
}

fn validation() -> Validation {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;
    validation
}

/// Resolve a signing secret: env var `env_key` → persisted file `file_name`
/// → newly generated and persisted.
pub fn resolve_secret(env_key: &str, file_name: &str) -> String {
    if let Ok(secret) = std::env::var(env_key)
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = secret_path(file_name);
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(&secret_path, &secret) {
        warn!(path = %secret_path.display(), error = %e, "could not persist secret");
    } else {
        info!(path = %secret_path.display(), "generated new signing secret");
    }
    secret
}

/// Path to a persisted secret file.
fn secret_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("edugate")
        .join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{UserRole, UserStatus};

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("access-secret", "15m", "refresh-secret", "7d").unwrap()
    }

    fn user() -> UserRecord {
        UserRecord {
            id: "u1".into(),
            tenant_id: "t1".into(),
            school_id: Some("s1".into()),
            email: "a@b.com".into(),
            password_hash: None,
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            role: UserRole::Teacher,
            status: UserStatus::Active,
            sso_provider: None,
            sso_id: None,
            reset_password_token: None,
            reset_password_expires: None,
            magic_link_token: None,
            magic_link_expires: None,
            email_verification_token: None,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("15m", 1), 900);
        assert_eq!(parse_duration("7d", 1), 604_800);
        assert_eq!(parse_duration("30s", 1), 30);
        assert_eq!(parse_duration("2h", 1), 7_200);
    }

    #[test]
    fn parse_duration_falls_back() {
        assert_eq!(parse_duration("abc", DEFAULT_ACCESS_TTL_SECS), 900);
        assert_eq!(parse_duration("", DEFAULT_REFRESH_TTL_SECS), 604_800);
        assert_eq!(parse_duration("15", 42), 42);
        assert_eq!(parse_duration("m", 42), 42);
        assert_eq!(parse_duration("15w", 42), 42);
        assert_eq!(parse_duration(" 15m", 42), 42);
        assert_eq!(parse_duration("-5m", 42), 42);
        assert_eq!(parse_duration("0s", 42), 42);
        assert_eq!(parse_duration("99999999999999999999d", 42), 42);
        assert_eq!(parse_duration("5é", 42), 42);
        assert_eq!(parse_duration("9999999999999s", 42), 42);
        assert_eq!(parse_duration("3651d", 42), 42);
        assert_eq!(parse_duration("3650d", 42), MAX_TTL_SECS);
    }

    #[test]
    fn oversized_duration_still_issues_tokens() {
        let issuer = TokenIssuer::new("a", "9999999999999s", "b", "7d").unwrap();
        assert_eq!(issuer.access_ttl_secs(), DEFAULT_ACCESS_TTL_SECS);
        let pair = issuer
            .generate_token_pair(&user(), Some("t1"), None, Utc::now())
            .unwrap();
        let claims = issuer.verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.exp - claims.iat, DEFAULT_ACCESS_TTL_SECS);
    }

    #[test]
    fn out_of_range_expiry_is_a_token_error() {
        assert!(matches!(
            expires_at(Utc::now(), i64::MAX),
            Err(AuthError::TokenError(_))
        ));
    }

    #[test]
    fn unparseable_durations_use_defaults() {
        let issuer = TokenIssuer::new("a", "abc", "b", "never").unwrap();
        assert_eq!(issuer.access_ttl_secs(), DEFAULT_ACCESS_TTL_SECS);
        assert_eq!(issuer.refresh_ttl_secs(), DEFAULT_REFRESH_TTL_SECS);
    }

    #[test]
    fn identical_secrets_are_refused() {
        assert!(TokenIssuer::new("same", "15m", "same", "7d").is_err());
        assert!(TokenIssuer::new("", "15m", "other", "7d").is_err());
    }

    #[test]
    fn pair_carries_scope_and_expiry() {
        let issuer = issuer();
        let now = Utc::now();
        let pair = issuer
            .generate_token_pair(&user(), Some("t1"), Some("s1"), now)
            .unwrap();

        let claims = issuer.verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.id, "u1");
        assert_eq!(claims.name, "Ada Lovelace");
        assert_eq!(claims.tenant_id.as_deref(), Some("t1"));
        assert_eq!(claims.school_id.as_deref(), Some("s1"));
        assert_eq!(claims.exp - claims.iat, 900);

        let refresh = issuer.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(refresh.sub, "u1");
        assert_eq!(refresh.email, "a@b.com");

        assert!(pair.access_token_expires_at > now.timestamp_millis());
        assert_eq!(
            pair.refresh_token_expires_at - now.timestamp_millis(),
            604_800_000
        );
    }

    #[test]
    fn tokens_are_not_interchangeable() {
        let issuer = issuer();
        let pair = issuer
            .generate_token_pair(&user(), Some("t1"), None, Utc::now())
            .unwrap();
        assert!(issuer.verify_access(&pair.refresh_token).is_err());
        assert!(issuer.verify_refresh(&pair.access_token).is_err());
    }

    #[test]
    fn refresh_failures_are_uniform() {
        let issuer = issuer();
        let other = TokenIssuer::new("x-access", "15m", "x-refresh", "7d").unwrap();
        let foreign = other
            .generate_token_pair(&user(), None, None, Utc::now())
            .unwrap()
            .refresh_token;
        let expired = issuer
            .generate_token_pair(&user(), None, None, Utc::now() - Duration::days(30))
            .unwrap()
            .refresh_token;

        for token in [foreign.as_str(), expired.as_str(), "not.a.jwt", ""] {
            match issuer.verify_refresh(token) {
                Err(AuthError::Unauthorized(msg)) => assert_eq!(msg, INVALID_REFRESH_TOKEN),
                other => panic!("unexpected result for {token:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let issuer = issuer();
        let pair = issuer
            .generate_token_pair(&user(), None, None, Utc::now() - Duration::hours(1))
            .unwrap();
        assert!(matches!(
            issuer.verify_access(&pair.access_token),
            Err(AuthError::Session(super::super::SessionRejection::InvalidToken))
        ));
    }
}
