//! Single-use secrets (password reset, magic link, email verification).
//!
//! The plaintext goes to the user; only its SHA-256 digest is stored.

use chrono::Duration;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};

/// Reset tokens expire one hour after issue.
pub const RESET_TOKEN_TTL: Duration = Duration::hours(1);

/// Magic links expire fifteen minutes after issue.
pub const MAGIC_LINK_TTL: Duration = Duration::minutes(15);

/// Generate a random token (64 alphanumeric chars).
pub fn generate_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a token for storage.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
