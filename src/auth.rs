use crate::db::{Db, DbResult};
use crate::http::request::Request;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

pub const SESSION_COOKIE: &str = "ott_session";
pub const SALT_LEN: usize = 16;
pub const HASH_LEN: usize = 32;
const PBKDF2_ITERATIONS: u32 = 200_000;

/// Accounts created at first boot so the service is usable out of the box.
const SEED_USERS: &[(&str, &str)] = &[("test", "test1234"), ("demo", "demo1234")];

type HmacSha256 = Hmac<Sha256>;

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// PBKDF2-HMAC-SHA256. The output is exactly one SHA-256 block, so this is
/// the single-block function of RFC 2898 §5.2.
pub fn derive_password_hash(password: &str, salt: &[u8]) -> [u8; HASH_LEN] {
    derive_with_iterations(password, salt, PBKDF2_ITERATIONS)
}

fn derive_with_iterations(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let prf =
        HmacSha256::new_from_slice(password.as_bytes()).expect("HMAC accepts any key length");
    let mut mac = prf.clone();
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut u: [u8; HASH_LEN] = mac.finalize().into_bytes().into();
    let mut out = u;
    for _ in 1..iterations {
        let mut mac = prf.clone();
        mac.update(&u);
        u = mac.finalize().into_bytes().into();
        for (acc, byte) in out.iter_mut().zip(u.iter()) {
            *acc ^= byte;
        }
    }
    out
}

pub fn verify_password(password: &str, salt: &[u8], expected: &[u8]) -> bool {
    let derived = derive_password_hash(password, salt);
    derived.as_slice().ct_eq(expected).into()
}

/// 32 random bytes, base64url without padding: 43 characters, never logged.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn session_cookie(token: &str, max_age_seconds: i64) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_seconds}")
}

pub fn clear_session_cookie() -> String {
    format!(
        "{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0; \
         Expires=Thu, 01 Jan 1970 00:00:00 GMT"
    )
}

/// Pulls the session token out of a `Cookie` header value. Does not
/// authenticate.
pub fn extract_session_token(cookie_header: Option<&str>) -> Option<String> {
    let header = cookie_header?;
    for cookie in header.split(';') {
        if let Some(token) = cookie.trim_start().strip_prefix(SESSION_COOKIE) {
            if let Some(token) = token.strip_prefix('=') {
                if !token.is_empty() {
                    return Some(token.to_owned());
                }
            }
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: i64,
    pub username: String,
    pub token: String,
}

/// Resolves the request's session cookie to a live user. An expired session
/// is deleted on sight and treated as absent.
pub fn authenticate(state: &crate::state::AppState, request: &Request) -> DbResult<Option<AuthedUser>> {
    let Some(token) = extract_session_token(request.header("cookie")) else {
        return Ok(None);
    };
    let Some(session) = state.db.get_session(&token)? else {
        return Ok(None);
    };
    if session.expires_at <= Utc::now() {
        state.db.delete_session(&token)?;
        return Ok(None);
    }
    let Some(username) = state.db.get_username(session.user_id)? else {
        return Ok(None);
    };
    Ok(Some(AuthedUser {
        user_id: session.user_id,
        username,
        token,
    }))
}

pub fn validate_username(username: &str) -> Result<(), &'static str> {
    if username.len() < 3 || username.len() > 32 {
        return Err("username must be 3-32 characters");
    }
    if !username
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_')
    {
        return Err("username may only contain letters, digits and underscores");
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), &'static str> {
    if password.len() < 8 || password.len() > 128 {
        return Err("password must be 8-128 characters");
    }
    Ok(())
}

/// First-boot seeding: each fixed account is inserted only when no row with
/// that username exists.
pub fn seed_users(db: &Db) -> DbResult<()> {
    for (username, password) in SEED_USERS {
        if db.get_user_credentials(username)?.is_some() {
            continue;
        }
        let salt = generate_salt();
        let hash = derive_password_hash(password, &salt);
        match db.upsert_user(username, &hash, &salt) {
            Ok(()) => info!(username = %username, "seeded user"),
            Err(err) => warn!(username = %username, error = %err, "failed to seed user"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // PBKDF2-HMAC-SHA256 test vectors (password "password", salt "salt").
    #[test]
    fn derivation_matches_published_vectors() {
        let one = derive_with_iterations("password", b"salt", 1);
        assert_eq!(
            one.to_vec(),
            hex_bytes("120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"),
        );
        let many = derive_with_iterations("password", b"salt", 4096);
        assert_eq!(
            many.to_vec(),
            hex_bytes("c5e478d59288c841aa530db6845c4c8d962893a001ce4e11a4963873aa98134a"),
        );
    }

    #[test]
    fn verify_accepts_only_the_original_password() {
        let salt = generate_salt();
        let hash = derive_password_hash("correct horse", &salt);
        assert!(verify_password("correct horse", &salt, &hash));
        assert!(!verify_password("correct horsf", &salt, &hash));
        assert!(!verify_password("", &salt, &hash));
    }

    #[test]
    fn tokens_are_url_safe_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 43);
        assert_ne!(a, b);
        assert!(a
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
    }

    #[test]
    fn cookie_lifecycle_strings() {
        let set = session_cookie("tok123", 86_400);
        assert_eq!(
            set,
            "ott_session=tok123; HttpOnly; SameSite=Lax; Path=/; Max-Age=86400"
        );
        let clear = clear_session_cookie();
        assert!(clear.starts_with("ott_session=;"));
        assert!(clear.contains("Max-Age=0"));
    }

    #[test]
    fn session_token_extraction() {
        assert_eq!(
            extract_session_token(Some("theme=dark; ott_session=abc123; lang=en")).as_deref(),
            Some("abc123")
        );
        assert_eq!(extract_session_token(Some("ott_session=")), None);
        // A cookie whose name merely shares the prefix must not match.
        assert_eq!(extract_session_token(Some("ott_session_old=zzz")), None);
        assert_eq!(extract_session_token(None), None);
    }

    #[test]
    fn username_rules() {
        assert!(validate_username("abc").is_ok());
        assert!(validate_username("user_42").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
        assert!(validate_username("no spaces").is_err());
        assert!(validate_username("dollar$").is_err());
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("password1").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    fn hex_bytes(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }
}
