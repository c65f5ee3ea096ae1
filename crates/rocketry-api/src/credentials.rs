use std::sync::LazyLock;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use tracing::{info, warn};
use uuid::Uuid;

use rocketry_db::Database;
use rocketry_db::models::UserRow;
use rocketry_types::models::User;

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_EMAIL_LEN: usize = 320;
const MAX_FULL_NAME_LEN: usize = 120;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Password must be at least 8 characters")]
    WeakPassword,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Full name must be at most 120 characters")]
    InvalidFullName,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Hash verified when the email is unknown, so a miss costs one Argon2 run
/// just like a wrong password does.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("rocketry-timing-equaliser").ok());

/// Hash a password with Argon2id and a fresh random salt (PHC string).
pub fn hash_password(plaintext: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// Argon2's verifier compares digests in constant time.
fn password_matches(plaintext: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        warn!("Stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed)
        .is_ok()
}

fn validate_email(email: &str) -> Result<(), CredentialError> {
    let valid = email.len() <= MAX_EMAIL_LEN
        && !email.chars().any(char::is_whitespace)
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty() && domain.contains('.') && !domain.contains('@')
                    && !domain.starts_with('.') && !domain.ends_with('.')
            });
    if valid { Ok(()) } else { Err(CredentialError::InvalidEmail) }
}

/// Register a new active user. Returns the stored user without its hash.
pub fn create_user(
    db: &Database,
    email: &str,
    full_name: Option<&str>,
    password: &str,
) -> Result<User, CredentialError> {
    validate_email(email)?;
    if full_name.is_some_and(|n| n.chars().count() > MAX_FULL_NAME_LEN) {
        return Err(CredentialError::InvalidFullName);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CredentialError::WeakPassword);
    }

    // Cheap pre-check; the unique index below is what actually decides.
    if db.get_user_by_email(email)?.is_some() {
        return Err(CredentialError::DuplicateEmail);
    }

    let password_hash = hash_password(password)?;
    let user_id = Uuid::new_v4();

    let row = db
        .create_user(&user_id.to_string(), email, full_name, &password_hash)?
        .ok_or(CredentialError::DuplicateEmail)?;

    info!("Registered user {}", row.id);
    Ok(row.to_user())
}

pub fn find_user_by_email(db: &Database, email: &str) -> anyhow::Result<Option<User>> {
    Ok(db.get_user_by_email(email)?.as_ref().map(UserRow::to_user))
}

/// Check an email/password pair. Unknown email, inactive account and wrong
/// password all produce the same error.
pub fn verify_credentials(db: &Database, email: &str, password: &str) -> Result<User, CredentialError> {
    let Some(row) = db.get_user_by_email(email)? else {
        if let Some(dummy) = DUMMY_HASH.as_deref() {
            password_matches(password, dummy);
        }
        return Err(CredentialError::InvalidCredentials);
    };

    if !password_matches(password, &row.hashed_password) || !row.is_active {
        return Err(CredentialError::InvalidCredentials);
    }

    Ok(row.to_user())
}
