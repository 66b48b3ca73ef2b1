/// Password Hashing and Verification
///
/// Argon2id with fixed cost parameters and a fresh 16-byte salt per hash,
/// plus the strength policy applied when a password is chosen.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use lazy_static::lazy_static;

use crate::error::{AppError, ValidationError};

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Memory cost in KiB (64 MiB)
const MEMORY_COST_KIB: u32 = 64 * 1024;
const TIME_COST: u32 = 3;
const PARALLELISM: u32 = 1;

lazy_static! {
    // Verified against when the login email is unknown so that both failure
    // paths pay for one Argon2 evaluation.
    static ref DECOY_CREDENTIAL: Option<Credential> =
        hash_password("decoy-password-for-unknown-accounts").ok();
}

/// Stored password hash in PHC string format
///
/// Never serialized and never printed; the only consumer of its contents is
/// [`verify_password`].
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    /// Wrap a PHC string loaded from storage
    pub fn from_phc(phc: String) -> Self {
        Self(phc)
    }

    pub(crate) fn as_phc(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

fn hasher() -> Result<Argon2<'static>, AppError> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)
        .map_err(|e| AppError::Internal(format!("Invalid Argon2 parameters: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password with Argon2id
///
/// Two calls with the same password produce different hashes.
///
/// # Errors
/// Returns an internal error if Argon2 rejects the input
pub fn hash_password(password: &str) -> Result<Credential, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

    Ok(Credential(hash.to_string()))
}

/// Verify a password against a stored credential
///
/// A malformed or foreign hash counts as a mismatch; callers cannot tell the
/// two apart.
pub fn verify_password(credential: &Credential, password: &str) -> bool {
    let parsed = match PasswordHash::new(credential.as_phc()) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!(error = %e, "Stored password hash could not be parsed");
            return false;
        }
    };

    // Cost parameters are read back from the PHC string.
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Burn one verification for a login attempt against an unknown account
pub fn dummy_verify(password: &str) {
    if let Some(decoy) = DECOY_CREDENTIAL.as_ref() {
        let _ = verify_password(decoy, password);
    }
}

/// Validate password strength requirements
///
/// Requirements:
/// - 8 to 128 characters
/// - At least one digit, one lowercase letter and one uppercase letter
pub fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password", MIN_PASSWORD_LENGTH));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password", MAX_PASSWORD_LENGTH));
    }

    let has_digit = password.chars().any(|c| c.is_numeric());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());

    if !has_digit || !has_lowercase || !has_uppercase {
        return Err(ValidationError::WeakPassword);
    }

    Ok(())
}
