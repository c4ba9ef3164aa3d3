use chrono::{Duration, Utc};
use rand::Rng;

use sqlx::Done;

use crate::db;
use crate::errors::ServiceError;
use crate::users::{hash_secret, verify_secret};

/// how long a login code stays valid
const CODE_TTL_MINUTES: i64 = 10;
/// wrong guesses before the code is thrown away
const MAX_ATTEMPTS: i16 = 5;

/// A pending second login step.
///
/// Only the argon2 hash of the code is stored, every user has at most one
/// pending code.
#[derive(Debug)]
pub struct TwoFactorCode;

#[derive(Debug, PartialEq)]
enum CodeCheck {
    Valid,
    Invalid,
    /// expired, exhausted or never issued
    Unusable,
}

/// six random digits, zero padded
fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0, 1_000_000))
}

impl TwoFactorCode {
    /// Create a new login code for the user, replacing the pending one.
    ///
    /// Returns the plain code so it can be delivered to the user.
    #[tracing::instrument(name = "TwoFactorCode::issue", skip(db))]
    pub async fn issue(user_id: i64, db: &db::Pool) -> Result<String, ServiceError> {
        let code = generate_code();
        let code_hash = hash_secret(&code)?;
        let expires_at = Utc::now() + Duration::minutes(CODE_TTL_MINUTES);

        sqlx::query(
            "INSERT INTO two_factor_codes (user_id, code_hash, attempts, expires_at)
             VALUES ($1, $2, 0, $3)
             ON CONFLICT (user_id) DO UPDATE
             SET code_hash = EXCLUDED.code_hash, attempts = 0,
                 expires_at = EXCLUDED.expires_at, created_at = NOW()",
        )
        .bind(user_id)
        .bind(code_hash)
        .bind(expires_at)
        .execute(db)
        .await?;

        Ok(code)
    }

    /// Consume the pending code of a user.
    ///
    /// Every guess claims an attempt before the code is checked, so
    /// concurrent guesses can't get past the attempt limit. Any failure is
    /// reported as Unauthorized, so callers can't tell a wrong code from a
    /// missing one.
    #[tracing::instrument(name = "TwoFactorCode::verify", skip(code, db))]
    pub async fn verify(user_id: i64, code: &str, db: &db::Pool) -> Result<(), ServiceError> {
        let reserved: Option<(String,)> = sqlx::query_as(
            "UPDATE two_factor_codes SET attempts = attempts + 1
             WHERE user_id = $1 AND attempts < $2 AND expires_at > NOW()
             RETURNING code_hash",
        )
        .bind(user_id)
        .bind(MAX_ATTEMPTS)
        .fetch_optional(db)
        .await?;

        let code_hash = reserved.map(|(code_hash,)| code_hash);

        match check(code_hash.as_deref(), code)? {
            CodeCheck::Valid => {
                let result = sqlx::query(
                    "DELETE FROM two_factor_codes WHERE user_id = $1 AND code_hash = $2",
                )
                .bind(user_id)
                .bind(code_hash)
                .execute(db)
                .await?;

                consumed(result.rows_affected())
            }
            CodeCheck::Invalid => Err(ServiceError::Unauthorized),
            CodeCheck::Unusable => {
                let result = sqlx::query(
                    "DELETE FROM two_factor_codes
                     WHERE user_id = $1 AND (attempts >= $2 OR expires_at <= NOW())",
                )
                .bind(user_id)
                .bind(MAX_ATTEMPTS)
                .execute(db)
                .await?;

                if result.rows_affected() > 0 {
                    info!("discarded the unusable login code of user {}", user_id);
                }
                Err(ServiceError::Unauthorized)
            }
        }
    }
}

/// compares a guess with the code hash it claimed an attempt on
fn check(code_hash: Option<&str>, code: &str) -> Result<CodeCheck, ServiceError> {
    let code_hash = match code_hash {
        Some(code_hash) => code_hash,
        None => return Ok(CodeCheck::Unusable),
    };

    if verify_secret(code_hash, code)? {
        Ok(CodeCheck::Valid)
    } else {
        Ok(CodeCheck::Invalid)
    }
}

/// a correct code logs in once, concurrent correct guesses lose the race
fn consumed(rows_affected: u64) -> Result<(), ServiceError> {
    if rows_affected == 1 {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn correct_code_is_valid() {
        let code_hash = hash_secret("123456").unwrap();
        assert_eq!(check(Some(&code_hash), "123456").unwrap(), CodeCheck::Valid);
        assert_eq!(check(Some(&code_hash), "654321").unwrap(), CodeCheck::Invalid);
    }

    #[test]
    fn no_claimed_attempt_means_unusable() {
        // expired, exhausted and missing codes don't return a hash
        assert_eq!(check(None, "123456").unwrap(), CodeCheck::Unusable);
    }

    #[test]
    fn a_code_is_consumed_once() {
        assert!(consumed(1).is_ok());
        assert_eq!(consumed(0), Err(ServiceError::Unauthorized));
    }
}
