use argon2::Config;
use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;

use sqlx::Done;

use crate::auth::Role;
use crate::db;
use crate::errors::ServiceError;
use crate::validator::{is_email, text_length};

/// hash a password or another secret with argon2 and a random salt
pub fn hash_secret(secret: &str) -> Result<String, ServiceError> {
    let salt: [u8; 32] = rand::thread_rng().gen();
    let config = Config::default();

    let hash = argon2::hash_encoded(secret.as_bytes(), &salt, &config)?;

    Ok(hash)
}

/// returns true when the secret matches the argon2 hash
pub fn verify_secret(hash: &str, secret: &str) -> Result<bool, ServiceError> {
    let is_match = argon2::verify_encoded(hash, secret.as_bytes())?;

    Ok(is_match)
}

/// Registration message
///
/// **POST /api/register**
///
/// ``` shell
/// curl --location --request POST 'http://localhost:8080/api/register' \
/// --header 'Content-Type: application/json' \
/// --data-raw '{
///     "username": "dinker",
///     "email": "dinker@courts.be",
///     "password": "kitchen-line",
///     "role": "court_owner"
/// }'
/// ```
#[derive(Deserialize, Debug)]
pub struct UserMessage {
    pub username: String,
    pub email: String,
    pub password: String,
    /// customer when left out
    pub role: Option<Role>,
}

#[derive(Deserialize, Debug)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, skip_deserializing)]
    pub password: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub is_active: bool,
    pub two_factor_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// the public part of a user, used when listing other users
#[derive(Serialize, Debug, sqlx::FromRow)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct Filter {
    /// filter users by %name%
    pub username: Option<String>,
    /// only admins can see this
    pub role: Option<Role>,
}

#[derive(Deserialize, Debug)]
pub struct ProfileUpdate {
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct PasswordChange {
    pub old: String,
    pub new: String,
}

/// Sent to toggle two factor authentication, the password is required
#[derive(Deserialize, Debug)]
pub struct PasswordConfirmation {
    pub password: String,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from_db(&self.role)
    }

    #[tracing::instrument(name = "User::find_all", skip(db))]
    pub async fn find_all(filter: Filter, db: &db::Pool) -> Result<Vec<UserResponse>, ServiceError> {
        let users = sqlx::query_as::<_, UserResponse>(
            "SELECT id, username FROM users
             WHERE is_active
             AND ($1::VARCHAR IS NULL OR username ILIKE $1)
             ORDER BY username",
        )
        .bind(filter.username.map(|username| format!("%{}%", username)))
        .fetch_all(db)
        .await?;

        Ok(users)
    }

    /// list every user with all their details, for administrators
    #[tracing::instrument(name = "User::find_all_detailed", skip(db))]
    pub async fn find_all_detailed(filter: Filter, db: &db::Pool) -> Result<Vec<User>, ServiceError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users
             WHERE ($1::VARCHAR IS NULL OR username ILIKE $1)
             AND ($2::VARCHAR IS NULL OR role = $2)
             ORDER BY id",
        )
        .bind(filter.username.map(|username| format!("%{}%", username)))
        .bind(filter.role.map(|role| role.to_string()))
        .fetch_all(db)
        .await?;

        Ok(users)
    }

    #[tracing::instrument(name = "User::find", skip(db))]
    pub async fn find(id: i64, db: &db::Pool) -> Result<Self, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_one(db)
            .await?;

        Ok(user)
    }

    #[tracing::instrument(name = "User::find_by_username", skip(db))]
    pub async fn find_by_username(username: &str, db: &db::Pool) -> Result<Self, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(db)
            .await?;

        Ok(user)
    }

    #[tracing::instrument(name = "User::create", skip(user, db), fields(username = %user.username))]
    pub async fn create(user: UserMessage, db: &db::Pool) -> Result<Self, ServiceError> {
        User::insert(user, Role::Customer, db).await
    }

    /// create a user, the requested role is only used when it's not an admin role
    async fn insert(user: UserMessage, fallback: Role, db: &db::Pool) -> Result<Self, ServiceError> {
        let role = user.role.unwrap_or(fallback);
        let password = hash_secret(&user.password)?;

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, email, password, role)
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(user.username.trim())
        .bind(user.email.trim().to_lowercase())
        .bind(password)
        .bind(role.to_string())
        .fetch_one(db)
        .await?;

        Ok(user)
    }

    /// Create the configured administrator when no user with that name exists
    pub async fn ensure_admin(
        username: &str,
        password: &str,
        db: &db::Pool,
    ) -> Result<(), ServiceError> {
        match User::find_by_username(username, db).await {
            Ok(_) => Ok(()),
            Err(ServiceError::NotFound) => {
                info!("creating the administrator account {}", username);
                let admin = UserMessage {
                    username: username.to_string(),
                    email: format!("{}@localhost.localdomain", username),
                    password: password.to_string(),
                    role: Some(Role::Admin),
                };
                User::insert(admin, Role::Admin, db).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(name = "User::update_profile", skip(profile, db))]
    pub async fn update_profile(
        id: i64,
        profile: ProfileUpdate,
        db: &db::Pool,
    ) -> Result<Self, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET email = $2, full_name = $3, phone = $4, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(profile.email.trim().to_lowercase())
        .bind(profile.full_name)
        .bind(profile.phone)
        .fetch_one(db)
        .await?;

        Ok(user)
    }

    #[tracing::instrument(name = "User::update_password", skip(self, password, db))]
    pub async fn update_password(&self, password: &str, db: &db::Pool) -> Result<(), ServiceError> {
        let password = hash_secret(password)?;

        sqlx::query("UPDATE users SET password = $2, updated_at = NOW() WHERE id = $1")
            .bind(self.id)
            .bind(password)
            .execute(db)
            .await?;

        Ok(())
    }

    #[tracing::instrument(name = "User::set_two_factor", skip(db))]
    pub async fn set_two_factor(id: i64, enabled: bool, db: &db::Pool) -> Result<Self, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET two_factor_enabled = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(enabled)
        .fetch_one(db)
        .await?;

        Ok(user)
    }

    #[tracing::instrument(name = "User::set_role", skip(db))]
    pub async fn set_role(id: i64, role: Role, db: &db::Pool) -> Result<Self, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(role.to_string())
        .fetch_one(db)
        .await?;

        Ok(user)
    }

    #[tracing::instrument(name = "User::set_active", skip(db))]
    pub async fn set_active(id: i64, active: bool, db: &db::Pool) -> Result<Self, ServiceError> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(active)
        .fetch_one(db)
        .await?;

        Ok(user)
    }

    #[tracing::instrument(name = "User::delete", skip(db))]
    pub async fn delete(id: i64, db: &db::Pool) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound);
        }

        Ok(())
    }

    /// returns the amount of registered users
    pub async fn count(db: &db::Pool) -> Result<i64, ServiceError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(db)
            .await?;

        Ok(count.0)
    }

    pub fn verify_password(&self, password: &str) -> Result<(), ServiceError> {
        if !verify_secret(&self.password, password)? {
            return Err(ServiceError::Unauthorized);
        }

        Ok(())
    }
}

lazy_static! {
    static ref USERNAME_PATTERN: Regex =
        Regex::new(r"^[0-9A-Za-z-_]+$").expect("invalid username regex");
}

impl crate::validator::Validate<UserMessage> for UserMessage {
    fn validate(&self) -> Result<(), ServiceError> {
        if self.username.trim().is_empty() {
            bad_request!("username is too short");
        }

        if self.username.trim().len() > 20 {
            bad_request!("username is too long, max 20 characters");
        }

        if !USERNAME_PATTERN.is_match(&self.username) {
            bad_request!("username can only contain letters, numbers, '-' and '_'");
        }

        if !is_email(self.email.trim()) {
            bad_request!("this is not a valid email address");
        }

        if self.password.len() < 8 {
            bad_request!("your password should at least be 8 characters long");
        }

        if let Some(Role::Admin) = self.role {
            forbidden!("you can't register as an administrator");
        }

        Ok(())
    }
}

impl crate::validator::Validate<ProfileUpdate> for ProfileUpdate {
    fn validate(&self) -> Result<(), ServiceError> {
        if !is_email(self.email.trim()) {
            bad_request!("this is not a valid email address");
        }

        if let Some(name) = self.full_name.as_ref() {
            text_length("full name", name, 80)?;
        }

        if let Some(phone) = self.phone.as_ref() {
            let valid = phone
                .chars()
                .all(|c| c.is_ascii_digit() || c == '+' || c == ' ' || c == '-');
            if !valid || phone.len() > 32 {
                bad_request!("this is not a valid phone number");
            }
        }

        Ok(())
    }
}

impl crate::validator::Validate<PasswordChange> for PasswordChange {
    fn validate(&self) -> Result<(), ServiceError> {
        if self.old == self.new {
            bad_request!("the new password can't be the same as the old password");
        }

        if self.new.len() < 8 {
            bad_request!("your password should be at least 8 characters long");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::Validator;

    fn registration(username: &str) -> UserMessage {
        UserMessage {
            username: String::from(username),
            email: String::from("player@courts.be"),
            password: String::from("hunter2boogaloo"),
            role: None,
        }
    }

    fn user(password: &str) -> User {
        User {
            id: 1,
            username: String::from("admin"),
            email: String::from("admin@courts.be"),
            password: password.to_string(),
            full_name: None,
            phone: None,
            role: String::from("admin"),
            is_active: true,
            two_factor_enabled: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    /// the user password should never be exposed through the api
    fn password_should_not_leak() {
        let password = "password";
        let serialized = serde_json::to_string(&user(password)).unwrap();

        assert_eq!(serialized.contains(password), false);
    }

    #[test]
    fn invalid_username() {
        assert!(Validator::new(registration("a€$b")).validate().is_err());
    }

    #[test]
    fn empty_username() {
        assert!(Validator::new(registration("")).validate().is_err());
    }

    #[test]
    fn valid_username() {
        assert!(Validator::new(registration("rickybobby")).validate().is_ok());
    }

    #[test]
    fn valid_username_with_other_characters() {
        assert!(Validator::new(registration("a-b_c-0123")).validate().is_ok());
    }

    #[test]
    fn invalid_email() {
        let mut message = registration("rickybobby");
        message.email = String::from("not-an-email");

        assert!(Validator::new(message).validate().is_err());
    }

    #[test]
    fn nobody_registers_as_admin() {
        let mut message = registration("rickybobby");
        message.role = Some(Role::Admin);

        assert_eq!(
            Validator::new(message).validate().unwrap_err(),
            ServiceError::Forbidden("you can't register as an administrator".to_string())
        );

        let mut message = registration("rickybobby");
        message.role = Some(Role::CourtOwner);
        assert!(Validator::new(message).validate().is_ok());
    }

    #[test]
    fn incorrect_password() {
        let hash = hash_secret("admin").unwrap();
        let user = user(&hash);

        assert!(user.verify_password("admin").is_ok());
        assert!(user.verify_password("not-admin").is_err());
    }

    #[test]
    fn password_change_rules() {
        let same = PasswordChange {
            old: String::from("kitchen-line"),
            new: String::from("kitchen-line"),
        };
        assert!(Validator::new(same).validate().is_err());

        let short = PasswordChange {
            old: String::from("kitchen-line"),
            new: String::from("dink"),
        };
        assert!(Validator::new(short).validate().is_err());

        let fine = PasswordChange {
            old: String::from("kitchen-line"),
            new: String::from("third-shot-drop"),
        };
        assert!(Validator::new(fine).validate().is_ok());
    }

    #[test]
    fn profile_rules() {
        let profile = ProfileUpdate {
            email: String::from("player@courts.be"),
            full_name: Some(String::from("Ricky Bobby")),
            phone: Some(String::from("+32 470 12-34-56")),
        };
        assert!(Validator::new(profile).validate().is_ok());

        let profile = ProfileUpdate {
            email: String::from("player@courts.be"),
            full_name: None,
            phone: Some(String::from("call me maybe")),
        };
        assert!(Validator::new(profile).validate().is_err());
    }
}
