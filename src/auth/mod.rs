use std::fmt;

use actix_identity::Identity;

use crate::db;
use crate::errors::ServiceError;
use crate::users::User;

pub mod routes;
mod two_factor;

pub use two_factor::TwoFactorCode;

/// What a user is allowed to do.
///
/// Court owners can manage their own courts, timeslots and the bookings
/// on them. Admins can do everything.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    CourtOwner,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::CourtOwner => "court_owner",
            Role::Admin => "admin",
        }
    }

    /// unknown roles fall back to the least privileged one
    pub fn from_db(role: &str) -> Role {
        match role {
            "admin" => Role::Admin,
            "court_owner" => Role::CourtOwner,
            _ => Role::Customer,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Customer
    }
}

/// The user stored in the identity cookie
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// admins can do everything a court owner can
    pub fn is_court_owner(&self) -> bool {
        matches!(self.role, Role::CourtOwner | Role::Admin)
    }
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        SessionUser {
            id: user.id,
            username: user.username.clone(),
            role: user.role(),
        }
    }
}

/// the user stored in the identity cookie, as it was when they logged in
pub fn session_user(id: &Identity) -> Result<SessionUser, ServiceError> {
    let identity = id.identity().ok_or(ServiceError::Unauthorized)?;

    serde_json::from_str::<SessionUser>(&identity).map_err(|error| {
        warn!("unable to parse the session identity: {}", error);
        ServiceError::Unauthorized
    })
}

/// The session user with the role and status currently in the database.
///
/// Deactivated and deleted users lose their sessions.
fn refresh(session: SessionUser, user: Option<&User>) -> Result<SessionUser, ServiceError> {
    match user {
        Some(user) if user.is_active => Ok(SessionUser::from(user)),
        Some(_) => {
            info!("rejected the session of deactivated user {}", session.username);
            Err(ServiceError::Unauthorized)
        }
        None => {
            info!("rejected the session of deleted user {}", session.username);
            Err(ServiceError::Unauthorized)
        }
    }
}

/// get the user of the current authenticated session
/// returns Unauthorized when no (valid) session is found
pub async fn get_user(id: &Identity, db: &db::Pool) -> Result<SessionUser, ServiceError> {
    let session = session_user(id)?;

    let user = match User::find(session.id, db).await {
        Ok(user) => Some(user),
        Err(ServiceError::NotFound) => None,
        Err(e) => return Err(e),
    };

    refresh(session, user.as_ref())
}

/// returns the session user when it's an administrator
pub async fn verify_admin(id: &Identity, db: &db::Pool) -> Result<SessionUser, ServiceError> {
    let user = get_user(id, db).await?;

    if !user.is_admin() {
        forbidden!("insufficient permissions");
    }

    Ok(user)
}

/// returns the session user when it's allowed to manage courts
pub async fn verify_court_owner(id: &Identity, db: &db::Pool) -> Result<SessionUser, ServiceError> {
    let user = get_user(id, db).await?;

    if !user.is_court_owner() {
        forbidden!("only court owners can manage courts");
    }

    Ok(user)
}

/// store the user in the identity cookie
pub fn remember(id: &Identity, user: &User) -> Result<(), ServiceError> {
    let session_user = SessionUser::from(user);
    id.remember(serde_json::to_string(&session_user)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session_user(role: Role) -> SessionUser {
        SessionUser {
            id: 1,
            username: "dinker".to_string(),
            role,
        }
    }

    #[test]
    fn role_round_trips_through_the_database_representation() {
        for role in &[Role::Customer, Role::CourtOwner, Role::Admin] {
            assert_eq!(Role::from_db(role.as_str()), *role);
        }
        assert_eq!(Role::from_db("superuser"), Role::Customer);
    }

    #[test]
    fn roles_serialize_as_snake_case() {
        let json = serde_json::to_string(&Role::CourtOwner).unwrap();
        assert_eq!(json, "\"court_owner\"");
    }

    fn stored(role: &str, is_active: bool) -> User {
        User {
            id: 1,
            username: "dinker".to_string(),
            email: "dinker@courts.be".to_string(),
            password: String::new(),
            full_name: None,
            phone: None,
            role: role.to_string(),
            is_active,
            two_factor_enabled: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn sessions_follow_the_stored_role() {
        let demoted = refresh(session_user(Role::Admin), Some(&stored("customer", true))).unwrap();
        assert_eq!(demoted.role, Role::Customer);
        assert!(!demoted.is_admin());

        let promoted = refresh(session_user(Role::Customer), Some(&stored("court_owner", true))).unwrap();
        assert!(promoted.is_court_owner());
    }

    #[test]
    fn deactivated_and_deleted_users_lose_their_session() {
        assert_eq!(
            refresh(session_user(Role::Admin), Some(&stored("admin", false))),
            Err(ServiceError::Unauthorized)
        );
        assert_eq!(
            refresh(session_user(Role::Customer), None),
            Err(ServiceError::Unauthorized)
        );
    }

    #[test]
    fn permissions() {
        assert!(!session_user(Role::Customer).is_court_owner());
        assert!(session_user(Role::CourtOwner).is_court_owner());
        assert!(!session_user(Role::CourtOwner).is_admin());
        assert!(session_user(Role::Admin).is_court_owner());
        assert!(session_user(Role::Admin).is_admin());
    }
}
