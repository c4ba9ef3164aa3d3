use actix_identity::Identity;
use actix_web::web::{Data, Json};
use actix_web::{post, web, HttpResponse};
use serde_json::json;

use crate::auth::{self, TwoFactorCode};
use crate::errors::ServiceError;
use crate::notifications::{Kind, NewNotification};
use crate::server::{Response, State};
use crate::users::{Credentials, User, UserMessage};
use crate::validator::Validator;

/// Answer of a login attempt.
///
/// When `two_factor_required` is true, no session was created and the
/// client has to post the code to `/api/login/verify`.
#[derive(Serialize, Debug)]
struct LoginResponse {
    two_factor_required: bool,
    user: Option<User>,
}

#[derive(Deserialize, Debug)]
struct CodeVerification {
    username: String,
    code: String,
}

/// Find the user belonging to the credentials, every failure is Unauthorized
async fn authenticate(credentials: &Credentials, state: &State) -> Result<User, ServiceError> {
    let user = User::find_by_username(&credentials.username, &state.db)
        .await
        .map_err(|error| match error {
            ServiceError::NotFound => ServiceError::Unauthorized,
            _ => error,
        })?;

    user.verify_password(&credentials.password)?;

    if !user.is_active {
        info!("login attempt of deactivated user {}", user.username);
        return Err(ServiceError::Unauthorized);
    }

    Ok(user)
}

#[post("/register")]
async fn create_account(user: Json<Validator<UserMessage>>, state: Data<State>) -> Response {
    let user = user.into_inner().validate()?;

    let user = User::create(user, &state.db).await?;

    http_created_json!(user);
}

#[post("/login")]
async fn login(credentials: Json<Credentials>, id: Identity, state: Data<State>) -> Response {
    let user = authenticate(&credentials, &state).await?;

    if user.two_factor_enabled {
        let code = TwoFactorCode::issue(user.id, &state.db).await?;

        NewNotification::new(
            user.id,
            Kind::LoginCode,
            "Your login code",
            format!(
                "Use {} to finish signing in, the code expires in 10 minutes.",
                code
            ),
        )
        .send(&state)
        .await?;

        http_ok_json!(LoginResponse {
            two_factor_required: true,
            user: None,
        });
    }

    auth::remember(&id, &user)?;

    http_ok_json!(LoginResponse {
        two_factor_required: false,
        user: Some(user),
    });
}

#[post("/login/verify")]
async fn verify_login(
    verification: Json<CodeVerification>,
    id: Identity,
    state: Data<State>,
) -> Response {
    let user = User::find_by_username(&verification.username, &state.db)
        .await
        .map_err(|error| match error {
            ServiceError::NotFound => ServiceError::Unauthorized,
            _ => error,
        })?;

    if !user.is_active || !user.two_factor_enabled {
        return Err(ServiceError::Unauthorized);
    }

    TwoFactorCode::verify(user.id, verification.code.trim(), &state.db).await?;

    auth::remember(&id, &user)?;

    http_ok_json!(LoginResponse {
        two_factor_required: false,
        user: Some(user),
    });
}

#[post("/logout")]
async fn logout(id: Identity) -> Response {
    auth::session_user(&id)?;

    id.forget();

    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully signed out" })))
}

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(create_account);
    cfg.service(login);
    cfg.service(verify_login);
    cfg.service(logout);
}
