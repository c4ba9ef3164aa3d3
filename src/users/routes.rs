use actix_identity::Identity;
use actix_web::web;
use actix_web::web::{Data, Json, Query};
use actix_web::{get, post, put};

use crate::auth;
use crate::server::{Response, State};
use crate::users::{
    Filter, PasswordChange, PasswordConfirmation, ProfileUpdate, User,
};
use crate::validator::Validator;

#[get("/users")]
async fn find_all(filter: Query<Filter>, state: Data<State>, id: Identity) -> Response {
    auth::get_user(&id, &state.db).await?;

    let users = User::find_all(filter.into_inner(), &state.db).await?;

    http_ok_json!(users);
}

#[get("/users/me")]
async fn find_me(state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let user = User::find(user.id, &state.db).await?;

    http_ok_json!(user);
}

#[put("/users/me")]
async fn update_me(
    profile: Json<Validator<ProfileUpdate>>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let user = auth::get_user(&id, &state.db).await?;
    let profile = profile.into_inner().validate()?;

    let user = User::update_profile(user.id, profile, &state.db).await?;

    http_ok_json!(user);
}

#[put("/users/me/password")]
async fn change_password(
    change: Json<Validator<PasswordChange>>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let user = auth::get_user(&id, &state.db).await?;
    let change = change.into_inner().validate()?;

    let user = User::find(user.id, &state.db).await?;
    user.verify_password(&change.old)?;
    user.update_password(&change.new, &state.db).await?;

    http_ok_json!(user);
}

#[post("/users/me/2fa/enable")]
async fn enable_two_factor(
    confirmation: Json<PasswordConfirmation>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let user = User::find(user.id, &state.db).await?;
    user.verify_password(&confirmation.password)?;

    let user = User::set_two_factor(user.id, true, &state.db).await?;
    info!("user {} enabled two factor authentication", user.username);

    http_ok_json!(user);
}

#[post("/users/me/2fa/disable")]
async fn disable_two_factor(
    confirmation: Json<PasswordConfirmation>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let user = User::find(user.id, &state.db).await?;
    user.verify_password(&confirmation.password)?;

    let user = User::set_two_factor(user.id, false, &state.db).await?;
    info!("user {} disabled two factor authentication", user.username);

    http_ok_json!(user);
}

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(find_all);
    cfg.service(find_me);
    cfg.service(update_me);
    cfg.service(change_password);
    cfg.service(enable_two_factor);
    cfg.service(disable_two_factor);
}
