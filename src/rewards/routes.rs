use actix_identity::Identity;
use actix_web::web::Data;
use actix_web::{get, web};

use crate::auth;
use crate::rewards::RewardTransaction;
use crate::server::{Response, State};

#[get("/rewards/me")]
async fn find_mine(state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let summary = RewardTransaction::summary(user.id, &state.db).await?;

    http_ok_json!(summary);
}

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(find_mine);
}
