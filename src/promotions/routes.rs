use actix_identity::Identity;
use actix_web::web::{Data, Json, Path};
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::Utc;

use crate::auth;
use crate::promotions::{Promotion, PromotionMessage};
use crate::server::{Response, State};
use crate::validator::Validator;

/// lets a customer check a code before booking
#[get("/promotions/{code}")]
async fn check(code: Path<String>, state: Data<State>, id: Identity) -> Response {
    auth::get_user(&id, &state.db).await?;

    let promotion = Promotion::find_by_code(&code, &state.db).await?;

    http_ok_json!(promotion.check(Utc::now()));
}

#[get("/admin/promotions")]
async fn find_all(state: Data<State>, id: Identity) -> Response {
    auth::verify_admin(&id, &state.db).await?;

    let promotions = Promotion::find_all(&state.db).await?;

    http_ok_json!(promotions);
}

#[post("/admin/promotions")]
async fn create(
    promotion: Json<Validator<PromotionMessage>>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let admin = auth::verify_admin(&id, &state.db).await?;
    let promotion = promotion.into_inner().validate()?;

    let promotion = Promotion::create(promotion, &state.db).await?;
    info!("{} created promotion {}", admin.username, promotion.code);

    http_created_json!(promotion);
}

#[put("/admin/promotions/{id}")]
async fn update(
    promotion_id: Path<i64>,
    promotion: Json<Validator<PromotionMessage>>,
    state: Data<State>,
    id: Identity,
) -> Response {
    auth::verify_admin(&id, &state.db).await?;
    let promotion = promotion.into_inner().validate()?;

    let promotion = Promotion::update(*promotion_id, promotion, &state.db).await?;

    http_ok_json!(promotion);
}

#[delete("/admin/promotions/{id}")]
async fn delete(promotion_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    auth::verify_admin(&id, &state.db).await?;

    Promotion::delete(*promotion_id, &state.db).await?;

    Ok(HttpResponse::NoContent().finish())
}

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(check);
    cfg.service(find_all);
    cfg.service(create);
    cfg.service(update);
    cfg.service(delete);
}
