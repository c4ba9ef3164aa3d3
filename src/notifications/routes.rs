use actix_identity::Identity;
use actix_web::web::{Data, Path, Query};
use actix_web::{get, put, web};
use serde_json::json;

use crate::auth;
use crate::notifications::{Notification, NotificationFilter};
use crate::server::{Response, State};

#[get("/notifications")]
async fn find_mine(filter: Query<NotificationFilter>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let notifications = Notification::find_by_user(user.id, filter.into_inner(), &state.db).await?;

    http_ok_json!(notifications);
}

#[put("/notifications/read-all")]
async fn mark_all_read(state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let updated = Notification::mark_all_read(user.id, &state.db).await?;

    http_ok_json!(json!({ "updated": updated }));
}

#[put("/notifications/{id}/read")]
async fn mark_read(notification_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    let user = auth::get_user(&id, &state.db).await?;

    let notification = Notification::mark_read(*notification_id, user.id, &state.db).await?;

    http_ok_json!(notification);
}

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(find_mine);
    cfg.service(mark_all_read);
    cfg.service(mark_read);
}
