use actix_identity::Identity;
use actix_web::web::{Data, Json, Path, Query};
use actix_web::{delete, get, post, put, web, HttpResponse};
use pickleball_cache::Cache;

use crate::auth::{self, Role};
use crate::bookings::{Booking, BookingFilter};
use crate::config::Config;
use crate::courts::Court;
use crate::rewards::agent::ExpiryAgent;
use crate::server::{Response, State};
use crate::stats::{Stats, StatsResponse};
use crate::users::{Filter, User};
use crate::websocket::queries::{ActiveSessionCount, ConnectedUsers};

#[derive(Debug, Deserialize)]
pub struct RoleChange {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ActiveChange {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct IntervalChange {
    /// seconds
    pub interval: u64,
}

#[derive(Serialize, Debug)]
pub struct Counts {
    pub users: i64,
    pub courts: i64,
    pub active_bookings: i64,
}

#[derive(Serialize, Debug)]
pub struct SweepResult {
    pub users: usize,
}

#[get("/admin/users")]
async fn find_users(filter: Query<Filter>, state: Data<State>, id: Identity) -> Response {
    auth::verify_admin(&id, &state.db).await?;

    let users = User::find_all_detailed(filter.into_inner(), &state.db).await?;

    http_ok_json!(users);
}

#[put("/admin/users/{id}/role")]
async fn set_role(
    user_id: Path<i64>,
    change: Json<RoleChange>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let admin = auth::verify_admin(&id, &state.db).await?;

    if admin.id == *user_id {
        bad_request!("you can't change your own role");
    }

    let user = User::set_role(*user_id, change.role, &state.db).await?;
    info!("{} made {} a {}", admin.username, user.username, change.role);

    http_ok_json!(user);
}

#[put("/admin/users/{id}/active")]
async fn set_active(
    user_id: Path<i64>,
    change: Json<ActiveChange>,
    state: Data<State>,
    id: Identity,
) -> Response {
    let admin = auth::verify_admin(&id, &state.db).await?;

    if admin.id == *user_id && !change.is_active {
        bad_request!("you can't deactivate yourself");
    }

    let user = User::set_active(*user_id, change.is_active, &state.db).await?;

    http_ok_json!(user);
}

#[delete("/admin/users/{id}")]
async fn delete_user(user_id: Path<i64>, state: Data<State>, id: Identity) -> Response {
    let admin = auth::verify_admin(&id, &state.db).await?;

    if admin.id == *user_id {
        bad_request!("you can't delete yourself");
    }

    User::delete(*user_id, &state.db).await?;
    info!("{} deleted user {}", admin.username, user_id);

    Ok(HttpResponse::NoContent().finish())
}

#[get("/admin/counts")]
async fn counts(state: Data<State>, id: Identity) -> Response {
    auth::verify_admin(&id, &state.db).await?;

    http_ok_json!(Counts {
        users: User::count(&state.db).await?,
        courts: Court::count(&state.db).await?,
        active_bookings: Booking::count_active(&state.db).await?,
    });
}

#[get("/admin/bookings")]
async fn find_bookings(filter: Query<BookingFilter>, state: Data<State>, id: Identity) -> Response {
    auth::verify_admin(&id, &state.db).await?;

    let bookings = Booking::find_all(filter.into_inner(), &state.db).await?;

    http_ok_json!(bookings);
}

#[get("/admin/websockets/connected-users")]
async fn connected_users(state: Data<State>, id: Identity) -> Response {
    auth::verify_admin(&id, &state.db).await?;

    let users = state.notifier.send(ConnectedUsers).await?;

    http_ok_json!(users);
}

#[get("/admin/websockets/sessions")]
async fn session_count(state: Data<State>, id: Identity) -> Response {
    auth::verify_admin(&id, &state.db).await?;

    let count = state.notifier.send(ActiveSessionCount).await?;

    http_ok_json!(count);
}

#[get("/admin/server/cache")]
async fn cache_status(state: Data<State>, id: Identity) -> Response {
    auth::verify_admin(&id, &state.db).await?;

    http_ok_json!(Cache::status().await);
}

#[post("/admin/server/cache/disable")]
async fn disable_cache(state: Data<State>, id: Identity) -> Response {
    let admin = auth::verify_admin(&id, &state.db).await?;

    Cache::disable_cache().await;
    warn!("{} disabled the cache", admin.username);

    http_ok_json!(Cache::status().await);
}

#[post("/admin/server/cache/enable")]
async fn enable_cache(state: Data<State>, id: Identity) -> Response {
    let admin = auth::verify_admin(&id, &state.db).await?;

    Cache::enable_cache().await?;
    info!("{} enabled the cache", admin.username);

    http_ok_json!(Cache::status().await);
}

#[get("/admin/server/stats")]
async fn server_stats(stats: Data<Stats>, state: Data<State>, id: Identity) -> Response {
    auth::verify_admin(&id, &state.db).await?;

    let stats = StatsResponse::load(&stats, &state).await?;

    http_ok_json!(stats);
}

#[post("/admin/rewards/expire")]
async fn expire_rewards(state: Data<State>, id: Identity) -> Response {
    let admin = auth::verify_admin(&id, &state.db).await?;

    let users = ExpiryAgent::sweep(&state).await?;
    info!("{} expired the reward points of {} user(s)", admin.username, users);

    http_ok_json!(SweepResult { users });
}

#[get("/admin/rewards/interval")]
async fn sweep_interval(state: Data<State>, id: Identity) -> Response {
    auth::verify_admin(&id, &state.db).await?;

    http_ok_json!(Config::reward_sweep_interval());
}

#[put("/admin/rewards/interval")]
async fn set_sweep_interval(
    change: Json<IntervalChange>,
    state: Data<State>,
    id: Identity,
) -> Response {
    auth::verify_admin(&id, &state.db).await?;

    if change.interval < 60 {
        bad_request!("the sweep interval should be at least 60 seconds");
    }

    Config::set_reward_sweep_interval(change.interval);

    http_ok_json!(Config::reward_sweep_interval());
}

pub fn register(cfg: &mut web::ServiceConfig) {
    cfg.service(find_users);
    cfg.service(set_role);
    cfg.service(set_active);
    cfg.service(delete_user);
    cfg.service(counts);
    cfg.service(find_bookings);
    cfg.service(connected_users);
    cfg.service(session_count);
    cfg.service(cache_status);
    cfg.service(disable_cache);
    cfg.service(enable_cache);
    cfg.service(server_stats);
    cfg.service(expire_rewards);
    cfg.service(sweep_interval);
    cfg.service(set_sweep_interval);
}
