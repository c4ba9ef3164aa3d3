use std::fmt;
use std::sync::Arc;

use actix::Addr;
use actix_cors::Cors;
use actix_identity::{CookieIdentityPolicy, IdentityService};
use actix_web::{cookie, get, middleware, web, App, HttpRequest, HttpResponse, HttpServer};
use actix_web_opentelemetry::{RequestMetrics, RequestTracing};
use opentelemetry::global;

use crate::admin;
use crate::auth;
use crate::bookings;
use crate::config::Config;
use crate::courts;
use crate::db;
use crate::errors::ServiceError;
use crate::join_requests;
use crate::notifications;
use crate::payments::{self, ManualGateway, PaymentGateway};
use crate::promotions;
use crate::rewards;
use crate::stats;
use crate::users;
use crate::websocket::{self, NotificationServer};

pub type Response = Result<HttpResponse, ServiceError>;

/// Shared by every request handler and background agent
#[derive(Clone)]
pub struct State {
    pub db: db::Pool,
    pub notifier: Addr<NotificationServer>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl State {
    pub fn new(db: db::Pool, notifier: Addr<NotificationServer>) -> Self {
        State {
            db,
            notifier,
            gateway: Arc::new(ManualGateway::default()),
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("db", &self.db)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[get("/health")]
async fn health(_: HttpRequest) -> &'static str {
    "ok"
}

fn cors() -> Cors {
    match Config::allowed_origin() {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
            .allow_any_header()
            .supports_credentials()
            .max_age(3600),
        None => Cors::default(),
    }
}

/// Cookie settings of the session.
///
/// A frontend on another origin only gets the cookie back with
/// `SameSite=None`, which browsers only accept on secure cookies.
fn session_cookie(allowed_origin: Option<&str>) -> (cookie::SameSite, bool) {
    match allowed_origin {
        Some(_) => (cookie::SameSite::None, true),
        None => (cookie::SameSite::Strict, false),
    }
}

/// every route of the api, mounted under `/api`
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health);
    auth::routes::register(cfg);
    users::routes::register(cfg);
    courts::routes::register(cfg);
    bookings::routes::register(cfg);
    join_requests::routes::register(cfg);
    payments::routes::register(cfg);
    promotions::routes::register(cfg);
    rewards::routes::register(cfg);
    notifications::routes::register(cfg);
    websocket::routes::register(cfg);
    admin::routes::register(cfg);
}

pub async fn launch(state: State) -> std::io::Result<()> {
    let exporter = opentelemetry_prometheus::exporter().init();
    let meter = global::meter("pickleball");
    let request_metrics = RequestMetrics::new(
        meter,
        Some(|req: &actix_web::dev::ServiceRequest| {
            req.path() == "/metrics" && req.method() == actix_web::http::Method::GET
        }),
        Some(exporter),
    );

    let request_stats = web::Data::new(stats::Stats::new());
    let (same_site, secure) = session_cookie(Config::allowed_origin());

    info!(
        "listening on {}:{}",
        Config::api_host(),
        Config::api_port()
    );

    HttpServer::new(move || {
        App::new()
            .data(state.clone())
            .app_data(request_stats.clone())
            .wrap(stats::Middleware::default())
            .wrap(middleware::DefaultHeaders::new().header("X-Version", env!("CARGO_PKG_VERSION")))
            .wrap(middleware::Compress::default())
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::default())
            .wrap(cors())
            .wrap(IdentityService::new(
                CookieIdentityPolicy::new(Config::session_private_key().as_bytes())
                    .name("auth")
                    .path("/")
                    .same_site(same_site)
                    .max_age_time(time::Duration::days(30))
                    .secure(secure),
            ))
            .wrap(sentry_actix::Sentry::new())
            .wrap(RequestTracing::new())
            .wrap(request_metrics.clone())
            // limit the maximum amount of data that server will accept
            .data(web::JsonConfig::default().limit(262_144))
            .data(web::PayloadConfig::default().limit(262_144))
            .service(web::scope("/api").configure(routes))
    })
    .bind(format!("{}:{}", Config::api_host(), Config::api_port()))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    #[actix_rt::test]
    async fn health_check() {
        let mut app = test::init_service(App::new().service(web::scope("/api").service(health))).await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body = test::read_response(&mut app, req).await;

        assert_eq!(body, web::Bytes::from_static(b"ok"));
    }

    #[test]
    fn cross_origin_frontends_get_the_cookie_back() {
        assert_eq!(
            session_cookie(Some("https://app.courts.be")),
            (cookie::SameSite::None, true)
        );
        assert_eq!(session_cookie(None), (cookie::SameSite::Strict, false));
    }

    #[actix_rt::test]
    async fn unknown_routes_are_not_found() {
        let mut app = test::init_service(App::new().service(web::scope("/api").service(health))).await;

        let req = test::TestRequest::get().uri("/api/nope").to_request();
        let res = test::call_service(&mut app, req).await;

        assert_eq!(res.status(), actix_web::http::StatusCode::NOT_FOUND);
    }
}
