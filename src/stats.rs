use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::task::{Context, Poll};

use actix_service::{Service, Transform};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::web::Data;
use actix_web::Error;
use futures::future::{ok, Ready};
use futures::Future;

use crate::errors::ServiceError;
use crate::server::State;
use crate::websocket::queries::ActiveSessionCount;

/// Request counters of this server process
#[derive(Debug, Default)]
pub struct Stats {
    pub requests: AtomicU32,
    pub errors: AtomicU32,
}

impl Stats {
    pub fn new() -> Stats {
        Stats::default()
    }
}

#[derive(Serialize, Debug)]
pub struct StatsResponse {
    pub requests: u32,
    pub errors: u32,
    pub active_ws_sessions: usize,
    pub db_connections: u32,
    pub idle_db_connections: usize,
}

impl StatsResponse {
    pub async fn load(stats: &Stats, state: &State) -> Result<StatsResponse, ServiceError> {
        Ok(StatsResponse {
            requests: stats.requests.load(Ordering::Relaxed),
            errors: stats.errors.load(Ordering::Relaxed),
            active_ws_sessions: state.notifier.send(ActiveSessionCount).await?,
            db_connections: state.db.size(),
            idle_db_connections: state.db.num_idle(),
        })
    }
}

/// Counts every request, and the ones that ended in a server error
#[derive(Debug, Default)]
pub struct Middleware;

impl<S, B> Transform<S> for Middleware
where
    S: Service<Request = ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
{
    type Request = ServiceRequest;
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestCountMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequestCountMiddleware { service })
    }
}

#[derive(Debug)]
pub struct RequestCountMiddleware<S> {
    service: S,
}

impl<S, B> Service for RequestCountMiddleware<S>
where
    S: Service<Request = ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
{
    type Request = ServiceRequest;
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: ServiceRequest) -> Self::Future {
        let stats = request.app_data::<Data<Stats>>().cloned();

        if let Some(stats) = stats.as_ref() {
            stats.requests.fetch_add(1, Ordering::Relaxed);
        }

        let fut = self.service.call(request);

        Box::pin(async move {
            let res = fut.await?;

            if let Some(stats) = stats {
                if res.response().status().is_server_error() {
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                }
            }

            Ok(res)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    #[actix_rt::test]
    async fn counts_requests_and_errors() {
        let stats = Data::new(Stats::new());

        let mut app = test::init_service(
            App::new()
                .app_data(stats.clone())
                .wrap(Middleware::default())
                .route("/fine", web::get().to(|| async { HttpResponse::Ok().finish() }))
                .route("/broken", web::get().to(|| async { HttpResponse::InternalServerError().finish() })),
        )
        .await;

        for uri in &["/fine", "/fine", "/broken"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            test::call_service(&mut app, req).await;
        }

        assert_eq!(stats.requests.load(Ordering::Relaxed), 3);
        assert_eq!(stats.errors.load(Ordering::Relaxed), 1);
    }
}
