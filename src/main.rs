//! Court booking platform for pickleball players and court owners
#![warn(missing_debug_implementations, rust_2018_idioms)]

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

use actix::Actor;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::prelude::*;

use anyhow::Error;
use dotenv::dotenv;
use pickleball_cache::Cache;

#[macro_use]
mod macros;

mod admin;
mod auth;
mod bookings;
mod config;
mod courts;
mod db;
mod errors;
mod join_requests;
mod notifications;
mod payments;
mod promotions;
mod rewards;
mod server;
mod stats;
mod users;
mod validator;
mod websocket;

use config::Config;

#[actix_web::main]
async fn main() -> anyhow::Result<(), Error> {
    init().await?;

    Ok(())
}

async fn init() -> anyhow::Result<(), Error> {
    dotenv().ok();
    Config::init();

    let (tracer, _uninstall) = opentelemetry_jaeger::new_pipeline()
        .with_service_name("pickleball")
        .with_agent_endpoint(Config::opentelemetry_endpoint())
        .install()?;

    // Create a tracing layer with the configured tracer
    let opentelemetry = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(opentelemetry)
        .try_init()?;

    let _sentry = Config::sentry_dsn().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let pool = db::build_connection_pool(Config::database_url()).await?;
    db::migrate(&pool).await?;

    if let Some((username, password)) = Config::admin_credentials() {
        users::User::ensure_admin(username, password, &pool).await?;
    }

    if let Some(url) = Config::redis_url() {
        if let Err(e) = Cache::init(url.to_string()).await {
            warn!("running without cache, unable to connect to redis: {}", e);
        }
    }

    let notifier = websocket::NotificationServer::default().start();
    let state = server::State::new(pool, notifier);

    rewards::agent::ExpiryAgent::new(state.clone()).start();
    bookings::agent::CompletionAgent::new(state.clone()).start();

    debug!("launching the actix webserver");
    server::launch(state).await?;

    Ok(())
}
