use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};

pub type Pool = PgPool;
pub type Transaction<'c> = sqlx::Transaction<'c, Postgres>;

pub async fn build_connection_pool(database_url: &str) -> Result<Pool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// run the embedded migrations in `migrations/`
pub async fn migrate(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
