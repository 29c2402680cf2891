//! Metadata Store connection — a thin wrapper around `sqlx::PgPool`.
//!
//! Grounded on `storage::distributed::DistributedDocumentStore::new` in the
//! teacher repo, which opens a `PgPool` and runs `sqlx::migrate!` at
//! startup. This crate does the same, with the CRDT/cache/sharding layers
//! the teacher built on top of it stripped away — the Sync Engine owns
//! its own transactions directly against Postgres.

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
