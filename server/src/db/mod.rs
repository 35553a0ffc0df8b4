pub mod models;

use anyhow::{Context, Result};
use common::{ListTag, Shift};
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::config::DbSettings;

mod migrations {
    use refinery::embed_migrations;
    embed_migrations!("./migrations");
}

/// Applies the embedded schema migrations.
pub async fn run_migrations(settings: &DbSettings) -> Result<()> {
    let mut config = settings.refinery_config();
    let report = migrations::migrations::runner()
        .run_async(&mut config)
        .await
        .context("Failed to run migrations")?;

    info!(
        "Database migrations completed ({} applied)",
        report.applied_migrations().len()
    );
    Ok(())
}

/// Opens the process-wide connection pool.
pub async fn connect(settings: &DbSettings, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&settings.url())
        .await
        .context("Failed to create PostgreSQL connection pool")
}

pub async fn list_len(conn: &mut PgConnection, list: ListTag) -> sqlx::Result<i32> {
    let len: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM levels WHERE list = $1")
        .bind(list.as_str())
        .fetch_one(conn)
        .await?;
    Ok(len as i32)
}

/// Applies `shift` to the placements of one ranked list.
pub async fn shift_levels(conn: &mut PgConnection, list: ListTag, shift: Shift) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE levels
        SET placement = placement + $1
        WHERE list = $2
        AND placement BETWEEN $3 AND $4
        "#,
    )
    .bind(shift.delta)
    .bind(list.as_str())
    .bind(shift.from)
    .bind(shift.upper_bound())
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn personal_list_len(conn: &mut PgConnection, user_id: Uuid) -> sqlx::Result<i32> {
    let len: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM personal_records WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(conn)
        .await?;
    Ok(len as i32)
}

/// Applies `shift` to one user's personal list.
pub async fn shift_personal_records(
    conn: &mut PgConnection,
    user_id: Uuid,
    shift: Shift,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE personal_records
        SET placement = placement + $1
        WHERE user_id = $2
        AND placement BETWEEN $3 AND $4
        "#,
    )
    .bind(shift.delta)
    .bind(user_id)
    .bind(shift.from)
    .bind(shift.upper_bound())
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}
