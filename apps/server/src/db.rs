use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // Enable WAL mode for better concurrent access
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    apply(pool, "001_init", include_str!("../migrations/001_init.sql")).await?;

    tracing::info!("Database migrations up to date");
    Ok(())
}

async fn apply(pool: &SqlitePool, name: &str, sql: &str) -> anyhow::Result<()> {
    let applied: bool =
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?")
            .bind(name)
            .fetch_one(pool)
            .await?;

    if applied {
        return Ok(());
    }

    for statement in sql.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }

    sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;
    tracing::info!("Applied migration: {}", name);
    Ok(())
}
