use sqlx::{Pool, Sqlite};

/// Create the SQLite schema if it does not exist yet.
///
/// Postgres is expected to be provisioned from `migrations/sql`. The
/// `clients` and `accounts` tables are owned elsewhere; they only exist here
/// so the foreign keys on `refresh_tokens` can be enforced.
pub(crate) async fn bootstrap_sqlite_schema(pool: &Pool<Sqlite>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS clients (
            uuid TEXT PRIMARY KEY NOT NULL,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            uuid TEXT PRIMARY KEY NOT NULL,
            login TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refresh_tokens (
            token TEXT PRIMARY KEY NOT NULL,
            scope TEXT NOT NULL DEFAULT '',
            client_uuid TEXT NOT NULL REFERENCES clients(uuid) ON DELETE CASCADE,
            account_uuid TEXT NOT NULL REFERENCES accounts(uuid) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_refresh_tokens_client_uuid ON refresh_tokens(client_uuid);"#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_refresh_tokens_account_uuid ON refresh_tokens(account_uuid);"#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_refresh_tokens_created_at ON refresh_tokens(created_at);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
