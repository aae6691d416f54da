use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolOptions;
use sqlx::{Executor, Pool, Postgres, Sqlite};
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;

use token_store_core::{NewRefreshToken, RefreshToken, ScopeSet, TokenStoreError};
use token_store_ports::{
    issue_with_retry, RefreshTokenRepository, SecureTokenGenerator, TokenAttempts, TokenGenerator,
};

use crate::schema::bootstrap_sqlite_schema;

/// Generated-token collisions tolerated before `create` gives up.
pub const DEFAULT_GENERATION_ATTEMPTS: u32 = 5;

const SELECT_ALL: &str = r#"
    SELECT token, scope, client_uuid, account_uuid, created_at, updated_at
    FROM refresh_tokens
    ORDER BY created_at ASC, token ASC
"#;

#[derive(Clone, Debug)]
enum DatabasePool {
    Sqlite(Pool<Sqlite>),
    Postgres(Pool<Postgres>),
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    token: String,
    scope: String,
    client_uuid: String,
    account_uuid: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RefreshTokenRow> for RefreshToken {
    type Error = TokenStoreError;

    fn try_from(row: RefreshTokenRow) -> Result<Self, Self::Error> {
        let scope = ScopeSet::parse(&row.scope).map_err(|e| {
            TokenStoreError::Storage(format!("unreadable scope column: {e}"))
        })?;

        Ok(Self {
            token: row.token,
            scope,
            client_uuid: row.client_uuid,
            account_uuid: row.account_uuid,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_tokens(rows: Vec<RefreshTokenRow>) -> Result<Vec<RefreshToken>, TokenStoreError> {
    rows.into_iter().map(RefreshToken::try_from).collect()
}

/// SQL-backed refresh token repository (SQLite/Postgres) using SQLx.
///
/// Holds only the pool and the generation policy, so one instance can be
/// shared across tasks.
pub struct SqlxRefreshTokenStore {
    pool: DatabasePool,
    generator: Arc<dyn TokenGenerator>,
    generation_attempts: u32,
}

impl SqlxRefreshTokenStore {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::connect(database_url, 10).await
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = if database_url.starts_with("postgres") {
            DatabasePool::Postgres(
                PoolOptions::<Postgres>::new()
                    .max_connections(max_connections)
                    .connect(database_url)
                    .await?,
            )
        } else {
            // Best-effort: if the directory can't be created, sqlx surfaces the
            // underlying error on connect.
            if let Some(path) = sqlite_db_path(database_url) {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        let _ = std::fs::create_dir_all(parent);
                    }
                }
            }

            let connect_url = sqlite_url_with_create_mode(database_url);
            DatabasePool::Sqlite(
                PoolOptions::<Sqlite>::new()
                    .max_connections(max_connections)
                    .connect(connect_url.as_ref())
                    .await?,
            )
        };

        Ok(Self {
            pool,
            generator: Arc::new(SecureTokenGenerator),
            generation_attempts: DEFAULT_GENERATION_ATTEMPTS,
        })
    }

    /// Replace the token source, e.g. with a deterministic one in tests.
    pub fn with_generator(mut self, generator: Arc<dyn TokenGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_generation_attempts(mut self, attempts: u32) -> Self {
        self.generation_attempts = attempts.max(1);
        self
    }

    /// Name used for the `db_system` span field.
    pub fn db_system(&self) -> &'static str {
        match &self.pool {
            DatabasePool::Sqlite(_) => "sqlite",
            DatabasePool::Postgres(_) => "postgresql",
        }
    }

    async fn insert(
        &self,
        token: &str,
        candidate: &NewRefreshToken,
        scope: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>, TokenStoreError> {
        match &self.pool {
            DatabasePool::Sqlite(pool) => insert_sqlite(pool, token, candidate, scope, now).await,
            DatabasePool::Postgres(pool) => {
                insert_postgres(pool, token, candidate, scope, now).await
            }
        }
    }
}

/// Insert unless the token exists. `None` means the token was taken.
///
/// Uniqueness check and insert are one statement, so concurrent issuers of
/// the same value cannot both succeed.
async fn insert_sqlite<'c, E>(
    executor: E,
    token: &str,
    candidate: &NewRefreshToken,
    scope: &str,
    now: DateTime<Utc>,
) -> Result<Option<RefreshToken>, TokenStoreError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, RefreshTokenRow>(
        r#"
        INSERT INTO refresh_tokens (token, scope, client_uuid, account_uuid, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (token) DO NOTHING
        RETURNING token, scope, client_uuid, account_uuid, created_at, updated_at
        "#,
    )
    .bind(token)
    .bind(scope)
    .bind(&candidate.client_uuid)
    .bind(&candidate.account_uuid)
    .bind(now)
    .bind(now)
    .fetch_optional(executor)
    .await?;

    row.map(RefreshToken::try_from).transpose()
}

async fn insert_postgres<'c, E>(
    executor: E,
    token: &str,
    candidate: &NewRefreshToken,
    scope: &str,
    now: DateTime<Utc>,
) -> Result<Option<RefreshToken>, TokenStoreError>
where
    E: Executor<'c, Database = Postgres>,
{
    let row = sqlx::query_as::<_, RefreshTokenRow>(
        r#"
        INSERT INTO refresh_tokens (token, scope, client_uuid, account_uuid, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (token) DO NOTHING
        RETURNING token, scope, client_uuid, account_uuid, created_at, updated_at
        "#,
    )
    .bind(token)
    .bind(scope)
    .bind(&candidate.client_uuid)
    .bind(&candidate.account_uuid)
    .bind(now)
    .bind(now)
    .fetch_optional(executor)
    .await?;

    row.map(RefreshToken::try_from).transpose()
}

#[async_trait]
impl RefreshTokenRepository for SqlxRefreshTokenStore {
    async fn init(&self) -> Result<(), TokenStoreError> {
        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                bootstrap_sqlite_schema(pool).await?;
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DatabasePool::Postgres(pool) => {
                // Postgres schema is expected to be created by migrations.
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }

        Ok(())
    }

    async fn healthcheck(&self) -> Result<(), TokenStoreError> {
        // Keep readiness/liveness cheap: don't run bootstrap.
        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DatabasePool::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }

        Ok(())
    }

    async fn create(&self, candidate: &NewRefreshToken) -> Result<RefreshToken, TokenStoreError> {
        let now = Utc::now();
        let scope = candidate.scope.serialize();
        let scope = scope.as_str();

        issue_with_retry(
            candidate,
            self.generator.as_ref(),
            self.generation_attempts,
            |token| async move { self.insert(&token, candidate, scope, now).await },
        )
        .await
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<RefreshToken>, TokenStoreError> {
        let row = match &self.pool {
            DatabasePool::Sqlite(pool) => {
                sqlx::query_as::<_, RefreshTokenRow>(
                    "SELECT token, scope, client_uuid, account_uuid, created_at, updated_at FROM refresh_tokens WHERE token = ?",
                )
                .bind(token)
                .fetch_optional(pool)
                .await?
            }
            DatabasePool::Postgres(pool) => {
                sqlx::query_as::<_, RefreshTokenRow>(
                    "SELECT token, scope, client_uuid, account_uuid, created_at, updated_at FROM refresh_tokens WHERE token = $1",
                )
                .bind(token)
                .fetch_optional(pool)
                .await?
            }
        };

        row.map(RefreshToken::try_from).transpose()
    }

    async fn list_all(&self) -> Result<Vec<RefreshToken>, TokenStoreError> {
        let rows = match &self.pool {
            DatabasePool::Sqlite(pool) => {
                sqlx::query_as::<_, RefreshTokenRow>(SELECT_ALL)
                    .fetch_all(pool)
                    .await?
            }
            DatabasePool::Postgres(pool) => {
                sqlx::query_as::<_, RefreshTokenRow>(SELECT_ALL)
                    .fetch_all(pool)
                    .await?
            }
        };

        into_tokens(rows)
    }

    async fn list_by_client(
        &self,
        client_uuid: &str,
    ) -> Result<Vec<RefreshToken>, TokenStoreError> {
        let rows = match &self.pool {
            DatabasePool::Sqlite(pool) => {
                sqlx::query_as::<_, RefreshTokenRow>(
                    r#"
                    SELECT token, scope, client_uuid, account_uuid, created_at, updated_at
                    FROM refresh_tokens WHERE client_uuid = ?
                    ORDER BY created_at ASC, token ASC
                    "#,
                )
                .bind(client_uuid)
                .fetch_all(pool)
                .await?
            }
            DatabasePool::Postgres(pool) => {
                sqlx::query_as::<_, RefreshTokenRow>(
                    r#"
                    SELECT token, scope, client_uuid, account_uuid, created_at, updated_at
                    FROM refresh_tokens WHERE client_uuid = $1
                    ORDER BY created_at ASC, token ASC
                    "#,
                )
                .bind(client_uuid)
                .fetch_all(pool)
                .await?
            }
        };

        into_tokens(rows)
    }

    async fn list_by_account(
        &self,
        account_uuid: &str,
    ) -> Result<Vec<RefreshToken>, TokenStoreError> {
        let rows = match &self.pool {
            DatabasePool::Sqlite(pool) => {
                sqlx::query_as::<_, RefreshTokenRow>(
                    r#"
                    SELECT token, scope, client_uuid, account_uuid, created_at, updated_at
                    FROM refresh_tokens WHERE account_uuid = ?
                    ORDER BY created_at ASC, token ASC
                    "#,
                )
                .bind(account_uuid)
                .fetch_all(pool)
                .await?
            }
            DatabasePool::Postgres(pool) => {
                sqlx::query_as::<_, RefreshTokenRow>(
                    r#"
                    SELECT token, scope, client_uuid, account_uuid, created_at, updated_at
                    FROM refresh_tokens WHERE account_uuid = $1
                    ORDER BY created_at ASC, token ASC
                    "#,
                )
                .bind(account_uuid)
                .fetch_all(pool)
                .await?
            }
        };

        into_tokens(rows)
    }

    async fn delete(&self, token: &str) -> Result<(), TokenStoreError> {
        // Zero affected rows is fine: the token is gone either way.
        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                sqlx::query("DELETE FROM refresh_tokens WHERE token = ?")
                    .bind(token)
                    .execute(pool)
                    .await?;
            }
            DatabasePool::Postgres(pool) => {
                sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
                    .bind(token)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(())
    }

    async fn remove(&self, token: &str) -> Result<Option<RefreshToken>, TokenStoreError> {
        let row = match &self.pool {
            DatabasePool::Sqlite(pool) => {
                sqlx::query_as::<_, RefreshTokenRow>(
                    r#"
                    DELETE FROM refresh_tokens WHERE token = ?
                    RETURNING token, scope, client_uuid, account_uuid, created_at, updated_at
                    "#,
                )
                .bind(token)
                .fetch_optional(pool)
                .await?
            }
            DatabasePool::Postgres(pool) => {
                sqlx::query_as::<_, RefreshTokenRow>(
                    r#"
                    DELETE FROM refresh_tokens WHERE token = $1
                    RETURNING token, scope, client_uuid, account_uuid, created_at, updated_at
                    "#,
                )
                .bind(token)
                .fetch_optional(pool)
                .await?
            }
        };

        row.map(RefreshToken::try_from).transpose()
    }

    async fn delete_by_account(&self, account_uuid: &str) -> Result<u64, TokenStoreError> {
        // The pool variants return different result types, so count per arm.
        let removed = match &self.pool {
            DatabasePool::Sqlite(pool) => sqlx::query(
                "DELETE FROM refresh_tokens WHERE account_uuid = ?",
            )
            .bind(account_uuid)
            .execute(pool)
            .await?
            .rows_affected(),
            DatabasePool::Postgres(pool) => sqlx::query(
                "DELETE FROM refresh_tokens WHERE account_uuid = $1",
            )
            .bind(account_uuid)
            .execute(pool)
            .await?
            .rows_affected(),
        };

        Ok(removed)
    }

    async fn rotate(
        &self,
        old_token: &str,
        replacement: &NewRefreshToken,
    ) -> Result<Option<RefreshToken>, TokenStoreError> {
        let now = Utc::now();
        let scope = replacement.scope.serialize();
        let mut attempts =
            TokenAttempts::new(replacement, self.generator.as_ref(), self.generation_attempts);

        // Dropping the transaction without commit rolls back, so every early
        // return below leaves the old token in place.
        match &self.pool {
            DatabasePool::Sqlite(pool) => {
                let mut tx = pool.begin().await?;
                let removed = sqlx::query("DELETE FROM refresh_tokens WHERE token = ?")
                    .bind(old_token)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                if removed == 0 {
                    return Ok(None);
                }

                while let Some(token) = attempts.next_token()? {
                    if let Some(stored) =
                        insert_sqlite(&mut *tx, &token, replacement, &scope, now).await?
                    {
                        tx.commit().await?;
                        return Ok(Some(stored));
                    }
                }
            }
            DatabasePool::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                let removed = sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
                    .bind(old_token)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                if removed == 0 {
                    return Ok(None);
                }

                while let Some(token) = attempts.next_token()? {
                    if let Some(stored) =
                        insert_postgres(&mut *tx, &token, replacement, &scope, now).await?
                    {
                        tx.commit().await?;
                        return Ok(Some(stored));
                    }
                }
            }
        }

        Err(attempts.exhausted())
    }
}

/// Filesystem path of a file-backed SQLite URL, if any.
fn sqlite_db_path(database_url: &str) -> Option<PathBuf> {
    let rest = database_url.strip_prefix("sqlite:")?;
    if rest.starts_with(":memory:") {
        return None;
    }

    // `sqlite:///abs/path` and `sqlite://rel/path` both reduce to a plain path.
    let rest = rest.strip_prefix("//").unwrap_or(rest);

    let path_part = rest.split('?').next().unwrap_or(rest);
    if path_part.is_empty() {
        return None;
    }

    Some(PathBuf::from(path_part))
}

/// Ask SQLite to create the database file when missing.
fn sqlite_url_with_create_mode(database_url: &str) -> Cow<'_, str> {
    if !database_url.starts_with("sqlite:")
        || database_url.starts_with("sqlite::memory:")
        || database_url.contains("mode=")
    {
        return Cow::Borrowed(database_url);
    }

    let sep = if database_url.contains('?') { '&' } else { '?' };
    Cow::Owned(format!("{database_url}{sep}mode=rwc"))
}
