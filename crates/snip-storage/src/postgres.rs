use async_trait::async_trait;
use snip_core::error::{Result, StorageError};
use snip_core::{
    normalize_user, Lookup, ReadRepository, Repository, ShortKey, ShortUrl, StorageStats, UserUrl,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgPool, Row};
use tracing::{debug, info};

/// PostgreSQL implementation of the repository contract.
///
/// One row per URL in `shorten_urls`. Uniqueness lives on `original_url`;
/// since keys are derived from the URL this also keeps keys unique. Soft
/// delete flips `is_deleted`, rows are never removed. Every multi-statement
/// operation runs in a transaction that is committed before returning or
/// rolled back when the transaction guard drops.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a repository from an existing connection pool.
    ///
    /// The schema is assumed to exist; see [`PostgresRepository::migrate`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool, checks connectivity and applies the schema migrations.
    ///
    /// Any failure here is fatal: the process cannot serve without storage.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;

        let repository = Self::new(pool);
        repository.migrate().await?;
        info!("connected to postgres storage");
        Ok(repository)
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Unavailable(format!("migration failed: {e}")))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl ReadRepository for PostgresRepository {
    async fn get(&self, key: &ShortKey) -> Result<Lookup> {
        let row = sqlx::query(
            r#"
            SELECT original_url, user_id, is_deleted
            FROM shorten_urls
            WHERE short_key = $1
            LIMIT 1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(Lookup::NotFound);
        };

        let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if is_deleted {
            return Ok(Lookup::Deleted);
        }

        let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
        let user_id: String = row.try_get("user_id").map_err(map_sqlx_error)?;

        Ok(Lookup::Found(ShortUrl {
            key: key.clone(),
            original_url,
            user_id: normalize_user(Some(user_id)),
        }))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<UserUrl>> {
        let rows = sqlx::query(
            r#"
            SELECT short_key, original_url
            FROM shorten_urls
            WHERE user_id = $1
              AND NOT is_deleted
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let key: String = row.try_get("short_key").map_err(map_sqlx_error)?;
                let original_url: String =
                    row.try_get("original_url").map_err(map_sqlx_error)?;
                Ok(UserUrl {
                    key: ShortKey::new_unchecked(key),
                    original_url,
                })
            })
            .collect()
    }

    async fn stats(&self) -> Result<StorageStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS urls,
                   COUNT(DISTINCT NULLIF(user_id, '')) AS users
            FROM shorten_urls
            WHERE NOT is_deleted
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let users: i64 = row.try_get("users").map_err(map_sqlx_error)?;

        Ok(StorageStats {
            urls: urls.max(0) as u64,
            users: users.max(0) as u64,
        })
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        conn.ping().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn save(&self, batch: &[ShortUrl]) -> Result<Vec<bool>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut conflicts = Vec::with_capacity(batch.len());

        for url in batch {
            let result = sqlx::query(
                r#"
                INSERT INTO shorten_urls (original_url, short_key, user_id, is_deleted)
                VALUES ($1, $2, $3, FALSE)
                ON CONFLICT (original_url) DO NOTHING
                "#,
            )
            .bind(url.original_url.as_str())
            .bind(url.key.as_str())
            .bind(url.owner().unwrap_or_default())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            conflicts.push(result.rows_affected() == 0);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(batch = batch.len(), "saved url batch");
        Ok(conflicts)
    }

    async fn delete_urls(&self, user_id: Option<&str>, keys: &[ShortKey]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for key in keys {
            let query = match user_id {
                Some(user_id) => sqlx::query(
                    r#"
                    UPDATE shorten_urls
                    SET is_deleted = TRUE
                    WHERE short_key = $1
                      AND user_id = $2
                    "#,
                )
                .bind(key.as_str())
                .bind(user_id),
                None => sqlx::query(
                    r#"
                    UPDATE shorten_urls
                    SET is_deleted = TRUE
                    WHERE short_key = $1
                    "#,
                )
                .bind(key.as_str()),
            };

            query.execute(&mut *tx).await.map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(keys = keys.len(), "soft-deleted url batch");
        Ok(())
    }
}
