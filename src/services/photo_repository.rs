//! Metadata store for `Photo` records, backed by SQLite.

use crate::models::photo::Photo;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait PhotoRepository: Send + Sync {
    /// Insert or overwrite the record with `photo.id` and return what was stored.
    async fn save(&self, photo: Photo) -> RepositoryResult<Photo>;
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Photo>>;
    async fn ping(&self) -> RepositoryResult<()>;
}

#[derive(Clone)]
pub struct SqlitePhotoRepository {
    db: Arc<SqlitePool>,
}

impl SqlitePhotoRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> RepositoryResult<()> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PhotoRepository for SqlitePhotoRepository {
    async fn save(&self, photo: Photo) -> RepositoryResult<Photo> {
        let saved = sqlx::query_as::<_, Photo>(
            r#"
            INSERT INTO photos (id, uri, label, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                uri = excluded.uri,
                label = excluded.label
            RETURNING id, uri, label
            "#,
        )
        .bind(&photo.id)
        .bind(&photo.uri)
        .bind(&photo.label)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;

        debug!("saved photo {}", saved.id);
        Ok(saved)
    }

    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Photo>> {
        let photo = sqlx::query_as::<_, Photo>("SELECT id, uri, label FROM photos WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(photo)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    /// Fresh in-memory repository with the schema applied.
    pub(crate) async fn memory_repository() -> SqlitePhotoRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = SqlitePhotoRepository::new(Arc::new(pool));
        repo.migrate().await.unwrap();
        repo
    }

    fn photo(id: &str, label: &str) -> Photo {
        Photo {
            id: id.into(),
            uri: format!("/image/{}", id),
            label: label.into(),
        }
    }

    #[tokio::test]
    async fn save_echoes_record() {
        let repo = memory_repository().await;
        let saved = repo.save(photo("x1", "cat")).await.unwrap();
        assert_eq!(saved, photo("x1", "cat"));
    }

    #[tokio::test]
    async fn saved_record_can_be_found() {
        let repo = memory_repository().await;
        repo.save(photo("x1", "cat")).await.unwrap();

        let found = repo.find_by_id("x1").await.unwrap();
        assert_eq!(found, Some(photo("x1", "cat")));
        assert_eq!(repo.find_by_id("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn saving_same_id_overwrites() {
        let repo = memory_repository().await;
        repo.save(photo("x1", "cat")).await.unwrap();
        repo.save(photo("x1", "dog")).await.unwrap();

        let found = repo.find_by_id("x1").await.unwrap().unwrap();
        assert_eq!(found.label, "dog");
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let repo = memory_repository().await;
        repo.migrate().await.unwrap();
        repo.ping().await.unwrap();
    }
}
