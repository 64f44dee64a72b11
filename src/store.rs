use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::domain::subscriber::TrashedSubscriber;

/// Tables holding rows keyed by `subscriber_id` that must not outlive their subscriber.
const DEPENDENT_TABLES: [&str; 3] = [
    "subscriber_segment",
    "subscriber_tag",
    "subscriber_custom_field",
];

/// Direct access to the subscriber tables for the mutations the janitor performs.
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn trashed_subscribers(&self) -> Result<Vec<TrashedSubscriber>, StoreError>;

    /// Sets `deleted_at` unless it is already set. Returns whether the row changed.
    async fn mark_trashed(&self, id: Uuid, deleted_at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Removes a trashed subscriber and every dependent row. Returns false, leaving
    /// everything untouched, when the subscriber is gone or no longer trashed.
    async fn delete_cascade(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[derive(thiserror::Error)]
pub enum StoreError {
    #[error("Failed to execute a query against the subscriber tables.")]
    DatabaseError(#[from] sqlx::Error),
}

impl std::fmt::Debug for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Caused by:\n\t({})", self)
    }
}

pub struct PgSubscriberStore {
    db_pool: PgPool,
}

impl PgSubscriberStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriberStore for PgSubscriberStore {
    #[tracing::instrument(name = "Fetching trashed subscribers", skip(self))]
    async fn trashed_subscribers(&self) -> Result<Vec<TrashedSubscriber>, StoreError> {
        let subscribers = sqlx::query(
            r#"
            SELECT id, deleted_at
            FROM subscribers
            WHERE deleted_at IS NOT NULL
            "#,
        )
        .map(|row: PgRow| TrashedSubscriber {
            id: row.get("id"),
            deleted_at: row.get("deleted_at"),
        })
        .fetch_all(&self.db_pool)
        .await?;

        Ok(subscribers)
    }

    #[tracing::instrument(name = "Moving a subscriber to the trash", skip(self))]
    async fn mark_trashed(&self, id: Uuid, deleted_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE subscribers
            SET deleted_at = $1
            WHERE id = $2 AND deleted_at IS NULL
            "#,
        )
        .bind(deleted_at)
        .bind(id)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(name = "Deleting a subscriber and its dependent rows", skip(self))]
    async fn delete_cascade(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut transaction = self.db_pool.begin().await?;

        for table in DEPENDENT_TABLES {
            sqlx::query(&format!("DELETE FROM {} WHERE subscriber_id = $1", table))
                .bind(id)
                .execute(&mut transaction)
                .await?;
        }

        let result = sqlx::query(
            r#"
            DELETE FROM subscribers
            WHERE id = $1 AND deleted_at IS NOT NULL
            "#,
        )
        .bind(id)
        .execute(&mut transaction)
        .await?;

        // Restored in the meantime (or gone): its dependent rows stay.
        if result.rows_affected() == 0 {
            transaction.rollback().await?;
            return Ok(false);
        }

        transaction.commit().await?;

        Ok(true)
    }
}
