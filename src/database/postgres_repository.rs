use crate::database::record_store::RecordStore;
use crate::error::app_error::FetchError;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

/// Record store over a single JSONB table keyed by `(collection, id)`.
#[derive(Clone)]
pub struct PostgresRepository {
    pub pool: PgPool,
}

#[async_trait]
impl RecordStore for PostgresRepository {
    async fn fetch_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, FetchError> {
        let row = sqlx::query_as::<_, (Value,)>(
            r#"
            SELECT data
            FROM records
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(data,)| data))
    }

    async fn upsert(&self, collection: &str, id: &str, record: Value) -> Result<(), FetchError> {
        sqlx::query(
            r#"
            INSERT INTO records (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id)
            DO UPDATE SET data = EXCLUDED.data, updated_at = now()
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(&record)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, FetchError> {
        let result = sqlx::query("DELETE FROM records WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, FetchError> {
        let rows = sqlx::query_as::<_, (String, Value)>(
            r#"
            SELECT id, data
            FROM records
            WHERE collection = $1
            ORDER BY id
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
