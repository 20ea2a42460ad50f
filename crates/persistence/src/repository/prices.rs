//! Price series repository — durable backing for the in-memory store

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// One stored price observation. Value is TEXT to preserve Decimal
/// precision; conversion to engine types happens at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PriceRow {
    pub timestamp: i64,
    pub value: String,
    pub source: String,
}

pub struct PriceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PriceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist one point. The in-memory store deduplicates before calling
    /// this, so a UNIQUE violation here is a contract breach and bubbles
    /// up as a database error.
    pub async fn insert(&self, row: &PriceRow) -> DbResult<()> {
        sqlx::query("INSERT INTO price_points (timestamp, value, source) VALUES (?, ?, ?)")
            .bind(row.timestamp)
            .bind(&row.value)
            .bind(&row.source)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Full series, oldest first — loaded once at startup to rebuild the
    /// in-memory store.
    pub async fn load_all(&self) -> DbResult<Vec<PriceRow>> {
        let rows = sqlx::query_as::<_, PriceRow>(
            "SELECT timestamp, value, source FROM price_points ORDER BY timestamp ASC",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM price_points")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn row(ts: i64, value: &str) -> PriceRow {
        PriceRow {
            timestamp: ts,
            value: value.to_string(),
            source: "purchased".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_reload_preserves_order_and_text_values() {
        let db = Database::in_memory().await.unwrap();
        let repo = PriceRepository::new(db.pool());

        repo.insert(&row(2000, "151.25")).await.unwrap();
        repo.insert(&row(1000, "150.75")).await.unwrap();

        let rows = repo.load_all().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, 1000);
        assert_eq!(rows[0].value, "150.75");
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_timestamp_violates_primary_key() {
        let db = Database::in_memory().await.unwrap();
        let repo = PriceRepository::new(db.pool());

        repo.insert(&row(1000, "150.75")).await.unwrap();
        assert!(repo.insert(&row(1000, "9.99")).await.is_err());
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
