//! Findings repository — the immutable per-cycle history
//!
//! One row per cycle that produced something notable: the goal worked,
//! any purchased point, the top-ranked strategy result, and optional
//! narration. This table, not the agent snapshot, is the durable record
//! other tooling reads.

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FindingRecord {
    pub cycle: i64,
    pub created_at: i64,
    pub goal_id: String,
    pub price_timestamp: Option<i64>,
    pub price_value: Option<String>,
    /// Serialized StrategyResult, when the cycle ran a backtest
    pub strategy_json: Option<String>,
    /// Advisory free-text from the narration service; never feeds numbers
    pub commentary: Option<String>,
}

pub struct FindingsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FindingsRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &FindingRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO findings (cycle, created_at, goal_id, price_timestamp, price_value, strategy_json, commentary)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.cycle)
        .bind(record.created_at)
        .bind(&record.goal_id)
        .bind(record.price_timestamp)
        .bind(&record.price_value)
        .bind(&record.strategy_json)
        .bind(&record.commentary)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, cycle: i64) -> DbResult<Option<FindingRecord>> {
        let record = sqlx::query_as::<_, FindingRecord>(
            r#"
            SELECT cycle, created_at, goal_id, price_timestamp, price_value, strategy_json, commentary
            FROM findings WHERE cycle = ?
            "#,
        )
        .bind(cycle)
        .fetch_optional(self.pool)
        .await?;
        Ok(record)
    }

    /// Most recent findings, newest first
    pub async fn latest(&self, limit: i64) -> DbResult<Vec<FindingRecord>> {
        let records = sqlx::query_as::<_, FindingRecord>(
            r#"
            SELECT cycle, created_at, goal_id, price_timestamp, price_value, strategy_json, commentary
            FROM findings ORDER BY cycle DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[tokio::test]
    async fn insert_and_fetch_by_cycle() {
        let db = Database::in_memory().await.unwrap();
        let repo = FindingsRepository::new(db.pool());

        let record = FindingRecord {
            cycle: 176,
            created_at: 1_700_000_000_000,
            goal_id: "goal_001".to_string(),
            price_timestamp: Some(1_700_000_000_000),
            price_value: Some("151.25".to_string()),
            strategy_json: None,
            commentary: Some("price holding above support".to_string()),
        };
        repo.insert(&record).await.unwrap();

        let loaded = repo.get(176).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(repo.get(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_returns_newest_first() {
        let db = Database::in_memory().await.unwrap();
        let repo = FindingsRepository::new(db.pool());

        for cycle in 1..=5 {
            repo.insert(&FindingRecord {
                cycle,
                created_at: cycle * 1000,
                goal_id: "goal_001".to_string(),
                price_timestamp: None,
                price_value: None,
                strategy_json: None,
                commentary: None,
            })
            .await
            .unwrap();
        }

        let latest = repo.latest(3).await.unwrap();
        let cycles: Vec<i64> = latest.iter().map(|f| f.cycle).collect();
        assert_eq!(cycles, vec![5, 4, 3]);
    }
}
