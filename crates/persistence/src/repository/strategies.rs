//! Strategy result repository — versioned, immutable backtest outcomes
//!
//! Metrics rows are never updated. The only permitted mutation is the
//! candidate → archived status flip when a newer version of the same
//! strategy_id lands.

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StrategyRow {
    pub strategy_id: String,
    pub version: i64,
    pub parameters: String,
    pub win_rate: f64,
    /// NULL encodes the undefined (gains, zero losses) sentinel
    pub profit_factor: Option<f64>,
    pub total_return: f64,
    pub trade_count: i64,
    pub status: String,
    pub created_at: i64,
}

pub struct StrategyRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StrategyRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// The version the next run of this strategy_id should write
    pub async fn next_version(&self, strategy_id: &str) -> DbResult<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT MAX(version) FROM strategy_results WHERE strategy_id = ?")
                .bind(strategy_id)
                .fetch_optional(self.pool)
                .await?;
        Ok(row.map(|(max,)| max).unwrap_or(0) + 1)
    }

    pub async fn insert(&self, row: &StrategyRow) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO strategy_results
                (strategy_id, version, parameters, win_rate, profit_factor, total_return, trade_count, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.strategy_id)
        .bind(row.version)
        .bind(&row.parameters)
        .bind(row.win_rate)
        .bind(row.profit_factor)
        .bind(row.total_return)
        .bind(row.trade_count)
        .bind(&row.status)
        .bind(row.created_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Flip every older candidate of this strategy_id to archived
    pub async fn archive_superseded(&self, strategy_id: &str, current_version: i64) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE strategy_results SET status = 'archived'
            WHERE strategy_id = ? AND version < ? AND status = 'candidate'
            "#,
        )
        .bind(strategy_id)
        .bind(current_version)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get(&self, strategy_id: &str, version: i64) -> DbResult<Option<StrategyRow>> {
        let row = sqlx::query_as::<_, StrategyRow>(
            r#"
            SELECT strategy_id, version, parameters, win_rate, profit_factor, total_return, trade_count, status, created_at
            FROM strategy_results WHERE strategy_id = ? AND version = ?
            "#,
        )
        .bind(strategy_id)
        .bind(version)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn row(version: i64, status: &str) -> StrategyRow {
        StrategyRow {
            strategy_id: "ma_crossover_5_15".to_string(),
            version,
            parameters: r#"{"rule":"ma_crossover","fast":5,"slow":15}"#.to_string(),
            win_rate: 0.6,
            profit_factor: Some(1.8),
            total_return: 0.12,
            trade_count: 10,
            status: status.to_string(),
            created_at: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn versions_are_monotonic_per_strategy() {
        let db = Database::in_memory().await.unwrap();
        let repo = StrategyRepository::new(db.pool());

        assert_eq!(repo.next_version("ma_crossover_5_15").await.unwrap(), 1);
        repo.insert(&row(1, "candidate")).await.unwrap();
        assert_eq!(repo.next_version("ma_crossover_5_15").await.unwrap(), 2);
        // Other strategy ids are unaffected
        assert_eq!(repo.next_version("breakout_20").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn superseded_candidates_are_archived_not_rewritten() {
        let db = Database::in_memory().await.unwrap();
        let repo = StrategyRepository::new(db.pool());

        repo.insert(&row(1, "candidate")).await.unwrap();
        repo.insert(&row(2, "candidate")).await.unwrap();

        let archived = repo.archive_superseded("ma_crossover_5_15", 2).await.unwrap();
        assert_eq!(archived, 1);

        let v1 = repo.get("ma_crossover_5_15", 1).await.unwrap().unwrap();
        let v2 = repo.get("ma_crossover_5_15", 2).await.unwrap().unwrap();
        assert_eq!(v1.status, "archived");
        assert_eq!(v2.status, "candidate");
        // Metrics untouched by the status flip
        assert_eq!(v1.total_return, 0.12);
    }

    #[tokio::test]
    async fn duplicate_version_insert_is_rejected() {
        let db = Database::in_memory().await.unwrap();
        let repo = StrategyRepository::new(db.pool());

        repo.insert(&row(1, "candidate")).await.unwrap();
        assert!(repo.insert(&row(1, "candidate")).await.is_err());
    }

    #[tokio::test]
    async fn null_profit_factor_round_trips() {
        let db = Database::in_memory().await.unwrap();
        let repo = StrategyRepository::new(db.pool());

        let mut undefined_pf = row(1, "candidate");
        undefined_pf.profit_factor = None;
        repo.insert(&undefined_pf).await.unwrap();

        let loaded = repo.get("ma_crossover_5_15", 1).await.unwrap().unwrap();
        assert_eq!(loaded.profit_factor, None);
        assert_eq!(loaded, undefined_pf);
    }
}
