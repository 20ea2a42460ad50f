//! Query pattern tracker — a reinforcement-only cache of parameterizations
//! that produced usable data
//!
//! Failures never decay success counts; the cache only learns "use what
//! worked", so repeated purchases converge on reliable parameterizations
//! instead of oscillating.

use std::collections::BTreeMap;

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::DbResult;

/// A gateway parameterization. BTreeMap keeps key order canonical so that
/// structural equality and hashing agree.
pub type ParameterTemplate = BTreeMap<String, serde_json::Value>;

/// Structural identity of a template: sha256 over its canonical JSON
pub fn template_hash(template: &ParameterTemplate) -> String {
    let canonical = serde_json::to_string(template).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, FromRow)]
pub struct PatternRow {
    pub id: i64,
    pub goal_type: String,
    pub template: String,
    pub success_count: i64,
    pub last_used_at: i64,
}

pub struct PatternRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PatternRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new pattern with success_count = 1, or increment the count
    /// of the structurally identical one.
    pub async fn record_success(
        &self,
        goal_type: &str,
        template: &ParameterTemplate,
    ) -> DbResult<()> {
        let hash = template_hash(template);
        let json = serde_json::to_string(template).unwrap_or_default();
        let now = Utc::now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO query_patterns (goal_type, template_hash, template, success_count, last_used_at)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(goal_type, template_hash)
            DO UPDATE SET success_count = success_count + 1, last_used_at = excluded.last_used_at
            "#,
        )
        .bind(goal_type)
        .bind(&hash)
        .bind(&json)
        .bind(now)
        .execute(self.pool)
        .await?;

        debug!(goal_type, hash = %&hash[..8], "Query pattern reinforced");
        Ok(())
    }

    /// Failures are deliberately not recorded: this cache is a
    /// recommendation signal, not a penalty ledger.
    pub fn record_failure(&self, _goal_type: &str, _template: &ParameterTemplate) {}

    /// The template with the highest success_count for this goal type;
    /// ties go to the most recently used, then the oldest row.
    pub async fn recommend(&self, goal_type: &str) -> DbResult<Option<ParameterTemplate>> {
        let row = sqlx::query_as::<_, PatternRow>(
            r#"
            SELECT id, goal_type, template, success_count, last_used_at
            FROM query_patterns
            WHERE goal_type = ?
            ORDER BY success_count DESC, last_used_at DESC, id ASC
            LIMIT 1
            "#,
        )
        .bind(goal_type)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.and_then(|r| serde_json::from_str(&r.template).ok()))
    }

    /// Current count for one (goal_type, template) pair; 0 if unseen
    pub async fn success_count(
        &self,
        goal_type: &str,
        template: &ParameterTemplate,
    ) -> DbResult<i64> {
        let hash = template_hash(template);
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT success_count FROM query_patterns WHERE goal_type = ? AND template_hash = ?",
        )
        .bind(goal_type)
        .bind(&hash)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(|(c,)| c).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use serde_json::json;

    fn template(pairs: &[(&str, serde_json::Value)]) -> ParameterTemplate {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn success_count_is_monotonic_and_failures_are_ignored() {
        let db = Database::in_memory().await.unwrap();
        let repo = PatternRepository::new(db.pool());
        let t = template(&[("token_address", json!("So1111"))]);

        assert_eq!(repo.success_count("market_analysis", &t).await.unwrap(), 0);

        let mut last = 0;
        for _ in 0..3 {
            repo.record_success("market_analysis", &t).await.unwrap();
            let count = repo.success_count("market_analysis", &t).await.unwrap();
            assert!(count > last);
            last = count;
        }
        assert_eq!(last, 3);

        repo.record_failure("market_analysis", &t);
        repo.record_failure("market_analysis", &t);
        assert_eq!(repo.success_count("market_analysis", &t).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn recommend_returns_highest_count_template() {
        let db = Database::in_memory().await.unwrap();
        let repo = PatternRepository::new(db.pool());

        let weak = template(&[("interval", json!("1h"))]);
        let strong = template(&[("interval", json!("15m"))]);

        repo.record_success("trend", &weak).await.unwrap();
        for _ in 0..3 {
            repo.record_success("trend", &strong).await.unwrap();
        }

        let recommended = repo.recommend("trend").await.unwrap().unwrap();
        assert_eq!(recommended, strong);
    }

    #[tokio::test]
    async fn recommend_is_none_for_unseen_goal_type() {
        let db = Database::in_memory().await.unwrap();
        let repo = PatternRepository::new(db.pool());
        assert!(repo.recommend("arbitrage").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn template_equality_is_structural() {
        let a = template(&[("x", json!(1)), ("y", json!(2))]);
        let b = template(&[("y", json!(2)), ("x", json!(1))]);
        assert_eq!(template_hash(&a), template_hash(&b));

        let c = template(&[("x", json!(1)), ("y", json!(3))]);
        assert_ne!(template_hash(&a), template_hash(&c));
    }
}
