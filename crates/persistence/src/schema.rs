//! Database schema definitions

/// SQL to create all tables
/// NOTE: price values stored as TEXT to preserve Decimal precision
pub const CREATE_TABLES: &str = r#"
-- Observed price series (append-only, one row per unique timestamp)
CREATE TABLE IF NOT EXISTS price_points (
    timestamp INTEGER PRIMARY KEY,
    value TEXT NOT NULL,
    source TEXT NOT NULL
);

-- Reinforcement-only cache of parameterizations that produced usable data
CREATE TABLE IF NOT EXISTS query_patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    goal_type TEXT NOT NULL,
    template_hash TEXT NOT NULL,
    template TEXT NOT NULL,
    success_count INTEGER NOT NULL DEFAULT 1,
    last_used_at INTEGER NOT NULL,
    UNIQUE(goal_type, template_hash)
);

-- One row per cycle that produced a notable result
CREATE TABLE IF NOT EXISTS findings (
    cycle INTEGER PRIMARY KEY,
    created_at INTEGER NOT NULL,
    goal_id TEXT NOT NULL,
    price_timestamp INTEGER,
    price_value TEXT,
    strategy_json TEXT
);

-- Immutable backtest outcomes, versioned per strategy_id
CREATE TABLE IF NOT EXISTS strategy_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    strategy_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    parameters TEXT NOT NULL,
    win_rate REAL NOT NULL DEFAULT 0,
    profit_factor REAL,
    total_return REAL NOT NULL DEFAULT 0,
    trade_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'candidate',
    created_at INTEGER NOT NULL,
    UNIQUE(strategy_id, version)
);

-- ========== INDEXES ==========

CREATE INDEX IF NOT EXISTS idx_patterns_goal ON query_patterns(goal_type, success_count DESC);
CREATE INDEX IF NOT EXISTS idx_results_strategy ON strategy_results(strategy_id, version DESC)
"#;

/// ALTER TABLE migrations applied after table creation; "duplicate column
/// name" errors are expected on files that already carry the column.
pub const MIGRATIONS: &[&str] = &["ALTER TABLE findings ADD COLUMN commentary TEXT"];
