use sqlx::{sqlite::{SqlitePoolOptions, SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous}, Pool, Sqlite, ConnectOptions, Row};
use chrono::{DateTime, NaiveDate, Utc};
use std::str::FromStr;

use crate::matrix::{EasinessKey, OptimalFactorMatrix};
use crate::models::{DrillItem, ItemState};

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for DrillItem {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        let id: String = row.try_get("id")?;

        let last_interval: f64 = row.try_get("last_interval")?;
        let repetitions: i32 = row.try_get("repetitions")?;
        let easiness: Option<f64> = row.try_get("easiness")?;
        let failures: i32 = row.try_get("failures")?;
        let mean_quality: Option<f64> = row.try_get("mean_quality")?;
        let total_repeats: i32 = row.try_get("total_repeats")?;

        let last_quality: Option<i64> = row.try_get("last_quality")?;
        let last_reviewed: Option<DateTime<Utc>> = row.try_get("last_reviewed")?;
        let due_date: Option<NaiveDate> = row.try_get("due_date")?;

        Ok(DrillItem {
            id,
            state: ItemState {
                last_interval,
                repetitions,
                easiness,
                failures,
                mean_quality,
                total_repeats,
                last_quality: last_quality.and_then(|q| u8::try_from(q).ok()),
                last_reviewed,
                due_date,
            },
        })
    }
}

/// SQLite store for item records and the optimal factor matrix.
#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

impl Db {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?
            .synchronous(SqliteSynchronous::Normal)
            .log_statements(log::LevelFilter::Trace);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every in-memory connection is its own database, so keep just one.
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect_with(options)
            .await?;

        let db = Db { pool };
        db.migrate().await?;
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                last_interval REAL NOT NULL DEFAULT -1,
                repetitions INTEGER NOT NULL DEFAULT 0,
                easiness REAL,
                failures INTEGER NOT NULL DEFAULT 0,
                mean_quality REAL,
                total_repeats INTEGER NOT NULL DEFAULT 0,
                last_quality INTEGER,
                last_reviewed DATETIME,
                due_date DATE
            );
            "#
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS optimal_factors (
                repetition INTEGER NOT NULL,
                easiness INTEGER NOT NULL,
                factor REAL NOT NULL,
                PRIMARY KEY (repetition, easiness)
            );
            "#
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Registers an item with default state. Existing items are untouched.
    pub async fn add_item(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("INSERT OR IGNORE INTO items (id) VALUES (?)")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn load_items(&self) -> anyhow::Result<Vec<DrillItem>> {
        let items = sqlx::query_as::<_, DrillItem>("SELECT * FROM items ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    pub async fn get_item(&self, id: &str) -> anyhow::Result<Option<DrillItem>> {
        let item = sqlx::query_as::<_, DrillItem>("SELECT * FROM items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    /// Writes an item's whole state in one statement.
    pub async fn save_item(&self, item: &DrillItem) -> anyhow::Result<()> {
        let s = &item.state;
        sqlx::query(
            r#"
            INSERT INTO items (id, last_interval, repetitions, easiness, failures, mean_quality,
                               total_repeats, last_quality, last_reviewed, due_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                last_interval = excluded.last_interval,
                repetitions = excluded.repetitions,
                easiness = excluded.easiness,
                failures = excluded.failures,
                mean_quality = excluded.mean_quality,
                total_repeats = excluded.total_repeats,
                last_quality = excluded.last_quality,
                last_reviewed = excluded.last_reviewed,
                due_date = excluded.due_date
            "#
        )
        .bind(&item.id)
        .bind(s.last_interval)
        .bind(s.repetitions)
        .bind(s.easiness)
        .bind(s.failures)
        .bind(s.mean_quality)
        .bind(s.total_repeats)
        .bind(s.last_quality.map(i64::from))
        .bind(s.last_reviewed)
        .bind(s.due_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_matrix(&self) -> anyhow::Result<OptimalFactorMatrix> {
        let rows = sqlx::query("SELECT repetition, easiness, factor FROM optimal_factors")
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let n: i32 = row.try_get("repetition")?;
            let key: i64 = row.try_get("easiness")?;
            let factor: f64 = row.try_get("factor")?;
            entries.push((n, EasinessKey::from_thousandths(key), factor));
        }
        Ok(OptimalFactorMatrix::from_entries(entries))
    }

    /// Upserts every entry. Rows are never deleted, matching the matrix.
    pub async fn save_matrix(&self, matrix: &OptimalFactorMatrix) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for (n, key, factor) in matrix.entries() {
            sqlx::query(
                "INSERT INTO optimal_factors (repetition, easiness, factor) VALUES (?, ?, ?)
                 ON CONFLICT(repetition, easiness) DO UPDATE SET factor = excluded.factor"
            )
            .bind(n)
            .bind(key.thousandths())
            .bind(factor)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        log::debug!("saved {} optimal factors", matrix.len());
        Ok(())
    }
}
