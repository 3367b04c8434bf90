//! Repository for the `counters` table.
//!
//! A counter's `value` is the next free index. Counters are created on
//! first use, starting at zero.

use sqlx::PgPool;

/// Atomic operations on named counters.
pub struct CounterRepo;

impl CounterRepo {
    /// Reserve `n` consecutive values and return the first.
    pub async fn reserve(pool: &PgPool, name: &str, n: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO counters (name, value) VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE SET value = counters.value + EXCLUDED.value \
             RETURNING value - $2",
        )
        .bind(name)
        .bind(n)
        .fetch_one(pool)
        .await
    }

    /// Current value, zero for a counter never used.
    pub async fn current(pool: &PgPool, name: &str) -> Result<i64, sqlx::Error> {
        let value = sqlx::query_scalar::<_, i64>("SELECT value FROM counters WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(value.unwrap_or(0))
    }

    /// Raise the counter to at least `value` and return the result.
    pub async fn advance_to(pool: &PgPool, name: &str, value: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO counters (name, value) VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE SET value = GREATEST(counters.value, EXCLUDED.value) \
             RETURNING value",
        )
        .bind(name)
        .bind(value)
        .fetch_one(pool)
        .await
    }
}
