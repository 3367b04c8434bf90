/// All persisted primary keys are 64-bit integers (BIGSERIAL in Postgres).
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
