use std::path::PathBuf;
use std::str::FromStr;

use glossa_core::stats::DEFAULT_STALE_GRACE_SECS;

/// Which store implementation backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// PostgreSQL via `glossa_db::PgStore`.
    Postgres,
    /// Process-local `InMemoryStore`; state is lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    pub store_backend: StoreBackend,
    /// Required when `store_backend` is Postgres.
    pub database_url: Option<String>,
    /// External tagging service; the built-in lexicon analyzer is used when unset.
    pub analyzer_url: Option<String>,
    /// JSON file extending the built-in lexicon.
    pub lexicon_path: Option<PathBuf>,
    /// Maximum age of a valid cached aggregate before it is recomputed.
    pub stale_grace_secs: i64,
    /// Rows per TF-IDF page.
    pub tfidf_page_size: i64,
    /// Upper bound on `n` for random work fetches.
    pub max_sample_size: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `HOST`                       | `0.0.0.0`               |
    /// | `PORT`                       | `3000`                  |
    /// | `CORS_ORIGINS`               | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                    |
    /// | `STORE_BACKEND`              | `postgres`              |
    /// | `DATABASE_URL`               | (none)                  |
    /// | `ANALYZER_URL`               | (none)                  |
    /// | `LEXICON_PATH`               | (none)                  |
    /// | `AGGREGATE_STALE_GRACE_SECS` | `1800`                  |
    /// | `TFIDF_PAGE_SIZE`            | `50`                    |
    /// | `MAX_SAMPLE_SIZE`            | `500`                   |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let store_backend: StoreBackend = std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".into())
            .parse()
            .expect("STORE_BACKEND must be 'postgres' or 'memory'");

        let database_url = non_empty_var("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            panic!("DATABASE_URL must be set when STORE_BACKEND=postgres");
        }

        let analyzer_url = non_empty_var("ANALYZER_URL").map(|u| u.trim_end_matches('/').to_string());
        let lexicon_path = non_empty_var("LEXICON_PATH").map(PathBuf::from);

        let stale_grace_secs: i64 = std::env::var("AGGREGATE_STALE_GRACE_SECS")
            .unwrap_or_else(|_| DEFAULT_STALE_GRACE_SECS.to_string())
            .parse()
            .expect("AGGREGATE_STALE_GRACE_SECS must be a valid i64");

        let tfidf_page_size: i64 = std::env::var("TFIDF_PAGE_SIZE")
            .unwrap_or_else(|_| "50".into())
            .parse()
            .expect("TFIDF_PAGE_SIZE must be a valid i64");
        assert!(tfidf_page_size > 0, "TFIDF_PAGE_SIZE must be positive");

        let max_sample_size: usize = std::env::var("MAX_SAMPLE_SIZE")
            .unwrap_or_else(|_| "500".into())
            .parse()
            .expect("MAX_SAMPLE_SIZE must be a valid usize");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            store_backend,
            database_url,
            analyzer_url,
            lexicon_path,
            stale_grace_secs,
            tfidf_page_size,
            max_sample_size,
        }
    }

    pub fn stale_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_grace_secs)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_backend_parses_aliases() {
        assert_eq!("Postgres".parse::<StoreBackend>(), Ok(StoreBackend::Postgres));
        assert_eq!(" memory ".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert!("redis".parse::<StoreBackend>().is_err());
    }
}
