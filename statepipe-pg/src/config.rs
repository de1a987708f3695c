//! Database Configuration Module
//!
//! Connection settings and table layout, loaded from environment variables
//! with defaults for the proof-of-concept `poc.states` table.

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use once_cell::sync::Lazy;
use regex::Regex;
use statepipe_core::{
    normalize_dsn, redact_dsn, ConfigError, DocumentColumn, DocumentShape, StateResult,
};
use std::fmt;
use std::time::Duration;
use tokio_postgres::NoTls;

use crate::error::PgError;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid identifier regex")
});

// ============================================================================
// TABLE LAYOUT
// ============================================================================

/// A validated SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(field: &str, value: &str) -> Result<Self, ConfigError> {
        if IDENTIFIER.is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(ConfigError::InvalidValue {
                field: field.to_string(),
                value: value.to_string(),
                reason: "expected a plain SQL identifier".to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for interpolation into SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the states live and how their documents are laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub schema: Identifier,
    pub table: Identifier,
    pub column: DocumentColumn,
    pub shape: DocumentShape,
}

impl TableLayout {
    /// `"schema"."table"`
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema.quoted(), self.table.quoted())
    }
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            schema: Identifier("poc".to_string()),
            table: Identifier("states".to_string()),
            column: DocumentColumn::default(),
            shape: DocumentShape::default(),
        }
    }
}

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Clone)]
pub struct DbConfig {
    /// Normalized connection string (driver qualifier and query removed)
    pub url: String,
    /// Target table and document layout
    pub layout: TableLayout,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection and checkout timeout
    pub timeout: Duration,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("url", &redact_dsn(&self.url))
            .field("layout", &self.layout)
            .field("max_size", &self.max_size)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://postgres@localhost:5432/postgres".to_string(),
            layout: TableLayout::default(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a database configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DATABASE_URL`: connection string (required)
    /// - `STATEPIPE_DB_SCHEMA`: schema of the states table (default: poc)
    /// - `STATEPIPE_DB_TABLE`: states table name (default: states)
    /// - `STATEPIPE_DOCUMENT_COLUMN`: extracted_data or canonical_schema (default: extracted_data)
    /// - `STATEPIPE_DOCUMENT_SHAPE`: flattened or nested (default: flattened)
    /// - `STATEPIPE_DB_POOL_SIZE`: maximum pool size (default: 16)
    /// - `STATEPIPE_DB_TIMEOUT`: timeout in seconds (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let url = get("DATABASE_URL").ok_or_else(|| ConfigError::MissingRequired {
            field: "DATABASE_URL".to_string(),
        })?;

        let layout = TableLayout {
            schema: match get("STATEPIPE_DB_SCHEMA") {
                Some(value) => Identifier::parse("STATEPIPE_DB_SCHEMA", value.trim())?,
                None => defaults.layout.schema,
            },
            table: match get("STATEPIPE_DB_TABLE") {
                Some(value) => Identifier::parse("STATEPIPE_DB_TABLE", value.trim())?,
                None => defaults.layout.table,
            },
            column: get("STATEPIPE_DOCUMENT_COLUMN")
                .map(|value| value.parse())
                .transpose()?
                .unwrap_or(defaults.layout.column),
            shape: get("STATEPIPE_DOCUMENT_SHAPE")
                .map(|value| value.parse())
                .transpose()?
                .unwrap_or(defaults.layout.shape),
        };

        Ok(Self {
            url: normalize_dsn(&url)?,
            layout,
            max_size: parse_number("STATEPIPE_DB_POOL_SIZE", get("STATEPIPE_DB_POOL_SIZE"))?
                .unwrap_or(defaults.max_size),
            timeout: parse_number("STATEPIPE_DB_TIMEOUT", get("STATEPIPE_DB_TIMEOUT"))?
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> StateResult<Pool> {
        let mut cfg = Config::new();
        cfg.url = Some(self.url.clone());
        cfg.connect_timeout = Some(self.timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        let mut timeouts = Timeouts::new();
        timeouts.wait = Some(self.timeout);
        timeouts.create = Some(self.timeout);
        timeouts.recycle = Some(self.timeout);
        let mut pool_config = PoolConfig::new(self.max_size);
        pool_config.timeouts = timeouts;
        cfg.pool = Some(pool_config);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(PgError::from)?;

        tracing::debug!(
            url = %redact_dsn(&self.url),
            table = %self.layout.qualified_table(),
            max_size = self.max_size,
            "Created connection pool"
        );
        Ok(pool)
    }
}

fn parse_number<T>(field: &str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    value
        .map(|text| {
            text.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                field: field.to_string(),
                value: text.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_defaults_with_only_url() {
        let config =
            DbConfig::from_lookup(lookup(&[("DATABASE_URL", "postgresql://u:p@db:5432/app")]))
                .unwrap();
        assert_eq!(config.url, "postgresql://u:p@db:5432/app");
        assert_eq!(config.layout, TableLayout::default());
        assert_eq!(config.layout.qualified_table(), "\"poc\".\"states\"");
        assert_eq!(config.max_size, 16);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_url_is_normalized() {
        let config = DbConfig::from_lookup(lookup(&[(
            "DATABASE_URL",
            "postgresql+psycopg://u:p@db:5432/app?sslmode=disable",
        )]))
        .unwrap();
        assert_eq!(config.url, "postgresql://u:p@db:5432/app");
    }

    #[test]
    fn test_missing_url() {
        let err = DbConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "DATABASE_URL".to_string()
            }
        );

        let err = DbConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn test_overrides() {
        let config = DbConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("STATEPIPE_DB_SCHEMA", "staging"),
            ("STATEPIPE_DB_TABLE", "states_v2"),
            ("STATEPIPE_DOCUMENT_COLUMN", "canonical_schema"),
            ("STATEPIPE_DOCUMENT_SHAPE", "nested"),
            ("STATEPIPE_DB_POOL_SIZE", "4"),
            ("STATEPIPE_DB_TIMEOUT", "5"),
        ]))
        .unwrap();
        assert_eq!(config.layout.schema.as_str(), "staging");
        assert_eq!(config.layout.table.as_str(), "states_v2");
        assert_eq!(config.layout.column, DocumentColumn::CanonicalSchema);
        assert_eq!(config.layout.shape, DocumentShape::Nested);
        assert_eq!(config.max_size, 4);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_unsafe_identifier() {
        let err = DbConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("STATEPIPE_DB_TABLE", "states; drop table x"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "STATEPIPE_DB_TABLE"));
        assert!(Identifier::parse("t", "1states").is_err());
        assert!(Identifier::parse("t", "_dlt_load").is_ok());
    }

    #[test]
    fn test_rejects_bad_pool_size() {
        let err = DbConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/app"),
            ("STATEPIPE_DB_POOL_SIZE", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "STATEPIPE_DB_POOL_SIZE"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = DbConfig {
            url: "postgresql://user:hunter2@db/app".to_string(),
            ..DbConfig::default()
        };
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_from_env_reads_process_environment() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _url = EnvVarGuard::set("DATABASE_URL", Some("postgresql+asyncpg://localhost/app"));
        let _table = EnvVarGuard::set("STATEPIPE_DB_TABLE", Some("states"));
        let _shape = EnvVarGuard::set("STATEPIPE_DOCUMENT_SHAPE", None);

        let config = DbConfig::from_env().unwrap();
        assert_eq!(config.url, "postgresql://localhost/app");
        assert_eq!(config.layout.shape, DocumentShape::Flattened);
    }
}
