use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite,
}

impl StoreKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Some(StoreKind::Memory),
            "sqlite" => Some(StoreKind::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub kind: StoreKind,
    pub sqlite: SqliteStoreConfig,
}

impl DbConfig {
    pub fn from_env() -> Self {
        let kind = std::env::var("STATS_STORE")
            .ok()
            .as_deref()
            .and_then(StoreKind::parse)
            .unwrap_or(StoreKind::Memory);

        Self {
            kind,
            sqlite: SqliteStoreConfig::from_env(),
        }
    }

    pub fn memory() -> Self {
        Self {
            kind: StoreKind::Memory,
            sqlite: SqliteStoreConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout: Duration,
}

impl SqliteStoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    fn from_env() -> Self {
        let path = std::env::var("STATS_SQLITE_PATH")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_sqlite_path);

        Self {
            path,
            max_connections: env_u32("STATS_SQLITE_MAX_CONNECTIONS", 5).max(1),
            busy_timeout: Duration::from_millis(env_u64("STATS_SQLITE_BUSY_TIMEOUT_MS", 5000)),
        }
    }
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
            max_connections: 5,
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

pub fn default_sqlite_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("com.danci.app")
        .join("mastery.db")
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}
