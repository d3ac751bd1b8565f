use anyhow::Context;

/// Which backing store holds user records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// How persistence failures are surfaced over HTTP.
///
/// `Split` gives infrastructure failures their own 500 tier. `Collapsed` reports
/// them with the same status as the operation's domain failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTiers {
    Split,
    Collapsed,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AccountPolicy {
    pub reset_require_non_empty: bool,
    pub status_tiers: StatusTiers,
    pub legacy_routes: bool,
}

impl Default for AccountPolicy {
    fn default() -> Self {
        Self {
            reset_require_non_empty: false,
            status_tiers: StatusTiers::Split,
            legacy_routes: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub database: Option<DatabaseConfig>,
    pub host: String,
    pub port: u16,
    pub policy: AccountPolicy,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = match std::env::var("USER_STORE") {
            Ok(v) => parse_store(&v)?,
            Err(_) => StoreBackend::Postgres,
        };

        let database = match store {
            StoreBackend::Postgres => Some(DatabaseConfig {
                url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
                max_connections: std::env::var("DB_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(10),
            }),
            StoreBackend::Memory => None,
        };

        let port = match std::env::var("APP_PORT") {
            Ok(v) => v.parse::<u16>().with_context(|| format!("invalid APP_PORT {v:?}"))?,
            Err(_) => 8080,
        };

        let policy = AccountPolicy {
            reset_require_non_empty: env_flag("RESET_REQUIRE_NON_EMPTY")?,
            status_tiers: match std::env::var("ERROR_STATUS_TIERS") {
                Ok(v) => parse_tiers(&v)?,
                Err(_) => StatusTiers::Split,
            },
            legacy_routes: env_flag("LEGACY_ROUTES")?,
        };

        Ok(Self {
            store,
            database,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            policy,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_store(value: &str) -> anyhow::Result<StoreBackend> {
    match value.trim().to_ascii_lowercase().as_str() {
        "postgres" | "pg" => Ok(StoreBackend::Postgres),
        "memory" | "mem" => Ok(StoreBackend::Memory),
        other => anyhow::bail!("unknown USER_STORE {other:?}"),
    }
}

fn parse_tiers(value: &str) -> anyhow::Result<StatusTiers> {
    match value.trim().to_ascii_lowercase().as_str() {
        "split" => Ok(StatusTiers::Split),
        "collapsed" => Ok(StatusTiers::Collapsed),
        other => anyhow::bail!("unknown ERROR_STATUS_TIERS {other:?}"),
    }
}

fn env_flag(name: &str) -> anyhow::Result<bool> {
    match std::env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => anyhow::bail!("invalid boolean for {name}: {other:?}"),
        },
        Err(_) => Ok(false),
    }
}
