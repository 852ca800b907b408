use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the tender marketplace
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketConfig {
    /// Backing store settings
    pub database: DatabaseConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Listing defaults
    pub pagination: PaginationConfig,
    /// Decision workflow settings
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
    /// How long SQLite waits on a locked database before failing
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Single-connection in-memory database, used by tests and dry runs
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            auto_migrate: true,
            busy_timeout_ms: 5000,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaginationConfig {
    /// Limit applied when the caller does not pass one; 0 means unlimited
    pub default_limit: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowConfig {
    /// Deadline for a whole decision transaction
    pub decision_timeout_ms: Option<u64>,
}

impl WorkflowConfig {
    pub fn decision_timeout(&self) -> Option<Duration> {
        self.decision_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tender-market.db".to_string(),
                max_connections: 1,
                auto_migrate: true,
                busy_timeout_ms: 5000,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: true,
            },
            pagination: PaginationConfig { default_limit: 0 },
            workflow: WorkflowConfig {
                decision_timeout_ms: Some(10_000),
            },
        }
    }
}

impl MarketConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (tender-market.toml)
    /// 3. Environment variables (prefixed with TENDER_MARKET__)
    pub fn load() -> Result<Self> {
        let defaults = Config::try_from(&MarketConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if Path::new("tender-market.toml").exists() {
            builder = builder.add_source(File::with_name("tender-market"));
        }

        builder = builder.add_source(
            Environment::with_prefix("TENDER_MARKET")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let market_config: MarketConfig = config.try_deserialize()?;

        Ok(market_config)
    }

    /// Load configuration from an explicit file on top of the defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let defaults = Config::try_from(&MarketConfig::default())?;
        let config = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path.as_ref()))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<MarketConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = MarketConfig::load_env_file();
        MarketConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static MarketConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
