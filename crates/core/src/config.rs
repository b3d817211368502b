use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u16(key: &str, default: u16) -> u16 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env_opt(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub smtp: SmtpConfig,
    pub catalog: CatalogConfig,
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            store: StoreConfig::from_env(),
            smtp: SmtpConfig::from_env(),
            catalog: CatalogConfig::from_env(),
            scheduler: SchedulerConfig::from_env(),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  store:      data_path={}", self.store.data_path.display());
        tracing::info!(
            "  smtp:       host={}, port={}, from={}, tls={}",
            self.smtp.host,
            self.smtp.port,
            self.smtp.from,
            self.smtp.tls
        );
        tracing::info!(
            "  catalog:    sheet={}",
            self.catalog.sheet.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  scheduler:  scan_interval={}s",
            self.scheduler.scan_interval_secs
        );
    }
}

// ── State store ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the persisted directory document.
    pub data_path: PathBuf,
}

impl StoreConfig {
    fn from_env() -> Self {
        Self {
            data_path: PathBuf::from(env_or("CADENCE_DATA_PATH", "data/cadence.json")),
        }
    }
}

// ── SMTP transport ────────────────────────────────────────────

/// SMTP transport settings. Credentials are read from the
/// `SMTP_USERNAME` / `SMTP_PASSWORD` environment variables by the
/// transport itself and never pass through this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// STARTTLS when true; port 465 always uses implicit TLS.
    pub tls: bool,
    /// Sender address (e.g. `"Cadence <updates@example.com>"`).
    pub from: String,
    /// Upper bound on a single send attempt; past it the send is a failure.
    pub timeout_secs: u64,
}

impl SmtpConfig {
    fn from_env() -> Self {
        Self {
            host: env_or("SMTP_HOST", "smtp.gmail.com"),
            port: env_u16("SMTP_PORT", 587),
            tls: env_or("SMTP_TLS", "true") == "true",
            from: env_or("SMTP_FROM", "cadence@localhost"),
            timeout_secs: env_u64("SMTP_TIMEOUT_SECS", 30),
        }
    }
}

// ── Topic catalog ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Published spreadsheet URL or bare spreadsheet id.
    pub sheet: Option<String>,
}

impl CatalogConfig {
    fn from_env() -> Self {
        Self {
            sheet: env_opt("CADENCE_SHEET_URL"),
        }
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between periodic scans.
    pub scan_interval_secs: u64,
}

impl SchedulerConfig {
    fn from_env() -> Self {
        Self {
            scan_interval_secs: env_u64("CADENCE_SCAN_INTERVAL_SECS", 300),
        }
    }
}
