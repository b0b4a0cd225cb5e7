//! Layered server configuration
//!
//! Configuration is resolved in priority order:
//!
//! 1. Environment variables (TASKMARKET_*), after loading `.env` if present
//! 2. The `[profile.<environment>]` table of taskmarket.toml
//! 3. Built-in defaults
//!
//! The active environment comes from `TASKMARKET_ENV`, else the
//! `[default] environment` key of taskmarket.toml, else `development`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use taskmarket_server::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! println!("Environment: {}", config.environment);
//! println!("Listening on: {}", config.bind);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use taskmarket_core::{
    format_naira, EscrowFeeSchedule, Kobo, MarketSettings, PinCost, StaticAccountDirectory,
    WithdrawalFeeSchedule,
};
use thiserror::Error;

pub const CONFIG_FILE: &str = "taskmarket.toml";
const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024;
const MIN_ADMIN_KEY_LEN: usize = 16;
const MAX_AUTO_RELEASE_DAYS: u32 = 3_650;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid environment: {0}. Must be: development, staging, or production")]
    InvalidEnvironment(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Deployment environments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development; secrets may be left unset
    Development,
    /// Pre-production with vendor sandboxes
    Staging,
    /// Live money; every secret is required
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    fn requires_secrets(&self) -> bool {
        !matches!(self, Environment::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the sandbox bank-account directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDirectoryEntry {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
}

/// TOML profile definition from taskmarket.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerProfile {
    pub bind: Option<String>,
    pub youverify_secret: Option<String>,
    pub paystack_secret: Option<String>,
    pub admin_key: Option<String>,
    pub withdrawal_fees: Option<WithdrawalFeeSchedule>,
    pub escrow_fee_bps: Option<u32>,
    pub min_withdrawal: Option<Kobo>,
    pub auto_release_days: Option<u32>,
    pub pin_cost: Option<PinCost>,
    pub log_filter: Option<String>,
    pub log_json: Option<bool>,
    pub max_body_bytes: Option<usize>,
    pub bank_directory: Vec<BankDirectoryEntry>,
}

/// Complete taskmarket.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskmarketToml {
    #[serde(default)]
    pub default: Option<DefaultProfile>,
    #[serde(default)]
    pub profile: HashMap<String, ServerProfile>,
}

/// Default profile section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultProfile {
    pub environment: Option<String>,
}

/// Resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub bind: SocketAddr,
    /// HMAC key for `x-youverify-signature`
    pub youverify_secret: String,
    /// Paystack secret key, also the webhook HMAC key
    pub paystack_secret: String,
    /// Value expected in `x-admin-key`; admin routes are off while empty
    pub admin_key: String,
    pub market: MarketSettings,
    pub auto_release_days: Option<u32>,
    pub log_filter: String,
    pub log_json: bool,
    pub max_body_bytes: usize,
    pub bank_directory: Vec<BankDirectoryEntry>,
}

impl Config {
    /// Load configuration from the process environment and ./taskmarket.toml
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (non-fatal)
        let _ = dotenvy::dotenv();

        let path = Path::new(CONFIG_FILE);
        let toml = if path.exists() {
            Some(Self::read_toml(path)?)
        } else {
            None
        };
        Self::resolve(toml.as_ref(), &|key: &str| std::env::var(key).ok())
    }

    /// Load configuration from an explicit TOML file plus the process
    /// environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let toml = Self::read_toml(path)?;
        Self::resolve(Some(&toml), &|key: &str| std::env::var(key).ok())
    }

    fn read_toml(path: &Path) -> Result<TaskmarketToml, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(ConfigError::TomlError)
    }

    /// Resolve a configuration from parsed TOML and an environment lookup.
    pub fn resolve(
        toml: Option<&TaskmarketToml>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let environment_name = env("TASKMARKET_ENV")
            .or_else(|| {
                toml.and_then(|t| t.default.as_ref())
                    .and_then(|d| d.environment.clone())
            })
            .unwrap_or_else(|| Environment::Development.as_str().to_string());
        let environment = Environment::from_str(&environment_name)?;

        let profile = toml
            .and_then(|t| t.profile.get(environment.as_str()))
            .cloned()
            .unwrap_or_default();

        let bind_raw = env("TASKMARKET_BIND")
            .or(profile.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "bind".to_string(),
                value: bind_raw.clone(),
            })?;

        let escrow_fee_bps = match env("TASKMARKET_ESCROW_FEE_BPS") {
            Some(raw) => parse_env("TASKMARKET_ESCROW_FEE_BPS", &raw)?,
            None => profile
                .escrow_fee_bps
                .unwrap_or(EscrowFeeSchedule::default().fee_bps),
        };
        let min_withdrawal = match env("TASKMARKET_MIN_WITHDRAWAL") {
            Some(raw) => parse_env("TASKMARKET_MIN_WITHDRAWAL", &raw)?,
            None => profile
                .min_withdrawal
                .unwrap_or(MarketSettings::default().min_withdrawal),
        };
        let auto_release_days = match env("TASKMARKET_AUTO_RELEASE_DAYS") {
            Some(raw) => Some(parse_env("TASKMARKET_AUTO_RELEASE_DAYS", &raw)?),
            None => profile.auto_release_days,
        };
        let log_json = match env("TASKMARKET_LOG_JSON") {
            Some(raw) => parse_env("TASKMARKET_LOG_JSON", &raw)?,
            None => profile.log_json.unwrap_or(false),
        };
        let max_body_bytes = match env("TASKMARKET_MAX_BODY_BYTES") {
            Some(raw) => parse_env("TASKMARKET_MAX_BODY_BYTES", &raw)?,
            None => profile.max_body_bytes.unwrap_or(DEFAULT_MAX_BODY_BYTES),
        };

        let config = Config {
            environment,
            bind,
            youverify_secret: env("TASKMARKET_YOUVERIFY_SECRET")
                .or(profile.youverify_secret)
                .unwrap_or_default(),
            paystack_secret: env("TASKMARKET_PAYSTACK_SECRET")
                .or(profile.paystack_secret)
                .unwrap_or_default(),
            admin_key: env("TASKMARKET_ADMIN_KEY")
                .or(profile.admin_key)
                .unwrap_or_default(),
            market: MarketSettings {
                withdrawal_fees: profile.withdrawal_fees.unwrap_or_default(),
                escrow_fees: EscrowFeeSchedule {
                    fee_bps: escrow_fee_bps,
                },
                min_withdrawal,
                pin_cost: profile.pin_cost.unwrap_or_default(),
            },
            auto_release_days,
            log_filter: env("TASKMARKET_LOG")
                .or(profile.log_filter)
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            log_json,
            max_body_bytes,
            bank_directory: profile.bank_directory,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.requires_secrets() {
            for (field, value) in [
                ("youverify_secret", &self.youverify_secret),
                ("paystack_secret", &self.paystack_secret),
                ("admin_key", &self.admin_key),
            ] {
                if value.is_empty() {
                    return Err(ConfigError::MissingField(field.to_string()));
                }
            }
        }
        if !self.admin_key.is_empty() && self.admin_key.len() < MIN_ADMIN_KEY_LEN {
            return Err(ConfigError::ValidationError(format!(
                "admin_key must be at least {MIN_ADMIN_KEY_LEN} characters"
            )));
        }
        if let Some(days) = self.auto_release_days {
            if !(1..=MAX_AUTO_RELEASE_DAYS).contains(&days) {
                return Err(ConfigError::ValidationError(format!(
                    "auto_release_days must be between 1 and {MAX_AUTO_RELEASE_DAYS}, got {days}"
                )));
            }
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_body_bytes must be positive".to_string(),
            ));
        }
        if self.environment == Environment::Production && !self.bank_directory.is_empty() {
            return Err(ConfigError::ValidationError(
                "bank_directory is a sandbox lookup and cannot be used in production".to_string(),
            ));
        }
        self.market
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    pub fn auto_release_after(&self) -> Option<chrono::Duration> {
        self.auto_release_days
            .map(|days| chrono::Duration::days(i64::from(days)))
    }

    pub fn account_directory(&self) -> StaticAccountDirectory {
        let mut directory = StaticAccountDirectory::default();
        for entry in &self.bank_directory {
            directory.insert(&entry.bank_code, &entry.account_number, &entry.account_name);
        }
        directory
    }

    /// Print the resolved configuration
    pub fn print_summary(&self) {
        let fees = &self.market.withdrawal_fees;
        println!("╔════════════════════════════════════════════════════════════════╗");
        println!("║            TASKMARKET CONFIGURATION RESOLVED                   ║");
        println!("╚════════════════════════════════════════════════════════════════╝");
        println!("  Environment:         {}", self.environment);
        println!("  Bind:                {}", self.bind);
        println!("  YouVerify Secret:    {}", redact(&self.youverify_secret));
        println!("  Paystack Secret:     {}", redact(&self.paystack_secret));
        println!("  Admin Key:           {}", redact(&self.admin_key));
        println!(
            "  Withdrawal Fee:      {} bps + {} (min {}, max {})",
            fees.percentage_bps,
            format_naira(fees.flat_fee),
            format_naira(fees.min_fee),
            format_naira(fees.max_fee)
        );
        println!("  Escrow Fee:          {} bps", self.market.escrow_fees.fee_bps);
        println!(
            "  Minimum Withdrawal:  {}",
            format_naira(self.market.min_withdrawal)
        );

        if let Some(days) = self.auto_release_days {
            println!("  Auto-release:        after {} days", days);
        } else {
            println!("  Auto-release:        (disabled)");
        }

        println!("  Log Filter:          {}", self.log_filter);

        if self.log_json {
            println!("  JSON Logs:           ENABLED");
        }
        if !self.bank_directory.is_empty() {
            println!("  Bank Directory:      {} sandbox accounts", self.bank_directory.len());
        }

        println!("╚════════════════════════════════════════════════════════════════╝");
    }

    /// Get configuration as JSON, with secrets redacted
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// Manual Serialize impl so secrets never leave the process
impl Serialize for Config {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(11))?;
        map.serialize_entry("environment", &self.environment.to_string())?;
        map.serialize_entry("bind", &self.bind.to_string())?;
        map.serialize_entry("youverify_secret", redact(&self.youverify_secret))?;
        map.serialize_entry("paystack_secret", redact(&self.paystack_secret))?;
        map.serialize_entry("admin_key", redact(&self.admin_key))?;
        map.serialize_entry("market", &self.market)?;
        map.serialize_entry("auto_release_days", &self.auto_release_days)?;
        map.serialize_entry("log_filter", &self.log_filter)?;
        map.serialize_entry("log_json", &self.log_json)?;
        map.serialize_entry("max_body_bytes", &self.max_body_bytes)?;
        map.serialize_entry("bank_directory_entries", &self.bank_directory.len())?;
        map.end()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "(not configured)"
    } else {
        "(set)"
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[default]
environment = "staging"

[profile.development]
bind = "127.0.0.1:3000"

[profile.staging]
bind = "0.0.0.0:8080"
youverify_secret = "yv_staging"
paystack_secret = "sk_test_staging"
admin_key = "staging-admin-key-0001"
escrow_fee_bps = 300
auto_release_days = 14

[profile.staging.withdrawal_fees]
percentage_bps = 100
flat_fee = 5000
min_fee = 5000
max_fee = 100000

[[profile.staging.bank_directory]]
bank_code = "058"
account_number = "0123456789"
account_name = "Ada Obi"
"#;

    fn parsed() -> TaskmarketToml {
        toml::from_str(SAMPLE).unwrap()
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_environment_from_str() {
        assert_eq!(
            Environment::from_str("production").unwrap(),
            Environment::Production
        );
        assert_eq!(Environment::from_str("DEV").unwrap(), Environment::Development);
        assert!(Environment::from_str("qa").is_err());
    }

    #[test]
    fn test_defaults_without_file() {
        let config = Config::resolve(None, &env_from(&[])).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
        assert_eq!(config.market, MarketSettings::default());
        assert!(config.auto_release_after().is_none());
        assert!(config.youverify_secret.is_empty());
    }

    #[test]
    fn test_profile_selected_from_default_section() {
        let toml = parsed();
        let config = Config::resolve(Some(&toml), &env_from(&[])).unwrap();
        assert_eq!(config.environment, Environment::Staging);
        assert_eq!(config.bind.to_string(), "0.0.0.0:8080");
        assert_eq!(config.market.escrow_fees.fee_bps, 300);
        assert_eq!(config.market.withdrawal_fees.percentage_bps, 100);
        assert_eq!(config.auto_release_after(), Some(chrono::Duration::days(14)));
        assert_eq!(config.account_directory().len(), 1);
    }

    #[test]
    fn test_env_overrides_profile() {
        let toml = parsed();
        let env = env_from(&[
            ("TASKMARKET_ENV", "development"),
            ("TASKMARKET_BIND", "127.0.0.1:9999"),
            ("TASKMARKET_ESCROW_FEE_BPS", "200"),
        ]);
        let config = Config::resolve(Some(&toml), &env).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind.to_string(), "127.0.0.1:9999");
        assert_eq!(config.market.escrow_fees.fee_bps, 200);
    }

    #[test]
    fn test_production_requires_secrets() {
        let env = env_from(&[("TASKMARKET_ENV", "production")]);
        let err = Config::resolve(None, &env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let err = Config::resolve(None, &env_from(&[("TASKMARKET_BIND", "nowhere")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = Config::resolve(None, &env_from(&[("TASKMARKET_AUTO_RELEASE_DAYS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err =
            Config::resolve(None, &env_from(&[("TASKMARKET_ADMIN_KEY", "short")])).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));

        let err = Config::resolve(None, &env_from(&[("TASKMARKET_ESCROW_FEE_BPS", "20000")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_auto_release_days_are_bounded() {
        for days in ["0", "3651", "100000000"] {
            let err = Config::resolve(None, &env_from(&[("TASKMARKET_AUTO_RELEASE_DAYS", days)]))
                .unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError(_)), "{days}");
        }
        let config =
            Config::resolve(None, &env_from(&[("TASKMARKET_AUTO_RELEASE_DAYS", "3650")])).unwrap();
        assert_eq!(config.auto_release_after(), Some(chrono::Duration::days(3_650)));
    }

    #[test]
    fn test_json_redacts_secrets() {
        let toml = parsed();
        let config = Config::resolve(Some(&toml), &env_from(&[])).unwrap();
        let json = config.to_json().unwrap();
        assert!(!json.contains("yv_staging"));
        assert!(!json.contains("staging-admin-key-0001"));
        assert!(json.contains("\"environment\": \"staging\""));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let toml = Config::read_toml(file.path()).unwrap();
        assert!(toml.profile.contains_key("development"));
        assert!(toml.profile.contains_key("staging"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[profile.staging\nbind = ").unwrap();
        assert!(matches!(
            Config::read_toml(file.path()),
            Err(ConfigError::TomlError(_))
        ));
    }
}
