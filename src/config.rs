use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::alert::MissingDataPolicy;
use crate::error::ConfigError;
use crate::model::{SourceId, Watchlist};

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_health_port() -> u16 {
    3000
}

fn default_tick_period_secs() -> u64 {
    600
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_notional() -> f64 {
    1000.0
}

fn default_base_url() -> String {
    "https://criptoya.com/api".into()
}

fn default_asset() -> String {
    "USDT".into()
}

fn default_fiat() -> String {
    "PEN".into()
}

fn default_volume() -> f64 {
    1.0
}

fn default_notifier_kind() -> String {
    "terminal".into()
}

fn default_true() -> bool {
    true
}

fn default_token_env() -> String {
    "BOT_TOKEN".into()
}

fn default_chat_id_env() -> String {
    "CHAT_ID".into()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".into()
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub quotes: QuotesConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Overridden by the `PORT` environment variable when set.
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            health_port: default_health_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_tick_period_secs")]
    pub tick_period_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    pub threshold: f64,
    /// Amount used to express profit in alert text.
    #[serde(default = "default_notional")]
    pub notional: f64,
    pub targets: Vec<SourceId>,
    #[serde(default)]
    pub missing_data_policy: MissingDataPolicy,
}

impl MonitorConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.tick_period_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct QuotesConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_asset")]
    pub asset: String,
    #[serde(default = "default_fiat")]
    pub fiat: String,
    #[serde(default = "default_volume")]
    pub volume: f64,
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            asset: default_asset(),
            fiat: default_fiat(),
            volume: default_volume(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    pub id: SourceId,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotifierConfig {
    /// Accepted values: `"terminal"` | `"telegram"`
    #[serde(default = "default_notifier_kind")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub startup_message: bool,
    pub heartbeat_minutes: Option<u64>,
    pub telegram: Option<TelegramConfig>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: default_notifier_kind(),
            startup_message: true,
            heartbeat_minutes: None,
            telegram: None,
        }
    }
}

impl NotifierConfig {
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_minutes
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_chat_id_env")]
    pub chat_id_env: String,
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
}

impl AppConfig {
    /// Targets in config order, comparatives being every other source in
    /// config order.
    pub fn watchlist(&self) -> Watchlist {
        let targets = self.monitor.targets.clone();
        let comparatives = self
            .sources
            .iter()
            .map(|s| s.id.clone())
            .filter(|id| !targets.contains(id))
            .collect();

        Watchlist {
            targets,
            comparatives,
            threshold: self.monitor.threshold,
        }
    }

    pub fn display_names(&self) -> HashMap<SourceId, String> {
        self.sources
            .iter()
            .map(|s| {
                let name = s.name.clone().unwrap_or_else(|| s.id.to_string());
                (s.id.clone(), name)
            })
            .collect()
    }
}

impl GeneralConfig {
    /// Port for the health endpoint; `PORT` from the environment wins over
    /// the configured value.
    pub fn health_port(&self) -> Result<u16, Report<ConfigError>> {
        resolve_port(self.health_port, std::env::var("PORT").ok())
    }
}

fn resolve_port(configured: u16, env: Option<String>) -> Result<u16, Report<ConfigError>> {
    match env {
        Some(raw) => raw
            .trim()
            .parse::<u16>()
            .change_context(ConfigError::Validation {
                field: format!("PORT \"{raw}\" is not a valid port"),
            }),
        None => Ok(configured),
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

/// Read a required environment variable named by the config.
pub fn require_env(name: &str) -> Result<String, Report<ConfigError>> {
    std::env::var(name).change_context(ConfigError::MissingEnv { name: name.into() })
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];
const VALID_NOTIFIER_KINDS: &[&str] = &["terminal", "telegram"];
/// One day; also keeps `Instant + period` far from overflow.
const MAX_PERIOD_SECS: u64 = 86_400;
/// One week.
const MAX_HEARTBEAT_MINUTES: u64 = 10_080;

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_monitor(config)?;
    validate_quotes(config)?;
    validate_sources(config)?;
    validate_targets(config)?;
    validate_notifier(config)?;
    Ok(())
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if !VALID_LOG_FORMATS.contains(&config.general.log_format.as_str()) {
        return Err(invalid(format!(
            "general.log_format \"{}\" is not valid",
            config.general.log_format
        )));
    }
    Ok(())
}

fn validate_monitor(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let monitor = &config.monitor;
    if !(1..=MAX_PERIOD_SECS).contains(&monitor.tick_period_secs) {
        return Err(invalid(format!(
            "monitor.tick_period_secs must be between 1 and {MAX_PERIOD_SECS}"
        )));
    }
    if !(1..=MAX_PERIOD_SECS).contains(&monitor.fetch_timeout_secs) {
        return Err(invalid(format!(
            "monitor.fetch_timeout_secs must be between 1 and {MAX_PERIOD_SECS}"
        )));
    }
    if !monitor.threshold.is_finite() {
        return Err(invalid("monitor.threshold must be finite".into()));
    }
    if !(monitor.notional.is_finite() && monitor.notional > 0.0) {
        return Err(invalid("monitor.notional must be positive".into()));
    }
    Ok(())
}

fn validate_quotes(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let volume = config.quotes.volume;
    if !(volume.is_finite() && volume > 0.0) {
        return Err(invalid("quotes.volume must be positive".into()));
    }
    Ok(())
}

fn validate_sources(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    if config.sources.is_empty() {
        return Err(invalid("sources: at least one source is required".into()));
    }

    let mut seen = HashSet::new();
    for source in &config.sources {
        if source.id.as_str().is_empty() {
            return Err(invalid("sources: empty id".into()));
        }
        if !seen.insert(&source.id) {
            return Err(invalid(format!("sources: duplicate id \"{}\"", source.id)));
        }
    }
    Ok(())
}

fn validate_targets(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let ids: HashSet<&SourceId> = config.sources.iter().map(|s| &s.id).collect();

    if config.monitor.targets.is_empty() {
        return Err(invalid("monitor.targets: at least one target is required".into()));
    }

    let mut seen = HashSet::new();
    for target in &config.monitor.targets {
        if !ids.contains(target) {
            return Err(invalid(format!(
                "monitor.targets: \"{target}\" does not match any source id"
            )));
        }
        if !seen.insert(target) {
            return Err(invalid(format!("monitor.targets: duplicate target \"{target}\"")));
        }
    }

    if config.watchlist().comparatives.is_empty() {
        return Err(invalid(
            "sources: at least one source must not be a target".into(),
        ));
    }
    Ok(())
}

fn validate_notifier(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let notifier = &config.notifier;
    if !VALID_NOTIFIER_KINDS.contains(&notifier.kind.as_str()) {
        return Err(invalid(format!(
            "notifier.kind \"{}\" is not valid",
            notifier.kind
        )));
    }
    if notifier.kind == "telegram" && notifier.telegram.is_none() {
        return Err(invalid(
            "notifier.telegram is required when notifier.kind = \"telegram\"".into(),
        ));
    }
    if notifier
        .heartbeat_minutes
        .is_some_and(|m| !(1..=MAX_HEARTBEAT_MINUTES).contains(&m))
    {
        return Err(invalid(format!(
            "notifier.heartbeat_minutes must be between 1 and {MAX_HEARTBEAT_MINUTES}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    const MINIMAL: &str = r#"
[monitor]
threshold = 0.0
targets = ["binancep2p"]

[[sources]]
id = "binancep2p"

[[sources]]
id = "buenbit"
"#;

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"
health_port = 8080

[monitor]
tick_period_secs = 60
fetch_timeout_secs = 5
threshold = -0.04
notional = 500.0
targets = ["binancep2p", "bybitp2p"]
missing_data_policy = "retract"

[quotes]
base_url = "https://criptoya.com/api"
asset = "USDT"
fiat = "ARS"
volume = 0.1

[[sources]]
id = "buenbit"
name = "Buenbit"

[[sources]]
id = "binancep2p"
name = "Binance P2P"

[[sources]]
id = "bybitp2p"
name = "Bybit P2P"

[notifier]
kind = "telegram"
startup_message = false
heartbeat_minutes = 11

[notifier.telegram]
token_env = "MY_TOKEN"
chat_id_env = "MY_CHAT"
"#;
        let config = parse(toml);
        validate(&config).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.health_port, 8080);
        assert_eq!(config.monitor.tick_period(), Duration::from_secs(60));
        assert_eq!(config.monitor.missing_data_policy, MissingDataPolicy::Retract);
        assert_eq!(config.quotes.fiat, "ARS");
        assert_eq!(
            config.notifier.heartbeat_interval(),
            Some(Duration::from_secs(660))
        );
        let telegram = config.notifier.telegram.as_ref().unwrap();
        assert_eq!(telegram.token_env, "MY_TOKEN");
        assert_eq!(telegram.api_url, "https://api.telegram.org");
    }

    #[test]
    fn defaults_applied_when_fields_omitted() {
        let config = parse(MINIMAL);
        validate(&config).unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.general.health_port, 3000);
        assert_eq!(config.monitor.tick_period_secs, 600);
        assert_eq!(config.monitor.fetch_timeout_secs, 10);
        assert_eq!(config.monitor.notional, 1000.0);
        assert_eq!(config.monitor.missing_data_policy, MissingDataPolicy::Hold);
        assert_eq!(config.quotes.base_url, "https://criptoya.com/api");
        assert_eq!(config.notifier.kind, "terminal");
        assert!(config.notifier.startup_message);
        assert_eq!(config.notifier.heartbeat_interval(), None);
    }

    #[test]
    fn watchlist_splits_targets_and_comparatives() {
        let toml = r#"
[monitor]
threshold = 0.01
targets = ["bybitp2p", "binancep2p"]

[[sources]]
id = "buenbit"

[[sources]]
id = "binancep2p"

[[sources]]
id = "buda"

[[sources]]
id = "bybitp2p"
"#;
        let watchlist = parse(toml).watchlist();
        assert_eq!(
            watchlist.targets,
            vec![SourceId::from("bybitp2p"), SourceId::from("binancep2p")]
        );
        assert_eq!(
            watchlist.comparatives,
            vec![SourceId::from("buenbit"), SourceId::from("buda")]
        );
        assert_eq!(watchlist.threshold, 0.01);
    }

    #[test]
    fn display_names_default_to_id() {
        let toml = r#"
[monitor]
threshold = 0.0
targets = ["binancep2p"]

[[sources]]
id = "binancep2p"
name = "Binance P2P"

[[sources]]
id = "buda"
"#;
        let names = parse(toml).display_names();
        assert_eq!(names[&SourceId::from("binancep2p")], "Binance P2P");
        assert_eq!(names[&SourceId::from("buda")], "buda");
    }

    #[test]
    fn unknown_target_rejected() {
        let toml = r#"
[monitor]
threshold = 0.0
targets = ["kraken"]

[[sources]]
id = "buenbit"
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn all_sources_as_targets_rejected() {
        let toml = r#"
[monitor]
threshold = 0.0
targets = ["binancep2p"]

[[sources]]
id = "binancep2p"
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn duplicate_source_ids_rejected() {
        let toml = r#"
[monitor]
threshold = 0.0
targets = ["binancep2p"]

[[sources]]
id = "binancep2p"

[[sources]]
id = "buda"

[[sources]]
id = "buda"
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn zero_tick_period_rejected() {
        let mut config = parse(MINIMAL);
        config.monitor.tick_period_secs = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn huge_tick_period_rejected() {
        let mut config = parse(MINIMAL);
        config.monitor.tick_period_secs = u64::MAX;
        assert!(validate(&config).is_err());

        config.monitor.tick_period_secs = MAX_PERIOD_SECS;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn huge_fetch_timeout_rejected() {
        let mut config = parse(MINIMAL);
        config.monitor.fetch_timeout_secs = MAX_PERIOD_SECS + 1;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn huge_heartbeat_rejected() {
        let mut config = parse(MINIMAL);
        config.notifier.heartbeat_minutes = Some(u64::MAX);
        assert!(validate(&config).is_err());
        assert_eq!(config.notifier.heartbeat_interval(), None);

        config.notifier.heartbeat_minutes = Some(0);
        assert!(validate(&config).is_err());

        config.notifier.heartbeat_minutes = Some(MAX_HEARTBEAT_MINUTES);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn non_positive_or_nan_volume_rejected() {
        for volume in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = parse(MINIMAL);
            config.quotes.volume = volume;
            assert!(validate(&config).is_err(), "volume {volume} accepted");
        }
    }

    #[test]
    fn telegram_kind_requires_section() {
        let mut config = parse(MINIMAL);
        config.notifier.kind = "telegram".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_missing_data_policy_fails_to_parse() {
        let toml = MINIMAL.replace("threshold = 0.0", "threshold = 0.0\nmissing_data_policy = \"panic\"");
        assert!(toml::from_str::<AppConfig>(&toml).is_err());
    }

    #[test]
    fn port_env_overrides_configured_port() {
        assert_eq!(resolve_port(3000, None).unwrap(), 3000);
        assert_eq!(resolve_port(3000, Some("10000".into())).unwrap(), 10000);
        assert!(resolve_port(3000, Some("http".into())).is_err());
    }

    #[test]
    fn missing_env_is_reported() {
        let err = require_env("SPREAD_NOTIFIER_TEST_UNSET_VARIABLE").unwrap_err();
        assert!(matches!(
            err.current_context(),
            ConfigError::MissingEnv { .. }
        ));
    }
}
