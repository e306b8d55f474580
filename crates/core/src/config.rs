use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::locale::Locale;
use crate::policy::BroadcastPolicy;

pub const DEFAULT_API_BASE_URL: &str = "https://webexapis.com/v1";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub platform: PlatformConfig,
    pub policy: BroadcastPolicy,
    pub server: ServerConfig,
    pub locale: Locale,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct PlatformConfig {
    pub access_token: SecretString,
    pub api_base_url: String,
    /// Skips the `people/me` lookup for the agent id when set.
    pub agent_id: Option<String>,
    pub request_timeout_secs: u64,
    pub delivery_timeout_secs: u64,
    pub max_attachment_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Externally reachable base URL; webhooks are registered against it at startup.
    pub public_url: Option<String>,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub access_token: Option<String>,
    pub api_base_url: Option<String>,
    pub agent_id: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub public_url: Option<String>,
    pub locale: Option<Locale>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            platform: PlatformConfig {
                access_token: String::new().into(),
                api_base_url: DEFAULT_API_BASE_URL.to_string(),
                agent_id: None,
                request_timeout_secs: 30,
                delivery_timeout_secs: 20,
                max_attachment_retries: 10,
            },
            policy: BroadcastPolicy::default(),
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 5050,
                public_url: None,
                graceful_shutdown_secs: 15,
            },
            locale: Locale::EnUs,
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let explicit = options
            .config_path
            .clone()
            .or_else(|| read_env("RELAY_CONFIG_FILE").map(PathBuf::from));
        let maybe_path = resolve_config_path(explicit.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = explicit.unwrap_or_else(|| PathBuf::from("relay.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Path of the config file `load` would read, if any.
    pub fn detect_path(explicit: Option<&Path>) -> Option<PathBuf> {
        let explicit = explicit
            .map(Path::to_path_buf)
            .or_else(|| read_env("RELAY_CONFIG_FILE").map(PathBuf::from));
        resolve_config_path(explicit.as_deref())
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(platform) = patch.platform {
            if let Some(access_token_value) = platform.access_token {
                self.platform.access_token = secret_value(access_token_value);
            }
            if let Some(api_base_url) = platform.api_base_url {
                self.platform.api_base_url = api_base_url;
            }
            if let Some(agent_id) = platform.agent_id {
                self.platform.agent_id = Some(agent_id);
            }
            if let Some(request_timeout_secs) = platform.request_timeout_secs {
                self.platform.request_timeout_secs = request_timeout_secs;
            }
            if let Some(delivery_timeout_secs) = platform.delivery_timeout_secs {
                self.platform.delivery_timeout_secs = delivery_timeout_secs;
            }
            if let Some(max_attachment_retries) = platform.max_attachment_retries {
                self.platform.max_attachment_retries = max_attachment_retries;
            }
        }

        if let Some(source) = patch.source {
            if let Some(restrict_to_own_org) = source.restrict_to_own_org {
                self.policy.source.restrict_to_own_org = restrict_to_own_org;
            }
            if let Some(restrict_to_sender_list) = source.restrict_to_sender_list {
                self.policy.source.restrict_to_sender_list = restrict_to_sender_list;
            }
            if let Some(sender_list) = source.sender_list {
                self.policy.source.sender_list = normalize_sender_list(sender_list);
            }
        }

        if let Some(destination) = patch.destination {
            if let Some(restrict_to_own_org) = destination.restrict_to_own_org {
                self.policy.destination.restrict_to_own_org = restrict_to_own_org;
            }
            if let Some(restrict_to_sender_org) = destination.restrict_to_sender_org {
                self.policy.destination.restrict_to_sender_org = restrict_to_sender_org;
            }
        }

        if let Some(membership) = patch.membership {
            if let Some(restrict_to_own_org) = membership.restrict_to_own_org {
                self.policy.membership.restrict_to_own_org = restrict_to_own_org;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(public_url) = server.public_url {
                self.server.public_url = Some(public_url);
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(locale) = patch.locale {
            self.locale = locale;
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let access_token = read_env("RELAY_PLATFORM_ACCESS_TOKEN")
            .or_else(|| read_env("WEBEX_TEAMS_ACCESS_TOKEN"));
        if let Some(value) = access_token {
            self.platform.access_token = secret_value(value);
        }
        if let Some(value) = read_env("RELAY_PLATFORM_API_BASE_URL") {
            self.platform.api_base_url = value;
        }
        if let Some(value) = read_env("RELAY_PLATFORM_AGENT_ID").or_else(|| read_env("BOT_ID")) {
            self.platform.agent_id = Some(value);
        }
        if let Some(value) = read_env("RELAY_PLATFORM_REQUEST_TIMEOUT_SECS") {
            self.platform.request_timeout_secs =
                parse_u64("RELAY_PLATFORM_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("RELAY_PLATFORM_DELIVERY_TIMEOUT_SECS") {
            self.platform.delivery_timeout_secs =
                parse_u64("RELAY_PLATFORM_DELIVERY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("RELAY_PLATFORM_MAX_ATTACHMENT_RETRIES") {
            self.platform.max_attachment_retries =
                parse_u32("RELAY_PLATFORM_MAX_ATTACHMENT_RETRIES", &value)?;
        }

        if let Some(value) = read_env("RELAY_SOURCE_RESTRICT_TO_OWN_ORG") {
            self.policy.source.restrict_to_own_org =
                parse_bool("RELAY_SOURCE_RESTRICT_TO_OWN_ORG", &value)?;
        }
        if let Some(value) = read_env("RELAY_SOURCE_RESTRICT_TO_SENDER_LIST") {
            self.policy.source.restrict_to_sender_list =
                parse_bool("RELAY_SOURCE_RESTRICT_TO_SENDER_LIST", &value)?;
        }
        if let Some(value) = read_env("RELAY_SOURCE_SENDER_LIST") {
            self.policy.source.sender_list =
                normalize_sender_list(value.split(',').map(str::to_owned).collect());
        }
        if let Some(value) = read_env("RELAY_DESTINATION_RESTRICT_TO_OWN_ORG") {
            self.policy.destination.restrict_to_own_org =
                parse_bool("RELAY_DESTINATION_RESTRICT_TO_OWN_ORG", &value)?;
        }
        if let Some(value) = read_env("RELAY_DESTINATION_RESTRICT_TO_SENDER_ORG") {
            self.policy.destination.restrict_to_sender_org =
                parse_bool("RELAY_DESTINATION_RESTRICT_TO_SENDER_ORG", &value)?;
        }
        if let Some(value) = read_env("RELAY_MEMBERSHIP_RESTRICT_TO_OWN_ORG") {
            self.policy.membership.restrict_to_own_org =
                parse_bool("RELAY_MEMBERSHIP_RESTRICT_TO_OWN_ORG", &value)?;
        }

        if let Some(value) = read_env("RELAY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("RELAY_SERVER_PORT") {
            self.server.port = parse_u16("RELAY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("RELAY_SERVER_PUBLIC_URL") {
            self.server.public_url = Some(value);
        }
        if let Some(value) = read_env("RELAY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("RELAY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("RELAY_LOCALE").or_else(|| read_env("LOCALE")) {
            self.locale = value.parse().map_err(ConfigError::Validation)?;
        }

        let log_level = read_env("RELAY_LOGGING_LEVEL").or_else(|| read_env("RELAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("RELAY_LOGGING_FORMAT").or_else(|| read_env("RELAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(access_token) = overrides.access_token {
            self.platform.access_token = secret_value(access_token);
        }
        if let Some(api_base_url) = overrides.api_base_url {
            self.platform.api_base_url = api_base_url;
        }
        if let Some(agent_id) = overrides.agent_id {
            self.platform.agent_id = Some(agent_id);
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(public_url) = overrides.public_url {
            self.server.public_url = Some(public_url);
        }
        if let Some(locale) = overrides.locale {
            self.locale = locale;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_platform(&self.platform)?;
        validate_policy(&self.policy)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("relay.toml"), PathBuf::from("config/relay.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn normalize_sender_list(entries: Vec<String>) -> BTreeSet<String> {
    entries
        .into_iter()
        .map(|entry| entry.trim().to_owned())
        .filter(|entry| !entry.is_empty())
        .collect()
}

fn validate_platform(platform: &PlatformConfig) -> Result<(), ConfigError> {
    if platform.access_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "platform.access_token is required. Create a bot at https://developer.webex.com/my-apps and copy its access token".to_string(),
        ));
    }

    let base_url = platform.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "platform.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if platform.request_timeout_secs == 0 || platform.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "platform.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if platform.delivery_timeout_secs == 0 || platform.delivery_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "platform.delivery_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_policy(policy: &BroadcastPolicy) -> Result<(), ConfigError> {
    if policy.source.restrict_to_sender_list && policy.source.sender_list.is_empty() {
        return Err(ConfigError::Validation(
            "source.restrict_to_sender_list is true but source.sender_list is empty; nobody could broadcast".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if let Some(public_url) = &server.public_url {
        if !public_url.starts_with("http://") && !public_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "server.public_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    platform: Option<PlatformPatch>,
    source: Option<SourcePatch>,
    destination: Option<DestinationPatch>,
    membership: Option<MembershipPatch>,
    server: Option<ServerPatch>,
    locale: Option<Locale>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct PlatformPatch {
    access_token: Option<String>,
    api_base_url: Option<String>,
    agent_id: Option<String>,
    request_timeout_secs: Option<u64>,
    delivery_timeout_secs: Option<u64>,
    max_attachment_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SourcePatch {
    #[serde(alias = "bots_own_org")]
    restrict_to_own_org: Option<bool>,
    #[serde(alias = "from_sender_list")]
    restrict_to_sender_list: Option<bool>,
    sender_list: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct DestinationPatch {
    #[serde(alias = "bots_own_org")]
    restrict_to_own_org: Option<bool>,
    #[serde(alias = "senders_own_org")]
    restrict_to_sender_org: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct MembershipPatch {
    #[serde(alias = "bots_own_org")]
    restrict_to_own_org: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    public_url: Option<String>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::locale::Locale;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_mirror_shipped_policy() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RELAY_PLATFORM_ACCESS_TOKEN", "token-defaults");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.policy.source.restrict_to_own_org, "source restricts to own org")?;
            ensure(!config.policy.source.restrict_to_sender_list, "sender list is off")?;
            ensure(!config.policy.destination.restrict_to_own_org, "destination own org is off")?;
            ensure(config.policy.destination.restrict_to_sender_org, "sender org is on")?;
            ensure(!config.policy.membership.restrict_to_own_org, "membership is unrestricted")?;
            ensure(config.server.port == 5050, "default port is 5050")?;
            ensure(config.locale == Locale::EnUs, "default locale is en_US")?;
            Ok(())
        })();

        clear_vars(&["RELAY_PLATFORM_ACCESS_TOKEN"]);
        result
    }

    #[test]
    fn file_accepts_legacy_keys_and_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_RELAY_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("relay.toml");
            fs::write(
                &path,
                r#"
locale = "cs_CZ"

[platform]
access_token = "${TEST_RELAY_TOKEN}"

[source]
bots_own_org = false
from_sender_list = true
sender_list = ["ada@example.com", "  ", "P-2"]

[destination]
bots_own_org = true
senders_own_org = false

[membership]
restrict_to_own_org = true
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.platform.access_token.expose_secret() == "token-from-env",
                "token should be interpolated from environment",
            )?;
            ensure(!config.policy.source.restrict_to_own_org, "legacy bots_own_org applies")?;
            ensure(
                config.policy.source.restrict_to_sender_list,
                "legacy from_sender_list applies",
            )?;
            ensure(config.policy.source.sender_list.len() == 2, "blank entries are dropped")?;
            ensure(config.policy.destination.restrict_to_own_org, "destination own org applies")?;
            ensure(!config.policy.destination.restrict_to_sender_org, "senders_own_org applies")?;
            ensure(config.policy.membership.restrict_to_own_org, "membership restriction applies")?;
            ensure(config.locale == Locale::CsCz, "locale is read from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_RELAY_TOKEN"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RELAY_PLATFORM_ACCESS_TOKEN", "token-from-env");
        env::set_var("RELAY_SERVER_PORT", "6060");
        env::set_var("RELAY_DESTINATION_RESTRICT_TO_OWN_ORG", "TRUE");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("relay.toml");
            fs::write(
                &path,
                r#"
[platform]
access_token = "token-from-file"

[server]
port = 7070
public_url = "https://relay.example.com"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.platform.access_token.expose_secret() == "token-from-env",
                "env token should win over file",
            )?;
            ensure(config.server.port == 6060, "env port should win over file")?;
            ensure(
                config.server.public_url.as_deref() == Some("https://relay.example.com"),
                "file public url should apply",
            )?;
            ensure(config.policy.destination.restrict_to_own_org, "env policy flag applies")?;
            ensure(config.logging.level == "debug", "override log level should win")?;
            Ok(())
        })();

        clear_vars(&[
            "RELAY_PLATFORM_ACCESS_TOKEN",
            "RELAY_SERVER_PORT",
            "RELAY_DESTINATION_RESTRICT_TO_OWN_ORG",
        ]);
        result
    }

    #[test]
    fn missing_token_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        clear_vars(&["RELAY_PLATFORM_ACCESS_TOKEN", "WEBEX_TEAMS_ACCESS_TOKEN"]);
        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => {
                return Err("expected validation failure but config load succeeded".to_string());
            }
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("platform.access_token")
        );
        ensure(has_message, "validation failure should mention platform.access_token")
    }

    #[test]
    fn empty_sender_list_with_restriction_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RELAY_PLATFORM_ACCESS_TOKEN", "token");
        env::set_var("RELAY_SOURCE_RESTRICT_TO_SENDER_LIST", "true");

        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected sender list validation failure".to_string()),
            Err(ConfigError::Validation(message)) if message.contains("source.sender_list") => {
                Ok(())
            }
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["RELAY_PLATFORM_ACCESS_TOKEN", "RELAY_SOURCE_RESTRICT_TO_SENDER_LIST"]);
        result
    }

    #[test]
    fn invalid_boolean_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RELAY_PLATFORM_ACCESS_TOKEN", "token");
        env::set_var("RELAY_MEMBERSHIP_RESTRICT_TO_OWN_ORG", "maybe");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. })
                if key == "RELAY_MEMBERSHIP_RESTRICT_TO_OWN_ORG" =>
            {
                Ok(())
            }
            Ok(_) => Err("expected invalid override error".to_string()),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["RELAY_PLATFORM_ACCESS_TOKEN", "RELAY_MEMBERSHIP_RESTRICT_TO_OWN_ORG"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RELAY_PLATFORM_ACCESS_TOKEN", "super-secret-token-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("super-secret-token-value"), "debug output leaks the token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["RELAY_PLATFORM_ACCESS_TOKEN"]);
        result
    }
}
