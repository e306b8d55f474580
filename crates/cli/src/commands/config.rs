use std::env;
use std::fs;
use std::path::Path;

use relay_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

/// One reported setting: dotted file path, rendered value, env keys in lookup order,
/// and alternative file keys accepted for it.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
    file_aliases: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys, file_aliases: &[] }
    }

    fn aliased(mut self, file_aliases: &'static [&'static str]) -> Self {
        self.file_aliases = file_aliases;
        self
    }
}

pub fn run(config_path: Option<&Path>) -> String {
    let options =
        LoadOptions { config_path: config_path.map(Path::to_path_buf), ..LoadOptions::default() };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = AppConfig::detect_path(config_path);
    let file_doc = file_path.as_deref().and_then(load_config_file_doc);
    let file_label = file_path
        .as_deref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "config file".to_string());

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(&field, file_doc.as_ref(), &file_label);
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let platform = &config.platform;
    let policy = &config.policy;
    let sender_list = if policy.source.sender_list.is_empty() {
        "<empty>".to_string()
    } else {
        policy.source.sender_list.iter().cloned().collect::<Vec<_>>().join(",")
    };

    vec![
        Field::new(
            "platform.access_token",
            redact_token(platform.access_token.expose_secret()),
            &["RELAY_PLATFORM_ACCESS_TOKEN", "WEBEX_TEAMS_ACCESS_TOKEN"],
        ),
        Field::new(
            "platform.api_base_url",
            platform.api_base_url.as_str(),
            &["RELAY_PLATFORM_API_BASE_URL"],
        ),
        Field::new(
            "platform.agent_id",
            platform.agent_id.as_deref().unwrap_or("<unset>"),
            &["RELAY_PLATFORM_AGENT_ID", "BOT_ID"],
        ),
        Field::new(
            "platform.request_timeout_secs",
            platform.request_timeout_secs.to_string(),
            &["RELAY_PLATFORM_REQUEST_TIMEOUT_SECS"],
        ),
        Field::new(
            "platform.delivery_timeout_secs",
            platform.delivery_timeout_secs.to_string(),
            &["RELAY_PLATFORM_DELIVERY_TIMEOUT_SECS"],
        ),
        Field::new(
            "platform.max_attachment_retries",
            platform.max_attachment_retries.to_string(),
            &["RELAY_PLATFORM_MAX_ATTACHMENT_RETRIES"],
        ),
        Field::new(
            "source.restrict_to_own_org",
            policy.source.restrict_to_own_org.to_string(),
            &["RELAY_SOURCE_RESTRICT_TO_OWN_ORG"],
        )
        .aliased(&["source.bots_own_org"]),
        Field::new(
            "source.restrict_to_sender_list",
            policy.source.restrict_to_sender_list.to_string(),
            &["RELAY_SOURCE_RESTRICT_TO_SENDER_LIST"],
        )
        .aliased(&["source.from_sender_list"]),
        Field::new("source.sender_list", sender_list, &["RELAY_SOURCE_SENDER_LIST"]),
        Field::new(
            "destination.restrict_to_own_org",
            policy.destination.restrict_to_own_org.to_string(),
            &["RELAY_DESTINATION_RESTRICT_TO_OWN_ORG"],
        )
        .aliased(&["destination.bots_own_org"]),
        Field::new(
            "destination.restrict_to_sender_org",
            policy.destination.restrict_to_sender_org.to_string(),
            &["RELAY_DESTINATION_RESTRICT_TO_SENDER_ORG"],
        )
        .aliased(&["destination.senders_own_org"]),
        Field::new(
            "membership.restrict_to_own_org",
            policy.membership.restrict_to_own_org.to_string(),
            &["RELAY_MEMBERSHIP_RESTRICT_TO_OWN_ORG"],
        )
        .aliased(&["membership.bots_own_org"]),
        Field::new(
            "server.bind_address",
            config.server.bind_address.as_str(),
            &["RELAY_SERVER_BIND_ADDRESS"],
        ),
        Field::new("server.port", config.server.port.to_string(), &["RELAY_SERVER_PORT"]),
        Field::new(
            "server.public_url",
            config.server.public_url.as_deref().unwrap_or("<unset>"),
            &["RELAY_SERVER_PUBLIC_URL"],
        ),
        Field::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["RELAY_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Field::new("locale", config.locale.code(), &["RELAY_LOCALE", "LOCALE"]),
        Field::new(
            "logging.level",
            config.logging.level.as_str(),
            &["RELAY_LOGGING_LEVEL", "RELAY_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["RELAY_LOGGING_FORMAT", "RELAY_LOG_FORMAT"],
        ),
    ]
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(field: &Field, file_doc: Option<&Value>, file_label: &str) -> String {
    if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = file_doc {
        let in_file = std::iter::once(&field.key)
            .chain(field.file_aliases.iter())
            .any(|key_path| contains_path(doc, key_path));
        if in_file {
            return format!("file ({file_label})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the first four characters so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if trimmed.chars().count() <= 8 {
        return "<redacted>".to_string();
    }

    let prefix: String = trimmed.chars().take(4).collect();
    format!("{prefix}***")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn token_redaction_never_reveals_short_tokens() {
        assert_eq!(redact_token(""), "<empty>");
        assert_eq!(redact_token("short"), "<redacted>");
        assert_eq!(redact_token("NjQ5ZDk2YTgtZmFrZS10b2tlbg"), "NjQ5***");
    }

    #[test]
    fn dotted_paths_are_resolved_through_tables() {
        let doc: Value = "locale = \"cs_CZ\"\n[source]\nbots_own_org = true\n"
            .parse()
            .expect("valid toml");

        assert!(contains_path(&doc, "locale"));
        assert!(contains_path(&doc, "source.bots_own_org"));
        assert!(!contains_path(&doc, "source.sender_list"));
        assert!(!contains_path(&doc, "server.port"));
    }
}
