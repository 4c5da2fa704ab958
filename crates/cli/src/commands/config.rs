use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use callsync_core::config::{AppConfig, LoadOptions};
use callsync_sync::ProxyEndpoint;
use secrecy::ExposeSecret;
use toml::Value;

struct FileDoc {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

impl FileDoc {
    fn source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }

    fn line(&self, key: &str, value: &str, env_keys: &[&str]) -> String {
        render_line(key, value, self.source(key, env_keys))
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let path = detect_config_path();
    let file = FileDoc { doc: load_config_file_doc(path.as_deref()), path };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.push(file.line("database.url", &config.database.url, &["CALLSYNC_DATABASE_URL"]));
    lines.push(file.line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        &["CALLSYNC_DATABASE_MAX_CONNECTIONS"],
    ));
    lines.push(file.line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        &["CALLSYNC_DATABASE_TIMEOUT_SECS"],
    ));

    lines.push(file.line("crm.page_size", &config.crm.page_size.to_string(), &["CALLSYNC_CRM_PAGE_SIZE"]));
    lines.push(file.line(
        "crm.request_timeout_secs",
        &config.crm.request_timeout_secs.to_string(),
        &["CALLSYNC_CRM_REQUEST_TIMEOUT_SECS"],
    ));
    lines.push(file.line(
        "crm.requests_per_second",
        &config.crm.requests_per_second.to_string(),
        &["CALLSYNC_CRM_REQUESTS_PER_SECOND"],
    ));

    lines.push(file.line("sync.concurrency", &config.sync.concurrency.to_string(), &["CALLSYNC_SYNC_CONCURRENCY"]));
    lines.push(file.line(
        "sync.lead_timeout_secs",
        &config.sync.lead_timeout_secs.to_string(),
        &["CALLSYNC_SYNC_LEAD_TIMEOUT_SECS"],
    ));

    lines.push(file.line(
        "audio.output_dir",
        &config.audio.output_dir.display().to_string(),
        &["CALLSYNC_AUDIO_OUTPUT_DIR"],
    ));
    lines.push(file.line("audio.max_attempts", &config.audio.max_attempts.to_string(), &["CALLSYNC_AUDIO_MAX_ATTEMPTS"]));
    lines.push(file.line("audio.retry_delays_secs", &format!("{:?}", config.audio.retry_delays_secs), &[]));
    lines.push(file.line(
        "audio.attempt_timeout_secs",
        &config.audio.attempt_timeout_secs.to_string(),
        &["CALLSYNC_AUDIO_ATTEMPT_TIMEOUT_SECS"],
    ));
    lines.push(file.line("audio.proxy_hosts", &config.audio.proxy_hosts.join(", "), &[]));
    lines.push(file.line("audio.skip_hosts", &config.audio.skip_hosts.join(", "), &[]));
    let proxy = config
        .audio
        .proxy
        .as_ref()
        .map(|raw| redact_proxy(raw.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    lines.push(file.line("audio.proxy", &proxy, &["CALLSYNC_AUDIO_PROXY", "PROXY_STRING"]));

    for tenant in &config.tenants {
        let value = format!(
            "{} (token: {})",
            tenant.api_base_url(),
            redact_token(tenant.access_token.expose_secret())
        );
        let from_env = env::var("CALLSYNC_TENANT_ID").ok().as_deref() == Some(tenant.id.as_str());
        let env_keys: &[&str] = if from_env {
            &["CALLSYNC_TENANT_ID"]
        } else {
            &[]
        };
        lines.push(render_line(
            &format!("tenants.{}", tenant.id),
            &value,
            file.source("tenants", env_keys),
        ));
    }

    lines.push(file.line("logging.level", &config.logging.level, &["CALLSYNC_LOGGING_LEVEL", "CALLSYNC_LOG_LEVEL"]));
    lines.push(file.line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        &["CALLSYNC_LOGGING_FORMAT", "CALLSYNC_LOG_FORMAT"],
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("callsync.toml"), PathBuf::from("config/callsync.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
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

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.char_indices().nth(4) {
        Some((cut, _)) => format!("{}***", &trimmed[..cut]),
        None => "<redacted>".to_string(),
    }
}

fn redact_proxy(raw: &str) -> String {
    match ProxyEndpoint::parse(raw) {
        Ok(endpoint) => endpoint.redacted(),
        Err(_) => "<malformed, redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{redact_proxy, redact_token};

    #[test]
    fn tokens_keep_only_a_short_prefix() {
        assert_eq!(redact_token("eyJ0eXAiOiJKV1Qi"), "eyJ0***");
        assert_eq!(redact_token("abc"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn proxy_password_never_rendered() {
        let rendered = redact_proxy("10.0.0.5:1080:agent:s3cret");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("10.0.0.5"));
        assert_eq!(redact_proxy("garbage:s3cret"), "<malformed, redacted>");
    }
}
