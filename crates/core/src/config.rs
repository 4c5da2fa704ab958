use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub crm: CrmConfig,
    pub sync: SyncConfig,
    pub audio: AudioConfig,
    pub tenants: Vec<TenantConfig>,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub page_size: u32,
    pub request_timeout_secs: u64,
    pub requests_per_second: u32,
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub concurrency: u32,
    pub lead_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AudioConfig {
    pub output_dir: PathBuf,
    pub max_attempts: u32,
    pub retry_delays_secs: Vec<u64>,
    pub attempt_timeout_secs: u64,
    pub min_body_bytes: usize,
    pub proxy_hosts: Vec<String>,
    pub skip_hosts: Vec<String>,
    pub proxy: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct TenantConfig {
    pub id: String,
    pub subdomain: String,
    pub base_url: Option<String>,
    pub access_token: SecretString,
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
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub sync_concurrency: Option<u32>,
    pub audio_output_dir: Option<PathBuf>,
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

/// Audio hosts that only answer reliably through the SOCKS proxy.
pub const DEFAULT_PROXY_HOSTS: &[&str] = &["api.cloudpbx.rt.ru", "media.comagic.ru"];
/// Audio hosts whose recordings are not worth ingesting.
pub const DEFAULT_SKIP_HOSTS: &[&str] = &["media.uiscom.ru"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://callsync.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            crm: CrmConfig { page_size: 50, request_timeout_secs: 30, requests_per_second: 7 },
            sync: SyncConfig { concurrency: 5, lead_timeout_secs: 90 },
            audio: AudioConfig {
                output_dir: PathBuf::from("audio"),
                max_attempts: 3,
                retry_delays_secs: vec![1, 2, 3],
                attempt_timeout_secs: 30,
                min_body_bytes: 1000,
                proxy_hosts: DEFAULT_PROXY_HOSTS.iter().map(|host| host.to_string()).collect(),
                skip_hosts: DEFAULT_SKIP_HOSTS.iter().map(|host| host.to_string()).collect(),
                proxy: None,
            },
            tenants: Vec::new(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl TenantConfig {
    /// API root for this tenant; the CRM's default cloud host unless overridden.
    pub fn api_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.amocrm.ru", self.subdomain.trim()),
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
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("callsync.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn tenant(&self, id: &str) -> Option<&TenantConfig> {
        self.tenants.iter().find(|tenant| tenant.id == id)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(page_size) = crm.page_size {
                self.crm.page_size = page_size;
            }
            if let Some(request_timeout_secs) = crm.request_timeout_secs {
                self.crm.request_timeout_secs = request_timeout_secs;
            }
            if let Some(requests_per_second) = crm.requests_per_second {
                self.crm.requests_per_second = requests_per_second;
            }
        }

        if let Some(sync) = patch.sync {
            if let Some(concurrency) = sync.concurrency {
                self.sync.concurrency = concurrency;
            }
            if let Some(lead_timeout_secs) = sync.lead_timeout_secs {
                self.sync.lead_timeout_secs = lead_timeout_secs;
            }
        }

        if let Some(audio) = patch.audio {
            if let Some(output_dir) = audio.output_dir {
                self.audio.output_dir = output_dir;
            }
            if let Some(max_attempts) = audio.max_attempts {
                self.audio.max_attempts = max_attempts;
            }
            if let Some(retry_delays_secs) = audio.retry_delays_secs {
                self.audio.retry_delays_secs = retry_delays_secs;
            }
            if let Some(attempt_timeout_secs) = audio.attempt_timeout_secs {
                self.audio.attempt_timeout_secs = attempt_timeout_secs;
            }
            if let Some(min_body_bytes) = audio.min_body_bytes {
                self.audio.min_body_bytes = min_body_bytes;
            }
            if let Some(proxy_hosts) = audio.proxy_hosts {
                self.audio.proxy_hosts = proxy_hosts;
            }
            if let Some(skip_hosts) = audio.skip_hosts {
                self.audio.skip_hosts = skip_hosts;
            }
            if let Some(proxy) = audio.proxy {
                self.audio.proxy = Some(secret_value(proxy));
            }
        }

        if let Some(tenants) = patch.tenants {
            self.tenants = tenants
                .into_iter()
                .map(|tenant| TenantConfig {
                    id: tenant.id,
                    subdomain: tenant.subdomain.unwrap_or_default(),
                    base_url: tenant.base_url,
                    access_token: secret_value(tenant.access_token.unwrap_or_default()),
                })
                .collect();
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
        if let Some(value) = read_env("CALLSYNC_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CALLSYNC_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CALLSYNC_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CALLSYNC_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CALLSYNC_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CALLSYNC_CRM_PAGE_SIZE") {
            self.crm.page_size = parse_u32("CALLSYNC_CRM_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("CALLSYNC_CRM_REQUEST_TIMEOUT_SECS") {
            self.crm.request_timeout_secs =
                parse_u64("CALLSYNC_CRM_REQUEST_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CALLSYNC_CRM_REQUESTS_PER_SECOND") {
            self.crm.requests_per_second =
                parse_u32("CALLSYNC_CRM_REQUESTS_PER_SECOND", &value)?;
        }

        if let Some(value) = read_env("CALLSYNC_SYNC_CONCURRENCY") {
            self.sync.concurrency = parse_u32("CALLSYNC_SYNC_CONCURRENCY", &value)?;
        }
        if let Some(value) = read_env("CALLSYNC_SYNC_LEAD_TIMEOUT_SECS") {
            self.sync.lead_timeout_secs = parse_u64("CALLSYNC_SYNC_LEAD_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CALLSYNC_AUDIO_OUTPUT_DIR") {
            self.audio.output_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("CALLSYNC_AUDIO_MAX_ATTEMPTS") {
            self.audio.max_attempts = parse_u32("CALLSYNC_AUDIO_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("CALLSYNC_AUDIO_ATTEMPT_TIMEOUT_SECS") {
            self.audio.attempt_timeout_secs =
                parse_u64("CALLSYNC_AUDIO_ATTEMPT_TIMEOUT_SECS", &value)?;
        }
        let proxy = read_env("CALLSYNC_AUDIO_PROXY").or_else(|| read_env("PROXY_STRING"));
        if let Some(value) = proxy {
            self.audio.proxy = Some(secret_value(value));
        }

        if let Some(id) = read_env("CALLSYNC_TENANT_ID") {
            let tenant = TenantConfig {
                subdomain: read_env("CALLSYNC_TENANT_SUBDOMAIN").unwrap_or_default(),
                base_url: read_env("CALLSYNC_TENANT_BASE_URL"),
                access_token: secret_value(
                    read_env("CALLSYNC_TENANT_ACCESS_TOKEN").unwrap_or_default(),
                ),
                id,
            };
            self.tenants.retain(|existing| existing.id != tenant.id);
            self.tenants.push(tenant);
        }

        let log_level =
            read_env("CALLSYNC_LOGGING_LEVEL").or_else(|| read_env("CALLSYNC_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CALLSYNC_LOGGING_FORMAT").or_else(|| read_env("CALLSYNC_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(concurrency) = overrides.sync_concurrency {
            self.sync.concurrency = concurrency;
        }
        if let Some(output_dir) = overrides.audio_output_dir {
            self.audio.output_dir = output_dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_crm(&self.crm)?;
        validate_sync(&self.sync)?;
        validate_audio(&self.audio)?;
        validate_tenants(&self.tenants)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("callsync.toml"), PathBuf::from("config/callsync.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if crm.page_size == 0 || crm.page_size > 250 {
        return Err(ConfigError::Validation("crm.page_size must be in range 1..=250".to_string()));
    }

    if crm.request_timeout_secs == 0 || crm.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "crm.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if crm.requests_per_second == 0 {
        return Err(ConfigError::Validation(
            "crm.requests_per_second must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_sync(sync: &SyncConfig) -> Result<(), ConfigError> {
    if sync.concurrency == 0 {
        return Err(ConfigError::Validation(
            "sync.concurrency must be greater than zero".to_string(),
        ));
    }

    if sync.lead_timeout_secs == 0 || sync.lead_timeout_secs > 3600 {
        return Err(ConfigError::Validation(
            "sync.lead_timeout_secs must be in range 1..=3600".to_string(),
        ));
    }

    Ok(())
}

fn validate_audio(audio: &AudioConfig) -> Result<(), ConfigError> {
    if audio.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "audio.max_attempts must be greater than zero".to_string(),
        ));
    }

    let gaps = audio.max_attempts.saturating_sub(1) as usize;
    if audio.retry_delays_secs.len() < gaps {
        return Err(ConfigError::Validation(format!(
            "audio.retry_delays_secs needs at least {gaps} entries for {} attempts",
            audio.max_attempts
        )));
    }

    if audio.attempt_timeout_secs == 0 || audio.attempt_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "audio.attempt_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if audio.output_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation("audio.output_dir must not be empty".to_string()));
    }

    Ok(())
}

fn validate_tenants(tenants: &[TenantConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for tenant in tenants {
        let id = tenant.id.trim();
        if id.is_empty() {
            return Err(ConfigError::Validation("tenants[].id must not be empty".to_string()));
        }
        if !seen.insert(id.to_string()) {
            return Err(ConfigError::Validation(format!("tenant id `{id}` is configured twice")));
        }

        match &tenant.base_url {
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                return Err(ConfigError::Validation(format!(
                    "tenant `{id}` base_url must start with http:// or https://"
                )));
            }
            None if tenant.subdomain.trim().is_empty() => {
                return Err(ConfigError::Validation(format!(
                    "tenant `{id}` needs either subdomain or base_url"
                )));
            }
            _ => {}
        }

        if tenant.access_token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "tenant `{id}` access_token is required"
            )));
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    crm: Option<CrmPatch>,
    sync: Option<SyncPatch>,
    audio: Option<AudioPatch>,
    tenants: Option<Vec<TenantPatch>>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    page_size: Option<u32>,
    request_timeout_secs: Option<u64>,
    requests_per_second: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SyncPatch {
    concurrency: Option<u32>,
    lead_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AudioPatch {
    output_dir: Option<PathBuf>,
    max_attempts: Option<u32>,
    retry_delays_secs: Option<Vec<u64>>,
    attempt_timeout_secs: Option<u64>,
    min_body_bytes: Option<usize>,
    proxy_hosts: Option<Vec<String>>,
    skip_hosts: Option<Vec<String>>,
    proxy: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TenantPatch {
    id: String,
    subdomain: Option<String>,
    base_url: Option<String>,
    access_token: Option<String>,
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

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const MANAGED_VARS: &[&str] = &[
        "CALLSYNC_DATABASE_URL",
        "CALLSYNC_SYNC_CONCURRENCY",
        "CALLSYNC_AUDIO_PROXY",
        "PROXY_STRING",
        "CALLSYNC_TENANT_ID",
        "CALLSYNC_TENANT_SUBDOMAIN",
        "CALLSYNC_TENANT_ACCESS_TOKEN",
        "CALLSYNC_LOG_LEVEL",
        "CALLSYNC_LOG_FORMAT",
        "TEST_CLINIC_TOKEN",
    ];

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
    fn defaults_match_pipeline_constants() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.crm.page_size == 50, "page size defaults to 50")?;
        ensure(config.sync.lead_timeout_secs == 90, "lead timeout defaults to 90s")?;
        ensure(config.audio.retry_delays_secs == vec![1, 2, 3], "retry delays default to 1/2/3")?;
        ensure(config.audio.min_body_bytes == 1000, "minimum audio size defaults to 1000")?;
        ensure(
            config.audio.proxy_hosts.iter().any(|host| host == "media.comagic.ru"),
            "comagic is routed through the proxy by default",
        )?;
        ensure(config.tenants.is_empty(), "no tenants are configured by default")
    }

    #[test]
    fn file_load_supports_env_interpolation_for_tenant_tokens() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("TEST_CLINIC_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("callsync.toml");
            fs::write(
                &path,
                r#"
[[tenants]]
id = "clinic-1"
subdomain = "clinic1"
access_token = "${TEST_CLINIC_TOKEN}"

[[tenants]]
id = "clinic-2"
base_url = "http://127.0.0.1:9000/"
access_token = "literal-token"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let first = config.tenant("clinic-1").ok_or("clinic-1 should be configured")?;
            ensure(
                first.access_token.expose_secret() == "token-from-env",
                "token should be interpolated from environment",
            )?;
            ensure(
                first.api_base_url() == "https://clinic1.amocrm.ru",
                "subdomain should expand to the cloud host",
            )?;
            let second = config.tenant("clinic-2").ok_or("clinic-2 should be configured")?;
            ensure(
                second.api_base_url() == "http://127.0.0.1:9000",
                "explicit base url should win and lose its trailing slash",
            )
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn proxy_string_falls_back_to_bare_env_var() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("PROXY_STRING", "10.1.1.1:1080:user:pass");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let proxy = config.audio.proxy.as_ref().ok_or("proxy should be loaded")?;
            ensure(proxy.expose_secret() == "10.1.1.1:1080:user:pass", "proxy string is kept")?;
            ensure(
                !format!("{config:?}").contains("user:pass"),
                "debug output should not contain proxy credentials",
            )
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("CALLSYNC_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("CALLSYNC_SYNC_CONCURRENCY", "8");
        env::set_var("CALLSYNC_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("callsync.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[sync]
concurrency = 3
lead_timeout_secs = 60

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.sync.concurrency == 8, "env concurrency should win over file")?;
            ensure(config.sync.lead_timeout_secs == 60, "file lead timeout should win over default")?;
            ensure(matches!(config.logging.format, LogFormat::Json), "env log format alias applies")
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn env_tenant_requires_an_access_token() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);
        env::set_var("CALLSYNC_TENANT_ID", "clinic-env");
        env::set_var("CALLSYNC_TENANT_SUBDOMAIN", "clinicenv");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("access_token")
            );
            ensure(has_message, "validation failure should mention access_token")
        })();

        clear_vars(MANAGED_VARS);
        result
    }

    #[test]
    fn retry_delays_must_cover_every_gap() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(MANAGED_VARS);

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("callsync.toml");
            fs::write(&path, "[audio]\nmax_attempts = 4\nretry_delays_secs = [1, 2]\n")
                .map_err(|err| err.to_string())?;

            let error = match AppConfig::load(LoadOptions {
                config_path: Some(path),
                ..LoadOptions::default()
            }) {
                Ok(_) => return Err("expected validation failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("retry_delays_secs")),
                "validation failure should mention retry_delays_secs",
            )
        })();

        clear_vars(MANAGED_VARS);
        result
    }
}
