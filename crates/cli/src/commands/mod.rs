pub mod audio;
pub mod config;
pub mod doctor;
pub mod migrate;
pub mod sync;

use anyhow::Context;
use callsync_core::config::{AppConfig, LoadOptions};
use callsync_core::errors::ApplicationError;
use callsync_db::{connect_with_settings, migrations, DbPool};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<Value>,
}

const RUNTIME_INIT_EXIT_CODE: u8 = 7;

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_report(command, message, None)
    }

    pub fn success_with_report(
        command: &str,
        message: impl Into<String>,
        report: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            report,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with_report(command, error_class, message, exit_code, None)
    }

    /// A failed run that still produced a report worth printing.
    pub fn failure_with_report(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        report: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            report,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_error(command: &str, error: &ApplicationError) -> Self {
        Self::failure(command, error.error_class(), error.to_string(), error.exit_code())
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::from_error(
            command,
            &ApplicationError::Configuration(format!("configuration issue: {error}")),
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<tokio::runtime::Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")
        .map_err(|error| {
            CommandResult::failure(command, "runtime_init", format!("{error:#}"), RUNTIME_INIT_EXIT_CODE)
        })
}

/// Opens the store and brings its schema up to date.
pub(crate) async fn open_store(config: &AppConfig) -> Result<DbPool, ApplicationError> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| ApplicationError::Persistence(format!("failed to connect to database: {error}")))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ApplicationError::Persistence(format!("migration failed: {error}")))?;
    Ok(pool)
}

pub(crate) fn to_report<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}
