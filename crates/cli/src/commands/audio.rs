use std::sync::Arc;

use callsync_core::config::AppConfig;
use callsync_core::dates::parse_day;
use callsync_core::domain::call_record::{DedupeKey, TenantId};
use callsync_core::domain::download::AudioOutcome;
use callsync_core::errors::{ApplicationError, DomainError};
use callsync_db::repositories::SqlCallRecordRepository;
use callsync_sync::{AudioError, AudioRetriever};
use serde::Serialize;

use crate::commands::{build_runtime, load_config, open_store, to_report, CommandResult};

const COMMAND: &str = "fetch-audio";
const DOWNLOAD_FAILED_EXIT_CODE: u8 = 6;

#[derive(Debug, Serialize)]
struct KeyedOutcome {
    dedupe_key: DedupeKey,
    #[serde(flatten)]
    outcome: AudioOutcome,
}

pub fn run_for_key(note: &str) -> CommandResult {
    let key = DedupeKey(note.trim().to_string());
    let result = with_retriever(|retriever| async move {
        let outcome = retriever.fetch_for_key(&key).await?;
        Ok(vec![KeyedOutcome { dedupe_key: key, outcome }])
    });
    render(result)
}

pub fn run_for_day(tenant: &str, date: &str) -> CommandResult {
    let day = match parse_day(date) {
        Ok(day) => day,
        Err(error) => return CommandResult::from_error(COMMAND, &error.into()),
    };
    let tenant_id = TenantId(tenant.to_string());
    let result = with_retriever(|retriever| async move {
        let outcomes = retriever.fetch_pending_for_day(&tenant_id, day).await?;
        Ok(outcomes
            .into_iter()
            .map(|(dedupe_key, outcome)| KeyedOutcome { dedupe_key, outcome })
            .collect())
    });
    render(result)
}

fn with_retriever<F, Fut>(job: F) -> Result<Vec<KeyedOutcome>, CommandResult>
where
    F: FnOnce(AudioRetriever) -> Fut,
    Fut: std::future::Future<Output = Result<Vec<KeyedOutcome>, AudioError>>,
{
    let config: AppConfig = load_config(COMMAND)?;
    let runtime = build_runtime(COMMAND)?;

    runtime
        .block_on(async {
            let pool = open_store(&config).await?;
            let records = Arc::new(SqlCallRecordRepository::new(pool.clone()));
            let retriever = AudioRetriever::new(config.audio.clone(), records)
                .map_err(|error| ApplicationError::Integration(error.to_string()))?;
            let outcomes = job(retriever).await.map_err(audio_failure)?;
            pool.close().await;
            Ok::<_, ApplicationError>(outcomes)
        })
        .map_err(|error| CommandResult::from_error(COMMAND, &error))
}

fn render(result: Result<Vec<KeyedOutcome>, CommandResult>) -> CommandResult {
    let outcomes = match result {
        Ok(outcomes) => outcomes,
        Err(result) => return result,
    };

    let failed = outcomes.iter().filter(|keyed| !keyed.outcome.is_saved()).count();
    let message = format!("{} saved, {failed} failed", outcomes.len() - failed);

    if failed > 0 {
        CommandResult::failure_with_report(
            COMMAND,
            "download_failed",
            message,
            DOWNLOAD_FAILED_EXIT_CODE,
            to_report(&outcomes),
        )
    } else {
        CommandResult::success_with_report(COMMAND, message, to_report(&outcomes))
    }
}

fn audio_failure(error: AudioError) -> ApplicationError {
    match error {
        AudioError::UnknownRecord(key) => ApplicationError::Domain(
            DomainError::InvariantViolation(format!("no call record with key `{key}`")),
        ),
        AudioError::Repository(error) => ApplicationError::Persistence(error.to_string()),
        write @ AudioError::Write { .. } => ApplicationError::Persistence(write.to_string()),
        AudioError::Setup(message) => ApplicationError::Integration(message),
    }
}
