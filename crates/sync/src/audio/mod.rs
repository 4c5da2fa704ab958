//! Audio Retrieval: downloads a call's recording with validation, bounded
//! retries and proxy routing for hosts that refuse direct connections.

pub mod proxy;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::{error, info, warn};

use callsync_core::config::AudioConfig;
use callsync_core::domain::call_record::{CallRecord, DedupeKey, TenantId, TranscriptionStatus};
use callsync_core::domain::download::{validate_audio_body, AudioOutcome, DownloadResult};
use callsync_db::repositories::{CallRecordRepository, RepositoryError};

pub use proxy::ProxyEndpoint;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const AUDIO_ACCEPT: &str =
    "audio/webm,audio/ogg,audio/wav,audio/*;q=0.9,application/ogg;q=0.7,video/*;q=0.6,*/*;q=0.5";
const KNOWN_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "oga", "opus", "m4a", "webm", "aac", "flac"];
const DEFAULT_EXTENSION: &str = "mp3";

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no call record with key `{0}`")]
    UnknownRecord(DedupeKey),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("could not write audio file `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("http client setup failed: {0}")]
    Setup(String),
}

enum ProxyRoute {
    Ready(Client),
    Unavailable(String),
}

pub struct AudioRetriever {
    direct: Client,
    proxy: ProxyRoute,
    settings: AudioConfig,
    proxy_hosts: Vec<String>,
    records: Arc<dyn CallRecordRepository>,
}

impl AudioRetriever {
    /// A missing or malformed proxy string is not fatal here; it is reported
    /// when a proxied host is actually hit.
    pub fn new(settings: AudioConfig, records: Arc<dyn CallRecordRepository>) -> Result<Self, AudioError> {
        let direct = client_builder()
            .build()
            .map_err(|error| AudioError::Setup(error.to_string()))?;

        let proxy = match settings.proxy.as_ref() {
            None => ProxyRoute::Unavailable("no proxy string configured".to_string()),
            Some(raw) => match ProxyEndpoint::parse(raw.expose_secret()) {
                Err(problem) => ProxyRoute::Unavailable(problem.to_string()),
                Ok(endpoint) => match proxied_client(&endpoint) {
                    Ok(client) => ProxyRoute::Ready(client),
                    Err(problem) => {
                        warn!(
                            event_name = "audio.proxy_unusable",
                            proxy = %endpoint.redacted(),
                            error = %problem,
                            "proxy client could not be built"
                        );
                        ProxyRoute::Unavailable(problem)
                    }
                },
            },
        };
        let proxy_hosts = settings.proxy_hosts.iter().map(|host| host.trim().to_ascii_lowercase()).collect();

        Ok(Self { direct, proxy, settings, proxy_hosts, records })
    }

    pub async fn fetch_for_key(&self, key: &DedupeKey) -> Result<AudioOutcome, AudioError> {
        let record = self
            .records
            .find_by_key(key)
            .await?
            .ok_or_else(|| AudioError::UnknownRecord(key.clone()))?;
        self.fetch(&record).await
    }

    /// Pending records of the day that have no audio file yet, one at a time.
    /// Only the initial listing can fail the batch; a record that errors is
    /// reported as [`AudioOutcome::Errored`] and the rest still run.
    pub async fn fetch_pending_for_day(
        &self,
        tenant_id: &TenantId,
        day: NaiveDate,
    ) -> Result<Vec<(DedupeKey, AudioOutcome)>, AudioError> {
        let pending = self
            .records
            .list_for_day(tenant_id, day, Some(TranscriptionStatus::Pending))
            .await?;

        let mut outcomes = Vec::new();
        for record in pending.iter().filter(|record| record.audio_filename.is_none()) {
            let outcome = match self.fetch(record).await {
                Ok(outcome) => outcome,
                Err(problem) => {
                    error!(
                        event_name = "audio.record_errored",
                        dedupe_key = %record.dedupe_key,
                        error = %problem,
                        "audio retrieval errored for record"
                    );
                    AudioOutcome::Errored { reason: problem.to_string() }
                }
            };
            outcomes.push((record.dedupe_key.clone(), outcome));
        }
        Ok(outcomes)
    }

    /// Downloads one record's audio. On success the file name is stored and
    /// the transcription status is left alone; on final failure the record
    /// is marked `failed`.
    pub async fn fetch(&self, record: &CallRecord) -> Result<AudioOutcome, AudioError> {
        let (result, attempts, via_proxy) = self.download(&record.audio_url).await;

        match result {
            DownloadResult::Success(bytes) => {
                let file_name = format!(
                    "{}.{}",
                    record.audio_file_stem(),
                    extension_for(&record.audio_url)
                );
                let path = self.settings.output_dir.join(&file_name);
                tokio::fs::create_dir_all(&self.settings.output_dir)
                    .await
                    .map_err(|source| AudioError::Write { path: path.clone(), source })?;
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|source| AudioError::Write { path: path.clone(), source })?;
                self.records.set_audio_filename(&record.dedupe_key, &file_name).await?;

                info!(
                    event_name = "audio.saved",
                    dedupe_key = %record.dedupe_key,
                    path = %path.display(),
                    bytes = bytes.len(),
                    attempts,
                    via_proxy,
                    "audio saved"
                );
                Ok(AudioOutcome::Saved {
                    path: path.display().to_string(),
                    bytes: bytes.len(),
                    attempts,
                    via_proxy,
                })
            }
            DownloadResult::RetryableFailure(reason) | DownloadResult::TerminalFailure(reason) => {
                self.records
                    .update_transcription_status(&record.dedupe_key, TranscriptionStatus::Failed)
                    .await?;
                error!(
                    event_name = "audio.failed",
                    dedupe_key = %record.dedupe_key,
                    attempts,
                    reason = %reason,
                    "audio retrieval failed; record marked failed"
                );
                Ok(AudioOutcome::Failed { attempts, reason })
            }
        }
    }

    /// Returns the last result, the number of attempts made and whether the
    /// bytes came through the proxy.
    async fn download(&self, raw_url: &str) -> (DownloadResult, u32, bool) {
        let url = match Url::parse(raw_url) {
            Ok(url) => url,
            Err(problem) => {
                return (DownloadResult::TerminalFailure(format!("invalid audio url: {problem}")), 0, false)
            }
        };
        let host = url.host_str().map(str::to_ascii_lowercase).unwrap_or_default();
        let mut attempts = 0;

        if self.proxy_hosts.contains(&host) {
            match &self.proxy {
                ProxyRoute::Ready(client) => {
                    attempts += 1;
                    match self.attempt(client, &url).await {
                        DownloadResult::Success(bytes) => {
                            return (DownloadResult::Success(bytes), attempts, true)
                        }
                        terminal @ DownloadResult::TerminalFailure(_) => {
                            return (terminal, attempts, true)
                        }
                        DownloadResult::RetryableFailure(reason) => {
                            warn!(host = %host, reason = %reason, "proxied attempt failed, trying directly");
                        }
                    }
                }
                ProxyRoute::Unavailable(problem) => {
                    error!(
                        event_name = "audio.proxy_unavailable",
                        host = %host,
                        problem = %problem,
                        "host requires the proxy but it is not usable, trying directly"
                    );
                }
            }
        }

        let max_attempts = self.settings.max_attempts.max(1);
        let mut last = DownloadResult::RetryableFailure("no attempt made".to_string());
        for attempt in 0..max_attempts {
            attempts += 1;
            last = self.attempt(&self.direct, &url).await;
            match &last {
                DownloadResult::Success(_) | DownloadResult::TerminalFailure(_) => break,
                DownloadResult::RetryableFailure(reason) => {
                    warn!(attempt = attempt + 1, max_attempts, reason = %reason, "audio attempt failed");
                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(self.retry_delay(attempt as usize)).await;
                    }
                }
            }
        }

        (last, attempts, false)
    }

    async fn attempt(&self, client: &Client, url: &Url) -> DownloadResult {
        let response = match client
            .get(url.clone())
            .timeout(Duration::from_secs(self.settings.attempt_timeout_secs.max(1)))
            .send()
            .await
        {
            Ok(response) => response,
            Err(problem) => return DownloadResult::RetryableFailure(problem.to_string()),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return DownloadResult::TerminalFailure(format!("recording is gone (HTTP {status})"));
        }
        if status != StatusCode::OK {
            return DownloadResult::RetryableFailure(format!("unexpected HTTP {status}"));
        }

        match response.bytes().await {
            Ok(body) => match validate_audio_body(&body, self.settings.min_body_bytes) {
                Ok(()) => DownloadResult::Success(body.to_vec()),
                Err(reason) => DownloadResult::RetryableFailure(reason),
            },
            Err(problem) => DownloadResult::RetryableFailure(problem.to_string()),
        }
    }

    fn retry_delay(&self, attempt: usize) -> Duration {
        let delays = &self.settings.retry_delays_secs;
        let secs = delays.get(attempt).or_else(|| delays.last()).copied().unwrap_or(1);
        Duration::from_secs(secs)
    }
}

fn proxied_client(endpoint: &ProxyEndpoint) -> Result<Client, String> {
    let url = endpoint.url().map_err(|problem| problem.to_string())?;
    let proxy = reqwest::Proxy::all(url.as_str()).map_err(|error| error.to_string())?;
    client_builder().proxy(proxy).build().map_err(|error| error.to_string())
}

fn client_builder() -> reqwest::ClientBuilder {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(AUDIO_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7"));
    Client::builder().default_headers(headers).no_proxy()
}

/// Extension from the URL path if it names a known audio format.
pub fn extension_for(url: &str) -> &'static str {
    let path = Url::parse(url).map(|url| url.path().to_ascii_lowercase()).unwrap_or_default();
    let candidate = path.rsplit('/').next().and_then(|segment| segment.rsplit_once('.')).map(|(_, ext)| ext);
    candidate
        .and_then(|ext| KNOWN_EXTENSIONS.iter().find(|known| **known == ext))
        .copied()
        .unwrap_or(DEFAULT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::extension_for;

    #[test]
    fn extension_comes_from_url_path() {
        assert_eq!(extension_for("https://rec.example/files/call.WAV?token=1"), "wav");
        assert_eq!(extension_for("https://rec.example/files/call.ogg"), "ogg");
        assert_eq!(extension_for("https://rec.example/download?id=5"), "mp3");
        assert_eq!(extension_for("https://rec.example/files/report.pdf"), "mp3");
        assert_eq!(extension_for("not a url"), "mp3");
    }
}
