use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use callsync_cli::commands::{audio, config, doctor, migrate, sync};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url(dir.path());
    with_env(&[("CALLSYNC_DATABASE_URL", database_url.as_str())], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
    assert!(dir.path().join("callsync.db").exists());
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("CALLSYNC_DATABASE_URL", "postgres://localhost/calls")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn sync_day_rejects_unrecognized_date() {
    with_env(&[], || {
        let result = sync::run_day("clinic-1", "April 5th", false);
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sync-day");
        assert_eq!(payload["error_class"], "invalid_input");
    });
}

#[test]
fn sync_range_rejects_inverted_range_before_any_tenant_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url(dir.path());
    with_env(
        &[
            ("CALLSYNC_DATABASE_URL", database_url.as_str()),
            ("CALLSYNC_TENANT_ID", "clinic-1"),
            ("CALLSYNC_TENANT_BASE_URL", "http://127.0.0.1:9"),
            ("CALLSYNC_TENANT_ACCESS_TOKEN", "token-abc"),
        ],
        || {
            let result = sync::run_range(None, "10.04.2025", "2025-04-01", false);
            assert_eq!(result.exit_code, 3);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["error_class"], "invalid_input");
        },
    );
}

#[test]
fn sync_day_reports_unknown_tenant_as_credentials_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url(dir.path());
    with_env(&[("CALLSYNC_DATABASE_URL", database_url.as_str())], || {
        let result = sync::run_day("clinic-404", "05.04.2025", false);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "credentials");
        assert!(payload["message"].as_str().unwrap_or_default().contains("clinic-404"));
    });
}

#[test]
fn sync_day_marks_day_and_skips_rerun() {
    let server_runtime = tokio::runtime::Runtime::new().expect("server runtime");
    let server = server_runtime.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "_embedded": { "leads": [{ "id": 1 }] } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "name": "Lead 1" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/leads/1/links"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        server
    });

    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url(dir.path());
    let base_url = server.uri();
    with_env(
        &[
            ("CALLSYNC_DATABASE_URL", database_url.as_str()),
            ("CALLSYNC_TENANT_ID", "clinic-1"),
            ("CALLSYNC_TENANT_BASE_URL", base_url.as_str()),
            ("CALLSYNC_TENANT_ACCESS_TOKEN", "token-abc"),
        ],
        || {
            let first = sync::run_day("clinic-1", "05.04.2025", false);
            assert_eq!(first.exit_code, 0, "unexpected output: {}", first.output);
            let payload = parse_payload(&first.output);
            assert_eq!(payload["report"]["status"], "completed_no_leads");
            assert_eq!(payload["report"]["leads_processed"], 1);
            assert_eq!(payload["report"]["day"], "2025-04-05");

            let second = sync::run_day("clinic-1", "2025-04-05", false);
            assert_eq!(second.exit_code, 0);
            assert_eq!(parse_payload(&second.output)["report"]["status"], "skipped");

            let forced = sync::run_day("clinic-1", "2025-04-05", true);
            assert_eq!(parse_payload(&forced.output)["report"]["status"], "completed_no_leads");
        },
    );

    drop(server);
}

#[test]
fn fetch_audio_for_unknown_note_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url(dir.path());
    with_env(&[("CALLSYNC_DATABASE_URL", database_url.as_str())], || {
        let result = audio::run_for_key("9999");
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "fetch-audio");
        assert_eq!(payload["error_class"], "domain_validation");
    });
}

#[test]
fn fetch_audio_for_empty_day_succeeds_with_nothing_to_do() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url(dir.path());
    with_env(&[("CALLSYNC_DATABASE_URL", database_url.as_str())], || {
        let result = audio::run_for_day("clinic-1", "05.04.2025");
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["message"], "0 saved, 0 failed");
        assert_eq!(payload["report"], json!([]));
    });
}

#[test]
fn config_output_redacts_tenant_token_and_proxy_password() {
    with_env(
        &[
            ("CALLSYNC_TENANT_ID", "clinic-1"),
            ("CALLSYNC_TENANT_SUBDOMAIN", "clinic"),
            ("CALLSYNC_TENANT_ACCESS_TOKEN", "supersecrettoken"),
            ("CALLSYNC_AUDIO_PROXY", "10.1.1.1:1080:agent:hunter2"),
        ],
        || {
            let output = config::run();
            assert!(output.contains("https://clinic.amocrm.ru"));
            assert!(output.contains("(source: env (CALLSYNC_TENANT_ID))"));
            assert!(output.contains("(source: env (CALLSYNC_AUDIO_PROXY))"));
            assert!(!output.contains("supersecrettoken"));
            assert!(!output.contains("hunter2"));
        },
    );
}

#[test]
fn doctor_passes_with_valid_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url(dir.path());
    with_env(
        &[
            ("CALLSYNC_DATABASE_URL", database_url.as_str()),
            ("CALLSYNC_TENANT_ID", "clinic-1"),
            ("CALLSYNC_TENANT_SUBDOMAIN", "clinic"),
            ("CALLSYNC_TENANT_ACCESS_TOKEN", "token-abc"),
        ],
        || {
            let report = parse_payload(&doctor::run(true));
            assert_eq!(report["overall_status"], "pass");
            let checks = report["checks"].as_array().expect("checks array");
            let names: Vec<&str> = checks.iter().filter_map(|check| check["name"].as_str()).collect();
            assert_eq!(
                names,
                vec!["config_validation", "database_connectivity", "tenant_readiness", "audio_proxy"]
            );
        },
    );
}

#[test]
fn doctor_flags_malformed_proxy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let database_url = sqlite_url(dir.path());
    with_env(
        &[("CALLSYNC_DATABASE_URL", database_url.as_str()), ("CALLSYNC_AUDIO_PROXY", "10.1.1.1:1080")],
        || {
            let report = parse_payload(&doctor::run(true));
            assert_eq!(report["overall_status"], "fail");
            let proxy = report["checks"]
                .as_array()
                .and_then(|checks| checks.iter().find(|check| check["name"] == "audio_proxy"))
                .expect("audio_proxy check");
            assert_eq!(proxy["status"], "fail");
        },
    );
}

fn sqlite_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("callsync.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CALLSYNC_DATABASE_URL",
        "CALLSYNC_DATABASE_MAX_CONNECTIONS",
        "CALLSYNC_DATABASE_TIMEOUT_SECS",
        "CALLSYNC_CRM_PAGE_SIZE",
        "CALLSYNC_CRM_REQUEST_TIMEOUT_SECS",
        "CALLSYNC_CRM_REQUESTS_PER_SECOND",
        "CALLSYNC_SYNC_CONCURRENCY",
        "CALLSYNC_SYNC_LEAD_TIMEOUT_SECS",
        "CALLSYNC_AUDIO_OUTPUT_DIR",
        "CALLSYNC_AUDIO_MAX_ATTEMPTS",
        "CALLSYNC_AUDIO_ATTEMPT_TIMEOUT_SECS",
        "CALLSYNC_AUDIO_PROXY",
        "PROXY_STRING",
        "CALLSYNC_TENANT_ID",
        "CALLSYNC_TENANT_SUBDOMAIN",
        "CALLSYNC_TENANT_BASE_URL",
        "CALLSYNC_TENANT_ACCESS_TOKEN",
        "CALLSYNC_LOGGING_LEVEL",
        "CALLSYNC_LOGGING_FORMAT",
        "CALLSYNC_LOG_LEVEL",
        "CALLSYNC_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
