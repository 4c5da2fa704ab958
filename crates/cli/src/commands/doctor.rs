use callsync_core::config::{AppConfig, LoadOptions};
use callsync_db::connect_with_settings;
use callsync_sync::{ConfigCredentialProvider, CredentialProvider, ProxyEndpoint};
use secrecy::ExposeSecret;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: &[&str] = &["database_connectivity", "tenant_readiness", "audio_proxy"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => {
                    checks.push(runtime.block_on(check_database_connectivity(&config)));
                    checks.push(runtime.block_on(check_tenant_readiness(&config)));
                }
                Err(error) => {
                    for name in ["database_connectivity", "tenant_readiness"] {
                        checks.push(DoctorCheck {
                            name,
                            status: CheckStatus::Fail,
                            details: format!("failed to initialize async runtime: {error}"),
                        });
                    }
                }
            }
            checks.push(check_audio_proxy(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for &name in DEPENDENT_CHECKS {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_fail = checks
        .iter()
        .any(|check| matches!(check.status, CheckStatus::Fail | CheckStatus::Skipped));
    let overall_status = if any_fail { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_fail {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

async fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let result = async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    }
    .await;

    match result {
        Ok(()) => DoctorCheck {
            name: "database_connectivity",
            status: CheckStatus::Pass,
            details: format!("connected using `{}`", config.database.url),
        },
        Err(error) => {
            DoctorCheck { name: "database_connectivity", status: CheckStatus::Fail, details: error }
        }
    }
}

async fn check_tenant_readiness(config: &AppConfig) -> DoctorCheck {
    let provider = ConfigCredentialProvider::new(config.tenants.clone());
    let tenant_ids = provider.tenant_ids();
    if tenant_ids.is_empty() {
        return DoctorCheck {
            name: "tenant_readiness",
            status: CheckStatus::Warn,
            details: "no tenants configured; sync commands have nothing to run".to_string(),
        };
    }

    let mut problems = Vec::new();
    for tenant_id in &tenant_ids {
        if let Err(error) = provider.resolve(tenant_id).await {
            problems.push(error.to_string());
        }
    }

    if problems.is_empty() {
        DoctorCheck {
            name: "tenant_readiness",
            status: CheckStatus::Pass,
            details: format!("{} tenant(s) have credentials", tenant_ids.len()),
        }
    } else {
        DoctorCheck { name: "tenant_readiness", status: CheckStatus::Fail, details: problems.join("; ") }
    }
}

fn check_audio_proxy(config: &AppConfig) -> DoctorCheck {
    match config.audio.proxy.as_ref() {
        None if config.audio.proxy_hosts.is_empty() => DoctorCheck {
            name: "audio_proxy",
            status: CheckStatus::Pass,
            details: "no proxied hosts configured".to_string(),
        },
        None => DoctorCheck {
            name: "audio_proxy",
            status: CheckStatus::Warn,
            details: format!(
                "no proxy configured; {} will be fetched directly",
                config.audio.proxy_hosts.join(", ")
            ),
        },
        Some(raw) => match ProxyEndpoint::parse(raw.expose_secret()) {
            Ok(endpoint) => DoctorCheck {
                name: "audio_proxy",
                status: CheckStatus::Pass,
                details: format!("proxy {}", endpoint.redacted()),
            },
            Err(error) => DoctorCheck {
                name: "audio_proxy",
                status: CheckStatus::Fail,
                details: error.to_string(),
            },
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
