use hostline_core::config::{AppConfig, LlmProvider, LoadOptions};
use hostline_db::connect_with_config;
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

const DEPENDENT_CHECKS: [&str; 4] =
    ["database_connectivity", "llm_mode", "telephony_credentials", "speech_backends"];

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
            checks.push(check_database_connectivity(&config));
            checks.push(check_llm_mode(&config));
            checks.push(check_telephony(&config));
            checks.push(check_speech_backends(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.extend(DEPENDENT_CHECKS.iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let warned = checks.iter().any(|check| check.status == CheckStatus::Warn);
    let (overall_status, summary) = match (failed, warned) {
        (true, _) => (CheckStatus::Fail, "doctor: one or more readiness checks failed"),
        (false, true) => (CheckStatus::Warn, "doctor: ready, with warnings"),
        (false, false) => (CheckStatus::Pass, "doctor: all readiness checks passed"),
    };

    DoctorReport { overall_status, summary: summary.to_string(), checks }
}

fn check_llm_mode(config: &AppConfig) -> DoctorCheck {
    match config.llm.resolved_provider() {
        LlmProvider::OpenAi => DoctorCheck {
            name: "llm_mode",
            status: CheckStatus::Pass,
            details: format!("live ({} via {})", config.llm.model, config.llm.base_url),
        },
        _ => DoctorCheck {
            name: "llm_mode",
            status: CheckStatus::Warn,
            details: "mock responder active; set OPENAI_API_KEY for live conversations".to_string(),
        },
    }
}

fn check_telephony(config: &AppConfig) -> DoctorCheck {
    let telephony = &config.telephony;
    if telephony.rest_credentials().is_none() {
        return DoctorCheck {
            name: "telephony_credentials",
            status: CheckStatus::Warn,
            details: "no Twilio REST credentials; SMS confirmations and /test-twilio are disabled"
                .to_string(),
        };
    }

    let signatures = if config.enforces_webhook_signatures() {
        "webhook signatures enforced"
    } else {
        "webhook signatures not enforced"
    };
    DoctorCheck {
        name: "telephony_credentials",
        status: CheckStatus::Pass,
        details: format!(
            "REST credentials present; {signatures}; caller id {}",
            telephony.phone_number.as_deref().unwrap_or("<unset>")
        ),
    }
}

fn check_speech_backends(config: &AppConfig) -> DoctorCheck {
    let stt = hostline_voice::speech_to_text(config);
    let tts = hostline_voice::text_to_speech(config);
    match (stt, tts) {
        (Ok(stt), Ok(tts)) => DoctorCheck {
            name: "speech_backends",
            status: CheckStatus::Pass,
            details: format!("stt: {}, tts: {}", stt.name(), tts.name()),
        },
        (Err(error), _) | (_, Err(error)) => DoctorCheck {
            name: "speech_backends",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;

        pool.close().await;
        Ok::<(), String>(())
    });

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

#[cfg(test)]
mod tests {
    use hostline_core::config::AppConfig;

    use super::{check_llm_mode, check_speech_backends, check_telephony, CheckStatus};

    #[test]
    fn default_config_runs_in_mock_mode_with_warnings() {
        let config = AppConfig::default();

        assert_eq!(check_llm_mode(&config).status, CheckStatus::Warn);
        assert_eq!(check_telephony(&config).status, CheckStatus::Warn);

        let speech = check_speech_backends(&config);
        assert_eq!(speech.status, CheckStatus::Pass);
        assert_eq!(speech.details, "stt: mock, tts: mock");
    }
}
