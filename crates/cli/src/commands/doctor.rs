use pitchsim_agent::llm::{provider_name, HttpLlmClient};
use pitchsim_core::config::{AppConfig, LoadOptions};
use pitchsim_core::rules::RuleBook;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
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
            checks.push(check_rule_book(&config));
            checks.push(check_objection_caps(&config));
            checks.push(check_generator(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["rule_book", "objection_caps", "generator_readiness"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_rule_book(config: &AppConfig) -> DoctorCheck {
    let source = config
        .engine
        .rules_path
        .as_ref()
        .map(|path| format!("`{}`", path.display()))
        .unwrap_or_else(|| "built-in rules".to_string());

    match RuleBook::load_or_builtin(config.engine.rules_path.as_deref()) {
        Ok(rules) => DoctorCheck {
            name: "rule_book",
            status: CheckStatus::Pass,
            details: format!("compiled {} topic rules from {source}", rules.topic_rules().len()),
        },
        Err(error) => DoctorCheck {
            name: "rule_book",
            status: CheckStatus::Fail,
            details: format!("{source}: {error}"),
        },
    }
}

fn check_objection_caps(config: &AppConfig) -> DoctorCheck {
    match config.caps.table() {
        Ok(_) => DoctorCheck {
            name: "objection_caps",
            status: CheckStatus::Pass,
            details: "caps are monotone across difficulties".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "objection_caps",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn check_generator(config: &AppConfig) -> DoctorCheck {
    let provider = provider_name(config.llm.provider);

    if !config.llm.has_credentials() {
        return DoctorCheck {
            name: "generator_readiness",
            status: CheckStatus::Fail,
            details: format!(
                "no api key for {provider}; replies will use offline fallback lines only"
            ),
        };
    }

    match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => DoctorCheck {
            name: "generator_readiness",
            status: CheckStatus::Pass,
            details: format!(
                "{} client ready for model `{}` at {}",
                provider_name(client.provider()),
                config.llm.model,
                config.llm.endpoint_base()
            ),
        },
        Err(error) => DoctorCheck {
            name: "generator_readiness",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
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
