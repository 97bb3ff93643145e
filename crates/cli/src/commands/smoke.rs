use std::sync::Arc;
use std::time::Instant;

use crate::commands::{exit, CommandResult};
use pitchsim_agent::generator::ScriptedGenerator;
use pitchsim_agent::lines::{Rotation, ACCESS_TRANSITION_LINE};
use pitchsim_agent::runtime::{BuyerReply, BuyerRequest, BuyerRuntime};
use pitchsim_core::classifier::classify;
use pitchsim_core::config::{AppConfig, LoadOptions};
use pitchsim_core::domain::{Conversation, Difficulty, Scenario, Turn, Vertical};
use pitchsim_core::policy::{CapTable, PolicyDecision};
use pitchsim_core::rules::RuleBook;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

/// Reference conversation replayed against a scripted generator.
struct SmokeScenario {
    name: &'static str,
    request: BuyerRequest,
    generator: ScriptedGenerator,
    verify: fn(&RuleBook, &BuyerReply) -> Result<String, String>,
}

const SCENARIO_CHECKS: [&str; 3] =
    ["scenario_opening", "scenario_forced_acceptance", "scenario_access_transition"];

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("rule_book"));
            checks.extend(SCENARIO_CHECKS.into_iter().map(skipped));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let engine = timed_check(|| {
        let rules = RuleBook::load_or_builtin(config.engine.rules_path.as_deref())
            .map_err(|error| error.to_string())?;
        let caps = config.caps.table().map_err(|error| error.to_string())?;
        Ok::<_, String>((rules, caps))
    });
    let (rules, caps) = match engine {
        Ok((elapsed_ms, engine)) => {
            checks.push(SmokeCheck {
                name: "rule_book",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "rule book compiled and caps validated".to_string(),
            });
            engine
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "rule_book",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error,
            });
            checks.extend(SCENARIO_CHECKS.into_iter().map(skipped));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "scenario_opening",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.extend(SCENARIO_CHECKS.into_iter().skip(1).map(skipped));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    for scenario in reference_scenarios() {
        let scenario_started = Instant::now();
        let engine = BuyerRuntime::new(rules.clone(), caps.clone(), Arc::new(scenario.generator));
        let reply = runtime.block_on(engine.reply(&scenario.request, scenario.name));
        let outcome = (scenario.verify)(&rules, &reply);

        checks.push(SmokeCheck {
            name: scenario.name,
            status: if outcome.is_ok() { SmokeStatus::Pass } else { SmokeStatus::Fail },
            elapsed_ms: scenario_started.elapsed().as_millis() as u64,
            message: outcome.unwrap_or_else(|error| error),
        });
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn reference_scenarios() -> Vec<SmokeScenario> {
    vec![
        SmokeScenario {
            name: "scenario_opening",
            request: BuyerRequest::new(
                Scenario::new(Vertical::B2b, Difficulty::Easy),
                Conversation::new(vec![Turn::rep("Hi, thanks for making time today.")]),
            ),
            generator: ScriptedGenerator::new()
                .with_draft("Sure. What did you want to walk me through?"),
            verify: verify_opening,
        },
        SmokeScenario {
            name: "scenario_forced_acceptance",
            request: BuyerRequest::new(
                Scenario::new(Vertical::B2b, Difficulty::Hard),
                Conversation::new(vec![
                    Turn::rep("Thanks for the time."),
                    Turn::buyer("The price feels high for us."),
                    Turn::rep("It pays for itself within two quarters."),
                    Turn::buyer("Our budget for this year is spoken for."),
                    Turn::rep("We can phase the cost."),
                    Turn::buyer("What's the risk if the rollout stalls?"),
                    Turn::rep("You can exit in the first month."),
                    Turn::buyer("And the liability on our side?"),
                    Turn::rep("let's get started now"),
                ]),
            ),
            generator: ScriptedGenerator::new()
                .with_draft("The price is still too high for me.")
                .with_acceptance("Alright, but the cost still worries me."),
            verify: verify_forced_acceptance,
        },
        SmokeScenario {
            name: "scenario_access_transition",
            request: BuyerRequest::new(
                Scenario::new(Vertical::Pharma, Difficulty::Medium),
                Conversation::new(vec![
                    Turn::rep("Thanks for seeing me, doctor."),
                    Turn::buyer("What does coverage look like for my patients?"),
                    Turn::rep("It's covered on most plans and we handle prior auth."),
                ]),
            ),
            generator: ScriptedGenerator::new()
                .with_draft("Right, but what about coverage for the others?"),
            verify: verify_access_transition,
        },
    ]
}

fn verify_opening(_rules: &RuleBook, reply: &BuyerReply) -> Result<String, String> {
    let text = reply.text.trim();
    if text.is_empty() || text.contains('\n') {
        return Err(format!("expected a single non-empty line, got `{}`", reply.text));
    }
    let accepted = Vertical::ALL
        .iter()
        .any(|vertical| Rotation::Acceptance(*vertical).lines().contains(&text));
    if accepted {
        return Err(format!("opening reply was an acceptance line: `{text}`"));
    }
    Ok(format!("buyer opened with `{text}`"))
}

fn verify_forced_acceptance(rules: &RuleBook, reply: &BuyerReply) -> Result<String, String> {
    if reply.decision != Some(PolicyDecision::ForceAccept) {
        return Err(format!("expected force_accept, got {:?}", reply.decision));
    }
    if classify(rules, &reply.text).is_objection {
        return Err(format!("forced acceptance still objects: `{}`", reply.text));
    }
    Ok(format!("close accepted with `{}`", reply.text))
}

fn verify_access_transition(_rules: &RuleBook, reply: &BuyerReply) -> Result<String, String> {
    if reply.text != ACCESS_TRANSITION_LINE {
        return Err(format!("expected the access transition line, got `{}`", reply.text));
    }
    Ok("resolved coverage was not raised again".to_string())
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult {
        exit_code: if failed { exit::SMOKE } else { 0 },
        output: format!("{human}\n{machine}"),
    }
}

#[cfg(test)]
mod tests {
    use super::reference_scenarios;

    #[test]
    fn reference_scenarios_have_distinct_names() {
        let names = reference_scenarios().iter().map(|scenario| scenario.name).collect::<Vec<_>>();
        assert_eq!(names, super::SCENARIO_CHECKS);
    }
}
