use std::path::Path;

use relay_core::config::{AppConfig, LoadOptions};
use relay_webex::platform::{Directory, WebhookRegistry};
use relay_webex::webhooks::{webhook_target, SUBSCRIPTIONS};
use relay_webex::WebexClient;
use serde::Serialize;

use super::{runtime, CommandResult};

const CONFIG_VALIDATION: &str = "config_validation";
const PLATFORM_TOKEN: &str = "platform_token";
const WEBHOOK_SUBSCRIPTIONS: &str = "webhook_subscriptions";

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

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Skipped, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn from_checks(checks: Vec<DoctorCheck>) -> Self {
        let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
        let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
        let summary = if all_pass {
            "doctor: all readiness checks passed".to_string()
        } else {
            "doctor: one or more readiness checks failed".to_string()
        };

        Self { overall_status, summary, checks }
    }
}

pub fn run(json_output: bool, config_path: Option<&Path>) -> CommandResult {
    let report = build_report(config_path);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(config_path: Option<&Path>) -> DoctorReport {
    let options =
        LoadOptions { config_path: config_path.map(Path::to_path_buf), ..LoadOptions::default() };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return DoctorReport::from_checks(vec![
                DoctorCheck::fail(CONFIG_VALIDATION, error.to_string()),
                DoctorCheck::skipped(PLATFORM_TOKEN, "skipped because configuration did not load"),
                DoctorCheck::skipped(
                    WEBHOOK_SUBSCRIPTIONS,
                    "skipped because configuration did not load",
                ),
            ]);
        }
    };

    let mut checks =
        vec![DoctorCheck::pass(CONFIG_VALIDATION, "configuration loaded and validated")];
    let outcome = WebexClient::new(&config.platform)
        .map_err(|error| format!("failed to build platform client: {error}"))
        .and_then(|client| Ok((client, runtime()?)))
        .map(|(client, runtime)| runtime.block_on(platform_checks(&config, &client)));

    match outcome {
        Ok(platform) => checks.extend(platform),
        Err(error) => {
            checks.push(DoctorCheck::fail(PLATFORM_TOKEN, error));
            checks.push(DoctorCheck::skipped(
                WEBHOOK_SUBSCRIPTIONS,
                "skipped because the platform client is unavailable",
            ));
        }
    }

    DoctorReport::from_checks(checks)
}

/// Token check first; the webhook check only runs once the token authenticates.
async fn platform_checks<P>(config: &AppConfig, platform: &P) -> Vec<DoctorCheck>
where
    P: Directory + WebhookRegistry,
{
    let agent = match platform.agent_identity().await {
        Ok(agent) => agent,
        Err(error) => {
            return vec![
                DoctorCheck::fail(PLATFORM_TOKEN, format!("agent identity lookup failed: {error}")),
                DoctorCheck::skipped(
                    WEBHOOK_SUBSCRIPTIONS,
                    "skipped because the access token was not accepted",
                ),
            ];
        }
    };

    let token = DoctorCheck::pass(
        PLATFORM_TOKEN,
        format!(
            "authenticated as {} <{}> in org {}",
            agent.display_name, agent.email, agent.org_id
        ),
    );
    vec![token, check_webhooks(config, platform).await]
}

async fn check_webhooks<P>(config: &AppConfig, platform: &P) -> DoctorCheck
where
    P: WebhookRegistry,
{
    let webhooks = match platform.list_webhooks().await {
        Ok(webhooks) => webhooks,
        Err(error) => {
            return DoctorCheck::fail(WEBHOOK_SUBSCRIPTIONS, format!("listing failed: {error}"));
        }
    };

    let expected_target = match config.server.public_url.as_deref().map(webhook_target) {
        Some(Ok(target)) => Some(target),
        Some(Err(error)) => {
            return DoctorCheck::fail(WEBHOOK_SUBSCRIPTIONS, format!("server.public_url: {error}"));
        }
        None => None,
    };

    let targets_match =
        |url: &str| expected_target.as_deref().map_or(true, |target| url == target);
    let missing: Vec<String> = SUBSCRIPTIONS
        .iter()
        .filter(|(resource, event)| {
            !webhooks.iter().any(|webhook| {
                webhook.resource == *resource
                    && webhook.event == *event
                    && targets_match(&webhook.target_url)
            })
        })
        .map(|(resource, event)| format!("{resource}/{event}"))
        .collect();

    if missing.is_empty() {
        let target = expected_target.as_deref().unwrap_or("any target");
        return DoctorCheck::pass(
            WEBHOOK_SUBSCRIPTIONS,
            format!("{} subscriptions present for {target}", SUBSCRIPTIONS.len()),
        );
    }

    DoctorCheck::fail(
        WEBHOOK_SUBSCRIPTIONS,
        format!("missing {}; run `relay webhooks` to register them", missing.join(", ")),
    )
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
