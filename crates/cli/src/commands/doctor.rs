use std::path::PathBuf;

use secrecy::ExposeSecret;
use serde::Serialize;
use slashbot_core::config::{AppConfig, LoadOptions, TransportMode};
use slashbot_slack::api::SlackApiClient;

use crate::commands::CommandResult;

pub const EXIT_NOT_READY: u8 = 2;

#[derive(Clone, Debug, Default)]
pub struct DoctorOptions {
    pub transport: TransportMode,
    pub config_path: Option<PathBuf>,
    pub online: bool,
}

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
    transport: &'static str,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: &DoctorOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { EXIT_NOT_READY };

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

fn build_report(options: &DoctorOptions) -> DoctorReport {
    let mut checks = Vec::new();

    let loaded = AppConfig::load(LoadOptions {
        config_path: options.config_path.clone(),
        require_file: options.config_path.is_some(),
        transport: options.transport,
        ..LoadOptions::default()
    });

    match loaded {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_slack_tokens(&config));
            checks.push(if options.online {
                check_slack_auth(&config)
            } else {
                skipped("slack_auth", "skipped; pass --online to call auth.test")
            });
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(skipped(
                "slack_token_readiness",
                "skipped because configuration did not load",
            ));
            checks.push(skipped("slack_auth", "skipped because configuration did not load"));
        }
    }

    // Skipped checks don't fail the report on their own.
    let all_pass = checks.iter().all(|check| check.status != CheckStatus::Fail);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, transport: options.transport.as_str(), summary, checks }
}

fn skipped(name: &'static str, details: &str) -> DoctorCheck {
    DoctorCheck { name, status: CheckStatus::Skipped, details: details.to_string() }
}

fn check_slack_tokens(config: &AppConfig) -> DoctorCheck {
    let slack = &config.slack;
    let details = match config.transport {
        TransportMode::Socket => format!(
            "socket mode credentials present (app token {}, bot token {})",
            token_hint(slack.app_token.expose_secret()),
            token_hint(slack.bot_token.expose_secret()),
        ),
        TransportMode::Webhook => format!(
            "webhook credentials present (bot token {}, signing secret {} chars)",
            token_hint(slack.bot_token.expose_secret()),
            slack.signing_secret.expose_secret().len(),
        ),
    };

    DoctorCheck { name: "slack_token_readiness", status: CheckStatus::Pass, details }
}

fn check_slack_auth(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "slack_auth",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = match SlackApiClient::from_config(&config.slack) {
        Ok(client) => runtime
            .block_on(client.auth_test(&config.slack.bot_token))
            .map_err(|error| error.to_string()),
        Err(error) => Err(error.to_string()),
    };

    match result {
        Ok(identity) => DoctorCheck {
            name: "slack_auth",
            status: CheckStatus::Pass,
            details: format!(
                "authenticated as `{}` ({}) on team `{}`",
                identity.user, identity.user_id, identity.team
            ),
        },
        Err(error) => DoctorCheck { name: "slack_auth", status: CheckStatus::Fail, details: error },
    }
}

/// Token prefix followed by an ellipsis; never prints the secret part.
fn token_hint(token: &str) -> String {
    let prefix = token.split('-').next().unwrap_or_default();
    format!("`{prefix}-…`")
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(format!("{} (transport: {})", report.summary, report.transport));

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
