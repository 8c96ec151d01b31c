//! Result envelope printed to stdout.
//!
//! Probe results are the program's only stdout output. JSON is the
//! default; text mode prints one colored PASS/FAIL line per step.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::error::ProbeError;
use crate::runner::{ProbeReport, StepResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OutputFormat::Json => "json",
            OutputFormat::Text => "text",
        })
    }
}

/// Envelope every command prints exactly once.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
    pub ok: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Stable error codes for programmatic consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BrowserLaunchFailed,
    DriverNotFound,
    NavigationFailed,
    StatusMismatch,
    InvalidPlan,
    Timeout,
    IoError,
    SessionError,
    InternalError,
}

/// Prints a finished probe report in the selected format.
pub fn print_report(
    command: &str,
    report: &ProbeReport,
    format: OutputFormat,
) -> crate::error::Result<()> {
    match format {
        OutputFormat::Json => {
            let envelope = CommandResult {
                ok: report.passed(),
                command: command.to_string(),
                data: Some(report),
                error: report_error(report),
            };
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        OutputFormat::Text => print_text(report),
    }
    Ok(())
}

/// Prints an error envelope for a command that failed before producing a
/// report (launch failure, bad plan file).
pub fn print_failure(command: &str, err: &ProbeError, format: OutputFormat) {
    let command_error = err.to_command_error();
    match format {
        OutputFormat::Json => {
            let envelope: CommandResult<()> = CommandResult {
                ok: false,
                command: command.to_string(),
                data: None,
                error: Some(command_error),
            };
            if let Ok(json) = serde_json::to_string_pretty(&envelope) {
                println!("{json}");
            }
        }
        OutputFormat::Text => {
            println!("{} {}", "FAIL".red().bold(), command_error.message);
        }
    }
}

fn report_error(report: &ProbeReport) -> Option<CommandError> {
    if let Some(message) = &report.warmup_error {
        return Some(CommandError {
            code: ErrorCode::NavigationFailed,
            message: format!("warm-up: {message}"),
            details: None,
        });
    }
    report.steps.iter().find_map(|step| match &step.result {
        StepResult::Passed { .. } => None,
        StepResult::StatusMismatch { message, .. } => Some(CommandError {
            code: ErrorCode::StatusMismatch,
            message: format!("{}: {}", step.url, message),
            details: None,
        }),
        StepResult::NavigationFailed { message } => Some(CommandError {
            code: ErrorCode::NavigationFailed,
            message: format!("{}: {}", step.url, message),
            details: None,
        }),
    })
}

fn print_text(report: &ProbeReport) {
    if let Some(message) = &report.warmup_error {
        println!(
            "{} warm-up {}: {}",
            "FAIL".red().bold(),
            report.base_url,
            message
        );
    }
    for step in &report.steps {
        match &step.result {
            StepResult::Passed { status } => {
                println!("{} {} [{}]", "PASS".green().bold(), step.url, status);
            }
            StepResult::StatusMismatch { message, .. }
            | StepResult::NavigationFailed { message } => {
                println!("{} {}: {}", "FAIL".red().bold(), step.url, message);
            }
        }
    }

    let verdict = if report.passed() {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    };
    println!(
        "{verdict} {} step(s) in {}ms",
        report.steps.len(),
        report.duration_ms
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::StepOutcome;

    fn report_with(result: StepResult) -> ProbeReport {
        ProbeReport {
            base_url: "http://localhost:3000".to_string(),
            warmup_error: None,
            steps: vec![StepOutcome {
                path: "/admin".to_string(),
                url: "http://localhost:3000/admin".to_string(),
                expected: 200,
                result,
            }],
            duration_ms: 12,
        }
    }

    #[test]
    fn error_codes_serialize_screaming() {
        let json = serde_json::to_value(ErrorCode::StatusMismatch).unwrap();
        assert_eq!(json, "STATUS_MISMATCH");
    }

    #[test]
    fn mismatch_reports_surface_a_status_mismatch_error() {
        let report = report_with(StepResult::StatusMismatch {
            status: 302,
            message: "expected 200, got 302".to_string(),
        });
        let error = report_error(&report).unwrap();
        assert_eq!(error.code, ErrorCode::StatusMismatch);
        assert!(error.message.contains("expected 200, got 302"));
    }

    #[test]
    fn passing_reports_have_no_error() {
        let report = report_with(StepResult::Passed { status: 200 });
        assert!(report_error(&report).is_none());
    }

    #[test]
    fn step_outcomes_flatten_the_result_tag() {
        let report = report_with(StepResult::Passed { status: 200 });
        let json = serde_json::to_value(&report.steps[0]).unwrap();
        assert_eq!(json["result"], "passed");
        assert_eq!(json["status"], 200);
        assert_eq!(json["expected"], 200);
    }
}
