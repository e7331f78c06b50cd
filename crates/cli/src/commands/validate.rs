//! `validate` command implementation.

use anyhow::{Context, Result};
use tracing::info;
use validation::{discover, validate_session, CheckStatus, SessionValidation, ValidationError};

use super::Verdict;
use crate::cli::ValidateArgs;

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<Verdict> {
    info!(dir = %args.session_dir.display(), "validating session");
    let session = discover(&args.session_dir)?;
    if session.devices.values().all(|d| d.raw_files.is_empty()) {
        return Err(ValidationError::NoRecordings {
            path: args.session_dir.clone(),
        }
        .into());
    }

    let report = validate_session(&session);
    if args.json {
        let json =
            serde_json::to_string_pretty(&report).context("failed to serialize validation")?;
        println!("{json}");
    } else {
        print_validation(&report);
    }
    Ok(Verdict::from_passed(report.passed))
}

fn print_validation(report: &SessionValidation) {
    println!("=== Validate: {} ===", report.session_dir.display());
    for device in &report.devices {
        let rows = device
            .metadata_rows
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "\ncam{}: {} raw file(s), {} frame(s), {rows} metadata row(s)",
            device.serial, device.raw_files, device.frames
        );
        for check in &device.checks {
            println!(
                "  {} {:<24} {:<5} {}",
                check.id,
                check.id.description(),
                check.status.to_string(),
                check.detail
            );
        }
    }

    let failed = report.devices.iter().filter(|d| !d.passed()).count();
    let skipped = report
        .devices
        .iter()
        .filter(|d| d.checks.iter().all(|c| c.status == CheckStatus::Skip))
        .count();
    println!(
        "\nResult: {} ({} device(s), {failed} failed, {skipped} skipped)",
        if report.passed { "PASS" } else { "FAIL" },
        report.devices.len()
    );
}
