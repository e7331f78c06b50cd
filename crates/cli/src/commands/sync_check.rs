//! `sync-check` command implementation.

use anyhow::{Context, Result};
use tracing::info;
use validation::{discover, sync_check, SyncCheckReport};

use super::Verdict;
use crate::cli::SyncCheckArgs;

/// Execute the `sync-check` command
pub fn run_sync_check(args: &SyncCheckArgs) -> Result<Verdict> {
    info!(
        dir = %args.session_dir.display(),
        threshold_ms = args.threshold_ms,
        "checking cross-device sync"
    );
    let session = discover(&args.session_dir)?;
    let report = sync_check(&session, args.threshold_ms)?;

    if args.json {
        let json =
            serde_json::to_string_pretty(&report).context("failed to serialize sync report")?;
        println!("{json}");
    } else {
        print_report(&report);
    }
    Ok(Verdict::from_passed(report.passed))
}

fn print_report(report: &SyncCheckReport) {
    println!("=== Sync check ===");
    println!("  Devices:       {}", report.devices.join(", "));
    println!("  Common frames: {}", report.common_frames);
    println!("  Threshold:     {:.3} ms", report.threshold_ms);
    println!("  Spread mean:   {:.3} ms", report.mean_spread_ms);
    println!("  Spread p99:    {:.3} ms", report.p99_spread_ms);
    println!("  Spread max:    {:.3} ms", report.max_spread_ms);

    let (shown, hidden) = report.shown_violations();
    if !shown.is_empty() {
        println!("  Violations ({}):", report.violations.len());
        for v in shown {
            println!(
                "    frame {:>6}: {:.3} ms (max cam{}, min cam{})",
                v.frame_number,
                v.spread_ms(),
                v.max_serial,
                v.min_serial
            );
        }
        if hidden > 0 {
            println!("    ... {hidden} more");
        }
    }
    println!("\nResult: {}", if report.passed { "PASS" } else { "FAIL" });
}
