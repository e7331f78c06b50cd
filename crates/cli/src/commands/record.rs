//! `record` command implementation.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use config_loader::SessionOverrides;
use contracts::{HostClock, RecordingReport, SessionBlueprint, SystemHostClock};
use devices::{DeviceFactory, SimBackend};
use session::{gib, DiskEstimate, RecordingHandle, RecordingSession};
use tracing::{info, warn};

use super::{load_blueprint, Verdict};
use crate::cli::RecordArgs;
use crate::error::CliError;

const FINISH_POLL: Duration = Duration::from_millis(50);

/// Execute the `record` command
pub async fn run_record(args: &RecordArgs) -> Result<Verdict> {
    let overrides = SessionOverrides {
        duration_s: args.duration,
        start_delay_s: args.start_delay,
        output_format: args.format.map(Into::into),
        output_dir: args.output_dir.clone(),
    };
    let blueprint = load_blueprint(&args.config, &overrides)?;

    info!(
        devices = blueprint.devices.len(),
        duration_s = blueprint.session.duration_s,
        start_delay_s = blueprint.session.start_delay_s,
        format = ?blueprint.session.output_format,
        "configuration loaded"
    );

    if args.dry_run {
        info!("dry run - configuration is valid, exiting");
        print_plan(&blueprint);
        return Ok(Verdict::Pass);
    }

    let report = record(blueprint).await?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
        println!("{json}");
    } else {
        print_report(&report);
    }
    Ok(Verdict::from_passed(report.all_completed()))
}

/// Prepare, start and wait for a session; Ctrl+C stops it early
pub(super) async fn record(blueprint: SessionBlueprint) -> Result<RecordingReport> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let mut signal = pin!(shutdown_signal());
    let mut signalled = false;

    let setup = tokio::task::spawn_blocking({
        let interrupted = Arc::clone(&interrupted);
        move || start_session(blueprint, &interrupted)
    });
    let mut setup = pin!(setup);
    let handle = loop {
        tokio::select! {
            joined = &mut setup => break joined.map_err(CliError::from)??,
            _ = &mut signal, if !signalled => {
                warn!("received shutdown signal during setup");
                interrupted.store(true, Ordering::Release);
                signalled = true;
            }
        }
    };

    info!(
        dir = %handle.session_dir().display(),
        host_target_ns = handle.host_target_ns(),
        "recording, press Ctrl+C to stop early"
    );
    if signalled {
        handle.request_stop();
    }

    let mut ticker = tokio::time::interval(FINISH_POLL);
    while !handle.is_finished() {
        tokio::select! {
            _ = &mut signal, if !signalled => {
                warn!("received shutdown signal, stopping workers");
                handle.request_stop();
                signalled = true;
            }
            _ = ticker.tick() => {}
        }
    }

    let report = tokio::task::spawn_blocking(move || handle.wait())
        .await
        .map_err(CliError::from)?
        .map_err(CliError::from)?;
    Ok(report)
}

/// Blocking part of the setup: open devices, prepare, start
fn start_session(
    blueprint: SessionBlueprint,
    interrupted: &AtomicBool,
) -> std::result::Result<RecordingHandle, CliError> {
    let host: Arc<dyn HostClock> = Arc::new(SystemHostClock);
    warn!("no camera driver linked, recording from simulated devices");
    let factory = DeviceFactory::new(SimBackend::from_devices(
        Arc::clone(&host),
        &blueprint.devices,
    ));
    let serials: Vec<String> = blueprint.devices.iter().map(|d| d.serial.clone()).collect();
    let devices = factory.open_all(&serials)?;

    let mut session = RecordingSession::new(blueprint, host);
    session.prepare(devices)?;
    if interrupted.load(Ordering::Acquire) {
        // dropping the prepared session disarms and closes its devices
        return Err(CliError::Interrupted);
    }
    Ok(session.start()?)
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn print_plan(blueprint: &SessionBlueprint) {
    let session = &blueprint.session;
    println!("\n=== Session Plan ===\n");
    println!("  Output dir:   {}", session.output_dir.display());
    println!("  Format:       {:?}", session.output_format);
    println!("  Start delay:  {:.1} s", session.start_delay_s);
    println!("  Duration:     {:.1} s", session.duration_s);
    println!("  Devices ({}):", blueprint.devices.len());
    for device in &blueprint.devices {
        println!(
            "    - {} {}x{} {} @ {} fps (sensor {} fps)",
            device.serial,
            device.width,
            device.height,
            device.pixel_format,
            device.trigger_interval_fps,
            device.acquisition_fps
        );
    }
    let estimate = DiskEstimate::for_blueprint(blueprint);
    println!("  Estimated raw size: {:.2} GiB", gib(estimate.total_bytes));
    println!();
}

fn print_report(report: &RecordingReport) {
    println!("\n=== Recording Report ===\n");
    println!("  Session dir: {}", report.session_dir.display());
    println!("  Duration:    {:.1} s", report.duration_s);
    println!(
        "  {:<16} {:>9} {:>9} {:>7} {:>6}  {:<18} paused",
        "device", "expected", "actual", "delta", "files", "stop"
    );
    for d in &report.devices {
        println!(
            "  {:<16} {:>9} {:>9} {:>+7} {:>6}  {:<18} {}",
            d.device_id.as_str(),
            d.expected_frames,
            d.actual_frames,
            d.delta,
            d.files.len(),
            d.stop_reason.to_string(),
            if d.paused { "yes" } else { "no" }
        );
        for e in &d.teardown_errors {
            println!("      teardown: {e}");
        }
    }
    println!("\n  Total frames: {}", report.total_frames());
    if report.all_completed() {
        println!("  Result: all devices recorded to the end time");
    } else {
        println!("  Result: some devices stopped early");
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::write_config;
    use contracts::StopReason;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_record_with_simulated_devices() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path());
        let blueprint = load_blueprint(&config, &SessionOverrides::default()).unwrap();

        let report = record(blueprint).await.unwrap();
        assert_eq!(report.devices.len(), 3);
        assert!(report.all_completed());
        for device in &report.devices {
            assert_eq!(device.stop_reason, StopReason::Deadline);
            assert_eq!(device.expected_frames, 20);
            assert!((18..=21).contains(&device.actual_frames));
            assert!(!device.files.is_empty());
        }
        assert!(report.session_dir.starts_with(dir.path().join("captures")));
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let args = RecordArgs {
            config: write_config(dir.path()),
            duration: Some(2.0),
            start_delay: None,
            format: None,
            output_dir: None,
            dry_run: true,
            json: false,
        };
        assert_eq!(run_record(&args).await.unwrap(), Verdict::Pass);
        assert!(!dir.path().join("captures").exists());
    }

    #[tokio::test]
    async fn test_invalid_override_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let args = RecordArgs {
            config: write_config(dir.path()),
            duration: Some(-1.0),
            start_delay: None,
            format: None,
            output_dir: None,
            dry_run: true,
            json: false,
        };
        assert!(run_record(&args).await.is_err());
    }
}
