//! `encode` command implementation.

use anyhow::Result;
use capture::ProcessByteSink;
use config_loader::SessionOverrides;
use contracts::{ByteSink, TranscoderConfig};
use tracing::{error, info, warn};
use validation::{discover, EncodeJob};

use super::{load_blueprint, Verdict};
use crate::cli::EncodeArgs;

/// Execute the `encode` command
pub fn run_encode(args: &EncodeArgs) -> Result<Verdict> {
    let session = discover(&args.session_dir)?;
    let job = EncodeJob::prepare(&session, &args.serial, args.fps)?;
    print_job(&job);

    if args.dry_run {
        info!("dry run - frame plan only, nothing encoded");
        return Ok(Verdict::Pass);
    }

    let transcoder = match &args.config {
        Some(path) => load_blueprint(path, &SessionOverrides::default())?.transcoder,
        None => TranscoderConfig::default(),
    };
    let encoder_args =
        transcoder.render_args(job.header.width, job.header.height, args.fps, &job.output);
    let mut sink = ProcessByteSink::spawn(
        format!("encoder-{}", job.serial),
        &transcoder.program,
        &encoder_args,
        transcoder.close_timeout(),
    )?;
    info!(
        program = %transcoder.program,
        output = %job.output.display(),
        "encoder started"
    );

    let repeated = match job.encode(&mut sink) {
        Ok(duplicated) => duplicated,
        Err(e) => {
            error!(error = %e, "encoding failed");
            if let Err(close) = sink.close() {
                warn!(error = %close, "encoder close failed");
            }
            return Ok(Verdict::Fail);
        }
    };
    if let Err(e) = sink.close() {
        error!(error = %e, "encoder did not finish cleanly");
        return Ok(Verdict::Fail);
    }

    info!(
        frames = job.plan.len(),
        repeated_writes = repeated,
        output = %job.output.display(),
        "encoding complete"
    );
    println!("Wrote {} frame(s) to {}", job.plan.len(), job.output.display());
    Ok(Verdict::Pass)
}

fn print_job(job: &EncodeJob) {
    let stats = &job.stats;
    println!("=== Encode cam{} ===", job.serial);
    println!("  Raw files:");
    for (path, frames) in job.frames_per_file() {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        println!("    {name}: {frames} frame(s)");
    }
    println!("  Raw frames:    {}", stats.raw_frames);
    println!("  Time span:     {:.3} s", stats.time_span_s);
    println!("  Raw fps:       {:.2}", stats.raw_fps);
    println!("  Output fps:    {:.2}", stats.output_fps);
    println!("  Output frames: {}", stats.output_frames);
    println!("  Duplicated:    {}", stats.duplicated);
    println!("  Skipped:       {}", stats.skipped);
    println!("  Note:          {}", stats.note);
    println!("  Output:        {}", job.output.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::record::record;
    use crate::commands::tests::write_config;
    use std::path::PathBuf;

    #[test]
    fn test_unknown_session_dir_is_an_error() {
        let args = EncodeArgs {
            session_dir: PathBuf::from("/nonexistent/session"),
            serial: "1001".to_string(),
            fps: 30.0,
            config: None,
            dry_run: true,
        };
        assert!(run_encode(&args).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dry_run_on_recorded_session() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint =
            load_blueprint(&write_config(dir.path()), &SessionOverrides::default()).unwrap();
        let report = record(blueprint).await.unwrap();

        let args = EncodeArgs {
            session_dir: report.session_dir.clone(),
            serial: "1001".to_string(),
            fps: 50.0,
            config: None,
            dry_run: true,
        };
        assert_eq!(run_encode(&args).unwrap(), Verdict::Pass);
        assert!(!report.session_dir.join("cam1001.mp4").exists());

        let missing = EncodeArgs {
            serial: "9999".to_string(),
            ..args
        };
        assert!(run_encode(&missing).is_err());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_encode_pipes_payloads_to_program() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path());
        let mut text = std::fs::read_to_string(&config).unwrap();
        text.push_str(
            r#"
[transcoder]
program = "sh"
args = ["-c", "cat > {output}"]
close_timeout_s = 5.0
"#,
        );
        std::fs::write(&config, text).unwrap();

        let blueprint = load_blueprint(&config, &SessionOverrides::default()).unwrap();
        let report = record(blueprint).await.unwrap();

        let args = EncodeArgs {
            session_dir: report.session_dir.clone(),
            serial: "1002".to_string(),
            fps: 50.0,
            config: Some(config),
            dry_run: false,
        };
        assert_eq!(run_encode(&args).unwrap(), Verdict::Pass);

        let output = report.session_dir.join("cam1002.mp4");
        let written = std::fs::metadata(&output).unwrap().len();
        // 8x4 BayerGR8 payloads
        assert!(written > 0);
        assert_eq!(written % 32, 0);

        // a second run refuses to overwrite
        assert!(run_encode(&args).is_err());
    }
}
