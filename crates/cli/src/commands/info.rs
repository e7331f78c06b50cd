//! `info` command implementation.

use anyhow::{Context, Result};
use config_loader::SessionOverrides;
use contracts::{expected_frame_count, OutputFormat, SessionBlueprint};
use serde::Serialize;
use session::{gib, DiskEstimate};

use super::{load_blueprint, Verdict};
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    version: String,
    session: &'a contracts::SessionConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcoder: Option<&'a contracts::TranscoderConfig>,
    devices: Vec<DeviceInfo<'a>>,
    /// Only meaningful for raw output
    #[serde(skip_serializing_if = "Option::is_none")]
    disk_estimate: Option<DiskEstimate>,
}

#[derive(Serialize)]
struct DeviceInfo<'a> {
    serial: &'a str,
    width: u16,
    height: u16,
    pixel_format: String,
    acquisition_fps: f64,
    trigger_interval_fps: f64,
    expected_frames: u64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<Verdict> {
    let blueprint = load_blueprint(&args.config, &SessionOverrides::default())?;

    if args.json {
        let info = build_config_info(&blueprint);
        let json =
            serde_json::to_string_pretty(&info).context("failed to serialize config info")?;
        println!("{json}");
    } else {
        print_config_info(&blueprint);
    }
    Ok(Verdict::Pass)
}

fn build_config_info(blueprint: &SessionBlueprint) -> ConfigInfo<'_> {
    let session = &blueprint.session;
    let raw = session.output_format == OutputFormat::Raw;
    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        session,
        transcoder: (!raw).then_some(&blueprint.transcoder),
        devices: blueprint
            .devices
            .iter()
            .map(|d| DeviceInfo {
                serial: &d.serial,
                width: d.width,
                height: d.height,
                pixel_format: d.pixel_format.to_string(),
                acquisition_fps: d.acquisition_fps,
                trigger_interval_fps: d.trigger_interval_fps,
                expected_frames: expected_frame_count(session.duration_s, d.trigger_interval_fps),
            })
            .collect(),
        disk_estimate: raw.then(|| DiskEstimate::for_blueprint(blueprint)),
    }
}

fn print_config_info(blueprint: &SessionBlueprint) {
    let session = &blueprint.session;
    println!("Session");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Output: {} ({:?})", session.output_dir.display(), session.output_format);
    println!(
        "   ├─ Timing: start after {:.1} s, record {:.1} s",
        session.start_delay_s, session.duration_s
    );
    println!(
        "   ├─ Sync role: {:?} within {:.1} s (poll {:.2} s)",
        session.expected_role, session.role_timeout_s, session.role_poll_interval_s
    );
    println!(
        "   └─ Queue cap {} frames, {} frames per raw file",
        session.queue_capacity, session.frames_per_file
    );

    if session.output_format == OutputFormat::Transcoded {
        let t = &blueprint.transcoder;
        println!("\nTranscoder");
        println!("   ├─ Program: {}", t.program);
        println!("   ├─ Args: {}", t.args.join(" "));
        println!("   └─ Close timeout: {:.1} s", t.close_timeout_s);
    }

    println!("\nDevices ({})", blueprint.devices.len());
    for (i, d) in blueprint.devices.iter().enumerate() {
        let prefix = if i == blueprint.devices.len() - 1 { "└─" } else { "├─" };
        println!(
            "   {prefix} {} {}x{} {} trigger {} fps / sensor {} fps, {} frames expected",
            d.serial,
            d.width,
            d.height,
            d.pixel_format,
            d.trigger_interval_fps,
            d.acquisition_fps,
            expected_frame_count(session.duration_s, d.trigger_interval_fps)
        );
    }

    if session.output_format == OutputFormat::Raw {
        let estimate = DiskEstimate::for_blueprint(blueprint);
        println!("\nDisk estimate");
        for d in &estimate.devices {
            println!("   ├─ {}: {:.2} GiB ({} frames)", d.serial, gib(d.bytes), d.frames);
        }
        println!("   └─ Total: {:.2} GiB", gib(estimate.total_bytes));
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::write_config;

    #[test]
    fn test_json_info_has_estimate_for_raw() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint =
            load_blueprint(&write_config(dir.path()), &SessionOverrides::default()).unwrap();
        let value = serde_json::to_value(build_config_info(&blueprint)).unwrap();

        assert_eq!(value["devices"].as_array().unwrap().len(), 3);
        assert_eq!(value["devices"][0]["expected_frames"], 20);
        // 3 devices x 20 frames x 32 bytes
        assert_eq!(value["disk_estimate"]["total_bytes"], 1920);
        assert!(value.get("transcoder").is_none());
    }
}
