//! # Integration Tests
//!
//! End-to-end tests across the workspace crates, driven by simulated devices.
//!
//! Covers:
//! - Config load into a recording session
//! - Recording followed by offline validation and sync check
//! - Re-encode planning over a recorded session

#[cfg(test)]
mod config_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{expected_frame_count, OutputFormat, SyncRole};

    const SESSION_TOML: &str = r#"
[session]
output_dir = "captures"
start_delay_s = 2.0
duration_s = 10.0

[[devices]]
serial = "40123456"
width = 1920
height = 1080
acquisition_fps = 60.0
trigger_interval_fps = 30.0

[[devices]]
serial = "40123457"
width = 1920
height = 1080
acquisition_fps = 60.0
trigger_interval_fps = 30.0
"#;

    #[test]
    fn test_defaults_fill_session() {
        let bp = ConfigLoader::load_from_str(SESSION_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.session.output_format, OutputFormat::Raw);
        assert_eq!(bp.session.expected_role, SyncRole::Follower);
        assert_eq!(bp.devices.len(), 2);
        assert_eq!(bp.devices[0].frame_size(), 1920 * 1080);
        assert_eq!(expected_frame_count(bp.session.duration_s, 30.0), 300);
    }

    #[test]
    fn test_json_and_toml_agree() {
        let bp = ConfigLoader::load_from_str(SESSION_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let again = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(again.devices.len(), bp.devices.len());
        assert_eq!(again.session.duration_s, bp.session.duration_s);
    }

    #[test]
    fn test_trigger_faster_than_sensor_rejected() {
        let text =
            SESSION_TOML.replacen("trigger_interval_fps = 30.0", "trigger_interval_fps = 90.0", 1);
        assert!(ConfigLoader::load_from_str(&text, ConfigFormat::Toml).is_err());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{HostClock, RecordingReport, SessionBlueprint, StopReason, SystemHostClock};
    use devices::{DeviceFactory, SimBackend};
    use session::RecordingSession;
    use validation::{
        discover, sync_check, validate_session, CheckId, CheckStatus, EncodeJob, PlanNote,
    };

    fn blueprint(output_dir: &Path) -> SessionBlueprint {
        let text = format!(
            r#"
[session]
output_dir = "{}"
start_delay_s = 0.2
duration_s = 0.5
frames_per_file = 10
role_timeout_s = 0.5
role_poll_interval_s = 0.01

[[devices]]
serial = "2001"
width = 16
height = 8
acquisition_fps = 40.0
trigger_interval_fps = 40.0

[[devices]]
serial = "2002"
width = 16
height = 8
acquisition_fps = 40.0
trigger_interval_fps = 40.0

[[devices]]
serial = "2003"
width = 16
height = 8
acquisition_fps = 40.0
trigger_interval_fps = 40.0

[[devices]]
serial = "2004"
width = 16
height = 8
acquisition_fps = 40.0
trigger_interval_fps = 40.0
"#,
            output_dir.display().to_string().replace('\\', "/")
        );
        ConfigLoader::load_from_str(&text, ConfigFormat::Toml).unwrap()
    }

    fn record(bp: SessionBlueprint) -> RecordingReport {
        let host: Arc<dyn HostClock> = Arc::new(SystemHostClock);
        let factory = DeviceFactory::new(SimBackend::from_devices(Arc::clone(&host), &bp.devices));
        let serials: Vec<String> = bp.devices.iter().map(|d| d.serial.clone()).collect();
        let devices = factory.open_all(&serials).unwrap();

        let mut session = RecordingSession::new(bp, host);
        session.prepare(devices).unwrap();
        session.start().unwrap().wait().unwrap()
    }

    async fn record_in_background(output_dir: PathBuf) -> RecordingReport {
        tokio::task::spawn_blocking(move || record(blueprint(&output_dir)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_then_validate_and_sync_check() {
        let dir = tempfile::tempdir().unwrap();
        let report = record_in_background(dir.path().join("out")).await;

        assert_eq!(report.devices.len(), 4);
        assert!(report.all_completed());
        for device in &report.devices {
            assert_eq!(device.stop_reason, StopReason::Deadline);
            assert_eq!(device.expected_frames, 20);
        }

        let files = discover(&report.session_dir).unwrap();
        assert_eq!(files.devices.len(), 4);

        let validation = validate_session(&files);
        for device in &validation.devices {
            for check in &device.checks {
                assert_eq!(
                    check.status,
                    CheckStatus::Pass,
                    "cam{} {}: {}",
                    device.serial,
                    check.id,
                    check.detail
                );
            }
            let recorded = report
                .devices
                .iter()
                .find(|d| d.device_id.as_str() == device.serial)
                .unwrap();
            assert_eq!(device.frames, recorded.actual_frames);
        }
        assert!(validation.passed);

        let sync = sync_check(&files, 1.0).unwrap();
        assert!(sync.passed, "spread max {:.3} ms", sync.max_spread_ms);
        assert!(sync.violations.is_empty());
        assert!(sync.common_frames > 0);
    }

    #[tokio::test]
    async fn test_corrupted_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let report = record_in_background(dir.path().join("out")).await;

        let victim = report
            .devices
            .iter()
            .find(|d| d.device_id.as_str() == "2003")
            .unwrap();
        let first = victim.files.first().unwrap();
        let mut bytes = std::fs::read(first).unwrap();
        bytes[0] ^= 0xFF;
        std::fs::write(first, bytes).unwrap();

        let validation = validate_session(&discover(&report.session_dir).unwrap());
        assert!(!validation.passed);
        let device = validation.device("2003").unwrap();
        assert_eq!(device.check(CheckId::V1).unwrap().status, CheckStatus::Fail);
        assert!(validation.device("2001").unwrap().passed());
    }

    #[tokio::test]
    async fn test_encode_plan_over_recording() {
        let dir = tempfile::tempdir().unwrap();
        let report = record_in_background(dir.path().join("out")).await;
        let files = discover(&report.session_dir).unwrap();

        let recorded = report
            .devices
            .iter()
            .find(|d| d.device_id.as_str() == "2002")
            .unwrap();
        let same = EncodeJob::prepare(&files, "2002", 40.0).unwrap();
        assert_eq!(same.stats.raw_frames as u64, recorded.actual_frames);
        // every raw frame once, plus the closing repeat of the last one
        assert_eq!(same.stats.skipped, 0);
        assert_eq!(same.stats.duplicated, 1);
        assert_eq!(same.stats.output_frames, same.stats.raw_frames + 1);
        assert_eq!(same.output, report.session_dir.join("cam2002.mp4"));

        let half = EncodeJob::prepare(&files, "2002", 20.0).unwrap();
        assert!(half.stats.skipped > 0);
        assert!(matches!(half.stats.note, PlanNote::Downsampled(_)));
        assert!(!half.output.exists());
    }
}
